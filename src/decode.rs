//! Decoding bridge: walks a scanned tree while driving user [`FromCbor`]
//! constructors, exposing single-value, keyed and unkeyed container views.

use crate::path::{Path, SUPER_KEY};
use crate::scan::{self, uint_from_be, Item, Literal, Scanner};
use alloc::{
    string::{String, ToString},
    vec::Vec,
};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Malformed CBOR at {0}: {1}")]
    DataCorrupted(Path, Corruption),

    #[error("Incorrect type at {0}: expecting {1}, found {2}")]
    TypeMismatch(Path, &'static str, &'static str),

    #[error("No value at {0}")]
    ValueNotFound(Path),

    #[error("Missing key {1:?} at {0}")]
    KeyNotFound(Path, String),
}

impl Error {
    pub fn path(&self) -> &Path {
        match self {
            Error::DataCorrupted(path, _)
            | Error::TypeMismatch(path, _, _)
            | Error::ValueNotFound(path)
            | Error::KeyNotFound(path, _) => path,
        }
    }
}

/// What exactly was wrong with the bytes.
#[derive(Error, Debug)]
pub enum Corruption {
    #[error(transparent)]
    Scan(#[from] scan::Error),

    #[error("invalid UTF-8 in text string")]
    InvalidUtf8,

    #[error("map key is not a text string")]
    NonStringKey,

    #[error("expecting tag {0}, found tag {1}")]
    WrongTag(u64, u64),

    #[error("expecting tag {0} on an untagged value")]
    MissingTag(u64),
}

fn type_name(item: &Item) -> &'static str {
    match item {
        Item::None => "absent value",
        Item::Literal(Literal::Nil) => "null",
        Item::Literal(Literal::Break) => "break",
        Item::Literal(Literal::Bool(_)) => "boolean",
        Item::Literal(Literal::UInt(_)) => "unsigned integer",
        Item::Literal(Literal::NInt(_)) => "negative integer",
        Item::Literal(Literal::Float16(_) | Literal::Float32(_) | Literal::Float64(_)) => "float",
        Item::Literal(Literal::Str(_)) => "text string",
        Item::Literal(Literal::Bin(_)) => "byte string",
        Item::Array(_) => "array",
        Item::Map(_) => "map",
        Item::Tagged(..) => "tagged value",
    }
}

/// A value that can construct itself from a decoder context.
///
/// A type with `TAG = Some(n)` must appear on the wire wrapped in exactly
/// CBOR tag `n`; the bridge unwraps the tag before calling
/// [`from_cbor`](FromCbor::from_cbor).
pub trait FromCbor: Sized {
    const TAG: Option<u64> = None;

    fn from_cbor(decoder: &Decoder<'_>) -> Result<Self, Error>;
}

/// Parse a single value from CBOR bytes.
pub fn parse<T: FromCbor>(data: &[u8]) -> Result<T, Error> {
    let item = Scanner::new(data)
        .scan()
        .map_err(|e| Error::DataCorrupted(Path::root(), e.into()))?;
    Decoder::new(&item, Path::root()).decode()
}

static ABSENT: Item = Item::None;

/// Single-value container over one scanned item.
pub struct Decoder<'a> {
    item: &'a Item,
    path: Path,
}

impl<'a> Decoder<'a> {
    pub(crate) fn new(item: &'a Item, path: Path) -> Self {
        Self { item, path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn decode<T: FromCbor>(&self) -> Result<T, Error> {
        let Some(expected) = T::TAG else {
            return T::from_cbor(self);
        };
        match self.item {
            Item::Tagged(tag, value) if *tag == expected => {
                T::from_cbor(&Decoder::new(value, self.path.clone()))
            }
            Item::Tagged(tag, _) => Err(Error::DataCorrupted(
                self.path.clone(),
                Corruption::WrongTag(expected, *tag),
            )),
            _ => Err(Error::DataCorrupted(
                self.path.clone(),
                Corruption::MissingTag(expected),
            )),
        }
    }

    /// Whether the value is CBOR null (or undefined).
    pub fn decode_nil(&self) -> bool {
        matches!(self.item, Item::Literal(Literal::Nil))
    }

    /// View the value as a keyed container.
    pub fn keyed(&self) -> Result<KeyedDecoder<'a>, Error> {
        KeyedDecoder::new(self.item, self.path.clone())
    }

    /// View the value as an unkeyed container. A map coerces to its
    /// alternating key/value sequence; an absent value to an empty one.
    pub fn unkeyed(&self) -> Result<UnkeyedDecoder<'a>, Error> {
        UnkeyedDecoder::new(self.item, self.path.clone())
    }

    fn mismatch(&self, expected: &'static str) -> Error {
        if matches!(self.item, Item::None) {
            Error::ValueNotFound(self.path.clone())
        } else {
            Error::TypeMismatch(self.path.clone(), expected, type_name(self.item))
        }
    }

    fn corrupted(&self, cause: Corruption) -> Error {
        Error::DataCorrupted(self.path.clone(), cause)
    }

    fn uint(&self) -> Result<u64, Error> {
        match self.item {
            Item::Literal(Literal::UInt(bytes)) => Ok(uint_from_be(bytes)),
            _ => Err(self.mismatch("unsigned integer")),
        }
    }

    /// The integer argument and whether it came from major type 1.
    fn int_argument(&self) -> Result<(u64, bool), Error> {
        match self.item {
            Item::Literal(Literal::UInt(bytes)) => Ok((uint_from_be(bytes), false)),
            Item::Literal(Literal::NInt(bytes)) => Ok((uint_from_be(bytes), true)),
            _ => Err(self.mismatch("integer")),
        }
    }

    fn text(&self) -> Result<&'a str, Error> {
        match self.item {
            Item::Literal(Literal::Str(bytes)) => {
                core::str::from_utf8(bytes).map_err(|_| self.corrupted(Corruption::InvalidUtf8))
            }
            _ => Err(self.mismatch("text string")),
        }
    }
}

/// Keyed container: an insertion-ordered view of a scanned map. Duplicate
/// keys keep their first occurrence.
pub struct KeyedDecoder<'a> {
    entries: Vec<(String, &'a Item)>,
    path: Path,
}

impl<'a> KeyedDecoder<'a> {
    fn new(item: &'a Item, path: Path) -> Result<Self, Error> {
        let Item::Map(kv) = item else {
            return Err(match item {
                Item::None => Error::ValueNotFound(path),
                _ => Error::TypeMismatch(path, "map", type_name(item)),
            });
        };
        let mut entries: Vec<(String, &Item)> = Vec::with_capacity(kv.len() / 2);
        for pair in kv.chunks_exact(2) {
            let key = match &pair[0] {
                Item::Literal(Literal::Str(bytes)) => core::str::from_utf8(bytes)
                    .map_err(|_| Error::DataCorrupted(path.clone(), Corruption::InvalidUtf8))?,
                _ => return Err(Error::DataCorrupted(path.clone(), Corruption::NonStringKey)),
            };
            if !entries.iter().any(|(k, _)| k == key) {
                entries.push((key.to_string(), &pair[1]));
            }
        }
        Ok(Self { entries, path })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.iter().any(|(k, _)| k == key)
    }

    /// Keys in insertion order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    fn get(&self, key: &str) -> Option<&'a Item> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, item)| *item)
    }

    fn require(&self, key: &str) -> Result<&'a Item, Error> {
        self.get(key)
            .ok_or_else(|| Error::KeyNotFound(self.path.clone(), key.to_string()))
    }

    pub fn decode<T: FromCbor>(&self, key: &str) -> Result<T, Error> {
        Decoder::new(self.require(key)?, self.path.key(key)).decode()
    }

    /// Decode the key if present and non-null.
    pub fn decode_opt<T: FromCbor>(&self, key: &str) -> Result<Option<T>, Error> {
        match self.get(key) {
            None | Some(Item::Literal(Literal::Nil)) => Ok(None),
            Some(item) => Decoder::new(item, self.path.key(key)).decode().map(Some),
        }
    }

    pub fn decode_nil(&self, key: &str) -> Result<bool, Error> {
        Ok(matches!(self.require(key)?, Item::Literal(Literal::Nil)))
    }

    pub fn nested_keyed(&self, key: &str) -> Result<KeyedDecoder<'a>, Error> {
        KeyedDecoder::new(self.require(key)?, self.path.key(key))
    }

    pub fn nested_unkeyed(&self, key: &str) -> Result<UnkeyedDecoder<'a>, Error> {
        UnkeyedDecoder::new(self.require(key)?, self.path.key(key))
    }

    /// Decoder over the `"super"` slot; absent slots decode as an absent
    /// value rather than failing at the container.
    pub fn super_decoder(&self) -> Decoder<'a> {
        self.super_decoder_key(SUPER_KEY)
    }

    pub fn super_decoder_key(&self, key: &str) -> Decoder<'a> {
        Decoder::new(self.get(key).unwrap_or(&ABSENT), self.path.key(key))
    }
}

/// Unkeyed container: a cursor over a scanned array.
pub struct UnkeyedDecoder<'a> {
    items: Vec<&'a Item>,
    index: usize,
    path: Path,
}

impl<'a> UnkeyedDecoder<'a> {
    fn new(item: &'a Item, path: Path) -> Result<Self, Error> {
        let items = match item {
            Item::Array(items) => items.iter().collect(),
            /* a map reads as its flat key,value,key,value sequence */
            Item::Map(kv) => kv.iter().collect(),
            Item::None => Vec::new(),
            _ => return Err(Error::TypeMismatch(path, "array", type_name(item))),
        };
        Ok(Self {
            items,
            index: 0,
            path,
        })
    }

    pub fn count(&self) -> usize {
        self.items.len()
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn is_at_end(&self) -> bool {
        self.index >= self.items.len()
    }

    fn peek(&self) -> Result<&'a Item, Error> {
        self.items
            .get(self.index)
            .copied()
            .ok_or_else(|| Error::ValueNotFound(self.path.index(self.index)))
    }

    /// Decode the next element; the cursor advances only on success.
    pub fn decode<T: FromCbor>(&mut self) -> Result<T, Error> {
        let value = Decoder::new(self.peek()?, self.path.index(self.index)).decode()?;
        self.index += 1;
        Ok(value)
    }

    /// Whether the next element is null; consumes it only if it is.
    pub fn decode_nil(&mut self) -> Result<bool, Error> {
        if matches!(self.peek()?, Item::Literal(Literal::Nil)) {
            self.index += 1;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    pub fn nested_keyed(&mut self) -> Result<KeyedDecoder<'a>, Error> {
        let keyed = KeyedDecoder::new(self.peek()?, self.path.index(self.index))?;
        self.index += 1;
        Ok(keyed)
    }

    pub fn nested_unkeyed(&mut self) -> Result<UnkeyedDecoder<'a>, Error> {
        let unkeyed = UnkeyedDecoder::new(self.peek()?, self.path.index(self.index))?;
        self.index += 1;
        Ok(unkeyed)
    }

    /// Single-value decoder over the next element.
    pub fn super_decoder(&mut self) -> Result<Decoder<'a>, Error> {
        let decoder = Decoder::new(self.peek()?, self.path.index(self.index));
        self.index += 1;
        Ok(decoder)
    }
}

impl FromCbor for bool {
    fn from_cbor(decoder: &Decoder<'_>) -> Result<Self, Error> {
        match decoder.item {
            Item::Literal(Literal::Bool(b)) => Ok(*b),
            _ => Err(decoder.mismatch("boolean")),
        }
    }
}

impl FromCbor for u64 {
    fn from_cbor(decoder: &Decoder<'_>) -> Result<Self, Error> {
        decoder.uint()
    }
}

impl FromCbor for usize {
    fn from_cbor(decoder: &Decoder<'_>) -> Result<Self, Error> {
        Ok(decoder.uint()? as usize)
    }
}

impl FromCbor for u32 {
    fn from_cbor(decoder: &Decoder<'_>) -> Result<Self, Error> {
        Ok(decoder.uint()? as u32)
    }
}

impl FromCbor for u16 {
    fn from_cbor(decoder: &Decoder<'_>) -> Result<Self, Error> {
        Ok(decoder.uint()? as u16)
    }
}

impl FromCbor for u8 {
    fn from_cbor(decoder: &Decoder<'_>) -> Result<Self, Error> {
        Ok(decoder.uint()? as u8)
    }
}

impl FromCbor for i64 {
    fn from_cbor(decoder: &Decoder<'_>) -> Result<Self, Error> {
        let (argument, negative) = decoder.int_argument()?;
        Ok(if negative {
            !argument as i64
        } else {
            argument as i64
        })
    }
}

impl FromCbor for isize {
    fn from_cbor(decoder: &Decoder<'_>) -> Result<Self, Error> {
        let (argument, negative) = decoder.int_argument()?;
        Ok(if negative {
            !(argument as usize) as isize
        } else {
            argument as isize
        })
    }
}

impl FromCbor for i32 {
    fn from_cbor(decoder: &Decoder<'_>) -> Result<Self, Error> {
        let (argument, negative) = decoder.int_argument()?;
        Ok(if negative {
            !(argument as u32) as i32
        } else {
            argument as i32
        })
    }
}

impl FromCbor for i16 {
    fn from_cbor(decoder: &Decoder<'_>) -> Result<Self, Error> {
        let (argument, negative) = decoder.int_argument()?;
        Ok(if negative {
            !(argument as u16) as i16
        } else {
            argument as i16
        })
    }
}

impl FromCbor for i8 {
    fn from_cbor(decoder: &Decoder<'_>) -> Result<Self, Error> {
        let (argument, negative) = decoder.int_argument()?;
        Ok(if negative {
            !(argument as u8) as i8
        } else {
            argument as i8
        })
    }
}

impl FromCbor for f64 {
    fn from_cbor(decoder: &Decoder<'_>) -> Result<Self, Error> {
        match decoder.item {
            Item::Literal(Literal::Float16(bytes)) => Ok(half::f16::from_be_bytes(*bytes).to_f64()),
            Item::Literal(Literal::Float32(bytes)) => Ok(f32::from_be_bytes(*bytes) as f64),
            Item::Literal(Literal::Float64(bytes)) => Ok(f64::from_be_bytes(*bytes)),
            _ => Err(decoder.mismatch("float")),
        }
    }
}

impl FromCbor for f32 {
    fn from_cbor(decoder: &Decoder<'_>) -> Result<Self, Error> {
        match decoder.item {
            Item::Literal(Literal::Float16(bytes)) => Ok(half::f16::from_be_bytes(*bytes).to_f32()),
            Item::Literal(Literal::Float32(bytes)) => Ok(f32::from_be_bytes(*bytes)),
            Item::Literal(Literal::Float64(bytes)) => Ok(f64::from_be_bytes(*bytes) as f32),
            _ => Err(decoder.mismatch("float")),
        }
    }
}

impl FromCbor for half::f16 {
    fn from_cbor(decoder: &Decoder<'_>) -> Result<Self, Error> {
        match decoder.item {
            Item::Literal(Literal::Float16(bytes)) => Ok(half::f16::from_be_bytes(*bytes)),
            Item::Literal(Literal::Float32(bytes)) => {
                Ok(half::f16::from_f32(f32::from_be_bytes(*bytes)))
            }
            Item::Literal(Literal::Float64(bytes)) => {
                Ok(half::f16::from_f64(f64::from_be_bytes(*bytes)))
            }
            _ => Err(decoder.mismatch("float")),
        }
    }
}

impl FromCbor for String {
    fn from_cbor(decoder: &Decoder<'_>) -> Result<Self, Error> {
        Ok(decoder.text()?.to_string())
    }
}

impl FromCbor for crate::Bytes {
    fn from_cbor(decoder: &Decoder<'_>) -> Result<Self, Error> {
        match decoder.item {
            Item::Literal(Literal::Bin(bytes)) => Ok(crate::Bytes(bytes.clone())),
            _ => Err(decoder.mismatch("byte string")),
        }
    }
}

impl<T: FromCbor> FromCbor for Option<T> {
    fn from_cbor(decoder: &Decoder<'_>) -> Result<Self, Error> {
        match decoder.item {
            Item::None | Item::Literal(Literal::Nil) => Ok(None),
            _ => Ok(Some(decoder.decode()?)),
        }
    }
}

impl<T: FromCbor> FromCbor for Vec<T> {
    fn from_cbor(decoder: &Decoder<'_>) -> Result<Self, Error> {
        /* sequences require an array up front, before element decoding */
        let Item::Array(items) = decoder.item else {
            return Err(decoder.mismatch("array"));
        };
        let mut out = Vec::with_capacity(items.len());
        for (i, item) in items.iter().enumerate() {
            out.push(Decoder::new(item, decoder.path.index(i)).decode()?);
        }
        Ok(out)
    }
}

impl<V: FromCbor> FromCbor for alloc::collections::BTreeMap<String, V> {
    fn from_cbor(decoder: &Decoder<'_>) -> Result<Self, Error> {
        let keyed = decoder.keyed()?;
        let mut out = Self::new();
        for key in keyed.keys() {
            out.insert(key.to_string(), keyed.decode(key)?);
        }
        Ok(out)
    }
}

#[cfg(feature = "std")]
impl<V: FromCbor> FromCbor for std::collections::HashMap<String, V> {
    fn from_cbor(decoder: &Decoder<'_>) -> Result<Self, Error> {
        let keyed = decoder.keyed()?;
        let mut out = Self::new();
        for key in keyed.keys() {
            out.insert(key.to_string(), keyed.decode(key)?);
        }
        Ok(out)
    }
}
