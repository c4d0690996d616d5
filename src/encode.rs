//! Encoding bridge: user [`ToCbor`] callbacks build an intermediate tree of
//! already-serialized leaves, which a depth-first writer flattens to bytes.
//!
//! Containers are closure-scoped: `emit_map(|m| ...)` hands out a keyed
//! container that is flattened into its parent when the closure returns.
//! Only definite-length, minimal-width forms are produced.

use crate::path::{Path, SUPER_KEY};
use alloc::{
    boxed::Box,
    string::{String, ToString},
    vec,
    vec::Vec,
};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("No value was encoded at {0}")]
    NoValue(Path),

    #[error("Invalid value at {0}: {1}")]
    InvalidValue(Path, String),
}

impl Error {
    pub fn path(&self) -> &Path {
        match self {
            Error::NoValue(path) | Error::InvalidValue(path, _) => path,
        }
    }
}

/// An encoded CBOR value. Leaves are fully serialized (head + payload);
/// container heads are chosen by the writer once their final length is
/// known. `Map` holds a flat `k,v,k,v` sequence of even length.
#[derive(Debug, Clone, PartialEq, Default)]
pub(crate) enum Item {
    /// Absent: nothing was encoded.
    #[default]
    None,
    Literal(Vec<u8>),
    Array(Vec<Item>),
    Map(Vec<Item>),
    Tagged(Vec<u8>, Box<Item>),
}

/// Emit a head byte with the smallest encoding of `val`: inline for
/// `val <= 23`, otherwise a 1/2/4/8-byte big-endian argument.
pub(crate) fn uint_head(out: &mut Vec<u8>, major: u8, val: u64) {
    if val < 24 {
        out.push((major << 5) | val as u8);
    } else if val <= u8::MAX as u64 {
        out.push((major << 5) | 24);
        out.push(val as u8);
    } else if val <= u16::MAX as u64 {
        out.push((major << 5) | 25);
        out.extend((val as u16).to_be_bytes());
    } else if val <= u32::MAX as u64 {
        out.push((major << 5) | 26);
        out.extend((val as u32).to_be_bytes());
    } else {
        out.push((major << 5) | 27);
        out.extend(val.to_be_bytes());
    }
}

fn uint_literal(major: u8, val: u64) -> Item {
    let mut bytes = Vec::new();
    uint_head(&mut bytes, major, val);
    Item::Literal(bytes)
}

fn simple(byte: u8) -> Item {
    Item::Literal(vec![byte])
}

fn str_literal(s: &str) -> Item {
    let mut bytes = Vec::with_capacity(1 + s.len());
    uint_head(&mut bytes, 3, s.len() as u64);
    bytes.extend_from_slice(s.as_bytes());
    Item::Literal(bytes)
}

fn bytes_literal(b: &[u8]) -> Item {
    let mut bytes = Vec::with_capacity(1 + b.len());
    uint_head(&mut bytes, 2, b.len() as u64);
    bytes.extend_from_slice(b);
    Item::Literal(bytes)
}

fn tag_head(tag: u64) -> Vec<u8> {
    let mut bytes = Vec::new();
    uint_head(&mut bytes, 6, tag);
    bytes
}

impl Item {
    pub(crate) fn write(&self, out: &mut Vec<u8>) {
        match self {
            Item::None => {}
            Item::Literal(bytes) => out.extend_from_slice(bytes),
            Item::Tagged(tag, value) => {
                out.extend_from_slice(tag);
                value.write(out);
            }
            Item::Array(items) => {
                uint_head(out, 4, items.len() as u64);
                for item in items {
                    item.write(out);
                }
            }
            Item::Map(items) => {
                uint_head(out, 5, (items.len() / 2) as u64);
                for item in items {
                    item.write(out);
                }
            }
        }
    }
}

/// A value that can emit itself into an encoder context.
///
/// Implementations pick one container shape: a single value
/// ([`Encoder::emit`]), a keyed container ([`Encoder::emit_map`]) or an
/// unkeyed container ([`Encoder::emit_array`]). A type with
/// `TAG = Some(n)` is wrapped in CBOR tag `n` wherever it is emitted.
pub trait ToCbor {
    const TAG: Option<u64> = None;

    fn to_cbor(&self, encoder: &mut Encoder) -> Result<(), Error>;
}

fn encode_value<T: ToCbor + ?Sized>(value: &T, path: Path) -> Result<Item, Error> {
    let mut sub = Encoder::new(path);
    value.to_cbor(&mut sub)?;
    let (item, path) = sub.finish();
    if matches!(item, Item::None) {
        return Err(Error::NoValue(path));
    }
    Ok(match T::TAG {
        Some(tag) => Item::Tagged(tag_head(tag), Box::new(item)),
        None => item,
    })
}

/// Sink for a single value, handed to [`ToCbor::to_cbor`]. Encoding more
/// than one value into it is a programmer error and panics.
pub struct Encoder {
    slot: Item,
    path: Path,
}

impl Encoder {
    fn new(path: Path) -> Self {
        Self {
            slot: Item::None,
            path,
        }
    }

    fn finish(self) -> (Item, Path) {
        (self.slot, self.path)
    }

    fn set(&mut self, item: Item) {
        if !matches!(self.slot, Item::None) {
            panic!("value already encoded into single-value context at {}", self.path);
        }
        self.slot = item;
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn emit<T: ToCbor + ?Sized>(&mut self, value: &T) -> Result<(), Error> {
        let item = encode_value(value, self.path.clone())?;
        self.set(item);
        Ok(())
    }

    pub fn emit_null(&mut self) {
        self.set(simple(0xF6));
    }

    pub fn emit_array<F>(&mut self, f: F) -> Result<(), Error>
    where
        F: FnOnce(&mut ArrayEncoder) -> Result<(), Error>,
    {
        let mut a = ArrayEncoder::new(self.path.clone());
        f(&mut a)?;
        self.set(Item::Array(a.items));
        Ok(())
    }

    pub fn emit_map<F>(&mut self, f: F) -> Result<(), Error>
    where
        F: FnOnce(&mut MapEncoder) -> Result<(), Error>,
    {
        let mut m = MapEncoder::new(self.path.clone());
        f(&mut m)?;
        let map = m.finish();
        self.set(map);
        Ok(())
    }
}

/// Unkeyed container: an ordered sequence of encoded elements.
pub struct ArrayEncoder {
    items: Vec<Item>,
    path: Path,
}

impl ArrayEncoder {
    fn new(path: Path) -> Self {
        Self {
            items: Vec::new(),
            path,
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn emit<T: ToCbor + ?Sized>(&mut self, value: &T) -> Result<(), Error> {
        let item = encode_value(value, self.path.index(self.items.len()))?;
        self.items.push(item);
        Ok(())
    }

    pub fn emit_null(&mut self) {
        self.items.push(simple(0xF6));
    }

    pub fn emit_array<F>(&mut self, f: F) -> Result<(), Error>
    where
        F: FnOnce(&mut ArrayEncoder) -> Result<(), Error>,
    {
        let mut a = ArrayEncoder::new(self.path.index(self.items.len()));
        f(&mut a)?;
        self.items.push(Item::Array(a.items));
        Ok(())
    }

    pub fn emit_map<F>(&mut self, f: F) -> Result<(), Error>
    where
        F: FnOnce(&mut MapEncoder) -> Result<(), Error>,
    {
        let mut m = MapEncoder::new(self.path.index(self.items.len()));
        f(&mut m)?;
        let map = m.finish();
        self.items.push(map);
        Ok(())
    }

    /// Append the payload of a nested single-value encoder, for encoding a
    /// parent record inline in a sequence.
    pub fn super_encoder<F>(&mut self, f: F) -> Result<(), Error>
    where
        F: FnOnce(&mut Encoder) -> Result<(), Error>,
    {
        let mut sub = Encoder::new(self.path.index(self.items.len()));
        f(&mut sub)?;
        let (item, path) = sub.finish();
        if matches!(item, Item::None) {
            return Err(Error::NoValue(path));
        }
        self.items.push(item);
        Ok(())
    }
}

/// What a map key is currently bound to. Re-binding follows the slot's
/// kind: a plain value may be replaced by anything, a container only by a
/// value or the same container kind, and a sub-encoder slot is final.
enum Slot {
    Value(Item),
    Array(Item),
    Map(Item),
    Sub(Item),
}

impl Slot {
    fn into_item(self) -> Item {
        match self {
            Slot::Value(item) | Slot::Array(item) | Slot::Map(item) | Slot::Sub(item) => item,
        }
    }
}

/// Keyed container: map keys are text strings, recorded in first-insertion
/// order. Overwriting a key's value updates the payload but not the order.
pub struct MapEncoder {
    entries: Vec<(String, Slot)>,
    path: Path,
}

impl MapEncoder {
    fn new(path: Path) -> Self {
        Self {
            entries: Vec::new(),
            path,
        }
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

    fn set_slot(&mut self, key: &str, slot: Slot) {
        let Some(idx) = self.entries.iter().position(|(k, _)| k == key) else {
            self.entries.push((key.to_string(), slot));
            return;
        };
        let existing = &mut self.entries[idx].1;
        let permitted = matches!(
            (&*existing, &slot),
            (Slot::Value(_), _)
                | (Slot::Array(_), Slot::Value(_) | Slot::Array(_))
                | (Slot::Map(_), Slot::Value(_) | Slot::Map(_))
        );
        if !permitted {
            panic!(
                "key {key:?} at {} is already bound to an incompatible container",
                self.path
            );
        }
        *existing = slot;
    }

    pub fn emit<T: ToCbor + ?Sized>(&mut self, key: &str, value: &T) -> Result<(), Error> {
        let item = encode_value(value, self.path.key(key))?;
        self.set_slot(key, Slot::Value(item));
        Ok(())
    }

    pub fn emit_null(&mut self, key: &str) {
        self.set_slot(key, Slot::Value(simple(0xF6)));
    }

    pub fn emit_array<F>(&mut self, key: &str, f: F) -> Result<(), Error>
    where
        F: FnOnce(&mut ArrayEncoder) -> Result<(), Error>,
    {
        let mut a = ArrayEncoder::new(self.path.key(key));
        f(&mut a)?;
        self.set_slot(key, Slot::Array(Item::Array(a.items)));
        Ok(())
    }

    pub fn emit_map<F>(&mut self, key: &str, f: F) -> Result<(), Error>
    where
        F: FnOnce(&mut MapEncoder) -> Result<(), Error>,
    {
        let mut m = MapEncoder::new(self.path.key(key));
        f(&mut m)?;
        let map = m.finish();
        self.set_slot(key, Slot::Map(map));
        Ok(())
    }

    /// Allocate the `"super"` slot and run `f` against a fresh sub-encoder;
    /// the harvested payload becomes the map's value for that key.
    pub fn super_encoder<F>(&mut self, f: F) -> Result<(), Error>
    where
        F: FnOnce(&mut Encoder) -> Result<(), Error>,
    {
        self.super_encoder_key(SUPER_KEY, f)
    }

    pub fn super_encoder_key<F>(&mut self, key: &str, f: F) -> Result<(), Error>
    where
        F: FnOnce(&mut Encoder) -> Result<(), Error>,
    {
        let mut sub = Encoder::new(self.path.key(key));
        f(&mut sub)?;
        let (item, path) = sub.finish();
        if matches!(item, Item::None) {
            return Err(Error::NoValue(path));
        }
        self.set_slot(key, Slot::Sub(item));
        Ok(())
    }

    fn finish(self) -> Item {
        let mut items = Vec::with_capacity(self.entries.len() * 2);
        for (key, slot) in self.entries {
            items.push(str_literal(&key));
            items.push(slot.into_item());
        }
        Item::Map(items)
    }
}

/// Encode a single value to CBOR bytes.
pub fn emit<T: ToCbor + ?Sized>(value: &T) -> Result<Vec<u8>, Error> {
    let item = encode_value(value, Path::root())?;
    let mut out = Vec::new();
    item.write(&mut out);
    Ok(out)
}

impl ToCbor for bool {
    fn to_cbor(&self, encoder: &mut Encoder) -> Result<(), Error> {
        encoder.set(simple(if *self { 0xF5 } else { 0xF4 }));
        Ok(())
    }
}

impl ToCbor for u64 {
    fn to_cbor(&self, encoder: &mut Encoder) -> Result<(), Error> {
        encoder.set(uint_literal(0, *self));
        Ok(())
    }
}

impl ToCbor for usize {
    fn to_cbor(&self, encoder: &mut Encoder) -> Result<(), Error> {
        encoder.set(uint_literal(0, *self as u64));
        Ok(())
    }
}

impl ToCbor for u32 {
    fn to_cbor(&self, encoder: &mut Encoder) -> Result<(), Error> {
        encoder.set(uint_literal(0, *self as u64));
        Ok(())
    }
}

impl ToCbor for u16 {
    fn to_cbor(&self, encoder: &mut Encoder) -> Result<(), Error> {
        encoder.set(uint_literal(0, *self as u64));
        Ok(())
    }
}

impl ToCbor for u8 {
    fn to_cbor(&self, encoder: &mut Encoder) -> Result<(), Error> {
        encoder.set(uint_literal(0, *self as u64));
        Ok(())
    }
}

fn int_literal(val: i64) -> Item {
    if val >= 0 {
        uint_literal(0, val as u64)
    } else {
        /* major type 1 argument is the bitwise complement, -1 - val */
        uint_literal(1, !val as u64)
    }
}

impl ToCbor for i64 {
    fn to_cbor(&self, encoder: &mut Encoder) -> Result<(), Error> {
        encoder.set(int_literal(*self));
        Ok(())
    }
}

impl ToCbor for isize {
    fn to_cbor(&self, encoder: &mut Encoder) -> Result<(), Error> {
        encoder.set(int_literal(*self as i64));
        Ok(())
    }
}

impl ToCbor for i32 {
    fn to_cbor(&self, encoder: &mut Encoder) -> Result<(), Error> {
        encoder.set(int_literal(*self as i64));
        Ok(())
    }
}

impl ToCbor for i16 {
    fn to_cbor(&self, encoder: &mut Encoder) -> Result<(), Error> {
        encoder.set(int_literal(*self as i64));
        Ok(())
    }
}

impl ToCbor for i8 {
    fn to_cbor(&self, encoder: &mut Encoder) -> Result<(), Error> {
        encoder.set(int_literal(*self as i64));
        Ok(())
    }
}

impl ToCbor for half::f16 {
    fn to_cbor(&self, encoder: &mut Encoder) -> Result<(), Error> {
        let mut bytes = vec![(7 << 5) | 25];
        bytes.extend(self.to_be_bytes());
        encoder.set(Item::Literal(bytes));
        Ok(())
    }
}

impl ToCbor for f32 {
    fn to_cbor(&self, encoder: &mut Encoder) -> Result<(), Error> {
        let mut bytes = vec![(7 << 5) | 26];
        bytes.extend(self.to_be_bytes());
        encoder.set(Item::Literal(bytes));
        Ok(())
    }
}

impl ToCbor for f64 {
    fn to_cbor(&self, encoder: &mut Encoder) -> Result<(), Error> {
        let mut bytes = vec![(7 << 5) | 27];
        bytes.extend(self.to_be_bytes());
        encoder.set(Item::Literal(bytes));
        Ok(())
    }
}

impl ToCbor for str {
    fn to_cbor(&self, encoder: &mut Encoder) -> Result<(), Error> {
        encoder.set(str_literal(self));
        Ok(())
    }
}

impl ToCbor for String {
    fn to_cbor(&self, encoder: &mut Encoder) -> Result<(), Error> {
        encoder.set(str_literal(self));
        Ok(())
    }
}

impl ToCbor for crate::Bytes {
    fn to_cbor(&self, encoder: &mut Encoder) -> Result<(), Error> {
        encoder.set(bytes_literal(&self.0));
        Ok(())
    }
}

impl<T: ToCbor> ToCbor for Option<T> {
    fn to_cbor(&self, encoder: &mut Encoder) -> Result<(), Error> {
        match self {
            Some(value) => encoder.emit(value),
            None => {
                encoder.emit_null();
                Ok(())
            }
        }
    }
}

impl<T: ToCbor> ToCbor for [T] {
    fn to_cbor(&self, encoder: &mut Encoder) -> Result<(), Error> {
        encoder.emit_array(|a| {
            for value in self {
                a.emit(value)?;
            }
            Ok(())
        })
    }
}

impl<T: ToCbor> ToCbor for Vec<T> {
    fn to_cbor(&self, encoder: &mut Encoder) -> Result<(), Error> {
        self.as_slice().to_cbor(encoder)
    }
}

impl<T: ToCbor, const N: usize> ToCbor for [T; N] {
    fn to_cbor(&self, encoder: &mut Encoder) -> Result<(), Error> {
        self.as_slice().to_cbor(encoder)
    }
}

impl<V: ToCbor> ToCbor for alloc::collections::BTreeMap<String, V> {
    fn to_cbor(&self, encoder: &mut Encoder) -> Result<(), Error> {
        encoder.emit_map(|m| {
            for (key, value) in self {
                m.emit(key, value)?;
            }
            Ok(())
        })
    }
}

#[cfg(feature = "std")]
impl<V: ToCbor> ToCbor for std::collections::HashMap<String, V> {
    fn to_cbor(&self, encoder: &mut Encoder) -> Result<(), Error> {
        encoder.emit_map(|m| {
            for (key, value) in self {
                m.emit(key, value)?;
            }
            Ok(())
        })
    }
}
