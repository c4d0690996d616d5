//! Byte-level scanner: parses the CBOR prefix-encoding into a typed tree of
//! items, handling definite and indefinite-length forms, tags, and the
//! float/simple-value overlay on major type 7.

use crate::opcode::{Opcode, AI_INDEFINITE};
use alloc::{boxed::Box, string::String, vec, vec::Vec};
use thiserror::Error;

/// Container/tag nesting beyond this depth is rejected rather than risking
/// the call stack.
pub(crate) const MAX_DEPTH: usize = 128;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum Error {
    #[error("Not enough data for encoded value")]
    NotEnoughData,

    #[error("Invalid additional-information value {0}")]
    InvalidAdditionalInfo(u8),

    #[error("Invalid simple value {0}")]
    InvalidSimpleValue(u8),

    #[error("Chunked string contains an invalid chunk")]
    InvalidChunk,

    #[error("Break outside an indefinite-length container")]
    UnexpectedBreak,

    #[error("Map has key but no value")]
    PartialMap,

    #[error("Tag with no following value")]
    JustTag,

    #[error("Maximum recursion depth reached")]
    MaxRecursion,
}

/// A scanned leaf. Integer payloads hold the argument bytes big-endian
/// exactly as found on the wire (inline arguments as a single byte), so the
/// recorded width is `bytes.len()` and is one of 1, 2, 4 or 8.
#[derive(Clone, PartialEq)]
pub enum Literal {
    Nil,
    Break,
    Bool(bool),
    UInt(Vec<u8>),
    NInt(Vec<u8>),
    Float16([u8; 2]),
    Float32([u8; 4]),
    Float64([u8; 8]),
    Str(Vec<u8>),
    Bin(Vec<u8>),
}

/// One scanned CBOR item.
///
/// `Map` holds a flat `k,v,k,v` sequence of even length. `Break` appears
/// only transiently while scanning an indefinite-length container; a
/// finalized tree returned by [`Scanner::scan`] never contains it.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Item {
    /// End of input, or an absent value.
    #[default]
    None,
    Literal(Literal),
    Array(Vec<Item>),
    Map(Vec<Item>),
    Tagged(u64, Box<Item>),
}

pub(crate) fn uint_from_be(bytes: &[u8]) -> u64 {
    bytes.iter().fold(0u64, |acc, b| (acc << 8) | *b as u64)
}

impl core::fmt::Debug for Literal {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Literal::Nil => f.write_str("null"),
            Literal::Break => f.write_str("break"),
            Literal::Bool(b) => write!(f, "{b:?}"),
            Literal::UInt(b) => write!(f, "{}", uint_from_be(b)),
            Literal::NInt(b) => write!(f, "{}", -1i128 - uint_from_be(b) as i128),
            Literal::Float16(b) => write!(f, "{:?}", half::f16::from_be_bytes(*b)),
            Literal::Float32(b) => write!(f, "{:?}", f32::from_be_bytes(*b)),
            Literal::Float64(b) => write!(f, "{:?}", f64::from_be_bytes(*b)),
            Literal::Str(b) => write!(f, "{:?}", String::from_utf8_lossy(b)),
            Literal::Bin(b) => write!(f, "{b:02x?}"),
        }
    }
}

/// Single cursor over an in-memory byte sequence; each call to
/// [`scan`](Scanner::scan) consumes one complete item.
pub struct Scanner<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> Scanner<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, offset: 0 }
    }

    /// The number of bytes consumed so far.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Scan the next item. Returns [`Item::None`] at end of input.
    pub fn scan(&mut self) -> Result<Item, Error> {
        match self.scan_item(MAX_DEPTH)? {
            Some(Item::Literal(Literal::Break)) => Err(Error::UnexpectedBreak),
            Some(item) => Ok(item),
            None => Ok(Item::None),
        }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], Error> {
        if self.data.len() - self.offset < n {
            return Err(Error::NotEnoughData);
        }
        let slice = &self.data[self.offset..self.offset + n];
        self.offset += n;
        Ok(slice)
    }

    /// Argument bytes for an integer item: the wire bytes themselves, with
    /// inline arguments normalized to a single byte.
    fn argument_bytes(&mut self, ai: u8) -> Result<Vec<u8>, Error> {
        match Opcode::argument_len(ai) {
            Some(n) => Ok(self.take(n)?.to_vec()),
            None if ai < 24 => Ok(vec![ai]),
            None => Err(Error::InvalidAdditionalInfo(ai)),
        }
    }

    /// Argument as a number, for lengths and tag numbers.
    fn argument_u64(&mut self, ai: u8) -> Result<u64, Error> {
        match Opcode::argument_len(ai) {
            Some(n) => Ok(uint_from_be(self.take(n)?)),
            None if ai < 24 => Ok(ai as u64),
            None => Err(Error::InvalidAdditionalInfo(ai)),
        }
    }

    fn definite_payload(&mut self, ai: u8) -> Result<Vec<u8>, Error> {
        let len = self.argument_u64(ai)?;
        let len = usize::try_from(len).map_err(|_| Error::NotEnoughData)?;
        Ok(self.take(len)?.to_vec())
    }

    /// Chunks of an indefinite-length string: proper definite-length items
    /// of the same major type, terminated by a break at the top level only.
    /// A `0xFF` byte inside a chunk payload is data, not a terminator.
    fn chunked_payload(&mut self, major: u8) -> Result<Vec<u8>, Error> {
        let mut payload = Vec::new();
        loop {
            let (chunk_major, ai) = match Opcode::read(self.data, self.offset) {
                Opcode::End => return Err(Error::NotEnoughData),
                Opcode::Float(AI_INDEFINITE) => {
                    self.offset += 1;
                    return Ok(payload);
                }
                Opcode::Bin(ai) => (2, ai),
                Opcode::Str(ai) => (3, ai),
                _ => return Err(Error::InvalidChunk),
            };
            if chunk_major != major || ai == AI_INDEFINITE {
                return Err(Error::InvalidChunk);
            }
            self.offset += 1;
            payload.extend_from_slice(&self.definite_payload(ai)?);
        }
    }

    /// Scan one item, `Ok(None)` at end of input. A break is returned as
    /// `Literal::Break` for the enclosing container to interpret.
    fn scan_item(&mut self, depth: usize) -> Result<Option<Item>, Error> {
        let opcode = Opcode::read(self.data, self.offset);
        if opcode == Opcode::End {
            return Ok(None);
        }
        self.offset += 1;

        match opcode {
            Opcode::End => unreachable!(),
            Opcode::UInt(ai) => Ok(Some(Item::Literal(Literal::UInt(self.argument_bytes(ai)?)))),
            Opcode::NInt(ai) => Ok(Some(Item::Literal(Literal::NInt(self.argument_bytes(ai)?)))),
            Opcode::Bin(AI_INDEFINITE) => {
                Ok(Some(Item::Literal(Literal::Bin(self.chunked_payload(2)?))))
            }
            Opcode::Bin(ai) => Ok(Some(Item::Literal(Literal::Bin(self.definite_payload(ai)?)))),
            Opcode::Str(AI_INDEFINITE) => {
                Ok(Some(Item::Literal(Literal::Str(self.chunked_payload(3)?))))
            }
            Opcode::Str(ai) => Ok(Some(Item::Literal(Literal::Str(self.definite_payload(ai)?)))),
            Opcode::Array(ai) => self.scan_array(ai, depth).map(Some),
            Opcode::Map(ai) => self.scan_map(ai, depth).map(Some),
            Opcode::Tagged(ai) => {
                if depth == 0 {
                    return Err(Error::MaxRecursion);
                }
                let tag = self.argument_u64(ai)?;
                match self.scan_item(depth - 1)? {
                    None => Err(Error::JustTag),
                    Some(Item::Literal(Literal::Break)) => Err(Error::UnexpectedBreak),
                    Some(value) => Ok(Some(Item::Tagged(tag, Box::new(value)))),
                }
            }
            Opcode::Float(ai) => self.scan_simple(ai).map(Some),
        }
    }

    fn scan_array(&mut self, ai: u8, depth: usize) -> Result<Item, Error> {
        if depth == 0 {
            return Err(Error::MaxRecursion);
        }
        let mut items = Vec::new();
        if ai == AI_INDEFINITE {
            loop {
                match self.scan_item(depth - 1)? {
                    None => return Err(Error::NotEnoughData),
                    Some(Item::Literal(Literal::Break)) => break,
                    Some(item) => items.push(item),
                }
            }
        } else {
            let count = self.argument_u64(ai)?;
            for _ in 0..count {
                match self.scan_item(depth - 1)? {
                    None => return Err(Error::NotEnoughData),
                    Some(Item::Literal(Literal::Break)) => return Err(Error::UnexpectedBreak),
                    Some(item) => items.push(item),
                }
            }
        }
        Ok(Item::Array(items))
    }

    fn scan_map(&mut self, ai: u8, depth: usize) -> Result<Item, Error> {
        if depth == 0 {
            return Err(Error::MaxRecursion);
        }
        let mut items = Vec::new();
        if ai == AI_INDEFINITE {
            loop {
                /* A break terminates the map in key position only */
                match self.scan_item(depth - 1)? {
                    None => return Err(Error::NotEnoughData),
                    Some(Item::Literal(Literal::Break)) => break,
                    Some(key) => items.push(key),
                }
                match self.scan_item(depth - 1)? {
                    None => return Err(Error::NotEnoughData),
                    Some(Item::Literal(Literal::Break)) => return Err(Error::PartialMap),
                    Some(value) => items.push(value),
                }
            }
        } else {
            let count = self.argument_u64(ai)?;
            for _ in 0..count.saturating_mul(2) {
                match self.scan_item(depth - 1)? {
                    None => return Err(Error::NotEnoughData),
                    Some(Item::Literal(Literal::Break)) => return Err(Error::UnexpectedBreak),
                    Some(item) => items.push(item),
                }
            }
        }
        Ok(Item::Map(items))
    }

    fn scan_simple(&mut self, ai: u8) -> Result<Item, Error> {
        match ai {
            20 => Ok(Item::Literal(Literal::Bool(false))),
            21 => Ok(Item::Literal(Literal::Bool(true))),
            22 | 23 => Ok(Item::Literal(Literal::Nil)),
            /* Unassigned simple values decode as unsigned integers */
            0..=19 => Ok(Item::Literal(Literal::UInt(vec![ai]))),
            24 => {
                let v = self.take(1)?[0];
                if v < 32 {
                    return Err(Error::InvalidSimpleValue(v));
                }
                Ok(Item::Literal(Literal::UInt(vec![v])))
            }
            25 => Ok(Item::Literal(Literal::Float16(
                self.take(2)?.try_into().unwrap(),
            ))),
            26 => Ok(Item::Literal(Literal::Float32(
                self.take(4)?.try_into().unwrap(),
            ))),
            27 => Ok(Item::Literal(Literal::Float64(
                self.take(8)?.try_into().unwrap(),
            ))),
            AI_INDEFINITE => Ok(Item::Literal(Literal::Break)),
            _ => Err(Error::InvalidAdditionalInfo(ai)),
        }
    }
}
