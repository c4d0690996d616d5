/*!
Structured encoding and decoding of Rust values to and from CBOR
([RFC 8949](https://www.rfc-editor.org/rfc/rfc8949.html)).

Values implement [`encode::ToCbor`] and [`decode::FromCbor`] by picking one
of three container shapes per value: a single value, a keyed container
(a CBOR map with text-string keys, insertion order preserved) or an unkeyed
container (a CBOR array). Types may declare a CBOR tag number; tagged
values are wrapped in major type 6 on the wire.

All eight major types are read, in both definite and indefinite-length
forms; output is always definite-length with minimal-width integer and
length encodings.

# Example

```rust
use structured_cbor::{decode, encode};

#[derive(Debug, PartialEq)]
struct Position {
    lat: f64,
    lon: f64,
    label: Option<String>,
}

impl encode::ToCbor for Position {
    fn to_cbor(&self, encoder: &mut encode::Encoder) -> Result<(), encode::Error> {
        encoder.emit_map(|m| {
            m.emit("lat", &self.lat)?;
            m.emit("lon", &self.lon)?;
            m.emit("label", &self.label)
        })
    }
}

impl decode::FromCbor for Position {
    fn from_cbor(decoder: &decode::Decoder<'_>) -> Result<Self, decode::Error> {
        let m = decoder.keyed()?;
        Ok(Position {
            lat: m.decode("lat")?,
            lon: m.decode("lon")?,
            label: m.decode_opt("label")?,
        })
    }
}

let position = Position {
    lat: 51.5,
    lon: -0.1,
    label: None,
};
let bytes = encode::emit(&position).unwrap();
assert_eq!(decode::parse::<Position>(&bytes).unwrap(), position);
```

# `no_std` Support

This crate is `no_std` compatible with only a heap allocator required. The
default **`std`** feature propagates `std` to dependencies and enables the
`ToCbor`/`FromCbor` implementations for `std::collections::HashMap`; without
it, `alloc::collections::BTreeMap` remains available for string-keyed maps.
*/
#![cfg_attr(not(feature = "std"), no_std)]
extern crate alloc;

use alloc::vec::Vec;

pub mod decode;
pub mod encode;
pub mod path;
pub mod scan;

mod opcode;

#[cfg(test)]
mod decode_tests;



/// A CBOR byte string (major type 2).
///
/// `Vec<u8>` encodes as an array of small integers; wrap it in `Bytes` for
/// the compact byte-string representation.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Bytes(pub Vec<u8>);

impl From<Vec<u8>> for Bytes {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

impl From<&[u8]> for Bytes {
    fn from(bytes: &[u8]) -> Self {
        Self(bytes.to_vec())
    }
}

impl AsRef<[u8]> for Bytes {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}
