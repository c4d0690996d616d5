#![cfg(test)]
use super::decode::{parse, Corruption, Decoder, Error, FromCbor};
use super::scan;
use super::Bytes;
use hex_literal::hex;
use std::collections::BTreeMap;

fn test_simple<T>(expected: T, data: &[u8])
where
    T: FromCbor + PartialEq + std::fmt::Debug,
{
    assert_eq!(parse::<T>(data).unwrap(), expected);
}

#[test]
fn rfc_unsigned_integers() {
    // RFC 8949, Appendix A:
    // https://www.rfc-editor.org/rfc/rfc8949.html#section-appendix.a
    test_simple(0u64, &hex!("00"));
    test_simple(1u64, &hex!("01"));
    test_simple(10u64, &hex!("0a"));
    test_simple(23u64, &hex!("17"));
    test_simple(24u64, &hex!("1818"));
    test_simple(25u64, &hex!("1819"));
    test_simple(100u64, &hex!("1864"));
    test_simple(1000u64, &hex!("1903e8"));
    test_simple(1000000u64, &hex!("1a000f4240"));
    test_simple(1000000000000u64, &hex!("1b000000e8d4a51000"));
    test_simple(u64::MAX, &hex!("1bffffffffffffffff"));

    // Non-minimal widths are accepted on read
    test_simple(0u64, &hex!("1900"));
    test_simple(10u64, &hex!("1b000000000000000a"));
}

#[test]
fn rfc_negative_integers() {
    test_simple(-1i64, &hex!("20"));
    test_simple(-10i64, &hex!("29"));
    test_simple(-100i64, &hex!("3863"));
    test_simple(-1000i64, &hex!("3903e7"));
    test_simple(i64::MIN, &hex!("3b7fffffffffffffff"));

    test_simple(-1i8, &hex!("20"));
    test_simple(-100i16, &hex!("3863"));
    test_simple(-1000i32, &hex!("3903e7"));
    test_simple(i8::MIN, &hex!("387f"));
}

#[test]
fn integer_truncation() {
    // Narrowing keeps the low bits, two's complement
    test_simple(0xE8u8, &hex!("1903e8"));
    test_simple(0xFFu8, &hex!("19ffff"));
    test_simple(0xFFFFu16, &hex!("1a0001ffff"));
    // -256 truncated to 8 bits is the complement of 0xFF
    test_simple(0i8, &hex!("38ff"));
    test_simple(-256i16, &hex!("38ff"));
}

#[test]
fn unsigned_rejects_negative() {
    assert!(matches!(
        parse::<u8>(&hex!("20")),
        Err(Error::TypeMismatch(..))
    ));
    assert!(matches!(
        parse::<u64>(&hex!("3863")),
        Err(Error::TypeMismatch(..))
    ));
}

#[test]
fn rfc_simple_values() {
    test_simple(false, &hex!("f4"));
    test_simple(true, &hex!("f5"));
    test_simple(None::<String>, &hex!("f6"));
    // Undefined reads as null
    test_simple(None::<String>, &hex!("f7"));
    // Unassigned simple values read as unsigned integers
    test_simple(16u8, &hex!("f0"));
    test_simple(255u8, &hex!("f8ff"));

    assert!(matches!(
        parse::<bool>(&hex!("00")),
        Err(Error::TypeMismatch(..))
    ));
    assert!(matches!(
        parse::<u8>(&hex!("f81f")),
        Err(Error::DataCorrupted(..))
    ));
}

#[test]
fn rfc_floats() {
    test_simple(0.0f64, &hex!("f90000"));
    test_simple(-0.0f64, &hex!("f98000"));
    test_simple(1.0f64, &hex!("f93c00"));
    test_simple(1.1f64, &hex!("fb3ff199999999999a"));
    test_simple(1.5f64, &hex!("f93e00"));
    test_simple(65504.0f64, &hex!("f97bff"));
    test_simple(100000.0f32, &hex!("fa47c35000"));
    test_simple(-4.0f64, &hex!("f9c400"));
    test_simple(half::f16::INFINITY, &hex!("f97c00"));
    test_simple(half::f16::NEG_INFINITY, &hex!("f9fc00"));
    test_simple(half::f16::MAX, &hex!("f97bff"));

    // Width conversions toward the requested target
    test_simple(1.5f32, &hex!("f93e00"));
    test_simple(half::f16::from_f32(1.5), &hex!("fa3fc00000"));
    test_simple(0.25f32, &hex!("fb3fd0000000000000"));

    assert!(parse::<f64>(&hex!("fb7ff8000000000000")).unwrap().is_nan());
    assert!(parse::<f32>(&hex!("f97e00")).unwrap().is_nan());

    assert!(matches!(
        parse::<f64>(&hex!("01")),
        Err(Error::TypeMismatch(..))
    ));
}

#[test]
fn rfc_strings() {
    test_simple(String::new(), &hex!("60"));
    test_simple("a".to_string(), &hex!("6161"));
    test_simple("IETF".to_string(), &hex!("6449455446"));
    test_simple("\"\\".to_string(), &hex!("62225c"));
    test_simple("\u{00fc}".to_string(), &hex!("62c3bc"));
    test_simple("\u{6c34}".to_string(), &hex!("63e6b0b4"));
    test_simple("Hello World".to_string(), &hex!("6b48656c6c6f20576f726c64"));
    // Indefinite length: (_ "strea", "ming")
    test_simple("streaming".to_string(), &hex!("7f657374726561646d696e67ff"));

    assert!(matches!(
        parse::<String>(&hex!("61ff")),
        Err(Error::DataCorrupted(_, Corruption::InvalidUtf8))
    ));
    assert!(matches!(
        parse::<String>(&hex!("4161")),
        Err(Error::TypeMismatch(..))
    ));
}

#[test]
fn rfc_byte_strings() {
    test_simple(Bytes::default(), &hex!("40"));
    test_simple(Bytes(hex!("01020304").to_vec()), &hex!("4401020304"));
    // Indefinite length: (_ h'0102', h'030405')
    test_simple(
        Bytes(hex!("0102030405").to_vec()),
        &hex!("5f42010243030405ff"),
    );

    assert!(matches!(
        parse::<Bytes>(&hex!("6161")),
        Err(Error::TypeMismatch(..))
    ));
}

#[test]
fn chunk_payload_may_contain_break_byte() {
    // 0xFF inside a definite chunk is data; only the top-level break ends
    // the string
    test_simple(Bytes(vec![0xFF, 0x01]), &hex!("5f42ff01ff"));
    test_simple(Bytes(vec![0xFF]), &hex!("5f41ffff"));
}

#[test]
fn invalid_chunks() {
    // Chunk of the wrong major type
    assert!(matches!(
        parse::<Bytes>(&hex!("5f6161ff")),
        Err(Error::DataCorrupted(_, Corruption::Scan(scan::Error::InvalidChunk)))
    ));
    // Nested indefinite chunk
    assert!(matches!(
        parse::<Bytes>(&hex!("5f5f4101ffff")),
        Err(Error::DataCorrupted(_, Corruption::Scan(scan::Error::InvalidChunk)))
    ));
}

#[test]
fn rfc_arrays() {
    test_simple(Vec::<u64>::new(), &hex!("80"));
    test_simple(vec![1u64, 2, 3], &hex!("83010203"));
    test_simple(
        (1..=25).collect::<Vec<u64>>(),
        &hex!("98190102030405060708090a0b0c0d0e0f101112131415161718181819"),
    );
    // Indefinite length
    test_simple(Vec::<u64>::new(), &hex!("9fff"));
    test_simple(vec![1u64, 2, 3], &hex!("9f010203ff"));
}

#[test]
fn nested_arrays() {
    struct Row {
        first: u64,
        pair_a: Vec<u64>,
        pair_b: Vec<u64>,
    }

    impl FromCbor for Row {
        fn from_cbor(decoder: &Decoder<'_>) -> Result<Self, Error> {
            let mut a = decoder.unkeyed()?;
            let first = a.decode()?;
            let pair_a = a.decode()?;
            let pair_b = a.decode()?;
            assert!(a.is_at_end());
            Ok(Row {
                first,
                pair_a,
                pair_b,
            })
        }
    }

    // [1, [2, 3], [4, 5]] in definite and mixed forms
    for data in [
        hex!("8301820203820405").as_slice(),
        hex!("83018202039f0405ff").as_slice(),
        hex!("9f01820203820405ff").as_slice(),
    ] {
        let row = parse::<Row>(data).unwrap();
        assert_eq!(row.first, 1);
        assert_eq!(row.pair_a, vec![2, 3]);
        assert_eq!(row.pair_b, vec![4, 5]);
    }
}

#[test]
fn rfc_maps() {
    test_simple(BTreeMap::<String, u64>::new(), &hex!("a0"));
    test_simple(
        BTreeMap::from([("a".to_string(), 1u64), ("b".to_string(), 2)]),
        &hex!("a2616101616202"),
    );
    test_simple(
        BTreeMap::from([("Fun".to_string(), true)]),
        &hex!("a16346756ef5"),
    );
    // Indefinite length: {_ "Fun": true}
    test_simple(
        BTreeMap::from([("Fun".to_string(), true)]),
        &hex!("bf6346756ef5ff"),
    );

    assert!(matches!(
        parse::<BTreeMap<String, u64>>(&hex!("83010203")),
        Err(Error::TypeMismatch(..))
    ));
    assert!(matches!(
        parse::<Vec<u64>>(&hex!("a0")),
        Err(Error::TypeMismatch(..))
    ));
    // Integer map keys are not unboxable
    assert!(matches!(
        parse::<BTreeMap<String, u64>>(&hex!("a1010a")),
        Err(Error::DataCorrupted(_, Corruption::NonStringKey))
    ));
}

#[test]
fn duplicate_keys_first_wins() {
    test_simple(
        BTreeMap::from([("a".to_string(), 1u64)]),
        &hex!("a2616101616102"),
    );
}

#[test]
fn keyed_container() {
    struct Claims {
        fun: bool,
        amt: i64,
    }

    impl FromCbor for Claims {
        fn from_cbor(decoder: &Decoder<'_>) -> Result<Self, Error> {
            let m = decoder.keyed()?;
            assert!(m.contains("Fun"));
            assert!(!m.contains("Missing"));
            assert!(!m.decode_nil("Fun")?);
            Ok(Claims {
                fun: m.decode("Fun")?,
                amt: m.decode("Amt")?,
            })
        }
    }

    // {_ "Fun": true, "Amt": -2}
    let claims = parse::<Claims>(&hex!("bf6346756ef563416d7421ff")).unwrap();
    assert!(claims.fun);
    assert_eq!(claims.amt, -2);
}

#[test]
fn keyed_container_preserves_wire_order() {
    struct Keys(Vec<String>);

    impl FromCbor for Keys {
        fn from_cbor(decoder: &Decoder<'_>) -> Result<Self, Error> {
            let m = decoder.keyed()?;
            Ok(Keys(m.keys().map(str::to_string).collect()))
        }
    }

    let keys = parse::<Keys>(&hex!("a2616201616102")).unwrap();
    assert_eq!(keys.0, ["b", "a"]);
}

#[test]
fn keyed_container_missing_key() {
    struct Needy;

    impl FromCbor for Needy {
        fn from_cbor(decoder: &Decoder<'_>) -> Result<Self, Error> {
            let m = decoder.keyed()?;
            m.decode::<u64>("absent")?;
            Ok(Needy)
        }
    }

    assert!(matches!(
        parse::<Needy>(&hex!("a0")),
        Err(Error::KeyNotFound(_, key)) if key == "absent"
    ));
}

#[test]
fn unkeyed_view_over_map() {
    struct Flat(Vec<(String, u64)>);

    impl FromCbor for Flat {
        fn from_cbor(decoder: &Decoder<'_>) -> Result<Self, Error> {
            let mut a = decoder.unkeyed()?;
            let mut pairs = Vec::new();
            while !a.is_at_end() {
                pairs.push((a.decode()?, a.decode()?));
            }
            Ok(Flat(pairs))
        }
    }

    let flat = parse::<Flat>(&hex!("a2616101616202")).unwrap();
    assert_eq!(
        flat.0,
        [("a".to_string(), 1), ("b".to_string(), 2)]
    );
}

#[test]
fn unkeyed_exhaustion() {
    struct Greedy;

    impl FromCbor for Greedy {
        fn from_cbor(decoder: &Decoder<'_>) -> Result<Self, Error> {
            let mut a = decoder.unkeyed()?;
            assert_eq!(a.count(), 1);
            a.decode::<u64>()?;
            a.decode::<u64>()?;
            Ok(Greedy)
        }
    }

    assert!(matches!(
        parse::<Greedy>(&hex!("8101")),
        Err(Error::ValueNotFound(_))
    ));
}

#[test]
fn unkeyed_decode_nil_consumes_only_null() {
    struct Sparse {
        first: Option<u64>,
        second: u64,
    }

    impl FromCbor for Sparse {
        fn from_cbor(decoder: &Decoder<'_>) -> Result<Self, Error> {
            let mut a = decoder.unkeyed()?;
            let first = if a.decode_nil()? { None } else { Some(a.decode()?) };
            assert_eq!(a.index(), 1);
            Ok(Sparse {
                first,
                second: a.decode()?,
            })
        }
    }

    let sparse = parse::<Sparse>(&hex!("82f602")).unwrap();
    assert_eq!(sparse.first, None);
    assert_eq!(sparse.second, 2);

    let sparse = parse::<Sparse>(&hex!("820102")).unwrap();
    assert_eq!(sparse.first, Some(1));
    assert_eq!(sparse.second, 2);
}

#[derive(Debug, PartialEq)]
struct Epoch(u64);

impl FromCbor for Epoch {
    const TAG: Option<u64> = Some(1);

    fn from_cbor(decoder: &Decoder<'_>) -> Result<Self, Error> {
        Ok(Epoch(decoder.decode()?))
    }
}

#[test]
fn tagged_values() {
    test_simple(Epoch(1363896240), &hex!("c11a514b67b0"));

    assert!(matches!(
        parse::<Epoch>(&hex!("c21a514b67b0")),
        Err(Error::DataCorrupted(_, Corruption::WrongTag(1, 2)))
    ));
    assert!(matches!(
        parse::<Epoch>(&hex!("1a514b67b0")),
        Err(Error::DataCorrupted(_, Corruption::MissingTag(1)))
    ));
    // A tagged value where a plain integer is requested
    assert!(matches!(
        parse::<u64>(&hex!("c11a514b67b0")),
        Err(Error::TypeMismatch(..))
    ));
}

#[test]
fn truncated_input() {
    for data in [
        hex!("19").as_slice(),
        hex!("1a0001").as_slice(),
        hex!("62c3").as_slice(),
        hex!("830102").as_slice(),
        hex!("9f0102").as_slice(),
        hex!("a16161").as_slice(),
        hex!("5f4101").as_slice(),
        hex!("c1").as_slice(),
        hex!("fb00000000000000").as_slice(),
    ] {
        assert!(
            matches!(parse::<Vec<u64>>(data), Err(Error::DataCorrupted(..)))
                || matches!(parse::<u64>(data), Err(Error::DataCorrupted(..))),
            "{data:02x?} should be corrupt"
        );
    }
}

#[test]
fn break_placement() {
    // Break with no open indefinite container
    assert!(matches!(
        parse::<u64>(&hex!("ff")),
        Err(Error::DataCorrupted(_, Corruption::Scan(scan::Error::UnexpectedBreak)))
    ));
    // Break inside a definite-length array
    assert!(matches!(
        parse::<Vec<u64>>(&hex!("830102ff")),
        Err(Error::DataCorrupted(..))
    ));
    // Break in map value position
    assert!(matches!(
        parse::<BTreeMap<String, u64>>(&hex!("bf6161ff")),
        Err(Error::DataCorrupted(_, Corruption::Scan(scan::Error::PartialMap)))
    ));
}

#[test]
fn recursion_limit() {
    let data = vec![0x9F; 2 * scan::MAX_DEPTH];
    assert!(matches!(
        parse::<Vec<u64>>(&data),
        Err(Error::DataCorrupted(_, Corruption::Scan(scan::Error::MaxRecursion)))
    ));
}

#[test]
fn empty_input() {
    assert!(matches!(
        parse::<u64>(&[]),
        Err(Error::ValueNotFound(_))
    ));
    assert_eq!(parse::<Option<u64>>(&[]).unwrap(), None);
}

#[test]
fn trailing_data_is_ignored() {
    test_simple(0u64, &hex!("0001"));
}

#[test]
fn error_paths() {
    #[derive(Debug)]
    struct Outer;

    impl FromCbor for Outer {
        fn from_cbor(decoder: &Decoder<'_>) -> Result<Self, Error> {
            let m = decoder.keyed()?;
            m.decode::<Vec<u64>>("rows")?;
            Ok(Outer)
        }
    }

    // {"rows": [0, true]} - the bool at index 1 is the failure
    let err = parse::<Outer>(&hex!("a164726f77738200f5")).unwrap_err();
    assert_eq!(err.path().to_string(), "$.rows[1]");
    assert!(matches!(err, Error::TypeMismatch(..)));
}
