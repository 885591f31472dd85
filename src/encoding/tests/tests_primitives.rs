//! Tests for primitive type encoding/decoding: integers, bool, fixed
//! arrays, byte vectors.

use crate::encoding::*;

// ------------------------------------------------------------------------------------------------
// u8
// ------------------------------------------------------------------------------------------------

#[test]
fn roundtrip_u8() {
    let val: u8 = 0xAB;
    let bytes = encode_to_vec(&val).unwrap();
    assert_eq!(bytes, [0xAB]);
    let (decoded, consumed) = decode_from_slice::<u8>(&bytes).unwrap();
    assert_eq!(decoded, val);
    assert_eq!(consumed, 1);
}

// ------------------------------------------------------------------------------------------------
// u32
// ------------------------------------------------------------------------------------------------

#[test]
fn roundtrip_u32() {
    let val: u32 = 0xDEAD_BEEF;
    let bytes = encode_to_vec(&val).unwrap();
    assert_eq!(bytes, [0xEF, 0xBE, 0xAD, 0xDE]);
    let (decoded, consumed) = decode_from_slice::<u32>(&bytes).unwrap();
    assert_eq!(decoded, val);
    assert_eq!(consumed, 4);
}

#[test]
fn u32_decode_short_buffer() {
    let err = decode_from_slice::<u32>(&[0x01, 0x02]).unwrap_err();
    assert!(matches!(
        err,
        EncodingError::UnexpectedEof {
            needed: 4,
            available: 2
        }
    ));
}

// ------------------------------------------------------------------------------------------------
// u64
// ------------------------------------------------------------------------------------------------

#[test]
fn roundtrip_u64() {
    let val: u64 = 0x0102_0304_0506_0708;
    let bytes = encode_to_vec(&val).unwrap();
    assert_eq!(bytes, [0x08, 0x07, 0x06, 0x05, 0x04, 0x03, 0x02, 0x01]);
    let (decoded, consumed) = decode_from_slice::<u64>(&bytes).unwrap();
    assert_eq!(decoded, val);
    assert_eq!(consumed, 8);
}

// ------------------------------------------------------------------------------------------------
// bool
// ------------------------------------------------------------------------------------------------

#[test]
fn roundtrip_bool() {
    let bytes_true = encode_to_vec(&true).unwrap();
    let bytes_false = encode_to_vec(&false).unwrap();
    assert_eq!(bytes_true, [1]);
    assert_eq!(bytes_false, [0]);
    assert_eq!(decode_from_slice::<bool>(&bytes_true).unwrap(), (true, 1));
    assert_eq!(decode_from_slice::<bool>(&bytes_false).unwrap(), (false, 1));
}

#[test]
fn bool_invalid_byte() {
    let err = decode_from_slice::<bool>(&[2]).unwrap_err();
    assert!(matches!(err, EncodingError::InvalidBool(2)));

    let err = decode_from_slice::<bool>(&[0xFF]).unwrap_err();
    assert!(matches!(err, EncodingError::InvalidBool(0xFF)));
}

// ------------------------------------------------------------------------------------------------
// Fixed-size arrays
// ------------------------------------------------------------------------------------------------

#[test]
fn roundtrip_fixed_array() {
    let val: [u8; 4] = *b"CFIL";
    let bytes = encode_to_vec(&val).unwrap();
    assert_eq!(bytes, b"CFIL");
    let (decoded, consumed) = decode_from_slice::<[u8; 4]>(&bytes).unwrap();
    assert_eq!(decoded, val);
    assert_eq!(consumed, 4);
}

// ------------------------------------------------------------------------------------------------
// Vec<u8>
// ------------------------------------------------------------------------------------------------

#[test]
fn roundtrip_byte_vec() {
    let val: Vec<u8> = b"hello index".to_vec();
    let bytes = encode_to_vec(&val).unwrap();
    // 4-byte length prefix followed by the raw bytes.
    assert_eq!(&bytes[..4], &(val.len() as u32).to_le_bytes());
    assert_eq!(&bytes[4..], val.as_slice());
    let (decoded, consumed) = decode_from_slice::<Vec<u8>>(&bytes).unwrap();
    assert_eq!(decoded, val);
    assert_eq!(consumed, bytes.len());
}

#[test]
fn roundtrip_empty_byte_vec() {
    let val: Vec<u8> = Vec::new();
    let bytes = encode_to_vec(&val).unwrap();
    assert_eq!(bytes, [0, 0, 0, 0]);
    let (decoded, consumed) = decode_from_slice::<Vec<u8>>(&bytes).unwrap();
    assert!(decoded.is_empty());
    assert_eq!(consumed, 4);
}

#[test]
fn byte_slice_encode_matches_vec_encode() {
    let vec_form = encode_to_vec(&b"abc".to_vec()).unwrap();
    let slice_form = encode_to_vec(&b"abc".as_slice()).unwrap();
    assert_eq!(vec_form, slice_form);
}

// ------------------------------------------------------------------------------------------------
// Sequenced decoding through a cursor
// ------------------------------------------------------------------------------------------------

#[test]
fn sequential_decode_advances_cursor() {
    let mut buf = Vec::new();
    42u32.encode_to(&mut buf).unwrap();
    b"key".as_slice().encode_to(&mut buf).unwrap();
    0xFFu64.encode_to(&mut buf).unwrap();

    let mut off = 0;
    let (a, n) = u32::decode_from(&buf[off..]).unwrap();
    off += n;
    let (b, n) = Vec::<u8>::decode_from(&buf[off..]).unwrap();
    off += n;
    let (c, n) = u64::decode_from(&buf[off..]).unwrap();
    off += n;

    assert_eq!(a, 42);
    assert_eq!(b, b"key");
    assert_eq!(c, 0xFF);
    assert_eq!(off, buf.len());
}
