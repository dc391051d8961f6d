//! Tests for HPACK decoding

use h2_engine::{ErrorCode, H2Error, HeaderField, Headers, HpackDecoder, HpackEncoder, NeverSensitive};

use super::XorShift;

#[test]
fn test_decode_indexed_header() {
    let mut decoder = HpackDecoder::new();

    // 0x82 = indexed header, index 2 = :method: GET
    let headers = decoder.decode_headers(1, &[0x82]).unwrap();

    assert_eq!(headers.len(), 1);
    assert_eq!(headers.get(":method").unwrap().as_ref(), b"GET");
}

#[test]
fn test_decode_multiple_indexed_headers() {
    let mut decoder = HpackDecoder::new();

    // 0x82 = :method: GET, 0x86 = :scheme: http, 0x84 = :path: /
    let headers = decoder.decode_headers(1, &[0x82, 0x86, 0x84]).unwrap();

    let fields: Vec<(&[u8], &[u8])> = headers
        .iter()
        .map(|f| (f.name().as_ref(), f.value().as_ref()))
        .collect();
    assert_eq!(
        fields,
        vec![
            (&b":method"[..], &b"GET"[..]),
            (&b":scheme"[..], &b"http"[..]),
            (&b":path"[..], &b"/"[..]),
        ]
    );
}

#[test]
fn test_decode_literal_with_indexing() {
    let mut decoder = HpackDecoder::new();

    let data = [
        0x40, // Literal with indexing, new name
        0x06, // Name length: 6
        b'c', b'u', b's', b't', b'o', b'm',
        0x05, // Value length: 5
        b'v', b'a', b'l', b'u', b'e',
    ];

    let headers = decoder.decode_headers(1, &data).unwrap();
    assert_eq!(headers.get("custom").unwrap().as_ref(), b"value");
    assert_eq!(decoder.table().len(), 1);
    assert_eq!(decoder.table().size(), 6 + 5 + 32);

    // Index 62 now refers to the new entry
    let again = decoder.decode_headers(3, &[0x80 | 62]).unwrap();
    assert_eq!(again, headers);
}

#[test]
fn test_decode_literal_indexed_name() {
    let mut decoder = HpackDecoder::new();

    let data = [
        0x41, // Literal with indexing, name index 1 (:authority)
        0x0B, // Value length: 11
        b'e', b'x', b'a', b'm', b'p', b'l', b'e', b'.', b'c', b'o', b'm',
    ];

    let headers = decoder.decode_headers(1, &data).unwrap();
    assert_eq!(headers.get(":authority").unwrap().as_ref(), b"example.com");
}

#[test]
fn test_decode_never_indexed_is_flagged() {
    let mut decoder = HpackDecoder::new();
    let data = [0x10, 0x03, b'k', b'e', b'y', 0x03, b'v', b'a', b'l'];
    let headers = decoder.decode_headers(1, &data).unwrap();
    assert!(headers.iter().next().unwrap().is_sensitive());
    assert!(decoder.table().is_empty());
}

// ============================================================================
// Scenarios
// ============================================================================

#[test]
fn test_decode_four_fields() {
    let mut rng = XorShift::new(0x5eed);
    let mut list = Headers::new();
    list.add(":method", "GET").add("akey", "avalue");
    for _ in 0..2 {
        let name = rng.token(12);
        list.push(HeaderField::new(name, rng.bytes(16)));
    }

    let block = HpackEncoder::new()
        .encode_headers(1, &list, &NeverSensitive)
        .unwrap();
    let decoded = HpackDecoder::new().decode_headers(1, &block).unwrap();

    assert_eq!(decoded.len(), 4);
    assert_eq!(decoded.get(":method").unwrap().as_ref(), b"GET");
    assert_eq!(decoded.get("akey").unwrap().as_ref(), b"avalue");
}

#[test]
fn test_decode_name_exceeding_list_size() {
    let mut rng = XorShift::new(42);
    let mut list = Headers::new();
    list.push(HeaderField::new(rng.bytes(100), "v"));

    let block = HpackEncoder::new()
        .encode_headers(5, &list, &NeverSensitive)
        .unwrap();

    let mut decoder = HpackDecoder::new();
    decoder.set_max_header_list_size(100);
    let err = decoder.decode_headers(5, &block).unwrap_err();
    assert!(matches!(
        err,
        H2Error::HeaderListSizeExceeded { stream_id: 5, code: ErrorCode::ProtocolError, .. }
    ));
    assert!(err.is_stream_error());
    assert!(!err.should_goaway());
}

// ============================================================================
// Malformed input
// ============================================================================

#[test]
fn test_decode_invalid_index() {
    let mut decoder = HpackDecoder::new();
    let err = decoder.decode_headers(1, &[0x80 | 70]).unwrap_err();
    assert!(matches!(err, H2Error::Compression(_)));
    assert_eq!(err.error_code(), Some(ErrorCode::CompressionError));
    assert!(err.should_goaway());
}

#[test]
fn test_decode_failure_restores_table() {
    let mut decoder = HpackDecoder::new();
    // Valid indexed-literal followed by a truncated literal
    let data = [
        0x40, 0x01, b'a', 0x01, b'b', // a: b
        0x40, 0x05, b'x',             // truncated name
    ];
    assert!(decoder.decode_headers(1, &data).is_err());
    assert!(decoder.table().is_empty());
    assert_eq!(decoder.table().size(), 0);
}

#[test]
fn test_decode_size_update_above_limit() {
    let mut decoder = HpackDecoder::new();
    decoder.set_max_header_table_size(100);
    // Size update to 4096 (0x3f 0xe1 0x1f) exceeds the acknowledged 100
    let err = decoder.decode_headers(1, &[0x3f, 0xe1, 0x1f]).unwrap_err();
    assert!(matches!(err, H2Error::Compression(_)));
}
