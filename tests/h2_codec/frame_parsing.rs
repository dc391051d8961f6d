//! Tests for HTTP/2 frame parsing

use h2_engine::{
    frame_type, is_h2c_preface, ErrorCode, Frame, FrameHeader, FrameReader, PriorityInfo,
    CONNECTION_PREFACE,
};

use super::raw_frame;

#[test]
fn test_frame_header_parse() {
    let data = [0, 0, 5, 0, 1, 0, 0, 0, 1];
    let header = FrameHeader::parse(&data).unwrap();
    assert_eq!(header.length, 5);
    assert_eq!(header.frame_type, frame_type::DATA);
    assert_eq!(header.flags, 1);
    assert_eq!(header.stream_id, 1);
    assert!(header.is_end_stream());
    assert_eq!(header.total_size(), 14);
}

#[test]
fn test_frame_header_too_short() {
    assert!(FrameHeader::parse(&[0, 0, 5, 0]).is_none());
}

#[test]
fn test_frame_header_reserved_bit_ignored() {
    let data = [0, 0, 0, 4, 0, 0x80, 0, 0, 3];
    assert_eq!(FrameHeader::parse(&data).unwrap().stream_id, 3);
}

#[test]
fn test_h2c_preface_detection() {
    assert!(is_h2c_preface(CONNECTION_PREFACE));
    assert!(is_h2c_preface(b"PRI * HTTP/2.0\r\n\r\nSM\r\n\r\nextra"));
    assert!(!is_h2c_preface(b"GET / HTTP/1.1\r\n"));
}

#[test]
fn test_server_reader_requires_preface() {
    let mut reader = FrameReader::server();
    assert!(reader.read(b"GET / HTTP/1.1\r\nHost: a\r\n\r\n").is_err());

    let mut reader = FrameReader::server();
    let mut data = CONNECTION_PREFACE.to_vec();
    data.extend(raw_frame(0x4, 0, 0, &[]));
    assert_eq!(reader.read(&data).unwrap().len(), 1);
    assert!(reader.preface_received());
}

#[test]
fn test_parse_typed_frames() {
    let mut data = raw_frame(0x2, 0, 3, &[0, 0, 0, 1, 15]);
    data.extend(raw_frame(0x7, 0, 0, &[0, 0, 0, 9, 0, 0, 0, 0xb, b'x']));
    data.extend(raw_frame(0x8, 0, 0, &[0x80, 0, 0, 10]));

    let frames = FrameReader::new().read(&data).unwrap();
    assert_eq!(
        frames,
        vec![
            Frame::Priority {
                stream_id: 3,
                priority: PriorityInfo { dependency: 1, weight: 16, exclusive: false },
            },
            Frame::GoAway {
                last_stream_id: 9,
                error_code: ErrorCode::EnhanceYourCalm,
                debug_data: bytes::Bytes::from_static(b"x"),
            },
            Frame::WindowUpdate { stream_id: 0, increment: 10 },
        ]
    );
}

#[test]
fn test_padded_headers() {
    // PADDED | END_HEADERS, pad length 2
    let frames = FrameReader::new()
        .read(&raw_frame(0x1, 0x8 | 0x4, 1, &[2, 0x82, 0, 0]))
        .unwrap();
    assert!(matches!(
        &frames[..],
        [Frame::Headers { header_block, .. }] if header_block[..] == [0x82]
    ));
}

#[test]
fn test_padding_longer_than_payload() {
    let err = FrameReader::new()
        .read(&raw_frame(0x0, 0x8, 1, &[5, b'a']))
        .unwrap_err();
    assert_eq!(err.error_code(), Some(ErrorCode::ProtocolError));
}

#[test]
fn test_malformed_fixed_size_frames() {
    for (ty, stream_id, len) in [(0x2u8, 1u32, 4usize), (0x3, 1, 3), (0x6, 0, 7), (0x8, 0, 3)] {
        let err = FrameReader::new()
            .read(&raw_frame(ty, 0, stream_id, &vec![0; len]))
            .unwrap_err();
        assert_eq!(err.error_code(), Some(ErrorCode::FrameSizeError), "type {}", ty);
    }
}

#[test]
fn test_stream_id_constraints() {
    // DATA on stream 0
    assert!(FrameReader::new().read(&raw_frame(0x0, 0, 0, b"x")).is_err());
    // SETTINGS on a stream
    assert!(FrameReader::new().read(&raw_frame(0x4, 0, 1, &[])).is_err());
    // PING on a stream
    assert!(FrameReader::new().read(&raw_frame(0x6, 0, 1, &[0; 8])).is_err());
}

#[test]
fn test_larger_max_frame_size() {
    let mut reader = FrameReader::new();
    let payload = vec![0u8; 20_000];
    assert!(reader.read(&raw_frame(0x0, 0, 1, &payload)).is_err());

    let mut reader = FrameReader::new();
    reader.set_max_frame_size(32_768);
    assert_eq!(reader.read(&raw_frame(0x0, 0, 1, &payload)).unwrap().len(), 1);
}
