//! Tests for CONTINUATION frame assembly

use h2_engine::{CodecConfig, ErrorCode, Frame, H2Error, H2Event};

use super::{feed, output_frames, raw_frame, server, server_with};

fn goaway_code(frames: &[Frame]) -> Option<ErrorCode> {
    frames.iter().find_map(|f| match f {
        Frame::GoAway { error_code, .. } => Some(*error_code),
        _ => None,
    })
}

#[test]
fn test_headers_with_continuation() {
    let mut codec = server();

    let mut data = raw_frame(0x1, 0x1, 1, &[0x82]); // END_STREAM, no END_HEADERS
    data.extend(raw_frame(0x9, 0, 1, &[0x86]));
    data.extend(raw_frame(0x9, 0x4, 1, &[0x84])); // END_HEADERS

    let events = feed(&mut codec, &data);
    assert_eq!(events.len(), 1);
    match &events[0] {
        H2Event::Headers { stream_id, headers, end_stream, .. } => {
            assert_eq!(*stream_id, 1);
            assert_eq!(headers.len(), 3);
            assert_eq!(headers.get(":path").unwrap().as_ref(), b"/");
            assert!(*end_stream);
        }
        other => panic!("Expected Headers event, got {:?}", other),
    }
}

#[test]
fn test_continuation_across_reads() {
    let mut codec = server();

    assert!(feed(&mut codec, &raw_frame(0x1, 0, 1, &[0x82])).is_empty());
    assert!(feed(&mut codec, &raw_frame(0x9, 0, 1, &[0x86])).is_empty());
    // Nothing is known about the stream until the block is complete
    assert_eq!(codec.connection().num_streams(), 0);

    let events = feed(&mut codec, &raw_frame(0x9, 0x4, 1, &[0x84]));
    assert_eq!(events.len(), 1);
    assert_eq!(codec.connection().num_streams(), 1);
}

#[test]
fn test_interleaved_frame_is_connection_error() {
    let mut codec = server();

    let mut data = raw_frame(0x1, 0, 1, &[0x82]);
    data.extend(raw_frame(0x6, 0, 0, &[0; 8])); // PING mid-block
    let err = codec.process(&data, &mut ()).unwrap_err();

    assert_eq!(err.error_code(), Some(ErrorCode::ProtocolError));
    assert_eq!(goaway_code(&output_frames(&mut codec)), Some(ErrorCode::ProtocolError));
}

#[test]
fn test_continuation_on_other_stream_is_connection_error() {
    let mut codec = server();

    let mut data = raw_frame(0x1, 0, 1, &[0x82]);
    data.extend(raw_frame(0x9, 0x4, 3, &[0x86]));
    assert!(codec.process(&data, &mut ()).unwrap_err().should_goaway());
}

#[test]
fn test_continuation_without_headers() {
    let mut codec = server();
    let err = codec
        .process(&raw_frame(0x9, 0x4, 1, &[0x82]), &mut ())
        .unwrap_err();
    assert_eq!(err.error_code(), Some(ErrorCode::ProtocolError));
}

#[test]
fn test_header_block_size_limit() {
    let mut codec = server_with(
        CodecConfig::server()
            .with_validate_preface(false)
            .with_max_header_block_size(16),
    );

    let mut data = raw_frame(0x1, 0, 1, &[0x82; 10]);
    data.extend(raw_frame(0x9, 0, 1, &[0x82; 10]));
    let err = codec.process(&data, &mut ()).unwrap_err();

    assert!(matches!(err, H2Error::Connection { code: ErrorCode::EnhanceYourCalm, .. }));
    assert_eq!(goaway_code(&output_frames(&mut codec)), Some(ErrorCode::EnhanceYourCalm));
}
