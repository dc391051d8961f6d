//! Tests for stream state tracking

use h2_engine::{CodecConfig, ErrorCode, Frame, H2Codec, Settings, StreamState};

use super::{
    connected, feed, output_frames, pump, raw_frame, request, request_frame, response, server,
    server_with,
};

#[test]
fn test_stream_lifecycle_on_server() {
    let mut codec = server();
    assert_eq!(codec.connection().stream_state(1), StreamState::Idle);

    feed(&mut codec, &request_frame(1, false));
    let stream = codec.connection().stream(1).unwrap();
    assert_eq!(stream.state(), StreamState::Open);
    assert!(stream.local_side_open());
    assert!(stream.remote_side_open());

    feed(&mut codec, &raw_frame(0x0, 0x1, 1, b"body"));
    assert_eq!(codec.connection().stream_state(1), StreamState::HalfClosedRemote);

    codec.send_headers(1, &response(), true).unwrap();
    assert_eq!(codec.connection().stream_state(1), StreamState::Closed);
}

#[test]
fn test_stream_lifecycle_on_client() {
    let (mut client, mut server) = connected();
    assert_eq!(client.next_stream_id(), 1);
    client.send_headers(1, &request(), true).unwrap();
    assert_eq!(client.next_stream_id(), 3);
    assert_eq!(client.connection().stream_state(1), StreamState::HalfClosedLocal);

    pump(&mut client, &mut server);
    server.send_headers(1, &response(), true).unwrap();
    pump(&mut client, &mut server);
    assert_eq!(client.connection().stream_state(1), StreamState::Closed);
    assert_eq!(client.connection().num_streams(), 0);
}

#[test]
fn test_skipped_ids_are_closed() {
    let mut codec = server();
    feed(&mut codec, &request_frame(5, true));
    assert_eq!(codec.connection().stream_state(3), StreamState::Closed);
    assert_eq!(codec.connection().stream_state(7), StreamState::Idle);

    output_frames(&mut codec);

    // A skipped id cannot be opened later
    assert!(feed(&mut codec, &request_frame(3, true)).is_empty());
    assert!(matches!(
        output_frames(&mut codec)[..],
        [Frame::RstStream { stream_id: 3, error_code: ErrorCode::StreamClosed }]
    ));
}

#[test]
fn test_even_stream_from_client_rejected() {
    let mut codec = server();
    let err = codec.process(&request_frame(2, true), &mut ()).unwrap_err();
    assert_eq!(err.error_code(), Some(ErrorCode::ProtocolError));
}

#[test]
fn test_concurrent_stream_limit() {
    let mut settings = Settings::new();
    settings.set_max_concurrent_streams(2);
    let mut codec = server_with(
        CodecConfig::server()
            .with_validate_preface(false)
            .with_local_settings(settings),
    );
    feed(&mut codec, &raw_frame(0x4, 0x1, 0, &[])); // ACK

    feed(&mut codec, &request_frame(1, false));
    feed(&mut codec, &request_frame(3, false));
    let events = feed(&mut codec, &request_frame(5, false));
    assert!(events.is_empty());
    assert_eq!(codec.connection().num_active_streams(false), 2);
    assert!(matches!(
        output_frames(&mut codec)[..],
        [Frame::RstStream { stream_id: 5, error_code: ErrorCode::RefusedStream }]
    ));

    // Frames the client already sent on the refused stream are dropped quietly
    assert!(feed(&mut codec, &raw_frame(0x0, 0x1, 5, b"x")).is_empty());
    assert!(output_frames(&mut codec).is_empty());
}

#[test]
fn test_frames_after_local_reset_within_grace() {
    let mut codec = server_with(
        CodecConfig::server()
            .with_validate_preface(false)
            .with_reset_grace(2, 10),
    );
    feed(&mut codec, &request_frame(1, false));
    codec.reset_stream(1, ErrorCode::Cancel).unwrap();
    assert!(matches!(
        output_frames(&mut codec)[..],
        [Frame::RstStream { stream_id: 1, error_code: ErrorCode::Cancel }]
    ));

    // In-flight frames are ignored for the grace window
    let data = raw_frame(0x0, 0, 1, b"in flight");
    assert!(feed(&mut codec, &data).is_empty());
    assert!(feed(&mut codec, &data).is_empty());
    assert!(output_frames(&mut codec).is_empty());

    // Then they are stream errors again
    feed(&mut codec, &data);
    assert!(matches!(
        output_frames(&mut codec)[..],
        [Frame::RstStream { stream_id: 1, error_code: ErrorCode::StreamClosed }]
    ));
}

#[test]
fn test_window_update_on_closed_stream_ignored() {
    let mut codec = server();
    feed(&mut codec, &request_frame(1, true));
    codec.send_headers(1, &response(), true).unwrap();
    output_frames(&mut codec);

    let events = feed(&mut codec, &raw_frame(0x8, 0, 1, &[0, 0, 0, 1]));
    assert!(events.is_empty());
    assert!(output_frames(&mut codec).is_empty());
}

#[test]
fn test_client_refuses_beyond_peer_limit() {
    let mut settings = Settings::new();
    settings.set_max_concurrent_streams(1);
    let mut client = H2Codec::client().unwrap();
    let mut server = H2Codec::new(CodecConfig::server().with_local_settings(settings)).unwrap();
    pump(&mut client, &mut server);

    client.send_headers(1, &request(), false).unwrap();
    let err = client.send_headers(3, &request(), false).unwrap_err();
    assert_eq!(err.error_code(), Some(ErrorCode::RefusedStream));
    assert_eq!(client.connection().stream_state(3), StreamState::Idle);
}
