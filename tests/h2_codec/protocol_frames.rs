//! Tests for protocol frame exchange between two codecs

use bytes::BytesMut;
use h2_engine::{
    CodecConfig, ErrorCode, H2Codec, H2Event, Headers, PriorityInfo, Settings, StreamState,
};

use super::{connected, pump, request, response};

#[test]
fn test_settings_exchange() {
    let mut settings = Settings::new();
    settings
        .set_header_table_size(1024)
        .set_max_concurrent_streams(10)
        .put(0xF00D, 7)
        .unwrap();
    let mut client =
        H2Codec::new(CodecConfig::client().with_local_settings(settings.clone())).unwrap();
    let mut server = H2Codec::server().unwrap();

    let (client_events, server_events) = pump(&mut client, &mut server);

    assert!(server_events.contains(&H2Event::Settings { ack: false, settings: settings.clone() }));
    assert!(client_events
        .iter()
        .any(|e| matches!(e, H2Event::Settings { ack: true, .. })));

    assert_eq!(server.connection().remote_settings().get(0xF00D), Some(7));
    assert_eq!(server.connection().local().max_active_streams(), 10);
    assert_eq!(client.connection().local_settings().header_table_size(), Some(1024));
    assert_eq!(client.connection().remote().max_active_streams(), 10);
}

#[test]
fn test_ping_round_trip() {
    let (mut client, mut server) = connected();
    let data = *b"pingpong";
    client.ping(data).unwrap();

    let (client_events, server_events) = pump(&mut client, &mut server);
    assert_eq!(server_events, vec![H2Event::Ping { ack: false, data }]);
    assert_eq!(client_events, vec![H2Event::Ping { ack: true, data }]);
}

#[test]
fn test_priority_frames_update_tree() {
    let (mut client, mut server) = connected();
    client.send_headers(1, &request(), false).unwrap();
    client.send_headers(3, &request(), false).unwrap();
    client
        .send_priority(3, PriorityInfo { dependency: 1, weight: 64, exclusive: false })
        .unwrap();

    let (_, server_events) = pump(&mut client, &mut server);
    assert!(matches!(
        server_events.last(),
        Some(H2Event::Priority { stream_id: 3, priority }) if priority.weight == 64
    ));
    assert_eq!(server.connection().priority_children(1), vec![3]);
    assert_eq!(client.connection().priority_children(1), vec![3]);
}

#[test]
fn test_push_promise() {
    let (mut client, mut server) = connected();
    client.send_headers(1, &request(), true).unwrap();
    pump(&mut client, &mut server);

    let mut promised = Headers::new();
    promised
        .add(":method", "GET")
        .add(":scheme", "http")
        .add(":path", "/style.css")
        .add(":authority", "localhost");
    assert_eq!(server.next_stream_id(), 2);
    server.push_promise(1, 2, &promised).unwrap();
    assert_eq!(server.connection().stream_state(2), StreamState::ReservedLocal);

    let (client_events, _) = pump(&mut client, &mut server);
    assert_eq!(
        client_events,
        vec![H2Event::PushPromise { stream_id: 1, promised_stream_id: 2, headers: promised }]
    );
    assert_eq!(client.connection().stream_state(2), StreamState::ReservedRemote);

    server.send_headers(2, &response(), false).unwrap();
    assert_eq!(server.connection().stream_state(2), StreamState::HalfClosedRemote);
    pump(&mut client, &mut server);
    assert_eq!(client.connection().stream_state(2), StreamState::HalfClosedLocal);
}

#[test]
fn test_push_refused_when_disabled() {
    let mut settings = Settings::new();
    settings.set_push_enabled(false);
    let mut client = H2Codec::new(CodecConfig::client().with_local_settings(settings)).unwrap();
    let mut server = H2Codec::server().unwrap();
    pump(&mut client, &mut server);

    client.send_headers(1, &request(), true).unwrap();
    pump(&mut client, &mut server);
    assert!(server.push_promise(1, 2, &request()).is_err());
}

#[test]
fn test_blocked_data_resumes_after_window_update() {
    let mut settings = Settings::new();
    settings.set_initial_window_size(10).unwrap();
    let mut client = H2Codec::new(CodecConfig::client().with_local_settings(settings)).unwrap();
    let mut server = H2Codec::server().unwrap();
    pump(&mut client, &mut server);

    client.send_headers(1, &request(), true).unwrap();
    pump(&mut client, &mut server);

    server.send_headers(1, &response(), false).unwrap();
    server.send_data(1, vec![b'x'; 25], true).unwrap();
    let (client_events, _) = pump(&mut client, &mut server);

    let mut body = BytesMut::new();
    let mut chunks = Vec::new();
    let mut ended = false;
    for event in &client_events {
        if let H2Event::Data { data, end_stream, .. } = event {
            body.extend_from_slice(data);
            chunks.push(data.len());
            ended = *end_stream;
        }
    }
    assert_eq!(chunks, vec![10, 10, 5]);
    assert_eq!(body.len(), 25);
    assert!(ended);
    assert_eq!(server.connection().stream_state(1), StreamState::Closed);
}

#[test]
fn test_trailers_follow_queued_data() {
    let (mut client, mut server) = connected();
    client.send_headers(1, &request(), false).unwrap();
    client.send_data(1, &b"abc"[..], false).unwrap();
    let mut trailers = Headers::new();
    trailers.add("x-checksum", "123");
    client.send_headers(1, &trailers, true).unwrap();
    assert_eq!(client.connection().stream_state(1), StreamState::Open);

    client.flush().unwrap();
    assert_eq!(client.connection().stream_state(1), StreamState::HalfClosedLocal);

    let (_, server_events) = pump(&mut client, &mut server);
    assert_eq!(server_events.len(), 3);
    assert!(matches!(&server_events[1], H2Event::Data { end_stream: false, .. }));
    assert!(matches!(
        &server_events[2],
        H2Event::Headers { end_stream: true, headers, .. } if *headers == trailers
    ));
}

#[test]
fn test_goaway_closes_unprocessed_streams() {
    let (mut client, mut server) = connected();
    client.send_headers(1, &request(), false).unwrap();
    pump(&mut client, &mut server);

    // Stream 3 never reaches the server
    client.send_headers(3, &request(), false).unwrap();
    client.take_output();

    server.goaway(ErrorCode::NoError, b"").unwrap();
    let mut events = Vec::new();
    client.process(&server.take_output(), &mut events).unwrap();

    assert!(matches!(
        events[..],
        [H2Event::GoAway { last_stream_id: 1, error_code: ErrorCode::NoError, .. }]
    ));
    assert_eq!(client.connection().stream_state(1), StreamState::Open);
    assert_eq!(client.connection().stream_state(3), StreamState::Closed);
    assert!(client.send_headers(5, &request(), false).is_err());
}
