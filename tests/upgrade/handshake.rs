//! Client and server sides of the upgrade

use h2_engine::{
    ClientUpgradeCodec, CodecConfig, ErrorCode, H2Codec, H2Event, Headers, ServerUpgradeCodec,
    Settings, StreamState, UpgradeTarget,
};

use super::{header, http1_request, pump, HttpHeaders};

fn upgrade_request(settings: &Settings) -> HttpHeaders {
    let mut request = http1_request();
    ClientUpgradeCodec::new(settings.clone()).prepare_upgrade_request(&mut request);
    request
}

#[test]
fn test_full_upgrade() {
    let config = CodecConfig::client();
    let client_upgrade = ClientUpgradeCodec::new(config.local_settings.clone());
    let mut client = H2Codec::new(config).unwrap();
    let mut server = H2Codec::server().unwrap();

    let mut request = http1_request();
    client_upgrade.prepare_upgrade_request(&mut request);

    let server_upgrade = ServerUpgradeCodec::new();
    let settings = server_upgrade.prepare_upgrade_response(&request).unwrap();
    assert_eq!(settings.max_concurrent_streams(), Some(100));
    let response = server_upgrade
        .upgrade_to(Some(&mut server as &mut dyn UpgradeTarget), &settings)
        .unwrap();

    // The HTTP/1.1 request is stream 1, already fully received
    assert_eq!(server.connection().stream_state(1), StreamState::HalfClosedRemote);
    assert_eq!(server.connection().remote_settings(), &settings);
    assert_eq!(server.connection().local().max_active_streams(), 100);

    assert!(client_upgrade
        .upgrade_to(101, &response, Some(&mut client as &mut dyn UpgradeTarget))
        .unwrap());
    let stream = client.connection().stream(1).unwrap();
    assert!(!stream.local_side_open());
    assert!(stream.remote_side_open());
    assert_eq!(client.next_stream_id(), 3);

    // The response continues over HTTP/2
    let mut headers = Headers::new();
    headers.add(":status", "200");
    server.send_headers(1, &headers, false).unwrap();
    server.send_data(1, &b"hello"[..], true).unwrap();
    server.flush().unwrap();

    let (client_events, server_events) = pump(&mut client, &mut server);
    assert!(server_events
        .iter()
        .all(|e| matches!(e, H2Event::Settings { .. })));
    let body: Vec<&[u8]> = client_events
        .iter()
        .filter_map(|e| match e {
            H2Event::Data { stream_id: 1, data, .. } => Some(data.as_ref()),
            _ => None,
        })
        .collect();
    assert_eq!(body, vec![&b"hello"[..]]);
    assert_eq!(client.connection().stream_state(1), StreamState::Closed);
    assert_eq!(server.connection().stream_state(1), StreamState::Closed);
}

#[test]
fn test_declined_upgrade_leaves_codec_untouched() {
    let client_upgrade = ClientUpgradeCodec::new(Settings::new());
    let mut client = H2Codec::client().unwrap();
    let upgraded = client_upgrade
        .upgrade_to(200, &[header("Content-Length", "0")], Some(&mut client))
        .unwrap();
    assert!(!upgraded);
    assert_eq!(client.connection().stream_state(1), StreamState::Idle);
    assert_eq!(client.next_stream_id(), 1);
}

#[test]
fn test_upgrade_without_handler() {
    let request = upgrade_request(&Settings::new());
    let server_upgrade = ServerUpgradeCodec::new();
    let settings = server_upgrade.prepare_upgrade_response(&request).unwrap();
    let err = server_upgrade.upgrade_to(None, &settings).unwrap_err();
    assert_eq!(err.error_code(), Some(ErrorCode::ProtocolError));

    let client_upgrade = ClientUpgradeCodec::new(Settings::new());
    let response = vec![header("Connection", "Upgrade"), header("Upgrade", "h2c")];
    assert!(client_upgrade.upgrade_to(101, &response, None).is_err());
}

#[test]
fn test_wrong_role_rejected() {
    let request = upgrade_request(&Settings::new());
    let server_upgrade = ServerUpgradeCodec::new();
    let settings = server_upgrade.prepare_upgrade_response(&request).unwrap();

    let mut client = H2Codec::client().unwrap();
    assert!(server_upgrade.upgrade_to(Some(&mut client), &settings).is_err());

    let mut server = H2Codec::server().unwrap();
    let response = vec![header("Upgrade", "h2c")];
    assert!(ClientUpgradeCodec::new(Settings::new())
        .upgrade_to(101, &response, Some(&mut server))
        .is_err());
}

#[test]
fn test_request_validation() {
    let server_upgrade = ServerUpgradeCodec::new();
    let mut settings = Settings::new();
    settings.set_max_header_list_size(4096);

    // Header names are matched case-insensitively
    let mut request: HttpHeaders = upgrade_request(&settings)
        .into_iter()
        .map(|(n, v)| (n.to_ascii_lowercase(), v))
        .collect();
    assert_eq!(server_upgrade.prepare_upgrade_response(&request).unwrap(), settings);

    request.push(header("HTTP2-Settings", "AAMAAABk"));
    assert!(server_upgrade.prepare_upgrade_response(&request).is_err());

    let mut missing_token = upgrade_request(&settings);
    for (name, value) in &mut missing_token {
        if name == "Connection" {
            *value = "Upgrade".to_string();
        }
    }
    assert!(server_upgrade.prepare_upgrade_response(&missing_token).is_err());

    let mut garbage = http1_request();
    garbage.push(header("Connection", "Upgrade, HTTP2-Settings"));
    garbage.push(header("Upgrade", "h2c"));
    garbage.push(header("HTTP2-Settings", "not*base64"));
    let err = server_upgrade.prepare_upgrade_response(&garbage).unwrap_err();
    assert_eq!(err.error_code(), Some(ErrorCode::ProtocolError));
}

#[test]
fn test_request_replaces_existing_upgrade_headers() {
    let mut request = http1_request();
    request.push(header("Upgrade", "websocket"));
    request.push(header("connection", "keep-alive"));
    ClientUpgradeCodec::new(Settings::new()).prepare_upgrade_request(&mut request);

    let upgrades: Vec<&str> = request
        .iter()
        .filter(|(n, _)| n.eq_ignore_ascii_case("upgrade"))
        .map(|(_, v)| v.as_str())
        .collect();
    assert_eq!(upgrades, vec!["h2c"]);
    assert_eq!(request.len(), http1_request().len() + 3);
}
