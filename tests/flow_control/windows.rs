//! Send and receive windows

use bytes::Bytes;
use h2_engine::{
    Connection, DistributorKind, ErrorCode, FrameEncoder, LocalFlowController,
    RemoteFlowController, Role, Settings, StreamState, WeightedFairQueueDistributor,
};

use super::{connected, data_received, pump, request, response};

fn controller(ids: &[u32]) -> (Connection, RemoteFlowController<WeightedFairQueueDistributor>) {
    let mut conn = Connection::new(Role::Client);
    for &id in ids {
        conn.send_headers(id, false).unwrap();
    }
    (conn, RemoteFlowController::new(WeightedFairQueueDistributor::new()))
}

// ============================================================================
// Send side
// ============================================================================

#[test]
fn test_negative_window_recovers() {
    let (mut conn, mut flow) = controller(&[1]);
    let mut writer = FrameEncoder::new();
    flow.enqueue(1, Bytes::from(vec![0u8; 1000]), false).unwrap();
    assert_eq!(flow.write_pending(&mut conn, &mut writer).unwrap(), 1000);

    flow.set_initial_window_size(100).unwrap();
    assert_eq!(flow.window_size(1), -900);

    flow.enqueue(1, Bytes::from(vec![1u8; 50]), true).unwrap();
    assert_eq!(flow.write_pending(&mut conn, &mut writer).unwrap(), 0);

    // Back to zero: still nothing to send
    flow.increment_window(1, 900).unwrap();
    assert_eq!(flow.write_pending(&mut conn, &mut writer).unwrap(), 0);

    flow.increment_window(1, 30).unwrap();
    assert_eq!(flow.write_pending(&mut conn, &mut writer).unwrap(), 30);
    assert_eq!(flow.pending_bytes(1), 20);
    assert_eq!(conn.stream_state(1), StreamState::Open);

    flow.increment_window(1, 20).unwrap();
    assert_eq!(flow.write_pending(&mut conn, &mut writer).unwrap(), 20);
    assert_eq!(conn.stream_state(1), StreamState::HalfClosedLocal);
}

#[test]
fn test_initial_window_applies_to_new_streams() {
    let (_, mut flow) = controller(&[]);
    flow.set_initial_window_size(10).unwrap();
    assert_eq!(flow.window_size(7), 10);
    assert_eq!(flow.initial_window_size(), 10);
    // The connection window is not affected by SETTINGS
    assert_eq!(flow.window_size(0), 65_535);
}

#[test]
fn test_initial_window_overflow_rejected() {
    let (_, mut flow) = controller(&[1]);
    flow.increment_window(1, 0x7FFF_FFFF - 65_535).unwrap();
    let err = flow.set_initial_window_size(65_536).unwrap_err();
    assert_eq!(err.error_code(), Some(ErrorCode::FlowControlError));
    assert!(err.should_goaway());
    assert_eq!(flow.initial_window_size(), 65_535);
}

#[test]
fn test_connection_window_shared_between_streams() {
    let (mut client, mut server) = connected(DistributorKind::WeightedFairQueue);
    for id in [1, 3] {
        client.send_headers(id, &request(), true).unwrap();
    }
    pump(&mut client, &mut server);

    for id in [1, 3] {
        server.send_headers(id, &response(), false).unwrap();
        server.send_data(id, vec![b'x'; 40_000], true).unwrap();
    }
    // Only the connection window's worth goes out at first
    assert_eq!(server.flush().unwrap(), 65_535);

    let (client_events, _) = pump(&mut client, &mut server);
    let received = data_received(&client_events);
    assert_eq!(received[&1], 40_000);
    assert_eq!(received[&3], 40_000);
    assert_eq!(server.connection().num_streams(), 0);
}

#[test]
fn test_stream_window_follows_settings_changes() {
    let (mut client, mut server) = connected(DistributorKind::WeightedFairQueue);
    client.send_headers(1, &request(), true).unwrap();
    pump(&mut client, &mut server);
    server.send_headers(1, &response(), false).unwrap();
    server.send_data(1, vec![b'a'; 100], false).unwrap();
    server.flush().unwrap();
    pump(&mut client, &mut server);

    // Shrinking the initial window leaves the stream 100 bytes in debt
    let mut shrink = Settings::new();
    shrink.set_initial_window_size(0).unwrap();
    client.send_settings(shrink).unwrap();
    pump(&mut client, &mut server);

    server.send_data(1, vec![b'b'; 10], true).unwrap();
    assert_eq!(server.flush().unwrap(), 0);
    let (client_events, _) = pump(&mut client, &mut server);
    assert!(data_received(&client_events).is_empty());

    let mut grow = Settings::new();
    grow.set_initial_window_size(200).unwrap();
    client.send_settings(grow).unwrap();
    let (client_events, _) = pump(&mut client, &mut server);
    assert_eq!(data_received(&client_events)[&1], 10);
    assert_eq!(client.connection().stream_state(1), StreamState::Closed);
}

// ============================================================================
// Receive side
// ============================================================================

#[test]
fn test_large_connection_window() {
    let mut flow = LocalFlowController::new();
    assert_eq!(flow.set_connection_window_size(1 << 20), Some((1 << 20) - 65_535));
    assert_eq!(flow.set_connection_window_size(1000), None);
    flow.set_initial_window_size(1 << 20).unwrap();

    flow.receive_data(1, 300_000).unwrap();
    assert_eq!(flow.window_size(0), (1 << 20) - 300_000);

    // No update until half of the connection target is owed
    assert!(flow.consume_bytes(1, 300_000).is_empty());
    flow.receive_data(1, 300_000).unwrap();
    assert_eq!(
        flow.consume_bytes(1, 300_000),
        vec![(0, 600_000), (1, 600_000)]
    );
    assert_eq!(flow.window_size(0), 1 << 20);
    assert_eq!(flow.window_size(1), 1 << 20);
}

#[test]
fn test_stream_overflow_keeps_connection_charged() {
    let mut flow = LocalFlowController::new();
    flow.set_initial_window_size(100).unwrap();
    let err = flow.receive_data(3, 101).unwrap_err();
    assert!(err.is_stream_error());
    assert_eq!(err.error_code(), Some(ErrorCode::FlowControlError));
    assert_eq!(flow.window_size(0), 65_535 - 101);

    // Returned on stream 0 only
    assert!(flow.consume_bytes(0, 101).is_empty());
    assert_eq!(flow.window_size(3), 100);
}

#[test]
fn test_removed_stream_forgets_window() {
    let mut flow = LocalFlowController::new();
    flow.receive_data(5, 1000).unwrap();
    assert_eq!(flow.window_size(5), 64_535);
    flow.remove_stream(5);
    assert_eq!(flow.window_size(5), 65_535);
}
