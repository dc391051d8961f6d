//! Flow control integration tests
//!
//! Controllers and distributors are driven through their public API, and
//! whole connections through a pair of codecs.

mod windows;

use std::collections::BTreeMap;

use h2_engine::{
    CodecConfig, DistributorKind, Frame, FrameReader, H2Codec, H2Event, Headers,
    StreamByteDistributor, StreamableState,
};

pub fn streamable(stream_id: u32, bytes: usize) -> StreamableState {
    StreamableState {
        stream_id,
        streamable_bytes: bytes,
        has_frame: bytes > 0,
        window_size: 65_535,
    }
}

/// Run one distribution pass, summing grants per stream.
pub fn distribute(
    dist: &mut dyn StreamByteDistributor,
    max_bytes: usize,
    max_write: usize,
) -> BTreeMap<u32, usize> {
    let mut grants = BTreeMap::new();
    dist.distribute(max_bytes, max_write, &mut |id, n| {
        *grants.entry(id).or_insert(0) += n
    });
    grants
}

/// DATA payload bytes per stream in everything the codec has written.
pub fn data_written(codec: &mut H2Codec) -> BTreeMap<u32, usize> {
    let out = codec.take_output();
    let mut totals = BTreeMap::new();
    for frame in FrameReader::new().read(&out).unwrap() {
        if let Frame::Data { stream_id, data, .. } = frame {
            *totals.entry(stream_id).or_insert(0) += data.len();
        }
    }
    totals
}

/// DATA payload bytes per stream among received events.
pub fn data_received(events: &[H2Event]) -> BTreeMap<u32, usize> {
    let mut totals = BTreeMap::new();
    for event in events {
        if let H2Event::Data { stream_id, data, .. } = event {
            *totals.entry(*stream_id).or_insert(0) += data.len();
        }
    }
    totals
}

pub fn request() -> Headers {
    let mut headers = Headers::new();
    headers
        .add(":method", "POST")
        .add(":scheme", "http")
        .add(":path", "/upload")
        .add(":authority", "localhost");
    headers
}

pub fn response() -> Headers {
    let mut headers = Headers::new();
    headers.add(":status", "200");
    headers
}

pub fn pump(client: &mut H2Codec, server: &mut H2Codec) -> (Vec<H2Event>, Vec<H2Event>) {
    let (mut client_events, mut server_events) = (Vec::new(), Vec::new());
    for _ in 0..32 {
        let to_server = client.take_output();
        let to_client = server.take_output();
        if to_server.is_empty() && to_client.is_empty() {
            break;
        }
        server.process(&to_server, &mut server_events).unwrap();
        client.process(&to_client, &mut client_events).unwrap();
    }
    (client_events, server_events)
}

/// Client using `distributor`, connected to a default server.
pub fn connected(distributor: DistributorKind) -> (H2Codec, H2Codec) {
    let mut client = H2Codec::new(CodecConfig::client().with_distributor(distributor)).unwrap();
    let mut server = H2Codec::server().unwrap();
    pump(&mut client, &mut server);
    (client, server)
}
