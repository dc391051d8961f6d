//! Round trips and interop with fluke-hpack

use h2_engine::{HeaderField, Headers, HpackDecoder, HpackEncoder, NeverSensitive};

use super::{headers, XorShift};

fn random_headers(rng: &mut XorShift, count: usize) -> Headers {
    (0..count)
        .map(|_| {
            let name_len = 1 + (rng.next_u64() % 20) as usize;
            let value_len = (rng.next_u64() % 40) as usize;
            HeaderField::new(rng.token(name_len), rng.bytes(value_len))
        })
        .collect()
}

fn pairs(list: &Headers) -> Vec<(Vec<u8>, Vec<u8>)> {
    list.iter()
        .map(|f| (f.name().to_vec(), f.value().to_vec()))
        .collect()
}

#[test]
fn test_random_lists_round_trip_in_order() {
    let mut rng = XorShift::new(7);
    let mut encoder = HpackEncoder::new();
    let mut decoder = HpackDecoder::new();

    for stream_id in (1..200u32).step_by(2) {
        let count = 1 + (rng.next_u64() % 8) as usize;
        let list = random_headers(&mut rng, count);
        let block = encoder
            .encode_headers(stream_id, &list, &NeverSensitive)
            .unwrap();
        assert_eq!(decoder.decode_headers(stream_id, &block).unwrap(), list);
        assert!(encoder.table().size() <= encoder.table().max_size());
        assert_eq!(encoder.table().size(), decoder.table().size());
        assert_eq!(encoder.table().len(), decoder.table().len());
    }
}

#[test]
fn test_small_table_stays_in_lockstep() {
    let mut rng = XorShift::new(99);
    let mut encoder = HpackEncoder::new();
    let mut decoder = HpackDecoder::new();
    encoder.set_max_header_table_size(128);

    for stream_id in (1..100u32).step_by(2) {
        let list = random_headers(&mut rng, 3);
        let block = encoder
            .encode_headers(stream_id, &list, &NeverSensitive)
            .unwrap();
        assert_eq!(decoder.decode_headers(stream_id, &block).unwrap(), list);
        assert!(decoder.table().size() <= 128);
        assert_eq!(encoder.table().size(), decoder.table().size());
    }
}

// ============================================================================
// fluke-hpack interop
// ============================================================================

#[test]
fn test_fluke_decodes_our_blocks() {
    let mut rng = XorShift::new(1234);
    let mut encoder = HpackEncoder::new();
    let mut fluke = fluke_hpack::Decoder::new();

    let fixed = headers(&[
        (":method", "GET"),
        (":scheme", "https"),
        (":path", "/index.html"),
        (":authority", "www.example.com"),
        ("custom-key", "custom-value"),
    ]);
    for stream_id in [1u32, 3] {
        let block = encoder.encode_headers(stream_id, &fixed, &NeverSensitive).unwrap();
        assert_eq!(fluke.decode(&block).unwrap(), pairs(&fixed));
    }

    for stream_id in (5..60u32).step_by(2) {
        let list = random_headers(&mut rng, 4);
        let block = encoder.encode_headers(stream_id, &list, &NeverSensitive).unwrap();
        assert_eq!(fluke.decode(&block).unwrap(), pairs(&list));
    }
}

#[test]
fn test_we_decode_fluke_blocks() {
    let mut rng = XorShift::new(4321);
    let mut fluke = fluke_hpack::Encoder::new();
    let mut decoder = HpackDecoder::new();

    for stream_id in (1..60u32).step_by(2) {
        let list = random_headers(&mut rng, 5);
        let raw = pairs(&list);
        let block = fluke.encode(raw.iter().map(|(n, v)| (&n[..], &v[..])));
        assert_eq!(decoder.decode_headers(stream_id, &block).unwrap(), list);
    }
}
