//! HPACK integration tests
//!
//! The encoder and decoder are exercised against each other and against
//! `fluke-hpack` as an independent implementation.

mod decoding;
mod round_trip;

use h2_engine::{HeaderField, Headers};

/// Build a header list from static pairs.
pub fn headers(fields: &[(&'static str, &'static str)]) -> Headers {
    fields
        .iter()
        .map(|(n, v)| HeaderField::new(*n, *v))
        .collect()
}

/// Small deterministic xorshift generator for random header bytes.
pub struct XorShift(u64);

impl XorShift {
    pub fn new(seed: u64) -> Self {
        Self(seed.max(1))
    }

    pub fn next_u64(&mut self) -> u64 {
        let mut x = self.0;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.0 = x;
        x
    }

    pub fn bytes(&mut self, len: usize) -> Vec<u8> {
        (0..len).map(|_| self.next_u64() as u8).collect()
    }

    /// Lowercase ASCII token, valid as a header name.
    pub fn token(&mut self, len: usize) -> String {
        (0..len)
            .map(|_| (b'a' + (self.next_u64() % 26) as u8) as char)
            .collect()
    }
}
