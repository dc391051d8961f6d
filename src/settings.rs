//! SETTINGS map (RFC 7540 Section 6.5)
//!
//! A validated mapping from 16-bit identifiers to 32-bit values. Standard
//! identifiers have typed accessors; any other identifier is stored and
//! serialized untouched so that extension settings round-trip.

use crate::error::{ErrorCode, H2Error, H2Result};
use crate::frame::settings_id;

/// Protocol defaults and bounds
pub mod defaults {
    pub const HEADER_TABLE_SIZE: u32 = 4096;
    pub const ENABLE_PUSH: bool = true;
    pub const INITIAL_WINDOW_SIZE: u32 = 65_535;
    pub const MAX_FRAME_SIZE: u32 = 16_384;
    pub const MAX_FRAME_SIZE_UPPER_LIMIT: u32 = 16_777_215;
    /// Flow-control windows are bounded by 2^31-1.
    pub const MAX_WINDOW_SIZE: u32 = 0x7FFF_FFFF;
    /// Local default for SETTINGS_MAX_HEADER_LIST_SIZE (the protocol default is unlimited).
    pub const MAX_HEADER_LIST_SIZE: u32 = 8192;
    /// Local default for SETTINGS_MAX_CONCURRENT_STREAMS (the protocol default is unlimited).
    pub const MAX_CONCURRENT_STREAMS: u32 = 100;
}

/// SETTINGS identifier/value pairs in insertion order.
#[derive(Debug, Clone, Default, Eq)]
pub struct Settings {
    entries: Vec<(u16, u32)>,
}

impl PartialEq for Settings {
    fn eq(&self, other: &Self) -> bool {
        self.entries.len() == other.entries.len()
            && self.entries.iter().all(|(id, value)| other.get(*id) == Some(*value))
    }
}

/// Check `value` against the bounds for `id`. Returns the value as a u32.
fn validate(id: u16, value: i64) -> H2Result<u32> {
    let invalid = || H2Error::InvalidSetting { id, value };
    let value = u32::try_from(value).map_err(|_| invalid())?;
    let ok = match id {
        settings_id::ENABLE_PUSH => value <= 1,
        settings_id::INITIAL_WINDOW_SIZE => value <= defaults::MAX_WINDOW_SIZE,
        settings_id::MAX_FRAME_SIZE => {
            (defaults::MAX_FRAME_SIZE..=defaults::MAX_FRAME_SIZE_UPPER_LIMIT).contains(&value)
        }
        _ => true,
    };
    if ok {
        Ok(value)
    } else {
        Err(invalid())
    }
}

impl Settings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a setting, returning the previous value.
    /// Out-of-range values are rejected, never clamped.
    pub fn put(&mut self, id: u16, value: i64) -> H2Result<Option<u32>> {
        let value = validate(id, value)?;
        match self.entries.iter_mut().find(|(k, _)| *k == id) {
            Some(entry) => Ok(Some(std::mem::replace(&mut entry.1, value))),
            None => {
                self.entries.push((id, value));
                Ok(None)
            }
        }
    }

    pub fn get(&self, id: u16) -> Option<u32> {
        self.entries.iter().find(|(k, _)| *k == id).map(|(_, v)| *v)
    }

    pub fn remove(&mut self, id: u16) -> Option<u32> {
        let pos = self.entries.iter().position(|(k, _)| *k == id)?;
        Some(self.entries.remove(pos).1)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u16, u32)> + '_ {
        self.entries.iter().copied()
    }

    pub fn header_table_size(&self) -> Option<u32> {
        self.get(settings_id::HEADER_TABLE_SIZE)
    }

    pub fn set_header_table_size(&mut self, value: u32) -> &mut Self {
        self.put_valid(settings_id::HEADER_TABLE_SIZE, value)
    }

    pub fn push_enabled(&self) -> Option<bool> {
        self.get(settings_id::ENABLE_PUSH).map(|v| v == 1)
    }

    pub fn set_push_enabled(&mut self, enabled: bool) -> &mut Self {
        self.put_valid(settings_id::ENABLE_PUSH, enabled as u32)
    }

    pub fn max_concurrent_streams(&self) -> Option<u32> {
        self.get(settings_id::MAX_CONCURRENT_STREAMS)
    }

    pub fn set_max_concurrent_streams(&mut self, value: u32) -> &mut Self {
        self.put_valid(settings_id::MAX_CONCURRENT_STREAMS, value)
    }

    pub fn initial_window_size(&self) -> Option<u32> {
        self.get(settings_id::INITIAL_WINDOW_SIZE)
    }

    pub fn set_initial_window_size(&mut self, value: u32) -> H2Result<&mut Self> {
        self.put(settings_id::INITIAL_WINDOW_SIZE, value as i64)?;
        Ok(self)
    }

    pub fn max_frame_size(&self) -> Option<u32> {
        self.get(settings_id::MAX_FRAME_SIZE)
    }

    pub fn set_max_frame_size(&mut self, value: u32) -> H2Result<&mut Self> {
        self.put(settings_id::MAX_FRAME_SIZE, value as i64)?;
        Ok(self)
    }

    pub fn max_header_list_size(&self) -> Option<u32> {
        self.get(settings_id::MAX_HEADER_LIST_SIZE)
    }

    pub fn set_max_header_list_size(&mut self, value: u32) -> &mut Self {
        self.put_valid(settings_id::MAX_HEADER_LIST_SIZE, value)
    }

    // Setters whose whole u32 domain is valid.
    fn put_valid(&mut self, id: u16, value: u32) -> &mut Self {
        match self.entries.iter_mut().find(|(k, _)| *k == id) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((id, value)),
        }
        self
    }

    /// Serialize as a SETTINGS frame payload (6 bytes per entry).
    pub fn encode(&self) -> Vec<u8> {
        let mut payload = Vec::with_capacity(self.entries.len() * 6);
        for (id, value) in &self.entries {
            payload.extend_from_slice(&id.to_be_bytes());
            payload.extend_from_slice(&value.to_be_bytes());
        }
        payload
    }

    /// Parse a SETTINGS frame payload received from the peer.
    ///
    /// Errors are connection errors: FRAME_SIZE_ERROR for a ragged payload,
    /// FLOW_CONTROL_ERROR for an oversized initial window, PROTOCOL_ERROR otherwise.
    pub fn decode(payload: &[u8]) -> H2Result<Self> {
        if payload.len() % 6 != 0 {
            return Err(H2Error::frame_size(format!(
                "SETTINGS payload length {} is not a multiple of 6",
                payload.len()
            )));
        }
        let mut settings = Settings::new();
        for chunk in payload.chunks_exact(6) {
            let id = u16::from_be_bytes([chunk[0], chunk[1]]);
            let value = u32::from_be_bytes([chunk[2], chunk[3], chunk[4], chunk[5]]);
            if let Err(err) = settings.put(id, value as i64) {
                let code = if id == settings_id::INITIAL_WINDOW_SIZE {
                    ErrorCode::FlowControlError
                } else {
                    ErrorCode::ProtocolError
                };
                return Err(H2Error::connection(code, err.to_string()));
            }
        }
        Ok(settings)
    }

    /// Overlay `other` onto `self`, replacing values present in both.
    pub fn merge(&mut self, other: &Settings) {
        for (id, value) in other.iter() {
            self.put_valid(id, value);
        }
    }
}
