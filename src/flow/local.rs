//! Inbound flow control: the windows we granted to the peer.

use std::collections::HashMap;

use tracing::{trace, warn};

use crate::error::{ErrorCode, H2Error, H2Result};
use crate::settings::defaults;

#[derive(Debug, Clone, Copy)]
struct RecvWindow {
    /// Window as the peer sees it; shrinks with each DATA frame.
    window: i32,
    /// Bytes consumed by the application but not yet returned to the peer.
    unacked: i32,
}

impl RecvWindow {
    fn new(size: i32) -> Self {
        Self {
            window: size,
            unacked: 0,
        }
    }

    /// Returns the WINDOW_UPDATE increment once half of `target` is owed.
    fn consume(&mut self, n: i32, target: i32) -> Option<u32> {
        self.unacked += n;
        if self.unacked > 0 && self.unacked * 2 >= target {
            let increment = self.unacked;
            self.window += increment;
            self.unacked = 0;
            Some(increment as u32)
        } else {
            None
        }
    }
}

/// Receive-side windows for the connection and each stream.
#[derive(Debug, Clone)]
pub struct LocalFlowController {
    connection: RecvWindow,
    connection_target: i32,
    initial_window: i32,
    streams: HashMap<u32, RecvWindow>,
}

impl Default for LocalFlowController {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalFlowController {
    pub fn new() -> Self {
        let initial = defaults::INITIAL_WINDOW_SIZE as i32;
        Self {
            connection: RecvWindow::new(initial),
            connection_target: initial,
            initial_window: initial,
            streams: HashMap::new(),
        }
    }

    pub fn initial_window_size(&self) -> i32 {
        self.initial_window
    }

    /// Remaining receive window for `stream_id` (0 is the connection).
    pub fn window_size(&self, stream_id: u32) -> i32 {
        if stream_id == 0 {
            return self.connection.window;
        }
        self.streams
            .get(&stream_id)
            .map_or(self.initial_window, |w| w.window)
    }

    /// Charge a DATA frame (payload plus padding) against the windows.
    ///
    /// The connection window is charged first; when only the stream window
    /// overflows, the connection bytes stay charged and the caller returns
    /// them with [`consume_bytes`](Self::consume_bytes) on stream 0.
    pub fn receive_data(&mut self, stream_id: u32, len: usize) -> H2Result<()> {
        let len = i32::try_from(len).map_err(|_| {
            H2Error::connection(ErrorCode::FlowControlError, "DATA larger than any window")
        })?;
        if len > self.connection.window {
            warn!(len, window = self.connection.window, "[FLOW] connection receive window exceeded");
            return Err(H2Error::connection(
                ErrorCode::FlowControlError,
                format!(
                    "received {} bytes with connection window {}",
                    len, self.connection.window
                ),
            ));
        }
        self.connection.window -= len;

        if stream_id == 0 {
            return Ok(());
        }
        let initial = self.initial_window;
        let window = self
            .streams
            .entry(stream_id)
            .or_insert_with(|| RecvWindow::new(initial));
        if len > window.window {
            warn!(stream_id, len, window = window.window, "[FLOW] stream receive window exceeded");
            return Err(H2Error::stream(
                stream_id,
                ErrorCode::FlowControlError,
                format!("received {} bytes with stream window {}", len, window.window),
            ));
        }
        window.window -= len;
        trace!(stream_id, len, "[FLOW] DATA received");
        Ok(())
    }

    /// The application processed `n` bytes of `stream_id`. Returns the
    /// WINDOW_UPDATE frames to send as `(stream_id, increment)`, connection
    /// first. Stream 0 releases connection bytes only.
    pub fn consume_bytes(&mut self, stream_id: u32, n: usize) -> Vec<(u32, u32)> {
        let n = n.min(i32::MAX as usize) as i32;
        let mut updates = Vec::new();
        if n == 0 {
            return updates;
        }
        if let Some(inc) = self.connection.consume(n, self.connection_target) {
            updates.push((0, inc));
        }
        if stream_id != 0 {
            let target = self.initial_window;
            if let Some(inc) = self
                .streams
                .get_mut(&stream_id)
                .and_then(|w| w.consume(n, target))
            {
                updates.push((stream_id, inc));
            }
        }
        updates
    }

    /// Our SETTINGS_INITIAL_WINDOW_SIZE was acknowledged.
    pub fn set_initial_window_size(&mut self, size: u32) -> H2Result<()> {
        if size > defaults::MAX_WINDOW_SIZE {
            return Err(H2Error::InvalidSetting {
                id: crate::frame::settings_id::INITIAL_WINDOW_SIZE,
                value: size as i64,
            });
        }
        let delta = size as i64 - self.initial_window as i64;
        for window in self.streams.values_mut() {
            window.window = (window.window as i64 + delta)
                .clamp(i32::MIN as i64, i32::MAX as i64) as i32;
        }
        self.initial_window = size as i32;
        Ok(())
    }

    /// Grow the connection receive window beyond the protocol default.
    /// Returns the WINDOW_UPDATE increment to send on stream 0.
    pub fn set_connection_window_size(&mut self, size: u32) -> Option<u32> {
        let size = size.min(defaults::MAX_WINDOW_SIZE) as i32;
        if size <= self.connection_target {
            return None;
        }
        let increment = size - self.connection_target;
        self.connection_target = size;
        self.connection.window += increment;
        Some(increment as u32)
    }

    pub fn remove_stream(&mut self, stream_id: u32) {
        self.streams.remove(&stream_id);
    }
}
