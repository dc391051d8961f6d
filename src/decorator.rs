//! Encoder/decoder decorators.
//!
//! A decorator wraps a base [`ConnectionEncoder`] or [`ConnectionDecoder`],
//! forwards everything, and overrides only what it adds. Decorators nest.

use bytes::Bytes;
use tracing::warn;

use crate::codec::{ConnectionDecoder, ConnectionEncoder, FrameListener, SettingsReceivedConsumer};
use crate::connection::Connection;
use crate::error::{ErrorCode, H2Error, H2Result};
use crate::frame::{frame_type, Frame, PriorityInfo};
use crate::hpack::Headers;
use crate::settings::Settings;

/// Default number of empty DATA frames tolerated in a row.
pub const DEFAULT_MAX_CONSECUTIVE_EMPTY_FRAMES: usize = 2;

// ============================================================================
// Encoder
// ============================================================================

/// Forwards every call to the wrapped encoder.
#[derive(Debug)]
pub struct DecoratingEncoder<E> {
    inner: E,
}

impl<E: ConnectionEncoder> DecoratingEncoder<E> {
    pub fn new(inner: E) -> Self {
        Self { inner }
    }

    pub fn inner(&self) -> &E {
        &self.inner
    }

    pub fn inner_mut(&mut self) -> &mut E {
        &mut self.inner
    }

    pub fn into_inner(self) -> E {
        self.inner
    }
}

impl<E: ConnectionEncoder> ConnectionEncoder for DecoratingEncoder<E> {
    fn write_headers(
        &mut self,
        conn: &mut Connection,
        stream_id: u32,
        headers: &Headers,
        priority: Option<PriorityInfo>,
        end_stream: bool,
    ) -> H2Result<()> {
        self.inner
            .write_headers(conn, stream_id, headers, priority, end_stream)
    }

    fn write_data(
        &mut self,
        conn: &mut Connection,
        stream_id: u32,
        data: Bytes,
        end_stream: bool,
    ) -> H2Result<()> {
        self.inner.write_data(conn, stream_id, data, end_stream)
    }

    fn write_priority(
        &mut self,
        conn: &mut Connection,
        stream_id: u32,
        priority: PriorityInfo,
    ) -> H2Result<()> {
        self.inner.write_priority(conn, stream_id, priority)
    }

    fn write_rst_stream(
        &mut self,
        conn: &mut Connection,
        stream_id: u32,
        code: ErrorCode,
    ) -> H2Result<()> {
        self.inner.write_rst_stream(conn, stream_id, code)
    }

    fn write_settings(&mut self, conn: &mut Connection, settings: Settings) -> H2Result<()> {
        self.inner.write_settings(conn, settings)
    }

    fn write_settings_ack(&mut self, conn: &mut Connection) -> H2Result<()> {
        self.inner.write_settings_ack(conn)
    }

    fn write_ping(&mut self, conn: &mut Connection, ack: bool, data: [u8; 8]) -> H2Result<()> {
        self.inner.write_ping(conn, ack, data)
    }

    fn write_goaway(
        &mut self,
        conn: &mut Connection,
        last_stream_id: u32,
        code: ErrorCode,
        debug_data: &[u8],
    ) -> H2Result<()> {
        self.inner
            .write_goaway(conn, last_stream_id, code, debug_data)
    }

    fn write_window_update(
        &mut self,
        conn: &mut Connection,
        stream_id: u32,
        increment: u32,
    ) -> H2Result<()> {
        self.inner.write_window_update(conn, stream_id, increment)
    }

    fn write_push_promise(
        &mut self,
        conn: &mut Connection,
        stream_id: u32,
        promised_stream_id: u32,
        headers: &Headers,
    ) -> H2Result<()> {
        self.inner
            .write_push_promise(conn, stream_id, promised_stream_id, headers)
    }

    fn remote_window_update(
        &mut self,
        conn: &mut Connection,
        stream_id: u32,
        increment: u32,
    ) -> H2Result<()> {
        self.inner.remote_window_update(conn, stream_id, increment)
    }

    fn priority_changed(&mut self, stream_id: u32, parent: u32, weight: u16, exclusive: bool) {
        self.inner
            .priority_changed(stream_id, parent, weight, exclusive)
    }

    fn stream_closed(&mut self, stream_id: u32) {
        self.inner.stream_closed(stream_id)
    }

    fn flush(&mut self, conn: &mut Connection) -> H2Result<usize> {
        self.inner.flush(conn)
    }

    fn take_output(&mut self) -> Bytes {
        self.inner.take_output()
    }

    fn settings_consumer(&mut self) -> Option<&mut dyn SettingsReceivedConsumer> {
        Some(self as &mut dyn SettingsReceivedConsumer)
    }
}

impl<E: ConnectionEncoder> SettingsReceivedConsumer for DecoratingEncoder<E> {
    /// Forwards to the wrapped encoder. A base without the capability is a
    /// wiring mistake, reported to the integrator rather than the peer.
    fn consume_received_settings(
        &mut self,
        conn: &mut Connection,
        settings: &Settings,
    ) -> H2Result<()> {
        match self.inner.settings_consumer() {
            Some(consumer) => consumer.consume_received_settings(conn, settings),
            None => Err(H2Error::UnsupportedOperation(
                "wrapped encoder does not consume received settings",
            )),
        }
    }
}

// ============================================================================
// Decoder
// ============================================================================

/// Forwards every call to the wrapped decoder.
#[derive(Debug)]
pub struct DecoratingDecoder<D> {
    inner: D,
}

impl<D: ConnectionDecoder> DecoratingDecoder<D> {
    pub fn new(inner: D) -> Self {
        Self { inner }
    }

    pub fn inner(&self) -> &D {
        &self.inner
    }

    pub fn inner_mut(&mut self) -> &mut D {
        &mut self.inner
    }

    pub fn into_inner(self) -> D {
        self.inner
    }
}

impl<D: ConnectionDecoder> ConnectionDecoder for DecoratingDecoder<D> {
    fn decode_frame(
        &mut self,
        conn: &mut Connection,
        encoder: &mut dyn ConnectionEncoder,
        frame: Frame,
        listener: &mut dyn FrameListener,
    ) -> H2Result<()> {
        self.inner.decode_frame(conn, encoder, frame, listener)
    }

    fn stream_closed(&mut self, stream_id: u32) {
        self.inner.stream_closed(stream_id)
    }
}

/// Guards against floods of empty DATA frames.
///
/// Empty DATA without END_STREAM carries nothing, so up to
/// `max_consecutive_empty_frames` in a row are dropped after the stream-state
/// check. One more is a connection ENHANCE_YOUR_CALM error. HEADERS or
/// non-empty DATA resets the count. Empty DATA with END_STREAM is always
/// delivered. Padded empty frames count toward the limit too, but reach the
/// base decoder so their padding is charged to flow control.
#[derive(Debug)]
pub struct EmptyDataFrameDecoder<D> {
    inner: DecoratingDecoder<D>,
    max_consecutive_empty_frames: usize,
    empty_frames: usize,
}

impl<D: ConnectionDecoder> EmptyDataFrameDecoder<D> {
    pub fn new(inner: D) -> Self {
        Self::with_limit(inner, DEFAULT_MAX_CONSECUTIVE_EMPTY_FRAMES)
    }

    pub fn with_limit(inner: D, max_consecutive_empty_frames: usize) -> Self {
        Self {
            inner: DecoratingDecoder::new(inner),
            max_consecutive_empty_frames,
            empty_frames: 0,
        }
    }

    pub fn inner(&self) -> &D {
        self.inner.inner()
    }
}

impl<D: ConnectionDecoder> ConnectionDecoder for EmptyDataFrameDecoder<D> {
    fn decode_frame(
        &mut self,
        conn: &mut Connection,
        encoder: &mut dyn ConnectionEncoder,
        frame: Frame,
        listener: &mut dyn FrameListener,
    ) -> H2Result<()> {
        match &frame {
            Frame::Data {
                stream_id,
                data,
                end_stream: false,
                padding,
            } if data.is_empty() => {
                self.empty_frames += 1;
                if self.empty_frames > self.max_consecutive_empty_frames {
                    warn!(
                        stream_id = *stream_id,
                        count = self.empty_frames,
                        "[H2] too many consecutive empty DATA frames"
                    );
                    return Err(H2Error::connection(
                        ErrorCode::EnhanceYourCalm,
                        format!("{} consecutive empty DATA frames", self.empty_frames),
                    ));
                }
                if *padding == 0 {
                    conn.check_inbound(frame_type::DATA, *stream_id)?;
                    return Ok(());
                }
            }
            Frame::Data { .. } | Frame::Headers { .. } => self.empty_frames = 0,
            _ => {}
        }
        self.inner.decode_frame(conn, encoder, frame, listener)
    }

    fn stream_closed(&mut self, stream_id: u32) {
        self.inner.stream_closed(stream_id)
    }
}
