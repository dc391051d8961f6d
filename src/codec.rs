//! Connection-level encoder and decoder.
//!
//! [`ConnectionEncoder`] validates outbound frames against the [`Connection`],
//! HPACK-encodes headers and routes DATA through remote flow control.
//! [`ConnectionDecoder`] does the inverse for inbound frames and reports them
//! to a [`FrameListener`]. Both are object safe so decorators can wrap them.

use std::fmt;

use bytes::Bytes;
use tracing::{debug, trace};

use crate::connection::{Connection, Inbound};
use crate::error::{ErrorCode, H2Error, H2Result};
use crate::flow::{
    LocalFlowController, RemoteFlowController, StreamByteDistributor, WeightedFairQueueDistributor,
};
use crate::frame::{frame_type, Frame, PriorityInfo};
use crate::hpack::{Headers, HpackDecoder, HpackEncoder, NeverSensitive, SensitivityDetector};
use crate::settings::Settings;
use crate::stream::StreamState;
use crate::writer::{FrameEncoder, FrameWriter};

// ============================================================================
// Listener
// ============================================================================

/// Receives decoded inbound frames. Every method defaults to a no-op.
#[allow(unused_variables)]
pub trait FrameListener {
    fn on_headers_read(
        &mut self,
        stream_id: u32,
        headers: Headers,
        priority: Option<PriorityInfo>,
        end_stream: bool,
    ) {
    }
    fn on_data_read(&mut self, stream_id: u32, data: Bytes, end_stream: bool) {}
    fn on_priority_read(&mut self, stream_id: u32, priority: PriorityInfo) {}
    fn on_rst_stream_read(&mut self, stream_id: u32, code: ErrorCode) {}
    fn on_settings_read(&mut self, settings: &Settings) {}
    fn on_settings_ack_read(&mut self) {}
    fn on_ping_read(&mut self, data: [u8; 8]) {}
    fn on_ping_ack_read(&mut self, data: [u8; 8]) {}
    fn on_push_promise_read(&mut self, stream_id: u32, promised_stream_id: u32, headers: Headers) {}
    fn on_goaway_read(&mut self, last_stream_id: u32, code: ErrorCode, debug_data: Bytes) {}
    fn on_window_update_read(&mut self, stream_id: u32, increment: u32) {}
    fn on_unknown_frame(&mut self, frame_type: u8, flags: u8, stream_id: u32, payload: Bytes) {}
}

/// Discards every event.
impl FrameListener for () {}

/// Events recorded by the `Vec<H2Event>` listener.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum H2Event {
    /// Request on the server side, response (or trailers) on the client side
    Headers {
        stream_id: u32,
        headers: Headers,
        priority: Option<PriorityInfo>,
        end_stream: bool,
    },
    Data {
        stream_id: u32,
        data: Bytes,
        end_stream: bool,
    },
    Priority {
        stream_id: u32,
        priority: PriorityInfo,
    },
    /// Stream was reset (RST_STREAM)
    StreamReset {
        stream_id: u32,
        error_code: ErrorCode,
    },
    GoAway {
        last_stream_id: u32,
        error_code: ErrorCode,
        debug_data: Bytes,
    },
    /// Settings frame; `settings` is empty for ACKs.
    Settings {
        ack: bool,
        settings: Settings,
    },
    WindowUpdate {
        stream_id: u32,
        increment: u32,
    },
    Ping {
        ack: bool,
        data: [u8; 8],
    },
    PushPromise {
        stream_id: u32,
        promised_stream_id: u32,
        headers: Headers,
    },
    Unknown {
        frame_type: u8,
        stream_id: u32,
        payload: Bytes,
    },
}

impl FrameListener for Vec<H2Event> {
    fn on_headers_read(
        &mut self,
        stream_id: u32,
        headers: Headers,
        priority: Option<PriorityInfo>,
        end_stream: bool,
    ) {
        self.push(H2Event::Headers {
            stream_id,
            headers,
            priority,
            end_stream,
        });
    }

    fn on_data_read(&mut self, stream_id: u32, data: Bytes, end_stream: bool) {
        self.push(H2Event::Data {
            stream_id,
            data,
            end_stream,
        });
    }

    fn on_priority_read(&mut self, stream_id: u32, priority: PriorityInfo) {
        self.push(H2Event::Priority { stream_id, priority });
    }

    fn on_rst_stream_read(&mut self, stream_id: u32, code: ErrorCode) {
        self.push(H2Event::StreamReset {
            stream_id,
            error_code: code,
        });
    }

    fn on_settings_read(&mut self, settings: &Settings) {
        self.push(H2Event::Settings {
            ack: false,
            settings: settings.clone(),
        });
    }

    fn on_settings_ack_read(&mut self) {
        self.push(H2Event::Settings {
            ack: true,
            settings: Settings::new(),
        });
    }

    fn on_ping_read(&mut self, data: [u8; 8]) {
        self.push(H2Event::Ping { ack: false, data });
    }

    fn on_ping_ack_read(&mut self, data: [u8; 8]) {
        self.push(H2Event::Ping { ack: true, data });
    }

    fn on_push_promise_read(&mut self, stream_id: u32, promised_stream_id: u32, headers: Headers) {
        self.push(H2Event::PushPromise {
            stream_id,
            promised_stream_id,
            headers,
        });
    }

    fn on_goaway_read(&mut self, last_stream_id: u32, code: ErrorCode, debug_data: Bytes) {
        self.push(H2Event::GoAway {
            last_stream_id,
            error_code: code,
            debug_data,
        });
    }

    fn on_window_update_read(&mut self, stream_id: u32, increment: u32) {
        self.push(H2Event::WindowUpdate {
            stream_id,
            increment,
        });
    }

    fn on_unknown_frame(&mut self, frame_type: u8, _flags: u8, stream_id: u32, payload: Bytes) {
        self.push(H2Event::Unknown {
            frame_type,
            stream_id,
            payload,
        });
    }
}

// ============================================================================
// Encoder
// ============================================================================

/// Capability of encoders that can apply the peer's SETTINGS.
pub trait SettingsReceivedConsumer {
    fn consume_received_settings(
        &mut self,
        conn: &mut Connection,
        settings: &Settings,
    ) -> H2Result<()>;
}

/// Outbound half of a connection.
pub trait ConnectionEncoder {
    fn write_headers(
        &mut self,
        conn: &mut Connection,
        stream_id: u32,
        headers: &Headers,
        priority: Option<PriorityInfo>,
        end_stream: bool,
    ) -> H2Result<()>;

    /// Queue DATA behind flow control; it goes out on [`flush`](Self::flush).
    fn write_data(
        &mut self,
        conn: &mut Connection,
        stream_id: u32,
        data: Bytes,
        end_stream: bool,
    ) -> H2Result<()>;

    fn write_priority(
        &mut self,
        conn: &mut Connection,
        stream_id: u32,
        priority: PriorityInfo,
    ) -> H2Result<()>;

    fn write_rst_stream(
        &mut self,
        conn: &mut Connection,
        stream_id: u32,
        code: ErrorCode,
    ) -> H2Result<()>;

    fn write_settings(&mut self, conn: &mut Connection, settings: Settings) -> H2Result<()>;

    fn write_settings_ack(&mut self, conn: &mut Connection) -> H2Result<()>;

    fn write_ping(&mut self, conn: &mut Connection, ack: bool, data: [u8; 8]) -> H2Result<()>;

    fn write_goaway(
        &mut self,
        conn: &mut Connection,
        last_stream_id: u32,
        code: ErrorCode,
        debug_data: &[u8],
    ) -> H2Result<()>;

    fn write_window_update(
        &mut self,
        conn: &mut Connection,
        stream_id: u32,
        increment: u32,
    ) -> H2Result<()>;

    fn write_push_promise(
        &mut self,
        conn: &mut Connection,
        stream_id: u32,
        promised_stream_id: u32,
        headers: &Headers,
    ) -> H2Result<()>;

    /// WINDOW_UPDATE received from the peer.
    fn remote_window_update(
        &mut self,
        conn: &mut Connection,
        stream_id: u32,
        increment: u32,
    ) -> H2Result<()>;

    /// The peer reprioritized `stream_id`; values are as applied to the connection.
    fn priority_changed(&mut self, stream_id: u32, parent: u32, weight: u16, exclusive: bool);

    /// `stream_id` closed; drop its queued data.
    fn stream_closed(&mut self, stream_id: u32);

    /// Run a flow-control distribution pass. Returns DATA bytes written.
    fn flush(&mut self, conn: &mut Connection) -> H2Result<usize>;

    fn take_output(&mut self) -> Bytes;

    /// Probe for [`SettingsReceivedConsumer`].
    fn settings_consumer(&mut self) -> Option<&mut dyn SettingsReceivedConsumer> {
        None
    }
}

/// Default encoder: HPACK, remote flow control and a [`FrameWriter`].
pub struct DefaultEncoder {
    hpack: HpackEncoder,
    flow: RemoteFlowController<Box<dyn StreamByteDistributor>>,
    writer: Box<dyn FrameWriter>,
    sensitivity: Box<dyn SensitivityDetector>,
}

impl fmt::Debug for DefaultEncoder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DefaultEncoder")
            .field("hpack", &self.hpack)
            .field("connection_window", &self.flow.window_size(0))
            .finish_non_exhaustive()
    }
}

impl Default for DefaultEncoder {
    fn default() -> Self {
        Self::new(Box::new(WeightedFairQueueDistributor::new()))
    }
}

impl DefaultEncoder {
    pub fn new(distributor: Box<dyn StreamByteDistributor>) -> Self {
        Self::with_writer(Box::new(FrameEncoder::new()), distributor)
    }

    pub fn with_writer(
        writer: Box<dyn FrameWriter>,
        distributor: Box<dyn StreamByteDistributor>,
    ) -> Self {
        Self {
            hpack: HpackEncoder::new(),
            flow: RemoteFlowController::new(distributor),
            writer,
            sensitivity: Box::new(NeverSensitive),
        }
    }

    pub fn set_sensitivity_detector(&mut self, detector: Box<dyn SensitivityDetector>) {
        self.sensitivity = detector;
    }

    pub fn hpack(&self) -> &HpackEncoder {
        &self.hpack
    }

    pub fn flow(&self) -> &RemoteFlowController<Box<dyn StreamByteDistributor>> {
        &self.flow
    }

    fn apply_priority(
        &mut self,
        conn: &mut Connection,
        stream_id: u32,
        priority: PriorityInfo,
    ) -> H2Result<()> {
        conn.set_priority(stream_id, priority)?;
        if let Some(stream) = conn.stream(stream_id) {
            self.flow.update_dependency_tree(
                stream_id,
                stream.parent(),
                stream.weight(),
                priority.exclusive,
            );
        }
        Ok(())
    }
}

impl ConnectionEncoder for DefaultEncoder {
    fn write_headers(
        &mut self,
        conn: &mut Connection,
        stream_id: u32,
        headers: &Headers,
        priority: Option<PriorityInfo>,
        end_stream: bool,
    ) -> H2Result<()> {
        // Every check that can fail runs before encoding: once the encoder
        // table has changed, the block must reach the peer.
        if priority.is_some_and(|p| p.dependency == stream_id) {
            return Err(H2Error::stream(
                stream_id,
                ErrorCode::ProtocolError,
                "stream depends on itself",
            ));
        }
        if self.flow.is_ended(stream_id) {
            return Err(H2Error::stream(
                stream_id,
                ErrorCode::StreamClosed,
                "headers queued after END_STREAM",
            ));
        }
        let was_idle = conn.stream_state(stream_id) == StreamState::Idle;
        conn.send_headers(stream_id, false)?;
        let block = match self
            .hpack
            .encode_headers(stream_id, headers, &*self.sensitivity)
        {
            Ok(block) => block,
            Err(err) => {
                if was_idle {
                    // Never announced to the peer.
                    conn.reset_stream(stream_id, false);
                }
                return Err(err);
            }
        };
        if let Some(p) = priority {
            self.apply_priority(conn, stream_id, p)?;
        }

        if self.flow.has_pending(stream_id) {
            return self
                .flow
                .enqueue_headers(stream_id, block, end_stream, priority);
        }
        trace!(stream_id, len = block.len(), end_stream, "[H2] HEADERS written");
        self.writer
            .write_headers(stream_id, &block, end_stream, priority);
        if end_stream {
            conn.close_local_side(stream_id)?;
        }
        Ok(())
    }

    fn write_data(
        &mut self,
        conn: &mut Connection,
        stream_id: u32,
        data: Bytes,
        end_stream: bool,
    ) -> H2Result<()> {
        conn.check_outbound(stream_id)?;
        self.flow.enqueue(stream_id, data, end_stream)
    }

    fn write_priority(
        &mut self,
        conn: &mut Connection,
        stream_id: u32,
        priority: PriorityInfo,
    ) -> H2Result<()> {
        self.apply_priority(conn, stream_id, priority)?;
        self.writer.write_priority(stream_id, priority);
        Ok(())
    }

    fn write_rst_stream(
        &mut self,
        conn: &mut Connection,
        stream_id: u32,
        code: ErrorCode,
    ) -> H2Result<()> {
        if conn.stream_state(stream_id) == StreamState::Idle {
            return Err(H2Error::UnsupportedOperation("RST_STREAM on an idle stream"));
        }
        debug!(stream_id, code = %code, "[H2] RST_STREAM written");
        self.writer.write_rst_stream(stream_id, code);
        conn.reset_stream(stream_id, true);
        self.flow.remove_stream(stream_id);
        Ok(())
    }

    fn write_settings(&mut self, conn: &mut Connection, settings: Settings) -> H2Result<()> {
        self.writer.write_settings(&settings);
        conn.push_local_settings(settings);
        Ok(())
    }

    fn write_settings_ack(&mut self, _conn: &mut Connection) -> H2Result<()> {
        self.writer.write_settings_ack();
        Ok(())
    }

    fn write_ping(&mut self, _conn: &mut Connection, ack: bool, data: [u8; 8]) -> H2Result<()> {
        self.writer.write_ping(ack, data);
        Ok(())
    }

    fn write_goaway(
        &mut self,
        conn: &mut Connection,
        last_stream_id: u32,
        code: ErrorCode,
        debug_data: &[u8],
    ) -> H2Result<()> {
        conn.record_goaway_sent(last_stream_id);
        self.writer.write_goaway(last_stream_id, code, debug_data);
        Ok(())
    }

    fn write_window_update(
        &mut self,
        _conn: &mut Connection,
        stream_id: u32,
        increment: u32,
    ) -> H2Result<()> {
        trace!(stream_id, increment, "[H2] WINDOW_UPDATE written");
        self.writer.write_window_update(stream_id, increment);
        Ok(())
    }

    fn write_push_promise(
        &mut self,
        conn: &mut Connection,
        stream_id: u32,
        promised_stream_id: u32,
        headers: &Headers,
    ) -> H2Result<()> {
        conn.reserve_local(promised_stream_id, stream_id)?;
        let block = match self
            .hpack
            .encode_headers(promised_stream_id, headers, &*self.sensitivity)
        {
            Ok(block) => block,
            Err(err) => {
                conn.reset_stream(promised_stream_id, false);
                return Err(err);
            }
        };
        self.writer
            .write_push_promise(stream_id, promised_stream_id, &block);
        Ok(())
    }

    fn remote_window_update(
        &mut self,
        _conn: &mut Connection,
        stream_id: u32,
        increment: u32,
    ) -> H2Result<()> {
        self.flow
            .increment_window(stream_id, increment.min(i32::MAX as u32) as i32)
    }

    fn priority_changed(&mut self, stream_id: u32, parent: u32, weight: u16, exclusive: bool) {
        self.flow
            .update_dependency_tree(stream_id, parent, weight, exclusive);
    }

    fn stream_closed(&mut self, stream_id: u32) {
        self.flow.remove_stream(stream_id);
    }

    fn flush(&mut self, conn: &mut Connection) -> H2Result<usize> {
        self.flow.write_pending(conn, &mut *self.writer)
    }

    fn take_output(&mut self) -> Bytes {
        self.writer.take_output()
    }

    fn settings_consumer(&mut self) -> Option<&mut dyn SettingsReceivedConsumer> {
        Some(self as &mut dyn SettingsReceivedConsumer)
    }
}

impl SettingsReceivedConsumer for DefaultEncoder {
    fn consume_received_settings(
        &mut self,
        conn: &mut Connection,
        settings: &Settings,
    ) -> H2Result<()> {
        if let Some(size) = settings.header_table_size() {
            self.hpack.set_max_header_table_size(size as usize);
        }
        if let Some(size) = settings.max_header_list_size() {
            self.hpack.set_max_header_list_size(size as usize);
        }
        if let Some(size) = settings.initial_window_size() {
            self.flow.set_initial_window_size(size)?;
        }
        if let Some(size) = settings.max_frame_size() {
            self.writer.set_max_frame_size(size as usize);
        }
        conn.apply_remote_settings(settings);
        debug!(entries = settings.len(), "[H2] remote settings applied");
        Ok(())
    }
}

// ============================================================================
// Decoder
// ============================================================================

/// Inbound half of a connection.
pub trait ConnectionDecoder {
    /// Validate and apply one frame, reporting it to `listener`. Replies
    /// (SETTINGS ACK, PING ACK, WINDOW_UPDATE) go out through `encoder`.
    fn decode_frame(
        &mut self,
        conn: &mut Connection,
        encoder: &mut dyn ConnectionEncoder,
        frame: Frame,
        listener: &mut dyn FrameListener,
    ) -> H2Result<()>;

    /// `stream_id` closed; drop its receive window.
    fn stream_closed(&mut self, stream_id: u32);
}

/// Default decoder: HPACK decoding and local flow control.
///
/// DATA is returned to the peer's window as soon as the listener has seen it.
#[derive(Debug, Default)]
pub struct DefaultDecoder {
    hpack: HpackDecoder,
    flow: LocalFlowController,
}

impl DefaultDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn hpack(&self) -> &HpackDecoder {
        &self.hpack
    }

    pub fn flow(&self) -> &LocalFlowController {
        &self.flow
    }

    pub fn flow_mut(&mut self) -> &mut LocalFlowController {
        &mut self.flow
    }

    /// Return `n` consumed bytes to the peer, writing any WINDOW_UPDATE due.
    fn release(
        &mut self,
        conn: &mut Connection,
        encoder: &mut dyn ConnectionEncoder,
        stream_id: u32,
        n: usize,
    ) -> H2Result<()> {
        for (id, increment) in self.flow.consume_bytes(stream_id, n) {
            encoder.write_window_update(conn, id, increment)?;
        }
        Ok(())
    }

    /// Apply a header block priority and mirror it to the encoder's distributor.
    fn prioritize(
        &mut self,
        conn: &mut Connection,
        encoder: &mut dyn ConnectionEncoder,
        stream_id: u32,
        priority: PriorityInfo,
    ) -> H2Result<()> {
        conn.set_priority(stream_id, priority)?;
        if let Some(stream) = conn.stream(stream_id) {
            encoder.priority_changed(stream_id, stream.parent(), stream.weight(), priority.exclusive);
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn on_data(
        &mut self,
        conn: &mut Connection,
        encoder: &mut dyn ConnectionEncoder,
        listener: &mut dyn FrameListener,
        stream_id: u32,
        data: Bytes,
        end_stream: bool,
        padding: usize,
    ) -> H2Result<()> {
        let len = data.len() + padding;
        let inbound = match conn.check_inbound(frame_type::DATA, stream_id) {
            Ok(inbound) => inbound,
            Err(err) if err.is_stream_error() => {
                // Still counts against the connection window.
                self.flow.receive_data(0, len)?;
                self.release(conn, encoder, 0, len)?;
                return Err(err);
            }
            Err(err) => return Err(err),
        };
        if inbound == Inbound::Ignore {
            self.flow.receive_data(0, len)?;
            return self.release(conn, encoder, 0, len);
        }

        if let Err(err) = self.flow.receive_data(stream_id, len) {
            if err.is_stream_error() {
                self.release(conn, encoder, 0, len)?;
            }
            return Err(err);
        }
        if padding > 0 {
            self.release(conn, encoder, stream_id, padding)?;
        }

        let n = data.len();
        listener.on_data_read(stream_id, data, end_stream);
        if end_stream {
            self.release(conn, encoder, 0, n)?;
            conn.close_remote_side(stream_id)?;
        } else {
            self.release(conn, encoder, stream_id, n)?;
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn on_headers(
        &mut self,
        conn: &mut Connection,
        encoder: &mut dyn ConnectionEncoder,
        listener: &mut dyn FrameListener,
        stream_id: u32,
        block: &[u8],
        end_stream: bool,
        priority: Option<PriorityInfo>,
    ) -> H2Result<()> {
        let inbound = conn.check_inbound(frame_type::HEADERS, stream_id);
        // Always decode so the dynamic table stays in step with the peer.
        let decoded = self.hpack.decode_headers(stream_id, block);
        if let Err(err) = &decoded {
            if err.should_goaway() {
                return Err(err.clone());
            }
        }
        if inbound? == Inbound::Ignore {
            return Ok(());
        }

        conn.recv_headers(stream_id, end_stream)?;
        if let Some(p) = priority {
            self.prioritize(conn, encoder, stream_id, p)?;
        }
        let headers = decoded?;
        listener.on_headers_read(stream_id, headers, priority, end_stream);
        Ok(())
    }
}

impl ConnectionDecoder for DefaultDecoder {
    fn decode_frame(
        &mut self,
        conn: &mut Connection,
        encoder: &mut dyn ConnectionEncoder,
        frame: Frame,
        listener: &mut dyn FrameListener,
    ) -> H2Result<()> {
        match frame {
            Frame::Data {
                stream_id,
                data,
                end_stream,
                padding,
            } => self.on_data(conn, encoder, listener, stream_id, data, end_stream, padding),

            Frame::Headers {
                stream_id,
                header_block,
                end_stream,
                priority,
            } => self.on_headers(
                conn,
                encoder,
                listener,
                stream_id,
                &header_block,
                end_stream,
                priority,
            ),

            Frame::Priority {
                stream_id,
                priority,
            } => {
                if conn.check_inbound(frame_type::PRIORITY, stream_id)? == Inbound::Ignore {
                    return Ok(());
                }
                self.prioritize(conn, encoder, stream_id, priority)?;
                listener.on_priority_read(stream_id, priority);
                Ok(())
            }

            Frame::RstStream {
                stream_id,
                error_code,
            } => {
                if conn.check_inbound(frame_type::RST_STREAM, stream_id)? == Inbound::Ignore {
                    return Ok(());
                }
                debug!(stream_id, code = %error_code, "[H2] RST_STREAM received");
                conn.reset_stream(stream_id, false);
                listener.on_rst_stream_read(stream_id, error_code);
                Ok(())
            }

            Frame::Settings { ack: true, .. } => {
                let settings = conn.ack_local_settings()?;
                if let Some(size) = settings.header_table_size() {
                    self.hpack.set_max_header_table_size(size as usize);
                }
                if let Some(size) = settings.max_header_list_size() {
                    self.hpack.set_max_header_list_size(size as usize);
                }
                if let Some(size) = settings.initial_window_size() {
                    self.flow.set_initial_window_size(size)?;
                }
                debug!(entries = settings.len(), "[H2] local settings acknowledged");
                listener.on_settings_ack_read();
                Ok(())
            }

            Frame::Settings {
                ack: false,
                settings,
            } => {
                let consumer = encoder.settings_consumer().ok_or(H2Error::UnsupportedOperation(
                    "encoder cannot consume received settings",
                ))?;
                consumer.consume_received_settings(conn, &settings)?;
                encoder.write_settings_ack(conn)?;
                listener.on_settings_read(&settings);
                Ok(())
            }

            Frame::PushPromise {
                stream_id,
                promised_stream_id,
                header_block,
            } => {
                conn.check_inbound(frame_type::PUSH_PROMISE, stream_id)?;
                let decoded = self.hpack.decode_headers(promised_stream_id, &header_block);
                if let Err(err) = &decoded {
                    if err.should_goaway() {
                        return Err(err.clone());
                    }
                }
                conn.reserve_remote(promised_stream_id, stream_id)?;
                let headers = decoded?;
                listener.on_push_promise_read(stream_id, promised_stream_id, headers);
                Ok(())
            }

            Frame::Ping { ack: false, data } => {
                encoder.write_ping(conn, true, data)?;
                listener.on_ping_read(data);
                Ok(())
            }

            Frame::Ping { ack: true, data } => {
                listener.on_ping_ack_read(data);
                Ok(())
            }

            Frame::GoAway {
                last_stream_id,
                error_code,
                debug_data,
            } => {
                conn.record_goaway_received(last_stream_id, error_code);
                listener.on_goaway_read(last_stream_id, error_code, debug_data);
                Ok(())
            }

            Frame::WindowUpdate {
                stream_id,
                increment,
            } => {
                if increment == 0 {
                    return Err(if stream_id == 0 {
                        H2Error::protocol("WINDOW_UPDATE with zero increment")
                    } else {
                        H2Error::stream(
                            stream_id,
                            ErrorCode::ProtocolError,
                            "WINDOW_UPDATE with zero increment",
                        )
                    });
                }
                if stream_id != 0
                    && conn.check_inbound(frame_type::WINDOW_UPDATE, stream_id)? == Inbound::Ignore
                {
                    return Ok(());
                }
                encoder.remote_window_update(conn, stream_id, increment)?;
                listener.on_window_update_read(stream_id, increment);
                Ok(())
            }

            Frame::Unknown {
                frame_type,
                flags,
                stream_id,
                payload,
            } => {
                listener.on_unknown_frame(frame_type, flags, stream_id, payload);
                Ok(())
            }
        }
    }

    fn stream_closed(&mut self, stream_id: u32) {
        self.flow.remove_stream(stream_id);
    }
}
