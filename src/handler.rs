//! Top-level connection driver.
//!
//! [`H2Codec`] glues the pieces together: bytes go through the
//! [`FrameReader`] and the decoder stack into a [`FrameListener`]; writes go
//! through the encoder stack and come back out of [`H2Codec::take_output`].
//! Stream errors are answered with RST_STREAM and processing continues;
//! connection errors are answered with GOAWAY and returned.

use bytes::{Bytes, BytesMut};
use tracing::{debug, trace, warn};

use crate::codec::{ConnectionDecoder, ConnectionEncoder, DefaultDecoder, DefaultEncoder, FrameListener};
use crate::config::CodecConfig;
use crate::connection::{Connection, Role};
use crate::decorator::EmptyDataFrameDecoder;
use crate::error::{ErrorCode, H2Error, H2Result};
use crate::frame::{FrameReader, PriorityInfo, CONNECTION_PREFACE};
use crate::hpack::Headers;
use crate::settings::Settings;
use crate::stream::StreamState;

/// Receiver of a completed HTTP/1.1 → h2c upgrade.
pub trait UpgradeTarget {
    /// Client side: the upgrade request becomes stream 1, half-closed (local).
    fn on_client_upgrade(&mut self) -> H2Result<()>;

    /// Server side: apply the client's HTTP2-Settings and adopt the upgrade
    /// request as stream 1, half-closed (remote).
    fn on_server_upgrade(&mut self, settings: &Settings) -> H2Result<()>;
}

/// A sans-I/O HTTP/2 connection.
pub struct H2Codec {
    reader: FrameReader,
    conn: Connection,
    encoder: Box<dyn ConnectionEncoder>,
    decoder: Box<dyn ConnectionDecoder>,
    /// Client preface, emitted ahead of everything else.
    preface: Option<Bytes>,
}

impl std::fmt::Debug for H2Codec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("H2Codec")
            .field("role", &self.conn.role())
            .field("streams", &self.conn.num_streams())
            .field("buffered", &self.reader.buffered())
            .finish_non_exhaustive()
    }
}

impl H2Codec {
    /// Codec with the default encoder/decoder stack for `config`.
    pub fn new(config: CodecConfig) -> H2Result<Self> {
        let encoder = DefaultEncoder::new(config.distributor.build());
        let decoder =
            EmptyDataFrameDecoder::with_limit(DefaultDecoder::new(), config.max_consecutive_empty_frames);
        Self::with_parts(config, Box::new(encoder), Box::new(decoder))
    }

    /// Codec over a custom (typically decorated) encoder and decoder.
    pub fn with_parts(
        config: CodecConfig,
        encoder: Box<dyn ConnectionEncoder>,
        decoder: Box<dyn ConnectionDecoder>,
    ) -> H2Result<Self> {
        let mut reader = if config.role == Role::Server && config.validate_preface {
            FrameReader::server()
        } else {
            FrameReader::new()
        };
        reader.set_max_header_block_size(config.max_header_block_size);

        let mut conn = Connection::new(config.role);
        conn.set_reset_grace(config.reset_grace_frames, config.max_reset_streams);

        let mut codec = Self {
            reader,
            conn,
            encoder,
            decoder,
            preface: (config.role == Role::Client).then(|| Bytes::from_static(CONNECTION_PREFACE)),
        };
        codec
            .encoder
            .write_settings(&mut codec.conn, config.local_settings)?;
        debug!(role = ?config.role, "[H2] codec started");
        Ok(codec)
    }

    pub fn client() -> H2Result<Self> {
        Self::new(CodecConfig::client())
    }

    pub fn server() -> H2Result<Self> {
        Self::new(CodecConfig::server())
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn connection_mut(&mut self) -> &mut Connection {
        &mut self.conn
    }

    /// Next id this endpoint may open.
    pub fn next_stream_id(&self) -> u32 {
        self.conn.local().next_stream_id()
    }

    /// Bytes buffered but not yet forming a complete frame.
    pub fn buffered(&self) -> usize {
        self.reader.buffered()
    }

    // ========================================================================
    // Inbound
    // ========================================================================

    /// Feed raw bytes from the transport.
    ///
    /// Stream errors are answered with RST_STREAM and do not stop processing.
    /// A connection error writes GOAWAY and is returned; the connection is
    /// unusable afterwards.
    pub fn process(&mut self, data: &[u8], listener: &mut dyn FrameListener) -> H2Result<()> {
        let frames = match self.reader.read(data) {
            Ok(frames) => frames,
            Err(err) => return Err(self.fail(err)),
        };

        for frame in frames {
            trace!(frame_type = frame.frame_type(), stream_id = frame.stream_id(), "[H2] dispatching frame");
            let result =
                self.decoder
                    .decode_frame(&mut self.conn, &mut *self.encoder, frame, listener);
            self.reap_closed();
            if let Err(err) = result {
                self.handle_error(err)?;
            }
            if let Some(size) = self.conn.local_settings().max_frame_size() {
                self.reader.set_max_frame_size(size as usize);
            }
        }

        self.flush()?;
        Ok(())
    }

    fn handle_error(&mut self, err: H2Error) -> H2Result<()> {
        if err.is_stream_error() {
            if let (Some(stream_id), Some(code)) = (err.stream_id(), err.error_code()) {
                warn!(stream_id, code = %code, error = %err, "[H2] stream error");
                if self.conn.stream_state(stream_id) != StreamState::Idle {
                    self.encoder
                        .write_rst_stream(&mut self.conn, stream_id, code)?;
                }
                self.reap_closed();
            }
            return Ok(());
        }
        Err(self.fail(err))
    }

    /// Send GOAWAY for a connection error (once) and hand the error back.
    fn fail(&mut self, err: H2Error) -> H2Error {
        if err.should_goaway() && self.conn.goaway_sent().is_none() {
            let code = err.error_code().unwrap_or(ErrorCode::InternalError);
            let last = self.conn.remote().last_stream_created();
            warn!(code = %code, last_stream_id = last, error = %err, "[H2] connection error, sending GOAWAY");
            let debug = err.to_string();
            if let Err(write_err) =
                self.encoder
                    .write_goaway(&mut self.conn, last, code, debug.as_bytes())
            {
                warn!(error = %write_err, "[H2] failed to write GOAWAY");
            }
        }
        err
    }

    fn reap_closed(&mut self) {
        for stream_id in self.conn.drain_closed() {
            self.encoder.stream_closed(stream_id);
            self.decoder.stream_closed(stream_id);
        }
    }

    // ========================================================================
    // Outbound
    // ========================================================================

    /// Everything serialized so far, preface first.
    pub fn take_output(&mut self) -> Bytes {
        let frames = self.encoder.take_output();
        match self.preface.take() {
            Some(preface) => {
                let mut out = BytesMut::with_capacity(preface.len() + frames.len());
                out.extend_from_slice(&preface);
                out.extend_from_slice(&frames);
                out.freeze()
            }
            None => frames,
        }
    }

    /// Write queued DATA the flow-control windows allow.
    pub fn flush(&mut self) -> H2Result<usize> {
        let written = self.encoder.flush(&mut self.conn);
        self.reap_closed();
        written
    }

    pub fn send_headers(&mut self, stream_id: u32, headers: &Headers, end_stream: bool) -> H2Result<()> {
        self.send_headers_with_priority(stream_id, headers, None, end_stream)
    }

    pub fn send_headers_with_priority(
        &mut self,
        stream_id: u32,
        headers: &Headers,
        priority: Option<PriorityInfo>,
        end_stream: bool,
    ) -> H2Result<()> {
        let result = self
            .encoder
            .write_headers(&mut self.conn, stream_id, headers, priority, end_stream);
        self.reap_closed();
        result
    }

    /// Queue DATA; call [`flush`](Self::flush) to write it.
    pub fn send_data(&mut self, stream_id: u32, data: impl Into<Bytes>, end_stream: bool) -> H2Result<()> {
        self.encoder
            .write_data(&mut self.conn, stream_id, data.into(), end_stream)
    }

    pub fn send_priority(&mut self, stream_id: u32, priority: PriorityInfo) -> H2Result<()> {
        self.encoder
            .write_priority(&mut self.conn, stream_id, priority)
    }

    pub fn reset_stream(&mut self, stream_id: u32, code: ErrorCode) -> H2Result<()> {
        let result = self
            .encoder
            .write_rst_stream(&mut self.conn, stream_id, code);
        self.reap_closed();
        result
    }

    /// Send new local SETTINGS; they apply once the peer acknowledges them.
    pub fn send_settings(&mut self, settings: Settings) -> H2Result<()> {
        self.encoder.write_settings(&mut self.conn, settings)
    }

    pub fn ping(&mut self, data: [u8; 8]) -> H2Result<()> {
        self.encoder.write_ping(&mut self.conn, false, data)
    }

    /// Graceful shutdown: no new remote streams are accepted afterwards.
    pub fn goaway(&mut self, code: ErrorCode, debug_data: &[u8]) -> H2Result<()> {
        let last = self.conn.remote().last_stream_created();
        self.encoder
            .write_goaway(&mut self.conn, last, code, debug_data)
    }

    pub fn push_promise(
        &mut self,
        stream_id: u32,
        promised_stream_id: u32,
        headers: &Headers,
    ) -> H2Result<()> {
        self.encoder
            .write_push_promise(&mut self.conn, stream_id, promised_stream_id, headers)
    }
}

impl UpgradeTarget for H2Codec {
    fn on_client_upgrade(&mut self) -> H2Result<()> {
        self.conn.upgrade_client_stream()?;
        debug!("[H2] client upgraded to h2c");
        Ok(())
    }

    fn on_server_upgrade(&mut self, settings: &Settings) -> H2Result<()> {
        let consumer = self.encoder.settings_consumer().ok_or(H2Error::UnsupportedOperation(
            "encoder cannot consume received settings",
        ))?;
        consumer.consume_received_settings(&mut self.conn, settings)?;
        self.conn.upgrade_server_stream()?;
        debug!("[H2] server upgraded to h2c");
        Ok(())
    }
}
