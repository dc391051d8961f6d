//! HTTP/2 framing layer (RFC 7540 Section 4 and 6).
//!
//! [`FrameReader`] is a sans-I/O parser: feed it raw bytes in arbitrary chunks
//! and it yields complete, validated [`Frame`]s. It handles:
//! 1. The client connection preface
//! 2. Padding and priority fields on DATA/HEADERS/PUSH_PROMISE
//! 3. Reassembly of header blocks split across CONTINUATION frames
//! 4. Frame size limits and stream-id constraints per frame type
//!
//! HPACK decoding and stream state are handled one layer up.

use bytes::{Buf, Bytes, BytesMut};
use tracing::trace;

use crate::error::{ErrorCode, H2Error, H2Result};
use crate::settings::{defaults, Settings};

/// HTTP/2 frame types (RFC 7540 Section 6)
pub mod frame_type {
    pub const DATA: u8 = 0x0;
    pub const HEADERS: u8 = 0x1;
    pub const PRIORITY: u8 = 0x2;
    pub const RST_STREAM: u8 = 0x3;
    pub const SETTINGS: u8 = 0x4;
    pub const PUSH_PROMISE: u8 = 0x5;
    pub const PING: u8 = 0x6;
    pub const GOAWAY: u8 = 0x7;
    pub const WINDOW_UPDATE: u8 = 0x8;
    pub const CONTINUATION: u8 = 0x9;
}

/// HTTP/2 frame flags
pub mod flags {
    pub const END_STREAM: u8 = 0x1;
    pub const ACK: u8 = 0x1;
    pub const END_HEADERS: u8 = 0x4;
    pub const PADDED: u8 = 0x8;
    pub const PRIORITY: u8 = 0x20;
}

/// HTTP/2 SETTINGS identifiers (RFC 7540 Section 6.5.2)
pub mod settings_id {
    pub const HEADER_TABLE_SIZE: u16 = 0x1;
    pub const ENABLE_PUSH: u16 = 0x2;
    pub const MAX_CONCURRENT_STREAMS: u16 = 0x3;
    pub const INITIAL_WINDOW_SIZE: u16 = 0x4;
    pub const MAX_FRAME_SIZE: u16 = 0x5;
    pub const MAX_HEADER_LIST_SIZE: u16 = 0x6;
}

/// Size of the fixed frame header
pub const FRAME_HEADER_LEN: usize = 9;

/// Default cap on an assembled header block (256 KB).
/// Prevents unbounded memory growth from malicious/buggy CONTINUATION floods.
pub const MAX_HEADER_BLOCK_SIZE: usize = 256 * 1024;

/// The HTTP/2 connection preface (24 bytes)
pub const CONNECTION_PREFACE: &[u8] = b"PRI * HTTP/2.0\r\n\r\nSM\r\n\r\n";

/// Check if data starts with HTTP/2 connection preface (h2c detection)
pub fn is_h2c_preface(data: &[u8]) -> bool {
    data.starts_with(CONNECTION_PREFACE)
}

/// A parsed HTTP/2 frame header (9 bytes)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub length: u32, // 24 bits
    pub frame_type: u8,
    pub flags: u8,
    pub stream_id: u32, // 31 bits (high bit reserved)
}

impl FrameHeader {
    pub fn new(length: usize, frame_type: u8, flags: u8, stream_id: u32) -> Self {
        Self {
            length: length as u32,
            frame_type,
            flags,
            stream_id,
        }
    }

    /// Parse a 9-byte frame header
    pub fn parse(data: &[u8]) -> Option<Self> {
        if data.len() < FRAME_HEADER_LEN {
            return None;
        }
        let length = ((data[0] as u32) << 16) | ((data[1] as u32) << 8) | (data[2] as u32);
        let stream_id = u32::from_be_bytes([data[5], data[6], data[7], data[8]]) & 0x7FFF_FFFF;
        Some(Self {
            length,
            frame_type: data[3],
            flags: data[4],
            stream_id,
        })
    }

    pub fn encode(&self, dst: &mut BytesMut) {
        dst.extend_from_slice(&self.length.to_be_bytes()[1..]);
        dst.extend_from_slice(&[self.frame_type, self.flags]);
        dst.extend_from_slice(&(self.stream_id & 0x7FFF_FFFF).to_be_bytes());
    }

    /// Total frame size including header
    pub fn total_size(&self) -> usize {
        FRAME_HEADER_LEN + self.length as usize
    }

    pub fn has_flag(&self, flag: u8) -> bool {
        self.flags & flag != 0
    }

    pub fn is_end_stream(&self) -> bool {
        self.has_flag(flags::END_STREAM)
    }

    pub fn is_end_headers(&self) -> bool {
        self.has_flag(flags::END_HEADERS)
    }
}

/// Stream dependency carried by PRIORITY and HEADERS frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PriorityInfo {
    pub dependency: u32,
    /// Effective weight, 1..=256 (wire value + 1).
    pub weight: u16,
    pub exclusive: bool,
}

impl PriorityInfo {
    pub const DEFAULT_WEIGHT: u16 = 16;

    fn parse(src: &[u8]) -> Self {
        let raw = u32::from_be_bytes([src[0], src[1], src[2], src[3]]);
        Self {
            dependency: raw & 0x7FFF_FFFF,
            weight: src[4] as u16 + 1,
            exclusive: raw & 0x8000_0000 != 0,
        }
    }

    pub fn encode(&self, dst: &mut BytesMut) {
        let mut raw = self.dependency & 0x7FFF_FFFF;
        if self.exclusive {
            raw |= 0x8000_0000;
        }
        dst.extend_from_slice(&raw.to_be_bytes());
        dst.extend_from_slice(&[(self.weight.clamp(1, 256) - 1) as u8]);
    }
}

impl Default for PriorityInfo {
    fn default() -> Self {
        Self {
            dependency: 0,
            weight: Self::DEFAULT_WEIGHT,
            exclusive: false,
        }
    }
}

/// A complete, validated frame. Header blocks are still HPACK-encoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Data {
        stream_id: u32,
        data: Bytes,
        end_stream: bool,
        /// Padding bytes (including the length octet); counted by flow control.
        padding: usize,
    },
    /// HEADERS plus any CONTINUATION frames, reassembled.
    Headers {
        stream_id: u32,
        header_block: Bytes,
        end_stream: bool,
        priority: Option<PriorityInfo>,
    },
    Priority {
        stream_id: u32,
        priority: PriorityInfo,
    },
    RstStream {
        stream_id: u32,
        error_code: ErrorCode,
    },
    Settings {
        ack: bool,
        settings: Settings,
    },
    PushPromise {
        stream_id: u32,
        promised_stream_id: u32,
        header_block: Bytes,
    },
    Ping {
        ack: bool,
        data: [u8; 8],
    },
    GoAway {
        last_stream_id: u32,
        error_code: ErrorCode,
        debug_data: Bytes,
    },
    WindowUpdate {
        stream_id: u32,
        increment: u32,
    },
    /// Extension frame types are passed through untouched.
    Unknown {
        frame_type: u8,
        flags: u8,
        stream_id: u32,
        payload: Bytes,
    },
}

impl Frame {
    pub fn stream_id(&self) -> u32 {
        match self {
            Frame::Data { stream_id, .. }
            | Frame::Headers { stream_id, .. }
            | Frame::Priority { stream_id, .. }
            | Frame::RstStream { stream_id, .. }
            | Frame::PushPromise { stream_id, .. }
            | Frame::WindowUpdate { stream_id, .. }
            | Frame::Unknown { stream_id, .. } => *stream_id,
            Frame::Settings { .. } | Frame::Ping { .. } | Frame::GoAway { .. } => 0,
        }
    }

    pub fn frame_type(&self) -> u8 {
        match self {
            Frame::Data { .. } => frame_type::DATA,
            Frame::Headers { .. } => frame_type::HEADERS,
            Frame::Priority { .. } => frame_type::PRIORITY,
            Frame::RstStream { .. } => frame_type::RST_STREAM,
            Frame::Settings { .. } => frame_type::SETTINGS,
            Frame::PushPromise { .. } => frame_type::PUSH_PROMISE,
            Frame::Ping { .. } => frame_type::PING,
            Frame::GoAway { .. } => frame_type::GOAWAY,
            Frame::WindowUpdate { .. } => frame_type::WINDOW_UPDATE,
            Frame::Unknown { frame_type, .. } => *frame_type,
        }
    }
}

/// Header block waiting for CONTINUATION frames.
#[derive(Debug)]
struct PendingBlock {
    stream_id: u32,
    end_stream: bool,
    priority: Option<PriorityInfo>,
    promised_stream_id: Option<u32>,
    block: BytesMut,
}

/// Incremental frame parser.
#[derive(Debug)]
pub struct FrameReader {
    /// Buffer for incomplete frames
    buffer: BytesMut,
    require_preface: bool,
    preface_checked: bool,
    pending: Option<PendingBlock>,
    max_frame_size: usize,
    max_header_block_size: usize,
}

impl Default for FrameReader {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameReader {
    /// A reader that strips a leading preface if present but does not require it.
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::new(),
            require_preface: false,
            preface_checked: false,
            pending: None,
            max_frame_size: defaults::MAX_FRAME_SIZE as usize,
            max_header_block_size: MAX_HEADER_BLOCK_SIZE,
        }
    }

    /// A server-side reader: the first 24 bytes must be the client preface.
    pub fn server() -> Self {
        Self {
            require_preface: true,
            ..Self::new()
        }
    }

    pub fn preface_received(&self) -> bool {
        self.preface_checked
    }

    /// Skip preface handling (e.g. after an HTTP/1.1 upgrade consumed it elsewhere).
    pub fn set_preface_received(&mut self) {
        self.preface_checked = true;
    }

    pub fn max_frame_size(&self) -> usize {
        self.max_frame_size
    }

    /// Our advertised SETTINGS_MAX_FRAME_SIZE, once acknowledged.
    pub fn set_max_frame_size(&mut self, size: usize) {
        self.max_frame_size = size;
    }

    pub fn set_max_header_block_size(&mut self, size: usize) {
        self.max_header_block_size = size;
    }

    /// Bytes buffered but not yet forming a complete frame.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Reset reader state (e.g., after upstream reconnect)
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.preface_checked = false;
        self.pending = None;
    }

    /// Feed raw bytes and collect every complete frame.
    pub fn read(&mut self, data: &[u8]) -> H2Result<Vec<Frame>> {
        self.buffer.extend_from_slice(data);
        let mut frames = Vec::new();

        if !self.preface_checked {
            if self.buffer.len() < CONNECTION_PREFACE.len() {
                if CONNECTION_PREFACE.starts_with(&self.buffer[..]) {
                    // Possibly a partial preface; wait for more.
                    return Ok(frames);
                }
                if self.require_preface {
                    return Err(H2Error::protocol("invalid connection preface"));
                }
                self.preface_checked = true;
            } else if is_h2c_preface(&self.buffer) {
                self.buffer.advance(CONNECTION_PREFACE.len());
                self.preface_checked = true;
            } else if self.require_preface {
                return Err(H2Error::protocol("invalid connection preface"));
            } else {
                self.preface_checked = true;
            }
        }

        loop {
            let header = match FrameHeader::parse(&self.buffer) {
                Some(h) => h,
                None => break,
            };
            if header.length as usize > self.max_frame_size {
                return Err(H2Error::FrameTooLarge {
                    size: header.length as usize,
                    max: self.max_frame_size,
                });
            }
            if self.buffer.len() < header.total_size() {
                break;
            }

            let mut frame_data = self.buffer.split_to(header.total_size());
            frame_data.advance(FRAME_HEADER_LEN);
            let payload = frame_data.freeze();

            trace!(
                frame_type = header.frame_type,
                flags = header.flags,
                stream_id = header.stream_id,
                length = header.length,
                "[H2] frame received"
            );
            if let Some(frame) = self.parse_frame(&header, payload)? {
                frames.push(frame);
            }
        }

        Ok(frames)
    }

    /// Parse a single frame; `None` while a header block is still incomplete.
    fn parse_frame(&mut self, header: &FrameHeader, payload: Bytes) -> H2Result<Option<Frame>> {
        if let Some(pending) = &self.pending {
            if header.frame_type != frame_type::CONTINUATION || header.stream_id != pending.stream_id {
                return Err(H2Error::protocol(format!(
                    "expected CONTINUATION for stream {}, got frame type {} on stream {}",
                    pending.stream_id, header.frame_type, header.stream_id
                )));
            }
        }

        match header.frame_type {
            frame_type::DATA => {
                require_stream(header)?;
                let total = payload.len();
                let data = strip_padding(header, payload)?;
                Ok(Some(Frame::Data {
                    stream_id: header.stream_id,
                    padding: total - data.len(),
                    data,
                    end_stream: header.is_end_stream(),
                }))
            }
            frame_type::HEADERS => {
                require_stream(header)?;
                let mut fragment = strip_padding(header, payload)?;
                let priority = if header.has_flag(flags::PRIORITY) {
                    if fragment.len() < 5 {
                        return Err(H2Error::frame_size("HEADERS priority fields truncated"));
                    }
                    let priority = PriorityInfo::parse(&fragment);
                    fragment.advance(5);
                    Some(priority)
                } else {
                    None
                };
                self.begin_block(header, fragment, priority, None)
            }
            frame_type::PUSH_PROMISE => {
                require_stream(header)?;
                let mut fragment = strip_padding(header, payload)?;
                if fragment.len() < 4 {
                    return Err(H2Error::frame_size("PUSH_PROMISE frame too short"));
                }
                let promised = fragment.get_u32() & 0x7FFF_FFFF;
                self.begin_block(header, fragment, None, Some(promised))
            }
            frame_type::CONTINUATION => {
                let mut pending = match self.pending.take() {
                    Some(p) => p,
                    None => {
                        return Err(H2Error::protocol(format!(
                            "unexpected CONTINUATION frame for stream {}",
                            header.stream_id
                        )))
                    }
                };
                // Guard against unbounded header block accumulation
                let new_size = pending.block.len() + payload.len();
                if new_size > self.max_header_block_size {
                    return Err(H2Error::connection(
                        ErrorCode::EnhanceYourCalm,
                        format!(
                            "header block too large ({} bytes, max {})",
                            new_size, self.max_header_block_size
                        ),
                    ));
                }
                pending.block.extend_from_slice(&payload);
                if header.is_end_headers() {
                    Ok(Some(finish_block(pending)))
                } else {
                    self.pending = Some(pending);
                    Ok(None)
                }
            }
            frame_type::PRIORITY => {
                require_stream(header)?;
                if payload.len() != 5 {
                    return Err(H2Error::frame_size("PRIORITY frame must be 5 bytes"));
                }
                Ok(Some(Frame::Priority {
                    stream_id: header.stream_id,
                    priority: PriorityInfo::parse(&payload),
                }))
            }
            frame_type::RST_STREAM => {
                require_stream(header)?;
                if payload.len() != 4 {
                    return Err(H2Error::frame_size("RST_STREAM frame must be 4 bytes"));
                }
                Ok(Some(Frame::RstStream {
                    stream_id: header.stream_id,
                    error_code: ErrorCode::from_u32(read_u32(&payload)),
                }))
            }
            frame_type::SETTINGS => {
                require_connection(header)?;
                let ack = header.has_flag(flags::ACK);
                if ack && !payload.is_empty() {
                    return Err(H2Error::frame_size("SETTINGS ACK with payload"));
                }
                Ok(Some(Frame::Settings {
                    ack,
                    settings: Settings::decode(&payload)?,
                }))
            }
            frame_type::PING => {
                require_connection(header)?;
                if payload.len() != 8 {
                    return Err(H2Error::frame_size("PING frame must be 8 bytes"));
                }
                let mut data = [0u8; 8];
                data.copy_from_slice(&payload);
                Ok(Some(Frame::Ping {
                    ack: header.has_flag(flags::ACK),
                    data,
                }))
            }
            frame_type::GOAWAY => {
                require_connection(header)?;
                if payload.len() < 8 {
                    return Err(H2Error::frame_size("GOAWAY frame too short"));
                }
                Ok(Some(Frame::GoAway {
                    last_stream_id: read_u32(&payload) & 0x7FFF_FFFF,
                    error_code: ErrorCode::from_u32(read_u32(&payload[4..])),
                    debug_data: payload.slice(8..),
                }))
            }
            frame_type::WINDOW_UPDATE => {
                if payload.len() != 4 {
                    return Err(H2Error::frame_size("WINDOW_UPDATE frame must be 4 bytes"));
                }
                Ok(Some(Frame::WindowUpdate {
                    stream_id: header.stream_id,
                    increment: read_u32(&payload) & 0x7FFF_FFFF,
                }))
            }
            other => Ok(Some(Frame::Unknown {
                frame_type: other,
                flags: header.flags,
                stream_id: header.stream_id,
                payload,
            })),
        }
    }

    fn begin_block(
        &mut self,
        header: &FrameHeader,
        fragment: Bytes,
        priority: Option<PriorityInfo>,
        promised_stream_id: Option<u32>,
    ) -> H2Result<Option<Frame>> {
        if fragment.len() > self.max_header_block_size {
            return Err(H2Error::connection(
                ErrorCode::EnhanceYourCalm,
                format!(
                    "header block too large ({} bytes, max {})",
                    fragment.len(),
                    self.max_header_block_size
                ),
            ));
        }
        let pending = PendingBlock {
            stream_id: header.stream_id,
            end_stream: header.is_end_stream(),
            priority,
            promised_stream_id,
            block: BytesMut::from(&fragment[..]),
        };
        if header.is_end_headers() {
            Ok(Some(finish_block(pending)))
        } else {
            self.pending = Some(pending);
            Ok(None)
        }
    }
}

fn finish_block(pending: PendingBlock) -> Frame {
    let header_block = pending.block.freeze();
    match pending.promised_stream_id {
        Some(promised_stream_id) => Frame::PushPromise {
            stream_id: pending.stream_id,
            promised_stream_id,
            header_block,
        },
        None => Frame::Headers {
            stream_id: pending.stream_id,
            header_block,
            end_stream: pending.end_stream,
            priority: pending.priority,
        },
    }
}

fn read_u32(src: &[u8]) -> u32 {
    u32::from_be_bytes([src[0], src[1], src[2], src[3]])
}

fn require_stream(header: &FrameHeader) -> H2Result<()> {
    if header.stream_id == 0 {
        return Err(H2Error::protocol(format!(
            "frame type {} requires a stream id",
            header.frame_type
        )));
    }
    Ok(())
}

fn require_connection(header: &FrameHeader) -> H2Result<()> {
    if header.stream_id != 0 {
        return Err(H2Error::protocol(format!(
            "frame type {} must be sent on stream 0",
            header.frame_type
        )));
    }
    Ok(())
}

/// Remove the pad-length octet and trailing padding from a PADDED frame.
fn strip_padding(header: &FrameHeader, mut payload: Bytes) -> H2Result<Bytes> {
    if !header.has_flag(flags::PADDED) {
        return Ok(payload);
    }
    if payload.is_empty() {
        return Err(H2Error::protocol("PADDED frame with no payload"));
    }
    let pad_length = payload[0] as usize;
    if pad_length >= payload.len() {
        return Err(H2Error::protocol("invalid padding length"));
    }
    payload.truncate(payload.len() - pad_length);
    payload.advance(1);
    Ok(payload)
}
