//! Outbound frame serialization.
//!
//! [`FrameWriter`] is the capability the engine writes through; [`FrameEncoder`]
//! is the default implementation, serializing into a buffer the caller drains
//! with [`FrameWriter::take_output`].

use bytes::{Bytes, BytesMut};
use tracing::trace;

use crate::error::ErrorCode;
use crate::frame::{flags, frame_type, FrameHeader, PriorityInfo, FRAME_HEADER_LEN};
use crate::settings::{defaults, Settings};

/// Serializes typed frames. Writes are infallible: legality is checked before
/// the engine calls into the writer.
pub trait FrameWriter {
    /// DATA frames; `data` is split at the max frame size if needed.
    fn write_data(&mut self, stream_id: u32, data: &[u8], end_stream: bool);
    /// HEADERS followed by CONTINUATION frames as needed.
    fn write_headers(
        &mut self,
        stream_id: u32,
        header_block: &[u8],
        end_stream: bool,
        priority: Option<PriorityInfo>,
    );
    fn write_priority(&mut self, stream_id: u32, priority: PriorityInfo);
    fn write_rst_stream(&mut self, stream_id: u32, code: ErrorCode);
    fn write_settings(&mut self, settings: &Settings);
    fn write_settings_ack(&mut self);
    fn write_push_promise(&mut self, stream_id: u32, promised_stream_id: u32, header_block: &[u8]);
    fn write_ping(&mut self, ack: bool, data: [u8; 8]);
    fn write_goaway(&mut self, last_stream_id: u32, code: ErrorCode, debug_data: &[u8]);
    fn write_window_update(&mut self, stream_id: u32, increment: u32);

    /// Peer's SETTINGS_MAX_FRAME_SIZE.
    fn max_frame_size(&self) -> usize;
    fn set_max_frame_size(&mut self, size: usize);

    /// Drain serialized bytes. Writers that do not buffer return empty.
    fn take_output(&mut self) -> Bytes;
}

/// Source of output buffers.
pub trait BufferAllocator {
    fn acquire(&mut self, capacity: usize) -> BytesMut;
    fn release(&mut self, buf: BytesMut);
}

/// Allocates from the heap and drops released buffers.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeapAllocator;

impl BufferAllocator for HeapAllocator {
    fn acquire(&mut self, capacity: usize) -> BytesMut {
        BytesMut::with_capacity(capacity)
    }

    fn release(&mut self, _buf: BytesMut) {}
}

const INITIAL_CAPACITY: usize = 4096;

/// Default [`FrameWriter`]: serializes frames into an in-memory buffer.
#[derive(Debug)]
pub struct FrameEncoder<A: BufferAllocator = HeapAllocator> {
    out: BytesMut,
    max_frame_size: usize,
    allocator: A,
}

impl Default for FrameEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameEncoder {
    pub fn new() -> Self {
        Self::with_allocator(HeapAllocator)
    }
}

impl<A: BufferAllocator> FrameEncoder<A> {
    pub fn with_allocator(mut allocator: A) -> Self {
        Self {
            out: allocator.acquire(INITIAL_CAPACITY),
            max_frame_size: defaults::MAX_FRAME_SIZE as usize,
            allocator,
        }
    }

    /// Bytes written but not yet taken.
    pub fn pending(&self) -> usize {
        self.out.len()
    }

    fn frame(&mut self, frame_type: u8, flags: u8, stream_id: u32, payload: &[u8]) {
        self.out.reserve(FRAME_HEADER_LEN + payload.len());
        FrameHeader::new(payload.len(), frame_type, flags, stream_id).encode(&mut self.out);
        self.out.extend_from_slice(payload);
        trace!(frame_type, flags, stream_id, length = payload.len(), "[H2] frame written");
    }
}

impl<A: BufferAllocator> FrameWriter for FrameEncoder<A> {
    fn write_data(&mut self, stream_id: u32, data: &[u8], end_stream: bool) {
        let mut chunks = data.chunks(self.max_frame_size).peekable();
        if chunks.peek().is_none() {
            let flags = if end_stream { flags::END_STREAM } else { 0 };
            self.frame(frame_type::DATA, flags, stream_id, &[]);
            return;
        }
        while let Some(chunk) = chunks.next() {
            let last = chunks.peek().is_none();
            let flags = if end_stream && last { flags::END_STREAM } else { 0 };
            self.frame(frame_type::DATA, flags, stream_id, chunk);
        }
    }

    fn write_headers(
        &mut self,
        stream_id: u32,
        header_block: &[u8],
        end_stream: bool,
        priority: Option<PriorityInfo>,
    ) {
        let mut prefix = BytesMut::new();
        let mut flags_byte = if end_stream { flags::END_STREAM } else { 0 };
        if let Some(priority) = priority {
            priority.encode(&mut prefix);
            flags_byte |= flags::PRIORITY;
        }
        self.header_block(frame_type::HEADERS, flags_byte, stream_id, &prefix, header_block);
    }

    fn write_priority(&mut self, stream_id: u32, priority: PriorityInfo) {
        let mut payload = BytesMut::with_capacity(5);
        priority.encode(&mut payload);
        self.frame(frame_type::PRIORITY, 0, stream_id, &payload);
    }

    fn write_rst_stream(&mut self, stream_id: u32, code: ErrorCode) {
        self.frame(frame_type::RST_STREAM, 0, stream_id, &code.as_u32().to_be_bytes());
    }

    fn write_settings(&mut self, settings: &Settings) {
        self.frame(frame_type::SETTINGS, 0, 0, &settings.encode());
    }

    fn write_settings_ack(&mut self) {
        self.frame(frame_type::SETTINGS, flags::ACK, 0, &[]);
    }

    fn write_push_promise(&mut self, stream_id: u32, promised_stream_id: u32, header_block: &[u8]) {
        let prefix = (promised_stream_id & 0x7FFF_FFFF).to_be_bytes();
        self.header_block(frame_type::PUSH_PROMISE, 0, stream_id, &prefix, header_block);
    }

    fn write_ping(&mut self, ack: bool, data: [u8; 8]) {
        let flags = if ack { flags::ACK } else { 0 };
        self.frame(frame_type::PING, flags, 0, &data);
    }

    fn write_goaway(&mut self, last_stream_id: u32, code: ErrorCode, debug_data: &[u8]) {
        let mut payload = Vec::with_capacity(8 + debug_data.len());
        payload.extend_from_slice(&(last_stream_id & 0x7FFF_FFFF).to_be_bytes());
        payload.extend_from_slice(&code.as_u32().to_be_bytes());
        payload.extend_from_slice(debug_data);
        self.frame(frame_type::GOAWAY, 0, 0, &payload);
    }

    fn write_window_update(&mut self, stream_id: u32, increment: u32) {
        let increment = increment & 0x7FFF_FFFF; // Clear reserved bit
        self.frame(frame_type::WINDOW_UPDATE, 0, stream_id, &increment.to_be_bytes());
    }

    fn max_frame_size(&self) -> usize {
        self.max_frame_size
    }

    fn set_max_frame_size(&mut self, size: usize) {
        self.max_frame_size = size;
    }

    fn take_output(&mut self) -> Bytes {
        if self.out.is_empty() {
            return Bytes::new();
        }
        let fresh = self.allocator.acquire(INITIAL_CAPACITY);
        std::mem::replace(&mut self.out, fresh).freeze()
    }
}

impl<A: BufferAllocator> FrameEncoder<A> {
    /// First frame carries `prefix` and as much of the block as fits; the
    /// rest goes into CONTINUATION frames, END_HEADERS on the last one.
    fn header_block(&mut self, frame_type: u8, flags_byte: u8, stream_id: u32, prefix: &[u8], block: &[u8]) {
        let first_len = block.len().min(self.max_frame_size.saturating_sub(prefix.len()));
        let (first, mut rest) = block.split_at(first_len);

        let mut payload = self.allocator.acquire(prefix.len() + first.len());
        payload.extend_from_slice(prefix);
        payload.extend_from_slice(first);
        let end_headers = if rest.is_empty() { flags::END_HEADERS } else { 0 };
        self.frame(frame_type, flags_byte | end_headers, stream_id, &payload);
        self.allocator.release(payload);

        while !rest.is_empty() {
            let n = rest.len().min(self.max_frame_size);
            let (chunk, tail) = rest.split_at(n);
            rest = tail;
            let end_headers = if rest.is_empty() { flags::END_HEADERS } else { 0 };
            self.frame(frame_type::CONTINUATION, end_headers, stream_id, chunk);
        }
    }
}
