//! Flow control (RFC 7540 Section 6.9).
//!
//! Outbound: [`RemoteFlowController`] owns the peer-granted send windows and
//! the queue of frames waiting for credit. A [`StreamByteDistributor`] decides
//! how the connection window is split between streams on each flush.
//!
//! Inbound: [`local::LocalFlowController`] tracks the windows we granted and
//! produces WINDOW_UPDATE increments as the application consumes data.

pub mod local;
pub mod priority;
pub mod wfq;

use std::collections::{HashMap, VecDeque};

use bytes::Bytes;
use tracing::{debug, trace, warn};

use crate::connection::Connection;
use crate::error::{ErrorCode, H2Error, H2Result};
use crate::frame::PriorityInfo;
use crate::settings::defaults;
use crate::writer::FrameWriter;

pub use local::LocalFlowController;
pub use priority::PriorityTreeDistributor;
pub use wfq::WeightedFairQueueDistributor;

const MAX_WINDOW: i64 = defaults::MAX_WINDOW_SIZE as i64;

/// Snapshot of one stream handed to the distributor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamableState {
    pub stream_id: u32,
    /// Bytes the stream could write right now: `min(pending, window)`.
    pub streamable_bytes: usize,
    /// Whether anything is queued at all, even without window.
    pub has_frame: bool,
    pub window_size: i32,
}

/// Splits connection window between streams with streamable bytes.
pub trait StreamByteDistributor {
    fn update_streamable_bytes(&mut self, state: StreamableState);

    /// Mirror a priority change. `parent` is 0 for the root.
    fn update_dependency_tree(&mut self, child: u32, parent: u32, weight: u16, exclusive: bool);

    fn remove_stream(&mut self, stream_id: u32);

    /// Grant up to `max_bytes` across streams through `write`, each grant at
    /// most `max_write`. Returns whether any stream still has streamable bytes.
    fn distribute(
        &mut self,
        max_bytes: usize,
        max_write: usize,
        write: &mut dyn FnMut(u32, usize),
    ) -> bool;
}

impl<D: StreamByteDistributor + ?Sized> StreamByteDistributor for Box<D> {
    fn update_streamable_bytes(&mut self, state: StreamableState) {
        (**self).update_streamable_bytes(state)
    }

    fn update_dependency_tree(&mut self, child: u32, parent: u32, weight: u16, exclusive: bool) {
        (**self).update_dependency_tree(child, parent, weight, exclusive)
    }

    fn remove_stream(&mut self, stream_id: u32) {
        (**self).remove_stream(stream_id)
    }

    fn distribute(
        &mut self,
        max_bytes: usize,
        max_write: usize,
        write: &mut dyn FnMut(u32, usize),
    ) -> bool {
        (**self).distribute(max_bytes, max_write, write)
    }
}

#[derive(Debug)]
enum Pending {
    Data { data: Bytes, end_stream: bool },
    /// Trailers queued behind data; they cost no window.
    Headers {
        block: Bytes,
        end_stream: bool,
        priority: Option<PriorityInfo>,
    },
}

#[derive(Debug)]
struct FlowState {
    window: i32,
    queue: VecDeque<Pending>,
    pending_bytes: usize,
    /// END_STREAM has been queued; nothing may follow.
    ended: bool,
}

impl FlowState {
    fn new(window: i32) -> Self {
        Self {
            window,
            queue: VecDeque::new(),
            pending_bytes: 0,
            ended: false,
        }
    }

    fn streamable(&self, id: u32) -> StreamableState {
        StreamableState {
            stream_id: id,
            streamable_bytes: self.pending_bytes.min(self.window.max(0) as usize),
            has_frame: !self.queue.is_empty(),
            window_size: self.window,
        }
    }
}

/// Outbound flow controller.
#[derive(Debug)]
pub struct RemoteFlowController<D: StreamByteDistributor> {
    distributor: D,
    connection_window: i32,
    initial_window: i32,
    streams: HashMap<u32, FlowState>,
}

impl<D: StreamByteDistributor> RemoteFlowController<D> {
    pub fn new(distributor: D) -> Self {
        Self {
            distributor,
            connection_window: defaults::INITIAL_WINDOW_SIZE as i32,
            initial_window: defaults::INITIAL_WINDOW_SIZE as i32,
            streams: HashMap::new(),
        }
    }

    pub fn distributor(&self) -> &D {
        &self.distributor
    }

    pub fn initial_window_size(&self) -> i32 {
        self.initial_window
    }

    /// Send window for `stream_id` (0 is the connection).
    pub fn window_size(&self, stream_id: u32) -> i32 {
        if stream_id == 0 {
            return self.connection_window;
        }
        self.streams
            .get(&stream_id)
            .map_or(self.initial_window, |s| s.window)
    }

    fn state_mut(&mut self, stream_id: u32) -> &mut FlowState {
        let initial = self.initial_window;
        self.streams
            .entry(stream_id)
            .or_insert_with(|| FlowState::new(initial))
    }

    fn sync(&mut self, stream_id: u32) {
        if let Some(state) = self.streams.get(&stream_id) {
            self.distributor
                .update_streamable_bytes(state.streamable(stream_id));
        }
    }

    /// WINDOW_UPDATE received.
    pub fn increment_window(&mut self, stream_id: u32, delta: i32) -> H2Result<()> {
        if stream_id == 0 {
            let next = self.connection_window as i64 + delta as i64;
            if next > MAX_WINDOW {
                warn!(window = self.connection_window, delta, "[FLOW] connection window overflow");
                return Err(H2Error::connection(
                    ErrorCode::FlowControlError,
                    "connection window exceeds 2^31-1",
                ));
            }
            self.connection_window = next as i32;
            return Ok(());
        }

        let state = self.state_mut(stream_id);
        let next = state.window as i64 + delta as i64;
        if next > MAX_WINDOW {
            warn!(stream_id, window = state.window, delta, "[FLOW] stream window overflow");
            return Err(H2Error::stream(
                stream_id,
                ErrorCode::FlowControlError,
                "stream window exceeds 2^31-1",
            ));
        }
        state.window = next as i32;
        self.sync(stream_id);
        Ok(())
    }

    /// Peer changed SETTINGS_INITIAL_WINDOW_SIZE: every stream window moves by
    /// the difference, possibly below zero.
    pub fn set_initial_window_size(&mut self, size: u32) -> H2Result<()> {
        if size as i64 > MAX_WINDOW {
            return Err(H2Error::connection(
                ErrorCode::FlowControlError,
                format!("initial window size {} exceeds 2^31-1", size),
            ));
        }
        let delta = size as i64 - self.initial_window as i64;
        for (id, state) in &self.streams {
            if state.window as i64 + delta > MAX_WINDOW {
                return Err(H2Error::connection(
                    ErrorCode::FlowControlError,
                    format!("window of stream {} overflows", id),
                ));
            }
        }
        debug!(old = self.initial_window, new = size, "[FLOW] initial window size changed");
        self.initial_window = size as i32;
        let ids: Vec<u32> = self.streams.keys().copied().collect();
        for id in ids {
            if let Some(state) = self.streams.get_mut(&id) {
                state.window = (state.window as i64 + delta) as i32;
            }
            self.sync(id);
        }
        Ok(())
    }

    /// Queue DATA for `stream_id`.
    pub fn enqueue(&mut self, stream_id: u32, data: Bytes, end_stream: bool) -> H2Result<()> {
        let state = self.state_mut(stream_id);
        if state.ended {
            return Err(H2Error::stream(
                stream_id,
                ErrorCode::StreamClosed,
                "data queued after END_STREAM",
            ));
        }
        state.ended = end_stream;
        state.pending_bytes += data.len();
        state.queue.push_back(Pending::Data { data, end_stream });
        self.sync(stream_id);
        Ok(())
    }

    /// Queue a header block behind pending data on `stream_id`.
    pub fn enqueue_headers(
        &mut self,
        stream_id: u32,
        block: Bytes,
        end_stream: bool,
        priority: Option<PriorityInfo>,
    ) -> H2Result<()> {
        let state = self.state_mut(stream_id);
        if state.ended {
            return Err(H2Error::stream(
                stream_id,
                ErrorCode::StreamClosed,
                "headers queued after END_STREAM",
            ));
        }
        state.ended = end_stream;
        state.queue.push_back(Pending::Headers {
            block,
            end_stream,
            priority,
        });
        self.sync(stream_id);
        Ok(())
    }

    pub fn has_pending(&self, stream_id: u32) -> bool {
        self.streams
            .get(&stream_id)
            .is_some_and(|s| !s.queue.is_empty())
    }

    /// Whether END_STREAM is already queued for `stream_id`.
    pub fn is_ended(&self, stream_id: u32) -> bool {
        self.streams.get(&stream_id).is_some_and(|s| s.ended)
    }

    pub fn pending_bytes(&self, stream_id: u32) -> usize {
        self.streams.get(&stream_id).map_or(0, |s| s.pending_bytes)
    }

    /// Whether a DATA write on `stream_id` could make progress now.
    pub fn is_writable(&self, conn: &Connection, stream_id: u32) -> bool {
        conn.stream(stream_id).is_some_and(|s| s.local_side_open())
            && self.window_size(stream_id) > 0
            && self.connection_window > 0
    }

    pub fn update_dependency_tree(&mut self, child: u32, parent: u32, weight: u16, exclusive: bool) {
        self.distributor
            .update_dependency_tree(child, parent, weight, exclusive);
    }

    /// Drop the stream's window and anything still queued.
    pub fn remove_stream(&mut self, stream_id: u32) {
        if let Some(state) = self.streams.remove(&stream_id) {
            if state.pending_bytes > 0 {
                debug!(stream_id, dropped = state.pending_bytes, "[FLOW] discarding queued data");
            }
        }
        self.distributor.remove_stream(stream_id);
    }

    /// Write as much queued data as the windows allow. Returns DATA payload
    /// bytes written.
    ///
    /// Streams whose END_STREAM goes out here have their local side closed on
    /// `conn`.
    pub fn write_pending(
        &mut self,
        conn: &mut Connection,
        writer: &mut dyn FrameWriter,
    ) -> H2Result<usize> {
        let ids: Vec<u32> = self.streams.keys().copied().collect();
        for &id in &ids {
            self.write_free_frames(id, conn, writer)?;
        }

        let total: usize = self
            .streams
            .iter()
            .map(|(id, s)| s.streamable(*id).streamable_bytes)
            .sum();
        let max_bytes = total.min(self.connection_window.max(0) as usize);
        if max_bytes == 0 {
            return Ok(0);
        }

        let mut grants: Vec<(u32, usize)> = Vec::new();
        let max_write = writer.max_frame_size();
        self.distributor
            .distribute(max_bytes, max_write, &mut |id, n| grants.push((id, n)));

        let mut written = 0;
        for (id, n) in grants {
            written += self.write_granted(id, n, conn, writer)?;
            self.write_free_frames(id, conn, writer)?;
        }
        for id in ids {
            self.sync(id);
        }
        debug!(written, window = self.connection_window, "[FLOW] distribution pass");
        Ok(written)
    }

    /// Emit up to `n` DATA bytes from the front of the stream's queue.
    fn write_granted(
        &mut self,
        stream_id: u32,
        mut n: usize,
        conn: &mut Connection,
        writer: &mut dyn FrameWriter,
    ) -> H2Result<usize> {
        let mut written = 0;
        let mut close = false;
        let Some(state) = self.streams.get_mut(&stream_id) else {
            return Ok(0);
        };
        n = n.min(state.window.max(0) as usize);
        while n > 0 {
            let Some(Pending::Data { data, end_stream }) = state.queue.front_mut() else {
                break;
            };
            let chunk = data.split_to(n.min(data.len()));
            let last = data.is_empty();
            let end = last && *end_stream;
            writer.write_data(stream_id, &chunk, end);
            trace!(stream_id, len = chunk.len(), end_stream = end, "[FLOW] DATA written");

            n -= chunk.len();
            written += chunk.len();
            state.window -= chunk.len() as i32;
            state.pending_bytes -= chunk.len();
            if last {
                state.queue.pop_front();
                close |= end;
            }
        }
        self.connection_window -= written as i32;
        if close {
            conn.close_local_side(stream_id)?;
        }
        Ok(written)
    }

    /// Frames at the front of the queue that need no window: empty DATA and
    /// queued trailers.
    fn write_free_frames(
        &mut self,
        stream_id: u32,
        conn: &mut Connection,
        writer: &mut dyn FrameWriter,
    ) -> H2Result<()> {
        let Some(state) = self.streams.get_mut(&stream_id) else {
            return Ok(());
        };
        let mut close = false;
        loop {
            match state.queue.front() {
                Some(Pending::Data { data, end_stream }) if data.is_empty() => {
                    if *end_stream {
                        writer.write_data(stream_id, &[], true);
                        close = true;
                    }
                }
                Some(Pending::Headers {
                    block,
                    end_stream,
                    priority,
                }) => {
                    writer.write_headers(stream_id, block, *end_stream, *priority);
                    close |= *end_stream;
                }
                _ => break,
            }
            state.queue.pop_front();
        }
        if close {
            conn.close_local_side(stream_id)?;
        }
        Ok(())
    }
}
