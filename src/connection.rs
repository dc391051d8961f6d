//! Connection-wide stream registry and state machine (RFC 7540 Section 5).
//!
//! The [`Connection`] owns every live [`Stream`], the two endpoints' stream-id
//! bookkeeping, and the negotiated settings. Streams are evicted as soon as
//! they close; their ids are never reused because each endpoint only accepts
//! ids above its high-water mark. Closed ids are remembered for a bounded
//! number of frames so that frames already in flight when a stream closed
//! are dropped instead of being treated as errors.

use std::collections::{HashMap, VecDeque};

use tracing::{debug, warn};

use crate::error::{ErrorCode, H2Error, H2Result};
use crate::frame::{frame_type, PriorityInfo};
use crate::settings::{defaults, Settings};
use crate::stream::{PropertyKey, Stream, StreamState};

/// Default number of frames tolerated on a stream after we reset it.
pub const DEFAULT_RESET_GRACE_FRAMES: u32 = 32;
/// Default number of reset stream ids remembered for the grace window.
pub const DEFAULT_MAX_RESET_STREAMS: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Client,
    Server,
}

/// Stream-id bookkeeping for one side of the connection.
#[derive(Debug, Clone)]
pub struct Endpoint {
    server: bool,
    next_stream_id: u32,
    last_stream_created: u32,
    /// Limit on streams this endpoint may have active, set by the other side.
    max_active_streams: u32,
}

impl Endpoint {
    fn new(server: bool) -> Self {
        Self {
            server,
            next_stream_id: if server { 2 } else { 1 },
            last_stream_created: 0,
            max_active_streams: u32::MAX,
        }
    }

    pub fn is_server(&self) -> bool {
        self.server
    }

    /// Whether `id` has the parity this endpoint uses.
    pub fn is_valid_stream_id(&self, id: u32) -> bool {
        id > 0 && (id % 2 == 0) == self.server
    }

    /// Whether this endpoint has already used `id` (open, reserved or closed).
    pub fn created(&self, id: u32) -> bool {
        self.is_valid_stream_id(id) && id <= self.last_stream_created
    }

    pub fn next_stream_id(&self) -> u32 {
        self.next_stream_id
    }

    pub fn last_stream_created(&self) -> u32 {
        self.last_stream_created
    }

    pub fn max_active_streams(&self) -> u32 {
        self.max_active_streams
    }

    fn record_created(&mut self, id: u32) {
        self.last_stream_created = id;
        self.next_stream_id = id.saturating_add(2);
    }
}

/// Outcome of checking an inbound frame against stream state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Inbound {
    /// The stream exists, or the frame may create it.
    Process,
    /// The stream is closed; drop the frame silently.
    Ignore,
}

/// Per-connection stream registry and state machine.
#[derive(Debug)]
pub struct Connection {
    role: Role,
    streams: HashMap<u32, Stream>,
    /// Live stream ids in creation order.
    order: Vec<u32>,
    local: Endpoint,
    remote: Endpoint,
    local_settings: Settings,
    remote_settings: Settings,
    /// Local SETTINGS written but not yet acknowledged, oldest first.
    pending_local_settings: VecDeque<Settings>,
    goaway_sent: Option<u32>,
    goaway_received: Option<u32>,
    /// Ids we reset recently, with the number of frames still tolerated.
    recently_reset: VecDeque<(u32, u32)>,
    reset_grace_frames: u32,
    max_reset_streams: usize,
    /// Ids closed since the last call to `drain_closed`.
    closed: Vec<u32>,
    next_property_key: usize,
}

impl Connection {
    pub fn new(role: Role) -> Self {
        let server = role == Role::Server;
        Self {
            role,
            streams: HashMap::new(),
            order: Vec::new(),
            local: Endpoint::new(server),
            remote: Endpoint::new(!server),
            local_settings: Settings::new(),
            remote_settings: Settings::new(),
            pending_local_settings: VecDeque::new(),
            goaway_sent: None,
            goaway_received: None,
            recently_reset: VecDeque::new(),
            reset_grace_frames: DEFAULT_RESET_GRACE_FRAMES,
            max_reset_streams: DEFAULT_MAX_RESET_STREAMS,
            closed: Vec::new(),
            next_property_key: 0,
        }
    }

    /// Configure the reset-stream grace window.
    pub fn set_reset_grace(&mut self, frames: u32, max_streams: usize) {
        self.reset_grace_frames = frames;
        self.max_reset_streams = max_streams;
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn is_server(&self) -> bool {
        self.role == Role::Server
    }

    pub fn local(&self) -> &Endpoint {
        &self.local
    }

    pub fn remote(&self) -> &Endpoint {
        &self.remote
    }

    pub fn new_property_key(&mut self) -> PropertyKey {
        let key = PropertyKey(self.next_property_key);
        self.next_property_key += 1;
        key
    }

    // ========================================================================
    // Lookup
    // ========================================================================

    pub fn stream(&self, id: u32) -> Option<&Stream> {
        self.streams.get(&id)
    }

    pub fn stream_mut(&mut self, id: u32) -> Option<&mut Stream> {
        self.streams.get_mut(&id)
    }

    /// State of any id, including ids never opened (idle) or already evicted (closed).
    pub fn stream_state(&self, id: u32) -> StreamState {
        if let Some(stream) = self.streams.get(&id) {
            return stream.state();
        }
        if id == 0 || self.local.created(id) || self.remote.created(id) {
            StreamState::Closed
        } else {
            StreamState::Idle
        }
    }

    /// Live stream ids in creation order.
    pub fn stream_ids(&self) -> &[u32] {
        &self.order
    }

    pub fn streams(&self) -> impl Iterator<Item = &Stream> {
        self.order.iter().filter_map(|id| self.streams.get(id))
    }

    pub fn num_streams(&self) -> usize {
        self.streams.len()
    }

    /// Whether `id` is a live stream that is not reserved.
    pub fn is_open(&self, id: u32) -> bool {
        self.stream_state(id).is_active()
    }

    /// Active streams initiated by the local (`true`) or remote endpoint.
    pub fn num_active_streams(&self, local: bool) -> usize {
        let endpoint = if local { &self.local } else { &self.remote };
        self.streams
            .values()
            .filter(|s| s.state().is_active() && endpoint.is_valid_stream_id(s.id()))
            .count()
    }

    /// Children of `parent` in the priority tree, in creation order.
    pub fn priority_children(&self, parent: u32) -> Vec<u32> {
        self.streams()
            .filter(|s| s.parent() == parent)
            .map(Stream::id)
            .collect()
    }

    // ========================================================================
    // Settings
    // ========================================================================

    pub fn local_settings(&self) -> &Settings {
        &self.local_settings
    }

    pub fn remote_settings(&self) -> &Settings {
        &self.remote_settings
    }

    /// Record local SETTINGS just written to the peer.
    pub fn push_local_settings(&mut self, settings: Settings) {
        self.pending_local_settings.push_back(settings);
    }

    /// The peer acknowledged our oldest outstanding SETTINGS.
    pub fn ack_local_settings(&mut self) -> H2Result<Settings> {
        let settings = self
            .pending_local_settings
            .pop_front()
            .ok_or_else(|| H2Error::protocol("SETTINGS ACK without outstanding SETTINGS"))?;
        if let Some(max) = settings.max_concurrent_streams() {
            self.remote.max_active_streams = max;
        }
        self.local_settings.merge(&settings);
        Ok(settings)
    }

    /// Apply SETTINGS received from the peer.
    pub fn apply_remote_settings(&mut self, settings: &Settings) {
        if let Some(max) = settings.max_concurrent_streams() {
            self.local.max_active_streams = max;
        }
        self.remote_settings.merge(settings);
    }

    fn local_push_enabled(&self) -> bool {
        self.local_settings
            .push_enabled()
            .unwrap_or(defaults::ENABLE_PUSH)
    }

    fn remote_push_enabled(&self) -> bool {
        self.remote_settings
            .push_enabled()
            .unwrap_or(defaults::ENABLE_PUSH)
    }

    // ========================================================================
    // Stream creation
    // ========================================================================

    fn insert(&mut self, id: u32, state: StreamState) -> &mut Stream {
        debug!(stream_id = id, state = %state, "[H2] stream created");
        self.order.push(id);
        self.streams.entry(id).or_insert_with(|| Stream::new(id, state))
    }

    /// Open a stream initiated by this endpoint (HEADERS sent).
    pub fn open_local(&mut self, id: u32, end_stream: bool) -> H2Result<&mut Stream> {
        if !self.local.is_valid_stream_id(id) || id < self.local.next_stream_id {
            return Err(H2Error::protocol(format!(
                "invalid local stream id {} (next {})",
                id, self.local.next_stream_id
            )));
        }
        if self.goaway_received.is_some() {
            return Err(H2Error::stream(id, ErrorCode::RefusedStream, "GOAWAY received"));
        }
        if self.num_active_streams(true) >= self.local.max_active_streams as usize {
            return Err(H2Error::stream(
                id,
                ErrorCode::RefusedStream,
                "peer's max concurrent streams reached",
            ));
        }
        self.local.record_created(id);
        let state = if end_stream {
            StreamState::HalfClosedLocal
        } else {
            StreamState::Open
        };
        Ok(self.insert(id, state))
    }

    /// Open a stream initiated by the peer (HEADERS received).
    pub fn open_remote(&mut self, id: u32, end_stream: bool) -> H2Result<&mut Stream> {
        if !self.remote.is_valid_stream_id(id) {
            return Err(H2Error::protocol(format!("invalid remote stream id {}", id)));
        }
        if id <= self.remote.last_stream_created {
            return Err(H2Error::connection(
                ErrorCode::StreamClosed,
                format!("stream id {} reused", id),
            ));
        }
        self.remote.record_created(id);
        if self.goaway_sent.is_some() {
            return Err(H2Error::stream(id, ErrorCode::RefusedStream, "GOAWAY sent"));
        }
        if self.num_active_streams(false) >= self.remote.max_active_streams as usize {
            warn!(stream_id = id, max = self.remote.max_active_streams, "[H2] refusing stream");
            self.remember_reset(id);
            return Err(H2Error::stream(
                id,
                ErrorCode::RefusedStream,
                "max concurrent streams reached",
            ));
        }
        let state = if end_stream {
            StreamState::HalfClosedRemote
        } else {
            StreamState::Open
        };
        Ok(self.insert(id, state))
    }

    /// Reserve a stream for a PUSH_PROMISE we send on `parent`.
    pub fn reserve_local(&mut self, id: u32, parent: u32) -> H2Result<&mut Stream> {
        if !self.is_server() {
            return Err(H2Error::protocol("clients cannot push"));
        }
        if !self.remote_push_enabled() {
            return Err(H2Error::protocol("peer disabled server push"));
        }
        match self.streams.get(&parent) {
            Some(p) if matches!(p.state(), StreamState::Open | StreamState::HalfClosedRemote) => {}
            _ => {
                return Err(H2Error::protocol(format!(
                    "cannot push on stream {} in state {}",
                    parent,
                    self.stream_state(parent)
                )))
            }
        }
        if !self.local.is_valid_stream_id(id) || id < self.local.next_stream_id {
            return Err(H2Error::protocol(format!("invalid promised stream id {}", id)));
        }
        self.local.record_created(id);
        let stream = self.insert(id, StreamState::ReservedLocal);
        stream.set_priority(parent, PriorityInfo::DEFAULT_WEIGHT);
        Ok(stream)
    }

    /// Reserve a stream announced by a PUSH_PROMISE received on `parent`.
    pub fn reserve_remote(&mut self, id: u32, parent: u32) -> H2Result<&mut Stream> {
        if self.is_server() || !self.local_push_enabled() {
            return Err(H2Error::protocol("PUSH_PROMISE not permitted"));
        }
        match self.streams.get(&parent) {
            Some(p) if p.state().remote_side_open() => {}
            _ => {
                return Err(H2Error::protocol(format!(
                    "PUSH_PROMISE on stream {} in state {}",
                    parent,
                    self.stream_state(parent)
                )))
            }
        }
        if !self.remote.is_valid_stream_id(id) || id <= self.remote.last_stream_created {
            return Err(H2Error::protocol(format!("invalid promised stream id {}", id)));
        }
        self.remote.record_created(id);
        let stream = self.insert(id, StreamState::ReservedRemote);
        stream.set_priority(parent, PriorityInfo::DEFAULT_WEIGHT);
        Ok(stream)
    }

    // ========================================================================
    // Transitions
    // ========================================================================

    /// HEADERS sent on `id`: opens, activates a reservation, or sends trailers.
    pub fn send_headers(&mut self, id: u32, end_stream: bool) -> H2Result<()> {
        let state = self.stream_state(id);
        match state {
            StreamState::Idle => {
                self.open_local(id, end_stream)?;
                return Ok(());
            }
            StreamState::ReservedLocal => self.with_stream(id, Stream::activate_reserved)?,
            StreamState::Open | StreamState::HalfClosedRemote => {}
            _ => {
                return Err(H2Error::stream(
                    id,
                    ErrorCode::StreamClosed,
                    format!("cannot send HEADERS in state {}", state),
                ))
            }
        }
        if end_stream {
            self.close_local_side(id)?;
        }
        Ok(())
    }

    /// HEADERS received on `id`.
    pub fn recv_headers(&mut self, id: u32, end_stream: bool) -> H2Result<()> {
        let state = self.stream_state(id);
        match state {
            StreamState::Idle => {
                self.open_remote(id, end_stream)?;
                return Ok(());
            }
            StreamState::ReservedRemote => self.with_stream(id, Stream::activate_reserved)?,
            StreamState::Open | StreamState::HalfClosedLocal => {}
            _ => {
                return Err(H2Error::stream(
                    id,
                    ErrorCode::StreamClosed,
                    format!("HEADERS received in state {}", state),
                ))
            }
        }
        if end_stream {
            self.close_remote_side(id)?;
        }
        Ok(())
    }

    /// Check that this endpoint may send DATA on `id`.
    pub fn check_outbound(&self, id: u32) -> H2Result<()> {
        match self.streams.get(&id) {
            Some(s) if s.local_side_open() => Ok(()),
            _ => Err(H2Error::stream(
                id,
                ErrorCode::StreamClosed,
                format!("cannot send on stream in state {}", self.stream_state(id)),
            )),
        }
    }

    /// Check an inbound frame for `id` against stream state.
    ///
    /// Frames on idle streams that need an existing stream are connection
    /// errors. Frames on a stream we reset are ignored for a grace window,
    /// since the peer may have sent them before seeing our RST_STREAM; after
    /// that, and on streams that closed normally, they are stream errors.
    /// PRIORITY, RST_STREAM and WINDOW_UPDATE on closed streams are ignored.
    pub fn check_inbound(&mut self, kind: u8, id: u32) -> H2Result<Inbound> {
        if let Some(stream) = self.streams.get(&id) {
            if kind == frame_type::DATA && !stream.remote_side_open() {
                return Err(H2Error::stream(
                    id,
                    ErrorCode::StreamClosed,
                    format!("DATA received in state {}", stream.state()),
                ));
            }
            return Ok(Inbound::Process);
        }

        match self.stream_state(id) {
            StreamState::Idle => match kind {
                frame_type::HEADERS | frame_type::PRIORITY => Ok(Inbound::Process),
                _ => Err(H2Error::protocol(format!(
                    "frame type {} on idle stream {}",
                    kind, id
                ))),
            },
            _ => {
                if matches!(
                    kind,
                    frame_type::PRIORITY | frame_type::RST_STREAM | frame_type::WINDOW_UPDATE
                ) {
                    return Ok(Inbound::Ignore);
                }
                if let Some(entry) = self.recently_reset.iter_mut().find(|(sid, _)| *sid == id) {
                    if entry.1 > 0 {
                        entry.1 -= 1;
                        return Ok(Inbound::Ignore);
                    }
                }
                Err(H2Error::stream(
                    id,
                    ErrorCode::StreamClosed,
                    format!("frame type {} on closed stream", kind),
                ))
            }
        }
    }

    /// END_STREAM sent.
    pub fn close_local_side(&mut self, id: u32) -> H2Result<()> {
        self.with_stream(id, Stream::close_local_side)
    }

    /// END_STREAM received.
    pub fn close_remote_side(&mut self, id: u32) -> H2Result<()> {
        self.with_stream(id, Stream::close_remote_side)
    }

    /// RST_STREAM sent (`sent`) or received. Idle or unknown ids are ignored.
    pub fn reset_stream(&mut self, id: u32, sent: bool) {
        if let Some(stream) = self.streams.get_mut(&id) {
            stream.reset(sent);
            debug!(stream_id = id, sent, "[H2] stream reset");
            self.evict(id);
            if sent {
                self.remember_reset(id);
            }
        }
    }

    fn with_stream(&mut self, id: u32, f: impl FnOnce(&mut Stream) -> H2Result<()>) -> H2Result<()> {
        let stream = self.streams.get_mut(&id).ok_or_else(|| {
            H2Error::stream(id, ErrorCode::StreamClosed, "stream does not exist")
        })?;
        f(stream)?;
        if stream.state() == StreamState::Closed {
            self.evict(id);
        }
        Ok(())
    }

    fn evict(&mut self, id: u32) {
        if self.streams.remove(&id).is_none() {
            return;
        }
        self.order.retain(|sid| *sid != id);
        for stream in self.streams.values_mut() {
            if stream.parent() == id {
                let weight = stream.weight();
                stream.set_priority(0, weight);
            }
        }
        self.closed.push(id);
        debug!(stream_id = id, "[H2] stream closed");
    }

    fn remember_reset(&mut self, id: u32) {
        if self.max_reset_streams == 0 {
            return;
        }
        while self.recently_reset.len() >= self.max_reset_streams {
            self.recently_reset.pop_front();
        }
        self.recently_reset.push_back((id, self.reset_grace_frames));
    }

    /// Ids of streams closed since the last call.
    pub fn drain_closed(&mut self) -> Vec<u32> {
        std::mem::take(&mut self.closed)
    }

    // ========================================================================
    // Priority
    // ========================================================================

    /// Apply a PRIORITY update (RFC 7540 Section 5.3.3).
    pub fn set_priority(&mut self, id: u32, priority: PriorityInfo) -> H2Result<()> {
        if priority.dependency == id {
            return Err(H2Error::stream(id, ErrorCode::ProtocolError, "stream depends on itself"));
        }
        if !self.streams.contains_key(&id) {
            return Ok(());
        }
        let (parent, weight) = if priority.dependency == 0 || self.streams.contains_key(&priority.dependency) {
            (priority.dependency, priority.weight)
        } else {
            (0, PriorityInfo::DEFAULT_WEIGHT)
        };

        // A new parent that is our descendant moves up to our old parent first.
        if parent != 0 && self.is_descendant(parent, id) {
            let old_parent = self.streams.get(&id).map_or(0, Stream::parent);
            if let Some(p) = self.streams.get_mut(&parent) {
                let w = p.weight();
                p.set_priority(old_parent, w);
            }
        }
        if priority.exclusive {
            for child in self.priority_children(parent) {
                if child != id {
                    if let Some(c) = self.streams.get_mut(&child) {
                        let w = c.weight();
                        c.set_priority(id, w);
                    }
                }
            }
        }
        if let Some(stream) = self.streams.get_mut(&id) {
            stream.set_priority(parent, weight);
        }
        Ok(())
    }

    /// Whether `node` sits somewhere below `ancestor`.
    fn is_descendant(&self, node: u32, ancestor: u32) -> bool {
        let mut cur = node;
        let mut hops = 0;
        while let Some(stream) = self.streams.get(&cur) {
            if stream.parent() == ancestor {
                return true;
            }
            cur = stream.parent();
            hops += 1;
            if cur == 0 || hops > self.streams.len() {
                break;
            }
        }
        false
    }

    // ========================================================================
    // Shutdown
    // ========================================================================

    pub fn goaway_sent(&self) -> Option<u32> {
        self.goaway_sent
    }

    pub fn goaway_received(&self) -> Option<u32> {
        self.goaway_received
    }

    pub fn record_goaway_sent(&mut self, last_stream_id: u32) {
        self.goaway_sent = Some(last_stream_id);
    }

    /// Peer sent GOAWAY: locally initiated streams above `last_stream_id`
    /// were not processed and are closed. Returns their ids.
    pub fn record_goaway_received(&mut self, last_stream_id: u32, code: ErrorCode) -> Vec<u32> {
        warn!(last_stream_id, code = %code, "[H2] GOAWAY received");
        self.goaway_received = Some(last_stream_id);
        let unprocessed: Vec<u32> = self
            .order
            .iter()
            .copied()
            .filter(|id| *id > last_stream_id && self.local.is_valid_stream_id(*id))
            .collect();
        for id in &unprocessed {
            self.reset_stream(*id, false);
        }
        unprocessed
    }

    /// Whether no stream is live and a GOAWAY went either way.
    pub fn is_shut_down(&self) -> bool {
        (self.goaway_sent.is_some() || self.goaway_received.is_some()) && self.streams.is_empty()
    }

    // ========================================================================
    // HTTP/1.1 upgrade
    // ========================================================================

    /// Client side of an h2c upgrade: the HTTP/1.1 request becomes stream 1,
    /// already fully sent.
    pub fn upgrade_client_stream(&mut self) -> H2Result<&mut Stream> {
        if self.is_server() {
            return Err(H2Error::protocol("server cannot create the client upgrade stream"));
        }
        self.open_local(1, true)
    }

    /// Server side of an h2c upgrade: the HTTP/1.1 request becomes stream 1,
    /// already fully received.
    pub fn upgrade_server_stream(&mut self) -> H2Result<&mut Stream> {
        if !self.is_server() {
            return Err(H2Error::protocol("client cannot create the server upgrade stream"));
        }
        self.open_remote(1, true)
    }
}
