//! Per-stream state (RFC 7540 Section 5.1)

use std::any::Any;
use std::collections::HashMap;
use std::fmt;

use crate::error::{ErrorCode, H2Error, H2Result};
use crate::frame::PriorityInfo;

/// Stream lifecycle state.
///
/// ```text
///                          +--------+
///                  send PP |        | recv PP
///                 ,--------|  idle  |--------.
///                /         |        |         \
///               v          +--------+          v
///        +----------+          |           +----------+
///        |          |          | send H /  |          |
/// ,------| reserved |          | recv H    | reserved |------.
/// |      | (local)  |          |           | (remote) |      |
/// |      +----------+          v           +----------+      |
/// |          |             +--------+             |          |
/// |          |     recv ES |        | send ES     |          |
/// |   send H |     ,-------|  open  |-------.     | recv H   |
/// |          |    /        |        |        \    |          |
/// |          v   v         +--------+         v   v          |
/// |      +----------+          |           +----------+      |
/// |      |   half   |          |           |   half   |      |
/// |      |  closed  |          | send R /  |  closed  |      |
/// |      | (remote) |          | recv R    | (local)  |      |
/// |      +----------+          |           +----------+      |
/// |           |                |                 |           |
/// |           | send ES /      |       recv ES / |           |
/// |           | send R /       v        send R / |           |
/// |           | recv R     +--------+   recv R   |           |
/// | send R /  `----------->|        |<-----------'  send R / |
/// | recv R                 | closed |               recv R   |
/// `----------------------->|        |<-----------------------'
///                          +--------+
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamState {
    Idle,
    ReservedLocal,
    ReservedRemote,
    Open,
    HalfClosedLocal,
    HalfClosedRemote,
    Closed,
}

impl StreamState {
    /// Whether this endpoint may still send frames carrying stream data.
    pub fn local_side_open(self) -> bool {
        matches!(self, Self::Open | Self::HalfClosedRemote | Self::ReservedLocal)
    }

    /// Whether the peer may still send frames carrying stream data.
    pub fn remote_side_open(self) -> bool {
        matches!(self, Self::Open | Self::HalfClosedLocal | Self::ReservedRemote)
    }

    /// Counted against SETTINGS_MAX_CONCURRENT_STREAMS.
    pub fn is_active(self) -> bool {
        matches!(self, Self::Open | Self::HalfClosedLocal | Self::HalfClosedRemote)
    }
}

impl fmt::Display for StreamState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::ReservedLocal => "reserved (local)",
            Self::ReservedRemote => "reserved (remote)",
            Self::Open => "open",
            Self::HalfClosedLocal => "half-closed (local)",
            Self::HalfClosedRemote => "half-closed (remote)",
            Self::Closed => "closed",
        };
        f.write_str(s)
    }
}

/// Key into a stream's property bag, handed out by
/// [`Connection::new_property_key`](crate::connection::Connection::new_property_key).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PropertyKey(pub(crate) usize);

/// A single HTTP/2 stream.
#[derive(Debug)]
pub struct Stream {
    id: u32,
    state: StreamState,
    weight: u16,
    /// Parent in the priority tree; 0 is the connection root.
    parent: u32,
    reset_sent: bool,
    reset_received: bool,
    properties: HashMap<PropertyKey, Box<dyn Any + Send>>,
}

impl Stream {
    pub(crate) fn new(id: u32, state: StreamState) -> Self {
        Self {
            id,
            state,
            weight: PriorityInfo::DEFAULT_WEIGHT,
            parent: 0,
            reset_sent: false,
            reset_received: false,
            properties: HashMap::new(),
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn state(&self) -> StreamState {
        self.state
    }

    pub fn local_side_open(&self) -> bool {
        self.state.local_side_open()
    }

    pub fn remote_side_open(&self) -> bool {
        self.state.remote_side_open()
    }

    pub fn weight(&self) -> u16 {
        self.weight
    }

    pub fn parent(&self) -> u32 {
        self.parent
    }

    pub(crate) fn set_priority(&mut self, parent: u32, weight: u16) {
        self.parent = parent;
        self.weight = weight.clamp(1, 256);
    }

    pub fn is_reset_sent(&self) -> bool {
        self.reset_sent
    }

    pub fn is_reset_received(&self) -> bool {
        self.reset_received
    }

    // ========================================================================
    // Transitions
    // ========================================================================

    /// A reserved stream becomes half-closed once its HEADERS are sent/received.
    pub(crate) fn activate_reserved(&mut self) -> H2Result<()> {
        self.state = match self.state {
            StreamState::ReservedLocal => StreamState::HalfClosedRemote,
            StreamState::ReservedRemote => StreamState::HalfClosedLocal,
            other => {
                return Err(H2Error::protocol(format!(
                    "stream {} is {}, not reserved",
                    self.id, other
                )))
            }
        };
        Ok(())
    }

    /// END_STREAM sent.
    pub(crate) fn close_local_side(&mut self) -> H2Result<()> {
        self.state = match self.state {
            StreamState::Open => StreamState::HalfClosedLocal,
            StreamState::HalfClosedRemote => StreamState::Closed,
            other => {
                return Err(H2Error::stream(
                    self.id,
                    ErrorCode::StreamClosed,
                    format!("cannot end stream in state {}", other),
                ))
            }
        };
        Ok(())
    }

    /// END_STREAM received.
    pub(crate) fn close_remote_side(&mut self) -> H2Result<()> {
        self.state = match self.state {
            StreamState::Open => StreamState::HalfClosedRemote,
            StreamState::HalfClosedLocal => StreamState::Closed,
            other => {
                return Err(H2Error::stream(
                    self.id,
                    ErrorCode::StreamClosed,
                    format!("END_STREAM received in state {}", other),
                ))
            }
        };
        Ok(())
    }

    /// RST_STREAM sent or received.
    pub(crate) fn reset(&mut self, sent: bool) {
        if sent {
            self.reset_sent = true;
        } else {
            self.reset_received = true;
        }
        self.state = StreamState::Closed;
    }

    // ========================================================================
    // Properties
    // ========================================================================

    /// Attach a value; returns the previous one under the same key.
    pub fn set_property<T: Any + Send>(
        &mut self,
        key: PropertyKey,
        value: T,
    ) -> Option<Box<dyn Any + Send>> {
        self.properties.insert(key, Box::new(value))
    }

    pub fn property<T: Any>(&self, key: PropertyKey) -> Option<&T> {
        self.properties.get(&key)?.downcast_ref::<T>()
    }

    pub fn property_mut<T: Any>(&mut self, key: PropertyKey) -> Option<&mut T> {
        self.properties.get_mut(&key)?.downcast_mut::<T>()
    }

    pub fn remove_property(&mut self, key: PropertyKey) -> Option<Box<dyn Any + Send>> {
        self.properties.remove(&key)
    }
}
