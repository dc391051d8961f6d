//! h2-engine: a sans-I/O HTTP/2 protocol engine
//!
//! This crate implements the protocol core of an HTTP/2 endpoint without
//! owning any sockets: you feed it bytes, it hands you events and the bytes
//! to write back.
//!
//! # Features
//!
//! - **Sans-I/O Design**: No async runtime dependencies (no tokio)
//! - **HPACK**: Dynamic table, Huffman coding, header list size limits and
//!   never-indexed fields for sensitive headers (RFC 7541)
//! - **Stream State Machine**: Idle → Reserved → Open → Half-Closed → Closed,
//!   concurrency limits, GOAWAY and a grace window for reset streams
//! - **Flow Control**: Connection and stream windows in both directions, with
//!   pluggable byte distribution (priority tree or weighted fair queue)
//! - **Decorators**: Compose encoder/decoder behaviors, e.g. empty DATA frame
//!   flood protection
//! - **h2c Upgrade**: The HTTP/1.1 `Upgrade: h2c` handshake
//!
//! # Quick Start
//!
//! ```rust
//! use h2_engine::{H2Codec, H2Event, Headers};
//!
//! let mut client = H2Codec::client().unwrap();
//! let mut server = H2Codec::server().unwrap();
//!
//! let mut request = Headers::new();
//! request
//!     .add(":method", "GET")
//!     .add(":scheme", "http")
//!     .add(":path", "/")
//!     .add(":authority", "example.com");
//! client.send_headers(1, &request, true).unwrap();
//!
//! let mut events: Vec<H2Event> = Vec::new();
//! server.process(&client.take_output(), &mut events).unwrap();
//!
//! for event in &events {
//!     if let H2Event::Headers { stream_id, headers, .. } = event {
//!         println!("request on stream {}: {:?}", stream_id, headers.get(":path"));
//!     }
//! }
//! ```
//!
//! # Architecture
//!
//! - [`frame`]: frame parsing (bytes → [`Frame`]), CONTINUATION assembly
//! - [`writer`]: frame serialization behind the [`FrameWriter`] trait
//! - [`hpack`]: header compression
//! - [`connection`] / [`stream`]: stream lifecycle and priority tree
//! - [`flow`]: flow-control windows and byte distribution
//! - [`codec`]: [`ConnectionEncoder`] / [`ConnectionDecoder`] and their
//!   default implementations
//! - [`decorator`]: wrappers adding one behavior to an encoder or decoder
//! - [`handler`]: [`H2Codec`], which ties everything together
//! - [`upgrade`]: the HTTP/1.1 → h2c handshake
//!
//! It does NOT provide:
//! - TCP/UDP transport (you provide the bytes)
//! - TLS or ALPN (use rustls or similar)
//! - An HTTP/1.1 parser
//!
//! # Logging
//!
//! Diagnostics are emitted through `tracing`; install a subscriber to see
//! them. Nothing is logged above `warn`.

pub mod codec;
pub mod config;
pub mod connection;
pub mod decorator;
pub mod error;
pub mod flow;
pub mod frame;
pub mod handler;
pub mod hpack;
pub mod settings;
pub mod stream;
pub mod upgrade;
pub mod writer;

pub use codec::{
    ConnectionDecoder, ConnectionEncoder, DefaultDecoder, DefaultEncoder, FrameListener, H2Event,
    SettingsReceivedConsumer,
};
pub use config::{CodecConfig, DistributorKind};
pub use connection::{Connection, Endpoint, Role};
pub use decorator::{DecoratingDecoder, DecoratingEncoder, EmptyDataFrameDecoder};
pub use error::{ErrorCode, H2Error, H2Result, HpackError};
pub use flow::{
    LocalFlowController, PriorityTreeDistributor, RemoteFlowController, StreamByteDistributor,
    StreamableState, WeightedFairQueueDistributor,
};
pub use frame::{
    flags, frame_type, is_h2c_preface, settings_id, Frame, FrameHeader, FrameReader, PriorityInfo,
    CONNECTION_PREFACE, MAX_HEADER_BLOCK_SIZE,
};
pub use handler::{H2Codec, UpgradeTarget};
pub use hpack::{
    AlwaysSensitive, HeaderField, Headers, HpackDecoder, HpackEncoder, NeverSensitive,
    SensitivityDetector,
};
pub use settings::Settings;
pub use stream::{Stream, StreamState};
pub use upgrade::{ClientUpgradeCodec, ServerUpgradeCodec};
pub use writer::{BufferAllocator, FrameEncoder, FrameWriter, HeapAllocator};
