//! Codec configuration.

use crate::connection::{Role, DEFAULT_MAX_RESET_STREAMS, DEFAULT_RESET_GRACE_FRAMES};
use crate::decorator::DEFAULT_MAX_CONSECUTIVE_EMPTY_FRAMES;
use crate::flow::{PriorityTreeDistributor, StreamByteDistributor, WeightedFairQueueDistributor};
use crate::frame::MAX_HEADER_BLOCK_SIZE;
use crate::settings::{defaults, Settings};

/// Which [`StreamByteDistributor`] the default encoder uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DistributorKind {
    #[default]
    WeightedFairQueue,
    PriorityTree,
}

impl DistributorKind {
    pub fn build(self) -> Box<dyn StreamByteDistributor> {
        match self {
            Self::WeightedFairQueue => Box::new(WeightedFairQueueDistributor::new()),
            Self::PriorityTree => Box::new(PriorityTreeDistributor::new()),
        }
    }
}

/// Configuration for [`H2Codec`](crate::handler::H2Codec).
#[derive(Debug, Clone, PartialEq)]
pub struct CodecConfig {
    pub role: Role,
    /// SETTINGS sent when the codec starts.
    pub local_settings: Settings,
    /// Limit on a HEADERS/PUSH_PROMISE block reassembled from CONTINUATION frames.
    pub max_header_block_size: usize,
    pub max_consecutive_empty_frames: usize,
    /// Frames tolerated on a stream after we reset it.
    pub reset_grace_frames: u32,
    /// Reset stream ids remembered for the grace window.
    pub max_reset_streams: usize,
    pub distributor: DistributorKind,
    /// Require the client connection preface (server role only).
    pub validate_preface: bool,
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self::server()
    }
}

impl CodecConfig {
    pub fn new(role: Role) -> Self {
        let mut local_settings = Settings::new();
        local_settings
            .set_max_concurrent_streams(defaults::MAX_CONCURRENT_STREAMS)
            .set_max_header_list_size(defaults::MAX_HEADER_LIST_SIZE);
        Self {
            role,
            local_settings,
            max_header_block_size: MAX_HEADER_BLOCK_SIZE,
            max_consecutive_empty_frames: DEFAULT_MAX_CONSECUTIVE_EMPTY_FRAMES,
            reset_grace_frames: DEFAULT_RESET_GRACE_FRAMES,
            max_reset_streams: DEFAULT_MAX_RESET_STREAMS,
            distributor: DistributorKind::default(),
            validate_preface: role == Role::Server,
        }
    }

    pub fn client() -> Self {
        Self::new(Role::Client)
    }

    pub fn server() -> Self {
        Self::new(Role::Server)
    }

    pub fn with_local_settings(mut self, settings: Settings) -> Self {
        self.local_settings = settings;
        self
    }

    pub fn with_max_header_block_size(mut self, size: usize) -> Self {
        self.max_header_block_size = size;
        self
    }

    pub fn with_max_consecutive_empty_frames(mut self, count: usize) -> Self {
        self.max_consecutive_empty_frames = count;
        self
    }

    pub fn with_reset_grace(mut self, frames: u32, max_streams: usize) -> Self {
        self.reset_grace_frames = frames;
        self.max_reset_streams = max_streams;
        self
    }

    pub fn with_distributor(mut self, distributor: DistributorKind) -> Self {
        self.distributor = distributor;
        self
    }

    pub fn with_validate_preface(mut self, validate: bool) -> Self {
        self.validate_preface = validate;
        self
    }
}
