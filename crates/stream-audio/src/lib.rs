//! Internet audio stream management
//!
//! Lifecycle, retry, buffering and metadata handling for a single internet
//! radio stream, on top of an opaque [`engine::DecoderEngine`].  A lighter
//! backend for hosts that already have a full media player lives in
//! [`player`].

pub mod engine;
pub mod handle;
pub mod manager;
pub mod metadata;
pub mod playback;
pub mod player;

pub use engine::{
    ChannelHandle, DecoderEngine, EngineError, EngineResult, OpenState, OpenStateInfo,
    SoundHandle, StreamMode, Tag, TagCounts, TagData, TagFormat,
};
pub use handle::StreamHandle;
pub use manager::{
    PauseRequest, RetryState, StreamManager, StreamSettings, StreamStatus, StreamingAudio,
};
pub use metadata::{MetadataExtractor, MetadataValue};
pub use playback::{BufferAction, BufferHealth, PlaybackController};
pub use player::{MediaPlayer, MediaStatus, PlayerFactory, PlayerStreamer};
