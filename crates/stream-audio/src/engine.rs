/// Decoder engine seam.
///
/// The streaming core never talks to an audio backend directly.  Everything
/// it needs (open a network stream, poll its open state, start a channel,
/// read embedded tags, release) goes through [`DecoderEngine`].  Engines are
/// expected to do their network and decode work on their own threads; every
/// call here must return promptly and report progress only through polling.
use thiserror::Error;

// ── errors ────────────────────────────────────────────────────────────────────

/// Failure reported by a decoder engine.  The string payloads carry the
/// engine's own error text so callers can log it verbatim.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    #[error("invalid handle")]
    InvalidHandle,
    #[error("stream not ready")]
    NotReady,
    #[error("engine unavailable: {0}")]
    Unavailable(String),
    #[error("{0}")]
    Engine(String),
}

pub type EngineResult<T> = std::result::Result<T, EngineError>;

// ── handles ───────────────────────────────────────────────────────────────────

/// Owned decoder resource.  Deliberately not `Clone`: there is exactly one
/// owner, and [`DecoderEngine::release`] consumes it.
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct SoundHandle(u64);

impl SoundHandle {
    pub fn from_raw(id: u64) -> Self {
        Self(id)
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

/// Playback channel reference.  Channels belong to the engine; holders only
/// keep a reference and never release them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChannelHandle(u64);

impl ChannelHandle {
    pub fn from_raw(id: u64) -> Self {
        Self(id)
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

/// How a stream should be opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamMode {
    /// Return immediately and open in the background.
    pub non_blocking: bool,
    /// Skip tag parsing while opening (tags still arrive later from the stream).
    pub ignore_tags: bool,
    /// Plain 2D playback, no spatialisation.
    pub two_d: bool,
}

impl StreamMode {
    /// The only mode the stream manager uses for internet radio.
    pub const INTERNET: StreamMode = StreamMode {
        non_blocking: true,
        ignore_tags: true,
        two_d: true,
    };
}

// ── open state ────────────────────────────────────────────────────────────────

/// Decoder-reported phase of a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OpenState {
    /// Opened and playable.
    Ready,
    /// Opening has started but the engine has not begun connecting yet.
    Loading,
    /// Failed; the stream will not recover on its own.
    #[default]
    Error,
    /// Network handshake in progress.  Releasing now is unsafe.
    Connecting,
    /// Connected and filling its network buffer.
    Buffering,
}

/// One poll of a stream's open state plus its buffering telemetry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OpenStateInfo {
    pub state: OpenState,
    /// Network buffer fill, 0..=100.
    pub percent_buffered: u32,
    /// Buffer underrun: playback would produce audible gaps.
    pub starving: bool,
    pub disk_busy: bool,
}

impl OpenStateInfo {
    pub fn new(state: OpenState) -> Self {
        Self {
            state,
            ..Self::default()
        }
    }

    pub fn with_buffer(mut self, percent_buffered: u32, starving: bool) -> Self {
        self.percent_buffered = percent_buffered;
        self.starving = starving;
        self
    }
}

// ── tags ──────────────────────────────────────────────────────────────────────

/// Container format a tag was read from.  Key normalisation depends on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagFormat {
    Unknown,
    Id3v1,
    Id3v2,
    VorbisComment,
    Shoutcast,
    Icecast,
    Asf,
    Playlist,
    /// Engine-internal notifications delivered through the tag channel.
    Engine,
    User,
}

/// Raw tag payload as declared by the engine.
#[derive(Debug, Clone, PartialEq)]
pub enum TagData {
    Int(i64),
    Float(f64),
    /// Narrow (byte) string, possibly NUL terminated.
    String(Vec<u8>),
    /// UTF-16, little endian unless a byte order mark says otherwise.
    Utf16(Vec<u8>),
    Utf16Be(Vec<u8>),
    /// Anything the metadata layer does not understand.
    Binary(Vec<u8>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Tag {
    pub format: TagFormat,
    pub name: String,
    pub data: TagData,
}

impl Tag {
    pub fn new(format: TagFormat, name: impl Into<String>, data: TagData) -> Self {
        Self {
            format,
            name: name.into(),
            data,
        }
    }

    /// Convenience for the common narrow-string case.
    pub fn text(format: TagFormat, name: impl Into<String>, value: &str) -> Self {
        Self::new(format, name, TagData::String(value.as_bytes().to_vec()))
    }
}

/// Result of a tag count query.  `dirty` is the number of tags that changed
/// since they were last read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TagCounts {
    pub total: usize,
    pub dirty: usize,
}

// ── engine trait ──────────────────────────────────────────────────────────────

/// Request/poll interface to an opaque audio decoder.
pub trait DecoderEngine {
    fn create_stream(&mut self, url: &str, mode: StreamMode) -> EngineResult<SoundHandle>;

    fn open_state(&mut self, sound: &SoundHandle) -> EngineResult<OpenStateInfo>;

    /// Start a channel for `sound`.  With `paused` set the channel is created
    /// silent so volume can be applied before the first sample is heard.
    fn play(&mut self, sound: &SoundHandle, paused: bool) -> EngineResult<ChannelHandle>;

    fn release(&mut self, sound: SoundHandle) -> EngineResult<()>;

    fn tag_counts(&mut self, sound: &SoundHandle) -> EngineResult<TagCounts>;

    /// Read tag `index`.  Reading clears the tag's dirty mark.
    fn tag(&mut self, sound: &SoundHandle, index: usize) -> EngineResult<Tag>;

    fn set_volume(&mut self, channel: ChannelHandle, volume: f32) -> EngineResult<()>;

    fn set_frequency(&mut self, channel: ChannelHandle, frequency: f32) -> EngineResult<()>;

    fn set_paused(&mut self, channel: ChannelHandle, paused: bool) -> EngineResult<()>;

    fn paused(&mut self, channel: ChannelHandle) -> EngineResult<bool>;

    fn set_priority(&mut self, channel: ChannelHandle, priority: i32) -> EngineResult<()>;

    /// Size of the network read buffer, in raw bytes.
    fn set_stream_buffer_size(&mut self, bytes: u32) -> EngineResult<()>;

    /// Size of the decoder's internal PCM buffer, in milliseconds.
    fn set_decode_buffer_size(&mut self, millis: u32) -> EngineResult<()>;
}
