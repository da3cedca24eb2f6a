/// StreamManager: single point of control for "the current internet stream".
///
/// Cooperative and single-threaded: the host calls [`StreamingAudio::update`]
/// once per frame tick and every other method from the same thread.  Nothing
/// here blocks except the bounded dead-stream drain on drop.
///
/// ```text
///   start(url) ──► active StreamHandle ──update()──► READY  → acquire channel, apply gain
///                        │                       ├─► ERROR  → retry (≤ max) or abandon
///                        │                       └─► other  → buffering policy only
///                      stop()
///                        ├── close ok      → released
///                        └── close refused → dead queue ──update()──► close again
/// ```
use std::collections::VecDeque;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::engine::{ChannelHandle, DecoderEngine, OpenState, OpenStateInfo};
use crate::handle::StreamHandle;
use crate::metadata::{MetadataExtractor, MetadataValue};
use crate::playback::{BufferAction, PlaybackController};

/// Bytes per kbit used when turning a buffer duration into a byte budget.
const BYTES_PER_KBIT: u32 = 128;

/// Network buffer length applied when the manager is created.
const INITIAL_STREAM_BUFFER_MS: u32 = 10_000;

// ── settings ──────────────────────────────────────────────────────────────────

/// Tunables read from the host's configuration at construction.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamSettings {
    /// Bitrate assumed when converting buffer durations to bytes.
    pub assumed_bitrate_kbps: u32,
    /// Restarts attempted after an open-state error before giving up.
    pub max_retries: u32,
    /// Shutdown: how many times to retry closing dead streams.
    pub drain_attempts: u32,
    /// Shutdown: pause between drain attempts.
    pub drain_interval: Duration,
    /// Gain used until the host sets one.
    pub initial_gain: f32,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            assumed_bitrate_kbps: 128,
            max_retries: 2,
            drain_attempts: 20,
            drain_interval: Duration::from_millis(10),
            initial_gain: 1.0,
        }
    }
}

/// Raw network buffer size for `millis` of audio at `bitrate_kbps`.
/// Whole seconds only, like the engine's own time-to-bytes conversion.
pub fn stream_buffer_bytes(millis: u32, bitrate_kbps: u32) -> u32 {
    (millis / 1000)
        .saturating_mul(bitrate_kbps)
        .saturating_mul(BYTES_PER_KBIT)
}

// ── status / requests ─────────────────────────────────────────────────────────

/// Whether a stream has been requested.  Says nothing about audio actually
/// coming out of the speakers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum StreamStatus {
    Inactive = 0,
    Active = 1,
    /// No stream, but a url is still remembered and can be resumed.
    Paused = 2,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PauseRequest {
    Pause,
    Resume,
    /// Pause when a stream is active, resume otherwise.
    Toggle,
}

impl From<i32> for PauseRequest {
    /// Integer tri-state: negative toggles, zero resumes, positive pauses.
    fn from(value: i32) -> Self {
        match value {
            v if v < 0 => PauseRequest::Toggle,
            0 => PauseRequest::Resume,
            _ => PauseRequest::Pause,
        }
    }
}

/// Automatic restart bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryState {
    count: u32,
    max: u32,
}

impl RetryState {
    pub fn new(max: u32) -> Self {
        Self { count: 0, max }
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn reset(&mut self) {
        self.count = 0;
    }

    pub fn exhausted(&self) -> bool {
        self.count >= self.max
    }

    fn bump(&mut self) {
        self.count += 1;
    }
}

// ── interface ─────────────────────────────────────────────────────────────────

/// What a host application sees of an internet audio stream backend.
pub trait StreamingAudio {
    fn start(&mut self, url: &str);
    fn stop(&mut self);
    fn pause(&mut self, request: PauseRequest);
    fn update(&mut self);
    fn is_playing(&self) -> StreamStatus;
    fn set_gain(&mut self, gain: f32);
    fn gain(&self) -> f32;
    fn url(&self) -> &str;
    fn set_buffer_sizes(&mut self, stream_buffer_ms: u32, decode_buffer_ms: u32);
    /// True at most once per metadata batch, and only while a stream is active.
    fn has_new_metadata(&mut self) -> bool;
    fn current_artist(&self) -> String;
    fn current_title(&self) -> String;
    fn current_stream_name(&self) -> String;
    fn current_stream_location(&self) -> String;
}

// ── manager ───────────────────────────────────────────────────────────────────

pub struct StreamManager<E: DecoderEngine> {
    engine: E,
    settings: StreamSettings,
    /// The active stream.  Never also present in `dead`.
    current: Option<StreamHandle>,
    /// Channel of the active stream once playback started.
    channel: Option<ChannelHandle>,
    /// Streams whose close was refused; retried every tick.
    dead: VecDeque<StreamHandle>,
    /// Remembered url.  Survives `stop()` so the stream can be resumed.
    url: String,
    playback: PlaybackController,
    retry: RetryState,
    metadata: MetadataExtractor,
}

impl<E: DecoderEngine> StreamManager<E> {
    pub fn new(mut engine: E, settings: StreamSettings) -> Self {
        let bytes = stream_buffer_bytes(INITIAL_STREAM_BUFFER_MS, settings.assumed_bitrate_kbps);
        if let Err(e) = engine.set_stream_buffer_size(bytes) {
            warn!("stream: set stream buffer size error: {}", e);
        }

        Self {
            engine,
            playback: PlaybackController::new(settings.initial_gain),
            retry: RetryState::new(settings.max_retries),
            settings,
            current: None,
            channel: None,
            dead: VecDeque::new(),
            url: String::new(),
            metadata: MetadataExtractor::new(),
        }
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut E {
        &mut self.engine
    }

    pub fn settings(&self) -> &StreamSettings {
        &self.settings
    }

    pub fn retry_count(&self) -> u32 {
        self.retry.count()
    }

    pub fn has_active_stream(&self) -> bool {
        self.current.is_some()
    }

    /// Url of the active stream, which may differ from the remembered url
    /// only transiently during a restart.
    pub fn active_url(&self) -> Option<&str> {
        self.current.as_ref().map(StreamHandle::url)
    }

    pub fn channel(&self) -> Option<ChannelHandle> {
        self.channel
    }

    pub fn dead_stream_count(&self) -> usize {
        self.dead.len()
    }

    pub fn metadata(&self) -> &MetadataExtractor {
        &self.metadata
    }

    pub fn metadata_value(&self, key: &str) -> Option<&MetadataValue> {
        self.metadata.get(key)
    }

    /// Try to close every parked stream once.
    fn drain_dead_streams(&mut self) {
        let pending = std::mem::take(&mut self.dead);
        for mut stream in pending {
            if stream.close(&mut self.engine) {
                info!("stream: closed dead stream '{}'", stream.url());
            } else {
                self.dead.push_back(stream);
            }
        }
    }

    fn open_stream(&mut self, url: &str) {
        self.current = Some(StreamHandle::open(&mut self.engine, url));
        self.url = url.to_string();
    }

    fn apply_gain(&mut self) {
        if let Some(channel) = self.channel {
            let volume = self.playback.applied_volume();
            if let Err(e) = self.engine.set_volume(channel, volume) {
                warn!("stream: set volume error: {}", e);
            }
        }
    }

    fn set_channel_paused(&mut self, channel: ChannelHandle, paused: bool) {
        if let Err(e) = self.engine.set_paused(channel, paused) {
            warn!("stream: set paused={} error: {}", paused, e);
        }
    }

    fn handle_open_error(&mut self, info: &OpenStateInfo) {
        info!(
            "stream: open state ERROR progress={} starving={} disk_busy={}",
            info.percent_buffered, info.starving, info.disk_busy
        );

        if self.retry.exhausted() {
            warn!(
                "stream: giving up on '{}' after {} retries",
                self.url,
                self.retry.count()
            );
            self.stop();
            return;
        }

        let url = self.url.clone();
        self.stop();
        self.retry.bump();

        if !url.is_empty() {
            info!(
                "stream: restarting '{}', attempt {}",
                url,
                self.retry.count() + 1
            );
            self.open_stream(&url);
        }
    }

    fn refresh_metadata(&mut self, channel: ChannelHandle) {
        let Some(stream) = self.current.as_ref() else {
            return;
        };
        let Some(tags) = stream.dirty_tags(&mut self.engine) else {
            return;
        };

        self.metadata.begin_batch();
        for tag in &tags {
            if let Some(hz) = self.metadata.ingest(tag) {
                info!("stream: forced sample rate change to {}", hz);
                if let Err(e) = self.engine.set_frequency(channel, hz) {
                    warn!("stream: set frequency error: {}", e);
                }
            }
        }
    }

    fn apply_buffer_policy(&mut self, channel: ChannelHandle, info: &OpenStateInfo) {
        // Unknown paused flag: leave the channel as it is this tick.
        let paused = match self.engine.paused(channel) {
            Ok(p) => p,
            Err(e) => {
                debug!("stream: paused query failed, skipping buffer policy: {}", e);
                return;
            }
        };

        match self.playback.decide(info, paused) {
            BufferAction::Pause => {
                info!(
                    "stream: starvation detected, pausing until buffer nearly full (disk_busy={} progress={})",
                    info.disk_busy, info.percent_buffered
                );
                self.set_channel_paused(channel, true);
            }
            BufferAction::Resume => self.set_channel_paused(channel, false),
            BufferAction::Hold => {}
        }
    }

    /// Stop whatever is active and wait a bounded time for parked streams to
    /// close.  Streams that still refuse are abandoned without release.
    fn shutdown(&mut self) {
        if self.current.is_some() {
            warn!("stream: active stream still present on shutdown");
            self.stop();
        }

        self.drain_dead_streams();

        if !self.dead.is_empty() {
            info!("stream: waiting for {} streams to stop", self.dead.len());
            for attempt in 1..=self.settings.drain_attempts {
                std::thread::sleep(self.settings.drain_interval);
                self.drain_dead_streams();
                if self.dead.is_empty() {
                    info!(
                        "stream: all streams stopped after {}ms",
                        self.settings.drain_interval.as_millis() * attempt as u128
                    );
                    break;
                }
            }
        }

        if !self.dead.is_empty() {
            warn!(
                "stream: failed to close {} streams, abandoning them",
                self.dead.len()
            );
            self.dead.clear();
        }
    }
}

impl<E: DecoderEngine> StreamingAudio for StreamManager<E> {
    fn start(&mut self, url: &str) {
        // Always a fresh stream, even for the url already playing.
        self.stop();

        if url.is_empty() {
            info!("stream: set internet stream to none");
            self.url.clear();
        } else {
            info!("stream: starting internet stream '{}'", url);
            self.open_stream(url);
        }

        self.retry.reset();
    }

    fn stop(&mut self) {
        if let Some(channel) = self.channel.take() {
            self.set_channel_paused(channel, true);
            if let Err(e) = self.engine.set_priority(channel, 0) {
                debug!("stream: set priority error: {}", e);
            }
        }

        if let Some(mut stream) = self.current.take() {
            info!("stream: stopping '{}'", stream.url());
            if !stream.close(&mut self.engine) {
                warn!("stream: pushing '{}' to dead list", stream.url());
                self.dead.push_back(stream);
            }
        }
    }

    fn pause(&mut self, request: PauseRequest) {
        let pause = match request {
            PauseRequest::Pause => true,
            PauseRequest::Resume => false,
            PauseRequest::Toggle => self.current.is_some(),
        };

        if pause {
            if self.current.is_some() {
                info!("stream: pausing internet stream");
                self.stop();
            }
        } else {
            let url = self.url.clone();
            self.start(&url);
        }
    }

    fn update(&mut self) {
        self.drain_dead_streams();

        let Some(stream) = self.current.as_mut() else {
            return;
        };
        let info = stream.open_state(&mut self.engine);

        match info.state {
            OpenState::Ready => {
                if self.channel.is_none() {
                    if let Some(channel) = stream.acquire_playback(&mut self.engine) {
                        self.channel = Some(channel);
                        self.apply_gain();
                        self.set_channel_paused(channel, false);
                    }
                }
                self.retry.reset();
            }
            OpenState::Error => {
                self.handle_open_error(&info);
                return;
            }
            OpenState::Loading | OpenState::Connecting | OpenState::Buffering => {}
        }

        if let Some(channel) = self.channel {
            self.refresh_metadata(channel);
            self.apply_buffer_policy(channel, &info);
        }
    }

    fn is_playing(&self) -> StreamStatus {
        if self.current.is_some() {
            StreamStatus::Active
        } else if !self.url.is_empty() {
            StreamStatus::Paused
        } else {
            StreamStatus::Inactive
        }
    }

    fn set_gain(&mut self, gain: f32) {
        self.playback.set_gain(gain);
        self.apply_gain();
    }

    fn gain(&self) -> f32 {
        self.playback.gain()
    }

    fn url(&self) -> &str {
        &self.url
    }

    fn set_buffer_sizes(&mut self, stream_buffer_ms: u32, decode_buffer_ms: u32) {
        let bytes = stream_buffer_bytes(stream_buffer_ms, self.settings.assumed_bitrate_kbps);
        if let Err(e) = self.engine.set_stream_buffer_size(bytes) {
            warn!("stream: set stream buffer size error: {}", e);
            return;
        }
        if let Err(e) = self.engine.set_decode_buffer_size(decode_buffer_ms) {
            warn!("stream: set decode buffer size error: {}", e);
        }
    }

    fn has_new_metadata(&mut self) -> bool {
        self.current.is_some() && self.metadata.take_new()
    }

    fn current_artist(&self) -> String {
        self.metadata.artist()
    }

    fn current_title(&self) -> String {
        self.metadata.title()
    }

    fn current_stream_name(&self) -> String {
        self.metadata.stream_name()
    }

    fn current_stream_location(&self) -> String {
        self.metadata.stream_location()
    }
}

impl<E: DecoderEngine> Drop for StreamManager<E> {
    fn drop(&mut self) {
        self.shutdown();
    }
}
