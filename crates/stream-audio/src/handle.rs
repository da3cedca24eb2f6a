use tracing::{debug, warn};

use crate::engine::{
    ChannelHandle, DecoderEngine, OpenState, OpenStateInfo, SoundHandle, StreamMode, Tag,
};

/// One network audio stream opened through a decoder engine.
///
/// Owns the engine's sound resource until [`StreamHandle::close`] succeeds.
/// The engine itself is borrowed per call; the handle never stores it.
#[derive(Debug)]
pub struct StreamHandle {
    url: String,
    sound: Option<SoundHandle>,
    channel: Option<ChannelHandle>,
    ready: bool,
}

impl StreamHandle {
    /// Ask the engine to start opening `url` in the background.  An open
    /// failure is logged and leaves the handle not ready; it is not retried
    /// here.
    pub fn open<E: DecoderEngine + ?Sized>(engine: &mut E, url: &str) -> Self {
        let mut handle = Self {
            url: url.to_string(),
            sound: None,
            channel: None,
            ready: false,
        };

        match engine.create_stream(url, StreamMode::INTERNET) {
            Ok(sound) => {
                handle.sound = Some(sound);
                handle.ready = true;
            }
            Err(e) => warn!("stream: couldn't open '{}': {}", url, e),
        }
        handle
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Whether the engine accepted the open request.
    pub fn is_ready(&self) -> bool {
        self.ready
    }

    pub fn channel(&self) -> Option<ChannelHandle> {
        self.channel
    }

    /// Start (paused) playback once the stream is open.  Repeated calls
    /// return the channel created by the first successful one.
    pub fn acquire_playback<E: DecoderEngine + ?Sized>(
        &mut self,
        engine: &mut E,
    ) -> Option<ChannelHandle> {
        if self.sound.is_none() || self.open_state(engine).state != OpenState::Ready {
            warn!("stream: no open stream to start playing for '{}'", self.url);
            return None;
        }

        if let Some(channel) = self.channel {
            return Some(channel);
        }

        let sound = self.sound.as_ref()?;
        match engine.play(sound, true) {
            Ok(channel) => {
                self.channel = Some(channel);
                Some(channel)
            }
            Err(e) => {
                warn!("stream: play failed for '{}': {}", self.url, e);
                None
            }
        }
    }

    /// Try to release the decoder resource.  Returns `false` while the engine
    /// is still connecting: releasing mid-handshake is not allowed, the
    /// caller has to try again later.
    pub fn close<E: DecoderEngine + ?Sized>(&mut self, engine: &mut E) -> bool {
        if self.sound.is_none() {
            return true;
        }

        if self.open_state(engine).state == OpenState::Connecting {
            return false;
        }

        if let Some(sound) = self.sound.take() {
            if let Err(e) = engine.release(sound) {
                warn!("stream: release failed for '{}': {}", self.url, e);
            }
        }
        self.channel = None;
        true
    }

    /// Poll the engine.  Query failures are logged and reported as the
    /// default snapshot (error state, nothing buffered).
    pub fn open_state<E: DecoderEngine + ?Sized>(&self, engine: &mut E) -> OpenStateInfo {
        let Some(sound) = self.sound.as_ref() else {
            return OpenStateInfo::default();
        };
        match engine.open_state(sound) {
            Ok(info) => info,
            Err(e) => {
                warn!("stream: open state query failed for '{}': {}", self.url, e);
                OpenStateInfo::default()
            }
        }
    }

    /// All tags of the stream if any of them changed since the last read,
    /// `None` otherwise.  Tags that fail to read are skipped.
    pub fn dirty_tags<E: DecoderEngine + ?Sized>(&self, engine: &mut E) -> Option<Vec<Tag>> {
        let sound = self.sound.as_ref()?;
        let counts = match engine.tag_counts(sound) {
            Ok(counts) => counts,
            Err(e) => {
                debug!("stream: tag count query failed: {}", e);
                return None;
            }
        };
        if counts.dirty == 0 {
            return None;
        }

        let tags = (0..counts.total)
            .filter_map(|index| match engine.tag(sound, index) {
                Ok(tag) => Some(tag),
                Err(e) => {
                    debug!("stream: skipping tag {}: {}", index, e);
                    None
                }
            })
            .collect();
        Some(tags)
    }
}
