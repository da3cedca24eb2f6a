/// Stream backend on top of a whole media player instead of a decoder engine.
///
/// The player owns connecting, buffering and decoding; this side only loads
/// urls, forwards transport commands and reads back status and metadata.
/// There is no retry loop, no dead-stream queue and no buffering policy.
use tracing::{debug, info, warn};

use crate::manager::{PauseRequest, StreamStatus, StreamingAudio};

/// What a media player reports about the loaded media.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MediaStatus {
    #[default]
    None,
    Loading,
    /// Loaded but not started.
    Loaded,
    Playing,
    Paused,
    Done,
    Error,
}

/// A media player able to stream a url on its own.
pub trait MediaPlayer {
    fn load_uri(&mut self, url: &str);
    fn start(&mut self);
    fn pause(&mut self);
    fn stop(&mut self);
    /// Give the player a chance to process pending work.  Called every tick.
    fn idle(&mut self);
    /// Linear volume in `[0, 1]`.
    fn set_volume(&mut self, volume: f32);
    fn set_loop(&mut self, looping: bool);
    fn status(&self) -> MediaStatus;
    /// True once the player process is gone and the instance is useless.
    fn has_exited(&self) -> bool;
    fn artist(&self) -> String;
    fn title(&self) -> String;
    fn stream_name(&self) -> String;
    fn stream_location(&self) -> String;
}

/// Creates players on demand.  `None` means no player is available.
pub trait PlayerFactory {
    type Player: MediaPlayer;

    fn create(&mut self) -> Option<Self::Player>;
}

impl<P, F> PlayerFactory for F
where
    P: MediaPlayer,
    F: FnMut() -> Option<P>,
{
    type Player = P;

    fn create(&mut self) -> Option<P> {
        self()
    }
}

/// [`StreamingAudio`] over a lazily created [`MediaPlayer`].
///
/// Unlike `StreamManager`, `stop()` forgets the url, so status comes only
/// from the player.  The player is replaced whenever a different url starts
/// or when it has exited.
pub struct PlayerStreamer<F: PlayerFactory> {
    factory: F,
    player: Option<F::Player>,
    url: String,
    gain: f32,
    /// Artist and title as of the last `has_new_metadata` check.
    seen_artist: String,
    seen_title: String,
}

impl<F: PlayerFactory> PlayerStreamer<F> {
    pub fn new(factory: F, initial_gain: f32) -> Self {
        Self {
            factory,
            player: None,
            url: String::new(),
            gain: initial_gain,
            seen_artist: String::new(),
            seen_title: String::new(),
        }
    }

    pub fn has_player(&self) -> bool {
        self.player.is_some()
    }

    pub fn player(&self) -> Option<&F::Player> {
        self.player.as_ref()
    }

    /// Create a player, configured for one-shot streams at the current gain.
    fn create_player(&mut self) {
        self.player = self.factory.create();
        match self.player.as_mut() {
            Some(player) => {
                player.set_loop(false);
                player.set_volume(self.gain.clamp(0.0, 1.0));
                debug!("player: created media player");
            }
            None => warn!("player: no media player available"),
        }
    }

    fn with_player(&self, read: impl FnOnce(&F::Player) -> String) -> String {
        self.player.as_ref().map(read).unwrap_or_default()
    }
}

impl<F: PlayerFactory> StreamingAudio for PlayerStreamer<F> {
    fn start(&mut self, url: &str) {
        if url.is_empty() {
            return;
        }

        if self.url != url {
            self.stop();
            if self.player.take().is_some() {
                self.create_player();
            }
        }

        self.url = url.to_string();

        match self.player.as_ref().map(MediaPlayer::has_exited) {
            None => self.create_player(),
            Some(true) => {
                info!("player: media player exited, recreating");
                self.player = None;
                self.create_player();
            }
            Some(false) => {}
        }

        let Some(player) = self.player.as_mut() else {
            return;
        };
        info!("player: starting internet stream '{}'", url);
        player.load_uri(url);
        player.start();
    }

    fn stop(&mut self) {
        info!("player: stopping internet stream");
        if let Some(player) = self.player.as_mut() {
            player.stop();
        }
        self.url.clear();
    }

    fn pause(&mut self, request: PauseRequest) {
        let Some(player) = self.player.as_mut() else {
            return;
        };
        let pause = match request {
            PauseRequest::Pause => true,
            PauseRequest::Resume => false,
            PauseRequest::Toggle => matches!(
                player.status(),
                MediaStatus::Loading | MediaStatus::Playing
            ),
        };

        if pause {
            info!("player: pausing internet stream");
            player.pause();
        } else {
            info!("player: unpausing internet stream");
            player.start();
        }
    }

    fn update(&mut self) {
        if let Some(player) = self.player.as_mut() {
            player.idle();
        }
    }

    fn is_playing(&self) -> StreamStatus {
        match self.player.as_ref().map(MediaPlayer::status) {
            Some(MediaStatus::Loading | MediaStatus::Playing) => StreamStatus::Active,
            Some(MediaStatus::Paused) => StreamStatus::Paused,
            _ => StreamStatus::Inactive,
        }
    }

    /// Stored raw, applied linearly after clamping.
    fn set_gain(&mut self, gain: f32) {
        self.gain = gain;
        if let Some(player) = self.player.as_mut() {
            player.set_volume(gain.clamp(0.0, 1.0));
        }
    }

    fn gain(&self) -> f32 {
        self.gain
    }

    fn url(&self) -> &str {
        &self.url
    }

    fn set_buffer_sizes(&mut self, stream_buffer_ms: u32, decode_buffer_ms: u32) {
        debug!(
            "player: buffering is up to the player, ignoring {}ms/{}ms",
            stream_buffer_ms, decode_buffer_ms
        );
    }

    fn has_new_metadata(&mut self) -> bool {
        let Some(player) = self.player.as_ref() else {
            return false;
        };
        let (artist, title) = (player.artist(), player.title());
        if artist == self.seen_artist && title == self.seen_title {
            return false;
        }
        self.seen_artist = artist;
        self.seen_title = title;
        true
    }

    fn current_artist(&self) -> String {
        self.with_player(MediaPlayer::artist)
    }

    fn current_title(&self) -> String {
        self.with_player(MediaPlayer::title)
    }

    fn current_stream_name(&self) -> String {
        self.with_player(MediaPlayer::stream_name)
    }

    fn current_stream_location(&self) -> String {
        self.with_player(MediaPlayer::stream_location)
    }
}
