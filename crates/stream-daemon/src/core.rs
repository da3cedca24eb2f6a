/// DaemonCore owns the stream manager and drives it.
///
/// Every external input (client commands, shutdown) arrives as a
/// [`DaemonEvent`] on one channel.  The manager is polled on a fixed tick
/// from the same task, so it is only ever touched from one place.
use std::sync::Arc;
use std::time::Duration;

use stream_audio::{
    PauseRequest, PlayerStreamer, StreamManager, StreamSettings, StreamStatus, StreamingAudio,
};
use stream_proto::config::{AudioBackend, AudioConfig, Config};
use stream_proto::protocol::{Command, MetadataSnapshot, PauseMode, PlaybackStatus};
use stream_proto::state::StateManager;
use tokio::sync::{broadcast, mpsc};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::mpv::{MpvEngine, MpvOptions};
use crate::player::MpvPlayer;
use crate::BroadcastMessage;

#[derive(Debug)]
pub enum DaemonEvent {
    ClientCommand(Command),
    Shutdown,
}

pub fn stream_settings(audio: &AudioConfig, initial_gain: f32) -> StreamSettings {
    StreamSettings {
        assumed_bitrate_kbps: audio.assumed_bitrate_kbps,
        max_retries: audio.max_retries,
        drain_attempts: audio.drain_attempts,
        drain_interval: Duration::from_millis(audio.drain_interval_ms),
        initial_gain,
    }
}

fn playback_status(status: StreamStatus) -> PlaybackStatus {
    match status {
        StreamStatus::Inactive => PlaybackStatus::Inactive,
        StreamStatus::Active => PlaybackStatus::Active,
        StreamStatus::Paused => PlaybackStatus::Paused,
    }
}

fn pause_request(mode: PauseMode) -> PauseRequest {
    match mode {
        PauseMode::Pause => PauseRequest::Pause,
        PauseMode::Resume => PauseRequest::Resume,
        PauseMode::Toggle => PauseRequest::Toggle,
    }
}

fn non_empty(s: String) -> Option<String> {
    (!s.is_empty()).then_some(s)
}

/// Build the configured stream backend on `runtime`.
fn build_audio(
    config: &Config,
    runtime: tokio::runtime::Handle,
    initial_gain: f32,
) -> Box<dyn StreamingAudio + Send> {
    let options = MpvOptions::from_config(&config.mpv);
    let mut audio: Box<dyn StreamingAudio + Send> = match config.audio.backend {
        AudioBackend::Engine => {
            let engine = MpvEngine::new(runtime, options);
            Box::new(StreamManager::new(
                engine,
                stream_settings(&config.audio, initial_gain),
            ))
        }
        AudioBackend::Player => Box::new(PlayerStreamer::new(
            move || MpvPlayer::spawn(&runtime, &options),
            initial_gain,
        )),
    };
    audio.set_buffer_sizes(config.audio.stream_buffer_ms, config.audio.decode_buffer_ms);
    audio
}

pub struct DaemonCore {
    audio: Box<dyn StreamingAudio + Send>,
    state_manager: Arc<StateManager>,
    broadcast_tx: broadcast::Sender<BroadcastMessage>,
    tick_interval: Duration,
}

impl DaemonCore {
    /// Build the configured mpv backend and restore the persisted gain.  The persisted url is only reopened when
    /// `resume_on_start` is set.
    pub async fn new(
        config: Config,
        broadcast_tx: broadcast::Sender<BroadcastMessage>,
    ) -> anyhow::Result<Self> {
        let state_manager = Arc::new(StateManager::new(
            config.daemon.state_file.clone(),
            config.audio.default_gain,
        ));
        let persisted = state_manager.get_state().await;

        info!("Using {:?} backend", config.audio.backend);
        let audio = build_audio(&config, tokio::runtime::Handle::current(), persisted.gain);
        let mut core = Self::with_audio(audio, state_manager, broadcast_tx, &config);

        if let Some(url) = persisted.url.filter(|_| config.daemon.resume_on_start) {
            info!("Resuming last stream {}", url);
            core.audio.start(&url);
            core.sync_status().await;
        }

        Ok(core)
    }

    pub fn with_audio(
        audio: Box<dyn StreamingAudio + Send>,
        state_manager: Arc<StateManager>,
        broadcast_tx: broadcast::Sender<BroadcastMessage>,
        config: &Config,
    ) -> Self {
        Self {
            audio,
            state_manager,
            broadcast_tx,
            tick_interval: Duration::from_millis(config.audio.tick_interval_ms.max(1)),
        }
    }

    pub fn state_manager(&self) -> Arc<StateManager> {
        Arc::clone(&self.state_manager)
    }

    pub async fn run(mut self, mut event_rx: mpsc::Receiver<DaemonEvent>) -> anyhow::Result<()> {
        let mut ticker = tokio::time::interval(self.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => self.tick().await,
                event = event_rx.recv() => match event {
                    Some(DaemonEvent::ClientCommand(cmd)) => self.handle_command(cmd).await,
                    Some(DaemonEvent::Shutdown) | None => break,
                },
            }
        }

        self.shutdown();
        Ok(())
    }

    async fn tick(&mut self) {
        self.audio.update();
        self.sync_status().await;

        if self.audio.has_new_metadata() {
            let snapshot = MetadataSnapshot {
                artist: non_empty(self.audio.current_artist()),
                title: non_empty(self.audio.current_title()),
                stream_name: non_empty(self.audio.current_stream_name()),
                stream_location: non_empty(self.audio.current_stream_location()),
            };
            info!(
                "Now playing: {} - {}",
                snapshot.artist.as_deref().unwrap_or("?"),
                snapshot.title.as_deref().unwrap_or("?")
            );
            self.state_manager.set_metadata(snapshot.clone()).await;
            let _ = self
                .broadcast_tx
                .send(BroadcastMessage::MetadataUpdated(snapshot));
            let _ = self.broadcast_tx.send(BroadcastMessage::StateUpdated);
        }
    }

    async fn handle_command(&mut self, cmd: Command) {
        match cmd {
            Command::Start { url } => {
                self.audio.start(&url);
                self.persist_url(&url).await;
            }
            Command::Stop => {
                // stop() alone keeps a resumable url in the engine backend
                self.audio.stop();
                self.audio.start("");
                self.persist_url("").await;
            }
            Command::Pause { mode } => self.audio.pause(pause_request(mode)),
            Command::Gain { value } => {
                let value = value.clamp(0.0, 1.0);
                self.audio.set_gain(value);
                if let Err(e) = self.state_manager.set_gain(value).await {
                    self.report_save_error(e);
                }
            }
            Command::GetState => debug!("State requested"),
        }

        self.sync_status().await;
        let _ = self.broadcast_tx.send(BroadcastMessage::StateUpdated);
    }

    async fn persist_url(&self, url: &str) {
        if let Err(e) = self.state_manager.set_url(url).await {
            self.report_save_error(e);
        }
    }

    fn report_save_error(&self, e: anyhow::Error) {
        warn!("Failed to save state: {}", e);
        let _ = self
            .broadcast_tx
            .send(BroadcastMessage::Error(format!("failed to save state: {}", e)));
    }

    /// Mirror the manager's status into shared state, broadcasting changes.
    async fn sync_status(&self) {
        let status = playback_status(self.audio.is_playing());
        if self.state_manager.set_status(status).await {
            debug!("Playback status now {:?}", status);
            let _ = self.broadcast_tx.send(BroadcastMessage::StateUpdated);
        }
    }

    /// Dropping the manager waits briefly for parked streams to close, which
    /// sleeps on this thread.
    fn shutdown(self) {
        info!("Stopping stream manager");
        let audio = self.audio;
        tokio::task::block_in_place(move || drop(audio));
    }
}
