/// mpv as a whole media player.
///
/// One long-lived mpv process plays whatever url it is told to load.  Used
/// with `PlayerStreamer` when `audio.backend = "player"`: mpv handles
/// connecting and buffering itself and only transport commands go over IPC.
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use serde_json::Value;
use stream_audio::{MediaPlayer, MediaStatus, MetadataExtractor};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::mpv::{cleanup_socket, connect_child, lock, metadata_tags, Control, MpvEvent, MpvOptions};

/// IPC endpoint ids.  A replaced player may still be shutting down when its
/// successor starts, so every instance gets its own socket.  The engine and
/// player backends never run in the same daemon.
static NEXT_PLAYER_ID: AtomicU64 = AtomicU64::new(1);

const OBS_PAUSE: u64 = 1;
const OBS_METADATA: u64 = 2;

const PLAYER_PROPERTIES: [(u64, &str); 2] = [(OBS_PAUSE, "pause"), (OBS_METADATA, "metadata")];

/// Player state as last reported by mpv, with local commands applied
/// ahead of their confirmation.
#[derive(Debug, Default)]
pub struct PlayerSnapshot {
    status: MediaStatus,
    /// mpv starts with `--pause`.
    paused: bool,
    loaded: bool,
    exited: bool,
    metadata: MetadataExtractor,
}

impl PlayerSnapshot {
    fn new() -> Self {
        Self {
            paused: true,
            ..Self::default()
        }
    }

    pub fn status(&self) -> MediaStatus {
        self.status
    }

    fn loaded_status(&self) -> MediaStatus {
        if self.paused {
            MediaStatus::Paused
        } else {
            MediaStatus::Playing
        }
    }

    fn begin_load(&mut self) {
        self.status = MediaStatus::Loading;
        self.loaded = false;
        self.metadata = MetadataExtractor::new();
    }

    fn set_paused(&mut self, paused: bool) {
        self.paused = paused;
        if self.loaded {
            self.status = self.loaded_status();
        }
    }

    fn stopped(&mut self) {
        self.loaded = false;
        self.status = MediaStatus::Done;
    }

    pub fn apply(&mut self, event: &MpvEvent) {
        if let Some((id, data)) = event.as_property_change() {
            match id {
                OBS_PAUSE => {
                    if let Some(paused) = data.as_bool() {
                        self.set_paused(paused);
                    }
                }
                OBS_METADATA => {
                    if let Some(map) = data.as_object() {
                        self.metadata.begin_batch();
                        for tag in metadata_tags(map) {
                            self.metadata.ingest(&tag);
                        }
                    }
                }
                _ => {}
            }
            return;
        }

        match event.event_name() {
            Some("start-file") => self.begin_load(),
            Some("file-loaded") => {
                self.loaded = true;
                self.status = self.loaded_status();
            }
            Some("end-file") => {
                let failed = event.raw.get("reason").and_then(Value::as_str) == Some("error");
                self.loaded = false;
                self.status = if failed {
                    MediaStatus::Error
                } else {
                    MediaStatus::Done
                };
            }
            _ => {}
        }
    }
}

pub struct MpvPlayer {
    shared: Arc<Mutex<PlayerSnapshot>>,
    control_tx: mpsc::UnboundedSender<Control>,
}

impl MpvPlayer {
    /// Spawn the player process.  `None` when mpv cannot be started.
    pub fn spawn(runtime: &tokio::runtime::Handle, options: &MpvOptions) -> Option<Self> {
        let id = NEXT_PLAYER_ID.fetch_add(1, Ordering::Relaxed);
        let (child, socket_name) = match options.spawn(runtime, id) {
            Ok(spawned) => spawned,
            Err(e) => {
                warn!("player: {}", e);
                return None;
            }
        };
        info!("player: mpv {} spawned", id);

        let shared = Arc::new(Mutex::new(PlayerSnapshot::new()));
        let (control_tx, control_rx) = mpsc::unbounded_channel();
        runtime.spawn(supervise_player(child, socket_name, shared.clone(), control_rx));
        Some(Self { shared, control_tx })
    }

    fn send(&self, control: Control) {
        if self.control_tx.send(control).is_err() {
            lock(&self.shared).exited = true;
        }
    }
}

impl MediaPlayer for MpvPlayer {
    fn load_uri(&mut self, url: &str) {
        lock(&self.shared).begin_load();
        self.send(Control::Load(url.to_string()));
    }

    fn start(&mut self) {
        lock(&self.shared).set_paused(false);
        self.send(Control::Pause(false));
    }

    fn pause(&mut self) {
        lock(&self.shared).set_paused(true);
        self.send(Control::Pause(true));
    }

    fn stop(&mut self) {
        lock(&self.shared).stopped();
        self.send(Control::Stop);
    }

    fn idle(&mut self) {
        if self.control_tx.is_closed() {
            lock(&self.shared).exited = true;
        }
    }

    fn set_volume(&mut self, volume: f32) {
        self.send(Control::Volume((volume.clamp(0.0, 1.0) * 100.0) as f64));
    }

    fn set_loop(&mut self, looping: bool) {
        self.send(Control::Loop(looping));
    }

    fn status(&self) -> MediaStatus {
        lock(&self.shared).status()
    }

    fn has_exited(&self) -> bool {
        lock(&self.shared).exited
    }

    fn artist(&self) -> String {
        lock(&self.shared).metadata.artist()
    }

    fn title(&self) -> String {
        lock(&self.shared).metadata.title()
    }

    fn stream_name(&self) -> String {
        lock(&self.shared).metadata.stream_name()
    }

    fn stream_location(&self) -> String {
        lock(&self.shared).metadata.stream_location()
    }
}

impl Drop for MpvPlayer {
    fn drop(&mut self) {
        let _ = self.control_tx.send(Control::Quit);
    }
}

async fn supervise_player(
    mut child: tokio::process::Child,
    socket_name: String,
    shared: Arc<Mutex<PlayerSnapshot>>,
    mut control_rx: mpsc::UnboundedReceiver<Control>,
) {
    let (handle, mut event_rx) = match connect_child(&mut child, &socket_name).await {
        Ok(connected) => connected,
        Err(e) => {
            warn!("player: failed to connect: {}", e);
            lock(&shared).exited = true;
            let _ = child.kill().await;
            cleanup_socket(&socket_name);
            return;
        }
    };

    debug!("player: connected to IPC");
    handle.observe(&PLAYER_PROPERTIES).await;

    let mut quitting = false;
    loop {
        tokio::select! {
            event = event_rx.recv() => match event {
                Some(event) => lock(&shared).apply(&event),
                None => break,
            },
            control = control_rx.recv() => match control {
                Some(Control::Quit) | None => {
                    quitting = true;
                    break;
                }
                Some(control) => {
                    if let Err(e) = handle.send(control.command()).await {
                        warn!("player: command {:?} failed: {}", control, e);
                    }
                }
            },
            status = child.wait() => {
                warn!("player: mpv exited: {:?}", status);
                break;
            }
        }
    }

    lock(&shared).exited = true;
    if quitting {
        let _ = handle.send(Control::Quit.command()).await;
    }
    let _ = child.kill().await;
    cleanup_socket(&socket_name);
    debug!("player: supervisor exiting");
}
