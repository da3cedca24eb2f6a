/// mpv-backed decoder engine.
///
/// Every sound is its own mpv process, started idle and paused.  The stream
/// url is only sent with `loadfile` once the IPC connection is up and every
/// property observer is registered, so `file-loaded` can never fire before
/// anyone listens.  A supervisor task per sound owns the process and its IPC
/// connection and folds incoming events into a shared snapshot that the
/// synchronous [`DecoderEngine`] methods read without blocking.
///
/// ```text
///   MpvEngine::create_stream()
///         │  spawn mpv --idle --pause --input-ipc-server=<per-sound socket>
///         └── supervise()
///                ├── startup       → observe_property ×4, then loadfile <url>
///                ├── writer_task   ← MpvRequest via mpsc, serialised → socket
///                ├── reader_task   ← JSON lines from socket
///                │                     ├── response (request_id) → oneshot
///                │                     └── event                 → SoundSnapshot
///                └── control_rx    ← pause / volume / samplerate / quit
/// ```
///
/// Platform notes:
/// - Unix:   Unix domain sockets
/// - Windows: Named pipes  \\.\pipe\<name>
use serde_json::{json, Value};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use stream_audio::engine::{
    ChannelHandle, DecoderEngine, EngineError, EngineResult, OpenState, OpenStateInfo,
    SoundHandle, StreamMode, Tag, TagCounts, TagData, TagFormat,
};
use stream_audio::metadata::{split_stream_title, KEY_ARTIST, KEY_TITLE, SAMPLE_RATE_CHANGE_TAG};
use stream_proto::config::MpvConfig;
use stream_proto::platform;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

#[cfg(unix)]
use tokio::net::UnixStream;

#[cfg(windows)]
use tokio::net::windows::named_pipe::ClientOptions;

// ── global request-id counter ─────────────────────────────────────────────────

static NEXT_REQ_ID: AtomicU64 = AtomicU64::new(1);

// ── observation property IDs ──────────────────────────────────────────────────

pub const OBS_PAUSED_FOR_CACHE: u64 = 1;
pub const OBS_CACHE_STATE: u64 = 2;
pub const OBS_METADATA: u64 = 3;
pub const OBS_SAMPLE_RATE: u64 = 4;

// ── internal channel types ────────────────────────────────────────────────────

type PendingMap = Arc<tokio::sync::Mutex<HashMap<u64, oneshot::Sender<anyhow::Result<Value>>>>>;

struct PendingRequest {
    req_id: u64,
    payload: String, // serialised JSON line (already has '\n')
    reply: oneshot::Sender<anyhow::Result<Value>>,
}

/// An mpv event / property-change that arrived unsolicited (no request_id).
#[derive(Debug, Clone)]
pub struct MpvEvent {
    pub raw: Value,
}

impl MpvEvent {
    /// Returns `Some((obs_id, data))` if this is a property-change event.
    pub fn as_property_change(&self) -> Option<(u64, &Value)> {
        if self.raw.get("event")?.as_str()? == "property-change" {
            let id = self.raw.get("id")?.as_u64()?;
            let data = self.raw.get("data").unwrap_or(&Value::Null);
            Some((id, data))
        } else {
            None
        }
    }

    /// Returns the event name, e.g. "end-file", "start-file", "file-loaded".
    pub fn event_name(&self) -> Option<&str> {
        self.raw.get("event")?.as_str()
    }
}

// ── IPC handle ────────────────────────────────────────────────────────────────

/// Cloneable handle to the mpv writer task.  Use `send()` to fire a command
/// and await the response.
#[derive(Clone)]
pub struct MpvHandle {
    tx: mpsc::Sender<PendingRequest>,
}

impl MpvHandle {
    pub async fn send(&self, command: Value) -> anyhow::Result<Value> {
        let req_id = NEXT_REQ_ID.fetch_add(1, Ordering::Relaxed);
        let msg = json!({ "command": command, "request_id": req_id });
        let mut raw = serde_json::to_string(&msg)?;
        raw.push('\n');

        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(PendingRequest {
                req_id,
                payload: raw,
                reply: reply_tx,
            })
            .await
            .map_err(|_| anyhow::anyhow!("mpv writer task gone"))?;

        tokio::time::timeout(tokio::time::Duration::from_secs(5), reply_rx)
            .await
            .map_err(|_| anyhow::anyhow!("mpv IPC timeout for req={}", req_id))?
            .map_err(|_| anyhow::anyhow!("mpv reply channel dropped req={}", req_id))?
    }

    /// Register observe_property for each `(id, name)` pair.  Failures are
    /// logged and skipped.
    pub async fn observe(&self, props: &[(u64, &str)]) {
        for (id, name) in props {
            match self.send(json!(["observe_property", id, name])).await {
                Ok(_) => debug!("mpv: observe_property id={} name={}", id, name),
                Err(e) => warn!("mpv: observe_property {} failed: {}", name, e),
            }
        }
    }
}

/// Properties every sound process reports back.
const SOUND_PROPERTIES: [(u64, &str); 4] = [
    (OBS_PAUSED_FOR_CACHE, "paused-for-cache"),
    (OBS_CACHE_STATE, "cache-buffering-state"),
    (OBS_METADATA, "metadata"),
    (OBS_SAMPLE_RATE, "audio-params/samplerate"),
];

// ── connect ───────────────────────────────────────────────────────────────────

#[cfg(unix)]
async fn connect_ipc(socket_name: &str, event_tx: mpsc::Sender<MpvEvent>) -> anyhow::Result<MpvHandle> {
    let socket_path = PathBuf::from(socket_name);

    // Wait for socket to appear
    for _ in 0..50 {
        tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
        if socket_path.exists() {
            break;
        }
    }
    if !socket_path.exists() {
        anyhow::bail!("mpv IPC socket did not appear");
    }

    let stream = UnixStream::connect(&socket_path).await?;
    let (read_half, write_half) = stream.into_split();
    Ok(start_io_tasks(BufReader::new(read_half), write_half, event_tx))
}

#[cfg(windows)]
async fn connect_ipc(socket_name: &str, event_tx: mpsc::Sender<MpvEvent>) -> anyhow::Result<MpvHandle> {
    let pipe_path = format!(r"\\.\pipe\{}", socket_name);
    for _ in 0..50 {
        tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
        if let Ok(client) = ClientOptions::new().open(&pipe_path) {
            let (read_half, write_half) = tokio::io::split(client);
            return Ok(start_io_tasks(BufReader::new(read_half), write_half, event_tx));
        }
    }
    anyhow::bail!("mpv named pipe did not appear")
}

/// Wait for the IPC endpoint of a freshly spawned mpv, giving up early if the
/// process dies first.
pub(crate) async fn connect_child(
    child: &mut tokio::process::Child,
    socket_name: &str,
) -> anyhow::Result<(MpvHandle, mpsc::Receiver<MpvEvent>)> {
    let (event_tx, event_rx) = mpsc::channel::<MpvEvent>(64);
    tokio::select! {
        res = connect_ipc(socket_name, event_tx) => res.map(|handle| (handle, event_rx)),
        status = child.wait() => Err(anyhow::anyhow!("mpv exited before IPC was up: {:?}", status)),
    }
}

fn start_io_tasks<R, W>(
    reader: BufReader<R>,
    writer: W,
    event_tx: mpsc::Sender<MpvEvent>,
) -> MpvHandle
where
    R: tokio::io::AsyncRead + Unpin + Send + 'static,
    W: tokio::io::AsyncWrite + Unpin + Send + 'static,
{
    // pending map: req_id → reply channel.  Shared between writer (inserts) and reader (resolves).
    let pending: PendingMap = Arc::new(tokio::sync::Mutex::new(HashMap::new()));
    let (cmd_tx, cmd_rx) = mpsc::channel::<PendingRequest>(64);

    tokio::spawn(writer_task(writer, cmd_rx, pending.clone()));
    tokio::spawn(reader_task(reader, pending, event_tx));

    MpvHandle { tx: cmd_tx }
}

// ── reader task ───────────────────────────────────────────────────────────────

async fn reader_task<R>(mut reader: BufReader<R>, pending: PendingMap, event_tx: mpsc::Sender<MpvEvent>)
where
    R: tokio::io::AsyncRead + Unpin,
{
    let mut line = String::new();
    loop {
        line.clear();
        match reader.read_line(&mut line).await {
            Ok(0) => {
                debug!("mpv reader: connection closed");
                let mut map = pending.lock().await;
                for (_, tx) in map.drain() {
                    let _ = tx.send(Err(anyhow::anyhow!("mpv IPC connection closed")));
                }
                break;
            }
            Ok(_) => {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                let val: Value = match serde_json::from_str(trimmed) {
                    Ok(v) => v,
                    Err(e) => {
                        debug!("mpv reader: invalid json '{}': {}", trimmed, e);
                        continue;
                    }
                };

                if let Some(req_id) = val.get("request_id").and_then(|v| v.as_u64()) {
                    let mut map = pending.lock().await;
                    if let Some(tx) = map.remove(&req_id) {
                        let result = if val["error"].as_str() == Some("success") {
                            Ok(val)
                        } else {
                            let err = val["error"]
                                .as_str()
                                .unwrap_or("unknown error")
                                .to_string();
                            debug!("mpv reader: response req={} err={}", req_id, err);
                            Err(anyhow::anyhow!("mpv error: {}", err))
                        };
                        let _ = tx.send(result);
                    } else {
                        debug!("mpv reader: response for unknown req={}", req_id);
                    }
                } else {
                    debug!("mpv reader: event {}", trimmed);
                    if event_tx.send(MpvEvent { raw: val }).await.is_err() {
                        break;
                    }
                }
            }
            Err(e) => {
                warn!("mpv reader: read error: {}", e);
                let mut map = pending.lock().await;
                for (_, tx) in map.drain() {
                    let _ = tx.send(Err(anyhow::anyhow!("mpv IPC read error: {}", e)));
                }
                break;
            }
        }
    }
}

// ── writer task ───────────────────────────────────────────────────────────────

async fn writer_task<W>(mut writer: W, mut rx: mpsc::Receiver<PendingRequest>, pending: PendingMap)
where
    W: tokio::io::AsyncWrite + Unpin,
{
    while let Some(req) = rx.recv().await {
        // Register reply channel before writing so reader can match it
        {
            let mut map = pending.lock().await;
            map.insert(req.req_id, req.reply);
        }
        debug!("mpv writer: send req={} payload={}", req.req_id, req.payload.trim());
        if let Err(e) = writer.write_all(req.payload.as_bytes()).await {
            warn!("mpv writer: write error: {}", e);
            let mut map = pending.lock().await;
            if let Some(tx) = map.remove(&req.req_id) {
                let _ = tx.send(Err(anyhow::anyhow!("mpv write error: {}", e)));
            }
            break;
        }
    }
    debug!("mpv writer: task exiting");
}

// ── per-sound snapshot ────────────────────────────────────────────────────────

#[derive(Debug)]
struct TagSlot {
    tag: Tag,
    dirty: bool,
}

/// Everything the engine knows about one sound, as last reported by mpv.
#[derive(Debug, Default)]
pub struct SoundSnapshot {
    connected: bool,
    loaded: bool,
    /// Why the sound can no longer play.  Set once, never cleared.
    failure: Option<String>,
    paused_for_cache: bool,
    cache_percent: Option<u32>,
    sample_rate: Option<f64>,
    tags: Vec<TagSlot>,
}

impl SoundSnapshot {
    fn fail(&mut self, reason: impl Into<String>) {
        if self.failure.is_none() {
            self.failure = Some(reason.into());
        }
    }

    pub fn open_state(&self) -> OpenStateInfo {
        if self.failure.is_some() {
            return OpenStateInfo::new(OpenState::Error);
        }
        if !self.connected || !self.loaded {
            return OpenStateInfo::new(OpenState::Connecting);
        }
        // No cache telemetry means mpv is reading straight from the demuxer.
        let percent = self.cache_percent.unwrap_or(100);
        OpenStateInfo::new(OpenState::Ready).with_buffer(percent, self.paused_for_cache)
    }

    pub fn tag_counts(&self) -> TagCounts {
        TagCounts {
            total: self.tags.len(),
            dirty: self.tags.iter().filter(|slot| slot.dirty).count(),
        }
    }

    pub fn read_tag(&mut self, index: usize) -> Option<Tag> {
        let slot = self.tags.get_mut(index)?;
        slot.dirty = false;
        Some(slot.tag.clone())
    }

    pub fn apply(&mut self, event: &MpvEvent) {
        if let Some((id, data)) = event.as_property_change() {
            match id {
                OBS_PAUSED_FOR_CACHE => self.paused_for_cache = data.as_bool().unwrap_or(false),
                OBS_CACHE_STATE => {
                    self.cache_percent = data.as_u64().map(|p| p.min(100) as u32);
                }
                OBS_METADATA => {
                    if let Some(map) = data.as_object() {
                        self.replace_metadata(metadata_tags(map));
                    }
                }
                OBS_SAMPLE_RATE => {
                    if let Some(hz) = data.as_f64() {
                        self.sample_rate_changed(hz);
                    }
                }
                _ => {}
            }
            return;
        }

        match event.event_name() {
            Some("file-loaded") => self.loaded = true,
            Some("end-file") => {
                let reason = event
                    .raw
                    .get("reason")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown");
                match event.raw.get("file_error").and_then(Value::as_str) {
                    Some(detail) => self.fail(format!("{}: {}", reason, detail)),
                    None => self.fail(reason),
                }
            }
            _ => {}
        }
    }

    fn replace_metadata(&mut self, tags: Vec<Tag>) {
        self.tags.retain(|slot| slot.tag.format == TagFormat::Engine);
        self.tags
            .extend(tags.into_iter().map(|tag| TagSlot { tag, dirty: true }));
    }

    fn sample_rate_changed(&mut self, hz: f64) {
        let previous = self.sample_rate.replace(hz);
        if previous.is_none() || previous == Some(hz) {
            return;
        }
        self.tags.retain(|slot| slot.tag.format != TagFormat::Engine);
        self.tags.push(TagSlot {
            tag: Tag::new(TagFormat::Engine, SAMPLE_RATE_CHANGE_TAG, TagData::Float(hz)),
            dirty: true,
        });
    }
}

/// Turn mpv's `metadata` map into tags.  `icy-title` is split into artist
/// and title the way Shoutcast servers format it.
pub fn metadata_tags(map: &serde_json::Map<String, Value>) -> Vec<Tag> {
    let mut tags = Vec::new();
    for (key, value) in map {
        let Some(text) = value.as_str() else {
            continue;
        };
        let name = key.to_ascii_lowercase();
        if name == "icy-title" {
            let (artist, title) = split_stream_title(text);
            if let Some(artist) = artist {
                tags.push(Tag::text(TagFormat::Shoutcast, KEY_ARTIST, &artist));
            }
            if let Some(title) = title {
                tags.push(Tag::text(TagFormat::Shoutcast, KEY_TITLE, &title));
            }
        } else if name.starts_with("icy-") {
            tags.push(Tag::text(TagFormat::Shoutcast, name, text));
        } else {
            tags.push(Tag::text(TagFormat::VorbisComment, key.to_ascii_uppercase(), text));
        }
    }
    tags
}

pub(crate) fn lock<T>(shared: &Mutex<T>) -> MutexGuard<'_, T> {
    shared.lock().unwrap_or_else(|e| e.into_inner())
}

// ── control messages ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum Control {
    /// Replace whatever is loaded with this url.
    Load(String),
    Pause(bool),
    /// mpv volume, 0..=100.
    Volume(f64),
    SampleRate(i64),
    Loop(bool),
    /// Unload the current file, keeping the process.
    Stop,
    Quit,
}

impl Control {
    pub fn command(&self) -> Value {
        match self {
            Control::Load(url) => json!(["loadfile", url, "replace"]),
            Control::Pause(paused) => json!(["set_property", "pause", paused]),
            Control::Volume(volume) => json!(["set_property", "volume", volume]),
            Control::SampleRate(hz) => json!(["set_property", "audio-samplerate", hz]),
            Control::Loop(looping) => {
                json!(["set_property", "loop-file", if *looping { "inf" } else { "no" }])
            }
            Control::Stop => json!(["stop"]),
            Control::Quit => json!(["quit"]),
        }
    }
}

/// Commands a sound process gets right after connecting, in order.  The
/// load comes last so every observer is already in place.
pub fn startup_commands(url: &str) -> Vec<Value> {
    SOUND_PROPERTIES
        .iter()
        .map(|(id, name)| json!(["observe_property", id, name]))
        .chain(std::iter::once(Control::Load(url.to_string()).command()))
        .collect()
}

// ── spawn options ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct MpvOptions {
    pub binary: Option<PathBuf>,
    pub extra_args: Vec<String>,
    pub demuxer_max_bytes: Option<u32>,
    pub audio_buffer_ms: Option<u32>,
}

impl MpvOptions {
    pub fn from_config(config: &MpvConfig) -> Self {
        Self {
            binary: config.binary.clone(),
            extra_args: config.extra_args.clone(),
            ..Self::default()
        }
    }

    /// Command line for an idle, paused mpv.  The url is never on it.
    pub fn args(&self, socket_arg: &str) -> Vec<String> {
        let mut args = vec![
            "--no-video".to_string(),
            "--idle=yes".to_string(),
            "--pause".to_string(),
            "--quiet".to_string(),
            "--cache=yes".to_string(),
            socket_arg.to_string(),
        ];
        if let Some(bytes) = self.demuxer_max_bytes {
            args.push(format!("--demuxer-max-bytes={}", bytes));
        }
        if let Some(ms) = self.audio_buffer_ms {
            args.push(format!("--audio-buffer={}", ms as f64 / 1000.0));
        }
        args.extend(self.extra_args.iter().cloned());
        args
    }

    pub(crate) fn resolve_binary(&self) -> Option<PathBuf> {
        self.binary.clone().or_else(platform::find_mpv_binary)
    }

    /// Spawn mpv for IPC endpoint `id` on `runtime`.  The child dies with
    /// its handle.
    pub(crate) fn spawn(
        &self,
        runtime: &tokio::runtime::Handle,
        id: u64,
    ) -> EngineResult<(tokio::process::Child, String)> {
        let binary = self
            .resolve_binary()
            .ok_or_else(|| EngineError::Unavailable("mpv binary not found".to_string()))?;

        let socket_name = platform::mpv_socket_name(id);
        #[cfg(unix)]
        let _ = std::fs::remove_file(&socket_name);

        let _guard = runtime.enter();
        let child = tokio::process::Command::new(&binary)
            .args(self.args(&platform::mpv_socket_arg(id)))
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| EngineError::Engine(format!("mpv spawn failed: {}", e)))?;
        Ok((child, socket_name))
    }
}

// ── engine ────────────────────────────────────────────────────────────────────

struct SoundSlot {
    shared: Arc<Mutex<SoundSnapshot>>,
    control_tx: mpsc::UnboundedSender<Control>,
    playing: bool,
    paused: bool,
}

impl SoundSlot {
    fn send(&self, control: Control) -> EngineResult<()> {
        self.control_tx
            .send(control)
            .map_err(|_| EngineError::Engine("mpv supervisor gone".to_string()))
    }
}

pub struct MpvEngine {
    runtime: tokio::runtime::Handle,
    options: MpvOptions,
    next_id: u64,
    sounds: HashMap<u64, SoundSlot>,
}

impl MpvEngine {
    pub fn new(runtime: tokio::runtime::Handle, options: MpvOptions) -> Self {
        Self {
            runtime,
            options,
            next_id: 1,
            sounds: HashMap::new(),
        }
    }

    fn slot(&self, id: u64) -> EngineResult<&SoundSlot> {
        self.sounds.get(&id).ok_or(EngineError::InvalidHandle)
    }

    fn channel_slot(&mut self, channel: ChannelHandle) -> EngineResult<&mut SoundSlot> {
        match self.sounds.get_mut(&channel.raw()) {
            Some(slot) if slot.playing => Ok(slot),
            _ => Err(EngineError::InvalidHandle),
        }
    }
}

impl DecoderEngine for MpvEngine {
    fn create_stream(&mut self, url: &str, _mode: StreamMode) -> EngineResult<SoundHandle> {
        let id = self.next_id;
        let (child, socket_name) = self.options.spawn(&self.runtime, id)?;
        self.next_id += 1;
        info!("mpv: sound {} spawned for '{}'", id, url);

        let shared = Arc::new(Mutex::new(SoundSnapshot::default()));
        let (control_tx, control_rx) = mpsc::unbounded_channel();
        self.runtime.spawn(supervise(
            id,
            child,
            socket_name,
            url.to_string(),
            shared.clone(),
            control_rx,
        ));

        self.sounds.insert(
            id,
            SoundSlot {
                shared,
                control_tx,
                playing: false,
                paused: true,
            },
        );
        Ok(SoundHandle::from_raw(id))
    }

    fn open_state(&mut self, sound: &SoundHandle) -> EngineResult<OpenStateInfo> {
        let slot = self.slot(sound.raw())?;
        let info = lock(&slot.shared).open_state();
        Ok(info)
    }

    fn play(&mut self, sound: &SoundHandle, paused: bool) -> EngineResult<ChannelHandle> {
        let slot = self
            .sounds
            .get_mut(&sound.raw())
            .ok_or(EngineError::InvalidHandle)?;
        if lock(&slot.shared).open_state().state != OpenState::Ready {
            return Err(EngineError::NotReady);
        }
        slot.playing = true;
        slot.paused = paused;
        slot.send(Control::Pause(paused))?;
        Ok(ChannelHandle::from_raw(sound.raw()))
    }

    fn release(&mut self, sound: SoundHandle) -> EngineResult<()> {
        let slot = self
            .sounds
            .remove(&sound.raw())
            .ok_or(EngineError::InvalidHandle)?;
        debug!("mpv: releasing sound {}", sound.raw());
        // The supervisor may already be gone when mpv died on its own.
        let _ = slot.control_tx.send(Control::Quit);
        Ok(())
    }

    fn tag_counts(&mut self, sound: &SoundHandle) -> EngineResult<TagCounts> {
        let slot = self.slot(sound.raw())?;
        let counts = lock(&slot.shared).tag_counts();
        Ok(counts)
    }

    fn tag(&mut self, sound: &SoundHandle, index: usize) -> EngineResult<Tag> {
        let slot = self.slot(sound.raw())?;
        let tag = lock(&slot.shared).read_tag(index);
        tag.ok_or_else(|| EngineError::Engine(format!("no tag at index {}", index)))
    }

    fn set_volume(&mut self, channel: ChannelHandle, volume: f32) -> EngineResult<()> {
        let slot = self.channel_slot(channel)?;
        slot.send(Control::Volume((volume.clamp(0.0, 1.0) * 100.0) as f64))
    }

    fn set_frequency(&mut self, channel: ChannelHandle, frequency: f32) -> EngineResult<()> {
        let slot = self.channel_slot(channel)?;
        slot.send(Control::SampleRate(frequency.round() as i64))
    }

    fn set_paused(&mut self, channel: ChannelHandle, paused: bool) -> EngineResult<()> {
        let slot = self.channel_slot(channel)?;
        slot.paused = paused;
        slot.send(Control::Pause(paused))
    }

    fn paused(&mut self, channel: ChannelHandle) -> EngineResult<bool> {
        Ok(self.channel_slot(channel)?.paused)
    }

    fn set_priority(&mut self, channel: ChannelHandle, _priority: i32) -> EngineResult<()> {
        // One process per sound: there is no channel pool to prioritise.
        self.channel_slot(channel).map(|_| ())
    }

    fn set_stream_buffer_size(&mut self, bytes: u32) -> EngineResult<()> {
        debug!("mpv: demuxer buffer set to {} bytes", bytes);
        self.options.demuxer_max_bytes = Some(bytes);
        Ok(())
    }

    fn set_decode_buffer_size(&mut self, millis: u32) -> EngineResult<()> {
        debug!("mpv: audio buffer set to {}ms", millis);
        self.options.audio_buffer_ms = Some(millis);
        Ok(())
    }
}

// ── supervisor ────────────────────────────────────────────────────────────────

async fn supervise(
    id: u64,
    mut child: tokio::process::Child,
    socket_name: String,
    url: String,
    shared: Arc<Mutex<SoundSnapshot>>,
    mut control_rx: mpsc::UnboundedReceiver<Control>,
) {
    let (handle, mut event_rx) = match connect_child(&mut child, &socket_name).await {
        Ok(connected) => connected,
        Err(e) => {
            warn!("mpv: sound {} failed to connect: {}", id, e);
            lock(&shared).fail(e.to_string());
            let _ = child.kill().await;
            cleanup_socket(&socket_name);
            return;
        }
    };

    debug!("mpv: sound {} connected to IPC", id);
    lock(&shared).connected = true;
    for command in startup_commands(&url) {
        let loading = command[0] == "loadfile";
        match handle.send(command).await {
            Ok(_) if loading => debug!("mpv: sound {} loading '{}'", id, url),
            Ok(_) => {}
            Err(e) if loading => {
                warn!("mpv: sound {} loadfile failed: {}", id, e);
                lock(&shared).fail(format!("loadfile failed: {}", e));
            }
            Err(e) => warn!("mpv: sound {} startup command failed: {}", id, e),
        }
    }

    let mut quitting = false;
    loop {
        tokio::select! {
            event = event_rx.recv() => match event {
                Some(event) => {
                    lock(&shared).apply(&event);
                }
                None => {
                    lock(&shared).fail("mpv IPC connection closed");
                    break;
                }
            },
            control = control_rx.recv() => match control {
                Some(Control::Quit) | None => {
                    quitting = true;
                    break;
                }
                Some(control) => {
                    if let Err(e) = handle.send(control.command()).await {
                        warn!("mpv: sound {} command {:?} failed: {}", id, control, e);
                    }
                }
            },
            status = child.wait() => {
                lock(&shared).fail(format!("mpv exited: {:?}", status));
                break;
            }
        }
    }

    if quitting {
        let _ = handle.send(Control::Quit.command()).await;
    }
    let _ = child.kill().await;
    cleanup_socket(&socket_name);
    debug!("mpv: sound {} supervisor exiting", id);
}

#[cfg(unix)]
pub(crate) fn cleanup_socket(socket_name: &str) {
    let _ = std::fs::remove_file(socket_name);
}

#[cfg(windows)]
pub(crate) fn cleanup_socket(_socket_name: &str) {}
