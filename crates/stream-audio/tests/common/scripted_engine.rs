#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::{HashMap, HashSet, VecDeque};
use std::rc::Rc;

use stream_audio::{
    ChannelHandle, DecoderEngine, EngineError, EngineResult, OpenState, OpenStateInfo,
    SoundHandle, StreamMode, Tag, TagCounts,
};

/// In-memory decoder engine.  Open states are scripted per url; every call
/// is recorded so tests can assert on what the manager asked for.
///
/// Clones share state, so a test can keep one clone after moving the other
/// into a `StreamManager`.
#[derive(Clone, Default)]
pub struct ScriptedEngine {
    inner: Rc<RefCell<Script>>,
}

#[derive(Default)]
pub struct Script {
    next_id: u64,
    /// Urls passed to `create_stream`, in order.
    pub created: Vec<String>,
    /// Urls whose sound was released, in order.
    pub released: Vec<String>,
    pub play_calls: usize,
    /// `(paused)` for every `set_paused` call.
    pub pause_calls: Vec<bool>,
    pub volumes: Vec<f32>,
    pub frequencies: Vec<f32>,
    pub priorities: Vec<i32>,
    pub stream_buffer_sizes: Vec<u32>,
    pub decode_buffer_sizes: Vec<u32>,
    pub fail_open: HashSet<String>,
    pub fail_stream_buffer: bool,
    pub fail_paused_query: bool,
    scripts: HashMap<String, Vec<OpenStateInfo>>,
    sounds: HashMap<u64, Sound>,
    channels: HashMap<u64, Channel>,
}

struct Sound {
    url: String,
    states: VecDeque<OpenStateInfo>,
    last: OpenStateInfo,
    tags: Vec<Tag>,
    dirty: usize,
    channel: Option<u64>,
}

#[derive(Debug, Clone, Copy)]
pub struct Channel {
    pub paused: bool,
    pub volume: f32,
    pub frequency: Option<f32>,
    pub priority: i32,
}

pub fn ready() -> OpenStateInfo {
    OpenStateInfo::new(OpenState::Ready).with_buffer(100, false)
}

pub fn connecting() -> OpenStateInfo {
    OpenStateInfo::new(OpenState::Connecting)
}

pub fn error() -> OpenStateInfo {
    OpenStateInfo::new(OpenState::Error)
}

pub fn buffering(percent: u32, starving: bool) -> OpenStateInfo {
    OpenStateInfo::new(OpenState::Ready).with_buffer(percent, starving)
}

impl ScriptedEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open states returned for streams of `url`, one per query.  The last
    /// entry repeats forever.  Unscripted urls are always ready.
    pub fn script(&self, url: &str, states: Vec<OpenStateInfo>) {
        self.inner
            .borrow_mut()
            .scripts
            .insert(url.to_string(), states);
    }

    /// Replace the open-state script of the newest live sound for `url`.
    pub fn rescript_live(&self, url: &str, states: Vec<OpenStateInfo>) {
        let mut s = self.inner.borrow_mut();
        if let Some(sound) = s.newest_sound_mut(url) {
            sound.last = *states.last().unwrap_or(&ready());
            sound.states = states.into();
        }
    }

    pub fn fail_open(&self, url: &str) {
        self.inner.borrow_mut().fail_open.insert(url.to_string());
    }

    pub fn fail_stream_buffer(&self) {
        self.inner.borrow_mut().fail_stream_buffer = true;
    }

    /// Make every `paused` query fail until cleared.
    pub fn fail_paused_query(&self, fail: bool) {
        self.inner.borrow_mut().fail_paused_query = fail;
    }

    /// Publish tags on the newest live sound for `url` and mark them dirty.
    pub fn push_tags(&self, url: &str, tags: Vec<Tag>) {
        let mut s = self.inner.borrow_mut();
        if let Some(sound) = s.newest_sound_mut(url) {
            sound.dirty = tags.len();
            sound.tags = tags;
        }
    }

    pub fn with<R>(&self, f: impl FnOnce(&Script) -> R) -> R {
        f(&self.inner.borrow())
    }

    pub fn live_sounds(&self) -> usize {
        self.inner.borrow().sounds.len()
    }

    pub fn channel_state(&self, channel: ChannelHandle) -> Option<Channel> {
        self.inner.borrow().channels.get(&channel.raw()).copied()
    }
}

impl Script {
    fn newest_sound_mut(&mut self, url: &str) -> Option<&mut Sound> {
        let id = self
            .sounds
            .iter()
            .filter(|(_, s)| s.url == url)
            .map(|(id, _)| *id)
            .max()?;
        self.sounds.get_mut(&id)
    }

    fn sound(&mut self, handle: &SoundHandle) -> EngineResult<&mut Sound> {
        self.sounds
            .get_mut(&handle.raw())
            .ok_or(EngineError::InvalidHandle)
    }

    fn channel(&mut self, handle: ChannelHandle) -> EngineResult<&mut Channel> {
        self.channels
            .get_mut(&handle.raw())
            .ok_or(EngineError::InvalidHandle)
    }
}

impl DecoderEngine for ScriptedEngine {
    fn create_stream(&mut self, url: &str, _mode: StreamMode) -> EngineResult<SoundHandle> {
        let mut s = self.inner.borrow_mut();
        s.created.push(url.to_string());
        if s.fail_open.contains(url) {
            return Err(EngineError::Engine("Couldn't open stream".to_string()));
        }

        s.next_id += 1;
        let id = s.next_id;
        let states: VecDeque<OpenStateInfo> = s
            .scripts
            .get(url)
            .cloned()
            .unwrap_or_else(|| vec![ready()])
            .into();
        let last = *states.back().unwrap_or(&ready());
        s.sounds.insert(
            id,
            Sound {
                url: url.to_string(),
                states,
                last,
                tags: Vec::new(),
                dirty: 0,
                channel: None,
            },
        );
        Ok(SoundHandle::from_raw(id))
    }

    fn open_state(&mut self, sound: &SoundHandle) -> EngineResult<OpenStateInfo> {
        let mut s = self.inner.borrow_mut();
        let sound = s.sound(sound)?;
        Ok(sound.states.pop_front().unwrap_or(sound.last))
    }

    fn play(&mut self, sound: &SoundHandle, paused: bool) -> EngineResult<ChannelHandle> {
        let mut s = self.inner.borrow_mut();
        s.play_calls += 1;
        let id = sound.raw();
        s.sound(sound)?.channel = Some(id);
        s.channels.insert(
            id,
            Channel {
                paused,
                volume: 1.0,
                frequency: None,
                priority: 128,
            },
        );
        Ok(ChannelHandle::from_raw(id))
    }

    fn release(&mut self, sound: SoundHandle) -> EngineResult<()> {
        let mut s = self.inner.borrow_mut();
        let removed = s
            .sounds
            .remove(&sound.raw())
            .ok_or(EngineError::InvalidHandle)?;
        if let Some(channel) = removed.channel {
            s.channels.remove(&channel);
        }
        s.released.push(removed.url);
        Ok(())
    }

    fn tag_counts(&mut self, sound: &SoundHandle) -> EngineResult<TagCounts> {
        let mut s = self.inner.borrow_mut();
        let sound = s.sound(sound)?;
        Ok(TagCounts {
            total: sound.tags.len(),
            dirty: sound.dirty,
        })
    }

    fn tag(&mut self, sound: &SoundHandle, index: usize) -> EngineResult<Tag> {
        let mut s = self.inner.borrow_mut();
        let sound = s.sound(sound)?;
        sound.dirty = 0;
        sound
            .tags
            .get(index)
            .cloned()
            .ok_or_else(|| EngineError::Engine("tag index out of range".to_string()))
    }

    fn set_volume(&mut self, channel: ChannelHandle, volume: f32) -> EngineResult<()> {
        let mut s = self.inner.borrow_mut();
        s.volumes.push(volume);
        s.channel(channel)?.volume = volume;
        Ok(())
    }

    fn set_frequency(&mut self, channel: ChannelHandle, frequency: f32) -> EngineResult<()> {
        let mut s = self.inner.borrow_mut();
        s.frequencies.push(frequency);
        s.channel(channel)?.frequency = Some(frequency);
        Ok(())
    }

    fn set_paused(&mut self, channel: ChannelHandle, paused: bool) -> EngineResult<()> {
        let mut s = self.inner.borrow_mut();
        s.pause_calls.push(paused);
        s.channel(channel)?.paused = paused;
        Ok(())
    }

    fn paused(&mut self, channel: ChannelHandle) -> EngineResult<bool> {
        let mut s = self.inner.borrow_mut();
        if s.fail_paused_query {
            return Err(EngineError::Engine("channel is busy".to_string()));
        }
        Ok(s.channel(channel)?.paused)
    }

    fn set_priority(&mut self, channel: ChannelHandle, priority: i32) -> EngineResult<()> {
        let mut s = self.inner.borrow_mut();
        s.priorities.push(priority);
        s.channel(channel)?.priority = priority;
        Ok(())
    }

    fn set_stream_buffer_size(&mut self, bytes: u32) -> EngineResult<()> {
        let mut s = self.inner.borrow_mut();
        if s.fail_stream_buffer {
            return Err(EngineError::Engine("An invalid parameter was passed".to_string()));
        }
        s.stream_buffer_sizes.push(bytes);
        Ok(())
    }

    fn set_decode_buffer_size(&mut self, millis: u32) -> EngineResult<()> {
        self.inner.borrow_mut().decode_buffer_sizes.push(millis);
        Ok(())
    }
}
