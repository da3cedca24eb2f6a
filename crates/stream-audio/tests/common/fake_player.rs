#![allow(dead_code)]

use std::cell::RefCell;
use std::rc::Rc;

use stream_audio::{MediaPlayer, MediaStatus};

/// Media player double.  Every instance created by one [`FakePlayers`]
/// records into the same log, tagged with its creation index.
#[derive(Clone, Default)]
pub struct FakePlayers {
    inner: Rc<RefCell<Log>>,
}

#[derive(Default)]
pub struct Log {
    pub created: usize,
    /// Instances dropped so far, by creation index.
    pub dropped: Vec<usize>,
    /// `"<index>:<call>"` for every call, in order.
    pub calls: Vec<String>,
    pub volumes: Vec<f32>,
    pub unavailable: bool,
    pub status: MediaStatus,
    pub exited: bool,
    pub artist: String,
    pub title: String,
    pub stream_name: String,
    pub stream_location: String,
}

pub struct FakePlayer {
    index: usize,
    log: Rc<RefCell<Log>>,
}

impl FakePlayers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Factory closure handing out players that share this log.
    pub fn factory(&self) -> impl FnMut() -> Option<FakePlayer> {
        let log = self.inner.clone();
        move || {
            let mut l = log.borrow_mut();
            if l.unavailable {
                return None;
            }
            l.created += 1;
            l.exited = false;
            Some(FakePlayer {
                index: l.created,
                log: log.clone(),
            })
        }
    }

    pub fn with<R>(&self, f: impl FnOnce(&mut Log) -> R) -> R {
        f(&mut self.inner.borrow_mut())
    }

    pub fn calls(&self) -> Vec<String> {
        self.inner.borrow().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.inner.borrow_mut().calls.clear();
    }
}

impl FakePlayer {
    fn record(&self, call: String) {
        self.log
            .borrow_mut()
            .calls
            .push(format!("{}:{}", self.index, call));
    }
}

impl Drop for FakePlayer {
    fn drop(&mut self) {
        self.log.borrow_mut().dropped.push(self.index);
    }
}

impl MediaPlayer for FakePlayer {
    fn load_uri(&mut self, url: &str) {
        self.record(format!("load {}", url));
        self.log.borrow_mut().status = MediaStatus::Loading;
    }

    fn start(&mut self) {
        self.record("start".into());
        self.log.borrow_mut().status = MediaStatus::Playing;
    }

    fn pause(&mut self) {
        self.record("pause".into());
        self.log.borrow_mut().status = MediaStatus::Paused;
    }

    fn stop(&mut self) {
        self.record("stop".into());
        self.log.borrow_mut().status = MediaStatus::Done;
    }

    fn idle(&mut self) {
        self.record("idle".into());
    }

    fn set_volume(&mut self, volume: f32) {
        self.log.borrow_mut().volumes.push(volume);
    }

    fn set_loop(&mut self, looping: bool) {
        self.record(format!("loop {}", looping));
    }

    fn status(&self) -> MediaStatus {
        self.log.borrow().status
    }

    fn has_exited(&self) -> bool {
        self.log.borrow().exited
    }

    fn artist(&self) -> String {
        self.log.borrow().artist.clone()
    }

    fn title(&self) -> String {
        self.log.borrow().title.clone()
    }

    fn stream_name(&self) -> String {
        self.log.borrow().stream_name.clone()
    }

    fn stream_location(&self) -> String {
        self.log.borrow().stream_location.clone()
    }
}
