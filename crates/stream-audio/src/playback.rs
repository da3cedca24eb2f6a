//! Gain and buffering policy
//!
//! Pure logic, no engine access: the stream manager feeds it open-state
//! snapshots and applies the resulting actions to the live channel.

use crate::engine::OpenStateInfo;

/// Buffer fill above which a paused stream is resumed.
pub const RESUME_THRESHOLD_PERCENT: u32 = 80;

/// Coarse buffer health derived from one open-state poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferHealth {
    /// Nothing buffered yet
    Unbuffered,
    /// Filling, below the resume threshold
    Buffering,
    /// Underrun reported by the engine
    Starving,
    /// Above the resume threshold
    Healthy,
}

impl BufferHealth {
    /// The starving flag wins over the fill percentage.
    pub fn classify(info: &OpenStateInfo) -> Self {
        if info.starving {
            BufferHealth::Starving
        } else if info.percent_buffered > RESUME_THRESHOLD_PERCENT {
            BufferHealth::Healthy
        } else if info.percent_buffered == 0 {
            BufferHealth::Unbuffered
        } else {
            BufferHealth::Buffering
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferAction {
    Pause,
    Resume,
    Hold,
}

/// Volume actually sent to the engine for a user gain.
///
/// The gain is squared as a rough perceptual curve.  Whether squaring is the
/// right curve is an open question; existing gain settings depend on it.
pub fn perceptual_volume(gain: f32) -> f32 {
    (gain * gain).clamp(0.0, 1.0)
}

#[derive(Debug, Clone)]
pub struct PlaybackController {
    gain: f32,
}

impl Default for PlaybackController {
    fn default() -> Self {
        Self::new(1.0)
    }
}

impl PlaybackController {
    pub fn new(gain: f32) -> Self {
        Self { gain }
    }

    /// Raw gain as set by the user, before the perceptual curve.
    pub fn gain(&self) -> f32 {
        self.gain
    }

    pub fn set_gain(&mut self, gain: f32) {
        self.gain = gain;
    }

    pub fn applied_volume(&self) -> f32 {
        perceptual_volume(self.gain)
    }

    /// Buffering decision for the current poll.  Pausing is idempotent:
    /// an already paused channel is left alone while it keeps starving.
    pub fn decide(&self, info: &OpenStateInfo, paused: bool) -> BufferAction {
        match BufferHealth::classify(info) {
            BufferHealth::Starving if paused => BufferAction::Hold,
            BufferHealth::Starving => BufferAction::Pause,
            BufferHealth::Healthy => BufferAction::Resume,
            BufferHealth::Unbuffered | BufferHealth::Buffering => BufferAction::Hold,
        }
    }
}
