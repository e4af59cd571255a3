//! Audio cue triggers.
//!
//! Cues are fire-and-forget. The engine decides when a cue is due and hands
//! it to a [`CuePlayer`]; playback belongs to the host.

use std::sync::{Arc, Mutex};

/// Named cue instants
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Cue {
    Halfway,
    MinuteWarning,
    CountdownShort,
    CountdownFinal,
    Success,
}

pub trait CuePlayer: Send + Sync {
    fn play(&self, cue: Cue);
}

/// Discards every cue
#[derive(Debug, Clone, Copy, Default)]
pub struct SilentCues;

impl CuePlayer for SilentCues {
    fn play(&self, _cue: Cue) {}
}

/// Keeps every cue in order. Clones share the same record.
#[derive(Debug, Clone, Default)]
pub struct RecordedCues {
    played: Arc<Mutex<Vec<Cue>>>,
}

impl RecordedCues {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn played(&self) -> Vec<Cue> {
        self.played
            .lock()
            .map(|cues| cues.clone())
            .unwrap_or_default()
    }

    pub fn count(&self, cue: Cue) -> usize {
        self.played().iter().filter(|c| **c == cue).count()
    }
}

impl CuePlayer for RecordedCues {
    fn play(&self, cue: Cue) {
        if let Ok(mut cues) = self.played.lock() {
            cues.push(cue);
        }
    }
}
