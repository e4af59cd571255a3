//! Rest coordination and manual work timers.
//!
//! At most one rest countdown exists block-wide; starting a new one replaces
//! the old. Work timers are separate per-exercise countdowns for the active
//! interval and never interact with rest.

use crate::clock::{Countdown, TimeSource};
use std::collections::HashMap;

/// Why a rest countdown was started
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RestKind {
    /// After a single exercise's set
    Set { exercise_index: usize },
    /// After a grouped round
    Round,
}

/// The active rest countdown
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ActiveRest {
    pub kind: RestKind,
    pub countdown: Countdown,
}

impl ActiveRest {
    pub fn is_round_rest(&self) -> bool {
        matches!(self.kind, RestKind::Round)
    }
}

/// Owner of the single rest countdown
#[derive(Clone, Debug, Default)]
pub struct RestCoordinator {
    active: Option<ActiveRest>,
}

impl RestCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn active(&self) -> Option<&ActiveRest> {
        self.active.as_ref()
    }

    pub fn is_resting(&self) -> bool {
        self.active.is_some()
    }

    /// Start a countdown, superseding any existing one. Zero seconds means
    /// no rest and leaves the coordinator idle.
    pub fn start(&mut self, time: &dyn TimeSource, kind: RestKind, seconds: u32) {
        if seconds == 0 {
            self.active = None;
            return;
        }
        if let Some(previous) = self.active.take() {
            tracing::debug!("Rest {:?} superseded", previous.kind);
        }
        self.active = Some(ActiveRest {
            kind,
            countdown: Countdown::start(time, seconds),
        });
        tracing::info!("Rest started: {:?} for {}s", kind, seconds);
    }

    /// Go straight to the ready state
    pub fn skip(&mut self) -> bool {
        let skipped = self.active.take().is_some();
        if skipped {
            tracing::info!("Rest skipped");
        }
        skipped
    }

    pub fn remaining_secs(&self, time: &dyn TimeSource) -> Option<u64> {
        self.active.map(|r| r.countdown.remaining_secs(time))
    }

    /// Clear an expired countdown. Returns it exactly once.
    pub fn poll(&mut self, time: &dyn TimeSource) -> Option<ActiveRest> {
        match self.active {
            Some(rest) if rest.countdown.is_expired(time) => {
                self.active = None;
                tracing::info!("Rest finished: {:?}", rest.kind);
                Some(rest)
            }
            _ => None,
        }
    }
}

/// Per-exercise user-toggled work countdowns
#[derive(Clone, Debug, Default)]
pub struct WorkTimers {
    running: HashMap<usize, Countdown>,
}

impl WorkTimers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a timer, or cancel it when already running. Returns whether it
    /// is running afterwards.
    pub fn toggle(&mut self, time: &dyn TimeSource, exercise_index: usize, seconds: u32) -> bool {
        if self.running.remove(&exercise_index).is_some() {
            tracing::debug!("Work timer for exercise {} cancelled", exercise_index);
            return false;
        }
        if seconds == 0 {
            return false;
        }
        self.running
            .insert(exercise_index, Countdown::start(time, seconds));
        tracing::debug!(
            "Work timer for exercise {} started: {}s",
            exercise_index,
            seconds
        );
        true
    }

    pub fn remaining_secs(&self, time: &dyn TimeSource, exercise_index: usize) -> Option<u64> {
        self.running
            .get(&exercise_index)
            .map(|c| c.remaining_secs(time))
    }

    /// Remove and return the exercises whose timers reached zero
    pub fn poll(&mut self, time: &dyn TimeSource) -> Vec<usize> {
        let mut finished: Vec<usize> = self
            .running
            .iter()
            .filter(|(_, c)| c.is_expired(time))
            .map(|(i, _)| *i)
            .collect();
        finished.sort_unstable();
        for i in &finished {
            self.running.remove(i);
        }
        finished
    }
}
