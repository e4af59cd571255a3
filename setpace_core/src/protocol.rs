//! Protocol state machine.
//!
//! One variant is selected per block from its [`Protocol`]. Each variant
//! carries only its own fields and decides, on every tick, whether the clock
//! must auto-pause and which cues are due.

use crate::clock::Clock;
use crate::config::EngineConfig;
use crate::cues::{Cue, CuePlayer};
use crate::{Block, Error, Protocol, Result, RoundOutcome, MAX_EMOM_MINUTES};
use std::time::Duration;

/// Seconds in one EMOM round
pub const EMOM_ROUND_SECS: u64 = 60;

/// Things that happened during a tick or an action
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionEvent {
    /// REPS: every exercise reached its target
    TargetsMet,
    /// REPS: the category time cap stopped the clock
    TimeCapReached,
    /// TIME: the countdown reached zero
    CountdownFinished,
    /// EMOM: a new round began (1-based)
    RoundStarted(u32),
    /// EMOM: all rounds elapsed
    EmomFinished,
    /// FREEFORM: every exercise reached its set count
    AllSetsComplete,
    RestFinished,
    WorkTimerFinished(usize),
}

/// Progress figures the protocol needs to evaluate completion
#[derive(Clone, Copy, Debug)]
pub struct Progress<'a> {
    pub counts: &'a [u32],
    pub targets: &'a [u32],
    pub overall_volume: Option<u32>,
    pub all_sets_complete: bool,
}

#[derive(Clone, Debug)]
pub struct RepsState {
    time_cap: Duration,
    total_target: u32,
    targets_met: bool,
    capped: bool,
}

#[derive(Clone, Debug)]
pub struct TimeState {
    cap_secs: u64,
    last_remaining: u64,
    finished: bool,
}

#[derive(Clone, Debug)]
pub struct EmomState {
    rounds: u32,
    outcomes: Vec<Option<RoundOutcome>>,
    announced_round: u32,
    last_cue_second: Option<u64>,
    finished: bool,
}

#[derive(Clone, Debug, Default)]
pub struct FreeformState {
    complete: bool,
}

/// Per-protocol execution state
#[derive(Clone, Debug)]
pub enum ProtocolState {
    Reps(RepsState),
    Time(TimeState),
    Emom(EmomState),
    Freeform(FreeformState),
}

impl ProtocolState {
    pub fn for_block(block: &Block, config: &EngineConfig) -> Self {
        match block.protocol {
            Protocol::Reps => {
                let cap = block
                    .targeting
                    .time_cap
                    .unwrap_or_else(|| config.reps_time_caps.for_block_type(&block.block_type));
                let per_exercise = block
                    .exercises
                    .iter()
                    .map(|e| e.rep_target())
                    .fold(0, u32::saturating_add);
                ProtocolState::Reps(RepsState {
                    time_cap: Duration::from_secs(u64::from(cap.max(1))),
                    total_target: block.targeting.volume.unwrap_or(per_exercise),
                    targets_met: false,
                    capped: false,
                })
            }
            Protocol::Time => {
                let cap = u64::from(
                    block
                        .targeting
                        .time_cap
                        .unwrap_or(config.time_cap_seconds)
                        .max(1),
                );
                ProtocolState::Time(TimeState {
                    cap_secs: cap,
                    last_remaining: cap,
                    finished: false,
                })
            }
            Protocol::Emom => {
                let rounds = block.emom_rounds().clamp(1, MAX_EMOM_MINUTES);
                ProtocolState::Emom(EmomState {
                    rounds,
                    outcomes: vec![None; rounds as usize],
                    announced_round: 0,
                    last_cue_second: None,
                    finished: false,
                })
            }
            Protocol::Freeform => ProtocolState::Freeform(FreeformState::default()),
        }
    }

    pub fn protocol(&self) -> Protocol {
        match self {
            ProtocolState::Reps(_) => Protocol::Reps,
            ProtocolState::Time(_) => Protocol::Time,
            ProtocolState::Emom(_) => Protocol::Emom,
            ProtocolState::Freeform(_) => Protocol::Freeform,
        }
    }

    /// Whether the protocol has reached its terminal condition
    pub fn is_finished(&self) -> bool {
        match self {
            ProtocolState::Reps(s) => s.targets_met || s.capped,
            ProtocolState::Time(s) => s.finished,
            ProtocolState::Emom(s) => s.finished,
            ProtocolState::Freeform(s) => s.complete,
        }
    }

    /// The clock has hit a protocol limit and may not run again
    pub fn clock_exhausted(&self) -> bool {
        match self {
            ProtocolState::Reps(s) => s.capped,
            ProtocolState::Time(s) => s.finished,
            ProtocolState::Emom(s) => s.finished,
            ProtocolState::Freeform(_) => false,
        }
    }

    /// REPS only: every exercise met its target
    pub fn targets_met(&self) -> bool {
        matches!(self, ProtocolState::Reps(s) if s.targets_met)
    }

    /// REPS overall target
    pub fn total_target(&self) -> Option<u32> {
        match self {
            ProtocolState::Reps(s) => Some(s.total_target),
            _ => None,
        }
    }

    /// Seconds left on the TIME countdown, never below zero
    pub fn remaining_secs(&self, clock: &Clock) -> Option<u64> {
        match self {
            ProtocolState::Time(s) => Some(s.cap_secs.saturating_sub(clock.elapsed_secs())),
            _ => None,
        }
    }

    /// EMOM `(round, seconds left in round)`; round is 1-based
    pub fn emom_position(&self, clock: &Clock) -> Option<(u32, u64)> {
        match self {
            ProtocolState::Emom(_) => {
                let e = clock.elapsed_secs();
                let round = (e / EMOM_ROUND_SECS) as u32 + 1;
                Some((round, EMOM_ROUND_SECS - e % EMOM_ROUND_SECS))
            }
            _ => None,
        }
    }

    pub fn emom_rounds(&self) -> Option<u32> {
        match self {
            ProtocolState::Emom(s) => Some(s.rounds),
            _ => None,
        }
    }

    pub fn round_outcomes(&self) -> &[Option<RoundOutcome>] {
        match self {
            ProtocolState::Emom(s) => &s.outcomes,
            _ => &[],
        }
    }

    fn emom_mut(&mut self) -> Result<&mut EmomState> {
        match self {
            ProtocolState::Emom(s) => Ok(s),
            other => Err(Error::Action(format!(
                "Round outcomes only exist in EMOM blocks, not {}",
                other.protocol()
            ))),
        }
    }

    /// Classify a round (1-based). Independent of counted reps.
    pub fn set_round_outcome(&mut self, round: u32, outcome: Option<RoundOutcome>) -> Result<()> {
        let state = self.emom_mut()?;
        let slot = round
            .checked_sub(1)
            .and_then(|i| state.outcomes.get_mut(i as usize))
            .ok_or_else(|| Error::Action(format!("No round {}", round)))?;
        *slot = outcome;
        Ok(())
    }

    /// Cycle a round through unset, success, fail
    pub fn toggle_round_outcome(&mut self, round: u32) -> Result<Option<RoundOutcome>> {
        let current = self
            .round_outcomes()
            .get(round.saturating_sub(1) as usize)
            .copied()
            .flatten();
        let next = match current {
            None => Some(RoundOutcome::Success),
            Some(RoundOutcome::Success) => Some(RoundOutcome::Fail),
            Some(RoundOutcome::Fail) => None,
        };
        self.set_round_outcome(round, next)?;
        Ok(next)
    }

    /// Evaluate the protocol against the clock and progress.
    pub fn tick(
        &mut self,
        clock: &mut Clock,
        progress: &Progress<'_>,
        cues: &dyn CuePlayer,
    ) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        match self {
            ProtocolState::Reps(s) => s.tick(clock, progress, cues, &mut events),
            ProtocolState::Time(s) => s.tick(clock, cues, &mut events),
            ProtocolState::Emom(s) => s.tick(clock, cues, &mut events),
            ProtocolState::Freeform(s) => s.tick(clock, progress, cues, &mut events),
        }
        events
    }
}

fn reps_targets_met(progress: &Progress<'_>) -> bool {
    if progress.targets.iter().any(|t| *t > 0) {
        return progress
            .counts
            .iter()
            .zip(progress.targets)
            .all(|(count, target)| count >= target);
    }
    match progress.overall_volume {
        Some(volume) if volume > 0 => {
            progress.counts.iter().fold(0u32, |a, c| a.saturating_add(*c)) >= volume
        }
        _ => false,
    }
}

/// Clamp the clock to `limit` and stop it there
fn stop_at(clock: &mut Clock, limit: Duration) {
    clock.set_elapsed(limit);
    clock.pause();
}

impl RepsState {
    fn tick(
        &mut self,
        clock: &mut Clock,
        progress: &Progress<'_>,
        cues: &dyn CuePlayer,
        events: &mut Vec<SessionEvent>,
    ) {
        if !self.targets_met && reps_targets_met(progress) {
            self.targets_met = true;
            clock.pause();
            cues.play(Cue::Success);
            events.push(SessionEvent::TargetsMet);
            tracing::info!("All rep targets met at {}s", clock.elapsed_secs());
        }

        if !self.capped && clock.elapsed() >= self.time_cap {
            self.capped = true;
            stop_at(clock, self.time_cap);
            cues.play(Cue::CountdownFinal);
            events.push(SessionEvent::TimeCapReached);
            tracing::info!("Time cap of {}s reached", self.time_cap.as_secs());
        }
    }
}

impl TimeState {
    fn tick(&mut self, clock: &mut Clock, cues: &dyn CuePlayer, events: &mut Vec<SessionEvent>) {
        if self.finished {
            return;
        }

        let cap = Duration::from_secs(self.cap_secs);
        if clock.elapsed() >= cap {
            self.finished = true;
            self.last_remaining = 0;
            stop_at(clock, cap);
            cues.play(Cue::CountdownFinal);
            events.push(SessionEvent::CountdownFinished);
            tracing::info!("Countdown of {}s finished", self.cap_secs);
            return;
        }

        if !clock.is_running() {
            return;
        }

        let remaining = self.cap_secs - clock.elapsed_secs();
        if remaining == self.last_remaining {
            return;
        }
        let prev = self.last_remaining;
        self.last_remaining = remaining;

        let crossed = |mark: u64| prev > mark && remaining <= mark;
        let halfway = self.cap_secs / 2;
        if halfway > 0 && crossed(halfway) {
            cues.play(Cue::Halfway);
        }
        if self.cap_secs > 60 && crossed(60) {
            cues.play(Cue::MinuteWarning);
        }
        if (1..=4).contains(&remaining) {
            cues.play(Cue::CountdownShort);
        }
    }
}

impl EmomState {
    fn tick(&mut self, clock: &mut Clock, cues: &dyn CuePlayer, events: &mut Vec<SessionEvent>) {
        if self.finished {
            return;
        }

        let total = Duration::from_secs(u64::from(self.rounds) * EMOM_ROUND_SECS);
        if clock.elapsed() >= total {
            self.finished = true;
            stop_at(clock, total);
            cues.play(Cue::CountdownFinal);
            events.push(SessionEvent::EmomFinished);
            tracing::info!("EMOM finished after {} rounds", self.rounds);
            return;
        }

        if !clock.is_running() {
            return;
        }

        let e = clock.elapsed_secs();
        let round = (e / EMOM_ROUND_SECS) as u32 + 1;
        if round != self.announced_round {
            self.announced_round = round;
            cues.play(Cue::CountdownFinal);
            events.push(SessionEvent::RoundStarted(round));
            tracing::debug!("EMOM round {} started", round);
        }

        if self.last_cue_second == Some(e) {
            return;
        }
        self.last_cue_second = Some(e);

        let in_round = EMOM_ROUND_SECS - e % EMOM_ROUND_SECS;
        if in_round == 31 {
            cues.play(Cue::Halfway);
        }
        if (1..=3).contains(&in_round) {
            cues.play(Cue::CountdownShort);
        }
    }
}

impl FreeformState {
    fn tick(
        &mut self,
        clock: &mut Clock,
        progress: &Progress<'_>,
        cues: &dyn CuePlayer,
        events: &mut Vec<SessionEvent>,
    ) {
        if !progress.all_sets_complete {
            // An undo reopens the block
            self.complete = false;
            return;
        }
        if self.complete {
            return;
        }
        self.complete = true;
        clock.pause();
        cues.play(Cue::Success);
        events.push(SessionEvent::AllSetsComplete);
        tracing::info!("All sets complete");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::demo_block;
    use crate::clock::ManualTimeSource;
    use crate::cues::RecordedCues;
    use std::sync::Arc;

    struct Rig {
        time: ManualTimeSource,
        clock: Clock,
        cues: RecordedCues,
        state: ProtocolState,
    }

    fn rig(block_id: &str) -> Rig {
        let block = demo_block(block_id).unwrap();
        let time = ManualTimeSource::new();
        Rig {
            clock: Clock::new(Arc::new(time.clone())),
            time,
            cues: RecordedCues::new(),
            state: ProtocolState::for_block(&block, &EngineConfig::default()),
        }
    }

    fn idle() -> Progress<'static> {
        Progress {
            counts: &[0, 0],
            targets: &[50, 50],
            overall_volume: None,
            all_sets_complete: false,
        }
    }

    impl Rig {
        fn tick(&mut self, progress: &Progress<'_>) -> Vec<SessionEvent> {
            self.state.tick(&mut self.clock, progress, &self.cues)
        }

        /// Advance one second at a time, ticking after each step
        fn run_for(&mut self, secs: u64, progress: &Progress<'_>) -> Vec<SessionEvent> {
            let mut events = Vec::new();
            for _ in 0..secs {
                self.time.advance_secs(1);
                events.extend(self.tick(progress));
            }
            events
        }
    }

    #[test]
    fn test_unknown_protocol_selects_freeform() {
        let mut block = demo_block("demo_reps_100").unwrap();
        block.protocol = Protocol::parse("ladder");
        let state = ProtocolState::for_block(&block, &EngineConfig::default());
        assert_eq!(state.protocol(), Protocol::Freeform);
    }

    #[test]
    fn test_reps_auto_pauses_exactly_once() {
        let mut r = rig("demo_reps_100");
        r.clock.start();
        r.run_for(30, &idle());

        let done = Progress {
            counts: &[50, 52],
            targets: &[50, 50],
            overall_volume: None,
            all_sets_complete: false,
        };
        let events = r.tick(&done);
        assert_eq!(events, vec![SessionEvent::TargetsMet]);
        assert!(!r.clock.is_running());

        // Re-evaluation, even with the clock restarted, does not fire again
        r.clock.start();
        for _ in 0..5 {
            assert!(r.tick(&done).is_empty());
        }
        assert_eq!(r.cues.count(Cue::Success), 1);
        assert!(r.state.targets_met());
    }

    #[test]
    fn test_reps_partial_progress_keeps_running() {
        let mut r = rig("demo_reps_100");
        r.clock.start();
        let partial = Progress {
            counts: &[50, 49],
            targets: &[50, 50],
            overall_volume: None,
            all_sets_complete: false,
        };
        assert!(r.tick(&partial).is_empty());
        assert!(r.clock.is_running());
        assert_eq!(r.state.total_target(), Some(100));
    }

    #[test]
    fn test_reps_time_cap_by_category() {
        // Warmup blocks are capped at 300s
        let mut r = rig("demo_reps_100");
        r.clock.start();
        let events = r.run_for(299, &idle());
        assert!(events.is_empty());

        r.time.advance_secs(5);
        let events = r.tick(&idle());
        assert_eq!(events, vec![SessionEvent::TimeCapReached]);
        assert!(!r.clock.is_running());
        assert_eq!(r.clock.elapsed_secs(), 300);
        assert_eq!(r.cues.count(Cue::CountdownFinal), 1);
        assert!(!r.state.targets_met());
    }

    #[test]
    fn test_reps_overall_volume_without_exercise_targets() {
        let mut r = rig("demo_reps_100");
        let volume_only = Progress {
            counts: &[40, 20],
            targets: &[0, 0],
            overall_volume: Some(60),
            all_sets_complete: false,
        };
        assert_eq!(r.tick(&volume_only), vec![SessionEvent::TargetsMet]);
    }

    #[test]
    fn test_time_countdown_stops_at_zero() {
        let mut r = rig("demo_time_amrap");
        r.clock.start();
        assert_eq!(r.state.remaining_secs(&r.clock), Some(600));

        r.run_for(599, &idle());
        assert_eq!(r.state.remaining_secs(&r.clock), Some(1));
        assert!(r.clock.is_running());

        // A late poll long after the cap still lands exactly on zero
        r.time.advance_secs(42);
        let events = r.tick(&idle());
        assert_eq!(events, vec![SessionEvent::CountdownFinished]);
        assert_eq!(r.state.remaining_secs(&r.clock), Some(0));
        assert_eq!(r.clock.elapsed_secs(), 600);
        assert!(!r.clock.is_running());
        assert!(r.state.is_finished());
    }

    #[test]
    fn test_time_cues() {
        let mut r = rig("demo_time_amrap");
        r.clock.start();
        r.run_for(600, &idle());

        assert_eq!(r.cues.count(Cue::Halfway), 1);
        assert_eq!(r.cues.count(Cue::MinuteWarning), 1);
        assert_eq!(r.cues.count(Cue::CountdownShort), 4);
        assert_eq!(r.cues.count(Cue::CountdownFinal), 1);
    }

    #[test]
    fn test_time_paused_countdown_never_expires() {
        let mut r = rig("demo_time_amrap");
        r.clock.start();
        r.run_for(10, &idle());
        r.clock.pause();
        r.time.advance_secs(10_000);
        assert!(r.tick(&idle()).is_empty());
        assert_eq!(r.state.remaining_secs(&r.clock), Some(590));
    }

    #[test]
    fn test_emom_round_formula() {
        let mut r = rig("demo_emom_5");
        r.clock.start();
        for elapsed in 0..300u64 {
            let (round, left) = r.state.emom_position(&r.clock).unwrap();
            assert_eq!(round as u64, elapsed / 60 + 1);
            assert_eq!(left, 60 - elapsed % 60);
            r.time.advance_secs(1);
            if elapsed < 299 {
                r.tick(&idle());
            }
        }
    }

    #[test]
    fn test_emom_finishes_at_last_boundary() {
        let mut r = rig("demo_emom_5");
        r.clock.start();
        let events = r.run_for(300, &idle());

        let starts: Vec<_> = events
            .iter()
            .filter(|e| matches!(e, SessionEvent::RoundStarted(_)))
            .collect();
        assert_eq!(starts.len(), 5);
        assert_eq!(events.first(), Some(&SessionEvent::RoundStarted(1)));
        assert_eq!(events.last(), Some(&SessionEvent::EmomFinished));
        assert!(!r.clock.is_running());
        assert_eq!(r.clock.elapsed_secs(), 300);
        assert!(r.state.is_finished());
    }

    #[test]
    fn test_emom_round_start_cue_once_per_round() {
        let mut r = rig("demo_emom_5");
        r.clock.start();
        // Several polls inside the same second must not repeat cues
        for _ in 0..3 {
            r.tick(&idle());
        }
        assert_eq!(r.cues.count(Cue::CountdownFinal), 1);

        for _ in 0..60 {
            r.time.advance(Duration::from_millis(250));
            r.tick(&idle());
            r.tick(&idle());
        }
        // 15s elapsed, still round 1
        assert_eq!(r.cues.count(Cue::CountdownFinal), 1);

        r.run_for(45, &idle());
        assert_eq!(r.cues.count(Cue::CountdownFinal), 2);
        assert_eq!(r.cues.count(Cue::Halfway), 1);
        assert_eq!(r.cues.count(Cue::CountdownShort), 3);
    }

    #[test]
    fn test_emom_outcomes_toggle_independently() {
        let mut r = rig("demo_emom_5");
        assert_eq!(r.state.toggle_round_outcome(2).unwrap(), Some(RoundOutcome::Success));
        assert_eq!(r.state.toggle_round_outcome(2).unwrap(), Some(RoundOutcome::Fail));
        r.state.set_round_outcome(1, Some(RoundOutcome::Success)).unwrap();
        assert_eq!(r.state.toggle_round_outcome(2).unwrap(), None);

        assert_eq!(
            r.state.round_outcomes(),
            &[Some(RoundOutcome::Success), None, None, None, None]
        );
        assert!(r.state.set_round_outcome(6, None).is_err());
        assert!(r.state.set_round_outcome(0, None).is_err());
    }

    #[test]
    fn test_outcomes_rejected_outside_emom() {
        let mut r = rig("demo_time_amrap");
        assert!(matches!(
            r.state.set_round_outcome(1, Some(RoundOutcome::Fail)),
            Err(Error::Action(_))
        ));
    }

    #[test]
    fn test_freeform_completion_relatches_after_undo() {
        let mut r = rig("demo_freeform_pyramid");
        r.clock.start();
        let complete = Progress {
            counts: &[],
            targets: &[],
            overall_volume: None,
            all_sets_complete: true,
        };
        let open = Progress {
            all_sets_complete: false,
            ..complete
        };

        assert_eq!(r.tick(&complete), vec![SessionEvent::AllSetsComplete]);
        assert!(r.tick(&complete).is_empty());
        assert!(!r.clock.is_running());

        r.tick(&open);
        assert_eq!(r.tick(&complete), vec![SessionEvent::AllSetsComplete]);
        assert_eq!(r.cues.count(Cue::Success), 2);
    }
}
