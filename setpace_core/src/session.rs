//! Block execution session.
//!
//! A [`BlockSession`] is the execution context for one block: it owns the
//! clock, the protocol state, counted values, the set ledger with its staged
//! inputs, the single rest countdown and the work timers. User actions and
//! periodic polls mutate it; [`BlockSession::finish`] consumes it and
//! assembles the [`BlockResult`].

use crate::clock::{Clock, SharedTime};
use crate::config::EngineConfig;
use crate::cues::{Cue, CuePlayer};
use crate::history::{Confidence, Recommendation};
use crate::ledger::{SetLedger, SetRef, StagedInputs};
use crate::protocol::{Progress, ProtocolState, SessionEvent};
use crate::rest::{ActiveRest, RestCoordinator, RestKind, WorkTimers};
use crate::sanitize::{parse_value, parse_weight};
use crate::{
    Block, BlockResult, Error, Exercise, Protocol, Result, RoundOutcome, SetEntry, SetField,
    VolumeType,
};
use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

/// Data sufficiency checks run when a block is finished
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct CompletionCheck {
    pub has_reps: bool,
    pub has_time: bool,
    pub has_emom_outcomes: bool,
    pub has_freeform_sets: bool,
    pub all_targets_met: bool,
}

impl CompletionCheck {
    /// Nothing worth saving was recorded
    pub fn is_empty(&self) -> bool {
        !(self.has_reps
            || self.has_time
            || self.has_emom_outcomes
            || self.has_freeform_sets
            || self.all_targets_met)
    }
}

/// Outcome of [`BlockSession::finish`]
pub enum FinishOutcome {
    Completed(BlockResult),
    /// Nothing was recorded; finishing needs explicit confirmation
    NeedsConfirmation(Box<BlockSession>),
}

impl FinishOutcome {
    pub fn into_result(self) -> Option<BlockResult> {
        match self {
            FinishOutcome::Completed(result) => Some(result),
            FinishOutcome::NeedsConfirmation(_) => None,
        }
    }
}

pub struct BlockSession {
    block: Block,
    user_id: String,
    engine: EngineConfig,
    time: SharedTime,
    cues: Arc<dyn CuePlayer>,
    clock: Clock,
    protocol: ProtocolState,
    rep_targets: Vec<u32>,
    counts: Vec<u32>,
    ledger: SetLedger,
    staged: StagedInputs,
    rest: RestCoordinator,
    work_timers: WorkTimers,
    recommendations: Vec<Option<Recommendation>>,
    notes: Option<String>,
    pending: Vec<SessionEvent>,
}

impl BlockSession {
    pub fn new(
        block: Block,
        user_id: impl Into<String>,
        engine: EngineConfig,
        time: SharedTime,
        cues: Arc<dyn CuePlayer>,
    ) -> Self {
        let count = block.exercises.len();
        let protocol = ProtocolState::for_block(&block, &engine);

        let mut staged = StagedInputs::new();
        for (i, exercise) in block.exercises.iter().enumerate() {
            staged.set_value(i, exercise.set_value_at(0));
        }

        tracing::info!(
            "Session initialised for block {} ({}, {} exercises)",
            block.id,
            block.protocol,
            count
        );

        Self {
            rep_targets: block.exercises.iter().map(Exercise::rep_target).collect(),
            user_id: user_id.into(),
            clock: Clock::new(time.clone()),
            protocol,
            counts: vec![0; count],
            ledger: SetLedger::new(count),
            staged,
            rest: RestCoordinator::new(),
            work_timers: WorkTimers::new(),
            recommendations: vec![None; count],
            notes: None,
            pending: Vec::new(),
            block,
            engine,
            time,
            cues,
        }
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn block(&self) -> &Block {
        &self.block
    }

    pub fn protocol(&self) -> Protocol {
        self.protocol.protocol()
    }

    pub fn protocol_state(&self) -> &ProtocolState {
        &self.protocol
    }

    pub fn clock(&self) -> &Clock {
        &self.clock
    }

    pub fn ledger(&self) -> &SetLedger {
        &self.ledger
    }

    pub fn count(&self, exercise_index: usize) -> u32 {
        self.counts.get(exercise_index).copied().unwrap_or(0)
    }

    pub fn staged_value(&self, exercise_index: usize) -> Option<u32> {
        self.staged.value(exercise_index)
    }

    pub fn staged_weight(&self, exercise_index: usize) -> Option<f64> {
        self.staged.weight(exercise_index)
    }

    pub fn recommendation(&self, exercise_index: usize) -> Option<&Recommendation> {
        self.recommendations
            .get(exercise_index)
            .and_then(Option::as_ref)
    }

    pub fn committed(&self, exercise_index: usize) -> usize {
        self.ledger.committed(exercise_index)
    }

    pub fn target_sets(&self, exercise_index: usize) -> usize {
        self.block
            .exercises
            .get(exercise_index)
            .map_or(0, Exercise::target_set_count)
    }

    pub fn is_exercise_complete(&self, exercise_index: usize) -> bool {
        self.committed(exercise_index) >= self.target_sets(exercise_index)
    }

    pub fn all_sets_complete(&self) -> bool {
        (0..self.block.exercises.len()).all(|i| self.is_exercise_complete(i))
    }

    pub fn active_rest(&self) -> Option<&ActiveRest> {
        self.rest.active()
    }

    pub fn rest_remaining_secs(&self) -> Option<u64> {
        self.rest.remaining_secs(self.time.as_ref())
    }

    pub fn work_timer_remaining_secs(&self, exercise_index: usize) -> Option<u64> {
        self.work_timers
            .remaining_secs(self.time.as_ref(), exercise_index)
    }

    pub fn editing(&self) -> Option<SetRef> {
        self.ledger.editing()
    }

    fn exercise(&self, exercise_index: usize) -> Result<&Exercise> {
        self.block.exercises.get(exercise_index).ok_or_else(|| {
            Error::Action(format!(
                "Block {} has no exercise {}",
                self.block.id, exercise_index
            ))
        })
    }

    // ========================================================================
    // Clock and polling
    // ========================================================================

    pub fn start(&mut self) -> Result<()> {
        if self.protocol.clock_exhausted() {
            return Err(Error::Action(format!(
                "The {} clock has already run out",
                self.protocol()
            )));
        }
        self.clock.start();
        self.evaluate();
        Ok(())
    }

    pub fn pause(&mut self) {
        self.clock.pause();
    }

    /// Run protocol rules against the current state and queue their events
    fn evaluate(&mut self) {
        let progress = Progress {
            counts: &self.counts,
            targets: &self.rep_targets,
            overall_volume: self.block.targeting.volume,
            all_sets_complete: (0..self.block.exercises.len())
                .all(|i| self.ledger.committed(i) >= self.block.exercises[i].target_set_count()),
        };
        let events = self
            .protocol
            .tick(&mut self.clock, &progress, self.cues.as_ref());
        self.pending.extend(events);
    }

    /// Periodic tick. Returns everything that happened since the last poll.
    pub fn poll(&mut self) -> Vec<SessionEvent> {
        self.evaluate();

        if self.rest.poll(self.time.as_ref()).is_some() {
            self.cues.play(Cue::Success);
            self.pending.push(SessionEvent::RestFinished);
        }

        for exercise_index in self.work_timers.poll(self.time.as_ref()) {
            self.cues.play(Cue::Success);
            self.pending
                .push(SessionEvent::WorkTimerFinished(exercise_index));
        }

        std::mem::take(&mut self.pending)
    }

    // ========================================================================
    // Counted values and staged inputs
    // ========================================================================

    /// Add to (or, with a negative delta, take from) an exercise's counted value
    pub fn add_count(&mut self, exercise_index: usize, delta: i64) -> Result<u32> {
        self.exercise(exercise_index)?;
        let current = i64::from(self.counts[exercise_index]);
        let next = (current + delta).clamp(0, i64::from(u32::MAX)) as u32;
        self.counts[exercise_index] = next;
        self.evaluate();
        Ok(next)
    }

    /// Overwrite an exercise's counted value from typed input
    pub fn set_count(&mut self, exercise_index: usize, input: &str) -> Result<u32> {
        self.exercise(exercise_index)?;
        let value = parse_value(input).unwrap_or(0);
        self.counts[exercise_index] = value;
        self.evaluate();
        Ok(value)
    }

    pub fn stage_value(&mut self, exercise_index: usize, input: &str) -> Result<Option<u32>> {
        self.exercise(exercise_index)?;
        let value = parse_value(input);
        self.staged.set_value(exercise_index, value);
        Ok(value)
    }

    pub fn stage_weight(&mut self, exercise_index: usize, input: &str) -> Result<Option<f64>> {
        self.exercise(exercise_index)?;
        let weight = parse_weight(input);
        self.staged.set_weight(exercise_index, weight);
        Ok(weight)
    }

    // ========================================================================
    // Set ledger
    // ========================================================================

    /// Commit one set from override, staged, configured or fallback values.
    /// Returns the new entry; no rest is started.
    fn commit_set(&mut self, exercise_index: usize, override_value: Option<u32>) -> Result<SetEntry> {
        let exercise = self.exercise(exercise_index)?;
        let set_index = self.ledger.committed(exercise_index);
        let target = exercise.target_set_count();
        if set_index >= target {
            return Err(Error::Action(format!(
                "All {} sets of {} are already complete",
                target, exercise.name
            )));
        }

        let value = override_value
            .or_else(|| self.staged.value(exercise_index))
            .or_else(|| exercise.set_value_at(set_index))
            .unwrap_or(self.engine.fallback_set_value);
        let weight = self
            .staged
            .weight(exercise_index)
            .or_else(|| self.ledger.last_weight(exercise_index))
            .unwrap_or(0.0);
        let next_default = exercise.set_value_at(set_index + 1);

        let entry = self.ledger.append(exercise_index, value, weight)?;

        if set_index + 1 < target {
            self.staged.set_value(exercise_index, next_default);
        } else {
            self.staged.set_value(exercise_index, None);
        }
        Ok(entry)
    }

    /// Commit the next set of an exercise and start its rest unless skipped
    /// or this was the final set.
    pub fn complete_set(
        &mut self,
        exercise_index: usize,
        override_value: Option<u32>,
        skip_rest: bool,
    ) -> Result<SetEntry> {
        let entry = self.commit_set(exercise_index, override_value)?;

        // Starting the next set ends whatever rest was running
        self.rest.skip();
        let remaining = !self.is_exercise_complete(exercise_index);
        if remaining && !skip_rest {
            let seconds = self.block.exercises[exercise_index].rest_after(entry.set_index);
            self.rest.start(
                self.time.as_ref(),
                RestKind::Set { exercise_index },
                seconds,
            );
        }

        self.evaluate();
        Ok(entry)
    }

    /// Commit one set for every unfinished exercise of a group, then start
    /// the round rest if any member still has sets to do.
    pub fn complete_round(&mut self, group: &str, rest_override: Option<u32>) -> Result<Vec<SetEntry>> {
        let members = self.block.group_members(group);
        if members.is_empty() {
            return Err(Error::Action(format!("No group named '{}'", group)));
        }

        let open: Vec<usize> = members
            .iter()
            .copied()
            .filter(|i| !self.is_exercise_complete(*i))
            .collect();
        if open.is_empty() {
            return Err(Error::Action(format!("Group '{}' is already complete", group)));
        }

        let mut entries = Vec::with_capacity(open.len());
        for exercise_index in open {
            entries.push(self.commit_set(exercise_index, None)?);
        }

        self.rest.skip();
        if members.iter().any(|i| !self.is_exercise_complete(*i)) {
            let seconds = rest_override
                .or(self.block.round_rest_seconds)
                .unwrap_or(self.engine.round_rest_seconds);
            self.rest
                .start(self.time.as_ref(), RestKind::Round, seconds);
        }

        tracing::info!("Round of group '{}' committed {} sets", group, entries.len());
        self.evaluate();
        Ok(entries)
    }

    /// Open a committed set for editing
    pub fn edit_set(&mut self, exercise_index: usize, set_index: usize) -> Result<()> {
        self.ledger.begin_edit(exercise_index, set_index)
    }

    pub fn close_edit(&mut self) {
        self.ledger.close_edit();
    }

    /// Overwrite one field of a committed set in place
    pub fn update_set_result(
        &mut self,
        exercise_index: usize,
        set_index: usize,
        field: SetField,
        input: &str,
    ) -> Result<()> {
        match field {
            SetField::Value => {
                let value = parse_value(input).unwrap_or(0);
                self.ledger.set_value(exercise_index, set_index, value)
            }
            SetField::Weight => {
                let weight = parse_weight(input).unwrap_or(0.0);
                self.ledger.set_weight(exercise_index, set_index, weight)
            }
        }
    }

    /// Remove the last committed set of an exercise. The set must be open
    /// for editing.
    pub fn uncomplete_set(&mut self, exercise_index: usize, set_index: usize) -> Result<SetEntry> {
        let removed = self.ledger.remove_tail(exercise_index, set_index)?;
        let default = self.exercise(exercise_index)?.set_value_at(set_index);
        self.staged.set_value(exercise_index, default);
        self.evaluate();
        Ok(removed)
    }

    // ========================================================================
    // Rest and work timers
    // ========================================================================

    pub fn skip_rest(&mut self) -> bool {
        self.rest.skip()
    }

    /// Start or cancel the work countdown of a time-based exercise.
    /// Returns whether the timer is running afterwards.
    pub fn toggle_work_timer(&mut self, exercise_index: usize) -> Result<bool> {
        let exercise = self.exercise(exercise_index)?;
        if exercise.config.volume_type != VolumeType::Time {
            return Err(Error::Action(format!("{} is not time-based", exercise.name)));
        }
        let seconds = self
            .staged
            .value(exercise_index)
            .or_else(|| exercise.set_value_at(self.ledger.committed(exercise_index)))
            .unwrap_or(self.engine.fallback_set_value);
        Ok(self
            .work_timers
            .toggle(self.time.as_ref(), exercise_index, seconds))
    }

    // ========================================================================
    // EMOM rounds
    // ========================================================================

    pub fn set_round_outcome(&mut self, round: u32, outcome: Option<RoundOutcome>) -> Result<()> {
        self.protocol.set_round_outcome(round, outcome)
    }

    pub fn toggle_round_outcome(&mut self, round: u32) -> Result<Option<RoundOutcome>> {
        self.protocol.toggle_round_outcome(round)
    }

    // ========================================================================
    // History
    // ========================================================================

    /// Accept one resolved recommendation. The first value per exercise is
    /// kept for the block's lifetime.
    pub fn attach_recommendation(&mut self, exercise_index: usize, recommendation: Recommendation) {
        let Some(slot) = self.recommendations.get_mut(exercise_index) else {
            return;
        };
        if slot.is_some() {
            return;
        }
        if recommendation.confidence() == Confidence::High
            && self.staged.weight(exercise_index).is_none()
        {
            self.staged
                .set_weight(exercise_index, Some(recommendation.weight));
        }
        *slot = Some(recommendation);
    }

    /// Accept resolver output; may be partial or arrive after actions began
    pub fn attach_recommendations(&mut self, recommendations: Vec<Option<Recommendation>>) {
        for (i, rec) in recommendations.into_iter().enumerate() {
            if let Some(rec) = rec {
                self.attach_recommendation(i, rec);
            }
        }
    }

    pub fn set_notes(&mut self, notes: impl Into<String>) {
        let notes = notes.into();
        self.notes = if notes.trim().is_empty() {
            None
        } else {
            Some(notes)
        };
    }

    // ========================================================================
    // Completion
    // ========================================================================

    pub fn completion_check(&self) -> CompletionCheck {
        let has_time = match self.protocol() {
            Protocol::Time | Protocol::Emom => self.clock.has_moved(),
            Protocol::Reps | Protocol::Freeform => !self.clock.elapsed().is_zero(),
        };
        CompletionCheck {
            has_reps: self.counts.iter().any(|c| *c > 0),
            has_time,
            has_emom_outcomes: self.protocol.round_outcomes().iter().any(Option::is_some),
            has_freeform_sets: !self.ledger.is_empty(),
            all_targets_met: self.protocol.targets_met(),
        }
    }

    /// Finish the block. Without `confirmed`, a block with nothing recorded
    /// is handed back for confirmation.
    pub fn finish(mut self, confirmed: bool) -> FinishOutcome {
        let check = self.completion_check();
        if check.is_empty() && !confirmed {
            tracing::info!("Finish requested with no recorded data; asking for confirmation");
            return FinishOutcome::NeedsConfirmation(Box::new(self));
        }

        self.clock.pause();
        FinishOutcome::Completed(self.assemble())
    }

    fn assemble(self) -> BlockResult {
        let outcomes = self.protocol.round_outcomes().to_vec();
        let success_rounds = outcomes
            .iter()
            .filter(|o| **o == Some(RoundOutcome::Success))
            .count() as u32;

        let reps_or_volume = self
            .block
            .exercises
            .iter()
            .enumerate()
            .map(|(i, exercise)| match self.protocol() {
                Protocol::Emom => success_rounds.saturating_mul(exercise.per_round_target()),
                Protocol::Freeform => self.ledger.volume(i),
                Protocol::Reps | Protocol::Time => self.counts[i],
            })
            .collect();

        let actual_weights = (0..self.block.exercises.len())
            .map(|i| {
                self.ledger
                    .last_weight(i)
                    .filter(|w| *w > 0.0)
                    .or_else(|| self.staged.weight(i))
            })
            .collect();

        let result = BlockResult {
            id: Uuid::new_v4(),
            user_id: self.user_id,
            block_id: self.block.id.clone(),
            block_type: self.block.block_type.clone(),
            protocol: self.block.protocol,
            exercise_ids: self.block.exercises.iter().map(|e| e.id.clone()).collect(),
            completed_at: Utc::now(),
            reps_or_volume_per_exercise: reps_or_volume,
            actual_weights,
            set_ledger: self.ledger.snapshot(),
            emom_round_outcomes: outcomes,
            elapsed_seconds: self.clock.elapsed_secs(),
            notes: self.notes,
        };

        tracing::info!(
            "Block {} finished after {}s with {} committed sets",
            result.block_id,
            result.elapsed_seconds,
            self.ledger.total_entries()
        );
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::demo_block;
    use crate::clock::ManualTimeSource;
    use crate::cues::RecordedCues;
    use crate::history::RecommendationSource;
    use crate::{ContextMatch, ExerciseConfig, SetSpec};

    struct Harness {
        time: ManualTimeSource,
        cues: RecordedCues,
    }

    impl Harness {
        fn new() -> Self {
            crate::logging::init_test();
            Self {
                time: ManualTimeSource::new(),
                cues: RecordedCues::new(),
            }
        }

        fn session(&self, block: Block) -> BlockSession {
            BlockSession::new(
                block,
                "u1",
                EngineConfig::default(),
                Arc::new(self.time.clone()),
                Arc::new(self.cues.clone()),
            )
        }
    }

    fn single_exercise_block(values: &[u32], rest: u32) -> Block {
        let mut block = demo_block("demo_freeform_pyramid").unwrap();
        block.exercises.truncate(1);
        block.exercises[0].config = ExerciseConfig {
            sets: values
                .iter()
                .map(|v| SetSpec {
                    value: *v,
                    intensity: None,
                    rest: None,
                })
                .collect(),
            rest_seconds: Some(rest),
            ..ExerciseConfig::default()
        };
        block
    }

    fn high(weight: f64) -> Recommendation {
        Recommendation {
            weight,
            source: RecommendationSource::PreviousSeries,
            adjustment: None,
        }
    }

    #[test]
    fn test_freeform_end_to_end_pyramid() {
        let h = Harness::new();
        let mut session = h.session(single_exercise_block(&[12, 10, 8], 60));

        session.complete_set(0, None, false).unwrap();
        assert_eq!(session.rest_remaining_secs(), Some(60));
        session.complete_set(0, None, false).unwrap();
        assert!(session.active_rest().is_some());
        session.complete_set(0, None, false).unwrap();

        let values: Vec<_> = session.ledger().entries(0).iter().map(|s| s.value).collect();
        assert_eq!(values, vec![12, 10, 8]);
        assert_eq!(session.committed(0), 3);
        assert!(session.is_exercise_complete(0));
        assert!(session.active_rest().is_none());

        let events = session.poll();
        assert!(events.contains(&SessionEvent::AllSetsComplete));
        assert!(session.complete_set(0, None, false).is_err());
    }

    #[test]
    fn test_value_priority() {
        let h = Harness::new();
        let mut session = h.session(single_exercise_block(&[12, 10], 0));

        // Override beats staged
        session.stage_value(0, "15").unwrap();
        assert_eq!(session.complete_set(0, Some(20), true).unwrap().value, 20);
        // Staged default advanced to the configured next position
        assert_eq!(session.staged_value(0), Some(10));

        // No configuration at all falls back to the constant
        let mut block = single_exercise_block(&[], 0);
        block.exercises[0].config.target_sets = Some(2);
        let mut session = h.session(block);
        assert_eq!(session.complete_set(0, None, true).unwrap().value, 10);
        session.stage_value(0, "7 reps").unwrap();
        assert_eq!(session.complete_set(0, None, true).unwrap().value, 7);
    }

    #[test]
    fn test_weight_carries_forward() {
        let h = Harness::new();
        let mut session = h.session(single_exercise_block(&[5, 5, 5], 0));

        assert_eq!(session.complete_set(0, None, true).unwrap().weight, 0.0);
        session.stage_weight(0, "82,5").unwrap();
        assert_eq!(session.complete_set(0, None, true).unwrap().weight, 82.5);
        assert_eq!(session.staged_weight(0), Some(82.5));

        session.stage_weight(0, "").unwrap();
        session.update_set_result(0, 1, SetField::Weight, "85").unwrap();
        // Falls back to the last used weight
        assert_eq!(session.complete_set(0, None, true).unwrap().weight, 85.0);
    }

    #[test]
    fn test_undo_is_strict_inverse_of_tail() {
        let h = Harness::new();
        let mut session = h.session(single_exercise_block(&[12, 10, 8], 0));
        session.complete_set(0, None, true).unwrap();
        let before_count = session.committed(0);
        let before_entries = session.ledger().total_entries();

        let entry = session.complete_set(0, None, true).unwrap();
        session.edit_set(0, entry.set_index).unwrap();
        let removed = session.uncomplete_set(0, entry.set_index).unwrap();

        assert_eq!(removed, entry);
        assert_eq!(session.committed(0), before_count);
        assert_eq!(session.ledger().total_entries(), before_entries);
        assert_eq!(session.staged_value(0), Some(10));
        assert_eq!(session.editing(), None);
    }

    #[test]
    fn test_undo_requires_editing_the_tail() {
        let h = Harness::new();
        let mut session = h.session(single_exercise_block(&[12, 10, 8], 0));
        session.complete_set(0, None, true).unwrap();
        session.complete_set(0, None, true).unwrap();

        assert!(session.uncomplete_set(0, 1).is_err());
        session.edit_set(0, 0).unwrap();
        assert!(session.uncomplete_set(0, 0).is_err());
        assert_eq!(session.committed(0), 2);
    }

    #[test]
    fn test_edit_changes_value_not_count() {
        let h = Harness::new();
        let mut session = h.session(single_exercise_block(&[12, 10, 8], 0));
        session.complete_set(0, None, true).unwrap();
        session.edit_set(0, 0).unwrap();
        session.update_set_result(0, 0, SetField::Value, "11").unwrap();
        session.close_edit();

        assert_eq!(session.ledger().get(0, 0).unwrap().value, 11);
        assert_eq!(session.committed(0), 1);
        assert!(session.update_set_result(0, 5, SetField::Value, "1").is_err());
    }

    #[test]
    fn test_complete_round_commits_group_and_rests() {
        let h = Harness::new();
        let mut session = h.session(demo_block("demo_freeform_pyramid").unwrap());
        session.stage_weight(1, "30").unwrap();

        let entries = session.complete_round("a", None).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].weight, 30.0);
        assert_eq!(session.committed(0), 0);
        assert_eq!(session.committed(1), 1);
        assert_eq!(session.committed(2), 1);

        let rest = session.active_rest().unwrap();
        assert!(rest.is_round_rest());
        assert_eq!(session.rest_remaining_secs(), Some(90));

        // Override, and a single-exercise rest is superseded
        session.complete_set(0, None, false).unwrap();
        assert!(!session.active_rest().unwrap().is_round_rest());
        session.complete_round("a", Some(30)).unwrap();
        assert_eq!(session.rest_remaining_secs(), Some(30));

        // Final round: no rest after it
        session.complete_round("a", None).unwrap();
        assert!(session.active_rest().is_none());
        assert!(session.complete_round("a", None).is_err());
        assert!(session.complete_round("zzz", None).is_err());
    }

    #[test]
    fn test_round_skips_finished_members() {
        let h = Harness::new();
        let mut session = h.session(demo_block("demo_freeform_pyramid").unwrap());
        for _ in 0..3 {
            session.complete_set(1, None, true).unwrap();
        }
        let entries = session.complete_round("a", None).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].exercise_index, 2);
    }

    #[test]
    fn test_rest_expiry_plays_success() {
        let h = Harness::new();
        let mut session = h.session(single_exercise_block(&[5, 5], 45));
        session.complete_set(0, None, false).unwrap();

        h.time.advance_secs(44);
        assert!(session.poll().is_empty());
        h.time.advance_secs(1);
        assert_eq!(session.poll(), vec![SessionEvent::RestFinished]);
        assert_eq!(h.cues.count(Cue::Success), 1);
    }

    #[test]
    fn test_skip_rest() {
        let h = Harness::new();
        let mut session = h.session(single_exercise_block(&[5, 5], 45));
        session.complete_set(0, None, false).unwrap();
        assert!(session.skip_rest());
        assert!(session.active_rest().is_none());

        session.complete_set(0, None, true).unwrap();
        assert!(session.active_rest().is_none());
    }

    #[test]
    fn test_work_timer_runs_alongside_rest() {
        let h = Harness::new();
        let mut block = single_exercise_block(&[30, 30], 60);
        block.exercises[0].config.volume_type = VolumeType::Time;
        let mut session = h.session(block);

        session.complete_set(0, None, false).unwrap();
        assert!(session.toggle_work_timer(0).unwrap());
        assert_eq!(session.work_timer_remaining_secs(0), Some(30));
        assert!(session.active_rest().is_some());

        h.time.advance_secs(30);
        assert_eq!(session.poll(), vec![SessionEvent::WorkTimerFinished(0)]);

        assert!(session.toggle_work_timer(0).unwrap());
        assert!(!session.toggle_work_timer(0).unwrap());
        assert_eq!(session.work_timer_remaining_secs(0), None);
    }

    #[test]
    fn test_work_timer_needs_time_exercise() {
        let h = Harness::new();
        let mut session = h.session(single_exercise_block(&[5], 0));
        assert!(matches!(session.toggle_work_timer(0), Err(Error::Action(_))));
    }

    #[test]
    fn test_reps_completion_pauses_once() {
        let h = Harness::new();
        let mut session = h.session(demo_block("demo_reps_100").unwrap());
        session.start().unwrap();
        h.time.advance_secs(95);

        session.add_count(0, 50).unwrap();
        session.add_count(1, 49).unwrap();
        assert!(session.clock().is_running());
        session.add_count(1, 1).unwrap();
        assert!(!session.clock().is_running());

        assert_eq!(session.poll(), vec![SessionEvent::TargetsMet]);
        session.add_count(1, 5).unwrap();
        assert!(session.poll().is_empty());
        assert_eq!(h.cues.count(Cue::Success), 1);
        assert!(session.completion_check().all_targets_met);
    }

    #[test]
    fn test_counts_saturate_and_sanitize() {
        let h = Harness::new();
        let mut session = h.session(demo_block("demo_reps_100").unwrap());
        assert_eq!(session.add_count(0, -3).unwrap(), 0);
        assert_eq!(session.set_count(0, "2a5").unwrap(), 25);
        assert!(session.add_count(9, 1).is_err());
    }

    #[test]
    fn test_time_block_cannot_restart_after_zero() {
        let h = Harness::new();
        let mut session = h.session(demo_block("demo_time_amrap").unwrap());
        session.start().unwrap();
        h.time.advance_secs(700);
        assert_eq!(session.poll(), vec![SessionEvent::CountdownFinished]);
        assert!(matches!(session.start(), Err(Error::Action(_))));
        assert!(session.completion_check().has_time);
    }

    #[test]
    fn test_emom_result_uses_success_rounds() {
        let h = Harness::new();
        let mut session = h.session(demo_block("demo_emom_5").unwrap());
        session.start().unwrap();
        h.time.advance_secs(300);
        session.poll();

        for round in 1..=3 {
            session
                .set_round_outcome(round, Some(RoundOutcome::Success))
                .unwrap();
        }
        for round in 4..=5 {
            session
                .set_round_outcome(round, Some(RoundOutcome::Fail))
                .unwrap();
        }
        // Manually counted reps are overridden
        session.add_count(0, 37).unwrap();

        let result = session.finish(false).into_result().unwrap();
        assert_eq!(result.reps_or_volume_per_exercise, vec![24]);
        assert_eq!(result.emom_round_outcomes.len(), 5);
        assert_eq!(result.elapsed_seconds, 300);
        assert_eq!(result.protocol, Protocol::Emom);
    }

    #[test]
    fn test_empty_finish_needs_confirmation() {
        let h = Harness::new();
        let session = h.session(demo_block("demo_emom_5").unwrap());

        let session = match session.finish(false) {
            FinishOutcome::NeedsConfirmation(session) => session,
            FinishOutcome::Completed(_) => panic!("Expected a confirmation request"),
        };
        assert!(session.completion_check().is_empty());

        let result = session.finish(true).into_result().unwrap();
        assert_eq!(result.reps_or_volume_per_exercise, vec![0]);
        assert_eq!(result.user_id, "u1");
    }

    #[test]
    fn test_freeform_result_snapshot() {
        let h = Harness::new();
        let mut session = h.session(demo_block("demo_freeform_pyramid").unwrap());
        session.stage_weight(0, "100").unwrap();
        session.complete_set(0, None, true).unwrap();
        session.complete_round("a", None).unwrap();
        session.set_notes("felt strong");

        let result = session.finish(false).into_result().unwrap();
        assert_eq!(result.reps_or_volume_per_exercise, vec![12, 10, 15]);
        assert_eq!(result.actual_weights[0], Some(100.0));
        assert_eq!(result.actual_weights[2], None);
        assert_eq!(result.set_ledger[1].len(), 1);
        assert_eq!(result.exercise_ids, vec!["back_squat", "db_row", "pushup"]);
        assert_eq!(result.notes.as_deref(), Some("felt strong"));
        assert!(result.emom_round_outcomes.is_empty());
    }

    #[test]
    fn test_recommendations_prefill_and_cache() {
        let h = Harness::new();
        let mut session = h.session(demo_block("demo_freeform_pyramid").unwrap());
        session.stage_weight(1, "22").unwrap();

        let low = Recommendation {
            weight: 40.0,
            source: RecommendationSource::Context {
                matched: ContextMatch::Any,
                label: "reps · warmup".into(),
            },
            adjustment: None,
        };
        // Late, partial resolution
        session.complete_set(0, None, true).unwrap();
        session.attach_recommendations(vec![Some(high(100.0)), Some(high(30.0)), None]);
        session.attach_recommendation(0, high(999.0));

        assert_eq!(session.recommendation(0).unwrap().weight, 100.0);
        assert_eq!(session.staged_weight(0), Some(100.0));
        // The user's own entry is not overwritten
        assert_eq!(session.staged_weight(1), Some(22.0));

        session.attach_recommendation(2, low);
        assert!(session.recommendation(2).is_some());
        assert_eq!(session.staged_weight(2), None);
    }

    #[test]
    fn test_emom_result_saturates_on_huge_targets() {
        let h = Harness::new();
        let mut block = demo_block("demo_emom_5").unwrap();
        block.exercises[0].target_reps = Some(2_000_000_000);
        assert!(block.validate().is_empty());

        let mut session = h.session(block);
        for round in 1..=3 {
            session
                .set_round_outcome(round, Some(RoundOutcome::Success))
                .unwrap();
        }
        let result = session.finish(true).into_result().unwrap();
        assert_eq!(result.reps_or_volume_per_exercise, vec![u32::MAX]);
    }

    #[test]
    fn test_no_round_rest_after_final_round() {
        let h = Harness::new();
        let mut block = demo_block("demo_freeform_pyramid").unwrap();
        for i in [1, 2] {
            block.exercises[i].config.target_sets = Some(2);
        }
        let mut session = h.session(block);

        session.complete_round("a", None).unwrap();
        assert!(session.active_rest().unwrap().is_round_rest());

        // The round that completes the group ends the running rest
        session.complete_round("a", None).unwrap();
        assert!(session.is_exercise_complete(1));
        assert!(session.is_exercise_complete(2));
        assert!(session.active_rest().is_none());
        assert!(session.poll().is_empty());
    }

    #[test]
    fn test_emom_outcomes_rejected_elsewhere() {
        let h = Harness::new();
        let mut session = h.session(demo_block("demo_freeform_pyramid").unwrap());
        assert!(session.toggle_round_outcome(1).is_err());
    }
}
