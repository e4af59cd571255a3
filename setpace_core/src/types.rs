//! Core domain types for Setpace.
//!
//! This module defines the fundamental types used throughout the system:
//! - Blocks, exercises and their set prescriptions
//! - Ledger entries and EMOM round outcomes
//! - Previous logs and coach adjustments read from history
//! - The block result emitted when a block is finished

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// ============================================================================
// Protocol and Block Types
// ============================================================================

/// Pacing/completion rule-set of a block.
///
/// Parsing is case-insensitive and anything unrecognised becomes
/// [`Protocol::Freeform`], the most permissive variant.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase", from = "String")]
pub enum Protocol {
    Reps,
    Time,
    Emom,
    Freeform,
}

impl Protocol {
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "reps" => Protocol::Reps,
            "time" => Protocol::Time,
            "emom" => Protocol::Emom,
            "freeform" => Protocol::Freeform,
            other => {
                tracing::debug!("Unknown protocol {:?}, using freeform", other);
                Protocol::Freeform
            }
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Reps => "reps",
            Protocol::Time => "time",
            Protocol::Emom => "emom",
            Protocol::Freeform => "freeform",
        }
    }
}

impl From<String> for Protocol {
    fn from(s: String) -> Self {
        Protocol::parse(&s)
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Category of a block within a session
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(from = "String", into = "String")]
pub enum BlockType {
    Warmup,
    #[default]
    Strength,
    Accessory,
    Conditioning,
    Other(String),
}

impl BlockType {
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "warmup" | "warm_up" | "warm-up" => BlockType::Warmup,
            "strength" => BlockType::Strength,
            "accessory" => BlockType::Accessory,
            "conditioning" | "metcon" => BlockType::Conditioning,
            other => BlockType::Other(other.to_string()),
        }
    }

    pub fn label(&self) -> &str {
        match self {
            BlockType::Warmup => "warmup",
            BlockType::Strength => "strength",
            BlockType::Accessory => "accessory",
            BlockType::Conditioning => "conditioning",
            BlockType::Other(label) => label,
        }
    }
}

impl From<String> for BlockType {
    fn from(s: String) -> Self {
        BlockType::parse(&s)
    }
}

impl From<BlockType> for String {
    fn from(t: BlockType) -> Self {
        t.label().to_string()
    }
}

impl fmt::Display for BlockType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// What a set's value measures
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum VolumeType {
    #[default]
    Reps,
    Time,
    Distance,
}

/// One configured set of an exercise
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct SetSpec {
    pub value: u32,
    #[serde(default)]
    pub intensity: Option<String>,
    #[serde(default)]
    pub rest: Option<u32>,
}

/// Per-exercise set configuration
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Default)]
pub struct ExerciseConfig {
    #[serde(default)]
    pub volume_type: VolumeType,
    #[serde(default)]
    pub sets: Vec<SetSpec>,
    /// Number of sets to commit; defaults to the number of configured sets
    #[serde(default)]
    pub target_sets: Option<u32>,
    /// Rest used when a set spec carries no rest of its own
    #[serde(default)]
    pub rest_seconds: Option<u32>,
}

/// An exercise inside a block
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Exercise {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub loadable: bool,
    #[serde(default)]
    pub quality_tag: Option<String>,
    #[serde(default)]
    pub config: ExerciseConfig,
    #[serde(default, alias = "targetReps")]
    pub target_reps: Option<u32>,
    /// Superset/circuit this exercise belongs to
    #[serde(default)]
    pub group: Option<String>,
}

impl Exercise {
    /// Fixed number of sets the ledger must reach for this exercise.
    pub fn target_set_count(&self) -> usize {
        let configured = self.config.sets.len() as u32;
        self.config.target_sets.unwrap_or(configured).max(1) as usize
    }

    /// Configured set at a position; the last one repeats past the end.
    fn set_spec_at(&self, set_index: usize) -> Option<&SetSpec> {
        let sets = &self.config.sets;
        sets.get(set_index).or_else(|| sets.last())
    }

    /// Configured target value for a set position (pyramids read positionally).
    pub fn set_value_at(&self, set_index: usize) -> Option<u32> {
        self.set_spec_at(set_index).map(|s| s.value)
    }

    /// Rest after completing the set at `set_index`, zero when none is configured.
    pub fn rest_after(&self, set_index: usize) -> u32 {
        self.set_spec_at(set_index)
            .and_then(|s| s.rest)
            .or(self.config.rest_seconds)
            .unwrap_or(0)
    }

    /// Counted-value target for REPS blocks.
    pub fn rep_target(&self) -> u32 {
        self.target_reps.unwrap_or_else(|| {
            (0..self.target_set_count())
                .filter_map(|i| self.set_value_at(i))
                .fold(0, u32::saturating_add)
        })
    }

    /// Reps expected in each EMOM round.
    pub fn per_round_target(&self) -> u32 {
        self.target_reps
            .or_else(|| self.set_value_at(0))
            .unwrap_or(0)
    }
}

/// Block-level targets
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Default)]
pub struct Targeting {
    /// Explicit overall volume, overriding the per-exercise sum
    #[serde(default)]
    pub volume: Option<u32>,
    #[serde(default)]
    pub metric: Option<String>,
    #[serde(default, alias = "timeCap")]
    pub time_cap: Option<u32>,
    #[serde(default)]
    pub intensity: Option<String>,
}

/// EMOM-specific parameters
/// Longest EMOM a block may configure (one day)
pub const MAX_EMOM_MINUTES: u32 = 24 * 60;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct EmomParams {
    #[serde(alias = "durationMinutes")]
    pub duration_minutes: u32,
}

/// One schedulable unit of work. Immutable during execution.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Block {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(alias = "protocolType")]
    pub protocol: Protocol,
    #[serde(default)]
    pub block_type: BlockType,
    pub exercises: Vec<Exercise>,
    #[serde(default)]
    pub targeting: Targeting,
    #[serde(default, alias = "emomParams")]
    pub emom: Option<EmomParams>,
    /// Coach-configured rest after a grouped round
    #[serde(default)]
    pub round_rest_seconds: Option<u32>,
}

impl Block {
    /// Indices of the exercises belonging to a group, in block order.
    pub fn group_members(&self, group: &str) -> Vec<usize> {
        self.exercises
            .iter()
            .enumerate()
            .filter(|(_, e)| e.group.as_deref() == Some(group))
            .map(|(i, _)| i)
            .collect()
    }

    /// Configured EMOM length in minutes (one round per minute)
    pub fn emom_rounds(&self) -> u32 {
        self.emom.as_ref().map(|p| p.duration_minutes).unwrap_or(0)
    }

    pub fn lookup_context(&self) -> LookupContext {
        LookupContext {
            protocol: self.protocol,
            block_type: self.block_type.clone(),
        }
    }
}

// ============================================================================
// Execution Types
// ============================================================================

/// A committed set in the ledger
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct SetEntry {
    pub exercise_index: usize,
    pub set_index: usize,
    /// Reps, seconds or meters depending on the exercise's volume type
    pub value: u32,
    pub weight: f64,
    pub timestamp: DateTime<Utc>,
}

/// Manual classification of an EMOM round
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RoundOutcome {
    Success,
    Fail,
}

/// Editable field of a committed set
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SetField {
    Value,
    Weight,
}

// ============================================================================
// History Types
// ============================================================================

/// How a coach adjustment is applied to a previous weight
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum AdjustmentKind {
    /// Add the adjustment in load units
    #[default]
    Absolute,
    /// Scale by `adjustment` percent
    Percent,
}

/// Coach analysis entry attached to a previous log
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Adjustment {
    #[serde(alias = "moduleId")]
    pub module_id: String,
    #[serde(default, alias = "exerciseId")]
    pub exercise_id: Option<String>,
    /// Positional match, used only when no exercise id is given
    #[serde(default, alias = "exerciseIndex")]
    pub exercise_index: Option<usize>,
    pub adjustment: f64,
    #[serde(rename = "type", default)]
    pub kind: AdjustmentKind,
}

impl Adjustment {
    pub fn applies_to(&self, module_id: &str, exercise_id: &str, exercise_index: usize) -> bool {
        if self.module_id != module_id {
            return false;
        }
        match &self.exercise_id {
            Some(id) => id == exercise_id,
            None => self.exercise_index == Some(exercise_index),
        }
    }

    pub fn apply(&self, weight: f64) -> f64 {
        let adjusted = match self.kind {
            AdjustmentKind::Absolute => weight + self.adjustment,
            AdjustmentKind::Percent => weight * (1.0 + self.adjustment / 100.0),
        };
        (adjusted.max(0.0) * 100.0).round() / 100.0
    }
}

/// Recorded numbers of a previous execution
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Default)]
pub struct LoggedResults {
    #[serde(default)]
    pub actual_weights: Vec<Option<f64>>,
    #[serde(default)]
    pub actual_reps: Vec<u32>,
    /// Per-set weights for each exercise, in set order
    #[serde(default)]
    pub series_weights: Vec<Vec<f64>>,
    #[serde(default)]
    pub heart_rates: Vec<u32>,
}

/// The immediately previous logged execution of a block
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Default)]
pub struct PreviousLog {
    #[serde(default)]
    pub exercise_ids: Vec<String>,
    #[serde(default)]
    pub results: LoggedResults,
    #[serde(default)]
    pub analysis: Vec<Adjustment>,
}

/// Execution context used for cross-session weight lookups
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct LookupContext {
    pub protocol: Protocol,
    pub block_type: BlockType,
}

impl LookupContext {
    pub fn label(&self) -> String {
        format!("{} · {}", self.protocol, self.block_type)
    }
}

/// Whether a context lookup matched the exact protocol and block type
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ContextMatch {
    Exact,
    Any,
}

/// Answer of a cross-session weight lookup
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ContextWeight {
    pub weight: f64,
    #[serde(rename = "match")]
    pub matched: ContextMatch,
    pub context_label: String,
}

// ============================================================================
// Result Type
// ============================================================================

/// The record emitted once when a block is finished
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct BlockResult {
    pub id: Uuid,
    pub user_id: String,
    pub block_id: String,
    pub block_type: BlockType,
    pub protocol: Protocol,
    pub exercise_ids: Vec<String>,
    pub completed_at: DateTime<Utc>,
    pub reps_or_volume_per_exercise: Vec<u32>,
    pub actual_weights: Vec<Option<f64>>,
    pub set_ledger: Vec<Vec<SetEntry>>,
    #[serde(default)]
    pub emom_round_outcomes: Vec<Option<RoundOutcome>>,
    pub elapsed_seconds: u64,
    #[serde(default)]
    pub notes: Option<String>,
}

impl BlockResult {
    /// Last positive weight used for an exercise, from its sets or its actual weight.
    pub fn last_weight_for(&self, exercise_index: usize) -> Option<f64> {
        self.set_ledger
            .get(exercise_index)
            .and_then(|sets| sets.iter().rev().map(|s| s.weight).find(|w| *w > 0.0))
            .or_else(|| {
                self.actual_weights
                    .get(exercise_index)
                    .copied()
                    .flatten()
                    .filter(|w| *w > 0.0)
            })
    }
}

impl From<&BlockResult> for PreviousLog {
    fn from(result: &BlockResult) -> Self {
        PreviousLog {
            exercise_ids: result.exercise_ids.clone(),
            results: LoggedResults {
                actual_weights: result.actual_weights.clone(),
                actual_reps: result.reps_or_volume_per_exercise.clone(),
                series_weights: result
                    .set_ledger
                    .iter()
                    .map(|sets| sets.iter().map(|s| s.weight).collect())
                    .collect(),
                heart_rates: vec![],
            },
            analysis: vec![],
        }
    }
}
