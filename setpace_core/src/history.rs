//! Previous-weight resolution.
//!
//! For each loadable exercise the resolver walks a fixed priority order and
//! stops at the first hit:
//!
//! 1. the last weight of the exercise's per-set series in the previous log
//!    of the same block, with any matching coach adjustment applied
//! 2. the previous log's single actual weight, with the same adjustment
//! 3. a cross-session lookup by exercise id, preferring the exact
//!    protocol/block-type context over any other
//! 4. nothing: no recommendation, and the weight input starts empty
//!
//! Collaborator failures are logged and treated as "nothing found".

use crate::{Block, ContextMatch, ContextWeight, Exercise, LookupContext, PreviousLog, Result};

/// Source of historical data
pub trait HistoryStore {
    /// The immediately previous logged execution of a block
    fn last_log(&self, user_id: &str, block_id: &str) -> Result<Option<PreviousLog>>;

    /// Most recent weight for an exercise across sessions
    fn last_weight_by_context(
        &self,
        user_id: &str,
        exercise_id: &str,
        context: &LookupContext,
    ) -> Result<Option<ContextWeight>>;
}

/// Where a recommendation came from
#[derive(Clone, Debug, PartialEq)]
pub enum RecommendationSource {
    PreviousSeries,
    PreviousActual,
    Context {
        matched: ContextMatch,
        label: String,
    },
}

/// Confidence tier shown next to a recommendation
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Confidence {
    Low,
    High,
}

/// A suggested starting weight for one exercise
#[derive(Clone, Debug, PartialEq)]
pub struct Recommendation {
    pub weight: f64,
    pub source: RecommendationSource,
    /// Coach adjustment applied to the previous value, if any
    pub adjustment: Option<f64>,
}

impl Recommendation {
    pub fn confidence(&self) -> Confidence {
        match self.source {
            RecommendationSource::Context {
                matched: ContextMatch::Any,
                ..
            } => Confidence::Low,
            _ => Confidence::High,
        }
    }
}

/// Resolves recommendations for a block against a [`HistoryStore`]
pub struct HistoryResolver<'a, S: HistoryStore + ?Sized> {
    store: &'a S,
    user_id: &'a str,
}

impl<'a, S: HistoryStore + ?Sized> HistoryResolver<'a, S> {
    pub fn new(store: &'a S, user_id: &'a str) -> Self {
        Self { store, user_id }
    }

    /// Resolve every exercise of a block. One entry per exercise, `None`
    /// where nothing was found or the exercise is not loadable.
    pub fn resolve_block(&self, block: &Block) -> Vec<Option<Recommendation>> {
        let previous = match self.store.last_log(self.user_id, &block.id) {
            Ok(log) => log,
            Err(e) => {
                tracing::warn!(
                    "Previous log for block {} unavailable: {}. Continuing without it.",
                    block.id,
                    e
                );
                None
            }
        };

        let context = block.lookup_context();
        block
            .exercises
            .iter()
            .enumerate()
            .map(|(index, exercise)| {
                self.resolve_exercise(block, index, exercise, previous.as_ref(), &context)
            })
            .collect()
    }

    fn resolve_exercise(
        &self,
        block: &Block,
        index: usize,
        exercise: &Exercise,
        previous: Option<&PreviousLog>,
        context: &LookupContext,
    ) -> Option<Recommendation> {
        if !exercise.loadable {
            return None;
        }

        if let Some(log) = previous {
            if let Some(rec) = from_previous_log(log, &block.id, index, &exercise.id) {
                tracing::debug!(
                    "Exercise {}: {:?} from previous log",
                    exercise.id,
                    rec.source
                );
                return Some(rec);
            }
        }

        match self
            .store
            .last_weight_by_context(self.user_id, &exercise.id, context)
        {
            Ok(Some(found)) if found.weight > 0.0 => {
                tracing::debug!(
                    "Exercise {}: {:?} context match ({})",
                    exercise.id,
                    found.matched,
                    found.context_label
                );
                Some(Recommendation {
                    weight: found.weight,
                    source: RecommendationSource::Context {
                        matched: found.matched,
                        label: found.context_label,
                    },
                    adjustment: None,
                })
            }
            Ok(_) => None,
            Err(e) => {
                tracing::warn!(
                    "Weight lookup for {} failed: {}. No recommendation.",
                    exercise.id,
                    e
                );
                None
            }
        }
    }
}

/// Position of an exercise in a previous log: matched by id, or by index
/// for logs that never recorded exercise ids.
fn previous_index(log: &PreviousLog, index: usize, exercise_id: &str) -> Option<usize> {
    if log.exercise_ids.is_empty() {
        return Some(index);
    }
    log.exercise_ids.iter().position(|id| id == exercise_id)
}

fn from_previous_log(
    log: &PreviousLog,
    block_id: &str,
    index: usize,
    exercise_id: &str,
) -> Option<Recommendation> {
    let prev = previous_index(log, index, exercise_id)?;
    let adjustment = log
        .analysis
        .iter()
        .find(|a| a.applies_to(block_id, exercise_id, index));

    let candidates = [
        (
            RecommendationSource::PreviousSeries,
            log.results
                .series_weights
                .get(prev)
                .and_then(|series| series.last().copied()),
        ),
        (
            RecommendationSource::PreviousActual,
            log.results.actual_weights.get(prev).copied().flatten(),
        ),
    ];

    candidates
        .into_iter()
        .find_map(|(source, weight)| weight.filter(|w| *w > 0.0).map(|w| (source, w)))
        .map(|(source, weight)| Recommendation {
            weight: adjustment.map_or(weight, |a| a.apply(weight)),
            source,
            adjustment: adjustment.map(|a| a.adjustment),
        })
}
