//! File-backed history store.
//!
//! Answers history lookups from the results JSONL written by
//! [`JsonlSink`](crate::sink::JsonlSink) plus an optional coach adjustments
//! file (a JSON array of [`Adjustment`]).

use crate::history::HistoryStore;
use crate::{
    Adjustment, BlockResult, ContextMatch, ContextWeight, LookupContext, PreviousLog, Result,
};
use std::path::{Path, PathBuf};

pub struct FileHistoryStore {
    results_path: PathBuf,
    adjustments_path: PathBuf,
}

impl FileHistoryStore {
    pub fn new(results_path: impl Into<PathBuf>, adjustments_path: impl Into<PathBuf>) -> Self {
        Self {
            results_path: results_path.into(),
            adjustments_path: adjustments_path.into(),
        }
    }

    /// Results of one user, newest first
    fn results_for(&self, user_id: &str) -> Result<Vec<BlockResult>> {
        let mut results: Vec<_> = crate::sink::read_results(&self.results_path)?
            .into_iter()
            .filter(|r| r.user_id == user_id)
            .collect();
        results.sort_by(|a, b| b.completed_at.cmp(&a.completed_at));
        Ok(results)
    }
}

/// Load coach adjustments. A missing or unreadable file means no adjustments.
pub fn load_adjustments(path: &Path) -> Vec<Adjustment> {
    if !path.exists() {
        return Vec::new();
    }

    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) => {
            tracing::warn!(
                "Failed to read adjustments at {:?}: {}. Ignoring them.",
                path,
                e
            );
            return Vec::new();
        }
    };

    match serde_json::from_str::<Vec<Adjustment>>(&contents) {
        Ok(adjustments) => adjustments,
        Err(e) => {
            tracing::warn!(
                "Failed to parse adjustments at {:?}: {}. Ignoring them.",
                path,
                e
            );
            Vec::new()
        }
    }
}

impl HistoryStore for FileHistoryStore {
    fn last_log(&self, user_id: &str, block_id: &str) -> Result<Option<PreviousLog>> {
        let results = self.results_for(user_id)?;
        let Some(last) = results.iter().find(|r| r.block_id == block_id) else {
            tracing::debug!("No previous log for block {}", block_id);
            return Ok(None);
        };

        let mut log = PreviousLog::from(last);
        log.analysis = load_adjustments(&self.adjustments_path)
            .into_iter()
            .filter(|a| a.module_id == block_id)
            .collect();
        Ok(Some(log))
    }

    fn last_weight_by_context(
        &self,
        user_id: &str,
        exercise_id: &str,
        context: &LookupContext,
    ) -> Result<Option<ContextWeight>> {
        let mut fallback: Option<ContextWeight> = None;

        for result in self.results_for(user_id)? {
            let Some(index) = result.exercise_ids.iter().position(|id| id == exercise_id) else {
                continue;
            };
            let Some(weight) = result.last_weight_for(index) else {
                continue;
            };

            let found = LookupContext {
                protocol: result.protocol,
                block_type: result.block_type.clone(),
            };
            if &found == context {
                return Ok(Some(ContextWeight {
                    weight,
                    matched: ContextMatch::Exact,
                    context_label: found.label(),
                }));
            }
            if fallback.is_none() {
                fallback = Some(ContextWeight {
                    weight,
                    matched: ContextMatch::Any,
                    context_label: found.label(),
                });
            }
        }

        Ok(fallback)
    }
}
