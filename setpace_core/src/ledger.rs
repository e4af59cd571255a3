//! Set ledger and staged inputs.
//!
//! The ledger is the committed record: per exercise, entries are indexed
//! contiguously from zero and only the tail can be removed. Staged inputs
//! are the editable "next set" values and live in their own maps; neither
//! layer is ever derived from the other.

use crate::{Error, Result, SetEntry};
use chrono::Utc;
use std::collections::HashMap;

/// Position of one ledger entry
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SetRef {
    pub exercise_index: usize,
    pub set_index: usize,
}

/// Append-only per-exercise record of committed sets
#[derive(Clone, Debug, Default)]
pub struct SetLedger {
    entries: Vec<Vec<SetEntry>>,
    editing: Option<SetRef>,
}

impl SetLedger {
    pub fn new(exercise_count: usize) -> Self {
        Self {
            entries: vec![Vec::new(); exercise_count],
            editing: None,
        }
    }

    fn sets(&self, exercise_index: usize) -> Result<&Vec<SetEntry>> {
        self.entries
            .get(exercise_index)
            .ok_or_else(|| Error::Action(format!("No exercise at index {}", exercise_index)))
    }

    fn entry_mut(&mut self, exercise_index: usize, set_index: usize) -> Result<&mut SetEntry> {
        self.entries
            .get_mut(exercise_index)
            .and_then(|sets| sets.get_mut(set_index))
            .ok_or_else(|| {
                Error::Action(format!(
                    "No committed set {} for exercise {}",
                    set_index, exercise_index
                ))
            })
    }

    pub fn committed(&self, exercise_index: usize) -> usize {
        self.entries.get(exercise_index).map_or(0, Vec::len)
    }

    pub fn entries(&self, exercise_index: usize) -> &[SetEntry] {
        self.entries
            .get(exercise_index)
            .map_or(&[], |sets| sets.as_slice())
    }

    pub fn get(&self, exercise_index: usize, set_index: usize) -> Option<&SetEntry> {
        self.entries(exercise_index).get(set_index)
    }

    pub fn total_entries(&self) -> usize {
        self.entries.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.total_entries() == 0
    }

    /// Weight of the most recent committed set of an exercise
    pub fn last_weight(&self, exercise_index: usize) -> Option<f64> {
        self.entries(exercise_index).last().map(|s| s.weight)
    }

    /// Sum of committed values for an exercise
    pub fn volume(&self, exercise_index: usize) -> u32 {
        self.entries(exercise_index)
            .iter()
            .fold(0u32, |acc, s| acc.saturating_add(s.value))
    }

    pub fn snapshot(&self) -> Vec<Vec<SetEntry>> {
        self.entries.clone()
    }

    /// Commit a set at the next position for the exercise.
    pub fn append(&mut self, exercise_index: usize, value: u32, weight: f64) -> Result<SetEntry> {
        self.sets(exercise_index)?;
        let sets = &mut self.entries[exercise_index];
        let entry = SetEntry {
            exercise_index,
            set_index: sets.len(),
            value,
            weight,
            timestamp: Utc::now(),
        };
        sets.push(entry.clone());
        tracing::debug!(
            "Committed set {} of exercise {}: {} @ {}",
            entry.set_index,
            exercise_index,
            value,
            weight
        );
        Ok(entry)
    }

    pub fn editing(&self) -> Option<SetRef> {
        self.editing
    }

    /// Open one committed entry for editing; replaces any open edit.
    pub fn begin_edit(&mut self, exercise_index: usize, set_index: usize) -> Result<()> {
        self.entry_mut(exercise_index, set_index)?;
        self.editing = Some(SetRef {
            exercise_index,
            set_index,
        });
        Ok(())
    }

    pub fn close_edit(&mut self) {
        self.editing = None;
    }

    pub fn set_value(&mut self, exercise_index: usize, set_index: usize, value: u32) -> Result<()> {
        self.entry_mut(exercise_index, set_index)?.value = value;
        Ok(())
    }

    pub fn set_weight(&mut self, exercise_index: usize, set_index: usize, weight: f64) -> Result<()> {
        self.entry_mut(exercise_index, set_index)?.weight = weight;
        Ok(())
    }

    /// Remove the tail entry of an exercise. Only the entry currently open
    /// for editing can be removed.
    pub fn remove_tail(&mut self, exercise_index: usize, set_index: usize) -> Result<SetEntry> {
        let target = SetRef {
            exercise_index,
            set_index,
        };
        if self.editing != Some(target) {
            return Err(Error::Action(format!(
                "Set {} of exercise {} is not being edited",
                set_index, exercise_index
            )));
        }

        let sets = self.sets(exercise_index)?;
        if set_index + 1 != sets.len() {
            return Err(Error::Action(format!(
                "Only the last set of exercise {} can be removed",
                exercise_index
            )));
        }

        self.editing = None;
        let removed = self.entries[exercise_index]
            .pop()
            .ok_or_else(|| Error::Action("Nothing to remove".into()))?;
        tracing::debug!(
            "Removed set {} of exercise {}",
            removed.set_index,
            exercise_index
        );
        Ok(removed)
    }
}

/// Editable "about to commit" values, kept apart from the ledger
#[derive(Clone, Debug, Default)]
pub struct StagedInputs {
    values: HashMap<usize, u32>,
    weights: HashMap<usize, f64>,
}

impl StagedInputs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn value(&self, exercise_index: usize) -> Option<u32> {
        self.values.get(&exercise_index).copied()
    }

    pub fn weight(&self, exercise_index: usize) -> Option<f64> {
        self.weights.get(&exercise_index).copied()
    }

    pub fn set_value(&mut self, exercise_index: usize, value: Option<u32>) {
        match value {
            Some(v) => {
                self.values.insert(exercise_index, v);
            }
            None => {
                self.values.remove(&exercise_index);
            }
        }
    }

    pub fn set_weight(&mut self, exercise_index: usize, weight: Option<f64>) {
        match weight {
            Some(w) => {
                self.weights.insert(exercise_index, w);
            }
            None => {
                self.weights.remove(&exercise_index);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_indexes_contiguously() {
        let mut ledger = SetLedger::new(2);
        ledger.append(0, 12, 40.0).unwrap();
        ledger.append(0, 10, 42.5).unwrap();
        ledger.append(1, 8, 0.0).unwrap();

        let indices: Vec<_> = ledger.entries(0).iter().map(|s| s.set_index).collect();
        assert_eq!(indices, vec![0, 1]);
        assert_eq!(ledger.committed(1), 1);
        assert_eq!(ledger.total_entries(), 3);
        assert_eq!(ledger.volume(0), 22);
        assert_eq!(ledger.last_weight(0), Some(42.5));
    }

    #[test]
    fn test_append_unknown_exercise_is_rejected() {
        let mut ledger = SetLedger::new(1);
        assert!(matches!(ledger.append(3, 5, 0.0), Err(Error::Action(_))));
        assert!(ledger.is_empty());
    }

    #[test]
    fn test_remove_requires_edit_mode() {
        let mut ledger = SetLedger::new(1);
        ledger.append(0, 5, 20.0).unwrap();

        assert!(ledger.remove_tail(0, 0).is_err());
        assert_eq!(ledger.committed(0), 1);

        ledger.begin_edit(0, 0).unwrap();
        let removed = ledger.remove_tail(0, 0).unwrap();
        assert_eq!(removed.value, 5);
        assert_eq!(ledger.committed(0), 0);
        assert_eq!(ledger.editing(), None);
    }

    #[test]
    fn test_remove_only_tail() {
        let mut ledger = SetLedger::new(1);
        ledger.append(0, 5, 20.0).unwrap();
        ledger.append(0, 4, 20.0).unwrap();

        ledger.begin_edit(0, 0).unwrap();
        assert!(ledger.remove_tail(0, 0).is_err());
        assert_eq!(ledger.committed(0), 2);
    }

    #[test]
    fn test_edit_in_place_keeps_count() {
        let mut ledger = SetLedger::new(1);
        ledger.append(0, 5, 20.0).unwrap();
        ledger.begin_edit(0, 0).unwrap();
        ledger.set_value(0, 0, 6).unwrap();
        ledger.set_weight(0, 0, 22.5).unwrap();

        let entry = ledger.get(0, 0).unwrap();
        assert_eq!((entry.value, entry.weight, entry.set_index), (6, 22.5, 0));
        assert_eq!(ledger.committed(0), 1);

        assert!(ledger.begin_edit(0, 4).is_err());
        assert_eq!(ledger.editing().map(|r| r.set_index), Some(0));
    }

    #[test]
    fn test_staged_maps_are_independent() {
        let mut staged = StagedInputs::new();
        staged.set_value(0, Some(10));
        staged.set_weight(0, Some(60.0));
        staged.set_value(0, None);

        assert_eq!(staged.value(0), None);
        assert_eq!(staged.weight(0), Some(60.0));
        assert_eq!(staged.weight(1), None);
    }
}
