//! Built-in demo blocks and block validation.
//!
//! The demo catalog gives one block per protocol so the runner can be tried
//! without authoring a plan file.

use crate::types::*;
use once_cell::sync::Lazy;
use std::collections::HashSet;

/// Cached demo catalog - built once and reused
static DEMO_BLOCKS: Lazy<Vec<Block>> = Lazy::new(build_demo_blocks);

/// All demo blocks, in display order
pub fn demo_blocks() -> &'static [Block] {
    &DEMO_BLOCKS
}

/// Look up a demo block by id
pub fn demo_block(id: &str) -> Option<Block> {
    DEMO_BLOCKS.iter().find(|b| b.id == id).cloned()
}

fn sets(values: &[u32], rest: Option<u32>) -> Vec<SetSpec> {
    values
        .iter()
        .map(|v| SetSpec {
            value: *v,
            intensity: None,
            rest,
        })
        .collect()
}

fn exercise(id: &str, name: &str, loadable: bool) -> Exercise {
    Exercise {
        id: id.into(),
        name: name.into(),
        loadable,
        quality_tag: None,
        config: ExerciseConfig::default(),
        target_reps: None,
        group: None,
    }
}

fn build_demo_blocks() -> Vec<Block> {
    vec![
        // ====================================================================
        // FREEFORM: squat pyramid, then a row/push-up superset
        // ====================================================================
        Block {
            id: "demo_freeform_pyramid".into(),
            name: "Squat pyramid + superset".into(),
            protocol: Protocol::Freeform,
            block_type: BlockType::Strength,
            exercises: vec![
                Exercise {
                    config: ExerciseConfig {
                        volume_type: VolumeType::Reps,
                        sets: sets(&[12, 10, 8], Some(60)),
                        target_sets: None,
                        rest_seconds: None,
                    },
                    ..exercise("back_squat", "Back Squat", true)
                },
                Exercise {
                    config: ExerciseConfig {
                        sets: sets(&[10, 10, 10], None),
                        ..ExerciseConfig::default()
                    },
                    group: Some("a".into()),
                    ..exercise("db_row", "Dumbbell Row", true)
                },
                Exercise {
                    config: ExerciseConfig {
                        sets: sets(&[15, 15, 15], None),
                        ..ExerciseConfig::default()
                    },
                    group: Some("a".into()),
                    ..exercise("pushup", "Push-up", false)
                },
            ],
            targeting: Targeting::default(),
            emom: None,
            round_rest_seconds: Some(90),
        },
        // ====================================================================
        // REPS: 100 reps for time, warmup cap
        // ====================================================================
        Block {
            id: "demo_reps_100".into(),
            name: "100 reps for time".into(),
            protocol: Protocol::Reps,
            block_type: BlockType::Warmup,
            exercises: vec![
                Exercise {
                    target_reps: Some(50),
                    ..exercise("pushup", "Push-up", false)
                },
                Exercise {
                    target_reps: Some(50),
                    ..exercise("air_squat", "Air Squat", false)
                },
            ],
            targeting: Targeting::default(),
            emom: None,
            round_rest_seconds: None,
        },
        // ====================================================================
        // TIME: 10 minute AMRAP
        // ====================================================================
        Block {
            id: "demo_time_amrap".into(),
            name: "10-min AMRAP".into(),
            protocol: Protocol::Time,
            block_type: BlockType::Conditioning,
            exercises: vec![
                exercise("burpee", "Burpee", false),
                exercise("kb_swing", "Kettlebell Swing", true),
            ],
            targeting: Targeting {
                time_cap: Some(600),
                ..Targeting::default()
            },
            emom: None,
            round_rest_seconds: None,
        },
        // ====================================================================
        // EMOM: 8 burpees every minute for 5 minutes
        // ====================================================================
        Block {
            id: "demo_emom_5".into(),
            name: "5-min EMOM: burpees".into(),
            protocol: Protocol::Emom,
            block_type: BlockType::Conditioning,
            exercises: vec![Exercise {
                target_reps: Some(8),
                ..exercise("burpee", "Burpee", false)
            }],
            targeting: Targeting::default(),
            emom: Some(EmomParams {
                duration_minutes: 5,
            }),
            round_rest_seconds: None,
        },
    ]
}

impl Block {
    /// Validate a block definition
    ///
    /// Returns a list of problems; empty when the block can be executed.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.id.trim().is_empty() {
            errors.push("Block has an empty id".to_string());
        }

        if self.exercises.is_empty() {
            errors.push(format!("Block '{}' has no exercises", self.id));
        }

        let mut seen = HashSet::new();
        for exercise in &self.exercises {
            if !seen.insert(exercise.id.as_str()) {
                errors.push(format!(
                    "Block '{}': duplicate exercise id '{}'",
                    self.id, exercise.id
                ));
            }
        }

        if self.protocol == Protocol::Emom && self.emom_rounds() == 0 {
            errors.push(format!(
                "Block '{}': EMOM blocks need a positive duration in minutes",
                self.id
            ));
        }

        if self.emom_rounds() > MAX_EMOM_MINUTES {
            errors.push(format!(
                "Block '{}': EMOM duration of {} minutes exceeds {}",
                self.id,
                self.emom_rounds(),
                MAX_EMOM_MINUTES
            ));
        }

        if matches!(self.protocol, Protocol::Time | Protocol::Reps)
            && self.targeting.time_cap == Some(0)
        {
            errors.push(format!("Block '{}': time cap must be positive", self.id));
        }

        let groups: HashSet<&str> = self
            .exercises
            .iter()
            .filter_map(|e| e.group.as_deref())
            .collect();
        for group in groups {
            if self.group_members(group).len() < 2 {
                errors.push(format!(
                    "Block '{}': group '{}' has a single exercise",
                    self.id, group
                ));
            }
        }

        errors
    }
}
