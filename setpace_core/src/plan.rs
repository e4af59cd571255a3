//! Block plan loader.
//!
//! Reads a block definition written by the planning side, as JSON or TOML
//! depending on the file extension.

use crate::{Block, Error, Result};
use std::path::Path;

/// Load and validate a block from a `.json` or `.toml` file
///
/// Unlike history, a plan is required input: a missing, malformed or
/// invalid file is an error.
pub fn load_block(path: &Path) -> Result<Block> {
    let contents = std::fs::read_to_string(path)?;

    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase);

    let block: Block = match extension.as_deref() {
        Some("toml") => toml::from_str(&contents)?,
        Some("json") | None => serde_json::from_str(&contents)?,
        Some(other) => {
            return Err(Error::Plan(format!(
                "Unsupported plan format '.{}' for {:?}",
                other, path
            )))
        }
    };

    let problems = block.validate();
    if !problems.is_empty() {
        return Err(Error::Plan(problems.join("; ")));
    }

    tracing::info!(
        "Loaded block {} ({}, {} exercises) from {:?}",
        block.id,
        block.protocol,
        block.exercises.len(),
        path
    );
    Ok(block)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{BlockType, Protocol};

    #[test]
    fn test_load_json_plan() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("block.json");
        std::fs::write(
            &path,
            r#"{
                "id": "wk3_day1_a",
                "protocol": "FREEFORM",
                "block_type": "strength",
                "exercises": [{
                    "id": "bench",
                    "name": "Bench Press",
                    "loadable": true,
                    "config": {"sets": [{"value": 5, "rest": 120}, {"value": 5}]}
                }]
            }"#,
        )
        .unwrap();

        let block = load_block(&path).unwrap();
        assert_eq!(block.protocol, Protocol::Freeform);
        assert_eq!(block.exercises[0].target_set_count(), 2);
        assert_eq!(block.exercises[0].rest_after(0), 120);
    }

    #[test]
    fn test_load_toml_plan() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("block.toml");
        std::fs::write(
            &path,
            r#"
id = "finisher"
protocol = "emom"
block_type = "Conditioning"

[emom]
duration_minutes = 12

[[exercises]]
id = "burpee"
name = "Burpee"
target_reps = 6
"#,
        )
        .unwrap();

        let block = load_block(&path).unwrap();
        assert_eq!(block.protocol, Protocol::Emom);
        assert_eq!(block.block_type, BlockType::Conditioning);
        assert_eq!(block.emom_rounds(), 12);
    }

    #[test]
    fn test_invalid_plan_is_rejected() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("block.json");
        std::fs::write(&path, r#"{"id": "x", "protocol": "emom", "exercises": []}"#).unwrap();

        match load_block(&path) {
            Err(Error::Plan(msg)) => {
                assert!(msg.contains("no exercises"));
                assert!(msg.contains("EMOM"));
            }
            other => panic!("Expected plan error, got {:?}", other),
        }
    }

    #[test]
    fn test_malformed_plan_is_error() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("block.json");
        std::fs::write(&path, "{ nope").unwrap();
        assert!(matches!(load_block(&path), Err(Error::Json(_))));
    }

    #[test]
    fn test_unknown_extension() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("block.yaml");
        std::fs::write(&path, "id: x").unwrap();
        assert!(matches!(load_block(&path), Err(Error::Plan(_))));
    }
}
