//! Result persistence.
//!
//! Finished block results are appended to a JSONL (JSON Lines) file with
//! file locking to ensure safe concurrent access.

use crate::{BlockResult, Result};
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

/// Receiver of finished block results
pub trait ResultSink {
    fn append(&mut self, result: &BlockResult) -> Result<()>;
}

/// JSONL-based result sink with file locking
pub struct JsonlSink {
    path: PathBuf,
}

impl JsonlSink {
    /// Create a new JSONL sink for the given path
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Ensure the parent directory exists
    fn ensure_parent_dir(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(())
    }
}

impl ResultSink for JsonlSink {
    fn append(&mut self, result: &BlockResult) -> Result<()> {
        self.ensure_parent_dir()?;

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;

        file.lock_exclusive()?;

        let mut writer = std::io::BufWriter::new(&file);
        let line = serde_json::to_string(result)?;
        writer.write_all(line.as_bytes())?;
        writer.write_all(b"\n")?;
        writer.flush()?;
        drop(writer);

        file.unlock()?;

        tracing::info!(
            "Saved result {} for block {} (user {})",
            result.id,
            result.block_id,
            result.user_id
        );
        Ok(())
    }
}

/// Read all results from a JSONL file, oldest first.
///
/// Corrupt lines are skipped with a warning.
pub fn read_results(path: &Path) -> Result<Vec<BlockResult>> {
    if !path.exists() {
        return Ok(Vec::new());
    }

    let file = File::open(path)?;
    file.lock_shared()?;

    let reader = BufReader::new(&file);
    let mut results = Vec::new();

    for (line_num, line_result) in reader.lines().enumerate() {
        let line = line_result?;
        if line.trim().is_empty() {
            continue;
        }

        match serde_json::from_str::<BlockResult>(&line) {
            Ok(result) => results.push(result),
            Err(e) => {
                tracing::warn!("Failed to parse result at line {}: {}", line_num + 1, e);
            }
        }
    }

    file.unlock()?;
    tracing::debug!("Read {} results from {:?}", results.len(), path);
    Ok(results)
}
