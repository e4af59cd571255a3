//! CSV export of committed sets.
//!
//! Flattens stored results into one row per ledger entry so they can be
//! opened in a spreadsheet.

use crate::{BlockResult, Result};
use std::fs::File;
use std::path::Path;

/// A row in the CSV output
#[derive(Debug, serde::Serialize)]
struct SetRow<'a> {
    result_id: String,
    user_id: &'a str,
    block_id: &'a str,
    protocol: &'static str,
    exercise_id: &'a str,
    set_index: usize,
    value: u32,
    weight: f64,
    timestamp: String,
}

fn rows(result: &BlockResult) -> impl Iterator<Item = SetRow<'_>> {
    result
        .set_ledger
        .iter()
        .enumerate()
        .flat_map(move |(exercise_index, sets)| {
            let exercise_id = result
                .exercise_ids
                .get(exercise_index)
                .map_or("", String::as_str);
            sets.iter().map(move |set| SetRow {
                result_id: result.id.to_string(),
                user_id: &result.user_id,
                block_id: &result.block_id,
                protocol: result.protocol.as_str(),
                exercise_id,
                set_index: set.set_index,
                value: set.value,
                weight: set.weight,
                timestamp: set.timestamp.to_rfc3339(),
            })
        })
}

/// Write every committed set of the stored results to a CSV file
///
/// The file is rewritten from the full results log on each call, so
/// repeated exports never duplicate rows. The CSV is fsynced before
/// returning. Returns the number of rows written.
pub fn export_sets_csv(results_path: &Path, csv_path: &Path) -> Result<usize> {
    let results = crate::sink::read_results(results_path)?;

    if results.is_empty() {
        tracing::info!("No results to export");
        return Ok(0);
    }

    if let Some(parent) = csv_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let file = File::create(csv_path)?;
    let mut writer = csv::Writer::from_writer(file);

    let mut count = 0;
    for result in &results {
        for row in rows(result) {
            writer.serialize(row)?;
            count += 1;
        }
    }

    writer.flush()?;
    let file = writer
        .into_inner()
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))?;
    file.sync_all()?;

    tracing::info!("Exported {} sets to {:?}", count, csv_path);
    Ok(count)
}
