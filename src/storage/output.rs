use anyhow::{Context, Result};
use serde::Serialize;
use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::parser::Record;
use crate::scraper::RunSummary;

/// Write the dataset as a pretty JSON array
pub fn write_dataset(path: &Path, records: &[Record]) -> Result<()> {
    write_json(path, records)?;
    info!("Wrote {} record(s) to {}", records.len(), path.display());
    Ok(())
}

/// Write the run summary next to the dataset; returns where it went
pub fn write_summary(dataset_path: &Path, summary: &RunSummary) -> Result<PathBuf> {
    let path = summary_path(dataset_path);
    write_json(&path, summary)?;
    info!("Wrote run summary to {}", path.display());
    Ok(path)
}

/// `out/data.json` -> `out/data.summary.json`
pub fn summary_path(dataset_path: &Path) -> PathBuf {
    let stem = dataset_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    dataset_path.with_file_name(format!("{}.summary.json", stem))
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .context(format!("Failed to create output directory: {}", parent.display()))?;
    }

    debug!("Writing {}", path.display());
    let file = fs::File::create(path)
        .context(format!("Failed to create output file: {}", path.display()))?;
    let mut writer = BufWriter::new(file);

    serde_json::to_writer_pretty(&mut writer, value)
        .context(format!("Failed to write JSON to file: {}", path.display()))?;
    writer.write_all(b"\n")?;
    writer.flush()?;

    Ok(())
}
