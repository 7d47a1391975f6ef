//! CSV export of result sets.
//!
//! One row per result with the columns
//! `title,link,snippet,priority,source_website`, written either as one file
//! per website or one combined file per run.

use std::io;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use serde::Serialize;
use tracing::{debug, info};

use greylit_shared::{GreylitError, Result, ResultSet, SearchResult};

/// Column header, written even when there are no rows.
const HEADER: [&str; 5] = ["title", "link", "snippet", "priority", "source_website"];

/// How result sets are split into files.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportMode {
    /// `<website>_results.csv` for each website.
    PerWebsite,
    /// A single `greylit_<date>_results.csv` for the whole run.
    Combined,
}

#[derive(Serialize)]
struct CsvRow<'a> {
    title: &'a str,
    link: &'a str,
    snippet: &'a str,
    priority: u8,
    source_website: &'a str,
}

impl<'a> From<&'a SearchResult> for CsvRow<'a> {
    fn from(r: &'a SearchResult) -> Self {
        Self {
            title: &r.title,
            link: &r.link,
            snippet: &r.snippet,
            priority: r.priority.number(),
            source_website: &r.source_website,
        }
    }
}

/// Write results as CSV to any writer.
pub fn write_csv<'a, W: io::Write>(
    writer: W,
    results: impl IntoIterator<Item = &'a SearchResult>,
) -> Result<()> {
    let mut out = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(writer);

    out.write_record(HEADER).map_err(export_error)?;
    for result in results {
        out.serialize(CsvRow::from(result)).map_err(export_error)?;
    }
    out.flush()
        .map_err(|e| GreylitError::Export(format!("flush failed: {e}")))?;
    Ok(())
}

/// File name for a website's CSV: dots and path characters become `_`.
pub fn website_file_name(website: &str) -> String {
    let stem: String = website
        .trim()
        .trim_start_matches("https://")
        .trim_start_matches("http://")
        .trim_end_matches('/')
        .chars()
        .map(|c| match c {
            '.' | '/' | ':' | '\\' | ' ' => '_',
            other => other,
        })
        .collect();
    format!("{stem}_results.csv")
}

/// File name for a combined run export.
pub fn combined_file_name(run_date: NaiveDate) -> String {
    format!("greylit_{}_results.csv", run_date.format("%Y-%m-%d"))
}

/// Write `sets` under `dir` and return the paths written.
pub fn export_sets(
    sets: &[ResultSet],
    dir: &Path,
    mode: ExportMode,
    run_date: NaiveDate,
) -> Result<Vec<PathBuf>> {
    std::fs::create_dir_all(dir).map_err(|e| GreylitError::io(dir, e))?;

    let written = match mode {
        ExportMode::Combined => {
            let path = dir.join(combined_file_name(run_date));
            write_file(&path, sets.iter().flat_map(|s| s.results.iter()))?;
            vec![path]
        }
        ExportMode::PerWebsite => {
            let mut paths = Vec::with_capacity(sets.len());
            for set in sets {
                let path = dir.join(website_file_name(&set.website));
                write_file(&path, set.results.iter())?;
                paths.push(path);
            }
            paths
        }
    };

    info!(files = written.len(), dir = %dir.display(), "CSV export complete");
    Ok(written)
}

fn write_file<'a>(path: &Path, results: impl IntoIterator<Item = &'a SearchResult>) -> Result<()> {
    let file = std::fs::File::create(path).map_err(|e| GreylitError::io(path, e))?;
    write_csv(io::BufWriter::new(file), results)?;
    debug!(path = %path.display(), "wrote CSV");
    Ok(())
}

fn export_error(e: csv::Error) -> GreylitError {
    GreylitError::Export(e.to_string())
}
