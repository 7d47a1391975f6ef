//! Terminal progress for search runs and records export.

use std::time::Duration;

use greylit_core::ProgressReporter;
use greylit_records::{SaveProgress, SaveStats};
use greylit_shared::{Priority, ResultSet};
use indicatif::{ProgressBar, ProgressStyle};

fn spinner() -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    let style = ProgressStyle::with_template("{spinner:.cyan} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]);
    spinner.set_style(style);
    spinner.enable_steady_tick(Duration::from_millis(80));
    spinner
}

/// Spinner for a search run.
pub(crate) struct SearchProgress {
    spinner: ProgressBar,
}

impl SearchProgress {
    pub(crate) fn new() -> Self {
        Self { spinner: spinner() }
    }

    pub(crate) fn finish(&self) {
        self.spinner.finish_and_clear();
    }
}

impl ProgressReporter for SearchProgress {
    fn website_started(&self, website: &str, current: usize, total: usize) {
        self.spinner
            .set_message(format!("[{current}/{total}] {website}"));
    }

    fn page_fetched(&self, website: &str, tier: Priority, page: u32, unique: usize) {
        self.spinner.set_message(format!(
            "{website}: tier {tier} page {page}, {unique} unique results"
        ));
    }

    fn website_finished(&self, set: &ResultSet) {
        let note = if set.is_partial() { " (partial)" } else { "" };
        self.spinner
            .println(format!("  {:<40} {:>3} results{note}", set.website, set.len()));
    }
}

/// Spinner for an Airtable save batch.
pub(crate) struct RecordsProgress {
    spinner: ProgressBar,
}

impl RecordsProgress {
    pub(crate) fn new() -> Self {
        Self { spinner: spinner() }
    }

    pub(crate) fn finish(&self) {
        self.spinner.finish_and_clear();
    }
}

impl SaveProgress for RecordsProgress {
    fn record_processed(&self, total: usize, stats: &SaveStats) {
        self.spinner.set_message(format!(
            "Saving [{}/{total}] created {}, duplicates {}, errors {}",
            stats.processed, stats.created, stats.duplicates, stats.errors
        ));
    }
}
