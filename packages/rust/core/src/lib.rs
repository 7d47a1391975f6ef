//! Search orchestration and export for Greylit.
//!
//! This crate ties the search client to the tiered escalation policy and
//! turns the resulting sets into CSV files:
//! - [`escalator`]: website → tier → page escalation with deduplication
//! - [`export`]: per-website or per-run CSV output

pub mod escalator;
pub mod export;

pub use escalator::{Escalator, ProgressReporter, RunHalt, RunReport, SilentProgress};
pub use export::{ExportMode, export_sets, write_csv};
