//! Shared types, error model, and configuration for Greylit.
//!
//! This crate is the foundation depended on by all other Greylit crates.
//! It provides:
//! - [`GreylitError`]: the unified error type
//! - Domain types ([`QuerySpec`], [`TierSet`], [`SearchResult`], [`ResultSet`])
//! - Configuration ([`AppConfig`], [`SearchConfig`], [`RecordsConfig`], plans)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, CredentialPool, ExportSettings, MAX_RECORD_WRITES_PER_SECOND, RecordsConfig,
    RecordsSettings, SearchConfig, SearchPlan, SearchSettings, config_dir, config_file_path,
    init_config, load_config, load_config_from, load_plan, parse_website_list,
};
pub use error::{GreylitError, Result};
pub use types::{
    DEFAULT_TARGET_COUNT, MAX_RESULTS_PER_WEBSITE, PAGE_SIZE, PageFailure, Priority, QuerySpec,
    RawResult, ResultSet, RunId, SearchResult, TierSet,
};
