//! Search API client with credential rotation.
//!
//! This crate provides:
//! - [`PageSource`]: the seam the escalator fetches pages through
//! - [`SearchClient`]: Custom Search JSON API implementation
//! - [`KeyRotation`]: run-scoped sticky key index and exhaustion flag
//! - [`build_query`]: combines a tier's term groups into one query string

pub mod client;
pub mod query;
pub mod rotation;

pub use client::{PageRequest, PageSource, SearchClient};
pub use query::build_query;
pub use rotation::KeyRotation;
