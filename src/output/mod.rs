//! Output module for reporting on crawl results
//!
//! This module handles:
//! - Loading repository statistics from storage
//! - Printing them for `--stats`

pub mod stats;

pub use stats::{load_statistics, print_statistics, RepositoryStatistics, TOP_REPOSITORIES};
