//! Game library aggregation engine for Ludex
//!
//! Discovers games and collections from several independent sources, merges
//! records that point at the same file, attaches media assets, and seals the
//! result into a read-only [`Library`] that the filter engine evaluates.

mod assets;
mod context;
mod database;
mod filters;
mod finalize;
mod metafile;
mod model;
mod pipeline;
pub mod providers;
mod scanner;

pub use assets::{AssetTable, AssetType};
pub use context::SearchContext;
pub use database::{PlayStats, PlaytimeDb};
pub use filters::{
    Filter, FilterRule, FilterSet, GameProperty, RuleKind, default_filters, load_filters,
    parse_filters,
};
pub use finalize::{Collection, Game, Library, finalize};
pub use metafile::{Entry, merge_lines};
pub use model::{
    GameFile, GameId, PendingCollection, PendingGame, ReleaseDate, locale_cmp, push_unique,
};
pub use pipeline::{ScanOutcome, ScanPipeline, ScanReport};
pub use providers::{Discovery, Enricher, Provider};
pub use scanner::canonical_path;

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LibraryError {
    #[error("Parse error in {source_name} line {line}: {message}")]
    Parse {
        source_name: String,
        line: usize,
        message: String,
    },

    #[error("Invalid filter rule: {0}")]
    InvalidRule(String),

    #[error("Path not found: {0}")]
    PathNotFound(PathBuf),

    #[error("Scan task failed: {0}")]
    Task(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Regex error: {0}")]
    Regex(#[from] regex::Error),

    #[error("Walk error: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("Config error: {0}")]
    Config(#[from] ludex_config::ConfigError),
}

impl LibraryError {
    /// Shorthand for a located parse error
    pub fn parse(source_name: impl Into<String>, line: usize, message: impl Into<String>) -> Self {
        Self::Parse {
            source_name: source_name.into(),
            line,
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_error_display() {
        let err = LibraryError::parse("metadata.txt", 12, "unknown key `foo`");
        let text = err.to_string();
        assert!(text.contains("metadata.txt"));
        assert!(text.contains("line 12"));
        assert!(text.contains("foo"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: LibraryError = io.into();
        assert!(matches!(err, LibraryError::Io(_)));
    }
}
