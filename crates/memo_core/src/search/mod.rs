//! In-memo find and replace.
//!
//! # Responsibility
//! - Compile literal or regex keywords with a case-sensitivity flag.
//! - Report non-overlapping `(offset, length)` matches and splice replacements.
//! - Step through matches cyclically for a find bar.

use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod matcher;
pub mod navigator;

pub use matcher::{find_matches, replace_all, Matches, SearchOptions, SearchPattern, TextMatch};
pub use navigator::MatchNavigator;

/// Result type for search APIs.
pub type SearchResult<T> = Result<T, SearchError>;

/// Search-layer error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchError {
    /// Regex keyword could not be compiled.
    InvalidPattern { pattern: String, message: String },
}

impl Display for SearchError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidPattern { pattern, message } => {
                write!(f, "invalid search pattern `{pattern}`: {message}")
            }
        }
    }
}

impl Error for SearchError {}
