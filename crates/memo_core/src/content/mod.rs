//! Per-memo content files.
//!
//! # Responsibility
//! - Encode/decode the `---` delimited header + body text format.
//! - Read and write one memo per file under `<root>/content/`.
//!
//! # Invariants
//! - A file write is issued as one call followed by an atomic rename; readers
//!   never observe a partially written memo.
//! - Malformed files surface as `ContentError::Parse`, never as panics.

use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;

pub mod front_matter;
mod store;

pub use front_matter::{parse_memo_file, render_memo_file};
pub use store::ContentStore;
pub(crate) use store::write_atomically;

pub type ContentResult<T> = Result<T, ContentError>;

/// Content-layer failure.
#[derive(Debug)]
pub enum ContentError {
    /// Missing, locked or unreadable file.
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    /// File exists but its header cannot be decoded.
    Parse { path: PathBuf, message: String },
}

impl ContentError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn parse(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Parse {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Returns whether this error means the file does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Io { source, .. } if source.kind() == std::io::ErrorKind::NotFound)
    }
}

impl Display for ContentError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, source } => write!(f, "content io error at `{}`: {source}", path.display()),
            Self::Parse { path, message } => {
                write!(f, "malformed content file `{}`: {message}", path.display())
            }
        }
    }
}

impl Error for ContentError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Parse { .. } => None,
        }
    }
}
