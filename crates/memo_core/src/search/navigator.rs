//! Cyclic cursor over the matches of one keyword in one text.
//!
//! # Invariants
//! - Matches are recomputed only when text, keyword or options change.
//! - A recompute clears the cursor; the first step forward lands on the
//!   first match and the first step back on the last.
//! - Stepping wraps around at both ends.

use super::matcher::{SearchOptions, SearchPattern, TextMatch};
use super::SearchResult;

#[derive(Debug, Clone, PartialEq, Eq)]
struct QueryKey {
    text: String,
    keyword: String,
    options: SearchOptions,
}

#[derive(Debug, Default, Clone)]
pub struct MatchNavigator {
    key: Option<QueryKey>,
    matches: Vec<TextMatch>,
    cursor: Option<usize>,
}

impl MatchNavigator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Points the navigator at a new query. Returns whether matches were
    /// recomputed.
    ///
    /// # Errors
    /// - `SearchError::InvalidPattern`; the navigator is left empty and the
    ///   next `update` recomputes.
    pub fn update(&mut self, text: &str, keyword: &str, options: SearchOptions) -> SearchResult<bool> {
        let unchanged = self.key.as_ref().is_some_and(|key| {
            key.options == options && key.keyword == keyword && key.text == text
        });
        if unchanged {
            return Ok(false);
        }

        self.key = None;
        self.matches.clear();
        self.cursor = None;

        let pattern = SearchPattern::compile(keyword, options)?;
        self.matches = pattern.find_iter(text).collect();
        self.key = Some(QueryKey {
            text: text.to_string(),
            keyword: keyword.to_string(),
            options,
        });
        Ok(true)
    }

    pub fn matches(&self) -> &[TextMatch] {
        &self.matches
    }

    pub fn len(&self) -> usize {
        self.matches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.matches.is_empty()
    }

    pub fn current(&self) -> Option<TextMatch> {
        self.cursor.map(|index| self.matches[index])
    }

    /// 1-based position of the current match, for "3 / 7" style labels.
    pub fn position(&self) -> Option<usize> {
        self.cursor.map(|index| index + 1)
    }

    /// Moves to the next match, wrapping to the first.
    pub fn advance(&mut self) -> Option<TextMatch> {
        if self.matches.is_empty() {
            return None;
        }
        let next = match self.cursor {
            Some(index) => (index + 1) % self.matches.len(),
            None => 0,
        };
        self.cursor = Some(next);
        self.current()
    }

    /// Moves to the previous match, wrapping to the last.
    pub fn retreat(&mut self) -> Option<TextMatch> {
        if self.matches.is_empty() {
            return None;
        }
        let last = self.matches.len() - 1;
        let previous = match self.cursor {
            Some(0) | None => last,
            Some(index) => index - 1,
        };
        self.cursor = Some(previous);
        self.current()
    }

    /// Selects the first match starting at or after `caret`, wrapping to the
    /// first match when none follows.
    pub fn seek(&mut self, caret: usize) -> Option<TextMatch> {
        if self.matches.is_empty() {
            return None;
        }
        let index = self
            .matches
            .iter()
            .position(|found| found.offset >= caret)
            .unwrap_or(0);
        self.cursor = Some(index);
        self.current()
    }

    pub fn reset(&mut self) {
        self.key = None;
        self.matches.clear();
        self.cursor = None;
    }
}
