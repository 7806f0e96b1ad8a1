//! Literal and regex matching over in-memory text.
//!
//! # Invariants
//! - Matches are non-overlapping and reported left to right; after a match
//!   at `offset` with `length`, scanning resumes at `offset + length`.
//! - Empty keyword or empty text yields no matches.
//! - Zero-length regex matches are never reported.
//! - `replace` splices exactly the matches `find_iter` reports, inserting the
//!   replacement literally.
//! - Offsets and lengths are byte positions in the UTF-8 text.

use super::{SearchError, SearchResult};
use regex::{Regex, RegexBuilder};

/// Matching mode flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SearchOptions {
    pub case_sensitive: bool,
    pub use_regex: bool,
}

impl SearchOptions {
    pub fn literal(case_sensitive: bool) -> Self {
        Self {
            case_sensitive,
            use_regex: false,
        }
    }

    pub fn regex(case_sensitive: bool) -> Self {
        Self {
            case_sensitive,
            use_regex: true,
        }
    }
}

/// One match as `(offset, length)` in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct TextMatch {
    pub offset: usize,
    pub length: usize,
}

impl TextMatch {
    pub fn new(offset: usize, length: usize) -> Self {
        Self { offset, length }
    }

    pub fn end(&self) -> usize {
        self.offset + self.length
    }
}

#[derive(Debug, Clone)]
enum Matcher {
    Never,
    Exact(String),
    Pattern(Regex),
}

/// Compiled keyword ready to scan any number of texts.
#[derive(Debug, Clone)]
pub struct SearchPattern {
    matcher: Matcher,
}

impl SearchPattern {
    /// Compiles `keyword` under `options`.
    ///
    /// # Errors
    /// - `SearchError::InvalidPattern` when regex mode is on and the keyword
    ///   is not a valid pattern.
    pub fn compile(keyword: &str, options: SearchOptions) -> SearchResult<Self> {
        if keyword.is_empty() {
            return Ok(Self {
                matcher: Matcher::Never,
            });
        }

        let matcher = match (options.use_regex, options.case_sensitive) {
            (false, true) => Matcher::Exact(keyword.to_string()),
            (false, false) => Matcher::Pattern(build_regex(&regex::escape(keyword), false, keyword)?),
            (true, case_sensitive) => Matcher::Pattern(build_regex(keyword, case_sensitive, keyword)?),
        };
        Ok(Self { matcher })
    }

    /// Lazily yields matches in `text`, left to right.
    pub fn find_iter<'p, 't>(&'p self, text: &'t str) -> Matches<'p, 't> {
        let inner = match &self.matcher {
            Matcher::Never => MatchesInner::Done,
            _ if text.is_empty() => MatchesInner::Done,
            Matcher::Exact(keyword) => MatchesInner::Exact(text.match_indices(keyword.as_str())),
            Matcher::Pattern(regex) => MatchesInner::Pattern(regex.find_iter(text)),
        };
        Matches { inner }
    }

    /// Replaces every match with `replacement`, inserted literally.
    pub fn replace(&self, text: &str, replacement: &str) -> String {
        let mut out = String::with_capacity(text.len());
        let mut cursor = 0;
        for found in self.find_iter(text) {
            out.push_str(&text[cursor..found.offset]);
            out.push_str(replacement);
            cursor = found.end();
        }
        out.push_str(&text[cursor..]);
        out
    }
}

/// Lazy match sequence returned by [`SearchPattern::find_iter`].
pub struct Matches<'p, 't> {
    inner: MatchesInner<'p, 't>,
}

enum MatchesInner<'p, 't> {
    Done,
    Exact(std::str::MatchIndices<'t, &'p str>),
    Pattern(regex::Matches<'p, 't>),
}

impl Iterator for Matches<'_, '_> {
    type Item = TextMatch;

    fn next(&mut self) -> Option<Self::Item> {
        match &mut self.inner {
            MatchesInner::Done => None,
            MatchesInner::Exact(iter) => iter
                .next()
                .map(|(offset, found)| TextMatch::new(offset, found.len())),
            MatchesInner::Pattern(iter) => iter
                .find(|found| !found.is_empty())
                .map(|found| TextMatch::new(found.start(), found.len())),
        }
    }
}

/// Collects every match of `keyword` in `text`.
pub fn find_matches(text: &str, keyword: &str, options: SearchOptions) -> SearchResult<Vec<TextMatch>> {
    let pattern = SearchPattern::compile(keyword, options)?;
    Ok(pattern.find_iter(text).collect())
}

/// Replaces every match of `keyword` in `text` with `replacement`.
pub fn replace_all(
    text: &str,
    keyword: &str,
    replacement: &str,
    options: SearchOptions,
) -> SearchResult<String> {
    let pattern = SearchPattern::compile(keyword, options)?;
    Ok(pattern.replace(text, replacement))
}

fn build_regex(source: &str, case_sensitive: bool, keyword: &str) -> SearchResult<Regex> {
    RegexBuilder::new(source)
        .case_insensitive(!case_sensitive)
        .build()
        .map_err(|err| SearchError::InvalidPattern {
            pattern: keyword.to_string(),
            message: err.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::{find_matches, replace_all, SearchOptions, SearchPattern, TextMatch};
    use crate::search::SearchError;

    fn splice(text: &str, matches: &[TextMatch], replacement: &str) -> String {
        let mut out = String::new();
        let mut cursor = 0;
        for found in matches {
            out.push_str(&text[cursor..found.offset]);
            out.push_str(replacement);
            cursor = found.end();
        }
        out.push_str(&text[cursor..]);
        out
    }

    #[test]
    fn literal_matches_do_not_overlap() {
        let matches = find_matches("aaa", "aa", SearchOptions::literal(false)).unwrap();
        assert_eq!(matches, vec![TextMatch::new(0, 2)]);

        let matches = find_matches("aaaa", "aa", SearchOptions::literal(true)).unwrap();
        assert_eq!(matches, vec![TextMatch::new(0, 2), TextMatch::new(2, 2)]);
    }

    #[test]
    fn case_sensitivity_is_honored() {
        let text = "Test test TEST";
        let sensitive = find_matches(text, "test", SearchOptions::literal(true)).unwrap();
        assert_eq!(sensitive, vec![TextMatch::new(5, 4)]);

        let insensitive = find_matches(text, "test", SearchOptions::literal(false)).unwrap();
        let offsets: Vec<usize> = insensitive.iter().map(|found| found.offset).collect();
        assert_eq!(offsets, [0, 5, 10]);
    }

    #[test]
    fn literal_mode_treats_regex_metacharacters_verbatim() {
        let matches = find_matches("a.b axb a.b", "a.b", SearchOptions::literal(false)).unwrap();
        assert_eq!(matches, vec![TextMatch::new(0, 3), TextMatch::new(8, 3)]);
    }

    #[test]
    fn regex_mode_matches_patterns_with_case_flag() {
        let text = "Item1 item22 ITEM333";
        let insensitive = find_matches(text, r"item\d+", SearchOptions::regex(false)).unwrap();
        assert_eq!(insensitive.len(), 3);
        let sensitive = find_matches(text, r"item\d+", SearchOptions::regex(true)).unwrap();
        assert_eq!(sensitive, vec![TextMatch::new(6, 6)]);
    }

    #[test]
    fn empty_keyword_or_text_yields_nothing() {
        assert!(find_matches("abc", "", SearchOptions::regex(false)).unwrap().is_empty());
        assert!(find_matches("", "a", SearchOptions::literal(true)).unwrap().is_empty());
        assert!(find_matches("", "a*", SearchOptions::regex(true)).unwrap().is_empty());
    }

    #[test]
    fn zero_length_regex_matches_are_skipped() {
        let matches = find_matches("baab", "a*", SearchOptions::regex(true)).unwrap();
        assert_eq!(matches, vec![TextMatch::new(1, 2)]);
    }

    #[test]
    fn invalid_regex_is_reported() {
        let err = find_matches("abc", "(unclosed", SearchOptions::regex(false)).unwrap_err();
        let SearchError::InvalidPattern { pattern, .. } = err;
        assert_eq!(pattern, "(unclosed");
        assert!(find_matches("abc", "(unclosed", SearchOptions::literal(false)).is_ok());
    }

    #[test]
    fn replace_agrees_with_splicing_find_results() {
        let cases = [
            ("aaa", "aa", SearchOptions::literal(false)),
            ("Test test TEST", "test", SearchOptions::literal(false)),
            ("Test test TEST", "test", SearchOptions::literal(true)),
            ("x1 y22 z333", r"\d+", SearchOptions::regex(true)),
            ("héllo HÉLLO", "é", SearchOptions::literal(false)),
            ("baab", "a*", SearchOptions::regex(true)),
        ];
        for (text, keyword, options) in cases {
            let matches = find_matches(text, keyword, options).unwrap();
            let replaced = replace_all(text, keyword, "<$0>", options).unwrap();
            assert_eq!(replaced, splice(text, &matches, "<$0>"), "case {keyword:?}");
        }
    }

    #[test]
    fn pattern_can_be_reused_lazily() {
        let pattern = SearchPattern::compile("ab", SearchOptions::literal(true)).unwrap();
        let mut iter = pattern.find_iter("ab ab ab");
        assert_eq!(iter.next(), Some(TextMatch::new(0, 2)));
        assert_eq!(pattern.find_iter("xxab").count(), 1);
        assert_eq!(pattern.replace("ab-ab", "c"), "c-c");
    }
}
