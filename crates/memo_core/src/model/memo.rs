//! Memo domain model.
//!
//! # Responsibility
//! - Define the immutable memo snapshot shared by every storage generation.
//! - Own derived fields (`preview`) and normalization rules (tags, timestamps).
//!
//! # Invariants
//! - `id` is assigned once at creation and never changes across derivations.
//! - `preview` is always recomputed from `content`; it has no setter.
//! - Every `with_*` derivation bumps `version` by exactly 1 and never moves
//!   `updated_at` backwards.
//! - Tags are de-duplicated case-insensitively, keeping first-seen casing.

use chrono::{DateTime, NaiveDateTime, SecondsFormat, SubsecRound, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Stable identifier of a memo.
pub type MemoId = Uuid;

/// Maximum number of characters retained in `Memo::preview`.
pub const PREVIEW_MAX_CHARS: usize = 100;

static MARKDOWN_IMAGE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"!\[[^\]]*]\(([^)]+)\)").expect("valid image regex"));
static MARKDOWN_LINK_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[([^\]]+)\]\(([^)]+)\)").expect("valid link regex"));
static MARKDOWN_SYMBOL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"[\*_`#>~\-\[\]\(\)!]+"#).expect("valid markdown symbol regex"));
static WHITESPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid ws regex"));

/// Remote sync bookkeeping state.
///
/// Reserved for a future sync engine; local storage only carries it along.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SyncStatus {
    #[default]
    Synced,
    PendingSync,
    Conflict,
}

impl SyncStatus {
    /// Integer code persisted in `memos.sync_status`.
    pub fn as_code(self) -> i64 {
        match self {
            Self::Synced => 0,
            Self::PendingSync => 1,
            Self::Conflict => 2,
        }
    }

    /// Parses a persisted integer code.
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(Self::Synced),
            1 => Some(Self::PendingSync),
            2 => Some(Self::Conflict),
            _ => None,
        }
    }
}

/// Raw field set used to restore a persisted or legacy memo.
///
/// `preview` is intentionally absent: it is derived by [`Memo::from_fields`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoFields {
    pub id: MemoId,
    pub title: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub tags: Vec<String>,
    pub is_pinned: bool,
    pub version: i64,
    pub sync_status: SyncStatus,
    pub deleted_at: Option<DateTime<Utc>>,
}

/// Immutable memo snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Memo {
    id: MemoId,
    title: String,
    content: String,
    preview: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    tags: Vec<String>,
    is_pinned: bool,
    version: i64,
    sync_status: SyncStatus,
    deleted_at: Option<DateTime<Utc>>,
}

impl Memo {
    /// Creates a fresh memo with a new id, both timestamps set to now and
    /// `version = 1`.
    pub fn create_new(title: impl Into<String>, content: impl Into<String>) -> Self {
        let now = now_utc();
        Self::from_fields(MemoFields {
            id: Uuid::new_v4(),
            title: title.into(),
            content: content.into(),
            created_at: now,
            updated_at: now,
            tags: Vec::new(),
            is_pinned: false,
            version: 1,
            sync_status: SyncStatus::Synced,
            deleted_at: None,
        })
    }

    /// Restores a memo from persisted fields, deriving `preview` and
    /// normalizing tags.
    pub fn from_fields(fields: MemoFields) -> Self {
        let preview = derive_preview(&fields.content);
        Self {
            id: fields.id,
            title: fields.title,
            preview,
            content: fields.content,
            created_at: fields.created_at,
            updated_at: fields.updated_at,
            tags: normalize_tags(&fields.tags),
            is_pinned: fields.is_pinned,
            version: fields.version.max(1),
            sync_status: fields.sync_status,
            deleted_at: fields.deleted_at,
        }
    }

    pub fn id(&self) -> MemoId {
        self.id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    /// Derived excerpt of `content`.
    pub fn preview(&self) -> &str {
        &self.preview
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    pub fn is_pinned(&self) -> bool {
        self.is_pinned
    }

    pub fn version(&self) -> i64 {
        self.version
    }

    pub fn sync_status(&self) -> SyncStatus {
        self.sync_status
    }

    pub fn deleted_at(&self) -> Option<DateTime<Utc>> {
        self.deleted_at
    }

    /// Returns whether this memo carries the given tag (case-insensitive).
    pub fn has_tag(&self, tag: &str) -> bool {
        let needle = tag.trim().to_lowercase();
        self.tags.iter().any(|value| value.to_lowercase() == needle)
    }

    pub fn with_title(&self, title: impl Into<String>) -> Self {
        let mut next = self.bumped();
        next.title = title.into();
        next
    }

    /// Replaces content and recomputes `preview`.
    pub fn with_content(&self, content: impl Into<String>) -> Self {
        let mut next = self.bumped();
        next.content = content.into();
        next.preview = derive_preview(&next.content);
        next
    }

    pub fn with_tags(&self, tags: &[String]) -> Self {
        let mut next = self.bumped();
        next.tags = normalize_tags(tags);
        next
    }

    pub fn with_pinned(&self, is_pinned: bool) -> Self {
        let mut next = self.bumped();
        next.is_pinned = is_pinned;
        next
    }

    pub fn with_sync_status(&self, sync_status: SyncStatus) -> Self {
        let mut next = self.bumped();
        next.sync_status = sync_status;
        next
    }

    /// Sets the soft-delete marker. Local deletion never uses this; it exists
    /// for sync bookkeeping only.
    pub fn mark_deleted(&self) -> Self {
        let mut next = self.bumped();
        next.deleted_at = Some(next.updated_at);
        next
    }

    /// Overlays bookkeeping fields kept by an index backend without counting
    /// as a mutation.
    pub(crate) fn with_bookkeeping(
        mut self,
        version: i64,
        sync_status: SyncStatus,
        deleted_at: Option<DateTime<Utc>>,
    ) -> Self {
        self.version = version.max(self.version);
        self.sync_status = sync_status;
        self.deleted_at = deleted_at;
        self
    }

    fn bumped(&self) -> Self {
        let mut next = self.clone();
        next.version = self.version + 1;
        next.updated_at = now_utc().max(self.updated_at);
        next
    }
}

impl Display for Memo {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "memo {} (v{})", self.id, self.version)
    }
}

/// Current time truncated to the persisted timestamp precision.
pub fn now_utc() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

/// Formats a timestamp in the canonical sortable form
/// (`YYYY-MM-DDTHH:MM:SS.ffffffZ`).
pub fn format_timestamp(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parses RFC 3339 timestamps with any offset, or naive ISO-8601 values
/// treated as UTC.
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let trimmed = value.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(parsed.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(trimmed, format).ok())
        .map(|naive| naive.and_utc())
}

/// Derives the preview excerpt from memo content.
///
/// Rules: markdown images dropped, links reduced to their label, markdown
/// symbols removed, whitespace collapsed, first 100 chars retained.
pub fn derive_preview(content: &str) -> String {
    let without_images = MARKDOWN_IMAGE_RE.replace_all(content, " ");
    let without_links = MARKDOWN_LINK_RE.replace_all(&without_images, "$1");
    let without_symbols = MARKDOWN_SYMBOL_RE.replace_all(&without_links, " ");
    let normalized = WHITESPACE_RE.replace_all(&without_symbols, " ");
    normalized.trim().chars().take(PREVIEW_MAX_CHARS).collect()
}

/// Trims tags, drops blanks and removes case-insensitive duplicates while
/// keeping the first-seen spelling and order.
pub fn normalize_tags(tags: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut unique = Vec::new();
    for tag in tags {
        let trimmed = tag.trim();
        if trimmed.is_empty() {
            continue;
        }
        if seen.insert(trimmed.to_lowercase()) {
            unique.push(trimmed.to_string());
        }
    }
    unique
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_new_starts_at_version_one_with_equal_timestamps() {
        let memo = Memo::create_new("Title", "Body");
        assert_eq!(memo.version(), 1);
        assert_eq!(memo.created_at(), memo.updated_at());
        assert_eq!(memo.preview(), "Body");
        assert!(memo.deleted_at().is_none());
    }

    #[test]
    fn derivations_keep_id_and_bump_version() {
        let memo = Memo::create_new("Title", "Body");
        let edited = memo.with_content("# New body").with_pinned(true);
        assert_eq!(edited.id(), memo.id());
        assert_eq!(edited.version(), 3);
        assert!(edited.updated_at() >= memo.updated_at());
        assert_eq!(edited.preview(), "New body");
        assert_eq!(memo.content(), "Body");
    }

    #[test]
    fn tags_are_deduplicated_case_insensitively_preserving_first_spelling() {
        let memo = Memo::create_new("t", "c").with_tags(&[
            "Work".to_string(),
            " work ".to_string(),
            "".to_string(),
            "Home".to_string(),
            "WORK".to_string(),
        ]);
        assert_eq!(memo.tags(), ["Work".to_string(), "Home".to_string()]);
        assert!(memo.has_tag("home"));
    }

    #[test]
    fn preview_strips_markdown_and_limits_length() {
        let long = format!("# title\n\n- [link](https://example.com) {}", "x".repeat(300));
        let preview = derive_preview(&long);
        assert!(preview.starts_with("title link"));
        assert_eq!(preview.chars().count(), PREVIEW_MAX_CHARS);
        assert_eq!(derive_preview("  \n\t "), "");
    }

    #[test]
    fn timestamps_round_trip_through_canonical_format() {
        let now = now_utc();
        let text = format_timestamp(now);
        assert!(text.ends_with('Z'));
        assert_eq!(parse_timestamp(&text), Some(now));
    }

    #[test]
    fn parse_timestamp_accepts_offsets_and_naive_values() {
        let with_offset = parse_timestamp("2024-03-01T10:00:00.5+08:00").unwrap();
        assert_eq!(format_timestamp(with_offset), "2024-03-01T02:00:00.500000Z");
        let naive = parse_timestamp("2024-03-01T10:00:00").unwrap();
        assert_eq!(format_timestamp(naive), "2024-03-01T10:00:00.000000Z");
        assert!(parse_timestamp("yesterday").is_none());
    }

    #[test]
    fn sync_status_codes_round_trip() {
        for status in [SyncStatus::Synced, SyncStatus::PendingSync, SyncStatus::Conflict] {
            assert_eq!(SyncStatus::from_code(status.as_code()), Some(status));
        }
        assert_eq!(SyncStatus::from_code(7), None);
    }
}
