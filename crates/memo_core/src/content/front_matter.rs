//! Header + body codec for memo content files.
//!
//! File shape:
//!
//! ```text
//! ---
//! id: 7f1c...
//! title: "Groceries: weekend"
//! createdAt: 2024-03-01T10:00:00.000000Z
//! updatedAt: 2024-03-02T08:30:00.000000Z
//! isPinned: false
//! version: 3
//! tags:
//!   - home
//! ---
//! raw body text
//! ```
//!
//! # Invariants
//! - Header keys are written in a fixed order.
//! - The body is written and read back verbatim.
//! - `version` is optional on read so older files stay readable.

use crate::model::memo::{format_timestamp, parse_timestamp, Memo, MemoFields, SyncStatus};
use uuid::Uuid;

const DELIMITER: &str = "---";
const BOM: char = '\u{feff}';

/// Serializes a memo into the content file format.
pub fn render_memo_file(memo: &Memo) -> String {
    let mut out = String::with_capacity(memo.content().len() + 256);
    out.push_str(DELIMITER);
    out.push('\n');
    push_entry(&mut out, "id", &memo.id().to_string());
    push_entry(&mut out, "title", &quote_if_needed(memo.title()));
    push_entry(&mut out, "createdAt", &format_timestamp(memo.created_at()));
    push_entry(&mut out, "updatedAt", &format_timestamp(memo.updated_at()));
    push_entry(&mut out, "isPinned", if memo.is_pinned() { "true" } else { "false" });
    push_entry(&mut out, "version", &memo.version().to_string());
    out.push_str("tags:\n");
    for tag in memo.tags() {
        out.push_str("  - ");
        out.push_str(&quote_if_needed(tag));
        out.push('\n');
    }
    out.push_str(DELIMITER);
    out.push('\n');
    out.push_str(memo.content());
    out
}

/// Parses a content file into a memo.
///
/// Returns a human-readable message when the header is missing, unterminated
/// or carries invalid values.
pub fn parse_memo_file(text: &str) -> Result<Memo, String> {
    let text = text.strip_prefix(BOM).unwrap_or(text);
    let mut lines = text.split_inclusive('\n');

    let opening = lines.next().map(strip_line_ending);
    if opening != Some(DELIMITER) {
        return Err("missing opening `---` line".to_string());
    }
    let mut consumed = text.split_inclusive('\n').next().map_or(0, str::len);

    let mut header = Vec::new();
    let mut terminated = false;
    for line in lines {
        consumed += line.len();
        let bare = strip_line_ending(line);
        if bare == DELIMITER {
            terminated = true;
            break;
        }
        header.push(bare);
    }
    if !terminated {
        return Err("unterminated header; closing `---` not found".to_string());
    }

    let mut fields = parse_header(&header)?;
    fields.content = text[consumed..].to_string();
    Ok(Memo::from_fields(fields))
}

fn parse_header(lines: &[&str]) -> Result<MemoFields, String> {
    let mut id = None;
    let mut title = String::new();
    let mut created_at = None;
    let mut updated_at = None;
    let mut is_pinned = false;
    let mut version = 1;
    let mut tags = Vec::new();
    let mut in_tags = false;

    for line in lines {
        if line.trim().is_empty() {
            continue;
        }

        if in_tags {
            if let Some(value) = line.trim_start().strip_prefix('-') {
                tags.push(unquote(value.trim())?);
                continue;
            }
        }
        in_tags = false;

        let Some((key, raw_value)) = line.split_once(':') else {
            return Err(format!("header line without key: `{line}`"));
        };
        let value = raw_value.trim();
        match key.trim() {
            "id" => {
                let parsed = Uuid::parse_str(value)
                    .map_err(|_| format!("invalid id value `{value}`"))?;
                id = Some(parsed);
            }
            "title" => title = unquote(value)?,
            "createdAt" => {
                created_at = Some(
                    parse_timestamp(value).ok_or_else(|| format!("invalid createdAt `{value}`"))?,
                );
            }
            "updatedAt" => {
                updated_at = Some(
                    parse_timestamp(value).ok_or_else(|| format!("invalid updatedAt `{value}`"))?,
                );
            }
            "isPinned" => {
                is_pinned = match value.to_ascii_lowercase().as_str() {
                    "true" => true,
                    "false" => false,
                    _ => return Err(format!("invalid isPinned `{value}`")),
                };
            }
            "version" => {
                version = value
                    .parse::<i64>()
                    .map_err(|_| format!("invalid version `{value}`"))?;
            }
            "tags" => {
                if !value.is_empty() && value != "[]" {
                    return Err(format!("inline tags are not supported: `{value}`"));
                }
                in_tags = true;
            }
            _ => {}
        }
    }

    let id = id.ok_or_else(|| "missing `id` header".to_string())?;
    let created_at = created_at.ok_or_else(|| "missing `createdAt` header".to_string())?;
    Ok(MemoFields {
        id,
        title,
        content: String::new(),
        created_at,
        updated_at: updated_at.unwrap_or(created_at),
        tags,
        is_pinned,
        version,
        sync_status: SyncStatus::Synced,
        deleted_at: None,
    })
}

fn push_entry(out: &mut String, key: &str, value: &str) {
    out.push_str(key);
    out.push(':');
    if !value.is_empty() {
        out.push(' ');
        out.push_str(value);
    }
    out.push('\n');
}

fn strip_line_ending(line: &str) -> &str {
    line.trim_end_matches('\n').trim_end_matches('\r')
}

fn needs_quotes(value: &str) -> bool {
    value.contains([':', '"', '\\', '\n', '\r']) || value.trim() != value
}

fn quote_if_needed(value: &str) -> String {
    if !needs_quotes(value) {
        return value.to_string();
    }
    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('"');
    for ch in value.chars() {
        match ch {
            '\\' => quoted.push_str("\\\\"),
            '"' => quoted.push_str("\\\""),
            '\n' => quoted.push_str("\\n"),
            '\r' => quoted.push_str("\\r"),
            other => quoted.push(other),
        }
    }
    quoted.push('"');
    quoted
}

fn unquote(value: &str) -> Result<String, String> {
    let Some(inner) = value.strip_prefix('"') else {
        return Ok(value.to_string());
    };
    let inner = inner
        .strip_suffix('"')
        .ok_or_else(|| format!("unterminated quoted value `{value}`"))?;

    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('"') => out.push('"'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some(other) => return Err(format!("unknown escape `\\{other}` in `{value}`")),
            None => return Err(format!("dangling escape in `{value}`")),
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::{parse_memo_file, quote_if_needed, render_memo_file, unquote};
    use crate::model::memo::Memo;
    use std::collections::HashSet;

    #[test]
    fn render_then_parse_reproduces_memo() {
        let memo = Memo::create_new("Plan: \"Q3\"", "line one\n---\nline three\n")
            .with_tags(&["Work".to_string(), "a:b".to_string()])
            .with_pinned(true);

        let parsed = parse_memo_file(&render_memo_file(&memo)).unwrap();
        assert_eq!(parsed.id(), memo.id());
        assert_eq!(parsed.title(), memo.title());
        assert_eq!(parsed.content(), memo.content());
        assert_eq!(parsed.created_at(), memo.created_at());
        assert_eq!(parsed.updated_at(), memo.updated_at());
        assert_eq!(parsed.version(), memo.version());
        assert!(parsed.is_pinned());
        let tags: HashSet<_> = parsed.tags().iter().cloned().collect();
        let expected: HashSet<_> = memo.tags().iter().cloned().collect();
        assert_eq!(tags, expected);
    }

    #[test]
    fn header_keys_are_written_in_stable_order() {
        let rendered = render_memo_file(&Memo::create_new("t", "body"));
        let keys: Vec<&str> = rendered
            .lines()
            .skip(1)
            .take(7)
            .filter_map(|line| line.split_once(':').map(|(key, _)| key))
            .collect();
        assert_eq!(
            keys,
            ["id", "title", "createdAt", "updatedAt", "isPinned", "version", "tags"]
        );
        assert!(rendered.ends_with("---\nbody"));
    }

    #[test]
    fn parse_accepts_crlf_missing_version_and_unknown_keys() {
        let text = "---\r\nid: 0b6f3d4e-8a51-4f7e-9d55-2c0c8f0e1a11\r\ntitle: hello\r\n\
                    createdAt: 2024-01-02T03:04:05.0000000+00:00\r\nisPinned: False\r\n\
                    color: blue\r\ntags:\r\n  - one\r\n  - \"two: three\"\r\n---\r\nbody\r\n";
        let memo = parse_memo_file(text).unwrap();
        assert_eq!(memo.title(), "hello");
        assert_eq!(memo.version(), 1);
        assert_eq!(memo.updated_at(), memo.created_at());
        assert_eq!(memo.tags(), ["one".to_string(), "two: three".to_string()]);
        assert_eq!(memo.content(), "body\r\n");
    }

    #[test]
    fn missing_opening_or_unterminated_header_is_rejected() {
        assert!(parse_memo_file("id: x\n---\nbody").is_err());
        assert!(parse_memo_file("---\nid: 0b6f3d4e-8a51-4f7e-9d55-2c0c8f0e1a11\n").is_err());
        assert!(parse_memo_file("").is_err());
    }

    #[test]
    fn missing_id_is_rejected() {
        let err = parse_memo_file("---\ntitle: x\ncreatedAt: 2024-01-01T00:00:00Z\n---\n")
            .unwrap_err();
        assert!(err.contains("id"));
    }

    #[test]
    fn quoting_escapes_special_characters() {
        assert_eq!(quote_if_needed("plain"), "plain");
        assert_eq!(quote_if_needed("a:b"), "\"a:b\"");
        assert_eq!(quote_if_needed("say \"hi\""), "\"say \\\"hi\\\"\"");
        assert_eq!(unquote(&quote_if_needed("x\\y\nz")).unwrap(), "x\\y\nz");
        assert!(unquote("\"open").is_err());
    }
}
