use std::fmt;
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

/// Default number of days before entries are prunable.
pub const PRUNE_AGE_DAYS: i64 = 30;

/// The oldest entries are dropped to keep the log under this size.
pub const MAX_LOG_SIZE: usize = 1_048_576;

/// Bodies longer than this are cut before they are logged.
pub const MAX_BODY_SIZE: usize = 256 * 1024;

/// Header written at the top of a new recovery log.
const FILE_HEADER: &str = "\
<!-- notebox recovery log: append-only copies of note data that could not be saved normally.
     View with: nb recovery
     Prune old entries: nb recovery prune
     Safe to delete if empty or stale. -->

---
";

/// Category of a recovery entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryCategory {
    /// A stored collection could not be parsed
    Corrupt,
    /// A move between collections left the store inconsistent
    Move,
}

impl fmt::Display for RecoveryCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecoveryCategory::Corrupt => write!(f, "corrupt"),
            RecoveryCategory::Move => write!(f, "move"),
        }
    }
}

impl RecoveryCategory {
    pub fn parse_category(s: &str) -> Option<Self> {
        match s {
            "corrupt" => Some(RecoveryCategory::Corrupt),
            "move" => Some(RecoveryCategory::Move),
            _ => None,
        }
    }

    /// Info string for the body's code block. Corrupt payloads are not JSON.
    fn body_lang(self) -> &'static str {
        match self {
            RecoveryCategory::Corrupt => "text",
            RecoveryCategory::Move => "json",
        }
    }
}

/// A single entry in the recovery log.
#[derive(Debug, Clone, PartialEq)]
pub struct RecoveryEntry {
    pub timestamp: DateTime<Utc>,
    pub category: RecoveryCategory,
    pub description: String,
    pub fields: Vec<(String, String)>,
    pub body: String,
}

pub fn recovery_log_path(data_dir: &Path) -> PathBuf {
    data_dir.join(".recovery.log")
}

impl RecoveryEntry {
    pub fn new(category: RecoveryCategory, description: impl Into<String>) -> Self {
        RecoveryEntry {
            timestamp: Utc::now(),
            category,
            description: description.into(),
            fields: Vec::new(),
            body: String::new(),
        }
    }

    pub fn field(mut self, key: &str, value: impl Into<String>) -> Self {
        self.fields.push((key.to_string(), value.into()));
        self
    }

    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    /// Format this entry as a markdown block for the recovery log.
    fn to_markdown(&self) -> String {
        let mut out = format!(
            "## {} - {}: {}\n\n",
            self.timestamp
                .to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
            self.category,
            self.description,
        );

        for (key, value) in &self.fields {
            out.push_str(&format!("{}: {}\n", key, value));
        }

        if !self.body.is_empty() {
            let fence = fence_for(&self.body);
            out.push_str(&format!("\n{}{}\n", fence, self.category.body_lang()));
            out.push_str(&self.body);
            if !self.body.ends_with('\n') {
                out.push('\n');
            }
            out.push_str(&fence);
            out.push('\n');
        }

        out.push_str("\n---\n");
        out
    }

    /// A corrupt payload already on record. Repeated reads of the same bad
    /// data must not grow the log.
    fn repeats(&self, other: &RecoveryEntry) -> bool {
        self.category == RecoveryCategory::Corrupt
            && self.category == other.category
            && self.description == other.description
            && self.fields == other.fields
            && self.body.lines().eq(other.body.lines())
    }

    /// Cut an oversized body at a char boundary, noting the original size.
    fn truncate_body(&mut self) {
        if self.body.len() <= MAX_BODY_SIZE {
            return;
        }
        let mut cut = MAX_BODY_SIZE;
        while !self.body.is_char_boundary(cut) {
            cut -= 1;
        }
        let original = self.body.len();
        self.body.truncate(cut);
        self.fields
            .push(("Truncated".to_string(), format!("kept {} of {} bytes", cut, original)));
    }

    pub fn to_json(&self) -> serde_json::Value {
        let fields: serde_json::Map<String, serde_json::Value> = self
            .fields
            .iter()
            .map(|(k, v)| (k.clone(), serde_json::Value::String(v.clone())))
            .collect();

        serde_json::json!({
            "timestamp": self.timestamp.to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
            "category": self.category.to_string(),
            "description": self.description,
            "fields": fields,
            "body": self.body,
        })
    }
}

// ---------------------------------------------------------------------------
// Writing
// ---------------------------------------------------------------------------

/// Append a recovery entry to the log, unless the same corrupt payload is
/// already recorded. Failures are logged as warnings and otherwise ignored
/// so they never hide the error being recorded.
pub fn log_recovery(data_dir: &Path, entry: RecoveryEntry) {
    if let Err(e) = append_entry(data_dir, entry) {
        log::warn!("could not write to recovery log: {}", e);
    }
}

/// A fence longer than any run of backticks in `body`.
fn fence_for(body: &str) -> String {
    let longest = body.split(|c| c != '`').map(str::len).max().unwrap_or(0);
    "`".repeat(longest.max(2) + 1)
}

fn append_entry(data_dir: &Path, mut entry: RecoveryEntry) -> io::Result<()> {
    let path = recovery_log_path(data_dir);
    entry.truncate_body();

    let content = match std::fs::read_to_string(&path) {
        Ok(c) => c,
        Err(e) if e.kind() == io::ErrorKind::NotFound => String::new(),
        Err(e) => return Err(e),
    };
    let existing = parse_entries(&content);
    if existing.iter().any(|e| e.repeats(&entry)) {
        log::debug!("recovery log already holds: {}", entry.description);
        return Ok(());
    }

    let block = entry.to_markdown();
    if content.len() + block.len() <= MAX_LOG_SIZE {
        let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
        if content.is_empty() {
            file.write_all(FILE_HEADER.as_bytes())?;
        }
        return file.write_all(block.as_bytes());
    }

    // Over the cap: rewrite without the oldest entries
    let blocks: Vec<String> = existing.iter().map(RecoveryEntry::to_markdown).collect();
    let mut size = FILE_HEADER.len() + block.len() + blocks.iter().map(String::len).sum::<usize>();
    let mut dropped = 0;
    while size > MAX_LOG_SIZE && dropped < blocks.len() {
        size -= blocks[dropped].len();
        dropped += 1;
    }
    log::warn!(
        "recovery log is over {} bytes, dropping its {} oldest entries",
        MAX_LOG_SIZE,
        dropped
    );

    let mut out = String::with_capacity(size);
    out.push_str(FILE_HEADER);
    for kept in &blocks[dropped..] {
        out.push_str(kept);
    }
    out.push_str(&block);
    crate::io::kv::atomic_write(&path, out.as_bytes())
}

// ---------------------------------------------------------------------------
// Reading
// ---------------------------------------------------------------------------

/// Read recovery entries, most recent first.
pub fn read_recovery_entries(data_dir: &Path, limit: Option<usize>) -> Vec<RecoveryEntry> {
    let content = match std::fs::read_to_string(recovery_log_path(data_dir)) {
        Ok(c) => c,
        Err(_) => return Vec::new(),
    };

    let mut entries = parse_entries(&content);
    if let Some(n) = limit {
        let skip = entries.len().saturating_sub(n);
        entries.drain(..skip);
    }
    entries.reverse();
    entries
}

fn parse_entries(content: &str) -> Vec<RecoveryEntry> {
    let mut entries = Vec::new();
    let mut lines = content.lines();

    while let Some(line) = lines.next() {
        let Some(header) = line.strip_prefix("## ") else {
            continue;
        };
        let Some((timestamp, category, description)) = parse_entry_header(header) else {
            continue;
        };

        let mut fields = Vec::new();
        let mut body = Vec::new();
        let mut fence: Option<&str> = None;

        for line in lines.by_ref() {
            if let Some(open) = fence {
                if line == open {
                    fence = None;
                } else {
                    body.push(line);
                }
                continue;
            }
            if line == "---" {
                break;
            }
            if line.starts_with("```") {
                let ticks = line.len() - line.trim_start_matches('`').len();
                fence = Some(&line[..ticks]);
                continue;
            }
            if let Some((key, value)) = line.trim().split_once(": ") {
                fields.push((key.to_string(), value.to_string()));
            }
        }

        entries.push(RecoveryEntry {
            timestamp,
            category,
            description,
            fields,
            body: body.join("\n"),
        });
    }

    entries
}

/// Parse an entry header: `<timestamp> - <category>: <description>`
fn parse_entry_header(header: &str) -> Option<(DateTime<Utc>, RecoveryCategory, String)> {
    let (timestamp_str, rest) = header.split_once(" - ")?;
    let timestamp = DateTime::parse_from_rfc3339(timestamp_str)
        .ok()?
        .with_timezone(&Utc);
    let (category_str, description) = rest.split_once(": ")?;
    let category = RecoveryCategory::parse_category(category_str)?;
    Some((timestamp, category, description.to_string()))
}

// ---------------------------------------------------------------------------
// Pruning
// ---------------------------------------------------------------------------

/// Drop entries older than `before` (default: `PRUNE_AGE_DAYS` ago), or all
/// entries. Returns the number removed.
pub fn prune_recovery(
    data_dir: &Path,
    before: Option<DateTime<Utc>>,
    all: bool,
) -> io::Result<usize> {
    let path = recovery_log_path(data_dir);
    let content = match std::fs::read_to_string(&path) {
        Ok(c) => c,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e),
    };

    let entries = parse_entries(&content);
    let cutoff = before.unwrap_or_else(|| Utc::now() - chrono::Duration::days(PRUNE_AGE_DAYS));
    let (kept, removed): (Vec<_>, Vec<_>) = entries
        .into_iter()
        .partition(|e| !all && e.timestamp >= cutoff);

    let mut out = String::from(FILE_HEADER);
    for entry in &kept {
        out.push_str(&entry.to_markdown());
    }
    crate::io::kv::atomic_write(&path, out.as_bytes())?;
    Ok(removed.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn entry_at(ts: &str, desc: &str) -> RecoveryEntry {
        RecoveryEntry {
            timestamp: DateTime::parse_from_rfc3339(ts).unwrap().with_timezone(&Utc),
            ..RecoveryEntry::new(RecoveryCategory::Move, desc)
        }
    }

    #[test]
    fn test_log_and_read_round_trip() {
        let tmp = TempDir::new().unwrap();
        let entry = RecoveryEntry::new(RecoveryCategory::Move, "archive of \"Groceries\" failed")
            .field("From", "active")
            .field("To", "archived")
            .body("{\"title\":\"Groceries\"}");
        log_recovery(tmp.path(), entry.clone());

        let content = std::fs::read_to_string(recovery_log_path(tmp.path())).unwrap();
        assert!(content.starts_with("<!-- notebox recovery log"));

        let entries = read_recovery_entries(tmp.path(), None);
        assert_eq!(entries.len(), 1);
        let read = &entries[0];
        assert_eq!(read.category, RecoveryCategory::Move);
        assert_eq!(read.description, entry.description);
        assert_eq!(read.fields, entry.fields);
        assert_eq!(read.body, entry.body);
    }

    fn corrupt(key: &str, body: &str) -> RecoveryEntry {
        RecoveryEntry::new(RecoveryCategory::Corrupt, format!("{} notes could not be parsed", key))
            .field("Key", key)
            .body(body)
    }

    #[test]
    fn test_body_with_backtick_lines_round_trips() {
        let tmp = TempDir::new().unwrap();
        let body = "[{\"title\": \"a\n```\n````\n---\n## not a header\n\nend";
        log_recovery(tmp.path(), corrupt("notes", body));

        let content = std::fs::read_to_string(recovery_log_path(tmp.path())).unwrap();
        assert!(content.contains("\n`````text\n"));

        let entries = read_recovery_entries(tmp.path(), None);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].body, body);
    }

    #[test]
    fn test_move_bodies_are_labelled_json() {
        let tmp = TempDir::new().unwrap();
        log_recovery(
            tmp.path(),
            RecoveryEntry::new(RecoveryCategory::Move, "m").body("{}"),
        );
        let content = std::fs::read_to_string(recovery_log_path(tmp.path())).unwrap();
        assert!(content.contains("\n```json\n{}\n```\n"));
    }

    #[test]
    fn test_same_corrupt_payload_logged_once() {
        let tmp = TempDir::new().unwrap();
        for _ in 0..3 {
            log_recovery(tmp.path(), corrupt("notes", "{not json\n"));
        }
        log_recovery(tmp.path(), corrupt("notes", "{other"));
        log_recovery(tmp.path(), corrupt("deleted", "{not json\n"));

        let entries = read_recovery_entries(tmp.path(), None);
        assert_eq!(entries.len(), 3);
    }

    #[test]
    fn test_log_stays_under_size_cap() {
        let tmp = TempDir::new().unwrap();
        for i in 0..12 {
            let body = format!("{}{}", i, "x".repeat(100_000));
            log_recovery(tmp.path(), corrupt("notes", &body));
        }

        let size = std::fs::metadata(recovery_log_path(tmp.path())).unwrap().len();
        assert!(size <= MAX_LOG_SIZE as u64, "log is {} bytes", size);

        let entries = read_recovery_entries(tmp.path(), None);
        assert!(entries.len() < 12);
        assert!(entries[0].body.starts_with("11x"));
        assert!(!entries.iter().any(|e| e.body.starts_with("0x")));
    }

    #[test]
    fn test_oversized_body_is_truncated() {
        let tmp = TempDir::new().unwrap();
        let body = "é".repeat(MAX_BODY_SIZE);
        log_recovery(tmp.path(), corrupt("archived", &body));

        let entries = read_recovery_entries(tmp.path(), None);
        assert_eq!(entries[0].body.len(), MAX_BODY_SIZE);
        assert_eq!(
            entries[0].fields.last().unwrap(),
            &(
                "Truncated".to_string(),
                format!("kept {} of {} bytes", MAX_BODY_SIZE, body.len())
            )
        );
    }

    #[test]
    fn test_read_with_limit_returns_most_recent_first() {
        let tmp = TempDir::new().unwrap();
        for i in 0..4 {
            log_recovery(
                tmp.path(),
                RecoveryEntry::new(RecoveryCategory::Corrupt, format!("entry {}", i)),
            );
        }
        let entries = read_recovery_entries(tmp.path(), Some(2));
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].description, "entry 3");
        assert_eq!(entries[1].description, "entry 2");
    }

    #[test]
    fn test_read_nonexistent_returns_empty() {
        let tmp = TempDir::new().unwrap();
        assert!(read_recovery_entries(tmp.path(), None).is_empty());
    }

    #[test]
    fn test_prune_before_cutoff() {
        let tmp = TempDir::new().unwrap();
        log_recovery(tmp.path(), entry_at("2020-01-01T00:00:00Z", "old"));
        log_recovery(tmp.path(), entry_at("2030-01-01T00:00:00Z", "new"));

        let cutoff = DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let removed = prune_recovery(tmp.path(), Some(cutoff), false).unwrap();
        assert_eq!(removed, 1);

        let entries = read_recovery_entries(tmp.path(), None);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].description, "new");
    }

    #[test]
    fn test_prune_all_keeps_header() {
        let tmp = TempDir::new().unwrap();
        log_recovery(tmp.path(), RecoveryEntry::new(RecoveryCategory::Corrupt, "x"));
        assert_eq!(prune_recovery(tmp.path(), None, true).unwrap(), 1);
        let content = std::fs::read_to_string(recovery_log_path(tmp.path())).unwrap();
        assert_eq!(content, FILE_HEADER);
    }

    #[test]
    fn test_prune_no_log_file() {
        let tmp = TempDir::new().unwrap();
        assert_eq!(prune_recovery(tmp.path(), None, true).unwrap(), 0);
    }

    #[test]
    fn test_parse_entry_header() {
        let (ts, cat, desc) =
            parse_entry_header("2024-03-05T10:00:00Z - corrupt: notes could not be parsed").unwrap();
        assert_eq!(ts.to_rfc3339(), "2024-03-05T10:00:00+00:00");
        assert_eq!(cat, RecoveryCategory::Corrupt);
        assert_eq!(desc, "notes could not be parsed");

        assert!(parse_entry_header("garbage").is_none());
        assert!(parse_entry_header("2024-03-05T10:00:00Z - unknown: x").is_none());
    }

    #[test]
    fn test_entry_to_json() {
        let entry = entry_at("2024-03-05T10:00:00Z", "d").field("Collection", "deleted");
        let json = entry.to_json();
        assert_eq!(json["timestamp"], "2024-03-05T10:00:00Z");
        assert_eq!(json["category"], "move");
        assert_eq!(json["fields"]["Collection"], "deleted");
    }
}
