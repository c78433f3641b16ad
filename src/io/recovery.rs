//! Append-only journal of optimistic edits the server refused.
//!
//! When a mutation fails the cache rolls back, which would silently drop
//! what the user typed. Each rollback is written here as a markdown block so
//! it can be re-entered by hand (`tb recovery`).

use std::fmt;
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use tracing::warn;

use super::atomic_write;

/// Journal size that triggers pruning of entries older than [`PRUNE_AGE_DAYS`].
const MAX_LOG_SIZE: u64 = 512 * 1024;

pub const PRUNE_AGE_DAYS: i64 = 30;

const FILE_HEADER: &str = "\
<!-- taskboard recovery log: edits the server rejected
     Each entry is a change that was rolled back locally.
     View with: tb recovery
     Prune with: tb recovery --prune
     Safe to delete. -->

---
";

/// Separator between timestamp and category in an entry header
const HEADER_SEP: &str = " - ";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RecoveryCategory {
    /// A mutation failed and the cache was reverted
    Rollback,
    /// A pending edit was dropped before it was sent
    Discarded,
}

impl fmt::Display for RecoveryCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecoveryCategory::Rollback => write!(f, "rollback"),
            RecoveryCategory::Discarded => write!(f, "discarded"),
        }
    }
}

impl RecoveryCategory {
    pub fn parse_category(s: &str) -> Option<Self> {
        match s {
            "rollback" => Some(RecoveryCategory::Rollback),
            "discarded" => Some(RecoveryCategory::Discarded),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecoveryEntry {
    pub timestamp: DateTime<Utc>,
    pub category: RecoveryCategory,
    pub description: String,
    pub fields: Vec<(String, String)>,
    pub body: String,
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

    pub fn field(mut self, key: &str, value: impl fmt::Display) -> Self {
        self.fields.push((key.to_string(), value.to_string()));
        self
    }

    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    pub fn to_markdown(&self) -> String {
        let mut out = format!(
            "## {}{}{}: {}\n\n",
            self.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true),
            HEADER_SEP,
            self.category,
            self.description,
        );
        for (key, value) in &self.fields {
            out.push_str(&format!("{}: {}\n", key, value));
        }
        if !self.body.is_empty() {
            out.push_str("\n```json\n");
            out.push_str(self.body.trim_end_matches('\n'));
            out.push_str("\n```\n");
        }
        out.push_str("\n---\n");
        out
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecoverySummary {
    pub entry_count: usize,
    pub oldest: Option<DateTime<Utc>>,
}

pub fn recovery_log_path(dir: &Path) -> PathBuf {
    dir.join("recovery.log")
}

// ---------------------------------------------------------------------------
// Writing
// ---------------------------------------------------------------------------

/// Append an entry. Failures are logged and otherwise ignored: a journal
/// problem must never turn into a failed user action.
pub fn log_recovery(dir: &Path, entry: RecoveryEntry) {
    if let Err(e) = append(dir, &entry) {
        warn!(error = %e, dir = %dir.display(), "could not write recovery log");
    }
}

fn append(dir: &Path, entry: &RecoveryEntry) -> io::Result<()> {
    std::fs::create_dir_all(dir)?;
    let path = recovery_log_path(dir);

    let len = std::fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
    if len > MAX_LOG_SIZE {
        let content = std::fs::read_to_string(&path)?;
        let cutoff = Utc::now() - chrono::Duration::days(PRUNE_AGE_DAYS);
        atomic_write(&path, prune_before(&content, cutoff).as_bytes())?;
    }

    let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
    if len == 0 {
        file.write_all(FILE_HEADER.as_bytes())?;
    }
    file.write_all(entry.to_markdown().as_bytes())
}

// ---------------------------------------------------------------------------
// Reading
// ---------------------------------------------------------------------------

/// Entries newest first, optionally limited to the `limit` most recent and
/// to those at or after `since`. A missing journal reads as empty.
pub fn read_entries(
    dir: &Path,
    limit: Option<usize>,
    since: Option<DateTime<Utc>>,
) -> Vec<RecoveryEntry> {
    let Ok(content) = std::fs::read_to_string(recovery_log_path(dir)) else {
        return Vec::new();
    };
    let mut entries = parse_entries(&content);
    if let Some(since) = since {
        entries.retain(|e| e.timestamp >= since);
    }
    entries.reverse();
    if let Some(n) = limit {
        entries.truncate(n);
    }
    entries
}

pub fn recovery_summary(dir: &Path) -> Option<RecoverySummary> {
    let content = std::fs::read_to_string(recovery_log_path(dir)).ok()?;
    let entries = parse_entries(&content);
    let oldest = entries.first()?.timestamp;
    Some(RecoverySummary {
        entry_count: entries.len(),
        oldest: Some(oldest),
    })
}

fn parse_header(header: &str) -> Option<(DateTime<Utc>, RecoveryCategory, String)> {
    let (timestamp, rest) = header.split_once(HEADER_SEP)?;
    let timestamp = DateTime::parse_from_rfc3339(timestamp).ok()?.with_timezone(&Utc);
    let (category, description) = rest.split_once(": ")?;
    let category = RecoveryCategory::parse_category(category)?;
    Some((timestamp, category, description.to_string()))
}

fn parse_entries(content: &str) -> Vec<RecoveryEntry> {
    let mut entries = Vec::new();
    let mut current: Option<RecoveryEntry> = None;
    let mut in_body = false;

    for line in content.lines() {
        if in_body {
            if line == "```" {
                in_body = false;
            } else if let Some(entry) = current.as_mut() {
                if !entry.body.is_empty() {
                    entry.body.push('\n');
                }
                entry.body.push_str(line);
            }
            continue;
        }
        if let Some(header) = line.strip_prefix("## ") {
            entries.extend(current.take());
            current = parse_header(header).map(|(timestamp, category, description)| {
                RecoveryEntry {
                    timestamp,
                    category,
                    description,
                    fields: Vec::new(),
                    body: String::new(),
                }
            });
            continue;
        }
        let Some(entry) = current.as_mut() else {
            continue;
        };
        if line == "---" {
            entries.extend(current.take());
        } else if line.starts_with("```") {
            in_body = true;
        } else if let Some((key, value)) = line.trim().split_once(": ") {
            entry.fields.push((key.to_string(), value.to_string()));
        }
    }
    entries.extend(current);
    entries
}

// ---------------------------------------------------------------------------
// Pruning
// ---------------------------------------------------------------------------

/// Drop entries older than `before` (default: [`PRUNE_AGE_DAYS`] ago), or
/// every entry when `all` is set. Returns how many were removed.
pub fn prune_recovery(dir: &Path, before: Option<DateTime<Utc>>, all: bool) -> io::Result<usize> {
    let path = recovery_log_path(dir);
    let content = match std::fs::read_to_string(&path) {
        Ok(content) => content,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e),
    };
    let count = parse_entries(&content).len();
    let kept = if all {
        FILE_HEADER.to_string()
    } else {
        let cutoff = before.unwrap_or_else(|| Utc::now() - chrono::Duration::days(PRUNE_AGE_DAYS));
        prune_before(&content, cutoff)
    };
    let remaining = parse_entries(&kept).len();
    atomic_write(&path, kept.as_bytes())?;
    Ok(count - remaining)
}

/// Rebuild the journal keeping the header and entries at or after `cutoff`.
fn prune_before(content: &str, cutoff: DateTime<Utc>) -> String {
    let kept: String = parse_entries(content)
        .iter()
        .filter(|e| e.timestamp >= cutoff)
        .map(RecoveryEntry::to_markdown)
        .collect();
    format!("{}{}", FILE_HEADER, kept)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn rollback(desc: &str) -> RecoveryEntry {
        RecoveryEntry::new(RecoveryCategory::Rollback, desc)
            .field("Task", 12)
            .field("Error", "request failed (500): boom")
    }

    fn aged(desc: &str, days: i64) -> RecoveryEntry {
        let mut entry = rollback(desc);
        entry.timestamp = Utc::now() - chrono::Duration::days(days);
        entry
    }

    #[test]
    fn markdown_layout() {
        let md = rollback("status change").body("{\"status\":\"done\"}").to_markdown();
        assert!(md.starts_with("## "));
        assert!(md.contains(" - rollback: status change\n"));
        assert!(md.contains("Task: 12\n"));
        assert!(md.contains("```json\n{\"status\":\"done\"}\n```\n"));
        assert!(md.ends_with("---\n"));
    }

    #[test]
    fn no_fence_without_body() {
        assert!(!rollback("x").to_markdown().contains("```"));
    }

    #[test]
    fn header_written_once() {
        let tmp = TempDir::new().unwrap();
        log_recovery(tmp.path(), rollback("one"));
        log_recovery(tmp.path(), rollback("two"));
        let content = std::fs::read_to_string(recovery_log_path(tmp.path())).unwrap();
        assert!(content.starts_with("<!-- taskboard recovery log"));
        assert_eq!(content.matches("taskboard recovery log").count(), 1);
    }

    #[test]
    fn written_entries_read_back_newest_first() {
        let tmp = TempDir::new().unwrap();
        log_recovery(tmp.path(), rollback("first").body("{\n  \"story_points\": 8\n}"));
        log_recovery(
            tmp.path(),
            RecoveryEntry::new(RecoveryCategory::Discarded, "second"),
        );

        let entries = read_entries(tmp.path(), None, None);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].description, "second");
        assert_eq!(entries[0].category, RecoveryCategory::Discarded);
        assert_eq!(entries[1].body, "{\n  \"story_points\": 8\n}");
        assert_eq!(
            entries[1].fields,
            vec![
                ("Task".to_string(), "12".to_string()),
                ("Error".to_string(), "request failed (500): boom".to_string()),
            ]
        );
    }

    #[test]
    fn limit_and_since() {
        let tmp = TempDir::new().unwrap();
        log_recovery(tmp.path(), aged("old", 10));
        for i in 0..3 {
            log_recovery(tmp.path(), rollback(&format!("new{}", i)));
        }
        let limited = read_entries(tmp.path(), Some(2), None);
        let names: Vec<&str> = limited.iter().map(|e| e.description.as_str()).collect();
        assert_eq!(names, vec!["new2", "new1"]);

        let since = Utc::now() - chrono::Duration::days(5);
        assert_eq!(read_entries(tmp.path(), None, Some(since)).len(), 3);
    }

    #[test]
    fn missing_journal_is_empty() {
        let tmp = TempDir::new().unwrap();
        assert!(read_entries(&tmp.path().join("nope"), None, None).is_empty());
        assert!(recovery_summary(tmp.path()).is_none());
        assert_eq!(prune_recovery(tmp.path(), None, true).unwrap(), 0);
    }

    #[test]
    fn summary_reports_oldest() {
        let tmp = TempDir::new().unwrap();
        let old = aged("old", 3);
        let oldest = old.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true);
        log_recovery(tmp.path(), old);
        log_recovery(tmp.path(), rollback("new"));
        let summary = recovery_summary(tmp.path()).unwrap();
        assert_eq!(summary.entry_count, 2);
        assert_eq!(
            summary.oldest.map(|t| t.to_rfc3339_opts(SecondsFormat::Secs, true)),
            Some(oldest)
        );
    }

    #[test]
    fn prune_by_age_and_all() {
        let tmp = TempDir::new().unwrap();
        log_recovery(tmp.path(), aged("ancient", 60));
        log_recovery(tmp.path(), rollback("fresh"));

        assert_eq!(prune_recovery(tmp.path(), None, false).unwrap(), 1);
        let entries = read_entries(tmp.path(), None, None);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].description, "fresh");

        assert_eq!(prune_recovery(tmp.path(), None, true).unwrap(), 1);
        assert!(read_entries(tmp.path(), None, None).is_empty());
        let content = std::fs::read_to_string(recovery_log_path(tmp.path())).unwrap();
        assert!(content.contains("taskboard recovery log"));
    }

    #[test]
    fn header_parsing() {
        let (ts, category, desc) =
            parse_header("2026-02-10T14:32:05Z - rollback: move task 4").unwrap();
        assert_eq!(ts.to_rfc3339_opts(SecondsFormat::Secs, true), "2026-02-10T14:32:05Z");
        assert_eq!(category, RecoveryCategory::Rollback);
        assert_eq!(desc, "move task 4");
        assert!(parse_header("garbage").is_none());
        assert!(parse_header("2026-02-10T14:32:05Z - parser: x").is_none());
    }

    #[test]
    fn entry_serializes_for_json_output() {
        let json = serde_json::to_value(rollback("x")).unwrap();
        assert_eq!(json["category"], "rollback");
        assert_eq!(json["fields"][0][0], "Task");
    }
}
