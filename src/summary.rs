//! Run summary: one record per item, printed to stdout at the end of a run.

use std::fmt;
use std::io::Write;

use chrono::{DateTime, Utc};

use crate::error::MigrationError;
use crate::models::Pid;
use crate::router::ItemOutcome;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemStatus {
    Migrated,
    AlreadyPresent,
    Incomplete,
    Skipped,
    Failed,
}

impl ItemStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemStatus::Migrated => "migrated",
            ItemStatus::AlreadyPresent => "already present",
            ItemStatus::Incomplete => "incomplete",
            ItemStatus::Skipped => "skipped",
            ItemStatus::Failed => "failed",
        }
    }

    const ALL: [ItemStatus; 5] = [
        ItemStatus::Migrated,
        ItemStatus::AlreadyPresent,
        ItemStatus::Incomplete,
        ItemStatus::Skipped,
        ItemStatus::Failed,
    ];
}

impl fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemRecord {
    pub item_id: String,
    pub pid: Option<Pid>,
    pub status: ItemStatus,
    pub reasons: Vec<String>,
}

impl ItemRecord {
    /// Classify a routing result. Lookup and missing-file errors are skips,
    /// everything else is a failure.
    pub fn from_result(item_id: &str, result: Result<ItemOutcome, MigrationError>) -> Self {
        let (pid, status, reasons) = match result {
            Ok(ItemOutcome::Migrated { pid }) => (Some(pid), ItemStatus::Migrated, Vec::new()),
            Ok(ItemOutcome::AlreadyPresent { pid }) => {
                (Some(pid), ItemStatus::AlreadyPresent, Vec::new())
            }
            Ok(ItemOutcome::Incomplete { pid, issues }) => {
                (Some(pid), ItemStatus::Incomplete, issues)
            }
            Err(e) if e.is_skip() => (None, ItemStatus::Skipped, vec![e.to_string()]),
            Err(e) => (None, ItemStatus::Failed, vec![e.to_string()]),
        };
        Self {
            item_id: item_id.to_string(),
            pid,
            status,
            reasons,
        }
    }
}

#[derive(Debug, Clone)]
pub struct MigrationSummary {
    /// `collection flood` or `item 31735…`
    pub scope: String,
    pub started: DateTime<Utc>,
    pub finished: Option<DateTime<Utc>>,
    pub records: Vec<ItemRecord>,
}

impl MigrationSummary {
    pub fn new(scope: impl Into<String>) -> Self {
        Self {
            scope: scope.into(),
            started: Utc::now(),
            finished: None,
            records: Vec::new(),
        }
    }

    pub fn push(&mut self, record: ItemRecord) {
        self.records.push(record);
    }

    pub fn finish(&mut self) {
        self.finished = Some(Utc::now());
    }

    pub fn count(&self, status: ItemStatus) -> usize {
        self.records.iter().filter(|r| r.status == status).count()
    }

    /// False when any item failed or was left incomplete.
    pub fn is_success(&self) -> bool {
        self.count(ItemStatus::Failed) == 0 && self.count(ItemStatus::Incomplete) == 0
    }

    pub fn elapsed(&self) -> chrono::Duration {
        self.finished.unwrap_or_else(Utc::now) - self.started
    }

    pub fn write_to(&self, out: &mut impl Write) -> std::io::Result<()> {
        writeln!(out, "Migration summary: {}", self.scope)?;
        writeln!(out, "  items:           {}", self.records.len())?;
        for status in ItemStatus::ALL {
            writeln!(out, "  {:<16} {}", format!("{}:", status), self.count(status))?;
        }
        let elapsed = self.elapsed();
        writeln!(
            out,
            "  elapsed:         {}.{:03}s",
            elapsed.num_seconds(),
            elapsed.num_milliseconds().rem_euclid(1000)
        )?;

        let problems: Vec<&ItemRecord> = self
            .records
            .iter()
            .filter(|r| !r.reasons.is_empty())
            .collect();
        if !problems.is_empty() {
            writeln!(out)?;
            for record in problems {
                let target = record
                    .pid
                    .as_ref()
                    .map(|p| format!(" ({})", p))
                    .unwrap_or_default();
                writeln!(out, "  {} {}{}", record.status, record.item_id, target)?;
                for reason in &record.reasons {
                    writeln!(out, "    - {}", reason)?;
                }
            }
        }
        Ok(())
    }

    pub fn print(&self) {
        let stdout = std::io::stdout();
        let _ = self.write_to(&mut stdout.lock());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary() -> MigrationSummary {
        let mut s = MigrationSummary::new("collection flood");
        s.push(ItemRecord::from_result(
            "a",
            Ok(ItemOutcome::Migrated {
                pid: Pid::from("hpitt:a"),
            }),
        ));
        s.push(ItemRecord::from_result(
            "b",
            Ok(ItemOutcome::AlreadyPresent {
                pid: Pid::from("hpitt:b"),
            }),
        ));
        s.push(ItemRecord::from_result(
            "c",
            Err(MigrationError::MissingRequiredFile {
                item: "c".into(),
                file_use: "MODS".into(),
            }),
        ));
        s.finish();
        s
    }

    #[test]
    fn skips_do_not_fail_the_run() {
        let s = summary();
        assert_eq!(s.count(ItemStatus::Migrated), 1);
        assert_eq!(s.count(ItemStatus::AlreadyPresent), 1);
        assert_eq!(s.count(ItemStatus::Skipped), 1);
        assert!(s.is_success());
    }

    #[test]
    fn incomplete_and_failed_items_fail_the_run() {
        let mut s = summary();
        s.push(ItemRecord::from_result(
            "d",
            Ok(ItemOutcome::Incomplete {
                pid: Pid::from("hpitt:d"),
                issues: vec!["page 00000002: no label".into()],
            }),
        ));
        assert!(!s.is_success());

        let mut s = summary();
        s.push(ItemRecord::from_result(
            "e",
            Err(MigrationError::SequenceParse("cover".into())),
        ));
        assert_eq!(s.count(ItemStatus::Failed), 1);
        assert!(!s.is_success());
    }

    #[test]
    fn report_lists_reasons_per_item() {
        let mut out = Vec::new();
        summary().write_to(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("Migration summary: collection flood"));
        assert!(text.contains("migrated:        1"));
        assert!(text.contains("skipped c"));
        assert!(text.contains("MODS"));
        assert!(!text.contains("migrated a"));
    }
}
