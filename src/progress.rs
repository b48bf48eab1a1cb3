//! Collection walk progress reporting.
//!
//! Emitted on **stderr** so stdout stays reserved for the run summary and
//! `--dry-run` plans.

use std::io::Write;

/// A single progress event during a collection walk.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WalkEvent {
    /// Items for the collection were loaded from the legacy store.
    Started { collection: String, total: u64 },
    /// Item `n` of `total` has been routed.
    Item {
        collection: String,
        item: String,
        n: u64,
        total: u64,
        status: &'static str,
    },
}

/// Receives walk progress. Implementations write to stderr (human or JSON).
pub trait ProgressReporter: Send + Sync {
    fn report(&self, event: WalkEvent);
}

/// `walking flood  12 / 1,034 items  (31735051234567 migrated)`
pub struct StderrProgress;

impl ProgressReporter for StderrProgress {
    fn report(&self, event: WalkEvent) {
        let line = match &event {
            WalkEvent::Started { collection, total } => {
                format!("walking {}  {} items\n", collection, format_number(*total))
            }
            WalkEvent::Item {
                collection,
                item,
                n,
                total,
                status,
            } => format!(
                "walking {}  {} / {} items  ({} {})\n",
                collection,
                format_number(*n),
                format_number(*total),
                item,
                status
            ),
        };
        let mut err = std::io::stderr().lock();
        let _ = err.write_all(line.as_bytes());
        let _ = err.flush();
    }
}

/// One JSON object per line on stderr.
pub struct JsonProgress;

impl ProgressReporter for JsonProgress {
    fn report(&self, event: WalkEvent) {
        let obj = match &event {
            WalkEvent::Started { collection, total } => serde_json::json!({
                "event": "started",
                "collection": collection,
                "total": total
            }),
            WalkEvent::Item {
                collection,
                item,
                n,
                total,
                status,
            } => serde_json::json!({
                "event": "item",
                "collection": collection,
                "item": item,
                "n": n,
                "total": total,
                "status": status
            }),
        };
        if let Ok(line) = serde_json::to_string(&obj) {
            let mut err = std::io::stderr().lock();
            let _ = writeln!(err, "{}", line);
            let _ = err.flush();
        }
    }
}

pub struct NoProgress;

impl ProgressReporter for NoProgress {
    fn report(&self, _event: WalkEvent) {}
}

fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + s.len() / 3);
    for (i, c) in s.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    result.chars().rev().collect()
}

/// `--progress` mode.
#[derive(Clone, Copy, Debug, Eq, PartialEq, clap::ValueEnum)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    pub fn reporter(&self) -> Box<dyn ProgressReporter> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_number_groups_thousands() {
        assert_eq!(format_number(0), "0");
        assert_eq!(format_number(999), "999");
        assert_eq!(format_number(1000), "1,000");
        assert_eq!(format_number(1_234_567), "1,234,567");
    }
}
