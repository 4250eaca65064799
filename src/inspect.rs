//! `inspect` subcommand: read a saved log back and summarize it

use anyhow::{Context, Result};
use std::path::Path;

use crate::data::{Key, LogDocument, KEY_COUNT};
use crate::pad::{PadTracker, PadTransition};

/// Aggregate view of a recorded session
#[derive(Debug)]
pub struct LogSummary {
    pub records: usize,
    /// Records in which each key was held, by ordinal order
    pub held_counts: [usize; KEY_COUNT],
    pub transitions: Vec<PadTransition>,
}

impl LogSummary {
    pub fn from_document(doc: &LogDocument) -> Self {
        let mut held_counts = [0; KEY_COUNT];
        let mut tracker = PadTracker::new();
        let mut transitions = Vec::new();

        for record in &doc.data {
            for key in record.presses.pressed_keys() {
                held_counts[key.index()] += 1;
            }
            transitions.extend(tracker.update(record));
        }

        Self {
            records: doc.len(),
            held_counts,
            transitions,
        }
    }

    pub fn held_ratio(&self, key: Key) -> f64 {
        if self.records == 0 {
            return 0.0;
        }
        self.held_counts[key.index()] as f64 / self.records as f64
    }
}

/// Load `path` and print its summary to stdout
pub fn run(path: &Path) -> Result<()> {
    let doc = LogDocument::load(path).with_context(|| format!("Failed to load {:?}", path))?;
    if doc.is_empty() {
        println!("{}: no records", path.display());
        return Ok(());
    }
    let summary = LogSummary::from_document(&doc);

    println!("{}: {} records", path.display(), summary.records);
    println!();
    println!("KEY       HELD");
    for key in Key::ALL {
        println!(
            "{:<8} {:>5.1}%",
            key.name(),
            summary.held_ratio(key) * 100.0
        );
    }

    if !summary.transitions.is_empty() {
        println!();
        println!("TRANSITIONS");
        for t in &summary.transitions {
            let signal = t
                .signal
                .map(|s| s.to_string())
                .unwrap_or_else(|| "-".to_string());
            println!(
                "{:>6}  {:<6} {:<8} {}",
                t.count,
                t.key.name(),
                if t.pressed { "press" } else { "release" },
                signal
            );
        }
    }
    Ok(())
}
