//! Outcome log for ruleset proposals.
//!
//! Layout:
//!   .distill/history.yaml   most recent outcomes, oldest first
//!
//! The proposal layer reports every terminal outcome (commit, rejection,
//! cancellation) through [`OutcomeSink`]; the host decides where it goes.

use crate::error::Result;
use crate::proposal::Outcome;
use crate::{io, paths};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Maximum entries kept in the history file.
pub const HISTORY_LIMIT: usize = 200;

/// Receives the outcome of a proposed ruleset change.
pub trait OutcomeSink {
    fn report(&mut self, outcome: &Outcome) -> Result<()>;
}

impl OutcomeSink for Vec<Outcome> {
    fn report(&mut self, outcome: &Outcome) -> Result<()> {
        self.push(outcome.clone());
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub timestamp: DateTime<Utc>,
    pub outcome: Outcome,
}

// ---------------------------------------------------------------------------
// HistoryLog
// ---------------------------------------------------------------------------

/// File-backed sink writing to `.distill/history.yaml`.
pub struct HistoryLog {
    path: PathBuf,
}

impl HistoryLog {
    pub fn new(root: &Path) -> Self {
        Self {
            path: paths::history_path(root),
        }
    }

    pub fn entries(&self) -> Result<Vec<HistoryEntry>> {
        Ok(io::read_yaml_opt(&self.path)?.unwrap_or_default())
    }
}

impl OutcomeSink for HistoryLog {
    fn report(&mut self, outcome: &Outcome) -> Result<()> {
        let mut entries = self.entries()?;
        entries.push(HistoryEntry {
            timestamp: Utc::now(),
            outcome: outcome.clone(),
        });
        if entries.len() > HISTORY_LIMIT {
            entries.drain(..entries.len() - HISTORY_LIMIT);
        }
        let data = serde_yaml::to_string(&entries)?;
        io::atomic_write(&self.path, data.as_bytes())?;
        tracing::info!(outcome = outcome.label(), "proposal outcome recorded");
        Ok(())
    }
}

/// All recorded outcomes, oldest first.
pub fn list(root: &Path) -> Result<Vec<HistoryEntry>> {
    HistoryLog::new(root).entries()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn report_appends() {
        let dir = TempDir::new().unwrap();
        let mut log = HistoryLog::new(dir.path());
        log.report(&Outcome::Cancelled { entries: 2 }).unwrap();
        log.report(&Outcome::Rejected {
            feedback: "too vague".to_string(),
        })
        .unwrap();

        let entries = list(dir.path()).unwrap();
        assert_eq!(entries.len(), 2);
        assert!(matches!(entries[0].outcome, Outcome::Cancelled { entries: 2 }));
        assert!(matches!(
            entries[1].outcome,
            Outcome::Rejected { ref feedback } if feedback == "too vague"
        ));
    }

    #[test]
    fn history_is_trimmed() {
        let dir = TempDir::new().unwrap();
        let mut log = HistoryLog::new(dir.path());
        for i in 0..(HISTORY_LIMIT + 3) {
            log.report(&Outcome::Cancelled { entries: i }).unwrap();
        }
        let entries = list(dir.path()).unwrap();
        assert_eq!(entries.len(), HISTORY_LIMIT);
        assert!(matches!(entries[0].outcome, Outcome::Cancelled { entries: 3 }));
    }

    #[test]
    fn missing_history_is_empty() {
        let dir = TempDir::new().unwrap();
        assert!(list(dir.path()).unwrap().is_empty());
    }
}
