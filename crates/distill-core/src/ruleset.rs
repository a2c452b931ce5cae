//! The operating-rules document: a size-capped list distilled from incidents.
//!
//! Rendered form (the file on disk is the single source of truth):
//!
//! ```text
//! # Operating Rules
//! <!-- distill revision: 4 -->
//!
//! - [WARNING] Never resubmit an order without its idempotency key (PM-001)
//! - [DIRECTIVE] Run the full backtest suite before merging (manual)
//! ```
//!
//! Entries are kept in age order: position 1 is the oldest.

use crate::config::Config;
use crate::error::{DistillError, Result};
use crate::incident::{self, IncidentRecord};
use crate::types::{Category, RuleSource};
use crate::{io, paths};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::OnceLock;

pub const HEADER_TITLE: &str = "# Operating Rules";
/// Title, revision marker, blank separator.
pub const HEADER_LINES: usize = 3;
/// Extra oldest entries listed as pruning candidates beyond the bare overflow.
pub const PRUNE_SLACK: usize = 5;

// ---------------------------------------------------------------------------
// RuleEntry
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleEntry {
    pub category: Category,
    pub statement: String,
    pub source: RuleSource,
}

impl RuleEntry {
    pub fn new(category: Category, statement: impl Into<String>, source: RuleSource) -> Self {
        Self {
            category,
            statement: statement.into().trim().to_string(),
            source,
        }
    }

    pub fn render(&self) -> String {
        format!("- [{}] {} ({})", self.category, self.statement, self.source)
    }

    /// Shape checks only; source resolution happens in the proposal layer.
    pub fn validate(&self, max_chars: usize) -> Result<()> {
        validate_statement(&self.statement, max_chars)
    }
}

pub fn validate_statement(statement: &str, max_chars: usize) -> Result<()> {
    if statement.contains(|c: char| c == '\n' || c == '\r') {
        return Err(DistillError::Validation(format!(
            "rule statement contains a line break: {:?}",
            truncate(statement, 40)
        )));
    }
    if statement.trim().is_empty() {
        return Err(DistillError::Validation("rule statement is empty".to_string()));
    }
    let len = statement.chars().count();
    if len > max_chars {
        return Err(DistillError::Validation(format!(
            "rule statement is {len} characters, over the {max_chars}-character single-line limit: {:?}",
            truncate(statement, 40)
        )));
    }
    Ok(())
}

fn parse_entry(line: &str) -> Result<RuleEntry> {
    let caps = entry_re().captures(line).ok_or_else(|| {
        DistillError::Validation(format!("not a rule entry: {:?}", truncate(line, 60)))
    })?;
    let category: Category = caps[1].parse()?;
    let source: RuleSource = caps[3].parse()?;
    Ok(RuleEntry::new(category, &caps[2], source))
}

/// Parses the rendered form; the leading `- ` is optional.
impl std::str::FromStr for RuleEntry {
    type Err = DistillError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.starts_with("- ") {
            parse_entry(s)
        } else {
            parse_entry(&format!("- {s}"))
        }
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let head: String = s.chars().take(max.saturating_sub(1)).collect();
        format!("{head}…")
    }
}

// ---------------------------------------------------------------------------
// Ruleset
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Ruleset {
    pub revision: u64,
    pub entries: Vec<RuleEntry>,
}

static REVISION_RE: OnceLock<Regex> = OnceLock::new();
static ENTRY_RE: OnceLock<Regex> = OnceLock::new();

fn revision_re() -> &'static Regex {
    REVISION_RE.get_or_init(|| Regex::new(r"^<!-- distill revision: (\d+) -->$").unwrap())
}

fn entry_re() -> &'static Regex {
    ENTRY_RE.get_or_init(|| {
        Regex::new(r"^- \[([A-Za-z]+)\] (.+) \((manual|[Pp][Mm]-?\d+)\)$").unwrap()
    })
}

impl Ruleset {
    pub fn new(revision: u64, entries: Vec<RuleEntry>) -> Self {
        Self { revision, entries }
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        out.push_str(HEADER_TITLE);
        out.push('\n');
        out.push_str(&format!("<!-- distill revision: {} -->\n", self.revision));
        out.push('\n');
        for entry in &self.entries {
            out.push_str(&entry.render());
            out.push('\n');
        }
        out
    }

    /// Rendered line count of this document.
    pub fn line_count(&self) -> usize {
        HEADER_LINES + self.entries.len()
    }

    /// Strict parse of the rendered form. Any line that is not part of the
    /// header or a well-formed entry is rejected.
    pub fn parse(text: &str) -> Result<Self> {
        let mut lines = text.lines().enumerate();

        match lines.next() {
            Some((_, l)) if l == HEADER_TITLE => {}
            _ => {
                return Err(DistillError::Validation(format!(
                    "rules file line 1: expected '{HEADER_TITLE}'"
                )))
            }
        }
        let revision = match lines.next() {
            Some((_, l)) => revision_re()
                .captures(l)
                .and_then(|c| c[1].parse::<u64>().ok())
                .ok_or_else(|| {
                    DistillError::Validation(
                        "rules file line 2: missing revision marker".to_string(),
                    )
                })?,
            None => {
                return Err(DistillError::Validation(
                    "rules file line 2: missing revision marker".to_string(),
                ))
            }
        };
        match lines.next() {
            Some((_, l)) if l.trim().is_empty() => {}
            None => return Ok(Self::new(revision, Vec::new())),
            Some((i, _)) => {
                return Err(DistillError::Validation(format!(
                    "rules file line {}: expected a blank line after the header",
                    i + 1
                )))
            }
        }

        let mut entries = Vec::new();
        for (i, line) in lines {
            let entry = parse_entry(line).map_err(|e| match e {
                DistillError::Validation(msg) => {
                    DistillError::Validation(format!("rules file line {}: {msg}", i + 1))
                }
                other => other,
            })?;
            entries.push(entry);
        }
        Ok(Self::new(revision, entries))
    }

    /// Remove entries at the given 1-based positions, append `additions`,
    /// and bump the revision. The receiver is left untouched.
    pub fn apply(&self, removals: &[usize], additions: &[RuleEntry]) -> Result<Self> {
        let removals: BTreeSet<usize> = removals.iter().copied().collect();
        if let Some(bad) = removals
            .iter()
            .find(|&&p| p == 0 || p > self.entries.len())
        {
            return Err(DistillError::Validation(format!(
                "cannot remove #{bad}: ruleset has {} entries",
                self.entries.len()
            )));
        }
        let mut entries: Vec<RuleEntry> = self
            .entries
            .iter()
            .enumerate()
            .filter(|(i, _)| !removals.contains(&(i + 1)))
            .map(|(_, e)| e.clone())
            .collect();
        entries.extend(additions.iter().cloned());
        Ok(Self::new(self.revision + 1, entries))
    }

    /// Entries sourced from the given incident.
    pub fn entries_from<'a>(&'a self, id: &'a str) -> impl Iterator<Item = (usize, &'a RuleEntry)> + 'a {
        self.entries
            .iter()
            .enumerate()
            .filter(move |(_, e)| e.source.incident_id() == Some(id))
            .map(|(i, e)| (i + 1, e))
    }
}

// ---------------------------------------------------------------------------
// Pruning
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PruneCandidate {
    /// 1-based position in the current document.
    pub position: usize,
    pub entry: RuleEntry,
    /// Later incident that references this entry's source, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub superseded_by: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PruningProposal {
    /// Lines that must go before the change fits under the ceiling.
    pub overflow: usize,
    /// Oldest first.
    pub candidates: Vec<PruneCandidate>,
    /// Positions suggested for removal, ascending.
    pub suggested: Vec<usize>,
}

impl PruningProposal {
    /// Plan which entries of `ruleset` to drop to free `overflow` lines.
    ///
    /// Entries whose source incident has been superseded go first (oldest
    /// first), then the oldest remaining entries.
    pub fn plan(ruleset: &Ruleset, records: &[IncidentRecord], overflow: usize) -> Self {
        let annotated: Vec<PruneCandidate> = ruleset
            .entries
            .iter()
            .enumerate()
            .map(|(i, entry)| PruneCandidate {
                position: i + 1,
                entry: entry.clone(),
                superseded_by: entry
                    .source
                    .incident_id()
                    .and_then(|id| incident::superseded_by(records, id))
                    .map(|r| r.id.clone()),
            })
            .collect();

        let mut suggested: Vec<usize> = annotated
            .iter()
            .filter(|c| c.superseded_by.is_some())
            .map(|c| c.position)
            .take(overflow)
            .collect();
        for c in &annotated {
            if suggested.len() >= overflow {
                break;
            }
            if !suggested.contains(&c.position) {
                suggested.push(c.position);
            }
        }
        suggested.sort_unstable();

        let window = overflow + PRUNE_SLACK;
        let candidates = annotated
            .into_iter()
            .filter(|c| c.superseded_by.is_some() || c.position <= window)
            .collect();

        Self {
            overflow,
            candidates,
            suggested,
        }
    }

    /// Lines freed by the suggested removals (one line per entry).
    pub fn freed_lines(&self) -> usize {
        self.suggested.len()
    }

    pub fn is_sufficient(&self) -> bool {
        self.freed_lines() >= self.overflow
    }

    pub fn describe(&self) -> String {
        if self.overflow == 0 {
            return "no pruning needed".to_string();
        }
        let list = |positions: &[usize]| {
            positions
                .iter()
                .map(|p| format!("#{p}"))
                .collect::<Vec<_>>()
                .join(", ")
        };
        let mut msg = format!("prune at least {} line(s)", self.overflow);
        if self.suggested.is_empty() {
            msg.push_str("; the ruleset has no entries to remove");
        } else {
            msg.push_str(&format!("; suggested removals: {}", list(&self.suggested)));
        }
        let superseded: Vec<String> = self
            .candidates
            .iter()
            .filter_map(|c| {
                c.superseded_by
                    .as_ref()
                    .map(|by| format!("#{} by {by}", c.position))
            })
            .collect();
        if !superseded.is_empty() {
            msg.push_str(&format!(" (superseded: {})", superseded.join(", ")));
        }
        if !self.is_sufficient() {
            msg.push_str(&format!(
                "; only {} existing entr{} can be removed",
                self.freed_lines(),
                if self.freed_lines() == 1 { "y" } else { "ies" }
            ));
        }
        msg
    }
}

// ---------------------------------------------------------------------------
// Persistence
// ---------------------------------------------------------------------------

/// Load the committed document. A missing file is an empty revision-0 document.
pub fn load(root: &Path, cfg: &Config) -> Result<Ruleset> {
    let path = paths::rules_path(root, &cfg.store.rules_file);
    if !path.exists() {
        return Ok(Ruleset::default());
    }
    let text = std::fs::read_to_string(&path)?;
    Ruleset::parse(&text)
}

/// Write the document in a single atomic replace. Refuses anything over the
/// ceiling.
pub fn save(root: &Path, cfg: &Config, ruleset: &Ruleset) -> Result<()> {
    let ceiling = cfg.ceiling();
    let lines = ruleset.line_count();
    if lines > ceiling {
        let records = incident::list(root, cfg)?;
        return Err(DistillError::Capacity {
            projected: lines,
            ceiling,
            pruning: Box::new(PruningProposal::plan(ruleset, &records, lines - ceiling)),
        });
    }
    let path = paths::rules_path(root, &cfg.store.rules_file);
    io::atomic_write(&path, ruleset.render().as_bytes())?;
    tracing::debug!(revision = ruleset.revision, lines, "ruleset written");
    Ok(())
}

/// Line count of the committed document.
pub fn current_line_count(root: &Path, cfg: &Config) -> Result<usize> {
    Ok(load(root, cfg)?.line_count())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
