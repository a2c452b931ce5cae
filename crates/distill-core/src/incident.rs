//! Incident archive, one append-only YAML file per postmortem.
//!
//! Layout:
//!   <incidents_dir>/PM-001-duplicate-order-submission.yaml
//!   <incidents_dir>/PM-002-missing-fill-logs.yaml
//!
//! IDs are sequential: PM-001, PM-002, …  Records are never updated or
//! deleted; later records point back at earlier ones through `references`.

use crate::config::Config;
use crate::error::{DistillError, Result};
use crate::search::SearchResults;
use crate::types::Severity;
use crate::{io, paths};
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

pub const ID_PREFIX: &str = "PM-";

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncidentRecord {
    pub id: String,
    pub title: String,
    pub severity: Severity,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub keywords: BTreeSet<String>,
    /// Earlier incidents this one builds on or supersedes.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub references: BTreeSet<String>,
    #[serde(default)]
    pub timeline: String,
    pub root_cause: String,
    #[serde(default)]
    pub mitigation: String,
}

impl IncidentRecord {
    /// Numeric part of the identifier.
    pub fn seq(&self) -> u32 {
        id_seq(&self.id).unwrap_or(0)
    }

    pub fn slug(&self) -> String {
        paths::slugify(&self.title)
    }
}

/// Payload for [`create`].
#[derive(Debug, Clone)]
pub struct NewIncident {
    pub title: String,
    pub severity: Severity,
    pub timeline: String,
    pub root_cause: String,
    pub mitigation: String,
    pub keywords: Vec<String>,
    pub references: Vec<String>,
}

impl NewIncident {
    pub fn new(
        title: impl Into<String>,
        severity: Severity,
        root_cause: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            severity,
            timeline: String::new(),
            root_cause: root_cause.into(),
            mitigation: String::new(),
            keywords: Vec::new(),
            references: Vec::new(),
        }
    }

    pub fn timeline(mut self, timeline: impl Into<String>) -> Self {
        self.timeline = timeline.into();
        self
    }

    pub fn mitigation(mut self, mitigation: impl Into<String>) -> Self {
        self.mitigation = mitigation.into();
        self
    }

    pub fn keywords<I, S>(mut self, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.keywords = keywords.into_iter().map(Into::into).collect();
        self
    }

    pub fn references<I, S>(mut self, references: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.references = references.into_iter().map(Into::into).collect();
        self
    }
}

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

static ID_RE: OnceLock<Regex> = OnceLock::new();
static FILE_RE: OnceLock<Regex> = OnceLock::new();

fn id_re() -> &'static Regex {
    ID_RE.get_or_init(|| Regex::new(r"(?i)^pm-?0*(\d{1,9})$").unwrap())
}

fn file_re() -> &'static Regex {
    FILE_RE.get_or_init(|| Regex::new(r"^(PM-\d+)(?:-[a-z0-9\-]+)?\.yaml$").unwrap())
}

pub fn format_id(seq: u32) -> String {
    format!("{ID_PREFIX}{seq:03}")
}

fn id_seq(id: &str) -> Option<u32> {
    id_re().captures(id)?.get(1)?.as_str().parse().ok()
}

/// Canonicalise `pm-7`, `PM7`, `PM-0007` to `PM-007`.
pub fn normalize_id(raw: &str) -> Result<String> {
    match id_seq(raw.trim()) {
        Some(n) if n > 0 => Ok(format_id(n)),
        _ => Err(DistillError::Validation(format!(
            "'{raw}' is not an incident identifier (expected PM-<number>)"
        ))),
    }
}

fn normalize_keywords(raw: &[String]) -> BTreeSet<String> {
    raw.iter()
        .map(|k| k.trim().to_lowercase())
        .filter(|k| !k.is_empty())
        .collect()
}

// ---------------------------------------------------------------------------
// Internal file I/O
// ---------------------------------------------------------------------------

/// `(seq, id, path)` for every record file, sorted by sequence.
fn scan(root: &Path, cfg: &Config) -> Result<Vec<(u32, String, PathBuf)>> {
    let dir = paths::incidents_dir(root, &cfg.store.incidents_dir);
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut found = Vec::new();
    for entry in std::fs::read_dir(&dir)? {
        let entry = entry?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        let Some(caps) = file_re().captures(name) else {
            continue;
        };
        let id = caps[1].to_string();
        if let Some(seq) = id_seq(&id) {
            found.push((seq, format_id(seq), entry.path()));
        }
    }
    found.sort_by_key(|(seq, _, _)| *seq);
    Ok(found)
}

fn read_record(path: &Path) -> Result<IncidentRecord> {
    let content = std::fs::read_to_string(path)?;
    Ok(serde_yaml::from_str(&content)?)
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Append a new incident record and return it.
///
/// Fails with `Validation` when the title or root cause is blank or the
/// title spans lines, and with `IncidentNotFound` when a reference does not
/// resolve. Identical payloads filed twice produce two records.
pub fn create(root: &Path, cfg: &Config, new: NewIncident) -> Result<IncidentRecord> {
    let title = new.title.trim().to_string();
    if title.is_empty() {
        return Err(DistillError::Validation("incident title is empty".to_string()));
    }
    if title.contains(|c: char| c == '\n' || c == '\r') {
        return Err(DistillError::Validation(
            "incident title must be a single line".to_string(),
        ));
    }
    if new.root_cause.trim().is_empty() {
        return Err(DistillError::Validation(
            "incident root cause is empty".to_string(),
        ));
    }

    let mut references = BTreeSet::new();
    for raw in &new.references {
        references.insert(normalize_id(raw)?);
    }

    // Scan-then-write must not interleave with another process.
    let _lock = io::ProjectLock::acquire(&paths::lock_path(root))?;

    let existing = scan(root, cfg)?;
    for reference in &references {
        if !existing.iter().any(|(_, id, _)| id == reference) {
            return Err(DistillError::IncidentNotFound(reference.clone()));
        }
    }
    let next = existing.last().map(|(seq, _, _)| seq + 1).unwrap_or(1);

    let record = IncidentRecord {
        id: format_id(next),
        title,
        severity: new.severity,
        created_at: Utc::now(),
        keywords: normalize_keywords(&new.keywords),
        references,
        timeline: new.timeline,
        root_cause: new.root_cause,
        mitigation: new.mitigation,
    };

    let path = paths::incident_file(
        root,
        &cfg.store.incidents_dir,
        &record.id,
        &record.slug(),
    );
    let data = serde_yaml::to_string(&record)?;
    io::write_new(&path, data.as_bytes())?;

    tracing::info!(id = %record.id, severity = %record.severity, "incident recorded");
    Ok(record)
}

/// Load a single record. Identifiers are normalised first.
pub fn get(root: &Path, cfg: &Config, id: &str) -> Result<IncidentRecord> {
    let Ok(id) = normalize_id(id) else {
        return Err(DistillError::IncidentNotFound(id.to_string()));
    };
    let path = scan(root, cfg)?
        .into_iter()
        .find(|(_, found, _)| *found == id)
        .map(|(_, _, path)| path)
        .ok_or_else(|| DistillError::IncidentNotFound(id.clone()))?;
    read_record(&path)
}

/// All records in creation order.
pub fn list(root: &Path, cfg: &Config) -> Result<Vec<IncidentRecord>> {
    scan(root, cfg)?
        .iter()
        .map(|(_, _, path)| read_record(path))
        .collect()
}

/// Keyword search over the archive; see [`SearchResults`] for ordering.
pub fn search<I, S>(root: &Path, cfg: &Config, keywords: I) -> Result<SearchResults>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    Ok(SearchResults::new(list(root, cfg)?, keywords))
}

/// The earliest later record that references `id`, if any.
pub fn superseded_by<'a>(records: &'a [IncidentRecord], id: &str) -> Option<&'a IncidentRecord> {
    let seq = id_seq(id)?;
    records
        .iter()
        .filter(|r| r.seq() > seq && r.references.contains(id))
        .min_by_key(|r| r.seq())
}

/// Human-readable rendering of a record.
pub fn to_markdown(record: &IncidentRecord) -> String {
    let mut out = format!("# {}: {}\n\n", record.id, record.title);
    out.push_str(&format!("**Severity:** {}  \n", record.severity));
    out.push_str(&format!(
        "**Filed:** {}  \n",
        record.created_at.format("%Y-%m-%d %H:%M UTC")
    ));
    if !record.keywords.is_empty() {
        let kw: Vec<&str> = record.keywords.iter().map(String::as_str).collect();
        out.push_str(&format!("**Keywords:** {}  \n", kw.join(", ")));
    }
    if !record.references.is_empty() {
        let refs: Vec<&str> = record.references.iter().map(String::as_str).collect();
        out.push_str(&format!("**Related:** {}  \n", refs.join(", ")));
    }
    for (heading, body) in [
        ("Timeline", &record.timeline),
        ("Root Cause", &record.root_cause),
        ("Mitigation", &record.mitigation),
    ] {
        if body.trim().is_empty() {
            continue;
        }
        out.push_str(&format!("\n## {heading}\n\n{}\n", body.trim_end()));
    }
    out
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
