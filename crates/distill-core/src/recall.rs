//! Surface past incidents and the rules they produced for a unit of work.

use crate::config::Config;
use crate::error::{DistillError, Result};
use crate::incident::{self, IncidentRecord};
use crate::ruleset::{self, RuleEntry};
use crate::search::SearchResults;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Supplies what a piece of work is about.
pub trait WorkSource {
    fn keywords(&self) -> Vec<String>;
    fn incident_ids(&self) -> Vec<String>;
}

/// Plain work description, built from flags or loaded from a YAML file.
///
/// ```yaml
/// title: Rework order retry path
/// keywords: [order, retry]
/// incidents: [PM-001]
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkItem {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub incidents: Vec<String>,
}

impl WorkItem {
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&data)?)
    }

    pub fn is_empty(&self) -> bool {
        self.keywords.is_empty() && self.incidents.is_empty()
    }
}

impl WorkSource for WorkItem {
    fn keywords(&self) -> Vec<String> {
        self.keywords.clone()
    }

    fn incident_ids(&self) -> Vec<String> {
        self.incidents.clone()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RecalledRule {
    /// 1-based position in the current document.
    pub position: usize,
    pub entry: RuleEntry,
}

#[derive(Debug, Clone, Serialize)]
pub struct Recall {
    pub incidents: Vec<IncidentRecord>,
    pub rules: Vec<RecalledRule>,
}

/// Named incidents first (in the order given), then keyword hits in search
/// order, without duplicates. Rules are those sourced from any recalled
/// incident, in document order.
pub fn recall(root: &Path, cfg: &Config, work: &dyn WorkSource) -> Result<Recall> {
    let records = incident::list(root, cfg)?;

    let mut incidents: Vec<IncidentRecord> = Vec::new();
    for raw in work.incident_ids() {
        let id = incident::normalize_id(&raw)
            .map_err(|_| DistillError::IncidentNotFound(raw.clone()))?;
        let record = records
            .iter()
            .find(|r| r.id == id)
            .ok_or_else(|| DistillError::IncidentNotFound(id.clone()))?;
        if !incidents.iter().any(|r| r.id == record.id) {
            incidents.push(record.clone());
        }
    }

    let keywords = work.keywords();
    if keywords.iter().any(|k| !k.trim().is_empty()) {
        let hits = SearchResults::new(records, keywords);
        for record in &hits {
            if !incidents.iter().any(|r| r.id == record.id) {
                incidents.push(record.clone());
            }
        }
    }

    let document = ruleset::load(root, cfg)?;
    let rules = document
        .entries
        .iter()
        .enumerate()
        .filter(|(_, e)| {
            e.source
                .incident_id()
                .is_some_and(|id| incidents.iter().any(|r| r.id == id))
        })
        .map(|(i, e)| RecalledRule {
            position: i + 1,
            entry: e.clone(),
        })
        .collect();

    tracing::debug!(incidents = incidents.len(), "recall complete");
    Ok(Recall { incidents, rules })
}
