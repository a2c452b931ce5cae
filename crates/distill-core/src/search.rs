use crate::incident::IncidentRecord;
use serde::Serialize;
use std::sync::OnceLock;

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// How a record matched the query. Exact matches rank ahead of substring ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchKind {
    /// A query keyword equals one of the record's keywords.
    Exact,
    /// A query keyword occurs inside a keyword, the title, or a narrative field.
    Substring,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct SearchHit<'a> {
    pub record: &'a IncidentRecord,
    /// `None` when the query was empty and every record is returned.
    pub matched: Option<MatchKind>,
}

// ---------------------------------------------------------------------------
// SearchResults
// ---------------------------------------------------------------------------

/// Ranked keyword matches over a snapshot of the archive.
///
/// Ranking is deferred until the first iteration and cached, so the
/// sequence can be walked any number of times with identical results.
///
/// Ordering:
/// - exact keyword matches, then substring matches
/// - most recent record first within a tier
/// - an empty query yields every record in creation order
#[derive(Debug)]
pub struct SearchResults {
    records: Vec<IncidentRecord>,
    query: Vec<String>,
    ranked: OnceLock<Vec<(usize, Option<MatchKind>)>>,
}

impl SearchResults {
    pub fn new<I, S>(records: Vec<IncidentRecord>, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut query: Vec<String> = keywords
            .into_iter()
            .map(|k| k.as_ref().trim().to_lowercase())
            .filter(|k| !k.is_empty())
            .collect();
        query.sort();
        query.dedup();
        Self {
            records,
            query,
            ranked: OnceLock::new(),
        }
    }

    /// Normalised query keywords.
    pub fn query(&self) -> &[String] {
        &self.query
    }

    fn ranking(&self) -> &[(usize, Option<MatchKind>)] {
        self.ranked.get_or_init(|| {
            if self.query.is_empty() {
                let mut all: Vec<usize> = (0..self.records.len()).collect();
                all.sort_by_key(|&i| self.records[i].seq());
                return all.into_iter().map(|i| (i, None)).collect();
            }
            let mut hits: Vec<(usize, MatchKind)> = self
                .records
                .iter()
                .enumerate()
                .filter_map(|(i, r)| classify(r, &self.query).map(|m| (i, m)))
                .collect();
            hits.sort_by(|(a, ma), (b, mb)| {
                ma.cmp(mb)
                    .then_with(|| self.records[*b].seq().cmp(&self.records[*a].seq()))
            });
            hits.into_iter().map(|(i, m)| (i, Some(m))).collect()
        })
    }

    pub fn hits(&self) -> impl Iterator<Item = SearchHit<'_>> + '_ {
        self.ranking().iter().map(|&(i, matched)| SearchHit {
            record: &self.records[i],
            matched,
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = &IncidentRecord> + '_ {
        self.ranking().iter().map(|&(i, _)| &self.records[i])
    }

    pub fn len(&self) -> usize {
        self.ranking().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[cfg(test)]
    fn ids(&self) -> Vec<String> {
        self.iter().map(|r| r.id.clone()).collect()
    }
}

impl<'a> IntoIterator for &'a SearchResults {
    type Item = &'a IncidentRecord;
    type IntoIter = Box<dyn Iterator<Item = &'a IncidentRecord> + 'a>;

    fn into_iter(self) -> Self::IntoIter {
        Box::new(self.iter())
    }
}

fn classify(record: &IncidentRecord, query: &[String]) -> Option<MatchKind> {
    if query.iter().any(|q| record.keywords.contains(q)) {
        return Some(MatchKind::Exact);
    }
    let haystacks = [
        record.title.to_lowercase(),
        record.timeline.to_lowercase(),
        record.root_cause.to_lowercase(),
        record.mitigation.to_lowercase(),
    ];
    let found = query.iter().any(|q| {
        record.keywords.iter().any(|k| k.contains(q.as_str()))
            || haystacks.iter().any(|h| h.contains(q.as_str()))
    });
    found.then_some(MatchKind::Substring)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::incident::{self, NewIncident};
    use crate::types::Severity;
    use tempfile::TempDir;

    fn seeded() -> (TempDir, Config) {
        let dir = TempDir::new().unwrap();
        let cfg = Config::new("test");
        incident::create(
            dir.path(),
            &cfg,
            NewIncident::new(
                "Duplicate fills on retry",
                Severity::High,
                "Retry resubmitted without idempotency key",
            )
            .keywords(["order", "duplication"]),
        )
        .unwrap();
        incident::create(
            dir.path(),
            &cfg,
            NewIncident::new(
                "Silent log drop",
                Severity::Low,
                "Log level misconfigured in production",
            )
            .keywords(["logging"]),
        )
        .unwrap();
        (dir, cfg)
    }

    #[test]
    fn keyword_scenario_returns_exact_record() {
        let (dir, cfg) = seeded();
        let results = incident::search(dir.path(), &cfg, ["order"]).unwrap();
        assert_eq!(results.ids(), vec!["PM-001"]);
    }

    #[test]
    fn empty_query_returns_all_in_creation_order() {
        let (dir, cfg) = seeded();
        let results = incident::search(dir.path(), &cfg, Vec::<String>::new()).unwrap();
        assert_eq!(results.ids(), vec!["PM-001", "PM-002"]);
        assert!(results.hits().all(|h| h.matched.is_none()));

        let blank = incident::search(dir.path(), &cfg, ["  "]).unwrap();
        assert_eq!(blank.len(), 2);
    }

    #[test]
    fn exact_ranks_before_substring_then_recency() {
        let (dir, cfg) = seeded();
        // Substring only: "log" occurs in PM-002's keyword and text.
        incident::create(
            dir.path(),
            &cfg,
            NewIncident::new("Audit log rotation", Severity::Medium, "cron missing")
                .keywords(["log"]),
        )
        .unwrap();
        incident::create(
            dir.path(),
            &cfg,
            NewIncident::new("Backlog stall", Severity::Medium, "queue starved"),
        )
        .unwrap();
        let results = incident::search(dir.path(), &cfg, ["LOG"]).unwrap();
        let hits: Vec<(String, Option<MatchKind>)> = results
            .hits()
            .map(|h| (h.record.id.clone(), h.matched))
            .collect();
        assert_eq!(
            hits,
            vec![
                ("PM-003".to_string(), Some(MatchKind::Exact)),
                ("PM-004".to_string(), Some(MatchKind::Substring)),
                ("PM-002".to_string(), Some(MatchKind::Substring)),
            ]
        );
    }

    #[test]
    fn free_text_fields_are_searched() {
        let (dir, cfg) = seeded();
        let results = incident::search(dir.path(), &cfg, ["idempotency"]).unwrap();
        assert_eq!(results.ids(), vec!["PM-001"]);
    }

    #[test]
    fn no_match_is_empty() {
        let (dir, cfg) = seeded();
        let results = incident::search(dir.path(), &cfg, ["latency"]).unwrap();
        assert!(results.is_empty());
    }

    #[test]
    fn results_are_restartable() {
        let (dir, cfg) = seeded();
        let results = incident::search(dir.path(), &cfg, ["order", "logging"]).unwrap();
        let first: Vec<&str> = results.iter().map(|r| r.id.as_str()).collect();
        let second: Vec<&str> = (&results).into_iter().map(|r| r.id.as_str()).collect();
        assert_eq!(first, second);
        assert_eq!(first, vec!["PM-002", "PM-001"]);
    }

    #[test]
    fn repeated_searches_agree() {
        let (dir, cfg) = seeded();
        let a = incident::search(dir.path(), &cfg, ["retry"]).unwrap().ids();
        let b = incident::search(dir.path(), &cfg, ["retry"]).unwrap().ids();
        assert_eq!(a, b);
    }
}
