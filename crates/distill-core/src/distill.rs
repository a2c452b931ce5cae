//! Draft rule entries from an incident record.
//!
//! Suggestions are starting points for the approver, not commits; they go
//! through `proposal::propose` like any other entry.

use crate::config::Config;
use crate::incident::IncidentRecord;
use crate::ruleset::RuleEntry;
use crate::types::{Category, RuleSource};

/// Draft WARNING entries from a record: one from its title and, when the
/// mitigation has text, one from its first sentence. Each statement is
/// collapsed to one line and cut to the configured length.
pub fn suggest(record: &IncidentRecord, cfg: &Config) -> Vec<RuleEntry> {
    let max = cfg.ruleset.max_statement_chars;
    let source = RuleSource::incident(record.id.clone());

    let mut drafts = vec![RuleEntry::new(
        Category::Warning,
        fit(&record.title, max),
        source.clone(),
    )];
    if let Some(sentence) = first_sentence(&record.mitigation) {
        let statement = fit(&sentence, max);
        if !drafts.iter().any(|d| d.statement == statement) {
            drafts.push(RuleEntry::new(Category::Warning, statement, source));
        }
    }
    drafts
}

fn one_line(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn first_sentence(text: &str) -> Option<String> {
    let text = one_line(text);
    if text.is_empty() {
        return None;
    }
    let end = text
        .char_indices()
        .find(|&(i, c)| {
            matches!(c, '.' | '!' | '?')
                && text[i + c.len_utf8()..].chars().next().map_or(true, char::is_whitespace)
        })
        .map(|(i, c)| i + c.len_utf8())
        .unwrap_or(text.len());
    Some(text[..end].to_string())
}

fn fit(text: &str, max: usize) -> String {
    let text = one_line(text);
    if text.chars().count() <= max {
        return text;
    }
    let head: String = text.chars().take(max.saturating_sub(1)).collect();
    format!("{}…", head.trim_end())
}
