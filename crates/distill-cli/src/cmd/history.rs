use crate::output::{print_json, print_table};
use distill_core::history;
use distill_core::proposal::Outcome;
use std::path::Path;

pub fn run(root: &Path, limit: Option<usize>, json: bool) -> anyhow::Result<()> {
    let mut entries = history::list(root)?;
    if let Some(n) = limit {
        let skip = entries.len().saturating_sub(n);
        entries.drain(..skip);
    }
    if json {
        return print_json(&entries);
    }
    if entries.is_empty() {
        println!("no proposal history");
        return Ok(());
    }
    print_table(
        &["WHEN", "OUTCOME", "DETAIL"],
        entries
            .iter()
            .map(|e| {
                let detail = match &e.outcome {
                    Outcome::Committed {
                        revision,
                        added,
                        removed,
                        line_count,
                    } => format!(
                        "revision {revision}: +{} -{}, {line_count} lines",
                        added.len(),
                        removed.len()
                    ),
                    Outcome::Rejected { feedback } => feedback.clone(),
                    Outcome::Cancelled { entries } => format!("{entries} entries discarded"),
                };
                vec![
                    e.timestamp.format("%Y-%m-%d %H:%M").to_string(),
                    e.outcome.label().to_string(),
                    detail,
                ]
            })
            .collect(),
    );
    Ok(())
}
