use crate::output::{print_json, print_table, truncate};
use anyhow::Context;
use distill_core::config::Config;
use distill_core::recall::{self, WorkItem};
use std::path::Path;

pub fn run(
    root: &Path,
    keywords: Vec<String>,
    incidents: Vec<String>,
    file: Option<&Path>,
    json: bool,
) -> anyhow::Result<()> {
    let cfg = Config::load(root).context("failed to load config")?;

    let mut work = match file {
        Some(path) => WorkItem::load(path)
            .with_context(|| format!("failed to read work description {}", path.display()))?,
        None => WorkItem::default(),
    };
    work.keywords.extend(keywords);
    work.incidents.extend(incidents);
    if work.is_empty() {
        anyhow::bail!("nothing to recall: pass --keyword, --incident, or --file");
    }

    let found = recall::recall(root, &cfg, &work)?;
    if json {
        return print_json(&found);
    }
    if found.incidents.is_empty() {
        println!("no related incidents");
        return Ok(());
    }

    println!("Related incidents:");
    print_table(
        &["ID", "SEVERITY", "TITLE"],
        found
            .incidents
            .iter()
            .map(|r| vec![r.id.clone(), r.severity.to_string(), truncate(&r.title, 60)])
            .collect(),
    );

    println!();
    if found.rules.is_empty() {
        println!("No rules distilled from these incidents yet.");
    } else {
        println!("Rules from these incidents:");
        for r in &found.rules {
            println!("  #{} {}", r.position, r.entry.render().trim_start_matches("- "));
        }
    }
    Ok(())
}
