use crate::output::{print_json, print_table, truncate};
use anyhow::Context;
use clap::Subcommand;
use distill_core::config::Config;
use distill_core::incident::{self, NewIncident};
use distill_core::ruleset;
use distill_core::search::MatchKind;
use distill_core::types::Severity;
use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// Subcommand tree
// ---------------------------------------------------------------------------

#[derive(Subcommand)]
pub enum IncidentSubcommand {
    /// Record a new incident postmortem
    Create {
        /// One-line title
        #[arg(long)]
        title: String,

        /// Severity: critical | high | medium | low
        #[arg(long)]
        severity: String,

        /// Root-cause narrative
        #[arg(long, conflicts_with = "root_cause_file")]
        root_cause: Option<String>,

        /// Read the root-cause narrative from a file
        #[arg(long)]
        root_cause_file: Option<PathBuf>,

        /// Timeline of events
        #[arg(long, default_value = "")]
        timeline: String,

        /// What was done to mitigate it
        #[arg(long, default_value = "")]
        mitigation: String,

        /// Keyword (repeatable, or comma-separated)
        #[arg(long = "keyword", short = 'k', value_delimiter = ',')]
        keywords: Vec<String>,

        /// Earlier incident this one relates to or supersedes (repeatable)
        #[arg(long = "reference", short = 'r', value_delimiter = ',')]
        references: Vec<String>,
    },

    /// List all incidents in creation order
    List,

    /// Show a single incident
    Show {
        /// Incident ID (e.g. PM-001)
        id: String,
    },

    /// Search incidents by keyword (exact keyword matches first, then substring)
    Search {
        /// Keywords to match
        keywords: Vec<String>,
    },
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

pub fn run(root: &Path, subcommand: IncidentSubcommand, json: bool) -> anyhow::Result<()> {
    let cfg = Config::load(root).context("failed to load config")?;
    match subcommand {
        IncidentSubcommand::Create {
            title,
            severity,
            root_cause,
            root_cause_file,
            timeline,
            mitigation,
            keywords,
            references,
        } => {
            let severity: Severity = severity.parse()?;
            let root_cause = match (root_cause, root_cause_file) {
                (Some(text), _) => text,
                (None, Some(path)) => std::fs::read_to_string(&path)
                    .with_context(|| format!("failed to read {}", path.display()))?,
                (None, None) => anyhow::bail!("--root-cause or --root-cause-file is required"),
            };
            let new = NewIncident::new(title, severity, root_cause)
                .timeline(timeline)
                .mitigation(mitigation)
                .keywords(keywords)
                .references(references);
            let record = incident::create(root, &cfg, new)?;
            if json {
                print_json(&record)?;
            } else {
                println!("recorded incident {}: {}", record.id, record.title);
                println!("Next: distill rules suggest {}", record.id);
            }
            Ok(())
        }

        IncidentSubcommand::List => {
            let records = incident::list(root, &cfg)?;
            if json {
                return print_json(&records);
            }
            if records.is_empty() {
                println!("no incidents recorded");
                return Ok(());
            }
            print_table(
                &["ID", "SEVERITY", "FILED", "TITLE"],
                records
                    .iter()
                    .map(|r| {
                        vec![
                            r.id.clone(),
                            r.severity.to_string(),
                            r.created_at.format("%Y-%m-%d").to_string(),
                            truncate(&r.title, 60),
                        ]
                    })
                    .collect(),
            );
            Ok(())
        }

        IncidentSubcommand::Show { id } => {
            let record = incident::get(root, &cfg, &id)?;
            if json {
                return print_json(&record);
            }
            print!("{}", incident::to_markdown(&record));
            let rules = ruleset::load(root, &cfg)?;
            let derived: Vec<_> = rules.entries_from(&record.id).collect();
            if !derived.is_empty() {
                println!("\n## Rules\n");
                for (pos, entry) in derived {
                    println!("- #{pos} [{}] {}", entry.category, entry.statement);
                }
            }
            Ok(())
        }

        IncidentSubcommand::Search { keywords } => {
            let results = incident::search(root, &cfg, &keywords)?;
            if json {
                let hits: Vec<_> = results.hits().collect();
                return print_json(&hits);
            }
            if results.is_empty() {
                println!("no incidents match: {}", results.query().join(", "));
                return Ok(());
            }
            print_table(
                &["ID", "MATCH", "SEVERITY", "TITLE"],
                results
                    .hits()
                    .map(|h| {
                        let matched = match h.matched {
                            Some(MatchKind::Exact) => "exact",
                            Some(MatchKind::Substring) => "partial",
                            None => "-",
                        };
                        vec![
                            h.record.id.clone(),
                            matched.to_string(),
                            h.record.severity.to_string(),
                            truncate(&h.record.title, 60),
                        ]
                    })
                    .collect(),
            );
            Ok(())
        }
    }
}
