use crate::output::{print_json, print_table, truncate};
use anyhow::Context;
use clap::Subcommand;
use distill_core::config::Config;
use distill_core::history::HistoryLog;
use distill_core::proposal::{self, ApprovalEdits, Decision, Outcome, Proposal};
use distill_core::ruleset::{self, RuleEntry};
use distill_core::types::Category;
use distill_core::{distill, incident};
use std::path::Path;

// ---------------------------------------------------------------------------
// Subcommand tree
// ---------------------------------------------------------------------------

#[derive(Subcommand)]
pub enum RulesSubcommand {
    /// Show the committed ruleset with entry positions
    Show,

    /// Show the rendered line count against the ceiling
    Lines,

    /// Draft entries from an incident (printed in --entry form)
    Suggest {
        /// Incident ID (e.g. PM-001)
        id: String,
    },

    /// Propose adding entries; nothing changes until approved
    Propose {
        /// Entry as "[CATEGORY] statement (PM-001|manual)" (repeatable)
        #[arg(long = "entry", short = 'e')]
        entries: Vec<String>,

        /// Also propose the suggested drafts for this incident
        #[arg(long)]
        from_incident: Option<String>,
    },

    /// Send a proposal returned for revision back for approval
    Resubmit,

    /// Show the proposal in flight, if any
    Pending,

    /// Approve the pending proposal and commit it
    Approve {
        /// Rewrite a proposed entry: N=new statement (repeatable)
        #[arg(long = "edit", value_name = "N=STATEMENT")]
        edits: Vec<String>,

        /// Change a proposed entry's category: N=CATEGORY (repeatable)
        #[arg(long = "recategorize", value_name = "N=CATEGORY")]
        categories: Vec<String>,

        /// Drop a proposed entry by its number (repeatable)
        #[arg(long = "drop", value_name = "N")]
        drop: Vec<usize>,

        /// Remove this ruleset position instead of the suggested pruning (repeatable)
        #[arg(long = "remove", value_name = "POS", conflicts_with = "keep_all")]
        remove: Vec<usize>,

        /// Remove nothing from the existing ruleset
        #[arg(long)]
        keep_all: bool,
    },

    /// Reject the pending proposal and return it for revision
    Reject {
        /// What needs to change
        #[arg(long)]
        feedback: String,

        /// Rewrite a proposed entry: N=new statement (repeatable)
        #[arg(long = "edit", value_name = "N=STATEMENT")]
        edits: Vec<String>,

        /// Change a proposed entry's category: N=CATEGORY (repeatable)
        #[arg(long = "recategorize", value_name = "N=CATEGORY")]
        categories: Vec<String>,

        /// Drop a proposed entry by its number (repeatable)
        #[arg(long = "drop", value_name = "N")]
        drop: Vec<usize>,
    },

    /// Discard the proposal in flight
    Cancel,
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

pub fn run(root: &Path, subcmd: RulesSubcommand, json: bool) -> anyhow::Result<()> {
    let cfg = Config::load(root).context("failed to load config")?;
    match subcmd {
        RulesSubcommand::Show => show(root, &cfg, json),
        RulesSubcommand::Lines => lines(root, &cfg, json),
        RulesSubcommand::Suggest { id } => suggest(root, &cfg, &id, json),
        RulesSubcommand::Propose {
            entries,
            from_incident,
        } => propose(root, &cfg, entries, from_incident.as_deref(), json),
        RulesSubcommand::Resubmit => {
            let p = proposal::resubmit(root, &cfg)?;
            report_proposal(&p, json)
        }
        RulesSubcommand::Pending => pending(root, json),
        RulesSubcommand::Approve {
            edits,
            categories,
            drop,
            remove,
            keep_all,
        } => {
            let mut e = build_edits(&edits, &categories, &drop)?;
            if keep_all {
                e.removals = Some(Vec::new());
            } else if !remove.is_empty() {
                e.removals = Some(remove);
            }
            decide(root, &cfg, Decision::Approved(e), json)
        }
        RulesSubcommand::Reject {
            feedback,
            edits,
            categories,
            drop,
        } => {
            let edits = build_edits(&edits, &categories, &drop)?;
            decide(root, &cfg, Decision::Rejected { feedback, edits }, json)
        }
        RulesSubcommand::Cancel => {
            let mut log = HistoryLog::new(root);
            let p = proposal::cancel(root, &mut log)?;
            if json {
                print_json(&serde_json::json!({ "cancelled": p }))?;
            } else {
                println!(
                    "cancelled {} proposal with {} entr{}; ruleset unchanged",
                    p.state,
                    p.entries.len(),
                    if p.entries.len() == 1 { "y" } else { "ies" }
                );
            }
            Ok(())
        }
    }
}

// ---------------------------------------------------------------------------
// show / lines
// ---------------------------------------------------------------------------

fn show(root: &Path, cfg: &Config, json: bool) -> anyhow::Result<()> {
    let rs = ruleset::load(root, cfg)?;
    if json {
        return print_json(&rs);
    }
    println!(
        "revision {}  ({}/{} lines)",
        rs.revision,
        rs.line_count(),
        cfg.ceiling()
    );
    if rs.entries.is_empty() {
        println!("no rules yet");
        return Ok(());
    }
    print_table(
        &["#", "CATEGORY", "SOURCE", "STATEMENT"],
        rs.entries
            .iter()
            .enumerate()
            .map(|(i, e)| {
                vec![
                    (i + 1).to_string(),
                    e.category.to_string(),
                    e.source.to_string(),
                    e.statement.clone(),
                ]
            })
            .collect(),
    );
    Ok(())
}

fn lines(root: &Path, cfg: &Config, json: bool) -> anyhow::Result<()> {
    let rs = ruleset::load(root, cfg)?;
    if json {
        print_json(&serde_json::json!({
            "revision": rs.revision,
            "lines": rs.line_count(),
            "ceiling": cfg.ceiling(),
        }))
    } else {
        println!("{}/{}", rs.line_count(), cfg.ceiling());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// suggest / propose
// ---------------------------------------------------------------------------

fn suggest(root: &Path, cfg: &Config, id: &str, json: bool) -> anyhow::Result<()> {
    let record = incident::get(root, cfg, id)?;
    let drafts = distill::suggest(&record, cfg);
    if json {
        return print_json(&drafts);
    }
    for d in &drafts {
        println!("{}", d.render().trim_start_matches("- "));
    }
    Ok(())
}

fn propose(
    root: &Path,
    cfg: &Config,
    raw: Vec<String>,
    from_incident: Option<&str>,
    json: bool,
) -> anyhow::Result<()> {
    let mut entries = raw
        .iter()
        .map(|s| s.parse::<RuleEntry>())
        .collect::<Result<Vec<_>, _>>()?;
    if let Some(id) = from_incident {
        let record = incident::get(root, cfg, id)?;
        entries.extend(distill::suggest(&record, cfg));
    }
    if entries.is_empty() {
        anyhow::bail!("nothing to propose: pass --entry or --from-incident");
    }
    let p = proposal::propose(root, cfg, entries)?;
    report_proposal(&p, json)
}

fn pending(root: &Path, json: bool) -> anyhow::Result<()> {
    match proposal::current(root)? {
        Some(p) => report_proposal(&p, json),
        None if json => print_json(&serde_json::Value::Null),
        None => {
            println!("no proposal in progress");
            Ok(())
        }
    }
}

fn report_proposal(p: &Proposal, json: bool) -> anyhow::Result<()> {
    if json {
        return print_json(p);
    }
    println!(
        "proposal: {}  (cycle {}, base revision {})",
        p.state, p.cycle, p.base_revision
    );
    println!(
        "lines: {} now, {} with additions, ceiling {}",
        p.current_lines, p.projected_lines, p.ceiling
    );
    println!();
    for (i, e) in p.entries.iter().enumerate() {
        println!("  {}. {}", i + 1, e.render().trim_start_matches("- "));
    }
    if let Some(pruning) = &p.pruning {
        println!();
        println!(
            "over the ceiling by {}; suggested removals bring it to {} lines:",
            pruning.overflow,
            p.projected_after_pruning()
        );
        print_table(
            &["POS", "SUGGESTED", "SUPERSEDED BY", "ENTRY"],
            pruning
                .candidates
                .iter()
                .map(|c| {
                    vec![
                        format!("#{}", c.position),
                        if pruning.suggested.contains(&c.position) {
                            "yes".to_string()
                        } else {
                            String::new()
                        },
                        c.superseded_by.clone().unwrap_or_default(),
                        truncate(&c.entry.render(), 70),
                    ]
                })
                .collect(),
        );
    }
    if let Some(last) = p.feedback.last() {
        println!();
        println!("last feedback: {}", last.note);
    }
    if p.state == proposal::ProposalState::PendingApproval {
        println!();
        println!("Next: distill rules approve  |  distill rules reject --feedback \"...\"");
    } else {
        println!();
        println!("Next: distill rules resubmit  |  distill rules propose --entry \"...\"");
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// approve / reject
// ---------------------------------------------------------------------------

fn decide(root: &Path, cfg: &Config, decision: Decision, json: bool) -> anyhow::Result<()> {
    let mut log = HistoryLog::new(root);
    let outcome = proposal::decide(root, cfg, decision, &mut log)?;
    if json {
        return print_json(&outcome);
    }
    match &outcome {
        Outcome::Committed {
            revision,
            added,
            removed,
            line_count,
        } => {
            println!(
                "committed revision {revision}: +{} -{} ({line_count}/{} lines)",
                added.len(),
                removed.len(),
                cfg.ceiling()
            );
            for e in removed {
                println!("  removed: {}", e.render().trim_start_matches("- "));
            }
        }
        Outcome::Rejected { .. } => {
            println!("proposal returned for revision; edit with 'distill rules propose' or send it back with 'distill rules resubmit'");
        }
        Outcome::Cancelled { .. } => {}
    }
    Ok(())
}

fn split_edit(raw: &str) -> anyhow::Result<(usize, &str)> {
    let (n, rest) = raw
        .split_once('=')
        .with_context(|| format!("expected N=VALUE, got '{raw}'"))?;
    let n: usize = n
        .trim()
        .parse()
        .with_context(|| format!("'{n}' is not an entry number"))?;
    Ok((n, rest))
}

fn build_edits(
    statements: &[String],
    categories: &[String],
    drop: &[usize],
) -> anyhow::Result<ApprovalEdits> {
    let mut edits = ApprovalEdits::default();
    for raw in statements {
        let (n, text) = split_edit(raw)?;
        edits.statements.insert(n, text.to_string());
    }
    for raw in categories {
        let (n, cat) = split_edit(raw)?;
        edits.categories.insert(n, cat.parse::<Category>()?);
    }
    edits.drop.extend(drop.iter().copied());
    Ok(edits)
}
