//! Ruleset change proposals and the human approval state machine.
//!
//! Layout:
//!   .distill/proposal.yaml   the single in-flight proposal, if any
//!
//! Lifecycle:
//!   drafting → pending_approval → approved → committed
//!                    ↓
//!                rejected → drafting (edits applied, feedback kept)
//!
//! Nothing touches the ruleset document until an approved proposal commits.
//! Approval is a state on disk, so a pending proposal survives restarts and
//! waits indefinitely; cancelling simply deletes the file.

use crate::config::Config;
use crate::error::{DistillError, Result};
use crate::history::OutcomeSink;
use crate::incident::{self, IncidentRecord};
use crate::ruleset::{self, PruningProposal, RuleEntry};
use crate::types::{Category, RuleSource};
use crate::{io, paths};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::Path;

// ---------------------------------------------------------------------------
// ProposalState
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProposalState {
    Drafting,
    PendingApproval,
    Approved,
    Rejected,
    Committed,
}

impl ProposalState {
    pub fn as_str(self) -> &'static str {
        match self {
            ProposalState::Drafting => "drafting",
            ProposalState::PendingApproval => "pending_approval",
            ProposalState::Approved => "approved",
            ProposalState::Rejected => "rejected",
            ProposalState::Committed => "committed",
        }
    }

    pub fn can_transition_to(self, next: ProposalState) -> bool {
        use ProposalState::*;
        matches!(
            (self, next),
            (Drafting, PendingApproval)
                | (PendingApproval, Approved)
                | (PendingApproval, Rejected)
                | (Rejected, Drafting)
                | (Approved, Committed)
        )
    }
}

impl fmt::Display for ProposalState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Proposal
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Feedback {
    pub at: DateTime<Utc>,
    pub note: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Proposal {
    pub state: ProposalState,
    /// Ruleset revision the projection was computed against.
    pub base_revision: u64,
    pub entries: Vec<RuleEntry>,
    pub current_lines: usize,
    pub projected_lines: usize,
    pub ceiling: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pruning: Option<PruningProposal>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub feedback: Vec<Feedback>,
    /// Incremented each time the proposal goes back for revision.
    #[serde(default = "default_cycle")]
    pub cycle: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn default_cycle() -> u32 {
    1
}

impl Proposal {
    fn transition(&mut self, next: ProposalState) -> Result<()> {
        if !self.state.can_transition_to(next) {
            return Err(DistillError::InvalidTransition {
                from: self.state.to_string(),
                to: next.to_string(),
            });
        }
        self.state = next;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Line count after applying the suggested pruning and the additions.
    pub fn projected_after_pruning(&self) -> usize {
        let freed = self.pruning.as_ref().map_or(0, |p| p.freed_lines());
        self.projected_lines.saturating_sub(freed)
    }
}

// ---------------------------------------------------------------------------
// Decisions and outcomes
// ---------------------------------------------------------------------------

/// Approver changes applied on top of the proposed entries. Indices are
/// 1-based positions in the proposal's entry list.
#[derive(Debug, Clone, Default)]
pub struct ApprovalEdits {
    pub statements: BTreeMap<usize, String>,
    pub categories: BTreeMap<usize, Category>,
    pub drop: BTreeSet<usize>,
    /// Overrides the suggested pruning (positions in the current ruleset).
    /// Only meaningful on approval.
    pub removals: Option<Vec<usize>>,
}

#[derive(Debug, Clone)]
pub enum Decision {
    Approved(ApprovalEdits),
    Rejected { feedback: String, edits: ApprovalEdits },
}

impl Decision {
    pub fn approve() -> Self {
        Decision::Approved(ApprovalEdits::default())
    }

    pub fn reject(feedback: impl Into<String>) -> Self {
        Decision::Rejected {
            feedback: feedback.into(),
            edits: ApprovalEdits::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Outcome {
    Committed {
        revision: u64,
        added: Vec<RuleEntry>,
        removed: Vec<RuleEntry>,
        line_count: usize,
    },
    Rejected {
        feedback: String,
    },
    Cancelled {
        entries: usize,
    },
}

impl Outcome {
    pub fn label(&self) -> &'static str {
        match self {
            Outcome::Committed { .. } => "committed",
            Outcome::Rejected { .. } => "rejected",
            Outcome::Cancelled { .. } => "cancelled",
        }
    }
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

fn save_proposal(root: &Path, proposal: &Proposal) -> Result<()> {
    let data = serde_yaml::to_string(proposal)?;
    io::atomic_write(&paths::proposal_path(root), data.as_bytes())
}

fn remove_proposal(root: &Path) -> Result<()> {
    let path = paths::proposal_path(root);
    if path.exists() {
        std::fs::remove_file(path)?;
    }
    Ok(())
}

/// The proposal change is already on disk; a failing sink must not turn it
/// into an error.
fn report(sink: &mut dyn OutcomeSink, outcome: &Outcome) {
    if let Err(e) = sink.report(outcome) {
        tracing::warn!(outcome = outcome.label(), error = %e, "failed to record proposal outcome");
    }
}

fn require(root: &Path) -> Result<Proposal> {
    current(root)?.ok_or(DistillError::NoProposal)
}

/// Trim, shape-check and resolve sources. Incident sources are canonicalised.
fn prepare_entries(
    entries: Vec<RuleEntry>,
    records: &[IncidentRecord],
    cfg: &Config,
) -> Result<Vec<RuleEntry>> {
    entries
        .into_iter()
        .map(|entry| {
            let entry = RuleEntry::new(entry.category, entry.statement, entry.source);
            entry.validate(cfg.ruleset.max_statement_chars)?;
            let source = match &entry.source {
                RuleSource::Manual => RuleSource::Manual,
                RuleSource::Incident { id } => {
                    let id = incident::normalize_id(id)
                        .map_err(|_| DistillError::IncidentNotFound(id.clone()))?;
                    if !records.iter().any(|r| r.id == id) {
                        return Err(DistillError::IncidentNotFound(id));
                    }
                    RuleSource::Incident { id }
                }
            };
            Ok(RuleEntry { source, ..entry })
        })
        .collect()
}

fn apply_edits(entries: &[RuleEntry], edits: &ApprovalEdits) -> Result<Vec<RuleEntry>> {
    let in_range = |i: &usize| *i >= 1 && *i <= entries.len();
    let bad = edits
        .statements
        .keys()
        .chain(edits.categories.keys())
        .chain(edits.drop.iter())
        .find(|i| !in_range(i));
    if let Some(i) = bad {
        return Err(DistillError::Validation(format!(
            "edit refers to entry {i}, but the proposal has {} entries",
            entries.len()
        )));
    }
    Ok(entries
        .iter()
        .enumerate()
        .map(|(i, e)| (i + 1, e))
        .filter(|(n, _)| !edits.drop.contains(n))
        .map(|(n, e)| {
            let mut e = e.clone();
            if let Some(s) = edits.statements.get(&n) {
                e.statement = s.trim().to_string();
            }
            if let Some(c) = edits.categories.get(&n) {
                e.category = *c;
            }
            e
        })
        .collect())
}

/// Validate entries against the current ruleset and build a pending proposal.
fn build_pending(
    root: &Path,
    cfg: &Config,
    entries: Vec<RuleEntry>,
    previous: Option<Proposal>,
) -> Result<Proposal> {
    if entries.is_empty() {
        return Err(DistillError::Validation(
            "a proposal needs at least one entry".to_string(),
        ));
    }
    let records = incident::list(root, cfg)?;
    let entries = prepare_entries(entries, &records, cfg)?;

    let current = ruleset::load(root, cfg)?;
    let ceiling = cfg.ceiling();
    let current_lines = current.line_count();
    let projected_lines = current_lines + entries.len();

    let pruning = if projected_lines > ceiling {
        let plan = PruningProposal::plan(&current, &records, projected_lines - ceiling);
        if !plan.is_sufficient() {
            return Err(DistillError::Capacity {
                projected: projected_lines,
                ceiling,
                pruning: Box::new(plan),
            });
        }
        Some(plan)
    } else {
        None
    };

    let now = Utc::now();
    let mut proposal = match previous {
        Some(prev) => Proposal {
            base_revision: current.revision,
            entries,
            current_lines,
            projected_lines,
            ceiling,
            pruning,
            cycle: prev.cycle + 1,
            ..prev
        },
        None => Proposal {
            state: ProposalState::Drafting,
            base_revision: current.revision,
            entries,
            current_lines,
            projected_lines,
            ceiling,
            pruning,
            feedback: Vec::new(),
            cycle: 1,
            created_at: now,
            updated_at: now,
        },
    };
    proposal.transition(ProposalState::PendingApproval)?;
    Ok(proposal)
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// The in-flight proposal, if any.
pub fn current(root: &Path) -> Result<Option<Proposal>> {
    io::read_yaml_opt(&paths::proposal_path(root))
}

/// Propose adding `entries` to the ruleset.
///
/// Fails with `ConcurrentProposal` while another proposal awaits approval.
/// A proposal sitting in `drafting` after a rejection is replaced by these
/// entries as its next revision cycle. When the addition would push the
/// document over the ceiling, a pruning proposal is attached.
pub fn propose(root: &Path, cfg: &Config, entries: Vec<RuleEntry>) -> Result<Proposal> {
    let _lock = io::ProjectLock::acquire(&paths::lock_path(root))?;

    let previous = current(root)?;
    if let Some(p) = &previous {
        if p.state != ProposalState::Drafting {
            return Err(DistillError::ConcurrentProposal {
                status: p.state.to_string(),
                created_at: p.created_at.format("%Y-%m-%d %H:%M UTC").to_string(),
            });
        }
    }

    let proposal = build_pending(root, cfg, entries, previous)?;
    save_proposal(root, &proposal)?;
    tracing::info!(
        entries = proposal.entries.len(),
        projected = proposal.projected_lines,
        ceiling = proposal.ceiling,
        pruning = proposal.pruning.is_some(),
        "ruleset proposal awaiting approval"
    );
    Ok(proposal)
}

/// Send a drafting proposal (typically edited after a rejection) back for approval.
pub fn resubmit(root: &Path, cfg: &Config) -> Result<Proposal> {
    let _lock = io::ProjectLock::acquire(&paths::lock_path(root))?;

    let previous = require(root)?;
    if previous.state != ProposalState::Drafting {
        return Err(DistillError::InvalidTransition {
            from: previous.state.to_string(),
            to: ProposalState::PendingApproval.to_string(),
        });
    }
    let entries = previous.entries.clone();
    let proposal = build_pending(root, cfg, entries, Some(previous))?;
    save_proposal(root, &proposal)?;
    tracing::info!(cycle = proposal.cycle, "ruleset proposal resubmitted");
    Ok(proposal)
}

/// Apply the approver's decision to the pending proposal.
///
/// Approval commits additions and removals in one atomic document write, or
/// nothing at all: a revision mismatch yields `StaleRevision` and a result
/// over the ceiling yields `Capacity`, both leaving the proposal pending.
pub fn decide(
    root: &Path,
    cfg: &Config,
    decision: Decision,
    sink: &mut dyn OutcomeSink,
) -> Result<Outcome> {
    let _lock = io::ProjectLock::acquire(&paths::lock_path(root))?;

    let mut proposal = require(root)?;
    match decision {
        Decision::Approved(edits) => {
            if !proposal.state.can_transition_to(ProposalState::Approved) {
                return Err(DistillError::InvalidTransition {
                    from: proposal.state.to_string(),
                    to: ProposalState::Approved.to_string(),
                });
            }
            let records = incident::list(root, cfg)?;
            let entries = prepare_entries(apply_edits(&proposal.entries, &edits)?, &records, cfg)?;
            let current = ruleset::load(root, cfg)?;
            if current.revision != proposal.base_revision {
                return Err(DistillError::StaleRevision {
                    expected: proposal.base_revision,
                    found: current.revision,
                });
            }
            let ceiling = cfg.ceiling();
            let removals: Vec<usize> = match edits.removals {
                Some(r) => r,
                // Prune only what the edited entries still need.
                None => {
                    let needed = (current.line_count() + entries.len()).saturating_sub(ceiling);
                    if needed == 0 {
                        Vec::new()
                    } else {
                        PruningProposal::plan(&current, &records, needed).suggested
                    }
                }
            };
            if entries.is_empty() && removals.is_empty() {
                return Err(DistillError::Validation(
                    "nothing to commit: every entry was dropped and no removals were chosen"
                        .to_string(),
                ));
            }

            let next = current.apply(&removals, &entries)?;
            if next.line_count() > ceiling {
                let needed = (current.line_count() + entries.len()).saturating_sub(ceiling);
                return Err(DistillError::Capacity {
                    projected: next.line_count(),
                    ceiling,
                    pruning: Box::new(PruningProposal::plan(&current, &records, needed)),
                });
            }

            proposal.transition(ProposalState::Approved)?;
            let removed_positions: BTreeSet<usize> = removals.iter().copied().collect();
            let removed: Vec<RuleEntry> = removed_positions
                .iter()
                .map(|p| current.entries[p - 1].clone())
                .collect();
            ruleset::save(root, cfg, &next)?;
            proposal.transition(ProposalState::Committed)?;
            remove_proposal(root)?;

            let outcome = Outcome::Committed {
                revision: next.revision,
                added: entries,
                removed,
                line_count: next.line_count(),
            };
            tracing::info!(
                revision = next.revision,
                lines = next.line_count(),
                "ruleset proposal committed"
            );
            report(sink, &outcome);
            Ok(outcome)
        }

        Decision::Rejected { feedback, edits } => {
            let feedback = feedback.trim().to_string();
            if feedback.is_empty() {
                return Err(DistillError::Validation(
                    "a rejection must say what needs to change".to_string(),
                ));
            }
            let entries = apply_edits(&proposal.entries, &edits)?;
            proposal.transition(ProposalState::Rejected)?;
            proposal.entries = entries;
            proposal.pruning = None;
            proposal.feedback.push(Feedback {
                at: Utc::now(),
                note: feedback.clone(),
            });
            proposal.transition(ProposalState::Drafting)?;
            save_proposal(root, &proposal)?;

            tracing::info!(cycle = proposal.cycle, "ruleset proposal returned for revision");
            let outcome = Outcome::Rejected { feedback };
            report(sink, &outcome);
            Ok(outcome)
        }
    }
}

/// Discard the in-flight proposal. The ruleset is untouched.
pub fn cancel(root: &Path, sink: &mut dyn OutcomeSink) -> Result<Proposal> {
    let _lock = io::ProjectLock::acquire(&paths::lock_path(root))?;

    let proposal = require(root)?;
    remove_proposal(root)?;
    tracing::info!(state = %proposal.state, "ruleset proposal cancelled");
    report(
        sink,
        &Outcome::Cancelled {
            entries: proposal.entries.len(),
        },
    );
    Ok(proposal)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
