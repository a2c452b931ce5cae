use crate::ruleset::PruningProposal;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DistillError {
    #[error("not initialized: run 'distill init'")]
    NotInitialized,

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("incident not found: {0}")]
    IncidentNotFound(String),

    #[error(
        "ruleset would grow to {projected} lines, over the {ceiling}-line ceiling; {}",
        .pruning.describe()
    )]
    Capacity {
        projected: usize,
        ceiling: usize,
        pruning: Box<PruningProposal>,
    },

    #[error("a proposal is already {status} (opened {created_at}); approve, reject, or cancel it first")]
    ConcurrentProposal { status: String, created_at: String },

    #[error("no ruleset proposal in progress")]
    NoProposal,

    #[error("invalid proposal transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("ruleset changed since the proposal was drafted (expected revision {expected}, found {found}); cancel and propose again")]
    StaleRevision { expected: u64, found: u64 },

    #[error("project is locked by another distill process ({0}); retry, or delete the lock file if none is running")]
    Locked(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, DistillError>;
