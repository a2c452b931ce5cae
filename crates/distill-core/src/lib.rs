pub mod config;
pub mod distill;
pub mod error;
pub mod history;
pub mod incident;
pub mod io;
pub mod paths;
pub mod proposal;
pub mod recall;
pub mod ruleset;
pub mod search;
pub mod types;

pub use error::{DistillError, Result};
