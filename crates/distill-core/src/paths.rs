use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// Directory constants
// ---------------------------------------------------------------------------

pub const DISTILL_DIR: &str = ".distill";
pub const CONFIG_FILE: &str = ".distill/config.yaml";
pub const PROPOSAL_FILE: &str = ".distill/proposal.yaml";
pub const HISTORY_FILE: &str = ".distill/history.yaml";
pub const LOCK_FILE: &str = ".distill/distill.lock";

pub const DEFAULT_INCIDENTS_DIR: &str = "postmortem";
pub const DEFAULT_RULES_FILE: &str = "RULES.md";

pub const INCIDENT_EXT: &str = "yaml";

// ---------------------------------------------------------------------------
// Path helpers
// ---------------------------------------------------------------------------

pub fn distill_dir(root: &Path) -> PathBuf {
    root.join(DISTILL_DIR)
}

pub fn config_path(root: &Path) -> PathBuf {
    root.join(CONFIG_FILE)
}

pub fn proposal_path(root: &Path) -> PathBuf {
    root.join(PROPOSAL_FILE)
}

pub fn history_path(root: &Path) -> PathBuf {
    root.join(HISTORY_FILE)
}

pub fn lock_path(root: &Path) -> PathBuf {
    root.join(LOCK_FILE)
}

pub fn incidents_dir(root: &Path, dir: &str) -> PathBuf {
    root.join(dir)
}

pub fn incident_file(root: &Path, dir: &str, id: &str, slug: &str) -> PathBuf {
    let name = if slug.is_empty() {
        format!("{id}.{INCIDENT_EXT}")
    } else {
        format!("{id}-{slug}.{INCIDENT_EXT}")
    };
    incidents_dir(root, dir).join(name)
}

pub fn rules_path(root: &Path, file: &str) -> PathBuf {
    root.join(file)
}

// ---------------------------------------------------------------------------
// Slugs
// ---------------------------------------------------------------------------

pub const MAX_SLUG_LEN: usize = 48;

/// Derive a file-name slug from a free-text title: lowercase ASCII
/// alphanumerics separated by single hyphens.
pub fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    let mut pending_dash = false;
    for c in title.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c.to_ascii_lowercase());
            if slug.len() >= MAX_SLUG_LEN {
                break;
            }
        } else {
            pending_dash = true;
        }
    }
    slug.trim_end_matches('-').to_string()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
