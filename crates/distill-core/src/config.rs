use crate::error::{DistillError, Result};
use crate::paths;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Hard maximum number of rendered lines in the ruleset document.
pub const RULESET_CEILING: usize = 100;

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

// ---------------------------------------------------------------------------
// StoreConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Directory (relative to the project root) holding one file per incident.
    #[serde(default = "default_incidents_dir")]
    pub incidents_dir: String,
    /// Rendered ruleset document (relative to the project root).
    #[serde(default = "default_rules_file")]
    pub rules_file: String,
}

fn default_incidents_dir() -> String {
    paths::DEFAULT_INCIDENTS_DIR.to_string()
}

fn default_rules_file() -> String {
    paths::DEFAULT_RULES_FILE.to_string()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            incidents_dir: default_incidents_dir(),
            rules_file: default_rules_file(),
        }
    }
}

// ---------------------------------------------------------------------------
// RulesetConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RulesetConfig {
    /// May lower the ceiling, never raise it above [`RULESET_CEILING`].
    #[serde(default = "default_ceiling")]
    pub ceiling: usize,
    #[serde(default = "default_max_statement_chars")]
    pub max_statement_chars: usize,
}

fn default_ceiling() -> usize {
    RULESET_CEILING
}

fn default_max_statement_chars() -> usize {
    160
}

impl Default for RulesetConfig {
    fn default() -> Self {
        Self {
            ceiling: default_ceiling(),
            max_statement_chars: default_max_statement_chars(),
        }
    }
}

// ---------------------------------------------------------------------------
// ProjectConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

// ---------------------------------------------------------------------------
// Config (top-level)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_version")]
    pub version: u32,
    pub project: ProjectConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub ruleset: RulesetConfig,
}

fn default_version() -> u32 {
    1
}

impl Config {
    pub fn new(project_name: impl Into<String>) -> Self {
        Self {
            version: 1,
            project: ProjectConfig {
                name: project_name.into(),
                description: None,
            },
            store: StoreConfig::default(),
            ruleset: RulesetConfig::default(),
        }
    }

    /// The ceiling actually enforced.
    pub fn ceiling(&self) -> usize {
        self.ruleset.ceiling.min(RULESET_CEILING)
    }

    pub fn load(root: &Path) -> Result<Self> {
        let path = paths::config_path(root);
        if !path.exists() {
            return Err(DistillError::NotInitialized);
        }
        let data = std::fs::read_to_string(&path)?;
        let cfg: Config = serde_yaml::from_str(&data)?;
        Ok(cfg)
    }

    pub fn save(&self, root: &Path) -> Result<()> {
        let path = paths::config_path(root);
        let data = serde_yaml::to_string(self)?;
        crate::io::atomic_write(&path, data.as_bytes())
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();

        if self.ruleset.ceiling > RULESET_CEILING {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: format!(
                    "ruleset.ceiling={} is above the hard limit; {} is enforced",
                    self.ruleset.ceiling, RULESET_CEILING
                ),
            });
        }

        if self.ceiling() <= crate::ruleset::HEADER_LINES {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: format!(
                    "ruleset.ceiling={} leaves no room for entries below the {}-line header",
                    self.ruleset.ceiling,
                    crate::ruleset::HEADER_LINES
                ),
            });
        }

        if self.ruleset.max_statement_chars == 0 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: "ruleset.max_statement_chars must be greater than zero".to_string(),
            });
        }

        if self.store.incidents_dir.trim().is_empty() {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: "store.incidents_dir is empty".to_string(),
            });
        }

        if self.store.rules_file.trim().is_empty() {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: "store.rules_file is empty".to_string(),
            });
        } else if Path::new(&self.store.rules_file)
            .starts_with(self.store.incidents_dir.trim_end_matches('/'))
        {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: format!(
                    "rules file '{}' lives inside the incidents directory",
                    self.store.rules_file
                ),
            });
        }

        warnings
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
