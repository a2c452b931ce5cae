use crate::error::DistillError;
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Severity
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Critical => "CRITICAL",
            Severity::High => "HIGH",
            Severity::Medium => "MEDIUM",
            Severity::Low => "LOW",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Severity {
    type Err = DistillError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "CRITICAL" => Ok(Severity::Critical),
            "HIGH" => Ok(Severity::High),
            "MEDIUM" => Ok(Severity::Medium),
            "LOW" => Ok(Severity::Low),
            _ => Err(DistillError::Validation(format!(
                "unknown severity '{s}': must be CRITICAL, HIGH, MEDIUM, or LOW"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Category
// ---------------------------------------------------------------------------

/// Tag carried by every ruleset entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Category {
    Warning,
    Directive,
    Parameter,
}

impl Category {
    pub fn as_str(self) -> &'static str {
        match self {
            Category::Warning => "WARNING",
            Category::Directive => "DIRECTIVE",
            Category::Parameter => "PARAMETER",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Category {
    type Err = DistillError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "WARNING" => Ok(Category::Warning),
            "DIRECTIVE" => Ok(Category::Directive),
            "PARAMETER" => Ok(Category::Parameter),
            _ => Err(DistillError::Validation(format!(
                "unknown rule category '{s}': must be WARNING, DIRECTIVE, or PARAMETER"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// RuleSource
// ---------------------------------------------------------------------------

/// Where a ruleset entry was distilled from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RuleSource {
    Incident { id: String },
    Manual,
}

impl RuleSource {
    pub fn incident(id: impl Into<String>) -> Self {
        RuleSource::Incident { id: id.into() }
    }

    pub fn incident_id(&self) -> Option<&str> {
        match self {
            RuleSource::Incident { id } => Some(id),
            RuleSource::Manual => None,
        }
    }
}

impl fmt::Display for RuleSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuleSource::Incident { id } => f.write_str(id),
            RuleSource::Manual => f.write_str("manual"),
        }
    }
}

impl std::str::FromStr for RuleSource {
    type Err = DistillError;

    /// `manual` (any case) or an incident identifier.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("manual") {
            return Ok(RuleSource::Manual);
        }
        crate::incident::normalize_id(s).map(|id| RuleSource::Incident { id })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_parse_is_case_insensitive() {
        assert_eq!("high".parse::<Severity>().unwrap(), Severity::High);
        assert_eq!(" Critical ".parse::<Severity>().unwrap(), Severity::Critical);
    }

    #[test]
    fn severity_outside_closed_set_is_validation_error() {
        let err = "SEVERE".parse::<Severity>().unwrap_err();
        assert!(matches!(err, DistillError::Validation(_)));
        assert!(err.to_string().contains("SEVERE"));
    }

    #[test]
    fn severity_serializes_upper_case() {
        let yaml = serde_yaml::to_string(&Severity::Medium).unwrap();
        assert_eq!(yaml.trim(), "MEDIUM");
    }

    #[test]
    fn category_round_trips_through_display() {
        for c in [Category::Warning, Category::Directive, Category::Parameter] {
            assert_eq!(c.to_string().parse::<Category>().unwrap(), c);
        }
        assert!("NOTE".parse::<Category>().is_err());
    }

    #[test]
    fn rule_source_parse() {
        assert_eq!("manual".parse::<RuleSource>().unwrap(), RuleSource::Manual);
        assert_eq!(
            "pm-7".parse::<RuleSource>().unwrap(),
            RuleSource::incident("PM-007")
        );
        assert!("ticket-9".parse::<RuleSource>().is_err());
    }
}
