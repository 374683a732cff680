//! Failure codes and diagnostics
//!
//! IMPORTANT: Failure codes are versioned and stable.
//! NEVER rename or remove codes - callers match on the strings.
//! Add new codes with new names only.

use serde::{Deserialize, Serialize};

/// Failure code registry (v1)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureCode {
    // Tree shape
    /// Tree node has a shape the resolver does not accept
    ParseShape,

    /// Parser output is not a valid tree document
    InvalidTree,

    // Reference resolution
    /// More than one self table reference in a statement
    AmbiguousSelfReference,

    /// Column cannot be bound to any parent table
    MissingTableReference,

    /// Column binds equally well to several parent tables
    AmbiguousTableReference,

    // Graph building
    /// Dependency endpoint not found
    ReferenceNotFound,

    /// Dependency endpoint matches several columns
    AmbiguousReference,

    /// Dependency edge already present in the lineage
    DuplicateDependency,

    // Run level
    /// Store, parser or query history failure
    DownstreamCollaborator,

    /// Run request is inconsistent
    InvalidRequest,

    /// Lineage lifecycle violated
    LineageState,
}

impl FailureCode {
    /// Get the failure code as a stable string identifier
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ParseShape => "PARSE_SHAPE",
            Self::InvalidTree => "INVALID_TREE",
            Self::AmbiguousSelfReference => "AMBIGUOUS_SELF_REFERENCE",
            Self::MissingTableReference => "MISSING_TABLE_REFERENCE",
            Self::AmbiguousTableReference => "AMBIGUOUS_TABLE_REFERENCE",
            Self::ReferenceNotFound => "REFERENCE_NOT_FOUND",
            Self::AmbiguousReference => "AMBIGUOUS_REFERENCE",
            Self::DuplicateDependency => "DUPLICATE_DEPENDENCY",
            Self::DownstreamCollaborator => "DOWNSTREAM_COLLABORATOR",
            Self::InvalidRequest => "INVALID_REQUEST",
            Self::LineageState => "LINEAGE_STATE",
        }
    }
}

impl std::fmt::Display for FailureCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Diagnostic severity level
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warn,
    Error,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Info => write!(f, "info"),
            Self::Warn => write!(f, "warn"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// A diagnostic message with structured metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    /// Stable failure code
    pub code: FailureCode,

    pub severity: Severity,

    /// Human-readable message
    pub message: String,

    /// Relation the diagnostic is about
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relation_name: Option<String>,

    /// Tree path of the offending reference
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

impl Diagnostic {
    /// Create a new diagnostic with minimal fields
    pub fn new(code: FailureCode, severity: Severity, message: impl Into<String>) -> Self {
        Self {
            code,
            severity,
            message: message.into(),
            relation_name: None,
            path: None,
        }
    }

    pub fn with_relation(mut self, relation_name: impl Into<String>) -> Self {
        self.relation_name = Some(relation_name.into());
        self
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_code_stability() {
        assert_eq!(FailureCode::ParseShape.as_str(), "PARSE_SHAPE");
        assert_eq!(FailureCode::AmbiguousTableReference.as_str(), "AMBIGUOUS_TABLE_REFERENCE");
        assert_eq!(FailureCode::DownstreamCollaborator.as_str(), "DOWNSTREAM_COLLABORATOR");
    }

    #[test]
    fn serialized_code_matches_as_str() {
        for code in [
            FailureCode::ReferenceNotFound,
            FailureCode::AmbiguousSelfReference,
            FailureCode::LineageState,
        ] {
            let json = serde_json::to_string(&code).unwrap();
            assert_eq!(json, format!("\"{}\"", code.as_str()));
        }
    }

    #[test]
    fn diagnostic_serialization() {
        let diag = Diagnostic::new(
            FailureCode::ReferenceNotFound,
            Severity::Warn,
            "Column 'x' not found in 'b'",
        )
        .with_relation("db.schema.a");

        let json = serde_json::to_string(&diag).unwrap();
        assert!(json.contains("REFERENCE_NOT_FOUND"));
        assert!(json.contains("warn"));
        assert!(!json.contains("\"path\""));
    }
}
