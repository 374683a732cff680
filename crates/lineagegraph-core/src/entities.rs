//! Lineage graph entities
//!
//! Materializations, columns and dependencies are rebuilt on every run and
//! stored per lineage snapshot. A `Lineage` is the snapshot root.

use crate::refs::{DependencyType, StatementRefs};
use crate::tree::ParsedTree;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Generate a fresh entity id
pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Kind of warehouse object a materialization represents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MaterializationKind {
    #[default]
    Table,
    View,
}

impl fmt::Display for MaterializationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Table => write!(f, "base table"),
            Self::View => write!(f, "view"),
        }
    }
}

/// Table or view in the warehouse
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Materialization {
    pub id: String,

    /// Fully qualified name, stable across snapshots (`db.schema.name`)
    pub relation_name: String,

    pub name: String,

    pub kind: MaterializationKind,

    pub schema_name: String,

    pub database_name: String,

    /// Logic that produces this materialization, if it is built from SQL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logic_id: Option<String>,

    pub lineage_id: String,

    pub organization_id: String,
}

/// Column of a materialization
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    pub id: String,

    pub name: String,

    /// 1-based position within the materialization
    pub index: usize,

    pub relation_name: String,

    pub materialization_id: String,

    pub lineage_id: String,

    pub organization_id: String,
}

/// Identity of a dependency edge within one lineage
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DependencyKey {
    pub dependency_type: DependencyType,
    pub head_column_id: String,
    pub tail_column_id: String,
    pub lineage_id: String,
}

/// Directed edge: head depends on tail
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dependency {
    pub id: String,

    #[serde(rename = "type")]
    pub dependency_type: DependencyType,

    pub head_column_id: String,

    pub tail_column_id: String,

    pub lineage_id: String,

    pub organization_id: String,
}

impl Dependency {
    /// Create a dependency with a fresh id
    pub fn new(
        dependency_type: DependencyType,
        head_column_id: impl Into<String>,
        tail_column_id: impl Into<String>,
        lineage_id: impl Into<String>,
        organization_id: impl Into<String>,
    ) -> Self {
        Self {
            id: new_id(),
            dependency_type,
            head_column_id: head_column_id.into(),
            tail_column_id: tail_column_id.into(),
            lineage_id: lineage_id.into(),
            organization_id: organization_id.into(),
        }
    }

    pub fn key(&self) -> DependencyKey {
        DependencyKey {
            dependency_type: self.dependency_type,
            head_column_id: self.head_column_id.clone(),
            tail_column_id: self.tail_column_id.clone(),
            lineage_id: self.lineage_id.clone(),
        }
    }
}

/// BI dashboard reading a warehouse column
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dashboard {
    pub id: String,
    pub url: String,
    pub materialization_name: String,
    pub column_name: String,
    pub materialization_id: String,
    pub column_id: String,
    pub lineage_id: String,
    pub organization_id: String,
}

/// Resolved SQL logic of one source object
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Logic {
    pub id: String,

    pub relation_name: String,

    pub lineage_id: String,

    pub organization_id: String,

    pub parsed_tree: ParsedTree,

    /// One entry per statement, in source order
    pub statement_refs: Vec<StatementRefs>,

    /// SHA-256 of the parsed tree
    pub checksum: String,
}

impl Logic {
    /// Create a logic with a fresh id
    pub fn new(
        relation_name: impl Into<String>,
        lineage_id: impl Into<String>,
        organization_id: impl Into<String>,
        parsed_tree: ParsedTree,
        statement_refs: Vec<StatementRefs>,
    ) -> Self {
        let checksum = parsed_tree.checksum();

        Self {
            id: new_id(),
            relation_name: relation_name.into(),
            lineage_id: lineage_id.into(),
            organization_id: organization_id.into(),
            parsed_tree,
            statement_refs,
            checksum,
        }
    }
}

/// Errors from lineage state transitions
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LineageStateError {
    #[error("Lineage {0} is already completed")]
    AlreadyCompleted(String),
}

/// Versioned lineage snapshot root
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lineage {
    pub id: String,

    pub organization_id: String,

    pub created_at: DateTime<Utc>,

    /// Set once all entities of the snapshot are written
    pub completed: bool,

    /// Databases whose objects are covered by this snapshot
    #[serde(default)]
    pub db_covered_names: Vec<String>,

    /// JSON summary of changes against the previous snapshot
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diff: Option<String>,
}

impl Lineage {
    /// Allocate a new, incomplete lineage
    pub fn new(organization_id: impl Into<String>) -> Self {
        Self {
            id: new_id(),
            organization_id: organization_id.into(),
            created_at: Utc::now(),
            completed: false,
            db_covered_names: Vec::new(),
            diff: None,
        }
    }

    /// Completed copy of this lineage
    ///
    /// Completion happens exactly once; completing a completed lineage is an error.
    pub fn into_completed(
        self,
        db_covered_names: Vec<String>,
        diff: Option<String>,
    ) -> Result<Self, LineageStateError> {
        if self.completed {
            return Err(LineageStateError::AlreadyCompleted(self.id));
        }

        Ok(Self {
            completed: true,
            db_covered_names,
            diff,
            ..self
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lineage_completes_once() {
        let lineage = Lineage::new("org-1");
        assert!(!lineage.completed);

        let completed = lineage.into_completed(vec!["ANALYTICS".to_string()], None).unwrap();
        assert!(completed.completed);
        assert_eq!(completed.db_covered_names, vec!["ANALYTICS".to_string()]);

        let again = completed.into_completed(Vec::new(), None);
        assert!(matches!(again, Err(LineageStateError::AlreadyCompleted(_))));
    }

    #[test]
    fn dependency_key_ignores_id() {
        let a = Dependency::new(DependencyType::Data, "h", "t", "l", "o");
        let b = Dependency::new(DependencyType::Data, "h", "t", "l", "o");

        assert_ne!(a.id, b.id);
        assert_eq!(a.key(), b.key());
    }

    #[test]
    fn dependency_serializes_type_field() {
        let dependency = Dependency::new(DependencyType::Query, "h", "t", "l", "o");
        let json = serde_json::to_string(&dependency).unwrap();
        assert!(json.contains("\"type\":\"query\""));
    }
}
