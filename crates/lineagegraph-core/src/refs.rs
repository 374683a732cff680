//! Reference types emitted by the resolver
//!
//! A reference points at a table or column discovered while walking one
//! statement's parse tree. Paths are kept as segment lists so that rules
//! compare whole tree keys rather than substrings.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Ordered tree-key segments leading to a node
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RefPath(Vec<String>);

impl RefPath {
    /// Empty path (the statement root)
    pub fn root() -> Self {
        Self(Vec::new())
    }

    /// New path with `segment` appended
    pub fn child(&self, segment: &str) -> Self {
        let mut segments = self.0.clone();
        segments.push(segment.to_string());
        Self(segments)
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn last(&self) -> Option<&str> {
        self.0.last().map(String::as_str)
    }

    /// True if any segment equals `segment`
    pub fn contains(&self, segment: &str) -> bool {
        self.0.iter().any(|s| s == segment)
    }

    /// True if `window` occurs as a contiguous run of segments
    pub fn contains_window(&self, window: &[&str]) -> bool {
        if window.is_empty() || window.len() > self.0.len() {
            return window.is_empty();
        }

        self.0
            .windows(window.len())
            .any(|candidate| candidate.iter().zip(window).all(|(a, b)| a == b))
    }

    /// True if the path ends with `suffix`
    pub fn ends_with(&self, suffix: &[&str]) -> bool {
        if suffix.len() > self.0.len() {
            return false;
        }

        self.0[self.0.len() - suffix.len()..]
            .iter()
            .zip(suffix)
            .all(|(a, b)| a == b)
    }

    /// Number of leading segments shared with `other`
    pub fn common_prefix_len(&self, other: &RefPath) -> usize {
        self.0
            .iter()
            .zip(other.0.iter())
            .take_while(|(a, b)| a == b)
            .count()
    }
}

impl<S: Into<String>> FromIterator<S> for RefPath {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

impl fmt::Display for RefPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.join("/"))
    }
}

/// How a column participates in a statement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DependencyType {
    /// Declares the column
    Definition,

    /// Reads a value into the statement's output
    Data,

    /// Used only to shape the query (joins, filters, ordering)
    Query,

    /// Read by something outside the warehouse, e.g. a dashboard
    External,
}

impl DependencyType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Definition => "definition",
            Self::Data => "data",
            Self::Query => "query",
            Self::External => "external",
        }
    }
}

impl fmt::Display for DependencyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Optional qualifiers to the left of a table name
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Qualifiers {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warehouse_name: Option<String>,
}

/// Reference to a table, view or common table expression
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableRef {
    /// Path to the identifier that named the table
    pub path: RefPath,

    /// Unqualified table name
    pub name: String,

    /// Alias given in the statement (`FROM orders AS o`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,

    #[serde(flatten)]
    pub qualifiers: Qualifiers,

    /// True if the statement defines or targets this table
    pub is_self_ref: bool,
}

/// Reference to a column or a wildcard
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnRef {
    /// Path to the identifier (or wildcard node) that named the column
    pub path: RefPath,

    /// Column name, `*` for wildcards
    pub name: String,

    /// Output alias (`SELECT x AS y`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,

    /// Owning table, bound by the repair pass when not written in the SQL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table_name: Option<String>,

    #[serde(flatten)]
    pub qualifiers: Qualifiers,

    pub dependency_type: DependencyType,

    pub is_wildcard_ref: bool,
}

impl ColumnRef {
    /// Name the column has in the statement's output
    pub fn output_name(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }

    /// Bound table name, empty if still unbound
    pub fn bound_table(&self) -> &str {
        self.table_name.as_deref().unwrap_or("")
    }
}

/// All references found in one statement
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatementRefs {
    pub tables: Vec<TableRef>,
    pub columns: Vec<ColumnRef>,
    pub wildcards: Vec<ColumnRef>,
}

impl StatementRefs {
    /// The table the statement defines or targets, if any
    pub fn self_table(&self) -> Option<&TableRef> {
        self.tables.iter().find(|t| t.is_self_ref)
    }

    /// Tables the statement reads from
    pub fn parent_tables(&self) -> impl Iterator<Item = &TableRef> {
        self.tables.iter().filter(|t| !t.is_self_ref)
    }

    /// Column refs of the given dependency type
    pub fn columns_of(&self, dependency_type: DependencyType) -> impl Iterator<Item = &ColumnRef> {
        self.columns
            .iter()
            .filter(move |c| c.dependency_type == dependency_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(segments: &[&str]) -> RefPath {
        segments.iter().copied().collect()
    }

    #[test]
    fn window_matches_whole_segments_only() {
        let p = path(&["select_clause_element", "column_reference", "identifier"]);

        assert!(p.contains_window(&["select_clause_element", "column_reference"]));
        assert!(!p.contains_window(&["select_clause", "column_reference"]));
        assert!(!p.contains("select_clause"));
        assert!(p.ends_with(&["column_reference", "identifier"]));
        assert!(!p.ends_with(&["column_definition", "identifier"]));
    }

    #[test]
    fn common_prefix_stops_at_first_difference() {
        let a = path(&["select_statement", "select_clause", "column_reference"]);
        let b = path(&["select_statement", "from_clause", "select_clause"]);

        assert_eq!(a.common_prefix_len(&b), 1);
        assert_eq!(a.common_prefix_len(&a), 3);
        assert_eq!(a.common_prefix_len(&RefPath::root()), 0);
    }

    #[test]
    fn output_name_prefers_alias() {
        let column = ColumnRef {
            path: RefPath::root(),
            name: "x".to_string(),
            alias: Some("y".to_string()),
            table_name: None,
            qualifiers: Qualifiers::default(),
            dependency_type: DependencyType::Data,
            is_wildcard_ref: false,
        };

        assert_eq!(column.output_name(), "y");
        assert_eq!(column.bound_table(), "");
    }
}
