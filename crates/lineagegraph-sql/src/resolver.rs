//! Reference resolution
//!
//! Walks one statement's parse tree and classifies every table, column and
//! wildcard it names. Classification looks only at the path of tree keys that
//! leads to a node; segments are compared whole, never as substrings.
//!
//! The walk is a set of pure functions: each node returns the refs found below
//! it and the caller concatenates them in document order. Aliases are lifted
//! out of `alias_expression` (or `keyword: as` + `identifier`) by the map that
//! owns them and handed to the first ref emitted below that map, never across
//! a nested statement. An alias no ref takes is a computed output column in a
//! select element, or names a FROM subquery.

use crate::binder::{DerivedTable, TableBinder};
use crate::parser::{self, ParsedDocument, TreeError};
use crate::qualifier::{self, QualifiedColumn, QualifiedTable};
use lineagegraph_core::element::*;
use lineagegraph_core::{
    ColumnRef, DependencyType, FailureCode, Logic, ParsedTree, RefPath, StatementRefs, TableRef,
};

/// Path windows marking a column that feeds the statement's output
const DATA_WINDOWS: [&[&str]; 4] = [
    &[SELECT_CLAUSE_ELEMENT, COLUMN_REFERENCE],
    &[SELECT_CLAUSE_ELEMENT, WILDCARD_EXPRESSION],
    &[SELECT_CLAUSE_ELEMENT, ALIAS_EXPRESSION],
    &[FUNCTION, BRACKETED, EXPRESSION, COLUMN_REFERENCE],
];

/// Path endings of the table a statement creates or writes
const SELF_SUFFIXES: [&[&str]; 3] = [
    &[CREATE_TABLE_STATEMENT, TABLE_REFERENCE, IDENTIFIER],
    &[INSERT_STATEMENT, TABLE_REFERENCE, IDENTIFIER],
    &[COMMON_TABLE_EXPRESSION, IDENTIFIER],
];

/// Resolves parse trees into statement references
pub struct RefResolver;

impl RefResolver {
    /// Resolve one statement subtree
    pub fn resolve(statement: &ParsedTree) -> Result<StatementRefs, ResolveError> {
        let collected = visit(statement, &RefPath::root(), None)?;

        let mut self_tables = collected.tables.iter().filter(|t| t.is_self_ref);
        if let (Some(first), Some(second)) = (self_tables.next(), self_tables.next()) {
            return Err(ResolveError::AmbiguousSelfReference {
                first: first.name.clone(),
                second: second.name.clone(),
            });
        }

        let binder = TableBinder::new(&collected.tables).with_derived(&collected.derived);
        let columns = binder.bind_all(collected.columns)?;
        let wildcards = binder.bind_all(collected.wildcards)?;

        Ok(StatementRefs {
            tables: collected.tables,
            columns,
            wildcards,
        })
    }

    /// Resolve every statement of a file tree, in source order
    pub fn resolve_all(file: &ParsedTree) -> Result<Vec<StatementRefs>, ResolveError> {
        let statements = parser::statements(file);
        tracing::debug!(statements = statements.len(), "resolving statements");

        statements.into_iter().map(Self::resolve).collect()
    }

    /// Resolve a parsed document into the `Logic` of a source object
    pub fn build_logic(
        relation_name: &str,
        lineage_id: &str,
        organization_id: &str,
        document: ParsedDocument,
    ) -> Result<Logic, ResolveError> {
        let statement_refs = Self::resolve_all(document.file()?)?;

        Ok(Logic::new(
            relation_name,
            lineage_id,
            organization_id,
            document.into_tree(),
            statement_refs,
        ))
    }
}

/// Refs found below one node
#[derive(Default)]
struct Collected {
    tables: Vec<TableRef>,
    columns: Vec<ColumnRef>,
    wildcards: Vec<ColumnRef>,
    derived: Vec<DerivedTable>,

    /// The alias handed down to this node was given to one of its refs
    alias_used: bool,
}

impl Collected {
    fn append(&mut self, other: Collected) {
        self.tables.extend(other.tables);
        self.columns.extend(other.columns);
        self.wildcards.extend(other.wildcards);
        self.derived.extend(other.derived);
    }
}

fn visit(node: &ParsedTree, path: &RefPath, alias: Option<&str>) -> Result<Collected, ResolveError> {
    match node {
        ParsedTree::Leaf(value) => {
            if path.last() == Some(IDENTIFIER) {
                Ok(classify_identifier(value, path, alias))
            } else {
                Ok(Collected::default())
            }
        }
        ParsedTree::List(items) => visit_list(items, path, alias),
        ParsedTree::Map(entries) => visit_map(entries, path, alias),
    }
}

fn visit_list(items: &[ParsedTree], path: &RefPath, alias: Option<&str>) -> Result<Collected, ResolveError> {
    let key = path.last().unwrap_or_default();

    if !items.is_empty() && matches!(key, COLUMN_REFERENCE | TABLE_REFERENCE | COMMON_TABLE_EXPRESSION) {
        match qualifier::join_chain(items) {
            Some(joined) => return Ok(classify_identifier(&joined, &path.child(IDENTIFIER), alias)),
            // A list of full CTE definitions is walked like any other list
            None if key == COMMON_TABLE_EXPRESSION => {}
            None => {
                return Err(ResolveError::ParseShape {
                    path: path.to_string(),
                    message: "qualifier chain holds a node other than identifier or dot".to_string(),
                })
            }
        }
    }

    let mut collected = Collected::default();
    let mut pending = alias;

    for item in items {
        let child = visit(item, path, pending)?;
        if child.alias_used {
            pending = None;
        }
        collected.append(child);
    }

    collected.alias_used = alias.is_some() && pending.is_none();
    Ok(collected)
}

fn visit_map(
    entries: &[(String, ParsedTree)],
    path: &RefPath,
    inherited: Option<&str>,
) -> Result<Collected, ResolveError> {
    let lifted = lift_alias(entries);
    let own_alias = lifted.as_ref().map(|l| l.alias.as_str());

    let mut collected = Collected::default();
    let mut pending = own_alias.or(inherited);

    for (index, (key, value)) in entries.iter().enumerate() {
        if lifted.as_ref().is_some_and(|l| l.index == index) {
            continue;
        }

        let child_path = path.child(key);
        let child = if key == WILDCARD_IDENTIFIER {
            visit_wildcard(value, &child_path)?
        } else if matches!(key.as_str(), SELECT_STATEMENT | WITH_COMPOUND_STATEMENT) {
            visit(value, &child_path, None)?
        } else {
            visit(value, &child_path, pending)?
        };

        if child.alias_used {
            pending = None;
        }
        collected.append(child);
    }

    if let (Some(alias), Some(_)) = (own_alias, pending) {
        unclaimed_alias(alias, path, &mut collected);
    }

    collected.alias_used = own_alias.is_none() && inherited.is_some() && pending.is_none();
    Ok(collected)
}

/// Alias owned by a map and the entry it was read from
struct LiftedAlias {
    alias: String,
    index: usize,
}

fn lift_alias(entries: &[(String, ParsedTree)]) -> Option<LiftedAlias> {
    for (index, (key, value)) in entries.iter().enumerate() {
        if key == ALIAS_EXPRESSION {
            if let Some(alias) = first_identifier(value) {
                return Some(LiftedAlias {
                    alias: alias.to_string(),
                    index,
                });
            }
        }

        let is_as = key == KEYWORD
            && value
                .as_leaf()
                .is_some_and(|keyword| keyword.eq_ignore_ascii_case(KEYWORD_AS));

        if is_as {
            if let Some((next_key, next_value)) = entries.get(index + 1) {
                if let (IDENTIFIER, Some(alias)) = (next_key.as_str(), next_value.as_leaf()) {
                    return Some(LiftedAlias {
                        alias: alias.to_string(),
                        index: index + 1,
                    });
                }
            }
        }
    }

    None
}

/// Place an alias that no ref below its map took
fn unclaimed_alias(alias: &str, path: &RefPath, collected: &mut Collected) {
    match path.last() {
        Some(SELECT_CLAUSE_ELEMENT) => {
            let alias_path = path.child(ALIAS_EXPRESSION).child(IDENTIFIER);
            collected.columns.push(ColumnRef {
                dependency_type: dependency_type(&alias_path),
                path: alias_path,
                name: alias.to_string(),
                alias: None,
                table_name: None,
                qualifiers: Default::default(),
                is_wildcard_ref: false,
            });
        }
        Some(FROM_EXPRESSION_ELEMENT) => {
            let data = |refs: &[ColumnRef]| -> Vec<ColumnRef> {
                refs.iter()
                    .filter(|c| c.dependency_type == DependencyType::Data)
                    .cloned()
                    .collect()
            };

            let derived = DerivedTable {
                alias: alias.to_string(),
                columns: data(&collected.columns),
                wildcards: data(&collected.wildcards),
            };
            collected.derived.push(derived);
        }
        _ => tracing::trace!(alias, path = %path, "alias without a reference to attach to"),
    }
}

fn first_identifier(node: &ParsedTree) -> Option<&str> {
    match node {
        ParsedTree::Leaf(_) => None,
        ParsedTree::List(items) => items.iter().find_map(first_identifier),
        ParsedTree::Map(entries) => entries.iter().find_map(|(key, value)| match value {
            ParsedTree::Leaf(text) if key == IDENTIFIER => Some(text.as_str()),
            _ => first_identifier(value),
        }),
    }
}

fn classify_identifier(value: &str, path: &RefPath, alias: Option<&str>) -> Collected {
    if path.contains(ALIAS_EXPRESSION) {
        // Lifted by the map that owns the alias expression
        return Collected::default();
    }

    if path.contains(COLUMN_REFERENCE) || path.ends_with(&[COLUMN_DEFINITION, IDENTIFIER]) {
        return Collected {
            columns: vec![column_ref(qualifier::split_column(value), path, alias)],
            alias_used: alias.is_some(),
            ..Default::default()
        };
    }

    if path.contains(TABLE_REFERENCE) || path.contains(WITH_COMPOUND_STATEMENT) {
        return Collected {
            tables: vec![table_ref(qualifier::split_table(value), path, alias)],
            alias_used: alias.is_some(),
            ..Default::default()
        };
    }

    Collected::default()
}

fn visit_wildcard(node: &ParsedTree, path: &RefPath) -> Result<Collected, ResolveError> {
    let shape_error = |message: String| ResolveError::ParseShape {
        path: path.to_string(),
        message,
    };

    if !matches!(node, ParsedTree::Map(_)) {
        return Err(shape_error(format!("wildcard identifier is a {}", node.shape())));
    }

    let mut keys = node.keys();
    keys.sort_unstable();

    let table = match keys.as_slice() {
        [DOT, IDENTIFIER, STAR] => {
            let name = node
                .get(IDENTIFIER)
                .and_then(ParsedTree::as_leaf)
                .ok_or_else(|| shape_error("wildcard table name is not a leaf".to_string()))?;

            let table = qualifier::split_table(name);
            if table.name.is_empty() {
                return Err(shape_error(format!("wildcard table name '{}' is empty", name)));
            }
            Some(table)
        }
        [STAR] => None,
        other => return Err(shape_error(format!("unexpected wildcard elements {:?}", other))),
    };

    let (table_name, qualifiers) = match table {
        Some(QualifiedTable { name, qualifiers }) => (Some(name), qualifiers),
        None => (None, Default::default()),
    };

    Ok(Collected {
        wildcards: vec![ColumnRef {
            path: path.clone(),
            name: "*".to_string(),
            alias: None,
            table_name,
            qualifiers,
            dependency_type: dependency_type(path),
            is_wildcard_ref: true,
        }],
        ..Default::default()
    })
}

fn column_ref(column: QualifiedColumn, path: &RefPath, alias: Option<&str>) -> ColumnRef {
    ColumnRef {
        path: path.clone(),
        name: column.name,
        alias: alias.map(str::to_string),
        table_name: column.table_name,
        qualifiers: column.qualifiers,
        dependency_type: dependency_type(path),
        is_wildcard_ref: false,
    }
}

fn table_ref(table: QualifiedTable, path: &RefPath, alias: Option<&str>) -> TableRef {
    TableRef {
        path: path.clone(),
        name: table.name,
        alias: alias.map(str::to_string),
        qualifiers: table.qualifiers,
        is_self_ref: SELF_SUFFIXES.iter().any(|suffix| path.ends_with(suffix)),
    }
}

/// Dependency type of a column found at `path`
pub fn dependency_type(path: &RefPath) -> DependencyType {
    if path.ends_with(&[COLUMN_DEFINITION, IDENTIFIER]) {
        DependencyType::Definition
    } else if DATA_WINDOWS.iter().any(|window| path.contains_window(window)) {
        DependencyType::Data
    } else {
        DependencyType::Query
    }
}

/// Reference resolution errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResolveError {
    #[error("Unexpected tree shape at '{path}': {message}")]
    ParseShape { path: String, message: String },

    #[error("Statement has more than one self table: '{first}' and '{second}'")]
    AmbiguousSelfReference { first: String, second: String },

    #[error("Column '{column}' at '{path}' has no table to bind to")]
    MissingTableReference { column: String, path: String },

    #[error("Column '{column}' at '{path}' binds equally well to {candidates:?}")]
    AmbiguousTableReference {
        column: String,
        path: String,
        candidates: Vec<String>,
    },

    #[error(transparent)]
    Tree(#[from] TreeError),
}

impl ResolveError {
    /// Stable failure code for this error
    pub fn code(&self) -> FailureCode {
        match self {
            Self::ParseShape { .. } => FailureCode::ParseShape,
            Self::AmbiguousSelfReference { .. } => FailureCode::AmbiguousSelfReference,
            Self::MissingTableReference { .. } => FailureCode::MissingTableReference,
            Self::AmbiguousTableReference { .. } => FailureCode::AmbiguousTableReference,
            Self::Tree(e) => e.code(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tree(json: &str) -> ParsedTree {
        serde_json::from_str(json).unwrap()
    }

    fn path(segments: &[&str]) -> RefPath {
        segments.iter().copied().collect()
    }

    #[test]
    fn dependency_types_from_path() {
        assert_eq!(
            dependency_type(&path(&["bracketed", "column_definition", "identifier"])),
            DependencyType::Definition
        );
        assert_eq!(
            dependency_type(&path(&["select_clause_element", "column_reference", "identifier"])),
            DependencyType::Data
        );
        assert_eq!(
            dependency_type(&path(&[
                "select_clause_element", "function", "bracketed", "expression",
                "column_reference", "identifier",
            ])),
            DependencyType::Data
        );
        assert_eq!(
            dependency_type(&path(&["where_clause", "expression", "column_reference", "identifier"])),
            DependencyType::Query
        );
    }

    #[test]
    fn select_alias_attaches_to_column() {
        let statement = tree(
            r#"{"select_statement": {
                "select_clause": {
                    "select_clause_element": {
                        "column_reference": {"identifier": "x"},
                        "alias_expression": {"keyword": "AS", "identifier": "y"}
                    }
                },
                "from_clause": {"from_expression": {"from_expression_element": {
                    "table_expression": {"table_reference": {"identifier": "b"}}
                }}}
            }}"#,
        );

        let refs = RefResolver::resolve(&statement).unwrap();
        assert_eq!(refs.columns.len(), 1);
        assert_eq!(refs.columns[0].name, "x");
        assert_eq!(refs.columns[0].alias.as_deref(), Some("y"));
        assert_eq!(refs.columns[0].output_name(), "y");
        assert_eq!(refs.tables[0].alias, None);
    }

    #[test]
    fn alias_does_not_leak_to_next_element() {
        let statement = tree(
            r#"{"select_statement": {
                "select_clause": [
                    {"select_clause_element": {
                        "function": {"function_name": "COUNT", "bracketed": {"star": "*"}},
                        "alias_expression": {"identifier": "n"}
                    }},
                    {"select_clause_element": {"column_reference": {"identifier": "z"}}}
                ],
                "from_clause": {"from_expression": {"from_expression_element": {
                    "table_expression": {"table_reference": {"identifier": "b"}}
                }}}
            }}"#,
        );

        let refs = RefResolver::resolve(&statement).unwrap();
        assert_eq!(refs.columns.len(), 2);

        // COUNT(*) has no column to carry the alias
        assert_eq!(refs.columns[0].name, "n");
        assert_eq!(refs.columns[0].table_name, None);
        assert_eq!(refs.columns[0].dependency_type, DependencyType::Data);

        assert_eq!(refs.columns[1].name, "z");
        assert_eq!(refs.columns[1].alias, None);
        assert_eq!(refs.columns[1].bound_table(), "b");
    }

    #[test]
    fn subquery_does_not_take_outer_alias() {
        let statement = tree(
            r#"{"select_statement": {
                "select_clause": {"select_clause_element": {
                    "bracketed": {"select_statement": {
                        "select_clause": {"select_clause_element": {"column_reference": {"identifier": "x"}}},
                        "from_clause": {"from_expression": {"from_expression_element": {
                            "table_expression": {"table_reference": {"identifier": "c"}}
                        }}}
                    }},
                    "alias_expression": {"keyword": "AS", "identifier": "latest"}
                }},
                "from_clause": {"from_expression": {"from_expression_element": {
                    "table_expression": {"table_reference": {"identifier": "b"}}
                }}}
            }}"#,
        );

        let refs = RefResolver::resolve(&statement).unwrap();
        let pairs: Vec<(&str, Option<&str>)> = refs
            .columns
            .iter()
            .map(|c| (c.name.as_str(), c.alias.as_deref()))
            .collect();

        assert_eq!(pairs, vec![("x", None), ("latest", None)]);
        assert_eq!(refs.columns[0].bound_table(), "c");
        assert_eq!(refs.columns[1].table_name, None);
    }

    #[test]
    fn keyword_as_marks_table_alias() {
        let statement = tree(
            r#"{"select_statement": {
                "select_clause": {"select_clause_element": {"column_reference": [
                    {"identifier": "o"}, {"dot": "."}, {"identifier": "id"}
                ]}},
                "from_clause": {"from_expression": {"from_expression_element": {
                    "table_expression": {"table_reference": {"identifier": "analytics.orders"}},
                    "keyword": "as",
                    "identifier": "o"
                }}}
            }}"#,
        );

        let refs = RefResolver::resolve(&statement).unwrap();
        let table = &refs.tables[0];
        assert_eq!(table.name, "orders");
        assert_eq!(table.alias.as_deref(), Some("o"));
        assert_eq!(table.qualifiers.schema_name.as_deref(), Some("analytics"));

        // Bound through the alias to the real table
        let column = &refs.columns[0];
        assert_eq!(column.name, "id");
        assert_eq!(column.table_name.as_deref(), Some("orders"));
        assert_eq!(column.qualifiers.schema_name.as_deref(), Some("analytics"));
        assert_eq!(column.path.last(), Some("identifier"));
        assert_eq!(column.dependency_type, DependencyType::Data);
    }

    #[test]
    fn insert_target_is_self() {
        let statement = tree(
            r#"{"insert_statement": {
                "keyword": "INSERT",
                "table_reference": {"identifier": "a"},
                "select_statement": {
                    "select_clause": {"select_clause_element": {"column_reference": {"identifier": "x"}}},
                    "from_clause": {"from_expression": {"from_expression_element": {
                        "table_expression": {"table_reference": {"identifier": "b"}}
                    }}}
                }
            }}"#,
        );

        let refs = RefResolver::resolve(&statement).unwrap();
        assert_eq!(refs.self_table().map(|t| t.name.as_str()), Some("a"));
        assert_eq!(refs.parent_tables().count(), 1);
        assert_eq!(refs.columns[0].bound_table(), "b");
    }

    #[test]
    fn cte_name_is_self() {
        let statement = tree(
            r#"{"with_compound_statement": {
                "keyword": "WITH",
                "common_table_expression": {
                    "identifier": "recent",
                    "keyword": "AS",
                    "bracketed": {"select_statement": {
                        "select_clause": {"select_clause_element": {"column_reference": {"identifier": "x"}}},
                        "from_clause": {"from_expression": {"from_expression_element": {
                            "table_expression": {"table_reference": {"identifier": "b"}}
                        }}}
                    }}
                },
                "select_statement": {
                    "select_clause": {"select_clause_element": {"column_reference": {"identifier": "x"}}},
                    "from_clause": {"from_expression": {"from_expression_element": {
                        "table_expression": {"table_reference": {"identifier": "recent"}}
                    }}}
                }
            }}"#,
        );

        let refs = RefResolver::resolve(&statement).unwrap();
        assert_eq!(refs.self_table().map(|t| t.name.as_str()), Some("recent"));

        let bound: Vec<&str> = refs.columns.iter().map(|c| c.bound_table()).collect();
        assert_eq!(bound, vec!["b", "recent"]);
    }

    #[test]
    fn column_definitions_bind_to_self() {
        let statement = tree(
            r#"{"create_table_statement": {
                "table_reference": {"identifier": "a"},
                "bracketed": [
                    {"column_definition": {"identifier": "id", "data_type": "INT"}},
                    {"column_definition": {"identifier": "name", "data_type": "TEXT"}}
                ]
            }}"#,
        );

        let refs = RefResolver::resolve(&statement).unwrap();
        assert_eq!(refs.columns.len(), 2);
        assert!(refs.columns.iter().all(|c| c.dependency_type == DependencyType::Definition));
        assert!(refs.columns.iter().all(|c| c.bound_table() == "a"));
    }

    #[test]
    fn wildcard_shapes() {
        let qualified = tree(
            r#"{"select_statement": {
                "select_clause": {"select_clause_element": {"wildcard_expression": {
                    "wildcard_identifier": {"identifier": "b", "dot": ".", "star": "*"}
                }}},
                "from_clause": {"from_expression": {"from_expression_element": {
                    "table_expression": {"table_reference": {"identifier": "b"}}
                }}}
            }}"#,
        );
        let refs = RefResolver::resolve(&qualified).unwrap();
        assert_eq!(refs.wildcards.len(), 1);
        assert!(refs.wildcards[0].is_wildcard_ref);
        assert_eq!(refs.wildcards[0].bound_table(), "b");
        assert_eq!(refs.wildcards[0].dependency_type, DependencyType::Data);

        let bare = tree(
            r#"{"select_statement": {
                "select_clause": {"select_clause_element": {"wildcard_expression": {
                    "wildcard_identifier": {"star": "*"}
                }}},
                "from_clause": {"from_expression": {"from_expression_element": {
                    "table_expression": {"table_reference": {"identifier": "c"}}
                }}}
            }}"#,
        );
        let refs = RefResolver::resolve(&bare).unwrap();
        assert_eq!(refs.wildcards[0].bound_table(), "c");
    }

    #[test]
    fn malformed_wildcard_is_parse_shape() {
        let statement = tree(
            r#"{"select_statement": {"select_clause": {"select_clause_element": {
                "wildcard_expression": {"wildcard_identifier": {"identifier": "b", "star": "*"}}
            }}}}"#,
        );

        let err = RefResolver::resolve(&statement).unwrap_err();
        assert_eq!(err.code(), FailureCode::ParseShape);
    }

    #[test]
    fn empty_wildcard_qualifier_is_parse_shape() {
        let statement = tree(
            r#"{"select_statement": {
                "select_clause": {"select_clause_element": {"wildcard_expression": {
                    "wildcard_identifier": {"identifier": "", "dot": ".", "star": "*"}
                }}},
                "from_clause": {"from_expression": {"from_expression_element": {
                    "table_expression": {"table_reference": {"identifier": "b"}}
                }}}
            }}"#,
        );

        let err = RefResolver::resolve(&statement).unwrap_err();
        assert_eq!(err.code(), FailureCode::ParseShape);
    }

    #[test]
    fn broken_chain_is_parse_shape() {
        let statement = tree(
            r#"{"select_statement": {"select_clause": {"select_clause_element": {
                "column_reference": [{"identifier": "o"}, {"bracketed": "("}]
            }}}}"#,
        );

        let err = RefResolver::resolve(&statement).unwrap_err();
        assert!(matches!(err, ResolveError::ParseShape { .. }));
    }
}
