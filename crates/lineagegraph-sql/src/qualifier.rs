//! Dotted name handling
//!
//! `warehouse.database.schema.table.column` style names arrive either as a
//! single identifier leaf or as a chain of `identifier`/`dot` tokens. Both are
//! split from the right so that missing leading qualifiers stay empty.

use lineagegraph_core::element::{DOT, IDENTIFIER};
use lineagegraph_core::{ParsedTree, Qualifiers};

/// A table name with its optional qualifiers
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QualifiedTable {
    pub name: String,
    pub qualifiers: Qualifiers,
}

/// A column name with its optional owning table and qualifiers
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QualifiedColumn {
    pub name: String,
    pub table_name: Option<String>,
    pub qualifiers: Qualifiers,
}

fn segments(value: &str) -> Vec<Option<String>> {
    value
        .rsplit('.')
        .map(|s| if s.is_empty() { None } else { Some(s.to_string()) })
        .collect()
}

fn take(parts: &mut std::vec::IntoIter<Option<String>>) -> Option<String> {
    parts.next().flatten()
}

/// Split `[warehouse.][database.][schema.]table`
pub fn split_table(value: &str) -> QualifiedTable {
    let mut parts = segments(value).into_iter();

    let name = take(&mut parts).unwrap_or_default();
    let schema_name = take(&mut parts);
    let database_name = take(&mut parts);
    let warehouse_name = take(&mut parts);

    QualifiedTable {
        name,
        qualifiers: Qualifiers {
            schema_name,
            database_name,
            warehouse_name,
        },
    }
}

/// Split `[warehouse.][database.][schema.][table.]column`
pub fn split_column(value: &str) -> QualifiedColumn {
    let mut parts = segments(value).into_iter();

    let name = take(&mut parts).unwrap_or_default();
    let table_name = take(&mut parts);
    let schema_name = take(&mut parts);
    let database_name = take(&mut parts);
    let warehouse_name = take(&mut parts);

    QualifiedColumn {
        name,
        table_name,
        qualifiers: Qualifiers {
            schema_name,
            database_name,
            warehouse_name,
        },
    }
}

/// Join a token chain into its dotted text
///
/// Returns `None` if any element is not a chain token (a leaf, or a map
/// holding only an `identifier` or `dot` leaf).
pub fn join_chain(items: &[ParsedTree]) -> Option<String> {
    let mut joined = String::new();

    for item in items {
        let token = match item {
            ParsedTree::Leaf(value) => value.as_str(),
            ParsedTree::Map(entries) if entries.len() == 1 => {
                let (key, value) = &entries[0];
                if key != IDENTIFIER && key != DOT {
                    return None;
                }
                value.as_leaf()?
            }
            _ => return None,
        };
        joined.push_str(token);
    }

    Some(joined)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_split_from_right() {
        let table = split_table("wh.db.schema.orders");
        assert_eq!(table.name, "orders");
        assert_eq!(table.qualifiers.schema_name.as_deref(), Some("schema"));
        assert_eq!(table.qualifiers.database_name.as_deref(), Some("db"));
        assert_eq!(table.qualifiers.warehouse_name.as_deref(), Some("wh"));

        let bare = split_table("orders");
        assert_eq!(bare.qualifiers, Qualifiers::default());
    }

    #[test]
    fn column_split_truncates_excess() {
        let column = split_column("x.wh.db.schema.orders.id");
        assert_eq!(column.name, "id");
        assert_eq!(column.table_name.as_deref(), Some("orders"));
        assert_eq!(column.qualifiers.warehouse_name.as_deref(), Some("wh"));
    }

    #[test]
    fn chain_joins_tokens_in_order() {
        let items = vec![
            ParsedTree::map([("identifier", ParsedTree::leaf("o"))]),
            ParsedTree::map([("dot", ParsedTree::leaf("."))]),
            ParsedTree::map([("identifier", ParsedTree::leaf("id"))]),
        ];
        assert_eq!(join_chain(&items).as_deref(), Some("o.id"));

        let column = split_column(&join_chain(&items).unwrap());
        assert_eq!(column.name, "id");
        assert_eq!(column.table_name.as_deref(), Some("o"));
    }

    #[test]
    fn chain_rejects_other_nodes() {
        let items = vec![
            ParsedTree::map([("identifier", ParsedTree::leaf("o"))]),
            ParsedTree::map([("bracketed", ParsedTree::leaf("("))]),
        ];
        assert_eq!(join_chain(&items), None);
    }
}
