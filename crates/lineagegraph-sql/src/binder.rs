//! Table binding for column references
//!
//! Runs after the tree walk. Columns written with a qualifier keep it (or are
//! rebound when the qualifier is a table alias or names a FROM subquery).
//! Unqualified columns bind to the parent table whose path shares the longest
//! prefix with theirs. Computed outputs (an alias over no column) stay unbound.

use crate::resolver::ResolveError;
use lineagegraph_core::element::ALIAS_EXPRESSION;
use lineagegraph_core::{ColumnRef, DependencyType, Qualifiers, TableRef};

/// A FROM subquery named by an alias
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DerivedTable {
    pub alias: String,

    /// Unbound data refs of the subquery, in document order
    pub columns: Vec<ColumnRef>,

    pub wildcards: Vec<ColumnRef>,
}

/// Binds column and wildcard refs to the tables of one statement
pub struct TableBinder<'a> {
    tables: &'a [TableRef],

    /// Innermost subqueries first
    derived: &'a [DerivedTable],
}

impl<'a> TableBinder<'a> {
    pub fn new(tables: &'a [TableRef]) -> Self {
        Self { tables, derived: &[] }
    }

    pub fn with_derived(mut self, derived: &'a [DerivedTable]) -> Self {
        self.derived = derived;
        self
    }

    /// Bind every ref, failing on the first one that cannot be bound
    pub fn bind_all(&self, columns: Vec<ColumnRef>) -> Result<Vec<ColumnRef>, ResolveError> {
        columns.into_iter().map(|column| self.bind(column)).collect()
    }

    /// Bind one ref to its owning table
    pub fn bind(&self, column: ColumnRef) -> Result<ColumnRef, ResolveError> {
        if column.path.contains(ALIAS_EXPRESSION) {
            return Ok(column);
        }

        if let Some(qualifier) = column.table_name.as_deref() {
            if let Some(table) = self.aliased(qualifier) {
                return Ok(assign(column, table));
            }
            if let Some(index) = self.derived_index(qualifier) {
                return self.through_derived(column, index);
            }
            return Ok(column);
        }

        if column.dependency_type == DependencyType::Definition {
            if let Some(table) = self.tables.iter().find(|t| t.is_self_ref) {
                return Ok(assign(column, table));
            }
        }

        let table = self.closest(&column)?;
        Ok(assign(column, table))
    }

    fn parents(&self) -> impl Iterator<Item = &'a TableRef> {
        self.tables.iter().filter(|t| !t.is_self_ref)
    }

    fn aliased(&self, qualifier: &str) -> Option<&'a TableRef> {
        self.parents().find(|t| {
            t.alias
                .as_deref()
                .is_some_and(|alias| alias.eq_ignore_ascii_case(qualifier))
        })
    }

    fn derived_index(&self, qualifier: &str) -> Option<usize> {
        self.derived
            .iter()
            .rposition(|d| d.alias.eq_ignore_ascii_case(qualifier))
    }

    /// Bind a ref qualified by a subquery alias to the subquery's source
    ///
    /// A column takes the source of the subquery output with its name. A
    /// wildcard, or a column the subquery only produces through `*`, takes
    /// the subquery's single wildcard table.
    fn through_derived(&self, column: ColumnRef, index: usize) -> Result<ColumnRef, ResolveError> {
        let derived = &self.derived[index];
        let inner = TableBinder {
            tables: self.tables,
            derived: &self.derived[..index],
        };

        let output = (!column.is_wildcard_ref)
            .then(|| {
                derived
                    .columns
                    .iter()
                    .find(|c| c.output_name().eq_ignore_ascii_case(&column.name))
            })
            .flatten();

        if let Some(output) = output {
            let source = inner.bind(output.clone())?;
            let alias = column.alias.clone().or_else(|| {
                (!source.name.eq_ignore_ascii_case(&column.name)).then(|| column.name.clone())
            });

            return Ok(ColumnRef {
                name: source.name,
                alias,
                table_name: source.table_name,
                qualifiers: source.qualifiers,
                ..column
            });
        }

        let mut sources: Vec<(String, Qualifiers)> = Vec::new();
        for wildcard in inner.bind_all(derived.wildcards.clone())? {
            let Some(table_name) = wildcard.table_name else {
                continue;
            };
            if !sources
                .iter()
                .any(|(name, q)| name.eq_ignore_ascii_case(&table_name) && *q == wildcard.qualifiers)
            {
                sources.push((table_name, wildcard.qualifiers));
            }
        }

        match sources.len() {
            1 => {
                let (table_name, qualifiers) = sources.remove(0);
                Ok(ColumnRef {
                    table_name: Some(table_name),
                    qualifiers,
                    ..column
                })
            }
            0 => Err(ResolveError::MissingTableReference {
                column: format!("{}.{}", derived.alias, column.name),
                path: column.path.to_string(),
            }),
            _ => Err(ResolveError::AmbiguousTableReference {
                column: format!("{}.{}", derived.alias, column.name),
                path: column.path.to_string(),
                candidates: sources.into_iter().map(|(name, _)| name).collect(),
            }),
        }
    }

    /// Parent table with the unique longest common path prefix
    fn closest(&self, column: &ColumnRef) -> Result<&'a TableRef, ResolveError> {
        let scored: Vec<(usize, &'a TableRef)> = self
            .parents()
            .map(|table| (column.path.common_prefix_len(&table.path), table))
            .collect();

        let best = scored
            .iter()
            .map(|(score, _)| *score)
            .max()
            .ok_or_else(|| ResolveError::MissingTableReference {
                column: column.name.clone(),
                path: column.path.to_string(),
            })?;

        // The same table named twice (self join, repeated FROM) is one candidate
        let mut winners: Vec<&'a TableRef> = Vec::new();
        for (_, table) in scored.into_iter().filter(|(score, _)| *score == best) {
            if !winners.iter().any(|w| same_table(w, table)) {
                winners.push(table);
            }
        }

        match winners.as_slice() {
            [table] => Ok(*table),
            _ => Err(ResolveError::AmbiguousTableReference {
                column: column.name.clone(),
                path: column.path.to_string(),
                candidates: winners.iter().map(|t| t.name.clone()).collect(),
            }),
        }
    }
}

fn same_table(a: &TableRef, b: &TableRef) -> bool {
    a.name.eq_ignore_ascii_case(&b.name) && a.qualifiers == b.qualifiers
}

fn assign(column: ColumnRef, table: &TableRef) -> ColumnRef {
    ColumnRef {
        table_name: Some(table.name.clone()),
        qualifiers: table.qualifiers.clone(),
        ..column
    }
}
