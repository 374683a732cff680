//! Graph entities from resolved references
//!
//! Building happens in two phases. [`GraphBuilder::materialize`] turns one
//! source object and its logic into materializations and columns. Once those
//! are persisted, [`GraphBuilder::add_logic`] resolves every data and query
//! reference against a [`ColumnCatalog`] of the run's columns and collects
//! dependency edges. Edges from all logics accumulate in one set, so an edge
//! is never emitted twice.

use crate::source::SourceObject;
use lineagegraph_core::element::COMMON_TABLE_EXPRESSION;
use lineagegraph_core::{
    new_id, Column, ColumnRef, Dependency, DependencyKey, DependencyType, Diagnostic, FailureCode,
    Logic, Materialization, OnUnresolved, Qualifiers, RefPath, Severity, StatementRefs, TableRef,
};
use std::collections::HashSet;

/// Where one source object sits in the run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildContext {
    pub self_relation_name: String,

    /// Unqualified name of the object
    pub name: String,

    pub schema_name: String,

    pub database_name: String,

    pub parent_relation_names: Vec<String>,

    pub lineage_id: String,

    pub organization_id: String,
}

impl BuildContext {
    pub fn for_source(source: &SourceObject, lineage_id: &str, organization_id: &str) -> Self {
        Self {
            self_relation_name: source.relation_name.clone(),
            name: source.name.clone(),
            schema_name: source.schema_name.clone(),
            database_name: source.database_name.clone(),
            parent_relation_names: source.parent_relation_names.clone(),
            lineage_id: lineage_id.to_string(),
            organization_id: organization_id.to_string(),
        }
    }

    /// Self table of `statement` that is not the object itself
    fn derived_table<'s>(&self, statement: &'s StatementRefs) -> Option<&'s TableRef> {
        statement
            .self_table()
            .filter(|table| !table.name.eq_ignore_ascii_case(&self.name))
    }

    fn derived_relation(&self, table: &TableRef) -> String {
        format!(
            "{}.{}.{}",
            table.qualifiers.database_name.as_deref().unwrap_or(&self.database_name),
            table.qualifiers.schema_name.as_deref().unwrap_or(&self.schema_name),
            table.name
        )
    }

    /// Relation whose columns a reference at `path` produces
    ///
    /// A common table expression owns only the refs inside its own body.
    fn owner_of(&self, statement: &StatementRefs, path: &RefPath) -> String {
        match self.derived_table(statement) {
            Some(table) if !is_cte(table) || within_cte(table, path) => self.derived_relation(table),
            _ => self.self_relation_name.clone(),
        }
    }
}

fn is_cte(table: &TableRef) -> bool {
    table.path.contains(COMMON_TABLE_EXPRESSION)
}

fn within_cte(table: &TableRef, path: &RefPath) -> bool {
    let scope = table.path.len().saturating_sub(1);
    path.common_prefix_len(&table.path) >= scope
}

/// Materializations and columns of one or more source objects
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuiltEntities {
    pub materializations: Vec<Materialization>,
    pub columns: Vec<Column>,
}

impl BuiltEntities {
    /// Add `other`, folding materializations whose relation name is already present
    ///
    /// Folded columns keep their position order and are appended after the
    /// existing columns unless a column of the same name exists.
    pub fn absorb(&mut self, other: BuiltEntities) {
        let BuiltEntities {
            materializations,
            columns,
        } = other;

        for materialization in materializations {
            let incoming = columns
                .iter()
                .filter(|c| c.materialization_id == materialization.id)
                .cloned();

            let existing = self
                .materializations
                .iter()
                .find(|m| m.relation_name.eq_ignore_ascii_case(&materialization.relation_name))
                .map(|m| (m.id.clone(), m.relation_name.clone()));

            let Some((id, relation_name)) = existing else {
                self.columns.extend(incoming);
                self.materializations.push(materialization);
                continue;
            };

            tracing::debug!(relation = %relation_name, "folding materialization built twice");

            for mut column in incoming {
                let present = self.columns.iter().filter(|c| c.materialization_id == id);
                if present.clone().any(|c| c.name.eq_ignore_ascii_case(&column.name)) {
                    continue;
                }

                column.index = present.count() + 1;
                column.materialization_id = id.clone();
                column.relation_name = relation_name.clone();
                self.columns.push(column);
            }
        }
    }

    pub fn database_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .materializations
            .iter()
            .map(|m| m.database_name.clone())
            .filter(|name| !name.is_empty())
            .collect();
        names.sort();
        names.dedup();
        names
    }
}

/// Persisted materializations and columns that dependency endpoints resolve against
#[derive(Debug, Clone, Default)]
pub struct ColumnCatalog {
    materializations: Vec<Materialization>,
    columns: Vec<Column>,
}

impl ColumnCatalog {
    pub fn new(materializations: Vec<Materialization>, columns: Vec<Column>) -> Self {
        Self {
            materializations,
            columns,
        }
    }

    pub fn extend(&mut self, entities: &BuiltEntities) {
        self.materializations.extend_from_slice(&entities.materializations);
        self.columns.extend_from_slice(&entities.columns);
    }

    /// First materialization with this relation name, ignoring case
    pub fn materialization(&self, relation_name: &str) -> Option<&Materialization> {
        self.materializations
            .iter()
            .find(|m| m.relation_name.eq_ignore_ascii_case(relation_name))
    }

    /// Materializations with this unqualified name, ignoring case
    pub fn materializations_named(&self, name: &str) -> Vec<&Materialization> {
        self.materializations
            .iter()
            .filter(|m| m.name.eq_ignore_ascii_case(name))
            .collect()
    }

    /// Columns of a materialization in position order
    pub fn columns_of(&self, materialization_id: &str) -> Vec<&Column> {
        let mut columns: Vec<&Column> = self
            .columns
            .iter()
            .filter(|c| c.materialization_id == materialization_id)
            .collect();
        columns.sort_by_key(|c| c.index);
        columns
    }

    pub fn columns_named(&self, materialization_id: &str, name: &str) -> Vec<&Column> {
        self.columns
            .iter()
            .filter(|c| c.materialization_id == materialization_id && c.name.eq_ignore_ascii_case(name))
            .collect()
    }
}

/// Dependency edges of one lineage, unique by identity
#[derive(Debug, Default)]
pub struct DependencySet {
    keys: HashSet<DependencyKey>,
    dependencies: Vec<Dependency>,
}

impl DependencySet {
    /// Add an edge; false if an edge with the same identity is present
    pub fn insert(&mut self, dependency: Dependency) -> bool {
        if !self.keys.insert(dependency.key()) {
            return false;
        }

        self.dependencies.push(dependency);
        true
    }

    pub fn len(&self) -> usize {
        self.dependencies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dependencies.is_empty()
    }

    pub fn into_vec(self) -> Vec<Dependency> {
        self.dependencies
    }
}

/// Dependency endpoint resolution errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BuildError {
    #[error("No column '{column}' found while building '{relation_name}'")]
    ReferenceNotFound { relation_name: String, column: String },

    #[error("Column '{column}' is ambiguous while building '{relation_name}': {candidates:?}")]
    AmbiguousReference {
        relation_name: String,
        column: String,
        candidates: Vec<String>,
    },
}

impl BuildError {
    pub fn code(&self) -> FailureCode {
        match self {
            Self::ReferenceNotFound { .. } => FailureCode::ReferenceNotFound,
            Self::AmbiguousReference { .. } => FailureCode::AmbiguousReference,
        }
    }
}

/// Edges and diagnostics collected by a [`GraphBuilder`]
#[derive(Debug, Default)]
pub struct BuiltDependencies {
    pub dependencies: Vec<Dependency>,
    pub diagnostics: Vec<Diagnostic>,
}

impl BuiltDependencies {
    /// Number of references skipped because they could not be resolved
    pub fn skipped(&self) -> usize {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == Severity::Warn)
            .count()
    }
}

/// Builds lineage graph entities from resolved logic
pub struct GraphBuilder<'a> {
    catalog: &'a ColumnCatalog,
    policy: OnUnresolved,
    dependencies: DependencySet,
    diagnostics: Vec<Diagnostic>,
}

impl<'a> GraphBuilder<'a> {
    pub fn new(catalog: &'a ColumnCatalog, policy: OnUnresolved) -> Self {
        Self {
            catalog,
            policy,
            dependencies: DependencySet::default(),
            diagnostics: Vec::new(),
        }
    }

    pub fn catalog(&self) -> &'a ColumnCatalog {
        self.catalog
    }

    /// Materializations and columns of one source object
    ///
    /// The object's own materialization comes first. Its columns are the
    /// declared columns, then definition refs, then the output names of data
    /// refs, without case-insensitive repeats.
    pub fn materialize(source: &SourceObject, logic: Option<&Logic>, context: &BuildContext) -> BuiltEntities {
        let mut drafts = vec![Draft {
            relation_name: context.self_relation_name.clone(),
            name: source.name.clone(),
            schema_name: source.schema_name.clone(),
            database_name: source.database_name.clone(),
            columns: Vec::new(),
        }];

        for column in &source.columns {
            drafts[0].push(column);
        }

        if let Some(logic) = logic {
            for statement in &logic.statement_refs {
                if let Some(table) = context.derived_table(statement) {
                    let relation_name = context.derived_relation(table);
                    if draft_index(&drafts, &relation_name).is_none() {
                        drafts.push(Draft {
                            relation_name,
                            name: table.name.clone(),
                            schema_name: table
                                .qualifiers
                                .schema_name
                                .clone()
                                .unwrap_or_else(|| context.schema_name.clone()),
                            database_name: table
                                .qualifiers
                                .database_name
                                .clone()
                                .unwrap_or_else(|| context.database_name.clone()),
                            columns: Vec::new(),
                        });
                    }
                }
            }

            for dependency_type in [DependencyType::Definition, DependencyType::Data] {
                for statement in &logic.statement_refs {
                    for column in statement.columns_of(dependency_type) {
                        let owner = context.owner_of(statement, &column.path);
                        if let Some(index) = draft_index(&drafts, &owner) {
                            drafts[index].push(column.output_name());
                        }
                    }
                }
            }
        }

        let mut entities = BuiltEntities::default();
        for draft in drafts {
            let materialization = Materialization {
                id: new_id(),
                relation_name: draft.relation_name,
                name: draft.name,
                kind: source.kind,
                schema_name: draft.schema_name,
                database_name: draft.database_name,
                logic_id: logic.map(|l| l.id.clone()),
                lineage_id: context.lineage_id.clone(),
                organization_id: context.organization_id.clone(),
            };

            for (position, name) in draft.columns.into_iter().enumerate() {
                entities.columns.push(Column {
                    id: new_id(),
                    name,
                    index: position + 1,
                    relation_name: materialization.relation_name.clone(),
                    materialization_id: materialization.id.clone(),
                    lineage_id: context.lineage_id.clone(),
                    organization_id: context.organization_id.clone(),
                });
            }

            entities.materializations.push(materialization);
        }

        entities
    }

    /// Resolve the data and query references of `logic` into edges
    pub fn add_logic(&mut self, logic: &Logic, context: &BuildContext) -> Result<(), BuildError> {
        for statement in &logic.statement_refs {
            for column in &statement.columns {
                match column.dependency_type {
                    DependencyType::Data | DependencyType::Query => {
                        self.add_column_ref(statement, column, context)?
                    }
                    DependencyType::Definition | DependencyType::External => {}
                }
            }

            for wildcard in statement
                .wildcards
                .iter()
                .filter(|w| w.dependency_type == DependencyType::Data)
            {
                self.add_wildcard(statement, wildcard, context)?;
            }
        }

        Ok(())
    }

    /// Add an edge; duplicates are skipped and noted
    pub fn add_dependency(&mut self, dependency: Dependency, relation_name: &str) -> bool {
        let description = format!(
            "{} -> {} ({})",
            dependency.head_column_id, dependency.tail_column_id, dependency.dependency_type
        );

        if self.dependencies.insert(dependency) {
            return true;
        }

        tracing::debug!(relation = relation_name, edge = %description, "skipping duplicate dependency");
        self.diagnostics.push(
            Diagnostic::new(
                FailureCode::DuplicateDependency,
                Severity::Info,
                format!("Dependency {description} already present"),
            )
            .with_relation(relation_name),
        );
        false
    }

    pub fn finish(self) -> BuiltDependencies {
        BuiltDependencies {
            dependencies: self.dependencies.into_vec(),
            diagnostics: self.diagnostics,
        }
    }

    /// Apply the failure policy to an unresolved endpoint
    pub(crate) fn unresolved(
        &mut self,
        error: BuildError,
        relation_name: &str,
        path: Option<&RefPath>,
    ) -> Result<(), BuildError> {
        match self.policy {
            OnUnresolved::Abort => Err(error),
            OnUnresolved::Skip => {
                tracing::warn!(relation = relation_name, error = %error, "skipping unresolved dependency");

                let mut diagnostic = Diagnostic::new(error.code(), Severity::Warn, error.to_string())
                    .with_relation(relation_name);
                if let Some(path) = path {
                    diagnostic = diagnostic.with_path(path.to_string());
                }
                self.diagnostics.push(diagnostic);
                Ok(())
            }
        }
    }

    fn add_column_ref(
        &mut self,
        statement: &StatementRefs,
        column: &ColumnRef,
        context: &BuildContext,
    ) -> Result<(), BuildError> {
        let owner = context.owner_of(statement, &column.path);

        let head = match self.head_column(&owner, column.output_name()) {
            Ok(head) => head,
            Err(_) if column.dependency_type == DependencyType::Query => {
                tracing::trace!(column = %column.name, relation = %owner, "query ref is not an output column");
                return Ok(());
            }
            Err(error) => return self.unresolved(error, &owner, Some(&column.path)),
        };

        if column.table_name.is_none() {
            tracing::trace!(column = %head.name, relation = %owner, "computed column has no source");
            return Ok(());
        }

        let tail = match self
            .tail_materialization(column, &owner, context)
            .and_then(|m| self.single_column(m, &column.name, &owner))
        {
            Ok(tail) => tail,
            Err(error) => return self.unresolved(error, &owner, Some(&column.path)),
        };

        self.link(column.dependency_type, head, tail, context, &owner);
        Ok(())
    }

    /// One edge per column of the wildcard's table that is also an output column
    fn add_wildcard(
        &mut self,
        statement: &StatementRefs,
        wildcard: &ColumnRef,
        context: &BuildContext,
    ) -> Result<(), BuildError> {
        let catalog = self.catalog;
        let owner = context.owner_of(statement, &wildcard.path);

        let Some(head_materialization) = catalog.materialization(&owner) else {
            let error = BuildError::ReferenceNotFound {
                relation_name: owner.clone(),
                column: "*".to_string(),
            };
            return self.unresolved(error, &owner, Some(&wildcard.path));
        };

        let tail_materialization = match self.tail_materialization(wildcard, &owner, context) {
            Ok(m) => m,
            Err(error) => return self.unresolved(error, &owner, Some(&wildcard.path)),
        };

        for tail in catalog.columns_of(&tail_materialization.id) {
            match catalog.columns_named(&head_materialization.id, &tail.name).first() {
                Some(head) => self.link(DependencyType::Data, head, tail, context, &owner),
                None => {
                    tracing::trace!(column = %tail.name, relation = %owner, "wildcard column has no output column")
                }
            }
        }

        Ok(())
    }

    fn link(
        &mut self,
        dependency_type: DependencyType,
        head: &Column,
        tail: &Column,
        context: &BuildContext,
        relation_name: &str,
    ) {
        if head.id == tail.id {
            tracing::trace!(column = %head.name, relation = relation_name, "skipping self dependency");
            return;
        }

        let dependency = Dependency::new(
            dependency_type,
            &head.id,
            &tail.id,
            &context.lineage_id,
            &context.organization_id,
        );
        self.add_dependency(dependency, relation_name);
    }

    fn head_column(&self, relation_name: &str, name: &str) -> Result<&'a Column, BuildError> {
        let catalog = self.catalog;

        let materialization = catalog
            .materialization(relation_name)
            .ok_or_else(|| BuildError::ReferenceNotFound {
                relation_name: relation_name.to_string(),
                column: format!("{relation_name}.{name}"),
            })?;

        self.single_column(materialization, name, relation_name)
    }

    /// Materialization a bound column or wildcard reads from
    ///
    /// Several materializations with the table's name are narrowed to the
    /// object's parent relations.
    fn tail_materialization(
        &self,
        column: &ColumnRef,
        relation_name: &str,
        context: &BuildContext,
    ) -> Result<&'a Materialization, BuildError> {
        let table = column.bound_table();

        let candidates: Vec<&'a Materialization> = self
            .catalog
            .materializations_named(table)
            .into_iter()
            .filter(|m| qualifies(&column.qualifiers, m))
            .collect();

        if let [only] = candidates.as_slice() {
            return Ok(*only);
        }

        let reference = format!("{}.{}", table, column.name);
        if candidates.is_empty() {
            return Err(BuildError::ReferenceNotFound {
                relation_name: relation_name.to_string(),
                column: reference,
            });
        }

        let narrowed: Vec<&'a Materialization> = candidates
            .iter()
            .copied()
            .filter(|m| {
                context
                    .parent_relation_names
                    .iter()
                    .any(|p| p.eq_ignore_ascii_case(&m.relation_name))
            })
            .collect();

        match narrowed.as_slice() {
            [only] => Ok(*only),
            [] => Err(ambiguous(relation_name, reference, &candidates)),
            _ => Err(ambiguous(relation_name, reference, &narrowed)),
        }
    }

    fn single_column(
        &self,
        materialization: &Materialization,
        name: &str,
        relation_name: &str,
    ) -> Result<&'a Column, BuildError> {
        let matches = self.catalog.columns_named(&materialization.id, name);
        let reference = format!("{}.{}", materialization.relation_name, name);

        match matches.as_slice() {
            [only] => Ok(*only),
            [] => Err(BuildError::ReferenceNotFound {
                relation_name: relation_name.to_string(),
                column: reference,
            }),
            _ => Err(BuildError::AmbiguousReference {
                relation_name: relation_name.to_string(),
                column: reference,
                candidates: matches.iter().map(|c| c.id.clone()).collect(),
            }),
        }
    }
}

/// Qualifiers written in the SQL must agree with the materialization
fn qualifies(qualifiers: &Qualifiers, materialization: &Materialization) -> bool {
    let agrees = |written: &Option<String>, actual: &str| {
        written
            .as_deref()
            .map_or(true, |w| w.eq_ignore_ascii_case(actual))
    };

    agrees(&qualifiers.schema_name, &materialization.schema_name)
        && agrees(&qualifiers.database_name, &materialization.database_name)
}

fn ambiguous(relation_name: &str, column: String, candidates: &[&Materialization]) -> BuildError {
    BuildError::AmbiguousReference {
        relation_name: relation_name.to_string(),
        column,
        candidates: candidates.iter().map(|m| m.relation_name.clone()).collect(),
    }
}

struct Draft {
    relation_name: String,
    name: String,
    schema_name: String,
    database_name: String,
    columns: Vec<String>,
}

impl Draft {
    fn push(&mut self, name: &str) {
        if !self.columns.iter().any(|c| c.eq_ignore_ascii_case(name)) {
            self.columns.push(name.to_string());
        }
    }
}

fn draft_index(drafts: &[Draft], relation_name: &str) -> Option<usize> {
    drafts
        .iter()
        .position(|d| d.relation_name.eq_ignore_ascii_case(relation_name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use lineagegraph_core::ParsedTree;

    fn path(segments: &[&str]) -> RefPath {
        segments.iter().copied().collect()
    }

    fn table(name: &str, is_self_ref: bool) -> TableRef {
        let segments: &[&str] = if is_self_ref {
            &["create_table_statement", "table_reference", "identifier"]
        } else {
            &["select_statement", "from_clause", "table_reference", "identifier"]
        };

        TableRef {
            path: path(segments),
            name: name.to_string(),
            alias: None,
            qualifiers: Qualifiers::default(),
            is_self_ref,
        }
    }

    fn column(name: &str, table: &str, dependency_type: DependencyType) -> ColumnRef {
        ColumnRef {
            path: path(&["select_statement", "select_clause_element", "column_reference", "identifier"]),
            name: name.to_string(),
            alias: None,
            table_name: Some(table.to_string()),
            qualifiers: Qualifiers::default(),
            dependency_type,
            is_wildcard_ref: false,
        }
    }

    fn logic(relation_name: &str, statements: Vec<StatementRefs>) -> Logic {
        Logic::new(relation_name, "lin-1", "org-1", ParsedTree::leaf("sql"), statements)
    }

    fn context(source: &SourceObject) -> BuildContext {
        BuildContext::for_source(source, "lin-1", "org-1")
    }

    struct GraphOutput {
        entities: BuiltEntities,
        dependencies: BuiltDependencies,
    }

    /// Both build phases for one object, against `catalog` plus its own entities
    fn build(
        source: &SourceObject,
        logic: Option<&Logic>,
        context: &BuildContext,
        catalog: &ColumnCatalog,
        policy: OnUnresolved,
    ) -> Result<GraphOutput, BuildError> {
        let entities = GraphBuilder::materialize(source, logic, context);

        let mut catalog = catalog.clone();
        catalog.extend(&entities);

        let mut builder = GraphBuilder::new(&catalog, policy);
        if let Some(logic) = logic {
            builder.add_logic(logic, context)?;
        }
        let dependencies = builder.finish();

        Ok(GraphOutput {
            entities,
            dependencies,
        })
    }

    fn source_catalog(sources: &[SourceObject]) -> ColumnCatalog {
        let mut catalog = ColumnCatalog::default();
        for source in sources {
            catalog.extend(&GraphBuilder::materialize(source, None, &context(source)));
        }
        catalog
    }

    #[test]
    fn columns_ordered_and_deduplicated() {
        let source = SourceObject::table("db.s.a", &["ID"]);
        let mut aliased = column("x", "b", DependencyType::Data);
        aliased.alias = Some("renamed".to_string());

        let statement = StatementRefs {
            tables: vec![table("a", true), table("b", false)],
            columns: vec![
                column("id", "b", DependencyType::Data),
                aliased,
                column("y", "b", DependencyType::Query),
            ],
            wildcards: Vec::new(),
        };
        let logic = logic("db.s.a", vec![statement]);

        let entities = GraphBuilder::materialize(&source, Some(&logic), &context(&source));

        assert_eq!(entities.materializations.len(), 1);
        assert_eq!(entities.materializations[0].logic_id.as_deref(), Some(logic.id.as_str()));

        let names: Vec<(&str, usize)> = entities.columns.iter().map(|c| (c.name.as_str(), c.index)).collect();
        assert_eq!(names, vec![("ID", 1), ("renamed", 2)]);
    }

    #[test]
    fn derived_self_table_gets_own_materialization() {
        let source = SourceObject::table("db.s.loader", &[]);
        let statement = StatementRefs {
            tables: vec![table("orders", true), table("staging", false)],
            columns: vec![column("id", "staging", DependencyType::Data)],
            wildcards: Vec::new(),
        };
        let logic = logic("db.s.loader", vec![statement]);

        let entities = GraphBuilder::materialize(&source, Some(&logic), &context(&source));

        let relations: Vec<&str> = entities
            .materializations
            .iter()
            .map(|m| m.relation_name.as_str())
            .collect();
        assert_eq!(relations, vec!["db.s.loader", "db.s.orders"]);
        assert_eq!(entities.columns.len(), 1);
        assert_eq!(entities.columns[0].relation_name, "db.s.orders");
    }

    #[test]
    fn identical_edges_from_two_statements_stored_once() {
        let b = SourceObject::table("db.s.b", &["x"]);
        let a = SourceObject::table("db.s.a", &[]).with_parents(&["db.s.b"]);

        let statement = || StatementRefs {
            tables: vec![table("a", true), table("b", false)],
            columns: vec![column("x", "b", DependencyType::Data)],
            wildcards: Vec::new(),
        };
        let logic = logic("db.s.a", vec![statement(), statement()]);

        let output = build(
            &a,
            Some(&logic),
            &context(&a),
            &source_catalog(&[b]),
            OnUnresolved::Abort,
        )
        .unwrap();

        assert_eq!(output.dependencies.dependencies.len(), 1);
        assert_eq!(output.dependencies.dependencies[0].dependency_type, DependencyType::Data);
        assert_eq!(output.dependencies.diagnostics[0].code, FailureCode::DuplicateDependency);
        assert_eq!(output.dependencies.skipped(), 0);
    }

    #[test]
    fn missing_tail_aborts_or_skips() {
        let a = SourceObject::table("db.s.a", &[]);
        let statement = StatementRefs {
            tables: vec![table("a", true), table("b", false)],
            columns: vec![column("x", "b", DependencyType::Data)],
            wildcards: Vec::new(),
        };
        let logic = logic("db.s.a", vec![statement]);
        let catalog = ColumnCatalog::default();

        let aborted = build(&a, Some(&logic), &context(&a), &catalog, OnUnresolved::Abort);
        assert!(matches!(aborted, Err(BuildError::ReferenceNotFound { .. })));

        let skipped = build(&a, Some(&logic), &context(&a), &catalog, OnUnresolved::Skip).unwrap();
        assert!(skipped.dependencies.dependencies.is_empty());
        assert_eq!(skipped.dependencies.skipped(), 1);
        assert_eq!(skipped.dependencies.diagnostics[0].code, FailureCode::ReferenceNotFound);
    }

    #[test]
    fn same_name_narrowed_by_parent_relations() {
        let prod = SourceObject::table("prod.s.b", &["x"]);
        let dev = SourceObject::table("dev.s.b", &["x"]);
        let statement = || StatementRefs {
            tables: vec![table("a", true), table("b", false)],
            columns: vec![column("x", "b", DependencyType::Data)],
            wildcards: Vec::new(),
        };
        let catalog = source_catalog(&[prod, dev]);

        let unscoped = SourceObject::table("prod.s.a", &[]);
        let result = build(
            &unscoped,
            Some(&logic("prod.s.a", vec![statement()])),
            &context(&unscoped),
            &catalog,
            OnUnresolved::Abort,
        );
        assert!(matches!(result, Err(BuildError::AmbiguousReference { .. })));

        let scoped = SourceObject::table("prod.s.a", &[]).with_parents(&["prod.s.b"]);
        let output = build(
            &scoped,
            Some(&logic("prod.s.a", vec![statement()])),
            &context(&scoped),
            &catalog,
            OnUnresolved::Abort,
        )
        .unwrap();
        assert_eq!(output.dependencies.dependencies.len(), 1);

        let prod_x = catalog
            .columns_of(&catalog.materialization("prod.s.b").unwrap().id)[0]
            .id
            .clone();
        assert_eq!(output.dependencies.dependencies[0].tail_column_id, prod_x);
    }

    #[test]
    fn query_ref_without_output_column_adds_no_edge() {
        let b = SourceObject::table("db.s.b", &["x", "flag"]);
        let a = SourceObject::table("db.s.a", &[]);
        let statement = StatementRefs {
            tables: vec![table("a", true), table("b", false)],
            columns: vec![
                column("x", "b", DependencyType::Data),
                column("flag", "b", DependencyType::Query),
                column("x", "b", DependencyType::Query),
            ],
            wildcards: Vec::new(),
        };

        let output = build(
            &a,
            Some(&logic("db.s.a", vec![statement])),
            &context(&a),
            &source_catalog(&[b]),
            OnUnresolved::Abort,
        )
        .unwrap();

        let types: Vec<DependencyType> = output
            .dependencies
            .dependencies
            .iter()
            .map(|d| d.dependency_type)
            .collect();
        assert_eq!(types, vec![DependencyType::Data, DependencyType::Query]);
    }

    #[test]
    fn computed_column_is_materialized_without_edge() {
        let b = SourceObject::table("db.s.b", &["x"]);
        let a = SourceObject::table("db.s.a", &[]);
        let computed = ColumnRef {
            path: path(&["select_statement", "select_clause_element", "alias_expression", "identifier"]),
            name: "one".to_string(),
            alias: None,
            table_name: None,
            qualifiers: Qualifiers::default(),
            dependency_type: DependencyType::Data,
            is_wildcard_ref: false,
        };
        let statement = StatementRefs {
            tables: vec![table("a", true), table("b", false)],
            columns: vec![computed, column("x", "b", DependencyType::Data)],
            wildcards: Vec::new(),
        };

        let output = build(
            &a,
            Some(&logic("db.s.a", vec![statement])),
            &context(&a),
            &source_catalog(&[b]),
            OnUnresolved::Abort,
        )
        .unwrap();

        let names: Vec<&str> = output.entities.columns.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["one", "x"]);
        assert_eq!(output.dependencies.dependencies.len(), 1);
        assert!(output.dependencies.diagnostics.is_empty());
    }

    #[test]
    fn wildcard_expands_over_matching_output_columns() {
        let b = SourceObject::table("db.s.b", &["id", "name", "secret"]);
        let a = SourceObject::table("db.s.a", &["id", "name"]);
        let statement = StatementRefs {
            tables: vec![table("a", true), table("b", false)],
            columns: Vec::new(),
            wildcards: vec![ColumnRef {
                path: path(&["select_clause_element", "wildcard_expression", "wildcard_identifier"]),
                name: "*".to_string(),
                alias: None,
                table_name: Some("b".to_string()),
                qualifiers: Qualifiers::default(),
                dependency_type: DependencyType::Data,
                is_wildcard_ref: true,
            }],
        };

        let output = build(
            &a,
            Some(&logic("db.s.a", vec![statement])),
            &context(&a),
            &source_catalog(&[b]),
            OnUnresolved::Abort,
        )
        .unwrap();

        assert_eq!(output.dependencies.dependencies.len(), 2);
    }

    #[test]
    fn absorb_folds_duplicate_relations() {
        let mut entities = GraphBuilder::materialize(
            &SourceObject::table("db.s.orders", &["id"]),
            None,
            &BuildContext::for_source(&SourceObject::table("db.s.orders", &[]), "lin-1", "org-1"),
        );
        let other = GraphBuilder::materialize(
            &SourceObject::table("DB.S.ORDERS", &["ID", "total"]),
            None,
            &BuildContext::for_source(&SourceObject::table("DB.S.ORDERS", &[]), "lin-1", "org-1"),
        );

        entities.absorb(other);

        assert_eq!(entities.materializations.len(), 1);
        let names: Vec<(&str, usize)> = entities.columns.iter().map(|c| (c.name.as_str(), c.index)).collect();
        assert_eq!(names, vec![("id", 1), ("total", 2)]);
        assert!(entities
            .columns
            .iter()
            .all(|c| c.materialization_id == entities.materializations[0].id));
    }
}
