//! Dashboard lineage from BI query history
//!
//! A BI tool's warehouse query that mentions a materialization and one of its
//! data columns is taken as a dashboard reading that column.

use crate::graph_builder::{BuildError, GraphBuilder};
use lineagegraph_core::{new_id, Dashboard, Dependency, DependencyType, Logic, Materialization};
use lineagegraph_store::{BiType, QueryHistoryEntry};
use regex::Regex;
use std::collections::HashSet;
use std::sync::OnceLock;

/// A dashboard found in query history, not yet linked to a column
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DashboardRef {
    pub url: String,

    /// Upper-cased materialization name as matched in the query text
    pub materialization_name: String,

    /// Upper-cased column name as matched in the query text
    pub column_name: String,

    /// Source object whose logic referenced the column
    pub relation_name: String,

    pub parent_relation_names: Vec<String>,
}

fn url_pattern() -> Option<&'static Regex> {
    static URL: OnceLock<Option<Regex>> = OnceLock::new();
    URL.get_or_init(|| Regex::new(r#""(https?:[^\s]+),"#).ok()).as_ref()
}

/// Dashboard URL embedded in a query, else a generated placeholder
pub fn dashboard_url(query_text: &str, bi_type: BiType) -> String {
    url_pattern()
        .and_then(|pattern| pattern.captures(query_text))
        .and_then(|captures| captures.get(1))
        .map(|url| url.as_str().to_string())
        .unwrap_or_else(|| format!("{} dashboard: {}", bi_type, new_id()))
}

/// Dashboard refs for the data columns of `logics`
///
/// `parents` gives each logic's parent relation names. Refs are unique by
/// url, materialization and column, ignoring case.
pub fn dashboard_refs<'l>(
    logics: impl IntoIterator<Item = (&'l Logic, &'l [String])>,
    entries: &[QueryHistoryEntry],
    bi_type: BiType,
) -> Vec<DashboardRef> {
    let mut seen = HashSet::new();
    let mut refs = Vec::new();

    for (logic, parents) in logics {
        let data_columns = logic
            .statement_refs
            .iter()
            .flat_map(|statement| statement.columns_of(DependencyType::Data));

        for column in data_columns {
            let materialization_name = column.bound_table().to_uppercase();
            let column_name = column.output_name().to_uppercase();
            if materialization_name.is_empty() {
                continue;
            }

            for entry in entries {
                let text = &entry.query_text;
                if !text.contains(&materialization_name) || !text.contains(&column_name) {
                    continue;
                }

                let url = dashboard_url(text, bi_type);
                if !seen.insert((url.to_lowercase(), materialization_name.clone(), column_name.clone())) {
                    continue;
                }

                refs.push(DashboardRef {
                    url,
                    materialization_name: materialization_name.clone(),
                    column_name: column_name.clone(),
                    relation_name: logic.relation_name.clone(),
                    parent_relation_names: parents.to_vec(),
                });
            }
        }
    }

    tracing::debug!(dashboards = refs.len(), bi_tool = %bi_type, "matched query history");
    refs
}

/// Link dashboard refs to catalog columns
///
/// Each linked dashboard adds an external dependency from the dashboard to
/// its column. Unresolved refs follow the builder's failure policy.
pub fn link_dashboards(
    builder: &mut GraphBuilder<'_>,
    refs: &[DashboardRef],
    lineage_id: &str,
    organization_id: &str,
) -> Result<Vec<Dashboard>, BuildError> {
    let catalog = builder.catalog();
    let mut dashboards = Vec::new();

    for dashboard_ref in refs {
        let materialization = match materialization_for(dashboard_ref, catalog.materializations_named(&dashboard_ref.materialization_name)) {
            Ok(m) => m,
            Err(error) => {
                builder.unresolved(error, &dashboard_ref.relation_name, None)?;
                continue;
            }
        };

        let column = match catalog
            .columns_named(&materialization.id, &dashboard_ref.column_name)
            .as_slice()
        {
            [only] => *only,
            _ => {
                let error = BuildError::ReferenceNotFound {
                    relation_name: dashboard_ref.relation_name.clone(),
                    column: format!("{}.{}", materialization.relation_name, dashboard_ref.column_name),
                };
                builder.unresolved(error, &dashboard_ref.relation_name, None)?;
                continue;
            }
        };

        let dashboard = Dashboard {
            id: new_id(),
            url: dashboard_ref.url.clone(),
            materialization_name: dashboard_ref.materialization_name.clone(),
            column_name: dashboard_ref.column_name.clone(),
            materialization_id: materialization.id.clone(),
            column_id: column.id.clone(),
            lineage_id: lineage_id.to_string(),
            organization_id: organization_id.to_string(),
        };

        let dependency = Dependency::new(
            DependencyType::External,
            &dashboard.id,
            &column.id,
            lineage_id,
            organization_id,
        );
        builder.add_dependency(dependency, &dashboard_ref.relation_name);
        dashboards.push(dashboard);
    }

    Ok(dashboards)
}

fn materialization_for<'c>(
    dashboard_ref: &DashboardRef,
    candidates: Vec<&'c Materialization>,
) -> Result<&'c Materialization, BuildError> {
    let reference = format!("{}.{}", dashboard_ref.materialization_name, dashboard_ref.column_name);

    let narrowed: Vec<&'c Materialization> = if candidates.len() > 1 {
        candidates
            .iter()
            .copied()
            .filter(|m| {
                dashboard_ref
                    .parent_relation_names
                    .iter()
                    .any(|p| p.eq_ignore_ascii_case(&m.relation_name))
            })
            .collect()
    } else {
        candidates.clone()
    };

    match narrowed.as_slice() {
        [only] => Ok(*only),
        [] if candidates.is_empty() => Err(BuildError::ReferenceNotFound {
            relation_name: dashboard_ref.relation_name.clone(),
            column: reference,
        }),
        _ => Err(BuildError::AmbiguousReference {
            relation_name: dashboard_ref.relation_name.clone(),
            column: reference,
            candidates: candidates.iter().map(|m| m.relation_name.clone()).collect(),
        }),
    }
}
