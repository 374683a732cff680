//! Snapshot merging against the latest lineage
//!
//! Freshly built materializations are compared with the latest eligible
//! snapshot to decide which keep their identity (update path) and which are
//! new (create path), and to report what changed between the snapshots.

use crate::graph_builder::BuiltEntities;
use lineagegraph_core::{Column, Lineage, Logic, Materialization, SnapshotConfig};
use lineagegraph_store::{ColumnStore, EntityFilter, LineageFilter, LogicStore, MaterializationStore, StoreError};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Relation names that changed between two snapshots, each list sorted
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotDiff {
    /// In the new snapshot only
    pub created: Vec<String>,

    /// In both snapshots
    pub updated: Vec<String>,

    /// In the previous snapshot only
    pub removed: Vec<String>,

    /// Updated relations whose logic checksum differs
    pub logic_changed: Vec<String>,
}

impl SnapshotDiff {
    /// Check if anything was created, removed or re-written
    pub fn has_changes(&self) -> bool {
        !self.created.is_empty() || !self.removed.is_empty() || !self.logic_changed.is_empty()
    }
}

/// Entities of the previous snapshot the merge compares against
#[derive(Debug, Clone, Default)]
pub struct PriorSnapshot {
    pub materializations: Vec<Materialization>,
    pub columns: Vec<Column>,
    pub logics: Vec<Logic>,
}

/// Result of merging built entities with the previous snapshot
#[derive(Debug, Clone, Default)]
pub struct MergeResult {
    /// Entities with fresh identities
    pub to_create: BuiltEntities,

    /// Entities that took over an identity from the previous snapshot
    pub to_update: BuiltEntities,

    pub diff: SnapshotDiff,
}

impl MergeResult {
    /// Every merged entity, created and updated
    pub fn all(&self) -> BuiltEntities {
        let mut all = self.to_create.clone();
        all.materializations.extend_from_slice(&self.to_update.materializations);
        all.columns.extend_from_slice(&self.to_update.columns);
        all
    }
}

/// Filter selecting the lineage a run merges against
pub fn latest_filter(config: &SnapshotConfig, organization_id: &str, current_lineage_id: &str) -> LineageFilter {
    LineageFilter {
        organization_id: organization_id.to_string(),
        tolerate_incomplete: config.tolerate_incomplete,
        minute_tolerance: config.minute_tolerance,
        exclude_id: Some(current_lineage_id.to_string()),
    }
}

/// Merges built entities with the latest snapshot read through the stores
pub struct SnapshotMerger<'a> {
    materializations: &'a dyn MaterializationStore,
    columns: &'a dyn ColumnStore,
    logics: &'a dyn LogicStore,
}

impl<'a> SnapshotMerger<'a> {
    pub fn new(
        materializations: &'a dyn MaterializationStore,
        columns: &'a dyn ColumnStore,
        logics: &'a dyn LogicStore,
    ) -> Self {
        Self {
            materializations,
            columns,
            logics,
        }
    }

    /// Load the entities of `latest`, if any, and merge against them
    pub async fn merge(
        &self,
        latest: Option<&Lineage>,
        built: BuiltEntities,
        logics: &[Logic],
    ) -> Result<MergeResult, StoreError> {
        let prior = match latest {
            Some(lineage) => {
                let filter = EntityFilter::new(&lineage.id, &lineage.organization_id);
                PriorSnapshot {
                    materializations: self.materializations.find_by(&filter).await?,
                    columns: self.columns.find_by(&filter).await?,
                    logics: self.logics.find_by(&filter).await?,
                }
            }
            None => PriorSnapshot::default(),
        };

        tracing::debug!(
            prior_lineage = latest.map(|l| l.id.as_str()),
            prior_materializations = prior.materializations.len(),
            "merging snapshot"
        );

        Ok(merge_entities(&prior, built, logics))
    }
}

/// Assign identities to `built` from `prior`
///
/// A materialization whose relation name equals a prior one reuses the prior
/// id and its columns are re-pointed to it. A column whose name matches a
/// prior column of that relation reuses that column's id. If the prior
/// snapshot holds a relation name twice, the first stored wins.
pub fn merge_entities(prior: &PriorSnapshot, built: BuiltEntities, logics: &[Logic]) -> MergeResult {
    let mut prior_by_relation: HashMap<&str, &Materialization> = HashMap::new();
    for materialization in &prior.materializations {
        prior_by_relation
            .entry(materialization.relation_name.as_str())
            .or_insert(materialization);
    }

    let mut prior_columns: HashMap<(&str, &str), &Column> = HashMap::new();
    for column in &prior.columns {
        prior_columns
            .entry((column.materialization_id.as_str(), column.name.as_str()))
            .or_insert(column);
    }

    let mut result = MergeResult::default();
    let mut seen = HashSet::new();

    let BuiltEntities {
        materializations,
        columns,
    } = built;

    for mut materialization in materializations {
        seen.insert(materialization.relation_name.clone());

        let mut own_columns: Vec<Column> = columns
            .iter()
            .filter(|c| c.materialization_id == materialization.id)
            .cloned()
            .collect();

        let Some(previous) = prior_by_relation.get(materialization.relation_name.as_str()) else {
            result.diff.created.push(materialization.relation_name.clone());
            result.to_create.columns.extend(own_columns);
            result.to_create.materializations.push(materialization);
            continue;
        };

        tracing::debug!(
            relation = %materialization.relation_name,
            id = %previous.id,
            "reusing materialization identity"
        );

        result.diff.updated.push(materialization.relation_name.clone());
        materialization.id = previous.id.clone();

        for column in &mut own_columns {
            column.materialization_id = previous.id.clone();
            match prior_columns.get(&(previous.id.as_str(), column.name.as_str())) {
                Some(prior_column) => {
                    column.id = prior_column.id.clone();
                    result.to_update.columns.push(column.clone());
                }
                None => result.to_create.columns.push(column.clone()),
            }
        }

        result.to_update.materializations.push(materialization);
    }

    result.diff.removed = prior_by_relation
        .keys()
        .filter(|name| !seen.contains(**name))
        .map(|name| name.to_string())
        .collect();

    result.diff.logic_changed = logic_changes(&prior.logics, logics, &result.diff.updated);

    result.diff.created.sort();
    result.diff.created.dedup();
    result.diff.updated.sort();
    result.diff.updated.dedup();
    result.diff.removed.sort();
    result.diff.logic_changed.sort();
    result.diff.logic_changed.dedup();

    result
}

/// Updated relations whose logic checksum differs from the prior logic
fn logic_changes(prior: &[Logic], current: &[Logic], updated: &[String]) -> Vec<String> {
    let mut prior_checksums: HashMap<&str, &str> = HashMap::new();
    for logic in prior {
        prior_checksums
            .entry(logic.relation_name.as_str())
            .or_insert(logic.checksum.as_str());
    }

    current
        .iter()
        .filter(|logic| updated.contains(&logic.relation_name))
        .filter(|logic| {
            prior_checksums
                .get(logic.relation_name.as_str())
                .map_or(true, |checksum| *checksum != logic.checksum)
        })
        .map(|logic| logic.relation_name.clone())
        .collect()
}
