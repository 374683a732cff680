//! In-memory store for tests, demos and the file-backed CLI
//!
//! Holds every entity in one shared [`StoreSnapshot`]. Clones share state, so
//! one instance can be handed to the engine as every store trait at once.
//!
//! ## Simulating Failures
//!
//! ```rust,ignore
//! let store = InMemoryStore::new();
//! store
//!     .fail_on(StoreOperation::InsertColumns, StoreError::Unavailable("down".into()))
//!     .await;
//! ```

use crate::store::{
    ColumnStore, DashboardStore, DependencyFilter, DependencyStore, EntityFilter, LineageFilter,
    LineageStore, LogicStore, MaterializationStore, StoreError,
};
use lineagegraph_core::{Column, Dashboard, Dependency, Lineage, Logic, Materialization};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Every persisted entity, serializable as one JSON document
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreSnapshot {
    #[serde(default)]
    pub lineages: Vec<Lineage>,

    #[serde(default)]
    pub logics: Vec<Logic>,

    #[serde(default)]
    pub materializations: Vec<Materialization>,

    #[serde(default)]
    pub columns: Vec<Column>,

    #[serde(default)]
    pub dependencies: Vec<Dependency>,

    #[serde(default)]
    pub dashboards: Vec<Dashboard>,
}

impl StoreSnapshot {
    /// Load from a JSON file
    pub fn from_file(path: &std::path::Path) -> Result<Self, StoreError> {
        let json = std::fs::read_to_string(path)
            .map_err(|e| StoreError::Unavailable(format!("{}: {}", path.display(), e)))?;

        serde_json::from_str(&json).map_err(|e| StoreError::QueryError(e.to_string()))
    }

    /// Save as a JSON file
    pub fn save_to_file(&self, path: &std::path::Path) -> Result<(), StoreError> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| StoreError::QueryError(e.to_string()))?;

        std::fs::write(path, json)
            .map_err(|e| StoreError::Unavailable(format!("{}: {}", path.display(), e)))
    }
}

/// Store operations that can be made to fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOperation {
    FindLatestLineage,
    InsertLineage,
    CompleteLineage,
    FindLogics,
    InsertLogics,
    FindMaterializations,
    InsertMaterializations,
    FindColumns,
    InsertColumns,
    FindDependencies,
    InsertDependencies,
    InsertDashboards,
}

/// In-memory implementation of every store trait
pub struct InMemoryStore {
    state: Arc<RwLock<StoreSnapshot>>,

    /// Errors to return for specific operations
    failures: Arc<RwLock<HashMap<StoreOperation, StoreError>>>,
}

impl InMemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::from_snapshot(StoreSnapshot::default())
    }

    /// Create a store holding `snapshot`
    pub fn from_snapshot(snapshot: StoreSnapshot) -> Self {
        Self {
            state: Arc::new(RwLock::new(snapshot)),
            failures: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Copy of the current contents
    pub async fn snapshot(&self) -> StoreSnapshot {
        self.state.read().await.clone()
    }

    /// Make `operation` return `error` until cleared
    pub async fn fail_on(&self, operation: StoreOperation, error: StoreError) {
        self.failures.write().await.insert(operation, error);
    }

    /// Clear all configured failures
    pub async fn clear_failures(&self) {
        self.failures.write().await.clear();
    }

    async fn check(&self, operation: StoreOperation) -> Result<(), StoreError> {
        match self.failures.read().await.get(&operation) {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for InMemoryStore {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
            failures: Arc::clone(&self.failures),
        }
    }
}

#[async_trait::async_trait]
impl LineageStore for InMemoryStore {
    async fn find_latest(&self, filter: &LineageFilter) -> Result<Option<Lineage>, StoreError> {
        self.check(StoreOperation::FindLatestLineage).await?;

        let now = chrono::Utc::now();
        let state = self.state.read().await;

        Ok(state
            .lineages
            .iter()
            .filter(|lineage| filter.accepts(lineage, now))
            .max_by_key(|lineage| lineage.created_at)
            .cloned())
    }

    async fn insert_one(&self, lineage: &Lineage) -> Result<(), StoreError> {
        self.check(StoreOperation::InsertLineage).await?;

        let mut state = self.state.write().await;
        if state.lineages.iter().any(|l| l.id == lineage.id) {
            return Err(StoreError::Conflict(format!("lineage {} already exists", lineage.id)));
        }

        state.lineages.push(lineage.clone());
        Ok(())
    }

    async fn complete(
        &self,
        lineage_id: &str,
        db_covered_names: Vec<String>,
        diff: Option<String>,
    ) -> Result<Lineage, StoreError> {
        self.check(StoreOperation::CompleteLineage).await?;

        let mut state = self.state.write().await;
        let slot = state
            .lineages
            .iter_mut()
            .find(|l| l.id == lineage_id)
            .ok_or_else(|| StoreError::UnknownLineage(lineage_id.to_string()))?;

        let completed = slot.clone().into_completed(db_covered_names, diff)?;
        *slot = completed.clone();

        Ok(completed)
    }
}

#[async_trait::async_trait]
impl LogicStore for InMemoryStore {
    async fn find_by(&self, filter: &EntityFilter) -> Result<Vec<Logic>, StoreError> {
        self.check(StoreOperation::FindLogics).await?;

        let state = self.state.read().await;
        Ok(state
            .logics
            .iter()
            .filter(|l| filter.matches(&l.lineage_id, &l.organization_id, &l.relation_name))
            .cloned()
            .collect())
    }

    async fn insert_many(&self, logics: &[Logic]) -> Result<(), StoreError> {
        self.check(StoreOperation::InsertLogics).await?;

        self.state.write().await.logics.extend_from_slice(logics);
        Ok(())
    }
}

#[async_trait::async_trait]
impl MaterializationStore for InMemoryStore {
    async fn find_by(&self, filter: &EntityFilter) -> Result<Vec<Materialization>, StoreError> {
        self.check(StoreOperation::FindMaterializations).await?;

        let state = self.state.read().await;
        Ok(state
            .materializations
            .iter()
            .filter(|m| filter.matches(&m.lineage_id, &m.organization_id, &m.relation_name))
            .cloned()
            .collect())
    }

    async fn insert_many(&self, materializations: &[Materialization]) -> Result<(), StoreError> {
        self.check(StoreOperation::InsertMaterializations).await?;

        self.state
            .write()
            .await
            .materializations
            .extend_from_slice(materializations);
        Ok(())
    }
}

#[async_trait::async_trait]
impl ColumnStore for InMemoryStore {
    async fn find_by(&self, filter: &EntityFilter) -> Result<Vec<Column>, StoreError> {
        self.check(StoreOperation::FindColumns).await?;

        let state = self.state.read().await;
        Ok(state
            .columns
            .iter()
            .filter(|c| filter.matches(&c.lineage_id, &c.organization_id, &c.relation_name))
            .cloned()
            .collect())
    }

    async fn insert_many(&self, columns: &[Column]) -> Result<(), StoreError> {
        self.check(StoreOperation::InsertColumns).await?;

        self.state.write().await.columns.extend_from_slice(columns);
        Ok(())
    }
}

#[async_trait::async_trait]
impl DependencyStore for InMemoryStore {
    async fn find_by(&self, filter: &DependencyFilter) -> Result<Vec<Dependency>, StoreError> {
        self.check(StoreOperation::FindDependencies).await?;

        let state = self.state.read().await;
        Ok(state
            .dependencies
            .iter()
            .filter(|d| filter.matches(d))
            .cloned()
            .collect())
    }

    async fn insert_many(&self, dependencies: &[Dependency]) -> Result<(), StoreError> {
        self.check(StoreOperation::InsertDependencies).await?;

        let mut state = self.state.write().await;
        let mut keys: HashSet<_> = state.dependencies.iter().map(Dependency::key).collect();

        // Validate the whole batch before writing any of it
        for dependency in dependencies {
            if !keys.insert(dependency.key()) {
                return Err(StoreError::Conflict(format!(
                    "dependency {} -> {} ({}) already stored",
                    dependency.head_column_id, dependency.tail_column_id, dependency.dependency_type
                )));
            }
        }

        state.dependencies.extend_from_slice(dependencies);
        Ok(())
    }
}

#[async_trait::async_trait]
impl DashboardStore for InMemoryStore {
    async fn insert_many(&self, dashboards: &[Dashboard]) -> Result<(), StoreError> {
        self.check(StoreOperation::InsertDashboards).await?;

        self.state.write().await.dashboards.extend_from_slice(dashboards);
        Ok(())
    }
}
