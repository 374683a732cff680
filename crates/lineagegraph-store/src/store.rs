//! Persistence traits for lineage snapshots
//!
//! Every store is scoped by a lineage id and an organization id supplied by
//! the caller. Implementations own their connections; the engine only sees
//! these traits.

use chrono::{DateTime, Duration, Utc};
use lineagegraph_core::{
    Column, Dashboard, Dependency, FailureCode, Lineage, LineageStateError, Logic, Materialization,
};

/// Which lineage counts as "latest"
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineageFilter {
    pub organization_id: String,

    /// Accept an incomplete lineage created within `minute_tolerance` minutes
    pub tolerate_incomplete: bool,

    pub minute_tolerance: u32,

    /// Lineage to leave out, usually the one being built
    pub exclude_id: Option<String>,
}

impl LineageFilter {
    /// Strictly the most recent completed lineage
    pub fn completed(organization_id: impl Into<String>) -> Self {
        Self {
            organization_id: organization_id.into(),
            tolerate_incomplete: false,
            minute_tolerance: 0,
            exclude_id: None,
        }
    }

    pub fn excluding(mut self, lineage_id: impl Into<String>) -> Self {
        self.exclude_id = Some(lineage_id.into());
        self
    }

    /// True if `lineage` is eligible at time `now`
    pub fn accepts(&self, lineage: &Lineage, now: DateTime<Utc>) -> bool {
        if lineage.organization_id != self.organization_id {
            return false;
        }
        if self.exclude_id.as_deref() == Some(lineage.id.as_str()) {
            return false;
        }
        if lineage.completed {
            return true;
        }

        self.tolerate_incomplete
            && now - lineage.created_at <= Duration::minutes(i64::from(self.minute_tolerance))
    }
}

/// Scope for logic, materialization and column lookups
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityFilter {
    pub lineage_id: String,

    pub organization_id: String,

    /// Only entities of these relations; `None` means all
    pub relation_names: Option<Vec<String>>,
}

impl EntityFilter {
    pub fn new(lineage_id: impl Into<String>, organization_id: impl Into<String>) -> Self {
        Self {
            lineage_id: lineage_id.into(),
            organization_id: organization_id.into(),
            relation_names: None,
        }
    }

    pub fn with_relation_names(mut self, relation_names: Vec<String>) -> Self {
        self.relation_names = Some(relation_names);
        self
    }

    /// True if an entity with these scope fields passes the filter
    pub fn matches(&self, lineage_id: &str, organization_id: &str, relation_name: &str) -> bool {
        lineage_id == self.lineage_id
            && organization_id == self.organization_id
            && self
                .relation_names
                .as_ref()
                .map_or(true, |names| names.iter().any(|n| n == relation_name))
    }
}

/// Scope for dependency lookups
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyFilter {
    pub lineage_id: String,

    pub organization_id: String,

    /// Only edges touching this column, as head or tail
    pub column_id: Option<String>,
}

impl DependencyFilter {
    pub fn new(lineage_id: impl Into<String>, organization_id: impl Into<String>) -> Self {
        Self {
            lineage_id: lineage_id.into(),
            organization_id: organization_id.into(),
            column_id: None,
        }
    }

    pub fn matches(&self, dependency: &Dependency) -> bool {
        dependency.lineage_id == self.lineage_id
            && dependency.organization_id == self.organization_id
            && self.column_id.as_deref().map_or(true, |id| {
                dependency.head_column_id == id || dependency.tail_column_id == id
            })
    }
}

/// Errors returned by stores and collaborator APIs
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Write rejected: {0}")]
    Conflict(String),

    #[error("Query failed: {0}")]
    QueryError(String),

    #[error("Unknown lineage: {0}")]
    UnknownLineage(String),

    #[error(transparent)]
    LineageState(#[from] LineageStateError),
}

impl StoreError {
    pub fn code(&self) -> FailureCode {
        match self {
            Self::UnknownLineage(_) | Self::LineageState(_) => FailureCode::LineageState,
            _ => FailureCode::DownstreamCollaborator,
        }
    }
}

/// Lineage snapshot roots
#[async_trait::async_trait]
pub trait LineageStore: Send + Sync {
    /// Most recent lineage passing the filter
    async fn find_latest(&self, filter: &LineageFilter) -> Result<Option<Lineage>, StoreError>;

    async fn insert_one(&self, lineage: &Lineage) -> Result<(), StoreError>;

    /// Mark a lineage completed
    ///
    /// Fails if the lineage is unknown or already completed.
    async fn complete(
        &self,
        lineage_id: &str,
        db_covered_names: Vec<String>,
        diff: Option<String>,
    ) -> Result<Lineage, StoreError>;
}

#[async_trait::async_trait]
pub trait LogicStore: Send + Sync {
    async fn find_by(&self, filter: &EntityFilter) -> Result<Vec<Logic>, StoreError>;

    async fn insert_many(&self, logics: &[Logic]) -> Result<(), StoreError>;
}

#[async_trait::async_trait]
pub trait MaterializationStore: Send + Sync {
    async fn find_by(&self, filter: &EntityFilter) -> Result<Vec<Materialization>, StoreError>;

    async fn insert_many(&self, materializations: &[Materialization]) -> Result<(), StoreError>;
}

#[async_trait::async_trait]
pub trait ColumnStore: Send + Sync {
    async fn find_by(&self, filter: &EntityFilter) -> Result<Vec<Column>, StoreError>;

    async fn insert_many(&self, columns: &[Column]) -> Result<(), StoreError>;
}

#[async_trait::async_trait]
pub trait DependencyStore: Send + Sync {
    async fn find_by(&self, filter: &DependencyFilter) -> Result<Vec<Dependency>, StoreError>;

    /// Insert edges; an edge whose identity is already stored is rejected
    async fn insert_many(&self, dependencies: &[Dependency]) -> Result<(), StoreError>;
}

#[async_trait::async_trait]
pub trait DashboardStore: Send + Sync {
    async fn insert_many(&self, dashboards: &[Dashboard]) -> Result<(), StoreError>;
}
