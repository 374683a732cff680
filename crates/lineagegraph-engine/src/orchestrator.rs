//! Lineage run pipeline
//!
//! One run turns a [`RunRequest`] into a completed lineage snapshot. Stages
//! run strictly in order and each consumes the value of the one before it:
//!
//! ```text
//! New -> Parsing -> Resolving -> Merging -> PersistingCore
//!     -> BuildingDependencies -> PersistingDependencies -> Completed
//! ```
//!
//! A failing stage ends the run with a [`LineageFailure`]. The lineage row
//! written in `New` then stays incomplete and is never merged against unless
//! the configuration tolerates recent incomplete snapshots.

use crate::dashboards::{dashboard_refs, link_dashboards};
use crate::graph_builder::{BuildContext, BuildError, BuiltEntities, ColumnCatalog, GraphBuilder};
use crate::snapshot_merger::{latest_filter, SnapshotMerger};
use crate::source::{RunRequest, SourceObject};
use lineagegraph_core::{Config, Dashboard, FailureCode, Lineage, Logic, ParsedTree, RunReport, RunSummary};
use lineagegraph_sql::{ParsedDocument, RefResolver, ResolveError};
use lineagegraph_store::{
    ColumnStore, DashboardStore, DependencyStore, EntityFilter, LineageStore, LogicStore,
    MaterializationStore, QueryHistoryApi, SqlParserApi, StoreError,
};
use std::fmt;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// Pipeline stage of a lineage run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RunStage {
    New,
    Parsing,
    Resolving,
    Merging,
    PersistingCore,
    BuildingDependencies,
    PersistingDependencies,
    Completed,
    Failed,
}

impl RunStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Parsing => "parsing",
            Self::Resolving => "resolving",
            Self::Merging => "merging",
            Self::PersistingCore => "persisting core",
            Self::BuildingDependencies => "building dependencies",
            Self::PersistingDependencies => "persisting dependencies",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for RunStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Structured failure of a lineage run
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Lineage run failed while {stage} [{code}]: {message}")]
pub struct LineageFailure {
    /// Stage that failed
    pub stage: RunStage,

    pub code: FailureCode,

    pub message: String,

    /// Lineage left incomplete, if one was allocated
    pub lineage_id: Option<String>,
}

/// Errors that carry a failure code
trait Coded: fmt::Display {
    fn failure_code(&self) -> FailureCode;
}

impl Coded for StoreError {
    fn failure_code(&self) -> FailureCode {
        self.code()
    }
}

impl Coded for ResolveError {
    fn failure_code(&self) -> FailureCode {
        self.code()
    }
}

impl Coded for BuildError {
    fn failure_code(&self) -> FailureCode {
        self.code()
    }
}

/// Map an error raised in `stage` of lineage `lineage_id`
fn at<E: Coded>(stage: RunStage, lineage_id: &str) -> impl FnOnce(E) -> LineageFailure + '_ {
    move |error| {
        tracing::error!(lineage_id, stage = %stage, code = %error.failure_code(), "{}", error);
        LineageFailure {
            stage,
            code: error.failure_code(),
            message: error.to_string(),
            lineage_id: Some(lineage_id.to_string()),
        }
    }
}

/// Store handles used by a run
#[derive(Clone)]
pub struct LineageStores {
    pub lineages: Arc<dyn LineageStore>,
    pub logics: Arc<dyn LogicStore>,
    pub materializations: Arc<dyn MaterializationStore>,
    pub columns: Arc<dyn ColumnStore>,
    pub dependencies: Arc<dyn DependencyStore>,
    pub dashboards: Arc<dyn DashboardStore>,
}

impl LineageStores {
    /// Use one store for every entity
    pub fn shared<S>(store: S) -> Self
    where
        S: LineageStore
            + LogicStore
            + MaterializationStore
            + ColumnStore
            + DependencyStore
            + DashboardStore
            + 'static,
    {
        let store = Arc::new(store);
        Self {
            lineages: store.clone(),
            logics: store.clone(),
            materializations: store.clone(),
            columns: store.clone(),
            dependencies: store.clone(),
            dashboards: store,
        }
    }
}

/// Drives lineage runs against the stores and collaborators
pub struct LineageOrchestrator {
    stores: LineageStores,
    parser: Arc<dyn SqlParserApi>,
    query_history: Option<Arc<dyn QueryHistoryApi>>,
    config: Config,
}

impl LineageOrchestrator {
    pub fn new(stores: LineageStores, parser: Arc<dyn SqlParserApi>, config: Config) -> Self {
        Self {
            stores,
            parser,
            query_history: None,
            config,
        }
    }

    /// Link dashboards from this BI query history when a request names a tool
    pub fn with_query_history(mut self, query_history: Arc<dyn QueryHistoryApi>) -> Self {
        self.query_history = Some(query_history);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Run the pipeline for `request`
    pub async fn run(&self, request: &RunRequest) -> Result<RunReport, LineageFailure> {
        request.validate().map_err(|message| LineageFailure {
            stage: RunStage::New,
            code: FailureCode::InvalidRequest,
            message,
            lineage_id: None,
        })?;

        let organization_id = request.organization_id.as_str();

        // New
        let lineage = Lineage::new(organization_id);
        let lineage_id = lineage.id.clone();
        self.stores
            .lineages
            .insert_one(&lineage)
            .await
            .map_err(at(RunStage::New, &lineage_id))?;
        tracing::info!(lineage_id = %lineage_id, sources = request.objects.len(), "lineage allocated");

        // Parsing
        let trees = self.parse(request, &lineage_id).await?;

        // Resolving
        let logics = self.resolve(request, trees, &lineage_id).await?;

        let mut built = BuiltEntities::default();
        for (object, logic) in request.objects.iter().zip(&logics) {
            let context = BuildContext::for_source(object, &lineage_id, organization_id);
            built.absorb(GraphBuilder::materialize(object, logic.as_ref(), &context));
        }

        // Merging
        tracing::info!(
            lineage_id = %lineage_id,
            materializations = built.materializations.len(),
            columns = built.columns.len(),
            "merging with latest snapshot"
        );
        let filter = latest_filter(&self.config.snapshot, organization_id, &lineage_id);
        let latest = self
            .stores
            .lineages
            .find_latest(&filter)
            .await
            .map_err(at(RunStage::Merging, &lineage_id))?;

        let resolved: Vec<Logic> = logics.iter().flatten().cloned().collect();
        let merger = SnapshotMerger::new(
            self.stores.materializations.as_ref(),
            self.stores.columns.as_ref(),
            self.stores.logics.as_ref(),
        );
        let merged = merger
            .merge(latest.as_ref(), built, &resolved)
            .await
            .map_err(at(RunStage::Merging, &lineage_id))?;
        let entities = merged.all();

        // PersistingCore
        tracing::info!(
            lineage_id = %lineage_id,
            created = merged.to_create.materializations.len(),
            updated = merged.to_update.materializations.len(),
            "persisting core entities"
        );
        self.persist_core(&resolved, &entities, &lineage_id).await?;

        // BuildingDependencies
        tracing::info!(lineage_id = %lineage_id, "building dependencies");
        let entity_filter = EntityFilter::new(&lineage_id, organization_id);
        let catalog = ColumnCatalog::new(
            self.stores
                .materializations
                .find_by(&entity_filter)
                .await
                .map_err(at(RunStage::BuildingDependencies, &lineage_id))?,
            self.stores
                .columns
                .find_by(&entity_filter)
                .await
                .map_err(at(RunStage::BuildingDependencies, &lineage_id))?,
        );

        let mut builder = GraphBuilder::new(&catalog, self.config.resolution.on_unresolved_dependency);
        for (object, logic) in request.objects.iter().zip(&logics) {
            if let Some(logic) = logic {
                let context = BuildContext::for_source(object, &lineage_id, organization_id);
                builder
                    .add_logic(logic, &context)
                    .map_err(at(RunStage::BuildingDependencies, &lineage_id))?;
            }
        }

        let dashboards = self
            .build_dashboards(&mut builder, request, &logics, &lineage_id)
            .await?;
        let built_dependencies = builder.finish();

        // PersistingDependencies
        tracing::info!(
            lineage_id = %lineage_id,
            dependencies = built_dependencies.dependencies.len(),
            dashboards = dashboards.len(),
            "persisting dependencies"
        );
        self.stores
            .dependencies
            .insert_many(&built_dependencies.dependencies)
            .await
            .map_err(at(RunStage::PersistingDependencies, &lineage_id))?;
        self.stores
            .dashboards
            .insert_many(&dashboards)
            .await
            .map_err(at(RunStage::PersistingDependencies, &lineage_id))?;

        // Completed
        let diff = serde_json::to_string(&merged.diff).ok();
        self.stores
            .lineages
            .complete(&lineage_id, entities.database_names(), diff)
            .await
            .map_err(at(RunStage::Completed, &lineage_id))?;
        tracing::info!(lineage_id = %lineage_id, changed = merged.diff.has_changes(), "lineage completed");

        let mut report = RunReport::new(&lineage_id);
        report.summary = RunSummary {
            sources: request.objects.len(),
            statements: resolved.iter().map(|l| l.statement_refs.len()).sum(),
            materializations_created: merged.to_create.materializations.len(),
            materializations_updated: merged.to_update.materializations.len(),
            columns: entities.columns.len(),
            dependencies: built_dependencies.dependencies.len(),
            dashboards: dashboards.len(),
            skipped_dependencies: built_dependencies.skipped(),
        };
        for diagnostic in built_dependencies.diagnostics {
            report.add_diagnostic(diagnostic);
        }

        Ok(report)
    }

    /// Parse trees aligned with the request's objects, `None` for objects without SQL
    async fn parse(
        &self,
        request: &RunRequest,
        lineage_id: &str,
    ) -> Result<Vec<Option<ParsedTree>>, LineageFailure> {
        tracing::info!(lineage_id, dialect = %self.config.dialect, "parsing source objects");

        let mut trees = Vec::with_capacity(request.objects.len());
        for object in &request.objects {
            let tree = match &object.sql {
                Some(sql) => Some(
                    self.parser
                        .parse(sql, self.config.dialect)
                        .await
                        .map_err(at(RunStage::Parsing, lineage_id))?,
                ),
                None => None,
            };
            trees.push(tree);
        }

        Ok(trees)
    }

    /// Resolve parsed trees into logic on a bounded set of blocking workers
    ///
    /// Every worker is joined before returning. Results come back in request
    /// order; the first error in that order wins.
    async fn resolve(
        &self,
        request: &RunRequest,
        trees: Vec<Option<ParsedTree>>,
        lineage_id: &str,
    ) -> Result<Vec<Option<Logic>>, LineageFailure> {
        let workers = self.config.concurrency.workers();
        tracing::info!(lineage_id, workers, "resolving references");

        let semaphore = Arc::new(Semaphore::new(workers));
        let mut tasks = JoinSet::new();
        let mut slots: Vec<Option<Result<Logic, ResolveError>>> = Vec::with_capacity(trees.len());

        for (index, (object, tree)) in request.objects.iter().zip(trees).enumerate() {
            slots.push(None);
            let Some(tree) = tree else {
                continue;
            };

            let permit = semaphore
                .clone()
                .acquire_owned()
                .await
                .map_err(|e| collaborator_failure(RunStage::Resolving, lineage_id, e))?;

            let relation_name = object.relation_name.clone();
            let lineage = lineage_id.to_string();
            let organization_id = request.organization_id.clone();

            tasks.spawn_blocking(move || {
                let _permit = permit;
                tracing::debug!(relation = %relation_name, "resolving logic");
                let logic = RefResolver::build_logic(
                    &relation_name,
                    &lineage,
                    &organization_id,
                    ParsedDocument::from_tree(tree),
                );
                (index, logic)
            });
        }

        let mut panicked = None;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, logic)) => slots[index] = Some(logic),
                Err(e) => {
                    tracing::error!(lineage_id, error = %e, "resolve worker failed");
                    panicked.get_or_insert(e);
                }
            }
        }

        if let Some(e) = panicked {
            return Err(collaborator_failure(RunStage::Resolving, lineage_id, e));
        }

        slots
            .into_iter()
            .map(|slot| slot.transpose().map_err(at(RunStage::Resolving, lineage_id)))
            .collect()
    }

    async fn persist_core(
        &self,
        logics: &[Logic],
        entities: &BuiltEntities,
        lineage_id: &str,
    ) -> Result<(), LineageFailure> {
        self.stores
            .logics
            .insert_many(logics)
            .await
            .map_err(at(RunStage::PersistingCore, lineage_id))?;
        self.stores
            .materializations
            .insert_many(&entities.materializations)
            .await
            .map_err(at(RunStage::PersistingCore, lineage_id))?;
        self.stores
            .columns
            .insert_many(&entities.columns)
            .await
            .map_err(at(RunStage::PersistingCore, lineage_id))?;
        Ok(())
    }

    /// Dashboards for the request's BI tool, empty without one
    async fn build_dashboards(
        &self,
        builder: &mut GraphBuilder<'_>,
        request: &RunRequest,
        logics: &[Option<Logic>],
        lineage_id: &str,
    ) -> Result<Vec<Dashboard>, LineageFailure> {
        let (Some(bi_type), Some(history)) = (request.bi_type, &self.query_history) else {
            return Ok(Vec::new());
        };

        let entries = history
            .fetch(bi_type, self.config.dashboards.query_history_limit)
            .await
            .map_err(at(RunStage::BuildingDependencies, lineage_id))?;
        tracing::debug!(lineage_id, bi_tool = %bi_type, entries = entries.len(), "fetched query history");

        let refs = dashboard_refs(with_parents(&request.objects, logics), &entries, bi_type);
        link_dashboards(builder, &refs, lineage_id, &request.organization_id)
            .map_err(at(RunStage::BuildingDependencies, lineage_id))
    }
}

fn with_parents<'a>(
    objects: &'a [SourceObject],
    logics: &'a [Option<Logic>],
) -> impl Iterator<Item = (&'a Logic, &'a [String])> {
    objects
        .iter()
        .zip(logics)
        .filter_map(|(object, logic)| Some((logic.as_ref()?, object.parent_relation_names.as_slice())))
}

fn collaborator_failure(stage: RunStage, lineage_id: &str, error: impl fmt::Display) -> LineageFailure {
    tracing::error!(lineage_id, stage = %stage, "{}", error);
    LineageFailure {
        stage,
        code: FailureCode::DownstreamCollaborator,
        message: error.to_string(),
        lineage_id: Some(lineage_id.to_string()),
    }
}
