//! lineagegraph engine - Lineage run pipeline
//!
//! This crate implements:
//! - Source objects and run requests
//! - Graph building (materializations, columns, dependency edges)
//! - Snapshot merging against the latest lineage
//! - Dashboard linking from BI query history
//! - The orchestrator that drives a run to a completed lineage

pub mod source;
pub mod graph_builder;
pub mod snapshot_merger;
pub mod dashboards;
pub mod orchestrator;

pub use source::{RunRequest, SourceObject};
pub use graph_builder::{
    BuildContext, BuildError, BuiltDependencies, BuiltEntities, ColumnCatalog, DependencySet,
    GraphBuilder,
};
pub use snapshot_merger::{latest_filter, merge_entities, MergeResult, PriorSnapshot, SnapshotDiff, SnapshotMerger};
pub use dashboards::{dashboard_refs, dashboard_url, link_dashboards, DashboardRef};
pub use orchestrator::{LineageFailure, LineageOrchestrator, LineageStores, RunStage};
