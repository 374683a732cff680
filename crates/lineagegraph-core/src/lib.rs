//! lineagegraph core
//!
//! Domain model shared by every crate: the parse tree, the reference types the
//! resolver emits, graph entities and the run report.
//! Never rename failure codes - they are part of the public API.

pub mod element;
pub mod tree;
pub mod refs;
pub mod entities;
pub mod diagnostic;
pub mod report;
pub mod config;

pub use tree::ParsedTree;
pub use refs::{RefPath, DependencyType, Qualifiers, TableRef, ColumnRef, StatementRefs};
pub use entities::{
    new_id, Column, Dashboard, Dependency, DependencyKey, Lineage, LineageStateError, Logic,
    Materialization, MaterializationKind,
};
pub use diagnostic::{Diagnostic, FailureCode, Severity};
pub use report::{ReportVersion, RunReport, RunSummary};
pub use config::{
    Config, ConfigError, ConcurrencyConfig, DashboardConfig, DialectConfig, OnUnresolved,
    ResolutionPolicy, SnapshotConfig,
};
