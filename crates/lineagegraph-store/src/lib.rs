//! Persistence and collaborator interfaces for lineage snapshots
//!
//! The engine talks to storage, the SQL parser and BI query history only
//! through the traits in this crate. In-memory and mock implementations are
//! provided for tests and for the file-backed CLI.
//!
//! ## Example
//!
//! ```rust,ignore
//! use lineagegraph_store::{InMemoryStore, LineageFilter, LineageStore};
//!
//! let store = InMemoryStore::new();
//! let latest = store.find_latest(&LineageFilter::completed("org-1")).await?;
//! ```

pub mod store;
pub mod collaborator;
pub mod memory;
pub mod mock;

pub use store::{
    ColumnStore, DashboardStore, DependencyFilter, DependencyStore, EntityFilter, LineageFilter,
    LineageStore, LogicStore, MaterializationStore, StoreError,
};
pub use collaborator::{BiType, QueryHistoryApi, QueryHistoryEntry, SqlParserApi};
pub use memory::{InMemoryStore, StoreOperation, StoreSnapshot};
pub use mock::{MockQueryHistory, MockSqlParser};
