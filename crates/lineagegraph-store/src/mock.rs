//! Mock collaborators for testing
//!
//! These return predefined results without calling any external service.
//! They are useful for:
//! - Unit and integration testing of the orchestrator
//! - Running the CLI on pre-parsed trees
//! - Simulating collaborator failures
//!
//! ## Usage
//!
//! ```rust,ignore
//! use lineagegraph_store::{MockSqlParser, SqlParserApi};
//!
//! let parser = MockSqlParser::new();
//! parser.add_tree("SELECT x FROM b", tree).await;
//!
//! let parsed = parser.parse("SELECT x FROM b", DialectConfig::Snowflake).await?;
//! ```

use crate::collaborator::{BiType, QueryHistoryApi, QueryHistoryEntry, SqlParserApi};
use crate::store::StoreError;
use lineagegraph_core::{DialectConfig, ParsedTree};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Mock SQL parser returning predefined trees keyed by SQL text
pub struct MockSqlParser {
    /// Trees by exact SQL text
    trees: Arc<RwLock<HashMap<String, ParsedTree>>>,

    /// Errors to return for specific SQL texts
    errors: Arc<RwLock<HashMap<String, StoreError>>>,

    /// Simulate parser latency (milliseconds)
    latency_ms: u64,
}

impl MockSqlParser {
    /// Create a parser that knows no SQL
    pub fn new() -> Self {
        Self::from_trees(HashMap::new())
    }

    /// Create a parser from a pre-built map of trees
    pub fn from_trees(trees: HashMap<String, ParsedTree>) -> Self {
        Self {
            trees: Arc::new(RwLock::new(trees)),
            errors: Arc::new(RwLock::new(HashMap::new())),
            latency_ms: 0,
        }
    }

    /// Return `tree` whenever `sql` is parsed
    pub async fn add_tree(&self, sql: impl Into<String>, tree: ParsedTree) {
        self.trees.write().await.insert(sql.into(), tree);
    }

    /// Return `error` whenever `sql` is parsed
    pub async fn add_error_for_sql(&self, sql: impl Into<String>, error: StoreError) {
        self.errors.write().await.insert(sql.into(), error);
    }

    /// Configure simulated latency for every parse
    pub fn with_latency(mut self, latency_ms: u64) -> Self {
        self.latency_ms = latency_ms;
        self
    }

    pub async fn tree_count(&self) -> usize {
        self.trees.read().await.len()
    }
}

impl Default for MockSqlParser {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for MockSqlParser {
    fn clone(&self) -> Self {
        Self {
            trees: Arc::clone(&self.trees),
            errors: Arc::clone(&self.errors),
            latency_ms: self.latency_ms,
        }
    }
}

#[async_trait::async_trait]
impl SqlParserApi for MockSqlParser {
    async fn parse(&self, sql: &str, _dialect: DialectConfig) -> Result<ParsedTree, StoreError> {
        if self.latency_ms > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(self.latency_ms)).await;
        }

        if let Some(error) = self.errors.read().await.get(sql) {
            return Err(error.clone());
        }

        self.trees
            .read()
            .await
            .get(sql)
            .cloned()
            .ok_or_else(|| StoreError::QueryError(format!("no parse tree for SQL: {sql}")))
    }
}

/// Mock query history returning predefined entries per BI tool
pub struct MockQueryHistory {
    entries: Arc<RwLock<HashMap<BiType, Vec<QueryHistoryEntry>>>>,

    /// Simulate an unreachable history service
    fail_fetch: bool,
}

impl MockQueryHistory {
    pub fn new() -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            fail_fetch: false,
        }
    }

    /// Record a query issued by `bi_type`
    pub async fn add_entry(&self, bi_type: BiType, query_text: impl Into<String>) {
        self.entries
            .write()
            .await
            .entry(bi_type)
            .or_default()
            .push(QueryHistoryEntry {
                query_text: query_text.into(),
                query_tag: Some(bi_type.as_str().to_lowercase()),
            });
    }

    /// Configure every fetch to fail
    pub fn with_fetch_failure(mut self) -> Self {
        self.fail_fetch = true;
        self
    }
}

impl Default for MockQueryHistory {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for MockQueryHistory {
    fn clone(&self) -> Self {
        Self {
            entries: Arc::clone(&self.entries),
            fail_fetch: self.fail_fetch,
        }
    }
}

#[async_trait::async_trait]
impl QueryHistoryApi for MockQueryHistory {
    async fn fetch(&self, bi_type: BiType, limit: usize) -> Result<Vec<QueryHistoryEntry>, StoreError> {
        if self.fail_fetch {
            return Err(StoreError::Unavailable(
                "Simulated query history failure".to_string(),
            ));
        }

        let entries = self.entries.read().await;
        Ok(entries
            .get(&bi_type)
            .map(|e| e.iter().take(limit).cloned().collect())
            .unwrap_or_default())
    }
}
