//! External services the engine calls: the SQL parser and BI query history

use crate::store::StoreError;
use lineagegraph_core::{DialectConfig, ParsedTree};
use serde::{Deserialize, Serialize};
use std::fmt;

/// BI tools whose warehouse queries can be traced to dashboards
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BiType {
    Mode,
    Tableau,
    Metabase,
}

impl BiType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mode => "Mode",
            Self::Tableau => "Tableau",
            Self::Metabase => "Metabase",
        }
    }
}

impl fmt::Display for BiType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for BiType {
    type Err = String;

    /// Case-insensitive tool name
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        [Self::Mode, Self::Tableau, Self::Metabase]
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("Unknown BI tool: {s}"))
    }
}

/// One warehouse query issued by a BI tool
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryHistoryEntry {
    pub query_text: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query_tag: Option<String>,
}

/// The external SQL parser
#[async_trait::async_trait]
pub trait SqlParserApi: Send + Sync {
    /// Parse SQL text into the parser's tree, rooted at `file`
    async fn parse(&self, sql: &str, dialect: DialectConfig) -> Result<ParsedTree, StoreError>;
}

/// Recent warehouse queries by BI tool
#[async_trait::async_trait]
pub trait QueryHistoryApi: Send + Sync {
    async fn fetch(&self, bi_type: BiType, limit: usize) -> Result<Vec<QueryHistoryEntry>, StoreError>;
}
