//! Run requests and the source objects they list

use lineagegraph_core::MaterializationKind;
use lineagegraph_store::BiType;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// A warehouse object to place in the lineage graph
///
/// Objects with SQL are parsed and resolved. Objects without SQL are
/// warehouse sources and contribute their declared columns only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceObject {
    /// Fully qualified name (`db.schema.name`)
    pub relation_name: String,

    #[serde(default)]
    pub kind: MaterializationKind,

    pub name: String,

    pub schema_name: String,

    pub database_name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sql: Option<String>,

    /// Columns known from the warehouse catalog, in ordinal order
    #[serde(default)]
    pub columns: Vec<String>,

    /// Relations this object reads from
    #[serde(default)]
    pub parent_relation_names: Vec<String>,
}

impl SourceObject {
    /// Warehouse source with declared columns and no SQL
    pub fn table(relation_name: &str, columns: &[&str]) -> Self {
        let mut parts = relation_name.rsplit('.');
        let name = parts.next().unwrap_or_default().to_string();
        let schema_name = parts.next().unwrap_or_default().to_string();
        let database_name = parts.next().unwrap_or_default().to_string();

        Self {
            relation_name: relation_name.to_string(),
            kind: MaterializationKind::Table,
            name,
            schema_name,
            database_name,
            sql: None,
            columns: columns.iter().map(|c| c.to_string()).collect(),
            parent_relation_names: Vec::new(),
        }
    }

    /// Object built from `sql`
    pub fn with_sql(mut self, sql: impl Into<String>) -> Self {
        self.sql = Some(sql.into());
        self
    }

    pub fn with_parents(mut self, parent_relation_names: &[&str]) -> Self {
        self.parent_relation_names = parent_relation_names.iter().map(|p| p.to_string()).collect();
        self
    }
}

/// Input of one lineage run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunRequest {
    pub organization_id: String,

    /// BI tool whose query history links dashboards to columns
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bi_type: Option<BiType>,

    pub objects: Vec<SourceObject>,
}

impl RunRequest {
    pub fn new(organization_id: impl Into<String>, objects: Vec<SourceObject>) -> Self {
        Self {
            organization_id: organization_id.into(),
            bi_type: None,
            objects,
        }
    }

    /// Check the request is internally consistent
    pub fn validate(&self) -> Result<(), String> {
        if self.organization_id.is_empty() {
            return Err("organization id is empty".to_string());
        }

        let mut seen = HashSet::new();
        for object in &self.objects {
            if object.relation_name.is_empty() || object.name.is_empty() {
                return Err("source object without a name".to_string());
            }
            if !seen.insert(object.relation_name.to_lowercase()) {
                return Err(format!("relation '{}' listed twice", object.relation_name));
            }
        }

        Ok(())
    }
}
