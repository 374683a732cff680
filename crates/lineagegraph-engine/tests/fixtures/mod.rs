//! Test fixtures for lineage run integration tests
//!
//! Parse trees are written in the parser's JSON shape, so the scenarios
//! exercise the same decoding path the CLI uses. The warehouse has two source
//! tables and a model built from them:
//!
//! - `db.sales.orders (id, customer_id, total)`
//! - `db.sales.customers (id, name)`
//! - `db.sales.order_totals` built by `ORDER_TOTALS_SQL`

#![allow(dead_code)]

use lineagegraph_core::ParsedTree;
use lineagegraph_engine::{RunRequest, SourceObject};
use lineagegraph_sql::ParsedDocument;
use lineagegraph_store::MockSqlParser;

pub const ORGANIZATION: &str = "org-1";

pub const ORDER_TOTALS_SQL: &str = "CREATE TABLE order_totals AS SELECT id, total FROM orders";

pub fn orders() -> SourceObject {
    SourceObject::table("db.sales.orders", &["id", "customer_id", "total"])
}

pub fn customers() -> SourceObject {
    SourceObject::table("db.sales.customers", &["id", "name"])
}

pub fn payments() -> SourceObject {
    SourceObject::table("db.sales.payments", &["id", "amount"])
}

/// Model built by `sql` from the two source tables
pub fn model(relation_name: &str, sql: &str) -> SourceObject {
    SourceObject::table(relation_name, &[])
        .with_sql(sql)
        .with_parents(&["db.sales.orders", "db.sales.customers"])
}

pub fn request(objects: Vec<SourceObject>) -> RunRequest {
    RunRequest::new(ORGANIZATION, objects)
}

fn select_elements(columns: &[&str]) -> String {
    let elements: Vec<String> = columns
        .iter()
        .map(|c| format!(r#"{{"select_clause_element": {{"column_reference": {{"identifier": "{c}"}}}}}}"#))
        .collect();

    format!("[{}]", elements.join(","))
}

/// `CREATE TABLE <target> AS SELECT <columns> FROM <table>` statement
pub fn create_table_as(target: &str, columns: &[&str], table: &str) -> String {
    format!(
        r#"{{"create_table_statement": {{
            "keyword": "CREATE",
            "table_reference": {{"identifier": "{target}"}},
            "select_statement": {{
                "select_clause": {select},
                "from_clause": {{
                    "keyword": "FROM",
                    "from_expression": [{{"from_expression_element": {{
                        "table_expression": {{"table_reference": {{"identifier": "{table}"}}}}
                    }}}}]
                }}
            }}
        }}}}"#,
        select = select_elements(columns),
    )
}

/// `CREATE TABLE <target> AS SELECT <alias>.<column> FROM (SELECT <column> FROM <table>) AS <alias>`
pub fn create_table_from_subquery(target: &str, column: &str, table: &str, alias: &str) -> String {
    format!(
        r#"{{"create_table_statement": {{
            "keyword": "CREATE",
            "table_reference": {{"identifier": "{target}"}},
            "select_statement": {{
                "select_clause": {{"select_clause_element": {{"column_reference": [
                    {{"identifier": "{alias}"}}, {{"dot": "."}}, {{"identifier": "{column}"}}
                ]}}}},
                "from_clause": {{"from_expression": {{"from_expression_element": {{
                    "table_expression": {{"bracketed": {{"select_statement": {{
                        "select_clause": {select},
                        "from_clause": {{"from_expression": {{"from_expression_element": {{
                            "table_expression": {{"table_reference": {{"identifier": "{table}"}}}}
                        }}}}}}
                    }}}}}},
                    "alias_expression": {{"keyword": "AS", "identifier": "{alias}"}}
                }}}}}}
            }}
        }}}}"#,
        select = select_elements(&[column]),
    )
}

/// File tree holding `statements` in order
pub fn file_tree(statements: &[String]) -> ParsedTree {
    let items: Vec<String> = statements
        .iter()
        .map(|s| format!(r#"{{"statement": {s}}}"#))
        .collect();

    ParsedDocument::from_json(&format!(r#"{{"file": [{}]}}"#, items.join(",")))
        .unwrap()
        .into_tree()
}

/// Parser that knows the order totals model
pub async fn parser() -> MockSqlParser {
    let parser = MockSqlParser::new();
    parser
        .add_tree(
            ORDER_TOTALS_SQL,
            file_tree(&[create_table_as("order_totals", &["id", "total"], "orders")]),
        )
        .await;
    parser
}

/// Sources and the order totals model
pub fn warehouse() -> Vec<SourceObject> {
    vec![
        orders(),
        customers(),
        model("db.sales.order_totals", ORDER_TOTALS_SQL),
    ]
}
