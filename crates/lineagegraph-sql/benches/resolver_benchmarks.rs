//! Benchmarks for reference resolution
//!
//! Measures tree walking and table binding on generated wide statements.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use lineagegraph_core::ParsedTree;
use lineagegraph_sql::{ParsedDocument, RefResolver};

/// Generate a `CREATE TABLE ... AS SELECT` tree with N aliased columns over J joined tables
fn generate_wide_statement(num_columns: usize, num_joins: usize) -> String {
    let mut select_elements = Vec::new();

    for i in 0..num_columns {
        select_elements.push(format!(
            r#"{{"select_clause_element": {{
                "column_reference": [{{"identifier": "t{t}"}}, {{"dot": "."}}, {{"identifier": "col_{i}"}}],
                "alias_expression": {{"keyword": "AS", "identifier": "out_{i}"}}
            }}}}"#,
            t = i % (num_joins + 1),
            i = i,
        ));
    }

    let mut joins = Vec::new();
    for j in 1..=num_joins {
        joins.push(format!(
            r#"{{"join_clause": {{
                "keyword": "JOIN",
                "from_expression_element": {{
                    "table_expression": {{"table_reference": {{"identifier": "source_{j}"}}}},
                    "alias_expression": {{"identifier": "t{j}"}}
                }},
                "join_on_condition": {{"expression": [
                    {{"column_reference": [{{"identifier": "t0"}}, {{"dot": "."}}, {{"identifier": "id"}}]}},
                    {{"column_reference": [{{"identifier": "t{j}"}}, {{"dot": "."}}, {{"identifier": "id"}}]}}
                ]}}
            }}}}"#
        ));
    }

    format!(
        r#"{{"file": {{"statement": {{"create_table_statement": {{
            "table_reference": {{"identifier": "wide"}},
            "select_statement": {{
                "select_clause": [{select}],
                "from_clause": {{"from_expression": [
                    {{"from_expression_element": {{
                        "table_expression": {{"table_reference": {{"identifier": "source_0"}}}},
                        "alias_expression": {{"identifier": "t0"}}
                    }}}},
                    {joins}
                ]}}
            }}
        }}}}}}}}"#,
        select = select_elements.join(","),
        joins = joins.join(","),
    )
}

/// Benchmark: resolve statements of growing width
fn bench_resolve_wide_statement(c: &mut Criterion) {
    let mut group = c.benchmark_group("resolve_wide_statement");

    for num_columns in [10, 100, 1000].iter() {
        let doc = ParsedDocument::from_json(&generate_wide_statement(*num_columns, 5)).unwrap();
        let file: ParsedTree = doc.file().unwrap().clone();

        group.bench_with_input(
            BenchmarkId::from_parameter(num_columns),
            num_columns,
            |b, _| {
                b.iter(|| black_box(RefResolver::resolve_all(&file).unwrap()));
            },
        );
    }

    group.finish();
}

/// Benchmark: decode parser output JSON
fn bench_decode_document(c: &mut Criterion) {
    let json = generate_wide_statement(500, 5);

    c.bench_function("decode_document", |b| {
        b.iter(|| black_box(ParsedDocument::from_json(&json).unwrap()));
    });
}

criterion_group!(benches, bench_resolve_wide_statement, bench_decode_document);
criterion_main!(benches);
