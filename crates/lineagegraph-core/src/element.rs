//! Parse tree vocabulary
//!
//! Literal key names produced by the external SQL parser. The resolver
//! pattern-matches on these names and on sequences of them, so changing the
//! parser's vocabulary means changing this module and the resolver rules.

pub const FILE: &str = "file";

pub const STATEMENT: &str = "statement";
pub const CREATE_TABLE_STATEMENT: &str = "create_table_statement";
pub const INSERT_STATEMENT: &str = "insert_statement";
pub const SELECT_STATEMENT: &str = "select_statement";
pub const WITH_COMPOUND_STATEMENT: &str = "with_compound_statement";
pub const COMMON_TABLE_EXPRESSION: &str = "common_table_expression";

pub const SELECT_CLAUSE_ELEMENT: &str = "select_clause_element";
pub const FROM_EXPRESSION_ELEMENT: &str = "from_expression_element";

pub const TABLE_REFERENCE: &str = "table_reference";
pub const COLUMN_REFERENCE: &str = "column_reference";
pub const COLUMN_DEFINITION: &str = "column_definition";

pub const ALIAS_EXPRESSION: &str = "alias_expression";
pub const IDENTIFIER: &str = "identifier";

pub const WILDCARD_EXPRESSION: &str = "wildcard_expression";
pub const WILDCARD_IDENTIFIER: &str = "wildcard_identifier";
pub const DOT: &str = "dot";
pub const STAR: &str = "star";

pub const FUNCTION: &str = "function";
pub const BRACKETED: &str = "bracketed";
pub const EXPRESSION: &str = "expression";

pub const KEYWORD: &str = "keyword";
pub const KEYWORD_AS: &str = "as";
