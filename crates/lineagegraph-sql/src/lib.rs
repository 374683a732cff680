//! SQL reference resolution
//!
//! This crate handles:
//! - Decoding the external parser's JSON tree into statements
//! - Classifying table, column and wildcard references by tree path
//! - Splitting dotted qualifier chains
//! - Binding unqualified columns to their tables
//! - Building the `Logic` of a source object

pub mod parser;
pub mod qualifier;
pub mod resolver;
pub mod binder;

pub use parser::{ParsedDocument, TreeError};
pub use resolver::{RefResolver, ResolveError};
pub use binder::{DerivedTable, TableBinder};
