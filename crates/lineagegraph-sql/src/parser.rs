//! Decoding of the external parser's output
//!
//! The SQL parser runs outside this workspace and hands back a JSON tree of the
//! form `{"file": ...}`. This module turns that JSON into a [`ParsedDocument`]
//! and locates the statements inside it.

use lineagegraph_core::element::{FILE, STATEMENT};
use lineagegraph_core::{FailureCode, ParsedTree};

/// Parser output for one SQL source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedDocument {
    tree: ParsedTree,
}

impl ParsedDocument {
    /// Decode parser output JSON
    pub fn from_json(json: &str) -> Result<Self, TreeError> {
        let tree: ParsedTree = serde_json::from_str(json)
            .map_err(|e| TreeError::InvalidJson(e.to_string()))?;

        Ok(Self { tree })
    }

    /// Wrap a tree that was already decoded
    pub fn from_tree(tree: ParsedTree) -> Self {
        Self { tree }
    }

    /// Read and decode a parser output file
    pub fn from_file(path: &std::path::Path) -> Result<Self, TreeError> {
        let json = std::fs::read_to_string(path)
            .map_err(|e| TreeError::Io(format!("{}: {}", path.display(), e)))?;

        Self::from_json(&json)
    }

    pub fn tree(&self) -> &ParsedTree {
        &self.tree
    }

    pub fn into_tree(self) -> ParsedTree {
        self.tree
    }

    /// The `file` element holding the statements
    pub fn file(&self) -> Result<&ParsedTree, TreeError> {
        self.tree.get(FILE).ok_or(TreeError::MissingElement(FILE))
    }

    /// Statement subtrees in source order
    pub fn statements(&self) -> Result<Vec<&ParsedTree>, TreeError> {
        Ok(statements(self.file()?))
    }
}

/// Statement subtrees of a file tree, in source order
///
/// A file is either a map carrying a `statement` key or a list of maps;
/// list elements without a `statement` key (separators, comments) are skipped.
pub fn statements(file: &ParsedTree) -> Vec<&ParsedTree> {
    match file {
        ParsedTree::Map(_) => file.get(STATEMENT).into_iter().collect(),
        ParsedTree::List(items) => items.iter().filter_map(|item| item.get(STATEMENT)).collect(),
        ParsedTree::Leaf(_) => Vec::new(),
    }
}

/// Errors decoding parser output
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TreeError {
    #[error("Invalid parse tree JSON: {0}")]
    InvalidJson(String),

    #[error("Parse tree has no '{0}' element")]
    MissingElement(&'static str),

    #[error("IO error: {0}")]
    Io(String),
}

impl TreeError {
    pub fn code(&self) -> FailureCode {
        FailureCode::InvalidTree
    }
}
