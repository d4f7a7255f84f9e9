//! Query resolution and compilation
//!
//! A query arrives either as a literal XPath expression or as the path of a
//! file holding one. Queries always run against a single tree's root element,
//! so absolute expressions are rewritten to start from the context node.

use crate::ast::Expr;
use crate::eval::{EvalError, Value, evaluate};
use crate::parser::{QueryError, parse_xpath};
use crate::tree::Tree;
use std::io;
use std::path::PathBuf;

/// Where the query text comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuerySource {
    Literal(String),
    File(PathBuf),
}

impl QuerySource {
    /// A file if `arg` names an existing regular file, otherwise the literal
    pub fn from_arg(arg: &str) -> Self {
        let path = PathBuf::from(arg);
        if path.is_file() {
            Self::File(path)
        } else {
            Self::Literal(arg.to_string())
        }
    }

    /// Query text, with surrounding whitespace removed from file contents
    pub fn resolve(&self) -> io::Result<String> {
        match self {
            Self::Literal(text) => Ok(text.clone()),
            Self::File(path) => Ok(std::fs::read_to_string(path)?.trim().to_string()),
        }
    }
}

/// Make an absolute expression relative to the context node
///
/// `//node[@rel="su"]` becomes `.//node[@rel="su"]`; relative expressions
/// are only trimmed.
pub fn scope_to_node(text: &str) -> String {
    let text = text.trim();
    if text.starts_with('/') {
        format!(".{text}")
    } else {
        text.to_string()
    }
}

/// A compiled XPath query
#[derive(Debug, Clone)]
pub struct Query {
    text: String,
    expr: Expr,
}

impl Query {
    /// Parse `text` as written
    pub fn compile(text: &str) -> Result<Self, QueryError> {
        Ok(Self {
            text: text.to_string(),
            expr: parse_xpath(text)?,
        })
    }

    /// Scope `text` to the context node, then parse it
    pub fn scoped(text: &str) -> Result<Self, QueryError> {
        Self::compile(&scope_to_node(text))
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn expr(&self) -> &Expr {
        &self.expr
    }

    /// Evaluate against the tree's root element
    ///
    /// A tree without a root element yields an empty node-set.
    pub fn evaluate(&self, tree: &Tree) -> Result<Value, EvalError> {
        match tree.root() {
            Some(root) => evaluate(&self.expr, tree, root),
            None => Ok(Value::Nodes(Vec::new())),
        }
    }

    /// Effective boolean value of the query on `tree`
    pub fn matches(&self, tree: &Tree) -> Result<bool, EvalError> {
        Ok(self.evaluate(tree)?.to_boolean())
    }
}
