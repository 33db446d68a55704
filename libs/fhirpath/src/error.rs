//! Error types for the FHIRPath engine

use std::fmt;
use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// One syntax diagnostic with its source location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntaxIssue {
    pub line: usize,
    pub column: usize,
    pub message: String,
}

impl fmt::Display for SyntaxIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}, column {}: {}", self.line, self.column, self.message)
    }
}

/// Aggregated syntax diagnostics for one parse attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntaxReport {
    pub issues: Vec<SyntaxIssue>,
}

impl fmt::Display for SyntaxReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, issue) in self.issues.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{}", issue)?;
        }
        Ok(())
    }
}

/// FHIRPath compilation and evaluation errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("Syntax error: {0}")]
    Syntax(SyntaxReport),

    #[error("Function '{name}' does not accept {actual} argument(s)")]
    Arity { name: String, actual: usize },

    #[error("Type error: {0}")]
    Type(String),

    #[error("Expected a collection with at most one item: {0}")]
    Singleton(String),

    #[error("Invalid operation: {0}")]
    Domain(String),

    #[error("Unknown function: {0}")]
    UnknownFunction(String),

    #[error("Unknown environment variable: %{0}")]
    UnknownVariable(String),

    #[error("{0} requires asynchronous evaluation")]
    AsyncDisallowed(String),

    #[error("Evaluation cancelled")]
    Cancelled,
}
