//! Error taxonomy for expression compilation and changelog inclusion.
//!
//! Compilation errors are all-or-nothing and surface immediately. A wiring
//! lookup that finds nothing is not an error (it returns `None`); only the
//! inclusion layer turns "nothing found anywhere" into [`InclusionError`].

use crate::runtime::ModuleId;
use thiserror::Error;

/// Malformed filter text, with the byte offset where parsing stopped.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid filter at offset {position}: {reason}")]
pub struct FilterError {
    pub position: usize,
    pub reason: String,
}

impl FilterError {
    pub(crate) fn new(position: usize, reason: impl Into<String>) -> Self {
        Self {
            position,
            reason: reason.into(),
        }
    }
}

/// Syntax errors raised while compiling a schema expression.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExpressionError {
    #[error("schema expression must contain exactly one clause, found {0}")]
    ClauseCount(usize),
    #[error("attributes are not supported in a schema expression (found '{0}')")]
    AttributesNotSupported(String),
    #[error("only the 'filter' directive is supported in a schema expression (found '{0}')")]
    UnsupportedDirective(String),
    #[error("schema expression accepts at most one directive, found {0}")]
    TooManyDirectives(usize),
    #[error("malformed schema expression '{expression}': {reason}")]
    Malformed { expression: String, reason: String },
    #[error("schema expression contains an invalid filter '{filter}'")]
    InvalidFilter {
        filter: String,
        #[source]
        source: FilterError,
    },
}

/// Failures of the inclusion pipeline.
#[derive(Debug, Error)]
pub enum InclusionError {
    #[error(transparent)]
    Syntax(#[from] ExpressionError),
    #[error("'{0}' is not a schema include location")]
    UnsupportedLocation(String),
    #[error("could not find a resource starting from module {module} with schema expression '{expression}'")]
    Unresolved { module: ModuleId, expression: String },
    #[error("failed to load changelog '{resource}' from module {module}")]
    Load {
        module: ModuleId,
        resource: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync + 'static>,
    },
}
