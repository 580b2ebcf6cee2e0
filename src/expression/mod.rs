//! Schema expressions and their compiled filters.
//!
//! An include names the changelog it wants as `<name>[;filter:=<filter>]`.
//! Compiling the expression yields a [`CompiledFilter`] that requires the
//! capability's `name` attribute to equal the schema name and, when present,
//! the directive's filter to hold as well.

pub mod header;

use crate::attributes::{ATTR_NAME, AttributeMap};
use crate::error::ExpressionError;
use crate::filter::Filter;
use header::parse_clauses;
use std::fmt;
use std::str::FromStr;

/// The only directive a schema expression accepts.
pub const FILTER_DIRECTIVE: &str = "filter";

/// A parsed schema expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaExpression {
    name: String,
    filter: Option<String>,
}

impl SchemaExpression {
    /// Parse and validate the expression structure.
    ///
    /// The filter text is kept raw here; [`SchemaExpression::compile`] parses
    /// it.
    pub fn parse(text: &str) -> Result<Self, ExpressionError> {
        let mut clauses = parse_clauses(text)?;
        if clauses.len() != 1 {
            return Err(ExpressionError::ClauseCount(clauses.len()));
        }
        let clause = clauses.remove(0);

        if let Some(attribute) = clause.attributes.first() {
            return Err(ExpressionError::AttributesNotSupported(format!(
                "{}={}",
                attribute.key, attribute.value
            )));
        }
        if let Some(directive) = clause
            .directives
            .iter()
            .find(|directive| directive.key != FILTER_DIRECTIVE)
        {
            return Err(ExpressionError::UnsupportedDirective(directive.key.clone()));
        }
        if clause.directives.len() > 1 {
            return Err(ExpressionError::TooManyDirectives(clause.directives.len()));
        }

        let filter = clause
            .directives
            .into_iter()
            .next()
            .map(|directive| directive.value)
            .filter(|value| !value.trim().is_empty());
        Ok(Self {
            name: clause.name,
            filter,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Raw text of the `filter` directive, if one was given.
    pub fn filter_text(&self) -> Option<&str> {
        self.filter.as_deref()
    }

    pub fn compile(&self) -> Result<CompiledFilter, ExpressionError> {
        let name_term = Filter::equal(ATTR_NAME, self.name.as_str());
        let filter = match &self.filter {
            Some(text) => {
                let extra =
                    Filter::parse(text).map_err(|source| ExpressionError::InvalidFilter {
                        filter: text.clone(),
                        source,
                    })?;
                Filter::And(vec![name_term, extra])
            }
            None => name_term,
        };
        Ok(CompiledFilter {
            schema_name: self.name.clone(),
            filter,
        })
    }
}

impl FromStr for SchemaExpression {
    type Err = ExpressionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SchemaExpression::parse(s)
    }
}

impl fmt::Display for SchemaExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)?;
        if let Some(filter) = &self.filter {
            write!(f, ";{FILTER_DIRECTIVE}:={filter}")?;
        }
        Ok(())
    }
}

/// Parse and compile a schema expression in one step.
pub fn compile(text: &str) -> Result<CompiledFilter, ExpressionError> {
    SchemaExpression::parse(text)?.compile()
}

/// Predicate produced from a schema expression.
///
/// Immutable and side-effect free; share it freely between threads and
/// evaluate it as often as needed.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledFilter {
    schema_name: String,
    filter: Filter,
}

impl CompiledFilter {
    pub fn matches(&self, attributes: &AttributeMap) -> bool {
        self.filter.matches(attributes)
    }

    pub fn schema_name(&self) -> &str {
        &self.schema_name
    }

    pub fn filter(&self) -> &Filter {
        &self.filter
    }
}

impl fmt::Display for CompiledFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.filter)
    }
}
