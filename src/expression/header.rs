//! Manifest-header clause parsing.
//!
//! A header entry is a `;`-separated list of segments: one or more paths
//! first, then `key=value` attributes and `key:=value` directives. Every path
//! becomes its own clause sharing the same parameters, so `a;b` yields two
//! clauses. Separators inside double quotes are literal, and a path or value
//! wrapped in quotes is unquoted.

use crate::error::ExpressionError;
use pest::Parser;
use pest::error::InputLocation;
use pest::iterators::Pair;
use pest_derive::Parser;

#[derive(Parser)]
#[grammar = "expression/header.pest"]
struct HeaderParser;

/// A `key=value` attribute or `key:=value` directive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Parameter {
    pub key: String,
    pub value: String,
}

/// One path with the attributes and directives that followed it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Clause {
    pub name: String,
    pub attributes: Vec<Parameter>,
    pub directives: Vec<Parameter>,
}

/// Split a header entry into clauses.
///
/// Empty input yields no clauses; callers decide whether that is an error.
pub fn parse_clauses(text: &str) -> Result<Vec<Clause>, ExpressionError> {
    let pairs = HeaderParser::parse(Rule::header, text).map_err(|err| syntax_error(text, err))?;

    let mut paths = Vec::new();
    let mut attributes = Vec::new();
    let mut directives = Vec::new();
    for pair in pairs {
        match pair.as_rule() {
            Rule::path => {
                let segment = pair.as_str().trim();
                if !attributes.is_empty() || !directives.is_empty() {
                    return Err(malformed(
                        text,
                        format!("'{segment}' is neither an attribute nor a directive"),
                    ));
                }
                let name = unquote(segment);
                if name.trim().is_empty() {
                    return Err(malformed(text, "empty schema name"));
                }
                paths.push(name.to_string());
            }
            Rule::parameter => {
                let (is_directive, parameter) = build_parameter(text, pair)?;
                if paths.is_empty() {
                    return Err(malformed(text, "no schema name before attributes or directives"));
                }
                if is_directive {
                    directives.push(parameter);
                } else {
                    attributes.push(parameter);
                }
            }
            _ => {}
        }
    }

    Ok(paths
        .into_iter()
        .map(|name| Clause {
            name,
            attributes: attributes.clone(),
            directives: directives.clone(),
        })
        .collect())
}

fn build_parameter(text: &str, pair: Pair<'_, Rule>) -> Result<(bool, Parameter), ExpressionError> {
    let segment = pair.as_str().trim().to_string();
    let mut inner = pair.into_inner();
    let (Some(key), Some(assign), Some(argument)) = (inner.next(), inner.next(), inner.next())
    else {
        return Err(malformed(text, format!("'{segment}' is incomplete")));
    };
    let key = key.as_str().trim();
    if key.is_empty() {
        return Err(malformed(text, format!("'{segment}' has an empty key")));
    }
    let parameter = Parameter {
        key: key.to_string(),
        value: unquote(argument.as_str().trim()).to_string(),
    };
    Ok((assign.as_str() == ":=", parameter))
}

fn syntax_error(text: &str, err: pest::error::Error<Rule>) -> ExpressionError {
    let position = match err.location {
        InputLocation::Pos(pos) => pos,
        InputLocation::Span((start, _)) => start,
    };
    let reason = if text[position..].starts_with('"') {
        "unbalanced quotes".to_string()
    } else {
        let err = err.renamed_rules(|rule| match rule {
            Rule::parameter | Rule::key => "an attribute or directive".to_string(),
            Rule::path => "a schema name".to_string(),
            Rule::EOI => "end of expression".to_string(),
            other => format!("{other:?}"),
        });
        err.variant.message().into_owned()
    };
    malformed(text, format!("{reason} at offset {position}"))
}

fn unquote(value: &str) -> &str {
    if value.len() >= 2 && value.starts_with('"') && value.ends_with('"') {
        &value[1..value.len() - 1]
    } else {
        value
    }
}

fn malformed(text: &str, reason: impl Into<String>) -> ExpressionError {
    ExpressionError::Malformed {
        expression: text.to_string(),
        reason: reason.into(),
    }
}
