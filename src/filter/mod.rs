//! LDAP-style attribute filters.
//!
//! Filters follow the parenthesized prefix grammar used by module runtimes to
//! match requirements against capabilities: `(attr=value)`, `(&...)`,
//! `(|...)`, `(!...)`, plus `~=`, `>=`, `<=`, presence (`(attr=*)`) and
//! substring (`(attr=pre*mid*post)`) items. A parsed [`Filter`] is immutable
//! and evaluates without side effects, so one instance can be shared across
//! threads and reused for every candidate. Text nested deeper than
//! [`MAX_FILTER_DEPTH`] parentheses is rejected as malformed.

mod parser;

pub use parser::MAX_FILTER_DEPTH;

use crate::attributes::{AttributeMap, AttributeValue};
use crate::error::FilterError;
use std::fmt;
use std::str::FromStr;

/// Comparison operator of a simple filter item.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Comparison {
    Equal,
    Approx,
    GreaterEq,
    LessEq,
}

impl Comparison {
    fn as_str(self) -> &'static str {
        match self {
            Comparison::Equal => "=",
            Comparison::Approx => "~=",
            Comparison::GreaterEq => ">=",
            Comparison::LessEq => "<=",
        }
    }
}

/// Parsed filter tree.
#[derive(Clone, Debug, PartialEq)]
pub enum Filter {
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Not(Box<Filter>),
    Compare {
        attr: String,
        op: Comparison,
        value: String,
    },
    Present {
        attr: String,
    },
    Substring {
        attr: String,
        initial: Option<String>,
        any: Vec<String>,
        last: Option<String>,
    },
}

impl Filter {
    /// Parse filter text such as `(&(name=orders)(version>=2))`.
    pub fn parse(text: &str) -> Result<Self, FilterError> {
        parser::parse(text)
    }

    /// Exact equality on a string value, with no wildcard interpretation.
    pub fn equal(attr: impl Into<String>, value: impl Into<String>) -> Self {
        Filter::Compare {
            attr: attr.into(),
            op: Comparison::Equal,
            value: value.into(),
        }
    }

    /// Evaluate the filter against an attribute map.
    ///
    /// Attribute names are matched case-sensitively. A missing attribute never
    /// matches a comparison, and an operand that cannot be read as the
    /// attribute's type is a non-match rather than an error.
    pub fn matches(&self, attributes: &AttributeMap) -> bool {
        match self {
            Filter::And(children) => children.iter().all(|child| child.matches(attributes)),
            Filter::Or(children) => children.iter().any(|child| child.matches(attributes)),
            Filter::Not(child) => !child.matches(attributes),
            Filter::Compare { attr, op, value } => attributes
                .get(attr)
                .is_some_and(|actual| compare(actual, *op, value)),
            Filter::Present { attr } => attributes.contains_key(attr),
            Filter::Substring {
                attr,
                initial,
                any,
                last,
            } => attributes
                .get(attr)
                .is_some_and(|actual| substring(actual, initial.as_deref(), any, last.as_deref())),
        }
    }
}

impl FromStr for Filter {
    type Err = FilterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Filter::parse(s)
    }
}

fn compare(actual: &AttributeValue, op: Comparison, operand: &str) -> bool {
    match actual {
        AttributeValue::String(value) => match op {
            Comparison::Equal => value == operand,
            Comparison::Approx => approx_normalize(value) == approx_normalize(operand),
            Comparison::GreaterEq => value.as_str() >= operand,
            Comparison::LessEq => value.as_str() <= operand,
        },
        AttributeValue::Integer(value) => match operand.trim().parse::<i64>() {
            Ok(operand) => match op {
                Comparison::Equal | Comparison::Approx => *value == operand,
                Comparison::GreaterEq => *value >= operand,
                Comparison::LessEq => *value <= operand,
            },
            Err(_) => false,
        },
        AttributeValue::Float(value) => match operand.trim().parse::<f64>() {
            Ok(operand) => match op {
                Comparison::Equal | Comparison::Approx => *value == operand,
                Comparison::GreaterEq => *value >= operand,
                Comparison::LessEq => *value <= operand,
            },
            Err(_) => false,
        },
        // Any operand other than `true` reads as false, whatever the operator.
        AttributeValue::Boolean(value) => *value == operand.trim().eq_ignore_ascii_case("true"),
        AttributeValue::List(values) => values.iter().any(|value| compare(value, op, operand)),
    }
}

fn approx_normalize(value: &str) -> String {
    value
        .chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}

fn substring(
    actual: &AttributeValue,
    initial: Option<&str>,
    any: &[String],
    last: Option<&str>,
) -> bool {
    match actual {
        AttributeValue::String(value) => substring_str(value, initial, any, last),
        AttributeValue::List(values) => values
            .iter()
            .any(|value| substring(value, initial, any, last)),
        _ => false,
    }
}

fn substring_str(value: &str, initial: Option<&str>, any: &[String], last: Option<&str>) -> bool {
    let mut rest = value;
    if let Some(prefix) = initial {
        match rest.strip_prefix(prefix) {
            Some(tail) => rest = tail,
            None => return false,
        }
    }
    for part in any {
        match rest.find(part.as_str()) {
            Some(idx) => rest = &rest[idx + part.len()..],
            None => return false,
        }
    }
    match last {
        Some(suffix) => rest.ends_with(suffix),
        None => true,
    }
}

fn write_escaped(f: &mut fmt::Formatter<'_>, value: &str) -> fmt::Result {
    for c in value.chars() {
        if matches!(c, '\\' | '*' | '(' | ')') {
            f.write_str("\\")?;
        }
        write!(f, "{c}")?;
    }
    Ok(())
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Filter::And(children) | Filter::Or(children) => {
                let op = if matches!(self, Filter::And(_)) { '&' } else { '|' };
                write!(f, "({op}")?;
                for child in children {
                    write!(f, "{child}")?;
                }
                f.write_str(")")
            }
            Filter::Not(child) => write!(f, "(!{child})"),
            Filter::Compare { attr, op, value } => {
                write!(f, "({attr}{}", op.as_str())?;
                write_escaped(f, value)?;
                f.write_str(")")
            }
            Filter::Present { attr } => write!(f, "({attr}=*)"),
            Filter::Substring {
                attr,
                initial,
                any,
                last,
            } => {
                write!(f, "({attr}=")?;
                if let Some(initial) = initial {
                    write_escaped(f, initial)?;
                }
                f.write_str("*")?;
                for part in any {
                    write_escaped(f, part)?;
                    f.write_str("*")?;
                }
                if let Some(last) = last {
                    write_escaped(f, last)?;
                }
                f.write_str(")")
            }
        }
    }
}
