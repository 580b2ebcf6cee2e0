use super::{Comparison, Filter};
use crate::error::FilterError;
use pest::Parser;
use pest::error::InputLocation;
use pest::iterators::Pair;
use pest_derive::Parser;

/// Deepest `(`-nesting accepted before the text reaches the grammar.
pub const MAX_FILTER_DEPTH: usize = 64;

#[derive(Parser)]
#[grammar = "filter/filter.pest"]
struct FilterParser;

pub(super) fn parse(text: &str) -> Result<Filter, FilterError> {
    if text.trim().is_empty() {
        return Err(FilterError::new(0, "empty filter"));
    }
    check_depth(text)?;

    let mut pairs = FilterParser::parse(Rule::filter_text, text).map_err(syntax_error)?;
    let root = pairs
        .next()
        .ok_or_else(|| FilterError::new(0, "empty filter"))?;
    build_filter(root)
}

/// Rejects nesting the recursive grammar could not finish on a normal stack.
/// Escaped parentheses belong to values and are not counted.
fn check_depth(text: &str) -> Result<(), FilterError> {
    let mut depth = 0usize;
    let mut escaped = false;
    for (offset, c) in text.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' => escaped = true,
            '(' => {
                depth += 1;
                if depth > MAX_FILTER_DEPTH {
                    return Err(FilterError::new(offset, "filter nested too deeply"));
                }
            }
            ')' => depth = depth.saturating_sub(1),
            _ => {}
        }
    }
    Ok(())
}

fn syntax_error(err: pest::error::Error<Rule>) -> FilterError {
    let position = match err.location {
        InputLocation::Pos(pos) => pos,
        InputLocation::Span((start, _)) => start,
    };
    let err = err.renamed_rules(describe_rule);
    FilterError::new(position, err.variant.message().into_owned())
}

fn describe_rule(rule: &Rule) -> String {
    match rule {
        Rule::filter | Rule::lparen => "'('".to_string(),
        Rule::rparen => "')'".to_string(),
        Rule::and | Rule::or | Rule::not | Rule::item => "a filter item".to_string(),
        Rule::attr => "an attribute name".to_string(),
        Rule::operator => "one of '=', '~=', '>=', '<='".to_string(),
        Rule::value | Rule::escaped | Rule::star | Rule::chunk => "a value".to_string(),
        Rule::EOI => "end of filter".to_string(),
        other => format!("{other:?}"),
    }
}

fn build_filter(pair: Pair<'_, Rule>) -> Result<Filter, FilterError> {
    let position = pair.as_span().start();
    let body = pair
        .into_inner()
        .find(|inner| !matches!(inner.as_rule(), Rule::lparen | Rule::rparen))
        .ok_or_else(|| FilterError::new(position, "empty filter component"))?;

    match body.as_rule() {
        Rule::and => Ok(Filter::And(build_children(body)?)),
        Rule::or => Ok(Filter::Or(build_children(body)?)),
        Rule::not => {
            let position = body.as_span().start();
            let operand = body
                .into_inner()
                .next()
                .ok_or_else(|| FilterError::new(position, "'!' needs an operand"))?;
            Ok(Filter::Not(Box::new(build_filter(operand)?)))
        }
        Rule::item => build_item(body),
        rule => Err(FilterError::new(
            body.as_span().start(),
            format!("unexpected {rule:?} in filter"),
        )),
    }
}

fn build_children(pair: Pair<'_, Rule>) -> Result<Vec<Filter>, FilterError> {
    pair.into_inner().map(build_filter).collect()
}

fn build_item(pair: Pair<'_, Rule>) -> Result<Filter, FilterError> {
    let position = pair.as_span().start();
    let mut inner = pair.into_inner();
    let (Some(attr), Some(operator), Some(value)) = (inner.next(), inner.next(), inner.next())
    else {
        return Err(FilterError::new(position, "incomplete filter item"));
    };

    let attr = attr.as_str().trim().to_string();
    let op = match operator.as_str() {
        "=" => Comparison::Equal,
        "~=" => Comparison::Approx,
        ">=" => Comparison::GreaterEq,
        "<=" => Comparison::LessEq,
        other => {
            return Err(FilterError::new(
                operator.as_span().start(),
                format!("invalid operator '{other}'"),
            ));
        }
    };

    let value_start = value.as_span().start();
    let parts = value_parts(value);
    if parts.len() == 1 {
        let value = parts.into_iter().next().unwrap_or_default();
        return Ok(Filter::Compare { attr, op, value });
    }
    if op != Comparison::Equal {
        return Err(FilterError::new(
            value_start,
            "wildcards are only allowed with '='",
        ));
    }
    if parts.len() == 2 && parts.iter().all(String::is_empty) {
        return Ok(Filter::Present { attr });
    }

    let mut parts = parts.into_iter();
    let initial = parts.next().filter(|part| !part.is_empty());
    let mut rest: Vec<String> = parts.collect();
    let last = rest.pop().filter(|part| !part.is_empty());
    let any = rest.into_iter().filter(|part| !part.is_empty()).collect();
    Ok(Filter::Substring {
        attr,
        initial,
        any,
        last,
    })
}

/// Splits a value on unescaped `*`, resolving escapes.
fn value_parts(value: Pair<'_, Rule>) -> Vec<String> {
    let mut parts = vec![String::new()];
    for piece in value.into_inner() {
        match piece.as_rule() {
            Rule::star => parts.push(String::new()),
            rule => {
                let text = piece.as_str();
                let text = if rule == Rule::escaped { &text[1..] } else { text };
                if let Some(current) = parts.last_mut() {
                    current.push_str(text);
                }
            }
        }
    }
    parts
}

#[cfg(test)]
mod tests {
    use super::*;

    fn err(text: &str) -> FilterError {
        parse(text).expect_err(text)
    }

    fn nested_not(depth: usize) -> String {
        format!("{}(a=1){}", "(!".repeat(depth), ")".repeat(depth))
    }

    #[test]
    fn parses_nested_composites() {
        let filter = parse(" (& (name=orders) (| (version=1) (!(version=2)) ) ) ").unwrap();
        let Filter::And(children) = filter else {
            panic!("expected and");
        };
        assert_eq!(children.len(), 2);
        assert_eq!(children[0], Filter::equal("name", "orders"));
        assert!(matches!(&children[1], Filter::Or(inner) if inner.len() == 2));
    }

    #[test]
    fn attribute_whitespace_is_trimmed_but_value_kept() {
        let filter = parse("( name =orders )").unwrap();
        assert_eq!(filter, Filter::equal("name", "orders "));
    }

    #[test]
    fn presence_and_substring_are_distinguished() {
        assert_eq!(
            parse("(resource=*)").unwrap(),
            Filter::Present {
                attr: "resource".into()
            }
        );
        assert_eq!(
            parse("(resource=*.xml)").unwrap(),
            Filter::Substring {
                attr: "resource".into(),
                initial: None,
                any: Vec::new(),
                last: Some(".xml".into()),
            }
        );
    }

    #[test]
    fn escapes_are_resolved_in_values() {
        assert_eq!(
            parse(r"(note=a\(b\)\*c\\)").unwrap(),
            Filter::equal("note", r"a(b)*c\")
        );
    }

    #[test]
    fn empty_composites_are_accepted() {
        assert_eq!(parse("(&)").unwrap(), Filter::And(Vec::new()));
        assert_eq!(parse("( | )").unwrap(), Filter::Or(Vec::new()));
    }

    #[test]
    fn rejects_malformed_text() {
        assert_eq!(err("").reason, "empty filter");
        assert_eq!(err("   ").position, 0);
        assert_eq!(err("name=orders").position, 0);
        assert_eq!(err("(version>=1*)").reason, "wildcards are only allowed with '='");
        assert_eq!(err("(version>=1*)").position, 10);
        for text in [
            "(name=orders",
            "(=orders)",
            "(name>orders)",
            "(name=or(ders)",
            "(name=orders))",
            "(name=orders\\",
            "(&(name=orders)x)",
            "(!name=orders)",
            "(!(a=1)(b=2))",
        ] {
            assert!(parse(text).is_err(), "{text} should not parse");
        }
    }

    #[test]
    fn error_positions_point_into_the_text() {
        let e = err("(&(name=orders)x)");
        assert!(e.position >= 15 && e.position <= 16, "position {}", e.position);
        assert!(!e.reason.is_empty());
    }

    #[test]
    fn nesting_depth_is_bounded() {
        assert!(parse(&nested_not(MAX_FILTER_DEPTH - 1)).is_ok());

        let e = err(&nested_not(MAX_FILTER_DEPTH));
        assert_eq!(e.reason, "filter nested too deeply");
        assert_eq!(e.position, 2 * MAX_FILTER_DEPTH);

        let e = err(&nested_not(200_000));
        assert_eq!(e.reason, "filter nested too deeply");
    }

    #[test]
    fn escaped_parentheses_do_not_count_toward_depth() {
        let value = "\\(".repeat(MAX_FILTER_DEPTH * 2);
        assert!(parse(&format!("(note={value})")).is_ok());
    }
}
