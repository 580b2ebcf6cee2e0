//! Resolve schema expressions in changelog includes to the module and
//! resource that currently provide them.
//!
//! A changelog in one module can include a changelog owned by another module
//! by naming a schema expression (`orders;filter:=(version>=2)`) instead of a
//! path. The expression compiles to a filter over capability attributes; the
//! resolver then consults the including module's resolved wires and, failing
//! that, the whole module registry. Public items here form the contract used
//! by the `schema-resolve` binary and by hosts embedding the resolver.

pub mod attributes;
pub mod config;
pub mod error;
pub mod expression;
pub mod filter;
pub mod inclusion;
pub mod resolver;
pub mod runtime;
mod schema_loader;

pub use attributes::{ATTR_NAME, ATTR_RESOURCE, AttributeMap, AttributeValue, attribute_map};
pub use config::ResolverConfig;
pub use error::{ExpressionError, FilterError, InclusionError};
pub use expression::{CompiledFilter, SchemaExpression, compile};
pub use filter::Filter;
pub use inclusion::{
    ChangelogLoader, INCLUDE_EXTENSION, IncludeResolver, ResourceAccessor, schema_expression,
    supports,
};
pub use resolver::{RegistryMatches, ResolvedResource, resolve_via_registry, resolve_via_wiring};
pub use runtime::{
    Capability, Module, ModuleId, ModuleRuntime, ModuleState, RuntimeSnapshot, StateMask, Wire,
};

/// Capability namespace that advertises changelogs.
pub const SCHEMA_NAMESPACE: &str = "changelog.schema";

/// Split comma- or whitespace-delimited configuration lists into tokens.
pub fn split_list(value: &str) -> Vec<String> {
    value
        .replace(',', " ")
        .split_whitespace()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_list_accepts_commas_and_whitespace() {
        assert_eq!(
            split_list("resolved, active  starting"),
            ["resolved", "active", "starting"]
        );
        assert!(split_list(" , ").is_empty());
    }
}
