//! Changelog inclusion through schema expressions.
//!
//! An include location ending in [`INCLUDE_EXTENSION`] names a schema
//! expression instead of a file. [`IncludeResolver`] resolves it against the
//! including module, first through that module's wires, then (when enabled)
//! through the registry, and hands the chosen resource to a
//! [`ChangelogLoader`] scoped to the providing module.

use crate::attributes::AttributeMap;
use crate::config::ResolverConfig;
use crate::error::InclusionError;
use crate::expression::compile;
use crate::resolver::{ResolvedResource, resolve_via_registry, resolve_via_wiring};
use crate::runtime::{ModuleId, ModuleRuntime};
use tracing::debug;

/// Suffix marking an include location as a schema expression.
pub const INCLUDE_EXTENSION: &str = ".schema";

/// Returns true when `location` should be resolved as a schema expression.
pub fn supports(location: &str) -> bool {
    location.ends_with(INCLUDE_EXTENSION)
}

/// Strip the include extension, leaving the schema expression.
pub fn schema_expression(location: &str) -> Option<&str> {
    location.strip_suffix(INCLUDE_EXTENSION)
}

/// Opens resources inside one module.
///
/// Attributes normally come from the capability that was matched when the
/// changelog was located; they are fixed once the accessor is built.
#[derive(Clone, Debug, PartialEq)]
pub struct ResourceAccessor {
    module: ModuleId,
    attributes: AttributeMap,
}

impl ResourceAccessor {
    pub fn new(module: ModuleId) -> Self {
        Self::with_attributes(module, AttributeMap::new())
    }

    pub fn with_attributes(module: ModuleId, attributes: AttributeMap) -> Self {
        Self { module, attributes }
    }

    pub fn module(&self) -> ModuleId {
        self.module
    }

    pub fn attributes(&self) -> &AttributeMap {
        &self.attributes
    }
}

/// Parses and applies a changelog found inside a module.
pub trait ChangelogLoader {
    type Changelog;

    fn load(&self, resource: &str, accessor: &ResourceAccessor) -> anyhow::Result<Self::Changelog>;
}

/// Resolves schema-expression includes against a module runtime.
pub struct IncludeResolver<'r, R: ?Sized> {
    runtime: &'r R,
    config: ResolverConfig,
}

impl<'r, R> IncludeResolver<'r, R>
where
    R: ModuleRuntime + ?Sized,
{
    pub fn new(runtime: &'r R, config: ResolverConfig) -> Self {
        Self { runtime, config }
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    /// Resolve `expression` on behalf of `including`.
    ///
    /// Wiring first; when nothing is wired and the registry fallback is on,
    /// the first registry match in module-id order wins and any further
    /// matches are ignored.
    pub fn resolve(
        &self,
        expression: &str,
        including: ModuleId,
    ) -> Result<ResolvedResource, InclusionError> {
        let filter = compile(expression)?;

        if let Some(resolved) = resolve_via_wiring(self.runtime, including, &filter) {
            return Ok(resolved);
        }

        if self.config.registry_fallback {
            let matches = resolve_via_registry(self.runtime, &filter, self.config.fallback_states);
            if let Some(resolved) = matches.first() {
                debug!(
                    module = %including,
                    provider = %resolved.module,
                    resource = %resolved.resource,
                    states = %self.config.fallback_states,
                    "resolved through registry fallback"
                );
                return Ok(resolved);
            }
        }

        Err(InclusionError::Unresolved {
            module: including,
            expression: expression.to_string(),
        })
    }

    /// Resolve an include location and load the changelog it points at.
    ///
    /// The caller's accessor is reused when the resource lives in the
    /// including module; otherwise a new accessor is scoped to the provider
    /// and carries the matched capability's attributes. Loader failures are
    /// wrapped, not retried.
    pub fn include<L>(
        &self,
        location: &str,
        accessor: &ResourceAccessor,
        loader: &L,
    ) -> Result<L::Changelog, InclusionError>
    where
        L: ChangelogLoader + ?Sized,
    {
        let Some(expression) = schema_expression(location) else {
            return Err(InclusionError::UnsupportedLocation(location.to_string()));
        };
        let resolved = self.resolve(expression, accessor.module())?;

        let provider_accessor;
        let target = if resolved.module == accessor.module() {
            accessor
        } else {
            provider_accessor =
                ResourceAccessor::with_attributes(resolved.module, resolved.attributes.clone());
            &provider_accessor
        };

        loader
            .load(&resolved.resource, target)
            .map_err(|source| InclusionError::Load {
                module: resolved.module,
                resource: resolved.resource.clone(),
                source: source.into(),
            })
    }
}
