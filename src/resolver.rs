//! Finds the capability that satisfies a compiled schema expression.
//!
//! Two lookups share one acceptance rule: the capability must match the filter
//! and declare a `resource`. Candidates that match but carry no resource are
//! dropped with a warning and the scan continues.
//!
//! * [`resolve_via_wiring`] walks the requiring module's resolved wires and
//!   returns the first acceptable provider.
//! * [`resolve_via_registry`] scans every module in the requested states and
//!   yields all acceptable providers in ascending module-id order.

use crate::SCHEMA_NAMESPACE;
use crate::attributes::AttributeMap;
use crate::expression::CompiledFilter;
use crate::runtime::{Capability, ModuleId, ModuleRuntime, StateMask};
use serde::Serialize;
use tracing::{debug, warn};

/// Module and resource path a schema expression resolved to.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ResolvedResource {
    pub module: ModuleId,
    pub resource: String,
    pub attributes: AttributeMap,
}

/// Look up the provider through `module`'s resolved wires.
///
/// Returns `None` when the module has no wires in the schema namespace or no
/// wire is acceptable; callers fall back to [`resolve_via_registry`].
pub fn resolve_via_wiring<R>(
    runtime: &R,
    module: ModuleId,
    filter: &CompiledFilter,
) -> Option<ResolvedResource>
where
    R: ModuleRuntime + ?Sized,
{
    let wires = runtime.required_wires(module, SCHEMA_NAMESPACE);
    if wires.is_empty() {
        debug!(%module, namespace = SCHEMA_NAMESPACE, "no schema wires on module");
        return None;
    }

    let found = wires
        .into_iter()
        .find_map(|wire| accept(filter, wire.capability));
    match &found {
        Some(resolved) => debug!(
            %module,
            provider = %resolved.module,
            resource = %resolved.resource,
            %filter,
            "resolved through wiring"
        ),
        None => debug!(%module, %filter, "no wire satisfies schema expression"),
    }
    found
}

/// Scan the registry for every acceptable provider.
///
/// Nothing is read until the returned sequence is iterated.
pub fn resolve_via_registry<'a, R>(
    runtime: &'a R,
    filter: &'a CompiledFilter,
    states: StateMask,
) -> RegistryMatches<'a, R>
where
    R: ModuleRuntime + ?Sized,
{
    RegistryMatches {
        runtime,
        filter,
        states,
    }
}

/// Lazy, restartable result of a registry scan.
///
/// Each call to [`RegistryMatches::iter`] starts a fresh scan over the
/// runtime, ordered by ascending module id, then by the runtime's capability
/// order within each module.
pub struct RegistryMatches<'a, R: ?Sized> {
    runtime: &'a R,
    filter: &'a CompiledFilter,
    states: StateMask,
}

impl<'a, R> RegistryMatches<'a, R>
where
    R: ModuleRuntime + ?Sized,
{
    pub fn iter(&self) -> impl Iterator<Item = ResolvedResource> + 'a {
        let runtime = self.runtime;
        let filter = self.filter;
        let mut modules = runtime.modules(self.states);
        modules.sort_by_key(|module| module.id);
        modules.into_iter().flat_map(move |module| {
            runtime
                .capabilities(module.id, SCHEMA_NAMESPACE)
                .into_iter()
                .filter_map(move |capability| accept(filter, capability))
        })
    }

    /// First match in module-id order.
    pub fn first(&self) -> Option<ResolvedResource> {
        self.iter().next()
    }

    pub fn to_vec(&self) -> Vec<ResolvedResource> {
        self.iter().collect()
    }
}

fn accept(filter: &CompiledFilter, capability: Capability) -> Option<ResolvedResource> {
    if !filter.matches(&capability.attributes) {
        return None;
    }
    let Some(resource) = capability.resource() else {
        warn!(
            module = %capability.module,
            namespace = %capability.namespace,
            %filter,
            "capability matches schema expression but declares no resource; skipping"
        );
        return None;
    };
    Some(ResolvedResource {
        module: capability.module,
        resource,
        attributes: capability.attributes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expression::compile;
    use crate::runtime::{Module, ModuleState, Wire};
    use serde_json::{Value, json};
    use std::cell::Cell;

    #[derive(Default)]
    struct FakeRuntime {
        modules: Vec<Module>,
        capabilities: Vec<Capability>,
        wires: Vec<Wire>,
        module_queries: Cell<usize>,
    }

    impl FakeRuntime {
        fn module(mut self, id: u64, state: ModuleState) -> Self {
            self.modules.push(Module {
                id: ModuleId(id),
                name: format!("module.{id}"),
                state,
            });
            self
        }

        fn capability(mut self, owner: u64, namespace: &str, attributes: Value) -> Self {
            self.capabilities.push(cap(owner, namespace, attributes));
            self
        }

        fn wire(mut self, requirer: u64, provider: u64, attributes: Value) -> Self {
            self.wires.push(Wire {
                requirer: ModuleId(requirer),
                namespace: SCHEMA_NAMESPACE.into(),
                capability: cap(provider, SCHEMA_NAMESPACE, attributes),
            });
            self
        }
    }

    fn cap(owner: u64, namespace: &str, attributes: Value) -> Capability {
        Capability {
            module: ModuleId(owner),
            namespace: namespace.into(),
            attributes: serde_json::from_value(attributes).unwrap(),
        }
    }

    impl ModuleRuntime for FakeRuntime {
        fn modules(&self, states: StateMask) -> Vec<Module> {
            self.module_queries.set(self.module_queries.get() + 1);
            self.modules
                .iter()
                .filter(|m| states.contains(m.state))
                .cloned()
                .collect()
        }

        fn capabilities(&self, module: ModuleId, namespace: &str) -> Vec<Capability> {
            self.capabilities
                .iter()
                .filter(|c| c.module == module && c.namespace == namespace)
                .cloned()
                .collect()
        }

        fn required_wires(&self, module: ModuleId, namespace: &str) -> Vec<Wire> {
            self.wires
                .iter()
                .filter(|w| w.requirer == module && w.namespace == namespace)
                .cloned()
                .collect()
        }
    }

    #[test]
    fn wiring_returns_the_wired_provider() {
        let runtime = FakeRuntime::default().wire(
            1,
            2,
            json!({"name": "orders", "resource": "changelog-orders.xml"}),
        );
        let resolved = resolve_via_wiring(&runtime, ModuleId(1), &compile("orders").unwrap())
            .expect("resolved");
        assert_eq!(resolved.module, ModuleId(2));
        assert_eq!(resolved.resource, "changelog-orders.xml");
        assert_eq!(resolved.attributes["name"].as_str(), Some("orders"));
    }

    #[test]
    fn wiring_filters_on_directive() {
        let runtime = FakeRuntime::default()
            .wire(1, 2, json!({"name": "orders", "version": 1, "resource": "a.xml"}))
            .wire(1, 3, json!({"name": "orders", "version": 2, "resource": "b.xml"}));
        let filter = compile("orders;filter:=(version=2)").unwrap();
        let resolved = resolve_via_wiring(&runtime, ModuleId(1), &filter).unwrap();
        assert_eq!(resolved.resource, "b.xml");
        assert_eq!(resolved.module, ModuleId(3));
    }

    #[test]
    fn wiring_first_acceptable_wire_wins() {
        let runtime = FakeRuntime::default()
            .wire(1, 5, json!({"name": "orders", "resource": "first.xml"}))
            .wire(1, 4, json!({"name": "orders", "resource": "second.xml"}));
        let resolved =
            resolve_via_wiring(&runtime, ModuleId(1), &compile("orders").unwrap()).unwrap();
        assert_eq!(resolved.resource, "first.xml");
    }

    #[test]
    fn wiring_skips_resourceless_match_and_keeps_scanning() {
        let runtime = FakeRuntime::default()
            .wire(1, 2, json!({"name": "orders"}))
            .wire(1, 3, json!({"name": "orders", "resource": "good.xml"}));
        let resolved =
            resolve_via_wiring(&runtime, ModuleId(1), &compile("orders").unwrap()).unwrap();
        assert_eq!(resolved.module, ModuleId(3));

        let only_bad = FakeRuntime::default().wire(1, 2, json!({"name": "orders"}));
        assert_eq!(
            resolve_via_wiring(&only_bad, ModuleId(1), &compile("orders").unwrap()),
            None
        );
    }

    #[test]
    fn wiring_without_wires_is_not_found() {
        let runtime = FakeRuntime::default()
            .module(1, ModuleState::Active)
            .capability(2, SCHEMA_NAMESPACE, json!({"name": "orders", "resource": "c.xml"}));
        assert_eq!(
            resolve_via_wiring(&runtime, ModuleId(1), &compile("orders").unwrap()),
            None
        );
    }

    #[test]
    fn registry_yields_all_matches_in_module_order() {
        let runtime = FakeRuntime::default()
            .module(9, ModuleState::Active)
            .module(3, ModuleState::Resolved)
            .module(5, ModuleState::Installed)
            .capability(9, SCHEMA_NAMESPACE, json!({"name": "orders", "resource": "nine.xml"}))
            .capability(3, SCHEMA_NAMESPACE, json!({"name": "orders", "resource": "three-a.xml"}))
            .capability(3, SCHEMA_NAMESPACE, json!({"name": "orders", "resource": "three-b.xml"}))
            .capability(3, "other.ns", json!({"name": "orders", "resource": "wrong-ns.xml"}))
            .capability(5, SCHEMA_NAMESPACE, json!({"name": "orders", "resource": "five.xml"}));
        let filter = compile("orders").unwrap();
        let matches = resolve_via_registry(
            &runtime,
            &filter,
            ModuleState::Resolved | ModuleState::Active,
        );
        let resources: Vec<_> = matches.iter().map(|r| r.resource).collect();
        assert_eq!(resources, ["three-a.xml", "three-b.xml", "nine.xml"]);
        assert_eq!(matches.first().unwrap().module, ModuleId(3));
    }

    #[test]
    fn registry_skips_resourceless_capabilities() {
        let runtime = FakeRuntime::default()
            .module(1, ModuleState::Active)
            .module(2, ModuleState::Active)
            .capability(1, SCHEMA_NAMESPACE, json!({"name": "orders"}))
            .capability(2, SCHEMA_NAMESPACE, json!({"name": "orders", "resource": "c.xml"}));
        let filter = compile("orders").unwrap();
        let matches = resolve_via_registry(&runtime, &filter, StateMask::ALL).to_vec();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].module, ModuleId(2));
    }

    #[test]
    fn registry_scan_is_lazy_and_restartable() {
        let runtime = FakeRuntime::default()
            .module(1, ModuleState::Active)
            .capability(1, SCHEMA_NAMESPACE, json!({"name": "orders", "resource": "c.xml"}));
        let filter = compile("orders").unwrap();
        let matches = resolve_via_registry(&runtime, &filter, StateMask::ALL);
        assert_eq!(runtime.module_queries.get(), 0);

        let first = matches.to_vec();
        let second = matches.to_vec();
        assert_eq!(first, second);
        assert_eq!(runtime.module_queries.get(), 2);
    }

    #[test]
    fn repeated_resolution_is_idempotent() {
        let runtime = FakeRuntime::default()
            .wire(1, 2, json!({"name": "orders", "resource": "a.xml"}));
        let filter = compile("orders").unwrap();
        let a = resolve_via_wiring(&runtime, ModuleId(1), &filter);
        let b = resolve_via_wiring(&runtime, ModuleId(1), &filter);
        assert!(a.is_some());
        assert_eq!(a, b);
    }
}
