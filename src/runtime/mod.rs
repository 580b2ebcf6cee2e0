//! Read-only view of the module runtime.
//!
//! The resolver never builds its own graph: everything it knows about
//! modules, capabilities and wires comes through [`ModuleRuntime`] lookups.
//! [`RuntimeSnapshot`] is the JSON-backed implementation used by the CLI and
//! tests; hosts embedding the resolver implement the trait over their live
//! registry.

pub mod identity;
pub mod index;
pub mod model;

pub use identity::{ModuleId, ModuleState, StateMask};
pub use index::RuntimeSnapshot;
pub use model::{
    Capability, CapabilityRecord, Module, ModuleRecord, SnapshotDocument, Wire, WireRecord,
};

/// Queries the resolver needs from a module runtime.
///
/// Implementations must return a consistent view for the duration of one
/// resolution call; the order of wires and capabilities must be stable for a
/// given resolved graph.
pub trait ModuleRuntime {
    /// Modules whose lifecycle state is in `states`, in any order.
    fn modules(&self, states: StateMask) -> Vec<Module>;

    /// Capabilities `module` declares in `namespace`. Unknown modules have none.
    fn capabilities(&self, module: ModuleId, namespace: &str) -> Vec<Capability>;

    /// Resolved wires where `module` is the requirer, restricted to `namespace`.
    fn required_wires(&self, module: ModuleId, namespace: &str) -> Vec<Wire>;
}
