//! Capability graph types and the on-disk snapshot document.
//!
//! [`Capability`], [`Wire`] and [`Module`] are what the resolver consumes
//! through [`crate::runtime::ModuleRuntime`]. The `*Record` types mirror
//! `schema/runtime_snapshot.schema.json`; use [`crate::RuntimeSnapshot`] for a
//! validated, queryable view.

use crate::attributes::{ATTR_RESOURCE, AttributeMap, deserialize_attribute_map};
use crate::runtime::identity::{ModuleId, ModuleState};
use serde::{Deserialize, Serialize};

/// A fact a module advertises about itself in one namespace.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Capability {
    pub module: ModuleId,
    pub namespace: String,
    pub attributes: AttributeMap,
}

impl Capability {
    /// Path of the changelog inside the owning module, when declared.
    pub fn resource(&self) -> Option<String> {
        self.attributes.get(ATTR_RESOURCE).map(ToString::to_string)
    }
}

#[derive(Clone, Debug, PartialEq)]
/// Resolved edge from a requiring module to a provider's capability.
pub struct Wire {
    pub requirer: ModuleId,
    pub namespace: String,
    pub capability: Capability,
}

impl Wire {
    pub fn provider(&self) -> ModuleId {
        self.capability.module
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
/// Registry entry for one installed module.
pub struct Module {
    pub id: ModuleId,
    pub name: String,
    pub state: ModuleState,
}

#[derive(Clone, Debug, Deserialize)]
/// Snapshot of a module runtime's registry and wiring as stored on disk.
pub struct SnapshotDocument {
    pub schema_version: String,
    pub modules: Vec<ModuleRecord>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct ModuleRecord {
    pub id: ModuleId,
    pub name: String,
    pub state: ModuleState,
    #[serde(default)]
    pub capabilities: Vec<CapabilityRecord>,
    #[serde(default)]
    pub wires: Vec<WireRecord>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct CapabilityRecord {
    pub namespace: String,
    #[serde(default, deserialize_with = "deserialize_attribute_map")]
    pub attributes: AttributeMap,
}

#[derive(Clone, Debug, Deserialize)]
/// Required wire; `capability` indexes the provider's `capabilities` array.
pub struct WireRecord {
    pub namespace: String,
    pub provider: ModuleId,
    pub capability: usize,
}
