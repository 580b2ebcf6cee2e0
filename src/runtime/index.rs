//! Validated, queryable view of a runtime snapshot.
//!
//! The snapshot is strict: it validates the document against the JSON schema,
//! rejects duplicate module ids, and checks every wire against the provider's
//! capability list so the resolver never sees a dangling edge.

use crate::runtime::ModuleRuntime;
use crate::runtime::identity::{ModuleId, StateMask};
use crate::runtime::model::{Capability, Module, SnapshotDocument, Wire};
use crate::schema_loader::{
    SchemaLoadOptions, SchemaLoadResult, compile_json_schema, load_json_schema, validate_instance,
};
use anyhow::{Context, Result, bail};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use tracing::debug;

const SNAPSHOT_SCHEMA_VERSION: &str = "runtime_snapshot_v1";
const SNAPSHOT_SCHEMA_FILE: &str = "schema/runtime_snapshot.schema.json";
const EMBEDDED_SNAPSHOT_SCHEMA: &str = include_str!("../../schema/runtime_snapshot.schema.json");

#[derive(Debug)]
struct ModuleEntry {
    module: Module,
    capabilities: Vec<Capability>,
    wires: Vec<Wire>,
}

/// In-memory module registry and wiring, keyed by module id.
#[derive(Debug)]
pub struct RuntimeSnapshot {
    schema_version: String,
    modules: BTreeMap<ModuleId, ModuleEntry>,
}

impl RuntimeSnapshot {
    /// Load and validate a snapshot file.
    ///
    /// A `schema/runtime_snapshot.schema.json` next to the snapshot's parent
    /// directory overrides the schema compiled into the crate.
    pub fn load(path: &Path) -> Result<Self> {
        let value = read_json(path)?;
        let schema = match snapshot_schema_override(path) {
            Some(schema_path) => load_snapshot_schema(&schema_path)?,
            None => embedded_snapshot_schema()?,
        };
        validate_instance(&schema, &value, &format!("runtime snapshot {}", path.display()))?;

        let document: SnapshotDocument = serde_json::from_value(value)
            .with_context(|| format!("parsing runtime snapshot {}", path.display()))?;
        Self::from_document(document).with_context(|| format!("indexing {}", path.display()))
    }

    /// Validate and index a snapshot that is already in memory.
    pub fn from_value(value: Value) -> Result<Self> {
        let schema = embedded_snapshot_schema()?;
        validate_instance(&schema, &value, "runtime snapshot")?;
        let document: SnapshotDocument =
            serde_json::from_value(value).context("parsing runtime snapshot")?;
        Self::from_document(document)
    }

    /// Index a parsed document, enforcing the graph invariants.
    pub fn from_document(document: SnapshotDocument) -> Result<Self> {
        validate_schema_version(&document.schema_version)?;

        let mut modules: BTreeMap<ModuleId, ModuleEntry> = BTreeMap::new();
        for record in &document.modules {
            if record.name.trim().is_empty() {
                bail!("module {} has an empty name", record.id);
            }
            if modules.contains_key(&record.id) {
                bail!("duplicate module id {}", record.id);
            }
            let capabilities = record
                .capabilities
                .iter()
                .map(|cap| {
                    if cap.namespace.trim().is_empty() {
                        bail!("module {} declares a capability with no namespace", record.id);
                    }
                    Ok(Capability {
                        module: record.id,
                        namespace: cap.namespace.clone(),
                        attributes: cap.attributes.clone(),
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            modules.insert(
                record.id,
                ModuleEntry {
                    module: Module {
                        id: record.id,
                        name: record.name.clone(),
                        state: record.state,
                    },
                    capabilities,
                    wires: Vec::new(),
                },
            );
        }

        for record in &document.modules {
            let mut wires = Vec::with_capacity(record.wires.len());
            for wire in &record.wires {
                let provider = modules.get(&wire.provider).with_context(|| {
                    format!(
                        "module {} wires to unknown provider {}",
                        record.id, wire.provider
                    )
                })?;
                let capability = provider.capabilities.get(wire.capability).with_context(|| {
                    format!(
                        "module {} wires to capability #{} of module {}, which declares {}",
                        record.id,
                        wire.capability,
                        wire.provider,
                        provider.capabilities.len()
                    )
                })?;
                if capability.namespace != wire.namespace {
                    bail!(
                        "module {} wire in namespace '{}' points at a '{}' capability of module {}",
                        record.id,
                        wire.namespace,
                        capability.namespace,
                        wire.provider
                    );
                }
                wires.push(Wire {
                    requirer: record.id,
                    namespace: wire.namespace.clone(),
                    capability: capability.clone(),
                });
            }
            if let Some(entry) = modules.get_mut(&record.id) {
                entry.wires = wires;
            }
        }

        Ok(Self {
            schema_version: document.schema_version,
            modules,
        })
    }

    pub fn schema_version(&self) -> &str {
        &self.schema_version
    }

    /// Look up a module by id.
    pub fn module(&self, id: ModuleId) -> Option<&Module> {
        self.modules.get(&id).map(|entry| &entry.module)
    }

    /// Iterates module ids in ascending order.
    pub fn ids(&self) -> impl Iterator<Item = &ModuleId> {
        self.modules.keys()
    }
}

impl ModuleRuntime for RuntimeSnapshot {
    fn modules(&self, states: StateMask) -> Vec<Module> {
        self.modules
            .values()
            .filter(|entry| states.contains(entry.module.state))
            .map(|entry| entry.module.clone())
            .collect()
    }

    fn capabilities(&self, module: ModuleId, namespace: &str) -> Vec<Capability> {
        self.modules
            .get(&module)
            .map(|entry| {
                entry
                    .capabilities
                    .iter()
                    .filter(|cap| cap.namespace == namespace)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    fn required_wires(&self, module: ModuleId, namespace: &str) -> Vec<Wire> {
        self.modules
            .get(&module)
            .map(|entry| {
                entry
                    .wires
                    .iter()
                    .filter(|wire| wire.namespace == namespace)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }
}

fn validate_schema_version(schema_version: &str) -> Result<()> {
    if schema_version.is_empty() {
        bail!("schema_version must not be empty");
    }
    let allowed = allowed_schema_versions();
    if !allowed.contains(schema_version) {
        bail!(
            "schema_version '{}' not in allowed set {:?}",
            schema_version,
            allowed
        );
    }
    Ok(())
}

fn allowed_schema_versions() -> BTreeSet<String> {
    BTreeSet::from([SNAPSHOT_SCHEMA_VERSION.to_string()])
}

fn load_snapshot_schema(path: &Path) -> Result<SchemaLoadResult> {
    let allowed = allowed_schema_versions();
    let schema = load_json_schema(
        path,
        SchemaLoadOptions {
            allowed_versions: Some(&allowed),
            ..Default::default()
        },
    )
    .with_context(|| format!("loading snapshot schema {}", path.display()))?;
    debug!(
        schema_version = %schema.schema_version,
        path = %path.display(),
        "loaded snapshot schema"
    );
    Ok(schema)
}

fn read_json(path: &Path) -> Result<Value> {
    let file = File::open(path).with_context(|| format!("opening snapshot {}", path.display()))?;
    serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("parsing snapshot {}", path.display()))
}

fn embedded_snapshot_schema() -> Result<SchemaLoadResult> {
    let value: Value = serde_json::from_str(EMBEDDED_SNAPSHOT_SCHEMA)
        .context("parsing embedded snapshot schema")?;
    let allowed = allowed_schema_versions();
    compile_json_schema(
        &value,
        "embedded runtime_snapshot",
        SchemaLoadOptions {
            allowed_versions: Some(&allowed),
            ..Default::default()
        },
    )
}

/// Schema shipped next to the snapshot's parent directory, if any.
fn snapshot_schema_override(snapshot_path: &Path) -> Option<PathBuf> {
    let base = snapshot_path.parent()?.parent()?;
    let candidate = base.join(SNAPSHOT_SCHEMA_FILE);
    candidate.exists().then_some(candidate)
}
