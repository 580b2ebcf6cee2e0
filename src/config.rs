//! Resolution policy knobs.
//!
//! Defaults match the usual deployment: fall back to a registry scan when the
//! including module has no matching wire, and only consider modules that are
//! resolved, starting or active. Both can be overridden from the environment:
//!
//! * `SCHEMALINK_REGISTRY_FALLBACK`: empty or `0` disables the registry scan.
//! * `SCHEMALINK_FALLBACK_STATES`: comma- or whitespace-separated state names
//!   (or `all`) accepted by the registry scan.

use crate::runtime::{ModuleState, StateMask};
use anyhow::{Context, Result};
use std::env;

pub const ENV_REGISTRY_FALLBACK: &str = "SCHEMALINK_REGISTRY_FALLBACK";
pub const ENV_FALLBACK_STATES: &str = "SCHEMALINK_FALLBACK_STATES";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ResolverConfig {
    pub registry_fallback: bool,
    pub fallback_states: StateMask,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            registry_fallback: true,
            fallback_states: ModuleState::Resolved | ModuleState::Starting | ModuleState::Active,
        }
    }
}

impl ResolverConfig {
    /// Read overrides from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Read overrides through `lookup`, which returns `None` for unset keys.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        if let Some(value) = lookup(ENV_REGISTRY_FALLBACK) {
            config.registry_fallback = !value.trim().is_empty() && value.trim() != "0";
        }
        if let Some(value) = lookup(ENV_FALLBACK_STATES) {
            config.fallback_states = StateMask::parse(&value)
                .with_context(|| format!("invalid {ENV_FALLBACK_STATES}"))?;
        }
        Ok(config)
    }
}
