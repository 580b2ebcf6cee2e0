use crate::split_list;
use anyhow::{Result, bail};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::ops::BitOr;

/// Stable numeric identity of a module.
///
/// Unique within a runtime; registry scans enumerate modules in ascending id
/// order so their output is reproducible.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModuleId(pub u64);

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle state of a module. Each state owns one bit of a [`StateMask`].
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum ModuleState {
    Uninstalled,
    Installed,
    Resolved,
    Starting,
    Stopping,
    Active,
}

const ALL_STATES: [ModuleState; 6] = [
    ModuleState::Uninstalled,
    ModuleState::Installed,
    ModuleState::Resolved,
    ModuleState::Starting,
    ModuleState::Stopping,
    ModuleState::Active,
];

impl ModuleState {
    pub const fn bit(self) -> u32 {
        match self {
            ModuleState::Uninstalled => 0x01,
            ModuleState::Installed => 0x02,
            ModuleState::Resolved => 0x04,
            ModuleState::Starting => 0x08,
            ModuleState::Stopping => 0x10,
            ModuleState::Active => 0x20,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ModuleState::Uninstalled => "uninstalled",
            ModuleState::Installed => "installed",
            ModuleState::Resolved => "resolved",
            ModuleState::Starting => "starting",
            ModuleState::Stopping => "stopping",
            ModuleState::Active => "active",
        }
    }
}

impl TryFrom<&str> for ModuleState {
    type Error = anyhow::Error;

    fn try_from(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "uninstalled" => Ok(ModuleState::Uninstalled),
            "installed" => Ok(ModuleState::Installed),
            "resolved" => Ok(ModuleState::Resolved),
            "starting" => Ok(ModuleState::Starting),
            "stopping" => Ok(ModuleState::Stopping),
            "active" => Ok(ModuleState::Active),
            other => bail!("Unknown module state: {other}"),
        }
    }
}

impl fmt::Display for ModuleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for ModuleState {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ModuleState {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = String::deserialize(deserializer)?;
        ModuleState::try_from(value.as_str()).map_err(serde::de::Error::custom)
    }
}

/// Set of acceptable lifecycle states.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash)]
pub struct StateMask(u32);

impl StateMask {
    pub const NONE: StateMask = StateMask(0);
    pub const ALL: StateMask = StateMask(0x3f);

    pub const fn from_bits(bits: u32) -> Self {
        StateMask(bits & Self::ALL.0)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn contains(self, state: ModuleState) -> bool {
        self.0 & state.bit() != 0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// States in the mask, in lifecycle order.
    pub fn states(self) -> impl Iterator<Item = ModuleState> {
        ALL_STATES
            .into_iter()
            .filter(move |state| self.contains(*state))
    }

    /// Parse a comma- or whitespace-separated list of state names.
    ///
    /// `all` selects every state. An empty list is rejected because a mask
    /// with no states can never match a module.
    pub fn parse(value: &str) -> Result<Self> {
        let tokens = split_list(value);
        if tokens.is_empty() {
            bail!("module state list must not be empty");
        }
        let mut mask = StateMask::NONE;
        for token in tokens {
            if token.eq_ignore_ascii_case("all") {
                mask = StateMask::ALL;
                continue;
            }
            mask = mask | ModuleState::try_from(token.as_str())?;
        }
        Ok(mask)
    }
}

impl From<ModuleState> for StateMask {
    fn from(state: ModuleState) -> Self {
        StateMask(state.bit())
    }
}

impl BitOr for StateMask {
    type Output = StateMask;

    fn bitor(self, rhs: StateMask) -> StateMask {
        StateMask(self.0 | rhs.0)
    }
}

impl BitOr<ModuleState> for StateMask {
    type Output = StateMask;

    fn bitor(self, rhs: ModuleState) -> StateMask {
        StateMask(self.0 | rhs.bit())
    }
}

impl BitOr for ModuleState {
    type Output = StateMask;

    fn bitor(self, rhs: ModuleState) -> StateMask {
        StateMask(self.bit() | rhs.bit())
    }
}

impl fmt::Display for StateMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.states().map(|state| state.as_str()).collect();
        f.write_str(&names.join(","))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_round_trips_through_json() {
        let json = serde_json::to_string(&ModuleState::Resolved).unwrap();
        assert_eq!(json, "\"resolved\"");
        let back: ModuleState = serde_json::from_str("\"ACTIVE\"").unwrap();
        assert_eq!(back, ModuleState::Active);
        assert!(serde_json::from_str::<ModuleState>("\"frozen\"").is_err());
    }

    #[test]
    fn mask_parses_lists_and_all() {
        let mask = StateMask::parse("resolved, active").unwrap();
        assert!(mask.contains(ModuleState::Resolved));
        assert!(mask.contains(ModuleState::Active));
        assert!(!mask.contains(ModuleState::Installed));
        assert_eq!(mask.to_string(), "resolved,active");

        assert_eq!(StateMask::parse("all").unwrap(), StateMask::ALL);
        assert!(StateMask::parse("").is_err());
        assert!(StateMask::parse("resolved frozen").is_err());
    }

    #[test]
    fn mask_bits_follow_lifecycle_bits() {
        let mask = ModuleState::Resolved | ModuleState::Active;
        assert_eq!(mask.bits(), 0x24);
        assert_eq!(StateMask::from_bits(0xff), StateMask::ALL);
        assert!(StateMask::NONE.is_empty());
    }
}
