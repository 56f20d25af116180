//! Typed region flags
//!
//! A flag is a named policy setting attached to a region. Every flag has a
//! declared [`FlagKind`]; values stored on regions must match it. Flags may
//! carry a companion *group flag* (`<name>-group`) whose [`RegionGroup`]
//! value selects which membership class the flag's value applies to.

use crate::domain::Association;
use crate::error::{RegionError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

/// Allow/deny value of a state flag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StateValue {
    Allow,
    Deny,
}

impl FromStr for StateValue {
    type Err = RegionError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "allow" | "yes" | "on" => Ok(StateValue::Allow),
            "deny" | "no" | "off" => Ok(StateValue::Deny),
            other => Err(RegionError::InvalidInput {
                flag: "state".to_string(),
                reason: format!("expected allow or deny, got '{}'", other),
            }),
        }
    }
}

/// Membership class a flag value applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegionGroup {
    Owners,
    Members,
    NonMembers,
    NonOwners,
    All,
    None,
}

impl RegionGroup {
    /// Whether an actor with the given association falls in this class.
    pub fn contains(self, association: Association) -> bool {
        match self {
            RegionGroup::Owners => association == Association::Owner,
            RegionGroup::Members => association >= Association::Member,
            RegionGroup::NonMembers => association == Association::NonMember,
            RegionGroup::NonOwners => association != Association::Owner,
            RegionGroup::All => true,
            RegionGroup::None => false,
        }
    }
}

impl FromStr for RegionGroup {
    type Err = RegionError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().replace(['-', '_'], "").as_str() {
            "owners" | "owner" => Ok(RegionGroup::Owners),
            "members" | "member" => Ok(RegionGroup::Members),
            "nonmembers" | "nonmember" => Ok(RegionGroup::NonMembers),
            "nonowners" | "nonowner" => Ok(RegionGroup::NonOwners),
            "all" | "everyone" | "everybody" => Ok(RegionGroup::All),
            "none" | "noone" | "nobody" => Ok(RegionGroup::None),
            other => Err(RegionError::InvalidInput {
                flag: "group".to_string(),
                reason: format!("unknown group '{}'", other),
            }),
        }
    }
}

/// A position within a world, used by teleport-style flags
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub world: Option<String>,
    pub x: f64,
    pub y: f64,
    pub z: f64,
    #[serde(default)]
    pub yaw: f32,
    #[serde(default)]
    pub pitch: f32,
}

/// Declared type of a flag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlagKind {
    State,
    Boolean,
    Integer,
    Double,
    String,
    Location,
    StringSet,
    RegionGroup,
}

impl fmt::Display for FlagKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FlagKind::State => "state",
            FlagKind::Boolean => "boolean",
            FlagKind::Integer => "integer",
            FlagKind::Double => "double",
            FlagKind::String => "string",
            FlagKind::Location => "location",
            FlagKind::StringSet => "string set",
            FlagKind::RegionGroup => "region group",
        };
        f.write_str(name)
    }
}

/// A typed flag value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum FlagValue {
    State(StateValue),
    Boolean(bool),
    Integer(i64),
    Double(f64),
    String(String),
    Location(Location),
    StringSet(BTreeSet<String>),
    Group(RegionGroup),
}

impl FlagValue {
    pub fn kind(&self) -> FlagKind {
        match self {
            FlagValue::State(_) => FlagKind::State,
            FlagValue::Boolean(_) => FlagKind::Boolean,
            FlagValue::Integer(_) => FlagKind::Integer,
            FlagValue::Double(_) => FlagKind::Double,
            FlagValue::String(_) => FlagKind::String,
            FlagValue::Location(_) => FlagKind::Location,
            FlagValue::StringSet(_) => FlagKind::StringSet,
            FlagValue::Group(_) => FlagKind::RegionGroup,
        }
    }

    pub fn as_state(&self) -> Option<StateValue> {
        match self {
            FlagValue::State(s) => Some(*s),
            _ => None,
        }
    }

    pub fn as_group(&self) -> Option<RegionGroup> {
        match self {
            FlagValue::Group(g) => Some(*g),
            _ => None,
        }
    }
}

impl From<StateValue> for FlagValue {
    fn from(value: StateValue) -> Self {
        FlagValue::State(value)
    }
}

impl From<RegionGroup> for FlagValue {
    fn from(value: RegionGroup) -> Self {
        FlagValue::Group(value)
    }
}

/// Companion group flag of a flag definition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupFlag {
    pub name: String,
    pub default: RegionGroup,
}

/// Definition of a flag known to the registry
#[derive(Debug, Clone, PartialEq)]
pub struct FlagDefinition {
    pub name: String,
    pub kind: FlagKind,
    pub default: Option<FlagValue>,
    pub group: Option<GroupFlag>,
}

impl FlagDefinition {
    pub fn new(name: impl Into<String>, kind: FlagKind) -> Self {
        Self {
            name: name.into().to_lowercase(),
            kind,
            default: None,
            group: None,
        }
    }

    /// State flag with an `All` group selector
    pub fn state(name: impl Into<String>) -> Self {
        Self::new(name, FlagKind::State).with_group(RegionGroup::All)
    }

    pub fn with_default(mut self, value: FlagValue) -> Self {
        self.default = Some(value);
        self
    }

    /// Attach a `<name>-group` companion flag with the given default selector.
    pub fn with_group(mut self, default: RegionGroup) -> Self {
        self.group = Some(GroupFlag {
            name: format!("{}-group", self.name),
            default,
        });
        self
    }

    /// Default selector used when no region sets the group flag.
    pub fn default_group(&self) -> RegionGroup {
        self.group
            .as_ref()
            .map(|g| g.default)
            .unwrap_or(RegionGroup::All)
    }

    pub fn group_flag_name(&self) -> Option<&str> {
        self.group.as_ref().map(|g| g.name.as_str())
    }

    /// Check a value against the declared kind.
    pub fn validate(&self, value: &FlagValue) -> Result<()> {
        if value.kind() != self.kind {
            return Err(RegionError::InvalidFlagValue {
                flag: self.name.clone(),
                expected: self.kind,
                actual: value.kind(),
            });
        }
        Ok(())
    }
}

/// Registry of known flags
#[derive(Debug, Clone, Default)]
pub struct FlagRegistry {
    flags: BTreeMap<String, FlagDefinition>,
    /// Group flag name -> owning flag name
    groups: BTreeMap<String, String>,
}

impl FlagRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry populated with the built-in flags.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        for def in builtin_flags() {
            // Built-ins have distinct names.
            let _ = registry.register(def);
        }
        registry
    }

    pub fn register(&mut self, def: FlagDefinition) -> Result<()> {
        if self.flags.contains_key(&def.name) || self.groups.contains_key(&def.name) {
            return Err(RegionError::DuplicateFlag(def.name));
        }
        if let Some(group) = &def.group {
            if self.flags.contains_key(&group.name) || self.groups.contains_key(&group.name) {
                return Err(RegionError::DuplicateFlag(group.name.clone()));
            }
            self.groups.insert(group.name.clone(), def.name.clone());
        }
        self.flags.insert(def.name.clone(), def);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&FlagDefinition> {
        self.flags.get(&name.to_lowercase())
    }

    /// Owning flag of a group flag name.
    pub fn owner_of_group(&self, group_name: &str) -> Option<&FlagDefinition> {
        self.groups
            .get(&group_name.to_lowercase())
            .and_then(|owner| self.flags.get(owner))
    }

    /// Lookup that ignores case, dashes and underscores, falling back to a
    /// unique prefix.
    pub fn fuzzy_match(&self, name: &str) -> Option<&FlagDefinition> {
        if let Some(def) = self.get(name) {
            return Some(def);
        }
        let wanted = normalize(name);
        if wanted.is_empty() {
            return None;
        }
        if let Some(def) = self.flags.values().find(|def| normalize(&def.name) == wanted) {
            return Some(def);
        }
        let mut prefixed = self
            .flags
            .values()
            .filter(|def| normalize(&def.name).starts_with(&wanted));
        match (prefixed.next(), prefixed.next()) {
            (Some(def), None) => Some(def),
            _ => None,
        }
    }

    /// Validate a value for either a flag or a group flag key.
    pub fn validate(&self, key: &str, value: &FlagValue) -> Result<()> {
        if let Some(def) = self.get(key) {
            return def.validate(value);
        }
        if self.owner_of_group(key).is_some() {
            if value.kind() != FlagKind::RegionGroup {
                return Err(RegionError::InvalidFlagValue {
                    flag: key.to_lowercase(),
                    expected: FlagKind::RegionGroup,
                    actual: value.kind(),
                });
            }
            return Ok(());
        }
        Err(RegionError::UnknownFlag(key.to_string()))
    }

    pub fn iter(&self) -> impl Iterator<Item = &FlagDefinition> {
        self.flags.values()
    }

    pub fn len(&self) -> usize {
        self.flags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flags.is_empty()
    }
}

fn normalize(name: &str) -> String {
    name.chars()
        .filter(|c| *c != '-' && *c != '_')
        .flat_map(char::to_lowercase)
        .collect()
}

fn builtin_flags() -> Vec<FlagDefinition> {
    vec![
        FlagDefinition::state("build"),
        FlagDefinition::state("block-break"),
        FlagDefinition::state("block-place"),
        FlagDefinition::state("interact"),
        FlagDefinition::state("use"),
        FlagDefinition::state("chest-access"),
        FlagDefinition::state("passthrough"),
        FlagDefinition::state("pvp"),
        FlagDefinition::state("entry").with_group(RegionGroup::NonMembers),
        FlagDefinition::state("exit").with_group(RegionGroup::NonMembers),
        FlagDefinition::state("mob-spawning").with_default(FlagValue::State(StateValue::Allow)),
        FlagDefinition::new("greeting", FlagKind::String).with_group(RegionGroup::All),
        FlagDefinition::new("farewell", FlagKind::String).with_group(RegionGroup::All),
        FlagDefinition::new("deny-message", FlagKind::String).with_default(FlagValue::String(
            "Hey! Sorry, but you can't do that here.".to_string(),
        )),
        FlagDefinition::new("teleport", FlagKind::Location).with_group(RegionGroup::Members),
        FlagDefinition::new("spawn", FlagKind::Location).with_group(RegionGroup::Members),
        FlagDefinition::new("max-players", FlagKind::Integer).with_group(RegionGroup::NonMembers),
        FlagDefinition::new("heal-amount", FlagKind::Double),
        FlagDefinition::new("notify-enter", FlagKind::Boolean),
        FlagDefinition::new("blocked-cmds", FlagKind::StringSet),
    ]
}
