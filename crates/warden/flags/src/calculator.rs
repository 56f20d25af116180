//! Flag value resolution

use tracing::trace;
use warden_index::{ApplicableRegionSet, MAX_PARENT_DEPTH};
use warden_types::{
    Actor, Association, FlagDefinition, FlagRegistry, FlagValue, Region, RegionGroup, StateValue,
};

/// Resolves flags over one applicable region set.
///
/// The set carries its snapshot, so parent lookups see exactly the state the
/// set was computed from.
#[derive(Debug, Clone, Copy)]
pub struct FlagValueCalculator<'a> {
    regions: &'a ApplicableRegionSet,
    registry: &'a FlagRegistry,
}

/// What the walk needs to know about a flag
struct Lookup<'a> {
    key: String,
    group_key: Option<&'a str>,
    default_group: RegionGroup,
    default: Option<&'a FlagValue>,
}

impl<'a> Lookup<'a> {
    fn new(registry: &'a FlagRegistry, flag: &str) -> Self {
        match registry.get(flag) {
            Some(def) => Self::from_definition(def),
            None => Self {
                key: flag.to_lowercase(),
                group_key: None,
                default_group: RegionGroup::All,
                default: None,
            },
        }
    }

    fn from_definition(def: &'a FlagDefinition) -> Self {
        Self {
            key: def.name.clone(),
            group_key: def.group_flag_name(),
            default_group: def.default_group(),
            default: def.default.as_ref(),
        }
    }
}

impl<'a> FlagValueCalculator<'a> {
    pub fn new(regions: &'a ApplicableRegionSet, registry: &'a FlagRegistry) -> Self {
        Self { regions, registry }
    }

    pub fn regions(&self) -> &'a ApplicableRegionSet {
        self.regions
    }

    /// Strongest association of the actor with any non-global region here.
    pub fn membership(&self, actor: &Actor) -> Association {
        self.physical()
            .map(|r| r.association(actor))
            .max()
            .unwrap_or(Association::NonMember)
    }

    /// Whether the actor owns every non-global region here.
    pub fn is_owner_of_all(&self, actor: &Actor) -> bool {
        self.physical().all(|r| r.is_owner(actor))
    }

    /// Whether the actor is a member (or owner) of every non-global region.
    pub fn is_member_of_all(&self, actor: &Actor) -> bool {
        self.physical().all(|r| r.is_member(actor))
    }

    fn physical(&self) -> impl Iterator<Item = &'a Region> + 'a {
        self.regions.iter().filter(|r| !r.is_global())
    }

    /// Effective value of `flag` for `actor`, or the flag default.
    ///
    /// With no actor, group selectors are not checked.
    pub fn query_value(&self, actor: Option<&Actor>, flag: &str) -> Option<FlagValue> {
        let lookup = Lookup::new(self.registry, flag);
        for region in self.regions.iter() {
            if let Some(value) = self.effective_value(region, &lookup, actor) {
                trace!(flag = %lookup.key, region_id = %region.id(), "Flag resolved");
                return Some(value.clone());
            }
        }
        lookup.default.cloned()
    }

    /// Value `region` itself gives `flag` for `actor`, inherited through its
    /// parents. Other regions here and the flag default are not consulted.
    pub fn region_value(
        &self,
        region: &Region,
        actor: Option<&Actor>,
        flag: &str,
    ) -> Option<FlagValue> {
        let lookup = Lookup::new(self.registry, flag);
        self.effective_value(region, &lookup, actor).cloned()
    }

    /// Combined state of several state flags: any deny wins, then any allow.
    pub fn query_state(&self, actor: Option<&Actor>, flags: &[&str]) -> Option<StateValue> {
        let mut result = None;
        for flag in flags {
            match self.query_value(actor, flag).and_then(|v| v.as_state()) {
                Some(StateValue::Deny) => return Some(StateValue::Deny),
                Some(StateValue::Allow) => result = Some(StateValue::Allow),
                None => {}
            }
        }
        result
    }

    /// Whether every listed state flag resolves to allow-or-unset and at
    /// least one is allowed.
    pub fn test_state(&self, actor: Option<&Actor>, flags: &[&str]) -> bool {
        self.query_state(actor, flags) == Some(StateValue::Allow)
    }

    /// Group selector of the highest-priority region that sets it, or the
    /// flag's default selector. `None` if the flag has no group flag.
    pub fn query_group(&self, flag: &str) -> Option<RegionGroup> {
        let def = self.registry.get(flag)?;
        let group_key = def.group_flag_name()?;
        let found = self
            .regions
            .iter()
            .find_map(|region| region.group_flag(group_key));
        Some(found.unwrap_or_else(|| def.default_group()))
    }

    /// Value a single region contributes, consulting its parent chain only
    /// while no value on the chain applies to the actor.
    fn effective_value<'r>(
        &self,
        region: &'r Region,
        lookup: &Lookup<'_>,
        actor: Option<&Actor>,
    ) -> Option<&'r FlagValue>
    where
        'a: 'r,
    {
        let snapshot = self.regions.snapshot();
        let mut association = Association::NonMember;
        let mut current = Some(region);
        let mut depth = 0;
        while let Some(r) = current {
            if let Some(actor) = actor {
                association = association.max(r.association(actor));
            }
            if let Some(value) = r.flag(&lookup.key) {
                let applies = match (lookup.group_key, actor) {
                    (None, _) | (Some(_), None) => true,
                    (Some(group_key), Some(_)) => r
                        .group_flag(group_key)
                        .unwrap_or(lookup.default_group)
                        .contains(association),
                };
                if applies {
                    return Some(value);
                }
            }
            depth += 1;
            if depth > MAX_PARENT_DEPTH {
                break;
            }
            current = snapshot.parent_of(r);
        }
        None
    }
}
