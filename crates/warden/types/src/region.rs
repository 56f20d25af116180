//! The region entity
//!
//! A region is a named, shaped zone with a priority, an optional parent
//! (used only for flag inheritance), owner and member domains and a flag
//! table. Regions are plain values; the region index is responsible for
//! publishing them and for enforcing cross-region invariants such as unique
//! ids and acyclic parents.

use crate::domain::{Actor, Association, Domain};
use crate::error::{RegionError, Result};
use crate::flags::{FlagValue, RegionGroup};
use crate::geometry::{BlockPoint, Shape};
use crate::ids::RegionId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A protected region
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Region {
    id: RegionId,
    shape: Shape,
    #[serde(default)]
    priority: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    parent: Option<RegionId>,
    #[serde(default)]
    owners: Domain,
    #[serde(default)]
    members: Domain,
    #[serde(default)]
    flags: BTreeMap<String, FlagValue>,
}

impl Region {
    /// Create a region.
    ///
    /// The reserved global id and the global shape always go together.
    pub fn new(id: RegionId, shape: Shape) -> Result<Self> {
        match (&shape, id.is_global()) {
            (Shape::Global, false) => {
                return Err(RegionError::InvalidShape(format!(
                    "only '{}' may use the global shape",
                    crate::ids::GLOBAL_REGION
                )))
            }
            (Shape::Cuboid(_) | Shape::Polygon(_), true) => {
                return Err(RegionError::ReservedId(id.to_string()))
            }
            _ => {}
        }
        Ok(Self {
            id,
            shape,
            priority: 0,
            parent: None,
            owners: Domain::new(),
            members: Domain::new(),
            flags: BTreeMap::new(),
        })
    }

    /// The world-wide region.
    pub fn global() -> Self {
        Self {
            id: RegionId::global(),
            shape: Shape::Global,
            priority: 0,
            parent: None,
            owners: Domain::new(),
            members: Domain::new(),
            flags: BTreeMap::new(),
        }
    }

    pub fn id(&self) -> &RegionId {
        &self.id
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub fn priority(&self) -> i32 {
        self.priority
    }

    pub fn parent(&self) -> Option<&RegionId> {
        self.parent.as_ref()
    }

    pub fn owners(&self) -> &Domain {
        &self.owners
    }

    pub fn members(&self) -> &Domain {
        &self.members
    }

    pub fn owners_mut(&mut self) -> &mut Domain {
        &mut self.owners
    }

    pub fn members_mut(&mut self) -> &mut Domain {
        &mut self.members
    }

    pub fn flags(&self) -> &BTreeMap<String, FlagValue> {
        &self.flags
    }

    pub fn is_global(&self) -> bool {
        matches!(self.shape, Shape::Global)
    }

    /// Ordering key for resolution; the global region sinks below everything
    /// else until its priority is set explicitly.
    pub fn effective_priority(&self) -> i64 {
        if self.is_global() && self.priority == 0 {
            i64::MIN
        } else {
            self.priority as i64
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_parent(mut self, parent: Option<RegionId>) -> Self {
        self.parent = parent;
        self
    }

    pub fn with_flag(mut self, key: impl Into<String>, value: FlagValue) -> Self {
        self.set_flag(key, Some(value));
        self
    }

    pub fn set_priority(&mut self, priority: i32) {
        self.priority = priority;
    }

    /// Set the parent pointer.
    ///
    /// Acyclicity is checked by the index when the region is published.
    pub fn set_parent(&mut self, parent: Option<RegionId>) {
        self.parent = parent;
    }

    /// Set or clear a flag. Returns the previous value.
    pub fn set_flag(&mut self, key: impl Into<String>, value: Option<FlagValue>) -> Option<FlagValue> {
        let key = key.into().to_lowercase();
        match value {
            Some(v) => self.flags.insert(key, v),
            None => self.flags.remove(&key),
        }
    }

    pub fn flag(&self, key: &str) -> Option<&FlagValue> {
        self.flags.get(&key.to_lowercase())
    }

    /// Group selector stored on this region for a group flag key.
    pub fn group_flag(&self, key: &str) -> Option<RegionGroup> {
        self.flag(key).and_then(FlagValue::as_group)
    }

    /// Replace the shape, keeping everything else.
    pub fn with_shape(mut self, shape: Shape) -> Result<Self> {
        if shape.is_physical_area() == self.id.is_global() {
            return Err(RegionError::InvalidShape(format!(
                "cannot give region '{}' a {} shape",
                self.id,
                shape.kind()
            )));
        }
        self.shape = shape;
        Ok(self)
    }

    /// Copy priority, parent, domains and flags from another region.
    pub fn copy_from(&mut self, other: &Region) {
        self.priority = other.priority;
        self.parent = other.parent.clone();
        self.owners = other.owners.clone();
        self.members = other.members.clone();
        self.flags = other.flags.clone();
    }

    pub fn contains(&self, point: BlockPoint) -> bool {
        self.shape.contains(point)
    }

    pub fn intersects(&self, shape: &Shape) -> bool {
        self.shape.intersects(shape)
    }

    pub fn volume(&self) -> u64 {
        self.shape.volume()
    }

    pub fn is_owner(&self, actor: &Actor) -> bool {
        self.owners.contains(actor)
    }

    /// Owners are implicitly members.
    pub fn is_member(&self, actor: &Actor) -> bool {
        self.is_owner(actor) || self.members.contains(actor)
    }

    /// Strongest association of the actor with this region.
    pub fn association(&self, actor: &Actor) -> Association {
        if self.is_owner(actor) {
            Association::Owner
        } else if self.members.contains(actor) {
            Association::Member
        } else {
            Association::NonMember
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flags::StateValue;
    use crate::ids::PlayerId;

    fn spawn() -> Region {
        Region::new(
            RegionId::new("spawn").unwrap(),
            Shape::cuboid(BlockPoint::new(0, 0, 0), BlockPoint::new(10, 10, 10)),
        )
        .unwrap()
    }

    #[test]
    fn test_global_shape_reserved() {
        let err = Region::new(RegionId::new("town").unwrap(), Shape::Global).unwrap_err();
        assert!(matches!(err, RegionError::InvalidShape(_)));
        let err = Region::new(
            RegionId::global(),
            Shape::cuboid(BlockPoint::new(0, 0, 0), BlockPoint::new(1, 1, 1)),
        )
        .unwrap_err();
        assert!(matches!(err, RegionError::ReservedId(_)));
        assert!(Region::new(RegionId::global(), Shape::Global).is_ok());
    }

    #[test]
    fn test_owner_is_member() {
        let alice = Actor::new(PlayerId::generate(), "alice");
        let mut region = spawn();
        region.owners_mut().add_player(alice.id);
        region.members_mut().add_player(alice.id);
        assert!(region.is_member(&alice));
        assert_eq!(region.association(&alice), Association::Owner);
    }

    #[test]
    fn test_flag_keys_are_case_insensitive() {
        let mut region = spawn().with_flag("Build", StateValue::Deny.into());
        assert_eq!(region.flag("BUILD"), Some(&FlagValue::State(StateValue::Deny)));
        assert!(region.set_flag("build", None).is_some());
        assert!(region.flags().is_empty());
    }

    #[test]
    fn test_global_effective_priority() {
        let global = Region::global();
        assert_eq!(global.effective_priority(), i64::MIN);
        assert_eq!(global.with_priority(5).effective_priority(), 5);
        assert_eq!(spawn().effective_priority(), 0);
    }

    #[test]
    fn test_copy_from_keeps_shape() {
        let mut source = spawn().with_priority(7).with_flag("pvp", StateValue::Deny.into());
        source.owners_mut().add_name("bob");
        let mut target = Region::new(
            RegionId::new("spawn").unwrap(),
            Shape::cuboid(BlockPoint::new(0, 0, 0), BlockPoint::new(3, 3, 3)),
        )
        .unwrap();
        target.copy_from(&source);
        assert_eq!(target.priority(), 7);
        assert!(target.owners().contains_name("BOB"));
        assert_eq!(target.volume(), 64);
    }

    #[test]
    fn test_serde_roundtrip_preserves_everything() {
        let mut region = spawn()
            .with_priority(-3)
            .with_parent(Some(RegionId::new("Town").unwrap()))
            .with_flag("build-group", RegionGroup::NonMembers.into());
        region.members_mut().add_group("builders");
        let json = serde_json::to_string(&region).unwrap();
        let back: Region = serde_json::from_str(&json).unwrap();
        assert_eq!(back, region);
        assert_eq!(back.parent().unwrap().as_str(), "Town");
    }
}
