//! Ownership domains and actor association
//!
//! A [`Domain`] is the set of identities (players by stable id, legacy
//! players by name, and permission groups) that belong to a region's owner
//! or member list. An [`Actor`] is the identity a query is evaluated for.

use crate::ids::PlayerId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// The identity a query is evaluated for
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    /// Stable player id
    pub id: PlayerId,

    /// Current player name
    pub name: String,

    /// Permission groups the player belongs to
    pub groups: Vec<String>,
}

impl Actor {
    pub fn new(id: PlayerId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            groups: Vec::new(),
        }
    }

    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.groups.push(group.into());
        self
    }
}

/// How an actor relates to a region.
///
/// Ordered so that the strongest association compares greatest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Association {
    NonMember,
    Member,
    Owner,
}

/// A set of players and groups
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Domain {
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    players: BTreeSet<PlayerId>,

    /// Legacy name-keyed players, stored lowercased
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    names: BTreeSet<String>,

    /// Group names, stored lowercased
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    groups: BTreeSet<String>,
}

impl Domain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_player(&mut self, id: PlayerId) -> bool {
        self.players.insert(id)
    }

    pub fn remove_player(&mut self, id: &PlayerId) -> bool {
        self.players.remove(id)
    }

    pub fn add_name(&mut self, name: &str) -> bool {
        self.names.insert(name.to_lowercase())
    }

    pub fn remove_name(&mut self, name: &str) -> bool {
        self.names.remove(&name.to_lowercase())
    }

    pub fn add_group(&mut self, group: &str) -> bool {
        self.groups.insert(group.to_lowercase())
    }

    pub fn remove_group(&mut self, group: &str) -> bool {
        self.groups.remove(&group.to_lowercase())
    }

    pub fn players(&self) -> &BTreeSet<PlayerId> {
        &self.players
    }

    pub fn names(&self) -> &BTreeSet<String> {
        &self.names
    }

    pub fn groups(&self) -> &BTreeSet<String> {
        &self.groups
    }

    /// Take all name-keyed entries out of the domain.
    pub fn take_names(&mut self) -> BTreeSet<String> {
        std::mem::take(&mut self.names)
    }

    pub fn contains_player(&self, id: &PlayerId) -> bool {
        self.players.contains(id)
    }

    pub fn contains_name(&self, name: &str) -> bool {
        self.names.contains(&name.to_lowercase())
    }

    /// Whether the actor is in this domain by id, name, or any of its groups.
    pub fn contains(&self, actor: &Actor) -> bool {
        self.players.contains(&actor.id)
            || self.contains_name(&actor.name)
            || actor
                .groups
                .iter()
                .any(|g| self.groups.contains(&g.to_lowercase()))
    }

    pub fn size(&self) -> usize {
        self.players.len() + self.names.len() + self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Add every entry of another domain.
    pub fn merge(&mut self, other: &Domain) {
        self.players.extend(other.players.iter().copied());
        self.names.extend(other.names.iter().cloned());
        self.groups.extend(other.groups.iter().cloned());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_domain_contains_by_any_identity() {
        let alice = Actor::new(PlayerId::generate(), "Alice").with_group("Builders");
        let mut domain = Domain::new();
        assert!(!domain.contains(&alice));

        domain.add_name("alice");
        assert!(domain.contains(&alice));

        let mut by_group = Domain::new();
        by_group.add_group("builders");
        assert!(by_group.contains(&alice));

        let mut by_id = Domain::new();
        by_id.add_player(alice.id);
        assert!(by_id.contains(&alice));
        assert_eq!(by_id.size(), 1);
    }

    #[test]
    fn test_association_ordering() {
        assert!(Association::Owner > Association::Member);
        assert!(Association::Member > Association::NonMember);
    }

    #[test]
    fn test_take_names() {
        let mut domain = Domain::new();
        domain.add_name("Bob");
        domain.add_group("staff");
        let names = domain.take_names();
        assert!(names.contains("bob"));
        assert_eq!(domain.size(), 1);
    }
}
