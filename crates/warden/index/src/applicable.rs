//! Ordered result of a point or shape query

use crate::snapshot::RegionSet;
use std::sync::Arc;
use warden_types::{Actor, Association, Region, RegionId};

/// Regions matching a query, highest effective priority first.
///
/// Ties keep insertion order. The set holds the snapshot it was computed
/// from, so parent lookups during flag resolution see the same state.
#[derive(Debug, Clone)]
pub struct ApplicableRegionSet {
    snapshot: Arc<RegionSet>,
    ordered: Vec<usize>,
}

impl ApplicableRegionSet {
    pub(crate) fn new(snapshot: Arc<RegionSet>, mut positions: Vec<usize>) -> Self {
        positions.sort_by(|&a, &b| {
            let (ra, rb) = (snapshot.at(a), snapshot.at(b));
            rb.effective_priority()
                .cmp(&ra.effective_priority())
                .then(a.cmp(&b))
        });
        Self {
            snapshot,
            ordered: positions,
        }
    }

    /// Snapshot the set was computed against
    pub fn snapshot(&self) -> &Arc<RegionSet> {
        &self.snapshot
    }

    pub fn len(&self) -> usize {
        self.ordered.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ordered.is_empty()
    }

    /// Regions in resolution order.
    pub fn iter(&self) -> impl Iterator<Item = &Region> + '_ {
        self.ordered.iter().map(move |&pos| self.snapshot.at(pos))
    }

    pub fn ids(&self) -> Vec<RegionId> {
        self.iter().map(|r| r.id().clone()).collect()
    }

    /// Same set with the global region removed.
    pub fn without_global(&self) -> Self {
        let ordered = self
            .ordered
            .iter()
            .copied()
            .filter(|&pos| !self.snapshot.at(pos).is_global())
            .collect();
        Self {
            snapshot: Arc::clone(&self.snapshot),
            ordered,
        }
    }

    pub fn contains_id(&self, id: &RegionId) -> bool {
        self.iter().any(|r| r.id() == id)
    }

    /// Strongest association of the actor with any region in the set.
    pub fn association(&self, actor: &Actor) -> Association {
        self.iter()
            .map(|r| r.association(actor))
            .max()
            .unwrap_or(Association::NonMember)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use warden_types::{BlockPoint, PlayerId, Shape};

    fn boxed(id: &str, priority: i32) -> Arc<Region> {
        Arc::new(
            Region::new(
                RegionId::new(id).unwrap(),
                Shape::cuboid(BlockPoint::new(0, 0, 0), BlockPoint::new(10, 10, 10)),
            )
            .unwrap()
            .with_priority(priority),
        )
    }

    #[test]
    fn test_priority_then_insertion_order() {
        let set = Arc::new(RegionSet::build(
            "world".into(),
            vec![
                Arc::new(Region::global()),
                boxed("low", -1),
                boxed("first", 5),
                boxed("second", 5),
                boxed("top", 9),
            ],
            8,
        ));
        let hits = set.applicable_at(BlockPoint::new(1, 1, 1));
        let ids: Vec<_> = hits.iter().map(|r| r.id().as_str().to_string()).collect();
        assert_eq!(ids, vec!["top", "first", "second", "low", "__global__"]);
        assert_eq!(hits.without_global().len(), 4);
    }

    #[test]
    fn test_raised_global_priority_sorts_normally() {
        let set = Arc::new(RegionSet::build(
            "world".into(),
            vec![boxed("plot", 1), Arc::new(Region::global().with_priority(3))],
            8,
        ));
        let ids = set.applicable_at(BlockPoint::new(1, 1, 1)).ids();
        assert!(ids[0].is_global());
    }

    #[test]
    fn test_association_takes_strongest() {
        let alice = Actor::new(PlayerId::generate(), "alice");
        let mut owned = (*boxed("owned", 0)).clone();
        owned.owners_mut().add_player(alice.id);
        let mut joined = (*boxed("joined", 1)).clone();
        joined.members_mut().add_player(alice.id);
        let set = Arc::new(RegionSet::build(
            "world".into(),
            vec![Arc::new(owned), Arc::new(joined)],
            8,
        ));
        let hits = set.applicable_at(BlockPoint::new(2, 2, 2));
        assert_eq!(hits.association(&alice), Association::Owner);
        let bob = Actor::new(PlayerId::generate(), "bob");
        assert_eq!(hits.association(&bob), Association::NonMember);
    }
}
