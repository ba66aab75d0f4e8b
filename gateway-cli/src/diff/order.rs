//! Dependency ordering of entity kinds
//!
//! Kinds are partitioned into a fixed sequence of levels such that every
//! foreign reference points at a strictly lower level. Creates and updates
//! walk the levels ascending, deletes walk them descending, and the solver
//! drains each level completely before starting the next.

use std::collections::HashMap;

use once_cell::sync::Lazy;

use crate::diff::Event;
use crate::state::types::Kind;

/// Kinds grouped by dependency level, lowest (no parents) first.
pub const LEVELS: [&[Kind]; 4] = [
    &[
        Kind::ServicePackage,
        Kind::Certificate,
        Kind::CACertificate,
        Kind::Consumer,
        Kind::ConsumerGroup,
        Kind::RbacRole,
        Kind::Vault,
        Kind::KeySet,
    ],
    &[
        Kind::Service,
        Kind::Upstream,
        Kind::Sni,
        Kind::Key,
        Kind::RbacEndpointPermission,
        Kind::KeyAuth,
        Kind::BasicAuth,
        Kind::JwtAuth,
        Kind::HmacAuth,
        Kind::AclGroup,
    ],
    &[Kind::Route, Kind::Target, Kind::ServiceVersion],
    &[Kind::Plugin, Kind::Document],
];

static LEVEL_INDEX: Lazy<HashMap<Kind, usize>> = Lazy::new(|| {
    let mut index = HashMap::new();
    for (level, kinds) in LEVELS.iter().enumerate() {
        for kind in *kinds {
            index.insert(*kind, level);
        }
    }
    index
});

/// The dependency level of a kind.
pub fn level_of(kind: Kind) -> usize {
    // Every Kind variant appears in LEVELS; the fallback is unreachable.
    LEVEL_INDEX.get(&kind).copied().unwrap_or(0)
}

/// Levels in creation order (parents before children).
pub fn insert_order() -> impl Iterator<Item = &'static [Kind]> {
    LEVELS.iter().copied()
}

/// Levels in deletion order (children before parents).
pub fn delete_order() -> impl Iterator<Item = &'static [Kind]> {
    LEVELS.iter().rev().copied()
}

/// Group events by the dependency level of their kind, preserving relative
/// order within a level.
pub fn partition(events: Vec<Event>) -> [Vec<Event>; LEVELS.len()] {
    let mut grouped: [Vec<Event>; LEVELS.len()] = std::array::from_fn(|_| Vec::new());
    for event in events {
        grouped[level_of(event.kind)].push(event);
    }
    grouped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_kind_has_exactly_one_level() {
        let mut seen = HashMap::new();
        for kinds in LEVELS {
            for kind in kinds {
                *seen.entry(*kind).or_insert(0) += 1;
            }
        }
        for kind in Kind::all() {
            assert_eq!(seen.get(kind), Some(&1), "{kind} must appear once");
        }
    }

    #[test]
    fn test_references_point_strictly_downward() {
        for kind in Kind::all() {
            for parent in kind.reference_kinds() {
                assert!(
                    level_of(*parent) < level_of(*kind),
                    "{kind} references {parent} at the same or higher level"
                );
            }
        }
    }

    #[test]
    fn test_partition_groups_by_level() {
        use crate::diff::EventOp;
        use crate::state::types::{Payload, Route, Service};

        let events = vec![
            Event {
                op: EventOp::Create,
                kind: Kind::Route,
                obj: Payload::Route(Route::default()),
                old_obj: None,
            },
            Event {
                op: EventOp::Create,
                kind: Kind::Service,
                obj: Payload::Service(Service::default()),
                old_obj: None,
            },
        ];
        let grouped = partition(events);
        assert!(grouped[0].is_empty());
        assert_eq!(grouped[1].len(), 1);
        assert_eq!(grouped[1][0].kind, Kind::Service);
        assert_eq!(grouped[2].len(), 1);
        assert_eq!(grouped[2][0].kind, Kind::Route);
        assert!(grouped[3].is_empty());
    }

    #[test]
    fn test_delete_order_reverses_insert_order() {
        let forward: Vec<_> = insert_order().collect();
        let mut backward: Vec<_> = delete_order().collect();
        backward.reverse();
        assert_eq!(forward, backward);
    }
}
