// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Scaling decisions.
//!
//! Low ordinals form the stable set: scaling down removes the highest
//! ordinals first, scaling up continues from `max(existing) + 1` so a new
//! container never shares an ordinal with a retained one.

use crate::domain::container::Container;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScaleDecision {
    /// Containers that stay, lowest ordinal first.
    pub retain: Vec<Container>,
    /// Containers to stop and remove, highest ordinal first.
    pub remove: Vec<Container>,
    /// Ordinals to create, ascending.
    pub create: Vec<u32>,
}

/// Split `existing` into retained / removed containers and the ordinals to
/// create so that exactly `desired` containers remain.
///
/// Containers without a decodable ordinal are ignored; they are not ours.
pub fn decide(existing: Vec<Container>, desired: u32) -> ScaleDecision {
    let mut owned: Vec<(u32, Container)> = existing
        .into_iter()
        .filter_map(|c| c.ordinal().map(|ordinal| (ordinal, c)))
        .collect();
    owned.sort_by_key(|(ordinal, _)| *ordinal);

    let desired = desired as usize;
    let next_ordinal = owned.last().map(|(ordinal, _)| ordinal + 1).unwrap_or(1);

    if owned.len() > desired {
        let mut removed: Vec<Container> = owned.split_off(desired).into_iter().map(|(_, c)| c).collect();
        removed.reverse();
        return ScaleDecision {
            retain: owned.into_iter().map(|(_, c)| c).collect(),
            remove: removed,
            create: Vec::new(),
        };
    }

    let missing = (desired - owned.len()) as u32;
    ScaleDecision {
        retain: owned.into_iter().map(|(_, c)| c).collect(),
        remove: Vec::new(),
        create: (next_ordinal..next_ordinal + missing).collect(),
    }
}

/// Desired container count for a service: an explicit override wins, then
/// the number of containers that already exist, then the declared scale.
///
/// Zero is a valid answer from every source; a no-argument `up` after scaling
/// to zero keeps the service at zero.
pub fn resolve_desired_scale(explicit: Option<u32>, existing: usize, declared: u32) -> u32 {
    match explicit {
        Some(scale) => scale,
        None if existing > 0 => existing as u32,
        None => declared,
    }
}
