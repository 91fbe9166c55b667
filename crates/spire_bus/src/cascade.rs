//! Cascade chains: bounded, cycle-safe event propagation.
//!
//! A cascade begins with `publish_cascade` and extends one hop at a time.
//! Two invariants hold for every chain: `hop_count <= max_hops`, and an
//! overlay id already in `visited_overlay_ids` is never re-invoked within
//! the chain. Violating either is a silent stop, not an error.

use serde::{Deserialize, Serialize};
use spire_core::{ChainId, EventId, OverlayId};
use std::collections::{BTreeSet, HashMap};

/// Upper bound on chain lineage walks
pub const MAX_LINEAGE_DEPTH: usize = 64;

/// A cascade chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CascadeChain {
    /// Chain identifier
    pub chain_id: ChainId,
    /// The event that started the cascade
    pub root_event_id: EventId,
    /// Chain that spawned this one, if any
    pub parent_chain: Option<ChainId>,
    /// Hops taken so far; monotonically non-decreasing
    pub hop_count: u32,
    /// Maximum hops before the chain terminates
    pub max_hops: u32,
    /// Overlays already visited within this chain
    pub visited_overlay_ids: BTreeSet<OverlayId>,
}

impl CascadeChain {
    /// Create a new chain rooted at an event
    #[must_use]
    pub fn new(root_event_id: EventId, max_hops: u32) -> Self {
        Self {
            chain_id: ChainId::new(),
            root_event_id,
            parent_chain: None,
            hop_count: 0,
            max_hops,
            visited_overlay_ids: BTreeSet::new(),
        }
    }

    /// Set the parent chain
    #[must_use]
    pub fn with_parent(mut self, parent: ChainId) -> Self {
        self.parent_chain = Some(parent);
        self
    }

    /// Hops remaining before the chain terminates
    #[must_use]
    pub const fn remaining_hops(&self) -> u32 {
        self.max_hops.saturating_sub(self.hop_count)
    }

    /// Whether the hop budget is exhausted
    #[must_use]
    pub const fn is_exhausted(&self) -> bool {
        self.hop_count >= self.max_hops
    }

    /// Take one hop if the budget allows
    ///
    /// Returns `false` without mutating anything when the budget is
    /// exhausted.
    pub fn record_hop(&mut self) -> bool {
        if self.is_exhausted() {
            return false;
        }
        self.hop_count += 1;
        true
    }

    /// Whether an overlay may still be visited within this chain
    #[must_use]
    pub fn can_visit(&self, overlay_id: OverlayId) -> bool {
        !self.visited_overlay_ids.contains(&overlay_id)
    }

    /// Admit an overlay into the chain
    ///
    /// Returns `false` if the overlay was already visited; the hop count
    /// is never touched here.
    pub fn mark_visited(&mut self, overlay_id: OverlayId) -> bool {
        self.visited_overlay_ids.insert(overlay_id)
    }
}

/// Compute the lineage depth of a chain: how many parent links separate
/// it from its root chain.
///
/// The walk is iterative with an explicit cursor, bounded by
/// [`MAX_LINEAGE_DEPTH`], and cycle-safe, so adversarial parent links
/// cannot overflow the stack or loop forever.
#[must_use]
pub fn chain_depth(chains: &HashMap<ChainId, CascadeChain>, start: ChainId) -> usize {
    let mut depth = 0;
    let mut seen = BTreeSet::new();
    let mut cursor = Some(start);

    while let Some(chain_id) = cursor {
        if depth >= MAX_LINEAGE_DEPTH || !seen.insert(chain_id) {
            break;
        }
        cursor = chains.get(&chain_id).and_then(|c| c.parent_chain);
        if cursor.is_some() {
            depth += 1;
        }
    }

    depth
}
