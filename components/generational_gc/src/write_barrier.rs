//! Write barrier for generational collection.
//!
//! When an old object stores a reference to a young object, the card
//! covering the old object is dirtied so the next minor cycle treats it as
//! a root. This is the only thing that lets a minor cycle skip the rest of
//! the old generation.
//!
//! The heap exposes reference-field mutation only through
//! [`GenerationalHeap::store`](crate::heap::GenerationalHeap::store), which
//! runs the barrier before the new value becomes visible.

use crate::card_table::CardTable;
use crate::object::Generation;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counters kept by the barrier.
#[derive(Debug, Default)]
pub struct BarrierStats {
    invocations: AtomicU64,
    cards_dirtied: AtomicU64,
}

impl BarrierStats {
    /// Snapshot of the counters.
    pub fn snapshot(&self) -> BarrierSnapshot {
        BarrierSnapshot {
            invocations: self.invocations.load(Ordering::Relaxed),
            cards_dirtied: self.cards_dirtied.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`BarrierStats`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BarrierSnapshot {
    /// Reference stores observed
    pub invocations: u64,
    /// Stores that created an old-to-young reference
    pub cards_dirtied: u64,
}

/// The store hook. Cheap to construct; borrows the card table.
#[derive(Clone, Copy)]
pub struct WriteBarrier<'a> {
    cards: &'a CardTable,
    stats: &'a BarrierStats,
}

impl<'a> WriteBarrier<'a> {
    pub fn new(cards: &'a CardTable, stats: &'a BarrierStats) -> Self {
        WriteBarrier { cards, stats }
    }

    /// Records a store of `new_value` into field `field_index` of an
    /// object in `holder` generation living at `holder_address`.
    ///
    /// Dirties the holder's card iff the holder is old and the new value
    /// is young. Old-to-old, young-to-anything and null stores are no-ops.
    /// Returns true if a card was dirtied.
    #[inline]
    pub fn on_store(
        &self,
        holder: Generation,
        holder_address: usize,
        _field_index: usize,
        new_value: Option<Generation>,
    ) -> bool {
        self.stats.invocations.fetch_add(1, Ordering::Relaxed);

        let old_to_young = holder == Generation::Old && new_value.is_some_and(Generation::is_young);
        if old_to_young && self.cards.mark_dirty(holder_address) {
            self.stats.cards_dirtied.fetch_add(1, Ordering::Relaxed);
            return true;
        }
        false
    }
}
