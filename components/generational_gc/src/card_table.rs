//! Card table over the old generation.
//!
//! Divides Old into fixed-size cards (512 bytes by default). A card is
//! marked dirty when a reference to a young object is stored into an old
//! object whose header lies in that card. Minor cycles scan only the dirty
//! cards instead of the whole old generation.
//!
//! Cards are atomic bytes so the write barrier can dirty them from any
//! mutator thread without taking a lock. Marking is a monotonic store;
//! scanning clears a card *before* reading the objects it covers, so a mark
//! that lands while the scan is in flight leaves the card dirty for the
//! next cycle. When in doubt a card stays dirty.

use crate::object::{ObjectGraph, ObjectId};
use log::debug;
use std::sync::atomic::{AtomicU8, Ordering};

const CLEAN: u8 = 0;
const DIRTY: u8 = 1;

/// Default card size in bytes.
pub const DEFAULT_CARD_SIZE: usize = 512;

/// What a card scan needs to know about the old generation.
pub trait CardScanView: ObjectGraph {
    /// Old objects whose storage overlaps `[start, end)`, in address order.
    fn objects_in(&self, start: usize, end: usize) -> Vec<ObjectId>;

    /// Returns true if `id` is in Eden or a survivor region.
    fn is_young(&self, id: ObjectId) -> bool;
}

/// Dirty bits for the old generation, one per card.
#[derive(Debug)]
pub struct CardTable {
    /// Table of dirty bytes, one per card
    cards: Vec<AtomicU8>,
    /// Size of each card in bytes (power of two)
    card_size: usize,
    /// Base address of the covered region
    base_address: usize,
    /// Total size of the covered region
    heap_size: usize,
}

impl CardTable {
    /// Creates a clean card table for `[base_address, base_address + heap_size)`.
    ///
    /// `card_size` must be a power of two; the configuration layer rejects
    /// anything else before a table is built.
    pub fn new(base_address: usize, heap_size: usize, card_size: usize) -> Self {
        debug_assert!(card_size.is_power_of_two());
        let num_cards = heap_size.div_ceil(card_size);
        CardTable {
            cards: (0..num_cards).map(|_| AtomicU8::new(CLEAN)).collect(),
            card_size,
            base_address,
            heap_size,
        }
    }

    /// Creates a card table with default 512-byte cards.
    pub fn with_default_card_size(base_address: usize, heap_size: usize) -> Self {
        Self::new(base_address, heap_size, DEFAULT_CARD_SIZE)
    }

    /// Marks the card containing `address` as dirty.
    ///
    /// Idempotent and safe to call concurrently. Returns false if the
    /// address lies outside the covered region.
    #[inline]
    pub fn mark_dirty(&self, address: usize) -> bool {
        match self.card_of(address) {
            Some(index) => {
                self.cards[index].store(DIRTY, Ordering::Release);
                true
            }
            None => false,
        }
    }

    /// Returns true if the card at `index` is dirty.
    pub fn is_dirty(&self, index: usize) -> bool {
        self.cards
            .get(index)
            .map_or(false, |card| card.load(Ordering::Acquire) == DIRTY)
    }

    /// Indices of all dirty cards, in address order.
    pub fn dirty_cards(&self) -> Vec<usize> {
        self.cards
            .iter()
            .enumerate()
            .filter_map(|(index, card)| (card.load(Ordering::Acquire) == DIRTY).then_some(index))
            .collect()
    }

    /// Scans one card and returns the old objects in it that reference
    /// young objects.
    ///
    /// The dirty bit is cleared before the objects are read. A concurrent
    /// `mark_dirty` on the same card after that point is therefore never
    /// lost. Holders found here must be re-dirtied by the caller if they
    /// still reference young objects once the cycle has moved everything.
    pub fn scan_and_clear<V>(&self, view: &V, index: usize) -> Vec<ObjectId>
    where
        V: CardScanView + ?Sized,
    {
        let Some(card) = self.cards.get(index) else {
            return Vec::new();
        };
        card.store(CLEAN, Ordering::SeqCst);

        let Some((start, end)) = self.card_range(index) else {
            return Vec::new();
        };
        let holders: Vec<ObjectId> = view
            .objects_in(start, end)
            .into_iter()
            .filter(|&holder| {
                view.references_of(holder)
                    .iter()
                    .flatten()
                    .any(|&target| view.is_young(target))
            })
            .collect();

        debug!("card {} scanned: {} old->young holders", index, holders.len());
        holders
    }

    /// Clears all dirty bits.
    pub fn clear_all(&self) {
        for card in &self.cards {
            card.store(CLEAN, Ordering::Release);
        }
    }

    /// Extends coverage after the old generation grew in place.
    ///
    /// Existing bits are kept; new cards start clean.
    pub fn resize(&mut self, heap_size: usize) {
        let num_cards = heap_size.div_ceil(self.card_size);
        self.cards.resize_with(num_cards, || AtomicU8::new(CLEAN));
        self.heap_size = heap_size;
    }

    /// Address range `[start, end)` covered by a card.
    pub fn card_range(&self, index: usize) -> Option<(usize, usize)> {
        if index >= self.cards.len() {
            return None;
        }
        let start = self.base_address + index * self.card_size;
        let end = (start + self.card_size).min(self.base_address + self.heap_size);
        Some((start, end))
    }

    /// Card index for an address.
    #[inline]
    pub fn card_of(&self, address: usize) -> Option<usize> {
        if address < self.base_address || address >= self.base_address + self.heap_size {
            return None;
        }
        Some((address - self.base_address) / self.card_size)
    }

    pub fn num_cards(&self) -> usize {
        self.cards.len()
    }

    pub fn dirty_count(&self) -> usize {
        self.cards
            .iter()
            .filter(|card| card.load(Ordering::Acquire) == DIRTY)
            .count()
    }

    pub fn card_size(&self) -> usize {
        self.card_size
    }
}
