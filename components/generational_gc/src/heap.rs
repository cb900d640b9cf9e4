//! Generational heap.
//!
//! This module implements a generational heap with:
//! - Eden: bump-pointer allocation of new objects
//! - Two survivor regions: copying target for young objects that survive a
//!   minor cycle, swapping roles every cycle
//! - Old generation: promoted objects, mark-sweep-compacted by major cycles
//! - A card table over Old, maintained by the write barrier, so minor cycles
//!   find old-to-young references without scanning all of Old
//!
//! Objects are named by [`ObjectId`] handles into a forwarding table.
//! Relocation rewrites the table entry; holders of a handle never change.

use crate::card_table::{CardScanView, CardTable};
use crate::config::{validate_promotion_threshold, GcConfig};
use crate::error::{GcError, GcResult};
use crate::object::{Generation, ObjectGraph, ObjectId, MAX_AGE};
use crate::region::{align_size, MemoryProvider, Region, RegionKind, Relocation, SimulatedMemory};
use crate::tracer::{ScanLimit, TraceStats, TriColorTracer};
use crate::write_barrier::{BarrierSnapshot, BarrierStats, WriteBarrier};
use log::{debug, warn};
use serde::Serialize;
use std::collections::HashSet;

/// Per-object metadata kept in the forwarding table.
#[derive(Debug, Clone)]
struct ObjectRecord {
    generation: Generation,
    age: u8,
    region: RegionKind,
    address: usize,
    /// Aligned storage size
    size: usize,
    fields: Vec<Option<ObjectId>>,
}

#[derive(Debug, Default)]
struct Slot {
    epoch: u32,
    record: Option<ObjectRecord>,
}

/// Forwarding table: handle slot -> current record.
#[derive(Debug)]
struct ObjectTable {
    slots: Vec<Slot>,
    free: Vec<u32>,
    live: usize,
    /// Slots at or above this index are never handed out
    slot_limit: u32,
}

impl Default for ObjectTable {
    fn default() -> Self {
        ObjectTable {
            slots: Vec::new(),
            free: Vec::new(),
            live: 0,
            slot_limit: u32::MAX,
        }
    }
}

impl ObjectTable {
    /// Returns None once every handle slot is in use.
    fn insert(&mut self, record: ObjectRecord) -> Option<ObjectId> {
        let id = if let Some(slot) = self.free.pop() {
            let entry = &mut self.slots[slot as usize];
            entry.record = Some(record);
            ObjectId::new(slot, entry.epoch)
        } else {
            let slot = u32::try_from(self.slots.len())
                .ok()
                .filter(|&slot| slot < self.slot_limit)?;
            self.slots.push(Slot {
                epoch: 0,
                record: Some(record),
            });
            ObjectId::new(slot, 0)
        };
        self.live += 1;
        Some(id)
    }

    fn get(&self, id: ObjectId) -> Option<&ObjectRecord> {
        self.slots
            .get(id.slot as usize)
            .filter(|entry| entry.epoch == id.epoch)
            .and_then(|entry| entry.record.as_ref())
    }

    fn get_mut(&mut self, id: ObjectId) -> Option<&mut ObjectRecord> {
        self.slots
            .get_mut(id.slot as usize)
            .filter(|entry| entry.epoch == id.epoch)
            .and_then(|entry| entry.record.as_mut())
    }

    /// Reclaims the slot. The epoch bump invalidates outstanding handles.
    fn remove(&mut self, id: ObjectId) -> Option<ObjectRecord> {
        let entry = self.slots.get_mut(id.slot as usize)?;
        if entry.epoch != id.epoch {
            return None;
        }
        let record = entry.record.take()?;
        entry.epoch = entry.epoch.wrapping_add(1);
        self.free.push(id.slot);
        self.live -= 1;
        Some(record)
    }

    fn generation(&self, id: ObjectId) -> Option<Generation> {
        self.get(id).map(|record| record.generation)
    }

    fn is_young(&self, id: ObjectId) -> bool {
        self.generation(id).is_some_and(Generation::is_young)
    }

    fn references_young(&self, id: ObjectId) -> bool {
        self.get(id).is_some_and(|record| {
            record
                .fields
                .iter()
                .flatten()
                .any(|&target| self.is_young(target))
        })
    }

    fn apply(&mut self, relocations: &[Relocation]) {
        for relocation in relocations {
            if let Some(record) = self.get_mut(relocation.id) {
                record.address = relocation.to;
            }
        }
    }
}

impl ObjectGraph for ObjectTable {
    fn references_of(&self, id: ObjectId) -> &[Option<ObjectId>] {
        self.get(id).map(|record| record.fields.as_slice()).unwrap_or(&[])
    }

    fn size_of(&self, id: ObjectId) -> usize {
        self.get(id).map_or(0, |record| record.size)
    }
}

/// Card-scan view over the old region.
struct OldView<'a> {
    table: &'a ObjectTable,
    old: &'a Region,
}

impl ObjectGraph for OldView<'_> {
    fn references_of(&self, id: ObjectId) -> &[Option<ObjectId>] {
        self.table.references_of(id)
    }

    fn size_of(&self, id: ObjectId) -> usize {
        self.table.size_of(id)
    }
}

impl CardScanView for OldView<'_> {
    fn objects_in(&self, start: usize, end: usize) -> Vec<ObjectId> {
        self.old.residents_in(start, end)
    }

    fn is_young(&self, id: ObjectId) -> bool {
        self.table.is_young(id)
    }
}

/// Public snapshot of one object's metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjectInfo {
    pub generation: Generation,
    pub age: u8,
    pub region: RegionKind,
    pub address: usize,
    pub size: usize,
    pub field_count: usize,
}

/// Occupancy of every region.
#[derive(Debug, Default, Clone, Copy, PartialEq, Serialize)]
pub struct HeapStats {
    pub eden_used: usize,
    pub eden_capacity: usize,
    pub survivor_used: usize,
    pub survivor_capacity: usize,
    pub old_used: usize,
    pub old_capacity: usize,
    pub live_objects: usize,
}

/// Survival signal of the last minor cycle, for adaptive promotion.
#[derive(Debug, Default, Clone, Copy, PartialEq, Serialize)]
pub struct SurvivalStats {
    /// Young objects present when the cycle started
    pub young_before: usize,
    /// Young objects found reachable
    pub survived: usize,
    /// Survivors moved into Old
    pub promoted: usize,
    /// `survived / young_before`, 0 when there were no young objects
    pub rate: f64,
}

/// Result of a minor cycle.
#[derive(Debug, Default, Clone)]
pub struct MinorOutcome {
    pub objects_reclaimed: usize,
    pub bytes_reclaimed: usize,
    /// Survivors copied into the target survivor region
    pub survived: usize,
    /// Survivors promoted because they reached the threshold
    pub promoted: usize,
    /// Survivors promoted early because the survivor region was full
    pub overflow_promoted: usize,
    /// Live objects left in place because no region could take them
    pub retained: usize,
    /// Old could not take an object that should have been promoted
    pub promotion_failed: bool,
    /// Dirty cards scanned
    pub cards_scanned: usize,
    /// Young objects rooted only through dirty cards
    pub card_roots: usize,
    pub trace: TraceStats,
    pub survival: SurvivalStats,
}

/// Result of a major cycle.
#[derive(Debug, Default, Clone)]
pub struct MajorOutcome {
    pub objects_reclaimed: usize,
    pub bytes_reclaimed: usize,
    pub live_objects: usize,
    /// Forwarding map of old objects moved by compaction
    pub old_relocations: Vec<Relocation>,
    /// Old capacity added after the cycle
    pub old_grown_by: usize,
    pub trace: TraceStats,
}

enum Evacuation {
    Survived,
    Promoted { overflow: bool },
    Retained,
}

/// The generational heap.
pub struct GenerationalHeap {
    config: GcConfig,
    provider: Box<dyn MemoryProvider>,
    table: ObjectTable,
    eden: Region,
    survivor_a: Region,
    survivor_b: Region,
    /// Survivor region currently holding survivors; its sibling is the
    /// evacuation target of the next minor cycle
    from_survivor: RegionKind,
    old: Region,
    cards: CardTable,
    barrier_stats: BarrierStats,
    promotion_threshold: u8,
    survival: SurvivalStats,
}

impl GenerationalHeap {
    /// Creates a heap backed by an unbounded simulated address space.
    pub fn new(config: GcConfig) -> GcResult<Self> {
        Self::with_provider(config, Box::new(SimulatedMemory::unbounded()))
    }

    /// Creates a heap, reserving every region from `provider`.
    pub fn with_provider(config: GcConfig, mut provider: Box<dyn MemoryProvider>) -> GcResult<Self> {
        config.validate()?;
        let survivor_size = config.survivor_size();

        let eden = Region::new(
            RegionKind::Eden,
            provider.reserve(RegionKind::Eden, config.eden_size)?,
            config.eden_size,
        );
        let survivor_a = Region::new(
            RegionKind::SurvivorA,
            provider.reserve(RegionKind::SurvivorA, survivor_size)?,
            survivor_size,
        );
        let survivor_b = Region::new(
            RegionKind::SurvivorB,
            provider.reserve(RegionKind::SurvivorB, survivor_size)?,
            survivor_size,
        );
        let old_base = provider.reserve(RegionKind::Old, config.old_size)?;
        let old = Region::new(RegionKind::Old, old_base, config.old_size);
        let cards = CardTable::new(old_base, config.old_size, config.card_size);

        debug!(
            "heap reserved: eden {} bytes, survivors 2x{} bytes, old {} bytes",
            config.eden_size, survivor_size, config.old_size
        );

        Ok(GenerationalHeap {
            promotion_threshold: config.promotion_threshold,
            config,
            provider,
            table: ObjectTable::default(),
            eden,
            survivor_a,
            survivor_b,
            from_survivor: RegionKind::SurvivorA,
            old,
            cards,
            barrier_stats: BarrierStats::default(),
            survival: SurvivalStats::default(),
        })
    }

    // -----------------------------------------------------------------------
    // Allocation and field access
    // -----------------------------------------------------------------------

    /// Bump-allocates an object with `field_count` null reference fields.
    ///
    /// Returns None when Eden lacks room; collection and retry are the
    /// orchestrator's job.
    pub fn try_allocate(&mut self, size: usize, field_count: usize) -> Option<ObjectId> {
        let size = align_size(size);
        if size > self.eden.free() {
            return None;
        }
        let Some(id) = self.table.insert(ObjectRecord {
            generation: Generation::Eden,
            age: 0,
            region: RegionKind::Eden,
            address: 0,
            size,
            fields: vec![None; field_count],
        }) else {
            warn!("object handles exhausted at {} live objects", self.table.live);
            return None;
        };
        match self.eden.try_bump(id, size) {
            Some(address) => {
                if let Some(record) = self.table.get_mut(id) {
                    record.address = address;
                }
                Some(id)
            }
            None => {
                self.table.remove(id);
                None
            }
        }
    }

    /// Reads reference field `index` of `holder`.
    pub fn load(&self, holder: ObjectId, index: usize) -> GcResult<Option<ObjectId>> {
        let record = self.table.get(holder).ok_or(GcError::StaleHandle(holder))?;
        record
            .fields
            .get(index)
            .copied()
            .ok_or(GcError::FieldOutOfBounds {
                object: holder,
                index,
                len: record.fields.len(),
            })
    }

    /// Stores `value` into reference field `index` of `holder`.
    ///
    /// This is the only way to mutate a reference field. The write barrier
    /// runs before the new value is written.
    pub fn store(&mut self, holder: ObjectId, index: usize, value: Option<ObjectId>) -> GcResult<()> {
        let value_generation = match value {
            Some(target) => Some(self.table.generation(target).ok_or(GcError::StaleHandle(target))?),
            None => None,
        };
        let record = self.table.get(holder).ok_or(GcError::StaleHandle(holder))?;
        if index >= record.fields.len() {
            return Err(GcError::FieldOutOfBounds {
                object: holder,
                index,
                len: record.fields.len(),
            });
        }

        WriteBarrier::new(&self.cards, &self.barrier_stats).on_store(
            record.generation,
            record.address,
            index,
            value_generation,
        );

        if let Some(record) = self.table.get_mut(holder) {
            record.fields[index] = value;
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Minor collection
    // -----------------------------------------------------------------------

    /// Collects the young generation.
    ///
    /// Traces from the young external roots plus the young referents of old
    /// objects on dirty cards, evacuates survivors into the other survivor
    /// region or Old, reclaims the rest, and swaps survivor roles.
    pub fn minor_collect(
        &mut self,
        tracer: &mut TriColorTracer,
        external_roots: &[ObjectId],
    ) -> GcResult<MinorOutcome> {
        let mut outcome = MinorOutcome::default();
        let from_kind = self.from_survivor;
        let to_kind = from_kind.sibling();
        debug_assert_eq!(self.survivor(to_kind).resident_count(), 0);

        let from_residents: Vec<ObjectId> = self.survivor(from_kind).residents().collect();
        let eden_residents: Vec<ObjectId> = self.eden.residents().collect();
        let young_before = from_residents.len() + eden_residents.len();

        // Old objects on dirty cards that reference young objects.
        let dirty = self.cards.dirty_cards();
        outcome.cards_scanned = dirty.len();
        let mut holders = Vec::new();
        {
            let view = OldView {
                table: &self.table,
                old: &self.old,
            };
            for card in dirty {
                holders.extend(self.cards.scan_and_clear(&view, card));
            }
        }
        holders.sort_unstable();
        holders.dedup();

        let mut roots: Vec<ObjectId> = external_roots.to_vec();
        let external: HashSet<ObjectId> = external_roots.iter().copied().collect();
        for &holder in &holders {
            for &target in self.table.references_of(holder).iter().flatten() {
                if self.table.is_young(target) {
                    if !external.contains(&target) {
                        outcome.card_roots += 1;
                    }
                    roots.push(target);
                }
            }
        }

        let live = {
            let table = &self.table;
            let young: ScanLimit<'_> = &|id: ObjectId| table.is_young(id);
            run_trace(tracer, roots, Some(young), table, &self.config)?
        };
        outcome.trace = tracer.stats().clone();

        // Older survivors first: to-space has the capacity of from-space, so
        // every from-space survivor is guaranteed a place.
        let threshold = self.promotion_threshold;
        let mut promoted = Vec::new();
        let mut retained = HashSet::new();
        for id in from_residents.into_iter().chain(eden_residents) {
            if !live.contains(&id) {
                if let Some(record) = self.table.remove(id) {
                    outcome.objects_reclaimed += 1;
                    outcome.bytes_reclaimed += record.size;
                }
                continue;
            }
            match self.evacuate(id, to_kind, threshold, &mut outcome.promotion_failed) {
                Evacuation::Survived => outcome.survived += 1,
                Evacuation::Promoted { overflow } => {
                    if overflow {
                        outcome.overflow_promoted += 1;
                    } else {
                        outcome.promoted += 1;
                    }
                    promoted.push(id);
                }
                Evacuation::Retained => {
                    outcome.retained += 1;
                    retained.insert(id);
                }
            }
        }

        let relocations = self.eden.compact(|id| retained.contains(&id));
        self.table.apply(&relocations);
        let relocations = self.survivor_mut(from_kind).compact(|id| retained.contains(&id));
        self.table.apply(&relocations);
        if self.survivor(from_kind).resident_count() == 0 {
            self.from_survivor = to_kind;
        } else {
            warn!(
                "{:?} still holds {} objects after evacuation; survivor roles not swapped",
                from_kind,
                self.survivor(from_kind).resident_count()
            );
        }

        // Old objects that still point into the young generation keep
        // their cards dirty for the next cycle.
        for &id in holders.iter().chain(&promoted) {
            if self.table.references_young(id) {
                if let Some(record) = self.table.get(id) {
                    self.cards.mark_dirty(record.address);
                }
            }
        }

        let survived = live.len();
        outcome.survival = SurvivalStats {
            young_before,
            survived,
            promoted: outcome.promoted + outcome.overflow_promoted,
            rate: if young_before == 0 {
                0.0
            } else {
                survived as f64 / young_before as f64
            },
        };
        self.survival = outcome.survival;

        if outcome.promotion_failed {
            warn!(
                "promotion failed: old has {} of {} bytes free, {} objects retained",
                self.old.free(),
                self.old.capacity(),
                outcome.retained
            );
        }
        Ok(outcome)
    }

    fn evacuate(
        &mut self,
        id: ObjectId,
        to_kind: RegionKind,
        threshold: u8,
        promotion_failed: &mut bool,
    ) -> Evacuation {
        let Some(record) = self.table.get(id) else {
            return Evacuation::Retained;
        };
        let size = record.size;
        let age = record.age.saturating_add(1).min(MAX_AGE);
        let overflow = !self
            .survivor(to_kind)
            .fits_within(size, self.config.survivor_occupancy_limit);

        if age >= threshold || overflow {
            if let Some(address) = self.bump_old(id, size) {
                self.relocate(id, Generation::Old, RegionKind::Old, address, age);
                return Evacuation::Promoted {
                    overflow: age < threshold,
                };
            }
            *promotion_failed = true;
        }

        match self.survivor_mut(to_kind).try_bump(id, size) {
            Some(address) => {
                self.relocate(id, Generation::Survivor, to_kind, address, age);
                Evacuation::Survived
            }
            None => Evacuation::Retained,
        }
    }

    fn relocate(&mut self, id: ObjectId, generation: Generation, region: RegionKind, address: usize, age: u8) {
        if let Some(record) = self.table.get_mut(id) {
            debug_assert!(generation >= record.generation);
            record.generation = generation;
            record.region = region;
            record.address = address;
            record.age = age;
        }
    }

    fn bump_old(&mut self, id: ObjectId, size: usize) -> Option<usize> {
        if let Some(address) = self.old.try_bump(id, size) {
            return Some(address);
        }
        let additional = align_size(size).max(self.old.capacity() / 2);
        if self.grow_old(additional) {
            self.old.try_bump(id, size)
        } else {
            None
        }
    }

    // -----------------------------------------------------------------------
    // Major collection
    // -----------------------------------------------------------------------

    /// Collects the whole heap.
    ///
    /// Traces from the external roots alone, sweeps every region, slides
    /// the live objects of each region together and rebuilds the card
    /// table for the new Old layout.
    pub fn major_collect(
        &mut self,
        tracer: &mut TriColorTracer,
        external_roots: &[ObjectId],
    ) -> GcResult<MajorOutcome> {
        let mut outcome = MajorOutcome::default();

        let live = {
            let table = &self.table;
            let known: ScanLimit<'_> = &|id: ObjectId| table.get(id).is_some();
            run_trace(tracer, external_roots.to_vec(), Some(known), table, &self.config)?
        };
        outcome.trace = tracer.stats().clone();

        // Sweep.
        let dead: Vec<ObjectId> = self
            .all_residents()
            .filter(|id| !live.contains(id))
            .collect();
        for id in dead {
            if let Some(record) = self.table.remove(id) {
                outcome.objects_reclaimed += 1;
                outcome.bytes_reclaimed += record.size;
            }
        }

        // Compact.
        let table = &self.table;
        let keep = |id: ObjectId| table.get(id).is_some();
        let eden = self.eden.compact(keep);
        let survivor_a = self.survivor_a.compact(keep);
        let survivor_b = self.survivor_b.compact(keep);
        let old = self.old.compact(keep);
        for relocations in [&eden, &survivor_a, &survivor_b, &old] {
            self.table.apply(relocations);
        }
        outcome.old_relocations = old;

        // Addresses moved: rebuild the remembered old-to-young cards.
        self.cards.clear_all();
        let old_residents: Vec<ObjectId> = self.old.residents().collect();
        for id in old_residents {
            if self.table.references_young(id) {
                if let Some(record) = self.table.get(id) {
                    self.cards.mark_dirty(record.address);
                }
            }
        }

        if self.old.occupancy() >= self.config.old_growth_trigger {
            let additional = align_size(self.old.capacity() / 2);
            if self.grow_old(additional) {
                outcome.old_grown_by = additional;
            }
        }

        outcome.live_objects = self.table.live;
        Ok(outcome)
    }

    fn grow_old(&mut self, additional: usize) -> bool {
        let granted = self.provider.grow(
            RegionKind::Old,
            self.old.base(),
            self.old.capacity(),
            additional,
        );
        if granted {
            self.old.grow(additional);
            self.cards.resize(self.old.capacity());
            debug!("old grown by {} to {} bytes", additional, self.old.capacity());
        }
        granted
    }

    fn all_residents(&self) -> impl Iterator<Item = ObjectId> + '_ {
        self.eden
            .residents()
            .chain(self.survivor_a.residents())
            .chain(self.survivor_b.residents())
            .chain(self.old.residents())
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    /// Returns true if `id` names a live object.
    pub fn is_live(&self, id: ObjectId) -> bool {
        self.table.get(id).is_some()
    }

    pub fn generation_of(&self, id: ObjectId) -> Option<Generation> {
        self.table.generation(id)
    }

    pub fn age_of(&self, id: ObjectId) -> Option<u8> {
        self.table.get(id).map(|record| record.age)
    }

    pub fn address_of(&self, id: ObjectId) -> Option<usize> {
        self.table.get(id).map(|record| record.address)
    }

    /// Metadata snapshot of a live object.
    pub fn info(&self, id: ObjectId) -> Option<ObjectInfo> {
        self.table.get(id).map(|record| ObjectInfo {
            generation: record.generation,
            age: record.age,
            region: record.region,
            address: record.address,
            size: record.size,
            field_count: record.fields.len(),
        })
    }

    /// Number of live objects.
    pub fn object_count(&self) -> usize {
        self.table.live
    }

    /// Residents of one region in address order.
    pub fn residents(&self, kind: RegionKind) -> Vec<ObjectId> {
        self.region(kind).residents().collect()
    }

    pub fn region(&self, kind: RegionKind) -> &Region {
        match kind {
            RegionKind::Eden => &self.eden,
            RegionKind::SurvivorA => &self.survivor_a,
            RegionKind::SurvivorB => &self.survivor_b,
            RegionKind::Old => &self.old,
        }
    }

    fn survivor(&self, kind: RegionKind) -> &Region {
        self.region(kind)
    }

    fn survivor_mut(&mut self, kind: RegionKind) -> &mut Region {
        match kind {
            RegionKind::SurvivorB => &mut self.survivor_b,
            _ => &mut self.survivor_a,
        }
    }

    /// The survivor region holding the current survivors.
    pub fn from_survivor(&self) -> RegionKind {
        self.from_survivor
    }

    pub fn region_usage(&self) -> HeapStats {
        let survivor = self.survivor(self.from_survivor);
        HeapStats {
            eden_used: self.eden.used(),
            eden_capacity: self.eden.capacity(),
            survivor_used: survivor.used(),
            survivor_capacity: survivor.capacity(),
            old_used: self.old.used(),
            old_capacity: self.old.capacity(),
            live_objects: self.table.live,
        }
    }

    /// Old occupancy as a fraction of its capacity.
    pub fn old_occupancy(&self) -> f64 {
        self.old.occupancy()
    }

    pub fn eden_free(&self) -> usize {
        self.eden.free()
    }

    pub fn old_free(&self) -> usize {
        self.old.free()
    }

    pub fn card_table(&self) -> &CardTable {
        &self.cards
    }

    pub fn barrier_stats(&self) -> BarrierSnapshot {
        self.barrier_stats.snapshot()
    }

    /// Survival statistics of the last minor cycle.
    pub fn survival_stats(&self) -> SurvivalStats {
        self.survival
    }

    pub fn promotion_threshold(&self) -> u8 {
        self.promotion_threshold
    }

    /// Accepts a new promotion threshold from a tuning policy.
    pub fn set_promotion_threshold(&mut self, threshold: u8) -> GcResult<()> {
        validate_promotion_threshold(threshold)?;
        self.promotion_threshold = threshold;
        Ok(())
    }

    pub fn config(&self) -> &GcConfig {
        &self.config
    }
}

impl ObjectGraph for GenerationalHeap {
    fn references_of(&self, id: ObjectId) -> &[Option<ObjectId>] {
        self.table.references_of(id)
    }

    fn size_of(&self, id: ObjectId) -> usize {
        self.table.size_of(id)
    }
}

/// Marks in budgeted steps and returns the reachable set.
fn run_trace(
    tracer: &mut TriColorTracer,
    roots: Vec<ObjectId>,
    limit: Option<ScanLimit<'_>>,
    table: &ObjectTable,
    config: &GcConfig,
) -> GcResult<HashSet<ObjectId>> {
    tracer.start(roots, limit);
    while tracer.step(config.incremental_step_budget, table, limit) {}
    if config.verify_after_trace {
        tracer.verify(table, limit)?;
    }
    Ok(tracer.finish())
}
