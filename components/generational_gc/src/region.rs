//! Bump-pointer regions and the raw memory provider behind them.
//!
//! A region is a contiguous logical address range. Objects are placed by
//! bumping `top`; nothing is freed individually. Space comes back when the
//! region is reset after evacuation or slid together by compaction.

use crate::error::{GcError, GcResult};
use crate::object::ObjectId;
use log::debug;

/// Allocation granularity in bytes.
pub const ALIGNMENT: usize = 8;

/// Rounds `size` up to the allocation granularity. Zero-sized requests
/// still occupy one granule so every object has a distinct address.
#[inline]
pub fn align_size(size: usize) -> usize {
    let size = size.max(1);
    (size + ALIGNMENT - 1) & !(ALIGNMENT - 1)
}

/// The four regions of the generational heap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegionKind {
    Eden,
    SurvivorA,
    SurvivorB,
    Old,
}

impl RegionKind {
    /// The other survivor region. Identity for Eden and Old.
    pub fn sibling(self) -> RegionKind {
        match self {
            RegionKind::SurvivorA => RegionKind::SurvivorB,
            RegionKind::SurvivorB => RegionKind::SurvivorA,
            other => other,
        }
    }
}

/// An object that moved during compaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Relocation {
    pub id: ObjectId,
    pub from: usize,
    pub to: usize,
}

/// A contiguous allocation arena with a bump pointer.
#[derive(Debug)]
pub struct Region {
    kind: RegionKind,
    /// First address of the region
    base: usize,
    /// Total capacity in bytes
    capacity: usize,
    /// Offset of the next free byte
    top: usize,
    /// Residents sorted by offset
    residents: Vec<Resident>,
}

/// Placement of one object inside a region.
#[derive(Debug, Clone, Copy)]
struct Resident {
    id: ObjectId,
    /// Offset from the region base
    offset: usize,
    /// Aligned size in bytes
    size: usize,
}

impl Resident {
    fn end(&self) -> usize {
        self.offset + self.size
    }
}

impl Region {
    /// Creates an empty region covering `[base, base + capacity)`.
    pub fn new(kind: RegionKind, base: usize, capacity: usize) -> Self {
        Region {
            kind,
            base,
            capacity,
            top: 0,
            residents: Vec::new(),
        }
    }

    /// Places `id` at the bump pointer.
    ///
    /// Returns the object's address, or None if it does not fit.
    pub fn try_bump(&mut self, id: ObjectId, size: usize) -> Option<usize> {
        let size = align_size(size);
        if size > self.free() {
            return None;
        }
        let offset = self.top;
        self.top += size;
        self.residents.push(Resident { id, offset, size });
        Some(self.base + offset)
    }

    /// Returns true if `size` bytes fit without exceeding `limit` of the
    /// capacity (a fraction in `(0, 1]`).
    pub fn fits_within(&self, size: usize, limit: f64) -> bool {
        let ceiling = (self.capacity as f64 * limit) as usize;
        self.top + align_size(size) <= ceiling.min(self.capacity)
    }

    /// Slides the residents selected by `keep` to the bottom of the region,
    /// preserving their order, and drops the rest.
    ///
    /// Returns the relocations of objects whose address changed.
    pub fn compact(&mut self, mut keep: impl FnMut(ObjectId) -> bool) -> Vec<Relocation> {
        let mut relocations = Vec::new();
        let mut cursor = 0;
        let mut kept = Vec::with_capacity(self.residents.len());

        for resident in &self.residents {
            if !keep(resident.id) {
                continue;
            }
            if cursor != resident.offset {
                relocations.push(Relocation {
                    id: resident.id,
                    from: self.base + resident.offset,
                    to: self.base + cursor,
                });
            }
            kept.push(Resident {
                offset: cursor,
                ..*resident
            });
            cursor += resident.size;
        }

        debug!(
            "compacted {:?}: {} -> {} bytes, {} moved",
            self.kind,
            self.top,
            cursor,
            relocations.len()
        );
        self.residents = kept;
        self.top = cursor;
        relocations
    }

    /// Extends the capacity in place.
    pub fn grow(&mut self, additional: usize) {
        self.capacity += additional;
    }

    pub fn base(&self) -> usize {
        self.base
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Bytes currently occupied.
    pub fn used(&self) -> usize {
        self.top
    }

    /// Bytes left for bump allocation.
    pub fn free(&self) -> usize {
        self.capacity - self.top
    }

    /// Occupancy as a fraction of capacity.
    pub fn occupancy(&self) -> f64 {
        if self.capacity == 0 {
            return 1.0;
        }
        self.top as f64 / self.capacity as f64
    }

    /// Residents in address order.
    pub fn residents(&self) -> impl Iterator<Item = ObjectId> + '_ {
        self.residents.iter().map(|resident| resident.id)
    }

    pub fn resident_count(&self) -> usize {
        self.residents.len()
    }

    /// Residents whose storage overlaps `[start, end)`, in address order.
    ///
    /// Binary-searches for the first overlapping resident, so the cost
    /// depends on how many residents overlap, not on where the range lies.
    pub fn residents_in(&self, start: usize, end: usize) -> Vec<ObjectId> {
        let start = start.saturating_sub(self.base);
        let end = end.saturating_sub(self.base);
        let first = self.residents.partition_point(|resident| resident.end() <= start);
        self.residents[first..]
            .iter()
            .take_while(|resident| resident.offset < end)
            .map(|resident| resident.id)
            .collect()
    }
}

/// Raw memory behind the regions.
///
/// The heap asks for one reservation per region at construction time and
/// for in-place growth of Old under pressure. Sizing policy is left to the
/// provider; the heap only reports exhaustion.
pub trait MemoryProvider: Send {
    /// Reserves `bytes` for `kind` and returns the base address.
    fn reserve(&mut self, kind: RegionKind, bytes: usize) -> GcResult<usize>;

    /// Attempts to extend the reservation starting at `base` from `current`
    /// to `current + additional` bytes without moving it.
    fn grow(&mut self, kind: RegionKind, base: usize, current: usize, additional: usize) -> bool;
}

/// Size of the address window handed out per reservation.
const WINDOW: usize = 1 << 30;

/// Logical address space with an optional budget on committed bytes.
///
/// Each reservation gets its own window so regions never overlap and can
/// grow in place up to the window size.
#[derive(Debug)]
pub struct SimulatedMemory {
    next_window: usize,
    committed: usize,
    budget: Option<usize>,
}

impl SimulatedMemory {
    /// Provider without a budget.
    pub fn unbounded() -> Self {
        SimulatedMemory {
            next_window: WINDOW,
            committed: 0,
            budget: None,
        }
    }

    /// Provider that refuses to commit more than `budget` bytes in total.
    pub fn with_budget(budget: usize) -> Self {
        SimulatedMemory {
            budget: Some(budget),
            ..Self::unbounded()
        }
    }

    /// Bytes handed out so far.
    pub fn committed(&self) -> usize {
        self.committed
    }

    fn admits(&self, bytes: usize) -> bool {
        match self.budget {
            Some(budget) => self.committed.saturating_add(bytes) <= budget,
            None => true,
        }
    }
}

impl Default for SimulatedMemory {
    fn default() -> Self {
        Self::unbounded()
    }
}

impl MemoryProvider for SimulatedMemory {
    fn reserve(&mut self, kind: RegionKind, bytes: usize) -> GcResult<usize> {
        if bytes > WINDOW || !self.admits(bytes) {
            return Err(GcError::RegionReservation {
                region: kind,
                bytes,
            });
        }
        let base = self.next_window;
        self.next_window += WINDOW;
        self.committed += bytes;
        Ok(base)
    }

    fn grow(&mut self, kind: RegionKind, _base: usize, current: usize, additional: usize) -> bool {
        if current.saturating_add(additional) > WINDOW || !self.admits(additional) {
            debug!("refused to grow {:?} by {} bytes", kind, additional);
            return false;
        }
        self.committed += additional;
        true
    }
}
