//! Managed object handles and the graph interface the collector traces.
//!
//! The collector never looks inside an object beyond its reference fields
//! and its size. Everything else about layout belongs to the embedding
//! runtime.

use std::collections::HashSet;
use std::fmt;

/// Ages saturate at this value.
pub const MAX_AGE: u8 = 15;

/// Stable handle to a managed object.
///
/// `slot` selects the entry in the heap's forwarding table, so relocation
/// only rewrites the table and never the holders of the handle. `epoch`
/// is bumped each time a slot is reclaimed, which turns use of a dangling
/// handle into a detectable error instead of silent aliasing.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId {
    pub(crate) slot: u32,
    pub(crate) epoch: u32,
}

impl ObjectId {
    /// Builds a handle from its raw parts.
    ///
    /// Mostly useful for synthetic graphs in tests; handles for heap objects
    /// come from allocation.
    pub const fn new(slot: u32, epoch: u32) -> Self {
        ObjectId { slot, epoch }
    }

    /// Index into the forwarding table.
    pub fn slot(&self) -> u32 {
        self.slot
    }

    /// Reuse counter of the slot.
    pub fn epoch(&self) -> u32 {
        self.epoch
    }
}

impl fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectId({}/{})", self.slot, self.epoch)
    }
}

/// Generation tag of a managed object.
///
/// Ordered so that promotion is always an increase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Generation {
    /// Freshly allocated
    Eden,
    /// Survived at least one minor cycle
    Survivor,
    /// Promoted; only collected by major cycles
    Old,
}

impl Generation {
    /// Eden and Survivor objects are young.
    #[inline]
    pub fn is_young(self) -> bool {
        !matches!(self, Generation::Old)
    }
}

/// Read access to the reference structure of managed objects.
pub trait ObjectGraph {
    /// Outgoing reference fields of `id`, in field order.
    ///
    /// Unknown objects have no fields.
    fn references_of(&self, id: ObjectId) -> &[Option<ObjectId>];

    /// Storage size of `id` in bytes.
    fn size_of(&self, id: ObjectId) -> usize;
}

/// Source of the externally reachable objects for one trace.
pub trait RootProvider {
    /// Snapshot of the roots. Called once per collection cycle.
    fn current_roots(&self) -> Vec<ObjectId>;
}

impl RootProvider for [ObjectId] {
    fn current_roots(&self) -> Vec<ObjectId> {
        self.to_vec()
    }
}

impl RootProvider for Vec<ObjectId> {
    fn current_roots(&self) -> Vec<ObjectId> {
        self.clone()
    }
}

impl<F> RootProvider for F
where
    F: Fn() -> Vec<ObjectId>,
{
    fn current_roots(&self) -> Vec<ObjectId> {
        self()
    }
}

/// Explicit set of roots maintained by the mutator.
#[derive(Debug, Clone, Default)]
pub struct RootSet {
    roots: HashSet<ObjectId>,
}

impl RootSet {
    /// Creates an empty root set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a root. Returns false if it was already present.
    pub fn insert(&mut self, id: ObjectId) -> bool {
        self.roots.insert(id)
    }

    /// Removes a root. Returns false if it was not present.
    pub fn remove(&mut self, id: ObjectId) -> bool {
        self.roots.remove(&id)
    }

    pub fn len(&self) -> usize {
        self.roots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }
}

impl FromIterator<ObjectId> for RootSet {
    fn from_iter<I: IntoIterator<Item = ObjectId>>(iter: I) -> Self {
        RootSet {
            roots: iter.into_iter().collect(),
        }
    }
}

impl RootProvider for RootSet {
    fn current_roots(&self) -> Vec<ObjectId> {
        let mut roots: Vec<ObjectId> = self.roots.iter().copied().collect();
        // Deterministic seeding order keeps evacuation order reproducible.
        roots.sort_unstable();
        roots
    }
}
