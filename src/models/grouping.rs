//! # Groupings and Work Items
//!
//! A grouping ("pack") is an ordered set of items received together from one source.
//! On arrival it is registered in the [`GroupingArena`] and split into [`WorkItem`]s,
//! each remembering its grouping id and position. Processing workers write processed
//! payloads back into the grouping's [`GroupingSlot`] and bump its solved-count; the
//! return router reassembles the [`Grouping`] once every position has been filled.

use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use super::{GroupingId, SourceId};

/// One unit of work, tagged with the grouping it belongs to
#[derive(Debug)]
pub struct WorkItem<T> {
    pub grouping_id: GroupingId,
    /// Position of the item inside its grouping
    pub index: usize,
    pub payload: T,
}

/// A fully processed grouping, as handed back to its source
#[derive(Debug, Clone, PartialEq)]
pub struct Grouping<T> {
    id: GroupingId,
    source_id: SourceId,
    items: Vec<T>,
}

impl<T> Grouping<T> {
    pub fn id(&self) -> GroupingId {
        self.id
    }

    pub fn source_id(&self) -> SourceId {
        self.source_id
    }

    /// Processed items in the order the source produced them
    pub fn items(&self) -> &[T] {
        &self.items
    }

    pub fn into_items(self) -> Vec<T> {
        self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Completion tracking for one in-flight grouping
#[derive(Debug)]
pub struct GroupingSlot<T> {
    id: GroupingId,
    source_id: SourceId,
    total: usize,
    solved: AtomicUsize,
    processed: Mutex<Vec<Option<T>>>,
}

impl<T> GroupingSlot<T> {
    fn new(id: GroupingId, source_id: SourceId, total: usize) -> Self {
        let mut processed = Vec::with_capacity(total);
        processed.resize_with(total, || None);
        Self {
            id,
            source_id,
            total,
            solved: AtomicUsize::new(0),
            processed: Mutex::new(processed),
        }
    }

    pub fn id(&self) -> GroupingId {
        self.id
    }

    pub fn source_id(&self) -> SourceId {
        self.source_id
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn solved_count(&self) -> usize {
        self.solved.load(Ordering::Acquire)
    }

    pub fn is_fully_processed(&self) -> bool {
        self.solved_count() == self.total
    }

    /// Store a processed payload and count it as solved.
    ///
    /// Returns `true` when this call solved the last outstanding item. The payload is
    /// stored before the counter moves, so a reader observing `is_fully_processed()`
    /// always finds every position filled.
    pub fn record_processed(&self, index: usize, payload: T) -> bool {
        {
            let mut processed = self.processed.lock();
            let Some(slot) = processed.get_mut(index) else {
                debug_assert!(false, "item index {index} out of range for grouping {}", self.id);
                return false;
            };
            debug_assert!(slot.is_none(), "item {index} of grouping {} processed twice", self.id);
            *slot = Some(payload);
        }

        // Never exceed total even if a collaborator misbehaves
        match self
            .solved
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |solved| {
                (solved < self.total).then_some(solved + 1)
            }) {
            Ok(previous) => previous + 1 == self.total,
            Err(_) => false,
        }
    }

    /// Reassemble the processed grouping. `None` until every item has been recorded.
    pub fn take_grouping(&self) -> Option<Grouping<T>> {
        if !self.is_fully_processed() {
            return None;
        }

        let mut processed = self.processed.lock();
        // An already taken grouping leaves an empty buffer behind
        if processed.len() != self.total || processed.iter().any(Option::is_none) {
            return None;
        }
        let items = processed.drain(..).flatten().collect();

        Some(Grouping {
            id: self.id,
            source_id: self.source_id,
            items,
        })
    }
}

/// Registry of in-flight groupings addressed by id
#[derive(Debug)]
pub struct GroupingArena<T> {
    slots: DashMap<GroupingId, Arc<GroupingSlot<T>>>,
    next_id: AtomicU64,
}

impl<T> Default for GroupingArena<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> GroupingArena<T> {
    pub fn new() -> Self {
        Self {
            slots: DashMap::new(),
            next_id: AtomicU64::new(0),
        }
    }

    /// Register a freshly received grouping and split it into work items
    pub fn register(
        &self,
        source_id: SourceId,
        items: Vec<T>,
    ) -> (Arc<GroupingSlot<T>>, Vec<WorkItem<T>>) {
        let id = GroupingId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let slot = Arc::new(GroupingSlot::new(id, source_id, items.len()));
        self.slots.insert(id, Arc::clone(&slot));

        let work_items = items
            .into_iter()
            .enumerate()
            .map(|(index, payload)| WorkItem {
                grouping_id: id,
                index,
                payload,
            })
            .collect();

        (slot, work_items)
    }

    pub fn get(&self, id: GroupingId) -> Option<Arc<GroupingSlot<T>>> {
        self.slots.get(&id).map(|entry| Arc::clone(entry.value()))
    }

    /// Drop a grouping from the arena once it has been returned
    pub fn release(&self, id: GroupingId) -> Option<Arc<GroupingSlot<T>>> {
        self.slots.remove(&id).map(|(_, slot)| slot)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}
