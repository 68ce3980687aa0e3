//! Owner identity registry
//!
//! Tiles are keyed by the image that owns them. Images are compared by
//! identity (the address of their shared allocation), never by value, and
//! each one is mapped to a small [`OwnerId`] on first use.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Weak};
use dashmap::DashMap;
use crate::types::OwnerId;

/// Process-wide so that caches sharing one swap space never hand out the same id.
static NEXT_OWNER_ID: AtomicU32 = AtomicU32::new(0);

struct OwnerSlot<O: ?Sized> {
    // Keeps the allocation pinned, so its address cannot be reused by
    // another owner while the slot exists.
    owner: Weak<O>,
    id: OwnerId,
}

/// Lock-free map from owner identity to owner id
pub struct OwnerRegistry<O: ?Sized> {
    slots: DashMap<usize, OwnerSlot<O>>,
}

impl<O: ?Sized> OwnerRegistry<O> {
    /// Creates an empty registry
    pub fn new() -> Self {
        Self {
            slots: DashMap::new(),
        }
    }

    fn address(owner: &Arc<O>) -> usize {
        Arc::as_ptr(owner).cast::<()>() as usize
    }

    /// Returns the owner's id, assigning a fresh one on first use
    pub fn id_of(&self, owner: &Arc<O>) -> OwnerId {
        self.slots
            .entry(Self::address(owner))
            .or_insert_with(|| OwnerSlot {
                owner: Arc::downgrade(owner),
                id: OwnerId(NEXT_OWNER_ID.fetch_add(1, Ordering::Relaxed)),
            })
            .id
    }

    /// Returns the owner's id if it has one, without assigning
    pub fn lookup(&self, owner: &Arc<O>) -> Option<OwnerId> {
        self.slots.get(&Self::address(owner)).map(|slot| slot.id)
    }

    /// Drops the slots of owners that no longer exist and returns their ids
    pub fn prune(&self) -> Vec<OwnerId> {
        let mut dropped = Vec::new();
        self.slots.retain(|_, slot| {
            let live = slot.owner.strong_count() > 0;
            if !live {
                dropped.push(slot.id);
            }
            live
        });
        dropped
    }

    /// Number of registered owners
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Returns whether no owner is registered
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

impl<O: ?Sized> Default for OwnerRegistry<O> {
    fn default() -> Self {
        Self::new()
    }
}
