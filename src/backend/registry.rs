//! Index managers of one backend, keyed by index name.

use crate::error::{Result, SearchSyncError};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;

enum Slot<M> {
    /// Claimed by a call still building its manager.
    Building,
    Ready(Arc<M>),
}

pub(crate) struct ManagerRegistry<M> {
    slots: DashMap<String, Slot<M>>,
}

impl<M> ManagerRegistry<M> {
    pub fn new() -> Self {
        ManagerRegistry {
            slots: DashMap::new(),
        }
    }

    /// Claim `index_name` for a manager about to be built. At most one claim
    /// or manager exists per name.
    pub fn reserve(&self, index_name: &str) -> Result<Reservation<'_, M>> {
        match self.slots.entry(index_name.to_string()) {
            Entry::Occupied(_) => Err(SearchSyncError::Config(format!(
                "index '{}' already has a manager",
                index_name
            ))),
            Entry::Vacant(vacant) => {
                vacant.insert(Slot::Building);
                Ok(Reservation {
                    slots: &self.slots,
                    index_name: index_name.to_string(),
                    committed: false,
                })
            }
        }
    }

    pub fn get(&self, index_name: &str) -> Option<Arc<M>> {
        self.slots
            .get(index_name)
            .and_then(|slot| match slot.value() {
                Slot::Ready(manager) => Some(Arc::clone(manager)),
                Slot::Building => None,
            })
    }

    /// Remove and return every built manager.
    pub fn drain(&self) -> Vec<Arc<M>> {
        let mut drained = Vec::new();
        self.slots.retain(|_, slot| match slot {
            Slot::Ready(manager) => {
                drained.push(Arc::clone(manager));
                false
            }
            Slot::Building => true,
        });
        drained
    }
}

/// Releases its name on drop unless committed.
pub(crate) struct Reservation<'a, M> {
    slots: &'a DashMap<String, Slot<M>>,
    index_name: String,
    committed: bool,
}

impl<M> Reservation<'_, M> {
    pub fn commit(mut self, manager: Arc<M>) {
        self.slots
            .insert(self.index_name.clone(), Slot::Ready(manager));
        self.committed = true;
    }
}

impl<M> Drop for Reservation<'_, M> {
    fn drop(&mut self) {
        if !self.committed {
            self.slots.remove(&self.index_name);
        }
    }
}
