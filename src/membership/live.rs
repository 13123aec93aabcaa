use dashmap::DashMap;

use crate::container::{Container, ContainerName};

/// The containers currently known to be running, keyed by canonical name.
///
/// Only the membership monitor mutates the set; everyone else reads snapshots.
#[derive(Debug, Default)]
pub struct LiveSet {
    containers: DashMap<ContainerName, Container>,
}

impl LiveSet {
    /// Inserts or refreshes a container. Returns `true` if it was not live before.
    pub(super) fn insert(&self, container: Container) -> bool {
        self.containers
            .insert(container.name().clone(), container)
            .is_none()
    }

    pub(super) fn remove(&self, name: &ContainerName) -> Option<Container> {
        self.containers.remove(name).map(|(_, container)| container)
    }

    pub(super) fn clear(&self) {
        self.containers.clear();
    }

    pub fn contains(&self, name: &str) -> bool {
        self.containers.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<Container> {
        self.containers.get(name).map(|entry| entry.value().clone())
    }

    /// A point-in-time copy of every live container.
    pub fn snapshot(&self) -> Vec<Container> {
        self.containers
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }

    pub fn size(&self) -> usize {
        self.containers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.containers.is_empty()
    }
}
