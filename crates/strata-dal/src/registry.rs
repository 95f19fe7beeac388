//! Named singleton slots for configured adapters.
//!
//! Each adapter kind stores the instance built by its factory under its
//! storage name; callers reach it with [`get`]. Using a slot before the
//! factory ran is a programmer error and panics. [`set`] exists for test
//! doubles.

use std::sync::{Arc, OnceLock};

use dashmap::DashMap;

use crate::contract::Storage;

static REGISTRY: OnceLock<DashMap<String, Arc<dyn Storage>>> = OnceLock::new();

fn slots() -> &'static DashMap<String, Arc<dyn Storage>> {
    REGISTRY.get_or_init(DashMap::new)
}

/// Stores a storage under `name`, replacing any previous instance.
pub fn set(name: impl Into<String>, storage: Arc<dyn Storage>) {
    slots().insert(name.into(), storage);
}

/// Returns the storage stored under `name`, if any.
pub fn try_get(name: &str) -> Option<Arc<dyn Storage>> {
    slots().get(name).map(|entry| Arc::clone(entry.value()))
}

/// Returns the storage stored under `name`.
///
/// # Panics
///
/// Panics if no storage of that name was constructed; construction must
/// precede use.
pub fn get(name: &str) -> Arc<dyn Storage> {
    try_get(name).unwrap_or_else(|| panic!("{name} storage not initialized"))
}
