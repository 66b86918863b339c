//! Per-cycle state store.
//!
//! A [`CycleState`] lives for exactly one pod's scheduling cycle. Stages use
//! it to hand derived data forward (PreFilter computes, Filter reads) without
//! recomputing it per node. Keys are typed: a [`StateKey<T>`] can only write
//! and read values of type `T`, so readers never perform an unchecked cast.
//!
//! Reads take a shared lock and may run concurrently from per-node stages;
//! writes take the exclusive lock.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::{Arc, PoisonError, RwLock};

use crate::error::{FrameworkError, FrameworkResult};

type Entry = Arc<dyn Any + Send + Sync>;

/// A typed key into a [`CycleState`].
pub struct StateKey<T> {
    name: &'static str,
    _marker: PhantomData<fn() -> T>,
}

impl<T> StateKey<T> {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            _marker: PhantomData,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl<T> Clone for StateKey<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for StateKey<T> {}

impl<T> fmt::Debug for StateKey<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("StateKey").field(&self.name).finish()
    }
}

/// Key/value store scoped to one scheduling cycle.
#[derive(Default)]
pub struct CycleState {
    entries: RwLock<HashMap<&'static str, Entry>>,
}

impl CycleState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `value` under `key`, replacing any previous value.
    ///
    /// Writing the same key twice is idempotent from a reader's view.
    pub fn write<T>(&self, key: StateKey<T>, value: T)
    where
        T: Any + Send + Sync,
    {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.insert(key.name, Arc::new(value));
    }

    /// Read a clone of the value stored under `key`.
    pub fn read<T>(&self, key: StateKey<T>) -> FrameworkResult<T>
    where
        T: Any + Send + Sync + Clone,
    {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        let entry = entries
            .get(key.name)
            .ok_or(FrameworkError::StateNotFound(key.name))?;
        entry
            .downcast_ref::<T>()
            .cloned()
            .ok_or(FrameworkError::StateTypeMismatch(key.name))
    }

    pub fn contains<T>(&self, key: StateKey<T>) -> bool {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries.contains_key(key.name)
    }

    /// Remove `key`. Returns whether a value was present.
    pub fn delete<T>(&self, key: StateKey<T>) -> bool {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.remove(key.name).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Clone for CycleState {
    fn clone(&self) -> Self {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        Self {
            entries: RwLock::new(entries.clone()),
        }
    }
}

impl fmt::Debug for CycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        let mut keys: Vec<_> = entries.keys().collect();
        keys.sort();
        f.debug_struct("CycleState").field("keys", &keys).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Totals {
        memory: u64,
    }

    const TOTALS: StateKey<Totals> = StateKey::new("test/totals");
    const TOTALS_AS_STRING: StateKey<String> = StateKey::new("test/totals");

    #[test]
    fn write_then_read() {
        let state = CycleState::new();
        state.write(TOTALS, Totals { memory: 512 });
        assert_eq!(state.read(TOTALS).unwrap(), Totals { memory: 512 });
        assert!(state.contains(TOTALS));
    }

    #[test]
    fn missing_key_is_not_found() {
        let state = CycleState::new();
        let err = state.read(TOTALS).unwrap_err();
        assert!(matches!(err, FrameworkError::StateNotFound("test/totals")));
    }

    #[test]
    fn mismatched_type_is_reported() {
        let state = CycleState::new();
        state.write(TOTALS, Totals { memory: 1 });
        let err = state.read(TOTALS_AS_STRING).unwrap_err();
        assert!(matches!(err, FrameworkError::StateTypeMismatch(_)));
    }

    #[test]
    fn rewrite_replaces_value() {
        let state = CycleState::new();
        state.write(TOTALS, Totals { memory: 1 });
        state.write(TOTALS, Totals { memory: 2 });
        assert_eq!(state.read(TOTALS).unwrap().memory, 2);
        assert_eq!(state.len(), 1);
    }

    #[test]
    fn delete_reports_presence() {
        let state = CycleState::new();
        assert!(!state.delete(TOTALS));
        state.write(TOTALS, Totals { memory: 1 });
        assert!(state.delete(TOTALS));
        assert!(state.is_empty());
    }

    #[test]
    fn separate_cycles_do_not_share_entries() {
        let first = CycleState::new();
        let second = CycleState::new();
        first.write(TOTALS, Totals { memory: 1 });
        assert!(!second.contains(TOTALS));
    }

    #[test]
    fn clone_is_independent() {
        let state = CycleState::new();
        state.write(TOTALS, Totals { memory: 1 });
        let copy = state.clone();
        state.delete(TOTALS);
        assert!(copy.contains(TOTALS));
    }

    #[test]
    fn concurrent_readers() {
        let state = CycleState::new();
        state.write(TOTALS, Totals { memory: 64 });

        std::thread::scope(|s| {
            for _ in 0..8 {
                s.spawn(|| {
                    for _ in 0..100 {
                        assert_eq!(state.read(TOTALS).unwrap().memory, 64);
                    }
                });
            }
        });
    }
}
