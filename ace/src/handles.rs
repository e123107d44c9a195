//! Integer handles for objects owned on behalf of foreign callers.

use std::collections::HashMap;

/// An opaque integer handle.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct Handle(u64);

impl Handle {
    /// The raw integer value of the handle.
    pub fn as_u64(self) -> u64 {
        self.0
    }

    /// Reconstructs a handle from its raw value.
    pub fn from_u64(raw: u64) -> Self {
        Self(raw)
    }
}

impl From<u64> for Handle {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

/// Owns objects under integer handles.
///
/// Handles are either chosen by the caller ([`HandleTable::register`]) or
/// handed out by the table ([`HandleTable::insert`]). Handed-out handles skip
/// live entries and are not reused until the whole `u64` range has been
/// handed out.
#[derive(Debug)]
pub struct HandleTable<T> {
    next: u64,
    entries: HashMap<Handle, T>,
}

impl<T> Default for HandleTable<T> {
    fn default() -> Self {
        Self {
            next: 0,
            entries: HashMap::new(),
        }
    }
}

impl<T> HandleTable<T> {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `value` under `handle`, returning the value it replaces.
    pub fn register(&mut self, handle: impl Into<Handle>, value: T) -> Option<T> {
        self.entries.insert(handle.into(), value)
    }

    /// Takes ownership of `value` under a fresh handle.
    pub fn insert(&mut self, value: T) -> Handle {
        let mut handle = Handle(self.next);
        while self.entries.contains_key(&handle) {
            handle = Handle(handle.0.wrapping_add(1));
        }
        self.next = handle.0.wrapping_add(1);
        self.entries.insert(handle, value);
        handle
    }

    /// Looks up the object behind a handle.
    pub fn get(&self, handle: impl Into<Handle>) -> Option<&T> {
        self.entries.get(&handle.into())
    }

    /// Mutably looks up the object behind a handle.
    pub fn get_mut(&mut self, handle: impl Into<Handle>) -> Option<&mut T> {
        self.entries.get_mut(&handle.into())
    }

    /// Removes and returns the object behind a handle.
    pub fn remove(&mut self, handle: impl Into<Handle>) -> Option<T> {
        self.entries.remove(&handle.into())
    }

    /// The number of live objects.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the table holds no objects.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registering_replaces_previous_value() {
        let mut table = HandleTable::new();
        assert_eq!(table.register(7, "a"), None);
        assert_eq!(table.register(7, "b"), Some("a"));
        assert_eq!(table.get(7), Some(&"b"));
        assert_eq!(table.get(8), None);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn inserted_handles_are_not_reused() {
        let mut table = HandleTable::new();
        table.register(1, "registered");
        let a = table.insert("a");
        let b = table.insert("b");
        assert_eq!((a.as_u64(), b.as_u64()), (0, 2));
        assert_eq!(table.get(1), Some(&"registered"));

        assert_eq!(table.remove(a), Some("a"));
        assert_eq!(table.remove(a), None);
        let c = table.insert("c");
        assert_ne!(c, a);

        *table.get_mut(b).unwrap() = "B";
        assert_eq!(table.get(Handle::from_u64(b.as_u64())), Some(&"B"));
        assert_eq!(table.len(), 3);
    }

    #[test]
    fn inserting_past_the_largest_handle_wraps_around_live_entries() {
        let mut table = HandleTable::new();
        table.register(0, "low");
        table.register(u64::MAX, "high");
        table.next = u64::MAX;

        let fresh = table.insert("fresh");
        assert_eq!(fresh.as_u64(), 1);
        assert_eq!(table.get(u64::MAX), Some(&"high"));
        assert_eq!(table.get(0), Some(&"low"));
        assert_eq!(table.len(), 3);
    }
}
