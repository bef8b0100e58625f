//! Per-request feature set.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;

use parking_lot::RwLock;

/// Mutable mapping from capability type to its current implementation.
///
/// Every layer handling a request shares the same collection, so a value
/// installed by one layer is visible to everything downstream and a value
/// restored afterwards is visible to everything upstream. Absence is a
/// first-class state: setting `None` removes the entry.
#[derive(Default)]
pub struct FeatureCollection {
    entries: RwLock<HashMap<TypeId, Box<dyn Any + Send + Sync>>>,
}

impl FeatureCollection {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get<T>(&self) -> Option<T>
    where
        T: Clone + Send + Sync + 'static,
    {
        self.entries
            .read()
            .get(&TypeId::of::<T>())
            .and_then(|boxed| boxed.downcast_ref::<T>())
            .cloned()
    }

    /// Replace the entry for `T` (removing it when `value` is `None`) and
    /// return whatever was there before.
    pub fn set<T>(&self, value: Option<T>) -> Option<T>
    where
        T: Clone + Send + Sync + 'static,
    {
        let mut entries = self.entries.write();
        let previous = match value {
            Some(v) => entries.insert(TypeId::of::<T>(), Box::new(v)),
            None => entries.remove(&TypeId::of::<T>()),
        };
        previous.and_then(|boxed| boxed.downcast::<T>().ok().map(|b| *b))
    }

    pub fn insert<T>(&self, value: T) -> Option<T>
    where
        T: Clone + Send + Sync + 'static,
    {
        self.set(Some(value))
    }

    pub fn remove<T>(&self) -> Option<T>
    where
        T: Clone + Send + Sync + 'static,
    {
        self.set::<T>(None)
    }

    #[must_use]
    pub fn contains<T: 'static>(&self) -> bool {
        self.entries.read().contains_key(&TypeId::of::<T>())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl fmt::Debug for FeatureCollection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FeatureCollection")
            .field("len", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Flag(u8);

    #[test]
    fn set_returns_previous_value() {
        let features = FeatureCollection::new();
        assert_eq!(features.insert(Flag(1)), None);
        assert_eq!(features.insert(Flag(2)), Some(Flag(1)));
        assert_eq!(features.get::<Flag>(), Some(Flag(2)));
    }

    #[test]
    fn setting_none_removes_the_entry() {
        let features = FeatureCollection::new();
        features.insert(Flag(1));
        assert_eq!(features.set::<Flag>(None), Some(Flag(1)));
        assert!(!features.contains::<Flag>());
        assert!(features.is_empty());
    }

    #[test]
    fn entries_are_keyed_by_type() {
        let features = FeatureCollection::new();
        features.insert(Flag(3));
        features.insert(Arc::new("shared".to_string()));
        assert_eq!(features.len(), 2);
        assert_eq!(features.remove::<Flag>(), Some(Flag(3)));
        assert_eq!(features.get::<Arc<String>>().as_deref().map(String::as_str), Some("shared"));
    }
}
