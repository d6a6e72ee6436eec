//! Init-time registration tables mapping a type tag to a factory.
//!
//! Backend adapters, reporters and config providers are all looked up this
//! way. A table is filled once at startup and then only read.

use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;

/// Factory producing a fresh, uninitialized plugin instance.
pub type Factory<T> = Arc<dyn Fn() -> Box<T> + Send + Sync>;

/// A table of factories keyed by type tag.
pub struct PluginTable<K, T: ?Sized> {
    factories: HashMap<K, Factory<T>>,
}

impl<K, T> PluginTable<K, T>
where
    K: Eq + Hash,
    T: ?Sized,
{
    /// Creates an empty table.
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Registers a factory, replacing any previous one for `key`.
    pub fn register<F>(&mut self, key: K, factory: F) -> &mut Self
    where
        F: Fn() -> Box<T> + Send + Sync + 'static,
    {
        self.factories.insert(key, Arc::new(factory));
        self
    }

    /// Builder-style [`register`](Self::register).
    pub fn with<F>(mut self, key: K, factory: F) -> Self
    where
        F: Fn() -> Box<T> + Send + Sync + 'static,
    {
        self.register(key, factory);
        self
    }

    /// Creates a new instance for `key`, or `None` if nothing is registered.
    pub fn create(&self, key: &K) -> Option<Box<T>> {
        self.factories.get(key).map(|factory| factory())
    }

    /// Returns true if a factory is registered for `key`.
    pub fn supports(&self, key: &K) -> bool {
        self.factories.contains_key(key)
    }

    /// Returns the registered keys.
    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.factories.keys()
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}

impl<K: Eq + Hash, T: ?Sized> Default for PluginTable<K, T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Clone, T: ?Sized> Clone for PluginTable<K, T> {
    fn clone(&self) -> Self {
        Self {
            factories: self.factories.clone(),
        }
    }
}

impl<K: fmt::Debug, T: ?Sized> fmt::Debug for PluginTable<K, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.factories.keys()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    trait Greeter: Send + Sync {
        fn greet(&self) -> String;
    }

    struct English;

    impl Greeter for English {
        fn greet(&self) -> String {
            "hello".to_string()
        }
    }

    #[test]
    fn test_create_registered() {
        let table: PluginTable<&'static str, dyn Greeter> =
            PluginTable::new().with("en", || Box::new(English) as Box<dyn Greeter>);
        assert!(table.supports(&"en"));
        assert_eq!(table.create(&"en").map(|g| g.greet()), Some("hello".to_string()));
    }

    #[test]
    fn test_create_missing() {
        let table: PluginTable<&'static str, dyn Greeter> = PluginTable::new();
        assert!(table.create(&"fr").is_none());
        assert!(table.is_empty());
    }

    #[test]
    fn test_each_create_is_fresh() {
        let table: PluginTable<u8, Vec<u8>> = PluginTable::new().with(1, || Box::new(vec![1]));
        let mut first = table.create(&1).unwrap();
        first.push(2);
        assert_eq!(*table.create(&1).unwrap(), vec![1]);
    }
}
