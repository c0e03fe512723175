use std::collections::HashMap;
use std::hash::Hash;

use crate::store::{CacheStoreStrategy, KeyIterator};

/// Plain process-memory store; the default backing for [`crate::EntityCache`].
#[derive(Default)]
pub struct MemoryStore<Key, Value> {
    data: HashMap<Key, Value>,
}

impl<Key, Value> MemoryStore<Key, Value> {
    pub fn new() -> Self {
        MemoryStore {
            data: HashMap::new(),
        }
    }
}

impl<Key, Value> CacheStoreStrategy<Key, Value> for MemoryStore<Key, Value>
where
    Key: Eq + Hash + Clone + Send,
    Value: Clone + Send,
{
    fn get(&self, key: &Key) -> Option<Value> {
        self.data.get(key).cloned()
    }

    fn put(&mut self, key: &Key, value: Value) {
        self.data.insert(key.clone(), value);
    }

    fn flush(&mut self) {
        self.data.clear();
    }

    fn get_keys(&self) -> KeyIterator<'_, Key> {
        Box::new(self.data.keys().cloned())
    }

    fn contains(&self, key: &Key) -> bool {
        self.data.contains_key(key)
    }

    fn len(&self) -> usize {
        self.data.len()
    }
}
