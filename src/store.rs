pub mod memory;

pub type KeyIterator<'a, Key> = Box<dyn Iterator<Item = Key> + 'a>;

/// Storage seam for the resident entity map.
///
/// Entries are only ever written after a successful bulk load and only ever
/// removed all at once via `flush`; there is no per-key delete and no
/// replacement tracking, so reads have no side effects.
pub trait CacheStoreStrategy<Key, Value>: Send {
    fn get(&self, key: &Key) -> Option<Value>;

    fn put(&mut self, key: &Key, value: Value);

    fn flush(&mut self);

    fn get_keys(&self) -> KeyIterator<'_, Key>;

    fn contains(&self, key: &Key) -> bool;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
