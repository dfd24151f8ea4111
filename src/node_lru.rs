use crate::lru_cache::lru::Lru;
use std::hash::Hash;

/// Shared cache of loaded octree nodes, keyed by node identity (C4).
///
/// This cache is shared with the renderer's own traversal: the profile core is a *reader* that
/// only ever calls [`NodeLru::touch`] to keep nodes it is currently filtering resistant to
/// eviction by the concurrent rendering traversal (see SPEC_FULL §5, "Resource policy"). The
/// eviction policy itself — capacity and what gets dropped — is the octree subsystem's
/// contract; this type only provides the mechanism.
pub struct NodeLru<K, V> {
    inner: Lru<K, V>,
    capacity: usize,
}

impl<K, V> NodeLru<K, V>
where
    K: Hash + Eq + Clone,
{
    pub fn new(capacity: usize) -> Self {
        NodeLru {
            inner: Lru::new(),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.len() == 0
    }

    /// Inserts `value`, evicting the least recently touched entry if the cache is at capacity.
    /// Returns the evicted entry, if any.
    pub fn insert(&mut self, key: K, value: V) -> Option<(K, V)> {
        self.inner.insert(key.clone(), value);
        if self.inner.len() > self.capacity {
            // The least recently used entry is the first one in iteration order.
            let lru_key = self.inner.iter().next().map(|(k, _)| k.clone());
            if let Some(lru_key) = lru_key {
                if lru_key != key {
                    let evicted = self.inner.remove(&lru_key);
                    return evicted.map(|v| (lru_key, v));
                }
            }
        }
        None
    }

    pub fn get(&self, key: &K) -> Option<&V> {
        self.inner.get(key)
    }

    /// Marks `key` as recently used, moving it to the back of the eviction order. This is the
    /// only operation the profile core performs on nodes it does not itself own.
    pub fn touch(&mut self, key: &K) -> Option<&mut V> {
        self.inner.touch(key)
    }

    pub fn remove(&mut self, key: &K) -> Option<V> {
        self.inner.remove(key)
    }
}
