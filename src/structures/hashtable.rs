use std::collections::hash_map::RandomState;
use std::fmt;
use std::hash::{BuildHasher, Hash};

use log::debug;
use parking_lot::RwLock;

/// Number of buckets used by [`ConcurrentHashtable::new`].
pub const DEFAULT_BUCKET_COUNT: usize = 5;

/// A hashtable with a fixed number of buckets, each behind its own reader/writer lock.
///
/// A key always lives in bucket `hash(key) % bucket_count`, and every operation locks that
/// bucket alone: reads of a bucket run in parallel, writes to it are exclusive, and
/// operations on different buckets never contend. There is no table-wide lock.
///
/// The table never resizes. Each bucket is a plain vector scanned linearly, so the bucket
/// count should be picked for the expected number of keys.
pub struct ConcurrentHashtable<K, V, S = RandomState> {
    buckets: Vec<Bucket<K, V>>,
    hasher: S,
}

struct Bucket<K, V> {
    entries: RwLock<Vec<(K, V)>>,
}

impl<K, V> Bucket<K, V> {
    fn new() -> Self {
        Bucket {
            entries: RwLock::new(Vec::new()),
        }
    }
}

impl<K: Hash + Eq, V> ConcurrentHashtable<K, V, RandomState> {
    /// Create a table with [`DEFAULT_BUCKET_COUNT`] buckets.
    /// # Examples
    /// ```
    /// use concurrent_containers::structures::ConcurrentHashtable;
    ///
    /// let table: ConcurrentHashtable<String, u8> = ConcurrentHashtable::new();
    /// assert_eq!(table.bucket_count(), 5);
    /// ```
    pub fn new() -> Self {
        Self::with_buckets(DEFAULT_BUCKET_COUNT)
    }

    /// Create a table with `num_buckets` buckets.
    /// # Panics
    /// If `num_buckets` is zero.
    pub fn with_buckets(num_buckets: usize) -> Self {
        Self::with_buckets_and_hasher(num_buckets, RandomState::new())
    }
}

impl<K: Hash + Eq, V, S: BuildHasher> ConcurrentHashtable<K, V, S> {
    /// Create a table with `num_buckets` buckets that places keys using `hasher`.
    /// # Panics
    /// If `num_buckets` is zero.
    pub fn with_buckets_and_hasher(num_buckets: usize, hasher: S) -> Self {
        assert!(num_buckets > 0, "a hashtable needs at least one bucket");
        debug!("creating hashtable with {} buckets", num_buckets);
        Self {
            buckets: (0..num_buckets).map(|_| Bucket::new()).collect(),
            hasher,
        }
    }

    fn bucket(&self, key: &K) -> &Bucket<K, V> {
        let hash = self.hasher.hash_one(key);
        &self.buckets[(hash % self.buckets.len() as u64) as usize]
    }

    /// Return a copy of the value stored for `key`, or `None` if there is none.
    /// # Examples
    /// ```
    /// use concurrent_containers::structures::ConcurrentHashtable;
    ///
    /// let table = ConcurrentHashtable::new();
    /// table.set("answer", 42);
    /// assert_eq!(table.get(&"answer"), Some(42));
    /// assert_eq!(table.get(&"question"), None);
    /// ```
    pub fn get(&self, key: &K) -> Option<V>
    where
        V: Clone,
    {
        let entries = self.bucket(key).entries.read();
        entries
            .iter()
            .find(|(entry_key, _)| entry_key == key)
            .map(|(_, value)| value.clone())
    }

    /// Whether the table holds a value for `key`.
    pub fn contains_key(&self, key: &K) -> bool {
        let entries = self.bucket(key).entries.read();
        entries.iter().any(|(entry_key, _)| entry_key == key)
    }

    /// Store `value` for `key`, replacing any value already there.
    /// # Examples
    /// ```
    /// use concurrent_containers::structures::ConcurrentHashtable;
    ///
    /// let table = ConcurrentHashtable::new();
    /// table.set(1, "one");
    /// table.set(1, "uno");
    /// assert_eq!(table.get(&1), Some("uno"));
    /// assert_eq!(table.len(), 1);
    /// ```
    pub fn set(&self, key: K, value: V) {
        let mut entries = self.bucket(&key).entries.write();
        match entries.iter_mut().find(|(entry_key, _)| *entry_key == key) {
            Some((_, existing)) => *existing = value,
            None => entries.push((key, value)),
        }
    }

    /// Remove the entry for `key` if there is one.
    pub fn remove(&self, key: &K) {
        let mut entries = self.bucket(key).entries.write();
        if let Some(position) = entries.iter().position(|(entry_key, _)| entry_key == key) {
            entries.remove(position);
        }
    }

    /// Empty every bucket.
    ///
    /// Buckets are cleared one at a time, so a concurrent reader may still find an entry
    /// in a bucket that has not been reached yet.
    pub fn clear(&self) {
        for bucket in &self.buckets {
            bucket.entries.write().clear();
        }
    }

    /// The number of entries, counted one bucket at a time. Like [`clear`] this is not a
    /// snapshot of the whole table.
    ///
    /// [`clear`]: ConcurrentHashtable::clear
    pub fn len(&self) -> usize {
        self.buckets
            .iter()
            .map(|bucket| bucket.entries.read().len())
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets
            .iter()
            .all(|bucket| bucket.entries.read().is_empty())
    }

    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }
}

impl<K: Hash + Eq, V> Default for ConcurrentHashtable<K, V, RandomState> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V, S> fmt::Debug for ConcurrentHashtable<K, V, S>
where
    K: fmt::Debug,
    V: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut map = f.debug_map();
        for bucket in &self.buckets {
            let entries = bucket.entries.read();
            for (key, value) in entries.iter() {
                map.entry(key, value);
            }
        }
        map.finish()
    }
}
