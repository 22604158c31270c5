use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Debug;
use std::sync::Arc;

use crate::store::cursor::TableCursor;

/// An ordered map with duplicate values: the black-box storage primitive the
/// engine assumes underneath every index and master table. Keys are unique,
/// each key holds an ordered set of values, and iteration is key-major,
/// value-minor.
///
/// The map lives behind an `Arc` so cursors read a snapshot: a write while a
/// cursor is open clones the tree for the writer and leaves the cursor's view
/// untouched.
#[derive(Debug, Clone)]
pub struct Table<K, V> {
    map: Arc<BTreeMap<K, BTreeSet<V>>>,
    len: usize,
}

impl<K, V> Default for Table<K, V> {
    fn default() -> Self {
        Self {
            map: Arc::default(),
            len: 0,
        }
    }
}

impl<K, V> Table<K, V>
where
    K: Ord + Clone + Debug,
    V: Ord + Clone + Debug,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores one pair; `false` when it was already present.
    pub fn put(&mut self, key: K, value: V) -> bool {
        let inserted = Arc::make_mut(&mut self.map)
            .entry(key)
            .or_default()
            .insert(value);
        if inserted {
            self.len += 1;
        }
        inserted
    }

    /// Drops every value under `key`, returning how many pairs went away.
    pub fn remove(&mut self, key: &K) -> usize {
        let removed = Arc::make_mut(&mut self.map)
            .remove(key)
            .map_or(0, |set| set.len());
        self.len -= removed;
        removed
    }

    /// Drops one pair; `false` when it was not present.
    pub fn remove_value(&mut self, key: &K, value: &V) -> bool {
        let map = Arc::make_mut(&mut self.map);
        let Some(set) = map.get_mut(key) else {
            return false;
        };
        let removed = set.remove(value);
        if set.is_empty() {
            map.remove(key);
        }
        if removed {
            self.len -= 1;
        }
        removed
    }

    /// The first value under `key` in value order.
    pub fn first(&self, key: &K) -> Option<V> {
        self.map.get(key).and_then(|set| set.iter().next().cloned())
    }

    pub fn has(&self, key: &K) -> bool {
        self.map.contains_key(key)
    }

    pub fn has_value(&self, key: &K, value: &V) -> bool {
        self.map.get(key).is_some_and(|set| set.contains(value))
    }

    /// Total number of pairs.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of values under one key.
    pub fn count(&self, key: &K) -> usize {
        self.map.get(key).map_or(0, |set| set.len())
    }

    pub fn values<'s>(&'s self, key: &K) -> impl Iterator<Item = &'s V> + use<'s, K, V> {
        self.map.get(key).into_iter().flatten()
    }

    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.map.keys()
    }

    /// An ordered cursor over a snapshot taken now.
    pub fn cursor(&self) -> TableCursor<K, V> {
        TableCursor::new(Arc::clone(&self.map))
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_put_remove_count() {
        let mut table: Table<i64, i64> = Table::new();
        assert!(table.put(1, 10));
        assert!(table.put(1, 11));
        assert!(!table.put(1, 10), "duplicate pair");
        assert!(table.put(2, 10));

        assert_eq!(table.len(), 3);
        assert_eq!(table.count(&1), 2);
        assert_eq!(table.first(&1), Some(10));
        assert!(table.has(&2));
        assert!(table.has_value(&1, &11));
        assert!(!table.has_value(&2, &11));

        assert!(table.remove_value(&1, &10));
        assert_eq!(table.count(&1), 1);
        assert_eq!(table.remove(&1), 1);
        assert!(!table.has(&1));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_open_cursor_keeps_its_snapshot() {
        use crate::store::cursor::Cursor;

        let mut table: Table<i64, i64> = Table::new();
        table.put(1, 1);
        let mut cursor = table.cursor();
        table.put(2, 2);

        let mut seen = Vec::new();
        while cursor.next().unwrap() {
            seen.push(cursor.get().unwrap());
        }
        assert_eq!(seen, vec![(1, 1)], "write is invisible to the open cursor");
    }
}
