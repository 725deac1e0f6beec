//! Open-addressing hash table keyed by interned strings.
//!
//! Used for globals, instance fields, class method tables, and the string
//! intern set. Linear probing over a power-of-two array; deleted slots leave
//! tombstones so probe chains that passed through them stay intact. Each
//! entry carries its key's hash so nested tables (fields inside heap
//! objects) never need to consult the heap to probe.

use super::object::ObjRef;
use super::value::Value;

const MAX_LOAD_NUM: usize = 3;
const MAX_LOAD_DEN: usize = 4;
const MIN_CAPACITY: usize = 8;

#[derive(Debug, Clone)]
struct Entry {
    key: Option<ObjRef>,
    hash: u32,
    value: Value,
}

impl Entry {
    const EMPTY: Entry = Entry {
        key: None,
        hash: 0,
        value: Value::Nil,
    };

    /// A tombstone is a keyless entry with a non-nil sentinel value:
    /// "something was deleted here, keep probing".
    fn is_tombstone(&self) -> bool {
        self.key.is_none() && !matches!(self.value, Value::Nil)
    }
}

/// A string-keyed associative store.
#[derive(Debug, Clone, Default)]
pub struct Table {
    /// Live entries plus tombstones.
    count: usize,
    entries: Vec<Entry>,
}

impl Table {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of occupied slots, tombstones included.
    pub fn count(&self) -> usize {
        self.count
    }

    /// Physical array length.
    pub fn capacity(&self) -> usize {
        self.entries.len()
    }

    /// Look up `key`. Keys are interned, so identity comparison suffices.
    pub fn get(&self, key: ObjRef, hash: u32) -> Option<Value> {
        if self.count == 0 {
            return None;
        }
        let index = find_index(&self.entries, key, hash);
        let entry = &self.entries[index];
        entry.key.map(|_| entry.value)
    }

    /// Insert or overwrite. Returns true if the key was not present.
    pub fn set(&mut self, key: ObjRef, hash: u32, value: Value) -> bool {
        if (self.count + 1) * MAX_LOAD_DEN > self.entries.len() * MAX_LOAD_NUM {
            self.grow();
        }
        let index = find_index(&self.entries, key, hash);
        let entry = &mut self.entries[index];
        let is_new = entry.key.is_none();
        // Reusing a tombstone does not change the occupied count.
        if is_new && !entry.is_tombstone() {
            self.count += 1;
        }
        entry.key = Some(key);
        entry.hash = hash;
        entry.value = value;
        is_new
    }

    /// Remove `key`, leaving a tombstone. Returns true if it was present.
    pub fn delete(&mut self, key: ObjRef, hash: u32) -> bool {
        if self.count == 0 {
            return false;
        }
        let index = find_index(&self.entries, key, hash);
        let entry = &mut self.entries[index];
        if entry.key.is_none() {
            return false;
        }
        entry.key = None;
        entry.hash = 0;
        entry.value = Value::Bool(true);
        true
    }

    /// Copy every live entry of `other` into `self` (method inheritance).
    pub fn add_all(&mut self, other: &Table) {
        for entry in &other.entries {
            if let Some(key) = entry.key {
                self.set(key, entry.hash, entry.value);
            }
        }
    }

    /// Iterate live `(key, value)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (ObjRef, Value)> + '_ {
        self.entries
            .iter()
            .filter_map(|e| e.key.map(|k| (k, e.value)))
    }

    /// Probe for a key by hash, deciding matches with `eq` (byte comparison
    /// against a not-yet-interned string). Follows the same tombstone rules
    /// as ordinary lookup.
    pub fn find_key(&self, hash: u32, mut eq: impl FnMut(ObjRef) -> bool) -> Option<ObjRef> {
        if self.count == 0 {
            return None;
        }
        let mask = self.entries.len() - 1;
        let mut index = hash as usize & mask;
        loop {
            let entry = &self.entries[index];
            match entry.key {
                Some(key) => {
                    if entry.hash == hash && eq(key) {
                        return Some(key);
                    }
                }
                None => {
                    if !entry.is_tombstone() {
                        return None;
                    }
                }
            }
            index = (index + 1) & mask;
        }
    }

    /// Delete every entry whose key fails `keep` (weak intern semantics).
    pub fn retain_keys(&mut self, mut keep: impl FnMut(ObjRef) -> bool) {
        for entry in &mut self.entries {
            if let Some(key) = entry.key {
                if !keep(key) {
                    entry.key = None;
                    entry.hash = 0;
                    entry.value = Value::Bool(true);
                }
            }
        }
    }

    /// Double the array and rehash live entries; tombstones are dropped.
    fn grow(&mut self) {
        let new_capacity = (self.entries.len() * 2).max(MIN_CAPACITY);
        let old = std::mem::replace(&mut self.entries, vec![Entry::EMPTY; new_capacity]);
        self.count = 0;
        for entry in old {
            if let Some(key) = entry.key {
                let index = find_index(&self.entries, key, entry.hash);
                self.entries[index] = entry;
                self.count += 1;
            }
        }
    }
}

/// Locate the slot for `key`: its current position, or the insertion point —
/// the first tombstone passed, else the terminating empty slot.
fn find_index(entries: &[Entry], key: ObjRef, hash: u32) -> usize {
    let mask = entries.len() - 1;
    let mut index = hash as usize & mask;
    let mut tombstone: Option<usize> = None;
    loop {
        let entry = &entries[index];
        match entry.key {
            Some(k) => {
                if k == key {
                    return index;
                }
            }
            None => {
                if entry.is_tombstone() {
                    if tombstone.is_none() {
                        tombstone = Some(index);
                    }
                } else {
                    return tombstone.unwrap_or(index);
                }
            }
        }
        index = (index + 1) & mask;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vm::heap::Heap;
    use pretty_assertions::assert_eq;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn key(heap: &mut Heap, text: &str) -> (ObjRef, u32) {
        let r = heap.intern(text);
        let hash = heap.string(r).hash;
        (r, hash)
    }

    #[test]
    fn set_get_overwrite() {
        let mut heap = Heap::new();
        let mut table = Table::new();
        let (k, h) = key(&mut heap, "answer");

        assert!(table.set(k, h, Value::Number(1.0)));
        assert_eq!(table.get(k, h), Some(Value::Number(1.0)));
        assert!(!table.set(k, h, Value::Number(2.0)));
        assert_eq!(table.get(k, h), Some(Value::Number(2.0)));
    }

    #[test]
    fn delete_leaves_probe_chains_intact() {
        let mut heap = Heap::new();
        let mut table = Table::new();
        let keys: Vec<_> = (0..16).map(|i| key(&mut heap, &format!("k{}", i))).collect();
        for (i, &(k, h)) in keys.iter().enumerate() {
            table.set(k, h, Value::Number(i as f64));
        }

        // Delete half, then every survivor must still be reachable even if
        // its probe sequence passed through a deleted collider.
        for &(k, h) in keys.iter().step_by(2) {
            assert!(table.delete(k, h));
        }
        for (i, &(k, h)) in keys.iter().enumerate() {
            if i % 2 == 0 {
                assert_eq!(table.get(k, h), None);
            } else {
                assert_eq!(table.get(k, h), Some(Value::Number(i as f64)));
            }
        }
    }

    #[test]
    fn tombstones_are_reused_without_growing_count() {
        let mut heap = Heap::new();
        let mut table = Table::new();
        let (k, h) = key(&mut heap, "x");
        table.set(k, h, Value::Nil);
        let count = table.count();
        table.delete(k, h);
        assert_eq!(table.count(), count);
        table.set(k, h, Value::Bool(false));
        assert_eq!(table.count(), count);
        assert_eq!(table.get(k, h), Some(Value::Bool(false)));
    }

    #[test]
    fn churn_preserves_lookups_across_resizes() {
        let mut heap = Heap::new();
        let mut table = Table::new();
        let mut rng = StdRng::seed_from_u64(0x5eed);

        let keys: Vec<_> = (0..300)
            .map(|i| key(&mut heap, &format!("key-{}-{}", i, rng.gen::<u32>())))
            .collect();

        for (i, &(k, h)) in keys.iter().enumerate() {
            table.set(k, h, Value::Number(i as f64));
            // Load-factor invariant immediately after every insert.
            assert!(table.count() * MAX_LOAD_DEN <= table.capacity() * MAX_LOAD_NUM);
        }
        for &(k, h) in keys.iter().step_by(3) {
            assert!(table.delete(k, h));
        }
        let fresh: Vec<_> = (0..100)
            .map(|i| key(&mut heap, &format!("fresh-{}", i)))
            .collect();
        for &(k, h) in &fresh {
            table.set(k, h, Value::Bool(true));
        }

        for (i, &(k, h)) in keys.iter().enumerate() {
            if i % 3 == 0 {
                assert_eq!(table.get(k, h), None, "deleted key {} resurfaced", i);
            } else {
                assert_eq!(table.get(k, h), Some(Value::Number(i as f64)));
            }
        }
        for &(k, h) in &fresh {
            assert_eq!(table.get(k, h), Some(Value::Bool(true)));
        }
    }

    #[test]
    fn find_key_distinguishes_contents_with_equal_hashes() {
        let mut heap = Heap::new();
        let mut table = Table::new();
        let (k, h) = key(&mut heap, "needle");
        table.set(k, h, Value::Nil);

        let found = table.find_key(h, |r| heap.string(r).chars == "needle");
        assert_eq!(found, Some(k));
        let missed = table.find_key(h, |r| heap.string(r).chars == "decoy");
        assert_eq!(missed, None);
    }
}
