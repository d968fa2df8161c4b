//! Open-addressing set table.
//!
//! Programs print sets, so iteration has to visit elements in the order
//! CPython's `setobject.c` leaves them in its table. The table reproduces
//! that layout: the same hashes, a run of linear slots before each
//! perturbed jump, dummy markers for deleted entries, and the same resize
//! thresholds and growth factors.

use super::errors::PyException;
use super::value::{HashKey, Value};

const MIN_SIZE: usize = 8;
const LINEAR_RUN: usize = 9;
const PERTURB_SHIFT: u32 = 5;

#[derive(Debug, Clone)]
struct Entry {
    hash: i64,
    key: HashKey,
    value: Value,
}

#[derive(Debug, Clone)]
enum Slot {
    Empty,
    /// Deleted entry; keeps lookup chains intact
    Dummy,
    Active(Entry),
}

/// Visit slot positions in lookup order for `hash` until `visit` returns a
/// result. The table always keeps an empty slot, so every walk ends.
fn walk<R>(hash: i64, mask: usize, mut visit: impl FnMut(usize) -> Option<R>) -> R {
    let mask = mask as u64;
    let mut perturb = hash as u64;
    let mut start = perturb & mask;
    loop {
        let first = start as usize;
        let run = if start + LINEAR_RUN as u64 <= mask {
            LINEAR_RUN
        } else {
            0
        };
        for index in first..=first + run {
            if let Some(found) = visit(index) {
                return found;
            }
        }
        perturb >>= PERTURB_SHIFT;
        start = start
            .wrapping_mul(5)
            .wrapping_add(1)
            .wrapping_add(perturb)
            & mask;
    }
}

/// Place an entry known to be absent into the first empty slot
fn insert_clean(table: &mut [Slot], entry: Entry) {
    let index = walk(entry.hash, table.len() - 1, |index| {
        matches!(table[index], Slot::Empty).then_some(index)
    });
    table[index] = Slot::Active(entry);
}

#[derive(Debug, Clone)]
pub struct Set {
    table: Vec<Slot>,
    /// Active plus dummy slots
    fill: usize,
    used: usize,
    /// Where the next `pop` starts scanning
    finger: usize,
}

impl Default for Set {
    fn default() -> Self {
        Self {
            table: vec![Slot::Empty; MIN_SIZE],
            fill: 0,
            used: 0,
            finger: 0,
        }
    }
}

impl Set {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `values` one after another, as a set display does
    pub fn from_values(values: Vec<Value>) -> Result<Self, PyException> {
        let mut set = Self::new();
        for value in values {
            set.add(value)?;
        }
        Ok(set)
    }

    /// A display of three or more constants compiles to a frozenset
    /// constant, which is built, rebuilt from its own iteration order and
    /// then merged into the new set.
    pub fn from_constants(values: Vec<Value>) -> Result<Self, PyException> {
        let folded = Set::from_values(values)?;
        let rebuilt = Set::from_values(folded.values())?;
        Ok(rebuilt.copy())
    }

    pub fn len(&self) -> usize {
        self.used
    }

    pub fn is_empty(&self) -> bool {
        self.used == 0
    }

    fn mask(&self) -> usize {
        self.table.len() - 1
    }

    fn entries(&self) -> impl Iterator<Item = &Entry> + '_ {
        self.table.iter().filter_map(|slot| match slot {
            Slot::Active(entry) => Some(entry),
            _ => None,
        })
    }

    /// Values in table order
    pub fn values(&self) -> Vec<Value> {
        self.entries().map(|entry| entry.value.clone()).collect()
    }

    /// `Ok` with the slot holding `key`, or `Err` with the empty slot that
    /// ended the search.
    fn lookup(&self, key: &HashKey, hash: i64) -> Result<usize, usize> {
        let table = &self.table;
        walk(hash, self.mask(), |index| match &table[index] {
            Slot::Empty => Some(Err(index)),
            Slot::Active(entry) if entry.hash == hash && entry.key == *key => Some(Ok(index)),
            _ => None,
        })
    }

    fn has_entry(&self, entry: &Entry) -> bool {
        self.lookup(&entry.key, entry.hash).is_ok()
    }

    pub fn contains(&self, value: &Value) -> Result<bool, PyException> {
        let key = HashKey::from_value(value)?;
        let hash = key.py_hash();
        Ok(self.lookup(&key, hash).is_ok())
    }

    pub fn add(&mut self, value: Value) -> Result<(), PyException> {
        let key = HashKey::from_value(&value)?;
        let hash = key.py_hash();
        self.add_entry(Entry { hash, key, value });
        Ok(())
    }

    fn add_entry(&mut self, entry: Entry) {
        let table = &self.table;
        let mut free = None;
        let found = walk(entry.hash, self.mask(), |index| match &table[index] {
            Slot::Empty => Some(Some(index)),
            Slot::Active(active) if active.hash == entry.hash && active.key == entry.key => {
                Some(None)
            }
            Slot::Active(_) => None,
            Slot::Dummy => {
                free = Some(index);
                None
            }
        });
        let Some(index) = found else {
            return;
        };
        // the last dummy passed on the way is reused without growing fill
        if let Some(free) = free {
            self.table[free] = Slot::Active(entry);
            self.used += 1;
            return;
        }
        self.table[index] = Slot::Active(entry);
        self.fill += 1;
        self.used += 1;
        if self.fill * 5 >= self.mask() * 3 {
            self.resize(self.growth_target());
        }
    }

    fn growth_target(&self) -> usize {
        if self.used > 50_000 {
            self.used * 2
        } else {
            self.used * 4
        }
    }

    /// Rebuild into the smallest power-of-two table larger than `min_used`
    fn resize(&mut self, min_used: usize) {
        let mut size = MIN_SIZE;
        while size <= min_used {
            size <<= 1;
        }
        let old = std::mem::replace(&mut self.table, vec![Slot::Empty; size]);
        self.fill = self.used;
        for slot in old {
            if let Slot::Active(entry) = slot {
                insert_clean(&mut self.table, entry);
            }
        }
    }

    /// Remove `value`, reporting whether it was present
    pub fn remove(&mut self, value: &Value) -> Result<bool, PyException> {
        let key = HashKey::from_value(value)?;
        let hash = key.py_hash();
        Ok(self.discard_entry(&key, hash))
    }

    fn discard_entry(&mut self, key: &HashKey, hash: i64) -> bool {
        match self.lookup(key, hash) {
            Ok(index) => {
                self.table[index] = Slot::Dummy;
                self.used -= 1;
                true
            }
            Err(_) => false,
        }
    }

    /// Remove and return the first entry at or after the finger
    pub fn pop(&mut self) -> Option<Value> {
        if self.used == 0 {
            return None;
        }
        let mask = self.mask();
        let mut index = self.finger & mask;
        while !matches!(self.table[index], Slot::Active(_)) {
            index = (index + 1) & mask;
        }
        let Slot::Active(entry) = std::mem::replace(&mut self.table[index], Slot::Dummy) else {
            return None;
        };
        self.used -= 1;
        self.finger = index + 1;
        Some(entry.value)
    }

    pub fn clear(&mut self) {
        self.table = vec![Slot::Empty; MIN_SIZE];
        self.fill = 0;
        self.used = 0;
    }

    pub fn copy(&self) -> Set {
        let mut copy = Set::new();
        copy.merge(self);
        copy
    }

    /// Take over another set's table; the pop position stays
    pub fn replace_entries(&mut self, other: Set) {
        let finger = self.finger;
        *self = other;
        self.finger = finger;
    }

    /// Add every element of another set, walking its table in order
    pub fn merge(&mut self, other: &Set) {
        if other.used == 0 {
            return;
        }
        self.reserve(other.used);
        if self.fill == 0 && self.mask() == other.mask() && other.fill == other.used {
            self.table = other.table.clone();
            self.fill = other.fill;
            self.used = other.used;
            return;
        }
        if self.fill == 0 {
            self.fill = other.used;
            self.used = other.used;
            for entry in other.entries() {
                insert_clean(&mut self.table, entry.clone());
            }
            return;
        }
        for entry in other.entries() {
            self.add_entry(entry.clone());
        }
    }

    /// Reserve room for `incoming` more entries before a bulk insert
    pub fn reserve(&mut self, incoming: usize) {
        if (self.fill + incoming) * 5 >= self.mask() * 3 {
            self.resize((self.used + incoming) * 2);
        }
    }

    /// Elements of both sets, built by walking the smaller one
    pub fn intersection(&self, other: &Set) -> Set {
        let (small, large) = if other.used > self.used {
            (self, other)
        } else {
            (other, self)
        };
        let mut result = Set::new();
        for entry in small.entries() {
            if large.has_entry(entry) {
                result.add_entry(entry.clone());
            }
        }
        result
    }

    pub fn difference(&self, other: &Set) -> Set {
        if (self.used >> 2) > other.used {
            let mut result = self.copy();
            result.difference_update(other);
            return result;
        }
        let mut result = Set::new();
        for entry in self.entries() {
            if !other.has_entry(entry) {
                result.add_entry(entry.clone());
            }
        }
        result
    }

    /// Entries for which `keep` holds, added in table order
    pub fn filtered(&self, mut keep: impl FnMut(&Value) -> bool) -> Set {
        let mut result = Set::new();
        for entry in self.entries() {
            if keep(&entry.value) {
                result.add_entry(entry.clone());
            }
        }
        result
    }

    pub fn difference_update(&mut self, other: &Set) {
        let common;
        let other = if (other.used >> 3) > self.used {
            common = self.intersection(other);
            &common
        } else {
            other
        };
        for entry in other.entries() {
            self.discard_entry(&entry.key, entry.hash);
        }
        self.shrink_dummies();
    }

    /// Compact the table once dummies take up more than a quarter of it
    pub fn shrink_dummies(&mut self) {
        if self.fill - self.used > self.mask() / 4 {
            self.resize(self.growth_target());
        }
    }

    pub fn symmetric_difference_update(&mut self, other: &Set) {
        for entry in other.entries() {
            if !self.discard_entry(&entry.key, entry.hash) {
                self.add_entry(entry.clone());
            }
        }
    }

    pub fn union(&self, other: &Set) -> Set {
        let mut result = self.copy();
        result.merge(other);
        result
    }

    pub fn symmetric_difference(&self, other: &Set) -> Set {
        let mut result = other.copy();
        result.symmetric_difference_update(self);
        result
    }

    pub fn is_subset(&self, other: &Set) -> bool {
        self.used <= other.used && self.entries().all(|entry| other.has_entry(entry))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ints(set: &Set) -> Vec<i64> {
        set.values().iter().filter_map(Value::as_int).collect()
    }

    fn set_of(values: &[i64]) -> Set {
        Set::from_values(values.iter().copied().map(Value::Int).collect()).unwrap()
    }

    #[test]
    fn test_iteration_follows_table_slots() {
        assert_eq!(ints(&set_of(&[3, 1, 2])), vec![1, 2, 3]);
        assert_eq!(ints(&set_of(&[9, 8, 1])), vec![8, 9, 1]);
        assert_eq!(ints(&set_of(&[10, 5, 100, 33])), vec![33, 10, 100, 5]);
        assert_eq!(ints(&set_of(&[5, 3, 9, 1])), vec![9, 3, 5, 1]);
    }

    #[test]
    fn test_constant_displays_are_rebuilt() {
        let values = |items: &[i64]| items.iter().copied().map(Value::Int).collect::<Vec<_>>();
        assert_eq!(ints(&set_of(&[145, 195, 16, 65, 30])), vec![65, 195, 16, 145, 30]);
        let folded = Set::from_constants(values(&[145, 195, 16, 65, 30])).unwrap();
        assert_eq!(ints(&folded), vec![16, 65, 145, 195, 30]);
        let folded = Set::from_constants(values(&[47, 161, 185, 75])).unwrap();
        assert_eq!(ints(&folded), vec![185, 161, 75, 47]);
    }

    #[test]
    fn test_pop_advances_finger() {
        let mut set = set_of(&[1, 2, 3]);
        assert_eq!(set.pop().and_then(|v| v.as_int()), Some(1));
        set.add(Value::Int(1)).unwrap();
        assert_eq!(set.pop().and_then(|v| v.as_int()), Some(2));
        assert_eq!(ints(&set), vec![1, 3]);
    }

    #[test]
    fn test_removed_slots_keep_lookups_working() {
        let mut set = set_of(&[1, 9, 17]);
        assert!(set.remove(&Value::Int(9)).unwrap());
        assert!(set.contains(&Value::Int(17)).unwrap());
        assert!(!set.contains(&Value::Int(9)).unwrap());
        assert_eq!(set.len(), 2);

        let mut set = set_of(&[1, 9]);
        set.remove(&Value::Int(1)).unwrap();
        set.add(Value::Int(17)).unwrap();
        assert_eq!(ints(&set), vec![17, 9]);
    }

    #[test]
    fn test_growth_keeps_every_element() {
        let set = set_of(&(0..100).collect::<Vec<_>>());
        assert_eq!(set.len(), 100);
        assert_eq!(ints(&set), (0..100).collect::<Vec<_>>());
    }

    #[test]
    fn test_set_algebra() {
        let a = set_of(&[1, 2, 3, 4]);
        let b = set_of(&[3, 4, 5]);
        assert_eq!(ints(&a.union(&b)), vec![1, 2, 3, 4, 5]);
        assert_eq!(ints(&a.intersection(&b)), vec![3, 4]);
        assert_eq!(ints(&a.difference(&b)), vec![1, 2]);
        assert_eq!(ints(&a.symmetric_difference(&b)), vec![1, 2, 5]);
        assert!(set_of(&[3]).is_subset(&b));
    }
}
