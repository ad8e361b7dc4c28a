//! Persistent collections built on structural hashing.
//!
//! All three types share structure through `im` and never mutate in place: every
//! `conj` returns a new collection. Set and Map are keyed by the structural hash of the
//! member or key, so inserting a value equal to an existing one overwrites it.
//! Each collection caches its own structural hash on first use.

use std::cell::OnceCell;
use std::hash::{DefaultHasher, Hash, Hasher};

use im::OrdMap;

use crate::Failure;
use crate::value::Value;

/// Ordered, 0-indexed sequence
#[derive(Clone, Default)]
pub struct Vector {
    items: im::Vector<Value>,
    hash: OnceCell<u64>,
}

impl Vector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn nth(&self, index: usize) -> Option<&Value> {
        self.items.get(index)
    }

    /// Element at `index`, or `default` when out of range (negative indexes included)
    pub fn get(&self, index: i64, default: Value) -> Value {
        usize::try_from(index)
            .ok()
            .and_then(|i| self.items.get(i))
            .cloned()
            .unwrap_or(default)
    }

    /// Append `items` in order, returning a new Vector
    pub fn conj(&self, items: impl IntoIterator<Item = Value>) -> Vector {
        let mut next = self.items.clone();
        next.extend(items);
        Vector {
            items: next,
            hash: OnceCell::new(),
        }
    }

    pub fn iter(&self) -> im::vector::Iter<'_, Value> {
        self.items.iter()
    }

    pub fn structural_hash(&self) -> u64 {
        *self.hash.get_or_init(|| {
            let mut hasher = DefaultHasher::new();
            self.items.len().hash(&mut hasher);
            for item in &self.items {
                item.structural_hash().hash(&mut hasher);
            }
            hasher.finish()
        })
    }
}

impl FromIterator<Value> for Vector {
    fn from_iter<I: IntoIterator<Item = Value>>(iter: I) -> Self {
        Vector {
            items: iter.into_iter().collect(),
            hash: OnceCell::new(),
        }
    }
}

impl PartialEq for Vector {
    fn eq(&self, other: &Self) -> bool {
        self.items == other.items
    }
}

/// Unordered collection of distinct values
#[derive(Clone, Default)]
pub struct Set {
    members: OrdMap<u64, Value>,
    hash: OnceCell<u64>,
}

impl Set {
    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn contains(&self, value: &Value) -> bool {
        self.members.contains_key(&value.structural_hash())
    }

    /// The stored member equal to `value`, or `default`
    pub fn get(&self, value: &Value, default: Value) -> Value {
        self.members
            .get(&value.structural_hash())
            .cloned()
            .unwrap_or(default)
    }

    pub fn conj(&self, items: impl IntoIterator<Item = Value>) -> Set {
        let mut members = self.members.clone();
        for item in items {
            members.insert(item.structural_hash(), item);
        }
        Set {
            members,
            hash: OnceCell::new(),
        }
    }

    /// Members in structural hash order
    pub fn iter(&self) -> impl Iterator<Item = &Value> {
        self.members.values()
    }

    pub fn structural_hash(&self) -> u64 {
        *self.hash.get_or_init(|| {
            let mut hasher = DefaultHasher::new();
            self.members.len().hash(&mut hasher);
            for member_hash in self.members.keys() {
                member_hash.hash(&mut hasher);
            }
            hasher.finish()
        })
    }
}

impl FromIterator<Value> for Set {
    fn from_iter<I: IntoIterator<Item = Value>>(iter: I) -> Self {
        Set::default().conj(iter)
    }
}

impl PartialEq for Set {
    fn eq(&self, other: &Self) -> bool {
        self.members == other.members
    }
}

/// Unordered key/value association
#[derive(Clone, Default)]
pub struct Map {
    entries: OrdMap<u64, (Value, Value)>,
    hash: OnceCell<u64>,
}

impl Map {
    /// Build from a flat `k1 v1 k2 v2 ...` sequence
    pub fn from_flat(items: Vec<Value>) -> Result<Map, Failure> {
        Map::default().conj_flat(items)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains_key(&self, key: &Value) -> bool {
        self.entries.contains_key(&key.structural_hash())
    }

    pub fn get(&self, key: &Value, default: Value) -> Value {
        self.entries
            .get(&key.structural_hash())
            .map(|(_, value)| value.clone())
            .unwrap_or(default)
    }

    pub fn assoc(&self, key: Value, value: Value) -> Map {
        let mut entries = self.entries.clone();
        entries.insert(key.structural_hash(), (key, value));
        Map {
            entries,
            hash: OnceCell::new(),
        }
    }

    fn conj_flat(&self, items: Vec<Value>) -> Result<Map, Failure> {
        if items.len() % 2 != 0 {
            return Err(Failure::OddArity(items.len()));
        }
        let mut entries = self.entries.clone();
        let mut items = items.into_iter();
        while let (Some(key), Some(value)) = (items.next(), items.next()) {
            entries.insert(key.structural_hash(), (key, value));
        }
        Ok(Map {
            entries,
            hash: OnceCell::new(),
        })
    }

    /// Merge every item, each either a flat key/value Vector or another Map.
    /// Later entries overwrite earlier ones with an equal key.
    pub fn conj(&self, items: impl IntoIterator<Item = Value>) -> Result<Map, Failure> {
        let mut merged = self.clone();
        for item in items {
            merged = match item {
                Value::Vector(pairs) => merged.conj_flat(pairs.iter().cloned().collect())?,
                Value::Map(other) => {
                    let mut entries = merged.entries;
                    entries.extend(other.entries.clone());
                    Map {
                        entries,
                        hash: OnceCell::new(),
                    }
                }
                other => {
                    return Err(Failure::TypeMismatch(format!(
                        "cannot conj {} onto a Map",
                        other.data_type()
                    )));
                }
            };
        }
        Ok(merged)
    }

    /// Entries in key hash order
    pub fn iter(&self) -> impl Iterator<Item = (&Value, &Value)> {
        self.entries.values().map(|(key, value)| (key, value))
    }

    pub fn keys(&self) -> impl Iterator<Item = &Value> {
        self.entries.values().map(|(key, _)| key)
    }

    pub fn structural_hash(&self) -> u64 {
        *self.hash.get_or_init(|| {
            let mut hasher = DefaultHasher::new();
            self.entries.len().hash(&mut hasher);
            for (key_hash, (_, value)) in &self.entries {
                key_hash.hash(&mut hasher);
                value.structural_hash().hash(&mut hasher);
            }
            hasher.finish()
        })
    }
}

impl PartialEq for Map {
    fn eq(&self, other: &Self) -> bool {
        self.entries == other.entries
    }
}

#[cfg(test)]
#[expect(clippy::unwrap_used)] // test code OK
mod tests {
    use super::*;
    use crate::value::{kw, val};
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    #[test]
    fn test_vector_get_with_default() {
        let v: Vector = [val(10), val(20), val(30)].into_iter().collect();
        let test_cases = vec![
            (0, val(10)),
            (2, val(30)),
            (3, Value::Nil),
            (-1, Value::Nil),
            (i64::MAX, Value::Nil),
        ];
        for (index, expected) in test_cases {
            assert_eq!(v.get(index, Value::Nil), expected, "index {index}");
        }
    }

    #[test]
    fn test_vector_conj_is_persistent() {
        let v: Vector = [val(1)].into_iter().collect();
        let w = v.conj([val(2), val(3)]);
        assert_eq!(v.len(), 1);
        assert_eq!(w.len(), 3);
        assert_eq!(w.nth(2), Some(&val(3)));
        assert_ne!(v.structural_hash(), w.structural_hash());
    }

    #[test]
    fn test_set_deduplicates_structurally() {
        let set = Set::from_iter([val([1, 2]), val([1, 2]), val("a")]);
        assert_eq!(set.len(), 2);
        assert!(set.contains(&val([1, 2])));
        assert!(!set.contains(&val([2, 1])));
        assert_eq!(set.get(&val("a"), Value::Nil), val("a"));
        assert_eq!(set.get(&val("b"), val(0)), val(0));

        let grown = set.conj([val("b")]);
        assert_eq!(set.len(), 2);
        assert_eq!(grown.len(), 3);
    }

    #[test]
    fn test_map_conj_variants() {
        let base = Map::from_flat(vec![kw("a"), val(1)]).unwrap();

        let merged = base
            .conj([val(vec![kw("b"), val(2), kw("a"), val(10)])])
            .unwrap();
        assert_eq!(merged.get(&kw("a"), Value::Nil), val(10));
        assert_eq!(merged.get(&kw("b"), Value::Nil), val(2));
        assert_eq!(base.get(&kw("a"), Value::Nil), val(1));

        let other = Map::from_flat(vec![kw("c"), val(3)]).unwrap();
        let with_map = base.conj([Value::Map(other)]).unwrap();
        assert_eq!(with_map.len(), 2);

        assert_eq!(
            base.conj([val(vec![kw("x")])]).err(),
            Some(Failure::OddArity(1))
        );
        assert!(matches!(
            base.conj([val(1)]),
            Err(Failure::TypeMismatch(_))
        ));
        assert_eq!(Map::from_flat(vec![kw("a")]).err(), Some(Failure::OddArity(1)));
    }

    #[test]
    fn test_map_keys_compare_structurally() {
        let map = Map::from_flat(vec![val([1, 2]), val("pair")]).unwrap();
        let key: Vector = [val(1), val(2)].into_iter().collect();
        assert_eq!(map.get(&Value::Vector(key), Value::Nil), val("pair"));
        assert!(map.contains_key(&val([1, 2])));
        assert_eq!(map.keys().count(), 1);
    }

    proptest! {
        #[test]
        fn prop_conj_leaves_the_receiver_unchanged(
            base in prop::collection::vec(any::<i64>(), 0..8),
            extra in prop::collection::vec(any::<i64>(), 0..8),
        ) {
            let vector: Vector = base.iter().copied().map(Value::IntegerNumber).collect();
            let before = vector.structural_hash();
            let grown = vector.conj(extra.iter().copied().map(Value::IntegerNumber));
            prop_assert_eq!(vector.len(), base.len());
            prop_assert_eq!(vector.structural_hash(), before);
            prop_assert_eq!(grown.len(), base.len() + extra.len());
        }
    }
}
