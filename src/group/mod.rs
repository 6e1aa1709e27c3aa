//! The base group: an ordered, duplicate-free collection with chainable
//! bulk operations.

pub mod methods;

use std::fmt;

use serde_json::Value;

pub use methods::{ElementRecord, GroupOptions, Handler, MethodGroup};

/// The crate version, as recorded in the package manifest.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// An ordered collection of elements that can be operated on as one.
///
/// Membership is decided by `PartialEq`: [`Group::add`] skips an element
/// equal to one already present. [`Group::map`] may produce equal elements,
/// which are kept.
#[derive(Clone, PartialEq, Eq)]
pub struct Group<T> {
    collection: Vec<T>,
}

impl<T> Default for Group<T> {
    fn default() -> Self {
        Group {
            collection: Vec::new(),
        }
    }
}

impl<T: PartialEq> Group<T> {
    /// Creates a group from a copy of `collection`. Repeated elements are
    /// admitted once, at their first position.
    pub fn create<I: IntoIterator<Item = T>>(collection: I) -> Group<T> {
        let mut group = Group::default();
        group.extend(collection);
        group
    }

    /// Appends `item` unless an equal element is already present.
    pub fn add(&mut self, item: T) -> &mut Self {
        self.insert(item);
        self
    }

    /// Removes the first element equal to `item`, if any.
    pub fn remove(&mut self, item: &T) -> &mut Self {
        self.take(item);
        self
    }

    pub fn contains(&self, item: &T) -> bool {
        self.collection.contains(item)
    }

    pub(crate) fn insert(&mut self, item: T) -> bool {
        if self.contains(&item) {
            return false;
        }
        self.collection.push(item);
        true
    }

    pub(crate) fn take(&mut self, item: &T) -> Option<T> {
        let pos = self.collection.iter().position(|x| x == item)?;
        Some(self.collection.remove(pos))
    }
}

impl<T> Group<T> {
    /// Replaces every element with `transform(element)`, in order.
    pub fn map<F>(&mut self, transform: F) -> &mut Self
    where
        F: FnMut(T) -> T,
    {
        let collection = std::mem::take(&mut self.collection);
        self.collection = collection.into_iter().map(transform).collect();
        self
    }

    /// Runs `action` on every element, in order.
    pub fn for_each<F>(&self, action: F) -> &Self
    where
        F: FnMut(&T),
    {
        self.collection.iter().for_each(action);
        self
    }

    /// Returns a copy of the current elements.
    pub fn to_vec(&self) -> Vec<T>
    where
        T: Clone,
    {
        self.collection.clone()
    }

    pub fn len(&self) -> usize {
        self.collection.len()
    }

    pub fn is_empty(&self) -> bool {
        self.collection.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.collection.iter()
    }

    pub fn as_slice(&self) -> &[T] {
        &self.collection
    }

    pub fn version(&self) -> &'static str {
        VERSION
    }
}

impl Group<Value> {
    /// Creates a group from the items of a JSON array. Any other JSON value
    /// gives an empty group.
    pub fn from_json(value: Value) -> Group<Value> {
        match value {
            Value::Array(items) => Group::create(items),
            other => {
                tracing::debug!(kind = json_kind(&other), "ignoring non-array group input");
                Group::default()
            }
        }
    }
}

pub(crate) fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

impl<T: fmt::Debug> fmt::Debug for Group<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(&self.collection).finish()
    }
}

impl<T: PartialEq> FromIterator<T> for Group<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Group::create(iter)
    }
}

impl<T: PartialEq> Extend<T> for Group<T> {
    fn extend<I: IntoIterator<Item = T>>(&mut self, iter: I) {
        for item in iter {
            self.insert(item);
        }
    }
}

impl<'a, T> IntoIterator for &'a Group<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.collection.iter()
    }
}

impl<T> IntoIterator for Group<T> {
    type Item = T;
    type IntoIter = std::vec::IntoIter<T>;

    fn into_iter(self) -> Self::IntoIter {
        self.collection.into_iter()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn scenario() {
        let mut group = Group::create(vec![1, 2, 3]);
        assert_eq!(group.to_vec(), vec![1, 2, 3]);
        group.add(3);
        assert_eq!(group.to_vec(), vec![1, 2, 3]);
        group.add(4);
        assert_eq!(group.to_vec(), vec![1, 2, 3, 4]);
        group.remove(&2);
        assert_eq!(group.to_vec(), vec![1, 3, 4]);
        group.map(|x| x * 10);
        assert_eq!(group.to_vec(), vec![10, 30, 40]);
    }

    #[test]
    fn chaining() {
        let mut seen = Vec::new();
        Group::create(["a", "b"])
            .add("c")
            .remove(&"a")
            .map(str::trim)
            .for_each(|x| seen.push(*x));
        assert_eq!(seen, vec!["b", "c"]);
    }

    #[test]
    fn create_copies_and_dedups() {
        let source = vec![1, 2, 2, 3, 1];
        let group = Group::create(source.iter().copied());
        assert_eq!(group.to_vec(), vec![1, 2, 3]);
        assert_eq!(source.len(), 5);
    }

    #[test]
    fn remove_absent_is_noop() {
        let mut group = Group::create(vec!['x']);
        group.remove(&'y');
        assert_eq!(group.as_slice(), &['x']);
    }

    #[test]
    fn remove_first_occurrence_after_map() {
        let mut group = Group::create(vec![1, 2, 3]);
        group.map(|x| x % 2);
        assert_eq!(group.to_vec(), vec![1, 0, 1]);
        group.remove(&1);
        assert_eq!(group.to_vec(), vec![0, 1]);
    }

    #[test]
    fn from_json() {
        let group = Group::from_json(json!([1, "two", null]));
        assert_eq!(group.to_vec(), vec![json!(1), json!("two"), Value::Null]);

        for value in [json!({"a": 1}), json!("abc"), json!(12), Value::Null] {
            assert!(Group::from_json(value).is_empty());
        }
    }

    #[test]
    fn version_is_set() {
        let group = Group::<u8>::default();
        assert_eq!(group.version(), env!("CARGO_PKG_VERSION"));
        assert!(!group.version().is_empty());
    }

    proptest! {
        #[test]
        fn add_is_idempotent(items in prop::collection::vec(0u8..32, 0..24), item in 0u8..32) {
            let mut once = Group::create(items.clone());
            once.add(item);
            let mut twice = Group::create(items);
            twice.add(item).add(item);
            prop_assert_eq!(once.to_vec(), twice.to_vec());
        }

        #[test]
        fn add_grows_by_at_most_one(items in prop::collection::vec(0u8..32, 0..24), item in 0u8..32) {
            let mut group = Group::create(items);
            let before = group.len();
            group.add(item);
            prop_assert!(group.len() <= before + 1);
            prop_assert!(group.contains(&item));
        }

        #[test]
        fn remove_undoes_fresh_add(items in prop::collection::vec(0u8..32, 0..24), item in 32u8..64) {
            let mut group = Group::create(items);
            let before = group.to_vec();
            group.add(item).remove(&item);
            prop_assert_eq!(group.to_vec(), before);
        }

        #[test]
        fn map_preserves_length_and_order(items in prop::collection::vec(any::<i32>(), 0..24)) {
            let mut group = Group::create(items);
            let before = group.to_vec();
            group.map(|x| x.wrapping_mul(3).wrapping_sub(1));
            let after = group.to_vec();
            prop_assert_eq!(after.len(), before.len());
            for (x, y) in before.iter().zip(&after) {
                prop_assert_eq!(*y, x.wrapping_mul(3).wrapping_sub(1));
            }
        }

        #[test]
        fn to_vec_is_independent(items in prop::collection::vec(any::<u16>(), 1..24)) {
            let group = Group::create(items);
            let before = group.to_vec();
            let mut copy = group.to_vec();
            copy.reverse();
            copy.push(7);
            copy.remove(0);
            prop_assert_eq!(group.to_vec(), before);
        }
    }
}
