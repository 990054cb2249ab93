//! Ordered multi-valued mapping.
//!
//! [`MultiDict`] keeps, for every key, a non-empty list of values in the
//! order they were added. Scalar access ([`MultiDict::get`]) always returns
//! the *last* value for a key, while [`MultiDict::getlist`] exposes the whole
//! list. It backs the query string, form, upload and cookie views of a
//! request.
//!
//! # Example
//!
//! ```
//! use sluice_core::MultiDict;
//!
//! let mut params: MultiDict = MultiDict::new();
//! params.append("tag", "a".to_string());
//! params.append("tag", "b".to_string());
//!
//! assert_eq!(params.get("tag").map(String::as_str), Some("b"));
//! assert_eq!(params.getlist("tag").unwrap(), ["a", "b"]);
//! ```

use std::collections::HashMap;

use serde::ser::{Serialize, SerializeMap, Serializer};

/// Errors raised by [`MultiDict`] operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MultiDictError {
    /// The key is not present and no default was supplied.
    KeyNotFound {
        /// The missing key.
        key: String,
    },
    /// An argument violated the non-empty list invariant.
    InvalidArgument {
        /// Description of the violation.
        detail: &'static str,
    },
}

impl std::fmt::Display for MultiDictError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::KeyNotFound { key } => write!(f, "key not found: {key:?}"),
            Self::InvalidArgument { detail } => write!(f, "invalid argument: {detail}"),
        }
    }
}

impl std::error::Error for MultiDictError {}

const EMPTY_LIST: &str = "value list must not be empty";

/// An insertion-ordered map from string keys to non-empty value lists.
///
/// Values default to `String`; request uploads use `MultiDict<FileUpload>`.
/// `Clone` is only available when the values are `Clone`, so maps holding
/// live upload handles cannot be duplicated by accident.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultiDict<V = String> {
    entries: Vec<(String, Vec<V>)>,
    index: HashMap<String, usize>,
}

impl<V> Default for MultiDict<V> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            index: HashMap::new(),
        }
    }
}

impl<V> MultiDict<V> {
    /// Create an empty map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of distinct keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the map holds no keys.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns true if `key` is present.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.index.contains_key(key)
    }

    /// Last value stored for `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&V> {
        self.list(key).and_then(<[V]>::last)
    }

    /// Last value stored for `key`, or `default` when the key is absent.
    #[must_use]
    pub fn get_or<'a>(&'a self, key: &str, default: &'a V) -> &'a V {
        self.get(key).unwrap_or(default)
    }

    /// Last value stored for `key`, failing when the key is absent.
    pub fn try_get(&self, key: &str) -> Result<&V, MultiDictError> {
        self.getlist(key).and_then(|values| {
            values.last().ok_or_else(|| MultiDictError::KeyNotFound {
                key: key.to_string(),
            })
        })
    }

    /// The full ordered list of values for `key`.
    pub fn getlist(&self, key: &str) -> Result<&[V], MultiDictError> {
        self.list(key).ok_or_else(|| MultiDictError::KeyNotFound {
            key: key.to_string(),
        })
    }

    /// Replace the list for `key` with `values`.
    ///
    /// Fails with [`MultiDictError::InvalidArgument`] when `values` is empty;
    /// the map is left untouched in that case.
    pub fn setlist(&mut self, key: impl Into<String>, values: Vec<V>) -> Result<(), MultiDictError> {
        if values.is_empty() {
            return Err(MultiDictError::InvalidArgument { detail: EMPTY_LIST });
        }
        self.put(key.into(), values);
        Ok(())
    }

    /// Scalar assignment: replace the list for `key` with `[value]`.
    pub fn insert(&mut self, key: impl Into<String>, value: V) {
        self.put(key.into(), vec![value]);
    }

    /// Add `value` at the end of the list for `key`.
    ///
    /// An absent key starts a new list that contains only `value`.
    pub fn append(&mut self, key: impl Into<String>, value: V) {
        let key = key.into();
        match self.index.get(&key) {
            Some(&slot) => self.entries[slot].1.push(value),
            None => {
                self.put(key, vec![value]);
            }
        }
    }

    /// Return the last value for `key`, inserting `[default]` first if absent.
    pub fn setdefault(&mut self, key: impl Into<String>, default: V) -> &V {
        let key = key.into();
        let slot = match self.index.get(&key) {
            Some(&slot) => slot,
            None => self.put(key, vec![default]),
        };
        let values = &self.entries[slot].1;
        &values[values.len() - 1]
    }

    /// Return the list for `key`, storing `defaults` first if absent.
    ///
    /// `defaults` must be non-empty even when the key already exists.
    pub fn setlistdefault(
        &mut self,
        key: impl Into<String>,
        defaults: Vec<V>,
    ) -> Result<&[V], MultiDictError> {
        if defaults.is_empty() {
            return Err(MultiDictError::InvalidArgument { detail: EMPTY_LIST });
        }
        let key = key.into();
        let slot = match self.index.get(&key) {
            Some(&slot) => slot,
            None => self.put(key, defaults),
        };
        Ok(&self.entries[slot].1)
    }

    /// Merge another multi-valued map, replacing whole lists per key.
    pub fn update(&mut self, other: MultiDict<V>) {
        for (key, values) in other.entries {
            self.put(key, values);
        }
    }

    /// Merge single-valued pairs, replacing each key's list with a singleton.
    pub fn update_scalars<K, I>(&mut self, pairs: I)
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, V)>,
    {
        for (key, value) in pairs {
            self.insert(key, value);
        }
    }

    /// Remove `key` and return its list.
    pub fn remove(&mut self, key: &str) -> Option<Vec<V>> {
        let slot = self.index.remove(key)?;
        let (_, values) = self.entries.remove(slot);
        for (key, _) in &self.entries[slot..] {
            if let Some(position) = self.index.get_mut(key) {
                *position -= 1;
            }
        }
        Some(values)
    }

    /// Drop every key.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.index.clear();
    }

    /// Keys in insertion order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(key, _)| key.as_str())
    }

    /// Last value of every key, in key insertion order.
    pub fn values(&self) -> impl Iterator<Item = &V> {
        self.entries.iter().filter_map(|(_, values)| values.last())
    }

    /// `(key, last value)` pairs in key insertion order.
    pub fn items(&self) -> impl Iterator<Item = (&str, &V)> {
        self.entries
            .iter()
            .filter_map(|(key, values)| values.last().map(|value| (key.as_str(), value)))
    }

    /// `(key, full list)` pairs in key insertion order.
    pub fn lists(&self) -> impl Iterator<Item = (&str, &[V])> {
        self.entries
            .iter()
            .map(|(key, values)| (key.as_str(), values.as_slice()))
    }

    /// Collapse into `(key, last value)` pairs, dropping earlier values.
    #[must_use]
    pub fn into_single(self) -> Vec<(String, V)> {
        self.entries
            .into_iter()
            .filter_map(|(key, mut values)| values.pop().map(|value| (key, value)))
            .collect()
    }

    fn list(&self, key: &str) -> Option<&[V]> {
        self.index
            .get(key)
            .map(|&slot| self.entries[slot].1.as_slice())
    }

    fn put(&mut self, key: String, values: Vec<V>) -> usize {
        debug_assert!(!values.is_empty());
        if let Some(&slot) = self.index.get(&key) {
            self.entries[slot].1 = values;
            slot
        } else {
            let slot = self.entries.len();
            self.index.insert(key.clone(), slot);
            self.entries.push((key, values));
            slot
        }
    }
}

impl<K: Into<String>, V> FromIterator<(K, V)> for MultiDict<V> {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = Self::new();
        map.extend(iter);
        map
    }
}

impl<K: Into<String>, V> Extend<(K, V)> for MultiDict<V> {
    fn extend<I: IntoIterator<Item = (K, V)>>(&mut self, iter: I) {
        for (key, value) in iter {
            self.append(key, value);
        }
    }
}

impl<V: Serialize> Serialize for MultiDict<V> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.len()))?;
        for (key, values) in self.lists() {
            map.serialize_entry(key, values)?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| (*v).to_string()).collect()
    }

    // ========================================================================
    // Scalar vs list access
    // ========================================================================

    #[test]
    fn scalar_read_returns_last_value() {
        let mut map = MultiDict::new();
        map.setlist("a", strings(&["1", "2", "3"])).unwrap();

        assert_eq!(map.get("a").map(String::as_str), Some("3"));
        assert_eq!(map.try_get("a").unwrap(), "3");
        assert_eq!(map.getlist("a").unwrap(), ["1", "2", "3"]);
    }

    #[test]
    fn missing_key_is_reported() {
        let map: MultiDict = MultiDict::new();
        assert_eq!(map.get("nope"), None);
        assert_eq!(
            map.getlist("nope"),
            Err(MultiDictError::KeyNotFound {
                key: "nope".to_string()
            })
        );
        assert!(matches!(
            map.try_get("nope"),
            Err(MultiDictError::KeyNotFound { .. })
        ));
    }

    #[test]
    fn get_or_falls_back_to_default() {
        let mut map = MultiDict::new();
        map.insert("present", "x".to_string());
        let fallback = "fallback".to_string();

        assert_eq!(map.get_or("present", &fallback), "x");
        assert_eq!(map.get_or("absent", &fallback), "fallback");
    }

    #[test]
    fn setlist_rejects_empty_list() {
        let mut map: MultiDict = MultiDict::new();
        map.insert("a", "keep".to_string());

        let err = map.setlist("a", Vec::new()).unwrap_err();
        assert_eq!(
            err,
            MultiDictError::InvalidArgument {
                detail: "value list must not be empty"
            }
        );
        // Failed setlist must not clobber the existing list.
        assert_eq!(map.getlist("a").unwrap(), ["keep"]);
    }

    // ========================================================================
    // Mutation
    // ========================================================================

    #[test]
    fn append_to_absent_key_creates_singleton() {
        let mut map = MultiDict::new();
        map.append("k", "first".to_string());
        assert_eq!(map.getlist("k").unwrap(), ["first"]);

        map.append("k", "second".to_string());
        assert_eq!(map.getlist("k").unwrap(), ["first", "second"]);
    }

    #[test]
    fn insert_replaces_whole_list() {
        let mut map = MultiDict::new();
        map.setlist("k", strings(&["1", "2"])).unwrap();
        map.insert("k", "3".to_string());
        assert_eq!(map.getlist("k").unwrap(), ["3"]);
    }

    #[test]
    fn setdefault_only_fills_missing_keys() {
        let mut map = MultiDict::new();
        map.insert("a", "1".to_string());

        assert_eq!(map.setdefault("a", "ignored".to_string()), "1");
        assert_eq!(map.setdefault("b", "2".to_string()), "2");
        assert_eq!(map.getlist("b").unwrap(), ["2"]);
    }

    #[test]
    fn setlistdefault_validates_and_fills() {
        let mut map = MultiDict::new();
        assert!(map.setlistdefault("a", Vec::new()).is_err());
        assert_eq!(
            map.setlistdefault("a", strings(&["x", "y"])).unwrap(),
            ["x", "y"]
        );
        assert_eq!(map.setlistdefault("a", strings(&["z"])).unwrap(), ["x", "y"]);
    }

    #[test]
    fn update_from_multidict_replaces_lists() {
        let mut target = MultiDict::new();
        target.setlist("a", strings(&["old1", "old2"])).unwrap();
        target.insert("keep", "k".to_string());

        let mut source = MultiDict::new();
        source.setlist("a", strings(&["new1", "new2", "new3"])).unwrap();
        source.insert("b", "b".to_string());

        target.update(source);
        assert_eq!(target.getlist("a").unwrap(), ["new1", "new2", "new3"]);
        assert_eq!(target.getlist("b").unwrap(), ["b"]);
        assert_eq!(target.getlist("keep").unwrap(), ["k"]);
        assert_eq!(target.keys().collect::<Vec<_>>(), ["a", "keep", "b"]);
    }

    #[test]
    fn update_from_scalars_replaces_with_singletons() {
        let mut target = MultiDict::new();
        target.setlist("a", strings(&["1", "2"])).unwrap();

        target.update_scalars([("a", "3".to_string()), ("b", "4".to_string())]);
        assert_eq!(target.getlist("a").unwrap(), ["3"]);
        assert_eq!(target.getlist("b").unwrap(), ["4"]);
    }

    #[test]
    fn remove_keeps_remaining_order_and_index() {
        let mut map: MultiDict = [("a", "1"), ("b", "2"), ("c", "3")]
            .into_iter()
            .map(|(k, v)| (k, v.to_string()))
            .collect();

        assert_eq!(map.remove("a"), Some(strings(&["1"])));
        assert_eq!(map.remove("a"), None);
        assert_eq!(map.keys().collect::<Vec<_>>(), ["b", "c"]);
        assert_eq!(map.get("c").map(String::as_str), Some("3"));

        map.append("c", "4".to_string());
        assert_eq!(map.getlist("c").unwrap(), ["3", "4"]);
    }

    #[test]
    fn clear_empties_the_map() {
        let mut map = MultiDict::new();
        map.insert("a", "1".to_string());
        map.clear();
        assert!(map.is_empty());
        assert!(!map.contains_key("a"));
    }

    // ========================================================================
    // Iteration
    // ========================================================================

    #[test]
    fn iteration_follows_key_insertion_order() {
        let map: MultiDict = [("z", "1"), ("a", "2"), ("z", "3")]
            .into_iter()
            .map(|(k, v)| (k, v.to_string()))
            .collect();

        let items: Vec<_> = map.items().map(|(k, v)| (k, v.as_str())).collect();
        assert_eq!(items, [("z", "3"), ("a", "2")]);

        let values: Vec<_> = map.values().map(String::as_str).collect();
        assert_eq!(values, ["3", "2"]);

        let lists: Vec<_> = map.lists().map(|(k, v)| (k, v.len())).collect();
        assert_eq!(lists, [("z", 2), ("a", 1)]);

        assert_eq!(
            map.into_single(),
            [
                ("z".to_string(), "3".to_string()),
                ("a".to_string(), "2".to_string())
            ]
        );
    }

    #[test]
    fn clone_is_independent() {
        let mut original = MultiDict::new();
        original.setlist("a", strings(&["1", "2"])).unwrap();

        let mut copy = original.clone();
        copy.append("a", "3".to_string());

        assert_eq!(original.getlist("a").unwrap(), ["1", "2"]);
        assert_eq!(copy.getlist("a").unwrap(), ["1", "2", "3"]);
    }

    #[test]
    fn serializes_as_key_to_list() {
        let map: MultiDict = [("a", "1"), ("a", "2"), ("b", "")]
            .into_iter()
            .map(|(k, v)| (k, v.to_string()))
            .collect();

        let json = serde_json::to_string(&map).unwrap();
        assert_eq!(json, r#"{"a":["1","2"],"b":[""]}"#);
    }

    // ========================================================================
    // Properties
    // ========================================================================

    proptest! {
        #[test]
        fn setlist_then_getlist_roundtrips(
            key in "[a-z]{1,8}",
            values in prop::collection::vec(".*", 1..8),
        ) {
            let mut map = MultiDict::new();
            map.setlist(key.clone(), values.clone()).unwrap();
            prop_assert_eq!(map.getlist(&key).unwrap(), values.as_slice());
            prop_assert_eq!(map.get(&key), values.last());
        }

        #[test]
        fn every_key_has_a_non_empty_list(
            ops in prop::collection::vec(("[a-c]", ".{0,4}", any::<bool>()), 0..32),
        ) {
            let mut map = MultiDict::new();
            for (key, value, append) in ops {
                if append {
                    map.append(key, value);
                } else {
                    map.insert(key, value);
                }
            }
            for (_, values) in map.lists() {
                prop_assert!(!values.is_empty());
            }
        }
    }
}
