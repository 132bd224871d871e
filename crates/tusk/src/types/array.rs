//! The PHP array: an ordered map from normalized keys to values.
//!
//! Iteration follows insertion order. Integer-like keys normalize to
//! integers per the key laws; appending uses `next_index`, which advances
//! past any integer key inserted at or above it.

use std::rc::Rc;

use indexmap::IndexMap;

use crate::value::Value;

/// A normalized array key: integer or byte string.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ArrayKey {
    Int(i64),
    Str(Rc<[u8]>),
}

impl ArrayKey {
    pub fn str(bytes: impl Into<Vec<u8>>) -> Self {
        Self::Str(Rc::from(bytes.into()))
    }

    /// Applies the key normalization laws. Returns `None` for kinds that are
    /// illegal offsets (arrays, objects); the caller raises the TypeError.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Null => Some(Self::str("")),
            Value::Bool(b) => Some(Self::Int(i64::from(*b))),
            Value::Int(i) => Some(Self::Int(*i)),
            Value::Float(f) => {
                let truncated = if f.is_finite() { f.trunc() as i64 } else { 0 };
                Some(Self::Int(truncated))
            }
            Value::Str(s) => Some(Self::normalize_str(s)),
            Value::Ref(slot) => Self::from_value(&slot.borrow()),
            _ => None,
        }
    }

    /// `"10"` → `10`, but `"010"`, `"1.5"`, `"-0"` and `"1e3"` stay strings.
    fn normalize_str(bytes: &Rc<[u8]>) -> Self {
        if let Ok(text) = std::str::from_utf8(bytes) {
            if let Ok(i) = text.parse::<i64>() {
                if i.to_string() == text {
                    return Self::Int(i);
                }
            }
        }
        Self::Str(Rc::clone(bytes))
    }

    pub fn to_value(&self) -> Value {
        match self {
            Self::Int(i) => Value::Int(*i),
            Self::Str(s) => Value::Str(Rc::clone(s)),
        }
    }

    /// Rendering used by error messages and dumps.
    pub fn display(&self) -> String {
        match self {
            Self::Int(i) => i.to_string(),
            Self::Str(s) => format!("\"{}\"", String::from_utf8_lossy(s)),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PhpArray {
    entries: IndexMap<ArrayKey, Value, ahash::RandomState>,
    next_index: i64,
}

impl PhpArray {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &ArrayKey) -> Option<&Value> {
        self.entries.get(key)
    }

    pub fn get_mut(&mut self, key: &ArrayKey) -> Option<&mut Value> {
        self.entries.get_mut(key)
    }

    pub fn contains_key(&self, key: &ArrayKey) -> bool {
        self.entries.contains_key(key)
    }

    pub fn insert(&mut self, key: ArrayKey, value: Value) {
        if let ArrayKey::Int(i) = key {
            if i >= self.next_index {
                self.next_index = i.saturating_add(1);
            }
        }
        self.entries.insert(key, value);
    }

    /// Appends at `next_index` and returns the key used.
    pub fn push(&mut self, value: Value) -> ArrayKey {
        let key = ArrayKey::Int(self.next_index);
        self.next_index = self.next_index.saturating_add(1);
        self.entries.insert(key.clone(), value);
        key
    }

    /// Entry access that inserts null on a miss, for auto-vivification and
    /// by-ref cell promotion.
    pub fn entry_or_null(&mut self, key: ArrayKey) -> &mut Value {
        if let ArrayKey::Int(i) = key {
            if i >= self.next_index {
                self.next_index = i.saturating_add(1);
            }
        }
        self.entries.entry(key).or_insert(Value::Null)
    }

    /// Removes preserving the order of the remaining entries.
    pub fn remove(&mut self, key: &ArrayKey) -> Option<Value> {
        self.entries.shift_remove(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ArrayKey, &Value)> {
        self.entries.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&ArrayKey, &mut Value)> {
        self.entries.iter_mut()
    }

    pub fn keys(&self) -> impl Iterator<Item = &ArrayKey> {
        self.entries.keys()
    }

    pub fn values(&self) -> impl Iterator<Item = &Value> {
        self.entries.values()
    }

    pub fn first(&self) -> Option<(&ArrayKey, &Value)> {
        self.entries.first()
    }

    pub fn last(&self) -> Option<(&ArrayKey, &Value)> {
        self.entries.last()
    }

    pub fn pop_last(&mut self) -> Option<(ArrayKey, Value)> {
        self.entries.pop()
    }

    pub fn next_index(&self) -> i64 {
        self.next_index
    }

    /// Builds a list-like array from values in order.
    pub fn from_values(values: impl IntoIterator<Item = Value>) -> Self {
        let mut array = Self::default();
        for value in values {
            array.push(value);
        }
        array
    }

    /// Builds from explicit pairs, applying the same key laws as insert.
    pub fn from_pairs(pairs: impl IntoIterator<Item = (ArrayKey, Value)>) -> Self {
        let mut array = Self::default();
        for (key, value) in pairs {
            array.insert(key, value);
        }
        array
    }

    /// Renumbers integer keys from zero, keeping string keys in place.
    /// Used by `array_shift`/`array_unshift`/`array_values`-style builtins.
    pub fn reindexed(&self) -> Self {
        let mut array = Self::default();
        for (key, value) in &self.entries {
            match key {
                ArrayKey::Int(_) => {
                    array.push(value.clone());
                }
                ArrayKey::Str(_) => array.insert(key.clone(), value.clone()),
            }
        }
        array
    }
}

impl<'a> IntoIterator for &'a PhpArray {
    type Item = (&'a ArrayKey, &'a Value);
    type IntoIter = indexmap::map::Iter<'a, ArrayKey, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_normalization() {
        assert_eq!(ArrayKey::from_value(&Value::str("10")), Some(ArrayKey::Int(10)));
        assert_eq!(ArrayKey::from_value(&Value::str("010")), Some(ArrayKey::str("010")));
        assert_eq!(ArrayKey::from_value(&Value::str("-5")), Some(ArrayKey::Int(-5)));
        assert_eq!(ArrayKey::from_value(&Value::str("-0")), Some(ArrayKey::str("-0")));
        assert_eq!(ArrayKey::from_value(&Value::str("1.5")), Some(ArrayKey::str("1.5")));
        assert_eq!(ArrayKey::from_value(&Value::Float(3.9)), Some(ArrayKey::Int(3)));
        assert_eq!(ArrayKey::from_value(&Value::Bool(true)), Some(ArrayKey::Int(1)));
        assert_eq!(ArrayKey::from_value(&Value::Null), Some(ArrayKey::str("")));
        assert_eq!(ArrayKey::from_value(&Value::empty_array()), None);
    }

    #[test]
    fn next_index_advances_past_explicit_keys() {
        let mut array = PhpArray::default();
        array.push(Value::Int(0));
        array.insert(ArrayKey::Int(10), Value::Int(1));
        let key = array.push(Value::Int(2));
        assert_eq!(key, ArrayKey::Int(11));
        // A lower explicit key does not pull the counter back.
        array.insert(ArrayKey::Int(3), Value::Int(9));
        assert_eq!(array.push(Value::Int(4)), ArrayKey::Int(12));
    }

    #[test]
    fn insertion_order_is_preserved() {
        let mut array = PhpArray::default();
        array.insert(ArrayKey::str("b"), Value::Int(1));
        array.insert(ArrayKey::Int(0), Value::Int(2));
        array.insert(ArrayKey::str("a"), Value::Int(3));
        let keys: Vec<_> = array.keys().cloned().collect();
        assert_eq!(keys, vec![ArrayKey::str("b"), ArrayKey::Int(0), ArrayKey::str("a")]);
    }
}
