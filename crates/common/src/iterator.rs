//! Iterator protocol over sequences and maps.
//!
//! An iterator starts before the first element. `next` advances and reports
//! whether a new element became current; `key` and `value` are only
//! meaningful after a `next` that returned true, and read as `Undefined`
//! otherwise. Map iterators snapshot the key set when created, so inserts
//! during iteration are not observed.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::value::Value;

/// A stateful cursor over an array, map, string, or byte buffer.
#[derive(Debug)]
pub enum Iter {
    Array {
        items: Rc<RefCell<Vec<Value>>>,
        pos: usize,
    },
    Map {
        entries: Rc<RefCell<HashMap<String, Value>>>,
        keys: Vec<String>,
        pos: usize,
    },
    String {
        value: Rc<str>,
        pos: usize,
    },
    Bytes {
        data: Rc<RefCell<Vec<u8>>>,
        pos: usize,
    },
}

impl Iter {
    pub fn array(items: Rc<RefCell<Vec<Value>>>) -> Self {
        Iter::Array { items, pos: 0 }
    }

    pub fn map(entries: Rc<RefCell<HashMap<String, Value>>>) -> Self {
        let keys = entries.borrow().keys().cloned().collect();
        Iter::Map {
            entries,
            keys,
            pos: 0,
        }
    }

    pub fn string(value: Rc<str>) -> Self {
        Iter::String { value, pos: 0 }
    }

    pub fn bytes(data: Rc<RefCell<Vec<u8>>>) -> Self {
        Iter::Bytes { data, pos: 0 }
    }

    /// Advance the cursor. Returns true iff a new element is now current.
    pub fn next(&mut self) -> bool {
        match self {
            Iter::Array { items, pos } => {
                *pos += 1;
                *pos <= items.borrow().len()
            }
            Iter::Map { keys, pos, .. } => {
                *pos += 1;
                *pos <= keys.len()
            }
            Iter::String { value, pos } => {
                *pos += 1;
                *pos <= value.len()
            }
            Iter::Bytes { data, pos } => {
                *pos += 1;
                *pos <= data.borrow().len()
            }
        }
    }

    /// Key of the current element: the position for sequences, the map key
    /// for maps.
    pub fn key(&self) -> Value {
        match self {
            Iter::Array { pos, .. } | Iter::String { pos, .. } | Iter::Bytes { pos, .. } => {
                if *pos == 0 {
                    Value::Undefined
                } else {
                    Value::Int(*pos as i64 - 1)
                }
            }
            Iter::Map { keys, pos, .. } => match pos.checked_sub(1).and_then(|i| keys.get(i)) {
                Some(key) => Value::string(key.as_str()),
                None => Value::Undefined,
            },
        }
    }

    /// Value of the current element.
    pub fn value(&self) -> Value {
        match self {
            Iter::Array { items, pos } => pos
                .checked_sub(1)
                .and_then(|i| items.borrow().get(i).cloned())
                .unwrap_or(Value::Undefined),
            Iter::Map { entries, keys, pos } => pos
                .checked_sub(1)
                .and_then(|i| keys.get(i))
                .and_then(|key| entries.borrow().get(key).cloned())
                .unwrap_or(Value::Undefined),
            Iter::String { value, pos } => pos
                .checked_sub(1)
                .and_then(|i| value.as_bytes().get(i).copied())
                .map(|b| Value::Int(b as i64))
                .unwrap_or(Value::Undefined),
            Iter::Bytes { data, pos } => pos
                .checked_sub(1)
                .and_then(|i| data.borrow().get(i).copied())
                .map(|b| Value::Int(b as i64))
                .unwrap_or(Value::Undefined),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn array_iteration_is_total() {
        let value = Value::array(vec![Value::Int(10), Value::Int(20), Value::Int(30)]);
        let mut iter = value.iterate().unwrap();
        for i in 0..3 {
            assert!(iter.next(), "next {i} should succeed");
            assert_eq!(iter.key(), Value::Int(i));
            assert_eq!(iter.value(), Value::Int((i + 1) * 10));
        }
        assert!(!iter.next());
    }

    #[test]
    fn before_first_reads_undefined() {
        let value = Value::array(vec![Value::Int(1)]);
        let iter = value.iterate().unwrap();
        assert_eq!(iter.key(), Value::Undefined);
        assert_eq!(iter.value(), Value::Undefined);
    }

    #[test]
    fn empty_iterables_never_advance() {
        for value in [
            Value::array(vec![]),
            Value::string(""),
            Value::bytes(vec![]),
            Value::map(HashMap::new()),
        ] {
            let mut iter = value.iterate().unwrap();
            assert!(!iter.next(), "empty {} advanced", value.type_name());
        }
    }

    #[test]
    fn map_iteration_visits_every_entry_once() {
        let mut entries = HashMap::new();
        entries.insert("a".to_string(), Value::Int(1));
        entries.insert("b".to_string(), Value::Int(2));
        let value = Value::map(entries);

        let mut iter = value.iterate().unwrap();
        let mut seen = HashMap::new();
        while iter.next() {
            match (iter.key(), iter.value()) {
                (Value::String(k), Value::Int(v)) => {
                    seen.insert(k.to_string(), v);
                }
                other => panic!("unexpected pair: {other:?}"),
            }
        }
        assert_eq!(seen.len(), 2);
        assert_eq!(seen["a"], 1);
        assert_eq!(seen["b"], 2);
    }

    #[test]
    fn string_iterates_bytes() {
        let mut iter = Value::string("ab").iterate().unwrap();
        assert!(iter.next());
        assert_eq!(iter.value(), Value::Int(97));
        assert!(iter.next());
        assert_eq!(iter.key(), Value::Int(1));
        assert_eq!(iter.value(), Value::Int(98));
        assert!(!iter.next());
    }
}
