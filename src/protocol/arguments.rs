//! Argument map decoded from query strings and form bodies.

use std::collections::HashMap;

/// Hard cap on distinct entries per [`Arguments`] map. Bounds the work an
/// attacker can force with an arbitrarily long query string or form body.
pub const MAX_ARGUMENTS: usize = 256;

/// A single argument value, or the ordered values of a repeated name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Single(String),
    Multi(Vec<String>),
}

impl Value {
    fn push(&mut self, value: String) {
        match self {
            Value::Single(first) => {
                *self = Value::Multi(vec![std::mem::take(first), value]);
            }
            Value::Multi(values) => values.push(value),
        }
    }

    /// The value, or the last of a repeated name's values.
    pub fn last(&self) -> &str {
        match self {
            Value::Single(value) => value,
            // Multi is only ever built by push, so it is non-empty.
            Value::Multi(values) => values.last().map(String::as_str).unwrap_or(""),
        }
    }
}

/// Mapping from argument name to a value or ordered value list.
///
/// Holds at most [`MAX_ARGUMENTS`] distinct names; inserts for new names
/// beyond the cap are ignored. Repeats of an existing name always append.
#[derive(Debug, Clone, Default)]
pub struct Arguments {
    data: HashMap<String, Value>,
}

impl Arguments {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: String, value: String) {
        match self.data.get_mut(&name) {
            Some(existing) => existing.push(value),
            None => {
                if self.data.len() < MAX_ARGUMENTS {
                    self.data.insert(name, Value::Single(value));
                }
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.data.get(name)
    }

    /// The single (or last-repeated) value for a name.
    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.data.get(name).map(Value::last)
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.data.iter().map(|(name, value)| (name.as_str(), value))
    }

    /// Merge another map into this one, preserving repeat order.
    pub fn extend(&mut self, other: Arguments) {
        for (name, value) in other.data {
            match value {
                Value::Single(single) => self.insert(name, single),
                Value::Multi(values) => {
                    for v in values {
                        self.insert(name.clone(), v);
                    }
                }
            }
        }
    }
}
