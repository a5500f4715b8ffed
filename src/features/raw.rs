//! # Raw Query Strings
//!
//! The HTTP layer hands us the query string as a flat list of decoded
//! `(key, value)` pairs. This module folds those pairs into the shape the
//! query features expect, following the bracket notation browsers and API
//! clients commonly use:
//!
//! | Query string                          | Raw value                                  |
//! |---------------------------------------|--------------------------------------------|
//! | `difficulty=easy`                     | `Single("easy")`                           |
//! | `difficulty=easy&difficulty=medium`   | `Many(["easy", "medium"])`                 |
//! | `price[gte]=100&price[lt]=500`        | `Nested({gte: Single("100"), lt: ...})`    |
//! | `images[]=a.jpg`                      | `Many(["a.jpg"])`                          |
//!
//! ## Conflicts
//! When the same key is used both as a plain value and as a bracketed map
//! (`price=5&price[gte]=1`), the first shape wins and later conflicting pairs
//! are dropped.

use std::collections::BTreeMap;

/// A single value in the raw query map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryValue {
    /// `key=value`
    Single(String),
    /// `key=a&key=b` or `key[]=a`
    Many(Vec<String>),
    /// `key[sub]=value`
    Nested(BTreeMap<String, QueryValue>),
}

impl QueryValue {
    /// The value as a comma-joined string, for keys that hold field lists
    /// (`sort`, `fields`). Repeated keys are merged: `sort=price&sort=-name`
    /// reads as `price,-name`.
    pub fn joined(&self) -> Option<String> {
        match self {
            QueryValue::Single(value) => Some(value.clone()),
            QueryValue::Many(values) => Some(values.join(",")),
            QueryValue::Nested(_) => None,
        }
    }

    /// The last scalar value given for this key.
    pub fn last(&self) -> Option<&str> {
        match self {
            QueryValue::Single(value) => Some(value),
            QueryValue::Many(values) => values.last().map(String::as_str),
            QueryValue::Nested(_) => None,
        }
    }

    fn push(&mut self, value: String) -> bool {
        match self {
            QueryValue::Single(existing) => {
                let first = std::mem::take(existing);
                *self = QueryValue::Many(vec![first, value]);
                true
            }
            QueryValue::Many(values) => {
                values.push(value);
                true
            }
            QueryValue::Nested(_) => false,
        }
    }
}

/// The query string as a map of keys to [`QueryValue`]s.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawQuery {
    entries: BTreeMap<String, QueryValue>,
}

impl RawQuery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the map from decoded query pairs, in the order they appeared.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut query = Self::new();
        for (key, value) in pairs {
            query.insert(key.as_ref(), value.into());
        }
        query
    }

    /// Insert one `key=value` pair, expanding bracket notation in `key`.
    pub fn insert(&mut self, key: &str, value: String) {
        let path = split_key(key);
        insert_path(&mut self.entries, &path, value);
    }

    pub fn get(&self, key: &str) -> Option<&QueryValue> {
        self.entries.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &QueryValue)> {
        self.entries.iter()
    }
}

/// Split `price[gte]` into `["price", "gte"]` and `images[]` into
/// `["images", ""]`. Keys with unbalanced brackets are taken literally.
fn split_key(key: &str) -> Vec<&str> {
    let Some(open) = key.find('[') else {
        return vec![key];
    };
    if open == 0 {
        return vec![key];
    }

    let mut path = vec![&key[..open]];
    let mut rest = &key[open..];
    while let Some(stripped) = rest.strip_prefix('[') {
        match stripped.find(']') {
            Some(close) => {
                path.push(&stripped[..close]);
                rest = &stripped[close + 1..];
            }
            None => return vec![key],
        }
    }

    if rest.is_empty() {
        path
    } else {
        vec![key]
    }
}

fn insert_path(map: &mut BTreeMap<String, QueryValue>, path: &[&str], value: String) {
    let (head, tail) = match path {
        [] => return,
        [head, tail @ ..] => (*head, tail),
    };

    match tail {
        [] => match map.get_mut(head) {
            Some(existing) => {
                existing.push(value);
            }
            None => {
                map.insert(head.to_string(), QueryValue::Single(value));
            }
        },
        // `key[]=value` appends to a list
        [""] => match map.get_mut(head) {
            Some(existing) => {
                existing.push(value);
            }
            None => {
                map.insert(head.to_string(), QueryValue::Many(vec![value]));
            }
        },
        _ => {
            let entry = map
                .entry(head.to_string())
                .or_insert_with(|| QueryValue::Nested(BTreeMap::new()));
            if let QueryValue::Nested(inner) = entry {
                insert_path(inner, tail, value);
            }
        }
    }
}
