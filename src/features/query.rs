//! # Query Model Types
//!
//! The values produced by each stage of [`QueryFeatures`](super::QueryFeatures)
//! and consumed by a [`DocumentQuery`](crate::store::DocumentQuery):
//!
//! - [`Filter`]: which documents match
//! - [`SortKey`]: in which order they come back
//! - [`Projection`]: which attributes each document keeps
//! - [`Pagination`]: which window of the ordered result is returned
//!
//! Each stage owns its own axis of [`QuerySpec`], so the order in which the
//! stages are *set* never changes the query that is finally executed.

use super::raw::{QueryValue, RawQuery};
use serde_json::{json, Map, Value};

/// Query string keys that configure the query itself and never filter.
pub const RESERVED_KEYS: [&str; 4] = ["page", "sort", "limit", "fields"];

/// Internal revision counter kept on every stored document.
pub const VERSION_FIELD: &str = "__v";

/// Identifier every projected document keeps.
pub const ID_FIELD: &str = "_id";

/// Field used for the default newest-first ordering.
pub const CREATED_AT_FIELD: &str = "createdAt";

pub const DEFAULT_PAGE: u64 = 1;
pub const DEFAULT_LIMIT: u64 = 100;

/// Inequality operators accepted in bracket notation (`price[gte]=100`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComparisonOp {
    Gt,
    Gte,
    Lt,
    Lte,
}

impl ComparisonOp {
    /// Parse the operator name used in query strings.
    pub fn from_query_name(name: &str) -> Option<Self> {
        match name {
            "gt" => Some(ComparisonOp::Gt),
            "gte" => Some(ComparisonOp::Gte),
            "lt" => Some(ComparisonOp::Lt),
            "lte" => Some(ComparisonOp::Lte),
            _ => None,
        }
    }

    /// The operator as the document store spells it.
    pub fn store_operator(&self) -> &'static str {
        match self {
            ComparisonOp::Gt => "$gt",
            ComparisonOp::Gte => "$gte",
            ComparisonOp::Lt => "$lt",
            ComparisonOp::Lte => "$lte",
        }
    }

    /// Whether `ordering` (document value compared to the constraint value)
    /// satisfies this operator.
    pub fn accepts(&self, ordering: std::cmp::Ordering) -> bool {
        use std::cmp::Ordering::*;
        match self {
            ComparisonOp::Gt => ordering == Greater,
            ComparisonOp::Gte => ordering != Less,
            ComparisonOp::Lt => ordering == Less,
            ComparisonOp::Lte => ordering != Greater,
        }
    }
}

/// A constraint on one field. Values stay as the strings the client sent;
/// the store casts them against its schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Constraint {
    /// `field=value`
    Eq(String),
    /// `field=a&field=b`: matches any of the values
    In(Vec<String>),
    /// `field[op]=value`
    Compare(ComparisonOp, String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Condition {
    /// Field path; nested keys are joined with `.`
    pub field: String,
    pub constraint: Constraint,
}

/// Conjunction of field conditions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Filter {
    conditions: Vec<Condition>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a filter from the raw query map.
    ///
    /// Reserved keys are dropped. Nested maps have their `gt|gte|lt|lte`
    /// keys turned into comparisons; any other nested key becomes an
    /// equality constraint on the dotted path (`price[foo]=1` → `price.foo`).
    pub fn from_raw(query: &RawQuery) -> Self {
        let mut filter = Self::new();
        for (key, value) in query.iter() {
            if RESERVED_KEYS.contains(&key.as_str()) {
                continue;
            }
            filter.push_value(key.clone(), value, true);
        }
        filter
    }

    fn push_value(&mut self, field: String, value: &QueryValue, operators_allowed: bool) {
        match value {
            QueryValue::Single(v) => self.push(field, Constraint::Eq(v.clone())),
            QueryValue::Many(vs) => self.push(field, Constraint::In(vs.clone())),
            QueryValue::Nested(inner) => {
                for (key, inner_value) in inner {
                    let op = operators_allowed
                        .then(|| ComparisonOp::from_query_name(key))
                        .flatten();
                    match (op, inner_value) {
                        (Some(op), QueryValue::Single(v)) => {
                            self.push(field.clone(), Constraint::Compare(op, v.clone()))
                        }
                        (Some(op), QueryValue::Many(vs)) => {
                            for v in vs {
                                self.push(field.clone(), Constraint::Compare(op, v.clone()));
                            }
                        }
                        _ => self.push_value(format!("{}.{}", field, key), inner_value, false),
                    }
                }
            }
        }
    }

    pub fn push(&mut self, field: impl Into<String>, constraint: Constraint) {
        self.conditions.push(Condition {
            field: field.into(),
            constraint,
        });
    }

    /// Add every condition of `other` to this filter.
    pub fn extend(&mut self, other: Filter) {
        self.conditions.extend(other.conditions);
    }

    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    /// Render the filter as a store query document, e.g.
    /// `{"difficulty": "easy", "price": {"$gte": "100"}}`.
    pub fn to_document(&self) -> Value {
        let mut doc = Map::new();
        for condition in &self.conditions {
            match &condition.constraint {
                Constraint::Eq(v) => {
                    doc.insert(condition.field.clone(), json!(v));
                }
                Constraint::In(vs) => {
                    doc.insert(condition.field.clone(), json!({ "$in": vs }));
                }
                Constraint::Compare(op, v) => {
                    let entry = doc
                        .entry(condition.field.clone())
                        .or_insert_with(|| Value::Object(Map::new()));
                    if !entry.is_object() {
                        *entry = Value::Object(Map::new());
                    }
                    if let Value::Object(ops) = entry {
                        ops.insert(op.store_operator().to_string(), json!(v));
                    }
                }
            }
        }
        Value::Object(doc)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Ascending,
    Descending,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortKey {
    pub field: String,
    pub direction: SortDirection,
}

impl SortKey {
    pub fn ascending(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Ascending,
        }
    }

    pub fn descending(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Descending,
        }
    }

    /// Parse `-price,ratingsAverage` into keys in priority order.
    /// Blank entries are skipped.
    pub fn parse_list(list: &str) -> Vec<SortKey> {
        list.split(',')
            .map(str::trim)
            .filter_map(|entry| match entry.strip_prefix('-') {
                Some(field) if !field.is_empty() => Some(SortKey::descending(field)),
                Some(_) => None,
                None if !entry.is_empty() => Some(SortKey::ascending(entry)),
                None => None,
            })
            .collect()
    }

    /// Newest first.
    pub fn default_order() -> Vec<SortKey> {
        vec![SortKey::descending(CREATED_AT_FIELD)]
    }
}

/// Which attributes of each document are returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Projection {
    /// Only these fields, plus `_id`
    Include(Vec<String>),
    /// Everything except these fields
    Exclude(Vec<String>),
}

impl Default for Projection {
    fn default() -> Self {
        Projection::Exclude(vec![VERSION_FIELD.to_string()])
    }
}

impl Projection {
    /// Parse a comma-separated field list.
    ///
    /// A list made only of `-field` entries excludes those fields; otherwise
    /// the plain entries form the allow-list and `-` entries are ignored.
    /// An empty list yields the default projection.
    pub fn parse_list(list: &str) -> Projection {
        let entries: Vec<&str> = list
            .split(',')
            .map(str::trim)
            .filter(|entry| !entry.is_empty() && *entry != "-")
            .collect();

        if entries.is_empty() {
            return Projection::default();
        }

        if entries.iter().all(|entry| entry.starts_with('-')) {
            return Projection::Exclude(
                entries.iter().map(|entry| entry[1..].to_string()).collect(),
            );
        }

        Projection::Include(
            entries
                .iter()
                .filter(|entry| !entry.starts_with('-'))
                .map(|entry| entry.to_string())
                .collect(),
        )
    }

    /// Apply the projection to a single document.
    pub fn apply(&self, document: &Map<String, Value>) -> Map<String, Value> {
        match self {
            Projection::Include(fields) => document
                .iter()
                .filter(|(key, _)| key.as_str() == ID_FIELD || fields.contains(*key))
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect(),
            Projection::Exclude(fields) => document
                .iter()
                .filter(|(key, _)| !fields.contains(*key))
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect(),
        }
    }
}

/// Page window over the ordered result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub page: u64,
    pub limit: u64,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            page: DEFAULT_PAGE,
            limit: DEFAULT_LIMIT,
        }
    }
}

impl Pagination {
    /// Read `page` and `limit`; anything that is not a positive integer
    /// falls back to the default.
    pub fn from_raw(query: &RawQuery) -> Self {
        Self {
            page: positive(query.get("page")).unwrap_or(DEFAULT_PAGE),
            limit: positive(query.get("limit")).unwrap_or(DEFAULT_LIMIT),
        }
    }

    /// Number of documents before the first one on this page.
    pub fn skip(&self) -> u64 {
        (self.page - 1).saturating_mul(self.limit)
    }
}

fn positive(value: Option<&QueryValue>) -> Option<u64> {
    value
        .and_then(QueryValue::last)
        .and_then(|v| v.trim().parse::<u64>().ok())
        .filter(|n| *n > 0)
}

/// Everything a query handle has been told so far.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QuerySpec {
    pub filter: Filter,
    pub sort: Vec<SortKey>,
    pub projection: Option<Projection>,
    pub skip: Option<u64>,
    pub limit: Option<u64>,
}
