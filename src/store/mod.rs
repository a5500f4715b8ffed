//! # Document Store
//!
//! The persistence side of the service. Request handlers only ever talk to
//! it through two seams:
//!
//! - [`DocumentQuery`]: a chainable, not-yet-executed read query. The query
//!   features build on this trait and nothing else, so any store that can
//!   match, sort, select, skip and limit can sit behind them.
//! - [`StoreError`]: the raw failures a store reports. They are classified
//!   into client-facing errors by [`AppError`](crate::error::AppError).
//!
//! [`MemoryStore`] is the in-process implementation the service runs on.

pub mod memory;

pub use memory::MemoryStore;

use crate::features::{Filter, Projection, SortKey};
use futures_util::future::LocalBoxFuture;
use std::fmt;
use thiserror::Error;

/// A stored record: a JSON object keyed by attribute name.
pub type Document = serde_json::Map<String, serde_json::Value>;

/// Chainable read query over a collection.
///
/// Each method records one stage and returns the query; nothing runs until
/// [`exec`](DocumentQuery::exec). Implementations apply the stages in
/// filter → sort → skip/limit → projection order whatever order they were
/// called in.
pub trait DocumentQuery: Sized {
    type Item;

    fn matching(self, filter: Filter) -> Self;
    fn sort(self, keys: Vec<SortKey>) -> Self;
    fn select(self, projection: Projection) -> Self;
    fn skip(self, n: u64) -> Self;
    fn limit(self, n: u64) -> Self;

    /// Run the query as one atomic read.
    fn exec(self) -> LocalBoxFuture<'static, Result<Vec<Self::Item>, StoreError>>;
}

/// One failed schema rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub path: String,
    pub message: String,
}

impl FieldError {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

/// Raw failures reported by the store, before classification.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StoreError {
    /// A value could not be converted to the type of its field.
    #[error("Cast to {kind} failed for value \"{value}\" at path \"{path}\"")]
    Cast {
        path: String,
        value: String,
        kind: String,
    },

    /// A unique index rejected the write. `message` carries the conflicting
    /// key as a quoted literal.
    #[error("{message}")]
    DuplicateKey { message: String },

    /// One or more schema rules failed, in schema order.
    #[error("{collection} validation failed: {}", join_field_errors(.errors))]
    Validation {
        collection: String,
        errors: Vec<FieldError>,
    },

    #[error("store failure: {0}")]
    Internal(String),
}

fn join_field_errors(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

impl StoreError {
    pub fn cast(path: impl Into<String>, value: impl Into<String>, kind: impl Into<String>) -> Self {
        StoreError::Cast {
            path: path.into(),
            value: value.into(),
            kind: kind.into(),
        }
    }

    /// Error code the document database uses for duplicate keys.
    pub const DUPLICATE_KEY_CODE: u32 = 11000;
}
