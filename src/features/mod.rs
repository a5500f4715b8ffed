//! # Query Features
//!
//! Turns the query string of a list request into a read query:
//!
//! ```text
//! ?difficulty=easy&price[lt]=1500&sort=-price,ratingsAverage&fields=name,price&page=2&limit=10
//!        │                 │              │                       │            │
//!        └─── filter() ────┘          sort()             limit_fields()   paginate()
//! ```
//!
//! ## Usage
//! ```rust,ignore
//! let tours = QueryFeatures::new(store.find(), raw_query)
//!     .filter()
//!     .sort()
//!     .limit_fields()
//!     .paginate()
//!     .exec()
//!     .await?;
//! ```
//!
//! Every stage consumes the builder and hands it back, so stages chain like
//! the query handle's own methods. The builder does no I/O and never fails;
//! values the store cannot make sense of surface when the query executes.

pub mod raw;
pub mod query;

pub use raw::{QueryValue, RawQuery};
pub use query::{
    ComparisonOp, Constraint, Filter, Pagination, Projection, QuerySpec,
    SortDirection, SortKey,
};

use crate::store::{DocumentQuery, StoreError};

/// Chainable builder over a not-yet-executed query handle.
#[derive(Debug)]
pub struct QueryFeatures<Q> {
    query: Q,
    query_string: RawQuery,
    filter: Filter,
    pagination: Pagination,
}

impl<Q: DocumentQuery> QueryFeatures<Q> {
    pub fn new(query: Q, query_string: RawQuery) -> Self {
        Self {
            query,
            query_string,
            filter: Filter::new(),
            pagination: Pagination::default(),
        }
    }

    /// Match documents against every non-reserved query key.
    pub fn filter(mut self) -> Self {
        let filter = Filter::from_raw(&self.query_string);
        tracing::debug!(filter = %filter.to_document(), "Applying query filter");

        self.filter = filter.clone();
        self.query = self.query.matching(filter);
        self
    }

    /// Order by `sort`, or newest first when it is absent.
    pub fn sort(mut self) -> Self {
        let keys = self
            .query_string
            .get("sort")
            .and_then(QueryValue::joined)
            .map(|list| SortKey::parse_list(&list))
            .filter(|keys| !keys.is_empty())
            .unwrap_or_else(SortKey::default_order);

        self.query = self.query.sort(keys);
        self
    }

    /// Keep only the attributes listed in `fields`, or drop the internal
    /// version field when it is absent.
    pub fn limit_fields(mut self) -> Self {
        let projection = self
            .query_string
            .get("fields")
            .and_then(QueryValue::joined)
            .map(|list| Projection::parse_list(&list))
            .unwrap_or_default();

        self.query = self.query.select(projection);
        self
    }

    /// Skip to `page` in windows of `limit` documents.
    pub fn paginate(mut self) -> Self {
        let pagination = Pagination::from_raw(&self.query_string);

        self.pagination = pagination;
        self.query = self.query.skip(pagination.skip()).limit(pagination.limit);
        self
    }

    /// The filter applied by [`filter`](Self::filter), empty before it runs.
    pub fn filter_spec(&self) -> &Filter {
        &self.filter
    }

    /// The window applied by [`paginate`](Self::paginate).
    pub fn pagination(&self) -> Pagination {
        self.pagination
    }

    /// Whether the client asked for a specific page.
    pub fn page_requested(&self) -> bool {
        self.query_string.contains_key("page")
    }

    pub fn into_query(self) -> Q {
        self.query
    }

    /// Run the composed query.
    pub async fn exec(self) -> Result<Vec<Q::Item>, StoreError> {
        self.query.exec().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn raw(pairs: &[(&str, &str)]) -> RawQuery {
        RawQuery::from_pairs(pairs.iter().copied())
    }

    #[test]
    fn test_defaults_when_query_is_empty() {
        let store = MemoryStore::new();
        let spec = QueryFeatures::new(store.find(), RawQuery::new())
            .filter()
            .sort()
            .limit_fields()
            .paginate()
            .into_query()
            .spec()
            .clone();

        assert!(spec.filter.is_empty());
        assert_eq!(spec.sort, vec![SortKey::descending("createdAt")]);
        assert_eq!(spec.projection, Some(Projection::Exclude(vec!["__v".into()])));
        assert_eq!(spec.skip, Some(0));
        assert_eq!(spec.limit, Some(100));
    }

    #[test]
    fn test_every_stage_reads_its_key() {
        let store = MemoryStore::new();
        let query = raw(&[
            ("difficulty", "easy"),
            ("price[gte]", "100"),
            ("sort", "-price,ratingsAverage"),
            ("fields", "name,price"),
            ("page", "2"),
            ("limit", "10"),
        ]);
        let features = QueryFeatures::new(store.find(), query)
            .filter()
            .sort()
            .limit_fields()
            .paginate();

        assert!(features.page_requested());
        assert_eq!(features.pagination().skip(), 10);
        assert_eq!(features.filter_spec().conditions().len(), 2);

        let spec = features.into_query().spec().clone();
        assert_eq!(
            spec.filter.to_document(),
            serde_json::json!({ "difficulty": "easy", "price": { "$gte": "100" } })
        );
        assert_eq!(
            spec.sort,
            vec![SortKey::descending("price"), SortKey::ascending("ratingsAverage")]
        );
        assert_eq!(
            spec.projection,
            Some(Projection::Include(vec!["name".into(), "price".into()]))
        );
        assert_eq!((spec.skip, spec.limit), (Some(10), Some(10)));
    }

    #[test]
    fn test_stage_order_does_not_change_the_query() {
        let store = MemoryStore::new();
        let query = raw(&[
            ("duration[lt]", "7"),
            ("sort", "price"),
            ("fields", "name"),
            ("page", "3"),
            ("limit", "4"),
        ]);

        let forward = QueryFeatures::new(store.find(), query.clone())
            .filter()
            .sort()
            .limit_fields()
            .paginate()
            .into_query();
        let backward = QueryFeatures::new(store.find(), query)
            .paginate()
            .limit_fields()
            .sort()
            .filter()
            .into_query();

        assert_eq!(forward.spec(), backward.spec());
    }

    #[test]
    fn test_blank_sort_falls_back_to_default() {
        let store = MemoryStore::new();
        let spec = QueryFeatures::new(store.find(), raw(&[("sort", " , ")]))
            .sort()
            .into_query()
            .spec()
            .clone();
        assert_eq!(spec.sort, SortKey::default_order());
    }
}
