//! # In-Memory Tour Store
//!
//! Keeps the tour collection in process behind an async `RwLock` and
//! answers [`DocumentQuery`]s against it. It behaves like the document
//! database the service is written against where the error pipeline can
//! observe it:
//!
//! - query values are cast to the schema type of their field, and a value
//!   that does not fit (e.g. `price[gte]=abc`) fails the whole query with
//!   [`StoreError::Cast`]
//! - malformed ids fail with [`StoreError::Cast`] on `_id`
//! - tour names are a unique index, enforced with [`StoreError::DuplicateKey`]
//! - writes run the schema rules and fail with [`StoreError::Validation`]
//! - secret tours never show up in finds, counts, updates or deletes
//!
//! Scans are linear; there are no indexes and nothing is persisted.

use super::{Document, DocumentQuery, StoreError};
use crate::features::{ComparisonOp, Constraint, Filter, Projection, QuerySpec, SortDirection, SortKey};
use crate::models::tour::{self, FieldKind, Tour};
use anyhow::Context;
use chrono::{DateTime, Utc};
use futures_util::future::LocalBoxFuture;
use serde_json::Value;
use std::cmp::Ordering;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

/// Shared handle to the tour collection. Cloning is cheap and every clone
/// sees the same data.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    tours: Arc<RwLock<Vec<Tour>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load tours from a JSON array file, running each through the schema.
    /// A `createdAt` in the file is kept; otherwise the load time is used.
    pub async fn seed_from_file(&self, path: impl AsRef<Path>) -> anyhow::Result<usize> {
        let path = path.as_ref();
        let contents = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read seed file {}", path.display()))?;
        let entries: Vec<Value> = serde_json::from_str(&contents)
            .with_context(|| format!("Seed file {} is not a JSON array", path.display()))?;

        let mut loaded = 0;
        for (index, entry) in entries.iter().enumerate() {
            let created_at = entry
                .get("createdAt")
                .and_then(Value::as_str)
                .and_then(tour::parse_date)
                .unwrap_or_else(Utc::now);
            self.create_at(entry, created_at)
                .await
                .with_context(|| format!("Invalid tour at index {} in {}", index, path.display()))?;
            loaded += 1;
        }

        info!(count = loaded, path = %path.display(), "Seeded tour store");
        Ok(loaded)
    }

    /// Start a read query over all visible tours.
    pub fn find(&self) -> MemoryQuery {
        MemoryQuery {
            tours: Arc::clone(&self.tours),
            spec: QuerySpec::default(),
        }
    }

    /// Number of visible tours matching `filter`.
    pub async fn count(&self, filter: &Filter) -> Result<u64, StoreError> {
        let conditions = cast_filter(filter)?;
        let tours = self.tours.read().await;

        let mut count = 0;
        for stored in tours.iter().filter(|t| !t.secret_tour) {
            if matches_all(&stored.clone().into_document()?, &conditions) {
                count += 1;
            }
        }
        Ok(count)
    }

    pub async fn find_by_id(&self, id: &str) -> Result<Option<Document>, StoreError> {
        let id = tour::parse_id(id)?;
        let tours = self.tours.read().await;

        tours
            .iter()
            .find(|t| t.id == id && !t.secret_tour)
            .map(|t| t.clone().into_document().map(tour::with_virtuals))
            .transpose()
    }

    pub async fn create(&self, input: &Value) -> Result<Document, StoreError> {
        self.create_at(input, Utc::now()).await
    }

    /// Insert a tour with an explicit creation time.
    pub async fn create_at(&self, input: &Value, created_at: DateTime<Utc>) -> Result<Document, StoreError> {
        let created = tour::validate_new(input, Uuid::new_v4(), created_at)?;
        let mut tours = self.tours.write().await;

        ensure_unique_name(&tours, &created)?;
        debug!(id = %created.id, name = %created.name, "Inserting tour");
        tours.push(created.clone());

        created.into_document().map(tour::with_virtuals)
    }

    /// Apply a partial update and return the new document, or `None` when
    /// no visible tour has that id.
    pub async fn update_by_id(&self, id: &str, patch: &Value) -> Result<Option<Document>, StoreError> {
        let id = tour::parse_id(id)?;
        let mut tours = self.tours.write().await;

        let Some(position) = tours.iter().position(|t| t.id == id && !t.secret_tour) else {
            return Ok(None);
        };

        let updated = tour::validate_update(&tours[position], patch)?;
        ensure_unique_name(&tours, &updated)?;
        tours[position] = updated.clone();

        updated.into_document().map(tour::with_virtuals).map(Some)
    }

    /// Remove a tour and return it, or `None` when no visible tour has that id.
    pub async fn delete_by_id(&self, id: &str) -> Result<Option<Document>, StoreError> {
        let id = tour::parse_id(id)?;
        let mut tours = self.tours.write().await;

        match tours.iter().position(|t| t.id == id && !t.secret_tour) {
            Some(position) => tours.remove(position).into_document().map(Some),
            None => Ok(None),
        }
    }

    /// Total number of stored tours, secret ones included.
    pub async fn len(&self) -> usize {
        self.tours.read().await.len()
    }
}

fn ensure_unique_name(tours: &[Tour], candidate: &Tour) -> Result<(), StoreError> {
    if tours.iter().any(|t| t.id != candidate.id && t.name == candidate.name) {
        let quoted = serde_json::to_string(&candidate.name).unwrap_or_default();
        return Err(StoreError::DuplicateKey {
            message: format!(
                "E{} duplicate key error collection: natours.tours index: name_1 dup key: {{ name: {} }}",
                StoreError::DUPLICATE_KEY_CODE,
                quoted
            ),
        });
    }
    Ok(())
}

/// A read query against a [`MemoryStore`].
#[derive(Debug, Clone)]
pub struct MemoryQuery {
    tours: Arc<RwLock<Vec<Tour>>>,
    spec: QuerySpec,
}

impl MemoryQuery {
    /// Stages recorded so far.
    pub fn spec(&self) -> &QuerySpec {
        &self.spec
    }
}

impl DocumentQuery for MemoryQuery {
    type Item = Document;

    fn matching(mut self, filter: Filter) -> Self {
        self.spec.filter.extend(filter);
        self
    }

    fn sort(mut self, keys: Vec<SortKey>) -> Self {
        self.spec.sort = keys;
        self
    }

    fn select(mut self, projection: Projection) -> Self {
        self.spec.projection = Some(projection);
        self
    }

    fn skip(mut self, n: u64) -> Self {
        self.spec.skip = Some(n);
        self
    }

    fn limit(mut self, n: u64) -> Self {
        self.spec.limit = Some(n);
        self
    }

    fn exec(self) -> LocalBoxFuture<'static, Result<Vec<Document>, StoreError>> {
        Box::pin(async move {
            let conditions = cast_filter(&self.spec.filter)?;

            let mut documents = Vec::new();
            {
                let tours = self.tours.read().await;
                for stored in tours.iter().filter(|t| !t.secret_tour) {
                    let doc = stored.clone().into_document()?;
                    if matches_all(&doc, &conditions) {
                        documents.push(doc);
                    }
                }
            }

            sort_documents(&mut documents, &self.spec.sort);

            let skip = to_usize(self.spec.skip.unwrap_or(0));
            let limit = self.spec.limit.map(to_usize).unwrap_or(usize::MAX);

            Ok(documents
                .into_iter()
                .skip(skip)
                .take(limit)
                .map(|doc| match &self.spec.projection {
                    Some(projection) => projection.apply(&doc),
                    None => doc,
                })
                .map(tour::with_virtuals)
                .collect())
        })
    }
}

fn to_usize(n: u64) -> usize {
    usize::try_from(n).unwrap_or(usize::MAX)
}

/// A query or document value converted to its field's schema type.
#[derive(Debug, Clone, PartialEq)]
enum Scalar {
    Number(f64),
    Text(String),
    Boolean(bool),
    Date(DateTime<Utc>),
}

impl Scalar {
    /// Cross-type ordering rank: numbers, then strings, then booleans,
    /// then dates.
    fn rank(&self) -> u8 {
        match self {
            Scalar::Number(_) => 0,
            Scalar::Text(_) => 1,
            Scalar::Boolean(_) => 2,
            Scalar::Date(_) => 3,
        }
    }

    fn compare(&self, other: &Scalar) -> Option<Ordering> {
        match (self, other) {
            (Scalar::Number(a), Scalar::Number(b)) => a.partial_cmp(b),
            (Scalar::Text(a), Scalar::Text(b)) => Some(a.cmp(b)),
            (Scalar::Boolean(a), Scalar::Boolean(b)) => Some(a.cmp(b)),
            (Scalar::Date(a), Scalar::Date(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }
}

enum CastConstraint {
    Eq(Scalar),
    In(Vec<Scalar>),
    Compare(ComparisonOp, Scalar),
}

struct CastCondition {
    field: String,
    constraint: CastConstraint,
}

fn cast_filter(filter: &Filter) -> Result<Vec<CastCondition>, StoreError> {
    filter
        .conditions()
        .iter()
        .map(|condition| {
            let field = condition.field.as_str();
            let constraint = match &condition.constraint {
                Constraint::Eq(v) => CastConstraint::Eq(cast_query_value(field, v)?),
                Constraint::In(vs) => CastConstraint::In(
                    vs.iter()
                        .map(|v| cast_query_value(field, v))
                        .collect::<Result<_, _>>()?,
                ),
                Constraint::Compare(op, v) => CastConstraint::Compare(*op, cast_query_value(field, v)?),
            };
            Ok(CastCondition {
                field: condition.field.clone(),
                constraint,
            })
        })
        .collect()
}

fn cast_query_value(field: &str, raw: &str) -> Result<Scalar, StoreError> {
    let Some(kind) = tour::field_kind(field) else {
        return Ok(Scalar::Text(raw.to_string()));
    };

    let cast = match kind {
        FieldKind::Number => raw.trim().parse::<f64>().ok().filter(|n| n.is_finite()).map(Scalar::Number),
        FieldKind::Text => Some(Scalar::Text(raw.to_string())),
        FieldKind::Boolean => match raw {
            "true" => Some(Scalar::Boolean(true)),
            "false" => Some(Scalar::Boolean(false)),
            _ => None,
        },
        FieldKind::Date => tour::parse_date(raw).map(Scalar::Date),
        FieldKind::Id => Uuid::parse_str(raw).ok().map(|id| Scalar::Text(id.to_string())),
    };

    cast.ok_or_else(|| StoreError::cast(field, raw, kind.type_name()))
}

/// Every scalar found at `path`; arrays contribute each element.
fn document_scalars(doc: &Document, path: &str) -> Vec<Scalar> {
    let mut segments = path.split('.');
    let Some(first) = segments.next() else {
        return Vec::new();
    };
    let mut current = doc.get(first);
    for segment in segments {
        current = current.and_then(|value| value.get(segment));
    }

    let kind = tour::field_kind(path);
    match current {
        Some(Value::Array(items)) => items.iter().filter_map(|item| to_scalar(item, kind)).collect(),
        Some(value) => to_scalar(value, kind).into_iter().collect(),
        None => Vec::new(),
    }
}

fn to_scalar(value: &Value, kind: Option<FieldKind>) -> Option<Scalar> {
    match (kind, value) {
        (Some(FieldKind::Date), Value::String(s)) => tour::parse_date(s).map(Scalar::Date),
        (_, Value::Number(n)) => n.as_f64().map(Scalar::Number),
        (_, Value::String(s)) => Some(Scalar::Text(s.clone())),
        (_, Value::Bool(b)) => Some(Scalar::Boolean(*b)),
        _ => None,
    }
}

fn matches_all(doc: &Document, conditions: &[CastCondition]) -> bool {
    conditions.iter().all(|condition| {
        let values = document_scalars(doc, &condition.field);
        match &condition.constraint {
            CastConstraint::Eq(expected) => values.iter().any(|v| v == expected),
            CastConstraint::In(options) => values.iter().any(|v| options.contains(v)),
            CastConstraint::Compare(op, bound) => values
                .iter()
                .any(|v| v.compare(bound).is_some_and(|ordering| op.accepts(ordering))),
        }
    })
}

fn sort_documents(documents: &mut [Document], keys: &[SortKey]) {
    if keys.is_empty() {
        return;
    }

    documents.sort_by(|a, b| {
        for key in keys {
            let left = document_scalars(a, &key.field).into_iter().next();
            let right = document_scalars(b, &key.field).into_iter().next();
            let ordering = compare_for_sort(left.as_ref(), right.as_ref());
            let ordering = match key.direction {
                SortDirection::Ascending => ordering,
                SortDirection::Descending => ordering.reverse(),
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    });
}

/// Missing values sort before present ones.
fn compare_for_sort(left: Option<&Scalar>, right: Option<&Scalar>) -> Ordering {
    match (left, right) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(a), Some(b)) => a
            .compare(b)
            .unwrap_or_else(|| a.rank().cmp(&b.rank())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::query::ID_FIELD;
    use crate::features::{QueryFeatures, RawQuery};
    use chrono::TimeZone;
    use serde_json::json;

    fn tour_input(name: &str, price: u32, duration: u32, difficulty: &str) -> Value {
        json!({
            "name": name,
            "duration": duration,
            "maxGroupSize": 10,
            "difficulty": difficulty,
            "price": price,
            "summary": "A tour used in tests",
            "imageCover": "cover.jpg"
        })
    }

    /// Three public tours created a day apart, oldest first, plus one secret tour.
    async fn seeded_store() -> MemoryStore {
        let store = MemoryStore::new();
        let day = |d: u32| Utc.with_ymd_and_hms(2024, 1, d, 0, 0, 0).unwrap();

        store
            .create_at(&tour_input("The Forest Hiker", 397, 5, "easy"), day(1))
            .await
            .unwrap();
        store
            .create_at(&tour_input("The Sea Explorer", 497, 7, "medium"), day(2))
            .await
            .unwrap();
        store
            .create_at(&tour_input("The Snow Adventurer", 997, 4, "difficult"), day(3))
            .await
            .unwrap();

        let mut secret = tour_input("The Secret Hideaway", 50, 1, "easy");
        secret["secretTour"] = json!(true);
        store.create_at(&secret, day(4)).await.unwrap();

        store
    }

    fn names(docs: &[Document]) -> Vec<&str> {
        docs.iter().map(|d| d["name"].as_str().unwrap()).collect()
    }

    async fn run(store: &MemoryStore, pairs: &[(&str, &str)]) -> Result<Vec<Document>, StoreError> {
        QueryFeatures::new(store.find(), RawQuery::from_pairs(pairs.iter().copied()))
            .filter()
            .sort()
            .limit_fields()
            .paginate()
            .exec()
            .await
    }

    #[tokio::test]
    async fn test_default_order_is_newest_first_without_secret_tours() {
        let store = seeded_store().await;
        let docs = run(&store, &[]).await.unwrap();

        assert_eq!(
            names(&docs),
            ["The Snow Adventurer", "The Sea Explorer", "The Forest Hiker"]
        );
        assert!(docs.iter().all(|d| !d.contains_key("__v")));
        assert_eq!(docs[0]["durationWeeks"], json!(4.0 / 7.0));
    }

    #[tokio::test]
    async fn test_comparison_and_equality_filters() {
        let store = seeded_store().await;

        let docs = run(&store, &[("price[gte]", "400"), ("sort", "price")]).await.unwrap();
        assert_eq!(names(&docs), ["The Sea Explorer", "The Snow Adventurer"]);

        let docs = run(&store, &[("difficulty", "easy")]).await.unwrap();
        assert_eq!(names(&docs), ["The Forest Hiker"]);

        let docs = run(&store, &[("difficulty", "easy"), ("difficulty", "difficult"), ("sort", "name")])
            .await
            .unwrap();
        assert_eq!(names(&docs), ["The Forest Hiker", "The Snow Adventurer"]);

        let docs = run(&store, &[("duration[gt]", "4"), ("duration[lte]", "5")]).await.unwrap();
        assert_eq!(names(&docs), ["The Forest Hiker"]);
    }

    #[tokio::test]
    async fn test_multi_key_sort_uses_left_to_right_priority() {
        let store = seeded_store().await;
        store
            .create_at(&tour_input("The Park Camper Tour", 397, 10, "medium"), Utc::now())
            .await
            .unwrap();

        let docs = run(&store, &[("sort", "price,-duration")]).await.unwrap();
        assert_eq!(
            names(&docs),
            [
                "The Park Camper Tour",
                "The Forest Hiker",
                "The Sea Explorer",
                "The Snow Adventurer"
            ]
        );
    }

    #[tokio::test]
    async fn test_fields_projection_keeps_only_requested_attributes() {
        let store = seeded_store().await;
        let docs = run(&store, &[("fields", "name,price")]).await.unwrap();

        for doc in &docs {
            let mut keys: Vec<&str> = doc.keys().map(String::as_str).collect();
            keys.sort_unstable();
            assert_eq!(keys, ["_id", "name", "price"]);
        }
    }

    #[tokio::test]
    async fn test_pagination_window() {
        let store = seeded_store().await;

        let docs = run(&store, &[("page", "2"), ("limit", "2")]).await.unwrap();
        assert_eq!(names(&docs), ["The Forest Hiker"]);

        let docs = run(&store, &[("page", "3"), ("limit", "2")]).await.unwrap();
        assert!(docs.is_empty());
    }

    #[tokio::test]
    async fn test_uncastable_filter_value_fails_the_query() {
        let store = seeded_store().await;
        let err = run(&store, &[("price[gte]", "cheap")]).await.unwrap_err();
        assert_eq!(err, StoreError::cast("price", "cheap", "Number"));
    }

    #[tokio::test]
    async fn test_count_matches_filter() {
        let store = seeded_store().await;
        let mut filter = Filter::new();
        filter.push("price", Constraint::Compare(ComparisonOp::Lt, "500".into()));

        assert_eq!(store.count(&filter).await.unwrap(), 2);
        assert_eq!(store.count(&Filter::new()).await.unwrap(), 3);
        assert_eq!(store.len().await, 4);
    }

    #[tokio::test]
    async fn test_duplicate_names_are_rejected() {
        let store = seeded_store().await;
        let err = store
            .create(&tour_input("The Forest Hiker", 1, 1, "easy"))
            .await
            .unwrap_err();

        match err {
            StoreError::DuplicateKey { message } => {
                assert!(message.starts_with("E11000 duplicate key error"));
                assert!(message.contains("\"The Forest Hiker\""));
            }
            other => panic!("expected duplicate key, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_crud_by_id() {
        let store = seeded_store().await;
        let created = store
            .create(&tour_input("The City Wanderer", 1197, 9, "easy"))
            .await
            .unwrap();
        let id = created[ID_FIELD].as_str().unwrap().to_string();

        let found = store.find_by_id(&id).await.unwrap().unwrap();
        assert_eq!(found["name"], json!("The City Wanderer"));

        let updated = store
            .update_by_id(&id, &json!({ "price": 999 }))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated["price"], json!(999));
        assert_eq!(updated["__v"], json!(1));

        let renamed = store
            .update_by_id(&id, &json!({ "name": "The Sea Explorer" }))
            .await
            .unwrap_err();
        assert!(matches!(renamed, StoreError::DuplicateKey { .. }));

        assert!(store.delete_by_id(&id).await.unwrap().is_some());
        assert!(store.find_by_id(&id).await.unwrap().is_none());
        assert!(store.delete_by_id(&id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_malformed_id_is_a_cast_failure() {
        let store = seeded_store().await;
        let err = store.find_by_id("wwwww").await.unwrap_err();
        assert_eq!(err, StoreError::cast("_id", "wwwww", "ObjectId"));
    }

    #[tokio::test]
    async fn test_secret_tours_are_unreachable_by_id() {
        let store = MemoryStore::new();
        let mut secret = tour_input("The Secret Hideaway", 50, 1, "easy");
        secret["secretTour"] = json!(true);
        let created = store.create(&secret).await.unwrap();
        let id = created[ID_FIELD].as_str().unwrap();

        assert!(store.find_by_id(id).await.unwrap().is_none());
        assert!(store.update_by_id(id, &json!({ "price": 1 })).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_seed_file_loads_every_tour() {
        let path = std::env::temp_dir().join(format!("tours-seed-{}.json", Uuid::new_v4()));
        let seed = json!([
            tour_input("The Forest Hiker", 397, 5, "easy"),
            tour_input("The Sea Explorer", 497, 7, "medium")
        ]);
        tokio::fs::write(&path, seed.to_string()).await.unwrap();

        let store = MemoryStore::new();
        assert_eq!(store.seed_from_file(&path).await.unwrap(), 2);
        assert!(store.seed_from_file("/nonexistent/tours.json").await.is_err());

        tokio::fs::remove_file(&path).await.unwrap();
    }

    #[tokio::test]
    async fn test_bundled_seed_data_is_valid() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("data/tours-simple.json");
        let store = MemoryStore::new();
        assert_eq!(store.seed_from_file(&path).await.unwrap(), 5);

        let cheapest = run(&store, &[("sort", "price"), ("limit", "1")]).await.unwrap();
        assert_eq!(names(&cheapest), vec!["The Forest Hiker"]);
    }
}
