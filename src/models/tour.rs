//! # Tour Schema
//!
//! Declares the shape of a tour document and the rules every write must
//! pass. The store calls [`validate_new`] on insert and [`validate_update`]
//! on patch; both return the normalized document or a
//! [`StoreError::Validation`] listing every failed rule in schema order.
//!
//! ## Fields
//! | Field            | Type        | Rules                                      |
//! |------------------|-------------|--------------------------------------------|
//! | `name`           | string      | required, unique, trimmed, 10–40 chars     |
//! | `duration`       | number      | required                                   |
//! | `maxGroupSize`   | number      | required                                   |
//! | `difficulty`     | string      | required, easy / medium / difficult        |
//! | `ratingsAverage` | number      | 1.0–5.0, default 4.5                       |
//! | `ratingsQuantity`| number      | default 0                                  |
//! | `price`          | number      | required                                   |
//! | `priceDiscount`  | number      | below `price`                              |
//! | `summary`        | string      | required, trimmed                          |
//! | `description`    | string      | trimmed                                    |
//! | `imageCover`     | string      | required                                   |
//! | `images`         | [string]    |                                            |
//! | `createdAt`      | date        | set on insert                              |
//! | `startDates`     | [date]      |                                            |
//! | `secretTour`     | boolean     | default false, hidden from every find      |
//!
//! `durationWeeks` is derived on output and never stored.

use crate::features::query::{CREATED_AT_FIELD, ID_FIELD, VERSION_FIELD};
use crate::store::{Document, FieldError, StoreError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

pub const COLLECTION: &str = "Tour";

const NAME_MIN_LEN: usize = 10;
const NAME_MAX_LEN: usize = 40;
const RATING_MIN: f64 = 1.0;
const RATING_MAX: f64 = 5.0;
const DEFAULT_RATING: f64 = 4.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    Medium,
    Difficult,
}

impl FromStr for Difficulty {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "easy" => Ok(Difficulty::Easy),
            "medium" => Ok(Difficulty::Medium),
            "difficult" => Ok(Difficulty::Difficult),
            _ => Err(()),
        }
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Difficulty::Easy => write!(f, "easy"),
            Difficulty::Medium => write!(f, "medium"),
            Difficulty::Difficult => write!(f, "difficult"),
        }
    }
}

/// A validated tour, as stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tour {
    #[serde(rename = "_id")]
    pub id: Uuid,
    pub name: String,
    #[serde(serialize_with = "integral::number")]
    pub duration: f64,
    #[serde(serialize_with = "integral::number")]
    pub max_group_size: f64,
    pub difficulty: Difficulty,
    #[serde(serialize_with = "integral::number")]
    pub ratings_average: f64,
    #[serde(serialize_with = "integral::number")]
    pub ratings_quantity: f64,
    #[serde(serialize_with = "integral::number")]
    pub price: f64,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        serialize_with = "integral::optional"
    )]
    pub price_discount: Option<f64>,
    pub summary: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub image_cover: String,
    #[serde(default)]
    pub images: Vec<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub start_dates: Vec<DateTime<Utc>>,
    #[serde(default)]
    pub secret_tour: bool,
    #[serde(rename = "__v", default)]
    pub version: u64,
}

impl Tour {
    pub fn into_document(self) -> Result<Document, StoreError> {
        match serde_json::to_value(self) {
            Ok(Value::Object(doc)) => Ok(doc),
            Ok(_) => Err(StoreError::Internal("tour did not serialize to an object".into())),
            Err(e) => Err(StoreError::Internal(e.to_string())),
        }
    }
}

/// Whole numbers go out as JSON integers, so `"price": 397` reads back
/// unchanged.
mod integral {
    use serde::Serializer;

    /// Largest magnitude an `f64` holds without losing integer precision.
    const EXACT_LIMIT: f64 = 9_007_199_254_740_992.0;

    pub fn number<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        if value.fract() == 0.0 && value.abs() <= EXACT_LIMIT {
            serializer.serialize_i64(*value as i64)
        } else {
            serializer.serialize_f64(*value)
        }
    }

    pub fn optional<S: Serializer>(value: &Option<f64>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(value) => number(value, serializer),
            None => serializer.serialize_none(),
        }
    }
}

/// How a field's values are compared and cast in queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Id,
    Number,
    Text,
    Date,
    Boolean,
}

impl FieldKind {
    /// Name used in cast failure messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            FieldKind::Id => "ObjectId",
            FieldKind::Number => "Number",
            FieldKind::Text => "String",
            FieldKind::Date => "Date",
            FieldKind::Boolean => "Boolean",
        }
    }
}

/// Schema type of a field path, `None` for paths outside the schema.
/// Array fields report the kind of their elements.
pub fn field_kind(path: &str) -> Option<FieldKind> {
    let kind = match path {
        ID_FIELD => FieldKind::Id,
        "duration" | "maxGroupSize" | "ratingsAverage" | "ratingsQuantity" | "price"
        | "priceDiscount" | VERSION_FIELD => FieldKind::Number,
        "name" | "difficulty" | "summary" | "description" | "imageCover" | "images" => {
            FieldKind::Text
        }
        CREATED_AT_FIELD | "startDates" => FieldKind::Date,
        "secretTour" => FieldKind::Boolean,
        _ => return None,
    };
    Some(kind)
}

/// Parse a tour id from a request path.
pub fn parse_id(id: &str) -> Result<Uuid, StoreError> {
    Uuid::parse_str(id).map_err(|_| StoreError::cast(ID_FIELD, id, FieldKind::Id.type_name()))
}

/// Add derived attributes to an outgoing document.
pub fn with_virtuals(mut doc: Document) -> Document {
    if let Some(duration) = doc.get("duration").and_then(Value::as_f64) {
        doc.insert("durationWeeks".to_string(), json!(duration / 7.0));
    }
    doc
}

/// Validate a new tour. `id` and `created_at` are assigned by the caller.
pub fn validate_new(input: &Value, id: Uuid, created_at: DateTime<Utc>) -> Result<Tour, StoreError> {
    let Some(input) = input.as_object() else {
        return Err(StoreError::Validation {
            collection: COLLECTION.to_string(),
            errors: vec![FieldError::new("body", "A tour must be a JSON object")],
        });
    };

    let mut fields = FieldReader::new(input);
    let name = fields.name();
    let duration = fields.number("duration", Some("A tour must have a duration"));
    let max_group_size = fields.number("maxGroupSize", Some("A tour must have a group size"));
    let difficulty = fields.difficulty();
    let ratings_average = fields.rating().unwrap_or(DEFAULT_RATING);
    let ratings_quantity = fields.number("ratingsQuantity", None).unwrap_or(0.0);
    let price = fields.number("price", Some("A tour must have a price"));
    let price_discount = fields.number("priceDiscount", None);
    let summary = fields.text("summary", Some("A tour must have a description"));
    let description = fields.text("description", None);
    let image_cover = fields.text("imageCover", Some("A tour must have a cover image"));
    let images = fields.text_list("images");
    let start_dates = fields.date_list("startDates");
    let secret_tour = fields.boolean("secretTour").unwrap_or(false);

    if let (Some(discount), Some(price)) = (price_discount, price) {
        fields.check_discount(discount, price);
    }

    fields.finish()?;

    // finish() returned Ok, so every required field is present
    match (name, duration, max_group_size, difficulty, price, summary, image_cover) {
        (
            Some(name),
            Some(duration),
            Some(max_group_size),
            Some(difficulty),
            Some(price),
            Some(summary),
            Some(image_cover),
        ) => Ok(Tour {
            id,
            name,
            duration,
            max_group_size,
            difficulty,
            ratings_average,
            ratings_quantity,
            price,
            price_discount,
            summary,
            description,
            image_cover,
            images,
            created_at,
            start_dates,
            secret_tour,
            version: 0,
        }),
        _ => Err(StoreError::Internal("tour validation lost a required field".into())),
    }
}

/// Validate a partial update against an existing tour.
///
/// The patch is merged over the stored document and the result must pass
/// the same rules as a new tour. `_id`, `createdAt` and `__v` cannot be
/// patched; the version is bumped.
pub fn validate_update(existing: &Tour, patch: &Value) -> Result<Tour, StoreError> {
    let Some(patch) = patch.as_object() else {
        return Err(StoreError::Validation {
            collection: COLLECTION.to_string(),
            errors: vec![FieldError::new("body", "A tour update must be a JSON object")],
        });
    };

    let mut merged = existing.clone().into_document()?;
    for (key, value) in patch {
        if matches!(key.as_str(), ID_FIELD | CREATED_AT_FIELD | VERSION_FIELD) {
            continue;
        }
        merged.insert(key.clone(), value.clone());
    }

    let mut tour = validate_new(&Value::Object(merged), existing.id, existing.created_at)?;
    tour.version = existing.version + 1;
    Ok(tour)
}

/// Reads and casts input fields, collecting every failure.
struct FieldReader<'a> {
    input: &'a Document,
    errors: Vec<FieldError>,
}

impl<'a> FieldReader<'a> {
    fn new(input: &'a Document) -> Self {
        Self {
            input,
            errors: Vec::new(),
        }
    }

    fn present(&self, path: &str) -> Option<&'a Value> {
        self.input.get(path).filter(|v| !v.is_null())
    }

    fn require<T>(&mut self, path: &str, value: Option<T>, required: Option<&str>) -> Option<T> {
        if value.is_none() && self.present(path).is_none() {
            if let Some(message) = required {
                self.errors.push(FieldError::new(path, message));
            }
        }
        value
    }

    fn cast_failed(&mut self, path: &str, value: &Value, kind: FieldKind) {
        let shown = match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        self.errors.push(FieldError::new(
            path,
            format!(
                "Cast to {} failed for value \"{}\" at path \"{}\"",
                kind.type_name(),
                shown,
                path
            ),
        ));
    }

    fn number(&mut self, path: &str, required: Option<&str>) -> Option<f64> {
        let value = match self.present(path) {
            Some(Value::Number(n)) => n.as_f64(),
            Some(Value::String(s)) if s.trim().parse::<f64>().is_ok() => s.trim().parse().ok(),
            Some(other) => {
                self.cast_failed(path, other, FieldKind::Number);
                return None;
            }
            None => None,
        };
        self.require(path, value, required)
    }

    fn text(&mut self, path: &str, required: Option<&str>) -> Option<String> {
        let value = match self.present(path) {
            Some(Value::String(s)) => Some(s.trim().to_string()),
            Some(Value::Number(n)) => Some(n.to_string()),
            Some(other) => {
                self.cast_failed(path, other, FieldKind::Text);
                return None;
            }
            None => None,
        };
        // an all-whitespace string counts as missing
        let value = value.filter(|s| !s.is_empty());
        if value.is_none() {
            if let (Some(message), Some(_)) = (required, self.present(path)) {
                self.errors.push(FieldError::new(path, message));
                return None;
            }
        }
        self.require(path, value, required)
    }

    fn name(&mut self) -> Option<String> {
        let name = self.text("name", Some("A tour must have a name"))?;
        let len = name.chars().count();
        if len > NAME_MAX_LEN {
            self.errors.push(FieldError::new(
                "name",
                format!("A tour name must have less or equal then {} characters", NAME_MAX_LEN),
            ));
        } else if len < NAME_MIN_LEN {
            self.errors.push(FieldError::new(
                "name",
                format!("A tour name must have more or equal then {} characters", NAME_MIN_LEN),
            ));
        }
        Some(name)
    }

    fn difficulty(&mut self) -> Option<Difficulty> {
        let raw = self.text("difficulty", Some("A tour must have a difficulty"))?;
        match raw.parse::<Difficulty>() {
            Ok(difficulty) => Some(difficulty),
            Err(()) => {
                self.errors.push(FieldError::new(
                    "difficulty",
                    "Difficulty is either: easy, medium, difficult",
                ));
                None
            }
        }
    }

    fn rating(&mut self) -> Option<f64> {
        let rating = self.number("ratingsAverage", None)?;
        if rating < RATING_MIN {
            self.errors
                .push(FieldError::new("ratingsAverage", "Rating must be above 1.0"));
        } else if rating > RATING_MAX {
            self.errors
                .push(FieldError::new("ratingsAverage", "Rating must be below 5.0"));
        }
        Some(rating)
    }

    fn boolean(&mut self, path: &str) -> Option<bool> {
        match self.present(path) {
            Some(Value::Bool(b)) => Some(*b),
            Some(Value::String(s)) if s == "true" => Some(true),
            Some(Value::String(s)) if s == "false" => Some(false),
            Some(other) => {
                self.cast_failed(path, other, FieldKind::Boolean);
                None
            }
            None => None,
        }
    }

    fn text_list(&mut self, path: &str) -> Vec<String> {
        match self.present(path) {
            Some(Value::Array(items)) => {
                let mut list = Vec::with_capacity(items.len());
                for item in items {
                    match item {
                        Value::String(s) => list.push(s.clone()),
                        other => {
                            self.cast_failed(path, other, FieldKind::Text);
                            return Vec::new();
                        }
                    }
                }
                list
            }
            Some(Value::String(s)) => vec![s.clone()],
            Some(other) => {
                self.cast_failed(path, other, FieldKind::Text);
                Vec::new()
            }
            None => Vec::new(),
        }
    }

    fn date_list(&mut self, path: &str) -> Vec<DateTime<Utc>> {
        let items: Vec<&Value> = match self.present(path) {
            Some(Value::Array(items)) => items.iter().collect(),
            Some(single) => vec![single],
            None => return Vec::new(),
        };

        let mut dates = Vec::with_capacity(items.len());
        for item in items {
            match item.as_str().and_then(parse_date) {
                Some(date) => dates.push(date),
                None => {
                    self.cast_failed(path, item, FieldKind::Date);
                    return Vec::new();
                }
            }
        }
        dates
    }

    fn check_discount(&mut self, discount: f64, price: f64) {
        if discount >= price {
            self.errors.push(FieldError::new(
                "priceDiscount",
                format!("Discount price ({}) should be below regular price", discount),
            ));
        }
    }

    fn finish(self) -> Result<(), StoreError> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(StoreError::Validation {
                collection: COLLECTION.to_string(),
                errors: self.errors,
            })
        }
    }
}

/// Accepts RFC 3339 timestamps and plain `YYYY-MM-DD` dates, optionally
/// with a `,HH:MM` time as used in the seed data.
pub fn parse_date(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(date) = DateTime::parse_from_rfc3339(raw) {
        return Some(date.with_timezone(&Utc));
    }
    let normalized = raw.replacen(',', "T", 1);
    if let Ok(naive) = chrono::NaiveDateTime::parse_from_str(&normalized, "%Y-%m-%dT%H:%M") {
        return Some(naive.and_utc());
    }
    chrono::NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}
