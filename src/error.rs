//! # Error Handling
//!
//! Every failure a request can run into ends up as an [`AppError`]. There
//! are two kinds:
//!
//! - **Operational** errors are expected: a tour that does not exist, a body
//!   that fails validation, a malformed id. Their message is written for the
//!   client and is always safe to show.
//! - **Unexpected** errors are bugs or infrastructure faults. Their message
//!   is for operators only.
//!
//! ## Lifecycle
//! ```text
//! raw failure ──classify──▶ AppError ──?──▶ handler ──▶ GlobalErrorHandler ──dispatch──▶ response
//! (StoreError, panic, ...)
//! ```
//!
//! Handlers never catch and swallow failures; they return them with `?` and
//! the [`GlobalErrorHandler`](crate::middleware::GlobalErrorHandler) renders
//! them once, in the shape the configured [`Environment`] calls for.
//!
//! ## Response shapes
//! Production, operational:
//! ```json
//! { "status": "fail", "message": "No tour found with that ID" }
//! ```
//! Production, unexpected (the real message is only logged):
//! ```json
//! { "status": "error", "message": "Something went wrong!" }
//! ```
//! Development adds `error` (classification and raw detail) and `stack`.

use crate::config::Environment;
use crate::store::StoreError;
use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use regex::Regex;
use serde::Serialize;
use serde_json::json;
use std::any::Any;
use std::backtrace::Backtrace;
use std::fmt;
use std::sync::LazyLock;
use tracing::error;

/// Message shown to clients for every unexpected error in production.
pub const GENERIC_MESSAGE: &str = "Something went wrong!";

/// First single- or double-quoted literal, honouring backslash escapes.
static QUOTED_LITERAL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#""(?:[^"\\]|\\.)*"|'(?:[^'\\]|\\.)*'"#).expect("quoted literal regex is valid")
});

/// `"fail"` for client errors, `"error"` for server errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorStatus {
    Fail,
    Error,
}

impl ErrorStatus {
    pub fn for_code(status_code: StatusCode) -> Self {
        if status_code.is_client_error() {
            ErrorStatus::Fail
        } else {
            ErrorStatus::Error
        }
    }
}

impl fmt::Display for ErrorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorStatus::Fail => write!(f, "fail"),
            ErrorStatus::Error => write!(f, "error"),
        }
    }
}

/// A classified failure, ready to be dispatched to the client.
///
/// ## Usage Example:
/// ```rust,ignore
/// let tour = store.find_by_id(&id).await?
///     .ok_or_else(|| AppError::not_found("No tour found with that ID"))?;
/// ```
#[derive(Debug)]
pub struct AppError {
    message: String,
    status_code: StatusCode,
    status: ErrorStatus,
    is_operational: bool,
    /// The raw failure this error was classified from, if any.
    detail: Option<String>,
    backtrace: Backtrace,
}

impl AppError {
    /// An operational error with a client-facing message.
    ///
    /// Codes outside 400..=599 are not error codes; they fall back to 500.
    pub fn new(message: impl Into<String>, status_code: u16) -> Self {
        let status_code = StatusCode::from_u16(status_code)
            .ok()
            .filter(|code| code.is_client_error() || code.is_server_error())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        Self {
            message: message.into(),
            status_code,
            status: ErrorStatus::for_code(status_code),
            is_operational: true,
            detail: None,
            backtrace: Backtrace::force_capture(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(message, 404)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(message, 400)
    }

    /// A failure nobody planned for. Always a 500, never shown to clients
    /// in production.
    pub fn unexpected(cause: impl fmt::Display) -> Self {
        Self {
            message: cause.to_string(),
            status_code: StatusCode::INTERNAL_SERVER_ERROR,
            status: ErrorStatus::Error,
            is_operational: false,
            detail: None,
            backtrace: Backtrace::force_capture(),
        }
    }

    /// Turn a caught panic payload into an unexpected error.
    pub fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "non-string payload".to_string());
        Self::unexpected(format!("handler panicked: {}", message))
    }

    /// Classify an error raised by the web framework itself (malformed JSON
    /// body, bad query string, ...). Client errors keep their status and
    /// message; anything else is unexpected.
    pub fn from_framework(err: &actix_web::Error) -> Self {
        let status_code = err.as_response_error().status_code();
        let error = if status_code.is_client_error() {
            Self::new(err.to_string(), status_code.as_u16())
        } else {
            Self::unexpected(err)
        };
        error.with_detail(format!("{:?}", err))
    }

    fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn status(&self) -> ErrorStatus {
        self.status
    }

    pub fn is_operational(&self) -> bool {
        self.is_operational
    }

    pub fn detail(&self) -> Option<&str> {
        self.detail.as_deref()
    }

    /// Status code the client will see in `environment`.
    pub fn response_status(&self, environment: Environment) -> StatusCode {
        if self.is_operational || environment.is_verbose() {
            self.status_code
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }

    /// JSON body the client will see in `environment`.
    pub fn response_body(&self, environment: Environment) -> serde_json::Value {
        if environment.is_verbose() {
            return json!({
                "status": self.status,
                "error": {
                    "statusCode": self.status_code.as_u16(),
                    "status": self.status,
                    "isOperational": self.is_operational,
                    "detail": self.detail,
                },
                "message": self.message,
                "stack": self.backtrace.to_string(),
            });
        }

        if self.is_operational {
            json!({
                "status": self.status,
                "message": self.message,
            })
        } else {
            json!({
                "status": ErrorStatus::Error,
                "message": GENERIC_MESSAGE,
            })
        }
    }

    /// Render the error for the client. Unexpected errors are logged here,
    /// once, with everything the client does not get to see.
    pub fn dispatch(&self, environment: Environment) -> HttpResponse {
        if !self.is_operational {
            error!(
                message = %self.message,
                detail = ?self.detail,
                status_code = self.status_code.as_u16(),
                "Unexpected error"
            );
        }

        HttpResponse::build(self.response_status(environment)).json(self.response_body(environment))
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}): {}", self.status, self.status_code.as_u16(), self.message)
    }
}

impl std::error::Error for AppError {}

/// Used when an `AppError` escapes without passing the global handler;
/// renders the production shape without logging.
impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        self.response_status(Environment::Production)
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(self.response_body(Environment::Production))
    }
}

/// Classification of raw store failures.
///
/// | Store failure  | Status | Message                                                  |
/// |----------------|--------|----------------------------------------------------------|
/// | `Cast`         | 400    | `Invalid <path>: <value>`                                |
/// | `DuplicateKey` | 400    | `Duplicate field value: <value>. Please use another value!` |
/// | `Validation`   | 400    | `Invalid input data. <message>. <message>`               |
/// | `Internal`     | 500    | unexpected                                               |
impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        let classified = match &err {
            StoreError::Cast { path, value, .. } => {
                AppError::bad_request(format!("Invalid {}: {}", path, value))
            }
            StoreError::DuplicateKey { message } => match QUOTED_LITERAL.find(message) {
                Some(value) => AppError::bad_request(format!(
                    "Duplicate field value: {}. Please use another value!",
                    value.as_str()
                )),
                None => AppError::bad_request("Duplicate field value. Please use another value!"),
            },
            StoreError::Validation { errors, .. } => {
                let messages: Vec<&str> = errors.iter().map(|e| e.message.as_str()).collect();
                AppError::bad_request(format!("Invalid input data. {}", messages.join(". ")))
            }
            StoreError::Internal(_) => AppError::unexpected(&err),
        };
        classified.with_detail(err.to_string())
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::unexpected(format!("{:#}", err))
    }
}

/// Type alias for Results that use our custom error type.
pub type AppResult<T> = Result<T, AppError>;
