//! # Async Failure Capture
//!
//! Handlers are `async fn`s that can fail in two ways: by returning an error
//! or by panicking somewhere after an `.await`. [`catch_async`] wraps a
//! handler body so both end up as exactly one [`AppError`], which the global
//! error handler then renders. Nothing is retried and nothing is logged here.
//!
//! ## Usage Example:
//! ```rust,ignore
//! pub async fn get_tour(state: web::Data<AppState>, id: web::Path<String>) -> AppResult<HttpResponse> {
//!     catch_async(async move {
//!         let tour = state.store().find_by_id(&id).await?;
//!         // ...
//!     })
//!     .await
//! }
//! ```

use crate::error::AppError;
use futures_util::FutureExt;
use std::future::Future;
use std::panic::AssertUnwindSafe;

/// Drive `fut` to completion, turning its error (or a panic) into an
/// [`AppError`].
///
/// A successful output passes through untouched.
pub async fn catch_async<Fut, T, E>(fut: Fut) -> Result<T, AppError>
where
    Fut: Future<Output = Result<T, E>>,
    E: Into<AppError>,
{
    // The future is dropped as soon as it panics, so no broken state is
    // observable afterwards.
    match AssertUnwindSafe(fut).catch_unwind().await {
        Ok(result) => result.map_err(Into::into),
        Err(payload) => Err(AppError::from_panic(payload)),
    }
}
