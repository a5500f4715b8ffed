//! # Global Error Handler
//!
//! The single place where failures become responses. Any handler that
//! returned an error (an [`AppError`] or one raised by actix itself, such as
//! a malformed JSON body) has its response rebuilt here through
//! [`AppError::dispatch`], using the environment from [`AppState`].
//!
//! Successful responses and plain error-status responses built by handlers
//! pass through untouched.

use crate::config::Environment;
use crate::error::AppError;
use crate::state::AppState;
use actix_web::{
    body::EitherBody,
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    error::InternalError,
    web, Error,
};
use futures_util::future::LocalBoxFuture;
use std::future::{ready, Ready};

pub struct GlobalErrorHandler;

impl<S, B> Transform<S, ServiceRequest> for GlobalErrorHandler
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type InitError = ();
    type Transform = GlobalErrorHandlerMiddleware<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(GlobalErrorHandlerMiddleware { service }))
    }
}

pub struct GlobalErrorHandlerMiddleware<S> {
    service: S,
}

impl<S, B> Service<ServiceRequest> for GlobalErrorHandlerMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        // without state (e.g. a bare test app) fall back to the terse shape
        let environment = req
            .app_data::<web::Data<AppState>>()
            .map(|state| state.environment())
            .unwrap_or_default();

        let fut = self.service.call(req);

        Box::pin(async move {
            match fut.await {
                Ok(res) => {
                    let response = match res.response().error() {
                        Some(err) => render(err, environment),
                        None => return Ok(res.map_into_left_body()),
                    };
                    let (req, _) = res.into_parts();
                    Ok(ServiceResponse::new(req, response).map_into_right_body())
                }
                // no request to attach a response to; hand the rendered
                // response back inside the error
                Err(err) => {
                    let response = render(&err, environment);
                    Err(InternalError::from_response(err, response).into())
                }
            }
        })
    }
}

fn render(err: &Error, environment: Environment) -> actix_web::HttpResponse {
    match err.as_error::<AppError>() {
        Some(app_error) => app_error.dispatch(environment),
        None => AppError::from_framework(err).dispatch(environment),
    }
}
