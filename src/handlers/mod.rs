pub mod tours;
pub mod users;

use crate::error::AppError;
use crate::health;
use actix_web::{web, HttpRequest, HttpResponse};

/// Largest JSON body accepted, matching the 10kb body limit of the API.
const JSON_LIMIT_BYTES: usize = 10 * 1024;

/// Register every route of the API.
///
/// Unknown methods on known paths fall through to [`unhandled_route`] so
/// they get the same 404 as unknown paths.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.app_data(web::JsonConfig::default().limit(JSON_LIMIT_BYTES))
        .service(
            web::scope("/api/v1")
                .service(
                    web::resource("/tours")
                        .route(web::get().to(tours::get_all_tours))
                        .route(web::post().to(tours::create_tour))
                        .default_service(web::to(unhandled_route)),
                )
                .service(
                    web::resource("/tours/{id}")
                        .route(web::get().to(tours::get_tour))
                        .route(web::patch().to(tours::update_tour))
                        .route(web::delete().to(tours::delete_tour))
                        .default_service(web::to(unhandled_route)),
                )
                .service(
                    web::resource("/users")
                        .route(web::get().to(users::get_all_users))
                        .route(web::post().to(users::create_user))
                        .default_service(web::to(unhandled_route)),
                )
                .service(
                    web::resource("/users/{id}")
                        .route(web::get().to(users::get_user))
                        .route(web::patch().to(users::update_user))
                        .route(web::delete().to(users::delete_user))
                        .default_service(web::to(unhandled_route)),
                ),
        )
        .route("/health", web::get().to(health::health_check));
}

/// Catch-all for anything no route matched.
pub async fn unhandled_route(req: HttpRequest) -> Result<HttpResponse, AppError> {
    Err(AppError::not_found(format!(
        "Can't find {} on this server!",
        req.uri()
    )))
}
