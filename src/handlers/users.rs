//! User routes are reserved but not implemented yet. Each answers 500 with
//! a fixed message, bypassing the error pipeline since nothing failed.

use actix_web::HttpResponse;
use serde_json::json;

fn not_yet_defined() -> HttpResponse {
    HttpResponse::InternalServerError().json(json!({
        "status": "error",
        "message": "This route is not yet defined!"
    }))
}

pub async fn get_all_users() -> HttpResponse {
    not_yet_defined()
}

pub async fn create_user() -> HttpResponse {
    not_yet_defined()
}

pub async fn get_user() -> HttpResponse {
    not_yet_defined()
}

pub async fn update_user() -> HttpResponse {
    not_yet_defined()
}

pub async fn delete_user() -> HttpResponse {
    not_yet_defined()
}
