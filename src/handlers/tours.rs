//! Tour CRUD handlers. Every body runs inside [`catch_async`] so store
//! failures and panics reach the global error handler as one `AppError`.

use crate::catch_async::catch_async;
use crate::error::{AppError, AppResult};
use crate::features::{QueryFeatures, RawQuery};
use crate::middleware::RequestTime;
use crate::state::AppState;
use actix_web::{web, HttpResponse};
use serde_json::{json, Value};
use tracing::debug;

const NOT_FOUND_MESSAGE: &str = "No tour found with that ID";

/// `GET /api/v1/tours`
///
/// Supports filtering (`difficulty=easy`, `price[lt]=1500`), sorting
/// (`sort=-price,ratingsAverage`), field limiting (`fields=name,price`) and
/// pagination (`page=2&limit=10`).
pub async fn get_all_tours(
    state: web::Data<AppState>,
    query: web::Query<Vec<(String, String)>>,
    requested_at: RequestTime,
) -> AppResult<HttpResponse> {
    catch_async(async move {
        let raw = RawQuery::from_pairs(query.into_inner());
        let store = state.store();

        let features = QueryFeatures::new(store.find(), raw)
            .filter()
            .sort()
            .limit_fields()
            .paginate();

        if features.page_requested() {
            let total = store.count(features.filter_spec()).await?;
            if features.pagination().skip() >= total {
                return Err(AppError::not_found("This page does not exist"));
            }
        }

        let tours = features.exec().await?;
        debug!(results = tours.len(), "Listed tours");

        Ok::<_, AppError>(HttpResponse::Ok().json(json!({
            "status": "success",
            "requestedAt": requested_at.to_rfc3339(),
            "results": tours.len(),
            "data": { "tours": tours }
        })))
    })
    .await
}

/// `GET /api/v1/tours/{id}`
pub async fn get_tour(state: web::Data<AppState>, id: web::Path<String>) -> AppResult<HttpResponse> {
    catch_async(async move {
        let tour = state
            .store()
            .find_by_id(&id)
            .await?
            .ok_or_else(|| AppError::not_found(NOT_FOUND_MESSAGE))?;

        Ok::<_, AppError>(HttpResponse::Ok().json(json!({
            "status": "success",
            "data": { "tour": tour }
        })))
    })
    .await
}

/// `POST /api/v1/tours`
pub async fn create_tour(state: web::Data<AppState>, body: web::Json<Value>) -> AppResult<HttpResponse> {
    catch_async(async move {
        let tour = state.store().create(&body).await?;

        Ok::<_, AppError>(HttpResponse::Created().json(json!({
            "status": "success",
            "data": { "tour": tour }
        })))
    })
    .await
}

/// `PATCH /api/v1/tours/{id}`
pub async fn update_tour(
    state: web::Data<AppState>,
    id: web::Path<String>,
    body: web::Json<Value>,
) -> AppResult<HttpResponse> {
    catch_async(async move {
        let tour = state
            .store()
            .update_by_id(&id, &body)
            .await?
            .ok_or_else(|| AppError::not_found(NOT_FOUND_MESSAGE))?;

        Ok::<_, AppError>(HttpResponse::Ok().json(json!({
            "status": "success",
            "data": { "tour": tour }
        })))
    })
    .await
}

/// `DELETE /api/v1/tours/{id}`
pub async fn delete_tour(state: web::Data<AppState>, id: web::Path<String>) -> AppResult<HttpResponse> {
    catch_async(async move {
        state
            .store()
            .delete_by_id(&id)
            .await?
            .ok_or_else(|| AppError::not_found(NOT_FOUND_MESSAGE))?;

        Ok::<_, AppError>(HttpResponse::NoContent().finish())
    })
    .await
}

#[cfg(test)]
mod tests {
    use crate::config::{AppConfig, Environment};
    use crate::handlers;
    use crate::middleware::{GlobalErrorHandler, RequestLogging};
    use crate::state::AppState;
    use crate::store::MemoryStore;
    use actix_web::http::StatusCode;
    use actix_web::{test, web, App};
    use chrono::{TimeZone, Utc};
    use serde_json::{json, Value};

    macro_rules! tours_app {
        ($store:expr, $environment:expr) => {{
            let mut config = AppConfig::default();
            config.environment = $environment;
            test::init_service(
                App::new()
                    .app_data(web::Data::new(AppState::new(config, $store)))
                    .wrap(GlobalErrorHandler)
                    .wrap(RequestLogging)
                    .configure(handlers::configure)
                    .default_service(web::to(handlers::unhandled_route)),
            )
            .await
        }};
    }

    fn tour_input(name: &str, price: f64, duration: f64, difficulty: &str) -> Value {
        json!({
            "name": name,
            "duration": duration,
            "maxGroupSize": 10,
            "difficulty": difficulty,
            "price": price,
            "summary": "A tour worth taking",
            "imageCover": "cover.jpg"
        })
    }

    async fn seeded_store() -> MemoryStore {
        let store = MemoryStore::new();
        let tours = [
            ("The Forest Hiker", 397.0, 5.0, "easy", 1),
            ("The Sea Explorer", 497.0, 7.0, "medium", 2),
            ("The Snow Adventurer", 997.0, 4.0, "difficult", 3),
        ];
        for (name, price, duration, difficulty, day) in tours {
            let created_at = Utc.with_ymd_and_hms(2024, 1, day, 0, 0, 0).unwrap();
            store
                .create_at(&tour_input(name, price, duration, difficulty), created_at)
                .await
                .unwrap();
        }
        store
    }

    fn names(body: &Value) -> Vec<String> {
        body["data"]["tours"]
            .as_array()
            .unwrap()
            .iter()
            .map(|t| t["name"].as_str().unwrap().to_string())
            .collect()
    }

    #[actix_web::test]
    async fn test_list_defaults_to_newest_first_without_version() {
        let app = tours_app!(seeded_store().await, Environment::Production);

        let req = test::TestRequest::get().uri("/api/v1/tours").to_request();
        let res = test::call_service(&app, req).await;
        assert_eq!(res.status(), StatusCode::OK);

        let body: Value = test::read_body_json(res).await;
        assert_eq!(body["status"], "success");
        assert_eq!(body["results"], 3);
        assert!(body["requestedAt"].is_string());
        assert_eq!(
            names(&body),
            vec!["The Snow Adventurer", "The Sea Explorer", "The Forest Hiker"]
        );
        assert!(body["data"]["tours"][0].get("__v").is_none());
        assert!(body["data"]["tours"][0].get("_id").is_some());
    }

    #[actix_web::test]
    async fn test_list_filters_sorts_and_limits_fields() {
        let app = tours_app!(seeded_store().await, Environment::Production);

        let req = test::TestRequest::get()
            .uri("/api/v1/tours?price%5Bgte%5D=400&sort=-price&fields=name,price")
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;

        assert_eq!(names(&body), vec!["The Snow Adventurer", "The Sea Explorer"]);
        let first = body["data"]["tours"][0].as_object().unwrap();
        assert!(first.contains_key("name"));
        assert!(first.contains_key("price"));
        assert!(first.contains_key("_id"));
        assert!(!first.contains_key("difficulty"));
    }

    #[actix_web::test]
    async fn test_list_equality_and_pagination() {
        let app = tours_app!(seeded_store().await, Environment::Production);

        let req = test::TestRequest::get()
            .uri("/api/v1/tours?difficulty=easy")
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(names(&body), vec!["The Forest Hiker"]);

        let req = test::TestRequest::get()
            .uri("/api/v1/tours?sort=price&page=2&limit=2")
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(names(&body), vec!["The Snow Adventurer"]);
    }

    #[actix_web::test]
    async fn test_page_past_the_end_is_not_found() {
        let app = tours_app!(seeded_store().await, Environment::Production);

        let req = test::TestRequest::get()
            .uri("/api/v1/tours?page=3&limit=2")
            .to_request();
        let res = test::call_service(&app, req).await;
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
        let body: Value = test::read_body_json(res).await;
        assert_eq!(body, json!({ "status": "fail", "message": "This page does not exist" }));
    }

    #[actix_web::test]
    async fn test_first_page_of_nothing_is_not_found() {
        let app = tours_app!(seeded_store().await, Environment::Production);

        let req = test::TestRequest::get()
            .uri("/api/v1/tours?difficulty=extreme&page=1")
            .to_request();
        let res = test::call_service(&app, req).await;
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
        let body: Value = test::read_body_json(res).await;
        assert_eq!(body["message"], "This page does not exist");

        // without an explicit page an empty result is just empty
        let req = test::TestRequest::get()
            .uri("/api/v1/tours?difficulty=extreme")
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["results"], 0);

        let app = tours_app!(MemoryStore::new(), Environment::Production);
        let req = test::TestRequest::get().uri("/api/v1/tours?page=1").to_request();
        let res = test::call_service(&app, req).await;
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
    }

    #[actix_web::test]
    async fn test_page_without_limit_uses_default_window() {
        let app = tours_app!(seeded_store().await, Environment::Production);

        let req = test::TestRequest::get().uri("/api/v1/tours?page=1").to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["results"], 3);

        let req = test::TestRequest::get().uri("/api/v1/tours?page=2").to_request();
        let res = test::call_service(&app, req).await;
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
    }

    #[actix_web::test]
    async fn test_invalid_filter_value_is_a_cast_error() {
        let app = tours_app!(seeded_store().await, Environment::Production);

        let req = test::TestRequest::get()
            .uri("/api/v1/tours?price%5Blt%5D=cheap")
            .to_request();
        let res = test::call_service(&app, req).await;
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        let body: Value = test::read_body_json(res).await;
        assert_eq!(body["message"], "Invalid price: cheap");
    }

    #[actix_web::test]
    async fn test_crud_round_trip() {
        let app = tours_app!(MemoryStore::new(), Environment::Production);

        let req = test::TestRequest::post()
            .uri("/api/v1/tours")
            .set_json(tour_input("The Park Camper Deluxe", 1497.0, 10.0, "medium"))
            .to_request();
        let res = test::call_service(&app, req).await;
        assert_eq!(res.status(), StatusCode::CREATED);
        let body: Value = test::read_body_json(res).await;
        let id = body["data"]["tour"]["_id"].as_str().unwrap().to_string();
        assert_eq!(body["data"]["tour"]["ratingsAverage"], 4.5);

        let req = test::TestRequest::get()
            .uri(&format!("/api/v1/tours/{}", id))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["data"]["tour"]["name"], "The Park Camper Deluxe");

        let req = test::TestRequest::patch()
            .uri(&format!("/api/v1/tours/{}", id))
            .set_json(json!({ "price": 997 }))
            .to_request();
        let res = test::call_service(&app, req).await;
        assert_eq!(res.status(), StatusCode::OK);
        let body: Value = test::read_body_json(res).await;
        assert_eq!(body["data"]["tour"]["price"], json!(997));

        let req = test::TestRequest::delete()
            .uri(&format!("/api/v1/tours/{}", id))
            .to_request();
        let res = test::call_service(&app, req).await;
        assert_eq!(res.status(), StatusCode::NO_CONTENT);
        assert!(test::read_body(res).await.is_empty());

        let req = test::TestRequest::get()
            .uri(&format!("/api/v1/tours/{}", id))
            .to_request();
        let res = test::call_service(&app, req).await;
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
        let body: Value = test::read_body_json(res).await;
        assert_eq!(body["message"], "No tour found with that ID");
    }

    #[actix_web::test]
    async fn test_malformed_id_is_a_cast_error() {
        let app = tours_app!(seeded_store().await, Environment::Production);

        let req = test::TestRequest::get().uri("/api/v1/tours/wwwww").to_request();
        let res = test::call_service(&app, req).await;
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        let body: Value = test::read_body_json(res).await;
        assert_eq!(body, json!({ "status": "fail", "message": "Invalid _id: wwwww" }));
    }

    #[actix_web::test]
    async fn test_duplicate_name_is_rejected() {
        let app = tours_app!(seeded_store().await, Environment::Production);

        let req = test::TestRequest::post()
            .uri("/api/v1/tours")
            .set_json(tour_input("The Forest Hiker", 100.0, 3.0, "easy"))
            .to_request();
        let res = test::call_service(&app, req).await;
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        let body: Value = test::read_body_json(res).await;
        assert_eq!(
            body["message"],
            "Duplicate field value: \"The Forest Hiker\". Please use another value!"
        );
    }

    #[actix_web::test]
    async fn test_validation_failures_are_listed() {
        let app = tours_app!(MemoryStore::new(), Environment::Production);

        let mut input = tour_input("Short", 100.0, 3.0, "extreme");
        input["ratingsAverage"] = json!(6);
        let req = test::TestRequest::post()
            .uri("/api/v1/tours")
            .set_json(input)
            .to_request();
        let res = test::call_service(&app, req).await;
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        let body: Value = test::read_body_json(res).await;
        assert_eq!(
            body["message"],
            "Invalid input data. A tour name must have more or equal then 10 characters. \
             Difficulty is either: easy, medium, difficult. Rating must be below 5.0"
        );
    }

    #[actix_web::test]
    async fn test_development_errors_carry_detail() {
        let app = tours_app!(seeded_store().await, Environment::Development);

        let req = test::TestRequest::get().uri("/api/v1/tours/wwwww").to_request();
        let res = test::call_service(&app, req).await;
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        let body: Value = test::read_body_json(res).await;
        assert_eq!(body["error"]["statusCode"], 400);
        assert_eq!(body["error"]["isOperational"], true);
        assert!(body["stack"].is_string());
    }
}
