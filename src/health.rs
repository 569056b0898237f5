use actix_web::HttpResponse;
use serde_json::json;

/// Liveness check. No side effects, no dependencies.
pub async fn read_root() -> HttpResponse {
    HttpResponse::Ok().json(json!({
        "message": "Application is running"
    }))
}
