use std::sync::Arc;

use axum::{
    Json,
    Router,
    routing::get,
};
use serde_json::{json, Value};

use appointment_cell::{appointment_routes, BookingEngine};
use shared_config::AppConfig;

pub fn create_router(config: Arc<AppConfig>, engine: Arc<BookingEngine>) -> Router {
    let store = config.booking_store.to_string();

    Router::new()
        .route("/", get(|| async { "MedConsult booking API is running!" }))
        .route("/health", get(move || health(store.clone())))
        .nest("/appointments", appointment_routes(config, engine))
}

async fn health(store: String) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "bookingStore": store
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    fn app() -> Router {
        let config = AppConfig {
            supabase_url: String::new(),
            supabase_anon_key: String::new(),
            supabase_jwt_secret: "router-test-secret".to_string(),
            booking_store: shared_config::BookingStoreKind::Memory,
            server_port: 0,
            claim_retry_attempts: 1,
        };
        let engine = Arc::new(BookingEngine::from_config(&config));
        create_router(Arc::new(config), engine)
    }

    #[tokio::test]
    async fn test_health_reports_store() {
        let response = app()
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["bookingStore"], "memory");
    }

    #[tokio::test]
    async fn test_appointments_are_nested() {
        let response = app()
            .oneshot(
                Request::builder()
                    .uri("/appointments/confirm-payment")
                    .method("POST")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
