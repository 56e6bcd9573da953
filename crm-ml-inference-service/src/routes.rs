use crate::registry::ModelRegistry;
use axum::extract::rejection::JsonRejection;
use axum::extract::{DefaultBodyLimit, State};
use axum::http::{HeaderValue, StatusCode};
use axum::response::Response;
use axum::routing::{get, post};
use axum::{Json, Router};
use crm_ml_service::dto::CustomerData;
use crm_ml_service::error::ServiceError;
use crm_ml_service::response::make_response;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tracing::{debug, error};

pub type AppState = Arc<ModelRegistry>;

pub fn router(
    state: AppState,
    cors_origin: &str,
    max_body_bytes: usize,
) -> Result<Router, ServiceError> {
    let origin = if cors_origin.trim() == "*" {
        AllowOrigin::from(Any)
    } else {
        let value = HeaderValue::from_str(cors_origin.trim()).map_err(|_| {
            ServiceError::internal_server_error(format!(
                "Unable to parse CORS_ORIGIN {}",
                cors_origin
            ))
        })?;
        AllowOrigin::exact(value)
    };
    let cors = CorsLayer::new()
        .allow_origin(origin)
        .allow_methods(Any)
        .allow_headers(Any);

    Ok(Router::new()
        .route("/predict-churn", post(predict_churn))
        .route("/recommend", post(recommend))
        .route("/health", get(health))
        .with_state(state)
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .layer(cors))
}

fn customers(
    payload: Result<Json<Vec<CustomerData>>, JsonRejection>,
) -> Result<Vec<CustomerData>, ServiceError> {
    payload
        .map(|Json(customers)| customers)
        .map_err(|rejection| match rejection.status() {
            StatusCode::PAYLOAD_TOO_LARGE => {
                ServiceError::payload_too_large(rejection.body_text())
            }
            _ => ServiceError::unprocessable(rejection.body_text()),
        })
}

fn logged<T>(route: &str, result: Result<T, ServiceError>) -> Result<T, ServiceError> {
    if let Err(err) = &result {
        error!(route, status = err.status.code(), "{}", err.msg);
    }
    result
}

pub async fn predict_churn(
    State(registry): State<AppState>,
    payload: Result<Json<Vec<CustomerData>>, JsonRejection>,
) -> Response {
    let result = customers(payload).and_then(|customers| {
        debug!(batch = customers.len(), "Scoring churn");
        registry.predict_churn_batch(&customers)
    });
    make_response(logged("/predict-churn", result))
}

pub async fn recommend(
    State(registry): State<AppState>,
    payload: Result<Json<Vec<CustomerData>>, JsonRejection>,
) -> Response {
    let result = customers(payload).and_then(|customers| {
        debug!(batch = customers.len(), "Looking up recommendations");
        registry.recommend_batch(&customers)
    });
    make_response(logged("/recommend", result))
}

pub async fn health(State(registry): State<AppState>) -> Response {
    make_response(Ok(registry.health()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_MAX_BODY_BYTES;
    use crate::fixtures;
    use axum::body::{Body, Bytes};
    use axum::http::{header, Method, Request};
    use crm_ml_service::dto::{ChurnPrediction, HealthReport, RecommendationResponse};
    use crm_ml_service::response::ErrorBody;
    use serde::de::DeserializeOwned;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    fn app() -> Router {
        router(
            Arc::new(fixtures::registry()),
            "http://localhost:8000",
            DEFAULT_MAX_BODY_BYTES,
        )
        .unwrap()
    }

    async fn post_json(uri: &str, body: Value) -> (StatusCode, Bytes) {
        send(
            Request::builder()
                .method(Method::POST)
                .uri(uri)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
    }

    async fn send(request: Request<Body>) -> (StatusCode, Bytes) {
        let response = app().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, bytes)
    }

    fn parse<T: DeserializeOwned>(bytes: &[u8]) -> T {
        serde_json::from_slice(bytes).unwrap()
    }

    #[tokio::test]
    async fn predict_churn_scores_each_customer_in_order() {
        let body = json!([
            { "customer_id": "a", "total_spent": 1000.0, "order_count": 9,
              "average_order_value": 100.0, "recency": 0, "tenure": 725 },
            { "customer_id": "b", "recency": 150, "total_spent": 500.0, "order_count": 5,
              "average_order_value": 100.0, "tenure": 365 },
            { "customer_id": "c" }
        ]);
        let (status, bytes) = post_json("/predict-churn", body).await;
        assert_eq!(status, StatusCode::OK);
        let predictions: Vec<ChurnPrediction> = parse(&bytes);
        let ids: Vec<_> = predictions
            .iter()
            .map(|p| p.customer_id.clone().unwrap())
            .collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert_eq!(predictions[0].predicted_class, 0);
        assert_eq!(predictions[1].predicted_class, 1);
        assert!(predictions
            .iter()
            .all(|p| (0.0..=1.0).contains(&p.churn_probability)));
    }

    #[tokio::test]
    async fn recommend_returns_one_recommendation_per_customer() {
        let body = json!([
            { "customer_id": "vip", "age": 45, "gender": "Male", "total_spent": 1000.0,
              "churn_probability": 0.125, "tags": ["vip"] },
            { "customer_id": "at-risk", "age": 25, "gender": "Female", "total_spent": 125.0,
              "churn_probability": 0.875, "tags": "discount", "occupation": "Teacher" }
        ]);
        let (status, bytes) = post_json("/recommend", body).await;
        assert_eq!(status, StatusCode::OK);
        let responses: Vec<RecommendationResponse> = parse(&bytes);
        assert_eq!(responses.len(), 2);
        assert_eq!(responses[0].customer_id.as_deref(), Some("vip"));
        assert_eq!(responses[0].cluster_id, 2);
        assert_eq!(responses[0].recommendations, vec!["Invite to VIP loyalty program"]);
        assert_eq!(responses[1].cluster_id, 0);
        assert_eq!(responses[1].recommendations, vec!["Send a win-back discount"]);
    }

    #[tokio::test]
    async fn empty_batch_returns_empty_array() {
        let (status, bytes) = post_json("/recommend", json!([])).await;
        assert_eq!(status, StatusCode::OK);
        let responses: Vec<RecommendationResponse> = parse(&bytes);
        assert!(responses.is_empty());
    }

    #[tokio::test]
    async fn schema_violations_are_unprocessable() {
        let (status, bytes) =
            post_json("/predict-churn", json!([{ "order_count": "seven" }])).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        let body: ErrorBody = parse(&bytes);
        assert!(!body.detail.is_empty());

        let (status, _) = post_json("/recommend", json!({ "customers": [] })).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn integral_float_counts_are_accepted() {
        let body = json!([{ "customer_id": "a", "order_count": 3.0, "recency": 10.0 }]);
        let (status, bytes) = post_json("/predict-churn", body).await;
        assert_eq!(status, StatusCode::OK);
        let predictions: Vec<ChurnPrediction> = parse(&bytes);
        assert_eq!(predictions.len(), 1);

        let body = json!([{ "customer_id": "a", "order_count": 3.5 }]);
        let (status, _) = post_json("/predict-churn", body).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn malformed_json_is_unprocessable() {
        let (status, _) = send(
            Request::builder()
                .method(Method::POST)
                .uri("/predict-churn")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from("[{"))
                .unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn batches_above_two_megabytes_are_scored() {
        let customers: Vec<Value> = (0..20_000)
            .map(|i| {
                json!({
                    "customer_id": format!("cust-{:05}", i),
                    "total_spent": 1000.0 + i as f64,
                    "order_count": i % 40,
                    "average_order_value": 100.0,
                    "recency": i % 365,
                    "tenure": 725
                })
            })
            .collect();
        let body = Value::Array(customers).to_string();
        assert!(body.len() > 2 * 1024 * 1024);

        let (status, bytes) = send(
            Request::builder()
                .method(Method::POST)
                .uri("/predict-churn")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body))
                .unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let predictions: Vec<ChurnPrediction> = parse(&bytes);
        assert_eq!(predictions.len(), 20_000);
        assert_eq!(predictions[19_999].customer_id.as_deref(), Some("cust-19999"));
    }

    #[tokio::test]
    async fn oversized_bodies_are_payload_too_large() {
        let app = router(Arc::new(fixtures::registry()), "*", 64).unwrap();
        let body: Value = ["a", "b", "c", "d", "e"]
            .iter()
            .map(|id| json!({ "customer_id": id }))
            .collect();
        let response = app
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri("/recommend")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: ErrorBody = parse(&bytes);
        assert!(!body.detail.is_empty());
    }

    #[tokio::test]
    async fn model_failures_are_server_errors() {
        let registry = ModelRegistry::new(
            fixtures::churn_model(),
            fixtures::segment_pipeline(),
            crate::recommend::RecommendationMap::from_json(br#"{"0": "Send a win-back discount"}"#)
                .unwrap(),
        )
        .unwrap();
        let app = router(Arc::new(registry), "*", DEFAULT_MAX_BODY_BYTES).unwrap();
        let response = app
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri("/recommend")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(json!([{ "customer_id": "nobody" }]).to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: ErrorBody = parse(&bytes);
        assert_eq!(body.detail, "Customer 0: No recommendation for cluster 1");
    }

    #[tokio::test]
    async fn health_reports_loaded_models() {
        let (status, bytes) = send(
            Request::builder()
                .uri("/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let health: HealthReport = parse(&bytes);
        assert_eq!(health.status, "ok");
        assert_eq!(health.clusters, 3);
        assert_eq!(health.churn_features, 5);
    }

    #[tokio::test]
    async fn cors_allows_the_crm_backend() {
        let (status, _) = send(
            Request::builder()
                .method(Method::OPTIONS)
                .uri("/predict-churn")
                .header(header::ORIGIN, "http://localhost:8000")
                .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let response = app()
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri("/predict-churn")
                    .header(header::ORIGIN, "http://localhost:8000")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from("[]"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(
            response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
            "http://localhost:8000"
        );
    }

    #[test]
    fn rejects_unparsable_cors_origin() {
        assert!(router(
            Arc::new(fixtures::registry()),
            "http://bad\norigin",
            DEFAULT_MAX_BODY_BYTES
        )
        .is_err());
    }
}
