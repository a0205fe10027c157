use axum::{
    extract::DefaultBodyLimit,
    http::HeaderValue,
    middleware,
    routing::{delete, get, patch, post, put},
    Router,
};
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};

use crate::config::{AppConfig, SecurityConfig};
use crate::handlers::{protected, public};
use crate::middleware::jwt_auth_middleware;
use crate::state::AppState;

pub fn app(state: AppState, config: &AppConfig) -> Router {
    let router = Router::new()
        // Public
        .route("/", get(public::root))
        .route("/health", get(public::health))
        .route("/auth/login", post(public::login_post))
        // Protected API
        .merge(protected_routes(state.clone()))
        // Global middleware
        .layer(DefaultBodyLimit::max(config.api.max_request_size_bytes))
        .layer(cors_layer(&config.security));

    let router = if config.api.enable_request_logging {
        router.layer(TraceLayer::new_for_http())
    } else {
        router
    };

    router.with_state(state)
}

fn protected_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route(
            "/api/protocols",
            post(protected::protocol_create).get(protected::protocol_list),
        )
        .route(
            "/api/protocols/:id",
            get(protected::protocol_get).delete(protected::protocol_delete),
        )
        .route("/api/protocols/export", get(protected::protocol_export))
        .route("/api/protocols/:id/document", put(protected::protocol_replace_document))
        .route("/api/counters", get(protected::counters_get))
        .route("/api/dashboard", get(protected::dashboard_get))
        .route("/auth/change-password", post(protected::change_password_post))
        .route("/api/users", get(protected::users_list))
        .route("/api/users/:id/active", patch(protected::user_set_active))
        .route("/api/users/:id", delete(protected::user_delete))
        .route_layer(middleware::from_fn_with_state(state, jwt_auth_middleware))
}

fn cors_layer(security: &SecurityConfig) -> CorsLayer {
    if !security.enable_cors {
        return CorsLayer::new();
    }
    if security.cors_origins.is_empty() || security.cors_origins.iter().any(|o| o == "*") {
        return CorsLayer::permissive();
    }

    let origins: Vec<HeaderValue> = security
        .cors_origins
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(Any)
        .allow_headers(Any)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{generate_jwt, Claims};
    use crate::database::DatabaseManager;
    use crate::storage::LocalStorage;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use serde_json::Value;
    use std::sync::Arc;
    use tower::ServiceExt;

    fn config() -> AppConfig {
        let mut config = AppConfig::from_env();
        config.security.jwt_secret = "router-test-secret".to_string();
        config.database.url = Some("postgres://registry@127.0.0.1:1/unused".to_string());
        config.database.connection_timeout = 1;
        config
    }

    fn test_app(storage_root: &std::path::Path) -> (Router, AppConfig) {
        let config = config();
        let pool = DatabaseManager::connect_lazy(&config.database).unwrap();
        let state = AppState::new(pool, &config, Arc::new(LocalStorage::new(storage_root)));
        (app(state, &config), config)
    }

    fn token(config: &AppConfig, role: &str) -> String {
        let user = crate::auth::tests::user(role);
        generate_jwt(&config.security, &Claims::new(&user, 1)).unwrap()
    }

    async fn json_body(response: axum::response::Response) -> Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn root_describes_the_service() {
        let dir = tempfile::tempdir().unwrap();
        let (app, _) = test_app(dir.path());

        let response = app
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = json_body(response).await;
        assert_eq!(body["success"], Value::Bool(true));
        assert_eq!(body["data"]["name"], "Protocol Registry");
    }

    #[tokio::test]
    async fn api_requires_a_token() {
        let dir = tempfile::tempdir().unwrap();
        let (app, _) = test_app(dir.path());

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/protocols")
                    .header("content-type", "application/json")
                    .body(Body::from("{}"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let body = json_body(response).await;
        assert_eq!(body["code"], "UNAUTHORIZED");
    }

    #[tokio::test]
    async fn invalid_filing_is_rejected_before_touching_the_database() {
        let dir = tempfile::tempdir().unwrap();
        let (app, config) = test_app(dir.path());

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/protocols")
                    .header("content-type", "application/json")
                    .header("authorization", format!("Bearer {}", token(&config, "operator")))
                    .body(Body::from(r#"{"type": "E"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = json_body(response).await;
        assert_eq!(body["code"], "VALIDATION_ERROR");
        assert_eq!(body["retryable"], Value::Bool(false));
    }

    #[tokio::test]
    async fn user_administration_is_reserved_to_admins() {
        let dir = tempfile::tempdir().unwrap();
        let (app, config) = test_app(dir.path());

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/users")
                    .header("authorization", format!("Bearer {}", token(&config, "operator")))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn admins_cannot_disable_themselves() {
        let dir = tempfile::tempdir().unwrap();
        let (app, config) = test_app(dir.path());
        let own_id = crate::auth::tests::user("admin").id;

        let response = app
            .oneshot(
                Request::builder()
                    .method("PATCH")
                    .uri(format!("/api/users/{}/active", own_id))
                    .header("content-type", "application/json")
                    .header("authorization", format!("Bearer {}", token(&config, "admin")))
                    .body(Body::from(r#"{"active": false}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn password_change_requires_a_token() {
        let dir = tempfile::tempdir().unwrap();
        let (app, _) = test_app(dir.path());

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/auth/change-password")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"current_password": "a", "new_password": "b"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn deletion_is_reserved_to_admins() {
        let dir = tempfile::tempdir().unwrap();
        let (app, config) = test_app(dir.path());

        let response = app
            .oneshot(
                Request::builder()
                    .method("DELETE")
                    .uri("/api/protocols/1")
                    .header("authorization", format!("Bearer {}", token(&config, "operator")))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }
}
