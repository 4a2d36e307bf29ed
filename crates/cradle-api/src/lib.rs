//! REST surface: accounts, children, per-category logs and the one-shot feed.

pub mod admin;
pub mod auth;
pub mod children;
pub mod error;
pub mod logs;
pub mod middleware;

use axum::{
    Router,
    middleware::from_fn_with_state,
    routing::{get, patch, post},
};

use crate::auth::AppState;

/// Public, protected and admin routes with their state applied.
pub fn routes(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .with_state(state.clone());

    let protected_routes = Router::new()
        .route("/children", post(children::create_child).get(children::list_children))
        .route(
            "/children/{child_id}/logs/{category}",
            get(logs::list_logs).post(logs::add_log),
        )
        .route(
            "/children/{child_id}/logs/{category}/{entry_id}",
            patch(logs::update_log).delete(logs::delete_log),
        )
        .route("/children/{child_id}/feed", get(logs::get_feed))
        .layer(from_fn_with_state(state.clone(), middleware::require_auth))
        .with_state(state.clone());

    let admin_routes = Router::new()
        .route("/admin/test-store", get(admin::test_store))
        .layer(from_fn_with_state(state.clone(), middleware::require_auth))
        .layer(from_fn_with_state(state.clone(), middleware::require_service_account))
        .with_state(state);

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .merge(admin_routes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode, header};
    use serde_json::{Value, json};
    use tower::ServiceExt;

    use cradle_core::children::ChildRegistry;
    use cradle_core::logs::{LogBook, TimestampPolicies};
    use cradle_db::Database;
    use cradle_store::{DocumentStore, SqliteStore};

    use crate::admin::ServiceAccount;
    use crate::auth::{AppStateInner, PasswordIdentityProvider};

    fn state() -> AppState {
        state_with(Some(ServiceAccount {
            project_id: Some("cradle-dev".into()),
            client_email: None,
            private_key: "k-123".into(),
        }))
    }

    fn state_with(service_account: Option<ServiceAccount>) -> AppState {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let store: Arc<dyn DocumentStore> = Arc::new(SqliteStore::new(db.clone()));
        Arc::new(AppStateInner {
            identity: PasswordIdentityProvider::new(db),
            logs: LogBook::new(store.clone(), &TimestampPolicies::default()),
            children: ChildRegistry::new(store.clone()),
            store,
            jwt_secret: "test-secret".into(),
            service_account,
        })
    }

    async fn call(app: &Router, method: &str, uri: &str, token: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
        let mut req = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            req = req.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let req = match body {
            Some(body) => req
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => req.body(Body::empty()).unwrap(),
        };

        let resp = app.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    async fn register(app: &Router, email: &str) -> String {
        let (status, body) = call(
            app,
            "POST",
            "/auth/register",
            None,
            Some(json!({"name": "Sam", "email": email, "password": "correct horse"})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        body["token"].as_str().unwrap().to_string()
    }

    async fn create_child(app: &Router, token: &str) -> String {
        let (status, body) = call(app, "POST", "/children", Some(token), Some(json!({"name": "Alva"}))).await;
        assert_eq!(status, StatusCode::CREATED);
        body["id"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn register_login_and_duplicate() {
        let app = routes(state());
        register(&app, "sam@example.com").await;

        let (status, body) = call(
            &app,
            "POST",
            "/auth/login",
            None,
            Some(json!({"email": "sam@example.com", "password": "correct horse"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["name"], "Sam");

        let (status, body) = call(
            &app,
            "POST",
            "/auth/register",
            None,
            Some(json!({"name": "Sam", "email": "sam@example.com", "password": "correct horse"})),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["code"], "CONFLICT");

        let (status, _) = call(
            &app,
            "POST",
            "/auth/login",
            None,
            Some(json!({"email": "sam@example.com", "password": "nope nope"})),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn protected_routes_require_a_token() {
        let app = routes(state());
        let (status, _) = call(&app, "GET", "/children", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) = call(&app, "GET", "/children", Some("garbage"), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn log_lifecycle_and_feed() {
        let app = routes(state());
        let token = register(&app, "sam@example.com").await;
        let child = create_child(&app, &token).await;
        let logs = format!("/children/{child}/logs/bowelMovements");

        let (status, body) = call(
            &app,
            "POST",
            &logs,
            Some(&token),
            Some(json!({"movementType": "solid", "timeOfDay": "morning", "timestamp": "2026-10-15T07:00:00.000Z"})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let entry = body["id"].as_str().unwrap().to_string();

        let (status, _) = call(
            &app,
            "PATCH",
            &format!("{logs}/{entry}"),
            Some(&token),
            Some(json!({"timeOfDay": "evening"})),
        )
        .await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (status, body) = call(&app, "GET", &logs, Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body[0]["movementType"], "solid");
        assert_eq!(body[0]["timeOfDay"], "evening");
        assert_eq!(body[0]["timestamp"], "2026-10-15T07:00:00.000Z");

        let (status, body) = call(&app, "GET", &format!("/children/{child}/feed"), Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.as_array().unwrap().len(), 1);
        assert_eq!(body[0]["category"], "BowelMovement");

        for _ in 0..2 {
            let (status, _) = call(&app, "DELETE", &format!("{logs}/{entry}"), Some(&token), None).await;
            assert_eq!(status, StatusCode::NO_CONTENT);
        }
        let (_, body) = call(&app, "GET", &logs, Some(&token), None).await;
        assert_eq!(body, json!([]));
    }

    #[tokio::test]
    async fn rejects_bad_bodies_and_unknown_categories() {
        let app = routes(state());
        let token = register(&app, "sam@example.com").await;
        let child = create_child(&app, &token).await;

        let (status, _) = call(
            &app,
            "POST",
            &format!("/children/{child}/logs/sleep"),
            Some(&token),
            Some(json!({"fromTime": "20:00"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = call(&app, "GET", &format!("/children/{child}/logs/naps"), Some(&token), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn other_users_children_are_hidden() {
        let app = routes(state());
        let owner = register(&app, "owner@example.com").await;
        let stranger = register(&app, "stranger@example.com").await;
        let child = create_child(&app, &owner).await;

        let (status, _) = call(&app, "GET", &format!("/children/{child}/feed"), Some(&stranger), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (_, body) = call(&app, "GET", "/children", Some(&stranger), None).await;
        assert_eq!(body, json!([]));
    }

    #[tokio::test]
    async fn test_store_takes_a_user_token() {
        let app = routes(state());
        let token = register(&app, "sam@example.com").await;

        let (status, _) = call(&app, "GET", "/admin/test-store", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        // The credential's key is not a way in.
        let req = Request::builder()
            .uri("/admin/test-store")
            .header("x-service-key", "k-123")
            .header(header::AUTHORIZATION, "Bearer k-123")
            .body(Body::empty())
            .unwrap();
        let resp = app.clone().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

        let (status, body) = call(&app, "GET", "/admin/test-store", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"success": true, "data": []}));
    }

    #[tokio::test]
    async fn test_store_is_absent_without_a_credential_file() {
        let app = routes(state_with(None));
        let token = register(&app, "sam@example.com").await;

        let (status, _) = call(&app, "GET", "/admin/test-store", Some(&token), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn unknown_log_fields_come_back_from_the_list() {
        let app = routes(state());
        let token = register(&app, "sam@example.com").await;
        let child = create_child(&app, &token).await;
        let logs = format!("/children/{child}/logs/breastfeeding");

        let (status, body) = call(
            &app,
            "POST",
            &logs,
            Some(&token),
            Some(json!({"leftMinutes": 10, "notes": "fussy", "timestamp": "2026-10-15T07:00:00.000Z"})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let entry = body["id"].as_str().unwrap().to_string();

        let (status, _) = call(
            &app,
            "PATCH",
            &format!("{logs}/{entry}"),
            Some(&token),
            Some(json!({"rightMinutes": 4})),
        )
        .await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (_, body) = call(&app, "GET", &logs, Some(&token), None).await;
        assert_eq!(
            body,
            json!([{
                "id": entry,
                "timestamp": "2026-10-15T07:00:00.000Z",
                "leftMinutes": 10,
                "rightMinutes": 4,
                "notes": "fussy"
            }])
        );
    }
}
