#![allow(dead_code)]

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Method, Request, StatusCode, header},
};
use hourz_server::{
    AppConfig, AppState, InMemoryRepository, MockStorageService, create_router,
    repository::RepositoryState, storage::StorageState,
};
use serde_json::{Value, json};
use std::sync::Arc;
use tower::util::ServiceExt;
use uuid::Uuid;

pub const PASSWORD: &str = "secret123";

/// TestApp
///
/// The full router backed by the in-memory repository and mock object storage.
pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub repo: Arc<InMemoryRepository>,
    pub storage: MockStorageService,
}

/// TestUser
///
/// A registered, logged-in account.
pub struct TestUser {
    pub id: Uuid,
    pub email: String,
    pub access: String,
    pub refresh: String,
}

pub fn test_app() -> TestApp {
    test_app_with(AppConfig::default(), MockStorageService::new())
}

pub fn test_app_with(config: AppConfig, storage: MockStorageService) -> TestApp {
    let repo = Arc::new(InMemoryRepository::new());
    let state = AppState::new(
        repo.clone() as RepositoryState,
        Arc::new(storage.clone()) as StorageState,
        config,
    );
    TestApp {
        router: create_router(state.clone()),
        state,
        repo,
        storage,
    }
}

pub async fn read_json(response: axum::response::Response) -> (StatusCode, Value) {
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body should be readable");
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
    };
    (status, value)
}

impl TestApp {
    pub async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("router is infallible");
        read_json(response).await
    }

    pub async fn call(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string())),
            None => builder.body(Body::empty()),
        }
        .expect("request should build");
        self.send(request).await
    }

    pub async fn get(&self, uri: &str, token: Option<&str>) -> (StatusCode, Value) {
        self.call(Method::GET, uri, token, None).await
    }

    pub async fn post(&self, uri: &str, token: Option<&str>, body: Value) -> (StatusCode, Value) {
        self.call(Method::POST, uri, token, Some(body)).await
    }

    pub async fn put(&self, uri: &str, token: Option<&str>, body: Value) -> (StatusCode, Value) {
        self.call(Method::PUT, uri, token, Some(body)).await
    }

    pub async fn delete(&self, uri: &str, token: Option<&str>) -> (StatusCode, Value) {
        self.call(Method::DELETE, uri, token, None).await
    }

    pub async fn register(&self, email: &str, password: &str) -> (StatusCode, Value) {
        self.post(
            "/api/auth/register",
            None,
            json!({ "email": email, "password": password }),
        )
        .await
    }

    pub async fn login(&self, email: &str, password: &str) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(Method::POST)
            .uri("/api/auth/login")
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .header(header::USER_AGENT, "hourz-tests")
            .body(Body::from(format!("username={email}&password={password}")))
            .expect("request should build");
        self.send(request).await
    }

    pub async fn refresh(&self, refresh_token: &str) -> (StatusCode, Value) {
        self.call(Method::POST, "/api/auth/refresh", Some(refresh_token), None)
            .await
    }

    /// Registers, logs in and resolves the new account's id.
    pub async fn signup(&self, name: &str) -> TestUser {
        let email = format!("{name}@example.com");
        let (status, _) = self.register(&email, PASSWORD).await;
        assert_eq!(status, StatusCode::CREATED, "register {email}");

        let (status, tokens) = self.login(&email, PASSWORD).await;
        assert_eq!(status, StatusCode::OK, "login {email}");
        let access = tokens["access_token"].as_str().unwrap().to_string();
        let refresh = tokens["refresh_token"].as_str().unwrap().to_string();

        let (_, me) = self.get("/api/users/me", Some(&access)).await;
        TestUser {
            id: me["id"].as_str().unwrap().parse().unwrap(),
            email,
            access,
            refresh,
        }
    }

    /// Posts a valid gig for `seeker` and returns its JSON.
    pub async fn create_gig(&self, seeker: &TestUser, overrides: Value) -> Value {
        let mut body = json!({
            "title": "Help moving furniture",
            "description": "Two sofas and a bed, third floor, no lift.",
            "duration_hours": 3,
            "budget": 500.0,
            "latitude": 13.7563,
            "longitude": 100.5018,
            "address_text": "Silom, Bangkok"
        });
        if let (Some(target), Some(extra)) = (body.as_object_mut(), overrides.as_object()) {
            for (key, value) in extra {
                target.insert(key.clone(), value.clone());
            }
        }
        let (status, gig) = self.post("/api/gigs", Some(&seeker.access), body).await;
        assert_eq!(status, StatusCode::CREATED, "create gig: {gig}");
        gig
    }
}
