use axum::{
    Router,
    extract::{DefaultBodyLimit, FromRef, Request},
    http::{HeaderName, HeaderValue},
    middleware::{self, Next},
    response::Response,
    routing::get,
};
use std::sync::Arc;
use utoipa::{
    Modify, OpenApi,
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
};
use utoipa_swagger_ui::SwaggerUi;

use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::{Level, Span};

// --- Module Structure ---

// Core application services and components.
pub mod auth;
pub mod config;
pub mod error;
pub mod geo;
pub mod handlers;
pub mod hub;
pub mod models;
pub mod repository;
pub mod security;
pub mod storage;

// Module for routing segregation (Public, Authenticated).
pub mod routes;
use auth::AuthUser;
use routes::{authenticated, public};

// --- Public Re-exports ---

pub use config::AppConfig;
pub use error::{AppError, AppResult};
pub use hub::ChatHub;
pub use repository::{InMemoryRepository, PostgresRepository, RepositoryState};
pub use security::RefreshRateLimiter;
pub use storage::{MockStorageService, S3StorageClient, StorageState};

/// Slack on top of the upload cap for multipart framing and other form fields.
const MULTIPART_OVERHEAD_BYTES: usize = 1024 * 1024;

/// ApiDoc
///
/// Aggregates every `#[utoipa::path]` handler and response schema into the OpenAPI
/// document served at `/openapi.json` (outside production).
#[derive(OpenApi)]
#[openapi(
    info(title = "HOURZ API", description = "Local gig marketplace backend"),
    paths(
        handlers::system::root, handlers::system::health,
        handlers::auth::register, handlers::auth::login, handlers::auth::refresh,
        handlers::auth::logout, handlers::auth::logout_all, handlers::auth::list_sessions,
        handlers::users::get_me, handlers::users::update_me, handlers::users::update_availability,
        handlers::users::nearby_users, handlers::users::get_user,
        handlers::gigs::create_gig, handlers::gigs::list_gigs, handlers::gigs::search_gigs,
        handlers::gigs::my_gigs, handlers::gigs::get_gig, handlers::gigs::update_gig,
        handlers::gigs::delete_gig, handlers::gigs::accept_gig, handlers::gigs::update_gig_status,
        handlers::chat::open_gig_room, handlers::chat::list_rooms, handlers::chat::get_room,
        handlers::chat::get_messages, handlers::chat::send_message, handlers::chat::mark_read,
        handlers::chat::deactivate_room, handlers::ws::chat_socket,
        handlers::buddies::add_buddy, handlers::buddies::list_buddies,
        handlers::buddies::list_available_buddies, handlers::buddies::get_buddy,
        handlers::buddies::update_buddy, handlers::buddies::remove_buddy,
        handlers::reviews::create_review, handlers::reviews::user_reviews,
        handlers::reviews::gig_reviews, handlers::reviews::my_reviews,
        handlers::reviews::update_review, handlers::reviews::delete_review,
        handlers::reviews::can_review,
        handlers::transactions::create_escrow, handlers::transactions::release_payment,
        handlers::transactions::cancel_transaction, handlers::transactions::get_transaction,
        handlers::transactions::get_gig_transaction, handlers::transactions::transaction_history,
        handlers::transactions::payment_summary, handlers::transactions::calculate_fee,
        handlers::transactions::update_transaction_status,
        handlers::uploads::upload_profile_image, handlers::uploads::upload_gig_image,
        handlers::uploads::serve_file, handlers::uploads::my_files, handlers::uploads::delete_file,
        handlers::uploads::set_profile_image, handlers::uploads::gig_images
    ),
    components(
        schemas(
            models::UserOut, models::UserSummary, models::Address, models::ProfileUpdate,
            models::Gig, models::GigStatus, models::GigListOut,
            models::ChatRoomDetailOut, models::ChatRoomSummary, models::MessageOut,
            models::MessageType, models::BuddyOut, models::ReviewOut, models::UserReviewSummary,
            models::TransactionOut, models::TransactionStatus, models::PaymentSummary,
            models::FileUploadOut, models::TokenPair, models::UserSession,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "auth", description = "Registration, login and session management"),
        (name = "users", description = "Profiles and nearby helpers"),
        (name = "gigs", description = "Gig postings and lifecycle"),
        (name = "chat", description = "Chat rooms, messages and the realtime socket"),
        (name = "buddies", description = "Favorite users"),
        (name = "reviews", description = "Ratings and reputation"),
        (name = "transactions", description = "Mock escrow payments"),
        (name = "uploads", description = "Image uploads"),
        (name = "system", description = "Banner and health")
    )
)]
pub struct ApiDoc;

/// SecurityAddon
///
/// Registers the `bearer` scheme referenced by `security(("bearer" = []))` on handlers.
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

/// AppState
///
/// The single, thread-safe container holding all application services and configuration,
/// shared across every request.
#[derive(Clone)]
pub struct AppState {
    /// Repository Layer: Postgres in production, in-memory in tests.
    pub repo: RepositoryState,
    /// Storage Layer: S3/MinIO object storage for uploaded images.
    pub storage: StorageState,
    /// Configuration: The loaded, immutable environment configuration.
    pub config: AppConfig,
    /// Live WebSocket fan-out, one broadcast channel per chat room.
    pub chat: Arc<ChatHub>,
    /// Per-IP throttle for POST /api/auth/refresh.
    pub refresh_limiter: Arc<RefreshRateLimiter>,
}

impl AppState {
    /// Wires the runtime-only services (chat hub, refresh limiter) around the injected
    /// repository, storage and config.
    pub fn new(repo: RepositoryState, storage: StorageState, config: AppConfig) -> Self {
        Self {
            repo,
            storage,
            config,
            chat: Arc::new(ChatHub::new()),
            refresh_limiter: Arc::new(RefreshRateLimiter::default()),
        }
    }
}

// --- Axum FromRef Extractor Implementations ---

impl FromRef<AppState> for RepositoryState {
    fn from_ref(app_state: &AppState) -> RepositoryState {
        app_state.repo.clone()
    }
}

impl FromRef<AppState> for StorageState {
    fn from_ref(app_state: &AppState) -> StorageState {
        app_state.storage.clone()
    }
}

impl FromRef<AppState> for AppConfig {
    fn from_ref(app_state: &AppState) -> AppConfig {
        app_state.config.clone()
    }
}

impl FromRef<AppState> for Arc<ChatHub> {
    fn from_ref(app_state: &AppState) -> Arc<ChatHub> {
        app_state.chat.clone()
    }
}

/// auth_middleware
///
/// Enforces authentication for the `authenticated_routes`. Extracting `AuthUser` rejects
/// the request with 401 before the handler runs when the token is missing, invalid,
/// expired or revoked.
async fn auth_middleware(_auth_user: AuthUser, request: Request, next: Next) -> Response {
    next.run(request).await
}

fn cors_layer(config: &AppConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .cors_origins
        .iter()
        .filter_map(|origin| HeaderValue::from_str(origin).ok())
        .collect();

    let cors = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if origins.is_empty() {
        cors.allow_origin(Any)
    } else {
        cors.allow_origin(AllowOrigin::list(origins))
    }
}

/// create_router
///
/// Assembles the routing tree, applies global and scoped middleware, and registers the
/// application state.
pub fn create_router(state: AppState) -> Router {
    // 1. CORS Configuration
    let cors = cors_layer(&state.config);

    // Header name constant for Request Correlation.
    let x_request_id = HeaderName::from_static("x-request-id");

    // 2. API Router Assembly (mounted under /api)
    let api = public::public_routes().merge(
        authenticated::authenticated_routes().route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        )),
    );

    let mut base_router = Router::new()
        .route("/", get(handlers::system::root))
        .route("/health", get(handlers::system::health))
        .nest("/api", api);

    // Documentation: Swagger UI outside production only.
    if state.config.docs_enabled() {
        base_router =
            base_router.merge(SwaggerUi::new("/docs").url("/openapi.json", ApiDoc::openapi()));
    }

    let body_limit = state.config.max_upload_bytes + MULTIPART_OVERHEAD_BYTES;
    let base_router = base_router
        .layer(DefaultBodyLimit::max(body_limit))
        // Apply the Unified State to all routes.
        .with_state(state);

    // 3. Observability and Correlation Layers
    base_router
        .layer(
            ServiceBuilder::new()
                // 3a. Request ID Generation: a UUID for every incoming request.
                .layer(SetRequestIdLayer::new(x_request_id.clone(), MakeRequestUuid))
                // 3b. Request Tracing: one span per request, carrying the request ID.
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(trace_span_logger)
                        .on_response(
                            DefaultOnResponse::new()
                                .level(Level::INFO)
                                .latency_unit(tower_http::LatencyUnit::Millis),
                        ),
                )
                // 3c. Request ID Propagation: echo x-request-id back to the client.
                .layer(PropagateRequestIdLayer::new(x_request_id)),
        )
        // 4. CORS Layer
        .layer(cors)
}

/// trace_span_logger
///
/// Builds the `TraceLayer` span: HTTP method, URI and the `x-request-id` header, so every
/// log line of one request can be correlated.
fn trace_span_logger(request: &axum::http::Request<axum::body::Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown");

    tracing::info_span!(
        "http_request",
        method = ?request.method(),
        uri = ?request.uri(),
        req_id = %request_id,
    )
}
