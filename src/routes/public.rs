use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, post},
};

/// Public Router Module
///
/// Endpoints reachable without an access token. Mounted under `/api`.
///
/// Anything that needs an identity either lives in `authenticated` or, like refresh and the
/// chat WebSocket, validates its own token inside the handler.
pub fn public_routes() -> Router<AppState> {
    Router::new()
        // --- Auth ---
        // POST /auth/register
        // Email + password sign-up. Returns 201 `{success: true}`.
        .route("/auth/register", post(handlers::auth::register))
        // POST /auth/login
        // OAuth2 password form. Issues an access/refresh pair and records a session.
        .route("/auth/login", post(handlers::auth::login))
        // POST /auth/refresh
        // Rotates the refresh token sent as the bearer credential. Rate limited per IP.
        .route("/auth/refresh", post(handlers::auth::refresh))
        // --- Gigs ---
        // GET /gigs
        // Open gigs, newest first.
        .route("/gigs", get(handlers::gigs::list_gigs))
        // GET /gigs/search
        // Budget, duration, status and radius filters. Distance-ordered with a center point.
        .route("/gigs/search", get(handlers::gigs::search_gigs))
        // GET /gigs/{id}
        .route("/gigs/{id}", get(handlers::gigs::get_gig))
        // --- Users ---
        // GET /users/{id}
        // Public profile summary (no contact details).
        .route("/users/{id}", get(handlers::users::get_user))
        // --- Reviews ---
        // GET /reviews/user/{user_id}
        // Rating summary and recent reviews received by a user.
        .route("/reviews/user/{user_id}", get(handlers::reviews::user_reviews))
        // GET /reviews/gig/{gig_id}
        .route("/reviews/gig/{gig_id}", get(handlers::reviews::gig_reviews))
        // --- Transactions ---
        // POST /transactions/calculate-fee
        // Fee preview; no money moves.
        .route(
            "/transactions/calculate-fee",
            post(handlers::transactions::calculate_fee),
        )
        // --- Uploads ---
        // GET /upload/{file_id}
        // Serves stored image bytes. These URLs are embedded in profiles and gigs.
        .route("/upload/{file_id}", get(handlers::uploads::serve_file))
        // GET /upload/gig-images/{gig_id}
        .route(
            "/upload/gig-images/{gig_id}",
            get(handlers::uploads::gig_images),
        )
        // --- Realtime ---
        // GET /ws/chat/{room_id}?token=...
        // WebSocket upgrade. The token is checked after the upgrade so failures can be
        // reported with application close codes.
        .route("/ws/chat/{room_id}", get(handlers::ws::chat_socket))
}
