use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, post, put},
};

/// Authenticated Router Module
///
/// Every route here sits behind the `auth_middleware` layer applied in `create_router`, so
/// handlers always receive a validated `AuthUser`. Ownership rules (seeker-only edits,
/// participant-only chat, payer-only cancel) are enforced inside the handlers and the
/// repository guards.
///
/// Paths shared with the public router (`/gigs/{id}`, `/upload/{file_id}`) carry only the
/// mutating methods here; axum merges them per method.
pub fn authenticated_routes() -> Router<AppState> {
    Router::<AppState>::new()
        // --- Auth & Sessions ---
        // POST /auth/logout
        // Blacklists the current access token; optionally closes the given refresh session.
        .route("/auth/logout", post(handlers::auth::logout))
        // POST /auth/logout-all
        // Closes every session of the caller.
        .route("/auth/logout-all", post(handlers::auth::logout_all))
        // GET /auth/sessions
        .route("/auth/sessions", get(handlers::auth::list_sessions))
        // --- Users ---
        // GET/PUT /users/me
        // Own profile; PUT is a partial upsert that also maintains the address.
        .route(
            "/users/me",
            get(handlers::users::get_me).put(handlers::users::update_me),
        )
        // PUT /users/me/availability
        .route(
            "/users/me/availability",
            put(handlers::users::update_availability),
        )
        // GET /users/nearby?latitude&longitude&radius
        // PostGIS radius search over user addresses.
        .route("/users/nearby", get(handlers::users::nearby_users))
        // --- Gigs ---
        // POST /gigs
        .route("/gigs", post(handlers::gigs::create_gig))
        // GET /gigs/my-gigs?as_seeker=
        .route("/gigs/my-gigs", get(handlers::gigs::my_gigs))
        // PUT/DELETE /gigs/{id}
        // Seeker-only edits. Delete only while the gig is pending and unassigned.
        .route(
            "/gigs/{id}",
            put(handlers::gigs::update_gig).delete(handlers::gigs::delete_gig),
        )
        // POST /gigs/{id}/accept
        // Assigns the caller as helper and opens the seeker/helper chat room.
        .route("/gigs/{id}/accept", post(handlers::gigs::accept_gig))
        // PUT /gigs/{id}/status
        .route("/gigs/{id}/status", put(handlers::gigs::update_gig_status))
        // --- Chat ---
        // POST /chat/gigs/{gig_id}/room
        // Get-or-create the room between the caller and the gig's seeker.
        .route(
            "/chat/gigs/{gig_id}/room",
            post(handlers::chat::open_gig_room),
        )
        // GET /chat/rooms
        .route("/chat/rooms", get(handlers::chat::list_rooms))
        // GET/DELETE /chat/rooms/{id}
        .route(
            "/chat/rooms/{id}",
            get(handlers::chat::get_room).delete(handlers::chat::deactivate_room),
        )
        // GET/POST /chat/rooms/{id}/messages
        // REST messages are also pushed to live WebSocket listeners.
        .route(
            "/chat/rooms/{id}/messages",
            get(handlers::chat::get_messages).post(handlers::chat::send_message),
        )
        // PUT /chat/rooms/{id}/read
        .route("/chat/rooms/{id}/read", put(handlers::chat::mark_read))
        // --- Buddies ---
        .route(
            "/buddies",
            get(handlers::buddies::list_buddies).post(handlers::buddies::add_buddy),
        )
        .route(
            "/buddies/available",
            get(handlers::buddies::list_available_buddies),
        )
        .route(
            "/buddies/{buddy_id}",
            get(handlers::buddies::get_buddy)
                .put(handlers::buddies::update_buddy)
                .delete(handlers::buddies::remove_buddy),
        )
        // --- Reviews ---
        // POST /reviews
        // Completed gigs only; updates the reviewee's reputation.
        .route("/reviews", post(handlers::reviews::create_review))
        .route("/reviews/my-reviews", get(handlers::reviews::my_reviews))
        .route(
            "/reviews/{id}",
            put(handlers::reviews::update_review).delete(handlers::reviews::delete_review),
        )
        .route(
            "/reviews/can-review/{gig_id}/{reviewee_id}",
            get(handlers::reviews::can_review),
        )
        // --- Transactions (mock escrow) ---
        // POST /transactions/escrow
        // Seeker funds an accepted gig; amount is the gig budget minus the service fee.
        .route(
            "/transactions/escrow",
            post(handlers::transactions::create_escrow),
        )
        .route(
            "/transactions/history/my",
            get(handlers::transactions::transaction_history),
        )
        .route(
            "/transactions/summary/my",
            get(handlers::transactions::payment_summary),
        )
        .route(
            "/transactions/gig/{gig_id}",
            get(handlers::transactions::get_gig_transaction),
        )
        .route(
            "/transactions/{id}",
            get(handlers::transactions::get_transaction),
        )
        // PUT /transactions/{id}/release
        // Completes the transaction and the gig.
        .route(
            "/transactions/{id}/release",
            put(handlers::transactions::release_payment),
        )
        .route(
            "/transactions/{id}/cancel",
            put(handlers::transactions::cancel_transaction),
        )
        .route(
            "/transactions/{id}/status",
            put(handlers::transactions::update_transaction_status),
        )
        // --- Uploads ---
        // POST /upload/profile, /upload/gig
        // Multipart image uploads (jpeg/png/webp, size-capped).
        .route(
            "/upload/profile",
            post(handlers::uploads::upload_profile_image),
        )
        .route("/upload/gig", post(handlers::uploads::upload_gig_image))
        .route(
            "/upload/profile/set",
            put(handlers::uploads::set_profile_image),
        )
        .route("/upload/my-files", get(handlers::uploads::my_files))
        // DELETE /upload/{file_id}
        // Uploader-only soft delete.
        .route(
            "/upload/{file_id}",
            axum::routing::delete(handlers::uploads::delete_file),
        )
}
