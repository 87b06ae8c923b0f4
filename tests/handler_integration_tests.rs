mod common;

use axum::http::{Method, StatusCode};
use common::{TestApp, TestUser, test_app};
use serde_json::{Value, json};
use uuid::Uuid;

// --- Helpers ---

fn id_of(value: &Value) -> &str {
    value["id"].as_str().expect("response should carry an id")
}

/// Seeker posts a gig and helper accepts it. Returns the accepted gig.
async fn accepted_gig(app: &TestApp, seeker: &TestUser, helper: &TestUser) -> Value {
    let gig = app.create_gig(seeker, json!({})).await;
    let (status, accepted) = app
        .call(
            Method::POST,
            &format!("/api/gigs/{}/accept", id_of(&gig)),
            Some(&helper.access),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK, "accept: {accepted}");
    accepted
}

// --- Users ---

#[tokio::test]
async fn test_profile_update_marks_profile_setup_and_nearby_search() {
    let app = test_app();
    let somchai = app.signup("somchai").await;
    let mali = app.signup("mali").await;

    let (status, me) = app.get("/api/users/me", Some(&somchai.access)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["full_name"], "Incomplete Profile");
    assert_eq!(me["is_profile_setup"], false);
    assert!(me.get("hashed_password").is_none());

    let (status, updated) = app
        .put(
            "/api/users/me",
            Some(&somchai.access),
            json!({
                "first_name": "Somchai",
                "last_name": "Jaidee",
                "phone_number": "0812345678",
                "address": {
                    "address_line": "99 Silom Road",
                    "district": "Bang Rak",
                    "province": "Bangkok",
                    "latitude": 13.7290,
                    "longitude": 100.5340
                }
            }),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{updated}");
    assert_eq!(updated["full_name"], "Somchai Jaidee");
    assert_eq!(updated["is_profile_setup"], true);
    assert_eq!(updated["address"]["district"], "Bang Rak");

    let (status, nearby) = app
        .get(
            "/api/users/nearby?latitude=13.7563&longitude=100.5018&radius=10",
            Some(&mali.access),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let nearby = nearby.as_array().unwrap();
    assert_eq!(nearby.len(), 1);
    assert_eq!(nearby[0]["user"]["id"], somchai.id.to_string());
    assert!(nearby[0]["distance_km"].as_f64().unwrap() < 10.0);

    // Unavailable users drop out of the default search.
    let (status, _) = app
        .put(
            "/api/users/me/availability",
            Some(&somchai.access),
            json!({ "is_available": false }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let (_, nearby) = app
        .get(
            "/api/users/nearby?latitude=13.7563&longitude=100.5018&radius=10",
            Some(&mali.access),
        )
        .await;
    assert!(nearby.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_profile_validation_and_public_summary() {
    let app = test_app();
    let user = app.signup("validate").await;

    let (status, _) = app
        .put(
            "/api/users/me",
            Some(&user.access),
            json!({ "phone_number": "12-34" }),
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (status, _) = app
        .get(
            "/api/users/nearby?latitude=13.7&longitude=100.5&radius=80",
            Some(&user.access),
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (status, summary) = app.get(&format!("/api/users/{}", user.id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(summary["reputation_score"], 5.0);
    assert!(summary.get("email").is_none());

    let (status, _) = app
        .get(&format!("/api/users/{}", Uuid::new_v4()), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

// --- Gigs ---

#[tokio::test]
async fn test_create_gig_validation() {
    let app = test_app();
    let seeker = app.signup("seeker").await;

    let (status, _) = app
        .post(
            "/api/gigs",
            None,
            json!({ "title": "Anything" }),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = app
        .post(
            "/api/gigs",
            Some(&seeker.access),
            json!({
                "title": "Help",
                "description": "short",
                "duration_hours": 30,
                "budget": 100.0,
                "address_text": "Silom, Bangkok"
            }),
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY, "{body}");

    let gig = app.create_gig(&seeker, json!({ "title": "  Walk my dog  " })).await;
    assert_eq!(gig["title"], "Walk my dog");
    assert_eq!(gig["status"], "pending");
    assert_eq!(gig["seeker_id"], seeker.id.to_string());
    assert!(gig["helper_id"].is_null());
}

#[tokio::test]
async fn test_gig_listing_and_geo_search() {
    let app = test_app();
    let seeker = app.signup("poster").await;

    app.create_gig(&seeker, json!({ "budget": 300.0 })).await;
    // Chiang Mai, roughly 580 km from Bangkok.
    app.create_gig(
        &seeker,
        json!({ "latitude": 18.7883, "longitude": 98.9853, "address_text": "Nimman, Chiang Mai" }),
    )
    .await;

    let (status, listing) = app.get("/api/gigs?limit=1", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listing["total_count"], 2);
    assert_eq!(listing["gigs"].as_array().unwrap().len(), 1);
    assert_eq!(listing["has_more"], true);

    let (status, nearby) = app
        .get(
            "/api/gigs/search?latitude=13.75&longitude=100.50&radius_km=20",
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(nearby["total_count"], 1);
    assert!(nearby["gigs"][0]["distance_km"].as_f64().unwrap() < 20.0);

    let (_, cheap) = app.get("/api/gigs/search?max_budget=400", None).await;
    assert_eq!(cheap["total_count"], 1);
    assert_eq!(cheap["gigs"][0]["budget"], 300.0);

    // A center needs both coordinates.
    let (status, _) = app.get("/api/gigs/search?latitude=13.75", None).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_gig_update_and_delete_are_seeker_only() {
    let app = test_app();
    let seeker = app.signup("owner").await;
    let stranger = app.signup("stranger").await;
    let gig = app.create_gig(&seeker, json!({})).await;
    let uri = format!("/api/gigs/{}", id_of(&gig));

    let (status, _) = app
        .put(&uri, Some(&stranger.access), json!({ "budget": 1.0 }))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, updated) = app
        .put(&uri, Some(&seeker.access), json!({ "budget": 750.0 }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["budget"], 750.0);
    assert_eq!(updated["title"], gig["title"]);

    let (status, _) = app.delete(&uri, Some(&stranger.access)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = app.delete(&uri, Some(&seeker.access)).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = app.get(&uri, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_accept_gig_rules_and_chat_room_creation() {
    let app = test_app();
    let seeker = app.signup("needs-help").await;
    let helper = app.signup("helper").await;
    let late = app.signup("late").await;

    let gig = app.create_gig(&seeker, json!({})).await;
    let accept_uri = format!("/api/gigs/{}/accept", id_of(&gig));

    let (status, _) = app
        .call(Method::POST, &accept_uri, Some(&seeker.access), None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, accepted) = app
        .call(Method::POST, &accept_uri, Some(&helper.access), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(accepted["status"], "accepted");
    assert_eq!(accepted["helper_id"], helper.id.to_string());

    let (status, _) = app
        .call(Method::POST, &accept_uri, Some(&late.access), None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Accepting opens the seeker/helper room.
    let (status, rooms) = app.get("/api/chat/rooms", Some(&helper.access)).await;
    assert_eq!(status, StatusCode::OK);
    let rooms = rooms.as_array().unwrap();
    assert_eq!(rooms.len(), 1);
    assert_eq!(rooms[0]["gig_id"], gig["id"]);
    assert_eq!(rooms[0]["participants"].as_array().unwrap().len(), 2);

    let (_, as_helper) = app
        .get("/api/gigs/my-gigs?as_seeker=false", Some(&helper.access))
        .await;
    assert_eq!(as_helper["total_count"], 1);
    let (_, as_seeker) = app.get("/api/gigs/my-gigs", Some(&helper.access)).await;
    assert_eq!(as_seeker["total_count"], 0);
}

#[tokio::test]
async fn test_accept_reuses_room_opened_before_acceptance() {
    let app = test_app();
    let seeker = app.signup("early-seeker").await;
    let helper = app.signup("early-helper").await;
    let gig = app.create_gig(&seeker, json!({})).await;

    let (status, early) = app
        .call(
            Method::POST,
            &format!("/api/chat/gigs/{}/room", id_of(&gig)),
            Some(&helper.access),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = app
        .call(
            Method::POST,
            &format!("/api/gigs/{}/accept", id_of(&gig)),
            Some(&helper.access),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (_, rooms) = app.get("/api/chat/rooms", Some(&seeker.access)).await;
    let rooms = rooms.as_array().unwrap();
    assert_eq!(rooms.len(), 1);
    assert_eq!(rooms[0]["id"], early["id"]);
}

#[tokio::test]
async fn test_gig_status_transitions() {
    let app = test_app();
    let seeker = app.signup("status-seeker").await;
    let helper = app.signup("status-helper").await;
    let outsider = app.signup("status-outsider").await;
    let gig = accepted_gig(&app, &seeker, &helper).await;
    let uri = format!("/api/gigs/{}/status", id_of(&gig));

    let (status, _) = app
        .put(&uri, Some(&outsider.access), json!({ "status": "in_progress" }))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = app
        .put(&uri, Some(&seeker.access), json!({ "status": "pending" }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, started) = app
        .put(&uri, Some(&helper.access), json!({ "status": "in_progress" }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(started["status"], "in_progress");

    let (status, done) = app
        .put(&uri, Some(&seeker.access), json!({ "status": "completed" }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(done["completed_at"].is_string());

    // Terminal states never move.
    let (status, _) = app
        .put(&uri, Some(&seeker.access), json!({ "status": "cancelled" }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

// --- Chat ---

#[tokio::test]
async fn test_chat_messages_and_read_tracking() {
    let app = test_app();
    let seeker = app.signup("chat-seeker").await;
    let helper = app.signup("chat-helper").await;
    let outsider = app.signup("chat-outsider").await;
    accepted_gig(&app, &seeker, &helper).await;

    let (_, rooms) = app.get("/api/chat/rooms", Some(&seeker.access)).await;
    let room_id = rooms[0]["id"].as_str().unwrap().to_string();
    let messages_uri = format!("/api/chat/rooms/{room_id}/messages");

    for content in ["Hi, are you on your way?", "The gate code is 1234"] {
        let (status, message) = app
            .post(&messages_uri, Some(&seeker.access), json!({ "content": content }))
            .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(message["message_type"], "text");
        assert_eq!(message["sender_id"], seeker.id.to_string());
    }

    let (status, _) = app
        .post(&messages_uri, Some(&seeker.access), json!({ "content": "   " }))
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (status, _) = app
        .post(&messages_uri, Some(&outsider.access), json!({ "content": "hello" }))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, rooms) = app.get("/api/chat/rooms", Some(&helper.access)).await;
    assert_eq!(rooms[0]["unread_count"], 2);
    assert_eq!(rooms[0]["last_message"]["content"], "The gate code is 1234");

    let (status, history) = app
        .get(&format!("{messages_uri}?page=1&per_page=1"), Some(&helper.access))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(history["total_count"], 2);
    assert_eq!(history["has_next"], true);
    assert_eq!(history["has_prev"], false);

    let (status, body) = app
        .call(
            Method::PUT,
            &format!("/api/chat/rooms/{room_id}/read"),
            Some(&helper.access),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Messages marked as read");

    let (_, detail) = app
        .get(&format!("/api/chat/rooms/{room_id}"), Some(&helper.access))
        .await;
    assert_eq!(detail["unread_count"], 0);
    assert_eq!(detail["recent_messages"].as_array().unwrap().len(), 2);

    let (status, _) = app
        .get(&format!("/api/chat/rooms/{room_id}"), Some(&outsider.access))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_chat_pages_beyond_range_are_rejected() {
    let app = test_app();
    let seeker = app.signup("paging-seeker").await;
    let helper = app.signup("paging-helper").await;
    accepted_gig(&app, &seeker, &helper).await;

    let (_, rooms) = app.get("/api/chat/rooms", Some(&seeker.access)).await;
    let room_id = rooms[0]["id"].as_str().unwrap().to_string();

    let huge = i64::MAX;
    let (status, _) = app
        .get(&format!("/api/chat/rooms?page={huge}"), Some(&seeker.access))
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    let (status, _) = app
        .get(
            &format!("/api/chat/rooms/{room_id}/messages?page={huge}&per_page=100"),
            Some(&seeker.access),
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    // The largest accepted page is simply empty.
    let (status, history) = app
        .get(
            &format!("/api/chat/rooms/{room_id}/messages?page=1000000&per_page=100"),
            Some(&seeker.access),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(history["messages"].as_array().unwrap().is_empty());
    assert_eq!(history["has_next"], false);
    assert_eq!(history["has_prev"], true);
}

#[tokio::test]
async fn test_open_gig_room_and_deactivate() {
    let app = test_app();
    let seeker = app.signup("room-seeker").await;
    let asker = app.signup("room-asker").await;
    let gig = app.create_gig(&seeker, json!({})).await;
    let uri = format!("/api/chat/gigs/{}/room", id_of(&gig));

    let (status, _) = app.call(Method::POST, &uri, Some(&seeker.access), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, room) = app.call(Method::POST, &uri, Some(&asker.access), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(room["gig_title"], gig["title"]);

    // Opening again returns the same room.
    let (_, again) = app.call(Method::POST, &uri, Some(&asker.access), None).await;
    assert_eq!(again["id"], room["id"]);

    let room_uri = format!("/api/chat/rooms/{}", id_of(&room));
    let (status, _) = app.delete(&room_uri, Some(&asker.access)).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = app
        .post(
            &format!("{room_uri}/messages"),
            Some(&asker.access),
            json!({ "content": "still there?" }),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

// --- Escrow & Reviews ---

#[tokio::test]
async fn test_escrow_release_completes_gig_and_unlocks_reviews() {
    let app = test_app();
    let seeker = app.signup("payer").await;
    let helper = app.signup("payee").await;
    let gig = accepted_gig(&app, &seeker, &helper).await;
    let gig_id = id_of(&gig).to_string();

    let (status, _) = app
        .post(
            "/api/transactions/escrow",
            Some(&helper.access),
            json!({ "gig_id": gig_id }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, tx) = app
        .post(
            "/api/transactions/escrow",
            Some(&seeker.access),
            json!({ "gig_id": gig_id }),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{tx}");
    assert_eq!(tx["status"], "pending");
    assert_eq!(tx["amount"], 500.0);
    assert_eq!(tx["service_fee"], 25.0);
    assert_eq!(tx["net_amount"], 475.0);
    assert_eq!(tx["payment_method"], "mock");
    assert!(tx["transaction_ref"].as_str().unwrap().starts_with("MOCK_"));

    let (status, _) = app
        .post(
            "/api/transactions/escrow",
            Some(&seeker.access),
            json!({ "gig_id": gig_id }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Reviews stay locked until the gig completes.
    let (_, can) = app
        .get(
            &format!("/api/reviews/can-review/{gig_id}/{}", helper.id),
            Some(&seeker.access),
        )
        .await;
    assert_eq!(can["can_review"], false);

    let tx_id = id_of(&tx).to_string();
    let (status, released) = app
        .call(
            Method::PUT,
            &format!("/api/transactions/{tx_id}/release"),
            Some(&seeker.access),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(released["status"], "completed");

    let (_, completed) = app.get(&format!("/api/gigs/{gig_id}"), None).await;
    assert_eq!(completed["status"], "completed");

    let (_, summary) = app
        .get("/api/transactions/summary/my", Some(&helper.access))
        .await;
    assert_eq!(summary["total_received"], 475.0);
    assert_eq!(summary["completed_transactions"], 1);

    let (status, review) = app
        .post(
            "/api/reviews",
            Some(&seeker.access),
            json!({
                "gig_id": gig_id,
                "reviewee_id": helper.id,
                "rating": 4,
                "comment": "On time and careful"
            }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{review}");
    assert_eq!(review["reviewee_id"], helper.id.to_string());

    let (status, _) = app
        .post(
            "/api/reviews",
            Some(&seeker.access),
            json!({
                "gig_id": gig_id,
                "reviewee_id": helper.id,
                "rating": 5,
                "comment": "Again"
            }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, profile) = app.get(&format!("/api/users/{}", helper.id), None).await;
    assert_eq!(profile["reputation_score"], 4.0);
    assert_eq!(profile["total_reviews"], 1);

    let (status, summary) = app
        .get(&format!("/api/reviews/user/{}", helper.id), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(summary["average_rating"], 4.0);
    assert_eq!(summary["rating_distribution"]["4"], 1);
    assert_eq!(summary["rating_distribution"]["1"], 0);

    // Deleting the only review restores the default reputation.
    let (status, _) = app
        .delete(&format!("/api/reviews/{}", id_of(&review)), Some(&seeker.access))
        .await;
    assert_eq!(status, StatusCode::OK);
    let (_, profile) = app.get(&format!("/api/users/{}", helper.id), None).await;
    assert_eq!(profile["reputation_score"], 5.0);
    assert_eq!(profile["total_reviews"], 0);
}

#[tokio::test]
async fn test_release_rejected_after_gig_cancelled() {
    let app = test_app();
    let seeker = app.signup("cancel-payer").await;
    let helper = app.signup("cancel-payee").await;
    let gig = accepted_gig(&app, &seeker, &helper).await;
    let gig_id = id_of(&gig).to_string();

    let (status, tx) = app
        .post(
            "/api/transactions/escrow",
            Some(&seeker.access),
            json!({ "gig_id": gig_id }),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{tx}");

    let (status, _) = app
        .put(
            &format!("/api/gigs/{gig_id}/status"),
            Some(&seeker.access),
            json!({ "status": "cancelled" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let tx_uri = format!("/api/transactions/{}", id_of(&tx));
    let (status, body) = app
        .call(Method::PUT, &format!("{tx_uri}/release"), Some(&seeker.access), None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["detail"], "Cannot release payment for a cancelled gig");

    let (status, _) = app
        .call(
            Method::PUT,
            &format!("{tx_uri}/status?new_status=completed"),
            Some(&helper.access),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, still) = app.get(&format!("/api/gigs/{gig_id}"), None).await;
    assert_eq!(still["status"], "cancelled");
    let (_, pending) = app.get(&tx_uri, Some(&seeker.access)).await;
    assert_eq!(pending["status"], "pending");

    // The escrow can still be refunded.
    let (status, cancelled) = app
        .call(Method::PUT, &format!("{tx_uri}/cancel"), Some(&seeker.access), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cancelled["status"], "cancelled");
}

#[tokio::test]
async fn test_review_update_and_listings() {
    let app = test_app();
    let seeker = app.signup("rate-seeker").await;
    let helper = app.signup("rate-helper").await;
    let gig = accepted_gig(&app, &seeker, &helper).await;
    let gig_id = id_of(&gig).to_string();

    let (status, _) = app
        .put(
            &format!("/api/gigs/{gig_id}/status"),
            Some(&seeker.access),
            json!({ "status": "completed" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, seeker_review) = app
        .post(
            "/api/reviews",
            Some(&seeker.access),
            json!({
                "gig_id": gig_id,
                "reviewee_id": helper.id,
                "rating": 5,
                "comment": "Carried everything up four floors"
            }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let (status, _) = app
        .post(
            "/api/reviews",
            Some(&helper.access),
            json!({
                "gig_id": gig_id,
                "reviewee_id": seeker.id,
                "rating": 3,
                "comment": "Address was hard to find"
            }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, on_gig) = app.get(&format!("/api/reviews/gig/{gig_id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(on_gig["total_reviews"], 2);
    assert_eq!(on_gig["average_rating"], 4.0);
    assert_eq!(on_gig["gig_title"], "Help moving furniture");

    let (status, written) = app
        .get("/api/reviews/my-reviews", Some(&seeker.access))
        .await;
    assert_eq!(status, StatusCode::OK);
    let written = written.as_array().unwrap();
    assert_eq!(written.len(), 1);
    assert_eq!(written[0]["reviewee_id"], helper.id.to_string());
    assert_eq!(written[0]["gig_title"], "Help moving furniture");

    let review_uri = format!("/api/reviews/{}", id_of(&seeker_review));

    // Only the reviewer may edit.
    let (status, _) = app
        .put(&review_uri, Some(&helper.access), json!({ "rating": 1 }))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = app
        .put(&review_uri, Some(&seeker.access), json!({ "rating": 6 }))
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (status, updated) = app
        .put(
            &review_uri,
            Some(&seeker.access),
            json!({ "rating": 2, "comment": "  Broke a lamp  " }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["rating"], 2);
    assert_eq!(updated["comment"], "Broke a lamp");

    // Editing recomputes the reviewee's reputation.
    let (_, profile) = app.get(&format!("/api/users/{}", helper.id), None).await;
    assert_eq!(profile["reputation_score"], 2.0);
    assert_eq!(profile["total_reviews"], 1);

    let (_, on_gig) = app.get(&format!("/api/reviews/gig/{gig_id}"), None).await;
    assert_eq!(on_gig["average_rating"], 2.5);

    let (status, _) = app.get(&format!("/api/reviews/gig/{}", Uuid::new_v4()), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_transaction_visibility_and_cancel() {
    let app = test_app();
    let seeker = app.signup("cancel-payer").await;
    let helper = app.signup("cancel-payee").await;
    let outsider = app.signup("cancel-outsider").await;
    let gig = accepted_gig(&app, &seeker, &helper).await;

    let (_, tx) = app
        .post(
            "/api/transactions/escrow",
            Some(&seeker.access),
            json!({ "gig_id": gig["id"], "payment_method": "promptpay" }),
        )
        .await;
    let tx_uri = format!("/api/transactions/{}", id_of(&tx));

    let (status, _) = app.get(&tx_uri, Some(&outsider.access)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, seen) = app
        .get(&format!("/api/transactions/gig/{}", id_of(&gig)), Some(&helper.access))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(seen["payment_method"], "promptpay");

    // Only the payer may cancel.
    let cancel_uri = format!("{tx_uri}/cancel");
    let (status, _) = app
        .call(Method::PUT, &cancel_uri, Some(&helper.access), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, cancelled) = app
        .call(Method::PUT, &cancel_uri, Some(&seeker.access), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cancelled["status"], "cancelled");

    // Settled transactions cannot move again.
    let (status, _) = app
        .call(
            Method::PUT,
            &format!("{tx_uri}/status?new_status=completed"),
            Some(&seeker.access),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, history) = app
        .get("/api/transactions/history/my", Some(&seeker.access))
        .await;
    assert_eq!(history["total_count"], 1);
    assert_eq!(history["total_paid"], 0.0);
}

#[tokio::test]
async fn test_calculate_fee_is_public() {
    let app = test_app();

    let (status, fee) = app
        .call(
            Method::POST,
            "/api/transactions/calculate-fee?amount=1234",
            None,
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fee["service_fee"], 61.7);
    assert_eq!(fee["net_amount"], 1172.3);
    assert_eq!(fee["currency"], "THB");

    let (status, _) = app
        .call(
            Method::POST,
            "/api/transactions/calculate-fee?amount=100&fee_rate=1.5",
            None,
            None,
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

// --- Buddies ---

#[tokio::test]
async fn test_buddy_lifecycle() {
    let app = test_app();
    let user = app.signup("buddy-owner").await;
    let friend = app.signup("buddy-friend").await;

    let (status, _) = app
        .post("/api/buddies", Some(&user.access), json!({ "buddy_id": user.id }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .post(
            "/api/buddies",
            Some(&user.access),
            json!({ "buddy_id": Uuid::new_v4() }),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, buddy) = app
        .post(
            "/api/buddies",
            Some(&user.access),
            json!({ "buddy_id": friend.id, "notes": "Great with plants" }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(buddy["email"], friend.email);
    assert_eq!(buddy["notes"], "Great with plants");

    let (status, _) = app
        .post("/api/buddies", Some(&user.access), json!({ "buddy_id": friend.id }))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (_, listing) = app.get("/api/buddies", Some(&user.access)).await;
    assert_eq!(listing["total"], 1);

    let buddy_uri = format!("/api/buddies/{}", friend.id);
    let (status, updated) = app
        .put(&buddy_uri, Some(&user.access), json!({ "notes": "Moved away" }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["notes"], "Moved away");

    app.put(
        "/api/users/me/availability",
        Some(&friend.access),
        json!({ "is_available": false }),
    )
    .await;
    let (_, available) = app.get("/api/buddies/available", Some(&user.access)).await;
    assert_eq!(available["total"], 0);

    let (status, _) = app.delete(&buddy_uri, Some(&user.access)).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = app.get(&buddy_uri, Some(&user.access)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

// --- System ---

#[tokio::test]
async fn test_root_and_health() {
    let app = test_app();

    let (status, banner) = app.get("/", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(banner["message"], "Welcome to HOURZ API");

    let (status, health) = app.get("/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(health, json!({ "status": "ok" }));
}
