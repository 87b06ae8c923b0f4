use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use uuid::Uuid;

use crate::{
    AppState,
    auth::AuthUser,
    error::{AppError, AppResult},
    handlers::{limit_param, offset_param},
    models::{Buddy, BuddyCreate, BuddyListOut, BuddyOut, BuddyUpdate, SkipLimitQuery},
};

const DEFAULT_LIMIT: i64 = 50;
const MAX_LIMIT: i64 = 100;

fn clean_notes(notes: Option<String>) -> Option<String> {
    notes
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty())
}

/// Joins a buddy row with the buddy user's current profile.
async fn buddy_out(state: &AppState, buddy: Buddy) -> AppResult<BuddyOut> {
    let user = state
        .repo
        .get_user(buddy.buddy_id)
        .await?
        .ok_or_else(|| AppError::not_found("Buddy"))?;
    Ok(BuddyOut {
        id: buddy.id,
        buddy_id: buddy.buddy_id,
        full_name: user.full_name(),
        email: user.email,
        is_available: user.is_available,
        reputation_score: user.reputation_score,
        profile_image_url: user.profile_image_url,
        notes: buddy.notes,
        created_at: buddy.created_at,
    })
}

async fn list(
    state: AppState,
    user_id: Uuid,
    query: SkipLimitQuery,
    only_available: bool,
) -> AppResult<Json<BuddyListOut>> {
    let skip = offset_param(query.skip, "skip")?;
    let limit = limit_param(query.limit, DEFAULT_LIMIT, MAX_LIMIT)?;
    let (rows, total) = state
        .repo
        .list_buddies(user_id, only_available, skip, limit)
        .await?;

    let mut buddies = Vec::with_capacity(rows.len());
    for row in rows {
        buddies.push(buddy_out(&state, row).await?);
    }
    Ok(Json(BuddyListOut {
        buddies,
        total,
        skip,
        limit,
    }))
}

/// add_buddy
///
/// [Authenticated Route] Saves another user to the caller's favorites.
#[utoipa::path(
    post,
    path = "/api/buddies",
    request_body = BuddyCreate,
    responses(
        (status = 201, description = "Buddy added", body = BuddyOut),
        (status = 400, description = "Cannot add yourself"),
        (status = 404, description = "User not found"),
        (status = 409, description = "Already a buddy")
    ),
    security(("bearer" = [])),
    tag = "buddies"
)]
pub async fn add_buddy(
    AuthUser { id: user_id, .. }: AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<BuddyCreate>,
) -> AppResult<(StatusCode, Json<BuddyOut>)> {
    if payload.buddy_id == user_id {
        return Err(AppError::BadRequest("Cannot add yourself as a buddy".to_string()));
    }
    if state.repo.get_user(payload.buddy_id).await?.is_none() {
        return Err(AppError::not_found("User"));
    }
    if state.repo.get_buddy(user_id, payload.buddy_id).await?.is_some() {
        return Err(AppError::Conflict("User is already in your buddy list".to_string()));
    }

    let buddy = state
        .repo
        .add_buddy(user_id, payload.buddy_id, clean_notes(payload.notes))
        .await?;
    Ok((StatusCode::CREATED, Json(buddy_out(&state, buddy).await?)))
}

/// list_buddies
///
/// [Authenticated Route] The caller's buddies, newest first.
#[utoipa::path(
    get,
    path = "/api/buddies",
    params(SkipLimitQuery),
    responses((status = 200, description = "Buddies", body = BuddyListOut)),
    security(("bearer" = [])),
    tag = "buddies"
)]
pub async fn list_buddies(
    AuthUser { id, .. }: AuthUser,
    State(state): State<AppState>,
    Query(query): Query<SkipLimitQuery>,
) -> AppResult<Json<BuddyListOut>> {
    list(state, id, query, false).await
}

/// list_available_buddies
///
/// [Authenticated Route] Buddies currently flagged as available.
#[utoipa::path(
    get,
    path = "/api/buddies/available",
    params(SkipLimitQuery),
    responses((status = 200, description = "Available buddies", body = BuddyListOut)),
    security(("bearer" = [])),
    tag = "buddies"
)]
pub async fn list_available_buddies(
    AuthUser { id, .. }: AuthUser,
    State(state): State<AppState>,
    Query(query): Query<SkipLimitQuery>,
) -> AppResult<Json<BuddyListOut>> {
    list(state, id, query, true).await
}

/// get_buddy
#[utoipa::path(
    get,
    path = "/api/buddies/{buddy_id}",
    params(("buddy_id" = Uuid, Path, description = "The buddy's user id")),
    responses(
        (status = 200, description = "Buddy", body = BuddyOut),
        (status = 404, description = "Not in the buddy list")
    ),
    security(("bearer" = [])),
    tag = "buddies"
)]
pub async fn get_buddy(
    AuthUser { id, .. }: AuthUser,
    State(state): State<AppState>,
    Path(buddy_id): Path<Uuid>,
) -> AppResult<Json<BuddyOut>> {
    let buddy = state
        .repo
        .get_buddy(id, buddy_id)
        .await?
        .ok_or_else(|| AppError::not_found("Buddy"))?;
    Ok(Json(buddy_out(&state, buddy).await?))
}

/// update_buddy
///
/// [Authenticated Route] Replaces the private notes kept on a buddy.
#[utoipa::path(
    put,
    path = "/api/buddies/{buddy_id}",
    params(("buddy_id" = Uuid, Path, description = "The buddy's user id")),
    request_body = BuddyUpdate,
    responses(
        (status = 200, description = "Updated buddy", body = BuddyOut),
        (status = 404, description = "Not in the buddy list")
    ),
    security(("bearer" = [])),
    tag = "buddies"
)]
pub async fn update_buddy(
    AuthUser { id, .. }: AuthUser,
    State(state): State<AppState>,
    Path(buddy_id): Path<Uuid>,
    Json(payload): Json<BuddyUpdate>,
) -> AppResult<Json<BuddyOut>> {
    let buddy = state
        .repo
        .update_buddy_notes(id, buddy_id, clean_notes(payload.notes))
        .await?
        .ok_or_else(|| AppError::not_found("Buddy"))?;
    Ok(Json(buddy_out(&state, buddy).await?))
}

/// remove_buddy
#[utoipa::path(
    delete,
    path = "/api/buddies/{buddy_id}",
    params(("buddy_id" = Uuid, Path, description = "The buddy's user id")),
    responses(
        (status = 204, description = "Removed"),
        (status = 404, description = "Not in the buddy list")
    ),
    security(("bearer" = [])),
    tag = "buddies"
)]
pub async fn remove_buddy(
    AuthUser { id, .. }: AuthUser,
    State(state): State<AppState>,
    Path(buddy_id): Path<Uuid>,
) -> AppResult<StatusCode> {
    if state.repo.remove_buddy(id, buddy_id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::not_found("Buddy"))
    }
}
