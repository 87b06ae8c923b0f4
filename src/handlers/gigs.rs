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
    geo::{valid_latitude, valid_longitude},
    handlers::{limit_param, offset_param, text_in_range},
    models::{
        Gig, GigCreate, GigFilter, GigListOut, GigSearchQuery, GigStatus, GigStatusUpdate,
        GigUpdate, MyGigsQuery, PageQuery,
    },
};

const MAX_IMAGE_URLS: usize = 5;
const DEFAULT_PAGE_SIZE: i64 = 20;
const MAX_PAGE_SIZE: i64 = 100;
const MIN_RADIUS_KM: f64 = 0.1;
const MAX_RADIUS_KM: f64 = 100.0;

// --- Validation ---

fn check_duration(hours: i32) -> AppResult<()> {
    if !(1..=24).contains(&hours) {
        return Err(AppError::Validation(
            "duration_hours must be between 1 and 24".to_string(),
        ));
    }
    Ok(())
}

fn check_budget(budget: f64) -> AppResult<()> {
    if !budget.is_finite() || budget < 0.0 {
        return Err(AppError::Validation("budget must be >= 0".to_string()));
    }
    Ok(())
}

fn check_coordinates(latitude: Option<f64>, longitude: Option<f64>) -> AppResult<()> {
    if !latitude.is_none_or(valid_latitude) {
        return Err(AppError::Validation("latitude must be within [-90, 90]".to_string()));
    }
    if !longitude.is_none_or(valid_longitude) {
        return Err(AppError::Validation("longitude must be within [-180, 180]".to_string()));
    }
    Ok(())
}

fn check_images(urls: &[String]) -> AppResult<()> {
    if urls.len() > MAX_IMAGE_URLS {
        return Err(AppError::Validation(format!(
            "at most {MAX_IMAGE_URLS} image URLs are allowed"
        )));
    }
    Ok(())
}

/// validate_create
///
/// Range checks for a new gig; text fields come back trimmed.
fn validate_create(gig: GigCreate) -> AppResult<GigCreate> {
    check_duration(gig.duration_hours)?;
    check_budget(gig.budget)?;
    check_coordinates(gig.latitude, gig.longitude)?;
    check_images(&gig.image_urls)?;
    Ok(GigCreate {
        title: text_in_range(&gig.title, "title", 3, 200)?,
        description: text_in_range(&gig.description, "description", 10, 2000)?,
        address_text: text_in_range(&gig.address_text, "address_text", 5, 500)?,
        ..gig
    })
}

fn validate_update(update: GigUpdate) -> AppResult<GigUpdate> {
    if let Some(hours) = update.duration_hours {
        check_duration(hours)?;
    }
    if let Some(budget) = update.budget {
        check_budget(budget)?;
    }
    check_coordinates(update.latitude, update.longitude)?;
    if let Some(urls) = &update.image_urls {
        check_images(urls)?;
    }
    Ok(GigUpdate {
        title: update
            .title
            .as_deref()
            .map(|t| text_in_range(t, "title", 3, 200))
            .transpose()?,
        description: update
            .description
            .as_deref()
            .map(|d| text_in_range(d, "description", 10, 2000))
            .transpose()?,
        address_text: update
            .address_text
            .as_deref()
            .map(|a| text_in_range(a, "address_text", 5, 500))
            .transpose()?,
        ..update
    })
}

/// build_filter
///
/// Turns raw search parameters into a fully defaulted `GigFilter`. A center point is only
/// used when both coordinates are present.
fn build_filter(query: GigSearchQuery) -> AppResult<GigFilter> {
    let center = match (query.latitude, query.longitude) {
        (Some(lat), Some(lon)) => {
            check_coordinates(Some(lat), Some(lon))?;
            Some((lat, lon))
        }
        (None, None) => None,
        _ => {
            return Err(AppError::Validation(
                "latitude and longitude must be supplied together".to_string(),
            ));
        }
    };

    let radius_km = query.radius_km.unwrap_or(10.0);
    if !(MIN_RADIUS_KM..=MAX_RADIUS_KM).contains(&radius_km) {
        return Err(AppError::Validation(format!(
            "radius_km must be between {MIN_RADIUS_KM} and {MAX_RADIUS_KM}"
        )));
    }
    for budget in [query.min_budget, query.max_budget].into_iter().flatten() {
        check_budget(budget)?;
    }
    if query.max_duration.is_some_and(|d| d < 1) {
        return Err(AppError::Validation("max_duration must be >= 1".to_string()));
    }

    Ok(GigFilter {
        center,
        radius_km,
        min_budget: query.min_budget,
        max_budget: query.max_budget,
        max_duration: query.max_duration,
        status: query.status.unwrap_or_default(),
        limit: limit_param(query.limit, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE)?,
        offset: offset_param(query.offset, "offset")?,
    })
}

async fn load_gig(state: &AppState, id: Uuid) -> AppResult<Gig> {
    state
        .repo
        .get_gig(id)
        .await?
        .ok_or_else(|| AppError::not_found("Gig"))
}

// --- Handlers ---

/// create_gig
///
/// [Authenticated Route] Posts a new gig. The caller becomes its seeker.
#[utoipa::path(
    post,
    path = "/api/gigs",
    request_body = GigCreate,
    responses(
        (status = 201, description = "Gig created", body = Gig),
        (status = 422, description = "Validation failed")
    ),
    security(("bearer" = [])),
    tag = "gigs"
)]
pub async fn create_gig(
    AuthUser { id, .. }: AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<GigCreate>,
) -> AppResult<(StatusCode, Json<Gig>)> {
    let gig = state.repo.create_gig(id, validate_create(payload)?).await?;
    tracing::info!(gig_id = %gig.id, seeker_id = %id, "gig created");
    Ok((StatusCode::CREATED, Json(gig)))
}

/// list_gigs
///
/// [Public Route] Open gigs, newest first.
#[utoipa::path(
    get,
    path = "/api/gigs",
    params(PageQuery),
    responses((status = 200, description = "Open gigs", body = GigListOut)),
    tag = "gigs"
)]
pub async fn list_gigs(
    State(state): State<AppState>,
    Query(page): Query<PageQuery>,
) -> AppResult<Json<GigListOut>> {
    let filter = GigFilter {
        limit: limit_param(page.limit, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE)?,
        offset: offset_param(page.offset, "offset")?,
        ..GigFilter::default()
    };
    let (gigs, total) = state.repo.search_gigs(&filter).await?;
    Ok(Json(GigListOut::new(gigs, total, filter.limit, filter.offset)))
}

/// search_gigs
///
/// [Public Route] Filtered gig search. With a center point, results are limited to
/// `radius_km` and ordered by distance, each carrying `distance_km`.
#[utoipa::path(
    get,
    path = "/api/gigs/search",
    params(GigSearchQuery),
    responses(
        (status = 200, description = "Matching gigs", body = GigListOut),
        (status = 422, description = "Invalid search parameters")
    ),
    tag = "gigs"
)]
pub async fn search_gigs(
    State(state): State<AppState>,
    Query(query): Query<GigSearchQuery>,
) -> AppResult<Json<GigListOut>> {
    let filter = build_filter(query)?;
    let (gigs, total) = state.repo.search_gigs(&filter).await?;
    Ok(Json(GigListOut::new(gigs, total, filter.limit, filter.offset)))
}

/// my_gigs
///
/// [Authenticated Route] Gigs the caller posted (`as_seeker=true`, default) or accepted.
#[utoipa::path(
    get,
    path = "/api/gigs/my-gigs",
    params(MyGigsQuery),
    responses((status = 200, description = "Caller's gigs", body = GigListOut)),
    security(("bearer" = [])),
    tag = "gigs"
)]
pub async fn my_gigs(
    AuthUser { id, .. }: AuthUser,
    State(state): State<AppState>,
    Query(query): Query<MyGigsQuery>,
) -> AppResult<Json<GigListOut>> {
    let limit = limit_param(query.limit, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE)?;
    let offset = offset_param(query.offset, "offset")?;
    let (gigs, total) = state
        .repo
        .list_user_gigs(id, query.as_seeker.unwrap_or(true), limit, offset)
        .await?;
    Ok(Json(GigListOut::new(gigs, total, limit, offset)))
}

/// get_gig
///
/// [Public Route] A single gig by id.
#[utoipa::path(
    get,
    path = "/api/gigs/{id}",
    params(("id" = Uuid, Path, description = "Gig id")),
    responses(
        (status = 200, description = "Gig", body = Gig),
        (status = 404, description = "Gig not found")
    ),
    tag = "gigs"
)]
pub async fn get_gig(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Gig>> {
    Ok(Json(load_gig(&state, id).await?))
}

/// update_gig
///
/// [Authenticated Route] Partial update.
///
/// *Authorization*: seeker only. The repository guard affects nothing for other users,
/// which surfaces as 404.
#[utoipa::path(
    put,
    path = "/api/gigs/{id}",
    params(("id" = Uuid, Path, description = "Gig id")),
    request_body = GigUpdate,
    responses(
        (status = 200, description = "Updated gig", body = Gig),
        (status = 404, description = "Not found or not the seeker"),
        (status = 422, description = "Validation failed")
    ),
    security(("bearer" = [])),
    tag = "gigs"
)]
pub async fn update_gig(
    AuthUser { id: user_id, .. }: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<GigUpdate>,
) -> AppResult<Json<Gig>> {
    let update = validate_update(payload)?;
    let gig = state
        .repo
        .update_gig(id, user_id, update)
        .await?
        .ok_or_else(|| AppError::not_found("Gig"))?;
    Ok(Json(gig))
}

/// delete_gig
///
/// [Authenticated Route] Removes a gig while it is still pending and unassigned.
#[utoipa::path(
    delete,
    path = "/api/gigs/{id}",
    params(("id" = Uuid, Path, description = "Gig id")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 404, description = "Not found, not the seeker, or already assigned")
    ),
    security(("bearer" = [])),
    tag = "gigs"
)]
pub async fn delete_gig(
    AuthUser { id: user_id, .. }: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    if state.repo.delete_gig(id, user_id).await? {
        tracing::info!(gig_id = %id, "gig deleted");
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::not_found("Gig"))
    }
}

/// accept_gig
///
/// [Authenticated Route] The caller becomes the helper of a pending gig. A chat room
/// between seeker and helper is opened in the same step.
#[utoipa::path(
    post,
    path = "/api/gigs/{id}/accept",
    params(("id" = Uuid, Path, description = "Gig id")),
    responses(
        (status = 200, description = "Accepted gig", body = Gig),
        (status = 400, description = "Gig not available or caller is the seeker"),
        (status = 404, description = "Gig not found")
    ),
    security(("bearer" = [])),
    tag = "gigs"
)]
pub async fn accept_gig(
    AuthUser { id: helper_id, .. }: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Gig>> {
    let gig = load_gig(&state, id).await?;
    if gig.seeker_id == helper_id {
        return Err(AppError::BadRequest("Cannot accept your own gig".to_string()));
    }
    if gig.status != GigStatus::Pending || gig.helper_id.is_some() {
        return Err(AppError::BadRequest("Gig is no longer available".to_string()));
    }

    // Concurrent accepts race on the repository guard; the loser sees None.
    let (accepted, room) = state
        .repo
        .accept_gig(id, helper_id)
        .await?
        .ok_or_else(|| AppError::BadRequest("Gig is no longer available".to_string()))?;
    tracing::info!(gig_id = %id, helper_id = %helper_id, room_id = %room.id, "gig accepted");
    Ok(Json(accepted))
}

/// update_gig_status
///
/// [Authenticated Route] Moves a gig along its lifecycle.
///
/// *Authorization*: seeker or assigned helper; anyone else gets 404.
#[utoipa::path(
    put,
    path = "/api/gigs/{id}/status",
    params(("id" = Uuid, Path, description = "Gig id")),
    request_body = GigStatusUpdate,
    responses(
        (status = 200, description = "Updated gig", body = Gig),
        (status = 400, description = "Transition not allowed"),
        (status = 404, description = "Gig not found")
    ),
    security(("bearer" = [])),
    tag = "gigs"
)]
pub async fn update_gig_status(
    AuthUser { id: user_id, .. }: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<GigStatusUpdate>,
) -> AppResult<Json<Gig>> {
    let gig = load_gig(&state, id).await?;
    if !gig.involves(user_id) {
        return Err(AppError::not_found("Gig"));
    }
    if !gig.status.can_transition_to(payload.status) {
        return Err(AppError::BadRequest(format!(
            "Cannot change status from {} to {}",
            gig.status.as_str(),
            payload.status.as_str()
        )));
    }

    let updated = state
        .repo
        .update_gig_status(id, gig.status, payload.status)
        .await?
        .ok_or_else(|| AppError::BadRequest("Gig status changed concurrently".to_string()))?;
    tracing::info!(gig_id = %id, status = updated.status.as_str(), "gig status changed");
    Ok(Json(updated))
}
