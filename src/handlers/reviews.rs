use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::{
    AppState,
    auth::AuthUser,
    error::{AppError, AppResult, RepositoryError},
    geo::round2,
    handlers::{display_name, limit_param, offset_param, require_user, text_in_range},
    models::{
        CanReviewOut, Gig, GigReviewsOut, GigStatus, MessageOnly, Review, ReviewCreate, ReviewOut,
        ReviewUpdate, SkipLimitQuery, UserReviewSummary,
    },
};

const DEFAULT_REPUTATION: f64 = 5.0;
const MAX_COMMENT_CHARS: usize = 1000;

fn check_rating(rating: i32) -> AppResult<()> {
    if !(1..=5).contains(&rating) {
        return Err(AppError::Validation("rating must be between 1 and 5".to_string()));
    }
    Ok(())
}

/// Why `reviewer` may not review `reviewee` for `gig`, if anything stands in the way.
/// The duplicate check is left to the caller since it needs the repository.
fn review_blocker(gig: &Gig, reviewer_id: Uuid, reviewee_id: Uuid) -> Option<&'static str> {
    if gig.status != GigStatus::Completed {
        return Some("Can only review completed gigs");
    }
    if reviewer_id == reviewee_id {
        return Some("Cannot review yourself");
    }
    if !gig.involves(reviewer_id) {
        return Some("Only the seeker or helper of a gig can review it");
    }
    if !gig.involves(reviewee_id) {
        return Some("Reviewee did not take part in this gig");
    }
    None
}

/// (count, average rounded to 2 decimals) from per-star counts. Average is 0.0 when empty.
fn rating_stats(counts: &[(i32, i64)]) -> (i64, f64) {
    let total: i64 = counts.iter().map(|(_, c)| c).sum();
    if total == 0 {
        return (0, 0.0);
    }
    let sum: i64 = counts.iter().map(|(r, c)| i64::from(*r) * c).sum();
    (total, round2(sum as f64 / total as f64))
}

fn average_of(reviews: &[Review]) -> f64 {
    if reviews.is_empty() {
        return 0.0;
    }
    let sum: i64 = reviews.iter().map(|r| i64::from(r.rating)).sum();
    round2(sum as f64 / reviews.len() as f64)
}

/// refresh_reputation
///
/// Recomputes the reviewee's score and review count from the reviews that remain.
async fn refresh_reputation(state: &AppState, reviewee_id: Uuid) -> AppResult<()> {
    let counts = state.repo.rating_counts(reviewee_id).await?;
    let (total, average) = rating_stats(&counts);
    let score = if total == 0 { DEFAULT_REPUTATION } else { average };
    state
        .repo
        .set_reputation(reviewee_id, score, total as i32)
        .await?;
    tracing::debug!(user_id = %reviewee_id, score, total, "reputation updated");
    Ok(())
}

async fn review_out(state: &AppState, review: Review) -> AppResult<ReviewOut> {
    let gig_title = state
        .repo
        .get_gig(review.gig_id)
        .await?
        .map(|gig| gig.title)
        .unwrap_or_else(|| "Unknown gig".to_string());
    Ok(ReviewOut {
        id: review.id,
        gig_id: review.gig_id,
        gig_title,
        reviewer_id: review.reviewer_id,
        reviewer_name: display_name(state, review.reviewer_id).await?,
        reviewee_id: review.reviewee_id,
        reviewee_name: display_name(state, review.reviewee_id).await?,
        rating: review.rating,
        comment: review.comment,
        created_at: review.created_at,
        updated_at: review.updated_at,
    })
}

async fn reviews_out(state: &AppState, reviews: Vec<Review>) -> AppResult<Vec<ReviewOut>> {
    let mut out = Vec::with_capacity(reviews.len());
    for review in reviews {
        out.push(review_out(state, review).await?);
    }
    Ok(out)
}

/// create_review
///
/// [Authenticated Route] Rates the other party of a completed gig. Each (gig, reviewer,
/// reviewee) combination can be reviewed once.
#[utoipa::path(
    post,
    path = "/api/reviews",
    request_body = ReviewCreate,
    responses(
        (status = 201, description = "Review created", body = ReviewOut),
        (status = 400, description = "Review not allowed"),
        (status = 404, description = "Gig not found"),
        (status = 422, description = "Rating or comment out of range")
    ),
    security(("bearer" = [])),
    tag = "reviews"
)]
pub async fn create_review(
    AuthUser { id: reviewer_id, .. }: AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<ReviewCreate>,
) -> AppResult<(StatusCode, Json<ReviewOut>)> {
    check_rating(payload.rating)?;
    let comment = text_in_range(&payload.comment, "comment", 1, MAX_COMMENT_CHARS)?;

    let gig = state
        .repo
        .get_gig(payload.gig_id)
        .await?
        .ok_or_else(|| AppError::not_found("Gig"))?;
    if let Some(reason) = review_blocker(&gig, reviewer_id, payload.reviewee_id) {
        return Err(AppError::BadRequest(reason.to_string()));
    }
    let already_reviewed = state
        .repo
        .find_review(gig.id, reviewer_id, payload.reviewee_id)
        .await?
        .is_some();
    if already_reviewed {
        return Err(AppError::BadRequest("You have already reviewed this user for this gig".to_string()));
    }

    let review = state
        .repo
        .create_review(
            reviewer_id,
            ReviewCreate {
                comment,
                ..payload
            },
        )
        .await
        .map_err(|e| match e {
            RepositoryError::Conflict(_) => {
                AppError::BadRequest("You have already reviewed this user for this gig".to_string())
            }
            other => other.into(),
        })?;

    refresh_reputation(&state, review.reviewee_id).await?;
    tracing::info!(review_id = %review.id, gig_id = %review.gig_id, "review created");
    Ok((StatusCode::CREATED, Json(review_out(&state, review).await?)))
}

/// user_reviews
///
/// [Public Route] Rating summary of a user with a page of the most recent reviews received.
#[utoipa::path(
    get,
    path = "/api/reviews/user/{user_id}",
    params(("user_id" = Uuid, Path, description = "Reviewed user"), SkipLimitQuery),
    responses(
        (status = 200, description = "Review summary", body = UserReviewSummary),
        (status = 404, description = "User not found")
    ),
    tag = "reviews"
)]
pub async fn user_reviews(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Query(query): Query<SkipLimitQuery>,
) -> AppResult<Json<UserReviewSummary>> {
    let skip = offset_param(query.skip, "skip")?;
    let limit = limit_param(query.limit, 10, 100)?;
    let user = require_user(&state, user_id).await?;

    let counts = state.repo.rating_counts(user_id).await?;
    let (total_reviews, average_rating) = rating_stats(&counts);
    let mut rating_distribution: BTreeMap<i32, i64> = (1..=5).map(|star| (star, 0)).collect();
    for (rating, count) in counts {
        rating_distribution.insert(rating, count);
    }

    let recent = state.repo.list_reviews_for_user(user_id, skip, limit).await?;
    Ok(Json(UserReviewSummary {
        user_id,
        user_name: user.full_name(),
        total_reviews,
        average_rating,
        rating_distribution,
        recent_reviews: reviews_out(&state, recent).await?,
    }))
}

/// gig_reviews
///
/// [Public Route] All reviews left on a gig.
#[utoipa::path(
    get,
    path = "/api/reviews/gig/{gig_id}",
    params(("gig_id" = Uuid, Path, description = "Gig id")),
    responses(
        (status = 200, description = "Gig reviews", body = GigReviewsOut),
        (status = 404, description = "Gig not found")
    ),
    tag = "reviews"
)]
pub async fn gig_reviews(
    State(state): State<AppState>,
    Path(gig_id): Path<Uuid>,
) -> AppResult<Json<GigReviewsOut>> {
    let gig = state
        .repo
        .get_gig(gig_id)
        .await?
        .ok_or_else(|| AppError::not_found("Gig"))?;
    let reviews = state.repo.list_reviews_for_gig(gig_id).await?;
    let average_rating = average_of(&reviews);

    Ok(Json(GigReviewsOut {
        gig_id,
        gig_title: gig.title,
        total_reviews: reviews.len() as i64,
        average_rating,
        reviews: reviews_out(&state, reviews).await?,
    }))
}

/// my_reviews
///
/// [Authenticated Route] Reviews written by the caller, newest first.
#[utoipa::path(
    get,
    path = "/api/reviews/my-reviews",
    params(SkipLimitQuery),
    responses((status = 200, description = "Reviews written", body = [ReviewOut])),
    security(("bearer" = [])),
    tag = "reviews"
)]
pub async fn my_reviews(
    AuthUser { id, .. }: AuthUser,
    State(state): State<AppState>,
    Query(query): Query<SkipLimitQuery>,
) -> AppResult<Json<Vec<ReviewOut>>> {
    let skip = offset_param(query.skip, "skip")?;
    let limit = limit_param(query.limit, 20, 100)?;
    let reviews = state.repo.list_reviews_by_reviewer(id, skip, limit).await?;
    Ok(Json(reviews_out(&state, reviews).await?))
}

/// update_review
///
/// [Authenticated Route] Edits rating and/or comment.
///
/// *Authorization*: original reviewer only (404 otherwise).
#[utoipa::path(
    put,
    path = "/api/reviews/{id}",
    params(("id" = Uuid, Path, description = "Review id")),
    request_body = ReviewUpdate,
    responses(
        (status = 200, description = "Updated review", body = ReviewOut),
        (status = 404, description = "Not found or not the reviewer"),
        (status = 422, description = "Rating or comment out of range")
    ),
    security(("bearer" = [])),
    tag = "reviews"
)]
pub async fn update_review(
    AuthUser { id: reviewer_id, .. }: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<ReviewUpdate>,
) -> AppResult<Json<ReviewOut>> {
    if let Some(rating) = payload.rating {
        check_rating(rating)?;
    }
    let comment = payload
        .comment
        .as_deref()
        .map(|c| text_in_range(c, "comment", 1, MAX_COMMENT_CHARS))
        .transpose()?;

    let review = state
        .repo
        .update_review(
            id,
            reviewer_id,
            ReviewUpdate {
                rating: payload.rating,
                comment,
            },
        )
        .await?
        .ok_or_else(|| AppError::not_found("Review"))?;

    refresh_reputation(&state, review.reviewee_id).await?;
    Ok(Json(review_out(&state, review).await?))
}

/// delete_review
///
/// [Authenticated Route] Removes a review and recomputes the reviewee's reputation.
#[utoipa::path(
    delete,
    path = "/api/reviews/{id}",
    params(("id" = Uuid, Path, description = "Review id")),
    responses(
        (status = 200, description = "Deleted", body = MessageOnly),
        (status = 404, description = "Not found or not the reviewer")
    ),
    security(("bearer" = [])),
    tag = "reviews"
)]
pub async fn delete_review(
    AuthUser { id: reviewer_id, .. }: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<MessageOnly>> {
    let removed = state
        .repo
        .delete_review(id, reviewer_id)
        .await?
        .ok_or_else(|| AppError::not_found("Review"))?;
    refresh_reputation(&state, removed.reviewee_id).await?;
    Ok(Json(MessageOnly::new("Review deleted successfully")))
}

/// can_review
///
/// [Authenticated Route] Whether the caller may review `reviewee_id` for `gig_id` right now.
#[utoipa::path(
    get,
    path = "/api/reviews/can-review/{gig_id}/{reviewee_id}",
    params(
        ("gig_id" = Uuid, Path, description = "Gig id"),
        ("reviewee_id" = Uuid, Path, description = "User to be reviewed")
    ),
    responses((status = 200, description = "Eligibility", body = CanReviewOut)),
    security(("bearer" = [])),
    tag = "reviews"
)]
pub async fn can_review(
    AuthUser { id: reviewer_id, .. }: AuthUser,
    State(state): State<AppState>,
    Path((gig_id, reviewee_id)): Path<(Uuid, Uuid)>,
) -> AppResult<Json<CanReviewOut>> {
    let allowed = match state.repo.get_gig(gig_id).await? {
        Some(gig) if review_blocker(&gig, reviewer_id, reviewee_id).is_none() => state
            .repo
            .find_review(gig_id, reviewer_id, reviewee_id)
            .await?
            .is_none(),
        _ => false,
    };

    Ok(Json(CanReviewOut {
        can_review: allowed,
        gig_id,
        reviewer_id,
        reviewee_id,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stats_round_average_and_handle_no_reviews() {
        assert_eq!(rating_stats(&[]), (0, 0.0));
        assert_eq!(rating_stats(&[(5, 2), (4, 1)]), (3, 4.67));
    }

    #[test]
    fn only_completed_gigs_between_participants_are_reviewable() {
        let (seeker, helper, outsider) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        let mut gig = Gig {
            seeker_id: seeker,
            helper_id: Some(helper),
            status: GigStatus::InProgress,
            ..Default::default()
        };
        assert!(review_blocker(&gig, seeker, helper).is_some());

        gig.status = GigStatus::Completed;
        assert!(review_blocker(&gig, seeker, helper).is_none());
        assert!(review_blocker(&gig, helper, seeker).is_none());
        assert!(review_blocker(&gig, seeker, seeker).is_some());
        assert!(review_blocker(&gig, outsider, helper).is_some());
        assert!(review_blocker(&gig, seeker, outsider).is_some());
    }
}
