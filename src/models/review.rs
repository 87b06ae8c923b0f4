use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use ts_rs::TS;
use utoipa::ToSchema;
use uuid::Uuid;

/// Review
///
/// One rating left by a gig participant for the other participant.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, Default)]
pub struct Review {
    pub id: Uuid,
    pub gig_id: Uuid,
    pub reviewer_id: Uuid,
    pub reviewee_id: Uuid,
    pub rating: i32,
    pub comment: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// ReviewCreate
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct ReviewCreate {
    pub gig_id: Uuid,
    pub reviewee_id: Uuid,
    #[schema(minimum = 1, maximum = 5)]
    pub rating: i32,
    pub comment: String,
}

/// ReviewUpdate
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct ReviewUpdate {
    pub rating: Option<i32>,
    pub comment: Option<String>,
}

/// ReviewOut
///
/// A review enriched with participant names and the gig title.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct ReviewOut {
    pub id: Uuid,
    pub gig_id: Uuid,
    pub gig_title: String,
    pub reviewer_id: Uuid,
    pub reviewer_name: String,
    pub reviewee_id: Uuid,
    pub reviewee_name: String,
    pub rating: i32,
    pub comment: String,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
    #[ts(type = "string")]
    pub updated_at: DateTime<Utc>,
}

/// UserReviewSummary
///
/// Aggregate view of the reviews a user has received.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct UserReviewSummary {
    pub user_id: Uuid,
    pub user_name: String,
    pub total_reviews: i64,
    pub average_rating: f64,
    /// Star value (1..=5) to number of reviews.
    pub rating_distribution: BTreeMap<i32, i64>,
    pub recent_reviews: Vec<ReviewOut>,
}

/// GigReviewsOut
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct GigReviewsOut {
    pub gig_id: Uuid,
    pub gig_title: String,
    pub reviews: Vec<ReviewOut>,
    pub total_reviews: i64,
    pub average_rating: f64,
}

/// CanReviewOut
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct CanReviewOut {
    pub can_review: bool,
    pub gig_id: Uuid,
    pub reviewer_id: Uuid,
    pub reviewee_id: Uuid,
}
