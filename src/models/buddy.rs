use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use ts_rs::TS;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

/// Buddy
///
/// A saved favorite. `(user_id, buddy_id)` is unique and a user can never add themselves.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, Default)]
pub struct Buddy {
    pub id: Uuid,
    pub user_id: Uuid,
    pub buddy_id: Uuid,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// BuddyCreate
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct BuddyCreate {
    pub buddy_id: Uuid,
    pub notes: Option<String>,
}

/// BuddyUpdate
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct BuddyUpdate {
    pub notes: Option<String>,
}

/// SkipLimitQuery
///
/// skip/limit pagination used by buddy, review and transaction listings.
#[derive(Debug, Clone, Deserialize, IntoParams, Default)]
pub struct SkipLimitQuery {
    pub skip: Option<i64>,
    pub limit: Option<i64>,
}

/// BuddyOut
///
/// A buddy row joined with the buddy user's public profile.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct BuddyOut {
    pub id: Uuid,
    pub buddy_id: Uuid,
    pub full_name: String,
    pub email: String,
    pub is_available: bool,
    pub reputation_score: f64,
    pub profile_image_url: Option<String>,
    pub notes: Option<String>,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
}

/// BuddyListOut
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct BuddyListOut {
    pub buddies: Vec<BuddyOut>,
    pub total: i64,
    pub skip: i64,
    pub limit: i64,
}
