use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use ts_rs::TS;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

/// GigStatus
///
/// Lifecycle of a gig. Stored as the Postgres enum `gig_status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema, sqlx::Type, Default)]
#[sqlx(type_name = "gig_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum GigStatus {
    #[default]
    Pending,
    Accepted,
    InProgress,
    Completed,
    Cancelled,
}

impl GigStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            GigStatus::Pending => "pending",
            GigStatus::Accepted => "accepted",
            GigStatus::InProgress => "in_progress",
            GigStatus::Completed => "completed",
            GigStatus::Cancelled => "cancelled",
        }
    }

    /// Transitions reachable through PUT /gigs/{id}/status.
    /// `accepted` is only entered via the accept operation; terminal states never move.
    pub fn can_transition_to(self, next: GigStatus) -> bool {
        use GigStatus::*;
        matches!(
            (self, next),
            (Pending, Cancelled)
                | (Accepted, InProgress)
                | (Accepted, Completed)
                | (Accepted, Cancelled)
                | (InProgress, Completed)
                | (InProgress, Cancelled)
        )
    }
}

/// Gig
///
/// A posted job. `latitude`/`longitude` are projected from the PostGIS `location` column;
/// `distance_km` is only present on results of a proximity search.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct Gig {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub duration_hours: i32,
    pub budget: f64,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub address_text: String,
    pub status: GigStatus,
    pub image_urls: Vec<String>,
    pub seeker_id: Uuid,
    pub helper_id: Option<Uuid>,
    #[ts(type = "string | null")]
    pub starts_at: Option<DateTime<Utc>>,
    #[ts(type = "string | null")]
    pub completed_at: Option<DateTime<Utc>>,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
    #[ts(type = "string")]
    pub updated_at: DateTime<Utc>,
    #[sqlx(default)]
    #[serde(skip_serializing_if = "Option::is_none", default)]
    #[ts(optional)]
    pub distance_km: Option<f64>,
}

impl Gig {
    /// Whether `user_id` is the seeker or the assigned helper.
    pub fn involves(&self, user_id: Uuid) -> bool {
        self.seeker_id == user_id || self.helper_id == Some(user_id)
    }
}

// --- Request Payloads ---

/// GigCreate
///
/// Input payload for POST /gigs.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct GigCreate {
    #[schema(example = "Help moving furniture")]
    pub title: String,
    pub description: String,
    #[schema(example = 3)]
    pub duration_hours: i32,
    #[schema(example = 500.0)]
    pub budget: f64,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub address_text: String,
    #[serde(default)]
    pub image_urls: Vec<String>,
    #[ts(type = "string | null")]
    pub starts_at: Option<DateTime<Utc>>,
}

/// GigUpdate
///
/// Partial update for PUT /gigs/{id}. Only the seeker may apply it.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct GigUpdate {
    pub title: Option<String>,
    pub description: Option<String>,
    pub duration_hours: Option<i32>,
    pub budget: Option<f64>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub address_text: Option<String>,
    pub image_urls: Option<Vec<String>>,
    #[ts(type = "string | null")]
    pub starts_at: Option<DateTime<Utc>>,
}

/// GigStatusUpdate
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct GigStatusUpdate {
    pub status: GigStatus,
}

/// GigSearchQuery
///
/// Query string accepted by GET /gigs/search.
#[derive(Debug, Clone, Deserialize, IntoParams, Default)]
pub struct GigSearchQuery {
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    /// Radius in kilometres (0.1 to 100, default 10).
    pub radius_km: Option<f64>,
    pub min_budget: Option<f64>,
    pub max_budget: Option<f64>,
    pub max_duration: Option<i32>,
    /// Defaults to `pending`.
    pub status: Option<GigStatus>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// PageQuery
///
/// limit/offset pagination used by gig listings.
#[derive(Debug, Clone, Deserialize, IntoParams, Default)]
pub struct PageQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// MyGigsQuery
#[derive(Debug, Clone, Deserialize, IntoParams, Default)]
pub struct MyGigsQuery {
    /// true lists gigs the caller posted, false lists gigs the caller accepted.
    pub as_seeker: Option<bool>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// GigFilter
///
/// Validated, fully defaulted search criteria handed to the repository.
#[derive(Debug, Clone)]
pub struct GigFilter {
    pub center: Option<(f64, f64)>,
    pub radius_km: f64,
    pub min_budget: Option<f64>,
    pub max_budget: Option<f64>,
    pub max_duration: Option<i32>,
    pub status: GigStatus,
    pub limit: i64,
    pub offset: i64,
}

impl Default for GigFilter {
    fn default() -> Self {
        Self {
            center: None,
            radius_km: 10.0,
            min_budget: None,
            max_budget: None,
            max_duration: None,
            status: GigStatus::Pending,
            limit: 20,
            offset: 0,
        }
    }
}

// --- Response Schemas ---

/// GigListOut
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct GigListOut {
    pub gigs: Vec<Gig>,
    pub total_count: i64,
    pub limit: i64,
    pub offset: i64,
    pub has_more: bool,
}

impl GigListOut {
    pub fn new(gigs: Vec<Gig>, total_count: i64, limit: i64, offset: i64) -> Self {
        let has_more = offset.saturating_add(gigs.len() as i64) < total_count;
        Self {
            gigs,
            total_count,
            limit,
            offset,
            has_more,
        }
    }
}
