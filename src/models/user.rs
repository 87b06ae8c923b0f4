use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use ts_rs::TS;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

// --- Stored Records ---

/// User
///
/// The canonical account record from the `users` table. The password hash never leaves
/// the server: it is skipped on serialization and excluded from every response type.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, Default)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    #[serde(skip_serializing)]
    pub hashed_password: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone_number: Option<String>,
    pub bio: Option<String>,
    pub additional_contact: Option<String>,
    pub profile_image_url: Option<String>,
    pub is_profile_setup: bool,
    pub is_available: bool,
    pub is_verified: bool,
    pub reputation_score: f64,
    pub total_reviews: i32,
    pub address_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// "first last", or a placeholder while the profile is still empty.
    pub fn full_name(&self) -> String {
        let joined = format!(
            "{} {}",
            self.first_name.as_deref().unwrap_or_default(),
            self.last_name.as_deref().unwrap_or_default()
        );
        let trimmed = joined.trim();
        if trimmed.is_empty() {
            "Incomplete Profile".to_string()
        } else {
            trimmed.to_string()
        }
    }
}

/// Address
///
/// A postal address with an optional WGS84 point. Coordinates are read back from the
/// PostGIS column with `ST_Y`/`ST_X`.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct Address {
    pub id: Uuid,
    pub address_line: String,
    pub district: String,
    pub province: String,
    pub postal_code: Option<String>,
    pub country: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
    #[ts(type = "string")]
    pub updated_at: DateTime<Utc>,
}

/// NewUser
///
/// Insert payload built by the register handler after hashing the password.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub hashed_password: String,
}

/// NearbyUser
///
/// Internal projection returned by the proximity search.
#[derive(Debug, Clone, FromRow)]
pub struct NearbyUser {
    #[sqlx(flatten)]
    pub user: User,
    pub distance_km: f64,
}

// --- Request Payloads ---

/// RegisterRequest
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct RegisterRequest {
    #[schema(example = "somchai@example.com")]
    pub email: String,
    pub password: String,
}

/// AddressInput
///
/// Address block accepted inside a profile update.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct AddressInput {
    pub address_line: String,
    pub district: String,
    pub province: String,
    pub postal_code: Option<String>,
    pub country: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

/// ProfileUpdate
///
/// Partial profile upsert (PUT /users/me). Absent fields are left untouched.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct ProfileUpdate {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    #[schema(example = "0812345678")]
    pub phone_number: Option<String>,
    pub bio: Option<String>,
    pub additional_contact: Option<String>,
    pub profile_image_url: Option<String>,
    pub address: Option<AddressInput>,
}

/// AvailabilityUpdate
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct AvailabilityUpdate {
    pub is_available: bool,
}

/// NearbyQuery
///
/// Query string for GET /users/nearby.
#[derive(Debug, Clone, Deserialize, IntoParams)]
pub struct NearbyQuery {
    pub latitude: f64,
    pub longitude: f64,
    /// Search radius in kilometres (0.1 to 50, default 5).
    pub radius: Option<f64>,
    /// Only return users flagged as available (default true).
    pub only_available: Option<bool>,
}

// --- Response Schemas ---

/// UserOut
///
/// The caller's own profile, including contact details and address.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct UserOut {
    pub id: Uuid,
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub full_name: String,
    pub phone_number: Option<String>,
    pub bio: Option<String>,
    pub additional_contact: Option<String>,
    pub profile_image_url: Option<String>,
    pub is_profile_setup: bool,
    pub is_available: bool,
    pub is_verified: bool,
    pub reputation_score: f64,
    pub total_reviews: i32,
    pub address: Option<Address>,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
    #[ts(type = "string")]
    pub updated_at: DateTime<Utc>,
}

impl UserOut {
    pub fn new(user: User, address: Option<Address>) -> Self {
        Self {
            full_name: user.full_name(),
            id: user.id,
            email: user.email,
            first_name: user.first_name,
            last_name: user.last_name,
            phone_number: user.phone_number,
            bio: user.bio,
            additional_contact: user.additional_contact,
            profile_image_url: user.profile_image_url,
            is_profile_setup: user.is_profile_setup,
            is_available: user.is_available,
            is_verified: user.is_verified,
            reputation_score: user.reputation_score,
            total_reviews: user.total_reviews,
            address,
            created_at: user.created_at,
            updated_at: user.updated_at,
        }
    }
}

/// UserSummary
///
/// Public view of another user (no contact details).
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct UserSummary {
    pub id: Uuid,
    pub full_name: String,
    pub profile_image_url: Option<String>,
    pub reputation_score: f64,
    pub total_reviews: i32,
    pub is_available: bool,
}

impl From<&User> for UserSummary {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            full_name: user.full_name(),
            profile_image_url: user.profile_image_url.clone(),
            reputation_score: user.reputation_score,
            total_reviews: user.total_reviews,
            is_available: user.is_available,
        }
    }
}

/// NearbyUserOut
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct NearbyUserOut {
    pub user: UserSummary,
    pub distance_km: f64,
}
