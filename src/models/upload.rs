use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use ts_rs::TS;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

/// Image types accepted by every upload endpoint.
pub const ALLOWED_IMAGE_TYPES: &[&str] = &["image/jpeg", "image/png", "image/webp"];

/// UploadCategory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum UploadCategory {
    Profile,
    Gig,
}

impl UploadCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            UploadCategory::Profile => "profile",
            UploadCategory::Gig => "gig",
        }
    }
}

/// UploadedFile
///
/// Metadata row for an object stored under `file_path` in the bucket.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct UploadedFile {
    pub id: Uuid,
    pub filename: String,
    pub original_filename: String,
    pub file_path: String,
    pub file_size: i64,
    pub content_type: String,
    pub upload_category: String,
    pub uploaded_by: Uuid,
    pub is_active: bool,
    #[ts(type = "string")]
    pub uploaded_at: DateTime<Utc>,
}

/// MyFilesQuery
#[derive(Debug, Clone, Deserialize, IntoParams, Default)]
pub struct MyFilesQuery {
    pub category: Option<UploadCategory>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// ProfileImageSet
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct ProfileImageSet {
    pub profile_image_url: String,
}

/// FileUploadOut
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct FileUploadOut {
    pub id: Uuid,
    pub filename: String,
    pub original_filename: String,
    pub url: String,
    pub file_size: i64,
    pub content_type: String,
    pub upload_category: String,
    #[ts(type = "string")]
    pub uploaded_at: DateTime<Utc>,
}

/// GigImagesOut
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct GigImagesOut {
    pub gig_id: Uuid,
    pub image_urls: Vec<String>,
}
