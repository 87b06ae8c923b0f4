//! HTTP handlers, one module per resource.
//!
//! Handlers validate input, enforce ownership rules, call the repository through
//! `AppState`, and shape responses. Every handler carries a `#[utoipa::path]` so it
//! shows up in the generated OpenAPI document.

pub mod auth;
pub mod buddies;
pub mod chat;
pub mod gigs;
pub mod reviews;
pub mod system;
pub mod transactions;
pub mod uploads;
pub mod users;
pub mod ws;

use uuid::Uuid;

use crate::{
    AppState,
    error::{AppError, AppResult},
    models::User,
};

// --- Shared Parameter Validation ---

/// Resolves an optional page size, rejecting values outside `1..=max`.
pub(crate) fn limit_param(value: Option<i64>, default: i64, max: i64) -> AppResult<i64> {
    let limit = value.unwrap_or(default);
    if !(1..=max).contains(&limit) {
        return Err(AppError::Validation(format!("limit must be between 1 and {max}")));
    }
    Ok(limit)
}

/// Resolves an optional offset/skip, rejecting negatives.
pub(crate) fn offset_param(value: Option<i64>, name: &str) -> AppResult<i64> {
    let offset = value.unwrap_or(0);
    if offset < 0 {
        return Err(AppError::Validation(format!("{name} must be >= 0")));
    }
    Ok(offset)
}

/// Trims `value` and checks its character count lies in `min..=max`.
pub(crate) fn text_in_range(value: &str, field: &str, min: usize, max: usize) -> AppResult<String> {
    let trimmed = value.trim();
    let len = trimmed.chars().count();
    if len < min || len > max {
        return Err(AppError::Validation(format!(
            "{field} must be between {min} and {max} characters"
        )));
    }
    Ok(trimmed.to_string())
}

// --- Shared Lookups ---

/// Loads a user or fails with 404.
pub(crate) async fn require_user(state: &AppState, id: Uuid) -> AppResult<User> {
    state
        .repo
        .get_user(id)
        .await?
        .ok_or_else(|| AppError::not_found("User"))
}

/// Display name for `id`, tolerating users that have since disappeared.
pub(crate) async fn display_name(state: &AppState, id: Uuid) -> AppResult<String> {
    Ok(state
        .repo
        .get_user(id)
        .await?
        .map(|u| u.full_name())
        .unwrap_or_else(|| "Unknown user".to_string()))
}
