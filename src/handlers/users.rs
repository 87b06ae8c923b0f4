use axum::{
    Json,
    extract::{Path, Query, State},
};
use uuid::Uuid;

use crate::{
    AppState,
    auth::AuthUser,
    error::{AppError, AppResult},
    geo::{round2, valid_latitude, valid_longitude},
    handlers::require_user,
    models::{
        AddressInput, AvailabilityUpdate, NearbyQuery, NearbyUserOut, ProfileUpdate, UserOut,
        UserSummary,
    },
};

const DEFAULT_NEARBY_RADIUS_KM: f64 = 5.0;
const MIN_NEARBY_RADIUS_KM: f64 = 0.1;
const MAX_NEARBY_RADIUS_KM: f64 = 50.0;

fn non_blank(value: Option<String>, field: &str) -> AppResult<Option<String>> {
    match value {
        Some(raw) => {
            let trimmed = raw.trim();
            if trimmed.is_empty() {
                return Err(AppError::Validation(format!("{field} must not be blank")));
            }
            Ok(Some(trimmed.to_string()))
        }
        None => Ok(None),
    }
}

fn validate_phone(phone: &str) -> AppResult<()> {
    let digits = phone.len();
    if !(7..=15).contains(&digits) || !phone.chars().all(|c| c.is_ascii_digit()) {
        return Err(AppError::Validation(
            "phone_number must be 7 to 15 digits".to_string(),
        ));
    }
    Ok(())
}

fn validate_address(address: AddressInput) -> AppResult<AddressInput> {
    let coordinates_ok = address.latitude.is_none_or(valid_latitude)
        && address.longitude.is_none_or(valid_longitude);
    if !coordinates_ok {
        return Err(AppError::Validation(
            "latitude must be within [-90, 90] and longitude within [-180, 180]".to_string(),
        ));
    }
    let required = |value: String, field: &str| -> AppResult<String> {
        non_blank(Some(value), field).map(Option::unwrap_or_default)
    };
    Ok(AddressInput {
        address_line: required(address.address_line, "address_line")?,
        district: required(address.district, "district")?,
        province: required(address.province, "province")?,
        postal_code: address.postal_code.map(|p| p.trim().to_string()),
        country: non_blank(address.country, "country")?,
        latitude: address.latitude,
        longitude: address.longitude,
    })
}

/// validate_profile
///
/// Normalizes a profile update: names trimmed and non-blank, phone digits only,
/// address fields checked. Absent fields stay absent.
fn validate_profile(update: ProfileUpdate) -> AppResult<ProfileUpdate> {
    let phone_number = match update.phone_number {
        Some(phone) => {
            let phone = phone.trim().to_string();
            validate_phone(&phone)?;
            Some(phone)
        }
        None => None,
    };

    Ok(ProfileUpdate {
        first_name: non_blank(update.first_name, "first_name")?,
        last_name: non_blank(update.last_name, "last_name")?,
        phone_number,
        bio: update.bio.map(|b| b.trim().to_string()),
        additional_contact: update.additional_contact.map(|c| c.trim().to_string()),
        profile_image_url: update.profile_image_url,
        address: update.address.map(validate_address).transpose()?,
    })
}

async fn user_out(state: &AppState, user: crate::models::User) -> AppResult<UserOut> {
    let address = match user.address_id {
        Some(address_id) => state.repo.get_address(address_id).await?,
        None => None,
    };
    Ok(UserOut::new(user, address))
}

/// get_me
///
/// [Authenticated Route] The caller's full profile including address.
#[utoipa::path(
    get,
    path = "/api/users/me",
    responses((status = 200, description = "Current user", body = UserOut)),
    security(("bearer" = [])),
    tag = "users"
)]
pub async fn get_me(
    AuthUser { id, .. }: AuthUser,
    State(state): State<AppState>,
) -> AppResult<Json<UserOut>> {
    let user = require_user(&state, id).await?;
    Ok(Json(user_out(&state, user).await?))
}

/// update_me
///
/// [Authenticated Route] Profile upsert. The first successful call marks the profile as set up.
#[utoipa::path(
    put,
    path = "/api/users/me",
    request_body = ProfileUpdate,
    responses(
        (status = 200, description = "Updated profile", body = UserOut),
        (status = 422, description = "Validation failed")
    ),
    security(("bearer" = [])),
    tag = "users"
)]
pub async fn update_me(
    AuthUser { id, .. }: AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<ProfileUpdate>,
) -> AppResult<Json<UserOut>> {
    let update = validate_profile(payload)?;
    let user = state
        .repo
        .update_profile(id, update)
        .await?
        .ok_or_else(|| AppError::not_found("User"))?;
    tracing::info!(user_id = %id, "profile updated");
    Ok(Json(user_out(&state, user).await?))
}

/// update_availability
///
/// [Authenticated Route] Toggles whether the caller shows up as an available helper.
#[utoipa::path(
    put,
    path = "/api/users/me/availability",
    request_body = AvailabilityUpdate,
    responses((status = 200, description = "Updated profile", body = UserOut)),
    security(("bearer" = [])),
    tag = "users"
)]
pub async fn update_availability(
    AuthUser { id, .. }: AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<AvailabilityUpdate>,
) -> AppResult<Json<UserOut>> {
    let user = state
        .repo
        .set_availability(id, payload.is_available)
        .await?
        .ok_or_else(|| AppError::not_found("User"))?;
    Ok(Json(user_out(&state, user).await?))
}

/// nearby_users
///
/// [Authenticated Route] Helpers whose address lies within `radius` km of the given point,
/// nearest first. The caller is never included.
#[utoipa::path(
    get,
    path = "/api/users/nearby",
    params(NearbyQuery),
    responses(
        (status = 200, description = "Nearby users", body = [NearbyUserOut]),
        (status = 422, description = "Invalid coordinates or radius")
    ),
    security(("bearer" = [])),
    tag = "users"
)]
pub async fn nearby_users(
    AuthUser { id, .. }: AuthUser,
    State(state): State<AppState>,
    Query(query): Query<NearbyQuery>,
) -> AppResult<Json<Vec<NearbyUserOut>>> {
    if !valid_latitude(query.latitude) || !valid_longitude(query.longitude) {
        return Err(AppError::Validation("Invalid coordinates".to_string()));
    }
    let radius = query.radius.unwrap_or(DEFAULT_NEARBY_RADIUS_KM);
    if !(MIN_NEARBY_RADIUS_KM..=MAX_NEARBY_RADIUS_KM).contains(&radius) {
        return Err(AppError::Validation(format!(
            "radius must be between {MIN_NEARBY_RADIUS_KM} and {MAX_NEARBY_RADIUS_KM} km"
        )));
    }

    let found = state
        .repo
        .find_nearby_users(
            id,
            query.latitude,
            query.longitude,
            radius,
            query.only_available.unwrap_or(true),
        )
        .await?;

    Ok(Json(
        found
            .into_iter()
            .map(|nearby| NearbyUserOut {
                user: UserSummary::from(&nearby.user),
                distance_km: round2(nearby.distance_km),
            })
            .collect(),
    ))
}

/// get_user
///
/// [Public Route] Public summary of any user.
#[utoipa::path(
    get,
    path = "/api/users/{id}",
    params(("id" = Uuid, Path, description = "User id")),
    responses(
        (status = 200, description = "User summary", body = UserSummary),
        (status = 404, description = "User not found")
    ),
    tag = "users"
)]
pub async fn get_user(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<UserSummary>> {
    let user = require_user(&state, id).await?;
    Ok(Json(UserSummary::from(&user)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phone_numbers_must_be_digits_within_length() {
        assert!(validate_phone("0812345678").is_ok());
        assert!(validate_phone("123456").is_err());
        assert!(validate_phone("1234567890123456").is_err());
        assert!(validate_phone("081-234-5678").is_err());
    }

    #[test]
    fn profile_names_are_trimmed_and_blank_names_rejected() {
        let update = validate_profile(ProfileUpdate {
            first_name: Some("  Somchai ".to_string()),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(update.first_name.as_deref(), Some("Somchai"));

        let blank = validate_profile(ProfileUpdate {
            last_name: Some("   ".to_string()),
            ..Default::default()
        });
        assert!(matches!(blank, Err(AppError::Validation(_))));
    }

    #[test]
    fn address_requires_lines_and_valid_coordinates() {
        let address = AddressInput {
            address_line: "99 Sukhumvit Rd".to_string(),
            district: "Watthana".to_string(),
            province: "Bangkok".to_string(),
            latitude: Some(13.73),
            longitude: Some(100.56),
            ..Default::default()
        };
        assert!(validate_address(address.clone()).is_ok());

        let off_map = AddressInput {
            latitude: Some(91.0),
            ..address.clone()
        };
        assert!(validate_address(off_map).is_err());

        let no_district = AddressInput {
            district: " ".to_string(),
            ..address
        };
        assert!(validate_address(no_district).is_err());
    }
}
