use axum::{
    Json,
    extract::{Multipart, Path, Query, State, multipart::MultipartError},
    http::{StatusCode, header},
    response::IntoResponse,
};
use chrono::Utc;
use uuid::Uuid;

use crate::{
    AppState,
    auth::AuthUser,
    error::{AppError, AppResult},
    handlers::{limit_param, offset_param},
    models::{
        ALLOWED_IMAGE_TYPES, FileUploadOut, GigImagesOut, MessageOnly, MyFilesQuery,
        ProfileImageSet, UploadCategory, UploadedFile,
    },
};

const FILE_FIELD: &str = "file";

fn extension_for(content_type: &str) -> &'static str {
    match content_type {
        "image/png" => ".png",
        "image/webp" => ".webp",
        _ => ".jpg",
    }
}

fn multipart_error(err: MultipartError) -> AppError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::PayloadTooLarge("File too large".to_string())
    } else {
        AppError::BadRequest(format!("Invalid multipart body: {}", err.body_text()))
    }
}

fn public_url(state: &AppState, file_id: Uuid) -> String {
    format!(
        "{}/api/upload/{}",
        state.config.public_base_url.trim_end_matches('/'),
        file_id
    )
}

fn upload_out(state: &AppState, file: UploadedFile) -> FileUploadOut {
    FileUploadOut {
        url: public_url(state, file.id),
        id: file.id,
        filename: file.filename,
        original_filename: file.original_filename,
        file_size: file.file_size,
        content_type: file.content_type,
        upload_category: file.upload_category,
        uploaded_at: file.uploaded_at,
    }
}

/// store_upload
///
/// Reads the `file` part of a multipart body, validates name, type and size, writes the
/// bytes to object storage under `<category>/<uuid><ext>` and records the metadata row.
async fn store_upload(
    state: &AppState,
    user_id: Uuid,
    category: UploadCategory,
    mut multipart: Multipart,
) -> AppResult<UploadedFile> {
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }

        let original_filename = field
            .file_name()
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty())
            .ok_or_else(|| AppError::BadRequest("No filename provided".to_string()))?;

        let content_type = field
            .content_type()
            .map(|ct| ct.to_ascii_lowercase())
            .unwrap_or_default();
        if !ALLOWED_IMAGE_TYPES.contains(&content_type.as_str()) {
            return Err(AppError::UnsupportedMediaType(format!(
                "Unsupported file type. Allowed: {}",
                ALLOWED_IMAGE_TYPES.join(", ")
            )));
        }

        let bytes = field.bytes().await.map_err(multipart_error)?;
        if bytes.is_empty() {
            return Err(AppError::BadRequest("Uploaded file is empty".to_string()));
        }
        if bytes.len() > state.config.max_upload_bytes {
            return Err(AppError::PayloadTooLarge(format!(
                "File too large. Maximum size is {} bytes",
                state.config.max_upload_bytes
            )));
        }

        let id = Uuid::new_v4();
        let extension = extension_for(&content_type);
        let key = format!("{}/{}{}", category.as_str(), id, extension);
        let file_size = bytes.len() as i64;
        state
            .storage
            .put_object(&key, bytes.to_vec(), &content_type)
            .await?;

        let stored = state
            .repo
            .create_file(UploadedFile {
                id,
                filename: format!("{id}{extension}"),
                original_filename,
                file_path: key.clone(),
                file_size,
                content_type,
                upload_category: category.as_str().to_string(),
                uploaded_by: user_id,
                is_active: true,
                uploaded_at: Utc::now(),
            })
            .await;
        let file = match stored {
            Ok(file) => file,
            Err(err) => {
                // No row points at the object, so nothing else would ever remove it.
                if let Err(cleanup) = state.storage.delete_object(&key).await {
                    tracing::warn!(key = %key, error = %cleanup, "failed to remove orphaned upload");
                }
                return Err(err.into());
            }
        };
        tracing::info!(file_id = %file.id, user_id = %user_id, size = file.file_size, "file uploaded");
        return Ok(file);
    }

    Err(AppError::BadRequest("No file provided".to_string()))
}

/// upload_profile_image
///
/// [Authenticated Route] Uploads an image and makes it the caller's profile picture.
#[utoipa::path(
    post,
    path = "/api/upload/profile",
    request_body(content_type = "multipart/form-data", description = "Image in the `file` field"),
    responses(
        (status = 201, description = "Uploaded", body = FileUploadOut),
        (status = 400, description = "Missing file or filename"),
        (status = 413, description = "File too large"),
        (status = 415, description = "Unsupported image type")
    ),
    security(("bearer" = [])),
    tag = "uploads"
)]
pub async fn upload_profile_image(
    AuthUser { id: user_id, .. }: AuthUser,
    State(state): State<AppState>,
    multipart: Multipart,
) -> AppResult<(StatusCode, Json<FileUploadOut>)> {
    let file = store_upload(&state, user_id, UploadCategory::Profile, multipart).await?;
    let out = upload_out(&state, file);
    state.repo.set_profile_image(user_id, &out.url).await?;
    Ok((StatusCode::CREATED, Json(out)))
}

/// upload_gig_image
///
/// [Authenticated Route] Uploads an image for use in a gig's `image_urls`.
#[utoipa::path(
    post,
    path = "/api/upload/gig",
    request_body(content_type = "multipart/form-data", description = "Image in the `file` field"),
    responses(
        (status = 201, description = "Uploaded", body = FileUploadOut),
        (status = 400, description = "Missing file or filename"),
        (status = 413, description = "File too large"),
        (status = 415, description = "Unsupported image type")
    ),
    security(("bearer" = [])),
    tag = "uploads"
)]
pub async fn upload_gig_image(
    AuthUser { id: user_id, .. }: AuthUser,
    State(state): State<AppState>,
    multipart: Multipart,
) -> AppResult<(StatusCode, Json<FileUploadOut>)> {
    let file = store_upload(&state, user_id, UploadCategory::Gig, multipart).await?;
    Ok((StatusCode::CREATED, Json(upload_out(&state, file))))
}

/// serve_file
///
/// [Public Route] Streams a stored image with its recorded content type.
#[utoipa::path(
    get,
    path = "/api/upload/{file_id}",
    params(("file_id" = Uuid, Path, description = "Uploaded file id")),
    responses(
        (status = 200, description = "File bytes"),
        (status = 404, description = "File not found")
    ),
    tag = "uploads"
)]
pub async fn serve_file(
    State(state): State<AppState>,
    Path(file_id): Path<Uuid>,
) -> AppResult<impl IntoResponse> {
    let file = state
        .repo
        .get_file(file_id)
        .await?
        .ok_or_else(|| AppError::not_found("File"))?;
    let object = state.storage.get_object(&file.file_path).await?;
    Ok(([(header::CONTENT_TYPE, file.content_type)], object.bytes))
}

/// my_files
///
/// [Authenticated Route] Active uploads of the caller, newest first.
#[utoipa::path(
    get,
    path = "/api/upload/my-files",
    params(MyFilesQuery),
    responses((status = 200, description = "Uploaded files", body = [FileUploadOut])),
    security(("bearer" = [])),
    tag = "uploads"
)]
pub async fn my_files(
    AuthUser { id, .. }: AuthUser,
    State(state): State<AppState>,
    Query(query): Query<MyFilesQuery>,
) -> AppResult<Json<Vec<FileUploadOut>>> {
    let limit = limit_param(query.limit, 20, 100)?;
    let offset = offset_param(query.offset, "offset")?;
    let files = state
        .repo
        .list_user_files(id, query.category.map(|c| c.as_str()), limit, offset)
        .await?;
    Ok(Json(
        files.into_iter().map(|file| upload_out(&state, file)).collect(),
    ))
}

/// delete_file
///
/// [Authenticated Route] Uploader-only soft delete. The stored object is removed on a
/// best-effort basis.
#[utoipa::path(
    delete,
    path = "/api/upload/{file_id}",
    params(("file_id" = Uuid, Path, description = "Uploaded file id")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 404, description = "Not found or not the uploader")
    ),
    security(("bearer" = [])),
    tag = "uploads"
)]
pub async fn delete_file(
    AuthUser { id: user_id, .. }: AuthUser,
    State(state): State<AppState>,
    Path(file_id): Path<Uuid>,
) -> AppResult<StatusCode> {
    let file = state
        .repo
        .deactivate_file(file_id, user_id)
        .await?
        .ok_or_else(|| AppError::not_found("File"))?;

    if let Err(e) = state.storage.delete_object(&file.file_path).await {
        tracing::warn!(file_id = %file_id, error = %e, "stored object could not be removed");
    }
    Ok(StatusCode::NO_CONTENT)
}

/// set_profile_image
///
/// [Authenticated Route] Points the caller's profile picture at an existing URL.
#[utoipa::path(
    put,
    path = "/api/upload/profile/set",
    request_body = ProfileImageSet,
    responses(
        (status = 200, description = "Profile image updated", body = MessageOnly),
        (status = 422, description = "Empty URL")
    ),
    security(("bearer" = [])),
    tag = "uploads"
)]
pub async fn set_profile_image(
    AuthUser { id, .. }: AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<ProfileImageSet>,
) -> AppResult<Json<MessageOnly>> {
    let url = payload.profile_image_url.trim();
    if url.is_empty() {
        return Err(AppError::Validation("profile_image_url must not be empty".to_string()));
    }
    state
        .repo
        .set_profile_image(id, url)
        .await?
        .ok_or_else(|| AppError::not_found("User"))?;
    Ok(Json(MessageOnly::new("Profile image updated successfully")))
}

/// gig_images
///
/// [Public Route] Image URLs attached to a gig.
#[utoipa::path(
    get,
    path = "/api/upload/gig-images/{gig_id}",
    params(("gig_id" = Uuid, Path, description = "Gig id")),
    responses(
        (status = 200, description = "Gig images", body = GigImagesOut),
        (status = 404, description = "Gig not found")
    ),
    tag = "uploads"
)]
pub async fn gig_images(
    State(state): State<AppState>,
    Path(gig_id): Path<Uuid>,
) -> AppResult<Json<GigImagesOut>> {
    let gig = state
        .repo
        .get_gig(gig_id)
        .await?
        .ok_or_else(|| AppError::not_found("Gig"))?;
    Ok(Json(GigImagesOut {
        gig_id,
        image_urls: gig.image_urls,
    }))
}
