use axum::{
    Form, Json,
    extract::State,
    http::{HeaderMap, StatusCode, header},
};
use uuid::Uuid;

use crate::{
    AppState,
    auth::{AuthUser, ClientIp, bearer_token},
    error::{AppError, AppResult},
    models::{
        LoginForm, LogoutRequest, MessageOnly, NewSession, NewUser, RegisterRequest, RevokedOut,
        SuccessOut, TokenPair, UserSession,
    },
    security::{TokenKind, TokenService, hash_password, verify_password},
};

const MIN_PASSWORD_LEN: usize = 6;

fn looks_like_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !email.contains(char::is_whitespace)
        }
        None => false,
    }
}

fn user_agent(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::USER_AGENT)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
}

/// issue_session
///
/// Signs a fresh access/refresh pair and records the session that owns the refresh jti.
async fn issue_session(
    state: &AppState,
    user_id: Uuid,
    headers: &HeaderMap,
    ip: String,
) -> AppResult<TokenPair> {
    let tokens = TokenService::from_config(&state.config);
    let access = tokens.issue_access(user_id)?;
    let refresh = tokens.issue_refresh(user_id)?;

    state
        .repo
        .create_session(NewSession {
            user_id,
            refresh_jti: refresh.jti,
            user_agent: user_agent(headers),
            ip_address: Some(ip),
            expires_at: refresh.expires_at,
        })
        .await?;

    Ok(TokenPair {
        access_token: access.token,
        refresh_token: refresh.token,
        token_type: "bearer".to_string(),
    })
}

/// register
///
/// [Public Route] Creates an account from an email and password. The profile starts empty
/// and is filled in later through PUT /api/users/me.
#[utoipa::path(
    post,
    path = "/api/auth/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Account created", body = SuccessOut),
        (status = 409, description = "Email already registered"),
        (status = 422, description = "Invalid email or password")
    ),
    tag = "auth"
)]
pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> AppResult<(StatusCode, Json<SuccessOut>)> {
    let email = payload.email.trim().to_lowercase();
    if !looks_like_email(&email) {
        return Err(AppError::Validation("Invalid email address".to_string()));
    }
    if payload.password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::Validation(format!(
            "Password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }

    if state.repo.get_user_by_email(&email).await?.is_some() {
        return Err(AppError::Conflict("Email already registered".to_string()));
    }

    let hashed_password = hash_password(&payload.password)?;
    let user = state
        .repo
        .create_user(NewUser {
            email,
            hashed_password,
        })
        .await?;

    tracing::info!(user_id = %user.id, "user registered");
    Ok((StatusCode::CREATED, Json(SuccessOut { success: true })))
}

/// login
///
/// [Public Route] OAuth2 password flow. `username` carries the email address.
#[utoipa::path(
    post,
    path = "/api/auth/login",
    request_body(content = LoginForm, content_type = "application/x-www-form-urlencoded"),
    responses(
        (status = 200, description = "Token pair", body = TokenPair),
        (status = 401, description = "Incorrect email or password")
    ),
    tag = "auth"
)]
pub async fn login(
    State(state): State<AppState>,
    ClientIp(ip): ClientIp,
    headers: HeaderMap,
    Form(form): Form<LoginForm>,
) -> AppResult<Json<TokenPair>> {
    let email = form.username.trim().to_lowercase();
    let invalid = || AppError::Unauthorized("Incorrect email or password".to_string());

    let user = state
        .repo
        .get_user_by_email(&email)
        .await?
        .ok_or_else(invalid)?;
    if !verify_password(&form.password, &user.hashed_password) {
        tracing::debug!(user_id = %user.id, "password mismatch");
        return Err(invalid());
    }

    let pair = issue_session(&state, user.id, &headers, ip).await?;
    tracing::info!(user_id = %user.id, "user logged in");
    Ok(Json(pair))
}

/// refresh
///
/// [Public Route] Rotates a refresh token. The presented token's session is closed and its
/// jti blacklisted before a new pair is issued. Presenting a refresh token that was already
/// rotated (or never belonged to a session) is treated as token theft: every session of the
/// user is revoked.
#[utoipa::path(
    post,
    path = "/api/auth/refresh",
    responses(
        (status = 200, description = "New token pair", body = TokenPair),
        (status = 401, description = "Invalid, expired or reused refresh token"),
        (status = 429, description = "Too many refresh attempts")
    ),
    security(("bearer" = [])),
    tag = "auth"
)]
pub async fn refresh(
    State(state): State<AppState>,
    ClientIp(ip): ClientIp,
    headers: HeaderMap,
) -> AppResult<Json<TokenPair>> {
    if !state.refresh_limiter.check(&ip) {
        tracing::warn!(ip = %ip, "refresh rate limit exceeded");
        return Err(AppError::TooManyRequests(
            "Too many refresh attempts, try again later".to_string(),
        ));
    }

    let token = bearer_token(&headers)
        .ok_or_else(|| AppError::Unauthorized("Not authenticated".to_string()))?;
    let claims = TokenService::from_config(&state.config).decode(token, TokenKind::Refresh)?;

    if state.repo.is_token_blacklisted(claims.jti).await? {
        return Err(reject_reused_refresh(&state, claims.sub).await);
    }

    if state.repo.get_user(claims.sub).await?.is_none() {
        return Err(AppError::Unauthorized("Could not validate credentials".to_string()));
    }

    // Closing the session is the single gate: a rotated, revoked or expired session, or a
    // concurrent refresh that closed it first, all land on the reuse path.
    if !state.repo.deactivate_session(claims.jti).await? {
        return Err(reject_reused_refresh(&state, claims.sub).await);
    }
    state
        .repo
        .blacklist_token(claims.jti, claims.sub, claims.expires_at())
        .await?;

    let pair = issue_session(&state, claims.sub, &headers, ip).await?;
    tracing::debug!(user_id = %claims.sub, "refresh token rotated");
    Ok(Json(pair))
}

/// Revokes every session of `user_id` after a refresh token was presented twice.
async fn reject_reused_refresh(state: &AppState, user_id: Uuid) -> AppError {
    match state.repo.deactivate_user_sessions(user_id).await {
        Ok(revoked) => {
            tracing::warn!(user_id = %user_id, revoked, "refresh token reuse detected");
            AppError::Unauthorized("Refresh token is no longer valid".to_string())
        }
        Err(e) => e.into(),
    }
}

/// logout
///
/// [Authenticated Route] Revokes the access token used for this request. When the body
/// names a refresh token of the same user, that session is closed as well.
#[utoipa::path(
    post,
    path = "/api/auth/logout",
    request_body = LogoutRequest,
    responses((status = 200, description = "Logged out", body = MessageOnly)),
    security(("bearer" = [])),
    tag = "auth"
)]
pub async fn logout(
    auth: AuthUser,
    State(state): State<AppState>,
    body: Option<Json<LogoutRequest>>,
) -> AppResult<Json<MessageOnly>> {
    if let Some(meta) = &auth.token {
        state
            .repo
            .blacklist_token(meta.jti, auth.id, meta.expires_at)
            .await?;
    }

    let refresh_token = body.and_then(|Json(req)| req.refresh_token);
    if let Some(raw) = refresh_token {
        // A foreign or malformed refresh token is ignored; the access token is already revoked.
        match TokenService::from_config(&state.config).decode(&raw, TokenKind::Refresh) {
            Ok(claims) if claims.sub == auth.id => {
                state.repo.deactivate_session(claims.jti).await?;
                state
                    .repo
                    .blacklist_token(claims.jti, auth.id, claims.expires_at())
                    .await?;
            }
            Ok(_) => tracing::warn!(user_id = %auth.id, "logout with another user's refresh token"),
            Err(_) => tracing::debug!(user_id = %auth.id, "logout with unusable refresh token"),
        }
    }

    tracing::info!(user_id = %auth.id, "user logged out");
    Ok(Json(MessageOnly::new("Successfully logged out")))
}

/// logout_all
///
/// [Authenticated Route] Closes every session of the caller, then revokes the current
/// access token.
#[utoipa::path(
    post,
    path = "/api/auth/logout-all",
    responses((status = 200, description = "Sessions revoked", body = RevokedOut)),
    security(("bearer" = [])),
    tag = "auth"
)]
pub async fn logout_all(
    auth: AuthUser,
    State(state): State<AppState>,
) -> AppResult<Json<RevokedOut>> {
    let revoked = state.repo.deactivate_user_sessions(auth.id).await?;
    if let Some(meta) = &auth.token {
        state
            .repo
            .blacklist_token(meta.jti, auth.id, meta.expires_at)
            .await?;
    }
    tracing::info!(user_id = %auth.id, revoked, "all sessions revoked");
    Ok(Json(RevokedOut { revoked }))
}

/// list_sessions
///
/// [Authenticated Route] Active sessions of the caller, newest first.
#[utoipa::path(
    get,
    path = "/api/auth/sessions",
    responses((status = 200, description = "Active sessions", body = [UserSession])),
    security(("bearer" = [])),
    tag = "auth"
)]
pub async fn list_sessions(
    AuthUser { id, .. }: AuthUser,
    State(state): State<AppState>,
) -> AppResult<Json<Vec<UserSession>>> {
    let sessions = state.repo.list_active_sessions(id).await?;
    Ok(Json(sessions))
}

#[cfg(test)]
mod tests {
    use super::looks_like_email;

    #[test]
    fn email_shape_check() {
        assert!(looks_like_email("somchai@example.com"));
        assert!(looks_like_email("a.b+c@mail.co.th"));
        assert!(!looks_like_email("no-at-sign"));
        assert!(!looks_like_email("@example.com"));
        assert!(!looks_like_email("user@localhost"));
        assert!(!looks_like_email("user@@example.com"));
        assert!(!looks_like_email("us er@example.com"));
    }
}
