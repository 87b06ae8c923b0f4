use std::time::{Duration, Instant};

use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode, errors::ErrorKind};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{config::AppConfig, error::AppError};

// --- Passwords ---

/// hash_password
///
/// Argon2id with a fresh random salt, encoded as a PHC string.
pub fn hash_password(plain: &str) -> Result<String, AppError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(plain.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AppError::Internal(format!("password hashing failed: {e}")))
}

/// verify_password
///
/// A malformed stored hash counts as a mismatch.
pub fn verify_password(plain: &str, hashed: &str) -> bool {
    match PasswordHash::new(hashed) {
        Ok(parsed) => Argon2::default()
            .verify_password(plain.as_bytes(), &parsed)
            .is_ok(),
        Err(e) => {
            tracing::warn!(error = %e, "stored password hash could not be parsed");
            false
        }
    }
}

// --- Tokens ---

/// TokenKind
///
/// Written into the `type` claim so a refresh token can never be replayed as an
/// access token (and vice versa).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

/// Claims
///
/// Payload carried by both token kinds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject: the user id.
    pub sub: Uuid,
    /// Unique token id, used by the blacklist and the session table.
    pub jti: Uuid,
    pub iat: i64,
    pub exp: i64,
    #[serde(rename = "type")]
    pub kind: TokenKind,
}

impl Claims {
    pub fn expires_at(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.exp, 0).unwrap_or_else(Utc::now)
    }
}

/// IssuedToken
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub jti: Uuid,
    pub expires_at: DateTime<Utc>,
}

/// TokenService
///
/// Signs and verifies JWTs with the secrets from `AppConfig`.
#[derive(Clone)]
pub struct TokenService {
    access_secret: String,
    refresh_secret: String,
    access_ttl: chrono::Duration,
    refresh_ttl: chrono::Duration,
}

impl TokenService {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            access_secret: config.access_secret.clone(),
            refresh_secret: config.refresh_secret.clone(),
            access_ttl: chrono::Duration::minutes(config.access_token_minutes),
            refresh_ttl: chrono::Duration::minutes(config.refresh_token_minutes),
        }
    }

    fn secret(&self, kind: TokenKind) -> &[u8] {
        match kind {
            TokenKind::Access => self.access_secret.as_bytes(),
            TokenKind::Refresh => self.refresh_secret.as_bytes(),
        }
    }

    /// issue
    ///
    /// Signs a new token of `kind` for `user_id` with a random jti.
    pub fn issue(&self, user_id: Uuid, kind: TokenKind) -> Result<IssuedToken, AppError> {
        let now = Utc::now();
        let ttl = match kind {
            TokenKind::Access => self.access_ttl,
            TokenKind::Refresh => self.refresh_ttl,
        };
        let expires_at = now + ttl;
        let claims = Claims {
            sub: user_id,
            jti: Uuid::new_v4(),
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
            kind,
        };

        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.secret(kind)),
        )
        .map_err(|e| AppError::Internal(format!("token signing failed: {e}")))?;

        Ok(IssuedToken {
            token,
            jti: claims.jti,
            expires_at,
        })
    }

    pub fn issue_access(&self, user_id: Uuid) -> Result<IssuedToken, AppError> {
        self.issue(user_id, TokenKind::Access)
    }

    pub fn issue_refresh(&self, user_id: Uuid) -> Result<IssuedToken, AppError> {
        self.issue(user_id, TokenKind::Refresh)
    }

    /// decode
    ///
    /// Checks signature, expiry and that the `type` claim matches `kind`.
    pub fn decode(&self, token: &str, kind: TokenKind) -> Result<Claims, AppError> {
        let mut validation = Validation::default();
        validation.validate_exp = true;

        let data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.secret(kind)),
            &validation,
        )
        .map_err(|e| match e.kind() {
            ErrorKind::ExpiredSignature => AppError::Unauthorized("Token has expired".to_string()),
            _ => AppError::Unauthorized("Could not validate credentials".to_string()),
        })?;

        if data.claims.kind != kind {
            return Err(AppError::Unauthorized("Invalid token type".to_string()));
        }
        Ok(data.claims)
    }
}

// --- Refresh Rate Limiting ---

const REFRESH_ATTEMPTS_PER_WINDOW: usize = 5;
const REFRESH_WINDOW: Duration = Duration::from_secs(60 * 60);

/// RefreshRateLimiter
///
/// Sliding-window counter keyed by client IP: at most five refresh attempts per hour.
#[derive(Debug)]
pub struct RefreshRateLimiter {
    attempts: DashMap<String, Vec<Instant>>,
    max_attempts: usize,
    window: Duration,
}

impl Default for RefreshRateLimiter {
    fn default() -> Self {
        Self::new(REFRESH_ATTEMPTS_PER_WINDOW, REFRESH_WINDOW)
    }
}

impl RefreshRateLimiter {
    pub fn new(max_attempts: usize, window: Duration) -> Self {
        Self {
            attempts: DashMap::new(),
            max_attempts,
            window,
        }
    }

    /// Records an attempt for `key` and reports whether it is within the limit.
    pub fn check(&self, key: &str) -> bool {
        let now = Instant::now();
        let mut entry = self.attempts.entry(key.to_string()).or_default();
        entry.retain(|at| now.duration_since(*at) < self.window);
        if entry.len() >= self.max_attempts {
            return false;
        }
        entry.push(now);
        true
    }

    /// Drops keys whose attempts have all aged out of the window.
    pub fn prune(&self) {
        let now = Instant::now();
        self.attempts
            .retain(|_, stamps| stamps.iter().any(|at| now.duration_since(*at) < self.window));
    }
}
