//! Bearer tokens for the Kling API: short-lived HS256 JWTs signed with the
//! secret key, with the access key as issuer.

use chrono::Utc;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::error::AuthError;

/// Token validity window.
const TOKEN_TTL_SECS: i64 = 1800;
/// Backdating of `nbf` to absorb clock skew.
const NOT_BEFORE_SKEW_SECS: i64 = 5;
/// Cached tokens are replaced well before they expire.
const REFRESH_AFTER: Duration = Duration::from_secs(1500);

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub iss: String,
    pub exp: i64,
    pub nbf: i64,
}

struct CachedToken {
    token: String,
    issued: Instant,
}

/// Signs and caches API tokens. Safe to share between concurrent jobs.
pub struct TokenSigner {
    access_key: String,
    secret_key: String,
    cached: Mutex<Option<CachedToken>>,
}

impl fmt::Debug for TokenSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenSigner")
            .field("access_key", &self.access_key)
            .finish_non_exhaustive()
    }
}

impl TokenSigner {
    pub fn new(access_key: impl Into<String>, secret_key: impl Into<String>) -> Self {
        Self {
            access_key: access_key.into(),
            secret_key: secret_key.into(),
            cached: Mutex::new(None),
        }
    }

    /// Returns a valid token, signing a new one when the cached token is stale.
    pub fn bearer(&self) -> Result<String, AuthError> {
        let mut guard = self.cached.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(cached) = guard.as_ref() {
            if cached.issued.elapsed() < REFRESH_AFTER {
                return Ok(cached.token.clone());
            }
        }

        let token = encode_token(&self.access_key, &self.secret_key, Utc::now().timestamp())?;
        *guard = Some(CachedToken {
            token: token.clone(),
            issued: Instant::now(),
        });
        Ok(token)
    }
}

pub fn encode_token(access_key: &str, secret_key: &str, now: i64) -> Result<String, AuthError> {
    let claims = Claims {
        iss: access_key.to_string(),
        exp: now + TOKEN_TTL_SECS,
        nbf: now - NOT_BEFORE_SKEW_SECS,
    };
    let token = jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret_key.as_bytes()),
    )?;
    Ok(token)
}
