use axum::extract::FromRef;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};
use tracing::debug;

use crate::{error::AuthError, state::AppState};

pub const RESET_PURPOSE: &str = "reset_password";

/// Claims embedded in a password-reset token: the email proves which account
/// the token is for, the purpose pins it to the reset flow.
#[derive(Debug, Serialize, Deserialize)]
pub struct ResetClaims {
    pub sub: String,
    pub purpose: String,
    pub iat: usize,
    pub exp: usize,
}

/// Signs and verifies time-bound reset tokens. Cryptographic validity is
/// only half the check; callers must still match the token against the
/// value stored on the user record.
#[derive(Clone)]
pub struct ResetTokenKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
}

impl FromRef<AppState> for ResetTokenKeys {
    fn from_ref(state: &AppState) -> Self {
        Self::new(&state.config.reset.secret, state.config.reset.ttl_hours)
    }
}

impl ResetTokenKeys {
    pub fn new(secret: &str, ttl_hours: i64) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            ttl: Duration::hours(ttl_hours),
        }
    }

    pub fn sign(&self, email: &str) -> anyhow::Result<String> {
        self.sign_with_ttl(email, self.ttl)
    }

    pub(crate) fn sign_with_ttl(&self, email: &str, ttl: Duration) -> anyhow::Result<String> {
        let now = OffsetDateTime::now_utc();
        let claims = ResetClaims {
            sub: email.to_string(),
            purpose: RESET_PURPOSE.to_string(),
            iat: now.unix_timestamp() as usize,
            exp: (now + ttl).unix_timestamp() as usize,
        };
        let token = encode(&Header::default(), &claims, &self.encoding)?;
        debug!(email = %email, "reset token signed");
        Ok(token)
    }

    /// Any decode failure (bad signature, expired, wrong purpose) collapses
    /// to `TokenExpired`: the caller clears the stored token and restarts
    /// the forgot-password flow.
    pub fn verify(&self, token: &str) -> Result<ResetClaims, AuthError> {
        let data = decode::<ResetClaims>(token, &self.decoding, &Validation::default())
            .map_err(|e| {
                debug!(error = %e, "reset token rejected");
                AuthError::TokenExpired
            })?;
        if data.claims.purpose != RESET_PURPOSE {
            return Err(AuthError::TokenExpired);
        }
        Ok(data.claims)
    }
}
