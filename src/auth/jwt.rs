use axum::extract::FromRef;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};
use tracing::debug;
use uuid::Uuid;

use crate::config::JwtConfig;
use crate::state::AppState;

/// Single-use action tokens (password reset, email verification) carry their
/// own fixed short expiration.
const ACTION_TTL_MINUTES: i64 = 30;

/// Which signing secret a token belongs to. Reset tokens deliberately reuse
/// the refresh secret and verification tokens the access secret; their
/// single-use property comes from the exact-match check against the user
/// record, not from a separate key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenClass {
    Access,
    Refresh,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub iat: usize,
    pub exp: usize,
}

/// Expiry is distinguished from every other decode failure internally; the
/// API boundary collapses both into one message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum TokenError {
    #[error("token expired")]
    Expired,
    #[error("invalid token")]
    Invalid,
}

#[derive(Clone)]
pub struct JwtKeys {
    access_encoding: EncodingKey,
    access_decoding: DecodingKey,
    refresh_encoding: EncodingKey,
    refresh_decoding: DecodingKey,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl FromRef<AppState> for JwtKeys {
    fn from_ref(state: &AppState) -> Self {
        Self::new(&state.config.jwt)
    }
}

impl JwtKeys {
    pub fn new(config: &JwtConfig) -> Self {
        Self {
            access_encoding: EncodingKey::from_secret(config.access_secret.as_bytes()),
            access_decoding: DecodingKey::from_secret(config.access_secret.as_bytes()),
            refresh_encoding: EncodingKey::from_secret(config.refresh_secret.as_bytes()),
            refresh_decoding: DecodingKey::from_secret(config.refresh_secret.as_bytes()),
            access_ttl: Duration::minutes(config.access_ttl_minutes),
            refresh_ttl: Duration::minutes(config.refresh_ttl_minutes),
        }
    }

    fn sign(
        &self,
        class: TokenClass,
        sub: Uuid,
        email: Option<String>,
        ttl: Duration,
    ) -> anyhow::Result<String> {
        let now = OffsetDateTime::now_utc();
        let claims = Claims {
            sub,
            email,
            iat: now.unix_timestamp() as usize,
            exp: (now + ttl).unix_timestamp() as usize,
        };
        let encoding = match class {
            TokenClass::Access => &self.access_encoding,
            TokenClass::Refresh => &self.refresh_encoding,
        };
        let token = encode(&Header::default(), &claims, encoding)?;
        debug!(user_id = %sub, class = ?class, "jwt signed");
        Ok(token)
    }

    pub fn issue_access(&self, sub: Uuid, email: Option<String>) -> anyhow::Result<String> {
        self.sign(TokenClass::Access, sub, email, self.access_ttl)
    }

    pub fn issue_refresh(&self, sub: Uuid, email: Option<String>) -> anyhow::Result<String> {
        self.sign(TokenClass::Refresh, sub, email, self.refresh_ttl)
    }

    /// Password-reset action token: refresh-secret class, 30 minutes.
    pub fn issue_reset(&self, sub: Uuid) -> anyhow::Result<String> {
        self.sign(
            TokenClass::Refresh,
            sub,
            None,
            Duration::minutes(ACTION_TTL_MINUTES),
        )
    }

    /// Email-verification action token: access-secret class, 30 minutes.
    pub fn issue_verification(&self, sub: Uuid) -> anyhow::Result<String> {
        self.sign(
            TokenClass::Access,
            sub,
            None,
            Duration::minutes(ACTION_TTL_MINUTES),
        )
    }

    pub fn verify(&self, token: &str, class: TokenClass) -> Result<Claims, TokenError> {
        let decoding = match class {
            TokenClass::Access => &self.access_decoding,
            TokenClass::Refresh => &self.refresh_decoding,
        };
        let mut validation = Validation::default();
        validation.leeway = 0;
        let data = decode::<Claims>(token, decoding, &validation).map_err(|e| {
            match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => TokenError::Expired,
                _ => TokenError::Invalid,
            }
        })?;
        debug!(user_id = %data.claims.sub, class = ?class, "jwt verified");
        Ok(data.claims)
    }
}
