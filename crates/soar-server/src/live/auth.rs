//! JWT validation for the live channel's `authenticate` handshake (spec
//! §4.6). Generalized from the teacher's `JwtService::validate_access_token`
//! down to validation only — this server never issues tokens, it only
//! verifies ones minted by the (out-of-scope) authentication collaborator.

use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone)]
pub struct LiveAuthConfig {
    pub secret: String,
}

impl LiveAuthConfig {
    pub fn from_env() -> Self {
        Self {
            secret: std::env::var("LIVE_CHANNEL_JWT_SECRET")
                .unwrap_or_else(|_| "dev-secret-change-me".to_string()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiveTokenClaims {
    pub sub: String,
    #[serde(rename = "organizationId")]
    pub organization_id: i64,
    #[serde(default)]
    pub permissions: Vec<String>,
    pub exp: i64,
}

#[derive(Debug, Error)]
pub enum LiveAuthError {
    #[error("invalid or expired token")]
    InvalidToken,
    #[error("token organization does not match the declared organizationId")]
    OrganizationMismatch,
}

/// Validates live-channel bearer tokens. Holds only a decoding key: this
/// server is a pure consumer of tokens issued elsewhere.
pub struct LiveAuthenticator {
    decoding_key: DecodingKey,
}

impl LiveAuthenticator {
    pub fn new(config: &LiveAuthConfig) -> Self {
        Self { decoding_key: DecodingKey::from_secret(config.secret.as_bytes()) }
    }

    /// Validates `token` and cross-checks its `organizationId` claim against
    /// the one asserted in the `authenticate` message (spec §4.6: "reject
    /// subscription to rooms belonging to a different organization than the
    /// authenticated one").
    pub fn validate(&self, token: &str, declared_organization_id: i64) -> Result<LiveTokenClaims, LiveAuthError> {
        let mut validation = Validation::default();
        validation.validate_exp = true;
        let claims = decode::<LiveTokenClaims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|_| LiveAuthError::InvalidToken)?;

        if claims.organization_id != declared_organization_id {
            return Err(LiveAuthError::OrganizationMismatch);
        }
        Ok(claims)
    }
}
