//! HS256 bearer-token verification.

use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use repset_core::TenantId;

use crate::{JwtClaims, PrincipalId, Role, TokenValidationError, validate_claims};

/// Claims exactly as they sit on the wire.
#[derive(Debug, Serialize, Deserialize)]
pub struct WireClaims {
    pub sub: Uuid,
    pub tenant_id: Uuid,
    pub roles: Vec<String>,
    pub iat: i64,
    pub exp: i64,
}

/// Verifies HS256 tokens and turns them into [`JwtClaims`].
pub struct Hs256JwtValidator {
    key: DecodingKey,
    validation: Validation,
}

impl Hs256JwtValidator {
    pub fn new(secret: Vec<u8>) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        // Time-window checks run in `validate_claims` against an injected
        // clock, so they stay deterministic in tests.
        validation.validate_exp = false;
        validation.required_spec_claims.clear();
        Self {
            key: DecodingKey::from_secret(&secret),
            validation,
        }
    }

    /// Verify the signature and the claim window, then hand back the claims.
    pub fn validate(&self, token: &str, now: DateTime<Utc>) -> Result<JwtClaims, TokenValidationError> {
        let wire = decode::<WireClaims>(token, &self.key, &self.validation)
            .map_err(|_| TokenValidationError::Invalid)?
            .claims;

        let issued_at = DateTime::from_timestamp(wire.iat, 0).ok_or(TokenValidationError::Invalid)?;
        let expires_at = DateTime::from_timestamp(wire.exp, 0).ok_or(TokenValidationError::Invalid)?;

        let claims = JwtClaims {
            sub: PrincipalId::from_uuid(wire.sub),
            tenant_id: TenantId::from_uuid(wire.tenant_id),
            roles: wire.roles.into_iter().map(Role::new).collect(),
            issued_at,
            expires_at,
        };
        validate_claims(&claims, now)?;
        Ok(claims)
    }
}
