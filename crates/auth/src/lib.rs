//! `repset-auth` — authentication/authorization boundary.
//!
//! Transport-agnostic except for `jwt`, which decodes and verifies the HS256
//! bearer tokens the HTTP layer carries.

pub mod claims;
pub mod jwt;
pub mod principal;

pub use claims::{JwtClaims, TokenValidationError, validate_claims};
pub use jwt::Hs256JwtValidator;
pub use principal::{
    AuthzError, Permission, Principal, PrincipalId, Role, TenantMembership, authorize,
};
