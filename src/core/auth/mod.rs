//! Caller identity.
//!
//! Credentials are minted by an external authenticator; this module only
//! verifies them. [`IdentityVerifier`] is the seam, [`JwtService`] the
//! HS256 implementation, and [`AuthenticatedUser`] the axum extractor every
//! REST handler takes.

pub mod extract;
pub mod jwt;

pub use extract::AuthenticatedUser;
pub use jwt::{Claims, JwtConfig, JwtError, JwtService};

/// Why a credential was rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdentityError {
    #[error("Missing credential")]
    Missing,

    #[error("Credential expired")]
    Expired,

    #[error("Invalid credential: {0}")]
    Invalid(String),
}

/// Turns an opaque credential into a verified caller identity.
pub trait IdentityVerifier: Send + Sync + 'static {
    fn verify(&self, credential: &str) -> Result<AuthenticatedUser, IdentityError>;
}
