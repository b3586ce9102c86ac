//! Bearer-token extraction for axum handlers.

use std::sync::Arc;

use axum::{
    extract::{FromRef, FromRequestParts},
    http::{HeaderMap, request::Parts},
};
use axum_extra::{
    TypedHeader,
    headers::{Authorization, HeaderMapExt, authorization::Bearer},
};
use serde::{Deserialize, Serialize};

use super::IdentityVerifier;
use crate::core::error::CollabError;
use crate::core::models::{Role, UserId};

/// Verified caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthenticatedUser {
    pub user_id: UserId,
    pub username: String,
    pub role: Role,
}

impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
    Arc<dyn IdentityVerifier>: FromRef<S>,
{
    type Rejection = CollabError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let TypedHeader(Authorization(bearer)) =
            TypedHeader::<Authorization<Bearer>>::from_request_parts(parts, state)
                .await
                .map_err(|_| CollabError::Auth)?;

        let verifier = <Arc<dyn IdentityVerifier> as FromRef<S>>::from_ref(state);
        verifier.verify(bearer.token()).map_err(|err| {
            tracing::debug!(error = %err, "Rejected bearer credential");
            CollabError::Auth
        })
    }
}

/// Bearer token from the `Authorization` header, if any.
pub fn bearer_credential(headers: &HeaderMap) -> Option<String> {
    headers
        .typed_get::<Authorization<Bearer>>()
        .map(|Authorization(bearer)| bearer.token().to_string())
}
