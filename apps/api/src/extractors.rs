//! Request extractors
//!
//! Authentication proper is out of scope for the platform core; the caller's
//! identity arrives as an `X-User-Id` header carrying a `user_…` id.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use axon_domain::UserId;

use crate::error::ApiError;

/// Header carrying the caller's user id.
pub const USER_ID_HEADER: &str = "x-user-id";

/// The authenticated caller.
#[derive(Debug, Clone, Copy)]
pub struct CurrentUser(pub UserId);

impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let raw = parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or(ApiError::Unauthorized)?;

        let user_id = raw
            .parse::<UserId>()
            .map_err(|e| ApiError::BadRequest(format!("invalid {USER_ID_HEADER} header: {e}")))?;

        Ok(Self(user_id))
    }
}
