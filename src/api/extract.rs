//! Request extractors that reject with [`ServiceError`].

use axum::extract::{FromRequestParts, Path};
use axum::http::request::Parts;

use crate::error::ServiceError;

/// The `{pid}` segment of `/posts/{pid}`.
///
/// A non-integer or out-of-range id is rejected with
/// [`ServiceError::InvalidPathParam`] and the usual JSON error body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PostId(pub i32);

impl<S> FromRequestParts<S> for PostId
where
    S: Send + Sync,
{
    type Rejection = ServiceError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path(pid) = Path::<i32>::from_request_parts(parts, state).await?;
        Ok(Self(pid))
    }
}
