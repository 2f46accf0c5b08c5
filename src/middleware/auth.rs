use axum::http::{header, HeaderMap};

use crate::auth::AuthError;

/// Bearer token from the Authorization header. `Ok(None)` when the header is absent;
/// a present header that is not exactly `Bearer <token>` is an error, never ignored.
pub fn bearer_token(headers: &HeaderMap) -> Result<Option<&str>, AuthError> {
    let Some(auth_header) = headers.get(header::AUTHORIZATION) else {
        return Ok(None);
    };

    let auth_str = auth_header.to_str().map_err(|_| AuthError::MalformedHeader)?;
    let token = auth_str
        .strip_prefix("Bearer ")
        .ok_or(AuthError::MalformedHeader)?;

    if token.is_empty() || token.contains(char::is_whitespace) {
        return Err(AuthError::MalformedHeader);
    }

    Ok(Some(token))
}
