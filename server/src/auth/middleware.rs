//! Authentication middleware.
//!
//! With `AUTH_SECRET` configured every request carries
//! `Authorization: Bearer <token>`, a token signed with that secret for the
//! user whose documents it touches. Without a secret the server runs open:
//! headers are ignored and requests may address any user.

use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};

use farmasync_engine::verify_user_token;

use crate::error::AppError;
use crate::AppState;

/// Authenticated caller extracted from the request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthUser {
    /// The user named by a verified bearer token; `None` for anonymous access
    pub user_id: Option<String>,
}

impl AuthUser {
    /// Check that the caller may act on `user_id`'s documents.
    pub fn authorize(&self, user_id: &str) -> Result<(), AppError> {
        match &self.user_id {
            Some(caller) if caller != user_id => Err(AppError::Forbidden(format!(
                "token for {caller} cannot access documents of {user_id}"
            ))),
            _ => Ok(()),
        }
    }
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let Some(secret) = state.config.auth_secret.as_deref() else {
            return Ok(AuthUser { user_id: None });
        };

        let auth_header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok());

        match auth_header {
            Some(header) if header.starts_with("Bearer ") => {
                let token = header.trim_start_matches("Bearer ").trim();
                if token.is_empty() {
                    return Err(AppError::Unauthorized("Empty bearer token"));
                }

                let user_id = verify_user_token(secret, token)
                    .ok_or(AppError::Unauthorized("Invalid bearer token"))?;
                Ok(AuthUser {
                    user_id: Some(user_id),
                })
            }
            Some(_) => Err(AppError::Unauthorized(
                "Invalid authorization header format",
            )),
            None => Err(AppError::Unauthorized("Missing authorization header")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn anonymous_may_access_anyone() {
        let anonymous = AuthUser { user_id: None };
        assert!(anonymous.authorize("u1").is_ok());
    }

    #[test]
    fn token_must_match_user() {
        let caller = AuthUser {
            user_id: Some("u1".to_string()),
        };
        assert!(caller.authorize("u1").is_ok());
        assert!(matches!(
            caller.authorize("u2"),
            Err(AppError::Forbidden(_))
        ));
    }
}
