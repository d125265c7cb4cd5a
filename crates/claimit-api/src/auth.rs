//! Bearer token authentication

use crate::error::ApiError;
use crate::AppState;
use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};
use claimit_core::identity::verify_token;
use claimit_core::{AccessPolicy, RolePolicy, User};
use std::sync::Arc;
use tracing::debug;

/// The verified caller of a request
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub user: User,
    pub admin: bool,
}

impl CurrentUser {
    pub fn new(user: User) -> Self {
        let admin = RolePolicy.is_admin(&user);
        Self { user, admin }
    }

    pub fn uid(&self) -> &str {
        &self.user.uid
    }
}

fn bearer(parts: &Parts) -> Option<&str> {
    parts
        .headers
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer(parts).ok_or(ApiError::Unauthenticated)?;
        let user = verify_token(token, &state.config.jwt_secret).map_err(|e| {
            debug!("Rejected bearer token: {}", e);
            ApiError::Unauthenticated
        })?;
        Ok(CurrentUser::new(user))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    #[test]
    fn test_bearer_extraction() {
        let (parts, _) = Request::builder()
            .header(AUTHORIZATION, "Bearer abc.def.ghi")
            .body(())
            .unwrap()
            .into_parts();
        assert_eq!(bearer(&parts), Some("abc.def.ghi"));

        let (parts, _) = Request::builder()
            .header(AUTHORIZATION, "Basic dXNlcg==")
            .body(())
            .unwrap()
            .into_parts();
        assert_eq!(bearer(&parts), None);
    }

    #[test]
    fn test_admin_flag_follows_role() {
        assert!(CurrentUser::new(User::admin("a", "a@example.com")).admin);
        assert!(!CurrentUser::new(User::member("u", "u@example.com")).admin);
    }
}
