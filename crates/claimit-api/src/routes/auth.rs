//! Identity routes

use crate::auth::CurrentUser;
use axum::Json;
use claimit_core::User;

/// The user named by the bearer token
pub async fn me(caller: CurrentUser) -> Json<User> {
    Json(caller.user)
}
