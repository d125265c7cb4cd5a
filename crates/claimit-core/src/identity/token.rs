//! Bearer identity tokens
//!
//! HS256 tokens shared between the identity provider and the document
//! service. The role travels in the token, so no address is special.

use super::{Role, User};
use crate::CoreResult;
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    pub sub: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub role: Role,
    pub iat: i64,
    pub exp: i64,
}

impl TokenClaims {
    pub fn for_user(user: &User, ttl: Duration) -> Self {
        let now = Utc::now();
        Self {
            sub: user.uid.clone(),
            email: user.email.clone(),
            name: user.display_name.clone(),
            role: user.role,
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
        }
    }

    pub fn user(&self) -> User {
        User {
            uid: self.sub.clone(),
            email: self.email.clone(),
            display_name: self.name.clone(),
            role: self.role,
        }
    }
}

pub fn issue_token(user: &User, secret: &str, ttl: Duration) -> CoreResult<String> {
    let claims = TokenClaims::for_user(user, ttl);
    Ok(encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?)
}

pub fn verify_token(token: &str, secret: &str) -> CoreResult<User> {
    let data = decode::<TokenClaims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::new(Algorithm::HS256),
    )?;
    Ok(data.claims.user())
}
