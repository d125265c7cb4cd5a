//! Identity Provider Adapter
//!
//! Sign-in itself belongs to an external provider. The workflows only ask
//! who the current user is and subscribe to changes of that answer.

pub mod token;

pub use token::{issue_token, verify_token, TokenClaims};

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::watch;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    Member,
    Admin,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub uid: String,
    pub email: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub role: Role,
}

impl User {
    pub fn member(uid: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            uid: uid.into(),
            email: email.into(),
            display_name: None,
            role: Role::Member,
        }
    }

    pub fn admin(uid: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            role: Role::Admin,
            ..Self::member(uid, email)
        }
    }

    /// Two-letter initials from the display name
    pub fn initials(&self) -> String {
        let Some(name) = self.display_name.as_deref() else {
            return String::new();
        };
        let words: Vec<&str> = name.split_whitespace().collect();
        match words.as_slice() {
            [] => String::new(),
            [only] => only.chars().take(2).collect::<String>().to_uppercase(),
            [first, .., last] => first
                .chars()
                .take(1)
                .chain(last.chars().take(1))
                .collect::<String>()
                .to_uppercase(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthState {
    /// The provider has not answered yet
    Loading,
    SignedOut,
    SignedIn(User),
}

impl AuthState {
    pub fn user(&self) -> Option<&User> {
        match self {
            AuthState::SignedIn(user) => Some(user),
            _ => None,
        }
    }

    pub fn is_loading(&self) -> bool {
        matches!(self, AuthState::Loading)
    }
}

/// Pages a front end may be sent to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    SignIn,
    Dashboard,
    Admin,
}

impl Route {
    pub fn path(&self) -> &'static str {
        match self {
            Route::SignIn => "/sign-in",
            Route::Dashboard => "/dashboard",
            Route::Admin => "/admin",
        }
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path())
    }
}

pub trait IdentityProvider: Send + Sync {
    fn current(&self) -> AuthState;

    /// Receiver that observes every later state; drop it to unsubscribe
    fn subscribe(&self) -> watch::Receiver<AuthState>;
}

/// Wait until the provider has answered and return the signed-in user
pub async fn resolved_user(identity: &dyn IdentityProvider) -> Option<User> {
    let mut rx = identity.subscribe();
    let state = rx.wait_for(|state| !state.is_loading()).await;
    match state {
        Ok(state) => state.user().cloned(),
        Err(_) => None,
    }
}

/// Identity state held in process and pushed to subscribers
pub struct SessionIdentity {
    state: watch::Sender<AuthState>,
}

impl SessionIdentity {
    pub fn new(initial: AuthState) -> Self {
        let (state, _) = watch::channel(initial);
        Self { state }
    }

    pub fn loading() -> Self {
        Self::new(AuthState::Loading)
    }

    pub fn signed_in(user: User) -> Self {
        Self::new(AuthState::SignedIn(user))
    }

    pub fn signed_out() -> Self {
        Self::new(AuthState::SignedOut)
    }

    pub fn set_user(&self, user: Option<User>) {
        let next = match user {
            Some(user) => AuthState::SignedIn(user),
            None => AuthState::SignedOut,
        };
        self.state.send_replace(next);
    }
}

impl IdentityProvider for SessionIdentity {
    fn current(&self) -> AuthState {
        self.state.borrow().clone()
    }

    fn subscribe(&self) -> watch::Receiver<AuthState> {
        self.state.subscribe()
    }
}

/// Decides who may use the review console
pub trait AccessPolicy: Send + Sync {
    fn is_admin(&self, user: &User) -> bool;
}

/// Administrators are the users whose identity record carries the admin role
pub struct RolePolicy;

impl AccessPolicy for RolePolicy {
    fn is_admin(&self, user: &User) -> bool {
        user.role == Role::Admin
    }
}
