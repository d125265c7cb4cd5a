//! ClaimIt Core
//!
//! This crate provides the workflows behind the ClaimIt lost-and-found
//! service: reporting found items, filing ownership claims, and the
//! administrator review of those claims.
//!
//! Everything persistent goes through a [`DocumentStore`]; the current user
//! comes from an [`IdentityProvider`]. The claim collection shown to an
//! administrator is owned by the [`ClaimLifecycleManager`], which patches it
//! optimistically after each write and reconciles it with the store in the
//! background.

pub mod browser;
pub mod confirm;
pub mod console;
pub mod identity;
pub mod image;
pub mod lifecycle;
pub mod model;
pub mod notify;
pub mod report;
pub mod store;
pub mod validation;

use std::time::Duration;
use thiserror::Error;

pub use browser::{ClaimAction, ClaimNotice, ItemBrowser, ItemCard};
pub use confirm::{ConfirmPrompt, ConfirmationGate, Decision, TimedConfirmation};
pub use console::{ReviewConsole, Tab, TabView};
pub use identity::{
    AccessPolicy, AuthState, IdentityProvider, Role, RolePolicy, Route, SessionIdentity, User,
};
pub use image::{DataUriEncoder, ImageNormalizer, ImageUpload};
pub use lifecycle::{ClaimLifecycleManager, ClaimsSnapshot, ClearOutcome, LoadState};
pub use model::{Category, Claim, ClaimStatus, FoundItem};
pub use notify::{Notification, Notifier, Variant};
pub use report::{ItemReporter, ReportForm};
pub use store::{DocumentStore, StoreError, StoreResult};
pub use validation::{ClaimForm, ValidationError};

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Could not load {what}: {source}")]
    Retrieval {
        what: &'static str,
        source: StoreError,
    },

    #[error("Could not write {what}: {source}")]
    Write {
        what: &'static str,
        source: StoreError,
    },

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Not authorized, redirecting to {redirect}")]
    Unauthorized { redirect: Route },

    #[error("Invalid claim transition from {from} to {to}")]
    InvalidTransition { from: ClaimStatus, to: ClaimStatus },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Claim {0} already has an update in flight")]
    Busy(String),

    #[error("Token error: {0}")]
    Token(#[from] jsonwebtoken::errors::Error),
}

pub type CoreResult<T> = Result<T, CoreError>;

/// Client-side tunables shared by every front end.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// How long a destructive confirmation stays open before it is dismissed
    pub confirm_timeout: Duration,
    /// Image shown for items reported without a picture
    pub placeholder_image: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            confirm_timeout: Duration::from_secs(12),
            placeholder_image: "/placeholder-image.svg".to_string(),
        }
    }
}
