//! Dashboard Item Browser
//!
//! Lists found items newest first and runs the claim submission workflow.
//! The action offered on each item depends on whether the current user is
//! already among its claimants.

use crate::identity::{resolved_user, AccessPolicy, IdentityProvider, Route, User};
use crate::lifecycle::LoadState;
use crate::model::{claims_of, found_items, Category, Claim, ClaimStatus, FoundItem, CLAIMS};
use crate::notify::{Notification, Notifier};
use crate::store::{to_body, Direction, DocumentStore, FieldUpdate, Query, WriteBatch};
use crate::validation::ClaimForm;
use crate::{ClientConfig, CoreError, CoreResult};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimAction {
    Claim,
    /// The user already filed a claim on this item
    Reviewing,
}

impl ClaimAction {
    pub fn label(&self) -> &'static str {
        match self {
            ClaimAction::Claim => "Claim",
            ClaimAction::Reviewing => "Reviewing",
        }
    }

    pub fn enabled(&self) -> bool {
        matches!(self, ClaimAction::Claim)
    }
}

/// One item as the dashboard shows it
#[derive(Debug, Clone, PartialEq)]
pub struct ItemCard {
    pub id: String,
    pub name: String,
    pub description: String,
    pub category: Category,
    pub location_found: String,
    pub image: String,
    pub date_found: DateTime<Utc>,
    pub action: ClaimAction,
}

/// A decision on one of the user's own claims
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimNotice {
    pub claim_id: String,
    pub item_name: String,
    pub status: ClaimStatus,
    pub admin_reason: Option<String>,
}

impl From<Claim> for ClaimNotice {
    fn from(claim: Claim) -> Self {
        Self {
            claim_id: claim.id,
            item_name: claim.item_name,
            status: claim.status,
            admin_reason: claim.admin_reason,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ItemsSnapshot {
    pub load: LoadState,
    pub items: Vec<FoundItem>,
}

pub const EMPTY_TITLE: &str = "No Items Found";
pub const EMPTY_MESSAGE: &str = "There are currently no found items reported.";

pub struct ItemBrowser {
    store: Arc<dyn DocumentStore>,
    identity: Arc<dyn IdentityProvider>,
    policy: Arc<dyn AccessPolicy>,
    notifier: Arc<dyn Notifier>,
    config: ClientConfig,
    user: Option<User>,
    state: watch::Sender<ItemsSnapshot>,
}

impl ItemBrowser {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        identity: Arc<dyn IdentityProvider>,
        policy: Arc<dyn AccessPolicy>,
        notifier: Arc<dyn Notifier>,
        config: ClientConfig,
    ) -> Self {
        let (state, _) = watch::channel(ItemsSnapshot {
            load: LoadState::Loading,
            items: Vec::new(),
        });
        Self {
            store,
            identity,
            policy,
            notifier,
            config,
            user: None,
            state,
        }
    }

    /// Resolve the signed-in user and load the listing.
    ///
    /// Visitors who are not signed in are sent to sign-in before anything
    /// is read.
    pub async fn mount(&mut self) -> CoreResult<()> {
        let Some(user) = resolved_user(self.identity.as_ref()).await else {
            return Err(CoreError::Unauthorized {
                redirect: Route::SignIn,
            });
        };
        self.user = Some(user);
        self.refresh().await?;
        Ok(())
    }

    pub fn user(&self) -> Option<&User> {
        self.user.as_ref()
    }

    pub fn subscribe(&self) -> watch::Receiver<ItemsSnapshot> {
        self.state.subscribe()
    }

    pub fn items(&self) -> Vec<FoundItem> {
        self.state.borrow().items.clone()
    }

    pub fn load_state(&self) -> LoadState {
        self.state.borrow().load.clone()
    }

    /// Reload every found item, newest report first
    pub async fn refresh(&self) -> CoreResult<Vec<FoundItem>> {
        let query = Query::collection(found_items()).order_by("dateFound", Direction::Descending);
        let docs = match self.store.list(&query).await {
            Ok(docs) => docs,
            Err(source) => {
                error!("Failed to fetch items: {}", source);
                self.state.send_modify(|snap| {
                    snap.load = LoadState::Failed("Failed to load items.".to_string());
                });
                return Err(CoreError::Retrieval {
                    what: "found items",
                    source,
                });
            }
        };

        let items: Vec<FoundItem> = docs
            .iter()
            .filter_map(|doc| match FoundItem::from_document(doc) {
                Ok(item) => Some(item),
                Err(e) => {
                    warn!(path = %doc.path, "Skipping malformed item: {}", e);
                    None
                }
            })
            .collect();

        self.state.send_replace(ItemsSnapshot {
            load: LoadState::Ready,
            items: items.clone(),
        });
        Ok(items)
    }

    pub fn action_for(&self, item: &FoundItem) -> ClaimAction {
        match &self.user {
            Some(user) if item.has_claimant(&user.uid) => ClaimAction::Reviewing,
            _ => ClaimAction::Claim,
        }
    }

    pub fn cards(&self) -> Vec<ItemCard> {
        self.state
            .borrow()
            .items
            .iter()
            .map(|item| ItemCard {
                id: item.id.clone(),
                name: item.name.clone(),
                description: item.description.clone(),
                category: item.category,
                location_found: item.location_found.clone(),
                image: if item.image_url.is_empty() {
                    self.config.placeholder_image.clone()
                } else {
                    item.image_url.clone()
                },
                date_found: item.date_found,
                action: self.action_for(item),
            })
            .collect()
    }

    /// Route of the review console, for administrators only
    pub fn admin_link(&self) -> Option<Route> {
        self.user
            .as_ref()
            .filter(|user| self.policy.is_admin(user))
            .map(|_| Route::Admin)
    }

    /// File a pending claim on `item_id` for the current user.
    ///
    /// The claim and the claimant entry on the item are written in one
    /// batch. Invalid forms never reach the store.
    pub async fn submit_claim(&self, item_id: &str, form: &ClaimForm) -> CoreResult<()> {
        if let Err(invalid) = form.validate() {
            self.notifier
                .notify(Notification::failure("Validation Error", invalid.summary.clone()));
            return Err(invalid.into());
        }

        let Some(user) = self.user.as_ref() else {
            self.notifier.notify(Notification::failure(
                "Authentication Error",
                "You must be logged in to make a claim.",
            ));
            return Err(CoreError::Unauthorized {
                redirect: Route::SignIn,
            });
        };

        let item = self
            .state
            .borrow()
            .items
            .iter()
            .find(|item| item.id == item_id)
            .cloned()
            .ok_or_else(|| CoreError::NotFound(format!("found item {}", item_id)))?;

        let claim = Claim::pending(&item, &user.uid, &form.reason, &form.contact);
        let result = async {
            let batch = WriteBatch::new()
                .set(claims_of(&item.id).new_doc(), to_body(&claim)?)
                .update(
                    item.path(),
                    vec![FieldUpdate::array_union("claims", user.uid.as_str())],
                );
            self.store.commit(batch).await
        }
        .await;

        if let Err(source) = result {
            error!(item = item_id, user = %user.uid, "Failed to submit claim: {}", source);
            self.notifier.notify(Notification::failure(
                "Submission Failed",
                "An unexpected error occurred. Please try again.",
            ));
            return Err(CoreError::Write {
                what: "claim",
                source,
            });
        }

        info!(item = item_id, user = %user.uid, "Claim submitted");
        self.notifier.notify(Notification::success(
            "Claim submitted successfully!",
            "Your claim is pending review by an admin.",
        ));

        // The claim is stored; a failed reload only affects the listing
        if let Err(e) = self.refresh().await {
            warn!("Item reload after claim failed: {}", e);
        }
        Ok(())
    }

    /// The current user's claims that have been decided
    pub async fn claim_notices(&self) -> CoreResult<Vec<ClaimNotice>> {
        let Some(user) = self.user.as_ref() else {
            return Ok(Vec::new());
        };

        let query = Query::group(CLAIMS).where_eq("userId", user.uid.as_str());
        let docs = self.store.list(&query).await.map_err(|source| {
            error!(user = %user.uid, "Failed to fetch claim notices: {}", source);
            CoreError::Retrieval {
                what: "claim notices",
                source,
            }
        })?;

        Ok(docs
            .iter()
            .filter_map(|doc| Claim::from_document(doc).ok())
            .filter(Claim::is_terminal)
            .map(ClaimNotice::from)
            .collect())
    }
}
