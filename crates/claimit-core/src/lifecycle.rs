//! Claim Lifecycle Manager
//!
//! Owns the claim collection shown to administrators. Writes are patched
//! into the local collection as soon as the store accepts them, then a
//! background fetch reconciles the collection with the store.
//!
//! Every local patch bumps `sequence`. A fetch remembers the sequence it
//! started at and its result is dropped if a patch landed in the meantime,
//! so a slow reconciliation never overwrites a newer local change.

use crate::confirm::{ConfirmPrompt, ConfirmationGate, Decision};
use crate::model::{claim_path, item_path, Claim, ClaimStatus, CLAIMS};
use crate::notify::{Notification, Notifier};
use crate::store::{DocPath, DocumentStore, FieldUpdate, Query, StoreError, WriteBatch};
use crate::validation::{validate_admin_reason, ValidationError};
use crate::{CoreError, CoreResult};
use futures::future::join_all;
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadState {
    Loading,
    Ready,
    /// Last fetch failed; the message is safe to show
    Failed(String),
}

/// What observers of the manager see
#[derive(Debug, Clone)]
pub struct ClaimsSnapshot {
    pub load: LoadState,
    /// In the order the store returned them
    pub claims: Vec<Claim>,
    /// Number of local mutations applied so far
    pub sequence: u64,
    /// Bumped on every published change
    pub revision: u64,
}

impl ClaimsSnapshot {
    fn initial() -> Self {
        Self {
            load: LoadState::Loading,
            claims: Vec::new(),
            sequence: 0,
            revision: 0,
        }
    }

    pub fn with_status(&self, status: ClaimStatus) -> Vec<&Claim> {
        self.claims.iter().filter(|c| c.status == status).collect()
    }

    pub fn count(&self, status: ClaimStatus) -> usize {
        self.claims.iter().filter(|c| c.status == status).count()
    }

    pub fn find(&self, claim_id: &str) -> Option<&Claim> {
        self.claims.iter().find(|c| c.id == claim_id)
    }
}

/// Result of a history clearing request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClearOutcome {
    NothingToClear,
    Cancelled,
    /// The prompt timed out without an answer
    Dismissed,
    Cleared(usize),
}

struct Inner {
    store: Arc<dyn DocumentStore>,
    notifier: Arc<dyn Notifier>,
    state: watch::Sender<ClaimsSnapshot>,
    reconciliations: Mutex<Vec<JoinHandle<()>>>,
}

#[derive(Clone)]
pub struct ClaimLifecycleManager {
    inner: Arc<Inner>,
}

impl ClaimLifecycleManager {
    pub fn new(store: Arc<dyn DocumentStore>, notifier: Arc<dyn Notifier>) -> Self {
        let (state, _) = watch::channel(ClaimsSnapshot::initial());
        Self {
            inner: Arc::new(Inner {
                store,
                notifier,
                state,
                reconciliations: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<ClaimsSnapshot> {
        self.inner.state.subscribe()
    }

    pub fn snapshot(&self) -> ClaimsSnapshot {
        self.inner.state.borrow().clone()
    }

    pub(crate) fn notifier(&self) -> &dyn Notifier {
        self.inner.notifier.as_ref()
    }

    /// Read every claim under every item and publish them.
    ///
    /// A failure is published as [`LoadState::Failed`]; call again to retry.
    pub async fn fetch_all(&self) -> CoreResult<Vec<Claim>> {
        self.fetch(true).await
    }

    async fn fetch(&self, publish_failure: bool) -> CoreResult<Vec<Claim>> {
        let started = self.inner.state.borrow().sequence;
        self.inner.state.send_if_modified(|snap| {
            if matches!(snap.load, LoadState::Failed(_)) {
                snap.load = LoadState::Loading;
                snap.revision += 1;
                return true;
            }
            false
        });

        let docs = match self.inner.store.list(&Query::group(CLAIMS)).await {
            Ok(docs) => docs,
            Err(source) => {
                error!(backend = self.inner.store.backend_tag(), "Failed to fetch claims: {}", source);
                if publish_failure {
                    self.inner.state.send_if_modified(|snap| {
                        if snap.sequence != started {
                            return false;
                        }
                        snap.load = LoadState::Failed("Could not load claims.".to_string());
                        snap.revision += 1;
                        true
                    });
                }
                return Err(CoreError::Retrieval {
                    what: "claims",
                    source,
                });
            }
        };

        let claims: Vec<Claim> = docs
            .iter()
            .filter_map(|doc| match Claim::from_document(doc) {
                Ok(claim) => Some(claim),
                Err(e) => {
                    warn!(path = %doc.path, "Skipping malformed claim: {}", e);
                    None
                }
            })
            .collect();

        let applied = self.inner.state.send_if_modified(|snap| {
            if snap.sequence != started {
                return false;
            }
            snap.claims = claims.clone();
            snap.load = LoadState::Ready;
            snap.revision += 1;
            true
        });
        if applied {
            debug!(count = claims.len(), "Claims snapshot applied");
        } else {
            debug!(started, "Discarding claims snapshot older than a local change");
        }

        Ok(claims)
    }

    /// Move a pending claim to `status` with the administrator's reason.
    ///
    /// Approving also deletes the parent item in the same batch.
    pub async fn transition(
        &self,
        claim_id: &str,
        found_item_id: &str,
        status: ClaimStatus,
        admin_reason: &str,
    ) -> CoreResult<()> {
        let (current, sibling_approved) = {
            let snap = self.inner.state.borrow();
            let current = snap
                .claims
                .iter()
                .find(|c| c.id == claim_id && c.found_item_id == found_item_id)
                .map(|c| c.status);
            let sibling_approved = snap.claims.iter().any(|c| {
                c.found_item_id == found_item_id
                    && c.id != claim_id
                    && c.status == ClaimStatus::Approved
            });
            (current, sibling_approved)
        };
        let Some(current) = current else {
            return Err(CoreError::NotFound(format!("claim {}", claim_id)));
        };
        current.transition_to(status)?;
        let reason = validate_admin_reason(admin_reason)?.to_string();

        let claim = claim_path(found_item_id, claim_id);
        let item = item_path(found_item_id);
        if status == ClaimStatus::Approved {
            self.ensure_item_available(found_item_id, &item, sibling_approved)
                .await?;
        }

        let mut batch = WriteBatch::new()
            .update(
                claim.clone(),
                vec![
                    FieldUpdate::set("status", status.name()),
                    FieldUpdate::set("adminReason", reason.as_str()),
                ],
            )
            .expect_field(claim, "status", current.name());
        if status == ClaimStatus::Approved {
            batch = batch.delete(item.clone()).expect_exists(item);
        }

        if let Err(source) = self.inner.store.commit(batch).await {
            error!(claim = claim_id, status = %status, "Failed to update claim: {}", source);
            self.inner.notifier.notify(Notification::failure(
                "Update Failed",
                format!("Could not {} the claim.", status.verb()),
            ));
            if matches!(source, StoreError::FailedPrecondition(_)) {
                self.reconcile();
            }
            return Err(CoreError::Write {
                what: "claim",
                source,
            });
        }

        self.inner.state.send_modify(|snap| {
            snap.sequence += 1;
            snap.revision += 1;
            if let Some(claim) = snap
                .claims
                .iter_mut()
                .find(|c| c.id == claim_id && c.found_item_id == found_item_id)
            {
                claim.status = status;
                claim.admin_reason = Some(reason.clone());
            }
        });
        info!(claim = claim_id, item = found_item_id, status = %status, "Claim transitioned");

        let notification = match status {
            ClaimStatus::Approved => Notification::success(
                "Claim Approved & Item Removed",
                "The item has been removed from the dashboard.",
            ),
            _ => Notification::success("Claim Rejected", "The claim status has been updated."),
        };
        self.inner.notifier.notify(notification);

        self.reconcile();
        Ok(())
    }

    /// An item can be given away once: refuse when another claim on it was
    /// approved or the item is gone from the store.
    async fn ensure_item_available(
        &self,
        found_item_id: &str,
        item: &DocPath,
        sibling_approved: bool,
    ) -> CoreResult<()> {
        let present = if sibling_approved {
            false
        } else {
            match self.inner.store.get(item).await {
                Ok(doc) => doc.is_some(),
                Err(source) => {
                    error!(item = found_item_id, "Failed to look up item: {}", source);
                    self.inner.notifier.notify(Notification::failure(
                        "Update Failed",
                        "Could not approve the claim.",
                    ));
                    return Err(CoreError::Retrieval {
                        what: "found item",
                        source,
                    });
                }
            }
        };
        if present {
            return Ok(());
        }

        warn!(item = found_item_id, "Refusing approval, item already claimed");
        self.inner.notifier.notify(Notification::failure(
            "Update Failed",
            "This item has already been claimed.",
        ));
        Err(CoreError::NotFound(format!("found item {}", found_item_id)))
    }

    /// Delete every claim in `status` after the user confirms.
    pub async fn clear_history(
        &self,
        status: ClaimStatus,
        gate: &dyn ConfirmationGate,
    ) -> CoreResult<ClearOutcome> {
        if !status.is_terminal() {
            return Err(ValidationError::single(
                "status",
                "Only approved or rejected history can be cleared.",
            )
            .into());
        }
        let label = status.lowercase();

        let targets: BTreeSet<DocPath> = self
            .inner
            .state
            .borrow()
            .with_status(status)
            .into_iter()
            .map(Claim::path)
            .collect();
        if targets.is_empty() {
            self.inner
                .notifier
                .notify(Notification::info(format!("No {} history to clear.", label)));
            return Ok(ClearOutcome::NothingToClear);
        }

        let prompt = ConfirmPrompt::new(
            format!("Clear {} History", status.name()),
            format!("Are you sure you want to clear all {} claims?", label),
        )
        .confirm_label("Clear");

        match gate.confirm(&prompt).await {
            Decision::Confirmed => {}
            Decision::Cancelled => {
                self.inner
                    .notifier
                    .notify(Notification::info("Cancelled").with_description("No changes were made."));
                return Ok(ClearOutcome::Cancelled);
            }
            Decision::TimedOut => {
                debug!(status = %status, "History clearing dismissed");
                return Ok(ClearOutcome::Dismissed);
            }
        }

        let batch = targets
            .iter()
            .cloned()
            .fold(WriteBatch::new(), |batch, path| batch.delete(path));
        if let Err(source) = self.inner.store.commit(batch).await {
            error!(status = %status, count = targets.len(), "Failed to clear history: {}", source);
            self.inner.notifier.notify(Notification::failure(
                "Deletion Failed",
                format!("Could not clear {} history.", label),
            ));
            return Err(CoreError::Write {
                what: "claim history",
                source,
            });
        }

        self.inner.state.send_modify(|snap| {
            snap.sequence += 1;
            snap.revision += 1;
            snap.claims.retain(|c| !targets.contains(&c.path()));
        });
        info!(status = %status, count = targets.len(), "Claim history cleared");
        self.inner.notifier.notify(Notification::success(
            "History Cleared",
            format!("All {} claims have been deleted.", label),
        ));

        self.reconcile();
        Ok(ClearOutcome::Cleared(targets.len()))
    }

    /// Re-read the collection in the background after a local patch
    fn reconcile(&self) {
        let manager = self.clone();
        let handle = tokio::spawn(async move {
            if let Err(e) = manager.fetch(false).await {
                warn!("Claim reconciliation failed: {}", e);
            }
        });

        let mut pending = self
            .inner
            .reconciliations
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        pending.retain(|h| !h.is_finished());
        pending.push(handle);
    }

    /// Wait for every background reconciliation started so far
    pub async fn settle(&self) {
        let pending: Vec<JoinHandle<()>> = {
            let mut guard = self
                .inner
                .reconciliations
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            std::mem::take(&mut *guard)
        };
        for result in join_all(pending).await {
            if let Err(e) = result {
                warn!("Claim reconciliation task ended abnormally: {}", e);
            }
        }
    }
}
