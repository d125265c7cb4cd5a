//! Admin Review Console
//!
//! Shows the manager's claims one status bucket at a time and drives the
//! review decisions. Only administrators get past `mount`.

use crate::confirm::ConfirmationGate;
use crate::identity::{resolved_user, AccessPolicy, IdentityProvider, Route};
use crate::lifecycle::{ClaimLifecycleManager, ClaimsSnapshot, ClearOutcome, LoadState};
use crate::model::{Claim, ClaimStatus};
use crate::notify::Notification;
use crate::{CoreError, CoreResult};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::debug;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Tab {
    #[default]
    Pending,
    Approved,
    Rejected,
}

impl Tab {
    pub const ALL: [Tab; 3] = [Tab::Pending, Tab::Approved, Tab::Rejected];

    pub fn status(&self) -> ClaimStatus {
        match self {
            Tab::Pending => ClaimStatus::Pending,
            Tab::Approved => ClaimStatus::Approved,
            Tab::Rejected => ClaimStatus::Rejected,
        }
    }

    /// Status whose history this tab can clear
    pub fn history_status(&self) -> Option<ClaimStatus> {
        Some(self.status()).filter(ClaimStatus::is_terminal)
    }

    pub fn label(&self, count: usize) -> String {
        match self {
            Tab::Pending => format!("Pending Claims ({})", count),
            Tab::Approved => format!("Approved History ({})", count),
            Tab::Rejected => format!("Rejected History ({})", count),
        }
    }
}

impl fmt::Display for Tab {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.status().lowercase())
    }
}

impl FromStr for Tab {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let status: ClaimStatus = s.parse()?;
        Ok(match status {
            ClaimStatus::Pending => Tab::Pending,
            ClaimStatus::Approved => Tab::Approved,
            ClaimStatus::Rejected => Tab::Rejected,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReviewActions {
    /// False while a decision on this claim is in flight
    pub enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewCard {
    pub claim: Claim,
    pub badge: ClaimStatus,
    /// Approve / Reject, offered on pending claims only
    pub actions: Option<ReviewActions>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClearAction {
    pub label: String,
    pub enabled: bool,
}

/// Everything needed to draw the selected tab
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TabView {
    pub tab: Tab,
    pub load: LoadState,
    pub cards: Vec<ReviewCard>,
    pub clear_action: Option<ClearAction>,
    pub empty_message: Option<String>,
}

/// Releases the in-flight mark when the decision finishes
struct InFlight<'a> {
    claims: &'a Mutex<HashSet<String>>,
    claim_id: String,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.claims
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.claim_id);
    }
}

pub struct ReviewConsole {
    manager: ClaimLifecycleManager,
    identity: Arc<dyn IdentityProvider>,
    policy: Arc<dyn AccessPolicy>,
    gate: Arc<dyn ConfirmationGate>,
    active: Tab,
    in_flight: Mutex<HashSet<String>>,
}

impl ReviewConsole {
    pub fn new(
        manager: ClaimLifecycleManager,
        identity: Arc<dyn IdentityProvider>,
        policy: Arc<dyn AccessPolicy>,
        gate: Arc<dyn ConfirmationGate>,
    ) -> Self {
        Self {
            manager,
            identity,
            policy,
            gate,
            active: Tab::default(),
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    /// Check access, then load every claim.
    ///
    /// Anyone who is not an administrator is sent to the dashboard before
    /// the store is read.
    pub async fn mount(&self) -> CoreResult<()> {
        let user = resolved_user(self.identity.as_ref()).await;
        if !user.is_some_and(|user| self.policy.is_admin(&user)) {
            debug!("Review console refused to a non-administrator");
            return Err(CoreError::Unauthorized {
                redirect: Route::Dashboard,
            });
        }
        self.manager.fetch_all().await?;
        Ok(())
    }

    pub fn manager(&self) -> &ClaimLifecycleManager {
        &self.manager
    }

    pub fn active_tab(&self) -> Tab {
        self.active
    }

    pub fn select_tab(&mut self, tab: Tab) {
        self.active = tab;
    }

    /// Every tab with its counted label
    pub fn tabs(&self) -> Vec<(Tab, String)> {
        let snapshot = self.manager.snapshot();
        Tab::ALL
            .into_iter()
            .map(|tab| (tab, tab.label(snapshot.count(tab.status()))))
            .collect()
    }

    pub fn view(&self) -> TabView {
        let snapshot = self.manager.snapshot();
        self.view_of(&snapshot)
    }

    fn view_of(&self, snapshot: &ClaimsSnapshot) -> TabView {
        let tab = self.active;
        let busy = self
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        let cards: Vec<ReviewCard> = snapshot
            .with_status(tab.status())
            .into_iter()
            .map(|claim| ReviewCard {
                claim: claim.clone(),
                badge: claim.status,
                actions: (!claim.is_terminal()).then(|| ReviewActions {
                    enabled: !busy.contains(&claim.id),
                }),
            })
            .collect();

        let clear_action = tab.history_status().map(|status| ClearAction {
            label: format!("Clear {} History", status.name()),
            enabled: !cards.is_empty(),
        });
        let empty_message = cards
            .is_empty()
            .then(|| format!("No {} claims yet.", tab.status().lowercase()));

        TabView {
            tab,
            load: snapshot.load.clone(),
            cards,
            clear_action,
            empty_message,
        }
    }

    pub async fn approve(&self, claim_id: &str, reason: &str) -> CoreResult<()> {
        self.decide(claim_id, ClaimStatus::Approved, reason).await
    }

    pub async fn reject(&self, claim_id: &str, reason: &str) -> CoreResult<()> {
        self.decide(claim_id, ClaimStatus::Rejected, reason).await
    }

    async fn decide(&self, claim_id: &str, status: ClaimStatus, reason: &str) -> CoreResult<()> {
        let claim = self
            .manager
            .snapshot()
            .find(claim_id)
            .cloned()
            .ok_or_else(|| CoreError::NotFound(format!("claim {}", claim_id)))?;
        claim.status.transition_to(status)?;

        let _guard = self.mark_in_flight(claim_id)?;
        let result = self
            .manager
            .transition(&claim.id, &claim.found_item_id, status, reason)
            .await;
        if let Err(CoreError::Validation(invalid)) = &result {
            self.manager
                .notifier()
                .notify(Notification::failure("Validation Error", invalid.summary.clone()));
        }
        result
    }

    fn mark_in_flight(&self, claim_id: &str) -> CoreResult<InFlight<'_>> {
        let mut claims = self
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if !claims.insert(claim_id.to_string()) {
            return Err(CoreError::Busy(claim_id.to_string()));
        }
        Ok(InFlight {
            claims: &self.in_flight,
            claim_id: claim_id.to_string(),
        })
    }

    /// Clear the history shown on the active tab
    pub async fn clear_history(&self) -> CoreResult<ClearOutcome> {
        let Some(status) = self.active.history_status() else {
            return Ok(ClearOutcome::NothingToClear);
        };
        self.manager.clear_history(status, self.gate.as_ref()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::confirm::{Decision, FixedAnswer};
    use crate::identity::{RolePolicy, SessionIdentity, User};
    use crate::model::{claim_path, item_path};
    use crate::notify::MemoryNotifier;
    use crate::store::MemoryStore;
    use serde_json::json;

    async fn console_for(user: Option<User>) -> (Arc<MemoryStore>, ReviewConsole) {
        let store = Arc::new(MemoryStore::new());
        store
            .insert(item_path("i1"), json!({"name": "Scarf"}))
            .await
            .unwrap();
        for (id, status) in [("c1", "Pending"), ("c2", "Rejected")] {
            store
                .insert(
                    claim_path("i1", id),
                    json!({
                        "claimReason": "Red scarf with my initials",
                        "contactInformation": "555-0100",
                        "foundItemId": "i1",
                        "userId": "u1",
                        "status": status,
                        "itemName": "Scarf"
                    }),
                )
                .await
                .unwrap();
        }
        let identity = match user {
            Some(user) => SessionIdentity::signed_in(user),
            None => SessionIdentity::signed_out(),
        };
        let manager = ClaimLifecycleManager::new(store.clone(), Arc::new(MemoryNotifier::new()));
        let console = ReviewConsole::new(
            manager,
            Arc::new(identity),
            Arc::new(RolePolicy),
            Arc::new(FixedAnswer(Decision::Confirmed)),
        );
        (store, console)
    }

    #[tokio::test]
    async fn test_non_admin_redirected_before_fetch() {
        for user in [None, Some(User::member("u1", "admin@example.com"))] {
            let (store, console) = console_for(user).await;
            let result = console.mount().await;
            assert!(matches!(
                result,
                Err(CoreError::Unauthorized {
                    redirect: Route::Dashboard
                })
            ));
            assert_eq!(store.calls().total(), 0);
        }
    }

    #[tokio::test]
    async fn test_tab_labels_and_views() {
        let (_store, mut console) = console_for(Some(User::admin("a1", "a@example.com"))).await;
        console.mount().await.unwrap();

        let labels: Vec<String> = console.tabs().into_iter().map(|(_, label)| label).collect();
        assert_eq!(
            labels,
            vec![
                "Pending Claims (1)",
                "Approved History (0)",
                "Rejected History (1)"
            ]
        );

        let pending = console.view();
        assert_eq!(pending.cards.len(), 1);
        assert_eq!(pending.cards[0].actions, Some(ReviewActions { enabled: true }));
        assert!(pending.clear_action.is_none());

        console.select_tab(Tab::Approved);
        let approved = console.view();
        assert!(approved.cards.is_empty());
        assert_eq!(
            approved.clear_action,
            Some(ClearAction {
                label: "Clear Approved History".to_string(),
                enabled: false
            })
        );
        assert_eq!(approved.empty_message.as_deref(), Some("No approved claims yet."));

        console.select_tab(Tab::Rejected);
        let rejected = console.view();
        assert!(rejected.cards[0].actions.is_none());
        assert!(rejected.clear_action.unwrap().enabled);
    }

    #[tokio::test]
    async fn test_terminal_claim_cannot_be_decided() {
        let (store, console) = console_for(Some(User::admin("a1", "a@example.com"))).await;
        console.mount().await.unwrap();

        let result = console.approve("c2", "Changed my mind").await;
        assert!(matches!(result, Err(CoreError::InvalidTransition { .. })));
        assert_eq!(store.calls().batches, 0);
    }

    #[tokio::test]
    async fn test_second_decision_in_flight_is_refused() {
        let (_store, console) = console_for(Some(User::admin("a1", "a@example.com"))).await;
        console.mount().await.unwrap();

        let held = console.mark_in_flight("c1").unwrap();
        assert!(matches!(
            console.reject("c1", "No proof").await,
            Err(CoreError::Busy(_))
        ));
        assert_eq!(console.view().cards[0].actions, Some(ReviewActions { enabled: false }));

        drop(held);
        console.reject("c1", "No proof").await.unwrap();
        assert!(console.view().cards.is_empty());
    }

    #[test]
    fn test_tab_parse() {
        assert_eq!("approved".parse::<Tab>().unwrap(), Tab::Approved);
        assert_eq!(Tab::Rejected.to_string(), "rejected");
        assert!("archived".parse::<Tab>().is_err());
        assert_eq!(Tab::Pending.history_status(), None);
    }
}
