//! Transient user-facing notifications

use std::sync::{Mutex, PoisonError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Variant {
    Default,
    Destructive,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub title: String,
    pub description: Option<String>,
    pub variant: Variant,
}

impl Notification {
    pub fn info(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: None,
            variant: Variant::Default,
        }
    }

    pub fn success(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self::info(title).with_description(description)
    }

    pub fn failure(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            variant: Variant::Destructive,
            ..Self::info(title).with_description(description)
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn is_failure(&self) -> bool {
        self.variant == Variant::Destructive
    }
}

/// Where notifications are shown
pub trait Notifier: Send + Sync {
    fn notify(&self, notification: Notification);
}

/// Keeps every notification it receives
#[derive(Default)]
pub struct MemoryNotifier {
    received: Mutex<Vec<Notification>>,
}

impl MemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn all(&self) -> Vec<Notification> {
        self.received
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn titles(&self) -> Vec<String> {
        self.all().into_iter().map(|n| n.title).collect()
    }

    pub fn last(&self) -> Option<Notification> {
        self.all().pop()
    }

    pub fn clear(&self) {
        self.received
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

impl Notifier for MemoryNotifier {
    fn notify(&self, notification: Notification) {
        self.received
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(notification);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constructors_set_variant() {
        assert_eq!(Notification::info("Saved").variant, Variant::Default);
        assert!(Notification::failure("Update Failed", "Could not approve the claim.").is_failure());
        assert_eq!(
            Notification::success("Claim Rejected", "The claim status has been updated.")
                .description
                .as_deref(),
            Some("The claim status has been updated.")
        );
    }

    #[test]
    fn test_memory_notifier_records_in_order() {
        let notifier = MemoryNotifier::new();
        notifier.notify(Notification::info("one"));
        notifier.notify(Notification::info("two"));

        assert_eq!(notifier.titles(), vec!["one", "two"]);
        assert_eq!(notifier.last().map(|n| n.title), Some("two".to_string()));

        notifier.clear();
        assert!(notifier.all().is_empty());
    }
}
