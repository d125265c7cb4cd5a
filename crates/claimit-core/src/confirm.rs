//! Confirmation step for destructive actions
//!
//! A prompt left unanswered past its timeout is dismissed and counts as a
//! cancellation.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfirmPrompt {
    pub title: String,
    pub message: String,
    pub confirm_label: String,
    pub cancel_label: String,
}

impl ConfirmPrompt {
    pub fn new(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            message: message.into(),
            confirm_label: "Confirm".to_string(),
            cancel_label: "Cancel".to_string(),
        }
    }

    pub fn confirm_label(mut self, label: impl Into<String>) -> Self {
        self.confirm_label = label.into();
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Confirmed,
    Cancelled,
    /// Nobody answered before the prompt was dismissed
    TimedOut,
}

/// Asks the user to confirm an action
#[async_trait]
pub trait ConfirmationGate: Send + Sync {
    async fn confirm(&self, prompt: &ConfirmPrompt) -> Decision;
}

/// Dismisses the wrapped prompt after a fixed timeout
pub struct TimedConfirmation {
    inner: Arc<dyn ConfirmationGate>,
    timeout: Duration,
}

impl TimedConfirmation {
    pub fn new(inner: Arc<dyn ConfirmationGate>, timeout: Duration) -> Self {
        Self { inner, timeout }
    }
}

#[async_trait]
impl ConfirmationGate for TimedConfirmation {
    async fn confirm(&self, prompt: &ConfirmPrompt) -> Decision {
        match tokio::time::timeout(self.timeout, self.inner.confirm(prompt)).await {
            Ok(decision) => decision,
            Err(_) => {
                debug!(title = %prompt.title, "confirmation dismissed after {:?}", self.timeout);
                Decision::TimedOut
            }
        }
    }
}

/// Answers every prompt the same way (`--yes`, tests)
pub struct FixedAnswer(pub Decision);

#[async_trait]
impl ConfirmationGate for FixedAnswer {
    async fn confirm(&self, _prompt: &ConfirmPrompt) -> Decision {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NeverAnswers;

    #[async_trait]
    impl ConfirmationGate for NeverAnswers {
        async fn confirm(&self, _prompt: &ConfirmPrompt) -> Decision {
            std::future::pending::<()>().await;
            Decision::Confirmed
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_unanswered_prompt_times_out() {
        let gate = TimedConfirmation::new(Arc::new(NeverAnswers), Duration::from_secs(12));
        let decision = gate.confirm(&ConfirmPrompt::new("Clear", "Sure?")).await;
        assert_eq!(decision, Decision::TimedOut);
    }

    #[tokio::test]
    async fn test_answer_before_timeout_passes_through() {
        let gate = TimedConfirmation::new(
            Arc::new(FixedAnswer(Decision::Confirmed)),
            Duration::from_secs(12),
        );
        let decision = gate.confirm(&ConfirmPrompt::new("Clear", "Sure?")).await;
        assert_eq!(decision, Decision::Confirmed);
    }

    #[test]
    fn test_prompt_labels() {
        let prompt = ConfirmPrompt::new("Clear Approved History", "Are you sure?").confirm_label("Clear");
        assert_eq!(prompt.confirm_label, "Clear");
        assert_eq!(prompt.cancel_label, "Cancel");
    }
}
