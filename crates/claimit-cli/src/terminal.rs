//! Terminal notifications, prompts and listings

use async_trait::async_trait;
use claimit_core::browser::{EMPTY_MESSAGE, EMPTY_TITLE};
use claimit_core::{
    ClaimNotice, ClaimStatus, ConfirmPrompt, ConfirmationGate, Decision, ItemCard, LoadState,
    Notification, Notifier, Role, TabView, User, Variant,
};
use std::fmt::Write as _;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::debug;

/// Prints notifications as they arrive; failures go to stderr
pub struct TerminalNotifier;

impl Notifier for TerminalNotifier {
    fn notify(&self, notification: Notification) {
        let line = match &notification.description {
            Some(description) => format!("{}: {}", notification.title, description),
            None => notification.title.clone(),
        };
        match notification.variant {
            Variant::Default => println!("{}", line),
            Variant::Destructive => eprintln!("error: {}", line),
        }
    }
}

/// Asks on stdin; anything but the confirm label or "y"/"yes" cancels
pub struct StdinConfirmation;

fn parse_answer(line: &str, prompt: &ConfirmPrompt) -> Decision {
    let answer = line.trim();
    if answer.eq_ignore_ascii_case("y")
        || answer.eq_ignore_ascii_case("yes")
        || answer.eq_ignore_ascii_case(&prompt.confirm_label)
    {
        Decision::Confirmed
    } else {
        Decision::Cancelled
    }
}

#[async_trait]
impl ConfirmationGate for StdinConfirmation {
    async fn confirm(&self, prompt: &ConfirmPrompt) -> Decision {
        let question = format!(
            "{}\n{} [{}/{}] ",
            prompt.title, prompt.message, prompt.confirm_label, prompt.cancel_label
        );
        let mut stdout = tokio::io::stdout();
        if stdout.write_all(question.as_bytes()).await.is_err() || stdout.flush().await.is_err() {
            return Decision::Cancelled;
        }

        let mut line = String::new();
        match BufReader::new(tokio::io::stdin()).read_line(&mut line).await {
            Ok(0) => Decision::Cancelled,
            Ok(_) => parse_answer(&line, prompt),
            Err(e) => {
                debug!("Could not read confirmation: {}", e);
                Decision::Cancelled
            }
        }
    }
}

fn load_line(load: &LoadState) -> Option<String> {
    match load {
        LoadState::Loading => Some("Loading...".to_string()),
        LoadState::Failed(message) => Some(format!("error: {}", message)),
        LoadState::Ready => None,
    }
}

/// The signed-in user, with an initials badge when a display name is known
pub fn render_user(user: &User) -> String {
    let mut out = String::new();
    let name = user.display_name.as_deref().unwrap_or(&user.uid);
    let initials = user.initials();
    if initials.is_empty() {
        let _ = writeln!(out, "{} <{}>", name, user.email);
    } else {
        let _ = writeln!(out, "({}) {} <{}>", initials, name, user.email);
    }
    let _ = writeln!(out, "uid:  {}", user.uid);
    let role = if user.role == Role::Admin { "admin" } else { "member" };
    let _ = writeln!(out, "role: {}", role);
    out
}

pub fn render_items(cards: &[ItemCard]) -> String {
    let mut out = String::new();
    if cards.is_empty() {
        let _ = writeln!(out, "{}\n{}", EMPTY_TITLE, EMPTY_MESSAGE);
        return out;
    }
    for card in cards {
        let action = if card.action.enabled() {
            card.action.label().to_string()
        } else {
            format!("{} (disabled)", card.action.label())
        };
        let _ = writeln!(out, "[{}] {}  <{}>", card.id, card.name, action);
        let _ = writeln!(
            out,
            "    {} | found at {} on {}",
            card.category,
            card.location_found,
            card.date_found.format("%Y-%m-%d")
        );
        let _ = writeln!(out, "    {}", card.description);
    }
    out
}

pub fn render_tab(tabs: &[(claimit_core::Tab, String)], view: &TabView) -> String {
    let mut out = String::new();
    let header: Vec<String> = tabs
        .iter()
        .map(|(tab, label)| {
            if *tab == view.tab {
                format!("*{}*", label)
            } else {
                label.clone()
            }
        })
        .collect();
    let _ = writeln!(out, "{}", header.join("  "));

    if let Some(line) = load_line(&view.load) {
        let _ = writeln!(out, "{}", line);
        return out;
    }
    if let Some(message) = &view.empty_message {
        let _ = writeln!(out, "{}", message);
    }
    for card in &view.cards {
        let claim = &card.claim;
        let _ = writeln!(out, "[{}] {} ({})", claim.id, claim.item_name, card.badge);
        let _ = writeln!(out, "    claimant: {}  contact: {}", claim.user_id, claim.contact_information);
        let _ = writeln!(out, "    reason: {}", claim.claim_reason);
        if let Some(reason) = &claim.admin_reason {
            let _ = writeln!(out, "    admin: {}", reason);
        }
        if let Some(actions) = card.actions {
            let state = if actions.enabled { "" } else { " (in progress)" };
            let _ = writeln!(out, "    actions: approve / reject{}", state);
        }
    }
    if let Some(clear) = &view.clear_action {
        if clear.enabled {
            let _ = writeln!(out, "{}", clear.label);
        }
    }
    out
}

pub fn render_notices(notices: &[ClaimNotice]) -> String {
    let mut out = String::new();
    if notices.is_empty() {
        let _ = writeln!(out, "No decisions on your claims yet.");
        return out;
    }
    for notice in notices {
        let verdict = match notice.status {
            ClaimStatus::Approved => "approved",
            ClaimStatus::Rejected => "rejected",
            ClaimStatus::Pending => "pending",
        };
        let _ = write!(out, "Your claim for {} was {}", notice.item_name, verdict);
        match &notice.admin_reason {
            Some(reason) => {
                let _ = writeln!(out, ": {}", reason);
            }
            None => {
                let _ = writeln!(out, ".");
            }
        }
    }
    out
}
