//! ClaimIt CLI

mod http;
mod terminal;

use clap::{Parser, Subcommand};
use claimit_core::confirm::FixedAnswer;
use claimit_core::identity::issue_token;
use claimit_core::{
    Category, ClaimForm, ClaimLifecycleManager, ClearOutcome, ClientConfig, ConfirmationGate,
    CoreError, DataUriEncoder, Decision, DocumentStore, IdentityProvider, ImageUpload,
    ItemBrowser, ItemReporter, Notifier, ReportForm, ReviewConsole, RolePolicy, Route,
    Tab, TimedConfirmation, User,
};
use http::{remote_identity, HttpStore};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use terminal::{
    render_items, render_notices, render_tab, render_user, StdinConfirmation, TerminalNotifier,
};
use thiserror::Error;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;
use url::Url;

#[derive(Parser)]
#[command(name = "claimit")]
#[command(about = "Lost-and-found claims from the terminal")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// API base URL
    #[arg(long, env = "CLAIMIT_API_URL", default_value = "http://localhost:3000", global = true)]
    api_url: Url,

    /// Bearer token identifying the user
    #[arg(long, env = "CLAIMIT_TOKEN", hide_env_values = true, global = true)]
    token: Option<String>,

    /// Seconds before an unanswered confirmation is dismissed
    #[arg(long, env = "CLAIMIT_CONFIRM_TIMEOUT_SECS", default_value = "12", global = true)]
    confirm_timeout_secs: u64,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the signed-in user
    Whoami,

    /// List found items, newest first
    Items,

    /// Report a found item
    Report {
        #[arg(long)]
        name: String,

        #[arg(long)]
        description: String,

        /// Electronics, Keys, Wallets, Clothing, Books, Bags or Other
        #[arg(long)]
        category: Option<Category>,

        /// Where the item was found
        #[arg(long)]
        location: String,

        /// Picture of the item (png, jpeg, webp or gif)
        #[arg(long)]
        image: Option<PathBuf>,
    },

    /// Claim a found item
    Claim {
        /// Item identifier
        item_id: String,

        /// Why the item is yours
        #[arg(long)]
        reason: String,

        /// How the administrator can reach you
        #[arg(long)]
        contact: String,
    },

    /// Decisions on your own claims
    Notices,

    /// Show claims awaiting review (administrators)
    Review {
        /// pending, approved or rejected
        #[arg(long, default_value = "pending")]
        tab: Tab,
    },

    /// Approve a pending claim and remove its item (administrators)
    Approve {
        claim_id: String,

        /// Reason shown to the claimant, must not be blank
        #[arg(long)]
        reason: String,
    },

    /// Reject a pending claim (administrators)
    Reject {
        claim_id: String,

        /// Reason shown to the claimant, must not be blank
        #[arg(long)]
        reason: String,
    },

    /// Delete every approved or rejected claim (administrators)
    ClearHistory {
        /// approved or rejected
        #[arg(long)]
        tab: Tab,

        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },

    /// Issue a development token signed with the service secret
    MintToken {
        #[arg(long)]
        uid: String,

        #[arg(long)]
        email: String,

        #[arg(long)]
        name: Option<String>,

        /// Grant the administrator role
        #[arg(long)]
        admin: bool,

        /// Token lifetime in hours
        #[arg(long, default_value = "24")]
        ttl_hours: i64,

        #[arg(long, env = "JWT_SECRET", hide_env_values = true)]
        secret: String,
    },
}

#[derive(Error, Debug)]
enum CliError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("Could not read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("{0}")]
    Usage(String),
}

type CliResult<T> = Result<T, CliError>;

/// Everything a command needs to talk to the service
struct Session {
    store: Arc<dyn DocumentStore>,
    identity: Arc<dyn IdentityProvider>,
    notifier: Arc<dyn Notifier>,
    config: ClientConfig,
}

impl Session {
    fn connect(cli: &Cli) -> Self {
        let http = Arc::new(HttpStore::new(cli.api_url.clone(), cli.token.clone()));
        let identity = remote_identity(http.clone());
        Self {
            store: http,
            identity,
            notifier: Arc::new(TerminalNotifier),
            config: ClientConfig {
                confirm_timeout: Duration::from_secs(cli.confirm_timeout_secs),
                ..ClientConfig::default()
            },
        }
    }

    async fn browser(&self) -> CliResult<ItemBrowser> {
        let mut browser = ItemBrowser::new(
            self.store.clone(),
            self.identity.clone(),
            Arc::new(RolePolicy),
            self.notifier.clone(),
            self.config.clone(),
        );
        browser.mount().await?;
        Ok(browser)
    }

    async fn console(&self, gate: Arc<dyn ConfirmationGate>) -> CliResult<ReviewConsole> {
        let manager = ClaimLifecycleManager::new(self.store.clone(), self.notifier.clone());
        let console = ReviewConsole::new(manager, self.identity.clone(), Arc::new(RolePolicy), gate);
        console.mount().await?;
        Ok(console)
    }

    fn gate(&self, skip_prompt: bool) -> Arc<dyn ConfirmationGate> {
        if skip_prompt {
            Arc::new(FixedAnswer(Decision::Confirmed))
        } else {
            Arc::new(TimedConfirmation::new(
                Arc::new(StdinConfirmation),
                self.config.confirm_timeout,
            ))
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { Level::DEBUG } else { Level::WARN };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("Failed to set subscriber");

    if let Err(e) = run(cli).await {
        match e {
            CliError::Core(CoreError::Unauthorized { redirect: Route::SignIn }) => {
                error!("Not signed in; set CLAIMIT_TOKEN or pass --token");
            }
            CliError::Core(CoreError::Unauthorized { .. }) => {
                error!("This command is for administrators");
            }
            e => error!("{}", e),
        }
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> CliResult<()> {
    if let Commands::MintToken { uid, email, name, admin, ttl_hours, secret } = &cli.command {
        return cmd_mint_token(uid, email, name.clone(), *admin, *ttl_hours, secret);
    }

    let session = Session::connect(&cli);
    info!(api = %cli.api_url, "Using {} store", session.store.backend_tag());

    match cli.command {
        Commands::Whoami => cmd_whoami(&session).await,
        Commands::Items => cmd_items(&session).await,
        Commands::Report { name, description, category, location, image } => {
            let image = image.map(read_image).transpose()?;
            let form = ReportForm {
                name,
                description,
                category,
                location_found: location,
                image,
            };
            cmd_report(&session, &form).await
        }
        Commands::Claim { item_id, reason, contact } => {
            let browser = session.browser().await?;
            browser
                .submit_claim(&item_id, &ClaimForm::new(reason, contact))
                .await?;
            Ok(())
        }
        Commands::Notices => {
            let browser = session.browser().await?;
            print!("{}", render_notices(&browser.claim_notices().await?));
            Ok(())
        }
        Commands::Review { tab } => {
            let mut console = session.console(session.gate(false)).await?;
            console.select_tab(tab);
            print!("{}", render_tab(&console.tabs(), &console.view()));
            Ok(())
        }
        Commands::Approve { claim_id, reason } => {
            let console = session.console(session.gate(false)).await?;
            console.approve(&claim_id, &reason).await?;
            console.manager().settle().await;
            Ok(())
        }
        Commands::Reject { claim_id, reason } => {
            let console = session.console(session.gate(false)).await?;
            console.reject(&claim_id, &reason).await?;
            console.manager().settle().await;
            Ok(())
        }
        Commands::ClearHistory { tab, yes } => {
            if tab.history_status().is_none() {
                return Err(CliError::Usage(
                    "only approved or rejected history can be cleared".into(),
                ));
            }
            let mut console = session.console(session.gate(yes)).await?;
            console.select_tab(tab);
            let outcome = console.clear_history().await?;
            console.manager().settle().await;
            if outcome == ClearOutcome::Dismissed {
                println!("No answer; nothing was deleted.");
            }
            Ok(())
        }
        // Answered before connecting
        Commands::MintToken { .. } => Ok(()),
    }
}

fn read_image(path: PathBuf) -> CliResult<ImageUpload> {
    let mime = path
        .extension()
        .and_then(|ext| ext.to_str())
        .and_then(ImageUpload::mime_for_extension)
        .unwrap_or("application/octet-stream");
    let bytes = std::fs::read(&path).map_err(|source| CliError::Read {
        path: path.clone(),
        source,
    })?;
    Ok(ImageUpload::new(bytes, mime))
}

async fn cmd_whoami(session: &Session) -> CliResult<()> {
    let Some(user) = claimit_core::identity::resolved_user(session.identity.as_ref()).await else {
        return Err(CoreError::Unauthorized {
            redirect: Route::SignIn,
        }
        .into());
    };

    print!("{}", render_user(&user));
    Ok(())
}

async fn cmd_items(session: &Session) -> CliResult<()> {
    let browser = session.browser().await?;
    print!("{}", render_items(&browser.cards()));
    if let Some(route) = browser.admin_link() {
        println!("\nAdmin console: {} (claimit review)", route);
    }
    Ok(())
}

async fn cmd_report(session: &Session, form: &ReportForm) -> CliResult<()> {
    let reporter = ItemReporter::new(
        session.store.clone(),
        session.identity.clone(),
        session.notifier.clone(),
        Arc::new(DataUriEncoder::new()),
    );
    let item = reporter.submit(form).await?;
    println!("Reported as {}", item.id);
    Ok(())
}

fn cmd_mint_token(
    uid: &str,
    email: &str,
    name: Option<String>,
    admin: bool,
    ttl_hours: i64,
    secret: &str,
) -> CliResult<()> {
    if ttl_hours <= 0 {
        return Err(CliError::Usage("--ttl-hours must be positive".into()));
    }
    let mut user = if admin {
        User::admin(uid, email)
    } else {
        User::member(uid, email)
    };
    user.display_name = name;

    let token = issue_token(&user, secret, chrono::Duration::hours(ttl_hours))?;
    println!("{}", token);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use claimit_core::Role;

    #[test]
    fn test_cli_parses_review_tab() {
        let cli = Cli::try_parse_from(["claimit", "review", "--tab", "approved"]).unwrap();
        assert!(matches!(cli.command, Commands::Review { tab: Tab::Approved }));
        assert_eq!(cli.confirm_timeout_secs, 12);
    }

    #[test]
    fn test_clear_history_requires_tab() {
        assert!(Cli::try_parse_from(["claimit", "clear-history"]).is_err());
        let cli = Cli::try_parse_from(["claimit", "clear-history", "--tab", "rejected", "--yes"])
            .unwrap();
        assert!(matches!(
            cli.command,
            Commands::ClearHistory { tab: Tab::Rejected, yes: true }
        ));
    }

    #[test]
    fn test_reason_help_matches_validation() {
        use clap::CommandFactory;
        let cli = Cli::command();
        for name in ["approve", "reject"] {
            let command = cli.find_subcommand(name).unwrap();
            let reason = command
                .get_arguments()
                .find(|arg| arg.get_id() == "reason")
                .unwrap();
            assert_eq!(
                reason.get_help().map(ToString::to_string).as_deref(),
                Some("Reason shown to the claimant, must not be blank")
            );
        }
        assert!(claimit_core::validation::validate_admin_reason("ok").is_ok());
        assert!(claimit_core::validation::validate_admin_reason("   ").is_err());
    }

    #[test]
    fn test_minted_token_round_trips() {
        let secret = "test-secret";
        let token = {
            let user = User::admin("a1", "admin@example.com");
            issue_token(&user, secret, chrono::Duration::hours(1)).unwrap()
        };
        let user = claimit_core::identity::verify_token(&token, secret).unwrap();
        assert_eq!(user.role, Role::Admin);
        assert!(cmd_mint_token("u1", "u@example.com", None, false, 0, secret).is_err());
    }
}
