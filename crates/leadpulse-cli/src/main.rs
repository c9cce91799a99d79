//! Leadpulse CLI - terminal access to the sales-intelligence API.
//!
//! Signs in, issues authenticated API calls through the refreshing session
//! guard, and inspects the encrypted local state snapshot.

use std::io::{self, Write};
use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use leadpulse_core::auth::{CredentialStore, Navigator, OtpCountdown, SessionManager, LOGIN_ROUTE};
use leadpulse_core::config::{Config, CredentialBackend, APP_NAME};
use leadpulse_core::models::{AuthState, UserProfile};
use leadpulse_core::persist::{EncryptTransform, PersistPolicy, Persistor, StateCipher};
use leadpulse_core::storage::{FileStore, KeyValueStore, KeyringStore};
use leadpulse_core::ApiClient;

// ============================================================================
// Constants
// ============================================================================

const CREDENTIALS_FILE: &str = "credentials.json";
const STATE_FILE: &str = "state.json";
const LOG_FILE: &str = "leadpulse.log";

const PROFILE_PATH: &str = "/user/profile/";

const USAGE: &str = "\
Usage: leadpulse <command>

Commands:
  login [email]   Sign in and store the session
  logout          Sign out and wipe the local snapshot
  status          Show session and snapshot status
  get <path>      GET an API path and print the JSON response
  state           Print the restored local state";

/// Initialize the tracing subscriber for logging.
///
/// Use RUST_LOG to control the level (e.g. RUST_LOG=leadpulse_core=debug).
/// Everything also goes to a daily log file under `log_dir`.
fn init_tracing(log_dir: &Path) -> WorkerGuard {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let file_appender = tracing_appender::rolling::daily(log_dir, LOG_FILE);
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(fmt::layer().with_ansi(false).with_writer(file_writer))
        .with(filter)
        .init();

    guard
}

/// Everything a command needs, wired from the config.
struct AppContext {
    config: Config,
    api: ApiClient,
    /// Where the snapshot lives; reachable without the cipher key.
    state_store: Arc<dyn KeyValueStore>,
    /// `None` when no persistence key is configured.
    persistor: Option<Persistor>,
}

impl AppContext {
    fn build(config: Config, data_dir: &Path) -> Result<Self> {
        let backend: Arc<dyn KeyValueStore> = match config.credential_backend {
            CredentialBackend::File => Arc::new(FileStore::new(data_dir.join(CREDENTIALS_FILE))),
            CredentialBackend::Keyring => Arc::new(KeyringStore::new(APP_NAME)),
        };
        let state_store: Arc<dyn KeyValueStore> = Arc::new(FileStore::new(data_dir.join(STATE_FILE)));

        let persistor = match config.persist_key() {
            Ok(key) => {
                let cipher = StateCipher::from_passphrase(key)
                    .context("Failed to derive state encryption key")?;
                Some(Persistor::new(
                    state_store.clone(),
                    EncryptTransform::new(cipher, PersistPolicy::default()),
                ))
            }
            Err(e) => {
                warn!(error = %e, "Local state encryption disabled");
                None
            }
        };

        let navigator: Arc<dyn Navigator> = Arc::new(|route: &str| {
            if route == LOGIN_ROUTE {
                eprintln!("Signed out. Run `leadpulse login` to sign in again.");
            }
        });
        let mut session = SessionManager::new(CredentialStore::new(backend), navigator);
        if let Some(ref persistor) = persistor {
            session = session.with_persistor(persistor.clone());
        }
        let api = ApiClient::new(&config, session).context("Failed to build HTTP client")?;

        Ok(Self {
            config,
            api,
            state_store,
            persistor,
        })
    }

    fn persistor(&self) -> Result<&Persistor> {
        match self.persistor {
            Some(ref persistor) => Ok(persistor),
            None => bail!("Local state is encrypted; set LEADPULSE_PERSIST_KEY to read it"),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(command) = args.first().map(String::as_str) else {
        eprintln!("{}", USAGE);
        return Ok(());
    };
    if command == "-h" || command == "--help" {
        println!("{}", USAGE);
        return Ok(());
    }

    let config = Config::load()?;
    let data_dir = config.data_dir()?;
    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("Failed to create {}", data_dir.display()))?;
    let _log_guard = init_tracing(&data_dir);
    info!(env = ?config.environment, base_url = %config.base_url(), "Leadpulse CLI starting");

    let mut ctx = AppContext::build(config, &data_dir)?;

    let result = match command {
        "login" => login(&mut ctx, args.get(1).cloned()).await,
        "logout" => logout(&ctx),
        "status" => status(&ctx),
        "get" => match args.get(1) {
            Some(path) => get(&ctx, path).await,
            None => bail!("get needs an API path, e.g. `leadpulse get /campaigns/`"),
        },
        "state" => show_state(&ctx),
        other => bail!("Unknown command: {}\n\n{}", other, USAGE),
    };

    if let Err(ref e) = result {
        warn!(error = %e, command, "Command failed");
    }
    result
}

fn prompt_email(default: Option<&str>) -> Result<String> {
    match default {
        Some(last) => print!("Email [{}]: ", last),
        None => print!("Email: "),
    }
    io::stdout().flush()?;

    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    let input = input.trim();

    match (input.is_empty(), default) {
        (true, Some(last)) => Ok(last.to_string()),
        (true, None) => bail!("Email is required"),
        (false, _) => Ok(input.to_string()),
    }
}

async fn login(ctx: &mut AppContext, email: Option<String>) -> Result<()> {
    let email = match email {
        Some(email) => email,
        None => prompt_email(ctx.config.last_email.as_deref())?,
    };
    let password = rpassword::prompt_password("Password: ")?;

    println!("\nAuthenticating...");
    ctx.api
        .login(&email, &password)
        .await
        .context("Login failed")?;

    if let Some(ref persistor) = ctx.persistor {
        let mut state = persistor.rehydrate_state();
        state.auth = AuthState {
            is_authenticated: true,
            email: Some(email.clone()),
        };
        match ctx.api.get::<UserProfile>(PROFILE_PATH).await {
            Ok(profile) => state.user = Some(profile),
            Err(e) => warn!(error = %e, "Could not fetch user profile after login"),
        }
        persistor.snapshot_state(&state);
    }

    ctx.config.last_email = Some(email);
    if let Err(e) = ctx.config.save() {
        warn!(error = %e, "Failed to save config");
    }

    println!("Login successful!");
    Ok(())
}

fn logout(ctx: &AppContext) -> Result<()> {
    let logged_out = ctx.api.session().logout();
    if ctx.persistor.is_none() {
        // The session only purges through a persistor
        Persistor::discard(ctx.state_store.as_ref()).context("Failed to remove local state")?;
    }
    logged_out.context("Logout did not complete")?;
    println!("Logged out.");
    Ok(())
}

fn status(ctx: &AppContext) -> Result<()> {
    let session = ctx.api.session();
    println!("API:        {}", ctx.api.base_url());
    println!(
        "Session:    {}",
        if session.is_authenticated() { "signed in" } else { "signed out" }
    );

    let otp = OtpCountdown::new(session.credentials().clone());
    if let (Some(email), true) = (otp.pending_email(), otp.is_active()) {
        println!("OTP:        {}s left for {}", otp.seconds_remaining(), email);
    }

    match ctx.persistor.as_ref().map(Persistor::last_saved) {
        Some(Some(snapshot)) => println!(
            "Snapshot:   v{} saved {}",
            snapshot.version,
            snapshot.age_display()
        ),
        Some(None) => println!("Snapshot:   none"),
        None => println!("Snapshot:   locked (LEADPULSE_PERSIST_KEY not set)"),
    }
    Ok(())
}

async fn get(ctx: &AppContext, path: &str) -> Result<()> {
    let body: serde_json::Value = ctx.api.get(path).await?;
    println!("{}", serde_json::to_string_pretty(&body)?);
    Ok(())
}

fn show_state(ctx: &AppContext) -> Result<()> {
    let state = ctx.persistor()?.rehydrate_state();
    let tree = state
        .to_tree()
        .map(|tree| PersistPolicy::default().select(&tree))
        .unwrap_or_default();
    println!("{}", serde_json::to_string_pretty(&tree)?);
    if !state.notifications.is_empty() {
        println!("\n{} unread notification(s)", state.unread_notifications());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use leadpulse_core::auth::SessionCredentials;
    use leadpulse_core::persist::PERSIST_KEY;

    fn config(persist_key: Option<&str>) -> Config {
        Config {
            api_base_url: Some("http://127.0.0.1:9/api".to_string()),
            persist_key: persist_key.map(String::from),
            credential_backend: CredentialBackend::File,
            ..Default::default()
        }
    }

    #[test]
    fn test_logout_without_persist_key_clears_everything() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = AppContext::build(config(None), dir.path()).unwrap();
        assert!(ctx.persistor.is_none());

        let credentials = ctx.api.session().credentials();
        credentials.store(&SessionCredentials::new("a", "r")).unwrap();
        ctx.state_store.set(PERSIST_KEY, "{\"version\":1}").unwrap();

        logout(&ctx).unwrap();

        assert!(!credentials.is_authenticated());
        assert!(credentials.refresh_token().is_none());
        assert!(ctx.state_store.get(PERSIST_KEY).unwrap().is_none());
    }

    #[test]
    fn test_status_and_state_without_persist_key() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = AppContext::build(config(None), dir.path()).unwrap();

        status(&ctx).unwrap();
        assert!(show_state(&ctx).is_err());
    }

    #[test]
    fn test_persist_key_enables_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = AppContext::build(config(Some("correct horse")), dir.path()).unwrap();
        assert!(ctx.persistor.is_some());

        logout(&ctx).unwrap();
        show_state(&ctx).unwrap();
    }
}
