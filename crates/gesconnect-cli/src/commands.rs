//! Command implementations. Each returns once the command has finished;
//! background renewal only outlives a command in `watch`.

use std::io::{self, Write};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use gesconnect_core::api::models::AddStepsRequest;
use gesconnect_core::auth::ACCESS_TOKEN_KEY;
use gesconnect_core::{
    AnyStore, ApiError, Config, GuardMode, GuardOutcome, ReqwestTransport, SessionManager,
    SessionState, ViewScope,
};
use tracing::{info, warn};

use crate::format::{age_display, progress_bar};
use crate::navigator::CliNavigator;

pub type CliSession = SessionManager<AnyStore, ReqwestTransport>;

/// How often `watch` checks whether renewal is still alive
const WATCH_POLL_SECS: u64 = 1;

pub fn open_session(config: &Config) -> Result<CliSession> {
    let transport = ReqwestTransport::new(&config.api_base_url(), config.request_timeout())
        .context("Failed to build HTTP client")?;
    let store = config.open_store().context("Failed to open token store")?;
    Ok(SessionManager::new(config.session_config(), store, transport))
}

/// Turn an API error into something a person can act on.
pub fn user_message(e: &ApiError) -> String {
    match e {
        ApiError::Unauthenticated | ApiError::NoRefreshToken => {
            "Your session has expired. Run `gesconnect login` again.".to_string()
        }
        ApiError::Network(_) => {
            "Unable to connect to server. Check your internet connection.".to_string()
        }
        ApiError::Http { message, .. } => message.clone(),
        other => other.to_string(),
    }
}

/// Commands that fetch the profile themselves skip the guard's own
/// `/api/me` call; their request is the liveness check.
fn guard_mode(config: &Config, fetches_profile: bool) -> GuardMode {
    if config.liveness_check && !fetches_profile {
        GuardMode::LivenessProbe
    } else {
        GuardMode::TokenOnly
    }
}

/// Guard a command the way a protected page is guarded.
async fn require_session(session: &CliSession, mode: GuardMode) -> Result<()> {
    let navigator = CliNavigator::new();
    let outcome = session.check(mode, &navigator, &ViewScope::new()).await;
    if navigator.redirected() {
        bail!("not signed in");
    }
    match outcome {
        GuardOutcome::Authenticated => Ok(()),
        other => bail!("not signed in ({:?})", other),
    }
}

fn prompt(label: &str) -> Result<String> {
    print!("{}", label);
    io::stdout().flush()?;
    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    Ok(input.trim().to_string())
}

fn password_from_env_or_prompt() -> Result<String> {
    match std::env::var("GES_PASSWORD") {
        Ok(password) if !password.is_empty() => Ok(password),
        _ => Ok(rpassword::prompt_password("Password: ")?),
    }
}

pub async fn login(config: &mut Config, email_arg: Option<String>) -> Result<()> {
    let email = match email_arg
        .or_else(|| std::env::var("GES_EMAIL").ok().filter(|e| !e.is_empty()))
    {
        Some(email) => email,
        None => match config.last_email.clone() {
            Some(last) => {
                let input = prompt(&format!("Email [{}]: ", last))?;
                if input.is_empty() {
                    last
                } else {
                    input
                }
            }
            None => prompt("Email: ")?,
        },
    };
    if email.is_empty() {
        bail!("Email and password required");
    }
    let password = password_from_env_or_prompt()?;
    if password.is_empty() {
        bail!("Email and password required");
    }

    let session = open_session(config)?;
    if let Err(e) = session.login(&email, &password).await {
        bail!("Login failed: {}", user_message(&e));
    }
    session.shutdown();

    config.last_email = Some(email.clone());
    if let Err(e) = config.save() {
        warn!(error = %e, "Failed to save config");
    }

    println!("Logged in as {}", email);
    Ok(())
}

pub async fn signup(config: &Config, name: &str, email: &str) -> Result<()> {
    let password = password_from_env_or_prompt()?;
    let session = open_session(config)?;
    match session.signup(name, email, &password).await {
        Ok(account) => {
            println!("Account {} created for {}. Run `gesconnect login` to sign in.", account.id, account.email);
            Ok(())
        }
        Err(e) => bail!("Signup failed: {}", user_message(&e)),
    }
}

pub async fn whoami(config: &Config) -> Result<()> {
    let session = open_session(config)?;
    require_session(&session, guard_mode(config, true)).await?;
    match session.client().me().await {
        Ok(profile) => {
            println!("{}", profile.display_name());
            Ok(())
        }
        Err(e) => bail!("{}", user_message(&e)),
    }
}

pub async fn status(config: &Config) -> Result<()> {
    let session = open_session(config)?;
    let state = match session.state() {
        SessionState::Authenticated => "signed in",
        SessionState::Refreshing => "refreshing",
        SessionState::Unauthenticated => "signed out",
    };
    println!("API:      {}", session.transport().base_url());
    println!("Session:  {}", state);
    println!("Backend:  {:?}", config.token_backend);

    if let AnyStore::File(store) = session.store().backend() {
        if let Some(updated) = store.updated_at(ACCESS_TOKEN_KEY) {
            println!("Renewed:  {}", age_display(updated, Utc::now()));
        }
    }
    Ok(())
}

pub async fn steps(config: &Config) -> Result<()> {
    let session = open_session(config)?;
    require_session(&session, guard_mode(config, false)).await?;

    let week = match session.client().weekly_steps().await {
        Ok(week) => week,
        Err(e) => bail!("Could not load steps: {}", user_message(&e)),
    };

    println!("Week {} .. {}", week.period_start, week.period_end);
    for day in &week.days {
        println!("  {:<12} {:>8}", day.day, day.total_steps);
    }
    println!(
        "Total {} / {} {} {:.0}%",
        week.week_total_steps,
        week.goal_period_target,
        progress_bar(week.progress_pct, 20),
        week.progress_pct
    );
    println!("{} steps to go", week.remaining_steps);
    Ok(())
}

pub async fn add_steps(config: &Config, steps: u64, note: Option<String>) -> Result<()> {
    let session = open_session(config)?;
    require_session(&session, guard_mode(config, false)).await?;

    let request = AddStepsRequest {
        steps,
        source: Some("cli".to_string()),
        note,
        ..Default::default()
    };
    match session.client().add_steps(&request).await {
        Ok(response) => {
            println!(
                "{}",
                response.message.unwrap_or_else(|| format!("Logged {} steps", steps))
            );
            Ok(())
        }
        Err(e) => bail!("Could not log steps: {}", user_message(&e)),
    }
}

/// Keep the session renewed until Ctrl-C or until renewal fails.
pub async fn watch(config: &Config) -> Result<()> {
    let session = open_session(config)?;
    if !session.restore().await {
        bail!("No valid session found. Run `gesconnect login` first.");
    }

    println!(
        "Keeping session alive (renewal every {}s). Press Ctrl-C to stop.",
        session.config().renewal_interval.as_secs()
    );
    info!("Watch started");

    let mut poll = tokio::time::interval(Duration::from_secs(WATCH_POLL_SECS));
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                session.shutdown();
                println!("Stopped.");
                return Ok(());
            }
            _ = poll.tick() => {
                if !session.renewal_running() {
                    bail!("Session ended - renewal failed. Run `gesconnect login` again.");
                }
            }
        }
    }
}

pub fn logout(config: &Config) -> Result<()> {
    let session = open_session(config)?;
    session.logout(&CliNavigator::silent());
    println!("Logged out.");
    Ok(())
}
