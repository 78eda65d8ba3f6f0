//! GES Connect CLI - sign in to GES Connect, keep the session alive and
//! log steps from the terminal.

mod commands;
mod format;
mod navigator;

use std::path::Path;

use anyhow::{bail, Context, Result};
use gesconnect_core::Config;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Log file name in the cache directory
const LOG_FILE: &str = "gesconnect.log";

const USAGE: &str = "\
Usage: gesconnect <command>

Commands:
  login [email]            Sign in (password from GES_PASSWORD or prompt)
  signup <name> <email>    Create an account
  whoami                   Show the signed-in user
  status                   Show session state
  steps                    Show this week's steps
  add-steps <n> [note]     Log steps for today
  watch                    Keep the session renewed until Ctrl-C
  logout                   Forget the stored session

Set RUST_LOG (e.g. RUST_LOG=debug) to control logging.";

/// Initialize the tracing subscriber, writing to a log file so terminal
/// output stays clean.
fn init_tracing(log_dir: &Path) -> Option<WorkerGuard> {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    if let Err(e) = std::fs::create_dir_all(log_dir) {
        eprintln!("Logging disabled: cannot create {}: {}", log_dir.display(), e);
        return None;
    }
    let appender = tracing_appender::rolling::never(log_dir, LOG_FILE);
    let (writer, guard) = tracing_appender::non_blocking(appender);

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(writer).with_ansi(false))
        .with(filter)
        .init();
    Some(guard)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let mut config = Config::load().unwrap_or_else(|e| {
        eprintln!("Warning: ignoring unreadable config: {}", e);
        Config::default()
    });

    let _log_guard = match config.cache_dir() {
        Ok(dir) => init_tracing(&dir),
        Err(_) => None,
    };
    info!("GES Connect CLI starting");

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(command) = args.first() else {
        println!("{}", USAGE);
        return Ok(());
    };

    let result = match command.as_str() {
        "login" => commands::login(&mut config, args.get(1).cloned()).await,
        "signup" => match (args.get(1), args.get(2)) {
            (Some(name), Some(email)) => commands::signup(&config, name, email).await,
            _ => bail!("Usage: gesconnect signup <name> <email>"),
        },
        "whoami" => commands::whoami(&config).await,
        "status" => commands::status(&config).await,
        "steps" => commands::steps(&config).await,
        "add-steps" => {
            let steps: u64 = args
                .get(1)
                .context("Usage: gesconnect add-steps <n> [note]")?
                .parse()
                .context("Step count must be a whole number")?;
            let note = (args.len() > 2).then(|| args[2..].join(" "));
            commands::add_steps(&config, steps, note).await
        }
        "watch" => commands::watch(&config).await,
        "logout" => commands::logout(&config),
        "help" | "--help" | "-h" => {
            println!("{}", USAGE);
            Ok(())
        }
        other => bail!("Unknown command '{}'\n\n{}", other, USAGE),
    };

    if let Err(ref e) = result {
        warn!(error = %e, command = %command, "Command failed");
    }
    info!("GES Connect CLI exiting");
    result
}
