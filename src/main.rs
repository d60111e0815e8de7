//! `mail-oauth-token` -- operator CLI for the mail OAuth2 token file.
//!
//! - `status` -- Show the persisted token's expiry without network I/O.
//! - `ensure` -- Check the token and refresh it if it is about to expire.
//! - `refresh` -- Refresh regardless of remaining lifetime.
//! - `thumbprint` -- Print the `x5t` thumbprint of the configured certificate.
//! - `watch` -- Keep the token fresh on an interval until Ctrl-C.
//!
//! Configuration comes from `PENS_OAUTH_*` environment variables, optionally
//! loaded from a `.env` file.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use mail_oauth_integration::{
    create_token_manager, create_tracing_logger, CredentialConfigBuilder, Logger, OAuth2Error,
    RefreshPoller, TokenManager,
};

/// Maintain the OAuth2 token used by the mail monitor.
#[derive(Parser)]
#[command(name = "mail-oauth-token", version)]
struct Cli {
    /// Token file; overrides PENS_OAUTH_TOKEN_FILE.
    #[arg(long, global = true)]
    token_file: Option<PathBuf>,

    /// Enable debug-level logging when RUST_LOG is unset.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Show token status.
    Status,
    /// Check the token and refresh it if needed.
    Ensure,
    /// Refresh the token now.
    Refresh,
    /// Print the certificate thumbprint (x5t).
    Thumbprint,
    /// Keep the token fresh until interrupted.
    Watch {
        /// Seconds between checks.
        #[arg(long, default_value_t = 60)]
        interval: u64,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!(error_code = e.error_code(), "{}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode, OAuth2Error> {
    let mut builder = CredentialConfigBuilder::from_env();
    if let Some(path) = cli.token_file {
        builder = builder.token_file(path);
    }
    let config = builder.build()?;

    let logger: Arc<dyn Logger> = Arc::new(create_tracing_logger());
    let manager = Arc::new(create_token_manager(config, logger.clone())?);

    match cli.command {
        Command::Status => {
            let status = manager.token_status().await?;
            println!("token file:      {}", manager.config().token_file.display());
            println!("access token:    {}", presence(status.has_access_token));
            println!("refresh token:   {}", presence(status.has_refresh_token));
            match (status.expires_at, status.remaining_secs) {
                (Some(at), Some(remaining)) => {
                    println!("expires at:      {}", at.to_rfc3339());
                    println!("remaining:       {}s", remaining);
                }
                _ => println!("expires at:      never"),
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::Ensure => {
            manager.try_ensure_valid_token().await?;
            println!("token valid");
            Ok(ExitCode::SUCCESS)
        }
        Command::Refresh => {
            manager.force_refresh().await?;
            println!("token refreshed");
            Ok(ExitCode::SUCCESS)
        }
        Command::Thumbprint => {
            let thumbprint = manager.certificate_thumbprint();
            if thumbprint.is_empty() {
                eprintln!("no readable certificate configured");
                return Ok(ExitCode::FAILURE);
            }
            println!("{}", thumbprint);
            Ok(ExitCode::SUCCESS)
        }
        Command::Watch { interval } => {
            let poller = RefreshPoller::new(
                manager.clone(),
                Duration::from_secs(interval.max(1)),
                logger,
            );

            let cancel = CancellationToken::new();
            let cancel_on_signal = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    cancel_on_signal.cancel();
                }
            });

            let stats = poller.run(cancel).await;
            tracing::info!(
                cycles = stats.cycles,
                successes = stats.successes,
                failures = stats.failures,
                "watch stopped"
            );
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn presence(present: bool) -> &'static str {
    if present {
        "present"
    } else {
        "absent"
    }
}
