use clap::{Parser, Subcommand};
use std::process::ExitCode;
use thiserror::Error;
use tracing_subscriber::EnvFilter;

use dive_auth_gate::config::ConfigError;
use dive_auth_gate::{ApiError, AppConfig, AuthGate, Credentials, GateError};

#[derive(Debug, Error)]
enum CliError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Gate(#[from] GateError),

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("Failed to render output: {0}")]
    Output(#[from] serde_json::Error),
}

/// Command-line client for the dive shop auth gate
#[derive(Debug, Parser)]
#[command(name = "dive-auth", version, about)]
struct Cli {
    /// Base URL of the REST API (overrides SERVER_URL)
    #[arg(long, global = true)]
    server_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Sign in and store the session
    SignIn {
        #[arg(long)]
        email: String,
        #[arg(long, env = "DIVE_PASSWORD", hide_env_values = true)]
        password: String,
        /// Query string of the sign-in page, to follow its returnTo
        #[arg(long)]
        query: Option<String>,
    },
    /// Forget the stored session
    SignOut,
    /// Show the resolved auth state
    Whoami,
    /// Evaluate the route guards for a location
    Visit { location: String },
    /// Send an authenticated GET request
    Get {
        path: String,
        /// Page the request is made from; on a 401 its guard outcome is shown
        #[arg(long)]
        from: Option<String>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_level(true)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let config = AppConfig::from_lookup(|name| {
        if name == "SERVER_URL" {
            cli.server_url.clone().or_else(|| std::env::var(name).ok())
        } else {
            std::env::var(name).ok()
        }
    })?;

    let gate = AuthGate::from_config(&config)?;

    match cli.command {
        Command::SignIn {
            email,
            password,
            query,
        } => {
            let session = gate.api().sign_in(&Credentials::new(email, password)).await?;
            println!("Signed in as user {} ({})", session.user_id(), session.role());

            if let Some(query) = query {
                let redirect = gate.navigator().after_sign_in(&query);
                println!("Continue to {}", redirect.location);
            }
        }
        Command::SignOut => {
            gate.api().sign_out().await?;
            println!("Signed out");
        }
        Command::Whoami => {
            let state = gate.resolver().resolve().await;
            print_json(&state)?;
        }
        Command::Visit { location } => {
            gate.resolver().resolve().await;
            let visit = gate.navigator().visit_settled(&location).await;
            print_json(&visit)?;
        }
        Command::Get { path, from } => match gate.api().get(&path).await {
            Ok(response) => {
                println!("{}", response.status);
                println!("{}", response.body);
            }
            Err(e) => {
                // After a 401 the session is gone; show where the guards send the page
                if let Some(from) = from.filter(|_| e.is_auth_failure()) {
                    let state = gate.resolver().refresh().await;
                    print_json(&gate.navigator().visit_with(&state, &from))?;
                }
                return Err(e.into());
            }
        },
    }

    Ok(())
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<(), CliError> {
    let rendered = serde_json::to_string_pretty(value)?;
    println!("{}", rendered);
    Ok(())
}
