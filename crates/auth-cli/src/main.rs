//! authctl - drive an authenticated API session from the command line.

mod commands;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use auth_session::{AuthSession, LogoutHook};
use clap::{Parser, Subcommand};
use client_config::{init_logging, Config, Paths};

/// authctl command-line interface.
#[derive(Parser)]
#[command(name = "authctl")]
#[command(about = "Log in, make authenticated API calls and manage the stored session")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (trace, debug, info, warn, error). Defaults to the configured level
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    /// Base directory for config, credentials and logs. Defaults to ~/.authctl
    #[arg(long, global = true)]
    base_dir: Option<PathBuf>,

    /// Mirror logs to stderr
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the stored session
    Status,
    /// Store a credential pair obtained elsewhere
    Login {
        access_token: String,
        refresh_token: String,
        #[arg(long)]
        email: Option<String>,
        #[arg(long)]
        full_name: Option<String>,
        #[arg(long)]
        phone_number: Option<String>,
    },
    /// Request a one-time code by SMS
    SendOtp {
        phone: String,
        #[arg(long, env = "AUTHCTL_RECAPTCHA_TOKEN")]
        recaptcha_token: String,
    },
    /// Verify a one-time code and start a session
    VerifyOtp { code: String, session_info: String },
    /// Create an account
    Signup {
        #[arg(long)]
        full_name: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        phone_number: String,
        #[arg(long, env = "AUTHCTL_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// GET a protected path and print the JSON response
    Get { path: String },
    /// POST JSON to a protected path and print the JSON response
    Post {
        path: String,
        /// Request body as JSON
        #[arg(long, default_value = "{}")]
        data: String,
    },
    /// Exchange the refresh credential for a new access credential now
    Refresh,
    /// Revoke the session on the server and forget it locally
    Logout {
        /// Skip the server call and only forget the local session
        #[arg(long)]
        local: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let paths = match cli.base_dir {
        Some(base) => Paths::with_base_dir(base),
        None => Paths::new()?,
    };
    paths.ensure_dirs()?;
    let config = Config::load(&paths)?;

    let level = cli.log_level.as_deref().unwrap_or(&config.log_level);
    init_logging(level, &paths, cli.verbose);

    let vault = credential_storage::create_credential_vault(paths.credentials_file())
        .with_context(|| format!("opening {}", paths.credentials_file().display()))?;
    let on_logout: LogoutHook = Arc::new(|| {
        eprintln!("Session ended. Log in again to continue.");
    });
    let session = AuthSession::from_config(&config, vault, Some(on_logout))?;
    session.hydrate();

    let result = match cli.command {
        Commands::Status => commands::status(&session),
        Commands::Login {
            access_token,
            refresh_token,
            email,
            full_name,
            phone_number,
        } => commands::login(&session, &access_token, &refresh_token, email, full_name, phone_number),
        Commands::SendOtp {
            phone,
            recaptcha_token,
        } => commands::send_otp(&session, &phone, &recaptcha_token).await,
        Commands::VerifyOtp { code, session_info } => {
            commands::verify_otp(&session, &code, &session_info).await
        }
        Commands::Signup {
            full_name,
            email,
            phone_number,
            password,
        } => commands::signup(&session, full_name, email, phone_number, password).await,
        Commands::Get { path } => commands::get(&session, &path).await,
        Commands::Post { path, data } => commands::post(&session, &path, &data).await,
        Commands::Refresh => commands::refresh(&session).await,
        Commands::Logout { local } => commands::logout(&session, local).await,
    };

    if let Some(hint) = result.as_ref().err().and_then(commands::retry_hint) {
        eprintln!("{hint}");
    }
    result
}
