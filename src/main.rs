use anyhow::Result;
use clap::{Parser, Subcommand};
use dotenv::dotenv;
use tracing::debug;
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

use tgwatch::config::{ConnectionArgs, MonitorArgs};

mod commands;

#[derive(Parser, Debug)]
#[command(
    name = "tgwatch",
    version,
    about = "Monitor Telegram channels and their discussion groups",
    long_about = "Polls public Telegram channels for recent posts and discussion comments, \
                  merges them with live updates and reports every new message once"
)]
struct Cli {
    #[command(flatten)]
    connection: ConnectionArgs,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Monitor channels until interrupted
    Monitor {
        #[command(flatten)]
        monitor: MonitorArgs,
    },

    /// Run a single polling pass and print the activity found
    Fetch {
        #[command(flatten)]
        monitor: MonitorArgs,

        /// Print one JSON object per item
        #[arg(long)]
        json: bool,
    },

    /// Resolve channel handles to ids
    Resolve {
        /// Channel handles (with or without @, t.me links accepted)
        #[arg(required = true)]
        channels: Vec<String>,

        /// Phone number used to log in when no valid session exists
        #[arg(long, env = "TGWATCH_PHONE")]
        phone: Option<String>,
    },

    /// Log in with a code sent to a phone number and store the session
    Login {
        /// Phone number in international format
        #[arg(long, env = "TGWATCH_PHONE")]
        phone: String,

        /// Log in again even if the stored session is valid
        #[arg(short, long)]
        force: bool,
    },

    /// Delete the stored session
    Logout,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenv().ok();

    let args = Cli::parse();

    // Initialize logging
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else if args.verbose {
        EnvFilter::new("info,tgwatch=debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    if args.verbose {
        debug!("Verbose mode enabled");
    }

    match args.command {
        Commands::Monitor { monitor } => {
            commands::monitor::execute(&args.connection, &monitor).await?
        }
        Commands::Fetch { monitor, json } => {
            commands::fetch::execute(&args.connection, &monitor, json).await?
        }
        Commands::Resolve { channels, phone } => {
            commands::resolve::execute(&args.connection, &channels, phone.as_deref()).await?
        }
        Commands::Login { phone, force } => {
            commands::login::execute(&args.connection, &phone, force).await?
        }
        Commands::Logout => commands::logout::execute(&args.connection.session_file)?,
    }

    Ok(())
}
