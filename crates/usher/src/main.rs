//! Usher: meeting-join bot scheduler.
//!
//! Single `serve` subcommand: runs the scheduling API and the timer loop
//! that fires join workflows against the remote bot service.

use clap::{Parser, Subcommand};
use miette::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod serve;

#[derive(Parser)]
#[command(name = "usher")]
#[command(about = "Meeting-join bot scheduler", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the scheduling API and timer loop
    Serve {
        /// HTTP listen port
        #[arg(long, env = "USHER_PORT", default_value = "8001")]
        port: u16,

        /// Redis URL for the shared state store; omit to run with the
        /// in-process store (single-worker deployments only)
        #[arg(long, env = "USHER_REDIS_URL")]
        redis_url: Option<String>,

        /// Bot-joining service endpoint (e.g. https://app.attendee.dev/api/v1/bots)
        #[arg(long, env = "USHER_JOIN_ENDPOINT")]
        join_endpoint: String,

        /// Credential-issuing endpoint; omit to rely on static keys only
        #[arg(long, env = "USHER_CREDENTIAL_ENDPOINT")]
        credential_endpoint: Option<String>,

        /// Internal shared secret forwarded to the credential endpoint
        #[arg(long, env = "USHER_INTERNAL_SECRET")]
        internal_secret: Option<String>,

        /// Static API key used for every bot without a resolved credential
        #[arg(long, env = "USHER_API_KEY")]
        api_key: Option<String>,

        /// Seconds between status polls of a created bot
        #[arg(long, env = "USHER_POLL_INTERVAL_SECS", default_value = "10")]
        poll_interval_secs: u64,

        /// Maximum status polls per join attempt
        #[arg(long, env = "USHER_MAX_POLLS", default_value = "10")]
        max_polls: u32,

        /// Bot creation attempts per join
        #[arg(long, env = "USHER_CREATE_ATTEMPTS", default_value = "3")]
        create_attempts: u32,

        /// Seconds between bot creation attempts
        #[arg(long, env = "USHER_CREATE_RETRY_DELAY_SECS", default_value = "10")]
        create_retry_delay_secs: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "usher=info".to_string()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            port,
            redis_url,
            join_endpoint,
            credential_endpoint,
            internal_secret,
            api_key,
            poll_interval_secs,
            max_polls,
            create_attempts,
            create_retry_delay_secs,
        } => {
            serve::run(serve::ServeConfig {
                port,
                redis_url,
                join_endpoint,
                credential_endpoint,
                internal_secret,
                api_key,
                poll_interval_secs,
                max_polls,
                create_attempts,
                create_retry_delay_secs,
            })
            .await
        }
    }
}
