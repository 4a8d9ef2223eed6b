//! robot-relay - store-and-forward message relay for robots.

mod app;
mod ipc;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use relay_config_and_utils::{init_logging, Config, Paths, StoreBackend};

/// robot-relay command-line interface.
#[derive(Parser)]
#[command(name = "robot-relay")]
#[command(about = "Presence-tracked store-and-forward relay for robots")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Log level (trace, debug, info, warn, error). Defaults to the configured level
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    /// Base directory for runtime files (config, database, logs). Defaults to ~/.robot-relay
    #[arg(long, global = true)]
    base_dir: Option<PathBuf>,

    /// Address to listen on, or to reach the relay at
    #[arg(long, global = true)]
    listen: Option<String>,

    /// Outbox backend (sqlite, redis)
    #[arg(long, global = true)]
    store: Option<StoreBackend>,

    /// Redis URL for the redis backend
    #[arg(long, global = true)]
    redis_url: Option<String>,

    /// Shared secret for robots and senders
    #[arg(long, global = true, env = "RELAY_SECRET", hide_env_values = true)]
    secret: Option<String>,
}

impl Cli {
    /// Command-line flags win over the config file and environment.
    fn apply_to(&self, config: &mut Config) {
        if let Some(level) = &self.log_level {
            config.log_level = level.clone();
        }
        if let Some(listen) = &self.listen {
            config.listen_addr = listen.clone();
        }
        if let Some(store) = self.store {
            config.store = store;
        }
        if let Some(url) = &self.redis_url {
            config.redis_url = url.clone();
        }
        if let Some(secret) = &self.secret {
            config.shared_secret = Some(secret.clone());
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Start the relay in the foreground
    Start,
    /// Stop a running relay
    Stop,
    /// Show relay health, or one robot's presence and backlog
    Status {
        /// Robot to inspect
        recipient: Option<String>,
    },
    /// Send a message to a robot
    Send {
        /// Robot identity
        recipient: String,
        /// Message body; parsed as JSON when possible, otherwise sent as text
        body: String,
        /// Sender identity
        #[arg(long)]
        from: Option<String>,
    },
    /// Relay an SMS to a robot
    Sms {
        /// Robot identity
        recipient: String,
        /// SMS text
        text: String,
        /// Phone number the SMS came from
        #[arg(long)]
        from: String,
        /// Phone number the SMS was sent to
        #[arg(long, default_value = "")]
        to: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Load configuration
    let paths = match &cli.base_dir {
        Some(base) => Paths::with_base_dir(base.clone()),
        None => Paths::new()?,
    };
    let mut config = Config::load(&paths)?;
    cli.apply_to(&mut config);

    init_logging(&config.log_level);

    match cli.command {
        Some(Commands::Start) | None => {
            app::run_relay(config, paths).await?;
        }
        Some(Commands::Stop) => {
            app::stop_relay(&config).await?;
        }
        Some(Commands::Status { recipient }) => {
            app::check_status(&config, recipient.as_deref()).await?;
        }
        Some(Commands::Send {
            recipient,
            body,
            from,
        }) => {
            app::send_message(&config, &recipient, body, from).await?;
        }
        Some(Commands::Sms {
            recipient,
            text,
            from,
            to,
        }) => {
            app::send_sms(&config, &recipient, text, from, to).await?;
        }
    }

    Ok(())
}
