//! Devlink CLI - device-management client
//!
//! Authenticates a device against the Devlink service and drives the
//! device-side operations: ping, location reporting, handshake-secret
//! provisioning, and the remote-wipe sequence.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use devlink_cli::api::{DeviceClient, HttpTransport, Transport};
use devlink_cli::auth::tokens::now_millis;
use devlink_cli::auth::{AccountStore, MemoryHandshakeStore};
use devlink_cli::config::{ClientConfig, FileAccountStore, Profile};
use devlink_cli::device::{
    generate_device_id, DeviceWipeCoordinator, NoopSuspendBlocker, StaticDeviceIdentity,
    WipeEffect,
};

#[derive(Parser)]
#[command(name = "devlink-cli")]
#[command(about = "CLI client for the Devlink device-management service", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Debug mode: honor server/skip-wipe overrides
    #[arg(long, global = true)]
    debug_mode: bool,

    /// Override the server root URI (debug mode only)
    #[arg(long, global = true)]
    server_uri: Option<String>,

    /// Skip the destructive wipe step (debug mode only)
    #[arg(long, global = true)]
    skip_wipe: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Authenticate with the Devlink service
    Login {
        username: String,
        password: String,
    },

    /// Log out and clear stored credentials
    Logout,

    /// Show current authentication status
    Status,

    /// Register a new profile
    Register {
        first_name: String,
        last_name: String,
        email: String,
        username: String,
        password: String,

        /// Accept the terms of service
        #[arg(long)]
        accept_tos: bool,
    },

    /// Check whether an email/username pair is available
    Available { email: String, username: String },

    /// Ping the service so it knows this device is alive
    Ping,

    /// Report the device's position
    ReportLocation {
        latitude: f64,
        longitude: f64,

        /// Position accuracy in meters
        #[arg(short, long, default_value = "0")]
        accuracy: f32,
    },

    /// Derive a handshake secret for a command and upload it
    SetHandshake {
        /// Command the secret authorizes (e.g. "wipe")
        command: String,
    },

    /// Run the remote-wipe sequence
    Wipe,
}

/// Wipe effect for the CLI: there is no platform to destroy here, so
/// it only reports that the effect fired.
struct LoggingWipeEffect;

impl WipeEffect for LoggingWipeEffect {
    fn wipe(&self) {
        tracing::info!("Wipe effect triggered");
    }
}

fn build_client(cli: &Cli) -> Result<DeviceClient> {
    let config = ClientConfig {
        debug_mode: cli.debug_mode,
        server_uri_override: cli.server_uri.clone(),
        skip_wipe_override: cli.skip_wipe,
    };

    let mut profile = Profile::load()?;
    let device_id = match &profile.device_id {
        Some(id) => id.clone(),
        None => {
            let id = generate_device_id()?;
            profile.device_id = Some(id.clone());
            profile.save().context("Failed to persist device id")?;
            id
        }
    };

    let store: Arc<dyn AccountStore> = Arc::new(FileAccountStore::from_profile(profile));
    let transport: Arc<dyn Transport> = Arc::new(HttpTransport::new());
    Ok(DeviceClient::new(
        config,
        store,
        transport,
        Arc::new(StaticDeviceIdentity::new(device_id, None)),
        Arc::new(MemoryHandshakeStore::new()),
    ))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let client = build_client(&cli)?;

    match cli.command {
        Commands::Login { username, password } => {
            tracing::info!("Logging in...");
            client.login(&username, &password).await?;
            println!("Login successful.");
        }
        Commands::Logout => {
            client.logout();
            println!("Logged out.");
        }
        Commands::Status => {
            match client.account_store().account() {
                Some(account) if account.token_is_fresh(now_millis()) => {
                    println!("Access token: valid");
                    if let Some(expires_at) = account.expires_at_millis {
                        println!("  expires_at_millis: {expires_at}");
                    }
                }
                Some(_) => println!("Access token: expired"),
                None => println!("Access token: none (run 'devlink-cli login')"),
            }
        }
        Commands::Register {
            first_name,
            last_name,
            email,
            username,
            password,
            accept_tos,
        } => {
            client
                .create_profile(&first_name, &last_name, &email, &username, &password, accept_tos)
                .await?;
            println!("Profile registered.");
        }
        Commands::Available { email, username } => {
            let response = client.check_profile(&email, &username).await?;
            println!("{}", response.body);
        }
        Commands::Ping => {
            client.ping().await?;
            println!("Pong.");
        }
        Commands::ReportLocation {
            latitude,
            longitude,
            accuracy,
        } => {
            client
                .report_location(latitude, longitude, accuracy)
                .await?;
            println!("Location reported.");
        }
        Commands::SetHandshake { command } => {
            let nonce = generate_device_id()?;
            let secret = client.handshake().generate(&nonce, &command)?;
            client.send_handshake_secret(&command, &secret).await?;
            println!("Handshake secret set for '{command}'.");
        }
        Commands::Wipe => {
            let coordinator = DeviceWipeCoordinator::new(
                Arc::new(client),
                Arc::new(LoggingWipeEffect),
                Arc::new(NoopSuspendBlocker),
            );
            coordinator
                .destroy_device()
                .await
                .context("Wipe task panicked")?;
            println!("Wipe sequence finished: {:?}", coordinator.state());
        }
    }

    Ok(())
}
