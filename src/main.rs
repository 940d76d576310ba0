//! call-relay - telephony event relay host
//!
//! Hosts the relay controller on NATS: call events arrive as requests on
//! the events subject and the reply carries the action list for the
//! telephony platform. Single events can also be handled from a file or
//! stdin for debugging.

use anyhow::{Context, Result};
use bytes::Bytes;
use call_relay::host::serve_until;
use call_relay::outbound::NatsCallPlacer;
use call_relay::{
    place_outbound_call, ActionResult, NatsClient, NatsOrchestrator, NatsQueueService,
    OutboundCallRequest, RelayConfig, RelayController,
};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Environment variable selecting the log level when `RUST_LOG` is unset
const LOG_LEVEL_ENV: &str = "LogLevel";

#[derive(Parser)]
#[command(name = "call-relay")]
#[command(author = "A3S Lab Team")]
#[command(version)]
#[command(about = "Relay telephony call events into workflow orchestrations")]
struct Cli {
    /// Configuration file path (.json)
    #[arg(short, long, env = "CALL_RELAY_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve call events from the NATS events subject
    Serve {
        /// Override the events subject
        #[arg(long)]
        subject: Option<String>,
    },

    /// Handle a single call event and print the action list
    Handle {
        /// Event file (stdin if not specified)
        #[arg(short, long)]
        event: Option<PathBuf>,
    },

    /// Place an outbound call through the telephony adapter
    PlaceCall {
        /// Business number the call is placed from
        #[arg(long)]
        business_number: String,

        /// Business owner's number to dial
        #[arg(long)]
        owner_number: String,

        /// Media-control application handling the call
        #[arg(long)]
        sip_media_application_id: String,

        /// Customer's number, passed to the call flow
        #[arg(long)]
        customer_number: String,
    },

    /// Show configuration
    Config {
        /// Show default configuration
        #[arg(long)]
        default: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| log_filter(cli.verbose).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = load_config(cli.config.as_ref())?;

    match cli.command {
        Commands::Config { default } => {
            let shown = if default {
                RelayConfig::default()
            } else {
                config
            };
            println!("{}", serde_json::to_string_pretty(&shown)?);
        }
        Commands::Handle { event } => {
            config.validate().context("Invalid relay configuration")?;
            let (_, controller) = nats_controller(&config).await?;
            handle_one(&controller, event).await?;
        }
        Commands::Serve { subject } => {
            config.validate().context("Invalid relay configuration")?;
            let subject = subject.unwrap_or_else(|| config.nats.events_subject.clone());
            serve(&config, subject).await?;
        }
        Commands::PlaceCall {
            business_number,
            owner_number,
            sip_media_application_id,
            customer_number,
        } => {
            let client = NatsClient::connect(config.nats.clone())
                .await
                .context("Failed to connect to NATS")?;
            let placer = NatsCallPlacer::new(client);
            let request = OutboundCallRequest {
                business_phone_number: business_number,
                business_owner_phone_number: owner_number,
                sip_media_application_id,
                customer_phone_number: customer_number,
            };
            let response = place_outbound_call(&placer, &request).await?;
            println!("{}", serde_json::to_string_pretty(&response)?);
        }
    }

    Ok(())
}

fn log_filter(verbose: bool) -> String {
    let level = if verbose {
        "debug"
    } else {
        match std::env::var(LOG_LEVEL_ENV) {
            Ok(level) if level.eq_ignore_ascii_case("debug") => "debug",
            _ => "info",
        }
    };
    format!("call_relay={},async_nats=warn", level)
}

fn load_config(path: Option<&PathBuf>) -> Result<RelayConfig> {
    let mut config = match path {
        Some(path) => RelayConfig::from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => RelayConfig::default(),
    };
    config.apply_env().context("Invalid CallFlowsDIDMap")?;
    Ok(config)
}

async fn nats_controller(config: &RelayConfig) -> Result<(NatsClient, RelayController)> {
    let client = NatsClient::connect(config.nats.clone())
        .await
        .context("Failed to connect to NATS")?;
    let controller = RelayController::from_config(
        config,
        Arc::new(NatsQueueService::new(client.clone(), config.queue.clone())),
        Arc::new(NatsOrchestrator::new(client.clone())),
    )?;
    Ok((client, controller))
}

async fn handle_one(controller: &RelayController, event: Option<PathBuf>) -> Result<()> {
    let bytes = match event {
        Some(path) => tokio::fs::read(&path)
            .await
            .with_context(|| format!("Failed to read event file {}", path.display()))?,
        None => {
            let mut buf = Vec::new();
            tokio::io::stdin()
                .read_to_end(&mut buf)
                .await
                .context("Failed to read event from stdin")?;
            buf
        }
    };
    let raw: serde_json::Value =
        serde_json::from_slice(&bytes).context("Event is not valid JSON")?;

    let report = controller.handle_with_report(raw).await;
    tracing::info!(teardown = ?report.teardown, "Event handled");
    println!("{}", serde_json::to_string_pretty(&report.into_response())?);
    Ok(())
}

async fn serve(config: &RelayConfig, subject: String) -> Result<()> {
    let (client, controller) = nats_controller(config).await?;
    let nats = client.nats_client().clone();
    let events = nats
        .subscribe(subject.clone())
        .await
        .with_context(|| format!("Failed to subscribe to {}", subject))?;

    tracing::info!(
        subject = %subject,
        routes = controller.routes().len(),
        "Relay serving call events"
    );

    let publisher = nats.clone();
    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };
    serve_until(events, shutdown, move |msg: async_nats::Message| {
        let controller = controller.clone();
        let nats = publisher.clone();
        async move {
            let response = match serde_json::from_slice(&msg.payload) {
                Ok(raw) => controller.handle(raw).await,
                Err(e) => {
                    tracing::error!(error = %e, "Event payload is not valid JSON");
                    ActionResult::no_action()
                }
            };
            let Some(reply) = msg.reply else {
                tracing::warn!("Call event without reply subject, response dropped");
                return;
            };
            match serde_json::to_vec(&response) {
                Ok(body) => {
                    if let Err(e) = nats.publish(reply, Bytes::from(body)).await {
                        tracing::error!(error = %e, "Failed to publish action list");
                    }
                }
                Err(e) => tracing::error!(error = %e, "Failed to encode action list"),
            }
        }
    })
    .await;

    nats.flush().await.context("Failed to flush replies")?;
    Ok(())
}
