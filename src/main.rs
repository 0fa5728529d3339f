//! CLI for realtime-mux
//!
//! Subcommands:
//! - `watch`: connect and log every envelope (or only the given topics)
//! - `send`: connect, send one envelope, disconnect
//! - `chat`: join one event's live chat and log its messages

use clap::{Parser, Subcommand};
use realtime_mux::adapters::ChatRoom;
use realtime_mux::adapters::chat::ChatMessage;
use realtime_mux::config::{Settings, load_config};
use realtime_mux::utils::logging;
use realtime_mux::{ConnectionStatus, Envelope, RealtimeClient, Subscription, TypedEnvelope};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = "realtime-mux")]
struct Cli {
    /// Bearer token attached to the connection
    #[arg(long, env = "REALTIME_TOKEN", global = true)]
    token: Option<String>,

    /// Websocket endpoint, overrides the configured one
    #[arg(long, global = true)]
    url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Log incoming envelopes until Ctrl-C
    Watch {
        /// Topic to log; repeat for several. Logs everything when omitted.
        #[arg(long = "topic")]
        topics: Vec<String>,
    },
    /// Send one envelope and exit
    Send {
        #[arg(long)]
        topic: String,
        /// JSON payload
        #[arg(long, default_value = "{}")]
        payload: String,
        /// Seconds to wait for the connection
        #[arg(long, default_value_t = 10)]
        wait: u64,
    },
    /// Join a live chat and log its messages until Ctrl-C
    Chat {
        #[arg(long)]
        event_id: String,
    },
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    let mut settings = match load_config() {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Invalid configuration, using defaults: {e}");
            Settings::default()
        }
    };
    logging::init(&settings.logging.level);

    if let Some(url) = cli.url {
        settings.connection.url = url;
    }

    if let Err(e) = run(cli.command, cli.token, settings).await {
        error!("realtime-mux failed: {}", e);
        std::process::exit(1);
    }
}

async fn run(
    command: Command,
    token: Option<String>,
    settings: Settings,
) -> Result<(), Box<dyn std::error::Error>> {
    let client = RealtimeClient::new(&settings.connection)?;
    client.set_auth_token(token);

    let (status_tx, status_rx) = watch::channel(client.status());
    let status_sub = client.on_status_change(move |status| {
        info!(%status, "connection status changed");
        let _ = status_tx.send(status);
    });

    match command {
        Command::Watch { topics } => {
            let subscriptions: Vec<Subscription> = if topics.is_empty() {
                vec![client.subscribe_all(log_envelope)]
            } else {
                topics
                    .iter()
                    .map(|topic| client.subscribe(topic, log_envelope))
                    .collect()
            };
            client.connect();
            tokio::signal::ctrl_c().await?;
            info!("Shutdown signal received. Exiting gracefully.");
            subscriptions.iter().for_each(Subscription::unsubscribe);
        }
        Command::Send {
            topic,
            payload,
            wait,
        } => {
            let payload: serde_json::Value = serde_json::from_str(&payload)?;
            client.connect();
            wait_connected(status_rx, Duration::from_secs(wait)).await?;
            if client.send(&topic, payload) {
                info!(topic, "sent");
            } else {
                warn!(topic, "send failed");
            }
            // let the session flush the frame before closing
            tokio::time::sleep(Duration::from_millis(200)).await;
        }
        Command::Chat { event_id } => {
            let room = ChatRoom::join(&client, event_id, &settings.adapters);
            let printer = client.subscribe_typed("chat.message", |envelope: TypedEnvelope<ChatMessage>| {
                let message = envelope.payload;
                info!(
                    author = message.author_name.as_deref().unwrap_or("anonymous"),
                    "{}",
                    message.message
                );
            });
            client.connect();
            tokio::signal::ctrl_c().await?;
            info!(retained = room.messages().len(), "leaving chat");
            printer.unsubscribe();
            room.leave();
        }
    }

    status_sub.unsubscribe();
    client.disconnect();
    Ok(())
}

fn log_envelope(envelope: &Envelope) {
    info!(topic = %envelope.topic, id = %envelope.id, "{}", envelope.payload);
}

async fn wait_connected(
    mut status: watch::Receiver<ConnectionStatus>,
    limit: Duration,
) -> Result<(), Box<dyn std::error::Error>> {
    let connected = status.wait_for(|s| *s == ConnectionStatus::Connected);
    match tokio::time::timeout(limit, connected).await {
        Ok(Ok(_)) => Ok(()),
        Ok(Err(e)) => Err(e.into()),
        Err(_) => Err(format!("not connected after {}s", limit.as_secs()).into()),
    }
}
