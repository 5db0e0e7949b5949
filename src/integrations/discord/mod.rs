//! Discord integration
//!
//! Uses the gateway for the bot's presence and incoming slash commands, and
//! the REST API for everything else (startup checks, command registration,
//! replies and broadcasts).

pub mod commands;
pub mod gateway;
pub mod protocol;
pub mod rest;

use crate::config::DiscordConfig;
use crate::integrations::ingest::Broadcaster;
use crate::presence::PresencePublisher;
use anyhow::{Context, Result};
use futures::future::BoxFuture;
use gateway::GatewayCommand;
use rest::RestClient;
use tokio::sync::mpsc;

/// Publishes status lines as the bot's custom status through the gateway task
pub struct DiscordPresence {
    gateway: mpsc::UnboundedSender<GatewayCommand>,
}

impl DiscordPresence {
    pub fn new(gateway: mpsc::UnboundedSender<GatewayCommand>) -> Self {
        Self { gateway }
    }
}

impl PresencePublisher for DiscordPresence {
    fn name(&self) -> &'static str {
        "discord"
    }

    fn publish(&self, status: &str) -> Result<()> {
        self.gateway
            .send(GatewayCommand::SetStatus(status.to_string()))
            .map_err(|_| anyhow::anyhow!("Discord gateway task is not running"))
    }
}

/// Sends broadcast messages to the configured log channel
pub struct LogChannel {
    rest: RestClient,
    channel_id: u64,
}

impl LogChannel {
    pub fn new(rest: RestClient, channel_id: u64) -> Self {
        Self { rest, channel_id }
    }

    pub async fn send(&self, message: &str) -> Result<()> {
        self.rest.send_message(self.channel_id, message).await
    }
}

impl Broadcaster for LogChannel {
    fn broadcast(&self, message: String) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move { self.send(&message).await })
    }
}

/// Check that the configured server and log channel exist.
///
/// Both are configuration errors and fail startup.
pub async fn validate_targets(rest: &RestClient, config: &DiscordConfig) -> Result<()> {
    let guild = rest
        .guild(config.server_id)
        .await
        .with_context(|| format!("Failed to find configured server {}", config.server_id))?;

    let channels = rest
        .guild_channels(config.server_id)
        .await
        .with_context(|| format!("Failed to list channels of server {}", guild.name))?;

    let channel_id = config.log_channel_id.to_string();
    if !channels.iter().any(|c| c.id == channel_id) {
        anyhow::bail!(
            "Failed to find configured channel ID {} in server {}",
            config.log_channel_id,
            guild.name
        );
    }

    tracing::info!("Using Discord server {} ({})", guild.name, guild.id);
    Ok(())
}

/// Register the bot's slash commands for the configured server.
///
/// Failures are logged; the bridge keeps running without commands.
pub async fn register_commands(rest: &RestClient, config: &DiscordConfig) {
    let application = match rest.current_application().await {
        Ok(app) => app,
        Err(e) => {
            tracing::error!("Failed to look up Discord application: {:#}", e);
            return;
        }
    };

    let definitions = commands::definitions();
    match rest
        .register_guild_commands(&application.id, config.server_id, &definitions)
        .await
    {
        Ok(()) => tracing::info!(
            "Registered {} commands for {}",
            definitions.len(),
            application.name
        ),
        Err(e) => tracing::error!("Failed to register commands: {:#}", e),
    }
}
