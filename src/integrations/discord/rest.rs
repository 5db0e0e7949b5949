//! HTTP client for the Discord REST API

use super::commands::CommandDefinition;
use crate::config::DiscordConfig;
use crate::integrations::HTTP_CLIENT;
use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;

#[derive(Debug, Clone, Deserialize)]
pub struct Application {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Guild {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Channel {
    pub id: String,
}

/// Interaction callback type: reply with a message
const CHANNEL_MESSAGE_WITH_SOURCE: u8 = 4;

#[derive(Debug, Clone)]
pub struct RestClient {
    api_base: String,
    token: String,
    http: reqwest::Client,
}

impl RestClient {
    pub fn new(config: &DiscordConfig) -> Result<Self> {
        Ok(Self {
            api_base: config.api_base.trim_end_matches('/').to_string(),
            token: config.token()?.to_string(),
            http: HTTP_CLIENT.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.api_base, path)
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        self.http
            .request(method, self.url(path))
            .header(reqwest::header::AUTHORIZATION, format!("Bot {}", self.token))
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response> {
        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Discord API returned status {}: {}", status, body);
        }
        Ok(response)
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let response = self.send(self.request(reqwest::Method::GET, path)).await?;
        let value = response
            .json()
            .await
            .with_context(|| format!("Failed to parse response from {}", path))?;
        Ok(value)
    }

    pub async fn current_application(&self) -> Result<Application> {
        self.get("/applications/@me").await
    }

    pub async fn guild(&self, guild_id: u64) -> Result<Guild> {
        self.get(&format!("/guilds/{}", guild_id)).await
    }

    pub async fn guild_channels(&self, guild_id: u64) -> Result<Vec<Channel>> {
        self.get(&format!("/guilds/{}/channels", guild_id)).await
    }

    /// Post a plain text message. Mentions in the text never ping anyone.
    pub async fn send_message(&self, channel_id: u64, content: &str) -> Result<()> {
        let body = json!({
            "content": content,
            "allowed_mentions": { "parse": [] },
        });
        self.send(
            self.request(
                reqwest::Method::POST,
                &format!("/channels/{}/messages", channel_id),
            )
            .json(&body),
        )
        .await?;
        Ok(())
    }

    /// Replace the server's command set with `commands`
    pub async fn register_guild_commands(
        &self,
        application_id: &str,
        guild_id: u64,
        commands: &[CommandDefinition],
    ) -> Result<()> {
        self.send(
            self.request(
                reqwest::Method::PUT,
                &format!("/applications/{}/guilds/{}/commands", application_id, guild_id),
            )
            .json(commands),
        )
        .await?;
        Ok(())
    }

    pub async fn respond_to_interaction(
        &self,
        interaction_id: &str,
        interaction_token: &str,
        content: &str,
    ) -> Result<()> {
        let body = json!({
            "type": CHANNEL_MESSAGE_WITH_SOURCE,
            "data": {
                "content": content,
                "allowed_mentions": { "parse": [] },
            },
        });
        self.send(
            self.request(
                reqwest::Method::POST,
                &format!("/interactions/{}/{}/callback", interaction_id, interaction_token),
            )
            .json(&body),
        )
        .await?;
        Ok(())
    }
}
