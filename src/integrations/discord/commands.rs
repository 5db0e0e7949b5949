//! Slash commands
//!
//! - `/sessions` lists every reported session per host
//! - `/week` reports the current entry of the configured weekly rotation

use super::protocol::Interaction;
use super::rest::RestClient;
use crate::config::RotationConfig;
use crate::data::{clean_name, AggregateState};
use crate::presence::SessionAggregator;
use chrono::{NaiveDate, Utc};
use serde::Serialize;
use tokio::sync::mpsc;

/// Command type for slash commands
const CHAT_INPUT: u8 = 1;

/// Definition sent to Discord when registering commands
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommandDefinition {
    pub name: &'static str,
    pub description: &'static str,
    #[serde(rename = "type")]
    pub kind: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BotCommand {
    Sessions,
    Week,
}

impl BotCommand {
    pub const ALL: [BotCommand; 2] = [BotCommand::Sessions, BotCommand::Week];

    pub fn name(&self) -> &'static str {
        match self {
            BotCommand::Sessions => "sessions",
            BotCommand::Week => "week",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            BotCommand::Sessions => "List all sessions currently running.",
            BotCommand::Week => "Get the current week type for the session rotation.",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.name() == name)
    }
}

pub fn definitions() -> Vec<CommandDefinition> {
    BotCommand::ALL
        .iter()
        .map(|c| CommandDefinition {
            name: c.name(),
            description: c.description(),
            kind: CHAT_INPUT,
        })
        .collect()
}

/// List every host and its sessions, including ones without users
pub fn sessions_reply(state: &AggregateState, tag: &str) -> String {
    if state.reports().all(|r| r.sessions.is_empty()) {
        return "No sessions are currently running.".to_string();
    }

    let mut lines = Vec::new();
    for report in state.reports().filter(|r| !r.sessions.is_empty()) {
        lines.push(format!(
            "**{}** (updated <t:{}:R>)",
            report.host,
            report.received_at.timestamp()
        ));
        for session in &report.sessions {
            lines.push(format!(
                "- {}: {}",
                clean_name(&session.name, tag),
                session.active_users
            ));
        }
    }
    lines.join("\n")
}

/// The rotation entry for the week containing `today`.
///
/// Weeks are counted from `anchor`; dates before the anchor count backwards.
pub fn current_week(rotation: &RotationConfig, today: NaiveDate) -> Option<&str> {
    if rotation.weeks.is_empty() {
        return None;
    }
    let weeks = (today - rotation.anchor).num_days().div_euclid(7);
    let index = weeks.rem_euclid(rotation.weeks.len() as i64) as usize;
    rotation.weeks.get(index).map(String::as_str)
}

pub fn week_reply(rotation: &RotationConfig, today: NaiveDate) -> String {
    match current_week(rotation, today) {
        Some(week) => format!("This week is **{}**.", week),
        None => "No week rotation is configured.".to_string(),
    }
}

/// Answer interactions until the gateway closes the channel
pub async fn run(
    mut interactions: mpsc::Receiver<Interaction>,
    rest: RestClient,
    aggregator: SessionAggregator,
    rotation: RotationConfig,
) {
    while let Some(interaction) = interactions.recv().await {
        let Some(name) = interaction.command_name() else {
            continue;
        };

        let reply = match BotCommand::from_name(name) {
            Some(BotCommand::Sessions) => {
                sessions_reply(&aggregator.snapshot(), &aggregator.options().strip_tag)
            }
            Some(BotCommand::Week) => week_reply(&rotation, Utc::now().date_naive()),
            None => {
                tracing::debug!("Ignoring unknown command /{}", name);
                continue;
            }
        };

        tracing::info!("Answering /{}", name);
        if let Err(e) = rest
            .respond_to_interaction(&interaction.id, &interaction.token, &reply)
            .await
        {
            tracing::warn!("Failed to answer /{}: {:#}", name, e);
        }
    }
}
