use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub discord: DiscordConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub presence: PresenceConfig,
    #[serde(default)]
    pub rotation: RotationConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscordConfig {
    /// Bot token
    #[serde(default)]
    pub token: Option<String>,
    /// Server (guild) the bot operates in
    pub server_id: u64,
    /// Channel that receives broadcast messages
    pub log_channel_id: u64,
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default = "default_gateway_url")]
    pub gateway_url: String,
}

fn default_api_base() -> String {
    "https://discord.com/api/v10".to_string()
}

fn default_gateway_url() -> String {
    "wss://gateway.discord.gg/?v=10&encoding=json".to_string()
}

impl DiscordConfig {
    /// The bot token, or a configuration error if it is missing
    pub fn token(&self) -> Result<&str> {
        match self.token.as_deref().map(str::trim) {
            Some(token) if !token.is_empty() => Ok(token),
            _ => anyhow::bail!("Failed to get discord bot token from config (discord.token)"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    #[serde(default = "default_listen")]
    pub listen: SocketAddr,
}

fn default_listen() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 9393))
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresenceConfig {
    #[serde(default = "default_debounce_secs")]
    pub debounce_secs: u64,
    #[serde(default = "default_strip_tag")]
    pub strip_tag: String,
}

fn default_debounce_secs() -> u64 {
    5
}

fn default_strip_tag() -> String {
    "[fp]".to_string()
}

impl Default for PresenceConfig {
    fn default() -> Self {
        Self {
            debounce_secs: default_debounce_secs(),
            strip_tag: default_strip_tag(),
        }
    }
}

/// Weekly rotation reported by the `week` command
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RotationConfig {
    /// Week types in order; the first applies to the week containing `anchor`
    #[serde(default)]
    pub weeks: Vec<String>,
    #[serde(default = "default_anchor")]
    pub anchor: NaiveDate,
}

fn default_anchor() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, 1).unwrap_or_default()
}

impl Default for RotationConfig {
    fn default() -> Self {
        Self {
            weeks: Vec::new(),
            anchor: default_anchor(),
        }
    }
}

pub fn config_dir() -> Result<PathBuf> {
    let dir = directories::ProjectDirs::from("", "", "reso-helper")
        .context("Could not determine config directory")?
        .config_dir()
        .to_path_buf();
    Ok(dir)
}

pub fn default_config_path() -> Result<PathBuf> {
    Ok(config_dir()?.join("config.toml"))
}

pub fn load(path: Option<&Path>) -> Result<Config> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => default_config_path()?,
    };

    if !path.exists() {
        anyhow::bail!(
            "Config file not found at {}. Run `reso-helper --init` to create one.",
            path.display()
        );
    }

    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read config from {}", path.display()))?;

    parse(&content).with_context(|| format!("Failed to parse config from {}", path.display()))
}

pub fn parse(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content)?;
    Ok(config)
}

pub async fn init_wizard(path: Option<&Path>) -> Result<()> {
    use std::io::{self, Write};

    println!("reso-helper Configuration Wizard");
    println!("================================\n");

    let config_path = match path {
        Some(p) => p.to_path_buf(),
        None => default_config_path()?,
    };
    if config_path.exists() {
        print!("Config already exists at {}. Overwrite? [y/N] ", config_path.display());
        io::stdout().flush()?;
        let mut input = String::new();
        io::stdin().read_line(&mut input)?;
        if !input.trim().eq_ignore_ascii_case("y") {
            println!("Aborted.");
            return Ok(());
        }
    }

    let prompt = |label: &str| -> Result<String> {
        print!("{}: ", label);
        io::stdout().flush()?;
        let mut value = String::new();
        io::stdin().read_line(&mut value)?;
        Ok(value.trim().to_string())
    };

    let token = prompt("Discord bot token (https://discord.com/developers/applications)")?;
    let server_id = prompt("Discord server ID")?
        .parse::<u64>()
        .context("Server ID must be a number")?;
    let log_channel_id = prompt("Log channel ID")?
        .parse::<u64>()
        .context("Channel ID must be a number")?;

    let config = Config {
        discord: DiscordConfig {
            token: Some(token),
            server_id,
            log_channel_id,
            api_base: default_api_base(),
            gateway_url: default_gateway_url(),
        },
        ingest: IngestConfig::default(),
        presence: PresenceConfig::default(),
        rotation: RotationConfig::default(),
    };

    if let Some(parent) = config_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    // Write config with restricted permissions
    let content = toml::to_string_pretty(&config)?;
    std::fs::write(&config_path, content)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&config_path, std::fs::Permissions::from_mode(0o600))?;
    }

    println!("\nConfig saved to {}", config_path.display());
    println!("Run `reso-helper` to start the bridge.");

    Ok(())
}
