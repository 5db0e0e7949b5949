use anyhow::Result;
use clap::Parser;
use reso_helper::integrations::discord::{self, gateway, rest::RestClient, DiscordPresence, LogChannel};
use reso_helper::integrations::ingest::{self, Broadcaster, IngestState};
use reso_helper::presence::{AggregatorOptions, LogPublisher, PresencePublisher, SessionAggregator};
use reso_helper::{config, util};
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "reso-helper")]
#[command(about = "Publishes session activity from headless hosts as a Discord bot status")]
#[command(version)]
struct Args {
    /// Initialize configuration
    #[arg(long)]
    init: bool,

    /// Path to config file
    #[arg(long, short)]
    config: Option<std::path::PathBuf>,

    /// Run without connecting to Discord; statuses are only logged
    #[arg(long)]
    offline: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("reso_helper=info".parse()?),
        )
        .init();

    if args.init {
        config::init_wizard(args.config.as_deref()).await?;
        return Ok(());
    }

    let config = config::load(args.config.as_deref())?;
    let options = AggregatorOptions::from(&config.presence);

    if args.offline {
        tracing::info!("Running offline, statuses will only be logged");
        let aggregator = SessionAggregator::new(Arc::new(LogPublisher), options);
        let state = IngestState {
            sink: Arc::new(aggregator.clone()),
            broadcaster: None,
        };
        let result = ingest::serve(config.ingest.listen, state, util::shutdown_signal()).await;
        aggregator.shutdown();
        return result;
    }

    let token = config.discord.token()?.to_string();
    let rest = RestClient::new(&config.discord)?;
    discord::validate_targets(&rest, &config.discord).await?;
    discord::register_commands(&rest, &config.discord).await;

    let (gateway, interactions) = gateway::spawn(config.discord.gateway_url.clone(), token);
    let publisher: Arc<dyn PresencePublisher> = Arc::new(DiscordPresence::new(gateway.sender()));
    let aggregator = SessionAggregator::new(publisher, options);

    let commands = tokio::spawn(discord::commands::run(
        interactions,
        rest.clone(),
        aggregator.clone(),
        config.rotation.clone(),
    ));

    let broadcaster: Arc<dyn Broadcaster> =
        Arc::new(LogChannel::new(rest, config.discord.log_channel_id));
    let state = IngestState {
        sink: Arc::new(aggregator.clone()),
        broadcaster: Some(broadcaster),
    };

    let result = ingest::serve(config.ingest.listen, state, util::shutdown_signal()).await;

    // Pending statuses are dropped, not flushed
    aggregator.shutdown();
    gateway.shutdown().await;
    commands.abort();

    result
}
