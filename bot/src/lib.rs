use anyhow::{Context, Result};
use etterna::Api;
use serenity::http::Http;
use serenity::prelude::GatewayIntents;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

pub mod commands;
pub mod config;
pub mod db;
pub mod discord;
pub mod dispatch;
pub mod memory;
pub mod models;
pub mod recent;
pub mod summary;
pub mod tracker;

use crate::commands::Invocation;
use crate::config::{Config, Settings};
use crate::db::{PgStore, Store};
use crate::discord::{DiscordDispatcher, Handler};
use crate::dispatch::{Dispatcher, RichMessage};
use crate::models::ServerConfig;
use crate::tracker::PlayTracker;

/// Everything a command or the tracker needs, shared across tasks.
pub struct Bot {
    pub api: Arc<dyn Api>,
    pub store: Arc<dyn Store>,
    pub dispatcher: Arc<dyn Dispatcher>,
    pub settings: Settings,
}

impl Bot {
    /// The server's config, created with the default prefix on first sight.
    pub async fn server_config(&self, server_id: &str) -> Result<ServerConfig> {
        if let Some(config) = self.store.get_server_config(server_id).await? {
            return Ok(config);
        }

        let config = ServerConfig::new(server_id, &self.settings.default_prefix);
        self.store.save_server_config(&config).await?;
        tracing::info!(server = %server_id, "registered new server");

        Ok(config)
    }

    /// Remembers the song last posted in a server, for `compare`.
    pub async fn set_last_song(&self, server_id: &str, song_id: i64) -> Result<()> {
        let mut config = self.server_config(server_id).await?;

        if config.last_song_id == Some(song_id) {
            return Ok(());
        }

        config.last_song_id = Some(song_id);
        self.store.save_server_config(&config).await
    }

    pub async fn reply(&self, inv: &Invocation, text: &str) -> Result<()> {
        self.dispatcher.send_message(&inv.channel_id, text).await
    }

    pub async fn send(&self, inv: &Invocation, message: &RichMessage) -> Result<()> {
        self.dispatcher
            .send_rich_message(&inv.channel_id, message)
            .await
    }

    /// Best effort; a failed indicator never fails the command.
    pub async fn typing(&self, inv: &Invocation) {
        if let Err(e) = self.dispatcher.send_typing(&inv.channel_id).await {
            tracing::debug!(channel = %inv.channel_id, error = %e, "failed to send typing");
        }
    }
}

pub async fn run(config: Config) -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("etternabot=info,etterna=info")),
        )
        .init();

    let pool = db::init_db(&config.database_url).await?;
    tracing::info!("database initialized");

    let api = etterna::Client::builder(config.etterna_api_key.clone())
        .timeout(config.request_timeout())
        .build()
        .context("failed to build etterna client")?;

    let http = Arc::new(Http::new(&config.discord_token));

    let bot = Arc::new(Bot {
        api: Arc::new(api),
        store: Arc::new(PgStore::new(pool)),
        dispatcher: Arc::new(DiscordDispatcher::new(http)),
        settings: config.settings(),
    });

    let tracker = PlayTracker::new(bot.clone());
    let period = bot.settings.poll_interval;
    tokio::spawn(async move { tracker.run(period).await });

    let intents =
        GatewayIntents::GUILDS | GatewayIntents::GUILD_MESSAGES | GatewayIntents::MESSAGE_CONTENT;

    let mut client = serenity::Client::builder(&config.discord_token, intents)
        .event_handler(Handler::new(bot))
        .await
        .context("failed to create discord client")?;

    tracing::info!("connecting to discord");
    client.start().await.context("discord client stopped")?;

    Ok(())
}
