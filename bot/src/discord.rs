//! Discord transport: gateway events in, messages and embeds out.

use anyhow::{Context as _, Result};
use async_trait::async_trait;
use serenity::all::{
    ChannelId, Context, CreateEmbed, CreateEmbedAuthor, CreateEmbedFooter, CreateMessage,
    EventHandler, Guild, Http, Message, Ready, Timestamp,
};
use std::sync::Arc;

use crate::commands::{self, Invocation};
use crate::dispatch::{Dispatcher, RichMessage};
use crate::Bot;

pub struct DiscordDispatcher {
    http: Arc<Http>,
}

impl DiscordDispatcher {
    pub fn new(http: Arc<Http>) -> Self {
        Self { http }
    }
}

fn channel(channel_id: &str) -> Result<ChannelId> {
    let id: u64 = channel_id
        .parse()
        .with_context(|| format!("invalid channel id '{}'", channel_id))?;

    Ok(ChannelId::new(id))
}

/// Builds the Discord embed for a platform-neutral message.
pub fn embed(message: &RichMessage) -> CreateEmbed {
    let mut embed = CreateEmbed::new()
        .description(&message.description)
        .color(message.color);

    if let Some(title) = &message.title {
        embed = embed.title(title);
    }

    if let Some(url) = &message.url {
        embed = embed.url(url);
    }

    if let Some(author) = &message.author {
        let mut builder = CreateEmbedAuthor::new(&author.name);
        if let Some(icon) = &author.icon_url {
            builder = builder.icon_url(icon);
        }
        if let Some(url) = &author.url {
            builder = builder.url(url);
        }
        embed = embed.author(builder);
    }

    for field in &message.fields {
        embed = embed.field(&field.name, &field.value, field.inline);
    }

    if let Some(timestamp) = message
        .timestamp
        .and_then(|t| Timestamp::from_unix_timestamp(t.timestamp()).ok())
    {
        embed = embed.timestamp(timestamp);
    }

    if let Some(footer) = &message.footer {
        let mut builder = CreateEmbedFooter::new(&footer.text);
        if let Some(icon) = &footer.icon_url {
            builder = builder.icon_url(icon);
        }
        embed = embed.footer(builder);
    }

    if let Some(thumbnail) = &message.thumbnail_url {
        embed = embed.thumbnail(thumbnail);
    }

    embed
}

#[async_trait]
impl Dispatcher for DiscordDispatcher {
    async fn send_message(&self, channel_id: &str, text: &str) -> Result<()> {
        channel(channel_id)?.say(&self.http, text).await?;
        Ok(())
    }

    async fn send_rich_message(&self, channel_id: &str, message: &RichMessage) -> Result<()> {
        let create = CreateMessage::new().embed(embed(message));
        channel(channel_id)?
            .send_message(&self.http, create)
            .await?;
        Ok(())
    }

    async fn send_typing(&self, channel_id: &str) -> Result<()> {
        channel(channel_id)?.broadcast_typing(&self.http).await?;
        Ok(())
    }
}

/// Gateway event handler; hands server messages to the command layer.
pub struct Handler {
    bot: Arc<Bot>,
}

impl Handler {
    pub fn new(bot: Arc<Bot>) -> Self {
        Self { bot }
    }
}

#[serenity::async_trait]
impl EventHandler for Handler {
    async fn ready(&self, _ctx: Context, ready: Ready) {
        tracing::info!(
            user = %ready.user.name,
            guilds = ready.guilds.len(),
            "connected to discord"
        );
    }

    async fn guild_create(&self, _ctx: Context, guild: Guild, _is_new: Option<bool>) {
        if let Err(e) = self.bot.server_config(&guild.id.to_string()).await {
            tracing::error!(server = %guild.id, error = %e, "failed to set up server");
        }
    }

    async fn message(&self, _ctx: Context, msg: Message) {
        if msg.author.bot {
            return;
        }

        // Direct messages have no server to scope registrations to.
        let Some(guild_id) = msg.guild_id else {
            return;
        };

        let inv = Invocation {
            server_id: guild_id.to_string(),
            channel_id: msg.channel_id.to_string(),
            author_id: msg.author.id.to_string(),
        };

        if let Err(e) = commands::handle_message(&self.bot, &inv, &msg.content).await {
            tracing::error!(server = %inv.server_id, error = ?e, "failed to handle message");
        }
    }
}
