use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

pub const EMBED_COLOR: u32 = 8519899;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Author {
    pub name: String,
    pub icon_url: Option<String>,
    pub url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Footer {
    pub text: String,
    pub icon_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Field {
    pub name: String,
    pub value: String,
    pub inline: bool,
}

/// A platform-neutral embed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RichMessage {
    pub title: Option<String>,
    pub url: Option<String>,
    pub author: Option<Author>,
    pub description: String,
    pub fields: Vec<Field>,
    pub timestamp: Option<DateTime<Utc>>,
    pub footer: Option<Footer>,
    pub thumbnail_url: Option<String>,
    pub color: u32,
}

impl Default for RichMessage {
    fn default() -> Self {
        Self {
            title: None,
            url: None,
            author: None,
            description: String::new(),
            fields: Vec::new(),
            timestamp: None,
            footer: None,
            thumbnail_url: None,
            color: EMBED_COLOR,
        }
    }
}

/// Outbound half of the chat platform. Channels are opaque IDs.
#[async_trait]
pub trait Dispatcher: Send + Sync {
    async fn send_message(&self, channel_id: &str, text: &str) -> Result<()>;

    async fn send_rich_message(&self, channel_id: &str, message: &RichMessage) -> Result<()>;

    async fn send_typing(&self, channel_id: &str) -> Result<()>;
}
