use anyhow::Result;
use async_trait::async_trait;
use etterna::Song;
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::db::Store;
use crate::models::{ServerConfig, TrackedUser};

#[derive(Debug, Clone)]
struct Registration {
    server_id: String,
    username: String,
    discord_user_id: String,
}

#[derive(Debug, Default)]
struct Tables {
    servers: HashMap<String, ServerConfig>,
    /// Keyed by site ID.
    users: HashMap<i64, TrackedUser>,
    songs: HashMap<i64, Song>,
    registrations: Vec<Registration>,
}

impl Tables {
    fn user_by_name(&self, username: &str) -> Option<&TrackedUser> {
        self.users
            .values()
            .find(|u| u.username.eq_ignore_ascii_case(username))
    }
}

/// In-process [`Store`] with the same uniqueness rules as the database.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get_server_config(&self, server_id: &str) -> Result<Option<ServerConfig>> {
        Ok(self.tables.read().await.servers.get(server_id).cloned())
    }

    async fn save_server_config(&self, config: &ServerConfig) -> Result<()> {
        self.tables
            .write()
            .await
            .servers
            .insert(config.server_id.clone(), config.clone());
        Ok(())
    }

    async fn get_cached_user(&self, username: &str) -> Result<Option<TrackedUser>> {
        Ok(self.tables.read().await.user_by_name(username).cloned())
    }

    async fn save_user(&self, user: &TrackedUser) -> Result<()> {
        let mut tables = self.tables.write().await;

        let clash = tables
            .user_by_name(&user.username)
            .is_some_and(|existing| existing.etterna_id != user.etterna_id);
        if clash {
            anyhow::bail!("username '{}' belongs to another user", user.username);
        }

        match tables.users.get_mut(&user.etterna_id) {
            Some(existing) => {
                let cursor = existing.cursor.take();
                *existing = TrackedUser {
                    cursor,
                    ..user.clone()
                };
            }
            None => {
                tables.users.insert(user.etterna_id, user.clone());
            }
        }

        Ok(())
    }

    async fn save_tracked(&self, user: &TrackedUser) -> Result<()> {
        let mut tables = self.tables.write().await;

        let clash = tables
            .user_by_name(&user.username)
            .is_some_and(|existing| existing.etterna_id != user.etterna_id);
        if clash {
            anyhow::bail!("username '{}' belongs to another user", user.username);
        }

        tables.users.insert(user.etterna_id, user.clone());
        Ok(())
    }

    async fn get_registration(
        &self,
        server_id: &str,
        discord_user_id: &str,
    ) -> Result<Option<TrackedUser>> {
        let tables = self.tables.read().await;

        Ok(tables
            .registrations
            .iter()
            .find(|r| r.server_id == server_id && r.discord_user_id == discord_user_id)
            .and_then(|r| tables.user_by_name(&r.username))
            .cloned())
    }

    async fn get_registered_discord_id(
        &self,
        server_id: &str,
        username: &str,
    ) -> Result<Option<String>> {
        Ok(self
            .tables
            .read()
            .await
            .registrations
            .iter()
            .find(|r| r.server_id == server_id && r.username.eq_ignore_ascii_case(username))
            .map(|r| r.discord_user_id.clone()))
    }

    async fn register(
        &self,
        username: &str,
        server_id: &str,
        discord_user_id: &str,
    ) -> Result<bool> {
        let mut tables = self.tables.write().await;

        let taken = tables.registrations.iter().any(|r| {
            r.server_id == server_id
                && (r.discord_user_id == discord_user_id
                    || r.username.eq_ignore_ascii_case(username))
        });
        if taken {
            return Ok(false);
        }

        tables.registrations.push(Registration {
            server_id: server_id.to_string(),
            username: username.to_string(),
            discord_user_id: discord_user_id.to_string(),
        });
        Ok(true)
    }

    async fn unregister(&self, server_id: &str, discord_user_id: &str) -> Result<bool> {
        let mut tables = self.tables.write().await;
        let before = tables.registrations.len();

        tables
            .registrations
            .retain(|r| !(r.server_id == server_id && r.discord_user_id == discord_user_id));

        Ok(tables.registrations.len() < before)
    }

    async fn list_registered_users_with_channels(
        &self,
    ) -> Result<Vec<(TrackedUser, Vec<ServerConfig>)>> {
        let tables = self.tables.read().await;

        let mut users: Vec<&TrackedUser> = tables.users.values().collect();
        users.sort_by_key(|u| u.etterna_id);

        let mut out = Vec::new();

        for user in users {
            let mut servers: Vec<ServerConfig> = tables
                .registrations
                .iter()
                .filter(|r| r.username.eq_ignore_ascii_case(&user.username))
                .filter_map(|r| tables.servers.get(&r.server_id))
                .filter(|s| s.score_channel_id.is_some())
                .cloned()
                .collect();

            if servers.is_empty() {
                continue;
            }

            servers.sort_by(|a, b| a.server_id.cmp(&b.server_id));
            out.push((user.clone(), servers));
        }

        Ok(out)
    }

    async fn get_cached_song(&self, id: i64) -> Result<Option<Song>> {
        Ok(self.tables.read().await.songs.get(&id).cloned())
    }

    async fn save_song(&self, song: &Song) -> Result<()> {
        self.tables
            .write()
            .await
            .songs
            .entry(song.id)
            .or_insert_with(|| song.clone());
        Ok(())
    }
}
