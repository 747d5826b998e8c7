use anyhow::Result;
use async_trait::async_trait;
use etterna::Song;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::collections::HashMap;

use crate::models::{ServerConfig, ServerRow, SongRow, TrackedUser, UserRow};

/// Persistence the bot needs. Usernames compare case-insensitively.
#[async_trait]
pub trait Store: Send + Sync {
    async fn get_server_config(&self, server_id: &str) -> Result<Option<ServerConfig>>;

    /// Inserts or updates by server ID.
    async fn save_server_config(&self, config: &ServerConfig) -> Result<()>;

    async fn get_cached_user(&self, username: &str) -> Result<Option<TrackedUser>>;

    /// Inserts or updates profile fields and ratings by site ID. An existing
    /// cursor is left alone; see [`Store::save_tracked`].
    async fn save_user(&self, user: &TrackedUser) -> Result<()>;

    /// Like [`Store::save_user`] but also stores the user's cursor, in one
    /// write. Ratings and cursor never move independently.
    async fn save_tracked(&self, user: &TrackedUser) -> Result<()>;

    /// The user a Discord user is registered as in a server.
    async fn get_registration(
        &self,
        server_id: &str,
        discord_user_id: &str,
    ) -> Result<Option<TrackedUser>>;

    /// The Discord user registered as `username` in a server.
    async fn get_registered_discord_id(
        &self,
        server_id: &str,
        username: &str,
    ) -> Result<Option<String>>;

    /// `false` when either side is already registered in the server.
    async fn register(&self, username: &str, server_id: &str, discord_user_id: &str)
        -> Result<bool>;

    /// `false` when there was nothing to remove.
    async fn unregister(&self, server_id: &str, discord_user_id: &str) -> Result<bool>;

    /// Every registered user with the servers they are registered in that have
    /// a score channel.
    async fn list_registered_users_with_channels(
        &self,
    ) -> Result<Vec<(TrackedUser, Vec<ServerConfig>)>>;

    async fn get_cached_song(&self, id: i64) -> Result<Option<Song>>;

    /// Songs are immutable once stored; saving a known ID is a no-op.
    async fn save_song(&self, song: &Song) -> Result<()>;
}

pub async fn init_db(database_url: &str) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .acquire_timeout(std::time::Duration::from_secs(30))
        .connect(database_url)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;

    Ok(pool)
}

const USER_COLUMNS: &str = r#"
    u.etterna_id, u.username, u.avatar, u.country_code,
    u.msd_overall, u.msd_stream, u.msd_jumpstream, u.msd_handstream,
    u.msd_stamina, u.msd_jack_speed, u.msd_chordjack, u.msd_technical,
    u.rank_overall, u.rank_stream, u.rank_jumpstream, u.rank_handstream,
    u.rank_stamina, u.rank_jack_speed, u.rank_chordjack, u.rank_technical,
    u.last_score_key, u.last_score_date
"#;

#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn upsert_user(&self, user: &TrackedUser, with_cursor: bool) -> Result<()> {
        let (cursor_key, cursor_date) = match &user.cursor {
            Some(cursor) => (Some(cursor.key.as_str()), Some(cursor.date)),
            None => (None, None),
        };

        let cursor_update = if with_cursor {
            ", last_score_key = $21, last_score_date = $22"
        } else {
            ""
        };

        let sql = format!(
            r#"
            INSERT INTO etterna_users (
                etterna_id, username, avatar, country_code,
                msd_overall, msd_stream, msd_jumpstream, msd_handstream,
                msd_stamina, msd_jack_speed, msd_chordjack, msd_technical,
                rank_overall, rank_stream, rank_jumpstream, rank_handstream,
                rank_stamina, rank_jack_speed, rank_chordjack, rank_technical,
                last_score_key, last_score_date
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12,
                    $13, $14, $15, $16, $17, $18, $19, $20, $21, $22)
            ON CONFLICT (etterna_id)
            DO UPDATE SET
                username = $2, avatar = $3, country_code = $4,
                msd_overall = $5, msd_stream = $6, msd_jumpstream = $7, msd_handstream = $8,
                msd_stamina = $9, msd_jack_speed = $10, msd_chordjack = $11, msd_technical = $12,
                rank_overall = $13, rank_stream = $14, rank_jumpstream = $15, rank_handstream = $16,
                rank_stamina = $17, rank_jack_speed = $18, rank_chordjack = $19, rank_technical = $20,
                updated_at = NOW(){cursor_update}
            "#
        );

        sqlx::query(&sql)
            .bind(user.etterna_id)
            .bind(&user.username)
            .bind(&user.avatar)
            .bind(&user.country_code)
            .bind(user.msd.overall)
            .bind(user.msd.stream)
            .bind(user.msd.jumpstream)
            .bind(user.msd.handstream)
            .bind(user.msd.stamina)
            .bind(user.msd.jack_speed)
            .bind(user.msd.chordjack)
            .bind(user.msd.technical)
            .bind(user.rank.overall as i32)
            .bind(user.rank.stream as i32)
            .bind(user.rank.jumpstream as i32)
            .bind(user.rank.handstream as i32)
            .bind(user.rank.stamina as i32)
            .bind(user.rank.jack_speed as i32)
            .bind(user.rank.chordjack as i32)
            .bind(user.rank.technical as i32)
            .bind(cursor_key)
            .bind(cursor_date)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

#[async_trait]
impl Store for PgStore {
    async fn get_server_config(&self, server_id: &str) -> Result<Option<ServerConfig>> {
        let row = sqlx::query_as::<_, ServerRow>(
            r#"
            SELECT server_id, command_prefix, score_channel_id, last_song_id
            FROM discord_servers
            WHERE server_id = $1
            "#,
        )
        .bind(server_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(ServerConfig::from))
    }

    async fn save_server_config(&self, config: &ServerConfig) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO discord_servers (server_id, command_prefix, score_channel_id, last_song_id)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (server_id)
            DO UPDATE SET command_prefix = $2, score_channel_id = $3, last_song_id = $4, updated_at = NOW()
            "#,
        )
        .bind(&config.server_id)
        .bind(&config.command_prefix)
        .bind(&config.score_channel_id)
        .bind(config.last_song_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_cached_user(&self, username: &str) -> Result<Option<TrackedUser>> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {} FROM etterna_users u WHERE LOWER(u.username) = LOWER($1)",
            USER_COLUMNS
        ))
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(TrackedUser::from))
    }

    async fn save_user(&self, user: &TrackedUser) -> Result<()> {
        self.upsert_user(user, false).await
    }

    async fn save_tracked(&self, user: &TrackedUser) -> Result<()> {
        self.upsert_user(user, true).await
    }

    async fn get_registration(
        &self,
        server_id: &str,
        discord_user_id: &str,
    ) -> Result<Option<TrackedUser>> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            r#"
            SELECT {}
            FROM etterna_users u
            INNER JOIN users_discord_servers uds ON LOWER(uds.username) = LOWER(u.username)
            WHERE uds.server_id = $1 AND uds.discord_user_id = $2
            "#,
            USER_COLUMNS
        ))
        .bind(server_id)
        .bind(discord_user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(TrackedUser::from))
    }

    async fn get_registered_discord_id(
        &self,
        server_id: &str,
        username: &str,
    ) -> Result<Option<String>> {
        let id = sqlx::query_scalar::<_, String>(
            r#"
            SELECT discord_user_id
            FROM users_discord_servers
            WHERE server_id = $1 AND LOWER(username) = LOWER($2)
            "#,
        )
        .bind(server_id)
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;

        Ok(id)
    }

    async fn register(
        &self,
        username: &str,
        server_id: &str,
        discord_user_id: &str,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO users_discord_servers (username, server_id, discord_user_id)
            VALUES ($1, $2, $3)
            "#,
        )
        .bind(username)
        .bind(server_id)
        .bind(discord_user_id)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(true),
            Err(e) if is_unique_violation(&e) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn unregister(&self, server_id: &str, discord_user_id: &str) -> Result<bool> {
        let result = sqlx::query(
            "DELETE FROM users_discord_servers WHERE server_id = $1 AND discord_user_id = $2",
        )
        .bind(server_id)
        .bind(discord_user_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn list_registered_users_with_channels(
        &self,
    ) -> Result<Vec<(TrackedUser, Vec<ServerConfig>)>> {
        #[derive(sqlx::FromRow)]
        struct Row {
            #[sqlx(flatten)]
            user: UserRow,
            #[sqlx(flatten)]
            server: ServerRow,
        }

        let rows = sqlx::query_as::<_, Row>(&format!(
            r#"
            SELECT {}, s.server_id, s.command_prefix, s.score_channel_id, s.last_song_id
            FROM users_discord_servers uds
            INNER JOIN etterna_users u ON LOWER(u.username) = LOWER(uds.username)
            INNER JOIN discord_servers s ON s.server_id = uds.server_id
            WHERE s.score_channel_id IS NOT NULL
            ORDER BY u.etterna_id, s.server_id
            "#,
            USER_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;

        let mut order = Vec::new();
        let mut grouped: HashMap<i64, (TrackedUser, Vec<ServerConfig>)> = HashMap::new();

        for row in rows {
            let id = row.user.etterna_id;

            grouped
                .entry(id)
                .or_insert_with(|| {
                    order.push(id);
                    (TrackedUser::from(row.user), Vec::new())
                })
                .1
                .push(ServerConfig::from(row.server));
        }

        Ok(order
            .into_iter()
            .filter_map(|id| grouped.remove(&id))
            .collect())
    }

    async fn get_cached_song(&self, id: i64) -> Result<Option<Song>> {
        let row = sqlx::query_as::<_, SongRow>(
            "SELECT etterna_id, name, artist, background, song_key FROM songs WHERE etterna_id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Song::from))
    }

    async fn save_song(&self, song: &Song) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO songs (etterna_id, name, artist, background, song_key)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (etterna_id) DO NOTHING
            "#,
        )
        .bind(song.id)
        .bind(&song.name)
        .bind(&song.artist)
        .bind(&song.background)
        .bind(&song.key)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
