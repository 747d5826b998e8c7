use chrono::NaiveDateTime;
use etterna::{Msd, Rank, Score, User};
use serde::Serialize;
use sqlx::FromRow;

/// Last play announced (or suppressed) for a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Cursor {
    pub key: String,
    pub date: NaiveDateTime,
}

impl Cursor {
    pub fn of(score: &Score) -> Self {
        Self {
            key: score.key.clone(),
            date: score.date,
        }
    }

    /// The site overwrites a score in place when the same chart is replayed
    /// quickly, so the key alone does not identify a play.
    pub fn is_same_play(&self, score: &Score) -> bool {
        self.key == score.key && self.date == score.date
    }
}

/// An Etterna user known to the bot, with the ratings cached at the last check.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackedUser {
    pub etterna_id: i64,
    pub username: String,
    pub avatar: String,
    pub country_code: String,
    pub msd: Msd,
    pub rank: Rank,
    pub cursor: Option<Cursor>,
}

impl TrackedUser {
    /// A freshly fetched profile with its scraped site ID.
    pub fn from_profile(etterna_id: i64, profile: &User) -> Self {
        Self {
            etterna_id,
            username: profile.username.clone(),
            avatar: profile.avatar.clone(),
            country_code: profile.country_code.clone(),
            msd: profile.msd.rounded(2),
            rank: profile.rank,
            cursor: None,
        }
    }

    /// Takes ratings, ranks and avatar from a fresh profile. The cursor is untouched.
    pub fn refresh(&mut self, profile: &User) {
        self.avatar = profile.avatar.clone();
        self.msd = profile.msd.rounded(2);
        self.rank = profile.rank;
    }

    pub fn is_new_play(&self, score: &Score) -> bool {
        match &self.cursor {
            Some(cursor) => !cursor.is_same_play(score),
            None => true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServerConfig {
    pub server_id: String,
    pub command_prefix: String,
    pub score_channel_id: Option<String>,
    pub last_song_id: Option<i64>,
}

impl ServerConfig {
    pub fn new(server_id: impl Into<String>, command_prefix: impl Into<String>) -> Self {
        Self {
            server_id: server_id.into(),
            command_prefix: command_prefix.into(),
            score_channel_id: None,
            last_song_id: None,
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct UserRow {
    pub etterna_id: i64,
    pub username: String,
    pub avatar: String,
    pub country_code: String,
    pub msd_overall: f64,
    pub msd_stream: f64,
    pub msd_jumpstream: f64,
    pub msd_handstream: f64,
    pub msd_stamina: f64,
    pub msd_jack_speed: f64,
    pub msd_chordjack: f64,
    pub msd_technical: f64,
    pub rank_overall: i32,
    pub rank_stream: i32,
    pub rank_jumpstream: i32,
    pub rank_handstream: i32,
    pub rank_stamina: i32,
    pub rank_jack_speed: i32,
    pub rank_chordjack: i32,
    pub rank_technical: i32,
    pub last_score_key: Option<String>,
    pub last_score_date: Option<NaiveDateTime>,
}

impl From<UserRow> for TrackedUser {
    fn from(row: UserRow) -> Self {
        let rank = |value: i32| u32::try_from(value).unwrap_or_default();

        let cursor = match (row.last_score_key, row.last_score_date) {
            (Some(key), Some(date)) => Some(Cursor { key, date }),
            _ => None,
        };

        Self {
            etterna_id: row.etterna_id,
            username: row.username,
            avatar: row.avatar,
            country_code: row.country_code,
            msd: Msd {
                overall: row.msd_overall,
                stream: row.msd_stream,
                jumpstream: row.msd_jumpstream,
                handstream: row.msd_handstream,
                stamina: row.msd_stamina,
                jack_speed: row.msd_jack_speed,
                chordjack: row.msd_chordjack,
                technical: row.msd_technical,
            },
            rank: Rank {
                overall: rank(row.rank_overall),
                stream: rank(row.rank_stream),
                jumpstream: rank(row.rank_jumpstream),
                handstream: rank(row.rank_handstream),
                stamina: rank(row.rank_stamina),
                jack_speed: rank(row.rank_jack_speed),
                chordjack: rank(row.rank_chordjack),
                technical: rank(row.rank_technical),
            },
            cursor,
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct ServerRow {
    pub server_id: String,
    pub command_prefix: String,
    pub score_channel_id: Option<String>,
    pub last_song_id: Option<i64>,
}

impl From<ServerRow> for ServerConfig {
    fn from(row: ServerRow) -> Self {
        Self {
            server_id: row.server_id,
            command_prefix: row.command_prefix,
            score_channel_id: row.score_channel_id,
            last_song_id: row.last_song_id,
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct SongRow {
    pub etterna_id: i64,
    pub name: String,
    pub artist: String,
    pub background: String,
    pub song_key: String,
}

impl From<SongRow> for etterna::Song {
    fn from(row: SongRow) -> Self {
        Self {
            id: row.etterna_id,
            name: row.name,
            artist: row.artist,
            background: row.background,
            key: row.song_key,
        }
    }
}
