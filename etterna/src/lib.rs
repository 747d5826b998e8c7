//! Client for EtternaOnline's partially documented API.
//!
//! Most endpoints answer JSON, but the score list embeds HTML fragments in its
//! fields and the numeric user ID is only available by scraping the profile
//! page. [`Client`] hides all of that behind the [`Api`] trait.

pub mod client;
pub mod error;
pub mod html;
pub mod models;
pub mod parse;
pub mod round;

use async_trait::async_trait;

pub use client::{Client, ClientBuilder};
pub use error::{Error, ErrorKind, ParseError, Result};
pub use models::{Judgements, Msd, Rank, Score, ScoreQuery, Skillset, Song, SortColumn, User};
pub use round::round_to_precision;

/// Remote operations the bot relies on.
#[async_trait]
pub trait Api: Send + Sync {
    /// Root of the website, for building score, avatar and song image links.
    fn base_url(&self) -> &str;

    /// Profile ratings merged with leaderboard ranks. The returned user has no ID.
    async fn get_by_username(&self, username: &str) -> Result<User>;

    /// Scrapes the numeric user ID from the profile page.
    ///
    /// This downloads a full HTML page, so callers cache the result.
    async fn get_user_id(&self, username: &str) -> Result<i64>;

    /// One page of a user's valid scores.
    async fn get_scores(&self, query: &ScoreQuery) -> Result<Vec<Score>>;

    /// Detail for a score. Only the first 41 characters of `key` are sent; a
    /// numeric suffix is parsed back out as the user ID.
    async fn get_score_detail(&self, key: &str) -> Result<Score>;

    async fn get_song(&self, id: i64) -> Result<Song>;
}
