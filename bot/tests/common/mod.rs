#![allow(dead_code)]

use anyhow::Result;
use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use etterna::{Api, Error, Judgements, Msd, Rank, Score, ScoreQuery, Song, User};
use etternabot::models::{ServerConfig, TrackedUser};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use etternabot::config::Settings;
use etternabot::db::Store;
use etternabot::dispatch::{Dispatcher, RichMessage};
use etternabot::memory::MemoryStore;
use etternabot::Bot;

pub const SITE: &str = "https://etternaonline.test";

#[derive(Default)]
struct State {
    /// Keyed by lowercased username.
    users: HashMap<String, (i64, User)>,
    scores: HashMap<i64, Vec<Score>>,
    details: HashMap<String, Score>,
    songs: HashMap<i64, Song>,
    queries: Vec<ScoreQuery>,
    delay: Option<Duration>,
}

/// Scripted stand-in for the remote service.
#[derive(Default)]
pub struct FakeApi {
    state: Mutex<State>,
}

impl FakeApi {
    pub fn add_user(&self, id: i64, username: &str, overall: f64) {
        let user = User {
            id: None,
            username: username.to_string(),
            avatar: format!("{}.png", username),
            country_code: "US".to_string(),
            msd: msd(overall),
            rank: Rank {
                overall: 100,
                ..Rank::default()
            },
        };

        self.state
            .lock()
            .unwrap()
            .users
            .insert(username.to_lowercase(), (id, user));
    }

    pub fn set_overall(&self, username: &str, overall: f64) {
        let mut state = self.state.lock().unwrap();
        let (_, user) = state.users.get_mut(&username.to_lowercase()).unwrap();
        user.msd.overall = overall;
    }

    /// Adds a listed score plus a matching valid detail. Newest first.
    pub fn add_score(&self, user_id: i64, score: Score) {
        let mut state = self.state.lock().unwrap();

        state.details.insert(score.key.clone(), score.clone());
        state.scores.entry(user_id).or_default().push(score);
    }

    /// Overwrites the listed score with the same key, as the site does on a replay.
    pub fn replace_score(&self, user_id: i64, score: Score) {
        let mut state = self.state.lock().unwrap();

        state.details.insert(score.key.clone(), score.clone());
        if let Some(listed) = state
            .scores
            .get_mut(&user_id)
            .and_then(|scores| scores.iter_mut().find(|s| s.key == score.key))
        {
            *listed = score;
        }
    }

    pub fn set_valid(&self, key: &str, valid: bool) {
        let mut state = self.state.lock().unwrap();
        state.details.get_mut(key).unwrap().valid = valid;
    }

    pub fn add_song(&self, song: Song) {
        self.state.lock().unwrap().songs.insert(song.id, song);
    }

    /// Makes every score list request take `delay`.
    pub fn slow_down(&self, delay: Duration) {
        self.state.lock().unwrap().delay = Some(delay);
    }

    pub fn queries(&self) -> Vec<ScoreQuery> {
        self.state.lock().unwrap().queries.clone()
    }
}

#[async_trait]
impl Api for FakeApi {
    fn base_url(&self) -> &str {
        SITE
    }

    async fn get_by_username(&self, username: &str) -> etterna::Result<User> {
        self.state
            .lock()
            .unwrap()
            .users
            .get(&username.to_lowercase())
            .map(|(_, user)| user.clone())
            .ok_or_else(|| Error::not_found("No user with that username exists."))
    }

    async fn get_user_id(&self, username: &str) -> etterna::Result<i64> {
        self.state
            .lock()
            .unwrap()
            .users
            .get(&username.to_lowercase())
            .map(|(id, _)| *id)
            .ok_or_else(|| Error::not_found("No user with that username exists."))
    }

    async fn get_scores(&self, query: &ScoreQuery) -> etterna::Result<Vec<Score>> {
        let delay = self.state.lock().unwrap().delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state.lock().unwrap();
        state.queries.push(query.clone());

        let scores = state
            .scores
            .get(&query.user_id)
            .ok_or_else(|| Error::not_found("User does not exist."))?;

        Ok(scores
            .iter()
            .filter(|s| match &query.search {
                Some(term) => s.song.name.to_lowercase().contains(&term.to_lowercase()),
                None => true,
            })
            .take(query.count as usize)
            .cloned()
            .collect())
    }

    async fn get_score_detail(&self, key: &str) -> etterna::Result<Score> {
        let key = &key[..key.len().min(41)];

        self.state
            .lock()
            .unwrap()
            .details
            .get(key)
            .cloned()
            .ok_or_else(|| Error::not_found("Score does not exist."))
    }

    async fn get_song(&self, id: i64) -> etterna::Result<Song> {
        self.state
            .lock()
            .unwrap()
            .songs
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::not_found("Song does not exist."))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Sent {
    Text { channel: String, text: String },
    Rich { channel: String, message: RichMessage },
}

/// Records everything the bot tries to send.
#[derive(Default)]
pub struct RecordingDispatcher {
    sent: Mutex<Vec<Sent>>,
    /// Channels whose sends fail.
    broken: Mutex<Vec<String>>,
}

impl RecordingDispatcher {
    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().unwrap().clone()
    }

    pub fn texts(&self) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter_map(|s| match s {
                Sent::Text { text, .. } => Some(text),
                Sent::Rich { .. } => None,
            })
            .collect()
    }

    pub fn rich(&self) -> Vec<(String, RichMessage)> {
        self.sent()
            .into_iter()
            .filter_map(|s| match s {
                Sent::Rich { channel, message } => Some((channel, message)),
                Sent::Text { .. } => None,
            })
            .collect()
    }

    pub fn break_channel(&self, channel: &str) {
        self.broken.lock().unwrap().push(channel.to_string());
    }

    pub fn clear(&self) {
        self.sent.lock().unwrap().clear();
    }

    fn check(&self, channel: &str) -> Result<()> {
        if self.broken.lock().unwrap().iter().any(|c| c == channel) {
            anyhow::bail!("channel {} is unavailable", channel);
        }
        Ok(())
    }
}

#[async_trait]
impl Dispatcher for RecordingDispatcher {
    async fn send_message(&self, channel_id: &str, text: &str) -> Result<()> {
        self.check(channel_id)?;
        self.sent.lock().unwrap().push(Sent::Text {
            channel: channel_id.to_string(),
            text: text.to_string(),
        });
        Ok(())
    }

    async fn send_rich_message(&self, channel_id: &str, message: &RichMessage) -> Result<()> {
        self.check(channel_id)?;
        self.sent.lock().unwrap().push(Sent::Rich {
            channel: channel_id.to_string(),
            message: message.clone(),
        });
        Ok(())
    }

    async fn send_typing(&self, _channel_id: &str) -> Result<()> {
        Ok(())
    }
}

/// A store operation [`FlakyStore`] can be told to misbehave on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// `save_tracked` fails without writing anything.
    SaveTracked,
    /// `unregister` fails without writing anything.
    Unregister,
    /// `register` writes the registration but reports it as taken, as when a
    /// concurrent request got there first.
    RegisterRace,
}

/// Wraps a [`MemoryStore`], misbehaving once per queued [`Fault`].
pub struct FlakyStore {
    inner: Arc<MemoryStore>,
    faults: Mutex<Vec<Fault>>,
}

impl FlakyStore {
    pub fn new(inner: Arc<MemoryStore>) -> Self {
        Self {
            inner,
            faults: Mutex::new(Vec::new()),
        }
    }

    pub fn fail_once(&self, fault: Fault) {
        self.faults.lock().unwrap().push(fault);
    }

    fn take(&self, fault: Fault) -> bool {
        let mut faults = self.faults.lock().unwrap();
        match faults.iter().position(|f| *f == fault) {
            Some(i) => {
                faults.remove(i);
                true
            }
            None => false,
        }
    }
}

#[async_trait]
impl Store for FlakyStore {
    async fn get_server_config(&self, server_id: &str) -> Result<Option<ServerConfig>> {
        self.inner.get_server_config(server_id).await
    }

    async fn save_server_config(&self, config: &ServerConfig) -> Result<()> {
        self.inner.save_server_config(config).await
    }

    async fn get_cached_user(&self, username: &str) -> Result<Option<TrackedUser>> {
        self.inner.get_cached_user(username).await
    }

    async fn save_user(&self, user: &TrackedUser) -> Result<()> {
        self.inner.save_user(user).await
    }

    async fn save_tracked(&self, user: &TrackedUser) -> Result<()> {
        if self.take(Fault::SaveTracked) {
            anyhow::bail!("connection reset while saving {}", user.username);
        }
        self.inner.save_tracked(user).await
    }

    async fn get_registration(
        &self,
        server_id: &str,
        discord_user_id: &str,
    ) -> Result<Option<TrackedUser>> {
        self.inner.get_registration(server_id, discord_user_id).await
    }

    async fn get_registered_discord_id(
        &self,
        server_id: &str,
        username: &str,
    ) -> Result<Option<String>> {
        self.inner.get_registered_discord_id(server_id, username).await
    }

    async fn register(
        &self,
        username: &str,
        server_id: &str,
        discord_user_id: &str,
    ) -> Result<bool> {
        let registered = self.inner.register(username, server_id, discord_user_id).await?;
        Ok(registered && !self.take(Fault::RegisterRace))
    }

    async fn unregister(&self, server_id: &str, discord_user_id: &str) -> Result<bool> {
        if self.take(Fault::Unregister) {
            anyhow::bail!("pool timed out connecting to postgres://bot@10.0.0.5:5432/etterna");
        }
        self.inner.unregister(server_id, discord_user_id).await
    }

    async fn list_registered_users_with_channels(
        &self,
    ) -> Result<Vec<(TrackedUser, Vec<ServerConfig>)>> {
        self.inner.list_registered_users_with_channels().await
    }

    async fn get_cached_song(&self, id: i64) -> Result<Option<Song>> {
        self.inner.get_cached_song(id).await
    }

    async fn save_song(&self, song: &Song) -> Result<()> {
        self.inner.save_song(song).await
    }
}

pub struct Harness {
    pub api: Arc<FakeApi>,
    pub store: Arc<MemoryStore>,
    pub dispatcher: Arc<RecordingDispatcher>,
    pub bot: Arc<Bot>,
}

impl Harness {
    pub fn new() -> Self {
        let store = Arc::new(MemoryStore::new());
        Self::with_store(store.clone(), store)
    }

    /// A harness whose bot goes through a [`FlakyStore`]. `store` still reads
    /// the underlying tables directly.
    pub fn flaky() -> (Self, Arc<FlakyStore>) {
        let store = Arc::new(MemoryStore::new());
        let flaky = Arc::new(FlakyStore::new(store.clone()));
        (Self::with_store(store, flaky.clone()), flaky)
    }

    fn with_store(store: Arc<MemoryStore>, bot_store: Arc<dyn Store>) -> Self {
        let api = Arc::new(FakeApi::default());
        let dispatcher = Arc::new(RecordingDispatcher::default());

        let bot = Arc::new(Bot {
            api: api.clone(),
            store: bot_store,
            dispatcher: dispatcher.clone(),
            settings: Settings::default(),
        });

        Self {
            api,
            store,
            dispatcher,
            bot,
        }
    }

    /// Registers `username` in `server_id`, posting plays to `channel` if given.
    pub async fn register(
        &self,
        server_id: &str,
        channel: Option<&str>,
        username: &str,
        discord_user_id: &str,
    ) {
        let mut config = self.bot.server_config(server_id).await.unwrap();
        config.score_channel_id = channel.map(str::to_string);
        self.store.save_server_config(&config).await.unwrap();

        let user = etternabot::recent::get_or_create_user(
            self.api.as_ref(),
            self.store.as_ref(),
            username,
        )
        .await
        .unwrap();

        assert!(self
            .store
            .register(&user.username, server_id, discord_user_id)
            .await
            .unwrap());
    }
}

pub fn msd(overall: f64) -> Msd {
    Msd {
        overall,
        stream: overall - 1.0,
        ..Msd::default()
    }
}

pub fn at(day: u32, hour: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 3, day)
        .unwrap()
        .and_hms_opt(hour, 0, 0)
        .unwrap()
}

/// A 41 character score key.
pub fn key(n: u32) -> String {
    format!("S{:040x}", n)
}

pub fn song(id: i64, name: &str) -> Song {
    Song {
        id,
        name: name.to_string(),
        artist: "Artist".to_string(),
        background: format!("{}.jpg", id),
        key: format!("X{:040}", id),
    }
}

pub fn score(key: &str, accuracy: f64, rate: f64, song: &Song, date: NaiveDateTime) -> Score {
    Score {
        key: key.to_string(),
        accuracy,
        judgements: Judgements {
            marvelous: 900,
            perfect: 80,
            great: 10,
            good: 2,
            bad: 1,
            miss: 3,
        },
        rate,
        max_combo: 512,
        mines_hit: 0,
        mods: "C700".to_string(),
        valid: true,
        date,
        nerfed: 20.1,
        msd: msd(22.4),
        song: Song {
            id: song.id,
            name: song.name.clone(),
            ..Song::default()
        },
        user: User::default(),
    }
}
