//! Periodic check of every registered user's latest play.
//!
//! A play is announced in each server the user is registered in when it raised
//! at least one rating by 0.01 or was played at the configured minimum accuracy.
//! Either way the user's cursor and cached ratings move forward, so the same
//! play is never looked at twice.

use anyhow::Result;
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::MissedTickBehavior;

use crate::models::{Cursor, ServerConfig, TrackedUser};
use crate::recent::{get_or_fetch_song, recent_play};
use crate::{summary, Bot};

/// Counts for one pass over the registered users.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CycleReport {
    pub checked: usize,
    pub announced: usize,
    pub suppressed: usize,
    pub unchanged: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Unchanged,
    Suppressed,
    Announced,
}

pub struct PlayTracker {
    bot: Arc<Bot>,
    cycle: Mutex<()>,
}

impl PlayTracker {
    pub fn new(bot: Arc<Bot>) -> Self {
        Self {
            bot,
            cycle: Mutex::new(()),
        }
    }

    /// Runs a cycle every `period`. A cycle that overruns delays the next tick
    /// instead of overlapping with it.
    pub async fn run(&self, period: Duration) {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(period_secs = period.as_secs(), "play tracker started");

        loop {
            interval.tick().await;
            self.track_all().await;
        }
    }

    /// One pass over all registered users. `None` if a pass is already running.
    pub async fn track_all(&self) -> Option<CycleReport> {
        let Ok(_guard) = self.cycle.try_lock() else {
            tracing::warn!("previous tracking cycle still running, skipping");
            return None;
        };

        let mut report = CycleReport::default();

        let users = match self.bot.store.list_registered_users_with_channels().await {
            Ok(users) => users,
            Err(e) => {
                tracing::error!(error = %e, "failed to load registered users");
                return Some(report);
            }
        };

        tracing::debug!(users = users.len(), "tracking cycle started");

        for (user, servers) in users {
            report.checked += 1;
            let username = user.username.clone();

            match self.track_user(user, &servers).await {
                Ok(Outcome::Unchanged) => report.unchanged += 1,
                Ok(Outcome::Suppressed) => report.suppressed += 1,
                Ok(Outcome::Announced) => report.announced += 1,
                Err(e) => {
                    report.failed += 1;
                    tracing::warn!(%username, error = %e, "failed to track user");
                }
            }
        }

        tracing::info!(
            checked = report.checked,
            announced = report.announced,
            suppressed = report.suppressed,
            failed = report.failed,
            "tracking cycle finished"
        );

        Some(report)
    }

    async fn track_user(&self, mut user: TrackedUser, servers: &[ServerConfig]) -> Result<Outcome> {
        let bot = &self.bot;

        let Some(score) = recent_play(bot.api.as_ref(), user.etterna_id).await? else {
            tracing::debug!(username = %user.username, "no valid recent play");
            return Ok(Outcome::Unchanged);
        };

        if !user.is_new_play(&score) {
            tracing::debug!(username = %user.username, key = %score.key, "play already seen");
            return Ok(Outcome::Unchanged);
        }

        // Gains are measured against the ratings cached at the last check, not
        // the ratings embedded in the score.
        let latest = bot.api.get_by_username(&user.username).await?;
        let previous = user.msd;
        user.refresh(&latest);

        user.cursor = Some(Cursor::of(&score));
        bot.store.save_tracked(&user).await?;

        let gains = summary::gain_lines(&user.msd, &previous);

        if gains.is_empty() && score.accuracy < bot.settings.min_accuracy {
            tracing::debug!(
                username = %user.username,
                accuracy = score.accuracy,
                "play below threshold without gains"
            );
            return Ok(Outcome::Suppressed);
        }

        let song = get_or_fetch_song(bot.api.as_ref(), bot.store.as_ref(), score.song.id).await?;
        let message = summary::tracked_play(bot.api.base_url(), &score, &song, &user, &gains);

        let sends = servers.iter().filter_map(|server| {
            let channel = server.score_channel_id.as_deref()?;
            let message = &message;

            Some(async move {
                let result = bot.dispatcher.send_rich_message(channel, message).await;
                (server, result)
            })
        });

        for (server, result) in join_all(sends).await {
            if let Err(e) = result {
                tracing::warn!(server = %server.server_id, error = %e, "failed to announce play");
                continue;
            }

            if let Err(e) = bot.set_last_song(&server.server_id, song.id).await {
                tracing::warn!(server = %server.server_id, error = %e, "failed to save last song");
            }
        }

        tracing::info!(
            username = %user.username,
            song = %song.name,
            servers = servers.len(),
            "announced play"
        );

        Ok(Outcome::Announced)
    }
}

