//! Chat commands and score link handling, independent of the chat platform.

use anyhow::Result;
use etterna::{ScoreQuery, SortColumn};
use regex::Regex;
use std::sync::LazyLock;

use crate::models::{ServerConfig, TrackedUser};
use crate::recent::{get_or_create_user, get_or_fetch_song, merge_detail, recent_play};
use crate::{summary, Bot};

static COMMAND: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z\d.@]+$").expect("valid regex"));
static RATE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\d*\.?\d*$").expect("valid regex"));
static SCORE_LINK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"etternaonline\.com/score/view/(S[a-f0-9]+)").expect("valid regex")
});

const COMPARE_RATE_USAGE: &str = "Usage: compare@<rate> [user]";
const INTERNAL_ERROR: &str = "Something went wrong. Please try again later.";

/// Where a message came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub server_id: String,
    pub channel_id: String,
    pub author_id: String,
}

/// Entry point for every message posted in a server.
pub async fn handle_message(bot: &Bot, inv: &Invocation, content: &str) -> Result<()> {
    let server = bot.server_config(&inv.server_id).await?;

    let Some(rest) = content.strip_prefix(server.command_prefix.as_str()) else {
        return handle_score_links(bot, inv, &server, content).await;
    };

    let mut parts = rest.split_whitespace();
    let Some(command) = parts.next().map(str::to_lowercase) else {
        return Ok(());
    };

    if !COMMAND.is_match(&command) {
        return Ok(());
    }

    let args: Vec<&str> = parts.collect();
    tracing::debug!(server = %inv.server_id, %command, ?args, "command received");

    let result = match command.as_str() {
        "help" => bot.send(inv, &summary::help(&server.command_prefix)).await,
        "setuser" => set_user(bot, inv, &args).await,
        "unset" | "unregister" => unset_user(bot, inv).await,
        "here" => set_score_channel(bot, inv, server).await,
        "recent" => recent(bot, inv, &args).await,
        "compare" => compare(bot, inv, &server, None, &args).await,
        "profile" => profile(bot, inv, &args).await,
        "vs" => versus(bot, inv, &args).await,
        c if c.starts_with("compare@") => match parse_rate(c) {
            Ok(rate) => compare(bot, inv, &server, Some(rate), &args).await,
            Err(message) => bot.reply(inv, message).await,
        },
        other => {
            bot.reply(inv, &format!("Unrecognized command '{}'.", other))
                .await
        }
    };

    if let Err(e) = result {
        // Site errors carry a message meant for the user; anything else stays in the logs.
        let text = match e.downcast_ref::<etterna::Error>() {
            Some(err) if err.is_not_found() => err.to_string(),
            Some(err) => {
                tracing::warn!(%command, error = ?e, "command failed");
                err.to_string()
            }
            None => {
                tracing::error!(%command, error = ?e, "command failed");
                INTERNAL_ERROR.to_string()
            }
        };

        bot.reply(inv, &text).await?;
    }

    Ok(())
}

/// Parses the rate out of `compare@<rate>`: 0.7 to 3.0 in 0.05 steps.
pub fn parse_rate(command: &str) -> std::result::Result<f64, &'static str> {
    let rate = command.strip_prefix("compare@").unwrap_or_default();

    if rate.is_empty() || !RATE.is_match(rate) {
        return Err(COMPARE_RATE_USAGE);
    }

    let value: f64 = rate.parse().map_err(|_| COMPARE_RATE_USAGE)?;

    if !(0.7..=3.0).contains(&value) {
        return Err("Rate must be between 0.7 and 3.0.");
    }

    if let Some((_, fraction)) = rate.split_once('.') {
        let fraction = fraction.as_bytes();

        if fraction.len() > 2 || (fraction.len() == 2 && !matches!(fraction[1], b'0' | b'5')) {
            return Err("Rate must be in 0.05 increments.");
        }
    }

    Ok(value)
}

fn not_registered(command: &str) -> String {
    format!(
        "You are not registered with an Etterna user. Please register using the `setuser` \
         command, or specify a user: {} <username>",
        command
    )
}

/// The named user, or the author's registered user when no name is given.
async fn resolve_user(
    bot: &Bot,
    inv: &Invocation,
    username: Option<&str>,
) -> Result<Option<TrackedUser>> {
    match username {
        Some(name) => Ok(Some(
            get_or_create_user(bot.api.as_ref(), bot.store.as_ref(), name).await?,
        )),
        None => {
            bot.store
                .get_registration(&inv.server_id, &inv.author_id)
                .await
        }
    }
}

/// Fetches current ratings without touching the cache or the tracking cursor.
async fn with_latest_ratings(bot: &Bot, mut user: TrackedUser) -> Result<TrackedUser> {
    let latest = bot.api.get_by_username(&user.username).await?;
    user.refresh(&latest);
    Ok(user)
}

async fn set_user(bot: &Bot, inv: &Invocation, args: &[&str]) -> Result<()> {
    let Some(username) = args.first().map(|a| a.trim()) else {
        return bot.reply(inv, "Usage: setuser <username>").await;
    };

    match bot
        .store
        .get_registered_discord_id(&inv.server_id, username)
        .await?
    {
        Some(id) if id == inv.author_id => {
            let text = format!("You are already registered as '{}'.", username);
            return bot.reply(inv, &text).await;
        }
        Some(_) => {
            let text = format!("Another user is already registered as '{}'.", username);
            return bot.reply(inv, &text).await;
        }
        None => {}
    }

    if bot
        .store
        .get_registration(&inv.server_id, &inv.author_id)
        .await?
        .is_some()
    {
        return bot
            .reply(
                inv,
                "You are already registered as another user. Use the 'unset' command first and try again.",
            )
            .await;
    }

    let user = get_or_create_user(bot.api.as_ref(), bot.store.as_ref(), username).await?;

    if bot
        .store
        .register(&user.username, &inv.server_id, &inv.author_id)
        .await?
    {
        tracing::info!(server = %inv.server_id, username = %user.username, "registered user");
        let text = format!("Success! You are now registered as '{}'.", user.username);
        return bot.reply(inv, &text).await;
    }

    // Lost a race with another registration; report whichever side is taken.
    let text = match bot
        .store
        .get_registered_discord_id(&inv.server_id, &user.username)
        .await?
    {
        Some(id) if id == inv.author_id => {
            format!("You are already registered as '{}'.", user.username)
        }
        Some(_) => format!("Another user is already registered as '{}'.", user.username),
        None => "You are already registered as another user. Use the 'unset' command first and try again."
            .to_string(),
    };

    bot.reply(inv, &text).await
}

async fn unset_user(bot: &Bot, inv: &Invocation) -> Result<()> {
    if bot.store.unregister(&inv.server_id, &inv.author_id).await? {
        bot.reply(
            inv,
            "Success! You are no longer registered. Use the setuser command to register as another user.",
        )
        .await
    } else {
        bot.reply(inv, "You are not registered with an Etterna user.")
            .await
    }
}

async fn set_score_channel(bot: &Bot, inv: &Invocation, mut server: ServerConfig) -> Result<()> {
    server.score_channel_id = Some(inv.channel_id.clone());
    bot.store.save_server_config(&server).await?;

    tracing::info!(server = %inv.server_id, channel = %inv.channel_id, "score channel set");
    bot.reply(inv, "Recent plays will be posted in this channel.")
        .await
}

async fn recent(bot: &Bot, inv: &Invocation, args: &[&str]) -> Result<()> {
    let Some(user) = resolve_user(bot, inv, args.first().copied()).await? else {
        return bot.reply(inv, &not_registered("recent")).await;
    };

    bot.typing(inv).await;

    let Some(score) = recent_play(bot.api.as_ref(), user.etterna_id).await? else {
        let text = format!("{} has no recent valid scores.", user.username);
        return bot.reply(inv, &text).await;
    };

    let song = get_or_fetch_song(bot.api.as_ref(), bot.store.as_ref(), score.song.id).await?;
    let message = summary::play(bot.api.base_url(), "Recent play by", &score, &song, &user);

    bot.send(inv, &message).await?;
    bot.set_last_song(&inv.server_id, song.id).await
}

/// Best score on the server's last posted song, optionally at one rate.
async fn compare(
    bot: &Bot,
    inv: &Invocation,
    server: &ServerConfig,
    rate: Option<f64>,
    args: &[&str],
) -> Result<()> {
    let Some(song_id) = server.last_song_id else {
        return bot.reply(inv, "No scores to compare to.").await;
    };

    let Some(user) = resolve_user(bot, inv, args.first().copied()).await? else {
        return bot.reply(inv, &not_registered("compare")).await;
    };

    bot.typing(inv).await;

    let song = get_or_fetch_song(bot.api.as_ref(), bot.store.as_ref(), song_id).await?;

    let query = ScoreQuery::new(user.etterna_id)
        .search(song.name.clone())
        .count(if rate.is_some() { 100 } else { 50 })
        .sort(SortColumn::Nerf, false);

    let scores = bot.api.get_scores(&query).await?;
    let mut on_song = scores.into_iter().filter(|s| s.song.id == song_id).peekable();

    if on_song.peek().is_none() {
        let text = format!("{} has no scores on '{}'", user.username, song.name);
        return bot.reply(inv, &text).await;
    }

    let best = match rate {
        Some(rate) => on_song.find(|s| (s.rate - rate).abs() < 1e-6),
        None => on_song.next(),
    };

    let Some(mut score) = best else {
        let text = format!(
            "{} has no scores on '{}' at {}",
            user.username,
            song.name,
            summary::format_rate(rate.unwrap_or_default())
        );
        return bot.reply(inv, &text).await;
    };

    let detail = bot.api.get_score_detail(&score.key).await?;
    merge_detail(&mut score, &detail);

    let message = summary::play(bot.api.base_url(), "Played by", &score, &song, &user);

    bot.send(inv, &message).await?;
    bot.set_last_song(&inv.server_id, song.id).await
}

async fn profile(bot: &Bot, inv: &Invocation, args: &[&str]) -> Result<()> {
    let Some(user) = resolve_user(bot, inv, args.first().copied()).await? else {
        return bot.reply(inv, &not_registered("profile")).await;
    };

    let user = with_latest_ratings(bot, user).await?;

    bot.send(inv, &summary::profile(bot.api.base_url(), &user))
        .await
}

async fn versus(bot: &Bot, inv: &Invocation, args: &[&str]) -> Result<()> {
    let (left, right) = match args {
        [] => return bot.reply(inv, "Usage: vs <username> [username]").await,
        [other] => {
            let Some(me) = resolve_user(bot, inv, None).await? else {
                return bot.reply(inv, &not_registered("vs")).await;
            };
            (me, resolve_user(bot, inv, Some(*other)).await?)
        }
        [first, second, ..] => (
            get_or_create_user(bot.api.as_ref(), bot.store.as_ref(), first).await?,
            resolve_user(bot, inv, Some(*second)).await?,
        ),
    };

    let Some(right) = right else {
        return Ok(());
    };

    let left = with_latest_ratings(bot, left).await?;
    let right = with_latest_ratings(bot, right).await?;

    bot.send(inv, &summary::versus(&left, &right)).await
}

/// Posts a summary for each score link in an ordinary message.
async fn handle_score_links(
    bot: &Bot,
    inv: &Invocation,
    server: &ServerConfig,
    content: &str,
) -> Result<()> {
    let Some(capture) = SCORE_LINK.captures(content) else {
        return Ok(());
    };

    let key = &capture[1];

    if key.len() < etterna::parse::SCORE_KEY_LEN {
        return bot
            .reply(inv, "Score URL does not look correct (did you copy it right?)")
            .await;
    }

    bot.typing(inv).await;

    let detail = match bot.api.get_score_detail(key).await {
        Ok(detail) => detail,
        Err(e) => return bot.reply(inv, &format!("Failed to get score ({})", e)).await,
    };

    let user =
        match get_or_create_user(bot.api.as_ref(), bot.store.as_ref(), &detail.user.username).await
        {
            Ok(user) => user,
            Err(e) => {
                let text = format!("Could not find user {} ({})", detail.user.username, e);
                return bot.reply(inv, &text).await;
            }
        };

    // The list is the only source of accuracy, judgements and song identity.
    let query = ScoreQuery::new(detail.user.id.unwrap_or(user.etterna_id))
        .count(100)
        .sort(SortColumn::Nerf, false);

    let scores = match bot.api.get_scores(&query).await {
        Ok(scores) => scores,
        Err(e) => return bot.reply(inv, &format!("Failed to get score ({})", e)).await,
    };

    let Some(mut score) = scores.into_iter().find(|s| s.key == detail.key) else {
        return bot
            .reply(inv, "Failed to get score (could not be found)")
            .await;
    };

    merge_detail(&mut score, &detail);

    let song = get_or_fetch_song(bot.api.as_ref(), bot.store.as_ref(), score.song.id).await?;
    let message = summary::play(bot.api.base_url(), "Played by", &score, &song, &user);

    bot.send(inv, &message).await?;

    tracing::debug!(server = %server.server_id, key = %detail.key, "posted linked score");
    bot.set_last_song(&inv.server_id, song.id).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_rates_in_005_steps() {
        assert_eq!(parse_rate("compare@1.05"), Ok(1.05));
        assert_eq!(parse_rate("compare@1.1"), Ok(1.1));
        assert_eq!(parse_rate("compare@2"), Ok(2.0));
        assert_eq!(parse_rate("compare@0.70"), Ok(0.7));
        assert_eq!(parse_rate("compare@3.0"), Ok(3.0));
    }

    #[test]
    fn rejects_bad_rates() {
        assert_eq!(parse_rate("compare@"), Err(COMPARE_RATE_USAGE));
        assert_eq!(parse_rate("compare@."), Err(COMPARE_RATE_USAGE));
        assert_eq!(parse_rate("compare@1.2.3"), Err(COMPARE_RATE_USAGE));
        assert_eq!(parse_rate("compare@0.5"), Err("Rate must be between 0.7 and 3.0."));
        assert_eq!(parse_rate("compare@3.05"), Err("Rate must be between 0.7 and 3.0."));
        assert_eq!(parse_rate("compare@1.03"), Err("Rate must be in 0.05 increments."));
        assert_eq!(parse_rate("compare@1.055"), Err("Rate must be in 0.05 increments."));
    }

    #[test]
    fn command_names() {
        assert!(COMMAND.is_match("compare@1.05"));
        assert!(COMMAND.is_match("setuser"));
        assert!(!COMMAND.is_match("set-user"));
    }

    #[test]
    fn finds_score_links() {
        let text = "look https://etternaonline.com/score/view/S03d9aef6758d50f60dedc2fc6b855dd22aa6b1e24118 !";
        let capture = SCORE_LINK.captures(text).unwrap();

        assert_eq!(&capture[1], "S03d9aef6758d50f60dedc2fc6b855dd22aa6b1e24118");
    }
}
