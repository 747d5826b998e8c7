//! Chat renderings of plays and profiles.

use etterna::round::{equality_sign, round_to_precision};
use etterna::{Msd, Score, Skillset, Song};
use std::fmt::Write;

use crate::dispatch::{Author, Field, Footer, RichMessage};
use crate::models::TrackedUser;

const ETTERNA_ICON: &str = "https://i.imgur.com/HwIkGCk.png";
const VERSUS_ICON: &str = "https://i.imgur.com/AkfAZtJ.png";
const MINES_EMOTE: &str = "<:LULW:458394552886099972>";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Grade {
    AAAA,
    AAA,
    AA,
    A,
    B,
    C,
    D,
}

impl Grade {
    pub fn from_accuracy(accuracy: f64) -> Self {
        match accuracy {
            a if a >= 99.955 => Grade::AAAA,
            a if a >= 99.70 => Grade::AAA,
            a if a >= 93.0 => Grade::AA,
            a if a >= 80.0 => Grade::A,
            a if a >= 70.0 => Grade::B,
            a if a >= 60.0 => Grade::C,
            _ => Grade::D,
        }
    }

    /// Custom server emote for the grade. D has none.
    pub fn emote(self) -> &'static str {
        match self {
            Grade::AAAA => "<:AAAA:655488390141313024>",
            Grade::AAA => "<:AAA:655483030789685265>",
            Grade::AA => "<:AA:655488727187193856>",
            Grade::A => "<:A:655488727212359710>",
            Grade::B => "<:B:655488727434395688>",
            Grade::C => "<:C:655488727258234880>",
            Grade::D => "",
        }
    }
}

/// `0.80 -> "0.8"`, `1.00 -> "1.0"`, `1.05 -> "1.05"`.
pub fn format_rate(rate: f64) -> String {
    let mut rate = format!("{:.2}", rate);

    if rate.ends_with('0') {
        rate.pop();
    }

    rate
}

/// Extra precision near the top, where tenths of a percent matter.
pub fn format_accuracy(accuracy: f64) -> String {
    if accuracy >= 99.75 {
        format!("{:.4}%", accuracy)
    } else {
        format!("{:.2}%", accuracy)
    }
}

pub fn score_url(base_url: &str, key: &str, etterna_id: i64) -> String {
    format!("{}/score/view/{}{}", base_url, key, etterna_id)
}

pub fn avatar_url(base_url: &str, avatar: &str) -> String {
    format!("{}/avatars/{}", base_url, avatar)
}

pub fn song_background_url(base_url: &str, background: &str) -> String {
    format!("{}/song_images/bg/{}", base_url, background)
}

pub fn profile_url(base_url: &str, username: &str) -> String {
    format!("{}/user/{}", base_url, username)
}

/// One line per skillset that went up by at least 0.01, empty if none did.
pub fn gain_lines(latest: &Msd, previous: &Msd) -> String {
    let diff = latest.diff(previous);
    let mut lines = String::new();

    for skillset in Skillset::ALL {
        let gain = diff.get(skillset);

        if gain >= 0.01 {
            let _ = writeln!(
                lines,
                "➤ **{}:** {:.2} (+{:.2})",
                skillset,
                latest.get(skillset),
                gain
            );
        }
    }

    lines
}

/// Embed for one play. `heading` prefixes the player's name in the author line.
pub fn play(
    base_url: &str,
    heading: &str,
    score: &Score,
    song: &Song,
    player: &TrackedUser,
) -> RichMessage {
    let rate = format_rate(score.rate);
    let url = score_url(base_url, &score.key, player.etterna_id);
    let j = &score.judgements;

    let mut description = format!(
        "**{}\u{2000}[{} ({}x)]({})**\n\n\
         ➤ **Acc:** {} @ {}x\n\
         ➤ **Score:** {:.2}\n\
         ➤ **Hits:** {}/{}/{}/{}/{}/{}\n\
         ➤ **Max combo:** x{}",
        Grade::from_accuracy(score.accuracy).emote(),
        song.name,
        rate,
        url,
        format_accuracy(score.accuracy),
        rate,
        score.msd.overall,
        j.marvelous,
        j.perfect,
        j.great,
        j.good,
        j.bad,
        j.miss,
        score.max_combo,
    );

    if score.mines_hit > 0 {
        let _ = write!(description, "\n➤ **Mines hit:** {} {}", score.mines_hit, MINES_EMOTE);
    }

    RichMessage {
        url: Some(url),
        author: Some(Author {
            name: format!("{} {}", heading, player.username),
            icon_url: Some(avatar_url(base_url, &player.avatar)),
            url: None,
        }),
        description,
        timestamp: Some(score.date.and_utc()),
        footer: Some(Footer {
            text: player.username.clone(),
            icon_url: Some(ETTERNA_ICON.to_string()),
        }),
        thumbnail_url: Some(song_background_url(base_url, &song.background)),
        ..Default::default()
    }
}

/// Tracker announcement: the play plus the rating gains it caused.
pub fn tracked_play(
    base_url: &str,
    score: &Score,
    song: &Song,
    player: &TrackedUser,
    gains: &str,
) -> RichMessage {
    let mut message = play(base_url, "Recent play by", score, song, player);

    if !gains.is_empty() {
        message.description.push_str("\n\n");
        message.description.push_str(gains.trim_end());
    }

    message
}

pub fn profile(base_url: &str, user: &TrackedUser) -> RichMessage {
    let mut description = String::new();

    for skillset in Skillset::ALL {
        let _ = writeln!(
            description,
            "➤ **{}:** {:.2} (#{})",
            skillset,
            user.msd.get(skillset),
            user.rank.get(skillset)
        );
    }

    let url = profile_url(base_url, &user.username);

    RichMessage {
        title: Some("View profile".to_string()),
        url: Some(url.clone()),
        author: Some(Author {
            name: format!("EtternaOnline: {}", user.username),
            icon_url: Some(ETTERNA_ICON.to_string()),
            url: Some(url),
        }),
        description,
        thumbnail_url: Some(avatar_url(base_url, &user.avatar)),
        ..Default::default()
    }
}

/// Side-by-side ratings in a code block, signs and deltas from `left`'s side.
pub fn versus(left: &TrackedUser, right: &TrackedUser) -> RichMessage {
    let mut table = String::new();

    for skillset in Skillset::ALL {
        let a = left.msd.get(skillset);
        let b = right.msd.get(skillset);

        let _ = writeln!(
            table,
            "{:>10}:  {:5.2}  {}  {:5.2}  ({:+.2})",
            skillset.name(),
            a,
            equality_sign(a, b),
            b,
            round_to_precision(a - b, 2)
        );
    }

    RichMessage {
        author: Some(Author {
            name: format!("{} vs. {}", left.username, right.username),
            icon_url: Some(ETTERNA_ICON.to_string()),
            url: None,
        }),
        description: format!("```\n{}\n```", table),
        thumbnail_url: Some(VERSUS_ICON.to_string()),
        ..Default::default()
    }
}

pub fn help(prefix: &str) -> RichMessage {
    let field = |name: &str, value: &str| Field {
        name: name.to_string(),
        value: value.to_string(),
        inline: false,
    };

    RichMessage {
        title: Some("EtternaBot Help".to_string()),
        description: format!(
            "I'm a bot for tracking Etterna Online plays. https://etternaonline.com\n\
             For commands, use this prefix: `{}`\n\n\
             I can also post score summaries if you send a link to a score.",
            prefix
        ),
        fields: vec![
            field("**help**", "Shows this help text. Cool."),
            field(
                "**setuser** <username>",
                "Links an Etterna Online user to you. This will cause your recent plays to be tracked automatically.",
            ),
            field(
                "**unset**",
                "Unlinks you from any Etterna Online users. Your recent plays will no longer be tracked.",
            ),
            field(
                "**here**",
                "Posts tracked plays of registered users in this channel.",
            ),
            field(
                "**compare** [username]",
                "Compares you or someone else's best score on the last posted song.",
            ),
            field(
                "**compare**@<rate> [username]",
                "Compares you or someone else's best score on the last posted song at a specific rate. \
                 The rate must be a number between 0.7 and 3.0, and it must be in 0.05 increments.",
            ),
            field("**profile** [username]", "Gets a summary of your current ranks and ratings."),
            field(
                "**recent** [username]",
                "Gets a summary of your latest play, or the play of whichever player you specify.",
            ),
            field(
                "**vs** <username> [username]",
                "Compares two user's profiles. If you only specify one username, that user's profile will be compared to yours.",
            ),
        ],
        ..Default::default()
    }
}
