//! Payload parsers: one JSON response body in, one typed record out.
//!
//! Field names on the site are inconsistently cased (`scorekey`, `Overall`,
//! `countrycode`...), so every object is lower-cased key-wise before being
//! deserialized into the payload structs below.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};

use regex::Regex;
use std::sync::LazyLock;

pub use crate::error::ParseError;
use crate::html;
use crate::models::{Msd, Rank, Score, Song, User};
use crate::round::round_to_precision;

/// Significant length of a score key. Anything past it is the user ID.
pub const SCORE_KEY_LEN: usize = 41;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct MsdPayload {
    #[serde(deserialize_with = "text")]
    overall: String,
    #[serde(deserialize_with = "text")]
    stream: String,
    #[serde(deserialize_with = "text")]
    jumpstream: String,
    #[serde(deserialize_with = "text")]
    handstream: String,
    #[serde(deserialize_with = "text")]
    stamina: String,
    #[serde(deserialize_with = "text")]
    jackspeed: String,
    #[serde(deserialize_with = "text")]
    chordjack: String,
    #[serde(deserialize_with = "text")]
    technical: String,
}

impl MsdPayload {
    /// Parses every component; the overall goes through `overall` first so the
    /// score list's link-wrapped variant can be unwrapped.
    fn parse(&self, overall: impl Fn(&str) -> String) -> Result<Msd, ParseError> {
        Ok(Msd {
            overall: rating("overall", &overall(&self.overall))?,
            stream: rating("stream", &self.stream)?,
            jumpstream: rating("jumpstream", &self.jumpstream)?,
            handstream: rating("handstream", &self.handstream)?,
            stamina: rating("stamina", &self.stamina)?,
            jack_speed: rating("jackspeed", &self.jackspeed)?,
            chordjack: rating("chordjack", &self.chordjack)?,
            technical: rating("technical", &self.technical)?,
        })
    }

    fn parse_ranks(&self) -> Result<Rank, ParseError> {
        Ok(Rank {
            overall: count("overall", &self.overall)?,
            stream: count("stream", &self.stream)?,
            jumpstream: count("jumpstream", &self.jumpstream)?,
            handstream: count("handstream", &self.handstream)?,
            stamina: count("stamina", &self.stamina)?,
            jack_speed: count("jackspeed", &self.jackspeed)?,
            chordjack: count("chordjack", &self.chordjack)?,
            technical: count("technical", &self.technical)?,
        })
    }
}

#[derive(Debug, Deserialize)]
struct ScoreListEntry {
    #[serde(default, deserialize_with = "text")]
    datetime: String,
    /// A float, except on invalid scores where it is the string `"0"`.
    #[serde(default)]
    nerf: Value,
    #[serde(default, deserialize_with = "text")]
    user_chart_rate_rate: String,
    #[serde(default, deserialize_with = "text")]
    scorekey: String,
    #[serde(default, deserialize_with = "text")]
    songname: String,
    #[serde(default, deserialize_with = "text")]
    wifescore: String,
    #[serde(flatten)]
    msd: MsdPayload,
}

impl ScoreListEntry {
    fn is_invalid(&self) -> bool {
        matches!(&self.nerf, Value::String(s) if s.trim() == "0")
    }
}

#[derive(Debug, Deserialize)]
struct ScoreDetailPayload {
    #[serde(default, deserialize_with = "text")]
    datetime: String,
    #[serde(default, deserialize_with = "text")]
    maxcombo: String,
    #[serde(default, deserialize_with = "text")]
    hitmine: String,
    #[serde(default, deserialize_with = "text")]
    modifiers: String,
    #[serde(default, deserialize_with = "text")]
    user_chart_rate_rate: String,
    #[serde(default, deserialize_with = "text")]
    valid: String,
    #[serde(default, deserialize_with = "text")]
    username: String,
    #[serde(default, deserialize_with = "text")]
    avatarurl: String,
    #[serde(default, deserialize_with = "text")]
    countrycode: String,
    #[serde(flatten)]
    msd: MsdPayload,
}

#[derive(Debug, Deserialize)]
struct UserPayload {
    #[serde(default, deserialize_with = "text")]
    username: String,
    #[serde(default, deserialize_with = "text")]
    countrycode: String,
    #[serde(default, deserialize_with = "text")]
    avatar: String,
    #[serde(flatten)]
    msd: MsdPayload,
}

#[derive(Debug, Deserialize)]
struct SongPayload {
    #[serde(default, deserialize_with = "text")]
    songkey: String,
    #[serde(default, deserialize_with = "text")]
    id: String,
    #[serde(default, deserialize_with = "text")]
    songname: String,
    #[serde(default, deserialize_with = "text")]
    artist: String,
    #[serde(default, deserialize_with = "text")]
    background: String,
}

/// Parses a score list response, dropping invalid scores.
pub fn score_list(body: &str) -> Result<Vec<Score>, ParseError> {
    let root = lowercase_keys(serde_json::from_str(body)?);

    let data = match root.get("data") {
        Some(Value::Array(data)) => data.clone(),
        Some(Value::Null) | None => Vec::new(),
        Some(_) => {
            return Err(ParseError::MissingElement {
                field: "data",
                element: "array",
                fragment: truncate(body),
            })
        }
    };

    let mut scores = Vec::with_capacity(data.len());

    for entry in data {
        let entry: ScoreListEntry = serde_json::from_value(entry)?;

        if entry.is_invalid() {
            tracing::trace!(key = %entry.scorekey, "skipping invalid score");
            continue;
        }

        scores.push(score_list_entry(entry)?);
    }

    Ok(scores)
}

fn score_list_entry(entry: ScoreListEntry) -> Result<Score, ParseError> {
    let (judgements, accuracy) = html::wife_score("wifescore", &entry.wifescore)?;
    let song = html::song_link("songname", &entry.songname)?;

    let nerfed = match &entry.nerf {
        Value::Number(n) => n.as_f64().unwrap_or_default(),
        Value::String(s) => number("nerf", s)?,
        _ => 0.0,
    };

    let (key, _) = split_score_key(&entry.scorekey)?;

    Ok(Score {
        key: key.to_string(),
        accuracy,
        judgements,
        rate: number("user_chart_rate_rate", &entry.user_chart_rate_rate)?,
        max_combo: 0,
        mines_hit: 0,
        mods: String::new(),
        valid: true,
        date: date("datetime", &entry.datetime)?,
        nerfed,
        msd: entry.msd.parse(html::anchor_or_text)?,
        song: Song {
            id: song.id,
            name: song.name,
            ..Default::default()
        },
        user: User::default(),
    })
}

/// Parses a score detail response.
///
/// The payload carries no user ID; it is recovered from the digits that follow
/// the first 41 characters of `requested_key`, when present.
pub fn score_detail(body: &str, requested_key: &str) -> Result<Score, ParseError> {
    let payload: ScoreDetailPayload = serde_json::from_value(first_record(body)?)?;
    let (key, user_id) = split_score_key(requested_key)?;

    Ok(Score {
        key: key.to_string(),
        accuracy: 0.0,
        judgements: Default::default(),
        rate: number("user_chart_rate_rate", &payload.user_chart_rate_rate)?,
        max_combo: count("maxcombo", &payload.maxcombo)?,
        mines_hit: count("hitmine", &payload.hitmine)?,
        mods: payload.modifiers,
        valid: payload.valid.trim() == "1",
        date: date("datetime", &payload.datetime)?,
        nerfed: 0.0,
        msd: payload.msd.parse(|s| s.to_string())?,
        song: Song::default(),
        user: User {
            id: user_id,
            username: payload.username,
            avatar: payload.avatarurl,
            country_code: payload.countrycode,
            ..Default::default()
        },
    })
}

/// Parses a `user_data` profile response. Ranks are fetched separately.
pub fn user_profile(body: &str) -> Result<User, ParseError> {
    let root = lowercase_keys(serde_json::from_str(body)?);
    let payload: UserPayload = serde_json::from_value(root)?;

    Ok(User {
        id: None,
        username: payload.username,
        avatar: payload.avatar,
        country_code: payload.countrycode,
        msd: payload.msd.parse(|s| s.to_string())?,
        rank: Rank::default(),
    })
}

/// Parses a `user_rank` response.
pub fn user_ranks(body: &str) -> Result<Rank, ParseError> {
    let root = lowercase_keys(serde_json::from_str(body)?);
    let payload: MsdPayload = serde_json::from_value(root)?;

    payload.parse_ranks()
}

/// Parses a song response. `requested_id` is used when the payload omits the ID.
pub fn song(body: &str, requested_id: i64) -> Result<Song, ParseError> {
    let payload: SongPayload = serde_json::from_value(first_record(body)?)?;

    let id = if payload.id.trim().is_empty() {
        requested_id
    } else {
        payload
            .id
            .trim()
            .parse()
            .map_err(|_| ParseError::InvalidNumber {
                field: "id",
                value: payload.id.clone(),
            })?
    };

    Ok(Song {
        id,
        name: html::decode_entities(&payload.songname).into_owned(),
        artist: html::decode_entities(&payload.artist).into_owned(),
        background: payload.background,
        key: payload.songkey,
    })
}

static USER_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"'userid': '(\d+)'").expect("valid regex"));

/// The numeric user ID embedded in a profile page's inline script.
pub fn user_id(page: &str) -> Result<i64, ParseError> {
    let capture = USER_ID
        .captures(page)
        .ok_or_else(|| ParseError::MissingElement {
            field: "userid",
            element: "script",
            fragment: truncate(page),
        })?;

    capture[1].parse().map_err(|_| ParseError::InvalidNumber {
        field: "userid",
        value: capture[1].to_string(),
    })
}

/// Splits a score key into its 41 significant characters and the user ID
/// suffix some endpoints append.
pub fn split_score_key(key: &str) -> Result<(&str, Option<i64>), ParseError> {
    let invalid = || ParseError::InvalidScoreKey {
        field: "scorekey",
        value: key.to_string(),
    };

    let head = key.get(..SCORE_KEY_LEN).ok_or_else(invalid)?;
    let tail = &key[SCORE_KEY_LEN..];

    let user_id = if tail.is_empty() {
        None
    } else {
        Some(tail.parse::<i64>().map_err(|_| invalid())?)
    };

    Ok((head, user_id))
}

/// The first element of a single-record array response.
fn first_record(body: &str) -> Result<Value, ParseError> {
    let value: Value = serde_json::from_str(body)?;

    let record = match value {
        Value::Array(records) => records.into_iter().next(),
        Value::Object(_) => Some(value),
        _ => None,
    };

    record.map(lowercase_keys).ok_or(ParseError::EmptyResponse)
}

/// Lower-cases the keys of an object (not recursively).
fn lowercase_keys(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| {
                    let v = match v {
                        Value::Array(items) => {
                            Value::Array(items.into_iter().map(lowercase_keys).collect())
                        }
                        other => other,
                    };
                    (k.to_lowercase(), v)
                })
                .collect::<Map<String, Value>>(),
        ),
        other => other,
    }
}

/// Accepts a string, a number or null where the site promises a string.
fn text<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    })
}

fn number(field: &'static str, value: &str) -> Result<f64, ParseError> {
    value
        .trim()
        .parse::<f64>()
        .map_err(|_| ParseError::InvalidNumber {
            field,
            value: value.to_string(),
        })
}

/// A rating, normalized to 2 decimals. Blank means unrated.
fn rating(field: &'static str, value: &str) -> Result<f64, ParseError> {
    if value.trim().is_empty() {
        return Ok(0.0);
    }

    number(field, value).map(|v| round_to_precision(v, 2))
}

/// A non-negative integer; blank means zero.
fn count(field: &'static str, value: &str) -> Result<u32, ParseError> {
    let value = value.trim();

    if value.is_empty() {
        return Ok(0);
    }

    value.parse::<u32>().map_err(|_| ParseError::InvalidNumber {
        field,
        value: value.to_string(),
    })
}

/// `"YYYY-MM-DD HH:MM:SS"`, or `"YYYY-MM-DD"` (midnight).
fn date(field: &'static str, value: &str) -> Result<NaiveDateTime, ParseError> {
    let value = value.trim();

    NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S")
        .or_else(|_| NaiveDate::parse_from_str(value, "%Y-%m-%d").map(|d| d.and_time(NaiveTime::MIN)))
        .map_err(|_| ParseError::InvalidDate {
            field,
            value: value.to_string(),
        })
}

fn truncate(body: &str) -> String {
    body.chars().take(200).collect()
}
