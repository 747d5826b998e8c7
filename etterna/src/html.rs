//! Decoders for the HTML fragments the score list endpoint embeds in its JSON.
//!
//! Each decoder handles exactly one field shape and fails with a [`ParseError`]
//! when the markup is not what it expects. All knowledge of the site's markup
//! lives in this module.

use regex::Regex;
use std::borrow::Cow;
use std::sync::LazyLock;

use crate::error::ParseError;
use crate::models::Judgements;

static ANCHOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<a\b([^>]*)>(.*?)</a\s*>").expect("valid regex"));
static HREF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)(?:^|\s)href\s*=\s*(?:"([^"]*)"|'([^']*)')"#).expect("valid regex")
});
static TITLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)(?:^|\s)title\s*=\s*(?:'([^']*)'|"([^"]*)")"#).expect("valid regex")
});
static SPAN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<span\b[^>]*>(.*?)</span\s*>").expect("valid regex"));
static TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)<[^>]*>").expect("valid regex"));
static JUDGEMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([a-zA-Z]+):\s+(\d+)").expect("valid regex"));

/// Song identity taken from a `<a href=".../song/view/<id>">name</a>` link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SongLink {
    pub id: i64,
    pub name: String,
}

pub fn song_link(field: &'static str, fragment: &str) -> Result<SongLink, ParseError> {
    let anchor = ANCHOR
        .captures(fragment)
        .ok_or_else(|| ParseError::MissingElement {
            field,
            element: "a",
            fragment: fragment.to_string(),
        })?;

    let href = HREF
        .captures(&anchor[1])
        .and_then(|c| c.get(1).or_else(|| c.get(2)))
        .map(|m| decode_entities(m.as_str()).into_owned())
        .ok_or_else(|| ParseError::MissingAttribute {
            field,
            attribute: "href",
            fragment: fragment.to_string(),
        })?;

    let segment = href
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or_default();

    let id = segment
        .parse::<i64>()
        .map_err(|_| ParseError::InvalidNumber {
            field,
            value: segment.to_string(),
        })?;

    Ok(SongLink {
        id,
        name: inner_text(&anchor[2]),
    })
}

/// Text of the first anchor if there is one, otherwise the whole fragment's text.
///
/// The overall rating comes wrapped in a link to the score on some responses and
/// as plain text on others.
pub fn anchor_or_text(fragment: &str) -> String {
    match ANCHOR.captures(fragment) {
        Some(anchor) => inner_text(&anchor[2]),
        None => inner_text(fragment),
    }
}

/// Judgement counts and accuracy from the wife score cell.
///
/// The cell is a `<div>` whose `title` tooltip lists `"Marvelous: 1489<br/>"`
/// style lines, wrapping a `<span>` with the accuracy (`"89.89%"`).
pub fn wife_score(field: &'static str, fragment: &str) -> Result<(Judgements, f64), ParseError> {
    let title = TITLE
        .captures(fragment)
        .and_then(|c| c.get(1).or_else(|| c.get(2)))
        .map(|m| decode_entities(m.as_str()).into_owned())
        .ok_or_else(|| ParseError::MissingAttribute {
            field,
            attribute: "title",
            fragment: fragment.to_string(),
        })?;

    let mut judgements = Judgements::default();

    for capture in JUDGEMENT.captures_iter(&title) {
        let count: u32 = capture[2]
            .parse()
            .map_err(|_| ParseError::InvalidNumber {
                field,
                value: capture[2].to_string(),
            })?;

        match capture[1].to_ascii_lowercase().as_str() {
            "marvelous" => judgements.marvelous = count,
            "perfect" => judgements.perfect = count,
            "great" => judgements.great = count,
            "good" => judgements.good = count,
            "bad" => judgements.bad = count,
            "miss" => judgements.miss = count,
            _ => {}
        }
    }

    let span = SPAN
        .captures(fragment)
        .ok_or_else(|| ParseError::MissingElement {
            field,
            element: "span",
            fragment: fragment.to_string(),
        })?;

    let text = inner_text(&span[1]);
    let percent = text.trim().trim_end_matches('%').trim();
    let accuracy = percent
        .parse::<f64>()
        .map_err(|_| ParseError::InvalidNumber {
            field,
            value: text.clone(),
        })?;

    Ok((judgements, accuracy))
}

/// Tag-stripped, entity-decoded text of a fragment.
pub fn inner_text(fragment: &str) -> String {
    let stripped = TAG.replace_all(fragment, "");
    decode_entities(&stripped).into_owned()
}

/// Decodes named entities and numeric references. Unknown entities are kept.
pub fn decode_entities(s: &str) -> Cow<'_, str> {
    html_escape::decode_html_entities(s)
}
