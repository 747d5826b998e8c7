use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::round::round_to_precision;

/// The eight skill categories the site rates players and scores on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Skillset {
    Overall,
    Stream,
    Jumpstream,
    Handstream,
    Stamina,
    JackSpeed,
    Chordjack,
    Technical,
}

impl Skillset {
    pub const ALL: [Skillset; 8] = [
        Skillset::Overall,
        Skillset::Stream,
        Skillset::Jumpstream,
        Skillset::Handstream,
        Skillset::Stamina,
        Skillset::JackSpeed,
        Skillset::Chordjack,
        Skillset::Technical,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Skillset::Overall => "Overall",
            Skillset::Stream => "Stream",
            Skillset::Jumpstream => "Jumpstream",
            Skillset::Handstream => "Handstream",
            Skillset::Stamina => "Stamina",
            Skillset::JackSpeed => "JackSpeed",
            Skillset::Chordjack => "Chordjack",
            Skillset::Technical => "Technical",
        }
    }
}

impl fmt::Display for Skillset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Skill ratings ("MSD"), either a player's or those achieved by one score.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Msd {
    pub overall: f64,
    pub stream: f64,
    pub jumpstream: f64,
    pub handstream: f64,
    pub stamina: f64,
    pub jack_speed: f64,
    pub chordjack: f64,
    pub technical: f64,
}

impl Msd {
    pub fn get(&self, skillset: Skillset) -> f64 {
        match skillset {
            Skillset::Overall => self.overall,
            Skillset::Stream => self.stream,
            Skillset::Jumpstream => self.jumpstream,
            Skillset::Handstream => self.handstream,
            Skillset::Stamina => self.stamina,
            Skillset::JackSpeed => self.jack_speed,
            Skillset::Chordjack => self.chordjack,
            Skillset::Technical => self.technical,
        }
    }

    pub fn set(&mut self, skillset: Skillset, value: f64) {
        let slot = match skillset {
            Skillset::Overall => &mut self.overall,
            Skillset::Stream => &mut self.stream,
            Skillset::Jumpstream => &mut self.jumpstream,
            Skillset::Handstream => &mut self.handstream,
            Skillset::Stamina => &mut self.stamina,
            Skillset::JackSpeed => &mut self.jack_speed,
            Skillset::Chordjack => &mut self.chordjack,
            Skillset::Technical => &mut self.technical,
        };
        *slot = value;
    }

    /// Every component rounded half-up to `precision` decimals.
    pub fn rounded(&self, precision: u32) -> Msd {
        self.map(|value| round_to_precision(value, precision))
    }

    /// Component-wise `self - other`, normalized to 2 decimals.
    pub fn diff(&self, other: &Msd) -> Msd {
        let mut out = Msd::default();
        for skillset in Skillset::ALL {
            out.set(
                skillset,
                round_to_precision(self.get(skillset) - other.get(skillset), 2),
            );
        }
        out
    }

    fn map(&self, f: impl Fn(f64) -> f64) -> Msd {
        let mut out = Msd::default();
        for skillset in Skillset::ALL {
            out.set(skillset, f(self.get(skillset)));
        }
        out
    }
}

/// Leaderboard position per skillset. 1 is best, 0 means unranked.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rank {
    pub overall: u32,
    pub stream: u32,
    pub jumpstream: u32,
    pub handstream: u32,
    pub stamina: u32,
    pub jack_speed: u32,
    pub chordjack: u32,
    pub technical: u32,
}

impl Rank {
    pub fn get(&self, skillset: Skillset) -> u32 {
        match skillset {
            Skillset::Overall => self.overall,
            Skillset::Stream => self.stream,
            Skillset::Jumpstream => self.jumpstream,
            Skillset::Handstream => self.handstream,
            Skillset::Stamina => self.stamina,
            Skillset::JackSpeed => self.jack_speed,
            Skillset::Chordjack => self.chordjack,
            Skillset::Technical => self.technical,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Judgements {
    pub marvelous: u32,
    pub perfect: u32,
    pub great: u32,
    pub good: u32,
    pub bad: u32,
    pub miss: u32,
}

/// A player profile.
///
/// `id` is only known after the profile page has been scraped (or recovered from
/// a score key suffix); the profile endpoints never return it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: Option<i64>,
    pub username: String,
    pub avatar: String,
    pub country_code: String,
    pub msd: Msd,
    pub rank: Rank,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Song {
    pub id: i64,
    pub name: String,
    pub artist: String,
    pub background: String,
    pub key: String,
}

/// A single recorded play.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Score {
    /// 41 character score key, without any user ID suffix.
    pub key: String,
    pub accuracy: f64,
    pub judgements: Judgements,
    pub rate: f64,
    pub max_combo: u32,
    pub mines_hit: u32,
    pub mods: String,
    pub valid: bool,
    pub date: NaiveDateTime,
    /// Site-adjusted overall rating used for leaderboard sorting.
    pub nerfed: f64,
    pub msd: Msd,
    pub song: Song,
    pub user: User,
}

/// Column the score list endpoint sorts by. The discriminants are the
/// ordinals the endpoint expects in `order[0][column]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortColumn {
    SongName = 0,
    Rate = 1,
    Overall = 2,
    Nerf = 3,
    Accuracy = 4,
    Date = 5,
    Stream = 6,
    Jumpstream = 7,
    Handstream = 8,
    Stamina = 9,
    JackSpeed = 10,
    Chordjack = 11,
    Technical = 12,
}

impl SortColumn {
    pub fn ordinal(self) -> u8 {
        self as u8
    }
}

impl std::str::FromStr for SortColumn {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let column = match s.to_ascii_lowercase().as_str() {
            "songname" | "song" | "name" => SortColumn::SongName,
            "rate" => SortColumn::Rate,
            "overall" => SortColumn::Overall,
            "nerf" => SortColumn::Nerf,
            "accuracy" | "acc" => SortColumn::Accuracy,
            "date" => SortColumn::Date,
            "stream" => SortColumn::Stream,
            "jumpstream" => SortColumn::Jumpstream,
            "handstream" => SortColumn::Handstream,
            "stamina" => SortColumn::Stamina,
            "jackspeed" => SortColumn::JackSpeed,
            "chordjack" => SortColumn::Chordjack,
            "technical" | "tech" => SortColumn::Technical,
            other => return Err(format!("unknown sort column '{}'", other)),
        };
        Ok(column)
    }
}

/// Parameters for one page of a user's score list.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreQuery {
    pub user_id: i64,
    /// Restricts results to songs matching this term.
    pub search: Option<String>,
    pub count: u32,
    pub offset: u32,
    pub sort: SortColumn,
    pub ascending: bool,
}

impl ScoreQuery {
    /// First 25 scores, newest first.
    pub fn new(user_id: i64) -> Self {
        Self {
            user_id,
            search: None,
            count: 25,
            offset: 0,
            sort: SortColumn::Date,
            ascending: false,
        }
    }

    pub fn search(mut self, term: impl Into<String>) -> Self {
        let term = term.into();
        self.search = if term.is_empty() { None } else { Some(term) };
        self
    }

    pub fn count(mut self, count: u32) -> Self {
        self.count = count;
        self
    }

    pub fn offset(mut self, offset: u32) -> Self {
        self.offset = offset;
        self
    }

    pub fn sort(mut self, sort: SortColumn, ascending: bool) -> Self {
        self.sort = sort;
        self.ascending = ascending;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sort_column_ordinals_are_stable() {
        assert_eq!(SortColumn::SongName.ordinal(), 0);
        assert_eq!(SortColumn::Nerf.ordinal(), 3);
        assert_eq!(SortColumn::Date.ordinal(), 5);
        assert_eq!(SortColumn::Technical.ordinal(), 12);
    }

    #[test]
    fn msd_diff_is_normalized() {
        let old = Msd {
            overall: 0.28,
            stream: 20.0,
            ..Default::default()
        };
        let new = Msd {
            overall: 0.29,
            stream: 20.15,
            ..Default::default()
        };

        let diff = new.diff(&old);

        assert_eq!(diff.overall, 0.01);
        assert_eq!(diff.stream, 0.15);
        assert_eq!(diff.technical, 0.0);
    }

    #[test]
    fn empty_search_term_is_dropped() {
        let query = ScoreQuery::new(7).search("");
        assert_eq!(query.search, None);

        let query = ScoreQuery::new(7).search("Bagpipe").count(50);
        assert_eq!(query.search.as_deref(), Some("Bagpipe"));
        assert_eq!(query.count, 50);
    }
}
