use std::{collections::BTreeMap, fmt};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::d2s::SaveFile;

/// A parsed Diablo II character as served by the API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Character {
    #[serde(rename = "d2s_id")]
    pub id: String,
    pub d2s: SaveFile,
    pub last_parsed: DateTime<Utc>,
}

/// Game difficulty; statistics are tracked separately for each one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Difficulty {
    Normal,
    Nightmare,
    Hell,
}

impl Difficulty {
    pub const ALL: [Difficulty; 3] = [Self::Normal, Self::Nightmare, Self::Hell];

    /// Parses the label used by statistics producers (`Normal`, `Nightmare`, `Hell`).
    pub fn from_label(value: &str) -> Option<Self> {
        match value {
            "Normal" => Some(Self::Normal),
            "Nightmare" => Some(Self::Nightmare),
            "Hell" => Some(Self::Hell),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Normal => "Normal",
            Self::Nightmare => "Nightmare",
            Self::Hell => "Hell",
        }
    }

    /// Name of the embedded document holding this difficulty's stats.
    pub fn field(self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Nightmare => "nightmare",
            Self::Hell => "hell",
        }
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One statistics report as posted by the game server.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatisticsRequest {
    pub account: String,
    pub character: String,
    pub difficulty: String,
    #[serde(rename = "totalkills")]
    pub total_kills: u64,
    #[serde(rename = "totaluniquekills")]
    pub total_unique_kills: u64,
    #[serde(rename = "totalchampkills")]
    pub total_champ_kills: u64,
    pub special: BTreeMap<String, u64>,
    pub area: BTreeMap<String, AreaStats>,
}

/// Aggregated statistics for one character.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CharacterStatistics {
    pub account: String,
    pub character: String,
    pub normal: Stats,
    pub nightmare: Stats,
    pub hell: Stats,
}

impl CharacterStatistics {
    pub fn new(account: impl Into<String>, character: impl Into<String>) -> Self {
        Self {
            account: account.into(),
            character: character.into(),
            ..Self::default()
        }
    }

    pub fn stats(&self, difficulty: Difficulty) -> &Stats {
        match difficulty {
            Difficulty::Normal => &self.normal,
            Difficulty::Nightmare => &self.nightmare,
            Difficulty::Hell => &self.hell,
        }
    }

    pub fn stats_mut(&mut self, difficulty: Difficulty) -> &mut Stats {
        match difficulty {
            Difficulty::Normal => &mut self.normal,
            Difficulty::Nightmare => &mut self.nightmare,
            Difficulty::Hell => &mut self.hell,
        }
    }
}

/// Counters kept per difficulty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Stats {
    pub total_kills: u64,
    pub total_unique_kills: u64,
    pub total_champ_kills: u64,
    pub special: BTreeMap<String, u64>,
    pub area: BTreeMap<String, AreaStats>,
}

impl From<&StatisticsRequest> for Stats {
    fn from(request: &StatisticsRequest) -> Self {
        Self {
            total_kills: request.total_kills,
            total_unique_kills: request.total_unique_kills,
            total_champ_kills: request.total_champ_kills,
            special: request.special.clone(),
            area: request.area.clone(),
        }
    }
}

/// Counters for a single area.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AreaStats {
    pub kills: u64,
    /// Seconds spent in the area.
    pub time: u64,
    #[serde(rename = "uniquekills")]
    pub unique_kills: u64,
    #[serde(rename = "champkills")]
    pub champ_kills: u64,
}
