use std::collections::BTreeMap;

use armory_core::types::{AreaStats, CharacterStatistics, Difficulty, StatisticsRequest, Stats};
use armory_core::{DomainError, StatisticsStore};
use async_trait::async_trait;
use mongodb::{
    bson::{doc, Document},
    Collection,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::classify;
use crate::STATISTICS_COLLECTION;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct StatisticsDocument {
    account: String,
    character: String,
    #[serde(default)]
    normal: StatsDocument,
    #[serde(default)]
    nightmare: StatsDocument,
    #[serde(default)]
    hell: StatsDocument,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
struct StatsDocument {
    total_kills: i64,
    total_unique_kills: i64,
    total_champ_kills: i64,
    special: BTreeMap<String, i64>,
    area: BTreeMap<String, AreaDocument>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
struct AreaDocument {
    kills: i64,
    time: i64,
    unique_kills: i64,
    champ_kills: i64,
}

/// `$inc` writes 64-bit integers; counters past `i64::MAX` saturate.
fn stored(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

/// Negative values only come from hand-edited documents and read as zero.
fn counter(value: i64) -> u64 {
    u64::try_from(value).unwrap_or_default()
}

impl From<Stats> for StatsDocument {
    fn from(stats: Stats) -> Self {
        Self {
            total_kills: stored(stats.total_kills),
            total_unique_kills: stored(stats.total_unique_kills),
            total_champ_kills: stored(stats.total_champ_kills),
            special: stats
                .special
                .into_iter()
                .map(|(monster, kills)| (monster, stored(kills)))
                .collect(),
            area: stats
                .area
                .into_iter()
                .map(|(name, area)| {
                    (
                        name,
                        AreaDocument {
                            kills: stored(area.kills),
                            time: stored(area.time),
                            unique_kills: stored(area.unique_kills),
                            champ_kills: stored(area.champ_kills),
                        },
                    )
                })
                .collect(),
        }
    }
}

impl From<StatsDocument> for Stats {
    fn from(document: StatsDocument) -> Self {
        Self {
            total_kills: counter(document.total_kills),
            total_unique_kills: counter(document.total_unique_kills),
            total_champ_kills: counter(document.total_champ_kills),
            special: document
                .special
                .into_iter()
                .map(|(monster, kills)| (monster, counter(kills)))
                .collect(),
            area: document
                .area
                .into_iter()
                .map(|(name, area)| {
                    (
                        name,
                        AreaStats {
                            kills: counter(area.kills),
                            time: counter(area.time),
                            unique_kills: counter(area.unique_kills),
                            champ_kills: counter(area.champ_kills),
                        },
                    )
                })
                .collect(),
        }
    }
}

impl StatisticsDocument {
    fn into_domain(self) -> CharacterStatistics {
        CharacterStatistics {
            account: self.account,
            character: self.character,
            normal: self.normal.into(),
            nightmare: self.nightmare.into(),
            hell: self.hell.into(),
        }
    }
}

/// Builds the `$inc` update adding one request to the stored counters.
fn increment_document(difficulty: Difficulty, request: &StatisticsRequest) -> Document {
    let prefix = difficulty.field();
    let mut values = Document::new();

    values.insert(format!("{prefix}.total_kills"), stored(request.total_kills));
    values.insert(
        format!("{prefix}.total_unique_kills"),
        stored(request.total_unique_kills),
    );
    values.insert(
        format!("{prefix}.total_champ_kills"),
        stored(request.total_champ_kills),
    );

    for (monster, kills) in &request.special {
        values.insert(format!("{prefix}.special.{monster}"), stored(*kills));
    }

    for (area, stats) in &request.area {
        values.insert(format!("{prefix}.area.{area}.kills"), stored(stats.kills));
        values.insert(format!("{prefix}.area.{area}.time"), stored(stats.time));
        values.insert(
            format!("{prefix}.area.{area}.unique_kills"),
            stored(stats.unique_kills),
        );
        values.insert(
            format!("{prefix}.area.{area}.champ_kills"),
            stored(stats.champ_kills),
        );
    }

    doc! { "$inc": values }
}

/// First document for a character; every difficulty carries explicit empty maps.
fn initial_document(difficulty: Difficulty, request: &StatisticsRequest) -> StatisticsDocument {
    let mut statistics = CharacterStatistics::new(&request.account, &request.character);
    *statistics.stats_mut(difficulty) = Stats::from(request);

    StatisticsDocument {
        account: statistics.account,
        character: statistics.character,
        normal: statistics.normal.into(),
        nightmare: statistics.nightmare.into(),
        hell: statistics.hell.into(),
    }
}

/// Repository for the `statistics` collection.
#[derive(Clone)]
pub struct StatisticsRepository {
    collection: Collection<StatisticsDocument>,
}

impl StatisticsRepository {
    pub(crate) fn new(database: &mongodb::Database) -> Self {
        Self {
            collection: database.collection(STATISTICS_COLLECTION),
        }
    }
}

#[async_trait]
impl StatisticsStore for StatisticsRepository {
    async fn get_by_character(&self, character: &str) -> Result<CharacterStatistics, DomainError> {
        self.collection
            .find_one(doc! { "character": character })
            .await
            .map_err(|err| classify(&err, "find statistics"))?
            .map(StatisticsDocument::into_domain)
            .ok_or_else(|| DomainError::not_found(format!("statistics for {character}")))
    }

    async fn upsert(
        &self,
        difficulty: Difficulty,
        request: &StatisticsRequest,
    ) -> Result<(), DomainError> {
        let result = self
            .collection
            .update_one(
                doc! { "character": request.character.as_str() },
                increment_document(difficulty, request),
            )
            .await
            .map_err(|err| classify(&err, "increment statistics"))?;

        if result.matched_count > 0 {
            return Ok(());
        }

        debug!(
            stage = "storage",
            character = %request.character,
            difficulty = %difficulty,
            "first statistics for character, inserting"
        );
        self.collection
            .insert_one(initial_document(difficulty, request))
            .await
            .map_err(|err| classify(&err, "store statistics"))?;
        Ok(())
    }

    async fn delete(&self, character: &str) -> Result<(), DomainError> {
        self.collection
            .delete_one(doc! { "character": character })
            .await
            .map_err(|err| classify(&err, "delete statistics"))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> StatisticsRequest {
        let mut request = StatisticsRequest {
            account: "nokka".into(),
            character: "nokkasorc".into(),
            difficulty: "Nightmare".into(),
            total_kills: 120,
            total_unique_kills: 4,
            total_champ_kills: 9,
            ..StatisticsRequest::default()
        };
        request.special.insert("Duriel".into(), 2);
        request.area.insert(
            "Tal Rasha's Tomb".into(),
            AreaStats {
                kills: 30,
                time: 240,
                unique_kills: 1,
                champ_kills: 3,
            },
        );
        request
    }

    #[test]
    fn increment_targets_difficulty_paths() {
        let update = increment_document(Difficulty::Nightmare, &request());
        let inc = update.get_document("$inc").expect("$inc");

        assert_eq!(inc.get_i64("nightmare.total_kills").ok(), Some(120));
        assert_eq!(inc.get_i64("nightmare.total_unique_kills").ok(), Some(4));
        assert_eq!(inc.get_i64("nightmare.total_champ_kills").ok(), Some(9));
        assert_eq!(inc.get_i64("nightmare.special.Duriel").ok(), Some(2));
        assert_eq!(inc.get_i64("nightmare.area.Tal Rasha's Tomb.time").ok(), Some(240));
        assert_eq!(inc.get_i64("nightmare.area.Tal Rasha's Tomb.unique_kills").ok(), Some(1));
        assert_eq!(inc.get_i64("nightmare.area.Tal Rasha's Tomb.champ_kills").ok(), Some(3));
        assert_eq!(inc.len(), 3 + 1 + 4);
        assert!(inc.keys().all(|key| key.starts_with("nightmare.")));
    }

    #[test]
    fn initial_document_fills_only_reported_difficulty() {
        let document = initial_document(Difficulty::Nightmare, &request());

        assert_eq!(document.character, "nokkasorc");
        assert_eq!(document.nightmare.total_kills, 120);
        assert_eq!(document.nightmare.area["Tal Rasha's Tomb"].time, 240);
        assert_eq!(document.normal, StatsDocument::default());
        assert_eq!(document.hell, StatsDocument::default());

        let encoded = bson::to_document(&document).expect("encode");
        let hell = encoded.get_document("hell").expect("hell");
        assert!(hell.get_document("special").expect("special").is_empty());
        assert!(hell.get_document("area").expect("area").is_empty());
        let area = encoded
            .get_document("nightmare")
            .and_then(|stats| stats.get_document("area"))
            .and_then(|areas| areas.get_document("Tal Rasha's Tomb"))
            .expect("area document");
        assert!(area.contains_key("unique_kills"));
        assert!(!area.contains_key("uniquekills"));
    }

    #[test]
    fn stored_document_maps_to_domain() {
        let encoded = doc! {
            "_id": 1,
            "account": "nokka",
            "character": "nokkasorc",
            "hell": {
                "total_kills": 7_i64,
                "special": { "Baal": 1_i64 },
                "area": {
                    "Chaos Sanctuary": {
                        "kills": 5_i64,
                        "time": 60_i64,
                        "unique_kills": 1_i64,
                        "champ_kills": 0_i64,
                    },
                },
            },
        };

        let statistics = bson::from_document::<StatisticsDocument>(encoded)
            .expect("decode")
            .into_domain();

        assert_eq!(statistics.hell.total_kills, 7);
        assert_eq!(statistics.hell.special["Baal"], 1);
        assert_eq!(statistics.hell.area["Chaos Sanctuary"].unique_kills, 1);
        assert_eq!(statistics.normal, Stats::default());
    }

    #[test]
    fn counters_beyond_u32_decode() {
        let encoded = doc! {
            "account": "nokka",
            "character": "nokkasorc",
            "hell": {
                "total_kills": (i64::from(u32::MAX) + 1),
                "area": { "Worldstone Keep": { "time": 5_000_000_000_i64 } },
            },
        };

        let statistics = bson::from_document::<StatisticsDocument>(encoded)
            .expect("decode")
            .into_domain();

        assert_eq!(statistics.hell.total_kills, u64::from(u32::MAX) + 1);
        assert_eq!(statistics.hell.area["Worldstone Keep"].time, 5_000_000_000);
    }

    #[test]
    fn oversized_increments_saturate() {
        let mut request = request();
        request.total_kills = u64::MAX;

        let update = increment_document(Difficulty::Hell, &request);
        let inc = update.get_document("$inc").expect("$inc");
        assert_eq!(inc.get_i64("hell.total_kills").ok(), Some(i64::MAX));

        let negative = StatsDocument {
            total_kills: -3,
            ..StatsDocument::default()
        };
        assert_eq!(Stats::from(negative).total_kills, 0);
    }
}
