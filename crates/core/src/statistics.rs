use std::{collections::BTreeMap, sync::Arc};

use async_trait::async_trait;

use crate::error::DomainError;
use crate::types::{AreaStats, CharacterStatistics, Difficulty, StatisticsRequest};

/// Upper bound on areas and special monsters returned per difficulty.
pub const MAX_DATA_POINTS: usize = 8;

/// Persistence for aggregated statistics.
#[async_trait]
pub trait StatisticsStore: Send + Sync {
    /// Returns [`DomainError::NotFound`] when no statistics exist for the character.
    async fn get_by_character(&self, character: &str) -> Result<CharacterStatistics, DomainError>;
    /// Adds the request's counters to the stored document, creating it when missing.
    async fn upsert(
        &self,
        difficulty: Difficulty,
        request: &StatisticsRequest,
    ) -> Result<(), DomainError>;
    async fn delete(&self, character: &str) -> Result<(), DomainError>;
}

#[derive(Clone)]
pub struct StatisticsService {
    repository: Arc<dyn StatisticsStore>,
}

impl StatisticsService {
    pub fn new(repository: Arc<dyn StatisticsStore>) -> Self {
        Self { repository }
    }

    /// Returns the character's statistics trimmed to the most relevant entries.
    pub async fn get_character(&self, character: &str) -> Result<CharacterStatistics, DomainError> {
        let mut stats = self.repository.get_by_character(character).await?;

        for difficulty in Difficulty::ALL {
            let entry = stats.stats_mut(difficulty);
            if entry.area.len() > MAX_DATA_POINTS {
                entry.area = top_areas(&entry.area);
            }
            if entry.special.len() > MAX_DATA_POINTS {
                entry.special = top_specials(&entry.special);
            }
        }

        Ok(stats)
    }

    /// Validates and stores every request in order, stopping at the first failure.
    pub async fn parse(&self, requests: Vec<StatisticsRequest>) -> Result<(), DomainError> {
        for mut request in requests {
            let difficulty = Difficulty::from_label(&request.difficulty).ok_or_else(|| {
                DomainError::request(format!(
                    "difficulty {} supplied for character {}",
                    request.difficulty, request.character
                ))
            })?;
            validate_keys(&request)?;

            request.account = request.account.to_lowercase();
            request.character = request.character.to_lowercase();

            self.repository.upsert(difficulty, &request).await?;
        }

        Ok(())
    }

    pub async fn delete_stats(&self, character: &str) -> Result<(), DomainError> {
        if character.chars().count() < 2 {
            return Err(DomainError::invalid_argument(
                "character name needs a length of at least 2",
            ));
        }
        self.repository.delete(&character.to_lowercase()).await
    }
}

/// Keys end up in dotted update paths, so they must be plain field names.
fn validate_keys(request: &StatisticsRequest) -> Result<(), DomainError> {
    let keys = request.special.keys().chain(request.area.keys());
    for key in keys {
        if key.is_empty() || key.contains('.') || key.starts_with('$') {
            return Err(DomainError::request(format!(
                "invalid statistics key {key:?} for character {}",
                request.character
            )));
        }
    }
    Ok(())
}

/// Keeps the areas with the most time spent; ties keep name order.
fn top_areas(areas: &BTreeMap<String, AreaStats>) -> BTreeMap<String, AreaStats> {
    let mut ranked: Vec<_> = areas.iter().collect();
    ranked.sort_by(|a, b| b.1.time.cmp(&a.1.time));
    ranked
        .into_iter()
        .take(MAX_DATA_POINTS)
        .map(|(name, stats)| (name.clone(), *stats))
        .collect()
}

/// Keeps the most killed special monsters; ties keep name order.
fn top_specials(monsters: &BTreeMap<String, u64>) -> BTreeMap<String, u64> {
    let mut ranked: Vec<_> = monsters.iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(a.1));
    ranked
        .into_iter()
        .take(MAX_DATA_POINTS)
        .map(|(name, kills)| (name.clone(), *kills))
        .collect()
}
