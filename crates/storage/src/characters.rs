use armory_core::d2s::SaveFile;
use armory_core::types::Character;
use armory_core::{CharacterStore, DomainError};
use async_trait::async_trait;
use mongodb::{bson::doc, Collection};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::classify;
use crate::CHARACTER_COLLECTION;

/// Stored shape of a character; `id` is the indexed lookup key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct CharacterDocument {
    id: String,
    d2s: SaveFile,
    lastparsed: bson::DateTime,
}

impl From<&Character> for CharacterDocument {
    fn from(character: &Character) -> Self {
        Self {
            id: character.id.clone(),
            d2s: character.d2s.clone(),
            lastparsed: bson::DateTime::from_chrono(character.last_parsed),
        }
    }
}

impl CharacterDocument {
    fn into_domain(self) -> Character {
        Character {
            id: self.id,
            d2s: self.d2s,
            last_parsed: self.lastparsed.to_chrono(),
        }
    }
}

/// Repository for the `character` collection.
#[derive(Clone)]
pub struct CharacterRepository {
    collection: Collection<CharacterDocument>,
}

impl CharacterRepository {
    pub(crate) fn new(database: &mongodb::Database) -> Self {
        Self {
            collection: database.collection(CHARACTER_COLLECTION),
        }
    }
}

#[async_trait]
impl CharacterStore for CharacterRepository {
    async fn find(&self, id: &str) -> Result<Character, DomainError> {
        self.collection
            .find_one(doc! { "id": id })
            .await
            .map_err(|err| classify(&err, "find character"))?
            .map(CharacterDocument::into_domain)
            .ok_or_else(|| DomainError::not_found(format!("character {id}")))
    }

    async fn update(&self, character: &Character) -> Result<(), DomainError> {
        let d2s = bson::to_bson(&character.d2s)
            .map_err(|err| DomainError::internal(format!("encode character save: {err}")))?;
        let change = doc! {
            "$set": {
                "d2s": d2s,
                "lastparsed": bson::DateTime::from_chrono(character.last_parsed),
            }
        };

        let result = self
            .collection
            .update_one(doc! { "id": character.id.as_str() }, change)
            .await
            .map_err(|err| classify(&err, "update character"))?;

        debug!(
            stage = "storage",
            id = %character.id,
            matched = result.matched_count,
            modified = result.modified_count,
            "character updated"
        );

        if result.matched_count == 0 {
            return Err(DomainError::not_found(format!("character {}", character.id)));
        }
        Ok(())
    }

    async fn store(&self, character: &Character) -> Result<(), DomainError> {
        self.collection
            .insert_one(CharacterDocument::from(character))
            .await
            .map_err(|err| classify(&err, "store character"))?;
        Ok(())
    }
}
