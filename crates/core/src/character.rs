use std::{
    sync::{Arc, LazyLock},
    time::Duration,
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use regex::Regex;

use crate::d2s::SaveFile;
use crate::error::DomainError;
use crate::types::Character;

/// Names must follow the in-game rules: letters with at most one `-` or `_` inside.
static NAME_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new("^[a-zA-Z]+[_-]?[a-zA-Z]+$").expect("character name pattern is valid")
});

pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Reads a character save file by name.
#[async_trait]
pub trait CharacterParser: Send + Sync {
    async fn parse(&self, name: &str) -> Result<SaveFile, DomainError>;
}

/// Persistence for parsed characters.
#[async_trait]
pub trait CharacterStore: Send + Sync {
    /// Returns [`DomainError::NotFound`] when the character was never stored.
    async fn find(&self, id: &str) -> Result<Character, DomainError>;
    async fn update(&self, character: &Character) -> Result<(), DomainError>;
    async fn store(&self, character: &Character) -> Result<(), DomainError>;
}

/// Where the returned character came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CharacterSource {
    /// Served from the database, still within the cache window.
    Cache,
    /// First parse, newly stored.
    Parsed,
    /// Re-parsed because the stored copy expired.
    Refreshed,
}

impl CharacterSource {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Cache => "cache",
            Self::Parsed => "parsed",
            Self::Refreshed => "refreshed",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CharacterLookup {
    pub character: Character,
    pub source: CharacterSource,
}

/// Serves characters from the database, re-reading the save file once the
/// stored copy is older than the cache duration.
#[derive(Clone)]
pub struct CharacterService {
    parser: Arc<dyn CharacterParser>,
    characters: Arc<dyn CharacterStore>,
    cache_duration: Duration,
    clock: Clock,
}

impl CharacterService {
    pub fn new(
        parser: Arc<dyn CharacterParser>,
        characters: Arc<dyn CharacterStore>,
        cache_duration: Duration,
    ) -> Self {
        Self {
            parser,
            characters,
            cache_duration,
            clock: Arc::new(Utc::now),
        }
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub async fn parse(&self, name: &str) -> Result<CharacterLookup, DomainError> {
        if !is_valid_name(name) {
            return Err(DomainError::invalid_argument(format!(
                "character name {name:?} is not allowed"
            )));
        }

        let cached = match self.characters.find(name).await {
            Ok(character) => character,
            Err(err) if err.is_not_found() => {
                let parsed = self.read(name).await?;
                self.characters.store(&parsed).await?;
                return Ok(CharacterLookup {
                    character: parsed,
                    source: CharacterSource::Parsed,
                });
            }
            Err(err) => return Err(err),
        };

        let now = (self.clock)();
        // A last_parsed in the future counts as fresh.
        let expired = (now - cached.last_parsed)
            .to_std()
            .map(|age| age >= self.cache_duration)
            .unwrap_or(false);

        if !expired {
            return Ok(CharacterLookup {
                character: cached,
                source: CharacterSource::Cache,
            });
        }

        let parsed = self.read(name).await?;
        self.characters.update(&parsed).await?;
        Ok(CharacterLookup {
            character: parsed,
            source: CharacterSource::Refreshed,
        })
    }

    async fn read(&self, name: &str) -> Result<Character, DomainError> {
        let d2s = self.parser.parse(name).await?;
        Ok(Character {
            id: name.to_string(),
            d2s,
            last_parsed: (self.clock)(),
        })
    }
}

pub fn is_valid_name(name: &str) -> bool {
    NAME_PATTERN.is_match(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::d2s::{Attributes, CharacterClass, CharacterStatus};
    use chrono::{Duration as ChronoDuration, TimeZone};
    use std::sync::Mutex;

    fn save_file(name: &str, level: u8) -> SaveFile {
        SaveFile {
            version: 96,
            file_size: 765,
            checksum: 0,
            active_weapon: 0,
            name: name.to_string(),
            status: CharacterStatus::default(),
            progression: 0,
            class: CharacterClass::Necromancer,
            level,
            last_played: 0,
            attributes: Attributes::default(),
            skills: Vec::new(),
        }
    }

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    struct StubParser {
        result: Result<SaveFile, DomainError>,
        calls: Mutex<u32>,
    }

    impl StubParser {
        fn returning(result: Result<SaveFile, DomainError>) -> Arc<Self> {
            Arc::new(Self {
                result,
                calls: Mutex::new(0),
            })
        }

        fn calls(&self) -> u32 {
            *self.calls.lock().unwrap()
        }
    }

    #[async_trait]
    impl CharacterParser for StubParser {
        async fn parse(&self, _name: &str) -> Result<SaveFile, DomainError> {
            *self.calls.lock().unwrap() += 1;
            self.result.clone()
        }
    }

    #[derive(Default)]
    struct StubStore {
        found: Option<Result<Character, DomainError>>,
        update_error: Option<DomainError>,
        stored: Mutex<Vec<Character>>,
        updated: Mutex<Vec<Character>>,
    }

    #[async_trait]
    impl CharacterStore for StubStore {
        async fn find(&self, id: &str) -> Result<Character, DomainError> {
            self.found
                .clone()
                .unwrap_or_else(|| Err(DomainError::not_found(id.to_string())))
        }

        async fn update(&self, character: &Character) -> Result<(), DomainError> {
            self.updated.lock().unwrap().push(character.clone());
            match &self.update_error {
                Some(err) => Err(err.clone()),
                None => Ok(()),
            }
        }

        async fn store(&self, character: &Character) -> Result<(), DomainError> {
            self.stored.lock().unwrap().push(character.clone());
            Ok(())
        }
    }

    fn service(parser: Arc<StubParser>, store: Arc<StubStore>) -> CharacterService {
        CharacterService::new(parser, store, Duration::from_secs(60))
            .with_clock(Arc::new(fixed_now))
    }

    fn stored_character(age: ChronoDuration) -> Character {
        Character {
            id: "nokka".into(),
            d2s: save_file("nokka", 10),
            last_parsed: fixed_now() - age,
        }
    }

    #[tokio::test]
    async fn stores_character_seen_for_the_first_time() {
        let parser = StubParser::returning(Ok(save_file("nokka", 42)));
        let store = Arc::new(StubStore::default());

        let lookup = service(parser.clone(), store.clone())
            .parse("nokka")
            .await
            .expect("parse succeeds");

        assert_eq!(lookup.source, CharacterSource::Parsed);
        assert_eq!(lookup.character.last_parsed, fixed_now());
        assert_eq!(parser.calls(), 1);
        let stored = store.stored.lock().unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].id, "nokka");
        assert!(store.updated.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn serves_fresh_character_from_store() {
        let parser = StubParser::returning(Ok(save_file("nokka", 42)));
        let store = Arc::new(StubStore {
            found: Some(Ok(stored_character(ChronoDuration::seconds(30)))),
            ..StubStore::default()
        });

        let lookup = service(parser.clone(), store.clone())
            .parse("nokka")
            .await
            .expect("parse succeeds");

        assert_eq!(lookup.source, CharacterSource::Cache);
        assert_eq!(lookup.character.d2s.level, 10);
        assert_eq!(parser.calls(), 0);
        assert!(store.updated.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn refreshes_expired_character() {
        let parser = StubParser::returning(Ok(save_file("nokka", 42)));
        let store = Arc::new(StubStore {
            found: Some(Ok(stored_character(ChronoDuration::seconds(60)))),
            ..StubStore::default()
        });

        let lookup = service(parser.clone(), store.clone())
            .parse("nokka")
            .await
            .expect("parse succeeds");

        assert_eq!(lookup.source, CharacterSource::Refreshed);
        assert_eq!(lookup.character.d2s.level, 42);
        assert_eq!(store.updated.lock().unwrap().len(), 1);
        assert!(store.stored.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn propagates_temporary_update_error() {
        let parser = StubParser::returning(Ok(save_file("nokka", 42)));
        let store = Arc::new(StubStore {
            found: Some(Ok(stored_character(ChronoDuration::minutes(5)))),
            update_error: Some(DomainError::Temporary("network timeout".into())),
            ..StubStore::default()
        });

        let err = service(parser, store.clone())
            .parse("nokka")
            .await
            .expect_err("update failure surfaces");

        assert!(err.is_temporary());
        assert_eq!(store.updated.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn rejects_invalid_names_before_touching_storage() {
        let parser = StubParser::returning(Ok(save_file("nokka", 42)));
        let store = Arc::new(StubStore::default());
        let svc = service(parser.clone(), store.clone());

        for name in ["", "a", "../etc/passwd", "nok_-ka", "nokka1", "_nokka"] {
            let err = svc.parse(name).await.expect_err("name is invalid");
            assert!(matches!(err, DomainError::InvalidArgument(_)), "{name}");
        }
        assert_eq!(parser.calls(), 0);
    }

    #[tokio::test]
    async fn does_not_store_when_save_file_is_missing() {
        let parser = StubParser::returning(Err(DomainError::not_found("no such file")));
        let store = Arc::new(StubStore::default());

        let err = service(parser, store.clone())
            .parse("nokka")
            .await
            .expect_err("missing file surfaces");

        assert!(err.is_not_found());
        assert!(store.stored.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn storage_failures_other_than_not_found_are_returned() {
        let parser = StubParser::returning(Ok(save_file("nokka", 42)));
        let store = Arc::new(StubStore {
            found: Some(Err(DomainError::Unavailable("no session".into()))),
            ..StubStore::default()
        });

        let err = service(parser.clone(), store).parse("nokka").await.unwrap_err();
        assert!(matches!(err, DomainError::Unavailable(_)));
        assert_eq!(parser.calls(), 0);
    }

    #[test]
    fn accepts_names_with_single_separator() {
        assert!(is_valid_name("nokka"));
        assert!(is_valid_name("nok-ka"));
        assert!(is_valid_name("nok_ka"));
        assert!(!is_valid_name("nok--ka"));
        assert!(!is_valid_name("nokka-"));
    }
}
