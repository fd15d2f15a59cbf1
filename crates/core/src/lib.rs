//! Domain layer of the armory: characters parsed from save files and the
//! kill statistics reported by game servers.

pub mod character;
pub mod d2s;
pub mod error;
pub mod parser;
pub mod statistics;
pub mod types;

pub use character::{
    CharacterLookup, CharacterParser, CharacterService, CharacterSource, CharacterStore,
};
pub use error::DomainError;
pub use parser::DiskParser;
pub use statistics::{StatisticsService, StatisticsStore};
