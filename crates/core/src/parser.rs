use std::{io::ErrorKind, path::PathBuf};

use async_trait::async_trait;

use crate::character::CharacterParser;
use crate::d2s::{self, SaveFile};
use crate::error::DomainError;

/// Reads `.d2s` files from a directory, one file per character name.
#[derive(Debug, Clone)]
pub struct DiskParser {
    root: PathBuf,
}

impl DiskParser {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl CharacterParser for DiskParser {
    async fn parse(&self, name: &str) -> Result<SaveFile, DomainError> {
        let path = self.root.join(name);
        let data = tokio::fs::read(&path).await.map_err(|err| match err.kind() {
            ErrorKind::NotFound => {
                DomainError::not_found(format!("character binary {name} does not exist"))
            }
            _ => DomainError::internal(format!("failed to read {}: {err}", path.display())),
        })?;

        d2s::decode(&data)
            .map_err(|err| DomainError::internal(format!("binary parse error: {err}")))
    }
}
