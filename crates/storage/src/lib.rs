pub mod bootstrap;
mod characters;
mod error;
mod statistics;

use std::{fmt, time::Duration};

use mongodb::{
    bson::doc,
    options::{ClientOptions, Credential},
    Client,
};
use thiserror::Error;

pub use bootstrap::{
    BootstrapError, BootstrapPlan, BootstrapSettings, BootstrapStep, Bootstrapper, DatabaseLayout,
    LayoutMismatch, Secret,
};
pub use characters::CharacterRepository;
pub use error::classify;
pub use statistics::StatisticsRepository;

/// Collection holding parsed characters, keyed by `id`.
pub const CHARACTER_COLLECTION: &str = "character";
/// Collection holding aggregated statistics, keyed by `character`.
pub const STATISTICS_COLLECTION: &str = "statistics";

pub const DEFAULT_SERVER_SELECTION_TIMEOUT: Duration = Duration::from_secs(30);

/// Parameters used to build a MongoDB client.
#[derive(Clone)]
pub struct ConnectionSettings {
    /// Full connection string, including the `mongodb://` scheme.
    pub uri: String,
    pub database: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub auth_source: String,
    pub app_name: String,
    pub server_selection_timeout: Duration,
}

impl fmt::Debug for ConnectionSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionSettings")
            .field("uri", &self.uri)
            .field("database", &self.database)
            .field("username", &self.username)
            .field("auth_source", &self.auth_source)
            .field("app_name", &self.app_name)
            .field("server_selection_timeout", &self.server_selection_timeout)
            .finish_non_exhaustive()
    }
}

/// Top-level database handle that owns the MongoDB client.
///
/// The client pools connections internally, so the handle is cheap to clone.
#[derive(Clone)]
pub struct Database {
    client: Client,
    name: String,
}

impl Database {
    /// Builds a client for the provided settings.
    ///
    /// No connection is made until the first operation; use [`Database::ping`]
    /// to verify the deployment is reachable.
    pub async fn connect(settings: &ConnectionSettings) -> Result<Self, StorageError> {
        let mut options = ClientOptions::parse(settings.uri.as_str())
            .await
            .map_err(StorageError::Options)?;
        options.app_name = Some(settings.app_name.clone());
        options.server_selection_timeout = Some(settings.server_selection_timeout);

        if let Some(username) = &settings.username {
            options.credential = Some(
                Credential::builder()
                    .username(username.clone())
                    .password(settings.password.clone())
                    .source(settings.auth_source.clone())
                    .build(),
            );
        }

        let client = Client::with_options(options).map_err(StorageError::Client)?;
        Ok(Self {
            client,
            name: settings.database.clone(),
        })
    }

    /// Round-trips a `ping` command against the configured database.
    pub async fn ping(&self) -> Result<(), StorageError> {
        self.client
            .database(&self.name)
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(StorageError::Ping)?;
        Ok(())
    }

    /// Returns a handle to interact with the character collection.
    pub fn characters(&self) -> CharacterRepository {
        CharacterRepository::new(&self.client.database(&self.name))
    }

    /// Returns a handle to interact with the statistics collection.
    pub fn statistics(&self) -> StatisticsRepository {
        StatisticsRepository::new(&self.client.database(&self.name))
    }

    /// Returns an executor for bootstrap plans sharing this client.
    pub fn bootstrapper(&self) -> Bootstrapper {
        Bootstrapper::new(self.client.clone())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Exposes the inner client when lower level access is required.
    pub fn client(&self) -> &Client {
        &self.client
    }
}

/// General storage level errors.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("invalid mongodb connection string: {0}")]
    Options(mongodb::error::Error),
    #[error("failed to create mongodb client: {0}")]
    Client(mongodb::error::Error),
    #[error("failed to ping mongodb: {0}")]
    Ping(mongodb::error::Error),
}
