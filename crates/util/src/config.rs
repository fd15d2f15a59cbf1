use std::{env, fmt, net::SocketAddr, path::PathBuf, time::Duration};

use super::{env_non_empty, env_or, server_bind_address};

pub const DEFAULT_MONGO_HOST: &str = "mongodb:27017";
pub const DEFAULT_DATABASE: &str = "armory";
pub const DEFAULT_CACHE_DURATION: &str = "3m";
pub const DEFAULT_DB_USER: &str = "armory";
pub const DEFAULT_DB_PASSWORD: &str = "not_secure_at_all";
pub const DEFAULT_DB_ROLE: &str = "readWrite";

/// Application runtime environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
    Test,
}

impl Environment {
    fn from_str(value: &str) -> Result<Self, ConfigError> {
        match value {
            "development" | "dev" => Ok(Self::Development),
            "production" | "prod" => Ok(Self::Production),
            "test" => Ok(Self::Test),
            other => Err(ConfigError::InvalidEnvironment(other.to_string())),
        }
    }

    fn from_env() -> Result<Self, ConfigError> {
        Self::from_str(&env_or("APP_ENV", "development"))
    }

    /// Returns the canonical name used for logging/metrics labels.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Development => "development",
            Self::Production => "production",
            Self::Test => "test",
        }
    }
}

/// Connection parameters for the MongoDB deployment.
#[derive(Clone, PartialEq, Eq)]
pub struct MongoConfig {
    /// `host:port` of the server, without the `mongodb://` scheme.
    pub host: String,
    pub database: String,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Database the credential is defined on.
    pub auth_source: String,
}

impl MongoConfig {
    pub fn uri(&self) -> String {
        format!("mongodb://{}", self.host)
    }
}

impl fmt::Debug for MongoConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MongoConfig")
            .field("host", &self.host)
            .field("database", &self.database)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("auth_source", &self.auth_source)
            .finish()
    }
}

/// Basic auth credentials guarding statistics writes.
#[derive(Clone, PartialEq, Eq)]
pub struct StatisticsCredentials {
    pub user: String,
    pub password: String,
}

impl fmt::Debug for StatisticsCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StatisticsCredentials")
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Runtime configuration of the API server resolved from environment variables.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub environment: Environment,
    pub mongo: MongoConfig,
    /// Directory holding the `.d2s` character files.
    pub d2s_path: PathBuf,
    /// How long a parsed character is served from the database before it is re-read from disk.
    pub cache_duration: Duration,
    pub statistics_credentials: StatisticsCredentials,
    pub cors_enabled: bool,
}

impl AppConfig {
    /// Constructs the configuration by reading and validating environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let environment = Environment::from_env()?;
        let bind_addr = server_bind_address().map_err(ConfigError::BindAddress)?;

        let database = env_or("MONGO_DB", DEFAULT_DATABASE);
        let mongo = MongoConfig {
            host: env_or("MONGO_HOST", DEFAULT_MONGO_HOST),
            username: env_non_empty("MONGO_USERNAME"),
            password: env_non_empty("MONGO_PASSWORD"),
            auth_source: database.clone(),
            database,
        };

        let d2s_path = env_non_empty("D2S_PATH")
            .map(PathBuf::from)
            .ok_or(ConfigError::Missing("D2S_PATH"))?;

        let cache_raw = env_or("CACHE_DURATION", DEFAULT_CACHE_DURATION);
        let cache_duration = humantime::parse_duration(&cache_raw)
            .map_err(|err| ConfigError::InvalidDuration("CACHE_DURATION", err))?;

        let statistics_credentials = StatisticsCredentials {
            user: env_non_empty("STATISTICS_USER").ok_or(ConfigError::Missing("STATISTICS_USER"))?,
            password: env_non_empty("STATISTICS_PASSWORD")
                .ok_or(ConfigError::Missing("STATISTICS_PASSWORD"))?,
        };

        let cors_enabled = parse_bool("CORS_ENABLED", false)?;

        Ok(Self {
            bind_addr,
            environment,
            mongo,
            d2s_path,
            cache_duration,
            statistics_credentials,
            cors_enabled,
        })
    }
}

/// Configuration of the one-shot database bootstrap.
#[derive(Clone)]
pub struct BootstrapConfig {
    pub environment: Environment,
    /// Administrative connection; credentials authenticate against `admin`.
    pub mongo: MongoConfig,
    pub db_user: String,
    pub db_password: String,
    pub db_role: String,
}

impl BootstrapConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let environment = Environment::from_env()?;
        let mongo = MongoConfig {
            host: env_or("MONGO_HOST", DEFAULT_MONGO_HOST),
            database: env_or("MONGO_DB", DEFAULT_DATABASE),
            username: env_non_empty("MONGO_ADMIN_USERNAME"),
            password: env_non_empty("MONGO_ADMIN_PASSWORD"),
            auth_source: "admin".to_string(),
        };

        let db_user = env_or("ARMORY_DB_USER", DEFAULT_DB_USER);
        if db_user.is_empty() {
            return Err(ConfigError::Missing("ARMORY_DB_USER"));
        }
        let db_password = env_or("ARMORY_DB_PASSWORD", DEFAULT_DB_PASSWORD);
        if db_password.is_empty() {
            return Err(ConfigError::Missing("ARMORY_DB_PASSWORD"));
        }

        Ok(Self {
            environment,
            mongo,
            db_user,
            db_password,
            db_role: env_or("ARMORY_DB_ROLE", DEFAULT_DB_ROLE),
        })
    }
}

impl fmt::Debug for BootstrapConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BootstrapConfig")
            .field("environment", &self.environment)
            .field("mongo", &self.mongo)
            .field("db_user", &self.db_user)
            .field("db_password", &"<redacted>")
            .field("db_role", &self.db_role)
            .finish()
    }
}

fn parse_bool(key: &'static str, fallback: bool) -> Result<bool, ConfigError> {
    match env::var(key) {
        Err(_) => Ok(fallback),
        Ok(value) => match value.to_ascii_lowercase().as_str() {
            "1" | "t" | "true" => Ok(true),
            "0" | "f" | "false" => Ok(false),
            _ => Err(ConfigError::InvalidBool(key, value)),
        },
    }
}

/// Errors that can occur during configuration loading.
#[derive(Debug)]
pub enum ConfigError {
    InvalidEnvironment(String),
    BindAddress(std::net::AddrParseError),
    Missing(&'static str),
    InvalidDuration(&'static str, humantime::DurationError),
    InvalidBool(&'static str, String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidEnvironment(value) => write!(
                f,
                "APP_ENV must be one of 'development', 'production', or 'test' (got {value})"
            ),
            Self::BindAddress(err) => write!(f, "invalid APP_BIND_ADDR value: {err}"),
            Self::Missing(key) => write!(f, "{key} must be set"),
            Self::InvalidDuration(key, err) => write!(f, "invalid {key} value: {err}"),
            Self::InvalidBool(key, value) => {
                write!(f, "{key} must be a boolean (got {value})")
            }
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::ENV_GUARD;
    use crate::DEFAULT_BIND_ADDR;

    const APP_KEYS: &[&str] = &[
        "APP_ENV",
        "APP_BIND_ADDR",
        "MONGO_HOST",
        "MONGO_DB",
        "MONGO_USERNAME",
        "MONGO_PASSWORD",
        "D2S_PATH",
        "CACHE_DURATION",
        "STATISTICS_USER",
        "STATISTICS_PASSWORD",
        "CORS_ENABLED",
        "MONGO_ADMIN_USERNAME",
        "MONGO_ADMIN_PASSWORD",
        "ARMORY_DB_USER",
        "ARMORY_DB_PASSWORD",
        "ARMORY_DB_ROLE",
    ];

    fn clear_env() {
        for key in APP_KEYS {
            env::remove_var(key);
        }
    }

    fn set_required() {
        env::set_var("D2S_PATH", "/srv/d2s");
        env::set_var("STATISTICS_USER", "stats");
        env::set_var("STATISTICS_PASSWORD", "hunter2");
    }

    #[test]
    fn loads_defaults_in_development() {
        let _guard = ENV_GUARD.lock().expect("env guard poisoned");
        clear_env();
        set_required();

        let config = AppConfig::from_env().expect("config should load with defaults");
        assert_eq!(config.environment, Environment::Development);
        assert_eq!(config.bind_addr.to_string(), DEFAULT_BIND_ADDR);
        assert_eq!(config.mongo.uri(), "mongodb://mongodb:27017");
        assert_eq!(config.mongo.database, "armory");
        assert_eq!(config.mongo.auth_source, "armory");
        assert_eq!(config.mongo.username, None);
        assert_eq!(config.cache_duration, Duration::from_secs(180));
        assert_eq!(config.d2s_path, PathBuf::from("/srv/d2s"));
        assert!(!config.cors_enabled);

        clear_env();
    }

    #[test]
    fn rejects_invalid_environment() {
        let _guard = ENV_GUARD.lock().expect("env guard poisoned");
        clear_env();
        set_required();
        env::set_var("APP_ENV", "invalid");

        let err = AppConfig::from_env().expect_err("invalid env should error");
        assert!(matches!(err, ConfigError::InvalidEnvironment(value) if value == "invalid"));

        clear_env();
    }

    #[test]
    fn parses_production_overrides() {
        let _guard = ENV_GUARD.lock().expect("env guard poisoned");
        clear_env();
        set_required();
        env::set_var("APP_ENV", "production");
        env::set_var("APP_BIND_ADDR", "0.0.0.0:9000");
        env::set_var("MONGO_HOST", "db.internal:27018");
        env::set_var("MONGO_DB", "ladder");
        env::set_var("MONGO_USERNAME", "armory");
        env::set_var("MONGO_PASSWORD", "secret");
        env::set_var("CACHE_DURATION", "90s");
        env::set_var("CORS_ENABLED", "true");

        let config = AppConfig::from_env().expect("config should load");
        assert_eq!(config.environment, Environment::Production);
        assert_eq!(config.bind_addr.to_string(), "0.0.0.0:9000");
        assert_eq!(config.mongo.uri(), "mongodb://db.internal:27018");
        assert_eq!(config.mongo.auth_source, "ladder");
        assert_eq!(config.mongo.username.as_deref(), Some("armory"));
        assert_eq!(config.cache_duration, Duration::from_secs(90));
        assert!(config.cors_enabled);

        clear_env();
    }

    #[test]
    fn missing_required_values_are_reported() {
        let _guard = ENV_GUARD.lock().expect("env guard poisoned");
        clear_env();

        let err = AppConfig::from_env().expect_err("d2s path is required");
        assert!(matches!(err, ConfigError::Missing("D2S_PATH")));

        env::set_var("D2S_PATH", "/srv/d2s");
        env::set_var("STATISTICS_USER", "stats");
        let err = AppConfig::from_env().expect_err("statistics password is required");
        assert!(matches!(err, ConfigError::Missing("STATISTICS_PASSWORD")));

        clear_env();
    }

    #[test]
    fn rejects_malformed_duration_and_bool() {
        let _guard = ENV_GUARD.lock().expect("env guard poisoned");
        clear_env();
        set_required();

        env::set_var("CACHE_DURATION", "soon");
        let err = AppConfig::from_env().expect_err("duration must parse");
        assert!(matches!(err, ConfigError::InvalidDuration("CACHE_DURATION", _)));
        env::remove_var("CACHE_DURATION");

        env::set_var("CORS_ENABLED", "maybe");
        let err = AppConfig::from_env().expect_err("bool must parse");
        assert!(matches!(err, ConfigError::InvalidBool("CORS_ENABLED", ref v) if v == "maybe"));

        clear_env();
    }

    #[test]
    fn bootstrap_defaults_match_integration_setup() {
        let _guard = ENV_GUARD.lock().expect("env guard poisoned");
        clear_env();

        let config = BootstrapConfig::from_env().expect("bootstrap config loads");
        assert_eq!(config.mongo.database, "armory");
        assert_eq!(config.mongo.auth_source, "admin");
        assert_eq!(config.db_user, "armory");
        assert_eq!(config.db_password, "not_secure_at_all");
        assert_eq!(config.db_role, "readWrite");
        assert!(!format!("{config:?}").contains("not_secure_at_all"));
    }

    #[test]
    fn bootstrap_rejects_empty_user() {
        let _guard = ENV_GUARD.lock().expect("env guard poisoned");
        clear_env();
        env::set_var("ARMORY_DB_USER", "");

        let err = BootstrapConfig::from_env().expect_err("empty user is rejected");
        assert!(matches!(err, ConfigError::Missing("ARMORY_DB_USER")));

        clear_env();
    }
}
