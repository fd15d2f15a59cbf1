//! One-shot provisioning of the armory database.
//!
//! Creates the application user, the `character` and `statistics`
//! collections and their lookup indexes. The run is not idempotent: a second
//! invocation fails on the existing user and exits non-zero.

use std::process::ExitCode;

use armory_storage::{
    BootstrapError, BootstrapPlan, BootstrapSettings, ConnectionSettings, Database, Secret,
    StorageError, DEFAULT_SERVER_SELECTION_TIMEOUT,
};
use armory_util::{load_env_file, telemetry::TryInitError, BootstrapConfig, ConfigError};
use clap::Parser;
use thiserror::Error;
use tracing::{error, info, warn};

/// Provision the armory MongoDB database.
#[derive(Debug, Parser)]
#[command(name = "armory-bootstrap", version)]
struct Args {
    /// Compare the live database with the plan instead of applying it
    #[arg(long, conflicts_with = "dry_run")]
    verify: bool,

    /// Print the plan without connecting to MongoDB
    #[arg(long)]
    dry_run: bool,
}

#[derive(Debug, Error)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("failed to initialize tracing: {0}")]
    Tracing(#[from] TryInitError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Bootstrap(#[from] BootstrapError),
    #[error("database layout differs from the plan in {0} place(s)")]
    Layout(usize),
}

#[tokio::main]
async fn main() -> ExitCode {
    load_env_file();
    let args = Args::parse();

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(CliError::Config(err)) => {
            eprintln!("armory-bootstrap: {err}");
            ExitCode::FAILURE
        }
        Err(err) => {
            error!(stage = "bootstrap", error = %err, "bootstrap failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<(), CliError> {
    let config = BootstrapConfig::from_env()?;
    armory_util::init_tracing(config.environment)?;

    let plan = BootstrapPlan::armory(&plan_settings(&config));

    if args.dry_run {
        for (index, step) in plan.steps().iter().enumerate() {
            println!("{}. {step}", index + 1);
        }
        return Ok(());
    }

    info!(
        stage = "bootstrap",
        host = %config.mongo.host,
        database = plan.database(),
        verify = args.verify,
        "connecting to mongodb"
    );
    let database = Database::connect(&connection_settings(&config)).await?;
    database.ping().await?;
    let bootstrapper = database.bootstrapper();

    if args.verify {
        let layout = bootstrapper.inspect(plan.database()).await?;
        let mismatches = plan.verify(&layout);
        for mismatch in &mismatches {
            warn!(stage = "bootstrap", database = plan.database(), "{mismatch}");
        }
        if !mismatches.is_empty() {
            return Err(CliError::Layout(mismatches.len()));
        }
        info!(stage = "bootstrap", database = plan.database(), "layout matches plan");
        return Ok(());
    }

    bootstrapper.run(&plan).await?;
    Ok(())
}

fn plan_settings(config: &BootstrapConfig) -> BootstrapSettings {
    BootstrapSettings {
        database: config.mongo.database.clone(),
        username: config.db_user.clone(),
        password: Secret::new(config.db_password.clone()),
        role: config.db_role.clone(),
    }
}

fn connection_settings(config: &BootstrapConfig) -> ConnectionSettings {
    ConnectionSettings {
        uri: config.mongo.uri(),
        database: config.mongo.database.clone(),
        username: config.mongo.username.clone(),
        password: config.mongo.password.clone(),
        auth_source: config.mongo.auth_source.clone(),
        app_name: "armory-bootstrap".to_string(),
        server_selection_timeout: DEFAULT_SERVER_SELECTION_TIMEOUT,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use armory_util::{Environment, MongoConfig};

    fn config() -> BootstrapConfig {
        BootstrapConfig {
            environment: Environment::Test,
            mongo: MongoConfig {
                host: "mongodb:27017".into(),
                database: "armory".into(),
                username: Some("root".into()),
                password: Some("root-pass".into()),
                auth_source: "admin".into(),
            },
            db_user: "armory".into(),
            db_password: "not_secure_at_all".into(),
            db_role: "readWrite".into(),
        }
    }

    #[test]
    fn default_config_yields_canonical_plan() {
        let plan = BootstrapPlan::armory(&plan_settings(&config()));
        assert_eq!(plan, BootstrapPlan::armory(&BootstrapSettings::default()));
    }

    #[test]
    fn admin_connection_authenticates_against_admin() {
        let settings = connection_settings(&config());
        assert_eq!(settings.uri, "mongodb://mongodb:27017");
        assert_eq!(settings.auth_source, "admin");
        assert_eq!(settings.username.as_deref(), Some("root"));
        assert_eq!(settings.server_selection_timeout, DEFAULT_SERVER_SELECTION_TIMEOUT);
    }

    #[test]
    fn verify_and_dry_run_are_exclusive() {
        assert!(Args::try_parse_from(["armory-bootstrap", "--verify", "--dry-run"]).is_err());

        let args = Args::try_parse_from(["armory-bootstrap", "--verify"]).expect("verify parses");
        assert!(args.verify);
        assert!(!args.dry_run);
    }
}
