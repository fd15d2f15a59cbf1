//! One-shot provisioning of the armory database: application user,
//! collections and lookup indexes.
//!
//! A plan is plain data so it can be printed, verified against a live
//! layout, or executed. Execution is strictly sequential and stops at the
//! first failure; running a plan twice fails on the user step.

use std::{collections::BTreeMap, fmt};

use futures::TryStreamExt;
use mongodb::{
    bson::{doc, Bson, Document},
    Client, IndexModel,
};
use thiserror::Error;
use tracing::info;

use crate::{CHARACTER_COLLECTION, STATISTICS_COLLECTION};

pub const DEFAULT_DATABASE: &str = "armory";
pub const DEFAULT_USER: &str = "armory";
pub const DEFAULT_PASSWORD: &str = "not_secure_at_all";
pub const DEFAULT_ROLE: &str = "readWrite";

/// Password wrapper that never prints its contents.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(***)")
    }
}

/// Inputs of the armory plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootstrapSettings {
    pub database: String,
    pub username: String,
    pub password: Secret,
    pub role: String,
}

impl Default for BootstrapSettings {
    fn default() -> Self {
        Self {
            database: DEFAULT_DATABASE.to_string(),
            username: DEFAULT_USER.to_string(),
            password: Secret::new(DEFAULT_PASSWORD),
            role: DEFAULT_ROLE.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BootstrapStep {
    CreateUser {
        name: String,
        password: Secret,
        role: String,
    },
    CreateCollection {
        name: String,
    },
    CreateIndex {
        collection: String,
        field: String,
    },
}

impl BootstrapStep {
    pub fn describe(&self) -> String {
        match self {
            Self::CreateUser { name, role, .. } => format!("create user {name} with role {role}"),
            Self::CreateCollection { name } => format!("create collection {name}"),
            Self::CreateIndex { collection, field } => {
                format!("create ascending index on {collection}.{field}")
            }
        }
    }
}

impl fmt::Display for BootstrapStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.describe())
    }
}

/// `createUser` command granting `role` on `database`.
pub fn create_user_command(
    name: &str,
    password: &Secret,
    role: &str,
    database: &str,
) -> Document {
    doc! {
        "createUser": name,
        "pwd": password.expose(),
        "roles": [ { "role": role, "db": database } ],
    }
}

/// Single-field ascending, non-unique index.
pub fn ascending_index(field: &str) -> IndexModel {
    let mut keys = Document::new();
    keys.insert(field, 1);
    IndexModel::builder().keys(keys).build()
}

/// Ordered provisioning steps against one database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootstrapPlan {
    database: String,
    steps: Vec<BootstrapStep>,
}

impl BootstrapPlan {
    pub fn new(database: impl Into<String>, steps: Vec<BootstrapStep>) -> Self {
        Self {
            database: database.into(),
            steps,
        }
    }

    /// User, `character` and `statistics` collections, then their lookup indexes.
    pub fn armory(settings: &BootstrapSettings) -> Self {
        Self::new(
            settings.database.clone(),
            vec![
                BootstrapStep::CreateUser {
                    name: settings.username.clone(),
                    password: settings.password.clone(),
                    role: settings.role.clone(),
                },
                BootstrapStep::CreateCollection {
                    name: CHARACTER_COLLECTION.to_string(),
                },
                BootstrapStep::CreateCollection {
                    name: STATISTICS_COLLECTION.to_string(),
                },
                BootstrapStep::CreateIndex {
                    collection: CHARACTER_COLLECTION.to_string(),
                    field: "id".to_string(),
                },
                BootstrapStep::CreateIndex {
                    collection: STATISTICS_COLLECTION.to_string(),
                    field: "character".to_string(),
                },
            ],
        )
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    pub fn steps(&self) -> &[BootstrapStep] {
        &self.steps
    }

    /// Compares a live layout with the state this plan produces.
    ///
    /// `system.*` collections are ignored. Each planned collection must carry
    /// exactly the planned ascending indexes besides `_id`.
    pub fn verify(&self, layout: &DatabaseLayout) -> Vec<LayoutMismatch> {
        let mut expected: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
        for step in &self.steps {
            match step {
                BootstrapStep::CreateCollection { name } => {
                    expected.entry(name.as_str()).or_default();
                }
                BootstrapStep::CreateIndex { collection, field } => {
                    expected
                        .entry(collection.as_str())
                        .or_default()
                        .push(field.as_str());
                }
                BootstrapStep::CreateUser { .. } => {}
            }
        }

        let mut mismatches = Vec::new();

        for (collection, fields) in &expected {
            let Some(indexes) = layout.collections.get(*collection) else {
                mismatches.push(LayoutMismatch::MissingCollection(collection.to_string()));
                continue;
            };

            if indexes.len() != fields.len() {
                mismatches.push(LayoutMismatch::IndexCount {
                    collection: collection.to_string(),
                    expected: fields.len(),
                    actual: indexes.len(),
                });
            }

            for field in fields {
                if !indexes.iter().any(|keys| is_ascending_on(keys, field)) {
                    mismatches.push(LayoutMismatch::MissingIndex {
                        collection: collection.to_string(),
                        field: field.to_string(),
                    });
                }
            }
        }

        for collection in layout.collections.keys() {
            if collection.starts_with("system.") || expected.contains_key(collection.as_str()) {
                continue;
            }
            mismatches.push(LayoutMismatch::UnexpectedCollection(collection.clone()));
        }

        mismatches
    }
}

fn is_ascending_on(keys: &Document, field: &str) -> bool {
    if keys.len() != 1 {
        return false;
    }
    match keys.get(field) {
        Some(Bson::Int32(1)) | Some(Bson::Int64(1)) => true,
        Some(Bson::Double(value)) => *value == 1.0,
        _ => false,
    }
}

fn is_primary_key(keys: &Document) -> bool {
    keys.len() == 1 && keys.contains_key("_id")
}

/// Collections of a database with their non-`_id` index key documents.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DatabaseLayout {
    pub collections: BTreeMap<String, Vec<Document>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LayoutMismatch {
    MissingCollection(String),
    UnexpectedCollection(String),
    IndexCount {
        collection: String,
        expected: usize,
        actual: usize,
    },
    MissingIndex {
        collection: String,
        field: String,
    },
}

impl fmt::Display for LayoutMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingCollection(name) => write!(f, "collection {name} is missing"),
            Self::UnexpectedCollection(name) => {
                write!(f, "collection {name} is not part of the plan")
            }
            Self::IndexCount {
                collection,
                expected,
                actual,
            } => write!(
                f,
                "collection {collection} has {actual} secondary indexes, expected {expected}"
            ),
            Self::MissingIndex { collection, field } => {
                write!(f, "collection {collection} lacks an ascending index on {field}")
            }
        }
    }
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("bootstrap step `{step}` failed: {source}")]
    Step {
        step: String,
        source: mongodb::error::Error,
    },
    #[error("failed to inspect database {database}: {source}")]
    Inspect {
        database: String,
        source: mongodb::error::Error,
    },
}

/// Executes plans with a single client.
#[derive(Clone)]
pub struct Bootstrapper {
    client: Client,
}

impl Bootstrapper {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Runs every step in order. The first failure aborts the run.
    pub async fn run(&self, plan: &BootstrapPlan) -> Result<(), BootstrapError> {
        let database = self.client.database(plan.database());
        let total = plan.steps().len();

        for (index, step) in plan.steps().iter().enumerate() {
            info!(
                stage = "bootstrap",
                database = plan.database(),
                step = index + 1,
                total,
                "{step}"
            );

            let outcome = match step {
                BootstrapStep::CreateUser {
                    name,
                    password,
                    role,
                } => database
                    .run_command(create_user_command(name, password, role, plan.database()))
                    .await
                    .map(|_| ()),
                BootstrapStep::CreateCollection { name } => {
                    database.create_collection(name.as_str()).await
                }
                BootstrapStep::CreateIndex { collection, field } => database
                    .collection::<Document>(collection)
                    .create_index(ascending_index(field))
                    .await
                    .map(|_| ()),
            };

            outcome.map_err(|source| BootstrapError::Step {
                step: step.describe(),
                source,
            })?;
        }

        info!(stage = "bootstrap", database = plan.database(), total, "bootstrap complete");
        Ok(())
    }

    /// Reads back collection names and secondary index keys.
    pub async fn inspect(&self, database: &str) -> Result<DatabaseLayout, BootstrapError> {
        let inspect_error = |source| BootstrapError::Inspect {
            database: database.to_string(),
            source,
        };
        let handle = self.client.database(database);
        let names = handle.list_collection_names().await.map_err(inspect_error)?;

        let mut layout = DatabaseLayout::default();
        for name in names {
            let indexes: Vec<IndexModel> = handle
                .collection::<Document>(&name)
                .list_indexes()
                .await
                .map_err(inspect_error)?
                .try_collect()
                .await
                .map_err(inspect_error)?;

            let keys = indexes
                .into_iter()
                .map(|index| index.keys)
                .filter(|keys| !is_primary_key(keys))
                .collect();
            layout.collections.insert(name, keys);
        }
        Ok(layout)
    }
}
