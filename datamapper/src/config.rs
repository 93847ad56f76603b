use crate::error::{DataMapperError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;

pub const ENV_PROFILE: &str = "DATAMAPPER_ENV";
pub const ENV_DATABASE: &str = "DATAMAPPER_DATABASE";
pub const ENV_SCHEMA: &str = "DATAMAPPER_SCHEMA";

pub const MEMORY_DATABASE: &str = ":memory:";

/// Runtime profile. `test` always runs against an in-memory database unless a
/// database is set explicitly through the environment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Profile {
    #[default]
    Development,
    Test,
    Production,
}

impl FromStr for Profile {
    type Err = DataMapperError;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_lowercase().as_str() {
            "development" | "dev" => Ok(Profile::Development),
            "test" => Ok(Profile::Test),
            "production" | "prod" => Ok(Profile::Production),
            other => Err(DataMapperError::Config(format!(
                "unknown profile '{other}' in {ENV_PROFILE}"
            ))),
        }
    }
}

fn default_database() -> String {
    "datamapper.db".to_string()
}

fn default_busy_timeout_ms() -> u64 {
    5000
}

/// Where the database and schema live, loaded from YAML and/or the environment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_database")]
    pub database: String,
    #[serde(default)]
    pub schema: Option<PathBuf>,
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    #[serde(default)]
    pub profile: Profile,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            database: default_database(),
            schema: None,
            busy_timeout_ms: default_busy_timeout_ms(),
            profile: Profile::default(),
        }
    }
}

impl Config {
    /// Load a YAML config file, then apply environment overrides.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&content)?;
        config.with_overrides(|key| std::env::var(key).ok())
    }

    /// Defaults plus environment overrides.
    pub fn from_env() -> Result<Self> {
        Config::default().with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply `DATAMAPPER_*` overrides read through `lookup`.
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        if let Some(profile) = lookup(ENV_PROFILE) {
            self.profile = profile.parse()?;
        }
        if self.profile == Profile::Test {
            self.database = MEMORY_DATABASE.to_string();
        }
        if let Some(database) = lookup(ENV_DATABASE) {
            self.database = database;
        }
        if let Some(schema) = lookup(ENV_SCHEMA) {
            self.schema = Some(PathBuf::from(schema));
        }
        Ok(self)
    }

    pub fn is_in_memory(&self) -> bool {
        self.database == MEMORY_DATABASE
    }

    pub fn schema_path(&self) -> Result<&Path> {
        self.schema
            .as_deref()
            .ok_or_else(|| DataMapperError::Config("no schema file configured".into()))
    }
}
