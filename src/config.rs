//! Purpose: Load and save the backend choice and its connection settings.
//! Exports: `Config`, `Backend`, `RemoteConfig`, `CsvConfig`, `DEFAULT_CONFIG_FILE`.
//! Role: Decides, once at startup, which store the application talks to.
//! Invariants: A missing config file means defaults (JSON server on localhost:3000).
#![allow(clippy::result_large_err)]

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::api::{CarDataAccessor, CsvStore, Error, ErrorKind, RemoteOptions, RemoteStore};

pub const DEFAULT_CONFIG_FILE: &str = "carpanel.toml";

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    #[default]
    Json,
    Csv,
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Backend::Json => f.write_str("json"),
            Backend::Csv => f.write_str("csv"),
        }
    }
}

#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub backend: Backend,
    #[serde(default)]
    pub remote: RemoteConfig,
    #[serde(default)]
    pub csv: CsvConfig,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct RemoteConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct CsvConfig {
    #[serde(default = "default_csv_path")]
    pub path: PathBuf,
}

impl Default for CsvConfig {
    fn default() -> Self {
        Self {
            path: default_csv_path(),
        }
    }
}

fn default_base_url() -> String {
    "http://localhost:3000".to_string()
}

fn default_timeout_ms() -> u64 {
    5_000
}

fn default_csv_path() -> PathBuf {
    PathBuf::from("cars.csv")
}

impl Config {
    pub fn load(path: &Path) -> Result<Config, Error> {
        if !path.exists() {
            debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Config::default());
        }
        let text = std::fs::read_to_string(path).map_err(|err| {
            Error::new(ErrorKind::Io)
                .with_message("failed to read config file")
                .with_path(path)
                .with_source(err)
        })?;
        toml::from_str(&text).map_err(|err| {
            Error::new(ErrorKind::Usage)
                .with_message("failed to parse config file")
                .with_path(path)
                .with_hint("Expected `backend = \"json\"` or `backend = \"csv\"` plus [remote]/[csv] tables.")
                .with_source(err)
        })
    }

    pub fn save(&self, path: &Path) -> Result<(), Error> {
        let text = toml::to_string_pretty(self).map_err(|err| {
            Error::new(ErrorKind::Internal)
                .with_message("failed to encode config")
                .with_source(err)
        })?;
        std::fs::write(path, text).map_err(|err| {
            Error::new(ErrorKind::Io)
                .with_message("failed to write config file")
                .with_path(path)
                .with_source(err)
        })
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.remote.timeout_ms)
    }

    /// Builds the one store for the configured backend; the remote store probes its server.
    pub fn open_store(&self) -> Result<Box<dyn CarDataAccessor>, Error> {
        match self.backend {
            Backend::Json => {
                let options = RemoteOptions::default().with_timeout(self.timeout());
                let store = RemoteStore::connect_with(self.remote.base_url.clone(), options)?;
                Ok(Box::new(store))
            }
            Backend::Csv => Ok(Box::new(CsvStore::new(self.csv.path.clone()))),
        }
    }
}
