//! Run settings
//!
//! Layered from an optional YAML file and `DELPHI`-prefixed environment
//! variables (`__` separates nesting, e.g. `DELPHI_STORE__CONNECTION`).
//! Every key has a default, so an empty file is a valid configuration.

use anyhow::{bail, Context, Result};
use config::{Config, Environment, File as ConfigFile, Map};
use delphi_storage::{DEFAULT_CONNECT_TIMEOUT, DEFAULT_TABLE};
use delphi_trainer::{TrainingParams, TreeParams};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default configuration file, relative to the working directory
pub const DEFAULT_CONFIG_PATH: &str = "config/config.yml";

const ENV_PREFIX: &str = "DELPHI";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub test_size: f64,
    pub seed: u64,
    /// Train on the stored feature table instead of mining the corpora
    pub read_features_from_db: bool,
    pub store: StoreSettings,
    pub paths: PathSettings,
    pub tree: TreeParams,
}

impl Default for Settings {
    fn default() -> Self {
        let training = TrainingParams::default();
        Self {
            test_size: training.test_size,
            seed: training.seed,
            read_features_from_db: false,
            store: StoreSettings::default(),
            paths: PathSettings::default(),
            tree: training.tree,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSettings {
    /// `sled://<path>`, `csv://<path>`, `memory://` or a bare sled path;
    /// no store is used when unset
    pub connection: Option<String>,
    pub table: String,
    pub connect_timeout_secs: u64,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            connection: None,
            table: DEFAULT_TABLE.to_string(),
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT.as_secs(),
        }
    }
}

impl StoreSettings {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataDirs {
    pub malware: PathBuf,
    pub benign: PathBuf,
}

impl Default for DataDirs {
    fn default() -> Self {
        Self {
            malware: PathBuf::from("data/malware"),
            benign: PathBuf::from("data/benign"),
        }
    }
}

/// Filesystem locations; relative entries resolve against `proj_root`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathSettings {
    pub proj_root: PathBuf,
    pub data_dirs: DataDirs,
    pub output_dir: PathBuf,
    pub model_path: PathBuf,
}

impl Default for PathSettings {
    fn default() -> Self {
        Self {
            proj_root: PathBuf::from("."),
            data_dirs: DataDirs::default(),
            output_dir: PathBuf::from("output"),
            model_path: PathBuf::from("output/mal_clf.json"),
        }
    }
}

impl PathSettings {
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.proj_root.join(path)
        }
    }

    pub fn malware_dir(&self) -> PathBuf {
        self.resolve(&self.data_dirs.malware)
    }

    pub fn benign_dir(&self) -> PathBuf {
        self.resolve(&self.data_dirs.benign)
    }

    pub fn output_dir(&self) -> PathBuf {
        self.resolve(&self.output_dir)
    }

    pub fn model_path(&self) -> PathBuf {
        self.resolve(&self.model_path)
    }
}

impl Settings {
    /// Load settings from `path` (or the default file when present) and the
    /// process environment
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_with_env(path, None)
    }

    /// As [`Settings::load`], reading environment overrides from `env` when given
    pub fn load_with_env(path: Option<&Path>, env: Option<Map<String, String>>) -> Result<Self> {
        let resolved = match path {
            Some(path) => {
                if !path.exists() {
                    bail!("Configuration file {} not found", path.display());
                }
                Some(path.to_path_buf())
            }
            None => Some(PathBuf::from(DEFAULT_CONFIG_PATH)).filter(|p| p.exists()),
        };

        let mut builder = Config::builder();
        if let Some(path) = &resolved {
            builder = builder.add_source(ConfigFile::from(path.as_path()));
        }
        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true)
                .source(env),
        );

        let settings: Settings = builder
            .build()
            .context("Failed to read configuration")?
            .try_deserialize()
            .context("Failed to parse configuration")?;

        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.test_size > 0.0 && self.test_size < 1.0) {
            bail!(
                "test_size must lie strictly between 0 and 1, got {}",
                self.test_size
            );
        }
        if self.store.connect_timeout_secs == 0 {
            bail!("store.connect_timeout_secs must be positive");
        }
        if self.read_features_from_db && self.store.connection.is_none() {
            bail!("read_features_from_db is set but store.connection is not");
        }
        Ok(())
    }

    pub fn training_params(&self) -> TrainingParams {
        TrainingParams {
            test_size: self.test_size,
            seed: self.seed,
            tree: self.tree.clone(),
        }
    }
}
