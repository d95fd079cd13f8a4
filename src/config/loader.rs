// src/config/loader.rs

use std::fs;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::dag::Dag;
use crate::errors::Result;
use crate::exec::FunctionRegistry;

/// On-disk formats, picked by file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Toml,
    Json,
}

impl ConfigFormat {
    /// `.json` is JSON; anything else is read as TOML.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => ConfigFormat::Json,
            _ => ConfigFormat::Toml,
        }
    }
}

/// Load a configuration file and return the raw `RawConfigFile`.
///
/// This only deserializes; it does **not** perform semantic validation.
/// Use [`load_and_validate`] for that.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawConfigFile> {
    let path = path.as_ref();
    info!(path = %path.display(), "loading DAG configuration");
    let contents = fs::read_to_string(path)?;

    let config = match ConfigFormat::from_path(path) {
        ConfigFormat::Toml => toml::from_str(&contents)?,
        ConfigFormat::Json => serde_json::from_str(&contents)?,
    };

    Ok(config)
}

/// Load a configuration file and run the required-field checks.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<ConfigFile> {
    let raw_config = load_from_path(&path)?;
    let config = ConfigFile::try_from(raw_config)?;
    Ok(config)
}

/// Load, check and build a DAG in one go. The DAG itself is validated too.
pub fn load_dag(path: impl AsRef<Path>, registry: &FunctionRegistry) -> Result<Dag> {
    let config = load_and_validate(path)?;
    let mut dag = config.build_dag(registry)?;
    dag.validate()?;
    Ok(dag)
}

/// Every problem with the config at `path`, as messages. Empty when the
/// file loads, passes the field checks and yields a valid DAG.
pub fn validate_path(path: impl AsRef<Path>, registry: &FunctionRegistry) -> Vec<String> {
    let path = path.as_ref();
    if !path.exists() {
        return vec![format!("configuration file not found: {}", path.display())];
    }

    let raw = match load_from_path(path) {
        Ok(raw) => raw,
        Err(e) => return vec![e.to_string()],
    };

    let problems = crate::config::validate::validate_config(&raw);
    if !problems.is_empty() {
        return problems;
    }

    let config = ConfigFile::new_unchecked(raw);
    let result = config
        .build_dag(registry)
        .and_then(|mut dag| dag.validate().map(|_| ()));
    match result {
        Ok(()) => Vec::new(),
        Err(e) => vec![e.to_string()],
    }
}

/// Write `dag` as a config file; the format follows the extension.
pub fn save_to_path(dag: &Dag, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    let config = RawConfigFile::from_dag(dag);

    let contents = match ConfigFormat::from_path(path) {
        ConfigFormat::Toml => toml::to_string_pretty(&config)?,
        ConfigFormat::Json => serde_json::to_string_pretty(&config)?,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, contents)?;
    info!(dag = %dag.dag_id(), path = %path.display(), "saved DAG configuration");
    Ok(())
}

/// Config file used when `--config` is not given.
pub fn default_config_path() -> PathBuf {
    PathBuf::from("taskdag.toml")
}
