// src/config/mod.rs

//! Configuration loading and validation.
//!
//! Responsibilities:
//! - Define the TOML/JSON-backed data model (`model.rs`).
//! - Load and save config files (`loader.rs`).
//! - Check required fields and build a [`Dag`](crate::dag::Dag) against a
//!   [`FunctionRegistry`](crate::exec::FunctionRegistry) (`validate.rs`).

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{
    default_config_path, load_and_validate, load_dag, load_from_path, save_to_path,
    validate_path, ConfigFormat,
};
pub use model::{parse_duration, ConfigFile, RawConfigFile, TaskConfig, TimeoutSpec};
pub use validate::validate_config;
