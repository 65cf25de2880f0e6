// src/config/mod.rs

//! Configuration loading and validation.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`).
//! - Load a config file from disk (`loader.rs`).
//! - Validate it into a `ConfigFile` (`validate.rs`).
//! - Parse duration strings such as `"5m"` (`duration.rs`).

pub mod duration;
pub mod loader;
pub mod model;
pub mod validate;

pub use duration::parse_duration;
pub use loader::{load_and_validate, load_from_path, parse_str};
pub use model::{
    CheckConfig, ConfigFile, ConnectionConfig, DefaultsSection, DimensionConfig, FactConfig,
    PipelineSection, QualitySection, RawConfigFile, StageConfig,
};
