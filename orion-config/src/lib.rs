//! Shared configuration library for Orion.
//!
//! Centralizes config defaults, TOML loading, and validation so the
//! provider and backend crates receive one injected, already-validated
//! snapshot instead of reaching into ambient state mid-algorithm.

pub mod loader;
pub mod models;
pub mod validation;

pub use loader::{load_config, load_config_str, ConfigError};
pub use models::{
    AnalyticsTuning, BackendKind, DeveloperConfig, HttpTuning, OrionConfig,
    StatusTuning,
};
pub use validation::{validate, ConfigWarning};
