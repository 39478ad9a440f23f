//! Shared error types for configuration and secret loading

use thiserror::Error;

/// Error raised while loading settings or resolving secrets
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("missing secret {name}: set {env} or {name}_file")]
    MissingSecret { name: &'static str, env: &'static str },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Result alias using common Error
pub type Result<T> = std::result::Result<T, Error>;
