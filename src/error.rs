//! Top-level error type for `gatewayd-core`.
//!
//! Subsystem boundaries (`channel`, `engine`, `schema`, `splitter`,
//! `services`) each define their own `thiserror` enum; this type exists
//! only to let the binary entry points (`main.rs`, `bin/gatewayd-cli.rs`)
//! bubble any of them up through a single `?`-able type.

use thiserror::Error;

use crate::channel::ChannelError;
use crate::config::ConfigError;
use crate::engine::EngineError;
use crate::schema::SchemaError;
use crate::splitter::SplitterError;

/// Umbrella error for process-level operations.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Configuration could not be loaded or was invalid.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The coordinator channel failed.
    #[error("channel error: {0}")]
    Channel(#[from] ChannelError),

    /// The DPA transaction engine failed.
    #[error("engine error: {0}")]
    Engine(#[from] EngineError),

    /// The schema registry failed to load.
    #[error("schema error: {0}")]
    Schema(#[from] SchemaError),

    /// The message splitter failed.
    #[error("splitter error: {0}")]
    Splitter(#[from] SplitterError),

    /// I/O failure outside any specific subsystem.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
