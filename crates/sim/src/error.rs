//! Errors raised while building the simulation.

use std::path::PathBuf;

use motion::{ErrorKind, MoveError};

/// Errors that can occur while configuring the simulated robot.
#[derive(Debug, thiserror::Error)]
pub enum SimError {
    #[error("Failed to read simulation config '{}': {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse simulation config '{}': {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid simulation config '{field}': {reason}")]
    InvalidConfig {
        field: &'static str,
        reason: String,
    },

    #[error("Unknown link: {0}")]
    UnknownLink(String),
}

impl From<SimError> for MoveError {
    fn from(e: SimError) -> Self {
        MoveError::new(ErrorKind::InvalidInput, e.to_string())
    }
}
