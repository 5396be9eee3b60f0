use std::{io, path};

use shuttle_core::{HostError, ShuttleError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SimError {
    #[error("durable store root {path:?} is not usable: {error}")]
    RootPathInvalid {
        path: path::PathBuf,
        #[source]
        error: io::Error,
    },

    #[error("durable store file {path:?}: {error}")]
    Io {
        path: path::PathBuf,
        #[source]
        error: io::Error,
    },

    #[error("durable store file {path:?} is corrupt: {error}")]
    Corrupt {
        path: path::PathBuf,
        #[source]
        error: serde_json::Error,
    },

    #[error("context {0} is not part of the simulation")]
    UnknownContext(shuttle_wire::ContextId),

    #[error(transparent)]
    Shuttle(#[from] ShuttleError),
}

impl From<SimError> for HostError {
    fn from(error: SimError) -> Self {
        match error {
            SimError::UnknownContext(context) => HostError::UnknownContext(context),
            other => HostError::Storage {
                message: other.to_string(),
            },
        }
    }
}

pub type Result<T> = std::result::Result<T, SimError>;
