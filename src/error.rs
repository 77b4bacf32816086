use thiserror::Error;

pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Failures that end a planning run. Algorithmic shortfalls are not errors;
/// they land in [`crate::models::Diagnostics`].
#[derive(Debug, Error)]
pub enum PlanError {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("failed to read {what}: {source}")]
    Read {
        what: &'static str,
        source: BoxError,
    },

    /// Earlier writes from the same run stay in place.
    #[error("failed to write {what}: {source}")]
    Write {
        what: &'static str,
        source: BoxError,
    },

    #[error("failed to acquire run lock: {source}")]
    Lock { source: BoxError },

    #[error("another scheduling run is in progress")]
    Locked,
}

impl PlanError {
    pub fn read(what: &'static str, err: anyhow::Error) -> Self {
        PlanError::Read {
            what,
            source: err.into(),
        }
    }

    pub fn write(what: &'static str, err: anyhow::Error) -> Self {
        PlanError::Write {
            what,
            source: err.into(),
        }
    }

    pub fn lock(err: anyhow::Error) -> Self {
        PlanError::Lock { source: err.into() }
    }
}

pub type PlanResult<T> = Result<T, PlanError>;
