//! # Error Module
//!
//! Error taxonomy for the perception and trial engines.
//!
//! All errors are local and reported synchronously. Nothing here is retried
//! internally; retry policy belongs to the calling application. A CRISIS
//! classification is a successful [`crate::Tier`], never an error.

use crate::{Branch, TrialId};
use crate::trial::TrialStatus;
use thiserror::Error;

/// Errors raised by cerata-core.
#[derive(Debug, Error)]
pub enum CerataError {
    /// A numeric signal was NaN or infinite and cannot be clamped.
    #[error("invalid {dimension} dimension value: {value}")]
    InvalidDimension {
        /// Dimension name (intent, authority, urgency, fit).
        dimension: &'static str,
        /// The rejected value.
        value: f64,
    },

    /// Evaluation requested before both branches reached the minimum sample size.
    #[error(
        "insufficient sample: classic {classic}, experimental {experimental}, need {required} per branch"
    )]
    InsufficientSample {
        /// Records qualified on the classic branch.
        classic: u64,
        /// Records qualified on the experimental branch.
        experimental: u64,
        /// Minimum required per branch.
        required: u64,
    },

    /// A lifecycle operation is not allowed in the trial's current status.
    #[error("cannot {action} {trial} while {from:?}")]
    InvalidTransition {
        /// The trial.
        trial: TrialId,
        /// Status at the time of the call.
        from: TrialStatus,
        /// The rejected operation.
        action: &'static str,
    },

    /// A lens name did not resolve.
    #[error("no lens named '{0}'")]
    NoActiveStandard(String),

    /// Another trial is already running.
    #[error("{running} is already running")]
    ActiveTrialExists {
        /// The trial currently RUNNING.
        running: TrialId,
    },

    /// Unknown trial id.
    #[error("{0} not found")]
    TrialNotFound(TrialId),

    /// A lens definition failed validation.
    #[error("invalid lens '{lens}': {reason}")]
    InvalidLens {
        /// Lens name.
        lens: String,
        /// What was wrong.
        reason: String,
    },

    /// Trial parameters out of range.
    #[error("invalid trial configuration: {0}")]
    InvalidTrialConfig(String),

    /// Outcome value or cost out of range.
    #[error("invalid outcome: {0}")]
    InvalidOutcome(String),

    /// A branch tag did not match the trial it was recorded against.
    #[error("branch {branch} is not part of {trial}")]
    BranchMismatch {
        /// The trial.
        trial: TrialId,
        /// The offending branch.
        branch: Branch,
    },

    /// The standard was replaced after the trial was created, so the
    /// experiment never competed against the current standard.
    #[error("{trial} was created against standard v{baseline}, current is v{current}")]
    StandardChanged {
        /// The trial.
        trial: TrialId,
        /// Standard version at trial creation.
        baseline: u64,
        /// Standard version at promotion time.
        current: u64,
    },

    /// Cooperative cancellation observed between qualification calls.
    #[error("operation cancelled")]
    Cancelled,

    /// Configuration document could not be parsed.
    #[error("configuration error: {0}")]
    Config(String),

    /// Snapshot header, version or checksum mismatch.
    #[error("snapshot format error: {0}")]
    Format(String),

    /// Snapshot payload encode/decode failure.
    #[error("serialization error: {0}")]
    Serialization(#[from] postcard::Error),

    /// Durable store failure.
    #[error("storage error: {0}")]
    Storage(String),
}

/// Convenience Result type using [`CerataError`].
pub type Result<T> = std::result::Result<T, CerataError>;

impl From<toml::de::Error> for CerataError {
    fn from(err: toml::de::Error) -> Self {
        CerataError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for CerataError {
    fn from(err: serde_json::Error) -> Self {
        CerataError::Config(err.to_string())
    }
}

macro_rules! storage_error_from {
    ($($ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for CerataError {
                fn from(err: $ty) -> Self {
                    CerataError::Storage(err.to_string())
                }
            }
        )*
    };
}

storage_error_from!(
    redb::Error,
    redb::DatabaseError,
    redb::TransactionError,
    redb::TableError,
    redb::StorageError,
    redb::CommitError,
);
