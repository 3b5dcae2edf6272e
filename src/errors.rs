//! Leader election error hierarchy.
//!
//! Defines error types for the election subsystem, categorized by
//! protocol layer and operational concerns.

use config::ConfigError;

#[doc(hidden)]
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Configuration validation failures
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Election protocol failures
    #[error(transparent)]
    Election(#[from] ElectionError),

    /// Notification wire format failures
    #[error(transparent)]
    Codec(#[from] CodecError),
}

/// Failures of the election round itself.
///
/// The only member that terminates `look_for_leader` abnormally is
/// [`ElectionError::EpochReadFailure`]; every other fault in the subsystem
/// is absorbed by the messenger (log and continue) or by the backoff loop.
#[derive(Debug, thiserror::Error)]
pub enum ElectionError {
    /// The transaction log could not supply the current epoch. The caller
    /// aborts this election round.
    #[error("failed to read current epoch: {source}")]
    EpochReadFailure {
        #[source]
        source: std::io::Error,
    },
}

/// Notification decode failures. Consumed inside the receiver worker; a bad
/// message is dropped, never propagated into the election loop.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("got a short notification: {len} bytes")]
    ShortMessage { len: usize },

    #[error("unrecognized server state ordinal: {ordinal}")]
    UnknownState { ordinal: i32 },
}
