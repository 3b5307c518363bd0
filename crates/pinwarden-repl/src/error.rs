//! Error types for the pin replication subsystem.

use thiserror::Error;

/// Errors that can occur while reconciling pin replication.
#[derive(Debug, Error)]
pub enum ReplError {
    /// The blockchain collaborator was unreachable or returned a malformed response.
    #[error("contract read error: {msg}")]
    ContractRead {
        /// Error message describing the issue.
        msg: String,
    },

    /// Content retrieval failed.
    #[error("fetch error for {path}: {msg}")]
    Fetch {
        /// Content path that was requested.
        path: String,
        /// Error message describing the failure.
        msg: String,
    },

    /// An external call exceeded its deadline.
    #[error("{op} timed out after {timeout_ms}ms")]
    Timeout {
        /// Name of the operation that timed out.
        op: &'static str,
        /// Deadline that was exceeded.
        timeout_ms: u64,
    },

    /// Fetched content was empty or unreadable.
    #[error("empty content for {path}")]
    EmptyContent {
        /// Content path that produced no payload.
        path: String,
    },

    /// A string could not be decoded as a content identifier.
    #[error("invalid content identifier {input:?}: {msg}")]
    Decode {
        /// The rejected input.
        input: String,
        /// Decoder message.
        msg: String,
    },

    /// Provider lookup failed.
    #[error("provider query failed for {cid}: {msg}")]
    Query {
        /// Identifier being queried.
        cid: String,
        /// Error message describing the failure.
        msg: String,
    },

    /// Listing local pins failed.
    #[error("local pin listing failed: {msg}")]
    List {
        /// Error message describing the failure.
        msg: String,
    },

    /// Listing local pins succeeded but returned nothing.
    #[error("local pin listing returned no pins")]
    EmptyPinList,

    /// A pin add or pin remove call failed.
    #[error("{op} failed for {cid}: {msg}")]
    PinOp {
        /// "pin add" or "pin remove".
        op: &'static str,
        /// Identifier the operation targeted.
        cid: String,
        /// Error message describing the failure.
        msg: String,
    },

    /// Invalid configuration value.
    #[error("invalid configuration: {msg}")]
    Config {
        /// Error message describing the problem.
        msg: String,
    },

    /// I/O error.
    #[error("I/O error")]
    Io(#[from] std::io::Error),
}

/// Result alias for the replication subsystem.
pub type Result<T> = std::result::Result<T, ReplError>;

/// Runs `fut` under a deadline, mapping expiry to [`ReplError::Timeout`].
pub(crate) async fn with_deadline<T, F>(
    op: &'static str,
    timeout: std::time::Duration,
    fut: F,
) -> Result<T>
where
    F: std::future::Future<Output = Result<T>>,
{
    tokio::time::timeout(timeout, fut)
        .await
        .map_err(|_| ReplError::Timeout {
            op,
            timeout_ms: timeout.as_millis() as u64,
        })?
}
