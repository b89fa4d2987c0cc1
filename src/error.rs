//! Crate-level error types for the store, repository, channel, and report layers.

/// Error returned by a [`DocumentStore`](crate::store::DocumentStore) or the
/// [`StoreGateway`](crate::gateway::StoreGateway) that owns it.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The store could not be reached or opened.
    ///
    /// Raised by `connect` and treated as fatal for command servicing: the
    /// gateway falls back to the disconnected status.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// An operation was attempted while no connection is open.
    #[error("store is not connected")]
    NotConnected,

    /// A unique index rejected the write.
    ///
    /// Carries the name of the indexed field that collided.
    #[error("duplicate value for unique field `{field}`")]
    DuplicateKey {
        /// Name of the unique field (e.g. `"tax_id"`).
        field: &'static str,
    },

    /// The addressed document does not exist.
    #[error("document not found")]
    NotFound,

    /// The persisted data could not be decoded.
    #[error("corrupt store data: {0}")]
    Corrupt(String),

    /// Disk I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A single rejected field in a customer field set.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{field}: {message}")]
pub struct FieldError {
    /// Wire name of the offending field (e.g. `"tax_id"`).
    pub field: &'static str,
    /// Human-readable reason.
    pub message: String,
}

impl FieldError {
    pub(crate) fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

/// Error returned by [`CustomerRepository`](crate::repository::CustomerRepository)
/// operations.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    /// A required field is missing or malformed. Blocks the command before
    /// it reaches the store.
    #[error("validation failed: {0}")]
    Validation(#[from] FieldError),

    /// Another record already uses this tax-id.
    #[error("a customer with tax-id `{tax_id}` already exists")]
    DuplicateKey {
        /// The colliding tax-id.
        tax_id: String,
    },

    /// The update or delete target does not exist.
    #[error("customer `{id}` not found")]
    NotFound {
        /// The identifier that was looked up.
        id: String,
    },

    /// The store is unavailable or the connection is not open.
    #[error("store connection unavailable: {0}")]
    Connection(String),

    /// Any other store failure (I/O, corrupt data).
    #[error("store error: {0}")]
    Store(String),
}

impl RepositoryError {
    /// Translate a store-level failure, attaching the repository context
    /// the store does not know about.
    pub(crate) fn from_store(err: StoreError, tax_id: Option<&str>, id: Option<&str>) -> Self {
        match err {
            StoreError::DuplicateKey { .. } => Self::DuplicateKey {
                tax_id: tax_id.unwrap_or_default().to_owned(),
            },
            StoreError::NotFound => Self::NotFound {
                id: id.unwrap_or_default().to_owned(),
            },
            StoreError::NotConnected | StoreError::Unavailable(_) => {
                Self::Connection(err.to_string())
            }
            StoreError::Corrupt(_) | StoreError::Io(_) => Self::Store(err.to_string()),
        }
    }
}

/// Error returned to the UI side of the channel when a request cannot be
/// completed.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    /// The backend orchestrator has shut down.
    #[error("backend is no longer running")]
    BackendGone,

    /// No reply arrived within the configured timeout.
    #[error("no reply for request {correlation_id} within {timeout_ms} ms")]
    TimedOut {
        /// Correlation id of the unanswered request.
        correlation_id: String,
        /// The timeout that elapsed, in milliseconds.
        timeout_ms: u128,
    },

    /// A reply was delivered for a different request.
    #[error("reply correlation mismatch: expected {expected}, got {actual}")]
    CorrelationMismatch {
        /// Correlation id the caller sent.
        expected: String,
        /// Correlation id the reply carried.
        actual: String,
    },
}

/// Error decoding or encoding a line on the stdio wire transport.
#[derive(Debug, thiserror::Error)]
pub enum WireError {
    /// The line is not a valid JSON message envelope.
    #[error("malformed message: {0}")]
    Malformed(#[from] serde_json::Error),

    /// The channel name is not part of the request vocabulary.
    #[error("unknown channel `{0}`")]
    UnknownChannel(String),

    /// The payload does not match the schema of its channel.
    #[error("invalid payload for `{channel}`: {message}")]
    InvalidPayload {
        /// Channel whose schema was violated.
        channel: String,
        /// Decoder message.
        message: String,
    },

    /// Transport I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Error raised while generating or opening the customer report.
#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    /// Loading the records failed.
    #[error(transparent)]
    Repository(#[from] RepositoryError),

    /// Writing the temporary document failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The OS viewer could not be launched.
    #[error("failed to open report viewer: {0}")]
    Viewer(String),
}
