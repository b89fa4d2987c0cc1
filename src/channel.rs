//! Command channel between the UI process and the backend.
//!
//! The channel carries a closed vocabulary: [`Request`] from the UI,
//! exactly one terminal [`Reply`] per request from the backend. The UI side
//! only ever holds a [`UiEndpoint`], whose methods map one-to-one onto the
//! vocabulary; it has no path to the repository or the store gateway.
//!
//! Every request travels with a [`RequestContext`] carrying a correlation
//! id. The backend echoes it in the [`ReplyEnvelope`], and the endpoint
//! rejects replies that do not match. All requests share one FIFO queue,
//! so messages on the same channel name reach the backend in send order.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

use crate::error::ChannelError;
use crate::gateway::ConnectionStatus;
use crate::record::{CustomerFields, CustomerRecord, RecordId};

/// Literal channel names used on the wire.
pub mod names {
    pub const CONNECT_REQUEST: &str = "connect-request";
    pub const CREATE_RECORD: &str = "create-record";
    pub const UPDATE_RECORD: &str = "update-record";
    pub const DELETE_RECORD: &str = "delete-record";
    pub const SEARCH_BY_NAME: &str = "search-by-name";
    pub const SEARCH_BY_TAX_ID: &str = "search-by-taxid";

    pub const CONNECTION_STATUS: &str = "connection-status";
    pub const RECORD_CREATED: &str = "record-created";
    pub const DUPLICATE_KEY: &str = "duplicate-key";
    pub const NOT_FOUND: &str = "not-found";
    pub const VALIDATION_ERROR: &str = "validation-error";
    pub const COMMAND_FAILED: &str = "command-failed";
    pub const NOT_CONNECTED: &str = "not-connected";
    pub const SEARCH_RESULTS: &str = "search-results";
    pub const UNKNOWN_CHANNEL: &str = "unknown-channel";
    pub const INVALID_PAYLOAD: &str = "invalid-payload";

    pub const RESET_FORM: &str = "reset-form";
    pub const DUPLICATE_KEY_ERROR: &str = "duplicate-key-error";

    /// Every channel the UI may send on.
    pub const REQUESTS: [&str; 6] = [
        CONNECT_REQUEST,
        CREATE_RECORD,
        UPDATE_RECORD,
        DELETE_RECORD,
        SEARCH_BY_NAME,
        SEARCH_BY_TAX_ID,
    ];
}

/// Payload of `update-record`: the target id plus the full field set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdatePayload {
    /// Persisted identifier of the record being edited.
    pub id: RecordId,
    /// Replacement field values.
    #[serde(flatten)]
    pub fields: CustomerFields,
}

/// A request from the UI process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    /// Open the store connection and report the status.
    ConnectRequest,
    /// Persist a new customer.
    CreateRecord(CustomerFields),
    /// Replace an existing customer.
    UpdateRecord(UpdatePayload),
    /// Remove a customer.
    DeleteRecord(RecordId),
    /// Case-insensitive partial match on name.
    SearchByName(String),
    /// Exact match on tax-id.
    SearchByTaxId(String),
}

impl Request {
    /// The channel name this request travels on.
    pub fn channel(&self) -> &'static str {
        match self {
            Self::ConnectRequest => names::CONNECT_REQUEST,
            Self::CreateRecord(_) => names::CREATE_RECORD,
            Self::UpdateRecord(_) => names::UPDATE_RECORD,
            Self::DeleteRecord(_) => names::DELETE_RECORD,
            Self::SearchByName(_) => names::SEARCH_BY_NAME,
            Self::SearchByTaxId(_) => names::SEARCH_BY_TAX_ID,
        }
    }
}

/// The terminal reply to a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Outcome of `connect-request`.
    ConnectionStatus(ConnectionStatus),
    /// A create, update or delete succeeded. The UI resets the form.
    RecordCreated,
    /// The tax-id collides with another record. The UI highlights `field`
    /// and keeps the rest of the form.
    DuplicateKey {
        /// Offending field, always `"tax_id"` today.
        field: String,
    },
    /// The update or delete target does not exist.
    NotFound {
        /// The identifier that was not found.
        id: String,
    },
    /// The payload failed validation before reaching the store.
    ValidationError {
        /// Offending field.
        field: String,
        /// Reason.
        message: String,
    },
    /// Any other failure; already logged on the backend.
    CommandFailed {
        /// User-facing description.
        message: String,
    },
    /// The store is not connected; the command was not executed.
    NotConnected,
    /// Result of a search, possibly empty.
    SearchResults(Vec<CustomerRecord>),
    /// The wire transport received a channel outside the vocabulary.
    UnknownChannel {
        /// The rejected channel name.
        channel: String,
    },
    /// The wire transport received a payload that does not match its channel.
    InvalidPayload {
        /// Channel whose schema was violated.
        channel: String,
        /// Decoder message.
        message: String,
    },
}

impl Reply {
    /// The channel name this reply travels on.
    pub fn channel(&self) -> &'static str {
        match self {
            Self::ConnectionStatus(_) => names::CONNECTION_STATUS,
            Self::RecordCreated => names::RECORD_CREATED,
            Self::DuplicateKey { .. } => names::DUPLICATE_KEY,
            Self::NotFound { .. } => names::NOT_FOUND,
            Self::ValidationError { .. } => names::VALIDATION_ERROR,
            Self::CommandFailed { .. } => names::COMMAND_FAILED,
            Self::NotConnected => names::NOT_CONNECTED,
            Self::SearchResults(_) => names::SEARCH_RESULTS,
            Self::UnknownChannel { .. } => names::UNKNOWN_CHANNEL,
            Self::InvalidPayload { .. } => names::INVALID_PAYLOAD,
        }
    }

    /// The form directive this reply implies, if any.
    pub fn directive(&self) -> Option<UiDirective> {
        match self {
            Self::RecordCreated => Some(UiDirective::ResetForm),
            Self::DuplicateKey { .. } => Some(UiDirective::DuplicateKeyError),
            _ => None,
        }
    }
}

/// Backend-to-UI form instructions derived from replies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UiDirective {
    /// Clear every field and return to create mode.
    ResetForm,
    /// Clear and highlight the tax-id field, keep the rest for correction.
    DuplicateKeyError,
}

impl UiDirective {
    /// The channel name of the directive.
    pub fn channel(&self) -> &'static str {
        match self {
            Self::ResetForm => names::RESET_FORM,
            Self::DuplicateKeyError => names::DUPLICATE_KEY_ERROR,
        }
    }
}

/// Cross-cutting metadata sent alongside a request.
///
/// # Examples
///
/// ```
/// use customer_registry::RequestContext;
///
/// let ctx = RequestContext::default()
///     .with_origin("main-window")
///     .with_correlation_id("req-abc-123");
///
/// assert_eq!(ctx.correlation_id, "req-abc-123");
/// assert_eq!(ctx.origin.as_deref(), Some("main-window"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestContext {
    /// Identifier echoed by the reply. Defaults to a fresh UUID v4.
    pub correlation_id: String,
    /// Which UI surface issued the request (window, menu), for logs.
    pub origin: Option<String>,
}

impl Default for RequestContext {
    fn default() -> Self {
        Self {
            correlation_id: Uuid::new_v4().to_string(),
            origin: None,
        }
    }
}

impl RequestContext {
    /// Set the correlation id.
    pub fn with_correlation_id(mut self, id: impl Into<String>) -> Self {
        self.correlation_id = id.into();
        self
    }

    /// Set the origin.
    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = Some(origin.into());
        self
    }
}

/// A reply tagged with the correlation id of its request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplyEnvelope {
    /// Correlation id copied from the request's [`RequestContext`].
    pub correlation_id: String,
    /// The terminal reply.
    pub reply: Reply,
}

/// Messages delivered to the backend orchestrator.
pub(crate) enum BackendMessage {
    /// A request from the UI, with the channel to answer on.
    Request {
        request: Request,
        ctx: RequestContext,
        reply: oneshot::Sender<ReplyEnvelope>,
    },
    /// Stop accepting requests and shut down.
    Shutdown,
}

/// Receiving half of the bridge, consumed by the orchestrator.
pub struct BackendInbox {
    pub(crate) rx: mpsc::Receiver<BackendMessage>,
}

/// Create a connected pair of endpoints.
///
/// # Arguments
///
/// * `capacity` - Bound of the request queue; senders wait when it is full.
/// * `reply_timeout` - How long [`UiEndpoint`] waits for each reply.
pub fn bridge(capacity: usize, reply_timeout: Duration) -> (UiEndpoint, BackendInbox) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (
        UiEndpoint {
            sender: tx,
            reply_timeout,
        },
        BackendInbox { rx },
    )
}

/// A request that has been queued and awaits its reply.
#[derive(Debug)]
pub struct PendingReply {
    correlation_id: String,
    rx: oneshot::Receiver<ReplyEnvelope>,
    timeout: Duration,
}

impl PendingReply {
    /// Correlation id of the queued request.
    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }

    /// Wait for the reply.
    ///
    /// # Errors
    ///
    /// * [`ChannelError::TimedOut`] -- no reply within the endpoint timeout.
    /// * [`ChannelError::BackendGone`] -- the backend dropped the request.
    /// * [`ChannelError::CorrelationMismatch`] -- the reply belongs elsewhere.
    pub async fn wait(self) -> Result<Reply, ChannelError> {
        let envelope = match tokio::time::timeout(self.timeout, self.rx).await {
            Ok(Ok(envelope)) => envelope,
            Ok(Err(_)) => return Err(ChannelError::BackendGone),
            Err(_elapsed) => {
                return Err(ChannelError::TimedOut {
                    correlation_id: self.correlation_id,
                    timeout_ms: self.timeout.as_millis(),
                });
            }
        };
        if envelope.correlation_id != self.correlation_id {
            return Err(ChannelError::CorrelationMismatch {
                expected: self.correlation_id,
                actual: envelope.correlation_id,
            });
        }
        Ok(envelope.reply)
    }
}

/// The UI process's only handle on the backend.
///
/// Cheap to clone. Each method sends one request and waits for its
/// terminal reply.
#[derive(Debug, Clone)]
pub struct UiEndpoint {
    sender: mpsc::Sender<BackendMessage>,
    reply_timeout: Duration,
}

impl UiEndpoint {
    /// Queue a request without waiting for the reply.
    ///
    /// Requests are delivered in the order `submit` is called.
    ///
    /// # Errors
    ///
    /// [`ChannelError::BackendGone`] if the backend has shut down.
    pub async fn submit(
        &self,
        request: Request,
        ctx: RequestContext,
    ) -> Result<PendingReply, ChannelError> {
        let (tx, rx) = oneshot::channel();
        let correlation_id = ctx.correlation_id.clone();
        self.sender
            .send(BackendMessage::Request {
                request,
                ctx,
                reply: tx,
            })
            .await
            .map_err(|_| ChannelError::BackendGone)?;
        Ok(PendingReply {
            correlation_id,
            rx,
            timeout: self.reply_timeout,
        })
    }

    /// Send a request and wait for its reply.
    pub async fn request(
        &self,
        request: Request,
        ctx: RequestContext,
    ) -> Result<Reply, ChannelError> {
        self.submit(request, ctx).await?.wait().await
    }

    /// `connect-request`.
    pub async fn connect(&self) -> Result<Reply, ChannelError> {
        self.request(Request::ConnectRequest, RequestContext::default())
            .await
    }

    /// `create-record`.
    pub async fn create_record(&self, fields: CustomerFields) -> Result<Reply, ChannelError> {
        self.request(Request::CreateRecord(fields), RequestContext::default())
            .await
    }

    /// `update-record`.
    pub async fn update_record(
        &self,
        id: RecordId,
        fields: CustomerFields,
    ) -> Result<Reply, ChannelError> {
        self.request(
            Request::UpdateRecord(UpdatePayload { id, fields }),
            RequestContext::default(),
        )
        .await
    }

    /// `delete-record`.
    pub async fn delete_record(&self, id: RecordId) -> Result<Reply, ChannelError> {
        self.request(Request::DeleteRecord(id), RequestContext::default())
            .await
    }

    /// `search-by-name`.
    pub async fn search_by_name(&self, term: impl Into<String>) -> Result<Reply, ChannelError> {
        self.request(Request::SearchByName(term.into()), RequestContext::default())
            .await
    }

    /// `search-by-taxid`.
    pub async fn search_by_tax_id(
        &self,
        tax_id: impl Into<String>,
    ) -> Result<Reply, ChannelError> {
        self.request(
            Request::SearchByTaxId(tax_id.into()),
            RequestContext::default(),
        )
        .await
    }

    /// Whether the backend is still accepting requests.
    pub fn is_alive(&self) -> bool {
        !self.sender.is_closed()
    }

    /// A raw sender on the same queue, for control messages.
    pub(crate) fn control_sender(&self) -> mpsc::Sender<BackendMessage> {
        self.sender.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Answer every request on `inbox` with `reply`, optionally rewriting
    /// the correlation id.
    fn answer_with(mut inbox: BackendInbox, reply: Reply, corrupt_correlation: bool) {
        tokio::spawn(async move {
            while let Some(msg) = inbox.rx.recv().await {
                if let BackendMessage::Request { ctx, reply: tx, .. } = msg {
                    let correlation_id = if corrupt_correlation {
                        "someone-else".to_owned()
                    } else {
                        ctx.correlation_id
                    };
                    let _ = tx.send(ReplyEnvelope {
                        correlation_id,
                        reply: reply.clone(),
                    });
                }
            }
        });
    }

    #[tokio::test]
    async fn reply_is_matched_by_correlation_id() {
        let (ui, inbox) = bridge(4, Duration::from_secs(1));
        answer_with(inbox, Reply::RecordCreated, false);
        let reply = ui.create_record(CustomerFields::default()).await;
        assert_eq!(reply.expect("reply"), Reply::RecordCreated);
    }

    #[tokio::test]
    async fn mismatched_correlation_is_rejected() {
        let (ui, inbox) = bridge(4, Duration::from_secs(1));
        answer_with(inbox, Reply::RecordCreated, true);
        let err = ui
            .request(
                Request::ConnectRequest,
                RequestContext::default().with_correlation_id("mine"),
            )
            .await
            .unwrap_err();
        assert!(
            matches!(&err, ChannelError::CorrelationMismatch { expected, actual }
                if expected == "mine" && actual == "someone-else"),
            "got: {err:?}"
        );
    }

    #[tokio::test]
    async fn silent_backend_times_out() {
        let (ui, _inbox) = bridge(4, Duration::from_millis(50));
        let err = ui.search_by_name("an").await.unwrap_err();
        assert!(matches!(err, ChannelError::TimedOut { timeout_ms: 50, .. }));
    }

    #[tokio::test]
    async fn dropped_backend_is_gone() {
        let (ui, inbox) = bridge(4, Duration::from_secs(1));
        drop(inbox);
        assert!(!ui.is_alive());
        assert!(matches!(
            ui.connect().await,
            Err(ChannelError::BackendGone)
        ));
    }

    #[tokio::test]
    async fn requests_arrive_in_send_order() {
        let (ui, mut inbox) = bridge(8, Duration::from_secs(1));
        for term in ["a", "b", "c"] {
            ui.submit(Request::SearchByName(term.into()), RequestContext::default())
                .await
                .expect("submit");
        }
        let mut seen = Vec::new();
        for _ in 0..3 {
            if let Some(BackendMessage::Request {
                request: Request::SearchByName(term),
                ..
            }) = inbox.rx.recv().await
            {
                seen.push(term);
            }
        }
        assert_eq!(seen, vec!["a", "b", "c"]);
    }

    #[test]
    fn request_channel_names_match_vocabulary() {
        let requests = [
            Request::ConnectRequest,
            Request::CreateRecord(CustomerFields::default()),
            Request::UpdateRecord(UpdatePayload {
                id: RecordId::new("1"),
                fields: CustomerFields::default(),
            }),
            Request::DeleteRecord(RecordId::new("1")),
            Request::SearchByName(String::new()),
            Request::SearchByTaxId(String::new()),
        ];
        let channels: Vec<_> = requests.iter().map(Request::channel).collect();
        assert_eq!(channels, names::REQUESTS.to_vec());
    }

    #[test]
    fn directives_follow_terminal_replies() {
        assert_eq!(
            Reply::RecordCreated.directive().map(|d| d.channel()),
            Some("reset-form")
        );
        assert_eq!(
            Reply::DuplicateKey {
                field: "tax_id".into()
            }
            .directive()
            .map(|d| d.channel()),
            Some("duplicate-key-error")
        );
        assert_eq!(Reply::NotConnected.directive(), None);
    }

    #[test]
    fn default_contexts_get_distinct_correlation_ids() {
        assert_ne!(
            RequestContext::default().correlation_id,
            RequestContext::default().correlation_id
        );
    }
}
