//! Backend orchestrator: turns channel requests into repository calls and
//! terminal replies.
//!
//! The orchestrator loop receives [`BackendMessage`]s from the bridge in
//! send order and runs each request as an independent task, so a slow
//! create never blocks a search. Every request walks the same phases
//! (`received → validating → executing → replying → done`) inside a
//! tracing span that carries its correlation id, and every request gets
//! exactly one reply: repository failures are converted here and never
//! cross the channel as raw errors.
//!
//! Public API: [`BackendContext`], [`OrchestratorConfig`],
//! [`spawn_backend`] and the [`BackendHandle`] it returns.

use std::fmt;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::{JoinHandle, JoinSet};
use tracing::Instrument;

use crate::channel::{
    BackendInbox, BackendMessage, Reply, ReplyEnvelope, Request, RequestContext, UiEndpoint,
    UpdatePayload, bridge,
};
use crate::error::{RepositoryError, StoreError};
use crate::gateway::{ConnectionStatus, StoreGateway};
use crate::record::CustomerFields;
use crate::repository::CustomerRepository;
use crate::store::DocumentStore;

/// Process-lifetime state handed to every request handler.
///
/// Replaces ambient singletons: the handlers reach the store only through
/// this context. `Clone` is cheap.
pub struct BackendContext<S: DocumentStore> {
    /// Owner of the store connection.
    pub gateway: Arc<StoreGateway<S>>,
    /// Typed CRUD over the same gateway.
    pub repository: CustomerRepository<S>,
}

impl<S: DocumentStore> Clone for BackendContext<S> {
    fn clone(&self) -> Self {
        Self {
            gateway: Arc::clone(&self.gateway),
            repository: self.repository.clone(),
        }
    }
}

impl<S: DocumentStore> BackendContext<S> {
    /// Build the context around a store. Nothing is connected yet.
    pub fn new(store: S) -> Self {
        let gateway = Arc::new(StoreGateway::new(store));
        let repository = CustomerRepository::new(Arc::clone(&gateway));
        Self {
            gateway,
            repository,
        }
    }
}

/// Tuning knobs for the bridge and the orchestrator.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Bound of the request queue.
    pub channel_capacity: usize,
    /// How long the UI endpoint waits for each reply.
    pub reply_timeout: Duration,
    /// Pause between a successful connect and the `connection-status`
    /// reply, giving a remote store time to settle.
    pub status_reply_delay: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 32,
            reply_timeout: Duration::from_secs(10),
            status_reply_delay: Duration::from_millis(500),
        }
    }
}

/// Lifecycle phase of a single request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestPhase {
    Received,
    Validating,
    Executing,
    Replying,
    Done,
}

impl fmt::Display for RequestPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Received => "received",
            Self::Validating => "validating",
            Self::Executing => "executing",
            Self::Replying => "replying",
            Self::Done => "done",
        })
    }
}

fn enter(phase: RequestPhase) {
    tracing::debug!(%phase, "request phase");
}

/// Handle to a running backend.
#[derive(Debug)]
pub struct BackendHandle {
    sender: mpsc::Sender<BackendMessage>,
    task: JoinHandle<Result<(), StoreError>>,
}

impl BackendHandle {
    /// Stop intake, let in-flight requests finish, then disconnect the store.
    ///
    /// Requests still queued behind the shutdown are answered with
    /// [`Reply::NotConnected`].
    ///
    /// # Errors
    ///
    /// Returns the error from the store's `disconnect`, or an I/O error if
    /// the orchestrator task panicked.
    pub async fn shutdown(self) -> Result<(), StoreError> {
        // Fails only if the loop already exited; joining covers that case.
        let _ = self.sender.send(BackendMessage::Shutdown).await;
        self.task
            .await
            .map_err(|e| StoreError::Io(io::Error::other(format!("orchestrator task failed: {e}"))))?
    }
}

/// Start the orchestrator on the current tokio runtime.
///
/// # Returns
///
/// The UI side of the bridge and a [`BackendHandle`] for shutdown.
pub fn spawn_backend<S: DocumentStore>(
    ctx: BackendContext<S>,
    config: OrchestratorConfig,
) -> (UiEndpoint, BackendHandle) {
    let (ui, inbox) = bridge(config.channel_capacity, config.reply_timeout);
    // Shares the request queue, so a shutdown lands behind every request
    // sent before it.
    let sender = ui.control_sender();
    let task = tokio::spawn(run_orchestrator(ctx, inbox, config));
    (ui, BackendHandle { sender, task })
}

/// Run the orchestrator loop until a shutdown message arrives or every
/// sender is dropped.
///
/// On exit: close intake, answer anything still queued with
/// `not-connected`, await in-flight requests, then disconnect the store.
///
/// # Errors
///
/// Returns the error from [`StoreGateway::disconnect`].
pub async fn run_orchestrator<S: DocumentStore>(
    ctx: BackendContext<S>,
    inbox: BackendInbox,
    config: OrchestratorConfig,
) -> Result<(), StoreError> {
    let mut rx = inbox.rx;
    let mut in_flight = JoinSet::new();

    loop {
        tokio::select! {
            msg = rx.recv() => match msg {
                Some(BackendMessage::Request { request, ctx: rctx, reply }) => {
                    if request == Request::ConnectRequest {
                        ctx.gateway.announce_connect();
                    }
                    in_flight.spawn(handle_request(
                        ctx.clone(),
                        config.clone(),
                        request,
                        rctx,
                        reply,
                    ));
                }
                Some(BackendMessage::Shutdown) | None => break,
            },
            Some(joined) = in_flight.join_next(), if !in_flight.is_empty() => {
                if let Err(e) = joined {
                    tracing::error!(error = %e, "request task failed");
                }
            }
        }
    }

    rx.close();
    while let Some(msg) = rx.recv().await {
        if let BackendMessage::Request { ctx: rctx, reply, .. } = msg {
            let _ = reply.send(ReplyEnvelope {
                correlation_id: rctx.correlation_id,
                reply: Reply::NotConnected,
            });
        }
    }

    let pending = in_flight.len();
    if pending > 0 {
        tracing::info!(pending, "waiting for in-flight requests");
    }
    while let Some(joined) = in_flight.join_next().await {
        if let Err(e) = joined {
            tracing::error!(error = %e, "request task failed");
        }
    }

    ctx.gateway.disconnect().await
}

async fn handle_request<S: DocumentStore>(
    ctx: BackendContext<S>,
    config: OrchestratorConfig,
    request: Request,
    rctx: RequestContext,
    reply_tx: oneshot::Sender<ReplyEnvelope>,
) {
    let span = tracing::info_span!(
        "request",
        channel = request.channel(),
        correlation_id = %rctx.correlation_id,
        origin = rctx.origin.as_deref().unwrap_or("-"),
    );
    async move {
        enter(RequestPhase::Received);
        let reply = execute(&ctx, &config, request).await;

        enter(RequestPhase::Replying);
        tracing::debug!(reply = reply.channel(), "sending reply");
        // A dropped receiver means the UI gave up (timeout); nothing to do.
        if reply_tx
            .send(ReplyEnvelope {
                correlation_id: rctx.correlation_id,
                reply,
            })
            .is_err()
        {
            tracing::warn!("requester went away before the reply");
        }
        enter(RequestPhase::Done);
    }
    .instrument(span)
    .await
}

/// Run one request to its terminal reply.
async fn execute<S: DocumentStore>(
    ctx: &BackendContext<S>,
    config: &OrchestratorConfig,
    request: Request,
) -> Reply {
    if request == Request::ConnectRequest {
        return connect(ctx, config).await;
    }

    // Commands issued while a connect is in flight wait for its outcome.
    match ctx.gateway.settled_status().await {
        ConnectionStatus::Connected => {}
        status => {
            tracing::warn!(?status, "command rejected: store not connected");
            return Reply::NotConnected;
        }
    }

    enter(RequestPhase::Validating);
    let command = match validate(request) {
        Ok(command) => command,
        Err(reply) => return reply,
    };

    enter(RequestPhase::Executing);
    let repo = &ctx.repository;
    let outcome = match command {
        Command::Create(fields) => repo.create(fields).await.map(|_| Reply::RecordCreated),
        Command::Update(UpdatePayload { id, fields }) => {
            repo.update(&id, fields).await.map(|()| Reply::RecordCreated)
        }
        Command::Delete(id) => repo.delete(&id).await.map(|()| Reply::RecordCreated),
        Command::SearchByName(term) => repo.find_by_name(&term).await.map(Reply::SearchResults),
        Command::SearchByTaxId(tax_id) => repo
            .find_by_tax_id(&tax_id)
            .await
            .map(Reply::SearchResults),
    };

    outcome.unwrap_or_else(error_reply)
}

/// A request whose payload passed boundary validation.
enum Command {
    Create(CustomerFields),
    Update(UpdatePayload),
    Delete(crate::record::RecordId),
    SearchByName(String),
    SearchByTaxId(String),
}

fn validation_reply(field: &str, message: impl Into<String>) -> Reply {
    Reply::ValidationError {
        field: field.to_owned(),
        message: message.into(),
    }
}

/// Check payload shapes before anything touches the repository.
fn validate(request: Request) -> Result<Command, Reply> {
    match request {
        Request::ConnectRequest => Err(Reply::CommandFailed {
            message: "connect-request is not a record command".into(),
        }),
        Request::CreateRecord(fields) => fields
            .validate()
            .map(Command::Create)
            .map_err(|e| validation_reply(e.field, e.message)),
        Request::UpdateRecord(UpdatePayload { id, fields }) => {
            if id.as_str().trim().is_empty() {
                return Err(validation_reply("id", "is required"));
            }
            fields
                .validate()
                .map(|fields| Command::Update(UpdatePayload { id, fields }))
                .map_err(|e| validation_reply(e.field, e.message))
        }
        Request::DeleteRecord(id) => {
            if id.as_str().trim().is_empty() {
                return Err(validation_reply("id", "is required"));
            }
            Ok(Command::Delete(id))
        }
        Request::SearchByName(term) => Ok(Command::SearchByName(term.trim().to_owned())),
        Request::SearchByTaxId(tax_id) => {
            let tax_id = tax_id.trim().to_owned();
            if tax_id.is_empty() {
                return Err(validation_reply("tax_id", "is required"));
            }
            Ok(Command::SearchByTaxId(tax_id))
        }
    }
}

fn error_reply(err: RepositoryError) -> Reply {
    match err {
        RepositoryError::Validation(f) => validation_reply(f.field, f.message),
        RepositoryError::DuplicateKey { tax_id } => {
            tracing::info!(%tax_id, "duplicate tax-id rejected");
            Reply::DuplicateKey {
                field: "tax_id".into(),
            }
        }
        RepositoryError::NotFound { id } => Reply::NotFound { id },
        RepositoryError::Connection(message) => {
            tracing::warn!(%message, "store connection lost");
            Reply::NotConnected
        }
        RepositoryError::Store(message) => {
            tracing::error!(%message, "command failed");
            Reply::CommandFailed { message }
        }
    }
}

async fn connect<S: DocumentStore>(ctx: &BackendContext<S>, config: &OrchestratorConfig) -> Reply {
    enter(RequestPhase::Executing);
    if let Err(e) = ctx.gateway.connect().await {
        tracing::error!(error = %e, "connect-request failed");
        return Reply::ConnectionStatus(ConnectionStatus::Disconnected);
    }
    if !config.status_reply_delay.is_zero() {
        tokio::time::sleep(config.status_reply_delay).await;
    }
    Reply::ConnectionStatus(ctx.gateway.status())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::ReplyEnvelope;
    use crate::record::RecordId;
    use crate::record::test_fixtures::fields;
    use crate::store::MemoryStore;

    fn test_config() -> OrchestratorConfig {
        OrchestratorConfig {
            channel_capacity: 16,
            reply_timeout: Duration::from_secs(5),
            status_reply_delay: Duration::ZERO,
        }
    }

    async fn connected_backend() -> (UiEndpoint, BackendHandle, BackendContext<MemoryStore>) {
        let ctx = BackendContext::new(MemoryStore::new());
        let (ui, handle) = spawn_backend(ctx.clone(), test_config());
        assert_eq!(
            ui.connect().await.expect("connect reply"),
            Reply::ConnectionStatus(ConnectionStatus::Connected)
        );
        (ui, handle, ctx)
    }

    async fn id_of(ui: &UiEndpoint, tax_id: &str) -> RecordId {
        match ui.search_by_tax_id(tax_id).await.expect("search") {
            Reply::SearchResults(mut records) if records.len() == 1 => records.remove(0).id,
            other => panic!("expected one result, got: {other:?}"),
        }
    }

    #[tokio::test]
    async fn commands_before_connect_are_rejected() {
        let ctx = BackendContext::new(MemoryStore::new());
        let (ui, handle) = spawn_backend(ctx, test_config());

        let reply = ui.create_record(fields("Ana", "111")).await.expect("reply");
        assert_eq!(reply, Reply::NotConnected);

        handle.shutdown().await.expect("shutdown");
    }

    #[tokio::test]
    async fn unreachable_store_reports_disconnected() {
        let ctx = BackendContext::new(MemoryStore::unreachable());
        let (ui, handle) = spawn_backend(ctx, test_config());

        assert_eq!(
            ui.connect().await.expect("reply"),
            Reply::ConnectionStatus(ConnectionStatus::Disconnected)
        );
        assert_eq!(
            ui.search_by_name("an").await.expect("reply"),
            Reply::NotConnected
        );

        handle.shutdown().await.expect("shutdown");
    }

    #[tokio::test]
    async fn command_sent_during_connect_waits_for_it() {
        let ctx = BackendContext::new(MemoryStore::new());
        let config = OrchestratorConfig {
            status_reply_delay: Duration::from_millis(50),
            ..test_config()
        };
        let (ui, handle) = spawn_backend(ctx, config);

        let connect = ui
            .submit(Request::ConnectRequest, RequestContext::default())
            .await
            .expect("submit connect");
        let create = ui
            .submit(
                Request::CreateRecord(fields("Ana", "111")),
                RequestContext::default(),
            )
            .await
            .expect("submit create");

        assert_eq!(create.wait().await.expect("reply"), Reply::RecordCreated);
        assert_eq!(
            connect.wait().await.expect("reply"),
            Reply::ConnectionStatus(ConnectionStatus::Connected)
        );

        handle.shutdown().await.expect("shutdown");
    }

    #[tokio::test]
    async fn repeated_connect_requests_are_harmless() {
        let (ui, handle, _ctx) = connected_backend().await;
        assert_eq!(
            ui.connect().await.expect("reply"),
            Reply::ConnectionStatus(ConnectionStatus::Connected)
        );
        handle.shutdown().await.expect("shutdown");
    }

    #[tokio::test]
    async fn create_then_duplicate() {
        let (ui, handle, ctx) = connected_backend().await;

        assert_eq!(
            ui.create_record(fields("Ana", "111")).await.expect("reply"),
            Reply::RecordCreated
        );
        assert_eq!(
            ui.create_record(fields("Bia", "111")).await.expect("reply"),
            Reply::DuplicateKey {
                field: "tax_id".into()
            }
        );
        assert_eq!(
            ctx.repository.find_by_name("").await.expect("find").len(),
            1
        );

        handle.shutdown().await.expect("shutdown");
    }

    #[tokio::test]
    async fn invalid_payload_gets_validation_reply() {
        let (ui, handle, ctx) = connected_backend().await;

        let reply = ui.create_record(fields("Ana", "")).await.expect("reply");
        assert!(
            matches!(&reply, Reply::ValidationError { field, .. } if field == "tax_id"),
            "got: {reply:?}"
        );
        assert!(ctx.repository.find_by_name("").await.expect("find").is_empty());

        let reply = ui.search_by_tax_id("  ").await.expect("reply");
        assert!(matches!(reply, Reply::ValidationError { .. }));

        let reply = ui.delete_record(RecordId::new("")).await.expect("reply");
        assert!(matches!(&reply, Reply::ValidationError { field, .. } if field == "id"));

        handle.shutdown().await.expect("shutdown");
    }

    #[tokio::test]
    async fn update_and_delete_follow_create_pattern() {
        let (ui, handle, _ctx) = connected_backend().await;
        ui.create_record(fields("Ana", "111")).await.expect("reply");
        ui.create_record(fields("Bia", "222")).await.expect("reply");
        let bia = id_of(&ui, "222").await;

        assert_eq!(
            ui.update_record(bia.clone(), fields("Bia", "111"))
                .await
                .expect("reply"),
            Reply::DuplicateKey {
                field: "tax_id".into()
            }
        );
        assert_eq!(
            ui.update_record(bia.clone(), fields("Beatriz", "222"))
                .await
                .expect("reply"),
            Reply::RecordCreated
        );
        assert_eq!(
            ui.update_record(RecordId::new("ghost"), fields("X", "999"))
                .await
                .expect("reply"),
            Reply::NotFound { id: "ghost".into() }
        );

        assert_eq!(
            ui.delete_record(bia.clone()).await.expect("reply"),
            Reply::RecordCreated
        );
        assert_eq!(
            ui.delete_record(bia.clone()).await.expect("reply"),
            Reply::NotFound {
                id: bia.to_string()
            }
        );

        handle.shutdown().await.expect("shutdown");
    }

    #[tokio::test]
    async fn search_always_replies_with_a_list() {
        let (ui, handle, _ctx) = connected_backend().await;
        assert_eq!(
            ui.search_by_name("nobody").await.expect("reply"),
            Reply::SearchResults(Vec::new())
        );
        handle.shutdown().await.expect("shutdown");
    }

    #[tokio::test]
    async fn concurrent_requests_each_get_one_reply() {
        let (ui, handle, ctx) = connected_backend().await;

        let mut pending = Vec::new();
        for i in 0..20 {
            let fields = fields(&format!("Cliente {i}"), &format!("{i:03}"));
            pending.push(
                ui.submit(Request::CreateRecord(fields), RequestContext::default())
                    .await
                    .expect("submit"),
            );
            pending.push(
                ui.submit(
                    Request::SearchByName("cliente".into()),
                    RequestContext::default(),
                )
                .await
                .expect("submit"),
            );
        }
        for p in pending {
            p.wait().await.expect("every request gets a reply");
        }
        assert_eq!(
            ctx.repository.find_by_name("").await.expect("find").len(),
            20
        );

        handle.shutdown().await.expect("shutdown");
    }

    #[tokio::test]
    async fn shutdown_disconnects_after_in_flight_work() {
        let (ui, handle, ctx) = connected_backend().await;
        let pending = ui
            .submit(
                Request::CreateRecord(fields("Ana", "111")),
                RequestContext::default(),
            )
            .await
            .expect("submit");

        handle.shutdown().await.expect("shutdown");

        // Queued before the shutdown, so it was either served or refused,
        // never dropped.
        let reply = pending.wait().await.expect("reply");
        assert!(
            matches!(reply, Reply::RecordCreated | Reply::NotConnected),
            "got: {reply:?}"
        );
        assert_eq!(ctx.gateway.status(), ConnectionStatus::Disconnected);
        assert!(!ui.is_alive());
    }

    #[tokio::test]
    async fn reply_carries_request_correlation_id() {
        let ctx = BackendContext::new(MemoryStore::new());
        let (ui, inbox) = bridge(4, Duration::from_secs(5));
        let task = tokio::spawn(run_orchestrator(ctx, inbox, test_config()));

        let (tx, rx) = oneshot::channel();
        ui.control_sender()
            .send(BackendMessage::Request {
                request: Request::SearchByName("x".into()),
                ctx: RequestContext::default().with_correlation_id("corr-7"),
                reply: tx,
            })
            .await
            .expect("send");
        let ReplyEnvelope {
            correlation_id,
            reply,
        } = rx.await.expect("reply");
        assert_eq!(correlation_id, "corr-7");
        assert_eq!(reply, Reply::NotConnected);

        drop(ui);
        task.await.expect("join").expect("clean exit");
    }

    #[test]
    fn phases_display_lowercase() {
        let phases = [
            RequestPhase::Received,
            RequestPhase::Validating,
            RequestPhase::Executing,
            RequestPhase::Replying,
            RequestPhase::Done,
        ];
        let shown: Vec<_> = phases.iter().map(ToString::to_string).collect();
        assert_eq!(
            shown,
            vec!["received", "validating", "executing", "replying", "done"]
        );
    }
}
