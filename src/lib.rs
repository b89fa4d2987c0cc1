//! Backend and command protocol for a desktop customer registry.
//!
//! A UI process talks to this backend over a closed set of named channel
//! messages ([`Request`] / [`Reply`]). The [orchestrator](spawn_backend)
//! executes each request against the [`CustomerRepository`], which reaches
//! the document store only through the [`StoreGateway`].

mod channel;
pub use channel::{
    BackendInbox, PendingReply, Reply, ReplyEnvelope, Request, RequestContext, UiDirective,
    UiEndpoint, UpdatePayload, bridge, names,
};
pub mod config;
mod error;
pub mod form;
mod gateway;
pub use gateway::{ConnectionStatus, StoreGateway};
mod orchestrator;
pub mod record;
pub mod report;
mod repository;
pub mod store;
pub mod wire;

pub use error::{
    ChannelError, FieldError, ReportError, RepositoryError, StoreError, WireError,
};
pub use orchestrator::{
    BackendContext, BackendHandle, OrchestratorConfig, RequestPhase, run_orchestrator,
    spawn_backend,
};
pub use record::{CustomerFields, CustomerRecord, RecordId};
pub use repository::CustomerRepository;
pub use store::{DocumentStore, FileStore, MemoryStore};
