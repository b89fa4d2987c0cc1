//! UI-side mirror of the customer form.
//!
//! [`FormState`] holds what the window shows: field values, create or edit
//! mode, the connection indicator and a pending notice. It changes only
//! through [`FormState::apply`] (a reply arrived) and
//! [`FormState::acknowledge`] (the user dismissed the notice), so the UI
//! can be driven and tested without the backend.
//!
//! Replies that end in a dialog defer their form change until the dialog
//! is acknowledged: the user reads "cliente cadastrado" before the form is
//! cleared.

use crate::channel::{Reply, Request, UiDirective, UpdatePayload};
use crate::gateway::ConnectionStatus;
use crate::record::{CustomerFields, CustomerRecord, RecordId};

/// Which set of buttons is active.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormMode {
    /// Blank or new-entry form: only "create" is enabled.
    Create,
    /// A stored record is loaded: "update" and "delete" are enabled.
    Edit(RecordId),
}

/// Button enablement derived from the mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Buttons {
    pub create: bool,
    pub update: bool,
    pub delete: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    Info,
    Warning,
    Error,
}

/// A dialog waiting for the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub kind: NoticeKind,
    pub message: String,
}

impl Notice {
    fn new(kind: NoticeKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// The last search the user ran, kept for the not-found prefill.
#[derive(Debug, Clone, PartialEq, Eq)]
enum SearchTerm {
    Name(String),
    TaxId(String),
}

/// Form change applied when the pending notice is acknowledged.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Deferred {
    Directive(UiDirective),
    Prefill(SearchTerm),
    Highlight(String),
}

/// State of the customer window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormState {
    fields: CustomerFields,
    mode: FormMode,
    connection: ConnectionStatus,
    highlighted: Option<String>,
    last_search: Option<SearchTerm>,
    notice: Option<Notice>,
    deferred: Option<Deferred>,
}

impl Default for FormState {
    fn default() -> Self {
        Self::new()
    }
}

impl FormState {
    /// A blank form in create mode, before the connection is known.
    pub fn new() -> Self {
        Self {
            fields: CustomerFields::default(),
            mode: FormMode::Create,
            connection: ConnectionStatus::Disconnected,
            highlighted: None,
            last_search: None,
            notice: None,
            deferred: None,
        }
    }

    pub fn fields(&self) -> &CustomerFields {
        &self.fields
    }

    /// Mutable access for typing into the form. Editing clears the
    /// field highlight.
    pub fn fields_mut(&mut self) -> &mut CustomerFields {
        self.highlighted = None;
        &mut self.fields
    }

    pub fn mode(&self) -> &FormMode {
        &self.mode
    }

    /// Connection indicator.
    pub fn connection(&self) -> ConnectionStatus {
        self.connection
    }

    /// Field currently marked as needing correction.
    pub fn highlighted(&self) -> Option<&str> {
        self.highlighted.as_deref()
    }

    /// The dialog waiting for acknowledgement, if any.
    pub fn notice(&self) -> Option<&Notice> {
        self.notice.as_ref()
    }

    /// Button enablement. Create and update/delete are mutually exclusive.
    pub fn buttons(&self) -> Buttons {
        let editing = matches!(self.mode, FormMode::Edit(_));
        Buttons {
            create: !editing,
            update: editing,
            delete: editing,
        }
    }

    /// The request the submit button sends in the current mode.
    pub fn submission(&self) -> Request {
        match &self.mode {
            FormMode::Create => Request::CreateRecord(self.fields.clone()),
            FormMode::Edit(id) => Request::UpdateRecord(UpdatePayload {
                id: id.clone(),
                fields: self.fields.clone(),
            }),
        }
    }

    /// `delete-record` for the loaded record; `None` in create mode.
    pub fn delete_request(&self) -> Option<Request> {
        match &self.mode {
            FormMode::Edit(id) => Some(Request::DeleteRecord(id.clone())),
            FormMode::Create => None,
        }
    }

    /// `search-by-name` for `term`, or `None` (with a notice) when blank.
    pub fn search_by_name(&mut self, term: &str) -> Option<Request> {
        let term = self.search_term(term)?;
        self.last_search = Some(SearchTerm::Name(term.clone()));
        Some(Request::SearchByName(term))
    }

    /// `search-by-taxid` for `tax_id`, or `None` (with a notice) when blank.
    pub fn search_by_tax_id(&mut self, tax_id: &str) -> Option<Request> {
        let tax_id = self.search_term(tax_id)?;
        self.last_search = Some(SearchTerm::TaxId(tax_id.clone()));
        Some(Request::SearchByTaxId(tax_id))
    }

    fn search_term(&mut self, raw: &str) -> Option<String> {
        let term = raw.trim();
        if term.is_empty() {
            self.notice = Some(Notice::new(
                NoticeKind::Warning,
                "Preencha o campo de busca.",
            ));
            return None;
        }
        Some(term.to_owned())
    }

    /// Update the mirror from a backend reply.
    pub fn apply(&mut self, reply: &Reply) {
        match reply {
            Reply::ConnectionStatus(status) => self.connection = *status,
            Reply::RecordCreated => {
                self.notify(NoticeKind::Info, "Operação realizada com sucesso.");
                self.deferred = reply.directive().map(Deferred::Directive);
            }
            Reply::DuplicateKey { .. } => {
                self.notify(
                    NoticeKind::Warning,
                    "CPF já cadastrado. Verifique o número digitado.",
                );
                self.deferred = reply.directive().map(Deferred::Directive);
            }
            Reply::NotFound { .. } => {
                self.notify(NoticeKind::Warning, "Cliente não encontrado.");
                self.deferred = Some(Deferred::Directive(UiDirective::ResetForm));
            }
            Reply::ValidationError { field, message } => {
                self.notify(
                    NoticeKind::Warning,
                    format!("Campo inválido ({field}): {message}"),
                );
                self.deferred = Some(Deferred::Highlight(field.clone()));
            }
            Reply::CommandFailed { message } => self.notify(
                NoticeKind::Error,
                format!("Não foi possível concluir a operação: {message}"),
            ),
            Reply::NotConnected => {
                self.connection = ConnectionStatus::Disconnected;
                self.notify(NoticeKind::Error, "Banco de dados desconectado.");
            }
            Reply::SearchResults(records) => self.apply_results(records),
            Reply::UnknownChannel { channel } => self.notify(
                NoticeKind::Error,
                format!("Comando desconhecido: {channel}"),
            ),
            Reply::InvalidPayload { message, .. } => self.notify(
                NoticeKind::Error,
                format!("Dados inválidos: {message}"),
            ),
        }
    }

    fn apply_results(&mut self, records: &[CustomerRecord]) {
        match records.last() {
            Some(record) => {
                self.fields = record.fields.clone();
                self.mode = FormMode::Edit(record.id.clone());
                self.highlighted = None;
            }
            None => {
                self.notify(
                    NoticeKind::Info,
                    "Cliente não cadastrado. Preencha os dados para cadastrar.",
                );
                self.deferred = self.last_search.clone().map(Deferred::Prefill);
            }
        }
    }

    fn notify(&mut self, kind: NoticeKind, message: impl Into<String>) {
        self.notice = Some(Notice::new(kind, message));
        self.deferred = None;
    }

    /// Dismiss the pending notice and apply the change it was holding back.
    pub fn acknowledge(&mut self) {
        self.notice = None;
        match self.deferred.take() {
            Some(Deferred::Directive(UiDirective::ResetForm)) => self.reset(),
            Some(Deferred::Directive(UiDirective::DuplicateKeyError)) => {
                self.fields.tax_id.clear();
                self.highlighted = Some("tax_id".to_owned());
            }
            Some(Deferred::Highlight(field)) => self.highlighted = Some(field),
            Some(Deferred::Prefill(term)) => {
                self.reset();
                match term {
                    SearchTerm::Name(name) => self.fields.name = name,
                    SearchTerm::TaxId(tax_id) => self.fields.tax_id = tax_id,
                }
            }
            None => {}
        }
    }

    /// Clear every field and return to create mode. The connection
    /// indicator is kept.
    pub fn reset(&mut self) {
        self.fields = CustomerFields::default();
        self.mode = FormMode::Create;
        self.highlighted = None;
    }
}
