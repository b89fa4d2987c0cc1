//! Line-delimited JSON transport for the command channel.
//!
//! Each line is one message:
//!
//! ```text
//! {"channel": "create-record", "correlation_id": "c-1", "payload": {...}}
//! ```
//!
//! Incoming lines are validated at the boundary: an unknown channel or a
//! payload that does not fit its channel is answered with an
//! `unknown-channel` / `invalid-payload` reply and never reaches the
//! orchestrator. A line without a `correlation_id` is assigned a fresh one,
//! which the reply echoes.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinSet;

use crate::channel::{
    Reply, ReplyEnvelope, Request, RequestContext, UiEndpoint, UpdatePayload, names,
};
use crate::error::{ChannelError, WireError};
use crate::gateway::ConnectionStatus;
use crate::record::{CustomerFields, CustomerRecord, RecordId};

/// Untyped envelope, decoded before the channel name is trusted.
#[derive(Debug, Deserialize)]
struct RawMessage {
    channel: String,
    #[serde(default)]
    correlation_id: Option<String>,
    #[serde(default)]
    origin: Option<String>,
    #[serde(default)]
    payload: Value,
}

/// Typed request body, tagged by channel name.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "channel", content = "payload", rename_all = "kebab-case")]
enum RequestBody {
    ConnectRequest,
    CreateRecord(CustomerFields),
    UpdateRecord(UpdatePayload),
    DeleteRecord(RecordId),
    SearchByName(String),
    #[serde(rename = "search-by-taxid")]
    SearchByTaxId(String),
}

impl From<RequestBody> for Request {
    fn from(body: RequestBody) -> Self {
        match body {
            RequestBody::ConnectRequest => Self::ConnectRequest,
            RequestBody::CreateRecord(f) => Self::CreateRecord(f),
            RequestBody::UpdateRecord(u) => Self::UpdateRecord(u),
            RequestBody::DeleteRecord(id) => Self::DeleteRecord(id),
            RequestBody::SearchByName(t) => Self::SearchByName(t),
            RequestBody::SearchByTaxId(t) => Self::SearchByTaxId(t),
        }
    }
}

impl From<Request> for RequestBody {
    fn from(request: Request) -> Self {
        match request {
            Request::ConnectRequest => Self::ConnectRequest,
            Request::CreateRecord(f) => Self::CreateRecord(f),
            Request::UpdateRecord(u) => Self::UpdateRecord(u),
            Request::DeleteRecord(id) => Self::DeleteRecord(id),
            Request::SearchByName(t) => Self::SearchByName(t),
            Request::SearchByTaxId(t) => Self::SearchByTaxId(t),
        }
    }
}

#[derive(Serialize)]
struct RequestLine<'a> {
    correlation_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    origin: Option<&'a str>,
    #[serde(flatten)]
    body: RequestBody,
}

/// Typed reply body, tagged by channel name.
#[derive(Serialize)]
#[serde(tag = "channel", content = "payload", rename_all = "kebab-case")]
enum ReplyBody<'a> {
    ConnectionStatus(ConnectionStatus),
    RecordCreated,
    DuplicateKey { field: &'a str },
    NotFound { id: &'a str },
    ValidationError { field: &'a str, message: &'a str },
    CommandFailed { message: &'a str },
    NotConnected,
    SearchResults(&'a [CustomerRecord]),
    UnknownChannel { channel: &'a str },
    InvalidPayload { channel: &'a str, message: &'a str },
}

impl<'a> From<&'a Reply> for ReplyBody<'a> {
    fn from(reply: &'a Reply) -> Self {
        match reply {
            Reply::ConnectionStatus(s) => Self::ConnectionStatus(*s),
            Reply::RecordCreated => Self::RecordCreated,
            Reply::DuplicateKey { field } => Self::DuplicateKey { field },
            Reply::NotFound { id } => Self::NotFound { id },
            Reply::ValidationError { field, message } => Self::ValidationError { field, message },
            Reply::CommandFailed { message } => Self::CommandFailed { message },
            Reply::NotConnected => Self::NotConnected,
            Reply::SearchResults(records) => Self::SearchResults(records),
            Reply::UnknownChannel { channel } => Self::UnknownChannel { channel },
            Reply::InvalidPayload { channel, message } => {
                Self::InvalidPayload { channel, message }
            }
        }
    }
}

#[derive(Serialize)]
struct ReplyLine<'a> {
    correlation_id: &'a str,
    #[serde(flatten)]
    body: ReplyBody<'a>,
}

/// A line rejected at the boundary, with the correlation id to answer on.
#[derive(Debug)]
pub struct Rejected {
    /// Correlation id from the line, or a generated one.
    pub correlation_id: String,
    /// Why the line was rejected.
    pub error: WireError,
}

impl Rejected {
    /// The reply sent back for this rejection.
    pub fn reply(&self) -> Reply {
        match &self.error {
            WireError::UnknownChannel(channel) => Reply::UnknownChannel {
                channel: channel.clone(),
            },
            WireError::InvalidPayload { channel, message } => Reply::InvalidPayload {
                channel: channel.clone(),
                message: message.clone(),
            },
            other => Reply::InvalidPayload {
                channel: String::new(),
                message: other.to_string(),
            },
        }
    }

    /// The rejection as a reply envelope.
    pub fn into_envelope(self) -> ReplyEnvelope {
        ReplyEnvelope {
            reply: self.reply(),
            correlation_id: self.correlation_id,
        }
    }
}

/// Decode one request line.
///
/// # Errors
///
/// Returns [`Rejected`] carrying [`WireError::Malformed`] when the line is
/// not an envelope, [`WireError::UnknownChannel`] for a channel outside
/// the request vocabulary, and [`WireError::InvalidPayload`] when the
/// payload does not fit the channel.
pub fn decode_request(line: &str) -> Result<(RequestContext, Request), Rejected> {
    let raw: RawMessage = serde_json::from_str(line).map_err(|e| Rejected {
        correlation_id: RequestContext::default().correlation_id,
        error: WireError::Malformed(e),
    })?;

    let mut ctx = RequestContext::default();
    if let Some(id) = raw.correlation_id.filter(|id| !id.is_empty()) {
        ctx = ctx.with_correlation_id(id);
    }
    if let Some(origin) = raw.origin {
        ctx = ctx.with_origin(origin);
    }

    if !names::REQUESTS.contains(&raw.channel.as_str()) {
        return Err(Rejected {
            correlation_id: ctx.correlation_id,
            error: WireError::UnknownChannel(raw.channel),
        });
    }

    let mut tagged = serde_json::Map::new();
    tagged.insert("channel".into(), Value::String(raw.channel.clone()));
    if !raw.payload.is_null() {
        tagged.insert("payload".into(), raw.payload);
    }
    match serde_json::from_value::<RequestBody>(Value::Object(tagged)) {
        Ok(body) => Ok((ctx, body.into())),
        Err(e) => Err(Rejected {
            correlation_id: ctx.correlation_id,
            error: WireError::InvalidPayload {
                channel: raw.channel,
                message: e.to_string(),
            },
        }),
    }
}

/// Encode a request as one line, without the trailing newline.
pub fn encode_request(ctx: &RequestContext, request: Request) -> Result<String, WireError> {
    let line = RequestLine {
        correlation_id: &ctx.correlation_id,
        origin: ctx.origin.as_deref(),
        body: request.into(),
    };
    Ok(serde_json::to_string(&line)?)
}

/// Encode a reply as one line, without the trailing newline.
pub fn encode_reply(envelope: &ReplyEnvelope) -> Result<String, WireError> {
    let line = ReplyLine {
        correlation_id: &envelope.correlation_id,
        body: (&envelope.reply).into(),
    };
    Ok(serde_json::to_string(&line)?)
}

/// Serve the channel over a line-oriented byte stream until EOF.
///
/// Requests are submitted to `endpoint` in line order; replies are written
/// as they complete, so a slow command does not hold up a later search.
/// On EOF, outstanding replies are awaited and flushed before returning.
///
/// # Errors
///
/// Returns [`WireError::Io`] if reading or writing the stream fails.
pub async fn serve<R, W>(reader: R, writer: W, endpoint: UiEndpoint) -> Result<(), WireError>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (out_tx, out_rx) = mpsc::channel::<ReplyEnvelope>(64);
    let writer_task = tokio::spawn(write_replies(writer, out_rx));

    let mut lines = reader.lines();
    let mut replies = JoinSet::new();

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        while replies.try_join_next().is_some() {}

        let (ctx, request) = match decode_request(&line) {
            Ok(decoded) => decoded,
            Err(rejected) => {
                tracing::warn!(
                    correlation_id = %rejected.correlation_id,
                    error = %rejected.error,
                    "rejected line"
                );
                if out_tx.send(rejected.into_envelope()).await.is_err() {
                    break;
                }
                continue;
            }
        };

        let correlation_id = ctx.correlation_id.clone();
        match endpoint.submit(request, ctx).await {
            Ok(pending) => {
                let out = out_tx.clone();
                replies.spawn(async move {
                    let correlation_id = pending.correlation_id().to_owned();
                    let reply = pending.wait().await.unwrap_or_else(|e| {
                        tracing::warn!(%correlation_id, error = %e, "no reply from backend");
                        match e {
                            ChannelError::BackendGone => Reply::NotConnected,
                            other => Reply::CommandFailed {
                                message: other.to_string(),
                            },
                        }
                    });
                    let _ = out
                        .send(ReplyEnvelope {
                            correlation_id,
                            reply,
                        })
                        .await;
                });
            }
            Err(e) => {
                tracing::warn!(%correlation_id, error = %e, "backend unavailable");
                let envelope = ReplyEnvelope {
                    correlation_id,
                    reply: Reply::NotConnected,
                };
                if out_tx.send(envelope).await.is_err() {
                    break;
                }
            }
        }
    }

    while replies.join_next().await.is_some() {}
    drop(out_tx);

    writer_task
        .await
        .map_err(|e| WireError::Io(std::io::Error::other(format!("writer task failed: {e}"))))?
}

async fn write_replies<W>(mut writer: W, mut rx: mpsc::Receiver<ReplyEnvelope>) -> Result<(), WireError>
where
    W: AsyncWrite + Unpin,
{
    while let Some(envelope) = rx.recv().await {
        let mut line = match encode_reply(&envelope) {
            Ok(line) => line,
            Err(e) => {
                tracing::error!(
                    correlation_id = %envelope.correlation_id,
                    error = %e,
                    "failed to encode reply"
                );
                continue;
            }
        };
        line.push('\n');
        writer.write_all(line.as_bytes()).await?;
        writer.flush().await?;
    }
    writer.shutdown().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;
    use tokio::io::BufReader;

    use super::*;
    use crate::channel::bridge;
    use crate::record::test_fixtures::fields;

    #[test]
    fn decodes_create_record() {
        let line = json!({
            "channel": "create-record",
            "correlation_id": "c-1",
            "payload": {"name": "Ana", "tax_id": "111"},
        })
        .to_string();
        let (ctx, request) = decode_request(&line).expect("decode");
        assert_eq!(ctx.correlation_id, "c-1");
        match request {
            Request::CreateRecord(f) => {
                assert_eq!(f.name, "Ana");
                assert_eq!(f.tax_id, "111");
                assert!(f.email.is_empty());
            }
            other => panic!("unexpected request: {other:?}"),
        }
    }

    #[test]
    fn connect_request_needs_no_payload() {
        let (_, request) =
            decode_request(r#"{"channel":"connect-request","correlation_id":"c"}"#).expect("decode");
        assert_eq!(request, Request::ConnectRequest);
    }

    #[test]
    fn missing_correlation_id_is_generated() {
        let (ctx, request) =
            decode_request(r#"{"channel":"search-by-taxid","payload":"111"}"#).expect("decode");
        assert!(!ctx.correlation_id.is_empty());
        assert_eq!(request, Request::SearchByTaxId("111".into()));
    }

    #[test]
    fn unknown_channel_is_rejected() {
        let rejected = decode_request(r#"{"channel":"drop-table","correlation_id":"x"}"#)
            .unwrap_err();
        assert_eq!(rejected.correlation_id, "x");
        assert_eq!(
            rejected.reply(),
            Reply::UnknownChannel {
                channel: "drop-table".into()
            }
        );
    }

    #[test]
    fn wrong_payload_shape_is_rejected() {
        let rejected =
            decode_request(r#"{"channel":"search-by-name","correlation_id":"x","payload":42}"#)
                .unwrap_err();
        assert!(
            matches!(&rejected.error, WireError::InvalidPayload { channel, .. } if channel == "search-by-name"),
            "got: {:?}",
            rejected.error
        );
    }

    #[test]
    fn missing_payload_is_rejected() {
        let rejected =
            decode_request(r#"{"channel":"delete-record","correlation_id":"x"}"#).unwrap_err();
        assert!(matches!(rejected.error, WireError::InvalidPayload { .. }));
    }

    #[test]
    fn garbage_is_malformed() {
        let rejected = decode_request("not json").unwrap_err();
        assert!(matches!(rejected.error, WireError::Malformed(_)));
        assert!(matches!(rejected.reply(), Reply::InvalidPayload { .. }));
    }

    #[test]
    fn request_encoding_decodes_back() {
        let ctx = RequestContext::default()
            .with_correlation_id("c-9")
            .with_origin("search-box");
        let line = encode_request(&ctx, Request::SearchByName("an".into())).expect("encode");
        let (decoded_ctx, request) = decode_request(&line).expect("decode");
        assert_eq!(decoded_ctx, ctx);
        assert_eq!(request, Request::SearchByName("an".into()));
    }

    #[test]
    fn reply_shapes() {
        let encode = |reply: Reply| -> Value {
            let line = encode_reply(&ReplyEnvelope {
                correlation_id: "c".into(),
                reply,
            })
            .expect("encode");
            serde_json::from_str(&line).expect("json")
        };

        let status = encode(Reply::ConnectionStatus(ConnectionStatus::Connected));
        assert_eq!(
            status,
            json!({"correlation_id": "c", "channel": "connection-status", "payload": "connected"})
        );

        let created = encode(Reply::RecordCreated);
        assert_eq!(created["channel"], "record-created");

        let results = encode(Reply::SearchResults(Vec::new()));
        assert_eq!(results["channel"], "search-results");
        assert_eq!(results["payload"], json!([]));

        let dup = encode(Reply::DuplicateKey {
            field: "tax_id".into(),
        });
        assert_eq!(dup["payload"], json!({"field": "tax_id"}));
    }

    #[tokio::test]
    async fn serve_answers_every_line() {
        let (ui, mut inbox) = bridge(8, Duration::from_secs(1));
        tokio::spawn(async move {
            while let Some(msg) = inbox.rx.recv().await {
                if let crate::channel::BackendMessage::Request { ctx, reply, .. } = msg {
                    let _ = reply.send(ReplyEnvelope {
                        correlation_id: ctx.correlation_id,
                        reply: Reply::RecordCreated,
                    });
                }
            }
        });

        let create = encode_request(
            &RequestContext::default().with_correlation_id("a"),
            Request::CreateRecord(fields("Ana", "111")),
        )
        .expect("encode");
        let input = format!("{create}\n\n{{\"channel\":\"bogus\",\"correlation_id\":\"b\"}}\n");

        let (client, server_out) = tokio::io::duplex(4096);
        serve(BufReader::new(input.as_bytes()), server_out, ui)
            .await
            .expect("serve");

        let mut lines = BufReader::new(client).lines();
        let mut by_id = std::collections::HashMap::new();
        while let Some(line) = lines.next_line().await.expect("read") {
            let value: Value = serde_json::from_str(&line).expect("json");
            by_id.insert(
                value["correlation_id"].as_str().expect("id").to_owned(),
                value["channel"].as_str().expect("channel").to_owned(),
            );
        }
        assert_eq!(by_id.len(), 2);
        assert_eq!(by_id["a"], "record-created");
        assert_eq!(by_id["b"], "unknown-channel");
    }
}
