use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use std::time::Duration;

use bytes::Bytes;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use relayrpc_codec::{decode_json, encode_json, Codec, Serialization, Value, DEFAULT_MAX_DEPTH};
use relayrpc_frame::{Frame, FrameCodec, FrameError, FrameKind, DEFAULT_MAX_PAYLOAD};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, oneshot};
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{PeerError, Result};
use crate::functions::FunctionTable;
use crate::handshake::{HandshakeConfig, HandshakeResult};
use crate::ids::{IdAllocator, Role};
use crate::message::{Failure, Message, Outcome};
use crate::relay::{persistent_registry, Staged};
use crate::table::{CorrelationTable, Entry, SlotGuard};

/// Settings shared by both sides of a call channel.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    pub handshake: HandshakeConfig,
    /// Functions exported to the remote side.
    pub functions: FunctionTable,
    /// Largest message payload sent or accepted after the handshake.
    pub max_payload_size: usize,
    /// Nesting limit for the tagged codec.
    pub max_depth: usize,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            handshake: HandshakeConfig::default(),
            functions: FunctionTable::new(),
            max_payload_size: DEFAULT_MAX_PAYLOAD,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

impl ConnectionConfig {
    pub fn with_functions(mut self, functions: FunctionTable) -> Self {
        self.functions = functions;
        self
    }

    pub fn with_handshake(mut self, handshake: HandshakeConfig) -> Self {
        self.handshake = handshake;
        self
    }

    pub fn with_serialization(mut self, serialization: Serialization) -> Self {
        self.handshake = self.handshake.with_serialization(serialization);
        self
    }

    pub fn with_max_payload_size(mut self, max_payload_size: usize) -> Self {
        self.max_payload_size = max_payload_size;
        self
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }
}

enum WireFormat {
    Tagged(Codec<Connection>),
    Json,
}

struct Inner {
    peer_id: String,
    role: Role,
    serialization: Serialization,
    ids: IdAllocator,
    table: CorrelationTable,
    wire: WireFormat,
    functions: FunctionTable,
    max_payload: usize,
    /// `None` once the connection is torn down. Held while encoding so that
    /// anything an extension queues goes out after the message carrying its id.
    outbound: Mutex<Option<mpsc::UnboundedSender<Bytes>>>,
    /// Relay work produced by the encode in progress. Only touched under
    /// `outbound`.
    staged: Mutex<Vec<Staged>>,
    close_reason: OnceLock<String>,
    shutdown: CancellationToken,
}

/// A persistent, multiplexed call channel.
///
/// Cloning is cheap; every clone drives the same connection. Either side may
/// call functions the other exports, and values passed in either direction
/// may carry streams, sinks, pending values and closures, which stay live
/// until the connection closes.
///
/// The connection ends when either side closes the stream, when
/// [`close`](Self::close) is called, or when the peer sends anything that is
/// not a well-formed message. Every waiting caller then fails with
/// [`PeerError::Disconnected`], relayed streams end and relayed pending
/// values are rejected.
#[derive(Clone)]
pub struct Connection {
    inner: Arc<Inner>,
}

impl Connection {
    pub(crate) fn start<S>(
        mut framed: Framed<S, FrameCodec>,
        handshake: HandshakeResult,
        role: Role,
        config: &ConnectionConfig,
    ) -> Connection
    where
        S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        framed
            .codec_mut()
            .set_max_payload_size(config.max_payload_size);

        let wire = match handshake.serialization {
            Serialization::Tagged => WireFormat::Tagged(
                Codec::new(persistent_registry()).with_max_depth(config.max_depth),
            ),
            Serialization::Json => WireFormat::Json,
        };
        let (tx, rx) = mpsc::unbounded_channel();
        let conn = Connection {
            inner: Arc::new(Inner {
                peer_id: handshake.peer_id,
                role,
                serialization: handshake.serialization,
                ids: IdAllocator::new(role.partition()),
                table: CorrelationTable::new(),
                wire,
                functions: config.functions.clone(),
                max_payload: config.max_payload_size,
                outbound: Mutex::new(Some(tx)),
                staged: Mutex::new(Vec::new()),
                close_reason: OnceLock::new(),
                shutdown: CancellationToken::new(),
            }),
        };

        info!(
            peer_id = %conn.inner.peer_id,
            role = ?role,
            serialization = %handshake.serialization,
            "connection established"
        );

        let (sink, stream) = framed.split();
        tokio::spawn(write_loop(conn.clone(), sink, rx));
        tokio::spawn(read_loop(conn.clone(), stream));
        conn
    }

    pub fn peer_id(&self) -> &str {
        &self.inner.peer_id
    }

    pub fn role(&self) -> Role {
        self.inner.role
    }

    pub fn serialization(&self) -> Serialization {
        self.inner.serialization
    }

    /// Call a function exported by the remote side.
    pub async fn invoke(&self, name: &str, args: Vec<Value>) -> Result<Value> {
        let id = self.inner.ids.next()?;
        let outcome = self
            .request(id, Message::Call {
                id,
                name: name.to_string(),
                args,
            })
            .await?;
        outcome.map_err(Failure::into_error)
    }

    /// [`invoke`](Self::invoke) bounded by `timeout`. On expiry the reply
    /// slot is released and a late reply is ignored.
    pub async fn invoke_with_timeout(
        &self,
        name: &str,
        args: Vec<Value>,
        timeout: Duration,
    ) -> Result<Value> {
        tokio::time::timeout(timeout, self.invoke(name, args))
            .await
            .map_err(|_| PeerError::Timeout(timeout))?
    }

    /// Apply a closure the remote side exported under `function`.
    pub(crate) async fn apply(&self, function: i64, args: Vec<Value>) -> Result<Value> {
        let id = self.inner.ids.next()?;
        let outcome = self.request(id, Message::Apply { function, id, args }).await?;
        outcome.map_err(Failure::into_error)
    }

    async fn request(&self, id: i64, message: Message) -> Result<Outcome> {
        let (tx, rx) = oneshot::channel();
        self.inner.table.insert(id, Entry::Reply(tx))?;
        let _slot = SlotGuard {
            table: &self.inner.table,
            id,
        };
        self.send(message)?;
        rx.await.map_err(|_| self.disconnected())
    }

    /// Close the connection. Messages already queued are still written.
    pub fn close(&self) {
        self.teardown("closed locally");
    }

    pub fn is_closed(&self) -> bool {
        self.inner.shutdown.is_cancelled()
    }

    /// Resolves once the connection has been torn down.
    pub async fn closed(&self) {
        self.inner.shutdown.cancelled().await;
    }

    /// Correlation ids currently registered: waiting callers, open streams,
    /// unsettled promises and exported closures.
    pub fn in_flight(&self) -> usize {
        self.inner.table.len()
    }

    pub(crate) fn next_id(&self) -> Result<i64> {
        self.inner.ids.next()
    }

    pub(crate) fn table(&self) -> &CorrelationTable {
        &self.inner.table
    }

    /// Whether `id` was allocated by this side.
    pub(crate) fn owns(&self, id: i64) -> bool {
        self.inner.ids.owns(id)
    }

    /// Hold relay work until the message being encoded is queued.
    pub(crate) fn stage(&self, staged: Staged) {
        self.inner
            .staged
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(staged);
    }

    /// Encode and queue one message.
    ///
    /// Relay work staged while encoding only takes effect for a message that
    /// is actually queued. If encoding fails, the payload is too large or the
    /// connection is gone, it is dropped: no table entry stays behind and
    /// local streams and pending values handed to the message are released.
    pub(crate) fn send(&self, message: Message) -> Result<()> {
        let outbound = self
            .inner
            .outbound
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let Some(tx) = outbound.as_ref() else {
            return Err(self.disconnected());
        };

        let tag = message.tag();
        let encoded = match &self.inner.wire {
            WireFormat::Tagged(codec) => codec.encode(message.into_value(), self),
            WireFormat::Json => encode_json(&message.into_value()),
        };
        let staged = std::mem::take(
            &mut *self
                .inner
                .staged
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        );
        let bytes = encoded?;
        if bytes.len() > self.inner.max_payload {
            return Err(FrameError::PayloadTooLarge {
                size: bytes.len(),
                max: self.inner.max_payload,
            }
            .into());
        }

        // Entries go in before the message is queued, so the peer cannot
        // answer an id this side does not know yet.
        let mut registered = Vec::new();
        let mut follow_ups = Vec::new();
        for item in staged {
            match item {
                Staged::Entry(id, entry) => match self.inner.table.insert(id, entry) {
                    Ok(()) => registered.push(id),
                    Err(err) => warn!(id, error = %err, "relay entry not registered"),
                },
                other => follow_ups.push(other),
            }
        }
        if tx.send(bytes).is_err() {
            for id in registered {
                self.inner.table.remove(id);
            }
            return Err(self.disconnected());
        }
        debug!(peer_id = %self.inner.peer_id, tag, "message queued");
        for item in follow_ups {
            item.start(self);
        }
        Ok(())
    }

    fn decode(&self, payload: &[u8]) -> Result<Message> {
        let value = match &self.inner.wire {
            WireFormat::Tagged(codec) => codec.decode(payload, self)?,
            WireFormat::Json => decode_json(payload)?,
        };
        Message::from_value(value)
    }

    fn dispatch(&self, message: Message) {
        match message {
            Message::Call { id, name, args } => match self.inner.functions.get(&name) {
                Some(function) => {
                    let conn = self.clone();
                    tokio::spawn(async move {
                        let result = tokio::select! {
                            _ = conn.closed() => return,
                            result = function.call(args) => result,
                        };
                        conn.reply(id, result.map_err(Failure::rejected), false);
                    });
                }
                None => {
                    debug!(id, name = %name, "call to unknown function");
                    self.reply(id, Err(Failure::unknown_function(name)), false);
                }
            },
            Message::Apply { function, id, args } => match self.inner.table.closure(function) {
                Some(closure) => {
                    let conn = self.clone();
                    tokio::spawn(async move {
                        let result = tokio::select! {
                            _ = conn.closed() => return,
                            result = closure.call(args) => result,
                        };
                        conn.reply(id, result.map_err(Failure::rejected), true);
                    });
                }
                None => {
                    debug!(id, function, "apply to unknown closure");
                    self.reply(
                        id,
                        Err(Failure::unknown_function(format!("closure {function}"))),
                        true,
                    );
                }
            },
            Message::Result { id, outcome } | Message::ApplyResult { id, outcome } => {
                match self.inner.table.take_reply(id) {
                    Some(tx) => {
                        // The caller may have timed out in the meantime.
                        let _ = tx.send(outcome);
                    }
                    None => debug!(id, "reply for unknown call ignored"),
                }
            }
            Message::Enqueue { id, chunk } => match self.inner.table.stream(id) {
                Some(sink) => {
                    if sink.send(chunk).is_err() {
                        debug!(id, "chunk dropped; stream no longer read");
                    }
                }
                None => debug!(id, "chunk for unknown stream ignored"),
            },
            Message::Close { id } => {
                if self.inner.table.take_stream(id).is_none() {
                    debug!(id, "close for unknown stream ignored");
                }
            }
            Message::PromiseFulfill { id, value } => match self.inner.table.take_promise(id) {
                Some(resolver) => resolver.fulfill(value),
                None => debug!(id, "settlement for unknown promise ignored"),
            },
            Message::PromiseRejected { id, reason } => match self.inner.table.take_promise(id) {
                Some(resolver) => resolver.reject(reason),
                None => debug!(id, "settlement for unknown promise ignored"),
            },
        }
    }

    fn reply(&self, id: i64, outcome: Outcome, apply: bool) {
        let message = |outcome| {
            if apply {
                Message::ApplyResult { id, outcome }
            } else {
                Message::Result { id, outcome }
            }
        };
        match self.send(message(outcome)) {
            Ok(()) => {}
            Err(err) if err.is_unsendable() => {
                warn!(id, error = %err, "result could not be sent");
                let reason = Value::String(format!("result could not be sent: {err}"));
                if let Err(err) = self.send(message(Err(Failure::rejected(reason)))) {
                    debug!(id, error = %err, "failure reply not sent");
                }
            }
            Err(err) => debug!(id, error = %err, "reply not sent"),
        }
    }

    fn disconnected(&self) -> PeerError {
        PeerError::Disconnected(
            self.inner
                .close_reason
                .get()
                .cloned()
                .unwrap_or_else(|| "connection closed".to_string()),
        )
    }

    fn teardown(&self, reason: &str) {
        if self.inner.close_reason.set(reason.to_string()).is_ok() {
            info!(peer_id = %self.inner.peer_id, reason, "connection closed");
        }
        self.inner.shutdown.cancel();
        self.inner
            .outbound
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        self.inner.table.clear();
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("peer_id", &self.inner.peer_id)
            .field("role", &self.inner.role)
            .field("serialization", &self.inner.serialization)
            .field("in_flight", &self.inner.table.len())
            .field("closed", &self.is_closed())
            .finish()
    }
}

async fn read_loop<S>(conn: Connection, mut stream: SplitStream<Framed<S, FrameCodec>>)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let reason = loop {
        let next = tokio::select! {
            _ = conn.closed() => break "closed locally".to_string(),
            next = stream.next() => next,
        };
        let frame = match next {
            None => break "closed by peer".to_string(),
            Some(Err(err)) => break format!("read failed: {err}"),
            Some(Ok(frame)) => frame,
        };
        if frame.kind != FrameKind::Message {
            break format!("unexpected {} frame", frame.kind);
        }
        match conn.decode(&frame.payload) {
            Ok(message) => {
                debug!(id = message.id(), tag = message.tag(), "message received");
                conn.dispatch(message);
            }
            Err(err) => break format!("malformed message: {err}"),
        }
    };
    // Also clears anything a decode registered while a local close raced it.
    conn.teardown(&reason);
}

async fn write_loop<S>(
    conn: Connection,
    mut sink: SplitSink<Framed<S, FrameCodec>, Frame>,
    mut rx: mpsc::UnboundedReceiver<Bytes>,
) where
    S: AsyncRead + AsyncWrite + Unpin,
{
    // Ends once teardown drops the sender and the queue is drained.
    while let Some(payload) = rx.recv().await {
        if let Err(err) = sink.send(Frame::new(FrameKind::Message, payload)).await {
            conn.teardown(&format!("write failed: {err}"));
            return;
        }
    }
    if let Err(err) = sink.close().await {
        debug!(error = %err, "closing stream failed");
    }
}
