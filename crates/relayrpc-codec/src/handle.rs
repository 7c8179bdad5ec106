//! Handles for values that cannot be written as plain data.
//!
//! Each handle owns a live resource: [`ValueStream`] the receiving end of a
//! chunk channel, [`ValueSink`] a sending end, [`PendingValue`] a future that
//! settles once, [`Closure`] a shared async callable. Relay extensions turn
//! them into correlation ids on the wire and rebuild equivalent handles on
//! the other side.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures_core::future::BoxFuture;
use tokio::sync::{mpsc, oneshot};

use crate::value::Value;

/// Readable sequence of values.
///
/// Ends once every [`ValueSink`] feeding it has been dropped.
pub struct ValueStream {
    rx: mpsc::UnboundedReceiver<Value>,
}

impl ValueStream {
    /// A connected sink/stream pair.
    pub fn channel() -> (ValueSink, ValueStream) {
        let (tx, rx) = mpsc::unbounded_channel();
        (ValueSink { tx }, ValueStream { rx })
    }

    /// A stream that yields `items` and then ends.
    pub fn from_values<I>(items: I) -> ValueStream
    where
        I: IntoIterator,
        I::Item: Into<Value>,
    {
        let (sink, stream) = Self::channel();
        for item in items {
            // The receiver is alive, so this cannot fail.
            let _ = sink.send(item.into());
        }
        stream
    }

    /// Next chunk, or `None` once the stream has ended.
    pub async fn recv(&mut self) -> Option<Value> {
        self.rx.recv().await
    }

    /// Drain the stream to its end.
    pub async fn into_vec(mut self) -> Vec<Value> {
        let mut items = Vec::new();
        while let Some(item) = self.rx.recv().await {
            items.push(item);
        }
        items
    }
}

impl futures_core::Stream for ValueStream {
    type Item = Value;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Value>> {
        self.rx.poll_recv(cx)
    }
}

impl fmt::Debug for ValueStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValueStream").finish_non_exhaustive()
    }
}

/// Writable end of a [`ValueStream`]. Cloneable; the stream ends when the
/// last clone is dropped.
#[derive(Clone)]
pub struct ValueSink {
    tx: mpsc::UnboundedSender<Value>,
}

impl ValueSink {
    /// Push a chunk. Returns the chunk back if the reading side is gone.
    pub fn send(&self, value: Value) -> Result<(), Value> {
        self.tx.send(value).map_err(|err| err.0)
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Resolves once the reading side has been dropped.
    pub async fn closed(&self) {
        self.tx.closed().await
    }

    /// Whether both sinks feed the same stream.
    pub fn same_channel(&self, other: &ValueSink) -> bool {
        self.tx.same_channel(&other.tx)
    }
}

impl fmt::Debug for ValueSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValueSink")
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Why a [`PendingValue`] did not produce a value.
#[derive(Debug, PartialEq)]
pub enum Rejection {
    /// Rejected with an explicit reason.
    Reason(Value),
    /// The producer went away without settling.
    Abandoned,
}

impl Rejection {
    /// The reason as a value; abandonment becomes a descriptive string.
    pub fn into_value(self) -> Value {
        match self {
            Rejection::Reason(reason) => reason,
            Rejection::Abandoned => Value::from("pending value was abandoned"),
        }
    }
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::Reason(reason) => write!(f, "rejected: {reason}"),
            Rejection::Abandoned => f.write_str("abandoned"),
        }
    }
}

/// A value that settles exactly once, to a value or a [`Rejection`].
pub struct PendingValue {
    inner: BoxFuture<'static, Result<Value, Rejection>>,
}

impl PendingValue {
    /// Wrap a future; `Err` settles as a rejection with that reason.
    pub fn new<F>(fut: F) -> Self
    where
        F: Future<Output = Result<Value, Value>> + Send + 'static,
    {
        Self {
            inner: Box::pin(async move { fut.await.map_err(Rejection::Reason) }),
        }
    }

    /// A pending value settled through the returned [`Resolver`].
    ///
    /// Dropping the resolver unsettled rejects with [`Rejection::Abandoned`].
    pub fn channel() -> (Resolver, PendingValue) {
        let (tx, rx) = oneshot::channel();
        let pending = PendingValue {
            inner: Box::pin(async move {
                match rx.await {
                    Ok(Ok(value)) => Ok(value),
                    Ok(Err(reason)) => Err(Rejection::Reason(reason)),
                    Err(_) => Err(Rejection::Abandoned),
                }
            }),
        };
        (Resolver { tx }, pending)
    }

    pub fn fulfilled(value: Value) -> Self {
        Self::new(async move { Ok(value) })
    }

    pub fn rejected(reason: Value) -> Self {
        Self::new(async move { Err(reason) })
    }
}

impl Future for PendingValue {
    type Output = Result<Value, Rejection>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.inner.as_mut().poll(cx)
    }
}

impl fmt::Debug for PendingValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingValue").finish_non_exhaustive()
    }
}

/// Settles the paired [`PendingValue`]. Consumed on use.
#[derive(Debug)]
pub struct Resolver {
    tx: oneshot::Sender<Result<Value, Value>>,
}

impl Resolver {
    pub fn fulfill(self, value: Value) {
        let _ = self.tx.send(Ok(value));
    }

    pub fn reject(self, reason: Value) {
        let _ = self.tx.send(Err(reason));
    }
}

type ClosureFn = dyn Fn(Vec<Value>) -> BoxFuture<'static, Result<Value, Value>> + Send + Sync;

/// A shareable async callable taking positional arguments.
///
/// `Err` carries the rejection reason.
#[derive(Clone)]
pub struct Closure(Arc<ClosureFn>);

impl Closure {
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: Fn(Vec<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, Value>> + Send + 'static,
    {
        Closure(Arc::new(
            move |args| -> BoxFuture<'static, Result<Value, Value>> { Box::pin(f(args)) },
        ))
    }

    pub fn call(&self, args: Vec<Value>) -> BoxFuture<'static, Result<Value, Value>> {
        (self.0)(args)
    }

    pub fn ptr_eq(&self, other: &Closure) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Closure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Closure").finish_non_exhaustive()
    }
}
