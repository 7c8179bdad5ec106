use dashmap::mapref::entry::Entry as MapEntry;
use dashmap::DashMap;
use relayrpc_codec::{Closure, Resolver, ValueSink};
use tokio::sync::oneshot;

use crate::error::{PeerError, Result};
use crate::message::Outcome;

/// Continuation registered under a correlation id.
pub(crate) enum Entry {
    /// Waiting caller of `call` or `apply`. One-shot.
    Reply(oneshot::Sender<Outcome>),
    /// Destination of `enqueue` chunks until `close`.
    Stream(ValueSink),
    /// Settled by the first `promise fulfill` or `promise rejected`.
    Promise(Resolver),
    /// Exported closure answering every `apply`. Lives until teardown.
    Closure(Closure),
}

impl Entry {
    fn name(&self) -> &'static str {
        match self {
            Entry::Reply(_) => "reply",
            Entry::Stream(_) => "stream",
            Entry::Promise(_) => "promise",
            Entry::Closure(_) => "closure",
        }
    }
}

/// Per-connection map from correlation id to continuation.
///
/// Every operation touches one entry atomically. One-shot entries are
/// removed by the frame that completes them; [`clear`](Self::clear) drops
/// everything at teardown, which wakes waiting callers with a closed channel,
/// ends decoded streams and abandons decoded promises.
#[derive(Default)]
pub(crate) struct CorrelationTable {
    entries: DashMap<i64, Entry>,
}

impl CorrelationTable {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Register a continuation. Ids are unique per connection, so an occupied
    /// slot means the peer reused an id.
    pub(crate) fn insert(&self, id: i64, entry: Entry) -> Result<()> {
        match self.entries.entry(id) {
            MapEntry::Occupied(existing) => Err(PeerError::Protocol(format!(
                "correlation id {id} already registered as {}",
                existing.get().name()
            ))),
            MapEntry::Vacant(slot) => {
                slot.insert(entry);
                Ok(())
            }
        }
    }

    pub(crate) fn take_reply(&self, id: i64) -> Option<oneshot::Sender<Outcome>> {
        match self
            .entries
            .remove_if(&id, |_, entry| matches!(entry, Entry::Reply(_)))
        {
            Some((_, Entry::Reply(tx))) => Some(tx),
            _ => None,
        }
    }

    pub(crate) fn take_promise(&self, id: i64) -> Option<Resolver> {
        match self
            .entries
            .remove_if(&id, |_, entry| matches!(entry, Entry::Promise(_)))
        {
            Some((_, Entry::Promise(resolver))) => Some(resolver),
            _ => None,
        }
    }

    pub(crate) fn take_stream(&self, id: i64) -> Option<ValueSink> {
        match self
            .entries
            .remove_if(&id, |_, entry| matches!(entry, Entry::Stream(_)))
        {
            Some((_, Entry::Stream(sink))) => Some(sink),
            _ => None,
        }
    }

    pub(crate) fn stream(&self, id: i64) -> Option<ValueSink> {
        self.entries.get(&id).and_then(|entry| match entry.value() {
            Entry::Stream(sink) => Some(sink.clone()),
            _ => None,
        })
    }

    pub(crate) fn closure(&self, id: i64) -> Option<Closure> {
        self.entries.get(&id).and_then(|entry| match entry.value() {
            Entry::Closure(closure) => Some(closure.clone()),
            _ => None,
        })
    }

    pub(crate) fn remove(&self, id: i64) -> bool {
        self.entries.remove(&id).is_some()
    }

    pub(crate) fn clear(&self) {
        self.entries.clear();
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Removes a caller's reply slot on every exit path.
pub(crate) struct SlotGuard<'a> {
    pub(crate) table: &'a CorrelationTable,
    pub(crate) id: i64,
}

impl Drop for SlotGuard<'_> {
    fn drop(&mut self) {
        self.table.remove(self.id);
    }
}
