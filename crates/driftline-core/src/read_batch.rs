//! Debounced, deduplicated read-receipt batching.
//!
//! Rapid successive unread messages would otherwise generate one mark-read
//! call each. [`ReadBatcher`] coalesces them: ids arriving inside a rolling
//! window are deduplicated against an already-processed set, and the window's
//! expiry produces a single batched flush. The window is an explicit deadline
//! swept by [`ReadBatcher::tick`]; there is no hidden timer.

use std::{collections::HashSet, time::Duration};

use crate::types::{ConversationId, MessageId};

/// Default debounce window between the first queued id and the flush.
pub const DEFAULT_READ_BATCH_WINDOW: Duration = Duration::from_millis(1000);

/// One batched flush: per-conversation distinct message ids, each exactly
/// once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadBatch {
    /// Ids grouped by conversation, in enqueue order.
    pub entries: Vec<(ConversationId, Vec<MessageId>)>,
}

impl ReadBatch {
    /// Total number of message ids across all conversations.
    pub fn len(&self) -> usize {
        self.entries.iter().map(|(_, ids)| ids.len()).sum()
    }

    /// Whether the batch carries no ids.
    pub fn is_empty(&self) -> bool {
        self.entries.iter().all(|(_, ids)| ids.is_empty())
    }
}

/// Debouncing batcher for mark-as-read requests.
///
/// # Concurrency guard
///
/// At most one flush is in flight at a time. Ids arriving while a flush is
/// outstanding buffer into the next window instead of triggering an
/// overlapping request. The caller reports the flush outcome via
/// [`ReadBatcher::on_flush_success`] / [`ReadBatcher::on_flush_failure`];
/// failure rolls back processed-set membership so a retry can occur
/// (best-effort, not exactly-once).
#[derive(Debug, Clone)]
pub struct ReadBatcher<I> {
    window: Duration,
    /// Ids queued for the next flush, grouped by conversation in enqueue
    /// order.
    queued: Vec<(ConversationId, Vec<MessageId>)>,
    /// Everything queued or flushed so far; the dedup set.
    processed: HashSet<(ConversationId, MessageId)>,
    /// When the current window expires. `None` while nothing is queued;
    /// clearing this field cancels the scheduled flush.
    deadline: Option<I>,
    /// The batch currently being flushed, if any.
    in_flight: Option<ReadBatch>,
}

impl<I> ReadBatcher<I>
where
    I: Copy + Ord + std::ops::Add<Duration, Output = I>,
{
    /// Create a batcher with the given debounce window.
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            queued: Vec::new(),
            processed: HashSet::new(),
            deadline: None,
            in_flight: None,
        }
    }

    /// When the pending window expires, if one is open.
    ///
    /// Drivers sleep until this instant and then call [`Self::tick`].
    pub fn deadline(&self) -> Option<I> {
        self.deadline
    }

    /// Whether a flush is currently outstanding.
    pub fn flush_in_flight(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Queue one message id for batched marking.
    ///
    /// Returns `false` when the id was already processed (or already
    /// queued) and was dropped by dedup. The first id of a window opens it;
    /// later ids do NOT extend the deadline, so the flush fires at a fixed
    /// delay after the first arrival.
    pub fn enqueue(
        &mut self,
        conversation_id: impl Into<ConversationId>,
        message_id: impl Into<MessageId>,
        now: I,
    ) -> bool {
        let key = (conversation_id.into(), message_id.into());
        if !self.processed.insert(key.clone()) {
            return false;
        }

        let (conversation_id, message_id) = key;
        match self.queued.iter_mut().find(|(c, _)| *c == conversation_id) {
            Some((_, ids)) => ids.push(message_id),
            None => self.queued.push((conversation_id, vec![message_id])),
        }

        if self.deadline.is_none() {
            self.deadline = Some(now + self.window);
        }
        true
    }

    /// Sweep the window deadline.
    ///
    /// Returns the batch to flush when the window has expired and no flush
    /// is outstanding. While a flush is in flight the deadline is left in
    /// place, so the buffered ids go out right after the outcome is
    /// reported.
    pub fn tick(&mut self, now: I) -> Option<ReadBatch> {
        let deadline = self.deadline?;
        if deadline > now || self.in_flight.is_some() || self.queued.is_empty() {
            return None;
        }

        self.deadline = None;
        let batch = ReadBatch { entries: std::mem::take(&mut self.queued) };
        self.in_flight = Some(batch.clone());
        Some(batch)
    }

    /// The outstanding flush completed.
    pub fn on_flush_success(&mut self) {
        self.in_flight = None;
    }

    /// The outstanding flush failed.
    ///
    /// Rolls back processed-set membership for the failed ids so a later
    /// [`Self::enqueue`] of the same id passes dedup and retries.
    pub fn on_flush_failure(&mut self) {
        let Some(batch) = self.in_flight.take() else { return };
        for (conversation_id, ids) in batch.entries {
            for message_id in ids {
                self.processed.remove(&(conversation_id.clone(), message_id));
            }
        }
    }

    /// Drop all pending state (conversation switch or teardown).
    ///
    /// The processed set survives so a switch back does not re-mark ids the
    /// server already acknowledged.
    pub fn cancel_window(&mut self) {
        self.queued.clear();
        self.deadline = None;
    }
}

impl<I> Default for ReadBatcher<I>
where
    I: Copy + Ord + std::ops::Add<Duration, Output = I>,
{
    fn default() -> Self {
        Self::new(DEFAULT_READ_BATCH_WINDOW)
    }
}
