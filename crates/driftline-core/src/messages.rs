//! Per-conversation message reconciliation.
//!
//! [`MessageStore`] maintains the ordered, deduplicated message sequence for
//! exactly one conversation, merging three inputs into one consistent view:
//! paginated history fetches, optimistic local sends, and inbound real-time
//! events. At most one store per conversation is alive; switching
//! conversations discards the old instance together with its load
//! generation, which is what cancels stale in-flight pages.

use std::collections::HashSet;

use crate::{
    error::ReconcileError,
    types::{
        ConversationId, DeliveryStatus, LoadTicket, Message, MessageId, PageInfo, PendingSend,
        ReadReceipt, TimestampMs, UserRef,
    },
};

/// Confirmation state of a stored message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SendState {
    /// Optimistic local send, not yet acknowledged.
    Pending,
    /// Server-acknowledged (or server-originated).
    Confirmed,
}

#[derive(Debug, Clone)]
struct Entry {
    message: Message,
    state: SendState,
}

/// Result of applying a fetched page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageOutcome {
    /// The page was merged; `appended` new messages entered the store.
    Applied {
        /// Number of messages that were not already present.
        appended: usize,
    },
    /// The ticket was superseded (newer load or conversation switch); the
    /// page was dropped without touching state.
    Stale,
}

/// Result of applying an inbound real-time message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InboundOutcome {
    /// New message, inserted in timestamp order.
    Appended,
    /// Already present (reconnection replay); read receipts were absorbed,
    /// nothing was re-appended.
    Duplicate,
    /// Belongs to a different conversation; dropped.
    Ignored,
}

/// Ordered, deduplicated message set for one conversation.
///
/// # Invariants
///
/// - `id` is unique within the store
/// - messages are kept in non-decreasing `timestamp_ms` order, ties broken
///   by insertion order
/// - a message's `read_by` set only grows until removal
#[derive(Debug, Clone)]
pub struct MessageStore {
    conversation_id: ConversationId,
    entries: Vec<Entry>,
    ids: HashSet<MessageId>,
    has_more: bool,
    generation: u64,
    last_error: Option<ReconcileError>,
}

impl MessageStore {
    /// Create an empty store bound to one conversation.
    pub fn new(conversation_id: impl Into<ConversationId>) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            entries: Vec::new(),
            ids: HashSet::new(),
            has_more: true,
            generation: 0,
            last_error: None,
        }
    }

    /// The conversation this store is bound to.
    pub fn conversation_id(&self) -> &str {
        &self.conversation_id
    }

    /// Messages in display order.
    pub fn messages(&self) -> impl Iterator<Item = &Message> {
        self.entries.iter().map(|e| &e.message)
    }

    /// Number of stored messages.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the store holds no messages.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Look up a message by id.
    pub fn get(&self, message_id: &str) -> Option<&Message> {
        self.entries.iter().find(|e| e.message.id == message_id).map(|e| &e.message)
    }

    /// Whether older history pages remain on the server.
    pub fn has_more(&self) -> bool {
        self.has_more
    }

    /// Most recent reconciliation fault, if any. Cleared by the next
    /// successful page merge.
    pub fn last_error(&self) -> Option<&ReconcileError> {
        self.last_error.as_ref()
    }

    /// Issue a ticket for a page load, superseding any outstanding one.
    ///
    /// The returned ticket must accompany [`Self::apply_page`] or
    /// [`Self::fail_page_load`]; a response carrying an older ticket is
    /// silently dropped.
    pub fn begin_page_load(&mut self, page: u32, limit: u32) -> LoadTicket {
        self.generation += 1;
        LoadTicket {
            scope: self.conversation_id.clone(),
            generation: self.generation,
            page,
            limit,
        }
    }

    /// Merge a fetched page.
    ///
    /// Page 1 replaces local state; later pages append to it. Messages whose
    /// id is already present are skipped. `has_more` is taken from the page
    /// metadata when present, otherwise from the full-sized-page heuristic.
    pub fn apply_page(
        &mut self,
        ticket: &LoadTicket,
        items: Vec<Message>,
        info: Option<PageInfo>,
    ) -> PageOutcome {
        if !self.ticket_is_current(ticket) {
            tracing::debug!(
                scope = %ticket.scope,
                page = ticket.page,
                "dropping stale page response"
            );
            return PageOutcome::Stale;
        }

        if ticket.page == 1 {
            self.entries.clear();
            self.ids.clear();
        }

        let full_page = items.len() as u32 >= ticket.limit;
        let mut appended = 0;
        for message in items {
            if self.ids.contains(&message.id) {
                continue;
            }
            self.ids.insert(message.id.clone());
            self.entries.push(Entry { message, state: SendState::Confirmed });
            appended += 1;
        }
        self.entries.sort_by_key(|e| e.message.timestamp_ms);

        self.has_more = info.map_or(full_page, |i| i.has_more);
        self.last_error = None;
        PageOutcome::Applied { appended }
    }

    /// Record a failed page load as a scoped, retryable fault.
    ///
    /// A failure for a superseded ticket is dropped like its data would be.
    pub fn fail_page_load(&mut self, ticket: &LoadTicket, reason: impl Into<String>) {
        if !self.ticket_is_current(ticket) {
            return;
        }
        self.last_error = Some(ReconcileError::PageLoad {
            scope: ticket.scope.clone(),
            page: ticket.page,
            reason: reason.into(),
        });
    }

    /// Append an optimistic send immediately, in `Sent` status.
    ///
    /// The pending entry is keyed by its temp id until
    /// [`Self::confirm_send`] promotes it or [`Self::fail_send`] removes it.
    pub fn apply_optimistic_send(&mut self, pending: &PendingSend, sender: UserRef) {
        if self.ids.contains(&pending.temp_id) {
            return;
        }
        let message = Message {
            id: pending.temp_id.clone(),
            conversation_id: self.conversation_id.clone(),
            sender,
            content: pending.content.clone(),
            timestamp_ms: pending.submitted_at_ms,
            read_by: Vec::new(),
            kind: pending.kind,
            edited: false,
            edited_at_ms: None,
        };
        self.ids.insert(pending.temp_id.clone());
        self.entries.push(Entry { message, state: SendState::Pending });
    }

    /// Promote an optimistic send with the authoritative server record.
    ///
    /// Replaces the pending entry in place (same position) when the temp id
    /// correlates; falls back to the inbound path when it does not (the ack
    /// arrived for an entry we no longer hold).
    pub fn confirm_send(&mut self, temp_id: &str, message: Message) {
        let Some(index) = self.entries.iter().position(|e| e.message.id == temp_id) else {
            self.apply_inbound(message);
            return;
        };

        self.ids.remove(temp_id);
        self.ids.insert(message.id.clone());

        let entry = &mut self.entries[index];
        let local_receipts = std::mem::take(&mut entry.message.read_by);
        entry.message = message;
        merge_receipts(&mut entry.message.read_by, local_receipts);
        entry.state = SendState::Confirmed;
    }

    /// Drop a failed optimistic send and return it for re-offering.
    ///
    /// The typed content is preserved in the returned [`PendingSend`]; the
    /// fault is recorded as the store's scoped error.
    pub fn fail_send(&mut self, temp_id: &str, reason: impl Into<String>) -> Option<PendingSend> {
        let index = self.entries.iter().position(|e| e.message.id == temp_id)?;
        let entry = self.entries.remove(index);
        self.ids.remove(temp_id);
        self.last_error = Some(ReconcileError::SendFailed {
            temp_id: temp_id.to_owned(),
            reason: reason.into(),
        });
        Some(PendingSend {
            temp_id: entry.message.id,
            content: entry.message.content,
            kind: entry.message.kind,
            submitted_at_ms: entry.message.timestamp_ms,
        })
    }

    /// Apply an inbound real-time message.
    ///
    /// Idempotent against duplicate delivery from reconnection replay: an
    /// already-present id is not re-appended, but its read receipts are
    /// still absorbed.
    pub fn apply_inbound(&mut self, message: Message) -> InboundOutcome {
        if message.conversation_id != self.conversation_id {
            tracing::debug!(
                conversation = %message.conversation_id,
                bound = %self.conversation_id,
                "dropping inbound message for other conversation"
            );
            return InboundOutcome::Ignored;
        }

        if self.ids.contains(&message.id) {
            if let Some(entry) = self.entries.iter_mut().find(|e| e.message.id == message.id) {
                merge_receipts(&mut entry.message.read_by, message.read_by);
            }
            return InboundOutcome::Duplicate;
        }

        self.ids.insert(message.id.clone());
        let position = self
            .entries
            .iter()
            .rposition(|e| e.message.timestamp_ms <= message.timestamp_ms)
            .map_or(0, |i| i + 1);
        self.entries.insert(position, Entry { message, state: SendState::Confirmed });
        InboundOutcome::Appended
    }

    /// Absorb a server read event for a batch of messages.
    ///
    /// Returns how many messages gained a new receipt. Ids not present are
    /// skipped - replayed events may reference pruned history.
    pub fn apply_read(
        &mut self,
        message_ids: &[MessageId],
        reader: &str,
        read_at_ms: TimestampMs,
    ) -> usize {
        let mut updated = 0;
        for entry in &mut self.entries {
            if !message_ids.contains(&entry.message.id) {
                continue;
            }
            if add_receipt(&mut entry.message.read_by, reader, read_at_ms) {
                updated += 1;
            }
        }
        updated
    }

    /// Optimistically record the local user's read of one message.
    ///
    /// The network call is deferred to the read-receipt batcher. Returns
    /// `true` when the receipt was newly added.
    pub fn mark_read(
        &mut self,
        message_id: &str,
        user_id: &str,
        read_at_ms: TimestampMs,
    ) -> Result<bool, ReconcileError> {
        let entry = self
            .entries
            .iter_mut()
            .find(|e| e.message.id == message_id)
            .ok_or_else(|| ReconcileError::MissingMessage(message_id.to_owned()))?;
        Ok(add_receipt(&mut entry.message.read_by, user_id, read_at_ms))
    }

    /// Apply a server-side edit in place.
    pub fn apply_edit(
        &mut self,
        message_id: &str,
        content: impl Into<String>,
        edited_at_ms: TimestampMs,
    ) -> Result<(), ReconcileError> {
        let entry = self
            .entries
            .iter_mut()
            .find(|e| e.message.id == message_id)
            .ok_or_else(|| ReconcileError::MissingMessage(message_id.to_owned()))?;
        entry.message.content = content.into();
        entry.message.edited = true;
        entry.message.edited_at_ms = Some(edited_at_ms);
        Ok(())
    }

    /// Remove a server-deleted message.
    pub fn remove(&mut self, message_id: &str) -> Result<(), ReconcileError> {
        let index = self
            .entries
            .iter()
            .position(|e| e.message.id == message_id)
            .ok_or_else(|| ReconcileError::MissingMessage(message_id.to_owned()))?;
        self.entries.remove(index);
        self.ids.remove(message_id);
        Ok(())
    }

    /// Derived delivery state for an outbound message.
    ///
    /// `Sent` while optimistic, `Read` as soon as any participant other
    /// than the sender appears in the read set, `Delivered` otherwise.
    pub fn delivery_status(&self, message_id: &str) -> Option<DeliveryStatus> {
        let entry = self.entries.iter().find(|e| e.message.id == message_id)?;
        Some(match entry.state {
            SendState::Pending => DeliveryStatus::Sent,
            SendState::Confirmed => {
                if entry.message.read_by_other() {
                    DeliveryStatus::Read
                } else {
                    DeliveryStatus::Delivered
                }
            },
        })
    }

    /// Ids of messages from other senders that `user_id` has not read yet,
    /// in display order.
    pub fn unread_ids(&self, user_id: &str) -> Vec<MessageId> {
        self.entries
            .iter()
            .filter(|e| e.message.sender.id() != user_id && !e.message.read_by_user(user_id))
            .map(|e| e.message.id.clone())
            .collect()
    }

    fn ticket_is_current(&self, ticket: &LoadTicket) -> bool {
        ticket.scope == self.conversation_id && ticket.generation == self.generation
    }
}

/// Add one receipt if the user is not present yet. Receipts never shrink.
fn add_receipt(read_by: &mut Vec<ReadReceipt>, user_id: &str, read_at_ms: TimestampMs) -> bool {
    if read_by.iter().any(|r| r.user_id == user_id) {
        return false;
    }
    read_by.push(ReadReceipt { user_id: user_id.to_owned(), read_at_ms });
    true
}

/// Union `incoming` into `read_by`, keeping the first receipt per user.
fn merge_receipts(read_by: &mut Vec<ReadReceipt>, incoming: Vec<ReadReceipt>) {
    for receipt in incoming {
        if !read_by.iter().any(|r| r.user_id == receipt.user_id) {
            read_by.push(receipt);
        }
    }
}
