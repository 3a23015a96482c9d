//! Per-user conversation reconciliation.
//!
//! [`ConversationStore`] maintains the conversation set for one user,
//! merging paginated fetches with local mutations and inbound activity. It
//! consumes [`SyncEvent`]s independently of any open conversation so
//! aggregate unread counts stay current even when no message store is alive.

use std::collections::HashSet;

use crate::{
    error::ReconcileError,
    event::{ServerFrame, SyncEvent},
    types::{
        Conversation, ConversationId, LoadTicket, MessageRef, PageInfo, TimestampMs, UserId,
    },
};

/// Display label when a 1:1 peer has not been resolved to a user object.
pub const FALLBACK_USER_NAME: &str = "Unknown user";

/// Display label when a group carries no name.
pub const FALLBACK_GROUP_NAME: &str = "Group conversation";

/// Pure, synchronous selection criteria over the in-memory set.
///
/// All fields combine with AND; `None`/`false` fields do not constrain.
/// Filtering never triggers a fetch.
#[derive(Debug, Clone, Default)]
pub struct ConversationFilter {
    /// Keep only conversations with unread messages.
    pub unread_only: bool,
    /// Keep only group conversations.
    pub groups_only: bool,
    /// Keep only conversations that include this participant.
    pub participant: Option<UserId>,
    /// Keep only conversations active at or after this instant.
    pub active_after_ms: Option<TimestampMs>,
    /// Keep only conversations active at or before this instant.
    pub active_before_ms: Option<TimestampMs>,
}

impl ConversationFilter {
    fn matches(&self, conversation: &Conversation) -> bool {
        if self.unread_only && conversation.unread_count == 0 {
            return false;
        }
        if self.groups_only && !conversation.is_group {
            return false;
        }
        if let Some(user_id) = &self.participant
            && !conversation.participants.iter().any(|p| p.id() == user_id.as_str())
        {
            return false;
        }
        if let Some(after) = self.active_after_ms
            && conversation.last_activity_ms < after
        {
            return false;
        }
        if let Some(before) = self.active_before_ms
            && conversation.last_activity_ms > before
        {
            return false;
        }
        true
    }
}

/// Conversation set for one user, ordered by most recent activity.
#[derive(Debug, Clone)]
pub struct ConversationStore {
    user_id: UserId,
    items: Vec<Conversation>,
    ids: HashSet<ConversationId>,
    selected: Option<ConversationId>,
    has_more: bool,
    generation: u64,
    last_error: Option<ReconcileError>,
}

impl ConversationStore {
    /// Create an empty store for one user.
    pub fn new(user_id: impl Into<UserId>) -> Self {
        Self {
            user_id: user_id.into(),
            items: Vec::new(),
            ids: HashSet::new(),
            selected: None,
            has_more: true,
            generation: 0,
            last_error: None,
        }
    }

    /// The user this store belongs to.
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Conversations, most recent activity first.
    pub fn conversations(&self) -> &[Conversation] {
        &self.items
    }

    /// Number of conversations held.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the store holds no conversations.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Look up a conversation by id.
    pub fn get(&self, conversation_id: &str) -> Option<&Conversation> {
        self.items.iter().find(|c| c.id == conversation_id)
    }

    /// Whether further pages remain on the server.
    pub fn has_more(&self) -> bool {
        self.has_more
    }

    /// Most recent reconciliation fault, if any.
    pub fn last_error(&self) -> Option<&ReconcileError> {
        self.last_error.as_ref()
    }

    /// Currently selected conversation, if any.
    pub fn selected(&self) -> Option<&str> {
        self.selected.as_deref()
    }

    /// Select a conversation; returns `false` when it is not present.
    ///
    /// Selecting clears the unread count optimistically (the user is now
    /// looking at it); the next authoritative value overwrites it.
    pub fn select(&mut self, conversation_id: &str) -> bool {
        if !self.ids.contains(conversation_id) {
            return false;
        }
        self.selected = Some(conversation_id.to_owned());
        if let Some(conversation) = self.items.iter_mut().find(|c| c.id == conversation_id) {
            conversation.unread_count = 0;
        }
        true
    }

    /// Clear the selection (the user left the conversation screen).
    pub fn deselect(&mut self) {
        self.selected = None;
    }

    /// Issue a ticket for a page load, superseding any outstanding one.
    pub fn begin_page_load(&mut self, page: u32, limit: u32) -> LoadTicket {
        self.generation += 1;
        LoadTicket { scope: self.user_id.clone(), generation: self.generation, page, limit }
    }

    /// Merge a fetched page. Page 1 replaces local state; later pages merge
    /// into it. Ids already present are replaced authoritatively.
    pub fn apply_page(
        &mut self,
        ticket: &LoadTicket,
        items: Vec<Conversation>,
        info: Option<PageInfo>,
    ) -> bool {
        if ticket.scope != self.user_id || ticket.generation != self.generation {
            tracing::debug!(scope = %ticket.scope, page = ticket.page, "dropping stale page");
            return false;
        }

        if ticket.page == 1 {
            self.items.clear();
            self.ids.clear();
        }

        let full_page = items.len() as u32 >= ticket.limit;
        for conversation in items {
            self.upsert(conversation);
        }
        self.has_more = info.map_or(full_page, |i| i.has_more);
        self.last_error = None;
        true
    }

    /// Record a failed page load as a scoped, retryable fault.
    pub fn fail_page_load(&mut self, ticket: &LoadTicket, reason: impl Into<String>) {
        if ticket.scope != self.user_id || ticket.generation != self.generation {
            return;
        }
        self.last_error = Some(ReconcileError::PageLoad {
            scope: ticket.scope.clone(),
            page: ticket.page,
            reason: reason.into(),
        });
    }

    /// Insert or authoritatively replace one conversation.
    ///
    /// Server values win wholesale - including the unread count, which
    /// overwrites any local optimistic decrement.
    pub fn upsert(&mut self, conversation: Conversation) {
        if let Some(existing) = self.items.iter_mut().find(|c| c.id == conversation.id) {
            *existing = conversation;
        } else {
            self.ids.insert(conversation.id.clone());
            self.items.push(conversation);
        }
        self.sort();
    }

    /// Remove a conversation (deleted, or the owning user left).
    pub fn remove(&mut self, conversation_id: &str) -> Result<(), ReconcileError> {
        let index = self
            .items
            .iter()
            .position(|c| c.id == conversation_id)
            .ok_or_else(|| ReconcileError::MissingConversation(conversation_id.to_owned()))?;
        self.items.remove(index);
        self.ids.remove(conversation_id);
        if self.selected.as_deref() == Some(conversation_id) {
            self.selected = None;
        }
        Ok(())
    }

    /// Optimistically clear the unread count for one conversation.
    ///
    /// Overwritten by the next authoritative value from the server.
    pub fn mark_all_read(&mut self, conversation_id: &str) -> Result<(), ReconcileError> {
        let conversation = self
            .items
            .iter_mut()
            .find(|c| c.id == conversation_id)
            .ok_or_else(|| ReconcileError::MissingConversation(conversation_id.to_owned()))?;
        conversation.unread_count = 0;
        Ok(())
    }

    /// Consume a dispatched event to keep aggregate state current.
    ///
    /// Works independently of any open message store: inbound messages bump
    /// activity and unread counts, read events by the owning user clear
    /// them.
    pub fn handle_event(&mut self, event: &SyncEvent) {
        let SyncEvent::Frame(frame) = event else { return };
        match frame {
            ServerFrame::NewMessage { message } => {
                let selected = self.selected.as_deref() == Some(message.conversation_id.as_str());
                let own = message.sender.id() == self.user_id;
                if let Some(conversation) =
                    self.items.iter_mut().find(|c| c.id == message.conversation_id)
                {
                    conversation.last_message = Some(MessageRef::from_message(message));
                    conversation.last_activity_ms = message.timestamp_ms;
                    if !selected && !own {
                        conversation.unread_count += 1;
                    }
                }
                self.sort();
            },
            ServerFrame::MessageRead { conversation_id, reader, .. } => {
                if *reader == self.user_id
                    && let Some(conversation) =
                        self.items.iter_mut().find(|c| c.id == *conversation_id)
                {
                    conversation.unread_count = 0;
                }
            },
            _ => {},
        }
    }

    /// Pure predicate over the in-memory set. Never fetches.
    pub fn filter(&self, criteria: &ConversationFilter) -> Vec<&Conversation> {
        self.items.iter().filter(|c| criteria.matches(c)).collect()
    }

    /// Sum of unread counts across all conversations.
    pub fn total_unread(&self) -> u64 {
        self.items.iter().map(|c| u64::from(c.unread_count)).sum()
    }

    /// Display name for a conversation from the current user's perspective.
    ///
    /// Groups use their name; 1:1 conversations use the other participant's
    /// username or email. Fixed fallback labels cover unresolved peers and
    /// unnamed groups.
    pub fn display_name(conversation: &Conversation, current_user_id: &str) -> String {
        if conversation.is_group {
            return conversation
                .group_name
                .clone()
                .unwrap_or_else(|| FALLBACK_GROUP_NAME.to_owned());
        }
        conversation
            .other_participant(current_user_id)
            .and_then(|p| p.display_label())
            .map_or_else(|| FALLBACK_USER_NAME.to_owned(), str::to_owned)
    }

    fn sort(&mut self) {
        self.items.sort_by(|a, b| b.last_activity_ms.cmp(&a.last_activity_ms));
    }
}
