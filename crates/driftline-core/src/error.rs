//! Error types for the synchronization core.
//!
//! Strongly-typed errors per fault class: validation faults are rejected
//! locally and surfaced synchronously, while reconciliation faults attach to
//! the owning store as scoped, retryable values. Transport faults never
//! appear here at all — they are routed through the connection state machine
//! and surface only as lifecycle events.

use thiserror::Error;

/// Validation faults raised before any network call is made.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SendError {
    /// Message content was empty or whitespace-only.
    #[error("message content is empty")]
    EmptyContent,

    /// Message content exceeded the local length limit.
    #[error("message content is {len} bytes, limit is {max}")]
    ContentTooLong {
        /// Actual content length in bytes.
        len: usize,
        /// Configured maximum.
        max: usize,
    },
}

impl SendError {
    /// Validate message content against local rules.
    ///
    /// # Errors
    ///
    /// - [`SendError::EmptyContent`] if the trimmed content is empty
    /// - [`SendError::ContentTooLong`] if the content exceeds `max_len`
    pub fn check_content(content: &str, max_len: usize) -> Result<(), Self> {
        if content.trim().is_empty() {
            return Err(Self::EmptyContent);
        }
        if content.len() > max_len {
            return Err(Self::ContentTooLong { len: content.len(), max: max_len });
        }
        Ok(())
    }
}

/// Reconciliation faults: a request left the process and failed, or an
/// operation referenced state that is not present.
///
/// Non-fatal. Stores record the most recent fault as a scoped value the
/// caller can inspect and retry.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReconcileError {
    /// A page fetch failed after the request was issued.
    #[error("page {page} load failed for {scope}: {reason}")]
    PageLoad {
        /// Scope the load was issued for (conversation id or user id).
        scope: String,
        /// Requested page number.
        page: u32,
        /// Collaborator-reported reason.
        reason: String,
    },

    /// An optimistic send was rejected or failed after submission.
    #[error("send {temp_id} failed: {reason}")]
    SendFailed {
        /// Correlation id of the failed optimistic send.
        temp_id: String,
        /// Collaborator-reported reason.
        reason: String,
    },

    /// An operation referenced a message id that is not in the store.
    #[error("message '{0}' was not found")]
    MissingMessage(String),

    /// An operation referenced a conversation id that is not in the store.
    #[error("conversation '{0}' was not found")]
    MissingConversation(String),
}

impl ReconcileError {
    /// Returns true if this fault is transient and a retry may succeed.
    ///
    /// Missing-entity faults are not transient - they indicate the caller
    /// holds a stale reference.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::PageLoad { .. } | Self::SendFailed { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LIMIT: usize = 4096;

    #[test]
    fn rejects_empty_and_whitespace_content() {
        assert_eq!(SendError::check_content("", LIMIT), Err(SendError::EmptyContent));
        assert_eq!(SendError::check_content("   \n\t", LIMIT), Err(SendError::EmptyContent));
    }

    #[test]
    fn rejects_over_length_content() {
        let content = "x".repeat(LIMIT + 1);
        assert_eq!(
            SendError::check_content(&content, LIMIT),
            Err(SendError::ContentTooLong { len: LIMIT + 1, max: LIMIT })
        );
    }

    #[test]
    fn accepts_content_at_the_limit() {
        let content = "x".repeat(LIMIT);
        assert_eq!(SendError::check_content(&content, LIMIT), Ok(()));
    }

    #[test]
    fn load_and_send_faults_are_transient() {
        assert!(
            ReconcileError::PageLoad {
                scope: "conv-1".into(),
                page: 2,
                reason: "timeout".into()
            }
            .is_transient()
        );
        assert!(
            ReconcileError::SendFailed { temp_id: "tmp-1".into(), reason: "rejected".into() }
                .is_transient()
        );
        assert!(!ReconcileError::MissingMessage("m-404".into()).is_transient());
    }
}
