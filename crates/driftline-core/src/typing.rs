//! Transient typing indicators with client-side expiry.
//!
//! The server's stop event is not delivery-guaranteed, so every indicator
//! carries its own deadline. A new typing event from the same user resets
//! the deadline rather than stacking a second one.

use std::{collections::HashMap, time::Duration};

use crate::types::{ConversationId, UserId};

/// Default lifetime of a typing indicator without a refresh.
pub const DEFAULT_TYPING_TTL: Duration = Duration::from_secs(5);

/// Per-(conversation, user) typing deadlines.
#[derive(Debug, Clone)]
pub struct TypingTracker<I> {
    ttl: Duration,
    expires: HashMap<(ConversationId, UserId), I>,
}

impl<I> TypingTracker<I>
where
    I: Copy + Ord + std::ops::Add<Duration, Output = I>,
{
    /// Create a tracker with the given indicator lifetime.
    pub fn new(ttl: Duration) -> Self {
        Self { ttl, expires: HashMap::new() }
    }

    /// Record a typing event, resetting the user's deadline.
    ///
    /// Returns `true` when the user was not already typing in this
    /// conversation.
    pub fn observe_start(
        &mut self,
        conversation_id: impl Into<ConversationId>,
        user_id: impl Into<UserId>,
        now: I,
    ) -> bool {
        self.expires
            .insert((conversation_id.into(), user_id.into()), now + self.ttl)
            .is_none()
    }

    /// Record a stop event. Returns `true` when an indicator was removed.
    pub fn observe_stop(&mut self, conversation_id: &str, user_id: &str) -> bool {
        self.expires
            .remove(&(conversation_id.to_owned(), user_id.to_owned()))
            .is_some()
    }

    /// Users currently typing in one conversation, sorted for stable output.
    pub fn typists(&self, conversation_id: &str) -> Vec<&str> {
        let mut users: Vec<&str> = self
            .expires
            .keys()
            .filter(|(c, _)| c == conversation_id)
            .map(|(_, u)| u.as_str())
            .collect();
        users.sort_unstable();
        users
    }

    /// Earliest pending deadline, for the driver's sleep target.
    pub fn next_deadline(&self) -> Option<I> {
        self.expires.values().min().copied()
    }

    /// Sweep expired indicators.
    ///
    /// Returns the (conversation, user) pairs that timed out so the caller
    /// can synthesize the stop notifications the server never delivered.
    pub fn tick(&mut self, now: I) -> Vec<(ConversationId, UserId)> {
        let mut expired: Vec<(ConversationId, UserId)> = self
            .expires
            .iter()
            .filter(|(_, deadline)| **deadline <= now)
            .map(|(key, _)| key.clone())
            .collect();
        expired.sort_unstable();
        for key in &expired {
            self.expires.remove(key);
        }
        expired
    }

    /// Drop every indicator (conversation switch or teardown).
    pub fn clear(&mut self) {
        self.expires.clear();
    }
}

impl<I> Default for TypingTracker<I>
where
    I: Copy + Ord + std::ops::Add<Duration, Output = I>,
{
    fn default() -> Self {
        Self::new(DEFAULT_TYPING_TTL)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use super::*;

    fn at(t0: Instant, offset_ms: u64) -> Instant {
        t0 + Duration::from_millis(offset_ms)
    }

    #[test]
    fn repeated_start_resets_instead_of_stacking() {
        let t0 = Instant::now();
        let mut tracker: TypingTracker<Instant> = TypingTracker::new(Duration::from_millis(100));
        assert!(tracker.observe_start("conv-1", "bob", t0));
        assert!(!tracker.observe_start("conv-1", "bob", at(t0, 80)));

        // The first deadline (100) has passed, but the reset moved it to 180.
        assert!(tracker.tick(at(t0, 120)).is_empty());
        assert_eq!(tracker.tick(at(t0, 180)), vec![("conv-1".to_owned(), "bob".to_owned())]);
        assert!(tracker.typists("conv-1").is_empty());
    }

    #[test]
    fn stop_event_removes_immediately() {
        let mut tracker: TypingTracker<Instant> = TypingTracker::default();
        tracker.observe_start("conv-1", "bob", Instant::now());
        assert!(tracker.observe_stop("conv-1", "bob"));
        assert!(!tracker.observe_stop("conv-1", "bob"));
        assert!(tracker.typists("conv-1").is_empty());
    }

    #[test]
    fn deadlines_are_per_conversation_and_user() {
        let t0 = Instant::now();
        let mut tracker: TypingTracker<Instant> = TypingTracker::new(Duration::from_millis(100));
        tracker.observe_start("conv-1", "bob", t0);
        tracker.observe_start("conv-1", "carol", at(t0, 50));
        tracker.observe_start("conv-2", "bob", at(t0, 50));

        assert_eq!(tracker.typists("conv-1"), vec!["bob", "carol"]);
        assert_eq!(tracker.next_deadline(), Some(at(t0, 100)));

        let expired = tracker.tick(at(t0, 100));
        assert_eq!(expired, vec![("conv-1".to_owned(), "bob".to_owned())]);
        assert_eq!(tracker.typists("conv-1"), vec!["carol"]);
        assert_eq!(tracker.typists("conv-2"), vec!["bob"]);
    }
}
