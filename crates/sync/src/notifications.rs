use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Success,
    Warning,
    Error,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Success => "success",
            Severity::Warning => "warning",
            Severity::Error => "error",
        }
    }
}

/// An ephemeral operator alert with a fixed lifetime.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub id: u64,
    pub title: String,
    pub message: String,
    pub severity: Severity,
    pub created_at: DateTime<Utc>,
    pub expires_at: Instant,
}

/// Time-ordered queue of live notifications. Ids come from a monotonic
/// counter so a burst created within one timestamp tick cannot collide.
///
/// Expiry is driven by the event loop: it arms a single sleep for
/// `next_expiry` and calls `expire_due` when the deadline passes, removing
/// each entry on its own deadline rather than sweeping periodically. The
/// lifetime is fixed, so insertion order and expiry order coincide.
pub struct NotificationQueue {
    entries: VecDeque<Notification>,
    next_id: u64,
    ttl: Duration,
}

impl NotificationQueue {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: VecDeque::new(),
            next_id: 0,
            ttl,
        }
    }

    pub fn push(
        &mut self,
        title: impl Into<String>,
        message: impl Into<String>,
        severity: Severity,
    ) -> u64 {
        let id = self.next_id;
        self.next_id += 1;

        let notification = Notification {
            id,
            title: title.into(),
            message: message.into(),
            severity,
            created_at: Utc::now(),
            expires_at: Instant::now() + self.ttl,
        };
        tracing::debug!(
            id,
            severity = severity.as_str(),
            title = %notification.title,
            "Notification enqueued"
        );
        self.entries.push_back(notification);

        id
    }

    /// Deadline of the oldest live entry, if any.
    pub fn next_expiry(&self) -> Option<Instant> {
        self.entries.front().map(|n| n.expires_at)
    }

    /// Remove every entry whose own deadline has passed. Entries that are
    /// still live keep their deadlines untouched.
    pub fn expire_due(&mut self, now: Instant) -> usize {
        let mut removed = 0;
        while self
            .entries
            .front()
            .is_some_and(|n| n.expires_at <= now)
        {
            self.entries.pop_front();
            removed += 1;
        }
        removed
    }

    /// Current live notifications in insertion order.
    pub fn live(&self) -> Vec<Notification> {
        self.entries.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::advance;

    const TTL: Duration = Duration::from_millis(5000);

    // ========== Ids and Ordering ==========

    #[test]
    fn ids_are_unique_under_a_burst() {
        let mut queue = NotificationQueue::new(TTL);

        let ids: Vec<u64> = (0..100)
            .map(|_| queue.push("Burst", "same instant", Severity::Info))
            .collect();

        assert!(
            ids.windows(2).all(|pair| pair[0] < pair[1]),
            "ids must be strictly increasing"
        );
        assert_eq!(queue.len(), 100);
    }

    #[test]
    fn live_preserves_insertion_order() {
        let mut queue = NotificationQueue::new(TTL);
        queue.push("first", "a", Severity::Info);
        queue.push("second", "b", Severity::Warning);
        queue.push("third", "c", Severity::Error);

        let titles: Vec<String> = queue.live().into_iter().map(|n| n.title).collect();
        assert_eq!(titles, ["first", "second", "third"]);
    }

    #[test]
    fn next_expiry_is_the_oldest_entry() {
        let mut queue = NotificationQueue::new(TTL);
        assert!(queue.next_expiry().is_none());

        queue.push("first", "a", Severity::Info);
        let first_deadline = queue.next_expiry().unwrap();
        queue.push("second", "b", Severity::Info);

        assert_eq!(queue.next_expiry(), Some(first_deadline));
    }

    // ========== Expiry ==========

    #[tokio::test(start_paused = true)]
    async fn entry_lives_until_its_own_deadline() {
        let mut queue = NotificationQueue::new(TTL);
        queue.push("alert", "boundary check", Severity::Warning);

        advance(Duration::from_millis(4999)).await;
        assert_eq!(queue.expire_due(Instant::now()), 0);
        assert_eq!(queue.len(), 1);

        advance(Duration::from_millis(2)).await;
        assert_eq!(queue.expire_due(Instant::now()), 1);
        assert!(queue.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn expiry_is_per_entry_and_independent() {
        let mut queue = NotificationQueue::new(TTL);
        queue.push("old", "a", Severity::Info);

        advance(Duration::from_millis(2000)).await;
        queue.push("young", "b", Severity::Info);

        // Only the older entry is due at its deadline.
        advance(Duration::from_millis(3001)).await;
        assert_eq!(queue.expire_due(Instant::now()), 1);

        let titles: Vec<String> = queue.live().into_iter().map(|n| n.title).collect();
        assert_eq!(titles, ["young"]);

        // The younger entry keeps its own full lifetime.
        advance(Duration::from_millis(2000)).await;
        assert_eq!(queue.expire_due(Instant::now()), 1);
        assert!(queue.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn a_burst_expires_together_without_affecting_later_entries() {
        let mut queue = NotificationQueue::new(TTL);
        for _ in 0..5 {
            queue.push("burst", "same tick", Severity::Info);
        }

        advance(Duration::from_millis(2500)).await;
        queue.push("later", "b", Severity::Info);

        advance(Duration::from_millis(2501)).await;
        assert_eq!(queue.expire_due(Instant::now()), 5);
        assert_eq!(queue.len(), 1);
    }
}
