// 🔔 Notification Ring - bounded, insertion-ordered notice buffers
// Fixed-size array plus a write cursor with modulo wraparound; eviction is
// overwrite-oldest. Alerts live in a smaller list where dismissal sets a
// flag instead of removing the entry, so dismissed alerts stay queryable.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Default capacity of the notification ring.
pub const NOTIFICATION_CAPACITY: usize = 50;

/// Default capacity of the alert list.
pub const ALERT_CAPACITY: usize = 20;

// ============================================================================
// NOTICES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeKind {
    Info,
    Success,
    Warning,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: String,
    pub kind: NoticeKind,
    pub title: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    pub read: bool,
}

impl Notification {
    pub fn new(kind: NoticeKind, title: &str, message: &str) -> Self {
        Notification {
            id: Uuid::new_v4().to_string(),
            kind,
            title: title.to_string(),
            message: message.to_string(),
            timestamp: Utc::now(),
            read: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub id: String,
    pub severity: crate::model::Severity,
    pub title: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    pub dismissed: bool,
}

impl Alert {
    pub fn new(severity: crate::model::Severity, title: &str, message: &str) -> Self {
        Alert {
            id: Uuid::new_v4().to_string(),
            severity,
            title: title.to_string(),
            message: message.to_string(),
            timestamp: Utc::now(),
            dismissed: false,
        }
    }
}

// ============================================================================
// RING BUFFER
// ============================================================================

/// Bounded ring over a fixed-size slot array. `push` overwrites the oldest
/// entry once at capacity; `iter` walks oldest-to-newest.
#[derive(Debug, Clone)]
pub struct Ring<T> {
    slots: Vec<Option<T>>,
    cursor: usize,
    len: usize,
}

impl<T: Clone> Ring<T> {
    pub fn with_capacity(capacity: usize) -> Self {
        assert!(capacity > 0, "ring capacity must be non-zero");
        Ring {
            slots: vec![None; capacity],
            cursor: 0,
            len: 0,
        }
    }

    pub fn push(&mut self, item: T) {
        self.slots[self.cursor] = Some(item);
        self.cursor = (self.cursor + 1) % self.slots.len();
        if self.len < self.slots.len() {
            self.len += 1;
        }
    }

    /// Items oldest-to-newest.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        let capacity = self.slots.len();
        // When full, the cursor points at the oldest slot; before that,
        // slot 0 is the oldest.
        let start = if self.len == capacity { self.cursor } else { 0 };
        (0..self.len).filter_map(move |i| self.slots[(start + i) % capacity].as_ref())
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut T> {
        self.slots.iter_mut().filter_map(Option::as_mut)
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }
}

// ============================================================================
// NOTIFICATION CENTER
// ============================================================================

/// Decoupled from the record store: components push into it, UI surfaces
/// poll `all()`/`alerts()`.
#[derive(Debug)]
pub struct NotificationCenter {
    notifications: Ring<Notification>,
    alerts: Ring<Alert>,
}

impl NotificationCenter {
    pub fn new() -> Self {
        Self::with_capacity(NOTIFICATION_CAPACITY, ALERT_CAPACITY)
    }

    pub fn with_capacity(notifications: usize, alerts: usize) -> Self {
        NotificationCenter {
            notifications: Ring::with_capacity(notifications),
            alerts: Ring::with_capacity(alerts),
        }
    }

    pub fn push(&mut self, notification: Notification) {
        self.notifications.push(notification);
    }

    pub fn notify(&mut self, kind: NoticeKind, title: &str, message: &str) {
        self.push(Notification::new(kind, title, message));
    }

    /// Notifications oldest-to-newest.
    pub fn all(&self) -> Vec<Notification> {
        self.notifications.iter().cloned().collect()
    }

    pub fn unread_count(&self) -> usize {
        self.notifications.iter().filter(|n| !n.read).count()
    }

    pub fn mark_read(&mut self, id: &str) {
        for notification in self.notifications.iter_mut() {
            if notification.id == id {
                notification.read = true;
            }
        }
    }

    pub fn push_alert(&mut self, alert: Alert) {
        self.alerts.push(alert);
    }

    pub fn alerts(&self) -> Vec<Alert> {
        self.alerts.iter().cloned().collect()
    }

    /// Sets the dismissed flag; the alert remains queryable.
    pub fn dismiss(&mut self, id: &str) {
        for alert in self.alerts.iter_mut() {
            if alert.id == id {
                alert.dismissed = true;
            }
        }
    }
}

impl Default for NotificationCenter {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Severity;

    #[test]
    fn test_ring_returns_oldest_to_newest() {
        let mut ring = Ring::with_capacity(3);
        ring.push(1);
        ring.push(2);

        let items: Vec<_> = ring.iter().copied().collect();
        assert_eq!(items, vec![1, 2]);
    }

    #[test]
    fn test_ring_evicts_oldest_at_capacity() {
        let mut ring = Ring::with_capacity(3);
        for i in 1..=5 {
            ring.push(i);
        }

        assert_eq!(ring.len(), 3);
        let items: Vec<_> = ring.iter().copied().collect();
        assert_eq!(items, vec![3, 4, 5]);
    }

    #[test]
    fn test_ring_wraps_cursor_exactly_at_boundary() {
        let mut ring = Ring::with_capacity(2);
        ring.push("a");
        ring.push("b");
        ring.push("c");

        let items: Vec<_> = ring.iter().copied().collect();
        assert_eq!(items, vec!["b", "c"]);
    }

    #[test]
    fn test_center_caps_notifications_at_fifty() {
        let mut center = NotificationCenter::new();
        for i in 0..60 {
            center.notify(NoticeKind::Info, "note", &format!("message {}", i));
        }

        let all = center.all();
        assert_eq!(all.len(), NOTIFICATION_CAPACITY);
        assert_eq!(all.first().unwrap().message, "message 10");
        assert_eq!(all.last().unwrap().message, "message 59");
    }

    #[test]
    fn test_dismiss_flags_without_removing() {
        let mut center = NotificationCenter::new();
        let alert = Alert::new(Severity::High, "Sync failed", "dispatch dropped");
        let id = alert.id.clone();
        center.push_alert(alert);

        center.dismiss(&id);

        let alerts = center.alerts();
        assert_eq!(alerts.len(), 1);
        assert!(alerts[0].dismissed);
    }

    #[test]
    fn test_dismiss_unknown_id_is_a_noop() {
        let mut center = NotificationCenter::new();
        center.push_alert(Alert::new(Severity::Low, "a", "b"));

        center.dismiss("nope");

        assert!(!center.alerts()[0].dismissed);
    }

    #[test]
    fn test_mark_read_and_unread_count() {
        let mut center = NotificationCenter::new();
        center.notify(NoticeKind::Info, "one", "x");
        center.notify(NoticeKind::Error, "two", "y");
        assert_eq!(center.unread_count(), 2);

        let id = center.all()[0].id.clone();
        center.mark_read(&id);

        assert_eq!(center.unread_count(), 1);
    }
}
