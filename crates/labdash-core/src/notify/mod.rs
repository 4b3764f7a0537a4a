// Copyright 2025 Chris Custine
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Toast notification queue with independent expiry timers.
//!
//! Active notifications live in a slab of doubly linked nodes (newest first)
//! with an id -> slot index, so removal by id is O(1) and display iteration
//! follows the current order. Expiry timers are entries in a
//! [`DelayQueue`]; each node owns the [`Key`] of its pending timer and every
//! removal path cancels it.
//!
//! Expired timers only surface through [`NotificationQueue::next_expired`],
//! which the owning task awaits. Expiry and dismissal therefore both run on
//! that task and can never interleave; whichever comes second finds nothing
//! left to remove.

use std::collections::HashMap;
use std::future::poll_fn;
use std::time::Duration;

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use tokio_util::time::delay_queue::{DelayQueue, Key};
use uuid::Uuid;

/// Longest lifetime that gets an expiry timer (one year). Longer lifetimes
/// are kept as persistent notifications.
pub const MAX_LIFETIME_MS: u64 = 365 * 24 * 60 * 60 * 1000;

/// Notification severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Success,
    Warning,
    Error,
    Info,
}

/// A request to show a notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationRequest {
    /// Caller-chosen id. A fresh UUID is generated when absent.
    #[serde(default)]
    pub id: Option<String>,
    #[serde(alias = "type")]
    pub severity: Severity,
    pub title: String,
    #[serde(alias = "message")]
    pub body: String,
    /// Lifetime in milliseconds. `None` keeps the notification until dismissed.
    #[serde(default, alias = "duration")]
    pub expires_after_ms: Option<u64>,
}

impl NotificationRequest {
    #[must_use]
    pub fn new(severity: Severity, title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            id: None,
            severity,
            title: title.into(),
            body: body.into(),
            expires_after_ms: None,
        }
    }

    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    #[must_use]
    pub fn expires_after(mut self, lifetime: Duration) -> Self {
        self.expires_after_ms = Some(u64::try_from(lifetime.as_millis()).unwrap_or(u64::MAX));
        self
    }
}

/// An active notification as shown to the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: String,
    pub severity: Severity,
    pub title: String,
    pub body: String,
    pub expires_after_ms: Option<u64>,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    /// Wall-clock time the notification is due to expire, if it expires.
    #[must_use]
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        let ms = i64::try_from(self.expires_after_ms?).ok()?;
        self.created_at.checked_add_signed(chrono::Duration::milliseconds(ms))
    }
}

#[derive(Debug, Clone, Copy)]
enum Removal {
    Dismissed,
    Expired,
    Replaced,
}

#[derive(Debug)]
struct Node {
    item: Notification,
    timer: Option<Key>,
    prev: Option<usize>,
    next: Option<usize>,
}

/// Ordered set of active notifications, newest first.
///
/// Scheduling an expiry registers a tokio timer, so enqueueing a notification
/// with a lifetime must happen inside a tokio runtime with the time driver
/// enabled. Persistent notifications have no such requirement.
pub struct NotificationQueue {
    slots: Vec<Option<Node>>,
    free: Vec<usize>,
    index: HashMap<String, usize>,
    head: Option<usize>,
    tail: Option<usize>,
    timers: DelayQueue<String>,
}

impl std::fmt::Debug for NotificationQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationQueue")
            .field("active", &self.index.len())
            .field("pending_timers", &self.timers.len())
            .finish_non_exhaustive()
    }
}

impl Default for NotificationQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl NotificationQueue {
    #[must_use]
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            index: HashMap::new(),
            head: None,
            tail: None,
            timers: DelayQueue::new(),
        }
    }

    /// Insert a notification at the head and schedule its expiry.
    ///
    /// Returns the id it was stored under. An active notification with the
    /// same id is replaced and its timer cancelled.
    pub fn enqueue(&mut self, request: NotificationRequest) -> String {
        let id = request
            .id
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        if self.index.contains_key(&id) {
            self.remove(&id, Removal::Replaced);
        }

        let expires_after_ms = match request.expires_after_ms {
            Some(ms) if ms > MAX_LIFETIME_MS => {
                warn!("Notification {id} lifetime of {ms} ms exceeds the limit, keeping it until dismissed");
                None
            }
            other => other,
        };
        let timer = expires_after_ms
            .map(|ms| self.timers.insert(id.clone(), Duration::from_millis(ms)));

        let item = Notification {
            id: id.clone(),
            severity: request.severity,
            title: request.title,
            body: request.body,
            expires_after_ms,
            created_at: Utc::now(),
        };
        debug!("Notification {} queued: {}", id, item.title);

        let slot = self.alloc(Node {
            item,
            timer,
            prev: None,
            next: None,
        });
        self.link_front(slot);
        self.index.insert(id.clone(), slot);

        id
    }

    /// Remove a notification now, cancelling its timer.
    ///
    /// Unknown or already removed ids are a no-op; returns whether anything
    /// was removed.
    pub fn dismiss(&mut self, id: &str) -> bool {
        self.remove(id, Removal::Dismissed).is_some()
    }

    /// Remove every notification and cancel all timers.
    pub fn clear(&mut self) {
        let count = self.index.len();
        self.slots.clear();
        self.free.clear();
        self.index.clear();
        self.head = None;
        self.tail = None;
        self.timers.clear();
        if count > 0 {
            info!("Cleared {count} notifications");
        }
    }

    /// Wait for the next notification to expire and remove it.
    ///
    /// Pending forever while no timer is scheduled, so it can sit in a
    /// `select!` next to other event sources.
    pub async fn next_expired(&mut self) -> Notification {
        loop {
            if self.timers.is_empty() {
                std::future::pending::<()>().await;
            }

            let Some(expired) = poll_fn(|cx| self.timers.poll_expired(cx)).await else {
                continue;
            };

            if let Some(item) = self.expire(expired.get_ref(), expired.key()) {
                return item;
            }
        }
    }

    /// Timer-driven removal. The fired key is already gone from the timer
    /// queue, so it is detached from the node before the shared removal path
    /// runs; the node must still own that exact key.
    fn expire(&mut self, id: &str, key: Key) -> Option<Notification> {
        let slot = *self.index.get(id)?;
        let node = self.slots.get_mut(slot)?.as_mut()?;
        if node.timer != Some(key) {
            return None;
        }
        node.timer = None;
        self.remove(id, Removal::Expired)
    }

    fn remove(&mut self, id: &str, reason: Removal) -> Option<Notification> {
        let slot = self.index.remove(id)?;
        let node = self.unlink(slot)?;

        if let Some(key) = node.timer {
            self.timers.try_remove(&key);
        }

        match reason {
            Removal::Dismissed => info!("Notification {id} dismissed"),
            Removal::Expired => info!("Notification {id} expired"),
            Removal::Replaced => debug!("Notification {id} replaced"),
        }

        Some(node.item)
    }

    // ===== Queries =====

    /// Active notifications, newest first.
    #[must_use]
    pub fn list(&self) -> Vec<Notification> {
        self.iter().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Notification> {
        let mut cursor = self.head;
        std::iter::from_fn(move || {
            let node = self.slots.get(cursor?)?.as_ref()?;
            cursor = node.next;
            Some(&node.item)
        })
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<&Notification> {
        let slot = *self.index.get(id)?;
        self.slots.get(slot)?.as_ref().map(|n| &n.item)
    }

    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.index.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Number of scheduled expiry timers.
    #[must_use]
    pub fn pending_timers(&self) -> usize {
        self.timers.len()
    }

    // ===== Slab list =====

    fn alloc(&mut self, node: Node) -> usize {
        if let Some(slot) = self.free.pop() {
            self.slots[slot] = Some(node);
            slot
        } else {
            self.slots.push(Some(node));
            self.slots.len() - 1
        }
    }

    fn node_mut(&mut self, slot: usize) -> Option<&mut Node> {
        self.slots.get_mut(slot)?.as_mut()
    }

    fn link_front(&mut self, slot: usize) {
        let old_head = self.head;
        if let Some(node) = self.node_mut(slot) {
            node.prev = None;
            node.next = old_head;
        }
        match old_head.and_then(|h| self.node_mut(h)) {
            Some(head) => head.prev = Some(slot),
            None => self.tail = Some(slot),
        }
        self.head = Some(slot);
    }

    fn unlink(&mut self, slot: usize) -> Option<Node> {
        let node = self.slots.get_mut(slot)?.take()?;

        match node.prev.and_then(|p| self.node_mut(p)) {
            Some(prev) => prev.next = node.next,
            None => self.head = node.next,
        }
        match node.next.and_then(|n| self.node_mut(n)) {
            Some(next) => next.prev = node.prev,
            None => self.tail = node.prev,
        }

        self.free.push(slot);
        Some(node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::{advance, timeout, Instant};

    fn toast(id: &str) -> NotificationRequest {
        NotificationRequest::new(Severity::Info, format!("title {id}"), "body").with_id(id)
    }

    fn ids(queue: &NotificationQueue) -> Vec<String> {
        queue.iter().map(|n| n.id.clone()).collect()
    }

    /// True when no expiry is ready at the current (paused) instant.
    async fn nothing_expired(queue: &mut NotificationQueue) -> bool {
        timeout(Duration::ZERO, queue.next_expired()).await.is_err()
    }

    #[test]
    fn test_enqueue_newest_first() {
        let mut queue = NotificationQueue::new();
        queue.enqueue(toast("1"));
        queue.enqueue(toast("2"));
        queue.enqueue(toast("3"));

        assert_eq!(ids(&queue), vec!["3", "2", "1"]);
        assert_eq!(queue.len(), 3);
    }

    #[test]
    fn test_dismiss_is_idempotent() {
        let mut queue = NotificationQueue::new();
        queue.enqueue(toast("1"));
        queue.enqueue(toast("2"));

        assert!(queue.dismiss("1"));
        assert!(!queue.dismiss("1"));
        assert!(!queue.dismiss("never-existed"));
        assert_eq!(queue.len(), 1);
        assert_eq!(ids(&queue), vec!["2"]);
    }

    #[test]
    fn test_remove_from_middle_keeps_order() {
        let mut queue = NotificationQueue::new();
        for id in ["a", "b", "c", "d"] {
            queue.enqueue(toast(id));
        }

        queue.dismiss("c");
        assert_eq!(ids(&queue), vec!["d", "b", "a"]);
        queue.dismiss("d");
        queue.dismiss("a");
        assert_eq!(ids(&queue), vec!["b"]);

        // Freed slots are reused without disturbing the order
        queue.enqueue(toast("e"));
        queue.enqueue(toast("f"));
        assert_eq!(ids(&queue), vec!["f", "e", "b"]);
        assert!(queue.slots.len() <= 4);
    }

    #[test]
    fn test_generated_ids_are_unique() {
        let mut queue = NotificationQueue::new();
        let first = queue.enqueue(NotificationRequest::new(Severity::Success, "a", "b"));
        let second = queue.enqueue(NotificationRequest::new(Severity::Success, "a", "b"));
        let blank = queue.enqueue(toast(" "));

        assert_ne!(first, second);
        assert_ne!(blank.trim(), "");
        assert_eq!(queue.len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expires_after_lifetime() {
        let mut queue = NotificationQueue::new();
        let id = queue.enqueue(
            NotificationRequest::new(Severity::Error, "Robot desconectado", "RVR-003 desconectado")
                .expires_after(Duration::from_millis(8000)),
        );
        queue.enqueue(toast("persistent"));
        let listed = queue.list();
        assert_eq!(listed[0].id, "persistent");
        assert_eq!(listed[1].id, id);

        advance(Duration::from_millis(7999)).await;
        assert!(nothing_expired(&mut queue).await);
        assert!(queue.contains(&id));

        advance(Duration::from_millis(2)).await;
        let expired = queue.next_expired().await;
        assert_eq!(expired.id, id);
        assert!(!queue.contains(&id));
        assert_eq!(ids(&queue), vec!["persistent"]);
        assert_eq!(queue.pending_timers(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expiry_waits_for_deadline() {
        let mut queue = NotificationQueue::new();
        let start = Instant::now();
        queue.enqueue(toast("slow").expires_after(Duration::from_millis(5000)));
        queue.enqueue(toast("fast").expires_after(Duration::from_millis(1000)));

        let first = queue.next_expired().await;
        assert_eq!(first.id, "fast");
        assert!(start.elapsed() >= Duration::from_millis(1000));

        let second = queue.next_expired().await;
        assert_eq!(second.id, "slow");
        assert!(start.elapsed() >= Duration::from_millis(5000));
        assert!(queue.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_dismiss_cancels_timer() {
        let mut queue = NotificationQueue::new();
        queue.enqueue(toast("1").expires_after(Duration::from_millis(5000)));

        advance(Duration::from_millis(1000)).await;
        assert!(queue.dismiss("1"));
        assert_eq!(queue.pending_timers(), 0);

        // Well past the original deadline nothing fires and nothing comes back
        let fired = timeout(Duration::from_secs(10), queue.next_expired()).await;
        assert!(fired.is_err());
        assert!(queue.is_empty());
        assert!(!queue.dismiss("1"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_replacing_id_restarts_timer() {
        let mut queue = NotificationQueue::new();
        let start = Instant::now();
        queue.enqueue(toast("1").expires_after(Duration::from_millis(5000)));
        advance(Duration::from_millis(3000)).await;
        queue.enqueue(toast("1").expires_after(Duration::from_millis(5000)));

        assert_eq!(queue.len(), 1);
        assert_eq!(queue.pending_timers(), 1);

        // The first timer would have fired at 5s
        advance(Duration::from_millis(3000)).await;
        assert!(nothing_expired(&mut queue).await);

        let expired = queue.next_expired().await;
        assert_eq!(expired.id, "1");
        assert!(start.elapsed() >= Duration::from_millis(8000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_clear_cancels_everything() {
        let mut queue = NotificationQueue::new();
        queue.enqueue(toast("1").expires_after(Duration::from_millis(100)));
        queue.enqueue(toast("2"));

        queue.clear();
        assert!(queue.is_empty());
        assert_eq!(queue.pending_timers(), 0);
        assert!(timeout(Duration::from_secs(1), queue.next_expired()).await.is_err());

        queue.enqueue(toast("3"));
        assert_eq!(ids(&queue), vec!["3"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_oversized_lifetime_is_persistent() {
        let mut queue = NotificationQueue::new();
        queue.enqueue(toast("max").expires_after(Duration::MAX));
        queue.enqueue(toast("decade").expires_after(Duration::from_secs(10 * 365 * 24 * 3600)));
        queue.enqueue(toast("year").expires_after(Duration::from_millis(MAX_LIFETIME_MS)));

        assert_eq!(queue.len(), 3);
        assert_eq!(queue.pending_timers(), 1);
        assert_eq!(queue.get("max").unwrap().expires_after_ms, None);
        assert_eq!(queue.get("decade").unwrap().expires_after_ms, None);
        assert_eq!(queue.get("year").unwrap().expires_after_ms, Some(MAX_LIFETIME_MS));
        assert!(nothing_expired(&mut queue).await);
    }

    #[test]
    fn test_expires_at() {
        let mut queue = NotificationQueue::new();
        queue.enqueue(toast("1"));
        assert!(queue.get("1").unwrap().expires_at().is_none());
    }
}
