//! In-memory notification slots

use super::NotificationSink;
use crate::protocol::NotificationPayload;
use std::sync::Mutex;

/// First id handed out to untagged notifications
pub const FIRST_SEQUENCE_ID: u64 = 1000;

/// Identity of a notification slot
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SlotKey {
    Tagged(String),
    Sequence(u64),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Slot {
    pub key: SlotKey,
    pub payload: NotificationPayload,
    /// How many payloads this slot has shown
    pub revision: u32,
}

#[derive(Debug)]
struct BoardInner {
    slots: Vec<Slot>,
    next_id: u64,
}

/// Notification slots in first-posted order.
///
/// A tagged post replaces the slot holding the same tag in place; an untagged
/// post always opens a new slot with the next sequence id.
#[derive(Debug)]
pub struct NotificationBoard {
    inner: Mutex<BoardInner>,
}

impl Default for NotificationBoard {
    fn default() -> Self {
        Self::new()
    }
}

impl NotificationBoard {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(BoardInner {
                slots: Vec::new(),
                next_id: FIRST_SEQUENCE_ID,
            }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BoardInner> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn slots(&self) -> Vec<Slot> {
        self.lock().slots.clone()
    }

    pub fn len(&self) -> usize {
        self.lock().slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().slots.is_empty()
    }

    pub fn get_tagged(&self, tag: &str) -> Option<Slot> {
        self.lock()
            .slots
            .iter()
            .find(|slot| matches!(&slot.key, SlotKey::Tagged(t) if t == tag))
            .cloned()
    }

    pub fn clear(&self) {
        self.lock().slots.clear();
    }
}

impl NotificationSink for NotificationBoard {
    fn post(&self, payload: &NotificationPayload) {
        let mut inner = self.lock();
        let id = inner.next_id;
        inner.next_id += 1;
        inner.slots.push(Slot {
            key: SlotKey::Sequence(id),
            payload: payload.clone(),
            revision: 1,
        });
    }

    fn post_tagged(&self, tag: &str, payload: &NotificationPayload) {
        let mut inner = self.lock();
        let existing = inner
            .slots
            .iter_mut()
            .find(|slot| matches!(&slot.key, SlotKey::Tagged(t) if t == tag));

        match existing {
            Some(slot) => {
                slot.payload = payload.clone();
                slot.revision += 1;
            }
            None => inner.slots.push(Slot {
                key: SlotKey::Tagged(tag.to_string()),
                payload: payload.clone(),
                revision: 1,
            }),
        }
    }
}
