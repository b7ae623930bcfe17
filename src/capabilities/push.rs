use lru::LruCache;
use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;
use std::sync::{Mutex, PoisonError};
use thiserror::Error;

use crate::event::{NotificationEvent, NotificationType};
use crate::PUSH_DEDUP_CAPACITY;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Default)]
#[serde(rename_all = "snake_case")]
pub enum NotificationPriority {
    Min,
    Low,
    #[default]
    Default,
    High,
    Max,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PushConfigError {
    #[error("dedup capacity must be at least 1")]
    ZeroDedupCapacity,
}

/// How foreground notifications are presented. Passed in at init rather than
/// installed globally.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NotificationHandlerConfig {
    pub show_alert: bool,
    pub play_sound: bool,
    pub set_badge: bool,
    pub priority: NotificationPriority,
    pub dedup_capacity: usize,
}

impl Default for NotificationHandlerConfig {
    fn default() -> Self {
        Self {
            show_alert: true,
            play_sound: true,
            set_badge: true,
            priority: NotificationPriority::High,
            dedup_capacity: PUSH_DEDUP_CAPACITY,
        }
    }
}

impl NotificationHandlerConfig {
    pub fn validate(&self) -> Result<(), PushConfigError> {
        if self.dedup_capacity == 0 {
            return Err(PushConfigError::ZeroDedupCapacity);
        }
        Ok(())
    }

    /// Display policy for one event. Emergencies always alert, sound and use
    /// the highest priority, whatever the configured defaults say.
    #[must_use]
    pub fn presentation_for(&self, event: &NotificationEvent) -> NotificationPresentation {
        if event.kind == NotificationType::Emergency {
            return NotificationPresentation {
                show_alert: true,
                play_sound: true,
                set_badge: self.set_badge,
                priority: NotificationPriority::Max,
            };
        }

        let priority = if event.is_high_priority() {
            self.priority.max(NotificationPriority::High)
        } else {
            self.priority
        };

        NotificationPresentation {
            show_alert: self.show_alert,
            play_sound: self.play_sound,
            set_badge: self.set_badge && !event.is_read,
            priority,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct NotificationPresentation {
    pub show_alert: bool,
    pub play_sound: bool,
    pub set_badge: bool,
    pub priority: NotificationPriority,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    First,
    Duplicate,
}

/// Inbound side of the push channel. Delivery is at-most-once per send but
/// the platform may redeliver; recently seen keys are remembered here.
pub struct PushChannel {
    seen: Mutex<LruCache<String, ()>>,
}

impl PushChannel {
    pub fn new(capacity: usize) -> Self {
        let cap = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            seen: Mutex::new(LruCache::new(cap)),
        }
    }

    /// Records the event and reports whether it was seen before. Events with no
    /// identifying key are always treated as first deliveries.
    pub fn observe(&self, event: &NotificationEvent) -> Delivery {
        let Some(key) = event.dedup_key() else {
            return Delivery::First;
        };
        let mut seen = self.seen.lock().unwrap_or_else(PoisonError::into_inner);
        if seen.put(key, ()).is_some() {
            Delivery::Duplicate
        } else {
            Delivery::First
        }
    }

    pub fn forget_all(&self) {
        self.seen
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

impl Default for PushChannel {
    fn default() -> Self {
        Self::new(PUSH_DEDUP_CAPACITY)
    }
}
