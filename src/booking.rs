//! Booking Flow Manager: role-gated booking transitions and per-booking
//! status subscriptions.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{watch, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

use crate::capabilities::Delivery;
use crate::event::{NotificationEvent, NotificationType};
use crate::model::{Booking, BookingHistoryEntry, BookingId, BookingStatus, Role};
use crate::retry::{retry_with_backoff, RetryConfigError, RetryPolicy};
use crate::transport::{BookingResponseKind, BookingTransport, TransportError};
use crate::{duration_ms, AppError, ErrorKind, BOOKING_POLL_INTERVAL, MAX_POLL_INTERVAL};

pub const DEFAULT_REJECTION_REASON: &str = "Rejected by caregiver";

// ============================================================================
// Transitions
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookingAction {
    Request,
    Accept,
    Reject,
    Confirm,
    Start,
    Complete,
    Cancel,
}

impl BookingAction {
    pub const ALL: [Self; 7] = [
        Self::Request,
        Self::Accept,
        Self::Reject,
        Self::Confirm,
        Self::Start,
        Self::Complete,
        Self::Cancel,
    ];

    /// Status the booking lands in. A rejection is recorded as a cancellation.
    #[must_use]
    pub const fn target(self) -> BookingStatus {
        match self {
            Self::Request => BookingStatus::Requested,
            Self::Accept => BookingStatus::Accepted,
            Self::Confirm => BookingStatus::Confirmed,
            Self::Start => BookingStatus::InProgress,
            Self::Complete => BookingStatus::Completed,
            Self::Reject | Self::Cancel => BookingStatus::Cancelled,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Request => "request",
            Self::Accept => "accept",
            Self::Reject => "reject",
            Self::Confirm => "confirm",
            Self::Start => "start",
            Self::Complete => "complete",
            Self::Cancel => "cancel",
        }
    }
}

impl fmt::Display for BookingAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether `role` may perform `action` on a booking currently at `from`.
#[must_use]
pub const fn is_allowed(role: Role, action: BookingAction, from: BookingStatus) -> bool {
    use BookingAction as A;
    use BookingStatus as S;
    match role {
        Role::CareRecipient => matches!(
            (action, from),
            (A::Request, S::Draft)
                | (A::Confirm, S::Accepted)
                | (A::Complete, S::InProgress)
                | (
                    A::Cancel,
                    S::Requested | S::Accepted | S::Confirmed | S::InProgress
                )
        ),
        Role::Caregiver => matches!(
            (action, from),
            (A::Accept | A::Reject, S::Requested)
                | (A::Start, S::Confirmed)
                | (A::Complete, S::InProgress)
                | (
                    A::Cancel,
                    S::Requested | S::Accepted | S::Confirmed | S::InProgress
                )
        ),
    }
}

/// Result of checking a transition locally before any call is made.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionCheck {
    Proceed,
    /// Already at the target; nothing to send.
    AlreadyThere,
}

pub fn check_transition(
    role: Role,
    action: BookingAction,
    from: BookingStatus,
) -> Result<TransitionCheck, BookingError> {
    if from.is_terminal() {
        return Err(BookingError::Conflict {
            action,
            status: from,
        });
    }
    if from == action.target() {
        return Ok(TransitionCheck::AlreadyThere);
    }
    if is_allowed(role, action, from) {
        return Ok(TransitionCheck::Proceed);
    }
    let other = match role {
        Role::CareRecipient => Role::Caregiver,
        Role::Caregiver => Role::CareRecipient,
    };
    if is_allowed(other, action, from) {
        Err(BookingError::NotPermitted { role, action })
    } else {
        Err(BookingError::Conflict {
            action,
            status: from,
        })
    }
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BookingError {
    /// The booking is already somewhere this action cannot start from.
    #[error("cannot {action} a booking that is {status}")]
    Conflict {
        action: BookingAction,
        status: BookingStatus,
    },

    #[error("{role} cannot {action} a booking")]
    NotPermitted { role: Role, action: BookingAction },

    #[error("booking not found: {0}")]
    NotFound(BookingId),

    #[error("offline: {0}")]
    Offline(String),

    #[error("server rejected request: {0}")]
    Rejected(String),

    #[error("booking manager has been torn down")]
    TornDown,
}

impl BookingError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Conflict { .. } => ErrorKind::Conflict,
            Self::NotPermitted { .. } => ErrorKind::Authorization,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Offline(_) => ErrorKind::Offline,
            Self::Rejected(_) => ErrorKind::ServerRejected,
            Self::TornDown => ErrorKind::Precondition,
        }
    }

    fn from_transport(e: TransportError, id: &BookingId) -> Self {
        if e.is_not_found() {
            return Self::NotFound(id.clone());
        }
        match e {
            TransportError::Offline(msg) => Self::Offline(msg),
            other => Self::Rejected(
                other
                    .server_message()
                    .map_or_else(|| other.to_string(), str::to_string),
            ),
        }
    }
}

impl From<BookingError> for AppError {
    fn from(e: BookingError) -> Self {
        let message = e.to_string();
        let err = AppError::new(e.kind(), message);
        match e {
            BookingError::Conflict { status, .. } => {
                err.with_context("booking_status", status.as_str())
            }
            _ => err,
        }
    }
}

// ============================================================================
// Configuration
// ============================================================================

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BookingConfigError {
    #[error("poll_interval_ms must be between 100 and {max}")]
    PollInterval { max: u64 },
    #[error("history_retry: {0}")]
    HistoryRetry(#[from] RetryConfigError),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingFlowConfig {
    pub poll_interval_ms: u64,
    pub history_retry: RetryPolicy,
}

impl Default for BookingFlowConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: duration_ms(BOOKING_POLL_INTERVAL),
            history_retry: RetryPolicy::default(),
        }
    }
}

impl BookingFlowConfig {
    pub fn validate(&self) -> Result<(), BookingConfigError> {
        let max = duration_ms(MAX_POLL_INTERVAL);
        if self.poll_interval_ms < 100 || self.poll_interval_ms > max {
            return Err(BookingConfigError::PollInterval { max });
        }
        self.history_retry.validate()?;
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

// ============================================================================
// Manager
// ============================================================================

pub type BookingCallback = Arc<dyn Fn(&Booking) + Send + Sync>;

struct Subscription {
    callback: BookingCallback,
    poller: JoinHandle<()>,
    generation: u64,
    /// Set until the subscriber has seen one snapshot, changed or not.
    awaiting_first: bool,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct BookingFlowManager<B> {
    role: Role,
    config: BookingFlowConfig,
    transport: Arc<B>,
    cache: RwLock<HashMap<BookingId, Booking>>,
    subscriptions: Mutex<HashMap<BookingId, Subscription>>,
    next_generation: AtomicU64,
    torn_down: AtomicBool,
    shutdown_tx: watch::Sender<bool>,
}

impl<B> BookingFlowManager<B>
where
    B: BookingTransport + 'static,
{
    pub fn new(
        role: Role,
        config: BookingFlowConfig,
        transport: Arc<B>,
    ) -> Result<Self, BookingConfigError> {
        config.validate()?;
        let (shutdown_tx, _) = watch::channel(false);
        Ok(Self {
            role,
            config,
            transport,
            cache: RwLock::new(HashMap::new()),
            subscriptions: Mutex::new(HashMap::new()),
            next_generation: AtomicU64::new(0),
            torn_down: AtomicBool::new(false),
            shutdown_tx,
        })
    }

    pub fn role(&self) -> Role {
        self.role
    }

    fn ensure_live(&self) -> Result<(), BookingError> {
        if self.torn_down.load(Ordering::SeqCst) {
            Err(BookingError::TornDown)
        } else {
            Ok(())
        }
    }

    /// Last snapshot seen for a booking, if any.
    pub async fn cached(&self, id: &BookingId) -> Option<Booking> {
        self.cache.read().await.get(id).cloned()
    }

    /// Fetches a booking from the server and delivers it to any subscriber.
    #[instrument(skip(self), fields(booking_id = %id))]
    pub async fn refresh(&self, id: &BookingId) -> Result<Booking, BookingError> {
        self.ensure_live()?;
        let booking = self
            .transport
            .get(id)
            .await
            .map_err(|e| BookingError::from_transport(e, id))?;
        self.store(booking.clone()).await?;
        Ok(booking)
    }

    async fn current(&self, id: &BookingId) -> Result<Booking, BookingError> {
        match self.cached(id).await {
            Some(b) => Ok(b),
            None => self.refresh(id).await,
        }
    }

    /// Writes a snapshot and notifies the subscriber when it changed. A fresh
    /// subscriber always gets its first snapshot.
    async fn store(&self, booking: Booking) -> Result<(), BookingError> {
        let mut cache = self.cache.write().await;
        self.ensure_live()?;
        let changed = cache.get(&booking.id) != Some(&booking);
        let callback = lock(&self.subscriptions)
            .get_mut(&booking.id)
            .and_then(|s| {
                let first = std::mem::replace(&mut s.awaiting_first, false);
                (first || changed).then(|| s.callback.clone())
            });
        cache.insert(booking.id.clone(), booking.clone());
        drop(cache);
        if let Some(cb) = callback {
            cb(&booking);
        }
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Transitions
    // ------------------------------------------------------------------------

    pub async fn request(&self, id: &BookingId) -> Result<Booking, BookingError> {
        self.transition(id, BookingAction::Request, None).await
    }

    pub async fn accept(&self, id: &BookingId) -> Result<Booking, BookingError> {
        self.transition(id, BookingAction::Accept, None).await
    }

    pub async fn reject(&self, id: &BookingId, reason: Option<&str>) -> Result<Booking, BookingError> {
        self.transition(id, BookingAction::Reject, reason).await
    }

    /// Recipient confirms an accepted booking, normally once payment went through.
    pub async fn confirm(&self, id: &BookingId) -> Result<Booking, BookingError> {
        self.transition(id, BookingAction::Confirm, None).await
    }

    pub async fn start(&self, id: &BookingId) -> Result<Booking, BookingError> {
        self.transition(id, BookingAction::Start, None).await
    }

    pub async fn complete(&self, id: &BookingId) -> Result<Booking, BookingError> {
        self.transition(id, BookingAction::Complete, None).await
    }

    pub async fn cancel(&self, id: &BookingId, reason: Option<&str>) -> Result<Booking, BookingError> {
        self.transition(id, BookingAction::Cancel, reason).await
    }

    #[instrument(skip_all, fields(booking_id = %id, role = %self.role, action = %action))]
    async fn transition(
        &self,
        id: &BookingId,
        action: BookingAction,
        reason: Option<&str>,
    ) -> Result<Booking, BookingError> {
        self.ensure_live()?;
        let current = self.current(id).await?;
        if check_transition(self.role, action, current.status)? == TransitionCheck::AlreadyThere {
            debug!(status = %current.status, "booking already at target");
            return Ok(current);
        }

        let sent = match action {
            BookingAction::Accept => {
                self.transport
                    .respond(id, BookingResponseKind::Accepted, None)
                    .await
            }
            BookingAction::Reject => {
                let reason = reason.unwrap_or(DEFAULT_REJECTION_REASON);
                self.transport
                    .respond(id, BookingResponseKind::Rejected, Some(reason))
                    .await
            }
            BookingAction::Complete => self.transport.complete(id).await,
            BookingAction::Cancel => self.transport.cancel(id, reason).await,
            BookingAction::Request | BookingAction::Confirm | BookingAction::Start => {
                self.transport
                    .update_status(id, action.target(), reason)
                    .await
            }
        };

        let mut booking = match sent {
            Ok(b) => b,
            Err(e) if e.is_conflict() => {
                // Server moved on without us; pick up where it is now.
                let status = match self.refresh(id).await {
                    Ok(b) => b.status,
                    Err(_) => current.status,
                };
                warn!(%status, "booking transition conflicted on server");
                return Err(BookingError::Conflict { action, status });
            }
            Err(e) => {
                error!(error = %e, "booking transition failed");
                return Err(BookingError::from_transport(e, id));
            }
        };

        if action == BookingAction::Reject && booking.cancellation_reason.is_none() {
            booking.cancellation_reason = Some(reason.unwrap_or(DEFAULT_REJECTION_REASON).to_string());
        }
        self.store(booking.clone()).await?;
        info!(status = %booking.status, "booking transitioned");
        Ok(booking)
    }

    /// Status-change log for a booking. Read-only, so transient failures are
    /// retried per the configured policy.
    #[instrument(skip(self), fields(booking_id = %id))]
    pub async fn history(&self, id: &BookingId) -> Result<Vec<BookingHistoryEntry>, BookingError> {
        self.ensure_live()?;
        let transport = &self.transport;
        retry_with_backoff(self.config.history_retry, "booking_history", |_| {
            transport.history(id)
        })
        .await
        .map_err(|e| {
            warn!(error = %e, "could not load booking history");
            BookingError::from_transport(e, id)
        })
    }

    // ------------------------------------------------------------------------
    // Subscriptions
    // ------------------------------------------------------------------------

    /// Registers `callback` for status changes of `id` and starts polling it.
    /// The callback first receives the current snapshot, then only changes.
    /// Replaces any existing subscription for the same booking.
    pub fn subscribe<F>(self: &Arc<Self>, id: BookingId, callback: F) -> Result<(), BookingError>
    where
        F: Fn(&Booking) + Send + Sync + 'static,
    {
        self.ensure_live()?;
        let weak: Weak<Self> = Arc::downgrade(self);
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let period = self.config.poll_interval();
        let poll_id = id.clone();
        let generation = self.next_generation.fetch_add(1, Ordering::SeqCst);

        // The poller's first store needs this lock, so it cannot run before
        // the subscription is in the map.
        let mut subscriptions = lock(&self.subscriptions);
        let poller = tokio::spawn(async move {
            loop {
                let Some(this) = weak.upgrade() else { break };
                match this.refresh(&poll_id).await {
                    Ok(b) if b.status.is_terminal() => {
                        debug!(booking_id = %poll_id, status = %b.status, "booking settled, poller done");
                        this.release(&poll_id, generation);
                        break;
                    }
                    Ok(_) => {}
                    Err(BookingError::TornDown) => break,
                    Err(e) => warn!(booking_id = %poll_id, error = %e, "booking poll failed"),
                }
                drop(this);
                tokio::select! {
                    _ = shutdown_rx.changed() => break,
                    () = tokio::time::sleep(period) => {}
                }
            }
        });

        let previous = subscriptions.insert(
            id.clone(),
            Subscription {
                callback: Arc::new(callback),
                poller,
                generation,
                awaiting_first: true,
            },
        );
        drop(subscriptions);
        if let Some(old) = previous {
            debug!(booking_id = %id, "replacing booking subscription");
            old.poller.abort();
        }
        Ok(())
    }

    pub fn unsubscribe(&self, id: &BookingId) -> bool {
        match lock(&self.subscriptions).remove(id) {
            Some(sub) => {
                sub.poller.abort();
                true
            }
            None => false,
        }
    }

    /// Drops a settled subscription unless a newer one replaced it.
    fn release(&self, id: &BookingId, generation: u64) {
        let mut subscriptions = lock(&self.subscriptions);
        if subscriptions.get(id).is_some_and(|s| s.generation == generation) {
            subscriptions.remove(id);
        }
    }

    pub fn is_subscribed(&self, id: &BookingId) -> bool {
        lock(&self.subscriptions).contains_key(id)
    }

    pub fn subscription_count(&self) -> usize {
        lock(&self.subscriptions).len()
    }

    /// Push about a subscribed booking refreshes it immediately. Returns
    /// whether a refresh happened.
    pub async fn handle_push(&self, event: &NotificationEvent, delivery: Delivery) -> bool {
        if event.kind != NotificationType::Booking || delivery == Delivery::Duplicate {
            return false;
        }
        let Some(id) = event.booking_id() else {
            return false;
        };
        if !self.is_subscribed(&id) {
            return false;
        }
        match self.refresh(&id).await {
            Ok(_) => true,
            Err(e) => {
                warn!(booking_id = %id, error = %e, "push-driven booking refresh failed");
                false
            }
        }
    }

    /// Stops every poller; later results are dropped.
    pub fn teardown(&self) {
        if self.torn_down.swap(true, Ordering::SeqCst) {
            return;
        }
        self.shutdown_tx.send_replace(true);
        for (_, sub) in lock(&self.subscriptions).drain() {
            sub.poller.abort();
        }
        info!(role = %self.role, "booking manager torn down");
    }
}

impl<B> Drop for BookingFlowManager<B> {
    fn drop(&mut self) {
        self.torn_down.store(true, Ordering::SeqCst);
        self.shutdown_tx.send_replace(true);
        for (_, sub) in lock(&self.subscriptions).drain() {
            sub.poller.abort();
        }
    }
}
