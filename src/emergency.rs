//! Client-side lifecycle of one emergency alert per owning party.
//!
//! The coordinator owns the `active -> acknowledged -> resolved` state
//! machine, the single-flight trigger, and the poll loop that reconciles local
//! state with the server. Both the care recipient and the caregiver views run
//! the same coordinator; only the role differs.
//!
//! State changes only ever come from server responses (trigger, acknowledge,
//! resolve, status). Push payloads are treated as a hint to re-fetch, never as
//! a source of status.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{watch, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

use crate::capabilities::{locate_or_unknown, Delivery, GeolocationProvider};
use crate::event::{NotificationEvent, NotificationType};
use crate::model::{
    AlertLocation, EmergencyAlert, EmergencyId, EmergencyStatus, NotificationId,
    PendingEmergency, Role, UnixTimeMs,
};
use crate::transport::{
    AlertTransport, DeliveryWarning, NotificationTransport, StatusReport, TransportError,
};
use crate::{
    duration_ms, AppError, ErrorKind, FallbackAction, EMERGENCY_POLL_INTERVAL, LOCATION_TIMEOUT,
    MAX_POLL_INTERVAL,
};

// ============================================================================
// Configuration
// ============================================================================

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CoordinatorConfigError {
    #[error("poll_interval_ms must be between 100 and {max}")]
    PollInterval { max: u64 },
    #[error("location_timeout_ms must be > 0")]
    LocationTimeout,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    pub poll_interval_ms: u64,
    pub location_timeout_ms: u64,
    /// Number offered to the user when the app cannot deliver an alert.
    pub fallback_phone: Option<String>,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: duration_ms(EMERGENCY_POLL_INTERVAL),
            location_timeout_ms: duration_ms(LOCATION_TIMEOUT),
            fallback_phone: None,
        }
    }
}

impl CoordinatorConfig {
    pub fn validate(&self) -> Result<(), CoordinatorConfigError> {
        let max = duration_ms(MAX_POLL_INTERVAL);
        if self.poll_interval_ms < 100 || self.poll_interval_ms > max {
            return Err(CoordinatorConfigError::PollInterval { max });
        }
        if self.location_timeout_ms == 0 {
            return Err(CoordinatorConfigError::LocationTimeout);
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn location_timeout(&self) -> Duration {
        Duration::from_millis(self.location_timeout_ms)
    }
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EmergencyError {
    #[error("offline: {0}")]
    Offline(String),

    #[error("server rejected request: {0}")]
    Rejected(String),

    /// No alert id is known locally, so there is nothing to act on.
    #[error("emergency session missing")]
    MissingSession,

    #[error("cannot {action} an alert that is {status}")]
    InvalidState {
        action: &'static str,
        status: EmergencyStatus,
    },

    #[error("{role} cannot {action}")]
    NotPermitted { role: Role, action: &'static str },

    #[error("trigger was interrupted before completing")]
    Interrupted,

    #[error("coordinator has been torn down")]
    TornDown,
}

impl EmergencyError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Offline(_) => ErrorKind::Offline,
            Self::Rejected(_) | Self::Interrupted => ErrorKind::ServerRejected,
            Self::InvalidState { .. } => ErrorKind::Conflict,
            Self::MissingSession | Self::NotPermitted { .. } | Self::TornDown => {
                ErrorKind::Precondition
            }
        }
    }

    /// Offline and server-side failures on the emergency path must send the
    /// user to a phone instead.
    #[must_use]
    pub fn needs_fallback(&self) -> bool {
        matches!(
            self,
            Self::Offline(_) | Self::Rejected(_) | Self::Interrupted
        )
    }

    #[must_use]
    pub fn to_app_error(&self, fallback_phone: Option<&str>) -> AppError {
        let err = AppError::new(self.kind(), self.to_string());
        if self.needs_fallback() {
            err.with_fallback(FallbackAction::CallEmergencyContact {
                phone: fallback_phone.map(str::to_string),
            })
        } else {
            err
        }
    }
}

impl From<TransportError> for EmergencyError {
    fn from(e: TransportError) -> Self {
        match e {
            TransportError::Offline(msg) => Self::Offline(msg),
            TransportError::Status { message, .. } | TransportError::Rejected(message) => {
                Self::Rejected(message)
            }
            TransportError::InvalidResponse(msg) | TransportError::Request(msg) => {
                Self::Rejected(msg)
            }
        }
    }
}

impl From<EmergencyError> for AppError {
    fn from(e: EmergencyError) -> Self {
        e.to_app_error(None)
    }
}

// ============================================================================
// Results and snapshots
// ============================================================================

/// Result of a trigger as seen by the caller.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TriggerReport {
    pub alert: EmergencyAlert,
    /// Success that should still be flagged to the user.
    pub delivery_warning: Option<DeliveryWarning>,
    pub caregivers_notified: Option<u32>,
    /// The trigger was absorbed by an alert that was already open.
    pub already_active: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ReconcileOutcome {
    /// No alert held locally.
    NoAlert,
    /// Alert already terminal, no fetch made.
    Settled,
    /// Server had no information (`"unknown"`).
    NoInformation,
    /// Same status; details refreshed.
    Refreshed,
    Advanced {
        from: EmergencyStatus,
        to: EmergencyStatus,
    },
    /// Result older than local state, or for an alert no longer held.
    Discarded,
}

impl ReconcileOutcome {
    /// Whether a poller should keep going after this outcome.
    #[must_use]
    pub const fn keeps_polling(self) -> bool {
        match self {
            Self::NoAlert | Self::Settled => false,
            Self::Advanced { to, .. } => !to.is_terminal(),
            Self::NoInformation | Self::Refreshed | Self::Discarded => true,
        }
    }
}

/// What the coordinator did with an inbound emergency notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushHandling {
    /// Matched the held alert; a status fetch was made.
    Reconciled(ReconcileOutcome),
    /// Recorded in the caregiver's pending list.
    Pending,
    /// Duplicate or irrelevant to this party.
    Ignored,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CoordinatorSnapshot {
    pub role: Role,
    pub alert: Option<EmergencyAlert>,
    pub pending: Vec<PendingEmergency>,
    pub trigger_in_flight: bool,
    pub last_warning: Option<DeliveryWarning>,
}

#[derive(Debug, Default)]
struct AlertState {
    current: Option<EmergencyAlert>,
    pending: Vec<PendingEmergency>,
    last_warning: Option<DeliveryWarning>,
    completion: Option<EmergencyId>,
}

impl AlertState {
    fn remove_pending(&mut self, id: &EmergencyId) -> Option<PendingEmergency> {
        let idx = self.pending.iter().position(|p| &p.id == id)?;
        Some(self.pending.remove(idx))
    }

    /// Merges a status report into the held alert. Status only moves forward;
    /// anything older than what is held is dropped whole.
    fn apply_report(&mut self, id: &EmergencyId, report: StatusReport) -> ReconcileOutcome {
        let Some(alert) = self.current.as_mut().filter(|a| &a.id == id) else {
            return ReconcileOutcome::Discarded;
        };
        let Some(reported) = report.status else {
            return ReconcileOutcome::NoInformation;
        };

        let from = alert.status;
        let outcome = if from.can_advance_to(reported) {
            alert.status = reported;
            ReconcileOutcome::Advanced { from, to: reported }
        } else if from == reported {
            ReconcileOutcome::Refreshed
        } else {
            return ReconcileOutcome::Discarded;
        };

        if reported != EmergencyStatus::Active {
            if let Some(party) = report.responding_party {
                alert.responding_party = Some(party);
            }
        }
        if let Some(party) = report.care_recipient {
            alert.care_recipient = Some(party);
        }
        if let Some(location) = report.location {
            alert.location = Some(location);
        }

        if reported.is_terminal() && from != reported {
            self.completion = Some(id.clone());
            self.remove_pending(id);
        }
        outcome
    }
}

type TriggerSlot = watch::Receiver<Option<Result<TriggerReport, EmergencyError>>>;

/// Clears the in-flight slot when the leading trigger finishes or is dropped.
struct InFlightGuard<'a> {
    slot: &'a Mutex<Option<TriggerSlot>>,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        *lock(self.slot) = None;
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

// ============================================================================
// Coordinator
// ============================================================================

pub struct EmergencyCoordinator<T> {
    role: Role,
    config: CoordinatorConfig,
    transport: Arc<T>,
    geolocation: Arc<dyn GeolocationProvider>,
    state: RwLock<AlertState>,
    in_flight: Mutex<Option<TriggerSlot>>,
    poller: Mutex<Option<JoinHandle<()>>>,
    torn_down: AtomicBool,
    shutdown_tx: watch::Sender<bool>,
    updates: watch::Sender<Option<EmergencyAlert>>,
}

impl<T> EmergencyCoordinator<T>
where
    T: AlertTransport + NotificationTransport + 'static,
{
    pub fn new(
        role: Role,
        config: CoordinatorConfig,
        transport: Arc<T>,
        geolocation: Arc<dyn GeolocationProvider>,
    ) -> Result<Self, CoordinatorConfigError> {
        config.validate()?;
        let (shutdown_tx, _) = watch::channel(false);
        let (updates, _) = watch::channel(None);
        Ok(Self {
            role,
            config,
            transport,
            geolocation,
            state: RwLock::new(AlertState::default()),
            in_flight: Mutex::new(None),
            poller: Mutex::new(None),
            torn_down: AtomicBool::new(false),
            shutdown_tx,
            updates,
        })
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    pub fn is_torn_down(&self) -> bool {
        self.torn_down.load(Ordering::SeqCst)
    }

    fn ensure_live(&self) -> Result<(), EmergencyError> {
        if self.is_torn_down() {
            Err(EmergencyError::TornDown)
        } else {
            Ok(())
        }
    }

    /// Live view of the held alert for the presentation layer.
    pub fn subscribe(&self) -> watch::Receiver<Option<EmergencyAlert>> {
        self.updates.subscribe()
    }

    fn publish(&self, state: &AlertState) {
        self.updates.send_replace(state.current.clone());
    }

    pub async fn snapshot(&self) -> CoordinatorSnapshot {
        let st = self.state.read().await;
        CoordinatorSnapshot {
            role: self.role,
            alert: st.current.clone(),
            pending: st.pending.clone(),
            trigger_in_flight: lock(&self.in_flight).is_some(),
            last_warning: st.last_warning,
        }
    }

    pub async fn current_alert(&self) -> Option<EmergencyAlert> {
        self.state.read().await.current.clone()
    }

    pub async fn pending(&self) -> Vec<PendingEmergency> {
        self.state.read().await.pending.clone()
    }

    /// Returns the id of an alert whose resolution was observed by polling,
    /// exactly once.
    pub async fn take_completion_signal(&self) -> Option<EmergencyId> {
        self.state.write().await.completion.take()
    }

    // ------------------------------------------------------------------------
    // Trigger
    // ------------------------------------------------------------------------

    /// Raises an alert. Overlapping calls share one transport call and one
    /// outcome; a call made while an alert is already open returns that alert.
    ///
    /// `location` skips the geolocation lookup when the caller already has a fix.
    /// Never retried: on failure nothing is stored and the error carries the
    /// out-of-band fallback.
    pub async fn trigger(
        &self,
        location: Option<AlertLocation>,
    ) -> Result<TriggerReport, EmergencyError> {
        self.ensure_live()?;
        if self.role.is_responder() {
            return Err(EmergencyError::NotPermitted {
                role: self.role,
                action: "trigger an emergency",
            });
        }

        // Check-and-set happens before the first await.
        let leader = {
            let mut slot = lock(&self.in_flight);
            match slot.as_ref() {
                Some(rx) => Err(rx.clone()),
                None => {
                    let (tx, rx) = watch::channel(None);
                    *slot = Some(rx);
                    Ok(tx)
                }
            }
        };

        match leader {
            Ok(tx) => {
                let _guard = InFlightGuard {
                    slot: &self.in_flight,
                };
                let result = self.run_trigger(location).await;
                tx.send_replace(Some(result.clone()));
                result
            }
            Err(mut rx) => {
                debug!("trigger already in flight, joining");
                let joined = rx.wait_for(Option::is_some).await;
                match joined {
                    Ok(value) => value.clone().unwrap_or(Err(EmergencyError::Interrupted)),
                    Err(_) if self.is_torn_down() => Err(EmergencyError::TornDown),
                    Err(_) => Err(EmergencyError::Interrupted),
                }
            }
        }
    }

    #[instrument(skip(self, location), fields(role = %self.role))]
    async fn run_trigger(
        &self,
        location: Option<AlertLocation>,
    ) -> Result<TriggerReport, EmergencyError> {
        if let Some(alert) = self.current_alert().await.filter(EmergencyAlert::is_open) {
            info!(emergency_id = %alert.id, "alert already open, not triggering again");
            return Ok(TriggerReport {
                alert,
                delivery_warning: None,
                caregivers_notified: None,
                already_active: true,
            });
        }

        let raised_at = UnixTimeMs::now();
        let location = match location {
            Some(loc) => loc,
            None => {
                let (loc, err) =
                    locate_or_unknown(self.geolocation.as_ref(), self.config.location_timeout())
                        .await;
                if let Some(e) = err {
                    warn!(error = %e, "location unavailable, sending alert without it");
                }
                loc
            }
        };

        let outcome = self.transport.trigger(&location).await.map_err(|e| {
            error!(error = %e, offline = e.is_offline(), "emergency trigger failed");
            EmergencyError::from(e)
        })?;

        let alert = EmergencyAlert::new(outcome.emergency_id.clone(), Some(location), raised_at);
        let report = TriggerReport {
            alert: alert.clone(),
            delivery_warning: outcome.delivery_warning,
            caregivers_notified: outcome.caregivers_notified,
            already_active: false,
        };

        let mut st = self.state.write().await;
        if self.is_torn_down() {
            warn!(emergency_id = %outcome.emergency_id, "trigger completed after teardown, not stored");
            return Ok(report);
        }
        st.current = Some(alert);
        st.last_warning = outcome.delivery_warning;
        st.completion = None;
        self.publish(&st);
        drop(st);

        match outcome.delivery_warning {
            Some(w) => warn!(
                emergency_id = %outcome.emergency_id,
                warning = ?w,
                caregivers_notified = ?outcome.caregivers_notified,
                "emergency raised with degraded delivery"
            ),
            None => info!(
                emergency_id = %outcome.emergency_id,
                caregivers_notified = ?outcome.caregivers_notified,
                "emergency raised"
            ),
        }
        Ok(report)
    }

    // ------------------------------------------------------------------------
    // Acknowledge / resolve
    // ------------------------------------------------------------------------

    /// Caregiver takes responsibility for the held alert. Only valid while it
    /// is `active`; failures leave it unchanged and are not retried.
    #[instrument(skip(self), fields(role = %self.role))]
    pub async fn acknowledge(&self) -> Result<EmergencyAlert, EmergencyError> {
        self.ensure_live()?;
        if !self.role.is_responder() {
            return Err(EmergencyError::NotPermitted {
                role: self.role,
                action: "acknowledge an emergency",
            });
        }

        let alert = self.current_alert().await.ok_or(EmergencyError::MissingSession)?;
        if alert.status != EmergencyStatus::Active {
            return Err(EmergencyError::InvalidState {
                action: "acknowledge",
                status: alert.status,
            });
        }

        self.transport.acknowledge(&alert.id).await.map_err(|e| {
            error!(emergency_id = %alert.id, error = %e, "acknowledge failed");
            EmergencyError::from(e)
        })?;

        let updated = self
            .commit_transition(&alert.id, EmergencyStatus::Acknowledged)
            .await?;
        info!(emergency_id = %alert.id, "emergency acknowledged");
        self.mark_read(updated.origin_notification.as_ref()).await;
        Ok(updated)
    }

    /// Either party closes the held alert. Resolving an already resolved
    /// alert returns it without another call.
    #[instrument(skip(self), fields(role = %self.role))]
    pub async fn resolve(&self) -> Result<EmergencyAlert, EmergencyError> {
        self.ensure_live()?;
        let alert = self.current_alert().await.ok_or(EmergencyError::MissingSession)?;
        if alert.status.is_terminal() {
            debug!(emergency_id = %alert.id, "already resolved");
            return Ok(alert);
        }

        self.transport.resolve(&alert.id).await.map_err(|e| {
            error!(emergency_id = %alert.id, error = %e, "resolve failed");
            EmergencyError::from(e)
        })?;

        let updated = self
            .commit_transition(&alert.id, EmergencyStatus::Resolved)
            .await?;
        info!(emergency_id = %alert.id, "emergency resolved");
        self.mark_read(updated.origin_notification.as_ref()).await;
        Ok(updated)
    }

    async fn commit_transition(
        &self,
        id: &EmergencyId,
        to: EmergencyStatus,
    ) -> Result<EmergencyAlert, EmergencyError> {
        let mut st = self.state.write().await;
        if self.is_torn_down() {
            return Err(EmergencyError::TornDown);
        }
        st.remove_pending(id);
        let alert = st
            .current
            .as_mut()
            .filter(|a| &a.id == id)
            .ok_or(EmergencyError::MissingSession)?;
        // A poll may already have moved it further.
        if alert.status.can_advance_to(to) {
            alert.status = to;
        }
        let updated = alert.clone();
        self.publish(&st);
        Ok(updated)
    }

    async fn mark_read(&self, notification: Option<&NotificationId>) {
        let Some(id) = notification else { return };
        if let Err(e) = self.transport.mark_read(id).await {
            warn!(notification_id = %id, error = %e, "failed to mark notification read");
        }
    }

    /// Drops a resolved alert the user has seen.
    pub async fn dismiss(&self) -> bool {
        let mut st = self.state.write().await;
        if st.current.as_ref().is_some_and(|a| !a.is_open()) {
            st.current = None;
            st.last_warning = None;
            self.publish(&st);
            true
        } else {
            false
        }
    }

    // ------------------------------------------------------------------------
    // Caregiver intake
    // ------------------------------------------------------------------------

    /// Adopts an alert the caregiver was notified about as the held alert,
    /// seeded from a status fetch.
    #[instrument(skip(self), fields(role = %self.role, emergency_id = %id))]
    pub async fn open_alert(
        &self,
        id: EmergencyId,
        notification: Option<NotificationId>,
    ) -> Result<EmergencyAlert, EmergencyError> {
        self.ensure_live()?;
        if !self.role.is_responder() {
            return Err(EmergencyError::NotPermitted {
                role: self.role,
                action: "open another party's alert",
            });
        }

        let report = self.transport.status(&id).await.map_err(|e| {
            error!(error = %e, "could not load emergency");
            EmergencyError::from(e)
        })?;

        let mut st = self.state.write().await;
        if self.is_torn_down() {
            return Err(EmergencyError::TornDown);
        }
        let pending = st.pending.iter().find(|p| p.id == id).cloned();
        let received_at = pending.as_ref().map_or_else(UnixTimeMs::now, |p| p.received_at);
        let mut alert = EmergencyAlert::new(
            id.clone(),
            pending.as_ref().and_then(|p| p.location.clone()),
            received_at,
        );
        alert.origin_notification =
            notification.or_else(|| pending.as_ref().and_then(|p| p.notification_id.clone()));
        st.current = Some(alert);
        st.completion = None;
        st.apply_report(&id, report);
        let alert = st.current.clone().ok_or(EmergencyError::MissingSession)?;
        self.publish(&st);
        info!(status = %alert.status, "emergency opened");
        Ok(alert)
    }

    /// Routes an inbound emergency notification: a push about the held alert
    /// triggers a status fetch; one about another alert is queued for the
    /// caregiver. Duplicates are never re-fetched.
    pub async fn handle_push(&self, event: &NotificationEvent, delivery: Delivery) -> PushHandling {
        if event.kind != NotificationType::Emergency || self.is_torn_down() {
            return PushHandling::Ignored;
        }
        let Some(id) = event.emergency_id() else {
            return PushHandling::Ignored;
        };
        if delivery == Delivery::Duplicate {
            debug!(emergency_id = %id, "duplicate emergency push");
            return PushHandling::Ignored;
        }

        let held = self
            .current_alert()
            .await
            .is_some_and(|a| a.id == id);
        if held {
            return match self.reconcile().await {
                Ok(outcome) => PushHandling::Reconciled(outcome),
                Err(e) => {
                    warn!(emergency_id = %id, error = %e, "push-driven refresh failed");
                    PushHandling::Ignored
                }
            };
        }

        if !self.role.is_responder() {
            return PushHandling::Ignored;
        }

        let mut st = self.state.write().await;
        if self.is_torn_down() {
            return PushHandling::Ignored;
        }
        if st.pending.iter().any(|p| p.id == id) {
            return PushHandling::Ignored;
        }
        st.pending.push(PendingEmergency {
            id: id.clone(),
            care_recipient_name: event.care_recipient_name(),
            location: event.location(),
            notification_id: event.id.clone(),
            received_at: UnixTimeMs::now(),
        });
        info!(emergency_id = %id, "emergency queued for caregiver");
        PushHandling::Pending
    }

    // ------------------------------------------------------------------------
    // Reconciliation
    // ------------------------------------------------------------------------

    /// Fetches server status for the held alert and merges it.
    pub async fn reconcile(&self) -> Result<ReconcileOutcome, EmergencyError> {
        self.ensure_live()?;
        let Some(alert) = self.current_alert().await else {
            return Ok(ReconcileOutcome::NoAlert);
        };
        if alert.status.is_terminal() {
            return Ok(ReconcileOutcome::Settled);
        }

        let report = self.transport.status(&alert.id).await?;

        let mut st = self.state.write().await;
        if self.is_torn_down() {
            return Err(EmergencyError::TornDown);
        }
        let outcome = st.apply_report(&alert.id, report);
        match outcome {
            ReconcileOutcome::Advanced { from, to } => {
                self.publish(&st);
                info!(emergency_id = %alert.id, %from, %to, "emergency status advanced");
            }
            ReconcileOutcome::Refreshed => self.publish(&st),
            ReconcileOutcome::Discarded => {
                warn!(emergency_id = %alert.id, "discarded stale status result");
            }
            _ => debug!(emergency_id = %alert.id, ?outcome, "no change"),
        }
        Ok(outcome)
    }

    /// Starts the background poll loop if one is not already running. It stops
    /// once the alert is resolved or gone, or on teardown.
    pub fn start_polling(self: &Arc<Self>) -> bool {
        if self.is_torn_down() {
            return false;
        }
        let mut slot = lock(&self.poller);
        if slot.as_ref().is_some_and(|h| !h.is_finished()) {
            return false;
        }

        let weak: Weak<Self> = Arc::downgrade(self);
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let period = self.config.poll_interval();
        *slot = Some(tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown_rx.changed() => break,
                    () = tokio::time::sleep(period) => {}
                }
                let Some(this) = weak.upgrade() else { break };
                match this.reconcile().await {
                    Ok(outcome) if !outcome.keeps_polling() => {
                        debug!(?outcome, "poll loop finished");
                        break;
                    }
                    Ok(_) => {}
                    Err(EmergencyError::TornDown) => break,
                    Err(e) => warn!(error = %e, "poll tick failed"),
                }
            }
        }));
        true
    }

    pub fn is_polling(&self) -> bool {
        lock(&self.poller)
            .as_ref()
            .is_some_and(|h| !h.is_finished())
    }

    /// Stops polling and fences every outstanding call: nothing that
    /// completes afterwards touches state.
    pub fn teardown(&self) {
        if self.torn_down.swap(true, Ordering::SeqCst) {
            return;
        }
        self.shutdown_tx.send_replace(true);
        if let Some(handle) = lock(&self.poller).take() {
            handle.abort();
        }
        info!(role = %self.role, "emergency coordinator torn down");
    }
}

impl<T> Drop for EmergencyCoordinator<T> {
    fn drop(&mut self) {
        self.torn_down.store(true, Ordering::SeqCst);
        self.shutdown_tx.send_replace(true);
        if let Some(handle) = lock(&self.poller).take() {
            handle.abort();
        }
    }
}
