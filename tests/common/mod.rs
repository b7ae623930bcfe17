//! In-memory backend and platform fakes shared by the integration tests.
#![allow(dead_code)]

use assist_core::capabilities::{
    GeolocationProvider, LocationError, PermissionState, Position,
};
use assist_core::transport::{
    AlertTransport, BookingResponseKind, BookingTransport, NotificationTransport, StatusReport,
    TransportError, TransportResult, TriggerOutcome, TriggerResponse,
};
use assist_core::{
    AlertLocation, Booking, BookingHistoryEntry, BookingId, BookingStatus, EmergencyId,
    EmergencyStatus, NotificationId, PartyInfo, UserId,
};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

#[derive(Debug, Clone)]
pub struct ServerAlert {
    pub status: EmergencyStatus,
    pub location: AlertLocation,
    pub caregiver: Option<PartyInfo>,
}

/// One backend shared by both parties, so a caregiver's acknowledge is what
/// the recipient's next poll observes.
#[derive(Default)]
pub struct InMemoryBackend {
    pub alerts: Mutex<HashMap<EmergencyId, ServerAlert>>,
    pub bookings: Mutex<HashMap<BookingId, Booking>>,
    /// Status answers served before falling back to the stored alert.
    pub scripted_status: Mutex<VecDeque<StatusReport>>,
    /// Raw trigger responses served in order; a default success otherwise.
    pub scripted_trigger: Mutex<VecDeque<serde_json::Value>>,
    pub responder_name: Mutex<Option<String>>,
    pub next_id: AtomicUsize,
    pub offline: AtomicBool,
    pub trigger_gate: Mutex<Option<Arc<Notify>>>,

    pub trigger_calls: AtomicUsize,
    pub status_calls: AtomicUsize,
    pub ack_calls: AtomicUsize,
    pub resolve_calls: AtomicUsize,
    pub mark_read_calls: AtomicUsize,
    pub booking_writes: AtomicUsize,
    pub booking_reads: AtomicUsize,
}

impl InMemoryBackend {
    pub fn new() -> Arc<Self> {
        let backend = Self::default();
        *backend.responder_name.lock().unwrap() = Some("Asha".to_string());
        Arc::new(backend)
    }

    pub fn go_offline(&self) {
        self.offline.store(true, Ordering::SeqCst);
    }

    pub fn go_online(&self) {
        self.offline.store(false, Ordering::SeqCst);
    }

    pub fn gate_triggers(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.trigger_gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    pub fn script_trigger(&self, body: serde_json::Value) {
        self.scripted_trigger.lock().unwrap().push_back(body);
    }

    pub fn script_status(&self, status: Option<EmergencyStatus>, responder: Option<&str>) {
        self.scripted_status.lock().unwrap().push_back(StatusReport {
            status,
            responding_party: responder.map(|n| PartyInfo {
                full_name: Some(n.to_string()),
                ..Default::default()
            }),
            ..Default::default()
        });
    }

    pub fn insert_booking(&self, booking: Booking) {
        self.bookings
            .lock()
            .unwrap()
            .insert(booking.id.clone(), booking);
    }

    pub fn booking_status(&self, id: &str) -> BookingStatus {
        self.bookings.lock().unwrap()[&BookingId::new(id)].status
    }

    pub fn set_booking_status(&self, id: &str, status: BookingStatus) {
        if let Some(b) = self.bookings.lock().unwrap().get_mut(&BookingId::new(id)) {
            b.status = status;
        }
    }

    pub fn alert_status(&self, id: &str) -> Option<EmergencyStatus> {
        self.alerts
            .lock()
            .unwrap()
            .get(&EmergencyId::new(id))
            .map(|a| a.status)
    }

    fn check_online(&self) -> TransportResult<()> {
        if self.offline.load(Ordering::SeqCst) {
            Err(TransportError::Offline("network unreachable".into()))
        } else {
            Ok(())
        }
    }

    fn not_found() -> TransportError {
        TransportError::Status {
            status: 404,
            code: None,
            message: "not found".into(),
        }
    }

    fn write_booking(&self, id: &BookingId, f: impl FnOnce(&mut Booking)) -> TransportResult<Booking> {
        self.check_online()?;
        self.booking_writes.fetch_add(1, Ordering::SeqCst);
        let mut bookings = self.bookings.lock().unwrap();
        let booking = bookings.get_mut(id).ok_or_else(Self::not_found)?;
        if booking.status.is_terminal() {
            return Err(TransportError::Status {
                status: 409,
                code: Some("conflict".into()),
                message: format!("Booking already {}", booking.status),
            });
        }
        f(booking);
        Ok(booking.clone())
    }
}

#[async_trait]
impl AlertTransport for InMemoryBackend {
    async fn trigger(&self, location: &AlertLocation) -> TransportResult<TriggerOutcome> {
        self.trigger_calls.fetch_add(1, Ordering::SeqCst);
        let gate = self.trigger_gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        self.check_online()?;

        let scripted = self.scripted_trigger.lock().unwrap().pop_front();
        let body = scripted.unwrap_or_else(|| {
            let n = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
            serde_json::json!({
                "status": "active",
                "emergency_id": format!("e{n}"),
                "caregivers_notified": 2
            })
        });
        let response: TriggerResponse = serde_json::from_value(body)
            .map_err(|e| TransportError::InvalidResponse(e.to_string()))?;
        let outcome = response.into_outcome()?;

        self.alerts.lock().unwrap().insert(
            outcome.emergency_id.clone(),
            ServerAlert {
                status: EmergencyStatus::Active,
                location: location.clone(),
                caregiver: None,
            },
        );
        Ok(outcome)
    }

    async fn status(&self, id: &EmergencyId) -> TransportResult<StatusReport> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        self.check_online()?;
        if let Some(report) = self.scripted_status.lock().unwrap().pop_front() {
            return Ok(report);
        }
        let alerts = self.alerts.lock().unwrap();
        Ok(match alerts.get(id) {
            Some(a) => StatusReport {
                status: Some(a.status),
                responding_party: a.caregiver.clone(),
                care_recipient: Some(PartyInfo {
                    id: Some(UserId::new("cr1")),
                    full_name: Some("Ravi".into()),
                    ..Default::default()
                }),
                location: Some(a.location.clone()),
                message: None,
            },
            None => StatusReport::default(),
        })
    }

    async fn acknowledge(&self, id: &EmergencyId) -> TransportResult<()> {
        self.ack_calls.fetch_add(1, Ordering::SeqCst);
        self.check_online()?;
        let responder = self.responder_name.lock().unwrap().clone();
        let mut alerts = self.alerts.lock().unwrap();
        let alert = alerts.get_mut(id).ok_or_else(Self::not_found)?;
        if alert.status != EmergencyStatus::Active {
            return Err(TransportError::Rejected(format!(
                "Emergency already {}",
                alert.status
            )));
        }
        alert.status = EmergencyStatus::Acknowledged;
        alert.caregiver = Some(PartyInfo {
            full_name: responder,
            ..Default::default()
        });
        Ok(())
    }

    async fn resolve(&self, id: &EmergencyId) -> TransportResult<()> {
        self.resolve_calls.fetch_add(1, Ordering::SeqCst);
        self.check_online()?;
        let mut alerts = self.alerts.lock().unwrap();
        let alert = alerts.get_mut(id).ok_or_else(Self::not_found)?;
        alert.status = EmergencyStatus::Resolved;
        Ok(())
    }
}

#[async_trait]
impl NotificationTransport for InMemoryBackend {
    async fn mark_read(&self, _id: &NotificationId) -> TransportResult<()> {
        self.mark_read_calls.fetch_add(1, Ordering::SeqCst);
        self.check_online()
    }
}

#[async_trait]
impl BookingTransport for InMemoryBackend {
    async fn get(&self, id: &BookingId) -> TransportResult<Booking> {
        self.check_online()?;
        self.booking_reads.fetch_add(1, Ordering::SeqCst);
        self.bookings
            .lock()
            .unwrap()
            .get(id)
            .cloned()
            .ok_or_else(Self::not_found)
    }

    async fn respond(
        &self,
        id: &BookingId,
        response: BookingResponseKind,
        reason: Option<&str>,
    ) -> TransportResult<Booking> {
        self.write_booking(id, |b| match response {
            BookingResponseKind::Accepted => {
                b.status = BookingStatus::Accepted;
                b.caregiver_id = Some(UserId::new("cg1"));
            }
            BookingResponseKind::Rejected => {
                b.status = BookingStatus::Cancelled;
                b.cancellation_reason = reason.map(str::to_string);
            }
        })
    }

    async fn update_status(
        &self,
        id: &BookingId,
        status: BookingStatus,
        _reason: Option<&str>,
    ) -> TransportResult<Booking> {
        self.write_booking(id, |b| b.status = status)
    }

    async fn complete(&self, id: &BookingId) -> TransportResult<Booking> {
        self.write_booking(id, |b| b.status = BookingStatus::Completed)
    }

    async fn cancel(&self, id: &BookingId, reason: Option<&str>) -> TransportResult<Booking> {
        self.write_booking(id, |b| {
            b.status = BookingStatus::Cancelled;
            b.cancellation_reason = reason.map(str::to_string);
        })
    }

    async fn history(&self, _id: &BookingId) -> TransportResult<Vec<BookingHistoryEntry>> {
        self.check_online()?;
        Ok(Vec::new())
    }
}

pub fn booking(id: &str, status: BookingStatus) -> Booking {
    Booking {
        id: BookingId::new(id),
        status,
        caregiver_id: status.has_caregiver().then(|| UserId::new("cg1")),
        care_recipient_id: UserId::new("cr1"),
        scheduled_at: "2026-11-02T09:00:00Z".into(),
        duration_hours: 2.0,
        video_call_request_id: None,
        chat_session_id: None,
        cancellation_reason: None,
        updated_at: None,
    }
}

// ---------------------------------------------------------------------------
// Geolocation
// ---------------------------------------------------------------------------

pub struct FixedLocation(pub Position);

impl FixedLocation {
    pub fn at(latitude: f64, longitude: f64) -> Arc<Self> {
        Arc::new(Self(Position {
            latitude,
            longitude,
            address: None,
        }))
    }
}

#[async_trait]
impl GeolocationProvider for FixedLocation {
    async fn permission(&self) -> PermissionState {
        PermissionState::Authorized
    }

    async fn current_position(&self) -> Result<Position, LocationError> {
        Ok(self.0.clone())
    }
}

pub struct DeniedLocation;

#[async_trait]
impl GeolocationProvider for DeniedLocation {
    async fn permission(&self) -> PermissionState {
        PermissionState::Denied
    }

    async fn current_position(&self) -> Result<Position, LocationError> {
        Err(LocationError::PermissionDenied)
    }
}

/// Never produces a fix.
pub struct StuckLocation;

#[async_trait]
impl GeolocationProvider for StuckLocation {
    async fn current_position(&self) -> Result<Position, LocationError> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Err(LocationError::Unavailable)
    }
}
