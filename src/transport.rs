//! Client side of the care backend's HTTP API.
//!
//! Three narrow traits, one per concern, so the coordinator and the booking
//! manager can be driven by in-memory fakes in tests. [`HttpTransport`]
//! implements all three over the shell's [`HttpExecutor`].

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::capabilities::{HttpError, HttpExecutor, HttpRequest, HttpResponse, ValidatedUrl};
use crate::event::location_from_map;
use crate::model::{
    AlertLocation, Booking, BookingHistoryEntry, BookingId, BookingStatus, ChatSessionId,
    EmergencyId, EmergencyStatus, NotificationId, PartyInfo, UserId, VideoCallId,
};
use crate::retry::Retryable;
use crate::{ApiErrorResponse, AppError, ErrorKind, REQUEST_TIMEOUT};

/// Ids the backend hands out when it accepted a trigger but has nowhere to
/// record it for real-time delivery.
pub const STUB_ID_PREFIX: &str = "stub-";

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("offline: {0}")]
    Offline(String),

    #[error("HTTP {status}: {message}")]
    Status {
        status: u16,
        code: Option<String>,
        message: String,
    },

    /// A 2xx response whose body says `"status": "error"`.
    #[error("server rejected request: {0}")]
    Rejected(String),

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("invalid request: {0}")]
    Request(String),
}

impl TransportError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Offline(_) => ErrorKind::Offline,
            Self::Status { status, .. } => AppError::from_http_status(*status, None).kind,
            Self::Rejected(_) => ErrorKind::ServerRejected,
            Self::InvalidResponse(_) | Self::Request(_) => ErrorKind::Internal,
        }
    }

    #[must_use]
    pub fn is_offline(&self) -> bool {
        matches!(self, Self::Offline(_))
    }

    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Status { status: 409, .. })
    }

    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Status { status: 404, .. })
    }

    /// Message suitable for showing to the user, when the server sent one.
    #[must_use]
    pub fn server_message(&self) -> Option<&str> {
        match self {
            Self::Status { message, .. } | Self::Rejected(message) => Some(message),
            _ => None,
        }
    }
}

impl Retryable for TransportError {
    fn is_retryable(&self) -> bool {
        match self {
            Self::Offline(_) => true,
            Self::Status { status, .. } => *status == 408 || *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

impl From<HttpError> for TransportError {
    fn from(e: HttpError) -> Self {
        if e.is_offline() {
            return Self::Offline(e.to_string());
        }
        match e {
            HttpError::InvalidResponse { reason, .. } => Self::InvalidResponse(reason),
            other => Self::Request(other.to_string()),
        }
    }
}

impl From<TransportError> for AppError {
    fn from(e: TransportError) -> Self {
        let kind = e.kind();
        let mut err = AppError::new(kind, e.to_string());
        if let TransportError::Status { status, code, .. } = &e {
            err = err.with_context("http_status", status.to_string());
            if let Some(code) = code {
                err = err.with_context("server_code", code.clone());
            }
        }
        err
    }
}

pub type TransportResult<T> = Result<T, TransportError>;

// ============================================================================
// Emergency contract
// ============================================================================

/// Why a successful trigger may still not have reached anyone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryWarning {
    /// Stored, but not where caregivers' devices will see it in real time.
    NotRecordedForRealtime,
    /// Recorded, but the recipient has no caregivers to notify.
    NoRespondersNotified,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerOutcome {
    pub emergency_id: EmergencyId,
    pub caregivers_notified: Option<u32>,
    pub delivery_warning: Option<DeliveryWarning>,
    pub message: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TriggerResponse {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub emergency_id: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub caregivers_notified: Option<u32>,
    #[serde(default)]
    pub delivery_confirmed: Option<bool>,
}

impl TriggerResponse {
    pub fn into_outcome(self) -> TransportResult<TriggerOutcome> {
        if is_soft_error(self.status.as_deref()) {
            return Err(TransportError::Rejected(
                self.message
                    .unwrap_or_else(|| "Could not trigger emergency.".to_string()),
            ));
        }
        let id = self
            .emergency_id
            .filter(|id| !id.trim().is_empty())
            .ok_or_else(|| TransportError::InvalidResponse("missing emergency_id".into()))?;

        // An explicit flag wins; the id prefix is what older backends send.
        let confirmed = self
            .delivery_confirmed
            .unwrap_or_else(|| !id.starts_with(STUB_ID_PREFIX));
        let delivery_warning = if !confirmed {
            Some(DeliveryWarning::NotRecordedForRealtime)
        } else if self.caregivers_notified == Some(0) {
            Some(DeliveryWarning::NoRespondersNotified)
        } else {
            None
        };

        Ok(TriggerOutcome {
            emergency_id: EmergencyId::new(id),
            caregivers_notified: self.caregivers_notified,
            delivery_warning,
            message: self.message,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ActionResponse {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

impl ActionResponse {
    pub fn into_result(self, what: &str) -> TransportResult<Option<String>> {
        if is_soft_error(self.status.as_deref()) {
            return Err(TransportError::Rejected(
                self.message
                    .unwrap_or_else(|| format!("Could not {what} emergency.")),
            ));
        }
        Ok(self.message)
    }
}

fn is_soft_error(status: Option<&str>) -> bool {
    status.is_some_and(|s| s.eq_ignore_ascii_case("error"))
}

/// What the server currently believes about an alert.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StatusReport {
    /// `None` when the server has no information (`"unknown"` or unrecognised).
    pub status: Option<EmergencyStatus>,
    pub responding_party: Option<PartyInfo>,
    pub care_recipient: Option<PartyInfo>,
    pub location: Option<AlertLocation>,
    pub message: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StatusResponse {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub caregiver: Option<PartyInfo>,
    #[serde(default)]
    pub care_recipient: Option<PartyInfo>,
    #[serde(default)]
    pub location: Option<Value>,
}

impl From<StatusResponse> for StatusReport {
    fn from(r: StatusResponse) -> Self {
        Self {
            status: r.status.as_deref().and_then(EmergencyStatus::parse),
            responding_party: r.caregiver,
            care_recipient: r.care_recipient,
            location: r
                .location
                .as_ref()
                .and_then(Value::as_object)
                .and_then(location_from_map),
            message: r.message,
        }
    }
}

#[async_trait]
pub trait AlertTransport: Send + Sync {
    async fn trigger(&self, location: &AlertLocation) -> TransportResult<TriggerOutcome>;
    async fn status(&self, id: &EmergencyId) -> TransportResult<StatusReport>;
    async fn acknowledge(&self, id: &EmergencyId) -> TransportResult<()>;
    async fn resolve(&self, id: &EmergencyId) -> TransportResult<()>;
}

#[async_trait]
pub trait NotificationTransport: Send + Sync {
    async fn mark_read(&self, id: &NotificationId) -> TransportResult<()>;
}

// ============================================================================
// Booking contract
// ============================================================================

/// Answer a caregiver gives to a booking request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookingResponseKind {
    Accepted,
    Rejected,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BookingDto {
    pub id: String,
    pub status: String,
    #[serde(default)]
    pub care_recipient_id: Option<String>,
    #[serde(default)]
    pub caregiver_id: Option<String>,
    #[serde(default, alias = "scheduled_date")]
    pub scheduled_at: Option<String>,
    #[serde(default)]
    pub duration_hours: Option<f64>,
    #[serde(default)]
    pub video_call_request_id: Option<String>,
    #[serde(default)]
    pub chat_session_id: Option<String>,
    #[serde(default)]
    pub cancellation_reason: Option<String>,
    #[serde(default)]
    pub rejection_reason: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

impl TryFrom<BookingDto> for Booking {
    type Error = TransportError;

    fn try_from(dto: BookingDto) -> Result<Self, Self::Error> {
        let status = BookingStatus::parse(&dto.status).ok_or_else(|| {
            TransportError::InvalidResponse(format!("unknown booking status '{}'", dto.status))
        })?;
        Ok(Booking {
            id: BookingId::new(dto.id),
            status,
            caregiver_id: dto.caregiver_id.map(UserId::new),
            care_recipient_id: UserId::new(dto.care_recipient_id.unwrap_or_default()),
            scheduled_at: dto.scheduled_at.unwrap_or_default(),
            duration_hours: dto.duration_hours.unwrap_or(0.0),
            video_call_request_id: dto.video_call_request_id.map(VideoCallId::new),
            chat_session_id: dto.chat_session_id.map(ChatSessionId::new),
            cancellation_reason: dto.cancellation_reason.or(dto.rejection_reason),
            updated_at: dto.updated_at,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct HistoryDto {
    #[serde(default)]
    pub previous_status: Option<String>,
    pub new_status: String,
    #[serde(default)]
    pub changed_by: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
}

impl TryFrom<HistoryDto> for BookingHistoryEntry {
    type Error = TransportError;

    fn try_from(dto: HistoryDto) -> Result<Self, Self::Error> {
        let new_status = BookingStatus::parse(&dto.new_status).ok_or_else(|| {
            TransportError::InvalidResponse(format!("unknown status '{}'", dto.new_status))
        })?;
        Ok(BookingHistoryEntry {
            previous_status: dto.previous_status.as_deref().and_then(BookingStatus::parse),
            new_status,
            changed_by: dto.changed_by.map(UserId::new),
            reason: dto.reason,
            created_at: dto.created_at,
        })
    }
}

#[async_trait]
pub trait BookingTransport: Send + Sync {
    async fn get(&self, id: &BookingId) -> TransportResult<Booking>;
    async fn respond(
        &self,
        id: &BookingId,
        response: BookingResponseKind,
        reason: Option<&str>,
    ) -> TransportResult<Booking>;
    async fn update_status(
        &self,
        id: &BookingId,
        status: BookingStatus,
        reason: Option<&str>,
    ) -> TransportResult<Booking>;
    async fn complete(&self, id: &BookingId) -> TransportResult<Booking>;
    async fn cancel(&self, id: &BookingId, reason: Option<&str>) -> TransportResult<Booking>;
    async fn history(&self, id: &BookingId) -> TransportResult<Vec<BookingHistoryEntry>>;
}

// ============================================================================
// HTTP implementation
// ============================================================================

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportConfigError {
    #[error("invalid base URL: {0}")]
    BaseUrl(String),
    #[error("request_timeout_ms must be between 1 and 300000")]
    Timeout,
}

/// Where the API lives and how to authenticate. Not serializable: holds a token.
pub struct TransportConfig {
    pub base_url: String,
    pub access_token: Option<SecretString>,
    pub request_timeout_ms: u64,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            access_token: None,
            request_timeout_ms: u64::try_from(REQUEST_TIMEOUT.as_millis()).unwrap_or(30_000),
        }
    }
}

impl std::fmt::Debug for TransportConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportConfig")
            .field("base_url", &self.base_url)
            .field("access_token", &self.access_token.as_ref().map(|_| "[REDACTED]"))
            .field("request_timeout_ms", &self.request_timeout_ms)
            .finish()
    }
}

impl TransportConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Default::default()
        }
    }

    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(SecretString::new(token.into()));
        self
    }

    pub fn validate(&self) -> Result<ValidatedUrl, TransportConfigError> {
        if self.request_timeout_ms == 0 || self.request_timeout_ms > 300_000 {
            return Err(TransportConfigError::Timeout);
        }
        ValidatedUrl::new(self.base_url.as_str())
            .map_err(|e| TransportConfigError::BaseUrl(e.to_string()))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

#[derive(Serialize)]
struct LocationBody<'a> {
    latitude: f64,
    longitude: f64,
    address: &'a str,
}

#[derive(Serialize)]
struct TriggerBody<'a> {
    location: LocationBody<'a>,
}

#[derive(Serialize)]
struct StatusBody<'a> {
    status: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<&'a str>,
}

pub struct HttpTransport {
    executor: Arc<dyn HttpExecutor>,
    base: ValidatedUrl,
    token: Option<SecretString>,
    timeout: Duration,
}

impl HttpTransport {
    pub fn new(
        executor: Arc<dyn HttpExecutor>,
        config: TransportConfig,
    ) -> Result<Self, TransportConfigError> {
        let base = config.validate()?;
        let timeout = config.request_timeout();
        Ok(Self {
            executor,
            base,
            token: config.access_token,
            timeout,
        })
    }

    fn url(&self, segments: &[&str]) -> TransportResult<ValidatedUrl> {
        self.base.join_segments(segments).map_err(TransportError::from)
    }

    fn prepare(&self, request: HttpRequest) -> TransportResult<HttpRequest> {
        let mut request = request.with_timeout(self.timeout)?;
        if let Some(token) = &self.token {
            request = request.with_header(
                "Authorization",
                format!("Bearer {}", token.expose_secret()),
            )?;
        }
        Ok(request)
    }

    async fn send(&self, request: HttpRequest) -> TransportResult<HttpResponse> {
        let request = self.prepare(request)?;
        let method = request.method().as_str();
        let request_id = request.request_id().to_string();
        debug!(%method, url = %request.url().as_str(), %request_id, "sending request");

        let response = self.executor.execute(request).await.map_err(|e| {
            warn!(%method, %request_id, error = %e, "request failed");
            TransportError::from(e)
        })?;

        if response.is_success() {
            return Ok(response);
        }

        let status = response.status();
        let parsed = ApiErrorResponse::parse(response.body());
        let (code, message) = match parsed {
            Some(p) => (p.code, p.message),
            None => (None, format!("HTTP error: {status}")),
        };
        warn!(%method, %request_id, status, %message, "server returned error status");
        Err(TransportError::Status {
            status,
            code,
            message,
        })
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, segments: &[&str]) -> TransportResult<T> {
        let resp = self.send(HttpRequest::get(self.url(segments)?)).await?;
        Ok(resp.json()?)
    }

    async fn post_empty<T: serde::de::DeserializeOwned>(&self, segments: &[&str]) -> TransportResult<T> {
        let resp = self.send(HttpRequest::post(self.url(segments)?)).await?;
        Ok(resp.json()?)
    }

    fn booking_from(resp: &HttpResponse) -> TransportResult<Booking> {
        let dto: BookingDto = resp.json()?;
        Booking::try_from(dto)
    }
}

#[async_trait]
impl AlertTransport for HttpTransport {
    #[instrument(skip(self, location), fields(unknown_location = location.is_unknown()))]
    async fn trigger(&self, location: &AlertLocation) -> TransportResult<TriggerOutcome> {
        let body = TriggerBody {
            location: LocationBody {
                latitude: location.coordinate.lat(),
                longitude: location.coordinate.lng(),
                address: &location.label,
            },
        };
        let request = HttpRequest::post(self.url(&["api", "emergency", "trigger"])?).with_json(&body)?;
        let resp: TriggerResponse = self.send(request).await?.json()?;
        resp.into_outcome()
    }

    async fn status(&self, id: &EmergencyId) -> TransportResult<StatusReport> {
        let resp: StatusResponse = self
            .get_json(&["api", "emergency", "status", id.as_str()])
            .await?;
        Ok(resp.into())
    }

    #[instrument(skip(self), fields(emergency_id = %id))]
    async fn acknowledge(&self, id: &EmergencyId) -> TransportResult<()> {
        let resp: ActionResponse = self
            .post_empty(&["api", "emergency", id.as_str(), "acknowledge"])
            .await?;
        resp.into_result("acknowledge").map(|_| ())
    }

    #[instrument(skip(self), fields(emergency_id = %id))]
    async fn resolve(&self, id: &EmergencyId) -> TransportResult<()> {
        let resp: ActionResponse = self
            .post_empty(&["api", "emergency", id.as_str(), "resolve"])
            .await?;
        resp.into_result("resolve").map(|_| ())
    }
}

#[async_trait]
impl NotificationTransport for HttpTransport {
    async fn mark_read(&self, id: &NotificationId) -> TransportResult<()> {
        let request = HttpRequest::post(self.url(&["api", "notifications", id.as_str(), "read"])?);
        self.send(request).await.map(|_| ())
    }
}

#[async_trait]
impl BookingTransport for HttpTransport {
    async fn get(&self, id: &BookingId) -> TransportResult<Booking> {
        let dto: BookingDto = self.get_json(&["api", "bookings", id.as_str()]).await?;
        Booking::try_from(dto)
    }

    #[instrument(skip(self), fields(booking_id = %id))]
    async fn respond(
        &self,
        id: &BookingId,
        response: BookingResponseKind,
        reason: Option<&str>,
    ) -> TransportResult<Booking> {
        let status = match response {
            BookingResponseKind::Accepted => "accepted",
            BookingResponseKind::Rejected => "rejected",
        };
        let request = HttpRequest::post(self.url(&["api", "bookings", id.as_str(), "respond"])?)
            .with_json(&StatusBody { status, reason })?;
        let resp = self.send(request).await?;
        Self::booking_from(&resp)
    }

    #[instrument(skip(self), fields(booking_id = %id))]
    async fn update_status(
        &self,
        id: &BookingId,
        status: BookingStatus,
        reason: Option<&str>,
    ) -> TransportResult<Booking> {
        let request = HttpRequest::patch(self.url(&["api", "bookings", id.as_str(), "status"])?)
            .with_json(&StatusBody {
                status: status.as_str(),
                reason,
            })?;
        let resp = self.send(request).await?;
        Self::booking_from(&resp)
    }

    #[instrument(skip(self), fields(booking_id = %id))]
    async fn complete(&self, id: &BookingId) -> TransportResult<Booking> {
        let resp = self
            .send(HttpRequest::post(self.url(&["api", "bookings", id.as_str(), "complete"])?))
            .await?;
        Self::booking_from(&resp)
    }

    async fn cancel(&self, id: &BookingId, reason: Option<&str>) -> TransportResult<Booking> {
        self.update_status(id, BookingStatus::Cancelled, reason).await
    }

    async fn history(&self, id: &BookingId) -> TransportResult<Vec<BookingHistoryEntry>> {
        let rows: Vec<HistoryDto> = self
            .get_json(&["api", "bookings", id.as_str(), "history"])
            .await?;
        rows.into_iter().map(BookingHistoryEntry::try_from).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::{HttpMethod, HttpResult};
    use serde_json::json;
    use std::sync::Mutex;

    /// Records every request and answers from a queue.
    struct ScriptedExecutor {
        requests: Mutex<Vec<HttpRequest>>,
        responses: Mutex<Vec<HttpResult>>,
    }

    impl ScriptedExecutor {
        fn new(responses: Vec<HttpResult>) -> Arc<Self> {
            Arc::new(Self {
                requests: Mutex::new(Vec::new()),
                responses: Mutex::new(responses.into_iter().rev().collect()),
            })
        }

        fn last_request(&self) -> HttpRequest {
            self.requests.lock().unwrap().last().cloned().unwrap()
        }
    }

    #[async_trait]
    impl HttpExecutor for ScriptedExecutor {
        async fn execute(&self, request: HttpRequest) -> HttpResult {
            self.requests.lock().unwrap().push(request);
            self.responses.lock().unwrap().pop().expect("no scripted response")
        }
    }

    fn ok(body: Value) -> HttpResult {
        Ok(HttpResponse::json_body(200, &body, "r"))
    }

    fn transport(exec: Arc<ScriptedExecutor>) -> HttpTransport {
        HttpTransport::new(
            exec,
            TransportConfig::new("https://api.example.com").with_token("tok"),
        )
        .unwrap()
    }

    fn body_json(req: &HttpRequest) -> Value {
        serde_json::from_slice(req.body().unwrap()).unwrap()
    }

    #[tokio::test]
    async fn trigger_posts_location_with_auth() {
        let exec = ScriptedExecutor::new(vec![ok(json!({
            "status": "success",
            "emergency_id": "e1",
            "caregivers_notified": 2
        }))]);
        let t = transport(exec.clone());
        let loc = AlertLocation::new(crate::model::Coordinate::new(12.9, 77.6).unwrap(), "Home");

        let outcome = t.trigger(&loc).await.unwrap();
        assert_eq!(outcome.emergency_id, EmergencyId::new("e1"));
        assert_eq!(outcome.delivery_warning, None);

        let req = exec.last_request();
        assert_eq!(req.method(), HttpMethod::Post);
        assert_eq!(req.url().as_str(), "https://api.example.com/api/emergency/trigger");
        assert_eq!(req.headers().get("authorization"), Some("Bearer tok"));
        let body = body_json(&req);
        assert_eq!(body["location"]["latitude"], 12.9);
        assert_eq!(body["location"]["address"], "Home");
    }

    #[test]
    fn stub_id_is_degraded() {
        let outcome = TriggerResponse {
            status: Some("success".into()),
            emergency_id: Some("stub-abc".into()),
            message: None,
            caregivers_notified: Some(3),
            delivery_confirmed: None,
        }
        .into_outcome()
        .unwrap();
        assert_eq!(
            outcome.delivery_warning,
            Some(DeliveryWarning::NotRecordedForRealtime)
        );
    }

    #[test]
    fn explicit_delivery_flag_overrides_prefix() {
        let outcome = TriggerResponse {
            status: Some("success".into()),
            emergency_id: Some("stub-abc".into()),
            message: None,
            caregivers_notified: Some(1),
            delivery_confirmed: Some(true),
        }
        .into_outcome()
        .unwrap();
        assert_eq!(outcome.delivery_warning, None);
    }

    #[test]
    fn zero_caregivers_is_degraded() {
        let outcome = TriggerResponse {
            status: Some("success".into()),
            emergency_id: Some("e1".into()),
            message: None,
            caregivers_notified: Some(0),
            delivery_confirmed: None,
        }
        .into_outcome()
        .unwrap();
        assert_eq!(
            outcome.delivery_warning,
            Some(DeliveryWarning::NoRespondersNotified)
        );
    }

    #[test]
    fn soft_error_is_rejected() {
        let err = TriggerResponse {
            status: Some("error".into()),
            emergency_id: None,
            message: Some("Could not create emergency.".into()),
            caregivers_notified: None,
            delivery_confirmed: None,
        }
        .into_outcome()
        .unwrap_err();
        assert_eq!(err, TransportError::Rejected("Could not create emergency.".into()));
        assert_eq!(err.kind(), ErrorKind::ServerRejected);
    }

    #[tokio::test]
    async fn resolve_soft_error_inside_200_fails() {
        let exec = ScriptedExecutor::new(vec![ok(json!({
            "status": "error",
            "message": "Emergency not found."
        }))]);
        let err = transport(exec).resolve(&EmergencyId::new("e1")).await.unwrap_err();
        assert!(matches!(err, TransportError::Rejected(ref m) if m == "Emergency not found."));
    }

    #[tokio::test]
    async fn status_unknown_is_no_information() {
        let exec = ScriptedExecutor::new(vec![ok(json!({
            "id": "e1",
            "status": "unknown",
            "message": "Emergency not found.",
            "caregiver": null,
            "care_recipient": null,
            "location": null
        }))]);
        let report = transport(exec).status(&EmergencyId::new("e1")).await.unwrap();
        assert_eq!(report.status, None);
        assert!(report.responding_party.is_none());
    }

    #[tokio::test]
    async fn status_carries_parties_and_location() {
        let exec = ScriptedExecutor::new(vec![ok(json!({
            "id": "e1",
            "status": "acknowledged",
            "caregiver": {"id": "c1", "full_name": "Asha", "phone": "+91"},
            "care_recipient": {"id": "r1", "full_name": "Ravi", "address": "12 MG Road"},
            "location": {"latitude": 12.9, "longitude": 77.6, "location_name": "Home"}
        }))]);
        let report = transport(exec).status(&EmergencyId::new("e1")).await.unwrap();
        assert_eq!(report.status, Some(EmergencyStatus::Acknowledged));
        assert_eq!(
            report.responding_party.unwrap().full_name.as_deref(),
            Some("Asha")
        );
        assert_eq!(
            report.care_recipient.unwrap().address.as_deref(),
            Some("12 MG Road")
        );
        assert_eq!(report.location.unwrap().label, "Home");
    }

    #[tokio::test]
    async fn conflict_status_is_classified() {
        let exec = ScriptedExecutor::new(vec![Ok(HttpResponse::json_body(
            409,
            &json!({"error": {"code": "CONFLICT", "message": "Invalid status transition", "status": 409}}),
            "r",
        ))]);
        let err = transport(exec)
            .respond(&BookingId::new("b1"), BookingResponseKind::Accepted, None)
            .await
            .unwrap_err();
        assert!(err.is_conflict());
        assert_eq!(err.server_message(), Some("Invalid status transition"));
        assert_eq!(err.kind(), ErrorKind::Conflict);
    }

    #[tokio::test]
    async fn offline_failure_is_classified() {
        let exec = ScriptedExecutor::new(vec![Err(HttpError::Platform {
            message: "Network request failed".into(),
        })]);
        let err = transport(exec).acknowledge(&EmergencyId::new("e1")).await.unwrap_err();
        assert!(err.is_offline());
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn reject_sends_rejected_and_lands_cancelled() {
        let exec = ScriptedExecutor::new(vec![ok(json!({
            "id": "b1",
            "status": "cancelled",
            "care_recipient_id": "r1",
            "caregiver_id": "c1",
            "scheduled_date": "2026-01-01T10:00:00Z",
            "duration_hours": 2.0,
            "rejection_reason": "Unavailable"
        }))]);
        let t = transport(exec.clone());
        let booking = t
            .respond(&BookingId::new("b1"), BookingResponseKind::Rejected, Some("Unavailable"))
            .await
            .unwrap();
        assert_eq!(booking.status, BookingStatus::Cancelled);
        assert_eq!(booking.cancellation_reason.as_deref(), Some("Unavailable"));
        assert_eq!(booking.scheduled_at, "2026-01-01T10:00:00Z");

        let body = body_json(&exec.last_request());
        assert_eq!(body, json!({"status": "rejected", "reason": "Unavailable"}));
    }

    #[tokio::test]
    async fn cancel_patches_status() {
        let exec = ScriptedExecutor::new(vec![ok(json!({
            "id": "b1",
            "status": "cancelled",
            "care_recipient_id": "r1"
        }))]);
        let t = transport(exec.clone());
        t.cancel(&BookingId::new("b1"), None).await.unwrap();
        let req = exec.last_request();
        assert_eq!(req.method(), HttpMethod::Patch);
        assert_eq!(req.url().as_str(), "https://api.example.com/api/bookings/b1/status");
        assert_eq!(body_json(&req), json!({"status": "cancelled"}));
    }

    #[tokio::test]
    async fn history_decodes_rows() {
        let exec = ScriptedExecutor::new(vec![ok(json!([
            {"id": "h1", "booking_id": "b1", "previous_status": null, "new_status": "requested",
             "changed_by": "r1", "reason": null, "created_at": "2026-01-01T09:00:00Z"},
            {"id": "h2", "booking_id": "b1", "previous_status": "requested", "new_status": "accepted",
             "changed_by": "c1", "reason": null, "created_at": "2026-01-01T09:05:00Z"}
        ]))]);
        let rows = transport(exec).history(&BookingId::new("b1")).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].previous_status, Some(BookingStatus::Requested));
        assert_eq!(rows[1].new_status, BookingStatus::Accepted);
    }

    #[test]
    fn config_rejects_bad_base_url() {
        assert!(matches!(
            TransportConfig::new("not a url").validate(),
            Err(TransportConfigError::BaseUrl(_))
        ));
        let cfg = TransportConfig {
            request_timeout_ms: 0,
            ..TransportConfig::new("https://api.example.com")
        };
        assert_eq!(cfg.validate(), Err(TransportConfigError::Timeout));
    }

    #[test]
    fn config_debug_redacts_token() {
        let cfg = TransportConfig::new("https://api.example.com").with_token("super-secret");
        let printed = format!("{cfg:?}");
        assert!(!printed.contains("super-secret"));
        assert!(printed.contains("REDACTED"));
    }
}
