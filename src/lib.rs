// lib.rs - Shared care-coordination core

#![forbid(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::too_many_lines)]

pub mod app;
pub mod booking;
pub mod capabilities;
pub mod emergency;
pub mod event;
pub mod model;
pub mod retry;
pub mod router;
pub mod transport;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

pub use app::{AppConfig, CareApp, PushOutcome};
pub use booking::{BookingError, BookingFlowConfig, BookingFlowManager};
pub use capabilities::Capabilities;
pub use emergency::{CoordinatorConfig, EmergencyCoordinator, EmergencyError, TriggerReport};
pub use event::{NotificationAction, NotificationEvent, NotificationType};
pub use model::*;
pub use router::{route, NavigationIntent};

pub const EMERGENCY_POLL_INTERVAL: Duration = Duration::from_secs(5);
pub const BOOKING_POLL_INTERVAL: Duration = Duration::from_secs(10);
pub const LOCATION_TIMEOUT: Duration = Duration::from_secs(10);
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
pub const MAX_POLL_INTERVAL: Duration = Duration::from_secs(300);
pub const PUSH_DEDUP_CAPACITY: usize = 128;
pub const DEFAULT_HISTORY_ATTEMPTS: u32 = 3;
pub const DEFAULT_HISTORY_BACKOFF: Duration = Duration::from_millis(500);

/// Shown on every offline failure along the emergency path.
pub const EMERGENCY_FALLBACK_TEXT: &str =
    "call your emergency contact or local emergency services directly";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorSeverity {
    Transient,
    Permanent,
    Fatal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    Offline,
    Timeout,
    Conflict,
    Precondition,
    ServerRejected,
    NotFound,
    Authorization,
    Validation,
    Internal,
}

impl ErrorKind {
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::Offline => "OFFLINE",
            Self::Timeout => "TIMEOUT",
            Self::Conflict => "CONFLICT",
            Self::Precondition => "PRECONDITION_FAILED",
            Self::ServerRejected => "SERVER_REJECTED",
            Self::NotFound => "NOT_FOUND",
            Self::Authorization => "FORBIDDEN",
            Self::Validation => "VALIDATION_ERROR",
            Self::Internal => "INTERNAL_ERROR",
        }
    }

    #[must_use]
    pub const fn default_severity(self) -> ErrorSeverity {
        match self {
            Self::Offline | Self::Timeout | Self::ServerRejected => ErrorSeverity::Transient,
            Self::Conflict
            | Self::NotFound
            | Self::Authorization
            | Self::Validation
            | Self::Precondition => ErrorSeverity::Permanent,
            Self::Internal => ErrorSeverity::Fatal,
        }
    }

    /// Whether a caller-level retry could succeed. Conflicts and precondition
    /// failures never do.
    #[must_use]
    pub const fn is_retryable(self) -> bool {
        matches!(self, Self::Offline | Self::Timeout | Self::ServerRejected)
    }

    #[must_use]
    pub const fn http_status_hint(self) -> Option<u16> {
        match self {
            Self::Authorization => Some(403),
            Self::NotFound => Some(404),
            Self::Conflict => Some(409),
            Self::Validation => Some(400),
            Self::Timeout => Some(408),
            Self::ServerRejected | Self::Internal => Some(500),
            Self::Offline | Self::Precondition => None,
        }
    }
}

/// Out-of-band action the UI must offer when the app itself cannot help.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FallbackAction {
    CallEmergencyContact { phone: Option<String> },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AppError {
    pub kind: ErrorKind,
    pub severity: ErrorSeverity,
    pub message: String,
    pub fallback: Option<FallbackAction>,
    pub context: HashMap<String, String>,
}

impl AppError {
    #[must_use]
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            severity: kind.default_severity(),
            message: message.into(),
            fallback: None,
            context: HashMap::new(),
        }
    }

    #[must_use]
    pub fn with_fallback(mut self, fallback: FallbackAction) -> Self {
        self.fallback = Some(fallback);
        self
    }

    #[must_use]
    pub fn with_severity(mut self, severity: ErrorSeverity) -> Self {
        self.severity = severity;
        self
    }

    #[must_use]
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub const fn code(&self) -> &'static str {
        self.kind.code()
    }

    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        self.kind.is_retryable() && !matches!(self.severity, ErrorSeverity::Fatal)
    }

    #[must_use]
    pub fn user_facing_message(&self) -> String {
        let base = match self.kind {
            ErrorKind::Offline => {
                "Unable to reach the server. Please check your internet connection.".to_string()
            }
            ErrorKind::Timeout => "The request timed out.".to_string(),
            ErrorKind::Conflict => self.message.clone(),
            ErrorKind::Precondition => self.message.clone(),
            ErrorKind::ServerRejected => {
                if self.message.is_empty() {
                    "The server could not complete the request.".to_string()
                } else {
                    self.message.clone()
                }
            }
            ErrorKind::NotFound => "The requested item could not be found.".to_string(),
            ErrorKind::Authorization => {
                "You don't have permission to perform this action.".to_string()
            }
            ErrorKind::Validation => self.message.clone(),
            ErrorKind::Internal => {
                "An unexpected error occurred. Please try again or contact support.".to_string()
            }
        };

        match &self.fallback {
            Some(FallbackAction::CallEmergencyContact { phone: Some(phone) }) => {
                format!("{base} Please {EMERGENCY_FALLBACK_TEXT} ({phone}).")
            }
            Some(FallbackAction::CallEmergencyContact { phone: None }) => {
                format!("{base} Please {EMERGENCY_FALLBACK_TEXT}.")
            }
            None => base,
        }
    }

    #[must_use]
    pub fn from_http_status(status: u16, body: Option<&[u8]>) -> Self {
        let kind = match status {
            400 | 422 => ErrorKind::Validation,
            401 | 403 => ErrorKind::Authorization,
            404 => ErrorKind::NotFound,
            408 => ErrorKind::Timeout,
            409 => ErrorKind::Conflict,
            500..=599 => ErrorKind::ServerRejected,
            _ => ErrorKind::Internal,
        };

        let message = body
            .and_then(ApiErrorResponse::parse)
            .map_or_else(|| format!("HTTP error: {status}"), |e| e.message);

        Self::new(kind, message).with_context("http_status", status.to_string())
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code(), self.message)
    }
}

impl std::error::Error for AppError {}

/// Server error envelope. Two shapes are in use:
/// `{"error": {"code", "message", "status"}}` and `{"detail": "..."}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiErrorResponse {
    pub code: Option<String>,
    pub message: String,
}

impl ApiErrorResponse {
    #[must_use]
    pub fn parse(body: &[u8]) -> Option<Self> {
        #[derive(Deserialize)]
        struct Inner {
            #[serde(default)]
            code: Option<String>,
            #[serde(default)]
            message: Option<String>,
        }

        #[derive(Deserialize)]
        struct Envelope {
            #[serde(default)]
            error: Option<Inner>,
            #[serde(default)]
            detail: Option<serde_json::Value>,
            #[serde(default)]
            message: Option<String>,
        }

        let env: Envelope = serde_json::from_slice(body).ok()?;
        if let Some(Inner { code, message: Some(message) }) = env.error {
            return Some(Self { code, message });
        }
        match env.detail {
            Some(serde_json::Value::String(message)) => {
                return Some(Self { code: None, message })
            }
            Some(other) if !other.is_null() => {
                return Some(Self {
                    code: None,
                    message: other.to_string(),
                })
            }
            _ => {}
        }
        env.message.map(|message| Self { code: None, message })
    }
}

pub type AppResult<T> = Result<T, AppError>;

impl From<model::CoordinateError> for AppError {
    fn from(e: model::CoordinateError) -> Self {
        AppError::new(ErrorKind::Validation, e.to_string())
    }
}

#[must_use]
pub fn get_current_time_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(duration_ms)
        .unwrap_or(0)
}

/// Whole milliseconds, saturating at `u64::MAX`.
pub(crate) fn duration_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}
