use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::get_current_time_ms;

// --- Typed IDs ---

macro_rules! typed_id {
    ($name:ident) => {
        #[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Hash)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(s: impl Into<String>) -> Self {
                Self(s.into())
            }
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

typed_id!(EmergencyId);
typed_id!(BookingId);
typed_id!(UserId);
typed_id!(NotificationId);
typed_id!(VideoCallId);
typed_id!(ChatSessionId);
typed_id!(PaymentId);

/// Explicit timestamp unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct UnixTimeMs(pub u64);

impl UnixTimeMs {
    #[must_use]
    pub fn now() -> Self {
        Self(get_current_time_ms())
    }

    #[must_use]
    pub const fn as_millis(self) -> u64 {
        self.0
    }

    #[must_use]
    pub fn elapsed_since(self, earlier: Self) -> u64 {
        self.0.saturating_sub(earlier.0)
    }
}

/// Which side of the care relationship is looking at the data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    CareRecipient,
    Caregiver,
}

impl Role {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::CareRecipient => "care_recipient",
            Self::Caregiver => "caregiver",
        }
    }

    /// Caregivers respond to alerts; recipients raise them.
    #[must_use]
    pub const fn is_responder(self) -> bool {
        matches!(self, Self::Caregiver)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// --- Coordinate: validated, NaN-safe ---

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CoordinateError {
    #[error("Latitude {0} is out of valid range [-90, 90]")]
    LatitudeOutOfRange(f64),
    #[error("Longitude {0} is out of valid range [-180, 180]")]
    LongitudeOutOfRange(f64),
    #[error("Coordinates must be finite numbers")]
    NonFinite,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    lat: f64,
    lng: f64,
}

impl Coordinate {
    pub fn new(lat: f64, lng: f64) -> Result<Self, CoordinateError> {
        if !lat.is_finite() || !lng.is_finite() {
            return Err(CoordinateError::NonFinite);
        }
        if !(-90.0..=90.0).contains(&lat) {
            return Err(CoordinateError::LatitudeOutOfRange(lat));
        }
        if !(-180.0..=180.0).contains(&lng) {
            return Err(CoordinateError::LongitudeOutOfRange(lng));
        }
        Ok(Self { lat, lng })
    }

    /// Null island. Only used as the "location unknown" placeholder.
    #[must_use]
    pub const fn origin() -> Self {
        Self { lat: 0.0, lng: 0.0 }
    }

    #[must_use]
    pub const fn lat(&self) -> f64 {
        self.lat
    }

    #[must_use]
    pub const fn lng(&self) -> f64 {
        self.lng
    }
}

pub const UNKNOWN_LOCATION_LABEL: &str = "Unknown";

/// Where an alert was raised, as shown to responders.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertLocation {
    pub coordinate: Coordinate,
    pub label: String,
}

impl AlertLocation {
    #[must_use]
    pub fn new(coordinate: Coordinate, label: impl Into<String>) -> Self {
        Self {
            coordinate,
            label: label.into(),
        }
    }

    /// `{0, 0, "Unknown"}`: what an alert carries when the fix failed or was denied.
    #[must_use]
    pub fn unknown() -> Self {
        Self::new(Coordinate::origin(), UNKNOWN_LOCATION_LABEL)
    }

    #[must_use]
    pub fn is_unknown(&self) -> bool {
        self.label == UNKNOWN_LOCATION_LABEL && self.coordinate == Coordinate::origin()
    }
}

// --- Emergency ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmergencyStatus {
    Active,
    Acknowledged,
    Resolved,
}

impl EmergencyStatus {
    /// Parses a server status. `"unknown"` and anything unrecognised map to `None`.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "active" | "pending" | "triggered" => Some(Self::Active),
            "acknowledged" | "responding" => Some(Self::Acknowledged),
            "resolved" | "closed" => Some(Self::Resolved),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Acknowledged => "acknowledged",
            Self::Resolved => "resolved",
        }
    }

    const fn rank(self) -> u8 {
        match self {
            Self::Active => 0,
            Self::Acknowledged => 1,
            Self::Resolved => 2,
        }
    }

    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Resolved)
    }

    /// Status only moves forward: a report that is older than what we hold is stale.
    #[must_use]
    pub const fn can_advance_to(self, next: Self) -> bool {
        !self.is_terminal() && next.rank() > self.rank()
    }
}

impl fmt::Display for EmergencyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity and contact details of the other party on an alert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct PartyInfo {
    #[serde(default)]
    pub id: Option<UserId>,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub profile_photo_url: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
}

/// The caregiver who took an alert.
pub type RespondingParty = PartyInfo;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmergencyAlert {
    pub id: EmergencyId,
    pub status: EmergencyStatus,
    pub location: Option<AlertLocation>,
    /// Caregiver who acknowledged; set only once an acknowledgement was observed.
    pub responding_party: Option<RespondingParty>,
    pub care_recipient: Option<PartyInfo>,
    pub raised_at: UnixTimeMs,
    /// Notification the alert was opened from, marked read on acknowledge/resolve.
    pub origin_notification: Option<NotificationId>,
}

impl EmergencyAlert {
    #[must_use]
    pub fn new(id: EmergencyId, location: Option<AlertLocation>, raised_at: UnixTimeMs) -> Self {
        Self {
            id,
            status: EmergencyStatus::Active,
            location,
            responding_party: None,
            care_recipient: None,
            raised_at,
            origin_notification: None,
        }
    }

    #[must_use]
    pub const fn is_open(&self) -> bool {
        !self.status.is_terminal()
    }
}

/// An alert a caregiver was notified about but has not opened yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingEmergency {
    pub id: EmergencyId,
    pub care_recipient_name: Option<String>,
    pub location: Option<AlertLocation>,
    pub notification_id: Option<NotificationId>,
    pub received_at: UnixTimeMs,
}

// --- Booking ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    Draft,
    Requested,
    Accepted,
    Confirmed,
    InProgress,
    Completed,
    Cancelled,
}

impl BookingStatus {
    pub const ALL: [Self; 7] = [
        Self::Draft,
        Self::Requested,
        Self::Accepted,
        Self::Confirmed,
        Self::InProgress,
        Self::Completed,
        Self::Cancelled,
    ];

    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "draft" => Some(Self::Draft),
            "requested" | "pending" => Some(Self::Requested),
            "accepted" => Some(Self::Accepted),
            "confirmed" => Some(Self::Confirmed),
            "in_progress" | "inprogress" | "started" => Some(Self::InProgress),
            "completed" | "done" => Some(Self::Completed),
            "cancelled" | "canceled" | "rejected" | "declined" => Some(Self::Cancelled),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Requested => "requested",
            Self::Accepted => "accepted",
            Self::Confirmed => "confirmed",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }

    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }

    /// Statuses at which a caregiver has been bound to the booking.
    #[must_use]
    pub const fn has_caregiver(self) -> bool {
        matches!(
            self,
            Self::Accepted | Self::Confirmed | Self::InProgress | Self::Completed
        )
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Booking {
    pub id: BookingId,
    pub status: BookingStatus,
    pub caregiver_id: Option<UserId>,
    pub care_recipient_id: UserId,
    pub scheduled_at: String,
    pub duration_hours: f64,
    pub video_call_request_id: Option<VideoCallId>,
    pub chat_session_id: Option<ChatSessionId>,
    pub cancellation_reason: Option<String>,
    pub updated_at: Option<String>,
}

impl Booking {
    /// Caregiver id is meaningful only from `accepted` onwards.
    #[must_use]
    pub fn assigned_caregiver(&self) -> Option<&UserId> {
        if self.status.has_caregiver() {
            self.caregiver_id.as_ref()
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingHistoryEntry {
    pub previous_status: Option<BookingStatus>,
    pub new_status: BookingStatus,
    pub changed_by: Option<UserId>,
    pub reason: Option<String>,
    pub created_at: Option<String>,
}
