use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::model::{
    AlertLocation, BookingId, ChatSessionId, Coordinate, EmergencyId, NotificationId, PaymentId,
    UserId, VideoCallId, UNKNOWN_LOCATION_LABEL,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
    Message,
    VideoCall,
    Booking,
    Emergency,
    ChatSession,
    Other,
}

impl NotificationType {
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "message" => Self::Message,
            "video_call" => Self::VideoCall,
            "booking" => Self::Booking,
            "emergency" => Self::Emergency,
            "chat_session" => Self::ChatSession,
            _ => Self::Other,
        }
    }
}

/// Navigation hint attached to a notification by the server.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationAction {
    OpenChat,
    ViewVideoCall,
    JoinCall,
    ViewBooking,
    ViewEmergency,
    ViewPayment,
    Unrecognized(String),
    None,
}

impl NotificationAction {
    #[must_use]
    pub fn parse(s: Option<&str>) -> Self {
        let Some(raw) = s else { return Self::None };
        match raw.trim() {
            "" => Self::None,
            "open_chat" => Self::OpenChat,
            "view_video_call" => Self::ViewVideoCall,
            "join_call" => Self::JoinCall,
            "view_booking" => Self::ViewBooking,
            "view_emergency" => Self::ViewEmergency,
            "view_payment" => Self::ViewPayment,
            other => Self::Unrecognized(other.to_string()),
        }
    }
}

/// Inbound notification. Ephemeral: never persisted by the core.
///
/// The payload is kept free-form; typed accessors pull out the ids each
/// notification kind is known to carry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationEvent {
    pub id: Option<NotificationId>,
    pub kind: NotificationType,
    pub action: NotificationAction,
    pub data: Map<String, Value>,
    pub is_read: bool,
}

impl NotificationEvent {
    /// Builds an event from the `(type, action, data)` triple the platform layer hands over.
    ///
    /// `action` may be absent from the triple and present in `data` instead; the
    /// server puts it there.
    #[must_use]
    pub fn from_parts(
        kind: &str,
        action: Option<&str>,
        data: Value,
        id: Option<NotificationId>,
    ) -> Self {
        let data = match data {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        let action = action
            .map(str::to_string)
            .or_else(|| data.get("action").and_then(Value::as_str).map(str::to_string));
        let is_read = data.get("is_read").and_then(Value::as_bool).unwrap_or(false);

        Self {
            id,
            kind: NotificationType::parse(kind),
            action: NotificationAction::parse(action.as_deref()),
            data,
            is_read,
        }
    }

    fn str_field(&self, key: &str) -> Option<&str> {
        self.data
            .get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    #[must_use]
    pub fn emergency_id(&self) -> Option<EmergencyId> {
        self.str_field("emergency_id").map(EmergencyId::new)
    }

    #[must_use]
    pub fn care_recipient_id(&self) -> Option<UserId> {
        self.str_field("care_recipient_id").map(UserId::new)
    }

    #[must_use]
    pub fn care_recipient_name(&self) -> Option<String> {
        self.str_field("care_recipient_name").map(str::to_string)
    }

    #[must_use]
    pub fn booking_id(&self) -> Option<BookingId> {
        self.str_field("booking_id").map(BookingId::new)
    }

    #[must_use]
    pub fn video_call_id(&self) -> Option<VideoCallId> {
        self.str_field("video_call_id").map(VideoCallId::new)
    }

    #[must_use]
    pub fn chat_session_id(&self) -> Option<ChatSessionId> {
        self.str_field("chat_session_id").map(ChatSessionId::new)
    }

    #[must_use]
    pub fn payment_id(&self) -> Option<PaymentId> {
        self.str_field("payment_id").map(PaymentId::new)
    }

    /// `data.location` as sent with emergency pushes. Absent or malformed coordinates yield `None`.
    #[must_use]
    pub fn location(&self) -> Option<AlertLocation> {
        let loc = self.data.get("location")?.as_object()?;
        location_from_map(loc)
    }

    #[must_use]
    pub fn is_high_priority(&self) -> bool {
        self.kind == NotificationType::Emergency
            || self.str_field("priority") == Some("high")
    }

    /// Key used to recognise a re-delivery of the same notification.
    #[must_use]
    pub fn dedup_key(&self) -> Option<String> {
        if let Some(id) = &self.id {
            return Some(format!("n:{id}"));
        }
        let target = self
            .str_field("emergency_id")
            .or_else(|| self.str_field("booking_id"))
            .or_else(|| self.str_field("video_call_id"))?;
        let status = self
            .str_field("booking_status")
            .or_else(|| self.str_field("status"))
            .unwrap_or("");
        Some(format!("{:?}:{target}:{status}", self.kind))
    }
}

pub(crate) fn location_from_map(loc: &Map<String, Value>) -> Option<AlertLocation> {
    let lat = number(loc.get("latitude").or_else(|| loc.get("lat")))?;
    let lng = number(
        loc.get("longitude")
            .or_else(|| loc.get("lng"))
            .or_else(|| loc.get("lon")),
    )?;
    let coordinate = Coordinate::new(lat, lng).ok()?;
    let label = loc
        .get("address")
        .or_else(|| loc.get("label"))
        .or_else(|| loc.get("location_name"))
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(UNKNOWN_LOCATION_LABEL);
    Some(AlertLocation::new(coordinate, label))
}

// Location payloads arrive with numbers or numeric strings depending on the sender.
fn number(v: Option<&Value>) -> Option<f64> {
    match v? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
