//! Maps an inbound notification to the screen it should open.

use serde::{Deserialize, Serialize};

use crate::event::{NotificationAction, NotificationEvent};
use crate::model::{
    AlertLocation, BookingId, ChatSessionId, EmergencyId, PaymentId, UserId, VideoCallId,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "screen", rename_all = "snake_case")]
pub enum NavigationIntent {
    Chat {
        chat_session_id: ChatSessionId,
    },
    VideoCall {
        video_call_id: VideoCallId,
    },
    BookingDetail {
        booking_id: BookingId,
    },
    /// At least one of the two ids is always set.
    Emergency {
        emergency_id: Option<EmergencyId>,
        care_recipient_id: Option<UserId>,
        location: Option<AlertLocation>,
    },
    Payment {
        payment_id: PaymentId,
    },
    NotificationsList,
}

impl NavigationIntent {
    #[must_use]
    pub const fn is_detail(&self) -> bool {
        !matches!(self, Self::NotificationsList)
    }
}

/// Total and side-effect free. A rule whose id is missing falls through to
/// the notifications list rather than opening an empty detail screen.
#[must_use]
pub fn route(event: &NotificationEvent) -> NavigationIntent {
    let intent = match &event.action {
        NotificationAction::OpenChat => event
            .chat_session_id()
            .map(|chat_session_id| NavigationIntent::Chat { chat_session_id }),
        NotificationAction::ViewVideoCall | NotificationAction::JoinCall => event
            .video_call_id()
            .map(|video_call_id| NavigationIntent::VideoCall { video_call_id }),
        NotificationAction::ViewBooking => event
            .booking_id()
            .map(|booking_id| NavigationIntent::BookingDetail { booking_id }),
        NotificationAction::ViewEmergency => {
            let emergency_id = event.emergency_id();
            let care_recipient_id = event.care_recipient_id();
            (emergency_id.is_some() || care_recipient_id.is_some()).then(|| {
                NavigationIntent::Emergency {
                    emergency_id,
                    care_recipient_id,
                    location: event.location(),
                }
            })
        }
        NotificationAction::ViewPayment => event
            .payment_id()
            .map(|payment_id| NavigationIntent::Payment { payment_id }),
        NotificationAction::Unrecognized(_) | NotificationAction::None => None,
    };
    intent.unwrap_or(NavigationIntent::NotificationsList)
}
