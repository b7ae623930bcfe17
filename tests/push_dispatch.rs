mod common;

use assist_core::capabilities::{
    Capabilities, GeolocationProvider, HttpExecutor, HttpMethod, HttpRequest, HttpResponse, HttpResult,
    NotificationPriority,
};
use assist_core::transport::TransportConfig;
use assist_core::{
    AppConfig, BookingId, CareApp, EmergencyId, EmergencyStatus, ErrorKind, NavigationIntent,
    NotificationId, Role, UserId,
};
use async_trait::async_trait;
use common::{DeniedLocation, FixedLocation};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};

/// Answers by path, the way the real API would.
#[derive(Default)]
struct FakeApi {
    seen: Mutex<Vec<(HttpMethod, String, Option<String>)>>,
}

#[async_trait]
impl HttpExecutor for FakeApi {
    async fn execute(&self, request: HttpRequest) -> HttpResult {
        let path = request
            .url()
            .as_str()
            .trim_start_matches("https://api.example.org")
            .to_string();
        let auth = request.headers().get("Authorization").map(str::to_string);
        self.seen
            .lock()
            .unwrap()
            .push((request.method(), path.clone(), auth));

        let body = match (request.method(), path.as_str()) {
            (HttpMethod::Post, "/api/emergency/trigger") => json!({
                "status": "active",
                "emergency_id": "e1",
                "caregivers_notified": 2
            }),
            (HttpMethod::Get, "/api/emergency/status/e1") => json!({
                "id": "e1",
                "status": "active",
                "care_recipient": {"full_name": "Ravi", "phone": "+91 90000 00001"},
                "location": {"latitude": 12.9, "longitude": 77.6, "address": "MG Road"}
            }),
            (HttpMethod::Post, "/api/emergency/e1/acknowledge") => {
                json!({"status": "success", "message": "Emergency acknowledged"})
            }
            (HttpMethod::Post, "/api/notifications/n1/read") => json!({}),
            _ => {
                return Ok(HttpResponse::json_body(
                    404,
                    &json!({"detail": "Not found"}),
                    request.request_id(),
                ))
            }
        };
        Ok(HttpResponse::json_body(200, &body, request.request_id()))
    }
}

fn init(role: Role, api: Arc<FakeApi>) -> CareApp {
    let config = AppConfig {
        transport: TransportConfig::new("https://api.example.org").with_token("secret-token"),
        ..Default::default()
    };
    let location: Arc<dyn GeolocationProvider> = match role {
        Role::CareRecipient => FixedLocation::at(12.9, 77.6),
        Role::Caregiver => Arc::new(DeniedLocation),
    };
    CareApp::init(
        config,
        Capabilities::new(api, location),
        role,
        UserId::new("u1"),
    )
    .unwrap()
}

#[test]
fn init_rejects_invalid_config() {
    let config = AppConfig {
        transport: TransportConfig::new("ftp://api.example.org"),
        ..Default::default()
    };
    let err = CareApp::init(
        config,
        Capabilities::new(Arc::new(FakeApi::default()), Arc::new(DeniedLocation)),
        Role::CareRecipient,
        UserId::new("u1"),
    )
    .err()
    .unwrap();
    assert_eq!(err.kind, ErrorKind::Validation);
}

#[tokio::test]
async fn routes_without_any_local_state() {
    let app = init(Role::CareRecipient, Arc::new(FakeApi::default()));

    let cases: Vec<(&str, Option<&str>, Value, NavigationIntent)> = vec![
        (
            "booking",
            Some("view_booking"),
            json!({"booking_id": "b1"}),
            NavigationIntent::BookingDetail {
                booking_id: BookingId::new("b1"),
            },
        ),
        (
            "booking",
            Some("view_booking"),
            json!({}),
            NavigationIntent::NotificationsList,
        ),
        ("message", None, json!({}), NavigationIntent::NotificationsList),
    ];

    for (kind, action, data, expected) in cases {
        let outcome = app.on_push(kind, action, data, None).await;
        assert_eq!(outcome.intent, expected);
    }
    app.teardown();
}

#[tokio::test]
async fn caregiver_emergency_push_end_to_end() {
    let api = Arc::new(FakeApi::default());
    let caregiver = init(Role::Caregiver, api.clone());

    let outcome = caregiver
        .on_push(
            "emergency",
            Some("view_emergency"),
            json!({
                "emergency_id": "e1",
                "care_recipient_id": "cr1",
                "care_recipient_name": "Ravi",
                "location": {"lat": "12.9", "lng": "77.6"}
            }),
            Some(NotificationId::new("n1")),
        )
        .await;

    assert!(!outcome.duplicate);
    assert_eq!(outcome.presentation.priority, NotificationPriority::Max);
    assert!(outcome.presentation.play_sound);
    let NavigationIntent::Emergency {
        emergency_id,
        location,
        ..
    } = outcome.intent
    else {
        panic!("expected emergency intent");
    };
    assert_eq!(emergency_id, Some(EmergencyId::new("e1")));
    assert_eq!(location.unwrap().coordinate.lat(), 12.9);

    let pending = caregiver.emergency().pending().await;
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].care_recipient_name.as_deref(), Some("Ravi"));

    let alert = caregiver
        .open_emergency(EmergencyId::new("e1"), None)
        .await
        .unwrap();
    assert_eq!(alert.location.unwrap().label, "MG Road");
    assert_eq!(
        alert.care_recipient.unwrap().phone.as_deref(),
        Some("+91 90000 00001")
    );

    let acked = caregiver.acknowledge_emergency().await.unwrap();
    assert_eq!(acked.status, EmergencyStatus::Acknowledged);
    assert!(caregiver.emergency().pending().await.is_empty());

    let seen = api.seen.lock().unwrap().clone();
    assert!(seen
        .iter()
        .any(|(m, p, _)| *m == HttpMethod::Post && p == "/api/notifications/n1/read"));
    assert!(seen
        .iter()
        .all(|(_, _, auth)| auth.as_deref() == Some("Bearer secret-token")));

    caregiver.teardown();
}

#[tokio::test]
async fn duplicate_emergency_push_still_navigates() {
    let api = Arc::new(FakeApi::default());
    let recipient = init(Role::CareRecipient, api.clone());
    recipient.trigger_emergency(None).await.unwrap();

    let data = json!({"emergency_id": "e1", "status": "acknowledged"});
    let first = recipient
        .on_push("emergency", Some("view_emergency"), data.clone(), Some(NotificationId::new("n9")))
        .await;
    let status_calls = |api: &FakeApi| {
        api.seen
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, p, _)| p == "/api/emergency/status/e1")
            .count()
    };
    assert!(!first.duplicate);
    assert_eq!(status_calls(&api), 1);

    let second = recipient
        .on_push("emergency", Some("view_emergency"), data, Some(NotificationId::new("n9")))
        .await;
    assert!(second.duplicate);
    assert_eq!(second.intent, first.intent);
    assert_eq!(status_calls(&api), 1);

    // The push claimed "acknowledged"; the fetch said "active", and that is what counts.
    assert_eq!(
        recipient.emergency().current_alert().await.unwrap().status,
        EmergencyStatus::Active
    );
    recipient.teardown();
}
