//! Composition root handed to the native shell.
//!
//! One `CareApp` per signed-in party. It owns that party's emergency
//! coordinator and booking manager, shares a single transport between them,
//! and exposes the push-delivery callback.

use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, instrument};

use crate::booking::{BookingConfigError, BookingFlowConfig, BookingFlowManager};
use crate::capabilities::{
    Capabilities, Delivery, GeolocationProvider, NotificationHandlerConfig, NotificationPresentation,
    PushChannel, PushConfigError,
};
use crate::emergency::{
    CoordinatorConfig, CoordinatorConfigError, EmergencyCoordinator, EmergencyError, PushHandling,
    TriggerReport,
};
use crate::event::{NotificationEvent, NotificationType};
use crate::model::{AlertLocation, EmergencyAlert, EmergencyId, NotificationId, Role, UserId};
use crate::router::{route, NavigationIntent};
use crate::transport::{
    AlertTransport, BookingTransport, HttpTransport, NotificationTransport, TransportConfig,
    TransportConfigError,
};
use crate::{AppError, ErrorKind};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AppConfigError {
    #[error("transport: {0}")]
    Transport(#[from] TransportConfigError),
    #[error("coordinator: {0}")]
    Coordinator(#[from] CoordinatorConfigError),
    #[error("booking: {0}")]
    Booking(#[from] BookingConfigError),
    #[error("notifications: {0}")]
    Notifications(#[from] PushConfigError),
}

impl From<AppConfigError> for AppError {
    fn from(e: AppConfigError) -> Self {
        AppError::new(ErrorKind::Validation, e.to_string())
    }
}

/// Everything the core needs at init. Built by the shell and passed in
/// explicitly; nothing is configured through globals.
#[derive(Debug, Default)]
pub struct AppConfig {
    pub transport: TransportConfig,
    pub coordinator: CoordinatorConfig,
    pub booking: BookingFlowConfig,
    pub notifications: NotificationHandlerConfig,
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), AppConfigError> {
        self.transport.validate()?;
        self.validate_components()
    }

    fn validate_components(&self) -> Result<(), AppConfigError> {
        self.coordinator.validate()?;
        self.booking.validate()?;
        self.notifications.validate()?;
        Ok(())
    }
}

/// What the shell should do with one inbound push.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PushOutcome {
    pub intent: NavigationIntent,
    pub presentation: NotificationPresentation,
    /// Re-delivery of a push already seen; navigation still applies.
    pub duplicate: bool,
}

pub struct CareApp<T = HttpTransport> {
    role: Role,
    user: UserId,
    emergency: Arc<EmergencyCoordinator<T>>,
    bookings: Arc<BookingFlowManager<T>>,
    notifications: NotificationHandlerConfig,
    push: PushChannel,
}

impl CareApp<HttpTransport> {
    /// Validates `config` and wires the components over the shell's
    /// capabilities.
    #[instrument(skip_all, fields(role = %role, user = %user))]
    pub fn init(
        config: AppConfig,
        caps: Capabilities,
        role: Role,
        user: UserId,
    ) -> Result<Self, AppError> {
        config.validate()?;
        let AppConfig {
            transport,
            coordinator,
            booking,
            notifications,
        } = config;
        let transport = HttpTransport::new(caps.http, transport).map_err(AppConfigError::from)?;
        Self::with_transport(
            role,
            user,
            coordinator,
            booking,
            notifications,
            Arc::new(transport),
            caps.location,
        )
    }
}

impl<T> CareApp<T>
where
    T: AlertTransport + NotificationTransport + BookingTransport + 'static,
{
    /// Wires the components over an already-built transport.
    pub fn with_transport(
        role: Role,
        user: UserId,
        coordinator: CoordinatorConfig,
        booking: BookingFlowConfig,
        notifications: NotificationHandlerConfig,
        transport: Arc<T>,
        location: Arc<dyn GeolocationProvider>,
    ) -> Result<Self, AppError> {
        notifications.validate().map_err(AppConfigError::from)?;
        let emergency = EmergencyCoordinator::new(role, coordinator, transport.clone(), location)
            .map_err(AppConfigError::from)?;
        let bookings =
            BookingFlowManager::new(role, booking, transport).map_err(AppConfigError::from)?;
        let push = PushChannel::new(notifications.dedup_capacity);
        info!(%role, user = %user, "care app initialised");
        Ok(Self {
            role,
            user,
            emergency: Arc::new(emergency),
            bookings: Arc::new(bookings),
            notifications,
            push,
        })
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn user(&self) -> &UserId {
        &self.user
    }

    pub fn emergency(&self) -> &Arc<EmergencyCoordinator<T>> {
        &self.emergency
    }

    pub fn bookings(&self) -> &Arc<BookingFlowManager<T>> {
        &self.bookings
    }

    fn emergency_error(&self, e: &EmergencyError) -> AppError {
        e.to_app_error(self.emergency.config().fallback_phone.as_deref())
    }

    /// Raises an alert and keeps it reconciled until resolved.
    pub async fn trigger_emergency(
        &self,
        location: Option<AlertLocation>,
    ) -> Result<TriggerReport, AppError> {
        let report = self
            .emergency
            .trigger(location)
            .await
            .map_err(|e| self.emergency_error(&e))?;
        self.emergency.start_polling();
        Ok(report)
    }

    /// Caregiver opens an alert they were notified about.
    pub async fn open_emergency(
        &self,
        id: EmergencyId,
        notification: Option<NotificationId>,
    ) -> Result<EmergencyAlert, AppError> {
        let alert = self
            .emergency
            .open_alert(id, notification)
            .await
            .map_err(|e| self.emergency_error(&e))?;
        if alert.is_open() {
            self.emergency.start_polling();
        }
        Ok(alert)
    }

    pub async fn acknowledge_emergency(&self) -> Result<EmergencyAlert, AppError> {
        self.emergency
            .acknowledge()
            .await
            .map_err(|e| self.emergency_error(&e))
    }

    pub async fn resolve_emergency(&self) -> Result<EmergencyAlert, AppError> {
        self.emergency
            .resolve()
            .await
            .map_err(|e| self.emergency_error(&e))
    }

    /// Push-delivery callback. Safe with no local alert or booking held:
    /// routing never depends on local state.
    #[instrument(skip_all, fields(kind = %kind))]
    pub async fn on_push(
        &self,
        kind: &str,
        action: Option<&str>,
        data: Value,
        notification_id: Option<NotificationId>,
    ) -> PushOutcome {
        let event = NotificationEvent::from_parts(kind, action, data, notification_id);
        let delivery = self.push.observe(&event);
        let intent = route(&event);
        let presentation = self.notifications.presentation_for(&event);

        match event.kind {
            NotificationType::Emergency => {
                let handled = self.emergency.handle_push(&event, delivery).await;
                if let PushHandling::Reconciled(outcome) = handled {
                    debug!(?outcome, "emergency push reconciled");
                }
            }
            NotificationType::Booking => {
                self.bookings.handle_push(&event, delivery).await;
            }
            _ => {}
        }

        PushOutcome {
            intent,
            presentation,
            duplicate: delivery == Delivery::Duplicate,
        }
    }

    /// Stops every poller and fences late results. Call when the owning
    /// screen goes away.
    pub fn teardown(&self) {
        self.emergency.teardown();
        self.bookings.teardown();
        self.push.forget_all();
    }
}
