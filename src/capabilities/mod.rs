mod http;
mod location;
mod push;

use std::sync::Arc;

pub use self::http::{
    looks_offline, HttpError, HttpExecutor, HttpHeaders, HttpMethod, HttpRequest, HttpResponse,
    HttpResult, ValidatedUrl,
};
pub use self::location::{
    locate_or_unknown, GeolocationProvider, LocationError, PermissionState, Position,
};
pub use self::push::{
    Delivery, NotificationHandlerConfig, NotificationPresentation, NotificationPriority,
    PushChannel, PushConfigError,
};

/// Everything the shell provides to the core.
#[derive(Clone)]
pub struct Capabilities {
    pub http: Arc<dyn HttpExecutor>,
    pub location: Arc<dyn GeolocationProvider>,
}

impl Capabilities {
    pub fn new(http: Arc<dyn HttpExecutor>, location: Arc<dyn GeolocationProvider>) -> Self {
        Self { http, location }
    }
}

impl std::fmt::Debug for Capabilities {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Capabilities").finish_non_exhaustive()
    }
}
