use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::model::{AlertLocation, Coordinate, UNKNOWN_LOCATION_LABEL};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum PermissionState {
    #[default]
    NotDetermined,
    Denied,
    Authorized,
}

impl PermissionState {
    #[must_use]
    pub const fn is_authorized(self) -> bool {
        matches!(self, Self::Authorized)
    }

    #[must_use]
    pub const fn is_denied(self) -> bool {
        matches!(self, Self::Denied)
    }
}

/// A fix as reported by the platform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub latitude: f64,
    pub longitude: f64,
    /// Reverse-geocoded address, when the platform has one.
    #[serde(default)]
    pub address: Option<String>,
}

impl Position {
    pub fn into_alert_location(self) -> Result<AlertLocation, LocationError> {
        let coordinate = Coordinate::new(self.latitude, self.longitude)
            .map_err(|e| LocationError::InvalidFix(e.to_string()))?;
        let label = self
            .address
            .filter(|a| !a.trim().is_empty())
            .unwrap_or_else(|| UNKNOWN_LOCATION_LABEL.to_string());
        Ok(AlertLocation::new(coordinate, label))
    }
}

#[derive(Debug, Clone, Error, Serialize, Deserialize, PartialEq, Eq)]
pub enum LocationError {
    #[error("location permission denied")]
    PermissionDenied,
    #[error("location services unavailable")]
    Unavailable,
    #[error("no fix within {0:?}")]
    Timeout(Duration),
    #[error("invalid fix: {0}")]
    InvalidFix(String),
    #[error("location error: {0}")]
    Platform(String),
}

/// Best-effort position source. Implementations may take as long as they
/// like; callers bound the wait themselves.
#[async_trait]
pub trait GeolocationProvider: Send + Sync {
    async fn permission(&self) -> PermissionState {
        PermissionState::NotDetermined
    }

    async fn current_position(&self) -> Result<Position, LocationError>;
}

/// Resolves the location to attach to an alert. Never fails: a denied,
/// unavailable or slow provider degrades to [`AlertLocation::unknown`].
pub async fn locate_or_unknown<G>(provider: &G, timeout: Duration) -> (AlertLocation, Option<LocationError>)
where
    G: GeolocationProvider + ?Sized,
{
    if provider.permission().await.is_denied() {
        return (AlertLocation::unknown(), Some(LocationError::PermissionDenied));
    }

    let result = match tokio::time::timeout(timeout, provider.current_position()).await {
        Ok(Ok(pos)) => pos.into_alert_location(),
        Ok(Err(e)) => Err(e),
        Err(_) => Err(LocationError::Timeout(timeout)),
    };

    match result {
        Ok(loc) => (loc, None),
        Err(e) => (AlertLocation::unknown(), Some(e)),
    }
}
