//! One-shot geolocation seam.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A resolved reading, serialized into the generate request body.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

/// Location failures are terminal for the submission; the user has to fix
/// the environment and resubmit.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GeoError {
    #[error("Geolocation is not supported")]
    NotSupported,
    #[error("Unable to retrieve your location: {reason}")]
    Unavailable { reason: String },
}

/// Resolves the device location once per submission. The reading is fixed
/// for the session's lifetime; there is no mid-stream update.
#[async_trait]
pub trait GeoProvider {
    async fn current_location(&self) -> Result<GeoPoint, GeoError>;
}

/// Provider with a fixed reading, for configured deployments and tests.
#[derive(Debug, Clone, Copy)]
pub struct StaticGeoProvider {
    point: GeoPoint,
}

impl StaticGeoProvider {
    pub fn new(point: GeoPoint) -> Self {
        Self { point }
    }
}

#[async_trait]
impl GeoProvider for StaticGeoProvider {
    async fn current_location(&self) -> Result<GeoPoint, GeoError> {
        Ok(self.point)
    }
}

/// Stand-in for an environment with no location capability at all.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnsupportedGeoProvider;

#[async_trait]
impl GeoProvider for UnsupportedGeoProvider {
    async fn current_location(&self) -> Result<GeoPoint, GeoError> {
        Err(GeoError::NotSupported)
    }
}
