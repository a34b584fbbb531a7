//! Environment-driven CLI configuration.

use std::path::PathBuf;

use anyhow::{Context, bail};
use async_trait::async_trait;

use podium_client_core::auth::resolve_api_base_url;
use podium_client_core::geo::{GeoError, GeoPoint, GeoProvider};

use crate::store::FileSessionStore;

pub const ENV_LAT: &str = "PODIUM_LAT";
pub const ENV_LON: &str = "PODIUM_LON";
pub const ENV_SESSION_FILE: &str = "PODIUM_SESSION_FILE";

#[derive(Debug, Clone)]
pub struct CliConfig {
    pub base_url: String,
    pub base_url_source: &'static str,
    pub location: Option<GeoPoint>,
    pub session_file: PathBuf,
}

impl CliConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let (base_url, base_url_source) = resolve_api_base_url()?;
        let location = resolve_location()?;
        let session_file = std::env::var(ENV_SESSION_FILE)
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(FileSessionStore::default_path);
        Ok(Self {
            base_url,
            base_url_source,
            location,
            session_file,
        })
    }
}

fn resolve_location() -> anyhow::Result<Option<GeoPoint>> {
    let lat = env_f64(ENV_LAT)?;
    let lon = env_f64(ENV_LON)?;
    match (lat, lon) {
        (Some(lat), Some(lon)) => Ok(Some(GeoPoint { lat, lon })),
        (None, None) => Ok(None),
        _ => bail!("{ENV_LAT} and {ENV_LON} must be set together"),
    }
}

fn env_f64(key: &str) -> anyhow::Result<Option<f64>> {
    let Ok(value) = std::env::var(key) else {
        return Ok(None);
    };
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    let parsed = trimmed
        .parse::<f64>()
        .with_context(|| format!("{key} must be a decimal degree, got {trimmed:?}"))?;
    Ok(Some(parsed))
}

/// Serves the location the environment configured, or explains how to
/// configure one. Stands in for a device geolocation call.
#[derive(Debug, Clone, Copy)]
pub struct EnvGeoProvider {
    location: Option<GeoPoint>,
}

impl EnvGeoProvider {
    pub fn new(location: Option<GeoPoint>) -> Self {
        Self { location }
    }
}

#[async_trait]
impl GeoProvider for EnvGeoProvider {
    async fn current_location(&self) -> Result<GeoPoint, GeoError> {
        self.location.ok_or_else(|| GeoError::Unavailable {
            reason: format!("set {ENV_LAT} and {ENV_LON} to provide one"),
        })
    }
}
