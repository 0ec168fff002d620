//! Runtime configuration for the routing service.
//!
//! Values come from [`RoutingConfig::default`] and may be overridden through
//! environment variables with [`RoutingConfig::from_env`]:
//!
//! - `MICROROUTE_DATA_DIR`: directory holding `sites.json` and the datasets
//! - `MICROROUTE_SNAP_TOLERANCE_M`: node merge tolerance (default `2.0`)
//! - `MICROROUTE_MAX_SNAP_DISTANCE_M`: max request-to-node distance (default `50.0`)
//! - `MICROROUTE_CACHE_TTL_SECS`: result cache TTL (default `3600`)
//! - `MICROROUTE_CACHE_CAPACITY`: size that triggers an expiry sweep (default `500`)
//! - `MICROROUTE_EXTERNAL_TIMEOUT_MS`: directions API timeout (default `10000`)
//! - `GOOGLE_DIRECTIONS_API_KEY`: credential for the external gateway
//! - `MICROROUTE_DIRECTIONS_URL`: override for the directions endpoint

use std::env;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{Error, Result};

/// Default snapping tolerance for node deduplication.
pub const DEFAULT_SNAP_TOLERANCE_M: f64 = 2.0;

/// Default search radius when attaching request coordinates to the graph.
pub const DEFAULT_MAX_SNAP_DISTANCE_M: f64 = 50.0;

/// Default lifetime of a cached route.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(3600);

/// Default entry count above which expired cache entries are swept.
pub const DEFAULT_CACHE_CAPACITY: usize = 500;

/// Default timeout for one external directions request.
pub const DEFAULT_EXTERNAL_TIMEOUT: Duration = Duration::from_secs(10);

/// Google Directions JSON endpoint.
pub const DEFAULT_DIRECTIONS_URL: &str = "https://maps.googleapis.com/maps/api/directions/json";

const DATA_DIR_ENV: &str = "MICROROUTE_DATA_DIR";
const SNAP_TOLERANCE_ENV: &str = "MICROROUTE_SNAP_TOLERANCE_M";
const MAX_SNAP_DISTANCE_ENV: &str = "MICROROUTE_MAX_SNAP_DISTANCE_M";
const CACHE_TTL_ENV: &str = "MICROROUTE_CACHE_TTL_SECS";
const CACHE_CAPACITY_ENV: &str = "MICROROUTE_CACHE_CAPACITY";
const EXTERNAL_TIMEOUT_ENV: &str = "MICROROUTE_EXTERNAL_TIMEOUT_MS";
const API_KEY_ENV: &str = "GOOGLE_DIRECTIONS_API_KEY";
const DIRECTIONS_URL_ENV: &str = "MICROROUTE_DIRECTIONS_URL";

/// Configuration consumed by [`crate::RoutingService`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingConfig {
    /// Directory with `sites.json` and the GeoJSON datasets it references.
    pub data_dir: Option<PathBuf>,
    /// Two raw coordinates closer than this resolve to the same node.
    pub snap_tolerance_m: f64,
    /// Request coordinates farther than this from every node find no path.
    pub max_snap_distance_m: f64,
    #[serde(with = "duration_secs")]
    pub cache_ttl: Duration,
    pub cache_capacity: usize,
    #[serde(with = "duration_millis")]
    pub external_timeout: Duration,
    /// Credential for the external directions API. `None` disables the call.
    #[serde(skip_serializing)]
    pub directions_api_key: Option<String>,
    pub directions_base_url: String,
    /// Language requested from the external provider.
    pub language: String,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            snap_tolerance_m: DEFAULT_SNAP_TOLERANCE_M,
            max_snap_distance_m: DEFAULT_MAX_SNAP_DISTANCE_M,
            cache_ttl: DEFAULT_CACHE_TTL,
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            external_timeout: DEFAULT_EXTERNAL_TIMEOUT,
            directions_api_key: None,
            directions_base_url: DEFAULT_DIRECTIONS_URL.to_string(),
            language: "de".to_string(),
        }
    }
}

impl RoutingConfig {
    /// Create configuration from environment variables.
    ///
    /// Unset variables keep their defaults; unparseable values are logged and
    /// ignored.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let data_dir = env::var_os(DATA_DIR_ENV).map(PathBuf::from);
        let directions_api_key = env::var(API_KEY_ENV)
            .ok()
            .filter(|value| !value.trim().is_empty());
        let directions_base_url =
            env::var(DIRECTIONS_URL_ENV).unwrap_or(defaults.directions_base_url);

        Self {
            data_dir,
            snap_tolerance_m: parse_env(SNAP_TOLERANCE_ENV).unwrap_or(defaults.snap_tolerance_m),
            max_snap_distance_m: parse_env(MAX_SNAP_DISTANCE_ENV)
                .unwrap_or(defaults.max_snap_distance_m),
            cache_ttl: parse_env(CACHE_TTL_ENV)
                .map(Duration::from_secs)
                .unwrap_or(defaults.cache_ttl),
            cache_capacity: parse_env(CACHE_CAPACITY_ENV).unwrap_or(defaults.cache_capacity),
            external_timeout: parse_env(EXTERNAL_TIMEOUT_ENV)
                .map(Duration::from_millis)
                .unwrap_or(defaults.external_timeout),
            directions_api_key,
            directions_base_url,
            language: defaults.language,
        }
    }

    /// Override the data directory.
    pub fn with_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = Some(dir.into());
        self
    }

    /// Override the directions API credential.
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.directions_api_key = Some(key.into());
        self
    }

    /// Resolve the data directory, falling back to the platform data dir.
    pub fn resolve_data_dir(&self) -> Result<PathBuf> {
        match &self.data_dir {
            Some(dir) => Ok(dir.clone()),
            None => default_data_dir(),
        }
    }
}

/// Platform-specific default data directory.
pub fn default_data_dir() -> Result<PathBuf> {
    let dirs =
        ProjectDirs::from("org", "microroute", "microroute").ok_or(Error::ProjectDirsUnavailable)?;
    Ok(dirs.data_dir().to_path_buf())
}

/// Path of the site manifest inside a data directory.
pub fn sites_manifest_path(data_dir: &Path) -> PathBuf {
    data_dir.join("sites.json")
}

fn parse_env<T: FromStr>(name: &str) -> Option<T> {
    let raw = env::var(name).ok()?;
    match raw.trim().parse::<T>() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(variable = name, value = %raw, "ignoring unparseable environment value");
            None
        }
    }
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}

mod duration_millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
