//! Route request and result types plus the fallback orchestrator.
//!
//! This module provides:
//! - [`TravelMode`] - Walking, cycling, or driving with their speed model
//! - [`RouteRequest`] / [`RawRouteRequest`] - Validated and wire-level requests
//! - [`RouteResult`] - The always-present answer with provenance and confidence
//! - [`RoutingService`] - The orchestrator behind `calculate_route`
//!
//! # Example
//!
//! ```ignore
//! use microroute_lib::{Coordinate, RouteRequest, RoutingConfig, RoutingService, TravelMode};
//!
//! let service = RoutingService::from_config(RoutingConfig::from_env())?;
//! let request = RouteRequest::new(
//!     Coordinate::new(51.5896, 3.7216),
//!     Coordinate::new(51.5902, 3.7221),
//!     TravelMode::Walking,
//! );
//! let route = service.calculate_route(&request)?;
//! println!("{} via {}", route.distance_m, route.provenance);
//! ```

mod orchestrator;

pub use orchestrator::{Diagnostics, RoutingService, RoutingServiceBuilder, SiteGraphStats};

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::geo::Coordinate;
use crate::instructions::Instruction;

/// Supported travel modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TravelMode {
    #[default]
    Walking,
    Cycling,
    Driving,
}

impl TravelMode {
    /// All modes, in a stable order.
    pub const ALL: [TravelMode; 3] = [TravelMode::Walking, TravelMode::Cycling, TravelMode::Driving];

    /// Assumed travel speed in meters per second.
    ///
    /// Deliberately slow: these areas are dense, shared, and low-speed.
    pub fn speed_mps(self) -> f64 {
        match self {
            TravelMode::Walking => 1.0,
            TravelMode::Cycling => 2.0,
            TravelMode::Driving => 4.17,
        }
    }

    /// Whole-second duration estimate for `distance_m`.
    pub fn estimate_duration(self, distance_m: f64) -> f64 {
        (distance_m / self.speed_mps()).round()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TravelMode::Walking => "walking",
            TravelMode::Cycling => "cycling",
            TravelMode::Driving => "driving",
        }
    }
}

impl fmt::Display for TravelMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TravelMode {
    type Err = Error;

    /// Accepts the canonical names plus the aliases the map client sends.
    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "walking" | "walk" | "pedestrian" | "foot" => Ok(TravelMode::Walking),
            "cycling" | "bike" | "bicycle" => Ok(TravelMode::Cycling),
            "driving" | "car" | "drive" => Ok(TravelMode::Driving),
            other => Err(Error::UnsupportedMode {
                mode: other.to_string(),
            }),
        }
    }
}

/// Shortest-path search strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum SearchAlgorithm {
    /// Dijkstra's algorithm (weighted graph).
    Dijkstra,
    /// A* search with a scaled great-circle heuristic.
    #[default]
    AStar,
}

impl fmt::Display for SearchAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = match self {
            SearchAlgorithm::Dijkstra => "dijkstra",
            SearchAlgorithm::AStar => "a-star",
        };
        f.write_str(value)
    }
}

/// Maximum number of alternative routes computed per request.
pub const MAX_ALTERNATIVES: usize = 3;

/// Optional routing preferences.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct RouteOptions {
    /// Never use steps.
    pub avoid_steps: bool,
    /// Penalise unpaved surfaces.
    pub prefer_paved: bool,
    /// Number of alternative local routes to compute (capped at [`MAX_ALTERNATIVES`]).
    pub alternatives: usize,
    pub algorithm: SearchAlgorithm,
}

/// A validated route request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteRequest {
    pub origin: Coordinate,
    pub destination: Coordinate,
    pub mode: TravelMode,
    #[serde(default)]
    pub options: RouteOptions,
}

impl RouteRequest {
    /// Convenience constructor with default options.
    pub fn new(origin: Coordinate, destination: Coordinate, mode: TravelMode) -> Self {
        Self {
            origin,
            destination,
            mode,
            options: RouteOptions::default(),
        }
    }

    pub fn with_options(mut self, options: RouteOptions) -> Self {
        self.options = options;
        self
    }

    /// Check both coordinates are finite and in range.
    pub fn validate(&self) -> Result<()> {
        self.origin.validate("from")?;
        self.destination.validate("to")?;
        Ok(())
    }
}

/// Loosely typed coordinate as received from a client.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawCoordinate {
    #[serde(default)]
    pub lat: Option<Value>,
    #[serde(default)]
    pub lng: Option<Value>,
}

/// Wire-level request before validation.
///
/// Coordinates may arrive as numbers or numeric strings; anything else is
/// rejected by [`RawRouteRequest::into_request`] before reaching the solver.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawRouteRequest {
    #[serde(default)]
    pub from: Option<RawCoordinate>,
    #[serde(default)]
    pub to: Option<RawCoordinate>,
    #[serde(default, alias = "profile")]
    pub mode: Option<String>,
    #[serde(default)]
    pub options: RouteOptions,
}

impl RawRouteRequest {
    /// Validate and convert into a [`RouteRequest`].
    pub fn into_request(self) -> Result<RouteRequest> {
        let origin = convert_coordinate(self.from.as_ref(), "from")?;
        let destination = convert_coordinate(self.to.as_ref(), "to")?;
        let mode = match self.mode.as_deref() {
            Some(mode) => mode.parse()?,
            None => TravelMode::default(),
        };
        let request = RouteRequest {
            origin,
            destination,
            mode,
            options: self.options,
        };
        request.validate()?;
        Ok(request)
    }
}

fn convert_coordinate(raw: Option<&RawCoordinate>, field: &'static str) -> Result<Coordinate> {
    let raw = raw.ok_or(Error::MissingCoordinate { field })?;
    let lat = numeric_component(raw.lat.as_ref(), field)?;
    let lng = numeric_component(raw.lng.as_ref(), field)?;
    Ok(Coordinate::new(lat, lng))
}

fn numeric_component(value: Option<&Value>, field: &'static str) -> Result<f64> {
    let value = match value {
        None | Some(Value::Null) => return Err(Error::MissingCoordinate { field }),
        Some(value) => value,
    };
    let parsed = match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed
        .filter(|number| number.is_finite())
        .ok_or_else(|| Error::InvalidCoordinate {
            field,
            value: value.to_string(),
        })
}

/// Pipeline stage that produced a [`RouteResult`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Provenance {
    /// Solved on the local path network with informative instructions.
    Local,
    /// Produced by the external directions provider.
    External,
    /// Local solve kept after the external upgrade failed.
    LocalBackup,
    /// Straight line between origin and destination.
    Synthetic,
    /// Nothing could be produced.
    None,
}

impl Provenance {
    /// Confidence attached to results from this stage.
    ///
    /// External results use the provider's own confidence instead.
    pub fn base_confidence(self) -> f64 {
        match self {
            Provenance::Local => 0.8,
            Provenance::External => 0.9,
            Provenance::LocalBackup => 0.7,
            Provenance::Synthetic => 0.3,
            Provenance::None => 0.0,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Provenance::Local => "local",
            Provenance::External => "external",
            Provenance::LocalBackup => "local-backup",
            Provenance::Synthetic => "synthetic",
            Provenance::None => "none",
        }
    }
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Machine-readable error codes carried by [`RouteResult::error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RouteErrorCode {
    InvalidCoordinates,
    NoLocalNetwork,
    DatasetError,
    NoPathFound,
    ExternalUnavailable,
    RoutingExhausted,
}

/// Extra local route returned when alternatives were requested.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlternativeRoute {
    pub geometry: Vec<Coordinate>,
    pub distance_m: f64,
    pub duration_s: f64,
}

/// Result of a routing request. Always present, even when degraded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteResult {
    pub success: bool,
    pub geometry: Vec<Coordinate>,
    pub distance_m: f64,
    pub duration_s: f64,
    pub instructions: Vec<Instruction>,
    pub provenance: Provenance,
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RouteErrorCode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Why the local network was skipped or its result replaced.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub alternatives: Vec<AlternativeRoute>,
    /// Whether this result was served from the result cache.
    #[serde(default)]
    pub cached: bool,
}

impl RouteResult {
    /// Total-exhaustion result. Unreachable for well-formed coordinates.
    pub fn exhausted(message: impl Into<String>) -> Self {
        Self {
            success: false,
            geometry: Vec::new(),
            distance_m: 0.0,
            duration_s: 0.0,
            instructions: Vec::new(),
            provenance: Provenance::None,
            confidence: 0.0,
            error: Some(RouteErrorCode::RoutingExhausted),
            message: Some(message.into()),
            fallback_reason: None,
            alternatives: Vec::new(),
            cached: false,
        }
    }

    /// Rejected-input result, for surfaces that must answer with a body.
    pub fn invalid(message: impl Into<String>) -> Self {
        Self {
            error: Some(RouteErrorCode::InvalidCoordinates),
            ..Self::exhausted(message)
        }
    }

    /// Instruction texts in order.
    pub fn instruction_texts(&self) -> Vec<&str> {
        self.instructions
            .iter()
            .map(|instruction| instruction.text.as_str())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn travel_mode_aliases_parse() {
        assert_eq!("pedestrian".parse::<TravelMode>().unwrap(), TravelMode::Walking);
        assert_eq!("BIKE".parse::<TravelMode>().unwrap(), TravelMode::Cycling);
        assert_eq!("car".parse::<TravelMode>().unwrap(), TravelMode::Driving);
        assert!("hovercraft".parse::<TravelMode>().is_err());
    }

    #[test]
    fn duration_uses_slow_area_speeds() {
        assert_eq!(TravelMode::Walking.estimate_duration(80.0), 80.0);
        assert_eq!(TravelMode::Cycling.estimate_duration(80.0), 40.0);
        assert_eq!(TravelMode::Driving.estimate_duration(417.0), 100.0);
    }

    #[test]
    fn raw_request_accepts_numeric_strings() {
        let raw: RawRouteRequest = serde_json::from_value(json!({
            "from": {"lat": "51.5896", "lng": 3.7216},
            "to": {"lat": 51.5902, "lng": "3.7221"},
            "profile": "cycling"
        }))
        .expect("raw request parses");

        let request = raw.into_request().expect("valid request");
        assert_eq!(request.mode, TravelMode::Cycling);
        assert_eq!(request.origin.lat, 51.5896);
        assert_eq!(request.destination.lng, 3.7221);
    }

    #[test]
    fn raw_request_rejects_missing_and_non_numeric() {
        let missing: RawRouteRequest =
            serde_json::from_value(json!({"from": {"lat": 51.0, "lng": 3.0}})).unwrap();
        let err = missing.into_request().expect_err("missing destination");
        assert!(matches!(err, Error::MissingCoordinate { field: "to" }));

        let garbage: RawRouteRequest = serde_json::from_value(json!({
            "from": {"lat": "north", "lng": 3.0},
            "to": {"lat": 51.0, "lng": 3.0}
        }))
        .unwrap();
        let err = garbage.into_request().expect_err("non-numeric origin");
        assert!(matches!(err, Error::InvalidCoordinate { field: "from", .. }));

        let null_lng: RawRouteRequest = serde_json::from_value(json!({
            "from": {"lat": 51.0, "lng": null},
            "to": {"lat": 51.0, "lng": 3.0}
        }))
        .unwrap();
        assert!(null_lng.into_request().is_err());
    }

    #[test]
    fn provenance_serializes_kebab_case() {
        let value = serde_json::to_value(Provenance::LocalBackup).unwrap();
        assert_eq!(value, json!("local-backup"));
        assert_eq!(Provenance::Synthetic.to_string(), "synthetic");
    }
}
