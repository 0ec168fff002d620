//! Geodesic helpers shared by the graph builder, solver, and analyzer.
//!
//! All distances are in meters on a spherical earth (the `geo` crate's
//! haversine measure), which is accurate well below the snapping tolerance at
//! the scale of a single resort or district.

use std::fmt;

use ::geo::{Bearing, Distance, Haversine, Point};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Radius of the cartesian projection in meters.
///
/// Slightly below the haversine mean radius so chord lengths stay below arc
/// lengths.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// WGS84 latitude/longitude pair in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub lat: f64,
    pub lng: f64,
}

impl Coordinate {
    pub const fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Build a coordinate from a GeoJSON `[lng, lat]` position.
    pub const fn from_lng_lat(position: [f64; 2]) -> Self {
        Self {
            lat: position[1],
            lng: position[0],
        }
    }

    /// Position in GeoJSON `[lng, lat]` order.
    pub const fn to_lng_lat(self) -> [f64; 2] {
        [self.lng, self.lat]
    }

    /// Reject non-finite or out-of-range values.
    ///
    /// `field` names the request field in the resulting error (for example
    /// `"from"`).
    pub fn validate(self, field: &'static str) -> Result<Self> {
        if !self.lat.is_finite() || !(-90.0..=90.0).contains(&self.lat) {
            return Err(Error::InvalidCoordinate {
                field,
                value: format!("lat={}", self.lat),
            });
        }
        if !self.lng.is_finite() || !(-180.0..=180.0).contains(&self.lng) {
            return Err(Error::InvalidCoordinate {
                field,
                value: format!("lng={}", self.lng),
            });
        }
        Ok(self)
    }

    /// Same position as a `geo` point (x = longitude, y = latitude).
    pub fn to_point(self) -> Point<f64> {
        Point::new(self.lng, self.lat)
    }

    /// Great-circle distance to `other` in meters (haversine).
    pub fn distance_to(&self, other: &Coordinate) -> f64 {
        Haversine.distance(self.to_point(), other.to_point())
    }

    /// Initial bearing towards `other` in degrees, normalised to `[0, 360)`.
    pub fn bearing_to(&self, other: &Coordinate) -> f64 {
        Haversine
            .bearing(self.to_point(), other.to_point())
            .rem_euclid(360.0)
    }

    /// Earth-centred cartesian position in meters, used as the KD-tree key.
    ///
    /// The chord distance between two such points never exceeds the
    /// great-circle distance, so a chord radius query is a superset of the
    /// matching haversine query.
    pub fn to_cartesian(self) -> [f64; 3] {
        let lat = self.lat.to_radians();
        let lng = self.lng.to_radians();
        [
            EARTH_RADIUS_M * lat.cos() * lng.cos(),
            EARTH_RADIUS_M * lat.cos() * lng.sin(),
            EARTH_RADIUS_M * lat.sin(),
        ]
    }

    /// Round both components to `decimals` places for cache keys.
    pub fn rounded(self, decimals: i32) -> (i64, i64) {
        let scale = 10f64.powi(decimals);
        (
            (self.lat * scale).round() as i64,
            (self.lng * scale).round() as i64,
        )
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.6},{:.6}", self.lat, self.lng)
    }
}

/// Signed turn angle at `current` in degrees, within `[-180, 180]`.
///
/// Positive values turn right, negative values turn left.
pub fn turn_angle(prev: &Coordinate, current: &Coordinate, next: &Coordinate) -> f64 {
    signed_bearing_change(prev.bearing_to(current), current.bearing_to(next))
}

/// Difference `to - from` between two bearings, normalised to `[-180, 180]`.
pub fn signed_bearing_change(from: f64, to: f64) -> f64 {
    let mut angle = to - from;
    if angle > 180.0 {
        angle -= 360.0;
    }
    if angle < -180.0 {
        angle += 360.0;
    }
    angle
}

/// Total length of a polyline in meters.
pub fn polyline_length(points: &[Coordinate]) -> f64 {
    points
        .windows(2)
        .map(|pair| Haversine.distance(pair[0].to_point(), pair[1].to_point()))
        .sum()
}

/// Axis-aligned latitude/longitude bounding box.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_lat: f64,
    pub min_lng: f64,
    pub max_lat: f64,
    pub max_lng: f64,
}

impl BoundingBox {
    /// Inclusive containment check.
    pub fn contains(&self, point: &Coordinate) -> bool {
        point.lat >= self.min_lat
            && point.lat <= self.max_lat
            && point.lng >= self.min_lng
            && point.lng <= self.max_lng
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn haversine_matches_known_distance() {
        // One thousandth of a degree of latitude is ~111 m everywhere.
        let a = Coordinate::new(51.5896, 3.7216);
        let b = Coordinate::new(51.5906, 3.7216);
        let d = a.distance_to(&b);
        assert!((d - 111.19).abs() < 0.5, "got {d}");
        assert_eq!(a.distance_to(&a), 0.0);
    }

    #[test]
    fn bearing_cardinal_directions() {
        let origin = Coordinate::new(51.0, 6.0);
        let north = Coordinate::new(51.001, 6.0);
        let east = Coordinate::new(51.0, 6.001);
        assert!(origin.bearing_to(&north).abs() < 0.01);
        assert!((origin.bearing_to(&east) - 90.0).abs() < 0.1);
    }

    #[test]
    fn turn_angle_sign_follows_direction() {
        let a = Coordinate::new(51.0, 6.0);
        let b = Coordinate::new(51.001, 6.0);
        let right = Coordinate::new(51.001, 6.001);
        let left = Coordinate::new(51.001, 5.999);
        assert!(turn_angle(&a, &b, &right) > 80.0);
        assert!(turn_angle(&a, &b, &left) < -80.0);
    }

    #[test]
    fn bearing_change_wraps_around_north() {
        assert!((signed_bearing_change(350.0, 10.0) - 20.0).abs() < 1e-9);
        assert!((signed_bearing_change(10.0, 350.0) + 20.0).abs() < 1e-9);
    }

    #[test]
    fn chord_never_exceeds_arc() {
        let a = Coordinate::new(51.5896, 3.7216);
        let b = Coordinate::new(51.58962, 3.72161);
        let pa = a.to_cartesian();
        let pb = b.to_cartesian();
        let chord = ((pa[0] - pb[0]).powi(2) + (pa[1] - pb[1]).powi(2) + (pa[2] - pb[2]).powi(2))
            .sqrt();
        assert!(chord <= a.distance_to(&b) + 1e-6);
    }

    #[test]
    fn polyline_length_sums_legs() {
        let points = [
            Coordinate::new(51.0, 6.0),
            Coordinate::new(51.001, 6.0),
            Coordinate::new(51.001, 6.001),
        ];
        let expected = points[0].distance_to(&points[1]) + points[1].distance_to(&points[2]);
        assert!((polyline_length(&points) - expected).abs() < 1e-9);
        assert_eq!(polyline_length(&points[..1]), 0.0);
    }

    #[test]
    fn validate_rejects_non_finite() {
        assert!(Coordinate::new(f64::NAN, 3.0).validate("from").is_err());
        assert!(Coordinate::new(51.0, f64::INFINITY).validate("to").is_err());
        assert!(Coordinate::new(91.0, 3.0).validate("from").is_err());
        assert!(Coordinate::new(51.0, 3.0).validate("from").is_ok());
    }

    #[test]
    fn bounding_box_is_inclusive() {
        let bounds = BoundingBox {
            min_lat: 51.585,
            min_lng: 3.715,
            max_lat: 51.595,
            max_lng: 3.730,
        };
        assert!(bounds.contains(&Coordinate::new(51.585, 3.715)));
        assert!(bounds.contains(&Coordinate::new(51.5896, 3.7216)));
        assert!(!bounds.contains(&Coordinate::new(51.0, 6.05)));
    }
}
