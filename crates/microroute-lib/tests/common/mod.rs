//! Common test utilities and fixture helpers.
//!
//! The fixture is a small cluster of paths around a marina: an 80 m L-shaped
//! route from [`ORIGIN`] to [`DESTINATION`] with a few spurs.

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use microroute_lib::gateway::{DirectionsProvider, ExternalRoute, GatewayFailure};
use microroute_lib::instructions::{Instruction, Maneuver};
use microroute_lib::{
    BoundingBox, Coordinate, Dataset, PathClass, PathFeature, RoutingConfig, RoutingService,
    Site, TravelMode,
};
use serde_json::json;
use tempfile::TempDir;

pub const SITE_ID: &str = "marina";

pub const ORIGIN: Coordinate = Coordinate::new(51.5896, 3.7216);
/// Corner of the L, ~40 m east of the origin.
pub const CORNER: Coordinate = Coordinate::new(51.5896, 3.722179);
/// ~40 m north of the corner.
pub const DESTINATION: Coordinate = Coordinate::new(51.58996, 3.722179);

const SOUTH_SPUR: Coordinate = Coordinate::new(51.5893, 3.722179);
const WEST_SPUR: Coordinate = Coordinate::new(51.5896, 3.7210);
const EAST_END: Coordinate = Coordinate::new(51.5896, 3.7230);

/// Far outside the site.
pub const FAR_AWAY: Coordinate = Coordinate::new(52.5200, 13.4050);

pub fn site_bounds() -> BoundingBox {
    BoundingBox {
        min_lat: 51.585,
        min_lng: 3.715,
        max_lat: 51.595,
        max_lng: 3.730,
    }
}

pub fn marina_site(path: impl Into<PathBuf>) -> Site {
    Site {
        id: SITE_ID.to_string(),
        path: path.into(),
        bounds: site_bounds(),
    }
}

pub fn marina_features() -> Vec<PathFeature> {
    vec![
        PathFeature::new(PathClass::ServiceRoad, vec![ORIGIN, CORNER]).with_name("Strandweg"),
        PathFeature::new(PathClass::ServiceRoad, vec![CORNER, DESTINATION]).with_name("Dünenweg"),
        PathFeature::new(PathClass::Footway, vec![CORNER, SOUTH_SPUR]),
        PathFeature::new(PathClass::Footway, vec![WEST_SPUR, ORIGIN]),
        PathFeature::new(PathClass::ServiceRoad, vec![CORNER, EAST_END]),
    ]
}

pub fn marina_dataset() -> Dataset {
    Dataset::from_features(SITE_ID, marina_features())
}

/// Service over the in-memory marina dataset with the given provider.
pub fn service_with(provider: Option<Arc<dyn DirectionsProvider>>) -> RoutingService {
    let builder = RoutingService::builder(RoutingConfig::default())
        .dataset(marina_site("marina.geojson"), marina_dataset());
    let builder = match provider {
        Some(provider) => builder.provider(provider),
        None => builder.without_provider(),
    };
    builder.build().expect("service builds")
}

/// Directions provider double that counts its calls.
pub struct MockProvider {
    calls: AtomicUsize,
    outcome: Result<ExternalRoute, GatewayFailure>,
}

impl MockProvider {
    pub fn succeeding() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            outcome: Ok(ExternalRoute {
                geometry: vec![ORIGIN, CORNER, DESTINATION],
                distance_m: 82.0,
                duration_s: 70.0,
                instructions: vec![
                    Instruction::new("Head east on Strandweg", Maneuver::Straight, 40.0),
                    Instruction::new("Turn left onto Dünenweg", Maneuver::TurnLeft, 42.0),
                    Instruction::arrival(),
                ],
                confidence: 0.9,
            }),
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            outcome: Err(GatewayFailure::Timeout),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl DirectionsProvider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    fn directions(
        &self,
        _origin: &Coordinate,
        _destination: &Coordinate,
        _mode: TravelMode,
    ) -> Result<ExternalRoute, GatewayFailure> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.outcome.clone()
    }
}

/// GeoJSON text for a list of `[lng, lat]` line strings tagged as footways.
pub fn geojson_lines(lines: &[&[[f64; 2]]]) -> String {
    let features: Vec<_> = lines
        .iter()
        .map(|coords| {
            json!({
                "type": "Feature",
                "properties": {"highway": "footway"},
                "geometry": {"type": "LineString", "coordinates": coords},
            })
        })
        .collect();
    json!({"type": "FeatureCollection", "features": features}).to_string()
}

/// Data directory with a `sites.json` and one dataset file.
pub struct DataDirEnv {
    _temp_dir: TempDir,
    pub data_dir: PathBuf,
    pub dataset_path: PathBuf,
}

impl DataDirEnv {
    /// Write `geojson` as the marina dataset and register it relatively.
    pub fn new(geojson: &str) -> Self {
        let temp_dir = TempDir::new().expect("create temp dir");
        let data_dir = temp_dir.path().to_path_buf();
        let dataset_path = data_dir.join("marina.geojson");
        fs::write(&dataset_path, geojson).expect("write dataset");
        write_manifest(&data_dir, "marina.geojson");
        Self {
            _temp_dir: temp_dir,
            data_dir,
            dataset_path,
        }
    }

    /// The marina fixture serialized as GeoJSON.
    pub fn marina() -> Self {
        Self::new(&marina_geojson())
    }

    pub fn config(&self) -> RoutingConfig {
        RoutingConfig::default().with_data_dir(&self.data_dir)
    }
}

fn write_manifest(data_dir: &Path, dataset: &str) {
    let bounds = site_bounds();
    let manifest = json!([{
        "id": SITE_ID,
        "path": dataset,
        "bounds": {
            "min_lat": bounds.min_lat,
            "min_lng": bounds.min_lng,
            "max_lat": bounds.max_lat,
            "max_lng": bounds.max_lng,
        }
    }]);
    fs::write(data_dir.join("sites.json"), manifest.to_string()).expect("write manifest");
}

pub fn marina_geojson() -> String {
    let features: Vec<_> = marina_features()
        .into_iter()
        .map(|feature| {
            let coordinates: Vec<[f64; 2]> = feature
                .coordinates
                .iter()
                .map(|point| point.to_lng_lat())
                .collect();
            let highway = match feature.class {
                PathClass::ServiceRoad => "service",
                _ => "footway",
            };
            json!({
                "type": "Feature",
                "properties": {"highway": highway, "name": feature.name},
                "geometry": {"type": "LineString", "coordinates": coordinates},
            })
        })
        .collect();
    json!({"type": "FeatureCollection", "features": features}).to_string()
}
