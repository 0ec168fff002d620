//! Source dataset loading and site selection.
//!
//! A dataset is a GeoJSON `FeatureCollection` whose `LineString` features are
//! walkable, rideable, or drivable path segments. Loading never silently
//! produces an empty network: a missing file or a document that is not a
//! feature collection is an error, while individual malformed features are
//! counted in [`LoadStats`] and skipped.

use std::fs;
use std::path::{Path, PathBuf};

use geojson::{Feature, JsonObject};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::sites_manifest_path;
use crate::error::{Error, Result};
use crate::geo::{BoundingBox, Coordinate};
use crate::routing::TravelMode;

/// Surface values treated as paved.
const PAVED_SURFACES: &[&str] = &[
    "asphalt",
    "paved",
    "concrete",
    "paving_stones",
    "sett",
    "concrete:plates",
];

/// Path classification derived from the `highway` property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PathClass {
    ServiceRoad,
    Footway,
    Steps,
    Cycleway,
    Track,
    Mixed,
}

impl PathClass {
    /// Classify an OSM-style `highway` value.
    pub fn from_highway(highway: Option<&str>) -> Self {
        let Some(highway) = highway else {
            return PathClass::Mixed;
        };
        match highway.trim().to_ascii_lowercase().as_str() {
            "residential" | "service" | "unclassified" | "tertiary" | "living_street" => {
                PathClass::ServiceRoad
            }
            "footway" | "pedestrian" | "path" => PathClass::Footway,
            "steps" => PathClass::Steps,
            "cycleway" => PathClass::Cycleway,
            "track" => PathClass::Track,
            _ => PathClass::Mixed,
        }
    }

    /// Modes permitted when the feature carries no explicit access tags.
    pub fn default_modes(self) -> ModeSet {
        match self {
            PathClass::ServiceRoad | PathClass::Track | PathClass::Mixed => ModeSet::all(),
            PathClass::Footway | PathClass::Steps => ModeSet::only(TravelMode::Walking),
            PathClass::Cycleway => {
                ModeSet::only(TravelMode::Walking).with(TravelMode::Cycling, true)
            }
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PathClass::ServiceRoad => "service_road",
            PathClass::Footway => "footway",
            PathClass::Steps => "steps",
            PathClass::Cycleway => "cycleway",
            PathClass::Track => "track",
            PathClass::Mixed => "mixed",
        }
    }
}

/// Set of travel modes permitted on a feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ModeSet {
    pub walking: bool,
    pub cycling: bool,
    pub driving: bool,
}

impl ModeSet {
    pub const fn all() -> Self {
        Self {
            walking: true,
            cycling: true,
            driving: true,
        }
    }

    pub fn only(mode: TravelMode) -> Self {
        Self::default().with(mode, true)
    }

    pub fn with(mut self, mode: TravelMode, allowed: bool) -> Self {
        match mode {
            TravelMode::Walking => self.walking = allowed,
            TravelMode::Cycling => self.cycling = allowed,
            TravelMode::Driving => self.driving = allowed,
        }
        self
    }

    pub fn allows(&self, mode: TravelMode) -> bool {
        match mode {
            TravelMode::Walking => self.walking,
            TravelMode::Cycling => self.cycling,
            TravelMode::Driving => self.driving,
        }
    }
}

/// One path segment from the source dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathFeature {
    pub coordinates: Vec<Coordinate>,
    pub class: PathClass,
    pub modes: ModeSet,
    pub name: Option<String>,
    pub surface: Option<String>,
    /// Driving may only follow the digitised direction.
    pub oneway: bool,
}

impl PathFeature {
    /// Bidirectional feature with the class default permissions.
    pub fn new(class: PathClass, coordinates: Vec<Coordinate>) -> Self {
        Self {
            coordinates,
            class,
            modes: class.default_modes(),
            name: None,
            surface: None,
            oneway: false,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_modes(mut self, modes: ModeSet) -> Self {
        self.modes = modes;
        self
    }

    pub fn with_surface(mut self, surface: impl Into<String>) -> Self {
        self.surface = Some(surface.into());
        self
    }

    pub fn allows(&self, mode: TravelMode) -> bool {
        self.modes.allows(mode)
    }

    /// Unknown surfaces count as paved for service roads only.
    pub fn is_paved(&self) -> bool {
        match self.surface.as_deref() {
            Some(surface) => PAVED_SURFACES.contains(&surface.trim().to_ascii_lowercase().as_str()),
            None => self.class == PathClass::ServiceRoad,
        }
    }

    pub fn first(&self) -> Option<Coordinate> {
        self.coordinates.first().copied()
    }

    pub fn last(&self) -> Option<Coordinate> {
        self.coordinates.last().copied()
    }
}

/// Counters collected while reading a dataset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadStats {
    /// Features present in the collection.
    pub features: usize,
    /// Features with a `LineString` geometry.
    pub line_strings: usize,
    /// Features with another geometry type, ignored.
    pub skipped_geometries: usize,
    /// `LineString` features whose geometry could not be read.
    pub rejected: usize,
    /// Positions across all accepted features.
    pub total_coordinates: usize,
}

/// Parsed path network for one site.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    pub id: String,
    pub features: Vec<PathFeature>,
    pub stats: LoadStats,
}

impl Dataset {
    /// Build a dataset from in-memory features.
    pub fn from_features(id: impl Into<String>, features: Vec<PathFeature>) -> Self {
        let stats = LoadStats {
            features: features.len(),
            line_strings: features.len(),
            skipped_geometries: 0,
            rejected: 0,
            total_coordinates: features.iter().map(|f| f.coordinates.len()).sum(),
        };
        Self {
            id: id.into(),
            features,
            stats,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawCollection {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    features: Vec<Value>,
}

/// Load a GeoJSON dataset from disk.
pub fn load_dataset(id: &str, path: &Path) -> Result<Dataset> {
    if !path.exists() {
        return Err(Error::DatasetNotFound {
            path: path.to_path_buf(),
        });
    }
    info!(site = id, path = %path.display(), "loading path dataset");
    let text = fs::read_to_string(path)?;
    let dataset = parse_dataset(id, &text)?;
    info!(
        site = id,
        features = dataset.stats.features,
        line_strings = dataset.stats.line_strings,
        rejected = dataset.stats.rejected,
        "path dataset loaded"
    );
    Ok(dataset)
}

/// Parse a GeoJSON `FeatureCollection` document.
pub fn parse_dataset(id: &str, text: &str) -> Result<Dataset> {
    let collection: RawCollection =
        serde_json::from_str(text).map_err(|err| Error::DatasetParse {
            dataset: id.to_string(),
            message: err.to_string(),
        })?;

    if collection.kind != "FeatureCollection" {
        return Err(Error::DatasetParse {
            dataset: id.to_string(),
            message: format!("expected FeatureCollection, found {}", collection.kind),
        });
    }

    let mut stats = LoadStats {
        features: collection.features.len(),
        ..LoadStats::default()
    };
    let mut features = Vec::with_capacity(collection.features.len());

    for (index, raw) in collection.features.into_iter().enumerate() {
        let declared_line = raw
            .get("geometry")
            .and_then(|g| g.get("type"))
            .and_then(Value::as_str)
            == Some("LineString");

        let feature = match Feature::from_json_value(raw) {
            Ok(feature) => feature,
            Err(err) => {
                // A feature geojson cannot read still counts by its declared type.
                if declared_line {
                    debug!(site = id, feature = index, error = %err, "rejecting unreadable line");
                    stats.line_strings += 1;
                    stats.rejected += 1;
                } else {
                    stats.skipped_geometries += 1;
                }
                continue;
            }
        };

        let line = match feature.geometry.map(|geometry| geometry.value) {
            Some(geojson::Value::LineString(line)) => line,
            _ => {
                stats.skipped_geometries += 1;
                continue;
            }
        };
        stats.line_strings += 1;

        let coordinates = match line_coordinates(&line) {
            Some(coordinates) if !coordinates.is_empty() => coordinates,
            _ => {
                debug!(site = id, feature = index, "rejecting feature with unreadable geometry");
                stats.rejected += 1;
                continue;
            }
        };

        let properties = feature.properties.unwrap_or_default();
        stats.total_coordinates += coordinates.len();
        features.push(feature_from_properties(coordinates, &properties));
    }

    if stats.rejected > 0 {
        warn!(site = id, rejected = stats.rejected, "dataset contains malformed features");
    }

    Ok(Dataset {
        id: id.to_string(),
        features,
        stats,
    })
}

/// Convert `[lng, lat, ..]` positions, rejecting short or out-of-range ones.
fn line_coordinates(line: &[Vec<f64>]) -> Option<Vec<Coordinate>> {
    line.iter()
        .map(|position| {
            let lng = *position.first()?;
            let lat = *position.get(1)?;
            Coordinate::new(lat, lng).validate("geometry").ok()
        })
        .collect()
}

fn feature_from_properties(coordinates: Vec<Coordinate>, properties: &JsonObject) -> PathFeature {
    let class = PathClass::from_highway(property(properties, "highway"));
    let mut modes = class.default_modes();

    if let Some(allowed) = access_flag(property(properties, "foot")) {
        modes = modes.with(TravelMode::Walking, allowed);
    }
    if let Some(allowed) = access_flag(property(properties, "bicycle")) {
        modes = modes.with(TravelMode::Cycling, allowed);
    }
    let motor = property(properties, "motor_vehicle").or_else(|| property(properties, "vehicle"));
    if let Some(allowed) = access_flag(motor) {
        modes = modes.with(TravelMode::Driving, allowed);
    }

    let name = property(properties, "name:de")
        .or_else(|| property(properties, "name"))
        .map(str::to_string);
    let surface = property(properties, "surface").map(str::to_string);
    let oneway = matches!(
        property(properties, "oneway").map(|v| v.to_ascii_lowercase()),
        Some(ref v) if v == "yes" || v == "true" || v == "1"
    );

    PathFeature {
        coordinates,
        class,
        modes,
        name,
        surface,
        oneway,
    }
}

fn property<'a>(properties: &'a JsonObject, key: &str) -> Option<&'a str> {
    properties
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

fn access_flag(value: Option<&str>) -> Option<bool> {
    match value?.to_ascii_lowercase().as_str() {
        "no" | "private" => Some(false),
        "yes" | "designated" | "permissive" | "destination" => Some(true),
        _ => None,
    }
}

/// One deployment area with its own path dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Site {
    pub id: String,
    pub path: PathBuf,
    pub bounds: BoundingBox,
}

impl Site {
    pub fn covers(&self, point: &Coordinate) -> bool {
        self.bounds.contains(point)
    }
}

/// Known sites, checked in order when selecting a dataset for a request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SiteCatalog {
    sites: Vec<Site>,
}

impl SiteCatalog {
    pub fn new(sites: Vec<Site>) -> Self {
        Self { sites }
    }

    /// Read `sites.json` from `data_dir`.
    ///
    /// Relative dataset paths are resolved against `data_dir`. A missing
    /// manifest yields an empty catalog, so every request goes external.
    pub fn load(data_dir: &Path) -> Result<Self> {
        let manifest = sites_manifest_path(data_dir);
        if !manifest.exists() {
            warn!(path = %manifest.display(), "no site manifest found; local routing disabled");
            return Ok(Self::default());
        }
        let text = fs::read_to_string(&manifest)?;
        let mut sites: Vec<Site> =
            serde_json::from_str(&text).map_err(|err| Error::DatasetParse {
                dataset: manifest.display().to_string(),
                message: err.to_string(),
            })?;
        for site in &mut sites {
            if site.path.is_relative() {
                site.path = data_dir.join(&site.path);
            }
        }
        info!(sites = sites.len(), "site catalog loaded");
        Ok(Self { sites })
    }

    pub fn push(&mut self, site: Site) {
        self.sites.push(site);
    }

    pub fn sites(&self) -> &[Site] {
        &self.sites
    }

    pub fn get(&self, id: &str) -> Option<&Site> {
        self.sites.iter().find(|site| site.id == id)
    }

    /// First site covering the origin or the destination.
    pub fn select(&self, origin: &Coordinate, destination: &Coordinate) -> Option<&Site> {
        self.sites
            .iter()
            .find(|site| site.covers(origin) || site.covers(destination))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "type": "FeatureCollection",
        "features": [
            {"type": "Feature",
             "properties": {"highway": "service", "name": "Marinaweg", "oneway": "yes"},
             "geometry": {"type": "LineString", "coordinates": [[3.7216, 51.5896], [3.7220, 51.5896]]}},
            {"type": "Feature",
             "properties": {"highway": "track", "foot": "no"},
             "geometry": {"type": "LineString", "coordinates": [[3.7220, 51.5896], [3.7224, 51.5897, 2.0]]}},
            {"type": "Feature",
             "properties": {"highway": "footway"},
             "geometry": {"type": "LineString", "coordinates": [[3.7220, "oops"]]}},
            {"type": "Feature",
             "properties": {"amenity": "toilets"},
             "geometry": {"type": "Point", "coordinates": [3.7220, 51.5896]}}
        ]
    }"#;

    #[test]
    fn classifies_highway_values() {
        assert_eq!(PathClass::from_highway(Some("service")), PathClass::ServiceRoad);
        assert_eq!(PathClass::from_highway(Some("Steps")), PathClass::Steps);
        assert_eq!(PathClass::from_highway(Some("path")), PathClass::Footway);
        assert_eq!(PathClass::from_highway(None), PathClass::Mixed);
        assert_eq!(PathClass::from_highway(Some("bridleway")), PathClass::Mixed);
    }

    #[test]
    fn parses_line_strings_and_counts_rejects() {
        let dataset = parse_dataset("sample", SAMPLE).expect("sample parses");
        assert_eq!(dataset.stats.features, 4);
        assert_eq!(dataset.stats.line_strings, 3);
        assert_eq!(dataset.stats.skipped_geometries, 1);
        assert_eq!(dataset.stats.rejected, 1);
        assert_eq!(dataset.features.len(), 2);
        assert_eq!(dataset.stats.total_coordinates, 4);

        let road = &dataset.features[0];
        assert_eq!(road.class, PathClass::ServiceRoad);
        assert_eq!(road.name.as_deref(), Some("Marinaweg"));
        assert!(road.oneway);
        assert!(road.allows(TravelMode::Driving));
    }

    #[test]
    fn unreadable_features_keep_declared_counts() {
        let text = r#"{
            "type": "FeatureCollection",
            "features": [
                {"type": "Feature", "properties": {"name": "Kaiweg"},
                 "geometry": {"type": "LineString", "coordinates": [[3.7216], [3.7220, 51.5896]]}},
                {"type": "Feature", "properties": null,
                 "geometry": {"type": "LineString", "coordinates": [[3.7216, 51.5896], [3.7220, 51.5896]]}},
                {"type": "Feature", "properties": {}},
                {"type": "Feature", "properties": {}, "geometry": {"type": "Polygon", "coordinates": "broken"}}
            ]
        }"#;
        let dataset = parse_dataset("edge", text).expect("collection parses");
        assert_eq!(dataset.stats.features, 4);
        assert_eq!(dataset.stats.line_strings, 2);
        assert_eq!(dataset.stats.rejected, 1);
        assert_eq!(dataset.stats.skipped_geometries, 2);
        assert_eq!(dataset.features.len(), 1);
        assert_eq!(dataset.features[0].class, PathClass::Mixed);
    }

    #[test]
    fn explicit_access_overrides_class_defaults() {
        let dataset = parse_dataset("sample", SAMPLE).expect("sample parses");
        let track = &dataset.features[1];
        assert_eq!(track.class, PathClass::Track);
        assert!(!track.allows(TravelMode::Walking));
        assert!(track.allows(TravelMode::Driving));
    }

    #[test]
    fn rejects_non_collections() {
        let err = parse_dataset("bad", r#"{"type": "Feature"}"#).expect_err("not a collection");
        assert!(matches!(err, Error::DatasetParse { .. }));

        let err = parse_dataset("bad", "{not json").expect_err("corrupt json");
        assert!(err.to_string().contains("bad"));
    }

    #[test]
    fn missing_file_is_reported() {
        let err = load_dataset("ghost", Path::new("/definitely/not/here.geojson"))
            .expect_err("missing file");
        assert!(matches!(err, Error::DatasetNotFound { .. }));
    }

    #[test]
    fn paved_detection() {
        let coords = vec![Coordinate::new(51.0, 6.0), Coordinate::new(51.001, 6.0)];
        assert!(PathFeature::new(PathClass::ServiceRoad, coords.clone()).is_paved());
        assert!(!PathFeature::new(PathClass::Track, coords.clone()).is_paved());
        assert!(PathFeature::new(PathClass::Footway, coords)
            .with_surface("Asphalt")
            .is_paved());
    }

    #[test]
    fn catalog_selects_by_either_endpoint() {
        let catalog = SiteCatalog::new(vec![
            Site {
                id: "zuhause".into(),
                path: PathBuf::from("zuhause.geojson"),
                bounds: BoundingBox {
                    min_lat: 51.0,
                    min_lng: 6.04,
                    max_lat: 51.01,
                    max_lng: 6.06,
                },
            },
            Site {
                id: "roompot".into(),
                path: PathBuf::from("roompot.geojson"),
                bounds: BoundingBox {
                    min_lat: 51.585,
                    min_lng: 3.715,
                    max_lat: 51.595,
                    max_lng: 3.730,
                },
            },
        ]);

        let inside = Coordinate::new(51.5896, 3.7216);
        let outside = Coordinate::new(52.37, 4.89);
        assert_eq!(catalog.select(&outside, &inside).map(|s| s.id.as_str()), Some("roompot"));
        assert!(catalog.select(&outside, &outside).is_none());
        assert!(catalog.get("zuhause").is_some());
    }
}
