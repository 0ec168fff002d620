//! Microroute library entry points.
//!
//! This crate turns GeoJSON path datasets of small, dense areas (resorts,
//! campsites, residential estates) into routable graphs, solves routes on
//! them, and falls back to an external directions provider or a straight
//! line when the local network cannot give a useful answer. Consumers (the
//! CLI, services) should go through [`RoutingService`] rather than wiring the
//! stages together themselves.
//!

#![deny(warnings)]

pub mod cache;
pub mod config;
pub mod connectivity;
pub mod dataset;
pub mod error;
pub mod gateway;
pub mod geo;
pub mod graph;
pub mod instructions;
pub mod locale;
pub mod path;
pub mod quality;
pub mod routing;
pub mod spatial;

pub use cache::{CacheKey, RouteCache};
pub use config::RoutingConfig;
pub use connectivity::{analyze_dataset, ConnectivityReport, ConnectivityVerdict};
pub use dataset::{load_dataset, parse_dataset, Dataset, PathClass, PathFeature, Site, SiteCatalog};
pub use error::{Error, Result};
pub use gateway::{DirectionsProvider, ExternalRoute, GatewayFailure, GoogleDirections};
pub use crate::geo::{BoundingBox, Coordinate};
pub use graph::{build_graph, Graph, GraphBuilder, GraphStats};
pub use instructions::{Instruction, Maneuver};
pub use locale::{GermanLocale, LocaleAdapter};
pub use path::{NoPathReason, PathSolver, SolvedPath};
pub use quality::{InstructionQuality, KeywordQuality, QualityVerdict};
pub use routing::{
    Diagnostics, Provenance, RawRouteRequest, RouteErrorCode, RouteOptions, RouteRequest,
    RouteResult, RoutingService, RoutingServiceBuilder, SearchAlgorithm, TravelMode,
};
