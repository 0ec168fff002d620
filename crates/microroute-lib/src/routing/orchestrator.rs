use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::cache::{CacheKey, RouteCache};
use crate::config::RoutingConfig;
use crate::connectivity::{analyze_dataset, ConnectivityReport};
use crate::dataset::{load_dataset, Dataset, Site, SiteCatalog};
use crate::error::{Error, Result};
use crate::gateway::{DirectionsProvider, ExternalRoute, GatewayFailure, GoogleDirections};
use crate::geo::polyline_length;
use crate::graph::{build_graph, Graph, GraphStats};
use crate::instructions::{self, synthetic_instruction};
use crate::locale::{GermanLocale, LocaleAdapter};
use crate::path::PathSolver;
use crate::quality::{InstructionQuality, KeywordQuality};

use super::{
    AlternativeRoute, Provenance, RouteErrorCode, RouteRequest, RouteResult, TravelMode,
};

type GraphKey = (String, TravelMode);

/// Graph summary for one resident (site, mode) pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SiteGraphStats {
    pub site: String,
    #[serde(flatten)]
    pub stats: GraphStats,
}

/// Operational snapshot of a [`RoutingService`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostics {
    pub cache_size: usize,
    pub requests: u64,
    pub failures: u64,
    /// `failures / requests`, zero before the first request.
    pub failure_rate: f64,
    pub cache_hits: u64,
    pub external_calls: u64,
    pub provenance_counts: BTreeMap<Provenance, u64>,
    pub graphs: Vec<SiteGraphStats>,
}

#[derive(Default)]
struct Counters {
    requests: AtomicU64,
    failures: AtomicU64,
    cache_hits: AtomicU64,
    external_calls: AtomicU64,
    provenance: Mutex<BTreeMap<Provenance, u64>>,
}

impl Counters {
    fn record(&self, provenance: Provenance) {
        let mut counts = self
            .provenance
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        *counts.entry(provenance).or_insert(0) += 1;
    }
}

/// Result of the local stage.
enum LocalOutcome {
    Solved {
        result: RouteResult,
        informative: bool,
    },
    Unavailable {
        code: RouteErrorCode,
        reason: String,
    },
}

struct ServiceInner {
    config: RoutingConfig,
    catalog: SiteCatalog,
    datasets: RwLock<HashMap<String, Arc<Dataset>>>,
    graphs: RwLock<HashMap<GraphKey, Arc<Graph>>>,
    cache: RouteCache,
    provider: Option<Arc<dyn DirectionsProvider>>,
    quality: Box<dyn InstructionQuality>,
    locale: Box<dyn LocaleAdapter>,
    counters: Counters,
}

/// Routing orchestrator.
///
/// Owns the result cache, the resident graphs, and the external provider.
/// Cheap to clone; clones share all state.
///
/// Stages: cache check, local solve, locale adaptation, quality check,
/// external upgrade, synthetic fallback. Preference between degraded results is strict:
/// external, then the local backup, then a straight line.
#[derive(Clone)]
pub struct RoutingService {
    inner: Arc<ServiceInner>,
}

enum ProviderChoice {
    Default,
    Custom(Arc<dyn DirectionsProvider>),
    Disabled,
}

/// Builder for [`RoutingService`].
pub struct RoutingServiceBuilder {
    config: RoutingConfig,
    catalog: Option<SiteCatalog>,
    preloaded: Vec<(Site, Dataset)>,
    provider: ProviderChoice,
    quality: Box<dyn InstructionQuality>,
    locale: Box<dyn LocaleAdapter>,
}

impl RoutingServiceBuilder {
    /// Use an explicit catalog instead of reading `sites.json`.
    pub fn catalog(mut self, catalog: SiteCatalog) -> Self {
        self.catalog = Some(catalog);
        self
    }

    /// Register a site whose dataset is already in memory.
    pub fn dataset(mut self, site: Site, dataset: Dataset) -> Self {
        self.preloaded.push((site, dataset));
        self
    }

    pub fn provider(mut self, provider: Arc<dyn DirectionsProvider>) -> Self {
        self.provider = ProviderChoice::Custom(provider);
        self
    }

    /// Never call an external provider.
    pub fn without_provider(mut self) -> Self {
        self.provider = ProviderChoice::Disabled;
        self
    }

    pub fn quality(mut self, quality: impl InstructionQuality + 'static) -> Self {
        self.quality = Box::new(quality);
        self
    }

    pub fn locale(mut self, locale: impl LocaleAdapter + 'static) -> Self {
        self.locale = Box::new(locale);
        self
    }

    pub fn build(self) -> Result<RoutingService> {
        let mut catalog = match self.catalog {
            Some(catalog) => catalog,
            None if !self.preloaded.is_empty() => SiteCatalog::default(),
            None => SiteCatalog::load(&self.config.resolve_data_dir()?)?,
        };

        let mut datasets = HashMap::new();
        for (site, dataset) in self.preloaded {
            datasets.insert(site.id.clone(), Arc::new(dataset));
            if catalog.get(&site.id).is_none() {
                catalog.push(site);
            }
        }

        let provider: Option<Arc<dyn DirectionsProvider>> = match self.provider {
            ProviderChoice::Default => Some(Arc::new(GoogleDirections::new(&self.config)?)),
            ProviderChoice::Custom(provider) => Some(provider),
            ProviderChoice::Disabled => None,
        };

        info!(
            sites = catalog.sites().len(),
            external = provider.is_some(),
            "routing service ready"
        );

        Ok(RoutingService {
            inner: Arc::new(ServiceInner {
                cache: RouteCache::new(self.config.cache_ttl, self.config.cache_capacity),
                config: self.config,
                catalog,
                datasets: RwLock::new(datasets),
                graphs: RwLock::new(HashMap::new()),
                provider,
                quality: self.quality,
                locale: self.locale,
                counters: Counters::default(),
            }),
        })
    }
}

impl RoutingService {
    pub fn builder(config: RoutingConfig) -> RoutingServiceBuilder {
        RoutingServiceBuilder {
            config,
            catalog: None,
            preloaded: Vec::new(),
            provider: ProviderChoice::Default,
            quality: Box::new(KeywordQuality::german()),
            locale: Box::new(GermanLocale),
        }
    }

    /// Service with the site catalog from the configured data directory and
    /// the Google provider.
    pub fn from_config(config: RoutingConfig) -> Result<Self> {
        Self::builder(config).build()
    }

    pub fn config(&self) -> &RoutingConfig {
        &self.inner.config
    }

    pub fn catalog(&self) -> &SiteCatalog {
        &self.inner.catalog
    }

    /// Compute a route. Only invalid input is an error; every valid request
    /// yields a [`RouteResult`], degraded if necessary.
    pub fn calculate_route(&self, request: &RouteRequest) -> Result<RouteResult> {
        request.validate()?;
        let counters = &self.inner.counters;
        counters.requests.fetch_add(1, Ordering::Relaxed);

        let key = CacheKey::for_request(request);
        let generation = self.inner.cache.generation();
        if let Some(mut cached) = self.inner.cache.get(&key) {
            counters.cache_hits.fetch_add(1, Ordering::Relaxed);
            debug!(key = key.as_str(), provenance = %cached.provenance, "route cache hit");
            cached.cached = true;
            return Ok(cached);
        }

        let result = self.resolve(request);
        if !result.success {
            counters.failures.fetch_add(1, Ordering::Relaxed);
        }
        counters.record(result.provenance);
        info!(
            mode = %request.mode,
            provenance = %result.provenance,
            confidence = result.confidence,
            distance_m = result.distance_m,
            "route resolved"
        );

        self.inner.cache.insert_for(generation, key, result.clone());
        Ok(result)
    }

    /// Local results arrive already localized; the quality check judges the
    /// text the caller would see.
    fn resolve(&self, request: &RouteRequest) -> RouteResult {
        let (backup, local_code, reason) = match self.solve_locally(request) {
            LocalOutcome::Solved {
                result,
                informative: true,
            } => return result,
            LocalOutcome::Solved {
                result,
                informative: false,
            } => {
                debug!("local instructions are generic; trying external upgrade");
                (Some(result), None, "local instructions are generic".to_string())
            }
            LocalOutcome::Unavailable { code, reason } => {
                debug!(code = ?code, %reason, "local solve unavailable");
                (None, Some(code), reason)
            }
        };

        let failure = match self.call_external(request) {
            Ok(route) => {
                let result = external_result(route, &reason);
                return self.localize(result, request.mode);
            }
            Err(failure) => failure,
        };

        if let Some(mut backup) = backup {
            backup.provenance = Provenance::LocalBackup;
            backup.confidence = Provenance::LocalBackup.base_confidence();
            backup.error = Some(RouteErrorCode::ExternalUnavailable);
            backup.message = Some(failure.to_string());
            backup.fallback_reason = Some(reason);
            return backup;
        }

        let code = local_code.unwrap_or(RouteErrorCode::ExternalUnavailable);
        let result = synthetic_result(request, code, &reason, &failure);
        self.localize(result, request.mode)
    }

    fn solve_locally(&self, request: &RouteRequest) -> LocalOutcome {
        let Some(site) = self
            .inner
            .catalog
            .select(&request.origin, &request.destination)
        else {
            return LocalOutcome::Unavailable {
                code: RouteErrorCode::NoLocalNetwork,
                reason: "no site covers the origin or destination".to_string(),
            };
        };

        let graph = match self.graph_for(site, request.mode) {
            Ok(graph) => graph,
            Err(err) => {
                warn!(site = %site.id, error = %err, "could not build local graph");
                return LocalOutcome::Unavailable {
                    code: RouteErrorCode::DatasetError,
                    reason: err.to_string(),
                };
            }
        };

        let solver = PathSolver::new(&graph).max_snap_distance(self.inner.config.max_snap_distance_m);
        let paths = match solver.solve_with_alternatives(
            &request.origin,
            &request.destination,
            &request.options,
        ) {
            Ok(paths) => paths,
            Err(reason) => {
                return LocalOutcome::Unavailable {
                    code: RouteErrorCode::NoPathFound,
                    reason: reason.to_string(),
                }
            }
        };

        let mut paths = paths.into_iter();
        let Some(primary) = paths.next() else {
            return LocalOutcome::Unavailable {
                code: RouteErrorCode::NoPathFound,
                reason: "solver returned no path".to_string(),
            };
        };

        let generated = instructions::generate(&graph, &primary, request.mode);
        let instructions = self.inner.locale.adapt(&generated, request.mode);
        let informative = !self.inner.quality.is_generic(&instructions);
        let alternatives = paths
            .map(|path| AlternativeRoute {
                duration_s: request.mode.estimate_duration(path.distance_m),
                distance_m: path.distance_m,
                geometry: path.geometry,
            })
            .collect();

        let result = RouteResult {
            success: true,
            duration_s: request.mode.estimate_duration(primary.distance_m),
            distance_m: primary.distance_m,
            geometry: primary.geometry,
            instructions,
            provenance: Provenance::Local,
            confidence: Provenance::Local.base_confidence(),
            error: None,
            message: None,
            fallback_reason: None,
            alternatives,
            cached: false,
        };
        LocalOutcome::Solved {
            result,
            informative,
        }
    }

    fn call_external(
        &self,
        request: &RouteRequest,
    ) -> std::result::Result<ExternalRoute, GatewayFailure> {
        let Some(provider) = self.inner.provider.as_ref() else {
            return Err(GatewayFailure::MissingCredentials);
        };
        self.inner
            .counters
            .external_calls
            .fetch_add(1, Ordering::Relaxed);
        debug!(provider = provider.name(), "calling external directions");
        provider.directions(&request.origin, &request.destination, request.mode)
    }

    fn localize(&self, mut result: RouteResult, mode: TravelMode) -> RouteResult {
        result.instructions = self.inner.locale.adapt(&result.instructions, mode);
        result
    }

    /// Resident graph for a site and mode, building it on first use.
    fn graph_for(&self, site: &Site, mode: TravelMode) -> Result<Arc<Graph>> {
        let key = (site.id.clone(), mode);
        if let Some(graph) = self.read_graphs().get(&key) {
            return Ok(Arc::clone(graph));
        }

        let dataset = self.dataset_for(site)?;
        let graph = Arc::new(build_graph(
            &dataset.features,
            mode,
            self.inner.config.snap_tolerance_m,
        ));
        let mut graphs = self.write_graphs();
        Ok(Arc::clone(graphs.entry(key).or_insert(graph)))
    }

    fn dataset_for(&self, site: &Site) -> Result<Arc<Dataset>> {
        if let Some(dataset) = self
            .inner
            .datasets
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&site.id)
        {
            return Ok(Arc::clone(dataset));
        }
        let dataset = Arc::new(load_dataset(&site.id, &site.path)?);
        let mut datasets = self
            .inner
            .datasets
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        Ok(Arc::clone(
            datasets.entry(site.id.clone()).or_insert(dataset),
        ))
    }

    fn read_graphs(&self) -> std::sync::RwLockReadGuard<'_, HashMap<GraphKey, Arc<Graph>>> {
        self.inner
            .graphs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn write_graphs(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<GraphKey, Arc<Graph>>> {
        self.inner
            .graphs
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Replace a site's dataset and rebuild its graphs for every mode.
    ///
    /// Graphs are built before the swap; concurrent requests see either the
    /// previous graphs or the complete new set. The result cache is cleared
    /// after the swap, and routes still in flight from before the clear are
    /// not cached.
    pub fn replace_dataset(&self, site_id: &str, dataset: Dataset) -> Result<()> {
        if self.inner.catalog.get(site_id).is_none() {
            return Err(Error::UnknownSite {
                id: site_id.to_string(),
            });
        }

        let tolerance = self.inner.config.snap_tolerance_m;
        let rebuilt: Vec<(GraphKey, Arc<Graph>)> = TravelMode::ALL
            .iter()
            .map(|&mode| {
                let graph = build_graph(&dataset.features, mode, tolerance);
                ((site_id.to_string(), mode), Arc::new(graph))
            })
            .collect();

        {
            let mut graphs = self.write_graphs();
            for (key, graph) in rebuilt {
                graphs.insert(key, graph);
            }
        }
        self.inner
            .datasets
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(site_id.to_string(), Arc::new(dataset));
        self.inner.cache.clear();

        info!(site = site_id, "site graphs replaced");
        Ok(())
    }

    /// Re-read a site's dataset from disk and replace its graphs.
    pub fn reload_site(&self, site_id: &str) -> Result<()> {
        let site = self
            .inner
            .catalog
            .get(site_id)
            .ok_or_else(|| Error::UnknownSite {
                id: site_id.to_string(),
            })?;
        let dataset = load_dataset(&site.id, &site.path)?;
        self.replace_dataset(site_id, dataset)
    }

    /// Graph statistics for a site and mode, building the graph if needed.
    pub fn graph_stats(&self, site_id: &str, mode: TravelMode) -> Result<GraphStats> {
        let site = self
            .inner
            .catalog
            .get(site_id)
            .ok_or_else(|| Error::UnknownSite {
                id: site_id.to_string(),
            })?;
        Ok(self.graph_for(site, mode)?.stats())
    }

    /// Connectivity audit of a site's dataset.
    pub fn analyze_connectivity(&self, site_id: &str) -> Result<ConnectivityReport> {
        let site = self
            .inner
            .catalog
            .get(site_id)
            .ok_or_else(|| Error::UnknownSite {
                id: site_id.to_string(),
            })?;
        let dataset = self.dataset_for(site)?;
        Ok(analyze_dataset(&dataset, self.inner.config.snap_tolerance_m))
    }

    pub fn diagnostics(&self) -> Diagnostics {
        let counters = &self.inner.counters;
        let requests = counters.requests.load(Ordering::Relaxed);
        let failures = counters.failures.load(Ordering::Relaxed);

        let mut graphs: Vec<SiteGraphStats> = self
            .read_graphs()
            .iter()
            .map(|((site, _), graph)| SiteGraphStats {
                site: site.clone(),
                stats: graph.stats(),
            })
            .collect();
        graphs.sort_by(|a, b| a.site.cmp(&b.site).then(a.stats.mode.cmp(&b.stats.mode)));

        Diagnostics {
            cache_size: self.inner.cache.len(),
            requests,
            failures,
            failure_rate: if requests == 0 {
                0.0
            } else {
                failures as f64 / requests as f64
            },
            cache_hits: counters.cache_hits.load(Ordering::Relaxed),
            external_calls: counters.external_calls.load(Ordering::Relaxed),
            provenance_counts: counters
                .provenance
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone(),
            graphs,
        }
    }
}

fn external_result(route: ExternalRoute, reason: &str) -> RouteResult {
    RouteResult {
        success: true,
        geometry: route.geometry,
        distance_m: route.distance_m,
        duration_s: route.duration_s,
        instructions: route.instructions,
        provenance: Provenance::External,
        confidence: route.confidence.clamp(0.0, 1.0),
        error: None,
        message: None,
        fallback_reason: Some(reason.to_string()),
        alternatives: Vec::new(),
        cached: false,
    }
}

fn synthetic_result(
    request: &RouteRequest,
    code: RouteErrorCode,
    reason: &str,
    failure: &GatewayFailure,
) -> RouteResult {
    let geometry = vec![request.origin, request.destination];
    let distance_m = polyline_length(&geometry);
    if !distance_m.is_finite() {
        return RouteResult::exhausted(format!("{reason}; {failure}"));
    }
    RouteResult {
        success: true,
        geometry,
        distance_m,
        duration_s: request.mode.estimate_duration(distance_m),
        instructions: vec![synthetic_instruction(distance_m)],
        provenance: Provenance::Synthetic,
        confidence: Provenance::Synthetic.base_confidence(),
        error: Some(code),
        message: Some(format!("external directions unavailable: {failure}")),
        fallback_reason: Some(reason.to_string()),
        alternatives: Vec::new(),
        cached: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{PathClass, PathFeature};
    use crate::geo::{BoundingBox, Coordinate};
    use crate::instructions::{Instruction, Maneuver};
    use crate::quality::QualityVerdict;
    use std::path::PathBuf;
    use std::sync::atomic::AtomicUsize;
    use std::sync::OnceLock;

    fn site() -> Site {
        Site {
            id: "test".into(),
            path: PathBuf::from("unused.geojson"),
            bounds: BoundingBox {
                min_lat: 50.99,
                min_lng: 5.99,
                max_lat: 51.01,
                max_lng: 6.01,
            },
        }
    }

    fn service(features: Vec<PathFeature>) -> RoutingService {
        RoutingService::builder(RoutingConfig::default())
            .dataset(site(), Dataset::from_features("test", features))
            .without_provider()
            .build()
            .expect("service builds")
    }

    #[test]
    fn informative_local_route_is_returned_directly() {
        let svc = service(vec![PathFeature::new(
            PathClass::Footway,
            vec![Coordinate::new(51.0, 6.0), Coordinate::new(51.0007, 6.0)],
        )]);
        let request = RouteRequest::new(
            Coordinate::new(51.0, 6.0),
            Coordinate::new(51.0007, 6.0),
            TravelMode::Walking,
        );
        let result = svc.calculate_route(&request).expect("valid request");
        assert!(result.success);
        assert_eq!(result.provenance, Provenance::Local);
        assert_eq!(result.confidence, 0.8);
        assert_eq!(svc.diagnostics().external_calls, 0);
    }

    #[test]
    fn trivial_path_without_provider_keeps_local_backup() {
        let svc = service(vec![PathFeature::new(
            PathClass::Footway,
            vec![Coordinate::new(51.0, 6.0), Coordinate::new(51.001, 6.0)],
        )]);
        let request = RouteRequest::new(
            Coordinate::new(51.0, 6.0),
            Coordinate::new(51.0001, 6.0),
            TravelMode::Walking,
        );
        let result = svc.calculate_route(&request).expect("valid request");
        assert_eq!(result.provenance, Provenance::LocalBackup);
        assert_eq!(result.confidence, 0.7);
        assert_eq!(result.error, Some(RouteErrorCode::ExternalUnavailable));
    }

    /// Marks every text it adapts so the quality check can tell.
    struct MarkingLocale;

    impl LocaleAdapter for MarkingLocale {
        fn language(&self) -> &str {
            "x-marked"
        }

        fn adapt_text(&self, text: &str, _mode: TravelMode) -> String {
            if text.starts_with("[m] ") {
                text.to_string()
            } else {
                format!("[m] {text}")
            }
        }
    }

    /// Records the texts it is asked to judge.
    #[derive(Clone, Default)]
    struct RecordingQuality {
        seen: Arc<Mutex<Vec<String>>>,
    }

    impl InstructionQuality for RecordingQuality {
        fn assess(&self, instructions: &[Instruction]) -> QualityVerdict {
            let mut seen = self.seen.lock().expect("lock");
            seen.extend(instructions.iter().map(|i| i.text.clone()));
            QualityVerdict::Informative
        }
    }

    #[test]
    fn quality_is_judged_on_localized_text() {
        let quality = RecordingQuality::default();
        let svc = RoutingService::builder(RoutingConfig::default())
            .dataset(
                site(),
                Dataset::from_features(
                    "test",
                    vec![PathFeature::new(
                        PathClass::Footway,
                        vec![Coordinate::new(51.0, 6.0), Coordinate::new(51.0007, 6.0)],
                    )],
                ),
            )
            .without_provider()
            .quality(quality.clone())
            .locale(MarkingLocale)
            .build()
            .expect("service builds");
        let request = RouteRequest::new(
            Coordinate::new(51.0, 6.0),
            Coordinate::new(51.0007, 6.0),
            TravelMode::Walking,
        );
        let result = svc.calculate_route(&request).expect("valid request");

        let seen = quality.seen.lock().expect("lock").clone();
        assert!(!seen.is_empty());
        assert!(seen.iter().all(|text| text.starts_with("[m] ")));
        // Adapted once only.
        assert!(result
            .instructions
            .iter()
            .all(|i| i.text.starts_with("[m] ") && !i.text.starts_with("[m] [m] ")));
    }

    #[test]
    fn generic_german_local_route_still_escalates() {
        let svc = service(vec![PathFeature::new(
            PathClass::Footway,
            vec![Coordinate::new(51.0, 6.0), Coordinate::new(51.001, 6.0)],
        )]);
        let request = RouteRequest::new(
            Coordinate::new(51.0, 6.0),
            Coordinate::new(51.0001, 6.0),
            TravelMode::Walking,
        );
        let result = svc.calculate_route(&request).expect("valid request");
        assert_eq!(result.provenance, Provenance::LocalBackup);
        assert_eq!(
            result.fallback_reason.as_deref(),
            Some("local instructions are generic")
        );
    }

    /// Replaces the site dataset from inside the external call, while the
    /// request that triggered it is still in flight.
    struct ReplacingProvider {
        service: OnceLock<RoutingService>,
        calls: AtomicUsize,
    }

    impl DirectionsProvider for ReplacingProvider {
        fn name(&self) -> &str {
            "replacing"
        }

        fn directions(
            &self,
            origin: &Coordinate,
            destination: &Coordinate,
            _mode: TravelMode,
        ) -> std::result::Result<ExternalRoute, GatewayFailure> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(service) = self.service.get() {
                service
                    .replace_dataset("test", Dataset::from_features("test", Vec::new()))
                    .expect("known site");
            }
            Ok(ExternalRoute {
                geometry: vec![*origin, *destination],
                distance_m: origin.distance_to(destination),
                duration_s: 60.0,
                instructions: vec![Instruction::new("Links abbiegen", Maneuver::TurnLeft, 10.0)],
                confidence: 0.9,
            })
        }
    }

    #[test]
    fn route_finished_after_replacement_is_not_cached() {
        let provider = Arc::new(ReplacingProvider {
            service: OnceLock::new(),
            calls: AtomicUsize::new(0),
        });
        let svc = RoutingService::builder(RoutingConfig::default())
            .dataset(site(), Dataset::from_features("test", Vec::new()))
            .provider(provider.clone())
            .build()
            .expect("service builds");
        assert!(provider.service.set(svc.clone()).is_ok());

        let request = RouteRequest::new(
            Coordinate::new(52.0, 7.0),
            Coordinate::new(52.001, 7.0),
            TravelMode::Walking,
        );
        let first = svc.calculate_route(&request).expect("valid request");
        assert_eq!(first.provenance, Provenance::External);
        assert_eq!(svc.diagnostics().cache_size, 0);

        let second = svc.calculate_route(&request).expect("valid request");
        assert!(!second.cached);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn unknown_site_is_an_error() {
        let svc = service(Vec::new());
        assert!(matches!(
            svc.analyze_connectivity("nowhere"),
            Err(Error::UnknownSite { .. })
        ));
        assert!(svc.reload_site("nowhere").is_err());
    }

    #[test]
    fn invalid_request_is_rejected_before_counting() {
        let svc = service(Vec::new());
        let request = RouteRequest::new(
            Coordinate::new(f64::NAN, 6.0),
            Coordinate::new(51.0, 6.0),
            TravelMode::Walking,
        );
        let err = svc.calculate_route(&request).expect_err("invalid");
        assert!(err.is_validation());
        assert_eq!(svc.diagnostics().requests, 0);
    }
}
