use std::collections::{BTreeMap, HashMap, VecDeque};
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::DEFAULT_SNAP_TOLERANCE_M;
use crate::dataset::{ModeSet, PathClass, PathFeature};
use crate::geo::Coordinate;
use crate::routing::TravelMode;
use crate::spatial::{NodeId, NodeIndex};

/// Dense edge identifier, assigned in build order.
pub type EdgeId = usize;

/// Deduplicated graph vertex.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphNode {
    pub id: NodeId,
    pub position: Coordinate,
    /// Undirected connected-component id, assigned after the build.
    pub component: usize,
}

/// Directed connection between two nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphEdge {
    pub id: EdgeId,
    pub from: NodeId,
    pub to: NodeId,
    /// Full polyline in travel direction.
    pub geometry: Vec<Coordinate>,
    /// Great-circle distance between the two anchors.
    pub length_m: f64,
    pub class: PathClass,
    pub modes: ModeSet,
    pub paved: bool,
    pub name: Option<String>,
}

/// Counters collected while building a graph.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildStats {
    /// Features offered to the builder.
    pub features: usize,
    /// Features that produced at least one edge.
    pub included: usize,
    /// Features not permitted for the graph's travel mode.
    pub filtered_by_mode: usize,
    /// Features with fewer than two points or identical snapped anchors.
    pub rejected: usize,
    /// Directed edges that duplicated an existing node pair.
    pub duplicate_edges: usize,
}

/// Summary of a built graph, reported through diagnostics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphStats {
    pub mode: TravelMode,
    pub nodes: usize,
    pub edges: usize,
    pub components: usize,
    pub largest_component: usize,
    pub edges_by_class: BTreeMap<PathClass, usize>,
    pub build: BuildStats,
}

/// Mode-specific routing graph.
///
/// Nodes and edges are addressed by dense ids; the node index is kept so
/// request coordinates can be attached with the same geometry the build used.
pub struct Graph {
    mode: TravelMode,
    nodes: Vec<GraphNode>,
    edges: Vec<GraphEdge>,
    outgoing: Vec<Vec<EdgeId>>,
    index: NodeIndex,
    components: Vec<usize>,
    build_stats: BuildStats,
}

impl fmt::Debug for Graph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Graph")
            .field("mode", &self.mode)
            .field("nodes", &self.nodes.len())
            .field("edges", &self.edges.len())
            .field("build_stats", &self.build_stats)
            .finish()
    }
}

impl Graph {
    /// Travel mode that produced this graph.
    pub fn mode(&self) -> TravelMode {
        self.mode
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    pub fn nodes(&self) -> &[GraphNode] {
        &self.nodes
    }

    pub fn edges(&self) -> &[GraphEdge] {
        &self.edges
    }

    pub fn node(&self, id: NodeId) -> Option<&GraphNode> {
        self.nodes.get(id)
    }

    pub fn edge(&self, id: EdgeId) -> Option<&GraphEdge> {
        self.edges.get(id)
    }

    /// Outgoing edges of `node`.
    pub fn neighbours(&self, node: NodeId) -> impl Iterator<Item = &GraphEdge> + '_ {
        self.outgoing
            .get(node)
            .map(Vec::as_slice)
            .unwrap_or(&[])
            .iter()
            .filter_map(|&edge| self.edges.get(edge))
    }

    /// Node that a raw coordinate would merge into under the build tolerance.
    pub fn snap(&self, point: &Coordinate) -> Option<NodeId> {
        self.index.find(point)
    }

    /// Nearest node to `point` within `max_distance_m`.
    pub fn nearest_node(&self, point: &Coordinate, max_distance_m: f64) -> Option<(NodeId, f64)> {
        self.index.nearest_within(point, max_distance_m)
    }

    pub fn snap_tolerance_m(&self) -> f64 {
        self.index.tolerance_m()
    }

    pub fn build_stats(&self) -> BuildStats {
        self.build_stats
    }

    /// Sizes of the undirected components, largest first.
    pub fn component_sizes(&self) -> &[usize] {
        &self.components
    }

    pub fn stats(&self) -> GraphStats {
        let mut edges_by_class = BTreeMap::new();
        for edge in &self.edges {
            *edges_by_class.entry(edge.class).or_insert(0) += 1;
        }
        GraphStats {
            mode: self.mode,
            nodes: self.nodes.len(),
            edges: self.edges.len(),
            components: self.components.len(),
            largest_component: self.components.first().copied().unwrap_or(0),
            edges_by_class,
            build: self.build_stats,
        }
    }
}

/// Builds a [`Graph`] for one travel mode from path features.
#[derive(Debug, Clone, Copy)]
pub struct GraphBuilder {
    mode: TravelMode,
    snap_tolerance_m: f64,
}

impl GraphBuilder {
    pub fn new(mode: TravelMode) -> Self {
        Self {
            mode,
            snap_tolerance_m: DEFAULT_SNAP_TOLERANCE_M,
        }
    }

    pub fn snap_tolerance(mut self, meters: f64) -> Self {
        self.snap_tolerance_m = meters;
        self
    }

    /// Build the graph. Features not permitted for the mode never become edges.
    pub fn build(&self, features: &[PathFeature]) -> Graph {
        let mut index = NodeIndex::new(self.snap_tolerance_m);
        let mut edges: Vec<GraphEdge> = Vec::new();
        let mut by_pair: HashMap<(NodeId, NodeId), EdgeId> = HashMap::new();
        let mut stats = BuildStats {
            features: features.len(),
            ..BuildStats::default()
        };

        for feature in features {
            if !feature.allows(self.mode) {
                stats.filtered_by_mode += 1;
                continue;
            }
            let (Some(first), Some(last)) = (feature.first(), feature.last()) else {
                stats.rejected += 1;
                continue;
            };
            if feature.coordinates.len() < 2 || is_degenerate(&index, &first, &last) {
                stats.rejected += 1;
                continue;
            }

            let (from, _) = index.get_or_insert(first);
            let (to, _) = index.get_or_insert(last);
            // Between the snapped nodes, not the raw anchors.
            let length_m = match (index.position(from), index.position(to)) {
                (Some(start), Some(end)) => start.distance_to(&end),
                _ => first.distance_to(&last),
            };
            let paved = feature.is_paved();

            let mut directed = vec![(from, to, feature.coordinates.clone())];
            if !(feature.oneway && self.mode == TravelMode::Driving) {
                let mut reversed = feature.coordinates.clone();
                reversed.reverse();
                directed.push((to, from, reversed));
            }

            for (source, target, geometry) in directed {
                let edge = GraphEdge {
                    id: edges.len(),
                    from: source,
                    to: target,
                    geometry,
                    length_m,
                    class: feature.class,
                    modes: feature.modes,
                    paved,
                    name: feature.name.clone(),
                };
                match by_pair.get(&(source, target)) {
                    Some(&existing) => {
                        stats.duplicate_edges += 1;
                        if edge.length_m < edges[existing].length_m {
                            edges[existing] = GraphEdge {
                                id: existing,
                                ..edge
                            };
                        }
                    }
                    None => {
                        by_pair.insert((source, target), edge.id);
                        edges.push(edge);
                    }
                }
            }
            stats.included += 1;
        }

        let positions = index.positions().to_vec();
        let mut outgoing: Vec<Vec<EdgeId>> = vec![Vec::new(); positions.len()];
        for edge in &edges {
            outgoing[edge.from].push(edge.id);
        }

        let (assignment, components) = assign_components(positions.len(), &edges);
        let nodes = positions
            .into_iter()
            .enumerate()
            .map(|(id, position)| GraphNode {
                id,
                position,
                component: assignment[id],
            })
            .collect();

        let graph = Graph {
            mode: self.mode,
            nodes,
            edges,
            outgoing,
            index,
            components,
            build_stats: stats,
        };

        info!(
            mode = %self.mode,
            nodes = graph.node_count(),
            edges = graph.edge_count(),
            components = graph.components.len(),
            filtered_by_mode = stats.filtered_by_mode,
            rejected = stats.rejected,
            "built routing graph"
        );
        graph
    }
}

/// Build a graph with the given snapping tolerance.
pub fn build_graph(features: &[PathFeature], mode: TravelMode, snap_tolerance_m: f64) -> Graph {
    GraphBuilder::new(mode)
        .snap_tolerance(snap_tolerance_m)
        .build(features)
}

/// Whether both anchors would resolve to the same node.
fn is_degenerate(index: &NodeIndex, first: &Coordinate, last: &Coordinate) -> bool {
    match (index.find(first), index.find(last)) {
        (Some(start), Some(end)) => start == end,
        (None, None) => first.distance_to(last) < index.tolerance_m(),
        _ => false,
    }
}

/// Label undirected components with BFS.
///
/// Returns the per-node component id and component sizes; ids are ordered
/// by descending size so component 0 is always the largest.
fn assign_components(node_count: usize, edges: &[GraphEdge]) -> (Vec<usize>, Vec<usize>) {
    let mut undirected: Vec<Vec<NodeId>> = vec![Vec::new(); node_count];
    for edge in edges {
        undirected[edge.from].push(edge.to);
        undirected[edge.to].push(edge.from);
    }

    let mut raw = vec![usize::MAX; node_count];
    let mut sizes = Vec::new();
    let mut queue = VecDeque::new();
    for start in 0..node_count {
        if raw[start] != usize::MAX {
            continue;
        }
        let component = sizes.len();
        raw[start] = component;
        queue.push_back(start);
        let mut size = 0;
        while let Some(node) = queue.pop_front() {
            size += 1;
            for &next in &undirected[node] {
                if raw[next] == usize::MAX {
                    raw[next] = component;
                    queue.push_back(next);
                }
            }
        }
        sizes.push(size);
    }

    let mut order: Vec<usize> = (0..sizes.len()).collect();
    order.sort_by(|a, b| sizes[*b].cmp(&sizes[*a]).then(a.cmp(b)));
    let mut remap = vec![0; sizes.len()];
    for (rank, &component) in order.iter().enumerate() {
        remap[component] = rank;
    }
    debug!(components = sizes.len(), "labelled graph components");

    let assignment = raw.into_iter().map(|component| remap[component]).collect();
    let sorted = order.into_iter().map(|component| sizes[component]).collect();
    (assignment, sorted)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(class: PathClass, points: &[(f64, f64)]) -> PathFeature {
        PathFeature::new(
            class,
            points
                .iter()
                .map(|&(lat, lng)| Coordinate::new(lat, lng))
                .collect(),
        )
    }

    #[test]
    fn shared_endpoints_merge_into_one_node() {
        let features = vec![
            line(PathClass::Footway, &[(51.0, 6.0), (51.0005, 6.0)]),
            // Starts ~1.1 m from the previous end.
            line(PathClass::Footway, &[(51.00051, 6.0), (51.0005, 6.001)]),
        ];
        let graph = build_graph(&features, TravelMode::Walking, 2.0);
        assert_eq!(graph.node_count(), 3);
        assert_eq!(graph.edge_count(), 4);
        assert_eq!(graph.stats().components, 1);
    }

    #[test]
    fn mode_filter_omits_edges_at_build_time() {
        let features = vec![
            line(PathClass::Footway, &[(51.0, 6.0), (51.0005, 6.0)]),
            line(PathClass::ServiceRoad, &[(51.0005, 6.0), (51.001, 6.0)]),
        ];
        let driving = build_graph(&features, TravelMode::Driving, 2.0);
        assert_eq!(driving.edge_count(), 2);
        assert_eq!(driving.build_stats().filtered_by_mode, 1);
        assert!(driving.edges().iter().all(|e| e.class == PathClass::ServiceRoad));

        let walking = build_graph(&features, TravelMode::Walking, 2.0);
        assert_eq!(walking.edge_count(), 4);
    }

    #[test]
    fn degenerate_features_are_rejected() {
        let features = vec![
            line(PathClass::Footway, &[(51.0, 6.0)]),
            line(PathClass::Footway, &[(51.0, 6.0), (51.0001, 6.0001), (51.000001, 6.0)]),
        ];
        let graph = build_graph(&features, TravelMode::Walking, 2.0);
        assert_eq!(graph.edge_count(), 0);
        assert_eq!(graph.node_count(), 0);
        assert_eq!(graph.build_stats().rejected, 2);
    }

    #[test]
    fn edge_length_is_anchor_distance() {
        let features = vec![line(
            PathClass::Footway,
            &[(51.0, 6.0), (51.0005, 6.001), (51.001, 6.0)],
        )];
        let graph = build_graph(&features, TravelMode::Walking, 2.0);
        let edge = &graph.edges()[0];
        let direct = Coordinate::new(51.0, 6.0).distance_to(&Coordinate::new(51.001, 6.0));
        assert!((edge.length_m - direct).abs() < 1e-9);
        assert_eq!(edge.geometry.len(), 3);
        assert_eq!(graph.edges()[1].geometry[0], Coordinate::new(51.001, 6.0));
    }

    #[test]
    fn edge_length_uses_snapped_node_positions() {
        // The second feature starts ~1.1 m from the first one's end.
        let features = vec![
            line(PathClass::Footway, &[(51.0, 6.0), (51.001, 6.0)]),
            line(PathClass::Footway, &[(51.00101, 6.0), (51.001, 6.001)]),
        ];
        let graph = build_graph(&features, TravelMode::Walking, 2.0);
        assert_eq!(graph.node_count(), 3);

        let joined = graph
            .edges()
            .iter()
            .find(|edge| edge.from == 1 && edge.to == 2)
            .expect("edge from the shared node");
        let from_node = Coordinate::new(51.001, 6.0).distance_to(&Coordinate::new(51.001, 6.001));
        let from_raw = Coordinate::new(51.00101, 6.0).distance_to(&Coordinate::new(51.001, 6.001));
        assert!((joined.length_m - from_node).abs() < 1e-9);
        assert!((joined.length_m - from_raw).abs() > 1e-3);
        assert_eq!(joined.geometry[0], Coordinate::new(51.00101, 6.0));
    }

    #[test]
    fn oneway_only_affects_driving() {
        let mut feature = line(PathClass::ServiceRoad, &[(51.0, 6.0), (51.001, 6.0)]);
        feature.oneway = true;
        let features = vec![feature];
        assert_eq!(build_graph(&features, TravelMode::Driving, 2.0).edge_count(), 1);
        assert_eq!(build_graph(&features, TravelMode::Walking, 2.0).edge_count(), 2);
    }

    #[test]
    fn duplicate_pairs_keep_shorter_edge() {
        let features = vec![
            line(PathClass::Track, &[(51.0, 6.0), (51.001, 6.0)]),
            line(PathClass::Footway, &[(51.0, 6.0), (51.001, 6.0)]),
        ];
        let graph = build_graph(&features, TravelMode::Walking, 2.0);
        assert_eq!(graph.edge_count(), 2);
        assert_eq!(graph.build_stats().duplicate_edges, 2);
    }

    #[test]
    fn components_are_sorted_by_size() {
        let features = vec![
            line(PathClass::Footway, &[(51.0, 6.0), (51.001, 6.0)]),
            line(PathClass::Footway, &[(51.001, 6.0), (51.002, 6.0)]),
            line(PathClass::Footway, &[(52.0, 7.0), (52.001, 7.0)]),
        ];
        let graph = build_graph(&features, TravelMode::Walking, 2.0);
        assert_eq!(graph.component_sizes(), &[3, 2]);
        let stats = graph.stats();
        assert_eq!(stats.largest_component, 3);
        assert_eq!(stats.edges_by_class.get(&PathClass::Footway), Some(&6));
        let far = graph
            .snap(&Coordinate::new(52.0, 7.0))
            .and_then(|id| graph.node(id))
            .expect("far node");
        assert_eq!(far.component, 1);
    }
}
