use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::DEFAULT_MAX_SNAP_DISTANCE_M;
use crate::dataset::PathClass;
use crate::geo::Coordinate;
use crate::graph::{EdgeId, Graph, GraphEdge};
use crate::routing::{RouteOptions, SearchAlgorithm, TravelMode, MAX_ALTERNATIVES};
use crate::spatial::NodeId;

/// Extra cost factor applied to unpaved edges when paved surfaces are preferred.
const UNPAVED_PENALTY: f64 = 1.5;

/// Factor applied to edges of a previous path when searching alternatives.
const ALTERNATIVE_PENALTY: f64 = 2.0;

/// Request endpoint, used to report which side failed to snap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Endpoint {
    Origin,
    Destination,
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Origin => f.write_str("origin"),
            Endpoint::Destination => f.write_str("destination"),
        }
    }
}

/// Why the solver could not produce a path. Not an error: the orchestrator
/// escalates on it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum NoPathReason {
    /// The graph has no edges for this mode.
    EmptyGraph,
    /// An endpoint is farther than the snap radius from every node.
    NoNearbyNode { endpoint: Endpoint, max_distance_m: f64 },
    /// Both endpoints snapped but no permitted path connects them.
    Unreachable { from: NodeId, to: NodeId },
}

impl fmt::Display for NoPathReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NoPathReason::EmptyGraph => f.write_str("no edges available for this travel mode"),
            NoPathReason::NoNearbyNode {
                endpoint,
                max_distance_m,
            } => write!(f, "{endpoint} is more than {max_distance_m:.0} m from the path network"),
            NoPathReason::Unreachable { from, to } => {
                write!(f, "no connection between node {from} and node {to}")
            }
        }
    }
}

/// Mode-specific edge cost model.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CostModel {
    pub mode: TravelMode,
    pub avoid_steps: bool,
    pub prefer_paved: bool,
}

impl CostModel {
    pub fn new(mode: TravelMode, options: &RouteOptions) -> Self {
        Self {
            mode,
            avoid_steps: options.avoid_steps,
            prefer_paved: options.prefer_paved,
        }
    }

    /// Effective-cost multiplier for a path class.
    pub fn multiplier(mode: TravelMode, class: PathClass) -> f64 {
        match (mode, class) {
            (TravelMode::Walking, PathClass::Steps) => 1.3,
            (TravelMode::Walking, PathClass::Cycleway | PathClass::Track) => 1.1,
            (TravelMode::Walking, _) => 1.0,
            (TravelMode::Cycling, PathClass::ServiceRoad) => 1.0,
            (TravelMode::Cycling, PathClass::Cycleway) => 0.9,
            (TravelMode::Cycling, PathClass::Track) => 1.2,
            (TravelMode::Cycling, PathClass::Mixed) => 1.1,
            (TravelMode::Cycling, _) => 1.5,
            (TravelMode::Driving, PathClass::ServiceRoad) => 0.8,
            (TravelMode::Driving, PathClass::Track) => 1.3,
            (TravelMode::Driving, PathClass::Mixed) => 1.0,
            (TravelMode::Driving, _) => 1.5,
        }
    }

    /// Smallest multiplier of the mode; scales the A* heuristic.
    pub fn min_multiplier(mode: TravelMode) -> f64 {
        match mode {
            TravelMode::Walking => 1.0,
            TravelMode::Cycling => 0.9,
            TravelMode::Driving => 0.8,
        }
    }

    /// Cost of traversing `edge`, or `None` when the edge must not be used.
    pub fn edge_cost(&self, edge: &GraphEdge) -> Option<f64> {
        if self.avoid_steps && edge.class == PathClass::Steps {
            return None;
        }
        let mut cost = edge.length_m * Self::multiplier(self.mode, edge.class);
        if self.prefer_paved && !edge.paved {
            cost *= UNPAVED_PENALTY;
        }
        Some(cost)
    }
}

/// A solved path over a graph.
#[derive(Debug, Clone, PartialEq)]
pub struct SolvedPath {
    pub nodes: Vec<NodeId>,
    pub edges: Vec<EdgeId>,
    pub geometry: Vec<Coordinate>,
    /// Sum of raw edge lengths, or the direct request distance for a
    /// zero-edge path.
    pub distance_m: f64,
    /// Weighted cost the search minimised.
    pub cost: f64,
}

impl SolvedPath {
    /// Origin and destination snapped to the same node.
    pub fn is_trivial(&self) -> bool {
        self.edges.is_empty()
    }
}

/// Shortest-path solver over a built [`Graph`].
pub struct PathSolver<'a> {
    graph: &'a Graph,
    max_snap_distance_m: f64,
}

impl<'a> PathSolver<'a> {
    pub fn new(graph: &'a Graph) -> Self {
        Self {
            graph,
            max_snap_distance_m: DEFAULT_MAX_SNAP_DISTANCE_M,
        }
    }

    pub fn max_snap_distance(mut self, meters: f64) -> Self {
        self.max_snap_distance_m = meters;
        self
    }

    /// Attach a request coordinate to its nearest node.
    pub fn snap(&self, point: &Coordinate, endpoint: Endpoint) -> Result<NodeId, NoPathReason> {
        self.graph
            .nearest_node(point, self.max_snap_distance_m)
            .map(|(node, _)| node)
            .ok_or(NoPathReason::NoNearbyNode {
                endpoint,
                max_distance_m: self.max_snap_distance_m,
            })
    }

    /// Lowest-cost path between two coordinates.
    pub fn solve(
        &self,
        origin: &Coordinate,
        destination: &Coordinate,
        options: &RouteOptions,
    ) -> Result<SolvedPath, NoPathReason> {
        let single = RouteOptions {
            alternatives: 0,
            ..*options
        };
        let mut paths = self.solve_with_alternatives(origin, destination, &single)?;
        paths.truncate(1);
        paths.pop().ok_or(NoPathReason::EmptyGraph)
    }

    /// Primary path followed by up to `options.alternatives` distinct extras.
    ///
    /// Alternatives use the penalty method: every edge of a found path costs
    /// twice as much in the next round.
    pub fn solve_with_alternatives(
        &self,
        origin: &Coordinate,
        destination: &Coordinate,
        options: &RouteOptions,
    ) -> Result<Vec<SolvedPath>, NoPathReason> {
        if self.graph.is_empty() {
            return Err(NoPathReason::EmptyGraph);
        }
        let start = self.snap(origin, Endpoint::Origin)?;
        let goal = self.snap(destination, Endpoint::Destination)?;

        if start == goal {
            return Ok(vec![SolvedPath {
                nodes: vec![start],
                edges: Vec::new(),
                geometry: vec![*origin, *destination],
                distance_m: origin.distance_to(destination),
                cost: 0.0,
            }]);
        }

        let model = CostModel::new(self.graph.mode(), options);
        let mut penalties: HashMap<EdgeId, f64> = HashMap::new();
        let primary = self
            .search(start, goal, &model, options.algorithm, &penalties)
            .ok_or(NoPathReason::Unreachable {
                from: start,
                to: goal,
            })?;
        let mut paths = vec![self.assemble(start, &primary, &model)];

        let wanted = options.alternatives.min(MAX_ALTERNATIVES);
        let mut attempts = 0;
        let mut last = primary;
        while paths.len() <= wanted && attempts < wanted * 2 {
            attempts += 1;
            for edge in &last {
                *penalties.entry(*edge).or_insert(1.0) *= ALTERNATIVE_PENALTY;
            }
            let Some(candidate) = self.search(start, goal, &model, options.algorithm, &penalties)
            else {
                break;
            };
            if !paths.iter().any(|path| path.edges == candidate) {
                paths.push(self.assemble(start, &candidate, &model));
            }
            last = candidate;
        }

        debug!(
            start,
            goal,
            algorithm = %options.algorithm,
            paths = paths.len(),
            "solved local path"
        );
        Ok(paths)
    }

    fn search(
        &self,
        start: NodeId,
        goal: NodeId,
        model: &CostModel,
        algorithm: SearchAlgorithm,
        penalties: &HashMap<EdgeId, f64>,
    ) -> Option<Vec<EdgeId>> {
        match algorithm {
            SearchAlgorithm::Dijkstra => {
                find_path_dijkstra(self.graph, start, goal, model, penalties)
            }
            SearchAlgorithm::AStar => find_path_a_star(self.graph, start, goal, model, penalties),
        }
    }

    fn assemble(&self, start: NodeId, edges: &[EdgeId], model: &CostModel) -> SolvedPath {
        let mut nodes = vec![start];
        let mut geometry: Vec<Coordinate> = Vec::new();
        let mut distance_m = 0.0;
        let mut cost = 0.0;
        for edge in edges.iter().filter_map(|&id| self.graph.edge(id)) {
            nodes.push(edge.to);
            let skip = usize::from(!geometry.is_empty());
            geometry.extend(edge.geometry.iter().skip(skip).copied());
            distance_m += edge.length_m;
            cost += model.edge_cost(edge).unwrap_or(0.0);
        }
        SolvedPath {
            nodes,
            edges: edges.to_vec(),
            geometry,
            distance_m,
            cost,
        }
    }
}

fn edge_weight(model: &CostModel, penalties: &HashMap<EdgeId, f64>, edge: &GraphEdge) -> Option<f64> {
    let base = model.edge_cost(edge)?;
    Some(base * penalties.get(&edge.id).copied().unwrap_or(1.0))
}

/// Run Dijkstra's algorithm, returning the edge sequence of the cheapest path.
pub fn find_path_dijkstra(
    graph: &Graph,
    start: NodeId,
    goal: NodeId,
    model: &CostModel,
    penalties: &HashMap<EdgeId, f64>,
) -> Option<Vec<EdgeId>> {
    let mut distances = vec![f64::INFINITY; graph.node_count()];
    let mut parents: Vec<Option<EdgeId>> = vec![None; graph.node_count()];
    let mut queue = BinaryHeap::new();

    *distances.get_mut(start)? = 0.0;
    queue.push(QueueEntry::new(start, 0.0));

    while let Some(entry) = queue.pop() {
        if entry.cost.0 > distances[entry.node] {
            continue;
        }
        if entry.node == goal {
            return Some(reconstruct_path(graph, &parents, start, goal));
        }

        for edge in graph.neighbours(entry.node) {
            let Some(weight) = edge_weight(model, penalties, edge) else {
                continue;
            };
            let next_cost = entry.cost.0 + weight;
            if next_cost < distances[edge.to] {
                distances[edge.to] = next_cost;
                parents[edge.to] = Some(edge.id);
                queue.push(QueueEntry::new(edge.to, next_cost));
            }
        }
    }

    None
}

/// Run A* with a great-circle heuristic scaled by the cheapest multiplier of
/// the mode. Edge lengths are measured between node positions, so the
/// heuristic stays consistent even where anchors were snapped.
pub fn find_path_a_star(
    graph: &Graph,
    start: NodeId,
    goal: NodeId,
    model: &CostModel,
    penalties: &HashMap<EdgeId, f64>,
) -> Option<Vec<EdgeId>> {
    let goal_position = graph.node(goal)?.position;
    let scale = CostModel::min_multiplier(model.mode);
    let heuristic = |node: NodeId| {
        graph
            .node(node)
            .map(|n| n.position.distance_to(&goal_position) * scale)
            .unwrap_or(0.0)
    };

    let mut g_score = vec![f64::INFINITY; graph.node_count()];
    let mut parents: Vec<Option<EdgeId>> = vec![None; graph.node_count()];
    let mut queue = BinaryHeap::new();

    *g_score.get_mut(start)? = 0.0;
    queue.push(AStarEntry::new(start, 0.0, heuristic(start)));

    while let Some(entry) = queue.pop() {
        if entry.cost.0 > g_score[entry.node] {
            continue;
        }
        if entry.node == goal {
            return Some(reconstruct_path(graph, &parents, start, goal));
        }

        for edge in graph.neighbours(entry.node) {
            let Some(weight) = edge_weight(model, penalties, edge) else {
                continue;
            };
            let tentative_g = entry.cost.0 + weight;
            if tentative_g < g_score[edge.to] {
                g_score[edge.to] = tentative_g;
                parents[edge.to] = Some(edge.id);
                queue.push(AStarEntry::new(edge.to, tentative_g, heuristic(edge.to)));
            }
        }
    }

    None
}

fn reconstruct_path(
    graph: &Graph,
    parents: &[Option<EdgeId>],
    start: NodeId,
    goal: NodeId,
) -> Vec<EdgeId> {
    let mut path = Vec::new();
    let mut current = goal;
    while current != start {
        let Some(edge) = parents[current].and_then(|id| graph.edge(id)) else {
            break;
        };
        path.push(edge.id);
        current = edge.from;
    }
    path.reverse();
    path
}

#[derive(Copy, Clone, Debug, Default)]
struct FloatOrd(f64);

impl PartialEq for FloatOrd {
    fn eq(&self, other: &Self) -> bool {
        self.0.eq(&other.0)
    }
}

impl Eq for FloatOrd {}

impl PartialOrd for FloatOrd {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for FloatOrd {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
struct QueueEntry {
    node: NodeId,
    cost: FloatOrd,
}

impl QueueEntry {
    fn new(node: NodeId, cost: f64) -> Self {
        Self {
            node,
            cost: FloatOrd(cost),
        }
    }
}

impl Ord for QueueEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse ordering so BinaryHeap becomes a min-heap by cost.
        other
            .cost
            .cmp(&self.cost)
            .then_with(|| other.node.cmp(&self.node))
    }
}

impl PartialOrd for QueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
struct AStarEntry {
    node: NodeId,
    cost: FloatOrd,
    estimate: FloatOrd,
}

impl AStarEntry {
    fn new(node: NodeId, cost: f64, heuristic: f64) -> Self {
        Self {
            node,
            cost: FloatOrd(cost),
            estimate: FloatOrd(cost + heuristic),
        }
    }
}

impl Ord for AStarEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .estimate
            .cmp(&self.estimate)
            .then_with(|| other.node.cmp(&self.node))
    }
}

impl PartialOrd for AStarEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
