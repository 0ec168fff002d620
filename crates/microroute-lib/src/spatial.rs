//! KD-tree node index used for endpoint snapping and nearest-node lookup.
//!
//! Positions are stored as earth-centred cartesian coordinates in meters. A
//! chord radius query returns a superset of the nodes within the same
//! great-circle distance; candidates are then confirmed with the haversine
//! distance so the index behaves exactly like a linear scan over all nodes in
//! insertion order.

use kiddo::float::kdtree::KdTree;
use kiddo::SquaredEuclidean;

use crate::geo::Coordinate;

/// KD-tree bucket size (kiddo default).
const BUCKET_SIZE: usize = 32;

/// Dense node identifier, assigned in insertion order.
pub type NodeId = usize;

/// Incrementally built spatial index over graph nodes.
pub struct NodeIndex {
    tree: KdTree<f64, usize, 3, BUCKET_SIZE, u32>,
    positions: Vec<Coordinate>,
    tolerance_m: f64,
}

impl NodeIndex {
    /// Create an empty index merging coordinates closer than `tolerance_m`.
    pub fn new(tolerance_m: f64) -> Self {
        Self {
            tree: KdTree::new(),
            positions: Vec::new(),
            tolerance_m: tolerance_m.max(0.0),
        }
    }

    pub fn tolerance_m(&self) -> f64 {
        self.tolerance_m
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn position(&self, id: NodeId) -> Option<Coordinate> {
        self.positions.get(id).copied()
    }

    /// Node positions indexed by [`NodeId`].
    pub fn positions(&self) -> &[Coordinate] {
        &self.positions
    }

    pub fn into_positions(self) -> Vec<Coordinate> {
        self.positions
    }

    /// Existing node strictly within the tolerance of `point`.
    ///
    /// When several nodes qualify the earliest inserted one wins.
    pub fn find(&self, point: &Coordinate) -> Option<NodeId> {
        if self.positions.is_empty() || self.tolerance_m <= 0.0 {
            return None;
        }
        let query = point.to_cartesian();
        let radius = self.tolerance_m;
        self.tree
            .within::<SquaredEuclidean>(&query, radius * radius)
            .into_iter()
            .map(|neighbour| neighbour.item)
            .filter(|&id| self.positions[id].distance_to(point) < self.tolerance_m)
            .min()
    }

    /// Return the node `point` snaps to, creating one if none is in range.
    ///
    /// The boolean is `true` when a new node was created.
    pub fn get_or_insert(&mut self, point: Coordinate) -> (NodeId, bool) {
        if let Some(existing) = self.find(&point) {
            return (existing, false);
        }
        let id = self.positions.len();
        self.tree.add(&point.to_cartesian(), id);
        self.positions.push(point);
        (id, true)
    }

    /// Nearest node to `point` within `max_distance_m`, with its distance.
    ///
    /// Ties resolve to the lowest node id.
    pub fn nearest_within(&self, point: &Coordinate, max_distance_m: f64) -> Option<(NodeId, f64)> {
        if self.positions.is_empty() || max_distance_m < 0.0 {
            return None;
        }
        let query = point.to_cartesian();
        let mut best: Option<(NodeId, f64)> = None;
        for neighbour in self
            .tree
            .within::<SquaredEuclidean>(&query, max_distance_m * max_distance_m)
        {
            let id = neighbour.item;
            let distance = self.positions[id].distance_to(point);
            if distance > max_distance_m {
                continue;
            }
            best = match best {
                Some((best_id, best_distance))
                    if best_distance < distance || (best_distance == distance && best_id < id) =>
                {
                    Some((best_id, best_distance))
                }
                _ => Some((id, distance)),
            };
        }
        best
    }
}
