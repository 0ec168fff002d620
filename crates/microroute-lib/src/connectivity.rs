//! Offline connectivity audit of a path dataset.
//!
//! Builds an undirected, mode-agnostic adjacency over every feature of a
//! dataset with the same endpoint snapping as the routing graph, then labels
//! connected components with an iterative depth-first search.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::dataset::Dataset;
use crate::spatial::{NodeId, NodeIndex};

/// Number of component sizes listed in a report.
const TOP_COMPONENTS: usize = 10;

/// Overall judgement of a network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConnectivityVerdict {
    /// At most two components.
    WellConnected,
    /// Three to ten components.
    MinorFragmentation,
    /// More than ten components.
    HighlyFragmented,
}

impl ConnectivityVerdict {
    pub fn from_components(components: usize) -> Self {
        match components {
            0..=2 => ConnectivityVerdict::WellConnected,
            3..=10 => ConnectivityVerdict::MinorFragmentation,
            _ => ConnectivityVerdict::HighlyFragmented,
        }
    }
}

impl fmt::Display for ConnectivityVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            ConnectivityVerdict::WellConnected => "well connected",
            ConnectivityVerdict::MinorFragmentation => "minor fragmentation",
            ConnectivityVerdict::HighlyFragmented => "highly fragmented",
        };
        f.write_str(text)
    }
}

/// Component counts by size.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SizeBuckets {
    /// More than 100 nodes.
    pub large: usize,
    /// 10 to 100 nodes.
    pub medium: usize,
    /// 2 to 9 nodes.
    pub small: usize,
    /// Single nodes.
    pub single: usize,
}

/// Connectivity report for one dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectivityReport {
    pub dataset: String,
    pub features: usize,
    pub line_strings: usize,
    pub total_coordinates: usize,
    pub rejected_features: usize,
    pub nodes: usize,
    /// Distinct undirected edges.
    pub edges: usize,
    pub component_count: usize,
    pub largest_component_size: usize,
    pub smallest_component_size: usize,
    /// Share of nodes in the largest component, in `[0, 1]`.
    pub coverage: f64,
    /// Nodes with no incident edge.
    pub isolated_nodes: usize,
    pub average_degree: f64,
    pub size_buckets: SizeBuckets,
    /// Largest component sizes, descending.
    pub top_components: Vec<usize>,
    pub verdict: ConnectivityVerdict,
}

/// Analyze a parsed dataset.
pub fn analyze_dataset(dataset: &Dataset, snap_tolerance_m: f64) -> ConnectivityReport {
    let mut index = NodeIndex::new(snap_tolerance_m);
    let mut edges: HashSet<(NodeId, NodeId)> = HashSet::new();

    for feature in &dataset.features {
        let (Some(first), Some(last)) = (feature.first(), feature.last()) else {
            continue;
        };
        let (start, _) = index.get_or_insert(first);
        if feature.coordinates.len() < 2 {
            continue;
        }
        let (end, _) = index.get_or_insert(last);
        if start != end {
            edges.insert((start.min(end), start.max(end)));
        }
    }

    let node_count = index.len();
    let mut adjacency: Vec<Vec<NodeId>> = vec![Vec::new(); node_count];
    for &(a, b) in &edges {
        adjacency[a].push(b);
        adjacency[b].push(a);
    }

    let mut sizes = component_sizes(&adjacency);
    sizes.sort_unstable_by(|a, b| b.cmp(a));

    let largest = sizes.first().copied().unwrap_or(0);
    let smallest = sizes.last().copied().unwrap_or(0);
    let isolated = adjacency.iter().filter(|next| next.is_empty()).count();
    let coverage = if node_count == 0 {
        0.0
    } else {
        largest as f64 / node_count as f64
    };
    let average_degree = if node_count == 0 {
        0.0
    } else {
        (2 * edges.len()) as f64 / node_count as f64
    };

    let mut buckets = SizeBuckets::default();
    for &size in &sizes {
        match size {
            0 | 1 => buckets.single += 1,
            2..=9 => buckets.small += 1,
            10..=100 => buckets.medium += 1,
            _ => buckets.large += 1,
        }
    }

    let report = ConnectivityReport {
        dataset: dataset.id.clone(),
        features: dataset.stats.features,
        line_strings: dataset.stats.line_strings,
        total_coordinates: dataset.stats.total_coordinates,
        rejected_features: dataset.stats.rejected,
        nodes: node_count,
        edges: edges.len(),
        component_count: sizes.len(),
        largest_component_size: largest,
        smallest_component_size: smallest,
        coverage,
        isolated_nodes: isolated,
        average_degree,
        size_buckets: buckets,
        top_components: sizes.iter().take(TOP_COMPONENTS).copied().collect(),
        verdict: ConnectivityVerdict::from_components(sizes.len()),
    };

    info!(
        dataset = %report.dataset,
        nodes = report.nodes,
        edges = report.edges,
        components = report.component_count,
        coverage = report.coverage,
        isolated = report.isolated_nodes,
        verdict = %report.verdict,
        "connectivity analysis complete"
    );
    report
}

fn component_sizes(adjacency: &[Vec<NodeId>]) -> Vec<usize> {
    let mut visited = vec![false; adjacency.len()];
    let mut sizes = Vec::new();
    let mut stack = Vec::new();

    for start in 0..adjacency.len() {
        if visited[start] {
            continue;
        }
        visited[start] = true;
        stack.push(start);
        let mut size = 0;
        while let Some(node) = stack.pop() {
            size += 1;
            for &next in &adjacency[node] {
                if !visited[next] {
                    visited[next] = true;
                    stack.push(next);
                }
            }
        }
        sizes.push(size);
    }
    sizes
}
