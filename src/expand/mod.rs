//! Turn-graph expansion.
//!
//! Every sliced edge becomes a vertex of the turn graph; every transition
//! from an edge to a consecutive edge becomes an [`ExpandedEdge`] whose
//! geometry runs from the arc midpoint of the incoming edge to the arc
//! midpoint of the outgoing one. Immediate reversals along identical
//! geometry are rejected.

pub mod restrictions;

use std::collections::HashMap;

use geo::{Coord, LineString};
use serde::Serialize;

use crate::edges::{Edge, EdgeId};
use crate::geo::arc_midpoint;
use crate::network::BuildSummary;
use crate::osm::{OsmNodeId, OsmWayId};

pub type ExpandedEdgeId = i64;

/// One of the two underlying edges of an expanded edge.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct ExpandedEdgeComponent {
    pub source_node: OsmNodeId,
    pub target_node: OsmNodeId,
    pub cost_meters: f64,
}

/// A legal transition in the turn graph.
///
/// Filtered (never mutated) by the restriction pass; `geom` starts at the
/// midpoint of the source edge and ends at the midpoint of the target edge.
#[derive(Debug, Clone, Serialize)]
pub struct ExpandedEdge {
    pub id: ExpandedEdgeId,
    pub source_edge: EdgeId,
    pub target_edge: EdgeId,
    pub source_way: OsmWayId,
    pub target_way: OsmWayId,
    pub source_component: ExpandedEdgeComponent,
    pub target_component: ExpandedEdgeComponent,
    pub was_oneway: bool,
    pub cost_meters: f64,
    pub geom: LineString<f64>,
}

/// Expand the sliced edge list into the turn graph (S3).
pub fn expand_edges(edges: &[Edge], summary: &mut BuildSummary) -> Vec<ExpandedEdge> {
    // Outgoing edges indexed by their source node, in edge-ID order.
    let mut outgoing_by_node: HashMap<OsmNodeId, Vec<usize>> = HashMap::new();
    for (idx, edge) in edges.iter().enumerate() {
        outgoing_by_node.entry(edge.source).or_default().push(idx);
    }

    let mut expanded: Vec<ExpandedEdge> = Vec::new();
    for from in edges {
        let Some(outgoing) = outgoing_by_node.get(&from.target) else {
            continue;
        };
        for &to_idx in outgoing {
            let to = &edges[to_idx];

            // Same edge traversed in reverse: a geometric cycle, not a turn.
            if is_geometric_cycle(from, to) {
                summary.cycles_rejected += 1;
                continue;
            }

            let (before_from, mid_from) = arc_midpoint(&from.geom);
            let (before_to, mid_to) = arc_midpoint(&to.geom);

            let mut geom: Vec<Coord<f64>> = Vec::with_capacity(
                from.geom.0.len() - before_from + before_to + 2,
            );
            geom.push(mid_from.0);
            geom.extend_from_slice(&from.geom.0[before_from + 1..]);
            geom.extend_from_slice(&to.geom.0[..=before_to]);
            geom.push(mid_to.0);

            expanded.push(ExpandedEdge {
                id: expanded.len() as ExpandedEdgeId + 1,
                source_edge: from.id,
                target_edge: to.id,
                source_way: from.way_id,
                target_way: to.way_id,
                source_component: ExpandedEdgeComponent {
                    source_node: from.source,
                    target_node: from.target,
                    cost_meters: from.cost_meters,
                },
                target_component: ExpandedEdgeComponent {
                    source_node: to.source,
                    target_node: to.target,
                    cost_meters: to.cost_meters,
                },
                was_oneway: from.was_oneway,
                cost_meters: (from.cost_meters + to.cost_meters) / 2.0,
                geom: LineString::new(geom),
            });
        }
    }

    log::info!(
        "expanded {} turns ({} geometric cycles rejected)",
        expanded.len(),
        summary.cycles_rejected
    );
    expanded
}

fn is_geometric_cycle(from: &Edge, to: &Edge) -> bool {
    let f = &from.geom.0;
    let t = &to.geom.0;
    f[0] == t[t.len() - 1] && f[f.len() - 1] == t[0]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn edge(id: EdgeId, way_id: i64, source: i64, target: i64, coords: &[(f64, f64)]) -> Edge {
        let geom = LineString::new(coords.iter().map(|&(x, y)| Coord { x, y }).collect());
        let cost = crate::geo::haversine_length(&geom);
        Edge {
            id,
            way_id,
            source,
            target,
            cost_meters: cost,
            was_oneway: true,
            forward: true,
            geom,
        }
    }

    #[test]
    fn consecutive_edges_produce_one_turn() {
        let edges = vec![
            edge(1, 100, 10, 11, &[(0.0, 0.0), (0.001, 0.0)]),
            edge(2, 101, 11, 12, &[(0.001, 0.0), (0.002, 0.0)]),
        ];
        let mut summary = BuildSummary::default();
        let expanded = expand_edges(&edges, &mut summary);
        assert_eq!(expanded.len(), 1);
        let turn = &expanded[0];
        assert_eq!(turn.id, 1);
        assert_eq!(turn.source_edge, 1);
        assert_eq!(turn.target_edge, 2);
        assert_eq!(turn.source_way, 100);
        assert_eq!(turn.target_way, 101);
        let expected = (edges[0].cost_meters + edges[1].cost_meters) / 2.0;
        assert!((turn.cost_meters - expected).abs() < 1e-9);
    }

    #[test]
    fn composed_geometry_runs_midpoint_to_midpoint() {
        let edges = vec![
            edge(1, 100, 10, 11, &[(0.0, 0.0), (0.002, 0.0)]),
            edge(2, 101, 11, 12, &[(0.002, 0.0), (0.004, 0.0)]),
        ];
        let mut summary = BuildSummary::default();
        let expanded = expand_edges(&edges, &mut summary);
        let geom = &expanded[0].geom.0;
        assert!((geom[0].x - 0.001).abs() < 1e-9);
        assert!((geom[geom.len() - 1].x - 0.003).abs() < 1e-9);
        // Shared node sits in the interior of the composed geometry.
        assert!(geom.iter().any(|c| (c.x - 0.002).abs() < 1e-12));
    }

    #[test]
    fn reverse_twin_is_rejected_as_cycle() {
        let edges = vec![
            edge(1, 100, 10, 11, &[(0.0, 0.0), (0.001, 0.0)]),
            edge(2, 100, 11, 10, &[(0.001, 0.0), (0.0, 0.0)]),
        ];
        let mut summary = BuildSummary::default();
        let expanded = expand_edges(&edges, &mut summary);
        assert!(expanded.is_empty());
        assert_eq!(summary.cycles_rejected, 2);
    }

    #[test]
    fn ids_are_dense_and_one_based() {
        // A node with one incoming and two outgoing edges yields two turns.
        let edges = vec![
            edge(1, 100, 10, 11, &[(0.0, 0.0), (0.001, 0.0)]),
            edge(2, 101, 11, 12, &[(0.001, 0.0), (0.002, 0.0)]),
            edge(3, 102, 11, 13, &[(0.001, 0.0), (0.001, 0.001)]),
        ];
        let mut summary = BuildSummary::default();
        let expanded = expand_edges(&edges, &mut summary);
        assert_eq!(expanded.len(), 2);
        assert_eq!(expanded[0].id, 1);
        assert_eq!(expanded[1].id, 2);
    }
}
