//! Way slicing: directed atomic edges between split nodes.
//!
//! Each admitted way is cut at every node used by at least two ways (way
//! terminals always count as split nodes). Both directions are emitted
//! unless the way is one-way.

use geo::{Coord, LineString};

use crate::error::{Error, Result};
use crate::geo::{haversine_length, reverse_line};
use crate::osm::{OsmInput, OsmNodeId, OsmWayId};

pub type EdgeId = i64;

/// A directed atomic segment of a way between two split nodes.
#[derive(Debug, Clone)]
pub struct Edge {
    /// Sequential, 1-based: `id == slice index + 1`, so the expansion stage
    /// can resolve an edge as `edges[id - 1]`.
    pub id: EdgeId,
    pub way_id: OsmWayId,
    pub source: OsmNodeId,
    pub target: OsmNodeId,
    /// Haversine length of the edge geometry, meters.
    pub cost_meters: f64,
    pub was_oneway: bool,
    /// False for the synthesized reverse direction of a bidirectional way.
    pub forward: bool,
    pub geom: LineString<f64>,
}

/// Slice every admitted way at its split nodes (S2).
pub fn slice_ways(input: &OsmInput) -> Result<Vec<Edge>> {
    let mut edges: Vec<Edge> = Vec::new();
    let mut oneway_edges = 0u64;
    let mut twoway_edges = 0u64;

    for way in &input.ways {
        let oneway = way.oneway.is_oneway();
        let mut source = way.node_ids[0];
        let mut geometry: Vec<Coord<f64>> = Vec::new();

        for (position, node_id) in way.node_ids.iter().enumerate() {
            let node = input
                .nodes
                .get(node_id)
                .ok_or(Error::MissingNode { way_id: way.id, node_id: *node_id })?;
            geometry.push(node.point().0);
            if position == 0 {
                continue;
            }
            if !node.is_split_node() {
                continue;
            }

            let line = LineString::new(geometry.clone());
            let cost = haversine_length(&line);
            edges.push(Edge {
                id: edges.len() as EdgeId + 1,
                way_id: way.id,
                source,
                target: *node_id,
                cost_meters: cost,
                was_oneway: oneway,
                forward: true,
                geom: line.clone(),
            });
            oneway_edges += 1;

            if !oneway {
                edges.push(Edge {
                    id: edges.len() as EdgeId + 1,
                    way_id: way.id,
                    source: *node_id,
                    target: source,
                    cost_meters: cost,
                    was_oneway: false,
                    forward: false,
                    geom: reverse_line(&line),
                });
                twoway_edges += 1;
            }

            source = *node_id;
            geometry = vec![node.point().0];
        }
    }

    log::info!(
        "sliced {} edges ({} forward, {} reverse)",
        edges.len(),
        oneway_edges,
        twoway_edges
    );
    Ok(edges)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BuildConfig;
    use crate::osm::{NodeRecord, WayRecord};
    use std::collections::HashMap;

    fn tags(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|&(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn node(id: i64, lon: f64, lat: f64) -> NodeRecord {
        NodeRecord { id, lon, lat, tags: HashMap::new() }
    }

    fn assemble(ways: Vec<WayRecord>, nodes: Vec<NodeRecord>) -> OsmInput {
        OsmInput::assemble(ways, nodes, vec![], &BuildConfig::default()).unwrap()
    }

    #[test]
    fn bidirectional_way_emits_both_directions() {
        let input = assemble(
            vec![WayRecord {
                id: 1,
                node_ids: vec![10, 11],
                tags: tags(&[("highway", "residential")]),
            }],
            vec![node(10, 0.0, 0.0), node(11, 0.001, 0.0)],
        );
        let edges = slice_ways(&input).unwrap();
        assert_eq!(edges.len(), 2);
        assert_eq!(edges[0].id, 1);
        assert_eq!(edges[1].id, 2);
        assert_eq!((edges[0].source, edges[0].target), (10, 11));
        assert_eq!((edges[1].source, edges[1].target), (11, 10));
        assert_eq!(edges[0].cost_meters, edges[1].cost_meters);
        assert!(!edges[0].was_oneway);
    }

    #[test]
    fn oneway_way_emits_single_direction() {
        let input = assemble(
            vec![WayRecord {
                id: 1,
                node_ids: vec![10, 11],
                tags: tags(&[("highway", "residential"), ("oneway", "yes")]),
            }],
            vec![node(10, 0.0, 0.0), node(11, 0.001, 0.0)],
        );
        let edges = slice_ways(&input).unwrap();
        assert_eq!(edges.len(), 1);
        assert!(edges[0].was_oneway);
    }

    #[test]
    fn shared_interior_node_splits_way() {
        let input = assemble(
            vec![
                WayRecord {
                    id: 1,
                    node_ids: vec![10, 11, 12],
                    tags: tags(&[("highway", "residential"), ("oneway", "yes")]),
                },
                WayRecord {
                    id: 2,
                    node_ids: vec![20, 11],
                    tags: tags(&[("highway", "residential"), ("oneway", "yes")]),
                },
            ],
            vec![
                node(10, 0.0, 0.0),
                node(11, 0.001, 0.0),
                node(12, 0.002, 0.0),
                node(20, 0.001, 0.001),
            ],
        );
        let edges = slice_ways(&input).unwrap();
        // Way 1 splits at node 11 into two edges, way 2 contributes one.
        assert_eq!(edges.len(), 3);
        assert_eq!((edges[0].source, edges[0].target), (10, 11));
        assert_eq!((edges[1].source, edges[1].target), (11, 12));
        assert_eq!((edges[2].source, edges[2].target), (20, 11));
    }

    #[test]
    fn interior_geometry_is_preserved_between_split_nodes() {
        let input = assemble(
            vec![WayRecord {
                id: 1,
                node_ids: vec![10, 11, 12],
                tags: tags(&[("highway", "residential"), ("oneway", "yes")]),
            }],
            vec![node(10, 0.0, 0.0), node(11, 0.001, 0.0005), node(12, 0.002, 0.0)],
        );
        let edges = slice_ways(&input).unwrap();
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].geom.0.len(), 3);
        let expected = haversine_length(&edges[0].geom);
        assert!((edges[0].cost_meters - expected).abs() < 1e-9);
    }
}
