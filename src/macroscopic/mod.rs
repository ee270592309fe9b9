//! Macroscopic assembly: links, intersection nodes and movements.
//!
//! Every sliced edge that survives expansion context becomes one directed
//! [`NetworkLink`]; split nodes become [`NetworkNode`]s. Movements pair
//! incoming with outgoing links at each node, admitting only pairs backed by
//! a surviving expanded edge (so turn restrictions carry over for free).

pub mod movement;

use std::collections::{BTreeMap, HashMap, HashSet};

use geo::{LineString, Point};
use serde::Serialize;

use crate::edges::{Edge, EdgeId};
use crate::expand::ExpandedEdge;
use crate::error::Result;
use crate::geo::Projection;
use crate::mesoscopic::MesoLinkId;
use crate::osm::tags::{AgentType, ControlType, LinkClass};
use crate::osm::{OsmInput, OsmNodeId, OsmWayId};
use movement::Movement;

pub type NetworkNodeId = i64;
pub type NetworkLinkId = i64;
pub type MovementId = i64;

/// Role of a node at the network periphery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BoundaryType {
    #[default]
    None,
    Interior,
    /// Traffic can only enter the network here.
    In,
    /// Traffic can only leave the network here.
    Out,
}

/// A macroscopic intersection or way terminal.
#[derive(Debug, Clone, Serialize)]
pub struct NetworkNode {
    pub id: NetworkNodeId,
    pub osm_node_id: OsmNodeId,
    pub name: Option<String>,
    pub osm_highway: Option<String>,
    pub incoming_links: Vec<NetworkLinkId>,
    pub outgoing_links: Vec<NetworkLinkId>,
    pub control_type: ControlType,
    pub boundary_type: BoundaryType,
    /// Analytic zone; boundary nodes seed their own zone, interior nodes -1.
    pub zone_id: i64,
    /// Dominant class among incident links.
    pub activity_type: Option<LinkClass>,
    pub movements: Vec<Movement>,
    pub geom: Point<f64>,
    pub geom_euclidean: Point<f64>,
}

/// A lane-aggregated directed road segment between two intersections.
#[derive(Debug, Clone, Serialize)]
pub struct NetworkLink {
    pub id: NetworkLinkId,
    pub source_node: NetworkNodeId,
    pub target_node: NetworkNodeId,
    pub osm_way_id: OsmWayId,
    /// Underlying sliced edge.
    pub edge_id: EdgeId,
    pub name: Option<String>,
    pub link_class: LinkClass,
    pub lanes: i32,
    pub free_speed_kmh: f64,
    pub allowed_agent_types: Vec<AgentType>,
    pub length_meters: f64,
    pub was_oneway: bool,
    pub geom: LineString<f64>,
    pub geom_euclidean: LineString<f64>,

    // Attached by the segmentation stage.
    pub breakpoints: Vec<f64>,
    pub lanes_list: Vec<i32>,
    pub lanes_change: Vec<[i32; 2]>,
    pub meso_links: Vec<MesoLinkId>,
}

impl NetworkLink {
    /// Lane count of the first segment; single-cell links with an empty
    /// breakpoint list fall back to the link lane count.
    pub fn first_segment_lanes(&self) -> i32 {
        self.lanes_list.first().copied().unwrap_or(self.lanes)
    }
}

/// The macroscopic layer.
#[derive(Debug, Serialize)]
pub struct NetworkMacroscopic {
    pub nodes: BTreeMap<NetworkNodeId, NetworkNode>,
    pub links: BTreeMap<NetworkLinkId, NetworkLink>,
    pub movement_count: u64,
}

/// Build the macroscopic layer from sliced edges and the surviving turn
/// graph (S5).
pub fn assemble(
    input: &OsmInput,
    edges: &[Edge],
    expanded: &[ExpandedEdge],
    projection: &dyn Projection,
) -> Result<NetworkMacroscopic> {
    let way_by_id: HashMap<OsmWayId, &crate::osm::OsmWay> =
        input.ways.iter().map(|w| (w.id, w)).collect();

    let mut nodes: BTreeMap<NetworkNodeId, NetworkNode> = BTreeMap::new();
    let mut node_by_osm: HashMap<OsmNodeId, NetworkNodeId> = HashMap::new();
    let mut next_node_id: NetworkNodeId = 0;

    let intern_node = |osm_id: OsmNodeId,
                           nodes: &mut BTreeMap<NetworkNodeId, NetworkNode>,
                           node_by_osm: &mut HashMap<OsmNodeId, NetworkNodeId>,
                           next_node_id: &mut NetworkNodeId|
     -> NetworkNodeId {
        if let Some(&id) = node_by_osm.get(&osm_id) {
            return id;
        }
        let id = *next_node_id;
        *next_node_id += 1;
        // Admitted ways only reference resolved nodes, so the table hit is
        // guaranteed by intake.
        let osm_node = &input.nodes[&osm_id];
        let geom = osm_node.point();
        nodes.insert(
            id,
            NetworkNode {
                id,
                osm_node_id: osm_id,
                name: osm_node.name.clone(),
                osm_highway: osm_node.highway.clone(),
                incoming_links: Vec::new(),
                outgoing_links: Vec::new(),
                control_type: osm_node.control_type,
                boundary_type: BoundaryType::None,
                zone_id: -1,
                activity_type: None,
                movements: Vec::new(),
                geom,
                geom_euclidean: projection.to_euclidean(geom),
            },
        );
        node_by_osm.insert(osm_id, id);
        id
    };

    let mut links: BTreeMap<NetworkLinkId, NetworkLink> = BTreeMap::new();

    for edge in edges {
        let way = way_by_id.get(&edge.way_id).copied();
        let source_node = intern_node(edge.source, &mut nodes, &mut node_by_osm, &mut next_node_id);
        let target_node = intern_node(edge.target, &mut nodes, &mut node_by_osm, &mut next_node_id);

        let id = links.len() as NetworkLinkId;
        let (link_class, lanes, speed, agents, name) = match way {
            Some(way) => (
                way.link_class,
                way.directional_lanes(edge.forward),
                way.speed_kmh(),
                way.agent_types.clone(),
                way.name.clone(),
            ),
            None => (LinkClass::Other, 1, 30.0, vec![AgentType::Auto], None),
        };

        links.insert(
            id,
            NetworkLink {
                id,
                source_node,
                target_node,
                osm_way_id: edge.way_id,
                edge_id: edge.id,
                name,
                link_class,
                lanes,
                free_speed_kmh: speed,
                allowed_agent_types: agents,
                length_meters: edge.cost_meters,
                was_oneway: edge.was_oneway,
                geom: edge.geom.clone(),
                geom_euclidean: projection.line_to_euclidean(&edge.geom),
                breakpoints: Vec::new(),
                lanes_list: Vec::new(),
                lanes_change: Vec::new(),
                meso_links: Vec::new(),
            },
        );

        if let Some(n) = nodes.get_mut(&source_node) {
            n.outgoing_links.push(id);
        }
        if let Some(n) = nodes.get_mut(&target_node) {
            n.incoming_links.push(id);
        }
    }

    classify_nodes(&mut nodes, &links);
    let movement_count = generate_movements(&mut nodes, &links, expanded);

    log::info!(
        "macroscopic layer: {} nodes, {} links, {} movements",
        nodes.len(),
        links.len(),
        movement_count
    );

    Ok(NetworkMacroscopic {
        nodes,
        links,
        movement_count,
    })
}

/// Boundary classification and derived node attributes.
fn classify_nodes(
    nodes: &mut BTreeMap<NetworkNodeId, NetworkNode>,
    links: &BTreeMap<NetworkLinkId, NetworkLink>,
) {
    for node in nodes.values_mut() {
        node.boundary_type = match (node.incoming_links.is_empty(), node.outgoing_links.is_empty()) {
            (true, true) => BoundaryType::None,
            (true, false) => BoundaryType::In,
            (false, true) => BoundaryType::Out,
            (false, false) => BoundaryType::Interior,
        };
        // Boundary nodes seed analytic zones with their own ID.
        if matches!(node.boundary_type, BoundaryType::In | BoundaryType::Out) {
            node.zone_id = node.id;
        }

        // Dominant class among incident links, first-seen on ties.
        let mut counts: Vec<(LinkClass, usize)> = Vec::new();
        for link_id in node.incoming_links.iter().chain(&node.outgoing_links) {
            if let Some(link) = links.get(link_id) {
                match counts.iter_mut().find(|(class, _)| *class == link.link_class) {
                    Some((_, n)) => *n += 1,
                    None => counts.push((link.link_class, 1)),
                }
            }
        }
        // counts is in first-seen order, so only a strictly larger count
        // may displace the running maximum.
        let mut dominant: Option<(LinkClass, usize)> = None;
        for &(class, count) in &counts {
            if dominant.map_or(true, |(_, best)| count > best) {
                dominant = Some((class, count));
            }
        }
        node.activity_type = dominant.map(|(class, _)| class);
    }
}

/// Pair incoming with outgoing links at every node; a pair is admissible
/// when a surviving expanded edge connects the underlying sliced edges.
fn generate_movements(
    nodes: &mut BTreeMap<NetworkNodeId, NetworkNode>,
    links: &BTreeMap<NetworkLinkId, NetworkLink>,
    expanded: &[ExpandedEdge],
) -> u64 {
    let allowed_turns: HashSet<(EdgeId, EdgeId)> = expanded
        .iter()
        .map(|e| (e.source_edge, e.target_edge))
        .collect();

    let mut next_movement_id: MovementId = 0;

    for node in nodes.values_mut() {
        if node.incoming_links.is_empty() || node.outgoing_links.is_empty() {
            continue;
        }
        let incoming_ids = node.incoming_links.clone();
        let outgoing_ids = node.outgoing_links.clone();
        for &incoming_id in &incoming_ids {
            let Some(incoming) = links.get(&incoming_id) else {
                continue;
            };
            for &outgoing_id in &outgoing_ids {
                let Some(outgoing) = links.get(&outgoing_id) else {
                    continue;
                };
                // U-turn onto the reverse direction of the same way.
                if outgoing.target_node == incoming.source_node
                    && outgoing.osm_way_id == incoming.osm_way_id
                {
                    continue;
                }
                if !allowed_turns.contains(&(incoming.edge_id, outgoing.edge_id)) {
                    continue;
                }

                let movement_type =
                    movement::classify_turn(&incoming.geom_euclidean, &outgoing.geom_euclidean);
                let ((income_start, income_end), (outcome_start, outcome_end)) =
                    movement::lane_connection(incoming.lanes, outgoing.lanes);
                let lanes_num = income_end - income_start + 1;

                node.movements.push(Movement {
                    id: next_movement_id,
                    node_id: node.id,
                    incoming_link: incoming_id,
                    outgoing_link: outgoing_id,
                    movement_type,
                    income_lane_start: income_start + 1,
                    income_lane_end: income_end + 1,
                    outcome_lane_start: outcome_start + 1,
                    outcome_lane_end: outcome_end + 1,
                    lanes_num,
                    control_type: node.control_type,
                    allowed_agent_types: incoming.allowed_agent_types.clone(),
                    geom: movement::movement_geom(&incoming.geom, &outgoing.geom),
                });
                next_movement_id += 1;
            }
        }
    }

    next_movement_id as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BuildConfig;
    use crate::edges::slice_ways;
    use crate::expand::expand_edges;
    use crate::geo::WebMercator;
    use crate::network::BuildSummary;
    use crate::osm::{NodeRecord, WayRecord};
    use std::collections::HashMap as StdHashMap;
    use super::movement::MovementType;

    fn tags(pairs: &[(&str, &str)]) -> StdHashMap<String, String> {
        pairs
            .iter()
            .map(|&(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn node(id: i64, lon: f64, lat: f64) -> NodeRecord {
        NodeRecord { id, lon, lat, tags: StdHashMap::new() }
    }

    fn build(ways: Vec<WayRecord>, nodes: Vec<NodeRecord>) -> NetworkMacroscopic {
        let input = OsmInput::assemble(ways, nodes, vec![], &BuildConfig::default()).unwrap();
        let edges = slice_ways(&input).unwrap();
        let mut summary = BuildSummary::default();
        let expanded = expand_edges(&edges, &mut summary);
        assemble(&input, &edges, &expanded, &WebMercator).unwrap()
    }

    #[test]
    fn bidirectional_way_yields_two_links_and_interior_terminals() {
        let net = build(
            vec![WayRecord {
                id: 1,
                node_ids: vec![10, 11],
                tags: tags(&[("highway", "residential"), ("lanes", "1")]),
            }],
            vec![node(10, 0.0, 0.0), node(11, 0.001, 0.0)],
        );
        assert_eq!(net.links.len(), 2);
        assert_eq!(net.nodes.len(), 2);
        for n in net.nodes.values() {
            assert_eq!(n.boundary_type, BoundaryType::Interior);
        }
    }

    #[test]
    fn oneway_terminals_are_boundary_nodes_with_zones() {
        let net = build(
            vec![WayRecord {
                id: 1,
                node_ids: vec![10, 11],
                tags: tags(&[("highway", "residential"), ("oneway", "yes")]),
            }],
            vec![node(10, 0.0, 0.0), node(11, 0.001, 0.0)],
        );
        let start = net.nodes.values().find(|n| n.osm_node_id == 10).unwrap();
        let end = net.nodes.values().find(|n| n.osm_node_id == 11).unwrap();
        assert_eq!(start.boundary_type, BoundaryType::In);
        assert_eq!(end.boundary_type, BoundaryType::Out);
        assert_eq!(start.zone_id, start.id);
        assert_eq!(end.zone_id, end.id);
    }

    #[test]
    fn t_intersection_all_inbound_generates_no_movements() {
        // Three one-way ways into the shared node 1: no outgoing links there.
        let net = build(
            vec![
                WayRecord {
                    id: 1,
                    node_ids: vec![10, 1],
                    tags: tags(&[("highway", "residential"), ("oneway", "yes")]),
                },
                WayRecord {
                    id: 2,
                    node_ids: vec![11, 1],
                    tags: tags(&[("highway", "residential"), ("oneway", "yes")]),
                },
                WayRecord {
                    id: 3,
                    node_ids: vec![12, 1],
                    tags: tags(&[("highway", "residential"), ("oneway", "yes")]),
                },
            ],
            vec![
                node(1, 0.001, 0.0),
                node(10, 0.0, 0.0),
                node(11, 0.002, 0.0),
                node(12, 0.001, 0.001),
            ],
        );
        assert_eq!(net.nodes.len(), 4);
        assert_eq!(net.links.len(), 3);
        assert_eq!(net.movement_count, 0);
        let center = net.nodes.values().find(|n| n.osm_node_id == 1).unwrap();
        assert_eq!(center.incoming_links.len(), 3);
        assert!(center.outgoing_links.is_empty());
        assert_eq!(center.boundary_type, BoundaryType::Out);
    }

    #[test]
    fn activity_type_tie_keeps_first_seen_class() {
        // Node 11 sees one residential link (incoming, first) and one
        // primary link (outgoing): a 1-1 tie resolved to residential.
        let net = build(
            vec![
                WayRecord {
                    id: 1,
                    node_ids: vec![10, 11],
                    tags: tags(&[("highway", "residential"), ("oneway", "yes")]),
                },
                WayRecord {
                    id: 2,
                    node_ids: vec![11, 12],
                    tags: tags(&[("highway", "primary"), ("oneway", "yes")]),
                },
            ],
            vec![
                node(10, 0.0, 0.0),
                node(11, 0.001, 0.0),
                node(12, 0.002, 0.0),
            ],
        );
        let shared = net.nodes.values().find(|n| n.osm_node_id == 11).unwrap();
        assert_eq!(shared.incoming_links.len(), 1);
        assert_eq!(shared.outgoing_links.len(), 1);
        assert_eq!(shared.activity_type, Some(LinkClass::Residential));
    }

    #[test]
    fn crossing_generates_classified_movements() {
        // Two bidirectional ways crossing at node 1 (a + junction).
        let net = build(
            vec![
                WayRecord {
                    id: 1,
                    node_ids: vec![10, 1, 11],
                    tags: tags(&[("highway", "residential"), ("lanes", "2")]),
                },
                WayRecord {
                    id: 2,
                    node_ids: vec![12, 1, 13],
                    tags: tags(&[("highway", "residential"), ("lanes", "2")]),
                },
            ],
            vec![
                node(1, 0.001, 0.0),
                node(10, 0.0, 0.0),
                node(11, 0.002, 0.0),
                node(12, 0.001, -0.001),
                node(13, 0.001, 0.001),
            ],
        );
        let center = net.nodes.values().find(|n| n.osm_node_id == 1).unwrap();
        // 4 incoming × 3 non-U-turn outgoing = 12 movements.
        assert_eq!(center.movements.len(), 12);
        assert_eq!(net.movement_count, 12);

        let throughs = center
            .movements
            .iter()
            .filter(|m| m.movement_type == MovementType::Through)
            .count();
        let lefts = center
            .movements
            .iter()
            .filter(|m| m.movement_type == MovementType::Left)
            .count();
        let rights = center
            .movements
            .iter()
            .filter(|m| m.movement_type == MovementType::Right)
            .count();
        assert_eq!(throughs, 4);
        assert_eq!(lefts, 4);
        assert_eq!(rights, 4);

        // Movement IDs are dense from zero.
        let mut ids: Vec<_> = center.movements.iter().map(|m| m.id).collect();
        ids.sort_unstable();
        assert_eq!(ids, (0..12).collect::<Vec<_>>());
    }
}
