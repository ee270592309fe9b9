//! Validated in-memory OSM input tables.
//!
//! Parsing lives outside the core: a collaborator feeds way, node and
//! relation records (in any order), and [`OsmInput::assemble`] filters them
//! against the configuration, flattens tags into typed attributes and
//! accumulates node use-counts. A way referencing a node absent from the
//! node table is a fatal error.

pub mod restrictions;
pub mod tags;

use std::collections::{BTreeMap, HashMap, HashSet};

use geo::Point;
use serde::Serialize;

use crate::config::BuildConfig;
use crate::error::{Error, Result};
use crate::network::BuildSummary;
use restrictions::TurnRestriction;
use tags::{AgentType, ControlType, LinkClass, Oneway};

pub type OsmNodeId = i64;
pub type OsmWayId = i64;

/// Raw way as handed over by the parsing collaborator.
#[derive(Debug, Clone)]
pub struct WayRecord {
    pub id: OsmWayId,
    pub node_ids: Vec<OsmNodeId>,
    pub tags: HashMap<String, String>,
}

/// Raw node as handed over by the parsing collaborator.
#[derive(Debug, Clone)]
pub struct NodeRecord {
    pub id: OsmNodeId,
    pub lon: f64,
    pub lat: f64,
    pub tags: HashMap<String, String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberType {
    Node,
    Way,
    Relation,
}

#[derive(Debug, Clone)]
pub struct RelationMember {
    pub role: String,
    pub member_type: MemberType,
    pub ref_id: i64,
}

/// Raw relation as handed over by the parsing collaborator.
#[derive(Debug, Clone)]
pub struct RelationRecord {
    pub id: i64,
    pub tags: HashMap<String, String>,
    pub members: Vec<RelationMember>,
}

/// An admitted way with flattened typed attributes.
///
/// Immutable once assembly completes. For `oneway=-1` ways the node list is
/// already reversed, so downstream stages only ever see forward one-ways.
#[derive(Debug, Clone)]
pub struct OsmWay {
    pub id: OsmWayId,
    pub node_ids: Vec<OsmNodeId>,
    pub tags: HashMap<String, String>,
    pub name: Option<String>,
    pub highway: Option<String>,
    pub railway: Option<String>,
    pub aeroway: Option<String>,
    pub junction: Option<String>,
    pub oneway: Oneway,
    /// `oneway` was absent and not implied by a roundabout junction.
    pub oneway_default: bool,
    pub lanes: i32,
    pub lanes_forward: i32,
    pub lanes_backward: i32,
    pub maxspeed_kmh: f64,
    pub link_class: LinkClass,
    pub agent_types: Vec<AgentType>,
}

impl OsmWay {
    /// Lane count for one travel direction, falling back to halved totals
    /// and then to per-class defaults when tags are missing or malformed.
    pub fn directional_lanes(&self, forward: bool) -> i32 {
        if forward && self.lanes_forward > 0 {
            return self.lanes_forward;
        }
        if !forward && self.lanes_backward > 0 {
            return self.lanes_backward;
        }
        if self.lanes > 0 {
            if self.oneway.is_oneway() {
                return self.lanes;
            }
            return (self.lanes / 2).max(1);
        }
        self.link_class.default_lanes()
    }

    pub fn speed_kmh(&self) -> f64 {
        if self.maxspeed_kmh > 0.0 {
            self.maxspeed_kmh
        } else {
            self.link_class.default_speed_kmh()
        }
    }
}

/// A node referenced by at least one admitted way.
#[derive(Debug, Clone, Serialize)]
pub struct OsmNode {
    pub id: OsmNodeId,
    pub lon: f64,
    pub lat: f64,
    pub name: Option<String>,
    pub highway: Option<String>,
    pub control_type: ControlType,
    /// Number of admitted-way references; way terminals count twice.
    pub use_count: u32,
}

impl OsmNode {
    pub fn point(&self) -> Point<f64> {
        Point::new(self.lon, self.lat)
    }

    /// A node shared by two ways, or a way terminal, splits edges here.
    pub fn is_split_node(&self) -> bool {
        self.use_count >= 2
    }
}

/// The validated input handed to the construction pipeline.
#[derive(Debug)]
pub struct OsmInput {
    pub ways: Vec<OsmWay>,
    pub nodes: BTreeMap<OsmNodeId, OsmNode>,
    pub restrictions: Vec<TurnRestriction>,
    /// Way IDs present in the extract; restrictions referencing others are ignored.
    pub ways_present: HashSet<OsmWayId>,
    pub summary: BuildSummary,
}

impl OsmInput {
    /// Assemble and validate the three input streams.
    pub fn assemble(
        ways: Vec<WayRecord>,
        nodes: Vec<NodeRecord>,
        relations: Vec<RelationRecord>,
        config: &BuildConfig,
    ) -> Result<OsmInput> {
        let mut summary = BuildSummary::default();

        let node_records: HashMap<OsmNodeId, NodeRecord> =
            nodes.into_iter().map(|n| (n.id, n)).collect();

        let mut admitted: Vec<OsmWay> = Vec::new();
        for record in ways {
            let Some(entity_value) = record.tags.get(&config.entity_name) else {
                summary.ways_filtered += 1;
                continue;
            };
            if !config.accepts(entity_value) {
                summary.ways_filtered += 1;
                continue;
            }
            if record.node_ids.len() < 2 {
                summary.ways_filtered += 1;
                continue;
            }
            if tags::is_poi(&record.tags) {
                summary.ways_poi += 1;
                continue;
            }
            if record.tags.get("area").map(String::as_str) == Some("yes") {
                summary.ways_area += 1;
                continue;
            }
            if let Some(highway) = record.tags.get("highway") {
                if tags::is_negligible_highway(highway) {
                    summary.ways_negligible += 1;
                    continue;
                }
            }
            admitted.push(flatten_way(record, &mut summary));
        }

        if admitted.is_empty() {
            return Err(Error::EmptyNetwork);
        }
        summary.ways_admitted = admitted.len() as u64;

        // Materialize only the nodes the admitted ways reference; a missing
        // node is an input-integrity failure.
        let mut node_table: BTreeMap<OsmNodeId, OsmNode> = BTreeMap::new();
        for way in &admitted {
            for &node_id in &way.node_ids {
                if node_table.contains_key(&node_id) {
                    continue;
                }
                let record = node_records
                    .get(&node_id)
                    .ok_or(Error::MissingNode { way_id: way.id, node_id })?;
                let highway = record.tags.get("highway").cloned();
                node_table.insert(
                    node_id,
                    OsmNode {
                        id: node_id,
                        lon: record.lon,
                        lat: record.lat,
                        name: record.tags.get("name").cloned(),
                        control_type: tags::control_type_for_node(highway.as_deref()),
                        highway,
                        use_count: 0,
                    },
                );
            }
        }

        // Node use-counts: terminals count twice so they always split.
        for way in &admitted {
            let last = way.node_ids.len() - 1;
            for (position, node_id) in way.node_ids.iter().enumerate() {
                let node = node_table
                    .get_mut(node_id)
                    .ok_or(Error::MissingNode { way_id: way.id, node_id: *node_id })?;
                node.use_count += if position == 0 || position == last { 2 } else { 1 };
            }
        }

        let ways_present: HashSet<OsmWayId> = admitted.iter().map(|w| w.id).collect();
        let restrictions = restrictions::parse_restrictions(&relations, &mut summary);

        log::info!(
            "input assembled: {} ways, {} nodes, {} restrictions ({} skipped, {} unknown roles)",
            admitted.len(),
            node_table.len(),
            restrictions.len(),
            summary.restrictions_skipped,
            summary.restriction_unknown_roles,
        );

        Ok(OsmInput {
            ways: admitted,
            nodes: node_table,
            restrictions,
            ways_present,
            summary,
        })
    }
}

fn flatten_way(record: WayRecord, summary: &mut BuildSummary) -> OsmWay {
    let WayRecord { id, mut node_ids, tags } = record;

    let (oneway, oneway_default) = tags::parse_oneway(&tags, id, summary);
    if oneway == Oneway::Reversed {
        node_ids.reverse();
    }

    let lanes = match tags.get("lanes") {
        Some(v) => tags::parse_lanes(v, id, "lanes", summary),
        None => -1,
    };
    let lanes_forward = match tags.get("lanes:forward") {
        Some(v) => tags::parse_lanes(v, id, "lanes:forward", summary),
        None => -1,
    };
    let lanes_backward = match tags.get("lanes:backward") {
        Some(v) => tags::parse_lanes(v, id, "lanes:backward", summary),
        None => -1,
    };
    let maxspeed_kmh = match tags.get("maxspeed") {
        Some(v) => tags::parse_maxspeed(v, id, summary),
        None => -1.0,
    };

    let highway = tags.get("highway").cloned();
    let link_class = highway
        .as_deref()
        .map(LinkClass::from_highway)
        .unwrap_or(LinkClass::Other);
    let agent_types = tags::agent_types_for(link_class, &tags);

    OsmWay {
        id,
        node_ids,
        name: tags.get("name").cloned(),
        railway: tags.get("railway").cloned(),
        aeroway: tags.get("aeroway").cloned(),
        junction: tags.get("junction").cloned(),
        highway,
        tags,
        oneway,
        oneway_default,
        lanes,
        lanes_forward,
        lanes_backward,
        maxspeed_kmh,
        link_class,
        agent_types,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn way(id: i64, node_ids: &[i64], tag_pairs: &[(&str, &str)]) -> WayRecord {
        WayRecord {
            id,
            node_ids: node_ids.to_vec(),
            tags: tag_pairs
                .iter()
                .map(|&(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    fn node(id: i64, lon: f64, lat: f64) -> NodeRecord {
        NodeRecord {
            id,
            lon,
            lat,
            tags: HashMap::new(),
        }
    }

    #[test]
    fn use_counts_make_terminals_split_nodes() {
        let input = OsmInput::assemble(
            vec![way(1, &[10, 11, 12], &[("highway", "residential")])],
            vec![node(10, 0.0, 0.0), node(11, 0.001, 0.0), node(12, 0.002, 0.0)],
            vec![],
            &BuildConfig::default(),
        )
        .unwrap();
        assert!(input.nodes[&10].is_split_node());
        assert!(!input.nodes[&11].is_split_node());
        assert!(input.nodes[&12].is_split_node());
    }

    #[test]
    fn shared_interior_node_becomes_split_node() {
        let input = OsmInput::assemble(
            vec![
                way(1, &[10, 11, 12], &[("highway", "residential")]),
                way(2, &[20, 11], &[("highway", "residential")]),
            ],
            vec![
                node(10, 0.0, 0.0),
                node(11, 0.001, 0.0),
                node(12, 0.002, 0.0),
                node(20, 0.001, 0.001),
            ],
            vec![],
            &BuildConfig::default(),
        )
        .unwrap();
        assert!(input.nodes[&11].is_split_node());
    }

    #[test]
    fn missing_node_is_fatal() {
        let result = OsmInput::assemble(
            vec![way(1, &[10, 11], &[("highway", "residential")])],
            vec![node(10, 0.0, 0.0)],
            vec![],
            &BuildConfig::default(),
        );
        match result {
            Err(Error::MissingNode { way_id, node_id }) => {
                assert_eq!(way_id, 1);
                assert_eq!(node_id, 11);
            }
            other => panic!("expected MissingNode, got {other:?}"),
        }
    }

    #[test]
    fn reversed_oneway_flips_node_order() {
        let input = OsmInput::assemble(
            vec![way(1, &[10, 11], &[("highway", "residential"), ("oneway", "-1")])],
            vec![node(10, 0.0, 0.0), node(11, 0.001, 0.0)],
            vec![],
            &BuildConfig::default(),
        )
        .unwrap();
        assert_eq!(input.ways[0].node_ids, vec![11, 10]);
        assert_eq!(input.ways[0].oneway, Oneway::Reversed);
        assert!(input.ways[0].oneway.is_oneway());
    }

    #[test]
    fn whitelist_and_poi_filtering() {
        let mut config = BuildConfig::default();
        config.accepted_tag_values.insert("primary".to_string());
        let result = OsmInput::assemble(
            vec![
                way(1, &[10, 11], &[("highway", "residential")]),
                way(2, &[10, 11], &[("highway", "primary"), ("building", "yes")]),
            ],
            vec![node(10, 0.0, 0.0), node(11, 0.001, 0.0)],
            vec![],
            &config,
        );
        // Everything filtered or POI: nothing to build.
        assert!(matches!(result, Err(Error::EmptyNetwork)));
    }
}
