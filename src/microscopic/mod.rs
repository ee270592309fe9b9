//! Microscopic cell graph: per-lane cell chains, lane-change edges,
//! intersection movement channels and boundary propagation.
//!
//! Lane index 0 is the rightmost lane; car lanes get 1-based lane IDs,
//! bike chains -1, walk chains -2. Lane geometry sampling is a pure
//! computation and fans out across macroscopic links; node and link IDs are
//! then allocated sequentially in link order, so output IDs stay
//! deterministic.

pub mod boundary;
pub mod movement;
pub mod stitch;

use std::collections::BTreeMap;

use geo::{LineString, Point};
use rayon::prelude::*;
use serde::Serialize;

use crate::config::BuildConfig;
use crate::error::{Error, Result};
use crate::geo::{haversine_length, offset_curve, point_along_line, Projection};
use crate::macroscopic::{BoundaryType, NetworkLink, NetworkLinkId, NetworkMacroscopic};
use crate::mesoscopic::{MesoLinkId, MesoscopicLink, NetworkMesoscopic};
use crate::network::BuildSummary;
use crate::osm::tags::AgentType;

pub type MicroNodeId = i64;
pub type MicroLinkId = i64;

/// Offsets smaller than this reuse the centerline geometry untouched.
const MIN_LATERAL_OFFSET_M: f64 = 0.01;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MicroLinkType {
    Forward,
    LaneChange,
}

/// A cell center in the cellular-automaton graph.
#[derive(Debug, Clone, Serialize)]
pub struct MicroscopicNode {
    pub id: MicroNodeId,
    /// Owning mesoscopic link, -1 when unowned.
    pub meso_link_id: MesoLinkId,
    /// 1-based car lane, -1 bike, -2 walk.
    pub lane_id: i32,
    pub geom: Point<f64>,
    pub geom_euclidean: Point<f64>,
    pub boundary_type: BoundaryType,
    pub zone_id: i64,
    pub is_upstream_target: bool,
    pub is_downstream_target: bool,
    pub incoming_links: Vec<MicroLinkId>,
    pub outgoing_links: Vec<MicroLinkId>,
}

/// An edge between two cell centers.
#[derive(Debug, Clone, Serialize)]
pub struct MicroscopicLink {
    pub id: MicroLinkId,
    pub source_node: MicroNodeId,
    pub target_node: MicroNodeId,
    pub meso_link_id: MesoLinkId,
    pub link_type: MicroLinkType,
    pub allowed_agent_types: Vec<AgentType>,
    pub geom: LineString<f64>,
    pub geom_euclidean: LineString<f64>,
    /// First link of an intersection movement channel.
    pub is_first_movement: bool,
}

/// The microscopic layer.
#[derive(Debug, Default, Serialize)]
pub struct NetworkMicroscopic {
    pub nodes: BTreeMap<MicroNodeId, MicroscopicNode>,
    pub links: BTreeMap<MicroLinkId, MicroscopicLink>,
    pub max_node_id: MicroNodeId,
    pub max_link_id: MicroLinkId,
}

/// Mode split of a link's agent types when separate bike/walk chains are
/// requested. Returns the main chain modes plus the bike/walk flags.
pub(crate) fn split_modes(
    agent_types: &[AgentType],
    separate_bike_walk: bool,
) -> (Vec<AgentType>, bool, bool) {
    if !separate_bike_walk || agent_types.is_empty() {
        return (agent_types.to_vec(), false, false);
    }
    let auto = agent_types.contains(&AgentType::Auto);
    let bike = agent_types.contains(&AgentType::Bike);
    let walk = agent_types.contains(&AgentType::Walk);
    match (auto, bike, walk) {
        (true, true, false) => (vec![AgentType::Auto], true, false),
        (true, false, true) => (vec![AgentType::Auto], false, true),
        (false, true, true) => (vec![AgentType::Bike], false, true),
        (true, _, _) => (vec![AgentType::Auto], true, true),
        // Single non-auto mode: nothing to separate.
        _ => (agent_types.to_vec(), false, false),
    }
}

/// Pure per-lane sampling result for one mesoscopic link.
struct LaneSampling {
    cells_num: usize,
    /// Per lane, `cells_num + 1` (spherical, euclidean) sample pairs.
    car: Vec<Vec<(Point<f64>, Point<f64>)>>,
    bike: Option<Vec<(Point<f64>, Point<f64>)>>,
    walk: Option<Vec<(Point<f64>, Point<f64>)>>,
}

fn lane_geometry(
    meso: &MesoscopicLink,
    offset: f64,
    projection: &dyn Projection,
) -> LineString<f64> {
    if offset.abs() < MIN_LATERAL_OFFSET_M {
        meso.geom.clone()
    } else {
        // Negative offsets shift to the right of the travel direction.
        projection.line_to_spherical(&offset_curve(&meso.geom_euclidean, offset))
    }
}

fn sample_chain(
    geom: &LineString<f64>,
    cells_num: usize,
    projection: &dyn Projection,
) -> Vec<(Point<f64>, Point<f64>)> {
    let length = haversine_length(geom);
    (0..=cells_num)
        .map(|j| {
            let distance = length * j as f64 / cells_num as f64;
            let point = point_along_line(geom, distance);
            (point, projection.to_euclidean(point))
        })
        .collect()
}

fn sample_meso_link(
    meso: &MesoscopicLink,
    original_lanes: i32,
    bike: bool,
    walk: bool,
    config: &BuildConfig,
    projection: &dyn Projection,
) -> LaneSampling {
    let left_change = meso.lanes_change[0] as f64;
    let lanes_in_between = -(original_lanes as f64 / 2.0 - 0.5 + left_change);
    let cells_num = ((meso.length_meters / config.cell_length).round() as usize).max(1);

    let mut car = Vec::with_capacity(meso.lanes.max(0) as usize);
    for i in 0..meso.lanes {
        let offset = (lanes_in_between + i as f64) * config.lane_width;
        let geom = lane_geometry(meso, offset, projection);
        car.push(sample_chain(&geom, cells_num, projection));
    }

    let rightmost_offset = lanes_in_between * config.lane_width;
    let bike_offset = rightmost_offset - config.bike_lane_width;
    let bike_samples = bike.then(|| {
        let geom = lane_geometry(meso, bike_offset, projection);
        sample_chain(&geom, cells_num, projection)
    });
    // The walk chain stacks beyond the bike chain when both are requested.
    let walk_offset = if bike {
        bike_offset - config.walk_lane_width
    } else {
        rightmost_offset - config.walk_lane_width
    };
    let walk_samples = walk.then(|| {
        let geom = lane_geometry(meso, walk_offset, projection);
        sample_chain(&geom, cells_num, projection)
    });

    LaneSampling {
        cells_num,
        car,
        bike: bike_samples,
        walk: walk_samples,
    }
}

impl NetworkMicroscopic {
    fn alloc_node(
        &mut self,
        meso_link_id: MesoLinkId,
        lane_id: i32,
        geom: Point<f64>,
        geom_euclidean: Point<f64>,
    ) -> MicroNodeId {
        let id = self.max_node_id;
        self.max_node_id += 1;
        self.nodes.insert(
            id,
            MicroscopicNode {
                id,
                meso_link_id,
                lane_id,
                geom,
                geom_euclidean,
                boundary_type: BoundaryType::None,
                zone_id: -1,
                is_upstream_target: false,
                is_downstream_target: false,
                incoming_links: Vec::new(),
                outgoing_links: Vec::new(),
            },
        );
        id
    }

    /// Add an edge between two existing nodes and wire up the degree lists.
    fn add_link(
        &mut self,
        source: MicroNodeId,
        target: MicroNodeId,
        meso_link_id: MesoLinkId,
        link_type: MicroLinkType,
        allowed_agent_types: Vec<AgentType>,
        is_first_movement: bool,
        stage: &'static str,
    ) -> Result<MicroLinkId> {
        let (source_geom, source_eucl) = {
            let node = self
                .nodes
                .get(&source)
                .ok_or_else(|| Error::broken(stage, format!("micro node {source}")))?;
            (node.geom, node.geom_euclidean)
        };
        let (target_geom, target_eucl) = {
            let node = self
                .nodes
                .get(&target)
                .ok_or_else(|| Error::broken(stage, format!("micro node {target}")))?;
            (node.geom, node.geom_euclidean)
        };

        let id = self.max_link_id;
        self.max_link_id += 1;
        self.links.insert(
            id,
            MicroscopicLink {
                id,
                source_node: source,
                target_node: target,
                meso_link_id,
                link_type,
                allowed_agent_types,
                geom: LineString::new(vec![source_geom.0, target_geom.0]),
                geom_euclidean: LineString::new(vec![source_eucl.0, target_eucl.0]),
                is_first_movement,
            },
        );
        if let Some(node) = self.nodes.get_mut(&source) {
            node.outgoing_links.push(id);
        }
        if let Some(node) = self.nodes.get_mut(&target) {
            node.incoming_links.push(id);
        }
        Ok(id)
    }
}

/// Build the microscopic layer (S7/S8).
pub fn build(
    macro_net: &NetworkMacroscopic,
    meso_net: &mut NetworkMesoscopic,
    config: &BuildConfig,
    projection: &dyn Projection,
    summary: &mut BuildSummary,
) -> Result<NetworkMicroscopic> {
    // Mode splits per macroscopic link.
    let splits: BTreeMap<NetworkLinkId, (Vec<AgentType>, bool, bool)> = macro_net
        .links
        .iter()
        .map(|(id, link)| {
            (
                *id,
                split_modes(&link.allowed_agent_types, config.separate_bike_walk),
            )
        })
        .collect();

    // Lane geometry sampling is pure, so it fans out across links; ID
    // allocation below stays sequential to keep outputs deterministic.
    let samplings: BTreeMap<MesoLinkId, LaneSampling> = {
        let meso_ref = &*meso_net;
        macro_net
            .links
            .par_iter()
            .flat_map_iter(|(link_id, link)| {
                let (_, bike, walk) = &splits[link_id];
                let (bike, walk) = (*bike, *walk);
                let original_lanes = link.first_segment_lanes();
                link.meso_links.iter().filter_map(move |meso_id| {
                    meso_ref.links.get(meso_id).map(|meso| {
                        (
                            *meso_id,
                            sample_meso_link(meso, original_lanes, bike, walk, config, projection),
                        )
                    })
                })
            })
            .collect()
    };

    let mut micro = NetworkMicroscopic::default();

    for (link_id, link) in &macro_net.links {
        if link.meso_links.is_empty() {
            log::warn!("suspicious macroscopic link {link_id}: no mesoscopic links");
            summary.suspicious_links += 1;
            continue;
        }
        let (multimodal, _, _) = &splits[link_id];

        // D. Materialize cell nodes per lane.
        for meso_id in &link.meso_links {
            let sampling = samplings
                .get(meso_id)
                .ok_or_else(|| Error::broken("cell sampling", format!("meso link {meso_id}")))?;
            let node_ids_per_lane: Vec<Vec<MicroNodeId>> = sampling
                .car
                .iter()
                .enumerate()
                .map(|(lane_idx, chain)| {
                    chain
                        .iter()
                        .map(|&(geom, eucl)| {
                            micro.alloc_node(*meso_id, lane_idx as i32 + 1, geom, eucl)
                        })
                        .collect()
                })
                .collect();
            let bike_ids: Vec<MicroNodeId> = sampling
                .bike
                .iter()
                .flatten()
                .map(|&(geom, eucl)| micro.alloc_node(*meso_id, -1, geom, eucl))
                .collect();
            let walk_ids: Vec<MicroNodeId> = sampling
                .walk
                .iter()
                .flatten()
                .map(|&(geom, eucl)| micro.alloc_node(*meso_id, -2, geom, eucl))
                .collect();

            let meso = meso_net
                .links
                .get_mut(meso_id)
                .ok_or_else(|| Error::broken("cell materialization", format!("meso link {meso_id}")))?;
            meso.micro_nodes_per_lane = node_ids_per_lane;
            meso.micro_nodes_bike = bike_ids;
            meso.micro_nodes_walk = walk_ids;
        }

        // E. Mark link upstream/downstream targets and pull in zones.
        mark_link_targets(&mut micro, meso_net, macro_net, link)?;

        // F. Stitch adjacent segments lane by lane.
        stitch::stitch_link_segments(&mut micro, meso_net, &link.meso_links)?;

        // G. Forward and lane-change cell edges.
        for meso_id in &link.meso_links {
            emit_cell_links(&mut micro, meso_net, *meso_id, multimodal)?;
        }
    }

    // H. Intersection movement channels.
    movement::connect_movements(&mut micro, meso_net, macro_net, config, projection)?;

    // I. Boundary propagation.
    boundary::propagate(&mut micro, meso_net, macro_net)?;

    log::info!(
        "microscopic layer: {} nodes, {} links",
        micro.nodes.len(),
        micro.links.len()
    );
    Ok(micro)
}

/// Mark the first/last cell of every chain of a link's first/last segment
/// and propagate the macroscopic endpoint zones.
fn mark_link_targets(
    micro: &mut NetworkMicroscopic,
    meso_net: &NetworkMesoscopic,
    macro_net: &NetworkMacroscopic,
    link: &NetworkLink,
) -> Result<()> {
    let stage = "upstream/downstream marking";
    let source_zone = macro_net
        .nodes
        .get(&link.source_node)
        .ok_or_else(|| Error::broken(stage, format!("macro node {}", link.source_node)))?
        .zone_id;
    let target_zone = macro_net
        .nodes
        .get(&link.target_node)
        .ok_or_else(|| Error::broken(stage, format!("macro node {}", link.target_node)))?
        .zone_id;

    // meso_links is non-empty: the caller skips suspicious links.
    let first_meso = link.meso_links[0];
    let last_meso = link.meso_links[link.meso_links.len() - 1];

    let first = meso_net
        .links
        .get(&first_meso)
        .ok_or_else(|| Error::broken(stage, format!("meso link {first_meso}")))?;
    let mut upstream_ids: Vec<MicroNodeId> = Vec::new();
    for chain in &first.micro_nodes_per_lane {
        if let Some(&id) = chain.first() {
            upstream_ids.push(id);
        }
    }
    upstream_ids.extend(first.micro_nodes_bike.first().copied());
    upstream_ids.extend(first.micro_nodes_walk.first().copied());
    for id in upstream_ids {
        let node = micro
            .nodes
            .get_mut(&id)
            .ok_or_else(|| Error::broken(stage, format!("micro node {id}")))?;
        node.is_upstream_target = true;
        node.zone_id = source_zone;
    }

    let last = meso_net
        .links
        .get(&last_meso)
        .ok_or_else(|| Error::broken(stage, format!("meso link {last_meso}")))?;
    let mut downstream_ids: Vec<MicroNodeId> = Vec::new();
    for chain in &last.micro_nodes_per_lane {
        if let Some(&id) = chain.last() {
            downstream_ids.push(id);
        }
    }
    downstream_ids.extend(last.micro_nodes_bike.last().copied());
    downstream_ids.extend(last.micro_nodes_walk.last().copied());
    for id in downstream_ids {
        let node = micro
            .nodes
            .get_mut(&id)
            .ok_or_else(|| Error::broken(stage, format!("micro node {id}")))?;
        node.is_downstream_target = true;
        node.zone_id = target_zone;
    }

    Ok(())
}

/// Forward edges along each lane chain plus lane-change edges between
/// neighboring lanes (G).
fn emit_cell_links(
    micro: &mut NetworkMicroscopic,
    meso_net: &NetworkMesoscopic,
    meso_id: MesoLinkId,
    multimodal: &[AgentType],
) -> Result<()> {
    let stage = "cell graph edges";
    let (chains, bike_chain, walk_chain) = {
        let meso = meso_net
            .links
            .get(&meso_id)
            .ok_or_else(|| Error::broken(stage, format!("meso link {meso_id}")))?;
        (
            meso.micro_nodes_per_lane.clone(),
            meso.micro_nodes_bike.clone(),
            meso.micro_nodes_walk.clone(),
        )
    };

    for lane in 0..chains.len() {
        let chain = &chains[lane];
        // Forward edges between consecutive cells.
        for j in 0..chain.len().saturating_sub(1) {
            micro.add_link(
                chain[j],
                chain[j + 1],
                meso_id,
                MicroLinkType::Forward,
                multimodal.to_vec(),
                false,
                stage,
            )?;
        }
        // Lane change towards the left neighbor.
        if lane + 1 < chains.len() {
            let left = &chains[lane + 1];
            for j in 0..chain.len().saturating_sub(1) {
                micro.add_link(
                    chain[j],
                    left[j + 1],
                    meso_id,
                    MicroLinkType::LaneChange,
                    multimodal.to_vec(),
                    false,
                    stage,
                )?;
            }
        }
        // Lane change towards the right neighbor.
        if lane >= 1 {
            let right = &chains[lane - 1];
            for j in 0..chain.len().saturating_sub(1) {
                micro.add_link(
                    chain[j],
                    right[j + 1],
                    meso_id,
                    MicroLinkType::LaneChange,
                    multimodal.to_vec(),
                    false,
                    stage,
                )?;
            }
        }
    }

    for j in 0..bike_chain.len().saturating_sub(1) {
        micro.add_link(
            bike_chain[j],
            bike_chain[j + 1],
            meso_id,
            MicroLinkType::Forward,
            vec![AgentType::Bike],
            false,
            stage,
        )?;
    }
    for j in 0..walk_chain.len().saturating_sub(1) {
        micro.add_link(
            walk_chain[j],
            walk_chain[j + 1],
            meso_id,
            MicroLinkType::Forward,
            vec![AgentType::Walk],
            false,
            stage,
        )?;
    }

    Ok(())
}
