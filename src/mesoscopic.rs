//! Mesoscopic segmentation: breakpoints, per-segment lane lists and the
//! movement links that bridge intersections.
//!
//! Each macroscopic link is cut into one or more segments at breakpoints
//! spaced no closer than the configured resolution. Segments inherit the
//! link lane count; lane drops/additions are expressed by editing a
//! segment's `lanes` / `lanes_change` afterwards. Every movement found in
//! the macroscopic layer is materialized as an extra mesoscopic link
//! bridging the tail of the incoming link to the head of the outgoing one.

use std::collections::BTreeMap;

use geo::LineString;
use serde::Serialize;

use crate::config::BuildConfig;
use crate::error::{Error, Result};
use crate::geo::{haversine_length, line_substring, Projection};
use crate::macroscopic::{MovementId, NetworkLinkId, NetworkMacroscopic, NetworkNodeId};
use crate::microscopic::MicroNodeId;

pub type MesoLinkId = i64;

/// Movement payload of a mesoscopic movement link.
#[derive(Debug, Clone, Serialize)]
pub struct MovementRef {
    pub movement_id: MovementId,
    /// Tail segment of the incoming macroscopic link.
    pub income_meso_link: MesoLinkId,
    /// Head segment of the outgoing macroscopic link.
    pub outcome_meso_link: MesoLinkId,
    /// 0-based lane start indices into the per-lane chains.
    pub income_lane_start: i32,
    pub outcome_lane_start: i32,
}

/// A breakpoint-to-breakpoint slice of a macroscopic link, or a movement
/// link bridging two of them.
#[derive(Debug, Clone, Serialize)]
pub struct MesoscopicLink {
    pub id: MesoLinkId,
    /// Owning macroscopic link; movement links have none.
    pub macro_link_id: Option<NetworkLinkId>,
    /// Macroscopic endpoints, used for boundary and zone propagation.
    pub source_node: NetworkNodeId,
    pub target_node: NetworkNodeId,
    /// Arc-length window on the parent link, meters.
    pub dist_from: f64,
    pub dist_to: f64,
    pub lanes: i32,
    /// `[left_delta, right_delta]` relative to the parent lane count.
    pub lanes_change: [i32; 2],
    pub length_meters: f64,
    pub geom: LineString<f64>,
    pub geom_euclidean: LineString<f64>,
    pub movement: Option<MovementRef>,

    // Attached by the microscopic stage.
    pub micro_nodes_per_lane: Vec<Vec<MicroNodeId>>,
    pub micro_nodes_bike: Vec<MicroNodeId>,
    pub micro_nodes_walk: Vec<MicroNodeId>,
}

impl MesoscopicLink {
    pub fn is_movement(&self) -> bool {
        self.movement.is_some()
    }
}

/// The mesoscopic layer.
#[derive(Debug, Serialize)]
pub struct NetworkMesoscopic {
    pub links: BTreeMap<MesoLinkId, MesoscopicLink>,
    pub max_link_id: MesoLinkId,
}

/// Greedy breakpoint placement honoring the minimum spacing.
///
/// Starts from `{0, length}` plus the caller's extra candidates (clamped to
/// the open interval), repeatedly commits the head of the pending list and
/// culls every candidate within ±`resolution` of it. Links no longer than
/// the resolution get an empty list: they stay a single cell.
pub fn place_breakpoints(length: f64, extra: &[f64], resolution: f64) -> Vec<f64> {
    if length <= resolution {
        return Vec::new();
    }
    let mut pending: Vec<f64> = vec![0.0, length];
    pending.extend(extra.iter().copied().filter(|d| *d > 0.0 && *d < length));

    let mut committed: Vec<f64> = Vec::new();
    while let Some(&target) = pending.first() {
        pending.retain(|p| (p - target).abs() > resolution);
        committed.push(target);
    }
    committed.sort_by(f64::total_cmp);
    committed
}

/// Segment every macroscopic link and materialize movement links (S6).
///
/// `extra_breakpoints` supplies additional per-link breakpoint candidates
/// (lane-section bounds and the like); the plain pipeline passes none.
pub fn build_with_breakpoints(
    macro_net: &mut NetworkMacroscopic,
    extra_breakpoints: &BTreeMap<NetworkLinkId, Vec<f64>>,
    config: &BuildConfig,
    projection: &dyn Projection,
) -> Result<NetworkMesoscopic> {
    let mut links: BTreeMap<MesoLinkId, MesoscopicLink> = BTreeMap::new();
    let mut next_id: MesoLinkId = 0;

    // Plain segments, in macroscopic link order.
    let link_ids: Vec<NetworkLinkId> = macro_net.links.keys().copied().collect();
    for link_id in &link_ids {
        let link = macro_net
            .links
            .get_mut(link_id)
            .ok_or_else(|| Error::broken("mesoscopic segmentation", format!("link {link_id}")))?;

        let extra = extra_breakpoints
            .get(link_id)
            .map(Vec::as_slice)
            .unwrap_or(&[]);
        link.breakpoints = place_breakpoints(link.length_meters, extra, config.resolution);

        let windows: Vec<(f64, f64)> = if link.breakpoints.is_empty() {
            vec![(0.0, link.length_meters)]
        } else {
            link.breakpoints
                .windows(2)
                .map(|w| (w[0], w[1]))
                .collect()
        };

        link.lanes_list = vec![link.lanes; link.breakpoints.len().saturating_sub(1)];
        link.lanes_change = vec![[0, 0]; link.breakpoints.len().saturating_sub(1)];
        link.meso_links.clear();

        for (dist_from, dist_to) in windows {
            let geom = line_substring(&link.geom, dist_from, dist_to);
            let id = next_id;
            next_id += 1;
            links.insert(
                id,
                MesoscopicLink {
                    id,
                    macro_link_id: Some(link.id),
                    source_node: link.source_node,
                    target_node: link.target_node,
                    dist_from,
                    dist_to,
                    lanes: link.lanes,
                    lanes_change: [0, 0],
                    length_meters: dist_to - dist_from,
                    geom_euclidean: projection.line_to_euclidean(&geom),
                    geom,
                    movement: None,
                    micro_nodes_per_lane: Vec::new(),
                    micro_nodes_bike: Vec::new(),
                    micro_nodes_walk: Vec::new(),
                },
            );
            link.meso_links.push(id);
        }
    }

    // Movement links, in node then movement order.
    let node_ids: Vec<NetworkNodeId> = macro_net.nodes.keys().copied().collect();
    for node_id in node_ids {
        let movements = macro_net.nodes[&node_id].movements.clone();
        for movement in movements {
            let income_meso = *macro_net
                .links
                .get(&movement.incoming_link)
                .and_then(|l| l.meso_links.last())
                .ok_or_else(|| {
                    Error::broken(
                        "movement materialization",
                        format!(
                            "movement {} incoming link {} has no segments",
                            movement.id, movement.incoming_link
                        ),
                    )
                })?;
            let outcome_meso = *macro_net
                .links
                .get(&movement.outgoing_link)
                .and_then(|l| l.meso_links.first())
                .ok_or_else(|| {
                    Error::broken(
                        "movement materialization",
                        format!(
                            "movement {} outgoing link {} has no segments",
                            movement.id, movement.outgoing_link
                        ),
                    )
                })?;

            let geom = movement.geom.clone();
            let length = haversine_length(&geom);
            let id = next_id;
            next_id += 1;
            links.insert(
                id,
                MesoscopicLink {
                    id,
                    macro_link_id: None,
                    source_node: node_id,
                    target_node: node_id,
                    dist_from: 0.0,
                    dist_to: length,
                    lanes: movement.lanes_num,
                    lanes_change: [0, 0],
                    length_meters: length,
                    geom_euclidean: projection.line_to_euclidean(&geom),
                    geom,
                    movement: Some(MovementRef {
                        movement_id: movement.id,
                        income_meso_link: income_meso,
                        outcome_meso_link: outcome_meso,
                        income_lane_start: movement.income_lane_start - 1,
                        outcome_lane_start: movement.outcome_lane_start - 1,
                    }),
                    micro_nodes_per_lane: Vec::new(),
                    micro_nodes_bike: Vec::new(),
                    micro_nodes_walk: Vec::new(),
                },
            );
        }
    }

    log::info!("mesoscopic layer: {} links", links.len());
    Ok(NetworkMesoscopic {
        max_link_id: next_id,
        links,
    })
}

/// Segment with no extra breakpoint candidates.
pub fn build(
    macro_net: &mut NetworkMacroscopic,
    config: &BuildConfig,
    projection: &dyn Projection,
) -> Result<NetworkMesoscopic> {
    build_with_breakpoints(macro_net, &BTreeMap::new(), config, projection)
}
