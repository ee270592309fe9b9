//! Intersection movement expansion: per-lane channels through a junction.
//!
//! Every mesoscopic movement link gets one cell chain per lane, running from
//! the last cell of the matched incoming lane to the first cell of the
//! matched outgoing lane along a straight line. The first emitted edge of
//! each chain carries the `is_first_movement` flag.

use geo::LineString;

use crate::config::BuildConfig;
use crate::error::{Error, Result};
use crate::geo::{haversine_length, point_along_line, Projection};
use crate::macroscopic::NetworkMacroscopic;
use crate::mesoscopic::{MesoLinkId, NetworkMesoscopic};
use crate::microscopic::{MicroLinkType, MicroNodeId, NetworkMicroscopic};
use crate::osm::tags::AgentType;

/// Materialize the microscopic channels of every movement link (H).
pub(crate) fn connect_movements(
    micro: &mut NetworkMicroscopic,
    meso_net: &mut NetworkMesoscopic,
    macro_net: &NetworkMacroscopic,
    config: &BuildConfig,
    projection: &dyn Projection,
) -> Result<()> {
    let stage = "movement expansion";
    let movement_ids: Vec<MesoLinkId> = meso_net
        .links
        .iter()
        .filter(|(_, link)| link.is_movement())
        .map(|(id, _)| *id)
        .collect();

    for meso_id in movement_ids {
        let (lanes, movement_ref, node_id) = {
            let meso = &meso_net.links[&meso_id];
            let Some(movement_ref) = meso.movement.clone() else {
                continue;
            };
            (meso.lanes, movement_ref, meso.source_node)
        };

        // Agent types come from the macroscopic movement record.
        let allowed: Vec<AgentType> = macro_net
            .nodes
            .get(&node_id)
            .and_then(|node| {
                node.movements
                    .iter()
                    .find(|m| m.id == movement_ref.movement_id)
            })
            .map(|m| m.allowed_agent_types.clone())
            .unwrap_or_default();

        let income_chains = {
            let income = meso_net.links.get(&movement_ref.income_meso_link).ok_or_else(|| {
                Error::broken(
                    stage,
                    format!(
                        "income meso link {} for movement link {meso_id}",
                        movement_ref.income_meso_link
                    ),
                )
            })?;
            income.micro_nodes_per_lane.clone()
        };
        let outcome_chains = {
            let outcome = meso_net.links.get(&movement_ref.outcome_meso_link).ok_or_else(|| {
                Error::broken(
                    stage,
                    format!(
                        "outcome meso link {} for movement link {meso_id}",
                        movement_ref.outcome_meso_link
                    ),
                )
            })?;
            outcome.micro_nodes_per_lane.clone()
        };

        let mut new_lane_chains: Vec<Vec<MicroNodeId>> = Vec::with_capacity(lanes.max(0) as usize);
        for i in 0..lanes {
            let income_lane = (movement_ref.income_lane_start + i) as usize;
            let outcome_lane = (movement_ref.outcome_lane_start + i) as usize;

            let upstream = income_chains
                .get(income_lane)
                .and_then(|chain| chain.last().copied())
                .ok_or_else(|| {
                    Error::broken(
                        stage,
                        format!("movement link {meso_id}: income lane {income_lane} has no cells"),
                    )
                })?;
            let downstream = outcome_chains
                .get(outcome_lane)
                .and_then(|chain| chain.first().copied())
                .ok_or_else(|| {
                    Error::broken(
                        stage,
                        format!("movement link {meso_id}: outcome lane {outcome_lane} has no cells"),
                    )
                })?;

            let (up_geom, down_geom) = {
                let up = micro
                    .nodes
                    .get(&upstream)
                    .ok_or_else(|| Error::broken(stage, format!("micro node {upstream}")))?;
                let down = micro
                    .nodes
                    .get(&downstream)
                    .ok_or_else(|| Error::broken(stage, format!("micro node {downstream}")))?;
                (up.geom, down.geom)
            };

            let lane_geom = LineString::new(vec![up_geom.0, down_geom.0]);
            let lane_length = haversine_length(&lane_geom);
            // Cell placement uses the straight-line length itself so the
            // intermediate cells never leave the channel.
            let cells_num = ((lane_length / config.cell_length).round() as usize).max(1);

            let mut chain: Vec<MicroNodeId> = Vec::with_capacity(cells_num.saturating_sub(1));
            let mut previous = upstream;
            let mut first_emitted = false;
            for j in 1..cells_num {
                let fraction = j as f64 / cells_num as f64;
                let point = point_along_line(&lane_geom, lane_length * fraction);
                let node_id = micro.alloc_node(meso_id, i + 1, point, projection.to_euclidean(point));
                chain.push(node_id);
                micro.add_link(
                    previous,
                    node_id,
                    meso_id,
                    MicroLinkType::Forward,
                    allowed.clone(),
                    !first_emitted,
                    stage,
                )?;
                first_emitted = true;
                previous = node_id;
            }
            micro.add_link(
                previous,
                downstream,
                meso_id,
                MicroLinkType::Forward,
                allowed.clone(),
                !first_emitted,
                stage,
            )?;

            new_lane_chains.push(chain);
        }

        if let Some(meso) = meso_net.links.get_mut(&meso_id) {
            meso.micro_nodes_per_lane = new_lane_chains;
        }
    }

    Ok(())
}
