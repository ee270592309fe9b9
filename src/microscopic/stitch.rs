//! Inter-segment lane stitching.
//!
//! For each adjacent pair of segments on the same macroscopic link, the last
//! cell of every matched upstream lane is replaced by the first cell of the
//! corresponding downstream lane, and the superseded node is deleted. This
//! is the only place microscopic nodes are mutated after allocation.

use crate::error::{Error, Result};
use crate::mesoscopic::{MesoLinkId, NetworkMesoscopic};
use crate::microscopic::{MicroNodeId, NetworkMicroscopic};

/// Stitch every adjacent segment pair of one macroscopic link (F).
pub(crate) fn stitch_link_segments(
    micro: &mut NetworkMicroscopic,
    meso_net: &mut NetworkMesoscopic,
    meso_ids: &[MesoLinkId],
) -> Result<()> {
    for pair in meso_ids.windows(2) {
        stitch_pair(micro, meso_net, pair[0], pair[1])?;
    }
    Ok(())
}

fn stitch_pair(
    micro: &mut NetworkMicroscopic,
    meso_net: &mut NetworkMesoscopic,
    upstream_id: MesoLinkId,
    downstream_id: MesoLinkId,
) -> Result<()> {
    let stage = "lane stitching";

    let (down_left_change, down_lanes, down_firsts, down_bike_first, down_walk_first) = {
        let down = meso_net
            .links
            .get(&downstream_id)
            .ok_or_else(|| Error::broken(stage, format!("meso link {downstream_id}")))?;
        let firsts: Vec<Option<MicroNodeId>> = down
            .micro_nodes_per_lane
            .iter()
            .map(|chain| chain.first().copied())
            .collect();
        (
            down.lanes_change[0],
            down.lanes,
            firsts,
            down.micro_nodes_bike.first().copied(),
            down.micro_nodes_walk.first().copied(),
        )
    };

    let up = meso_net
        .links
        .get_mut(&upstream_id)
        .ok_or_else(|| Error::broken(stage, format!("meso link {upstream_id}")))?;

    let up_left_change = up.lanes_change[0];
    let min_left = up_left_change.min(down_left_change);
    let up_start = up_left_change - min_left;
    let down_start = down_left_change - min_left;
    let connections = (up.lanes - up_start).min(down_lanes - down_start).max(0);

    let mut superseded: Vec<MicroNodeId> = Vec::new();
    for j in 0..connections {
        let up_lane = (up_start + j) as usize;
        let down_lane = (down_start + j) as usize;
        let Some(down_first) = down_firsts.get(down_lane).copied().flatten() else {
            return Err(Error::broken(
                stage,
                format!("downstream meso link {downstream_id} lane {down_lane} has no cells"),
            ));
        };
        let Some(chain) = up.micro_nodes_per_lane.get_mut(up_lane) else {
            return Err(Error::broken(
                stage,
                format!("upstream meso link {upstream_id} lane {up_lane} missing"),
            ));
        };
        let Some(last_slot) = chain.last_mut() else {
            continue;
        };
        superseded.push(*last_slot);
        *last_slot = down_first;
    }

    // Bike and walk chains stitch with a single connection each.
    if let (Some(down_first), Some(last_slot)) = (down_bike_first, up.micro_nodes_bike.last_mut()) {
        superseded.push(*last_slot);
        *last_slot = down_first;
    }
    if let (Some(down_first), Some(last_slot)) = (down_walk_first, up.micro_nodes_walk.last_mut()) {
        superseded.push(*last_slot);
        *last_slot = down_first;
    }

    for node_id in superseded {
        micro.nodes.remove(&node_id);
    }
    Ok(())
}
