//! Boundary propagation from macroscopic endpoints to microscopic cells.
//!
//! Only cells flagged as link upstream/downstream targets inherit a boundary
//! type; every other cell is interior to its link and stays `None`.

use crate::error::{Error, Result};
use crate::macroscopic::{BoundaryType, NetworkMacroscopic};
use crate::mesoscopic::NetworkMesoscopic;
use crate::microscopic::NetworkMicroscopic;

/// Propagate boundary types onto every microscopic node (I).
pub(crate) fn propagate(
    micro: &mut NetworkMicroscopic,
    meso_net: &NetworkMesoscopic,
    macro_net: &NetworkMacroscopic,
) -> Result<()> {
    let stage = "boundary propagation";
    for node in micro.nodes.values_mut() {
        if node.meso_link_id < 0 {
            node.boundary_type = BoundaryType::None;
            continue;
        }
        let meso = meso_net
            .links
            .get(&node.meso_link_id)
            .ok_or_else(|| {
                Error::broken(
                    stage,
                    format!("meso link {} for micro node {}", node.meso_link_id, node.id),
                )
            })?;

        if node.is_upstream_target {
            let source = macro_net.nodes.get(&meso.source_node).ok_or_else(|| {
                Error::broken(stage, format!("macro node {} for meso link {}", meso.source_node, meso.id))
            })?;
            node.boundary_type = source.boundary_type;
        } else if node.is_downstream_target {
            let target = macro_net.nodes.get(&meso.target_node).ok_or_else(|| {
                Error::broken(stage, format!("macro node {} for meso link {}", meso.target_node, meso.id))
            })?;
            node.boundary_type = target.boundary_type;
        } else {
            node.boundary_type = BoundaryType::None;
        }
    }
    Ok(())
}
