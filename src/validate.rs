//! Structural invariant validation over a built network.
//!
//! Fast-fail checks for the cross-level bookkeeping the pipeline promises:
//! length partitions, lane-list shapes, stitching identities, cell-chain
//! consistency and movement reachability. Used by the test suite and
//! available to callers that want a sanity gate before serialization.

use std::collections::HashSet;

use petgraph::algo::has_path_connecting;
use petgraph::graphmap::DiGraphMap;

use crate::microscopic::{MicroLinkType, MicroNodeId};
use crate::network::Network;

/// Length partition tolerance, meters.
const LENGTH_EPS: f64 = 1e-6;

/// Invariant check results.
#[derive(Debug, Default)]
pub struct InvariantReport {
    pub passed: bool,
    pub checks_run: usize,
    pub checks_passed: usize,
    pub errors: Vec<String>,
}

impl InvariantReport {
    fn new() -> Self {
        Self {
            passed: true,
            ..Default::default()
        }
    }

    fn check(&mut self, ok: bool, message: impl FnOnce() -> String) {
        self.checks_run += 1;
        if ok {
            self.checks_passed += 1;
        } else {
            self.passed = false;
            self.errors.push(message());
        }
    }
}

/// Run every structural invariant check.
pub fn validate_network(net: &Network) -> InvariantReport {
    let mut report = InvariantReport::new();

    check_length_partition(net, &mut report);
    check_lane_lists(net, &mut report);
    check_stitching(net, &mut report);
    check_forward_links(net, &mut report);
    check_movement_paths(net, &mut report);
    check_id_ranges(net, &mut report);

    report
}

/// Mesoscopic segments partition their macroscopic link's length.
fn check_length_partition(net: &Network, report: &mut InvariantReport) {
    for link in net.macroscopic.links.values() {
        if link.meso_links.is_empty() {
            continue;
        }
        let total: f64 = link
            .meso_links
            .iter()
            .filter_map(|id| net.mesoscopic.links.get(id))
            .map(|meso| meso.length_meters)
            .sum();
        report.check((total - link.length_meters).abs() <= LENGTH_EPS, || {
            format!(
                "link {}: segment lengths sum to {total}, link length {}",
                link.id, link.length_meters
            )
        });
    }
}

/// `lanes_list` has one entry per breakpoint window.
fn check_lane_lists(net: &Network, report: &mut InvariantReport) {
    for link in net.macroscopic.links.values() {
        let expected = link.breakpoints.len().saturating_sub(1);
        report.check(link.lanes_list.len() == expected, || {
            format!(
                "link {}: lanes_list has {} entries for {} breakpoints",
                link.id,
                link.lanes_list.len(),
                link.breakpoints.len()
            )
        });
        report.check(link.lanes_change.len() == expected, || {
            format!("link {}: lanes_change has {} entries", link.id, link.lanes_change.len())
        });
    }
}

/// Matched lanes of adjacent segments share their boundary cell.
fn check_stitching(net: &Network, report: &mut InvariantReport) {
    for link in net.macroscopic.links.values() {
        for pair in link.meso_links.windows(2) {
            let (Some(up), Some(down)) = (
                net.mesoscopic.links.get(&pair[0]),
                net.mesoscopic.links.get(&pair[1]),
            ) else {
                continue;
            };
            let min_left = up.lanes_change[0].min(down.lanes_change[0]);
            let up_start = up.lanes_change[0] - min_left;
            let down_start = down.lanes_change[0] - min_left;
            let connections = (up.lanes - up_start).min(down.lanes - down_start).max(0);
            for j in 0..connections {
                let up_last = up
                    .micro_nodes_per_lane
                    .get((up_start + j) as usize)
                    .and_then(|chain| chain.last());
                let down_first = down
                    .micro_nodes_per_lane
                    .get((down_start + j) as usize)
                    .and_then(|chain| chain.first());
                report.check(up_last.is_some() && up_last == down_first, || {
                    format!(
                        "links {} -> {}: lane {} not stitched ({up_last:?} vs {down_first:?})",
                        up.id, down.id, j
                    )
                });
            }
        }
    }
}

/// Every forward link of a plain segment connects consecutive cells of one
/// of its owner's chains.
fn check_forward_links(net: &Network, report: &mut InvariantReport) {
    let mut consecutive: HashSet<(MicroNodeId, MicroNodeId)> = HashSet::new();
    for meso in net.mesoscopic.links.values() {
        if meso.is_movement() {
            continue;
        }
        let chains = meso
            .micro_nodes_per_lane
            .iter()
            .chain([&meso.micro_nodes_bike, &meso.micro_nodes_walk]);
        for chain in chains {
            for w in chain.windows(2) {
                consecutive.insert((w[0], w[1]));
            }
        }
    }

    for link in net.microscopic.links.values() {
        if link.link_type != MicroLinkType::Forward {
            continue;
        }
        let owner_is_movement = net
            .mesoscopic
            .links
            .get(&link.meso_link_id)
            .map(|m| m.is_movement())
            .unwrap_or(false);
        if owner_is_movement {
            continue;
        }
        report.check(
            consecutive.contains(&(link.source_node, link.target_node)),
            || {
                format!(
                    "forward micro link {} ({} -> {}) is not a consecutive lane pair",
                    link.id, link.source_node, link.target_node
                )
            },
        );
    }
}

/// Each movement has a microscopic path from its stitched upstream cell to
/// its stitched downstream cell using only channel-owned links.
fn check_movement_paths(net: &Network, report: &mut InvariantReport) {
    for meso in net.mesoscopic.links.values() {
        let Some(movement_ref) = &meso.movement else {
            continue;
        };
        let upstream = net
            .mesoscopic
            .links
            .get(&movement_ref.income_meso_link)
            .and_then(|income| income.micro_nodes_per_lane.get(movement_ref.income_lane_start as usize))
            .and_then(|chain| chain.last().copied());
        let downstream = net
            .mesoscopic
            .links
            .get(&movement_ref.outcome_meso_link)
            .and_then(|outcome| {
                outcome
                    .micro_nodes_per_lane
                    .get(movement_ref.outcome_lane_start as usize)
            })
            .and_then(|chain| chain.first().copied());

        let (Some(upstream), Some(downstream)) = (upstream, downstream) else {
            report.check(false, || {
                format!("movement meso link {}: stitched endpoints missing", meso.id)
            });
            continue;
        };

        let mut channel: DiGraphMap<MicroNodeId, ()> = DiGraphMap::new();
        for link in net.microscopic.links.values() {
            if link.meso_link_id == meso.id {
                channel.add_edge(link.source_node, link.target_node, ());
            }
        }
        report.check(
            channel.contains_node(upstream)
                && channel.contains_node(downstream)
                && has_path_connecting(&channel, upstream, downstream, None),
            || {
                format!(
                    "movement meso link {}: no path {} -> {}",
                    meso.id, upstream, downstream
                )
            },
        );
    }
}

/// IDs are unique (map keys) and stay inside their counter ranges; link IDs
/// are dense since nothing deletes them.
fn check_id_ranges(net: &Network, report: &mut InvariantReport) {
    let max_node = net.microscopic.max_node_id;
    report.check(
        net.microscopic.nodes.keys().all(|&id| id >= 0 && id < max_node),
        || "microscopic node IDs outside counter range".to_string(),
    );

    let expected: Vec<i64> = (0..net.microscopic.max_link_id).collect();
    let actual: Vec<i64> = net.microscopic.links.keys().copied().collect();
    report.check(actual == expected, || {
        "microscopic link IDs are not dense".to_string()
    });

    let macro_links: Vec<i64> = net.macroscopic.links.keys().copied().collect();
    report.check(
        macro_links == (0..macro_links.len() as i64).collect::<Vec<_>>(),
        || "macroscopic link IDs are not dense".to_string(),
    );
    let meso_links: Vec<i64> = net.mesoscopic.links.keys().copied().collect();
    report.check(
        meso_links == (0..net.mesoscopic.max_link_id).collect::<Vec<_>>(),
        || "mesoscopic link IDs are not dense".to_string(),
    );
}
