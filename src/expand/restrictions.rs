//! Turn-restriction enforcement over the expanded edge list.
//!
//! Two in-place filtering passes: prohibitions (`no_*`) first, then mandates
//! (`only_*`). Only the `way(from) - way(to) - node(via)` shape is enforced;
//! two-step `via=way` restrictions and `no_u_turn` are left alone, the
//! former with a counter.

use std::collections::HashSet;

use crate::expand::ExpandedEdge;
use crate::network::BuildSummary;
use crate::osm::restrictions::{MemberRef, RestrictionKind, TurnRestriction};
use crate::osm::OsmWayId;

/// Apply `no_*` and `only_*` restrictions, filtering `expanded` in place (S4).
pub fn apply_turn_restrictions(
    expanded: &mut Vec<ExpandedEdge>,
    restrictions: &[TurnRestriction],
    ways_present: &HashSet<OsmWayId>,
    summary: &mut BuildSummary,
) {
    // Pass 1: prohibitions drop the named turn everywhere it occurs.
    for restriction in restrictions {
        if !restriction.kind.is_prohibition() {
            continue;
        }
        let Some((from_way, to_way, _via)) = way_way_node(restriction) else {
            summary.restrictions_unapplicable += 1;
            continue;
        };
        if !ways_present.contains(&from_way) || !ways_present.contains(&to_way) {
            summary.restrictions_foreign += 1;
            continue;
        }
        let before = expanded.len();
        expanded.retain(|edge| !(edge.source_way == from_way && edge.target_way == to_way));
        summary.turns_removed_no += (before - expanded.len()) as u64;
    }

    // Pass 2: mandates prune every alternative turn at the via node.
    for restriction in restrictions {
        if !restriction.kind.is_mandate() {
            continue;
        }
        let Some((from_way, to_way, via_node)) = way_way_node(restriction) else {
            summary.restrictions_unapplicable += 1;
            continue;
        };
        if !ways_present.contains(&from_way) || !ways_present.contains(&to_way) {
            summary.restrictions_foreign += 1;
            continue;
        }
        let before = expanded.len();
        expanded.retain(|edge| {
            !(edge.source_way == from_way
                && edge.target_way != to_way
                && edge.source_component.target_node == via_node)
        });
        summary.turns_removed_only += (before - expanded.len()) as u64;
    }

    // `no_u_turn` stays parsed but unenforced for now.

    log::info!(
        "restrictions applied: {} turns removed by no_*, {} by only_*, {} kept",
        summary.turns_removed_no,
        summary.turns_removed_only,
        expanded.len()
    );
}

fn way_way_node(restriction: &TurnRestriction) -> Option<(OsmWayId, OsmWayId, i64)> {
    match (restriction.from, restriction.to, restriction.via) {
        (MemberRef::Way(from), MemberRef::Way(to), MemberRef::Node(via)) => Some((from, to, via)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::edges::Edge;
    use crate::expand::expand_edges;
    use geo::{Coord, LineString};

    fn edge(id: i64, way_id: i64, source: i64, target: i64, coords: &[(f64, f64)]) -> Edge {
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

    fn restriction(kind: RestrictionKind, from: i64, to: i64, via: i64) -> TurnRestriction {
        TurnRestriction {
            relation_id: 1,
            kind,
            from: MemberRef::Way(from),
            to: MemberRef::Way(to),
            via: MemberRef::Node(via),
        }
    }

    /// One-way edges into and out of a shared node 1:
    /// way 100 (0→1), way 101 (1→2), way 102 (1→3).
    fn fan_edges() -> Vec<Edge> {
        vec![
            edge(1, 100, 0, 1, &[(0.0, 0.0), (0.001, 0.0)]),
            edge(2, 101, 1, 2, &[(0.001, 0.0), (0.002, 0.0)]),
            edge(3, 102, 1, 3, &[(0.001, 0.0), (0.001, 0.001)]),
        ]
    }

    #[test]
    fn no_restriction_drops_named_turn_only() {
        let mut summary = BuildSummary::default();
        let mut expanded = expand_edges(&fan_edges(), &mut summary);
        assert_eq!(expanded.len(), 2);

        let ways_present = [100, 101, 102].into_iter().collect();
        apply_turn_restrictions(
            &mut expanded,
            &[restriction(RestrictionKind::NoLeftTurn, 100, 102, 1)],
            &ways_present,
            &mut summary,
        );
        assert_eq!(expanded.len(), 1);
        assert_eq!(expanded[0].target_way, 101);
        assert_eq!(summary.turns_removed_no, 1);
    }

    #[test]
    fn only_restriction_prunes_alternatives_at_via() {
        let mut summary = BuildSummary::default();
        let mut expanded = expand_edges(&fan_edges(), &mut summary);

        let ways_present = [100, 101, 102].into_iter().collect();
        apply_turn_restrictions(
            &mut expanded,
            &[restriction(RestrictionKind::OnlyStraightOn, 100, 101, 1)],
            &ways_present,
            &mut summary,
        );
        assert_eq!(expanded.len(), 1);
        assert_eq!(expanded[0].target_way, 101);
        assert_eq!(summary.turns_removed_only, 1);
    }

    #[test]
    fn foreign_restriction_is_ignored() {
        let mut summary = BuildSummary::default();
        let mut expanded = expand_edges(&fan_edges(), &mut summary);

        let ways_present = [100, 101, 102].into_iter().collect();
        apply_turn_restrictions(
            &mut expanded,
            &[restriction(RestrictionKind::NoLeftTurn, 999, 102, 1)],
            &ways_present,
            &mut summary,
        );
        assert_eq!(expanded.len(), 2);
        assert_eq!(summary.restrictions_foreign, 1);
    }

    #[test]
    fn way_way_way_shape_is_counted_not_applied() {
        let mut summary = BuildSummary::default();
        let mut expanded = expand_edges(&fan_edges(), &mut summary);

        let bad_shape = TurnRestriction {
            relation_id: 2,
            kind: RestrictionKind::NoLeftTurn,
            from: MemberRef::Way(100),
            to: MemberRef::Way(102),
            via: MemberRef::Way(101),
        };
        let ways_present = [100, 101, 102].into_iter().collect();
        apply_turn_restrictions(&mut expanded, &[bad_shape], &ways_present, &mut summary);
        assert_eq!(expanded.len(), 2);
        assert_eq!(summary.restrictions_unapplicable, 1);
    }

    #[test]
    fn no_u_turn_is_reserved_and_ignored() {
        let mut summary = BuildSummary::default();
        let mut expanded = expand_edges(&fan_edges(), &mut summary);
        let ways_present = [100, 101, 102].into_iter().collect();
        apply_turn_restrictions(
            &mut expanded,
            &[restriction(RestrictionKind::NoUTurn, 100, 101, 1)],
            &ways_present,
            &mut summary,
        );
        assert_eq!(expanded.len(), 2);
        assert_eq!(summary.turns_removed_no, 0);
    }
}
