//! Intersection movements: legal turns between macroscopic links.
//!
//! A movement pairs an incoming link with an outgoing link at a node,
//! labelled by a geometric turn classifier and annotated with the lane
//! ranges it connects. Lane index 0 is the rightmost lane; matching pairs
//! the rightmost `k = min(in, out)` lanes of both sides.

use geo::{Coord, LineString};
use serde::Serialize;

use crate::osm::tags::{AgentType, ControlType};
use super::{MovementId, NetworkLinkId, NetworkNodeId};

/// Turn classification thresholds, in degrees. The signed angle is measured
/// between the Euclidean tail direction of the incoming geometry and the
/// head direction of the outgoing one; positive angles turn left
/// (counterclockwise).
pub const THROUGH_MAX_ANGLE_DEG: f64 = 45.0;
pub const UTURN_MIN_ANGLE_DEG: f64 = 160.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MovementType {
    Through,
    Left,
    Right,
    UTurn,
}

/// A legal turn at an intersection, materialized into a mesoscopic movement
/// link by the segmentation stage.
#[derive(Debug, Clone, Serialize)]
pub struct Movement {
    pub id: MovementId,
    pub node_id: NetworkNodeId,
    pub incoming_link: NetworkLinkId,
    pub outgoing_link: NetworkLinkId,
    pub movement_type: MovementType,
    /// 1-based inclusive lane ranges; lane 1 is the rightmost lane.
    pub income_lane_start: i32,
    pub income_lane_end: i32,
    pub outcome_lane_start: i32,
    pub outcome_lane_end: i32,
    pub lanes_num: i32,
    pub control_type: ControlType,
    pub allowed_agent_types: Vec<AgentType>,
    pub geom: LineString<f64>,
}

/// Classify a turn from the Euclidean geometries of the two links.
pub fn classify_turn(income: &LineString<f64>, outcome: &LineString<f64>) -> MovementType {
    let Some(a) = tail_direction(income) else {
        return MovementType::Through;
    };
    let Some(b) = head_direction(outcome) else {
        return MovementType::Through;
    };
    let angle = signed_angle_deg(a, b);
    if angle.abs() <= THROUGH_MAX_ANGLE_DEG {
        MovementType::Through
    } else if angle.abs() >= UTURN_MIN_ANGLE_DEG {
        MovementType::UTurn
    } else if angle > 0.0 {
        MovementType::Left
    } else {
        MovementType::Right
    }
}

/// Rightmost-`k` lane matching between an incoming and an outgoing link.
///
/// Returns 0-based inclusive `(income, outcome)` ranges.
pub fn lane_connection(in_lanes: i32, out_lanes: i32) -> ((i32, i32), (i32, i32)) {
    let k = in_lanes.min(out_lanes).max(1);
    ((0, k - 1), (0, k - 1))
}

/// Straight bridging geometry between the downstream end of the incoming
/// link and the upstream end of the outgoing one. At an untrimmed
/// intersection both ends coincide with the node itself.
pub fn movement_geom(income: &LineString<f64>, outcome: &LineString<f64>) -> LineString<f64> {
    let from = income.0.last().copied().unwrap_or(Coord { x: 0.0, y: 0.0 });
    let to = outcome.0.first().copied().unwrap_or(from);
    LineString::new(vec![from, to])
}

/// Direction of the last non-degenerate segment.
fn tail_direction(line: &LineString<f64>) -> Option<(f64, f64)> {
    let pts = &line.0;
    for w in pts.windows(2).rev() {
        let dx = w[1].x - w[0].x;
        let dy = w[1].y - w[0].y;
        if dx != 0.0 || dy != 0.0 {
            return Some((dx, dy));
        }
    }
    None
}

/// Direction of the first non-degenerate segment.
fn head_direction(line: &LineString<f64>) -> Option<(f64, f64)> {
    let pts = &line.0;
    for w in pts.windows(2) {
        let dx = w[1].x - w[0].x;
        let dy = w[1].y - w[0].y;
        if dx != 0.0 || dy != 0.0 {
            return Some((dx, dy));
        }
    }
    None
}

fn signed_angle_deg(a: (f64, f64), b: (f64, f64)) -> f64 {
    let cross = a.0 * b.1 - a.1 * b.0;
    let dot = a.0 * b.0 + a.1 * b.1;
    cross.atan2(dot).to_degrees()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(coords: &[(f64, f64)]) -> LineString<f64> {
        LineString::new(coords.iter().map(|&(x, y)| Coord { x, y }).collect())
    }

    #[test]
    fn classifier_covers_all_quadrants() {
        let east = line(&[(0.0, 0.0), (100.0, 0.0)]);
        let east_on = line(&[(100.0, 0.0), (200.0, 0.0)]);
        let north = line(&[(100.0, 0.0), (100.0, 100.0)]);
        let south = line(&[(100.0, 0.0), (100.0, -100.0)]);
        let west = line(&[(100.0, 0.0), (0.0, 0.0)]);

        assert_eq!(classify_turn(&east, &east_on), MovementType::Through);
        assert_eq!(classify_turn(&east, &north), MovementType::Left);
        assert_eq!(classify_turn(&east, &south), MovementType::Right);
        assert_eq!(classify_turn(&east, &west), MovementType::UTurn);
    }

    #[test]
    fn classifier_uses_tail_and_head_segments() {
        // A curved approach: only the final segment heading north matters.
        let income = line(&[(0.0, 0.0), (100.0, 0.0), (100.0, 100.0)]);
        let outcome = line(&[(100.0, 100.0), (100.0, 200.0), (0.0, 200.0)]);
        assert_eq!(classify_turn(&income, &outcome), MovementType::Through);
    }

    #[test]
    fn threshold_boundaries() {
        let east = line(&[(0.0, 0.0), (100.0, 0.0)]);
        // 44° is still through, 46° is a left.
        let through_ish = line(&[(100.0, 0.0), (100.0 + 44f64.to_radians().cos() * 100.0, 44f64.to_radians().sin() * 100.0)]);
        let left_ish = line(&[(100.0, 0.0), (100.0 + 46f64.to_radians().cos() * 100.0, 46f64.to_radians().sin() * 100.0)]);
        assert_eq!(classify_turn(&east, &through_ish), MovementType::Through);
        assert_eq!(classify_turn(&east, &left_ish), MovementType::Left);
    }

    #[test]
    fn lane_matching_is_rightmost_k() {
        assert_eq!(lane_connection(3, 2), ((0, 1), (0, 1)));
        assert_eq!(lane_connection(2, 3), ((0, 1), (0, 1)));
        assert_eq!(lane_connection(1, 1), ((0, 0), (0, 0)));
    }
}
