//! Build options recognized by the construction pipeline.

use std::collections::HashSet;

use serde::Deserialize;

/// Options controlling every stage of the build.
///
/// The struct deserializes from whatever configuration source the caller
/// uses; all fields have working defaults so partial configs are fine.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    /// OSM tag whose presence marks a way as in-scope.
    pub entity_name: String,

    /// Values of the entity tag that admit a way. An empty set admits
    /// every value (negligible classes are still dropped).
    pub accepted_tag_values: HashSet<String>,

    /// Synthesize dedicated bike/walk lane chains at the microscopic level.
    pub separate_bike_walk: bool,

    /// Minimum mesoscopic breakpoint spacing, meters.
    pub resolution: f64,

    /// Microscopic cell length, meters.
    pub cell_length: f64,

    /// Lateral spacing between lane centerlines, meters.
    pub lane_width: f64,

    /// Lateral offset of the bike chain beyond the outermost traffic lane, meters.
    pub bike_lane_width: f64,

    /// Lateral offset of the walk chain beyond the bike chain (or the
    /// outermost lane when no bike chain is requested), meters.
    pub walk_lane_width: f64,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            entity_name: "highway".to_string(),
            accepted_tag_values: HashSet::new(),
            separate_bike_walk: false,
            resolution: 5.0,
            cell_length: 4.5,
            lane_width: 3.5,
            bike_lane_width: 0.5,
            walk_lane_width: 0.5,
        }
    }
}

impl BuildConfig {
    /// Whether a value of the entity tag admits the way.
    pub fn accepts(&self, tag_value: &str) -> bool {
        self.accepted_tag_values.is_empty() || self.accepted_tag_values.contains(tag_value)
    }
}
