//! The assembled three-level network and its build summary.

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::macroscopic::NetworkMacroscopic;
use crate::mesoscopic::NetworkMesoscopic;
use crate::microscopic::NetworkMicroscopic;

/// Counters for every non-fatal condition met during a build.
///
/// The pipeline is all-or-nothing: anything not counted here aborts the
/// build through [`crate::error::Error`] instead.
#[derive(Debug, Default, Clone, Serialize)]
pub struct BuildSummary {
    // Intake.
    pub ways_admitted: u64,
    pub ways_filtered: u64,
    pub ways_poi: u64,
    pub ways_area: u64,
    pub ways_negligible: u64,
    pub malformed_lanes: u64,
    pub malformed_maxspeed: u64,
    /// `oneway` values outside the recognized vocabulary.
    pub unhandled_oneway: u64,
    /// Well-formed `reversible`/`alternating` oneway values resolved to
    /// bidirectional.
    pub reversible_oneway: u64,
    /// Relations without exactly three `from`/`to`/`via` members.
    pub restrictions_skipped: u64,
    pub restriction_unknown_roles: u64,
    /// Restriction tags outside the supported vocabulary.
    pub restrictions_unrecognized: u64,

    // Expansion.
    pub cycles_rejected: u64,

    // Restriction application.
    pub turns_removed_no: u64,
    pub turns_removed_only: u64,
    /// Valid relations whose member types are not `way-way-node`.
    pub restrictions_unapplicable: u64,
    /// Restrictions referencing ways outside the extract.
    pub restrictions_foreign: u64,

    // Microscopic construction.
    pub suspicious_links: u64,
}

/// The output triple handed to a serializer, plus the build summary.
#[derive(Debug, Serialize)]
pub struct Network {
    pub macroscopic: NetworkMacroscopic,
    pub mesoscopic: NetworkMesoscopic,
    pub microscopic: NetworkMicroscopic,
    pub summary: BuildSummary,
}

impl Network {
    /// Digest over the canonical entity ordering.
    ///
    /// Two builds from the same input and options produce the same
    /// fingerprint; the determinism tests rely on this.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();

        for node in self.macroscopic.nodes.values() {
            hasher.update(node.id.to_le_bytes());
            hasher.update(node.osm_node_id.to_le_bytes());
            hasher.update(node.zone_id.to_le_bytes());
            hasher.update((node.movements.len() as u64).to_le_bytes());
        }
        for link in self.macroscopic.links.values() {
            hasher.update(link.id.to_le_bytes());
            hasher.update(link.source_node.to_le_bytes());
            hasher.update(link.target_node.to_le_bytes());
            hasher.update(link.lanes.to_le_bytes());
            hasher.update(link.length_meters.to_bits().to_le_bytes());
        }
        for link in self.mesoscopic.links.values() {
            hasher.update(link.id.to_le_bytes());
            hasher.update(link.lanes.to_le_bytes());
            hasher.update(link.length_meters.to_bits().to_le_bytes());
            for chain in &link.micro_nodes_per_lane {
                for id in chain {
                    hasher.update(id.to_le_bytes());
                }
            }
        }
        for node in self.microscopic.nodes.values() {
            hasher.update(node.id.to_le_bytes());
            hasher.update(node.lane_id.to_le_bytes());
            hasher.update(node.meso_link_id.to_le_bytes());
            hasher.update(node.geom.x().to_bits().to_le_bytes());
            hasher.update(node.geom.y().to_bits().to_le_bytes());
        }
        for link in self.microscopic.links.values() {
            hasher.update(link.id.to_le_bytes());
            hasher.update(link.source_node.to_le_bytes());
            hasher.update(link.target_node.to_le_bytes());
        }

        let digest = hasher.finalize();
        let mut out = String::with_capacity(64);
        for byte in digest {
            out.push_str(&format!("{byte:02x}"));
        }
        out
    }
}
