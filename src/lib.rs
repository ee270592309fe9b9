//! Roadmesh: multi-resolution road network construction from OSM topology.
//!
//! Pipeline:
//! - S1: Way preparation - tag flattening into typed attributes
//! - S2: Node use-count & edge slicing - directed atomic edges between split nodes
//! - S3: Edge expansion - turn graph with midpoint-joined geometries
//! - S4: Turn-restriction application - `no_*` / `only_*` filtering
//! - S5: Macroscopic assembly - links, intersection nodes, movements
//! - S6: Mesoscopic segmentation - breakpoints, per-segment lane lists, movement links
//! - S7: Microscopic cell graph - lane cells, stitching, movement channels
//! - S8: Boundary & zone propagation
//!
//! Key principle: construction is a deterministic transform. Given the same
//! input records and options, entity IDs and orderings are reproducible
//! (see [`Network::fingerprint`]).
//!
//! Parsing, file I/O and output formats stay outside this crate: the
//! pipeline consumes in-memory record streams ([`WayRecord`],
//! [`NodeRecord`], [`RelationRecord`]) and hands the three-level
//! [`Network`] triple to whatever serializer the caller prefers. Projection
//! mathematics is pluggable through [`Projection`]; [`WebMercator`] is the
//! deterministic default.

pub mod config;
pub mod edges;
pub mod error;
pub mod expand;
pub mod geo;
pub mod macroscopic;
pub mod mesoscopic;
pub mod microscopic;
pub mod network;
pub mod osm;
pub mod validate;

pub use self::config::BuildConfig;
pub use self::error::{Error, Result};
pub use self::geo::{Projection, WebMercator};
pub use self::network::{BuildSummary, Network};
pub use self::osm::{MemberType, NodeRecord, OsmInput, RelationMember, RelationRecord, WayRecord};

/// Build the three-level network with the default projection.
pub fn build_network(input: OsmInput, config: &BuildConfig) -> Result<Network> {
    build_network_with(input, config, &WebMercator)
}

/// Build the three-level network with a caller-supplied projection.
pub fn build_network_with(
    mut input: OsmInput,
    config: &BuildConfig,
    projection: &dyn Projection,
) -> Result<Network> {
    let mut summary = std::mem::take(&mut input.summary);

    let edges = edges::slice_ways(&input)?;
    let mut expanded = expand::expand_edges(&edges, &mut summary);
    expand::restrictions::apply_turn_restrictions(
        &mut expanded,
        &input.restrictions,
        &input.ways_present,
        &mut summary,
    );

    let mut macro_net = macroscopic::assemble(&input, &edges, &expanded, projection)?;
    let mut meso_net = mesoscopic::build(&mut macro_net, config, projection)?;
    let micro_net = microscopic::build(&macro_net, &mut meso_net, config, projection, &mut summary)?;

    log::info!(
        "build complete: {} macro nodes, {} macro links, {} meso links, {} micro nodes, {} micro links",
        macro_net.nodes.len(),
        macro_net.links.len(),
        meso_net.links.len(),
        micro_net.nodes.len(),
        micro_net.links.len(),
    );
    log::info!(
        "warnings: {} malformed lanes, {} malformed maxspeed, {} unhandled oneway, \
         {} restriction shapes skipped, {} cycles rejected, {} suspicious links",
        summary.malformed_lanes,
        summary.malformed_maxspeed,
        summary.unhandled_oneway,
        summary.restrictions_skipped,
        summary.cycles_rejected,
        summary.suspicious_links,
    );

    Ok(Network {
        macroscopic: macro_net,
        mesoscopic: meso_net,
        microscopic: micro_net,
        summary,
    })
}
