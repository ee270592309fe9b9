//! Tag flattening: converts the raw OSM tag bag into typed way attributes.
//!
//! Every parse failure here is non-fatal: the field receives a `-1` sentinel
//! and a warning counter is bumped on the build summary.

use std::collections::{HashMap, HashSet};

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use crate::network::BuildSummary;

/// Travel modes a link can admit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentType {
    Auto,
    Bike,
    Walk,
}

/// Intersection control derived from the OSM node `highway` tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ControlType {
    #[default]
    None,
    Signal,
    Stop,
}

/// The `oneway` tri-state after flattening.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Oneway {
    Yes,
    No,
    /// `oneway=-1`: one-way against the drawn direction; the node list is
    /// reversed at intake so downstream stages treat it as forward one-way.
    Reversed,
}

impl Oneway {
    pub fn is_oneway(self) -> bool {
        !matches!(self, Oneway::No)
    }
}

/// Functional road class, with `_link` ramps folded into their parent class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkClass {
    Motorway,
    Trunk,
    Primary,
    Secondary,
    Tertiary,
    Unclassified,
    Residential,
    LivingStreet,
    Service,
    Track,
    Cycleway,
    Footway,
    Path,
    Pedestrian,
    Steps,
    Other,
}

impl LinkClass {
    pub fn from_highway(value: &str) -> LinkClass {
        let base = value.strip_suffix("_link").unwrap_or(value);
        match base {
            "motorway" => LinkClass::Motorway,
            "trunk" => LinkClass::Trunk,
            "primary" => LinkClass::Primary,
            "secondary" => LinkClass::Secondary,
            "tertiary" => LinkClass::Tertiary,
            "unclassified" => LinkClass::Unclassified,
            "residential" => LinkClass::Residential,
            "living_street" => LinkClass::LivingStreet,
            "service" => LinkClass::Service,
            "track" => LinkClass::Track,
            "cycleway" => LinkClass::Cycleway,
            "footway" => LinkClass::Footway,
            "path" => LinkClass::Path,
            "pedestrian" => LinkClass::Pedestrian,
            "steps" => LinkClass::Steps,
            _ => LinkClass::Other,
        }
    }

    /// Lane count assumed when the `lanes` tag is absent or malformed.
    pub fn default_lanes(self) -> i32 {
        match self {
            LinkClass::Motorway => 4,
            LinkClass::Trunk | LinkClass::Primary => 3,
            LinkClass::Secondary | LinkClass::Tertiary => 2,
            _ => 1,
        }
    }

    /// Free speed (km/h) assumed when `maxspeed` is absent or malformed.
    pub fn default_speed_kmh(self) -> f64 {
        match self {
            LinkClass::Motorway => 110.0,
            LinkClass::Trunk => 90.0,
            LinkClass::Primary => 70.0,
            LinkClass::Secondary => 60.0,
            LinkClass::Tertiary => 50.0,
            LinkClass::Unclassified => 50.0,
            LinkClass::Residential => 30.0,
            LinkClass::LivingStreet => 10.0,
            LinkClass::Service | LinkClass::Track => 20.0,
            LinkClass::Cycleway => 15.0,
            LinkClass::Footway | LinkClass::Path | LinkClass::Pedestrian | LinkClass::Steps => 5.0,
            LinkClass::Other => 30.0,
        }
    }
}

/// `junction` values that imply one-way without an explicit `oneway` tag.
static ROUNDABOUT_JUNCTIONS: Lazy<HashSet<&'static str>> =
    Lazy::new(|| ["roundabout", "circular", "jughandle"].into_iter().collect());

/// `oneway` values describing time-dependent direction; treated as
/// bidirectional with a warning.
static REVERSIBLE_ONEWAY: Lazy<HashSet<&'static str>> =
    Lazy::new(|| ["reversible", "alternating"].into_iter().collect());

/// `highway` values that never contribute to the drivable graph.
static NEGLIGIBLE_HIGHWAYS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    ["construction", "proposed", "abandoned", "planned", "razed", "raceway", "escape"]
        .into_iter()
        .collect()
});

/// `highway` values marking point-of-interest ways.
static POI_HIGHWAYS: Lazy<HashSet<&'static str>> =
    Lazy::new(|| ["bus_stop", "platform", "rest_area", "services"].into_iter().collect());

/// `railway` values marking point-of-interest ways.
static POI_RAILWAYS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    ["station", "halt", "platform", "tram_stop", "depot", "workshop"]
        .into_iter()
        .collect()
});

/// `aeroway` values marking point-of-interest ways.
static POI_AEROWAYS: Lazy<HashSet<&'static str>> =
    Lazy::new(|| ["aerodrome", "terminal", "gate", "helipad"].into_iter().collect());

static DIGITS_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+").unwrap());
static KMH_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*(\d+(?:\.\d+)?)\s*(?:km/h)?\s*$").unwrap());
static MPH_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*(\d+(?:\.\d+)?)\s*mph\s*$").unwrap());

const MPH_TO_KMH: f64 = 1.609_344;

pub fn is_negligible_highway(value: &str) -> bool {
    NEGLIGIBLE_HIGHWAYS.contains(value)
}

/// A way is a POI if it carries `building`, `amenity` or `leisure`, or a
/// whitelisted `highway`/`railway`/`aeroway` value.
pub fn is_poi(tags: &HashMap<String, String>) -> bool {
    if tags.contains_key("building") || tags.contains_key("amenity") || tags.contains_key("leisure")
    {
        return true;
    }
    if let Some(v) = tags.get("highway") {
        if POI_HIGHWAYS.contains(v.as_str()) {
            return true;
        }
    }
    if let Some(v) = tags.get("railway") {
        if POI_RAILWAYS.contains(v.as_str()) {
            return true;
        }
    }
    if let Some(v) = tags.get("aeroway") {
        if POI_AEROWAYS.contains(v.as_str()) {
            return true;
        }
    }
    false
}

/// Flatten the `oneway` tag. Returns the tri-state plus whether the value
/// was defaulted (no tag, no roundabout implication).
pub fn parse_oneway(
    tags: &HashMap<String, String>,
    way_id: i64,
    summary: &mut BuildSummary,
) -> (Oneway, bool) {
    match tags.get("oneway").map(String::as_str) {
        Some("yes") | Some("1") => (Oneway::Yes, false),
        Some("no") | Some("0") => (Oneway::No, false),
        Some("-1") => (Oneway::Reversed, false),
        Some(other) => {
            if REVERSIBLE_ONEWAY.contains(other) {
                // Direction depends on time of day; fall back to bidirectional.
                log::debug!("way {way_id}: time-dependent oneway value '{other}'");
                summary.reversible_oneway += 1;
                (Oneway::No, false)
            } else {
                log::warn!("way {way_id}: unhandled oneway value '{other}'");
                summary.unhandled_oneway += 1;
                (Oneway::No, false)
            }
        }
        None => {
            let junction = tags.get("junction").map(String::as_str).unwrap_or("");
            if ROUNDABOUT_JUNCTIONS.contains(junction) {
                (Oneway::Yes, false)
            } else {
                (Oneway::No, true)
            }
        }
    }
}

/// Integer parse after digit extraction, `-1` on failure.
pub fn parse_lanes(value: &str, way_id: i64, field: &str, summary: &mut BuildSummary) -> i32 {
    match DIGITS_RE.find(value).and_then(|m| m.as_str().parse::<i32>().ok()) {
        Some(n) => n,
        None => {
            log::warn!("way {way_id}: `{field}` tag value should be an integer, got '{value}'");
            summary.malformed_lanes += 1;
            -1
        }
    }
}

/// Parse `maxspeed` into km/h, `-1.0` on failure. Unit-less values are
/// treated as km/h per OSM convention.
pub fn parse_maxspeed(value: &str, way_id: i64, summary: &mut BuildSummary) -> f64 {
    if let Some(caps) = KMH_RE.captures(value) {
        if let Ok(v) = caps[1].parse::<f64>() {
            return v;
        }
    }
    if let Some(caps) = MPH_RE.captures(value) {
        if let Ok(v) = caps[1].parse::<f64>() {
            return v * MPH_TO_KMH;
        }
    }
    log::warn!("way {way_id}: `maxspeed` tag value not recognized, got '{value}'");
    summary.malformed_maxspeed += 1;
    -1.0
}

/// Intersection control from the node `highway` tag.
pub fn control_type_for_node(highway: Option<&str>) -> ControlType {
    match highway {
        Some("traffic_signals") => ControlType::Signal,
        Some("stop") => ControlType::Stop,
        _ => ControlType::None,
    }
}

fn access_denied(value: Option<&str>) -> bool {
    matches!(value, Some("no") | Some("private"))
}

/// Allowed agent types for a way: a per-class base set adjusted by explicit
/// access tags (`motor_vehicle`, `motorcar`, `bicycle`, `foot`).
pub fn agent_types_for(class: LinkClass, tags: &HashMap<String, String>) -> Vec<AgentType> {
    let mut auto;
    let mut bike;
    let mut walk;
    match class {
        LinkClass::Motorway | LinkClass::Trunk => {
            auto = true;
            bike = false;
            walk = false;
        }
        LinkClass::Cycleway => {
            auto = false;
            bike = true;
            walk = false;
        }
        LinkClass::Footway | LinkClass::Path | LinkClass::Pedestrian | LinkClass::Steps => {
            auto = false;
            bike = false;
            walk = true;
        }
        _ => {
            auto = true;
            bike = true;
            walk = true;
        }
    }

    let motor_vehicle = tags.get("motor_vehicle").map(String::as_str);
    let motorcar = tags.get("motorcar").map(String::as_str);
    if access_denied(motor_vehicle) || access_denied(motorcar) {
        auto = false;
    }
    match tags.get("bicycle").map(String::as_str) {
        Some("yes") | Some("designated") => bike = true,
        v if access_denied(v) => bike = false,
        _ => {}
    }
    match tags.get("foot").map(String::as_str) {
        Some("yes") | Some("designated") => walk = true,
        v if access_denied(v) => walk = false,
        _ => {}
    }

    let mut out = Vec::with_capacity(3);
    if auto {
        out.push(AgentType::Auto);
    }
    if bike {
        out.push(AgentType::Bike);
    }
    if walk {
        out.push(AgentType::Walk);
    }
    out
}
