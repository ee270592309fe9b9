//! Error types for the roadmesh construction pipeline.
//!
//! Fatal conditions abort the whole build; everything recoverable is counted
//! in [`crate::network::BuildSummary`] instead of being raised here.

use std::fmt;

/// Main error type for network construction.
#[derive(Debug)]
pub enum Error {
    /// A way references a node that is absent from the node table.
    MissingNode { way_id: i64, node_id: i64 },

    /// A cross-structure ID failed to resolve during graph construction.
    ///
    /// This always indicates a programming error in the pipeline, not bad
    /// input; `stage` names the construction stage that hit the miss.
    BrokenReference {
        stage: &'static str,
        details: String,
    },

    /// The configuration admitted no ways, so there is nothing to build.
    EmptyNetwork,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::MissingNode { way_id, node_id } => {
                write!(f, "way {way_id} references missing node {node_id}")
            }
            Error::BrokenReference { stage, details } => {
                write!(f, "broken reference in {stage}: {details}")
            }
            Error::EmptyNetwork => {
                write!(f, "no ways admitted by the current configuration")
            }
        }
    }
}

impl std::error::Error for Error {}

/// Convenience result type for roadmesh operations.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Shorthand for lookup misses that carry stage context.
    pub(crate) fn broken(stage: &'static str, details: String) -> Self {
        Error::BrokenReference { stage, details }
    }
}
