use miette::Diagnostic;
use thiserror::Error;

/// Raised while loading or validating a [`crate::config::Config`]. Fatal: the run never starts.
#[derive(Error, Diagnostic, Debug)]
pub enum ConfigError {
    #[error("failed to read configuration file {path}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("maze dimension {0} must be odd and at least 5")]
    InvalidMazeDimension(usize),

    #[error("NUM_INPUTS ({num_inputs}) must equal NUM_RANGEFINDERS + NUM_RADAR_SLICES + 3 ({expected})")]
    InputCountMismatch { num_inputs: usize, expected: usize },

    #[error("NUM_OUTPUTS must be 4, got {0}")]
    InvalidOutputCount(usize),

    #[error("{field} must be a probability in [0,1], got {value}")]
    InvalidProbability { field: &'static str, value: f64 },

    #[error("POPULATION_SIZE must be at least 1")]
    EmptyPopulation,
}

/// Raised by the generation pipeline when a structural invariant is violated. Always a bug.
#[derive(Error, Debug)]
pub enum InvariantError {
    #[error("connection {innovation} references unknown node {node}")]
    DanglingConnectionEndpoint { innovation: usize, node: usize },

    #[error("duplicate connection for pair ({0}, {1})")]
    DuplicateConnectionPair(usize, usize),

    #[error("node {0} with role Input used as a connection destination")]
    InputAsDestination(usize),

    #[error("node {0} with role Output used as a connection source")]
    OutputAsSource(usize),

    #[error("input node id {0} missing from genome's input list")]
    MissingInputId(usize),

    #[error("output node id {0} missing from genome's output list")]
    MissingOutputId(usize),

    #[error("species {0} has no representative while non-empty")]
    SpeciesWithoutRepresentative(usize),

    #[error("genome {genome} species_id {found:?} does not match owning species {expected}")]
    SpeciesMembershipMismatch {
        genome: usize,
        found: Option<usize>,
        expected: usize,
    },
}

/// Raised while saving or loading a persisted evolutionary state.
#[derive(Error, Diagnostic, Debug)]
pub enum PersistenceError {
    #[error("failed to read save file {path}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to encode save image: {0}")]
    Encode(#[from] bincode::error::EncodeError),

    #[error("failed to decode save image: {0}")]
    Decode(#[from] bincode::error::DecodeError),

    #[error("save image format version {found:?} does not match expected {expected:?}")]
    VersionMismatch { found: String, expected: String },
}

/// The only error the fitness evaluator ever surfaces internally; it is always converted to
/// the floor fitness of 0.001 before reaching the generation pipeline (see §4.6, §7).
#[derive(Error, Debug)]
pub enum EvaluationError {
    #[error("network activation failed: {0}")]
    Activation(String),

    #[error("agent update failed: {0}")]
    AgentUpdate(String),
}
