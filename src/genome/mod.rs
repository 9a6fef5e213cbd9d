mod core;
mod genes;

pub use core::Genome;
pub use genes::{ActivationFunction, ConnectionGene, NodeGene, NodeRole};
