pub mod agent;
pub mod config;
pub mod error;
pub mod evaluator;
pub mod generation;
pub mod genome;
pub mod innovation;
pub mod maze;
pub mod network;
pub mod persistence;
pub mod species;

pub use config::Config;
pub use generation::{GenerationPipeline, GenerationStats};
pub use maze::Maze;
