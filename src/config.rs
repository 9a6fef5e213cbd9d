use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Flat, statically typed configuration record. Frozen for the lifetime of one run.
///
/// Field names mirror the `UPPER_SNAKE_CASE` keys of the external interface table; `serde`
/// renames them so the on-disk TOML keeps that spelling while Rust code reads idiomatic
/// `lower_snake_case` fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(rename = "POPULATION_SIZE")]
    pub population_size: usize,

    #[serde(rename = "COMPATIBILITY_THRESHOLD")]
    pub compatibility_threshold: f64,
    #[serde(rename = "C1_EXCESS")]
    pub c1_excess: f64,
    #[serde(rename = "C2_DISJOINT")]
    pub c2_disjoint: f64,
    #[serde(rename = "C3_WEIGHT")]
    pub c3_weight: f64,

    #[serde(rename = "MAX_STAGNATION")]
    pub max_stagnation: u32,

    #[serde(rename = "WEIGHT_MUTATE_RATE")]
    pub weight_mutate_rate: f64,
    #[serde(rename = "WEIGHT_REPLACE_RATE")]
    pub weight_replace_rate: f64,
    #[serde(rename = "WEIGHT_MUTATE_POWER")]
    pub weight_mutate_power: f64,
    #[serde(rename = "WEIGHT_CAP")]
    pub weight_cap: f64,
    #[serde(rename = "WEIGHT_INIT_RANGE")]
    pub weight_init_range: f64,

    #[serde(rename = "ADD_CONNECTION_RATE")]
    pub add_connection_rate: f64,
    #[serde(rename = "ADD_NODE_RATE")]
    pub add_node_rate: f64,

    #[serde(rename = "CROSSOVER_RATE")]
    pub crossover_rate: f64,
    #[serde(rename = "INHERIT_DISABLED_GENE_RATE")]
    pub inherit_disabled_gene_rate: f64,
    #[serde(rename = "ELITISM")]
    pub elitism: usize,
    #[serde(rename = "SELECTION_PERCENTAGE")]
    pub selection_percentage: f64,

    #[serde(rename = "INITIAL_CONNECTIONS")]
    pub initial_connections: usize,

    #[serde(rename = "MAZE_WIDTH")]
    pub maze_width: usize,
    #[serde(rename = "MAZE_HEIGHT")]
    pub maze_height: usize,
    #[serde(rename = "MAZE_SEED")]
    pub maze_seed: Option<u64>,

    #[serde(rename = "MAX_STEPS_PER_EVALUATION")]
    pub max_steps_per_evaluation: u32,

    #[serde(rename = "NUM_RANGEFINDERS")]
    pub num_rangefinders: usize,
    #[serde(rename = "RANGEFINDER_MAX_DIST")]
    pub rangefinder_max_dist: f64,
    #[serde(rename = "NUM_RADAR_SLICES")]
    pub num_radar_slices: usize,
    #[serde(rename = "AGENT_MAX_SPEED")]
    pub agent_max_speed: f64,

    #[serde(rename = "NUM_INPUTS")]
    pub num_inputs: usize,
    #[serde(rename = "NUM_OUTPUTS")]
    pub num_outputs: usize,

    #[serde(rename = "NUM_PROCESSES", default)]
    pub num_processes: usize,
}

impl Default for Config {
    /// Defaults match `original_source/project/config.py` exactly (`NUM_INPUTS` is derived
    /// as `NUM_RANGEFINDERS + NUM_RADAR_SLICES + 3`, which that file leaves implicit).
    fn default() -> Self {
        Config {
            population_size: 150,
            compatibility_threshold: 5.0,
            c1_excess: 1.0,
            c2_disjoint: 1.0,
            c3_weight: 0.9,
            max_stagnation: 20,
            weight_mutate_rate: 0.6,
            weight_replace_rate: 0.1,
            weight_mutate_power: 0.5,
            weight_cap: 8.0,
            weight_init_range: 1.0,
            add_connection_rate: 0.19,
            add_node_rate: 0.09,
            crossover_rate: 0.75,
            inherit_disabled_gene_rate: 0.75,
            elitism: 0,
            selection_percentage: 0.2,
            initial_connections: 8,
            maze_width: 11,
            maze_height: 11,
            maze_seed: None,
            max_steps_per_evaluation: 400,
            num_rangefinders: 4,
            rangefinder_max_dist: 8.0,
            num_radar_slices: 2,
            agent_max_speed: 0.5,
            num_inputs: 9,
            num_outputs: 4,
            num_processes: 0,
        }
    }
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let config: Config = toml::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Enforces the fatal configuration invariants of §7/§10.3. Must be called before any
    /// evolution begins; validation failures are never silently corrected.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.maze_width % 2 == 0 || self.maze_width < 5 {
            return Err(ConfigError::InvalidMazeDimension(self.maze_width));
        }
        if self.maze_height % 2 == 0 || self.maze_height < 5 {
            return Err(ConfigError::InvalidMazeDimension(self.maze_height));
        }
        let expected_inputs = self.num_rangefinders + self.num_radar_slices + 3;
        if self.num_inputs != expected_inputs {
            return Err(ConfigError::InputCountMismatch {
                num_inputs: self.num_inputs,
                expected: expected_inputs,
            });
        }
        if self.num_outputs != 4 {
            return Err(ConfigError::InvalidOutputCount(self.num_outputs));
        }
        if self.population_size == 0 {
            return Err(ConfigError::EmptyPopulation);
        }
        for (field, value) in [
            ("WEIGHT_MUTATE_RATE", self.weight_mutate_rate),
            ("WEIGHT_REPLACE_RATE", self.weight_replace_rate),
            ("ADD_CONNECTION_RATE", self.add_connection_rate),
            ("ADD_NODE_RATE", self.add_node_rate),
            ("CROSSOVER_RATE", self.crossover_rate),
            ("INHERIT_DISABLED_GENE_RATE", self.inherit_disabled_gene_rate),
            ("SELECTION_PERCENTAGE", self.selection_percentage),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::InvalidProbability { field, value });
            }
        }
        Ok(())
    }

    /// Resolves `NUM_PROCESSES == 0` ("absent") to the host's available parallelism.
    pub fn worker_count(&self) -> usize {
        if self.num_processes == 0 {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        } else {
            self.num_processes
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        Config::default().validate().expect("default config must be valid");
    }

    #[test]
    fn rejects_even_maze_dimension() {
        let mut config = Config::default();
        config.maze_width = 10;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidMazeDimension(10))
        ));
    }

    #[test]
    fn rejects_input_count_mismatch() {
        let mut config = Config::default();
        config.num_inputs = 100;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InputCountMismatch { .. })
        ));
    }

    #[test]
    fn rejects_wrong_output_count() {
        let mut config = Config::default();
        config.num_outputs = 7;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidOutputCount(7))
        ));
    }
}
