use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::config::Config;
use crate::error::PersistenceError;
use crate::generation::{GenerationPipeline, GenerationStats};
use crate::genome::Genome;
use crate::innovation::InnovationRegistry;
use crate::maze::Maze;
use crate::species::Species;

const FORMAT_VERSION: &str = "neat-maze-save-v1";

/// A complete, round-trippable snapshot of a [`GenerationPipeline`] (§4.9). Deduplicates
/// genomes once into a flat list rather than persisting the arena's `HashMap` directly, so
/// the on-disk layout does not depend on hashing order.
#[derive(Debug, Serialize, Deserialize)]
pub struct SaveImage {
    format_version: String,
    config: Config,
    maze: Maze,
    next_node_id: usize,
    next_innovation: usize,
    genomes: Vec<Genome>,
    population: Vec<usize>,
    species: Vec<Species>,
    next_species_id: usize,
    next_genome_id: usize,
    generation: u32,
    best_genome_overall: Option<Genome>,
    stats_history: Vec<GenerationStats>,
    seed: u64,
}

impl SaveImage {
    pub fn from_pipeline(pipeline: &GenerationPipeline) -> Self {
        SaveImage {
            format_version: FORMAT_VERSION.to_string(),
            config: pipeline.config.clone(),
            maze: pipeline.maze.clone(),
            next_node_id: pipeline.innovation.node_id_counter(),
            next_innovation: pipeline.innovation.innovation_counter(),
            genomes: pipeline.genomes.values().cloned().collect(),
            population: pipeline.population.clone(),
            species: pipeline.species.clone(),
            next_species_id: pipeline.next_species_id,
            next_genome_id: pipeline.next_genome_id,
            generation: pipeline.generation,
            best_genome_overall: pipeline.best_genome_overall.clone(),
            stats_history: pipeline.stats_history.clone(),
            seed: pipeline.seed,
        }
    }

    /// Rebuilds a [`GenerationPipeline`], skipping any species that reference a genome id
    /// missing from the saved arena rather than failing the whole load (§4.9, §7).
    pub fn into_pipeline(self) -> Result<GenerationPipeline, PersistenceError> {
        if self.format_version != FORMAT_VERSION {
            return Err(PersistenceError::VersionMismatch {
                found: self.format_version,
                expected: FORMAT_VERSION.to_string(),
            });
        }

        let mut genomes: HashMap<usize, Genome> = HashMap::with_capacity(self.genomes.len());
        for genome in self.genomes {
            genomes.insert(genome.id, genome);
        }

        let population: Vec<usize> = self
            .population
            .into_iter()
            .filter(|id| {
                let present = genomes.contains_key(id);
                if !present {
                    warn!(genome_id = id, "save image population references a missing genome, dropping");
                }
                present
            })
            .collect();

        let species: Vec<Species> = self
            .species
            .into_iter()
            .filter(|s| {
                let present = genomes.contains_key(&s.representative.id);
                if !present {
                    warn!(species_id = s.id, "save image species representative is missing, dropping species");
                }
                present
            })
            .map(|mut s| {
                let before = s.members.len();
                s.members.retain(|id| genomes.contains_key(id));
                if s.members.len() != before {
                    warn!(species_id = s.id, dropped = before - s.members.len(), "dropped missing species members");
                }
                s
            })
            .collect();

        let mut innovation = InnovationRegistry::new(0, 0);
        innovation.restore_counters(self.next_node_id, self.next_innovation);

        Ok(GenerationPipeline {
            config: self.config,
            maze: self.maze,
            innovation,
            genomes,
            population,
            species,
            next_species_id: self.next_species_id,
            next_genome_id: self.next_genome_id,
            generation: self.generation,
            best_genome_overall: self.best_genome_overall,
            stats_history: self.stats_history,
            seed: self.seed,
        })
    }
}

pub fn save(pipeline: &GenerationPipeline, path: impl AsRef<Path>) -> Result<(), PersistenceError> {
    let path = path.as_ref();
    let image = SaveImage::from_pipeline(pipeline);
    let bytes = bincode::serde::encode_to_vec(&image, bincode::config::standard())?;
    std::fs::write(path, bytes).map_err(|source| PersistenceError::Io {
        path: path.display().to_string(),
        source,
    })
}

pub fn load(path: impl AsRef<Path>) -> Result<GenerationPipeline, PersistenceError> {
    let path = path.as_ref();
    let bytes = std::fs::read(path).map_err(|source| PersistenceError::Io {
        path: path.display().to_string(),
        source,
    })?;
    let (image, _): (SaveImage, usize) = bincode::serde::decode_from_slice(&bytes, bincode::config::standard())?;
    image.into_pipeline()
}
