use std::collections::HashMap;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::Config;
use crate::error::InvariantError;
use crate::evaluator::evaluate_genome;
use crate::genome::Genome;
use crate::innovation::InnovationRegistry;
use crate::maze::Maze;
use crate::species::Species;

/// Per-generation summary, the value produced by each step of [`GenerationPipeline`]'s
/// `Iterator` implementation (§4.8).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationStats {
    pub generation: u32,
    pub population_size: usize,
    pub species_count: usize,
    pub best_fitness: f64,
    pub average_fitness: f64,
    pub best_genome_id: usize,
}

/// Owns the whole evolutionary run: the genome arena, the active population, the species
/// list, and the innovation registry. Driving it is an `Iterator` so callers can `.take(n)`
/// or loop until a fitness threshold without the pipeline knowing about termination
/// conditions (§4.8, §9 "the run loop owns termination, not the pipeline").
#[derive(Debug)]
pub struct GenerationPipeline {
    pub config: Config,
    pub maze: Maze,
    pub(crate) innovation: InnovationRegistry,
    pub(crate) genomes: HashMap<usize, Genome>,
    pub(crate) population: Vec<usize>,
    pub(crate) species: Vec<Species>,
    pub(crate) next_species_id: usize,
    pub(crate) next_genome_id: usize,
    pub generation: u32,
    pub best_genome_overall: Option<Genome>,
    pub stats_history: Vec<GenerationStats>,
    pub(crate) seed: u64,
}

impl GenerationPipeline {
    pub fn new(config: Config, seed: u64) -> Result<Self, crate::error::ConfigError> {
        config.validate()?;
        let maze = Maze::generate(config.maze_width, config.maze_height, config.maze_seed)?;
        let mut innovation = InnovationRegistry::new(0, 0);
        let mut rng = StdRng::seed_from_u64(seed);

        let mut genomes = HashMap::new();
        let mut population = Vec::with_capacity(config.population_size);
        for id in 0..config.population_size {
            let genome = Genome::new_initial(id, config.num_inputs, config.num_outputs, &config, &mut innovation, &mut rng);
            genomes.insert(id, genome);
            population.push(id);
        }

        Ok(GenerationPipeline {
            config,
            maze,
            innovation,
            genomes,
            population,
            species: Vec::new(),
            next_species_id: 0,
            next_genome_id: config.population_size,
            generation: 0,
            best_genome_overall: None,
            stats_history: Vec::new(),
            seed,
        })
    }

    /// Runs the strict 11-step generation cycle (§4.8) and returns its summary.
    fn run_generation(&mut self) -> GenerationStats {
        // 1. clear the per-generation innovation caches.
        self.innovation.reset_generation_cache();

        // 2. evaluate the whole population in parallel; evaluation never fails (§4.6).
        let seed = self.seed;
        let generation = self.generation;
        let maze = &self.maze;
        let config = &self.config;
        let fitnesses: Vec<(usize, f64)> = self
            .population
            .par_iter()
            .map(|&id| {
                let genome = &self.genomes[&id];
                let eval_seed = seed ^ (generation as u64).wrapping_mul(0x9E3779B97F4A7C15) ^ id as u64;
                (id, evaluate_genome(genome, maze, config, eval_seed))
            })
            .collect();
        for (id, fitness) in &fitnesses {
            self.genomes.get_mut(id).expect("evaluated id exists").fitness = *fitness;
        }

        // 3. aggregate raw-fitness stats before speciation touches anything.
        let best = fitnesses.iter().cloned().max_by(|a, b| a.1.total_cmp(&b.1));
        let average_fitness = fitnesses.iter().map(|(_, f)| f).sum::<f64>() / fitnesses.len().max(1) as f64;

        if let Some((best_id, best_fitness)) = best {
            let is_new_best = self
                .best_genome_overall
                .as_ref()
                .map(|g| best_fitness > g.fitness)
                .unwrap_or(true);
            if is_new_best {
                self.best_genome_overall = Some(self.genomes[&best_id].clone());
            }
        }

        // 4. snapshot each species' current representative before speciation reassigns members.
        // Sorted by species id so classification order is deterministic (E6).
        let mut previous_representatives: Vec<(usize, Genome)> =
            self.species.iter().map(|s| (s.id, s.representative.clone())).collect();
        previous_representatives.sort_unstable_by_key(|(id, _)| *id);

        // 5. speciate: each genome joins the first compatible species (by its frozen
        // representative from step 4) or founds a new one.
        for s in &mut self.species {
            s.clear_members();
        }
        let mut new_species: Vec<Species> = Vec::new();
        for &id in &self.population {
            let mut placed = false;
            {
                let genome = self.genomes.get_mut(&id).expect("population id exists");
                for (rep_id, rep) in &previous_representatives {
                    if rep.distance(genome, &self.config) < self.config.compatibility_threshold {
                        if let Some(s) = self.species.iter_mut().find(|s| s.id == *rep_id) {
                            s.add_member(genome);
                            placed = true;
                            break;
                        }
                    }
                }
                if !placed {
                    for s in new_species.iter_mut() {
                        if s.representative.distance(genome, &self.config) < self.config.compatibility_threshold {
                            s.add_member(genome);
                            placed = true;
                            break;
                        }
                    }
                }
            }
            if !placed {
                let new_id = self.next_species_id;
                self.next_species_id += 1;
                let genome = self.genomes.get_mut(&id).expect("population id exists");
                genome.species_id = Some(new_id);
                new_species.push(Species::new(new_id, genome.clone()));
            }
        }
        self.species.retain(|s| !s.members.is_empty());
        self.species.extend(new_species);
        self.check_species_invariants()
            .expect("S1-S4 must hold immediately after speciation completes reproduction's output");

        // 6. adjusted (explicit fitness-sharing) fitness per species. The sum is recomputed
        // in step 8 after pruning, since pruning can remove species counted here.
        for s in &mut self.species {
            let mut members: Vec<&mut Genome> = s
                .members
                .iter()
                .map(|id| self.genomes.get_mut(id).expect("member id exists"))
                .collect();
            s.compute_adjusted_fitness(&mut members);
        }

        // 7. stagnation bookkeeping; a species holding the all-time best genome is protected.
        let protected_species = self.best_genome_overall.as_ref().and_then(|g| g.species_id);
        for s in &mut self.species {
            let mut members: Vec<&Genome> = s.members.iter().map(|id| &self.genomes[id]).collect();
            members.sort_unstable_by(|a, b| b.fitness.total_cmp(&a.fitness));
            s.update_stagnation(&members);
        }
        let before = self.species.len();
        let non_stagnant = self
            .species
            .iter()
            .filter(|s| s.generations_since_improvement < self.config.max_stagnation)
            .count();
        // Pruning is suppressed entirely if it would leave fewer than two non-stagnant
        // species standing (§4.8 step 7) — better to let a stagnant species keep breeding
        // than collapse the population to one lineage.
        if non_stagnant >= 2 {
            self.species.retain(|s| {
                Some(s.id) == protected_species || s.generations_since_improvement < self.config.max_stagnation
            });
        }
        if self.species.len() < before {
            warn!(removed = before - self.species.len(), "pruned stagnant species");
        }

        // 8. offspring quotas proportional to adjusted fitness, floor + remainder distribution.
        // S must be the sum over species that survive pruning, not the pre-prune total from
        // step 6 — recompute here so surviving quotas sum to exactly POPULATION_SIZE.
        let total_adjusted: f64 = self.species.iter().map(|s| s.total_adjusted_fitness).sum();
        let pop_size = self.config.population_size;
        let mut quotas = vec![0usize; self.species.len()];
        if total_adjusted > 0.0 {
            let mut remainders: Vec<(usize, f64)> = Vec::with_capacity(self.species.len());
            let mut allocated = 0usize;
            for (i, s) in self.species.iter().enumerate() {
                let share = s.total_adjusted_fitness / total_adjusted * pop_size as f64;
                let base = share.floor() as usize;
                quotas[i] = base;
                allocated += base;
                remainders.push((i, share.fract()));
            }
            remainders.sort_unstable_by(|a, b| b.1.total_cmp(&a.1));
            let mut remaining = pop_size.saturating_sub(allocated);
            for (i, _) in remainders {
                if remaining == 0 {
                    break;
                }
                quotas[i] += 1;
                remaining -= 1;
            }
        } else if !self.species.is_empty() {
            // S <= 0: distribute pop_size evenly across surviving species, remainder
            // round-robin to the first species in id order (§4.8 step 8).
            let count = self.species.len();
            let base = pop_size / count;
            let mut remaining = pop_size % count;
            for q in quotas.iter_mut() {
                *q = base;
                if remaining > 0 {
                    *q += 1;
                    remaining -= 1;
                }
            }
        }
        for (s, q) in self.species.iter_mut().zip(quotas.iter()) {
            s.offspring_quota = *q;
        }

        // 9 & 10. reproduction: elitism plus crossover/mutation to fill each species' quota,
        // then top the population back up to `population_size` if rounding left it short.
        let mut rng = StdRng::seed_from_u64(seed ^ (generation as u64).wrapping_mul(0xBF58476D1CE4E5B9));
        let mut next_population = Vec::with_capacity(pop_size);
        let mut next_genomes = HashMap::with_capacity(pop_size);

        for s in &self.species {
            let mut members: Vec<&Genome> = s.members.iter().map(|id| &self.genomes[id]).collect();
            members.sort_unstable_by(|a, b| b.fitness.total_cmp(&a.fitness));
            if members.is_empty() {
                continue;
            }

            let elites = self.config.elitism.min(members.len()).min(s.offspring_quota);
            for elite in members.iter().take(elites) {
                let id = self.next_genome_id;
                self.next_genome_id += 1;
                let mut clone = (*elite).clone();
                clone.id = id;
                next_population.push(id);
                next_genomes.insert(id, clone);
            }

            let parents = Species::select_parents(&members, self.config.selection_percentage);
            let remaining = s.offspring_quota.saturating_sub(elites);
            for _ in 0..remaining {
                let id = self.next_genome_id;
                self.next_genome_id += 1;
                let mut child = if parents.len() >= 2 && rng.random_bool(self.config.crossover_rate) {
                    let a = *parents.choose(&mut rng).expect("non-empty parents");
                    let b = *parents.choose(&mut rng).expect("non-empty parents");
                    if a.fitness >= b.fitness {
                        Genome::crossover(a, b, id, &self.config, &mut rng)
                    } else {
                        Genome::crossover(b, a, id, &self.config, &mut rng)
                    }
                } else {
                    let mut c = (*parents.choose(&mut rng).expect("non-empty parents")).clone();
                    c.id = id;
                    c
                };
                child.mutate_weights(&self.config, &mut rng);
                if rng.random_bool(self.config.add_connection_rate) {
                    child.add_connection_mutation(&self.config, &mut rng, &mut self.innovation);
                }
                if rng.random_bool(self.config.add_node_rate) {
                    child.add_node_mutation(&mut rng, &mut self.innovation);
                }
                next_population.push(id);
                next_genomes.insert(id, child);
            }
        }

        // Rounding can leave the population short by a handful; top up with copy-and-
        // weight-mutate survivors (§4.8 step 10) rather than silently running an
        // under-sized generation. Prefer a surviving member so top-up slots aren't all
        // identical, falling back to the all-time best only if nothing survived at all.
        while next_population.len() < pop_size {
            let id = self.next_genome_id;
            self.next_genome_id += 1;
            let mut clone = next_population
                .choose(&mut rng)
                .map(|existing_id| next_genomes[existing_id].clone())
                .or_else(|| self.best_genome_overall.clone())
                .unwrap_or_else(|| self.genomes[&self.population[0]].clone());
            clone.id = id;
            clone.mutate_weights(&self.config, &mut rng);
            next_population.push(id);
            next_genomes.insert(id, clone);
        }

        // Refresh each surviving species' representative to a uniformly random member (§4.7,
        // §4.8 step 5) so distance comparisons next generation are against a fresh snapshot.
        for s in &mut self.species {
            if let Some(&rep_id) = s.members.choose(&mut rng) {
                s.representative = self.genomes[&rep_id].clone();
            }
        }

        self.genomes = next_genomes;
        self.population = next_population;

        // 11. record stats and advance the generation counter.
        let species_count = self.species.len();
        let stats = GenerationStats {
            generation: self.generation,
            population_size: pop_size,
            species_count,
            best_fitness: best.map(|(_, f)| f).unwrap_or(0.0),
            average_fitness,
            best_genome_id: best.map(|(id, _)| id).unwrap_or(0),
        };
        info!(
            generation = stats.generation,
            species = stats.species_count,
            best_fitness = stats.best_fitness,
            average_fitness = stats.average_fitness,
            "generation complete"
        );
        self.stats_history.push(stats.clone());
        self.generation += 1;
        stats
    }

    /// Checks the structural invariants of every genome currently in the population (§7, §8
    /// property 1). Intended for tests and for periodic sanity checks in long runs.
    ///
    /// Species bookkeeping (S1-S4) is asserted separately by [`Self::check_species_invariants`]
    /// right when speciation finishes each generation: `self.species` only describes the
    /// population currently being reproduced, so checking it here — after reproduction has
    /// already replaced `self.genomes`/`self.population` with the next generation — would
    /// compare stale species membership against a population it was never computed from.
    pub fn check_invariants(&self) -> Result<(), InvariantError> {
        for id in &self.population {
            self.genomes[id].check_invariants()?;
        }
        Ok(())
    }

    /// S1: every species has at least one member (a representative). S2/S3: each member
    /// genome's `species_id` points back at the species that lists it, and no genome is
    /// listed by more than one species (§7). Called immediately after speciation assigns
    /// `self.population` to `self.species`, before that assignment drives reproduction.
    fn check_species_invariants(&self) -> Result<(), InvariantError> {
        let mut claimed_by: HashMap<usize, usize> = HashMap::new();
        for s in &self.species {
            if s.members.is_empty() {
                return Err(InvariantError::SpeciesWithoutRepresentative(s.id));
            }
            for &member_id in &s.members {
                if let Some(&other) = claimed_by.get(&member_id) {
                    return Err(InvariantError::SpeciesMembershipMismatch {
                        genome: member_id,
                        found: Some(other),
                        expected: s.id,
                    });
                }
                claimed_by.insert(member_id, s.id);
                let found = self.genomes[&member_id].species_id;
                if found != Some(s.id) {
                    return Err(InvariantError::SpeciesMembershipMismatch {
                        genome: member_id,
                        found,
                        expected: s.id,
                    });
                }
            }
        }
        Ok(())
    }

    pub fn best_genome(&self) -> Option<&Genome> {
        self.best_genome_overall.as_ref()
    }
}

impl Iterator for GenerationPipeline {
    type Item = GenerationStats;

    fn next(&mut self) -> Option<GenerationStats> {
        Some(self.run_generation())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_config() -> Config {
        let mut config = Config::default();
        config.population_size = 20;
        config.maze_width = 7;
        config.maze_height = 7;
        config.maze_seed = Some(1);
        config.max_steps_per_evaluation = 20;
        config
    }

    #[test]
    fn runs_several_generations_without_losing_population_size() {
        let mut pipeline = GenerationPipeline::new(small_config(), 0).unwrap();
        for stats in pipeline.by_ref().take(3) {
            assert_eq!(stats.population_size, 20);
            assert_eq!(pipeline.population.len(), 20);
        }
        pipeline.check_invariants().expect("population must stay well-formed");
    }

    #[test]
    fn tracks_a_monotonically_known_best_genome() {
        let mut pipeline = GenerationPipeline::new(small_config(), 7).unwrap();
        for _ in pipeline.by_ref().take(2) {}
        assert!(pipeline.best_genome().is_some());
    }

    #[test]
    fn e6_speciation_is_deterministic_given_identical_inputs() {
        // Two independently constructed pipelines with identical seed and config must
        // reclassify every genome into the same species at every generation: speciation
        // is a pure function of the representatives and population it's fed.
        let mut pipeline_a = GenerationPipeline::new(small_config(), 123).unwrap();
        let mut pipeline_b = GenerationPipeline::new(small_config(), 123).unwrap();

        for _ in pipeline_a.by_ref().take(2) {}
        for _ in pipeline_b.by_ref().take(2) {}

        let mut ids = pipeline_a.population.clone();
        ids.sort_unstable();
        for id in ids {
            assert_eq!(
                pipeline_a.genomes[&id].species_id,
                pipeline_b.genomes[&id].species_id,
                "identical seed/config must reclassify genome {id} into the same species"
            );
        }
    }

    #[test]
    fn e7_all_time_best_is_monotonic_across_generations() {
        // POPULATION_SIZE=50, 11x11 maze seed 42, 20 generations, ELITISM=1 (property 10).
        let mut config = Config::default();
        config.population_size = 50;
        config.maze_width = 11;
        config.maze_height = 11;
        config.maze_seed = Some(42);
        config.elitism = 1;
        let mut pipeline = GenerationPipeline::new(config, 42).unwrap();

        let mut last_best = f64::NEG_INFINITY;
        for stats in pipeline.by_ref().take(20) {
            assert_eq!(stats.population_size, 50);
            let all_time_best = pipeline.best_genome().expect("best genome tracked").fitness;
            assert!(all_time_best >= last_best, "all-time best fitness must never decrease");
            last_best = all_time_best;
        }
        pipeline
            .check_invariants()
            .expect("population must stay well-formed after 20 generations");
    }
}
