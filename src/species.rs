use serde::{Deserialize, Serialize};

use crate::genome::Genome;

/// A set of genomes whose pairwise genetic distance is below the compatibility threshold
/// (§3, §4.7). Members are referenced by genome id into the pipeline's arena, not owned
/// directly, avoiding the cyclic species/genome references the design notes call out (§9).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Species {
    pub id: usize,
    pub representative: Genome,
    pub members: Vec<usize>,
    pub generations_since_improvement: u32,
    pub best_fitness_ever: f64,
    pub total_adjusted_fitness: f64,
    pub offspring_quota: usize,
}

impl Species {
    pub fn new(id: usize, first_genome: Genome) -> Self {
        let best_fitness_ever = first_genome.fitness;
        Species {
            id,
            representative: first_genome.clone(),
            members: vec![first_genome.id],
            generations_since_improvement: 0,
            best_fitness_ever,
            total_adjusted_fitness: 0.0,
            offspring_quota: 0,
        }
    }

    pub fn add_member(&mut self, genome: &mut Genome) {
        genome.species_id = Some(self.id);
        self.members.push(genome.id);
    }

    pub fn clear_members(&mut self) {
        self.members.clear();
    }

    /// Called after members are sorted by raw fitness descending (§4.7).
    pub fn update_stagnation(&mut self, sorted_members_desc: &[&Genome]) {
        match sorted_members_desc.first() {
            Some(top) if top.fitness > self.best_fitness_ever => {
                self.best_fitness_ever = top.fitness;
                self.generations_since_improvement = 0;
            }
            _ => {
                self.generations_since_improvement += 1;
            }
        }
    }

    /// Each member's adjusted fitness = raw / |members|; returns the species sum (§4.7).
    pub fn compute_adjusted_fitness(&mut self, members: &mut [&mut Genome]) -> f64 {
        let count = members.len().max(1) as f64;
        let mut total = 0.0;
        for genome in members.iter_mut() {
            genome.adjusted_fitness = genome.fitness / count;
            total += genome.adjusted_fitness;
        }
        self.total_adjusted_fitness = total;
        total
    }

    /// Keeps at least the top `ceil(survival_fraction * |members|)` members (minimum 1),
    /// given members already sorted by raw fitness descending (§4.7).
    pub fn select_parents<'a>(sorted_members_desc: &'a [&'a Genome], survival_fraction: f64) -> &'a [&'a Genome] {
        if sorted_members_desc.is_empty() {
            return sorted_members_desc;
        }
        let keep = ((sorted_members_desc.len() as f64) * survival_fraction).ceil() as usize;
        let keep = keep.max(1).min(sorted_members_desc.len());
        &sorted_members_desc[..keep]
    }
}
