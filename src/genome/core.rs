use std::collections::{HashMap, HashSet};

use rand::seq::{IteratorRandom, SliceRandom};
use rand::Rng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::error::InvariantError;
use crate::innovation::InnovationRegistry;

use super::genes::{ConnectionGene, NodeGene, NodeRole};

/// The genotype: node genes plus connection genes, addressed by stable ids independent of
/// any process-local pointer (§3, §9 "cyclic object references").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Genome {
    pub id: usize,
    pub nodes: HashMap<usize, NodeGene>,
    pub connections: HashMap<usize, ConnectionGene>,
    connection_pairs: HashSet<(usize, usize)>,
    pub input_nodes: Vec<usize>,
    pub output_nodes: Vec<usize>,
    pub bias_node: usize,
    pub fitness: f64,
    pub adjusted_fitness: f64,
    pub species_id: Option<usize>,
}

/// Bounded attempt budget for add-connection mutation (§4.2 "≥20").
const ADD_CONNECTION_ATTEMPTS: usize = 20;

impl Genome {
    /// Builds the initial genome for one run: N Input nodes, one Bias node, M Output nodes,
    /// and `INITIAL_CONNECTIONS` connections sampled without replacement from
    /// {Input ∪ Bias} × Output (§4.2 Construction).
    pub fn new_initial(
        id: usize,
        num_inputs: usize,
        num_outputs: usize,
        config: &Config,
        innovation: &mut InnovationRegistry,
        rng: &mut impl Rng,
    ) -> Self {
        let mut nodes = HashMap::new();
        let mut input_nodes = Vec::with_capacity(num_inputs);
        for _ in 0..num_inputs {
            let id = innovation.new_node_id();
            nodes.insert(id, NodeGene::input(id));
            input_nodes.push(id);
        }
        let bias_node = innovation.new_node_id();
        nodes.insert(bias_node, NodeGene::bias_node(bias_node));

        let mut output_nodes = Vec::with_capacity(num_outputs);
        for _ in 0..num_outputs {
            let oid = innovation.new_node_id();
            let bias = rng.random_range(-1.0..=1.0);
            nodes.insert(oid, NodeGene::output(oid, bias));
            output_nodes.push(oid);
        }

        let mut possible_pairs: Vec<(usize, usize)> = Vec::new();
        for &src in input_nodes.iter().chain(std::iter::once(&bias_node)) {
            for &dst in &output_nodes {
                possible_pairs.push((src, dst));
            }
        }
        let sample_size = config.initial_connections.min(possible_pairs.len());
        let chosen = possible_pairs.choose_multiple(rng, sample_size);

        let mut connections = HashMap::new();
        let mut connection_pairs = HashSet::new();
        for (src, dst) in chosen {
            let weight = rng.random_range(-config.weight_init_range..=config.weight_init_range);
            let innov = innovation.connection_innovation(*src, *dst);
            connections.insert(innov, ConnectionGene::new(innov, *src, *dst, weight));
            connection_pairs.insert((*src, *dst));
        }

        Genome {
            id,
            nodes,
            connections,
            connection_pairs,
            input_nodes,
            output_nodes,
            bias_node,
            fitness: 0.0,
            adjusted_fitness: 0.0,
            species_id: None,
        }
    }

    /// Builds a `Genome` from already-known parts, rederiving the internal `connection_pairs`
    /// de-dup index from `connections`. Used by tests that hand-construct fixture genomes.
    #[allow(clippy::too_many_arguments)]
    pub fn from_parts(
        id: usize,
        nodes: HashMap<usize, NodeGene>,
        connections: HashMap<usize, ConnectionGene>,
        input_nodes: Vec<usize>,
        output_nodes: Vec<usize>,
        bias_node: usize,
    ) -> Self {
        let connection_pairs = connections.values().map(|c| (c.source, c.target)).collect();
        Genome {
            id,
            nodes,
            connections,
            connection_pairs,
            input_nodes,
            output_nodes,
            bias_node,
            fitness: 0.0,
            adjusted_fitness: 0.0,
            species_id: None,
        }
    }

    fn role_of(&self, node_id: usize) -> NodeRole {
        self.nodes[&node_id].role
    }

    /// Weight mutation (§4.2). Applied identically to connection weights and to Hidden/Output
    /// node biases, using the same three probabilities.
    pub fn mutate_weights(&mut self, config: &Config, rng: &mut impl Rng) {
        let normal = Normal::new(0.0, config.weight_mutate_power).expect("valid stddev");
        for conn in self.connections.values_mut() {
            Self::mutate_scalar(&mut conn.weight, config, rng, &normal);
        }
        for node in self.nodes.values_mut() {
            if matches!(node.role, NodeRole::Hidden | NodeRole::Output) {
                Self::mutate_scalar(&mut node.bias, config, rng, &normal);
            }
        }
    }

    fn mutate_scalar(value: &mut f64, config: &Config, rng: &mut impl Rng, normal: &Normal<f64>) {
        if !rng.random_bool(config.weight_mutate_rate) {
            return;
        }
        if rng.random_bool(config.weight_replace_rate) {
            *value = rng.random_range(-config.weight_cap..=config.weight_cap);
        } else {
            *value = (*value + normal.sample(rng)).clamp(-config.weight_cap, config.weight_cap);
        }
    }

    /// Add-connection mutation (§4.2). Returns whether a connection was added; exhausting all
    /// attempts is an ordinary no-op, not an error (§7).
    pub fn add_connection_mutation(
        &mut self,
        config: &Config,
        rng: &mut impl Rng,
        innovation: &mut InnovationRegistry,
    ) -> bool {
        let sources: Vec<usize> = self
            .nodes
            .values()
            .filter(|n| n.role != NodeRole::Output)
            .map(|n| n.id)
            .collect();
        let targets: Vec<usize> = self
            .nodes
            .values()
            .filter(|n| !matches!(n.role, NodeRole::Input | NodeRole::Bias))
            .map(|n| n.id)
            .collect();
        if sources.is_empty() || targets.is_empty() {
            return false;
        }

        for _ in 0..ADD_CONNECTION_ATTEMPTS {
            let src = *sources.iter().choose(rng).expect("non-empty");
            let dst = *targets.iter().choose(rng).expect("non-empty");
            if src == dst {
                continue;
            }
            if self.connection_pairs.contains(&(src, dst)) || self.connection_pairs.contains(&(dst, src)) {
                continue;
            }
            let weight = rng.random_range(-config.weight_init_range..=config.weight_init_range);
            let innov = innovation.connection_innovation(src, dst);
            self.connections.insert(innov, ConnectionGene::new(innov, src, dst, weight));
            self.connection_pairs.insert((src, dst));
            return true;
        }
        false
    }

    /// Add-node mutation (§4.2). Returns whether a node was inserted; false only when the
    /// genome has no enabled connection to split.
    pub fn add_node_mutation(
        &mut self,
        rng: &mut impl Rng,
        innovation: &mut InnovationRegistry,
    ) -> bool {
        let enabled_innovations: Vec<usize> = self
            .connections
            .values()
            .filter(|c| c.enabled)
            .map(|c| c.innovation)
            .collect();
        let Some(&chosen) = enabled_innovations.iter().choose(rng) else {
            return false;
        };

        let (src, dst, old_weight) = {
            let conn = self.connections.get_mut(&chosen).expect("chosen innovation exists");
            conn.enabled = false;
            (conn.source, conn.target, conn.weight)
        };

        let (new_node, inbound, outbound) = innovation.register_node_split(chosen, src, dst);
        self.nodes.entry(new_node).or_insert_with(|| {
            let bias = rng.random_range(-0.1..=0.1);
            NodeGene::hidden(new_node, bias)
        });

        self.connections
            .insert(inbound, ConnectionGene::new(inbound, src, new_node, 1.0));
        self.connections
            .insert(outbound, ConnectionGene::new(outbound, new_node, dst, old_weight));
        self.connection_pairs.insert((src, new_node));
        self.connection_pairs.insert((new_node, dst));
        true
    }

    /// Crossover (§4.2). `fitter`/`less_fit` names the caller's pre-resolved tie-break; the
    /// child's nodes come only from the fitter parent.
    pub fn crossover(
        fitter: &Genome,
        less_fit: &Genome,
        child_id: usize,
        config: &Config,
        rng: &mut impl Rng,
    ) -> Genome {
        let nodes = fitter.nodes.clone();

        let mut innovs: Vec<usize> = fitter
            .connections
            .keys()
            .chain(less_fit.connections.keys())
            .copied()
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        innovs.sort_unstable();

        let mut connections = HashMap::new();
        let mut connection_pairs = HashSet::new();
        for innov in innovs {
            let in_fitter = fitter.connections.get(&innov);
            let in_less_fit = less_fit.connections.get(&innov);
            let chosen = match (in_fitter, in_less_fit) {
                (Some(a), Some(b)) => {
                    let mut picked = if rng.random_bool(0.5) { *a } else { *b };
                    if !a.enabled || !b.enabled {
                        picked.enabled = !rng.random_bool(config.inherit_disabled_gene_rate);
                    } else {
                        picked.enabled = true;
                    }
                    Some(picked)
                }
                (Some(a), None) => Some(*a),
                (None, _) => None,
            };
            if let Some(gene) = chosen {
                connection_pairs.insert((gene.source, gene.target));
                connections.insert(innov, gene);
            }
        }

        Genome {
            id: child_id,
            nodes,
            connections,
            connection_pairs,
            input_nodes: fitter.input_nodes.clone(),
            output_nodes: fitter.output_nodes.clone(),
            bias_node: fitter.bias_node,
            fitness: 0.0,
            adjusted_fitness: 0.0,
            species_id: None,
        }
    }

    /// Genetic distance (§4.2). Linear-time merge walk over both genomes' connections sorted
    /// by innovation number.
    pub fn distance(&self, other: &Genome, config: &Config) -> f64 {
        if self.connection_innovation_set() == other.connection_innovation_set() {
            let avg = self.mean_matching_weight_diff(other);
            return config.c3_weight * avg;
        }

        let mut a: Vec<&ConnectionGene> = self.connections.values().collect();
        let mut b: Vec<&ConnectionGene> = other.connections.values().collect();
        a.sort_unstable_by_key(|c| c.innovation);
        b.sort_unstable_by_key(|c| c.innovation);

        let max_a = a.last().map(|c| c.innovation).unwrap_or(0);
        let max_b = b.last().map(|c| c.innovation).unwrap_or(0);

        let (mut i, mut j) = (0usize, 0usize);
        let mut excess = 0u32;
        let mut disjoint = 0u32;
        let mut matching_diff_sum = 0.0f64;
        let mut matching_count = 0u32;

        while i < a.len() || j < b.len() {
            let innov_a = a.get(i).map(|c| c.innovation);
            let innov_b = b.get(j).map(|c| c.innovation);
            match (innov_a, innov_b) {
                (Some(ia), Some(ib)) if ia == ib => {
                    let (ga, gb) = (a[i], b[j]);
                    if ga.enabled && gb.enabled {
                        matching_diff_sum += (ga.weight - gb.weight).abs();
                        matching_count += 1;
                    }
                    i += 1;
                    j += 1;
                }
                (Some(ia), Some(ib)) if ia < ib => {
                    if ia > max_b {
                        excess += 1;
                    } else {
                        disjoint += 1;
                    }
                    i += 1;
                }
                (Some(_), Some(_)) => {
                    let ib = innov_b.unwrap();
                    if ib > max_a {
                        excess += 1;
                    } else {
                        disjoint += 1;
                    }
                    j += 1;
                }
                (Some(ia), None) => {
                    if ia > max_b {
                        excess += 1;
                    } else {
                        disjoint += 1;
                    }
                    i += 1;
                }
                (None, Some(ib)) => {
                    if ib > max_a {
                        excess += 1;
                    } else {
                        disjoint += 1;
                    }
                    j += 1;
                }
                (None, None) => unreachable!(),
            }
        }

        let n = (a.len().max(b.len()).max(1)) as f64;
        let mean_weight_diff = if matching_count > 0 {
            matching_diff_sum / matching_count as f64
        } else {
            0.0
        };

        config.c1_excess * excess as f64 / n
            + config.c2_disjoint * disjoint as f64 / n
            + config.c3_weight * mean_weight_diff
    }

    fn connection_innovation_set(&self) -> HashSet<usize> {
        self.connections.keys().copied().collect()
    }

    fn mean_matching_weight_diff(&self, other: &Genome) -> f64 {
        let mut sum = 0.0;
        let mut count = 0u32;
        for (innov, gene) in &self.connections {
            if let Some(other_gene) = other.connections.get(innov) {
                if gene.enabled && other_gene.enabled {
                    sum += (gene.weight - other_gene.weight).abs();
                    count += 1;
                }
            }
        }
        if count > 0 {
            sum / count as f64
        } else {
            0.0
        }
    }

    /// Asserts invariants I1-I5 (§3, §7, §8 property 1). A violation is a programmer bug.
    pub fn check_invariants(&self) -> Result<(), InvariantError> {
        for conn in self.connections.values() {
            if !self.nodes.contains_key(&conn.source) {
                return Err(InvariantError::DanglingConnectionEndpoint {
                    innovation: conn.innovation,
                    node: conn.source,
                });
            }
            if !self.nodes.contains_key(&conn.target) {
                return Err(InvariantError::DanglingConnectionEndpoint {
                    innovation: conn.innovation,
                    node: conn.target,
                });
            }
            if self.role_of(conn.target) == NodeRole::Input {
                return Err(InvariantError::InputAsDestination(conn.target));
            }
            if self.role_of(conn.source) == NodeRole::Output {
                return Err(InvariantError::OutputAsSource(conn.source));
            }
        }

        let mut seen_pairs = HashSet::new();
        for conn in self.connections.values() {
            if !seen_pairs.insert((conn.source, conn.target)) {
                return Err(InvariantError::DuplicateConnectionPair(conn.source, conn.target));
            }
        }

        for &id in &self.input_nodes {
            if !self.nodes.contains_key(&id) {
                return Err(InvariantError::MissingInputId(id));
            }
        }
        for &id in &self.output_nodes {
            if !self.nodes.contains_key(&id) {
                return Err(InvariantError::MissingOutputId(id));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn rng() -> StdRng {
        StdRng::seed_from_u64(42)
    }

    fn sample_genome(id: usize, innovation: &mut InnovationRegistry) -> Genome {
        let config = Config::default();
        Genome::new_initial(id, config.num_inputs, config.num_outputs, &config, innovation, &mut rng())
    }

    #[test]
    fn initial_genome_satisfies_invariants() {
        let mut innovation = InnovationRegistry::new(0, 0);
        let genome = sample_genome(0, &mut innovation);
        genome.check_invariants().expect("initial genome must satisfy I1-I5");
    }

    #[test]
    fn distance_to_self_is_zero() {
        let mut innovation = InnovationRegistry::new(0, 0);
        let config = Config::default();
        let genome = sample_genome(0, &mut innovation);
        assert_eq!(genome.distance(&genome, &config), 0.0);
    }

    #[test]
    fn distance_is_symmetric() {
        let mut innovation = InnovationRegistry::new(0, 0);
        let config = Config::default();
        let a = sample_genome(0, &mut innovation);
        innovation.reset_generation_cache();
        let mut b = sample_genome(1, &mut innovation);
        b.mutate_weights(&config, &mut rng());
        assert!((a.distance(&b, &config) - b.distance(&a, &config)).abs() < 1e-12);
    }

    #[test]
    fn e4_distance_scenario() {
        // Two genomes differing by one excess gene; three matching genes with weight
        // differences summing to 1.2; larger genome has 4 genes total.
        let mut config = Config::default();
        config.c1_excess = 1.0;
        config.c2_disjoint = 1.0;
        config.c3_weight = 0.9;

        let nodes: HashMap<usize, NodeGene> = [
            NodeGene::input(0),
            NodeGene::input(1),
            NodeGene::bias_node(2),
            NodeGene::output(3, 0.0),
        ]
        .into_iter()
        .map(|n| (n.id, n))
        .collect();

        let mut a_conns = HashMap::new();
        a_conns.insert(1, ConnectionGene::new(1, 0, 3, 1.0));
        a_conns.insert(2, ConnectionGene::new(2, 1, 3, 1.0));
        a_conns.insert(3, ConnectionGene::new(3, 2, 3, 1.0));
        a_conns.insert(4, ConnectionGene::new(4, 0, 3, 1.0)); // placeholder 4th gene (excess)

        let mut b_conns = HashMap::new();
        b_conns.insert(1, ConnectionGene::new(1, 0, 3, 1.7));
        b_conns.insert(2, ConnectionGene::new(2, 1, 3, 1.5));
        b_conns.insert(3, ConnectionGene::new(3, 2, 3, 1.0));

        let a = Genome {
            id: 0,
            nodes: nodes.clone(),
            connections: a_conns,
            connection_pairs: HashSet::new(),
            input_nodes: vec![0, 1],
            output_nodes: vec![3],
            bias_node: 2,
            fitness: 0.0,
            adjusted_fitness: 0.0,
            species_id: None,
        };
        // weight diffs: |1.0-1.7|=0.7, |1.0-1.5|=0.5, |1.0-1.0|=0.0 => sum 1.2 over 3 matches
        let b = Genome {
            id: 1,
            nodes,
            connections: b_conns,
            connection_pairs: HashSet::new(),
            input_nodes: vec![0, 1],
            output_nodes: vec![3],
            bias_node: 2,
            fitness: 0.0,
            adjusted_fitness: 0.0,
            species_id: None,
        };

        let dist = a.distance(&b, &config);
        assert!((dist - 0.61).abs() < 1e-6, "got {dist}");
    }

    #[test]
    fn add_node_mutation_increments_counters_correctly() {
        let mut innovation = InnovationRegistry::new(0, 0);
        let mut genome = sample_genome(0, &mut innovation);
        let nodes_before = innovation.node_id_counter();
        let innov_before = innovation.innovation_counter();
        let mut r = rng();
        let applied = genome.add_node_mutation(&mut r, &mut innovation);
        assert!(applied);
        assert_eq!(innovation.node_id_counter(), nodes_before + 1);
        assert_eq!(innovation.innovation_counter(), innov_before + 2);
        genome.check_invariants().expect("post-mutation invariants must hold");
    }

    #[test]
    fn e3_crossover_disjoint_genes_scenario() {
        // Parent A: innovations {1,2,3,4}. Parent B: innovations {1,2,5}. Fitness A > B.
        let nodes: HashMap<usize, NodeGene> = [
            NodeGene::input(0),
            NodeGene::input(1),
            NodeGene::bias_node(2),
            NodeGene::output(3, 0.0),
            NodeGene::hidden(4, 0.0),
        ]
        .into_iter()
        .map(|n| (n.id, n))
        .collect();

        let mut a_conns = HashMap::new();
        a_conns.insert(1, ConnectionGene::new(1, 0, 3, 1.0));
        a_conns.insert(2, ConnectionGene::new(2, 1, 3, 2.0));
        a_conns.insert(3, ConnectionGene::new(3, 2, 3, 3.0));
        a_conns.insert(4, ConnectionGene::new(4, 0, 4, 4.0));
        let a = Genome {
            id: 0,
            nodes: nodes.clone(),
            connections: a_conns,
            connection_pairs: HashSet::new(),
            input_nodes: vec![0, 1],
            output_nodes: vec![3],
            bias_node: 2,
            fitness: 10.0,
            adjusted_fitness: 0.0,
            species_id: None,
        };

        let mut b_conns = HashMap::new();
        b_conns.insert(1, ConnectionGene::new(1, 0, 3, -1.0));
        b_conns.insert(2, ConnectionGene::new(2, 1, 3, -2.0));
        b_conns.insert(5, ConnectionGene::new(5, 1, 4, 5.0));
        let b = Genome {
            id: 1,
            nodes,
            connections: b_conns,
            connection_pairs: HashSet::new(),
            input_nodes: vec![0, 1],
            output_nodes: vec![3],
            bias_node: 2,
            fitness: 5.0,
            adjusted_fitness: 0.0,
            species_id: None,
        };

        let config = Config::default();
        let trials = 1000;
        let mut from_a_1 = 0u32;
        let mut from_a_2 = 0u32;
        for seed in 0..trials {
            let mut r = StdRng::seed_from_u64(seed);
            let child = Genome::crossover(&a, &b, 99, &config, &mut r);

            let innovs: HashSet<usize> = child.connections.keys().copied().collect();
            assert_eq!(innovs, HashSet::from([1, 2, 3, 4]), "child must inherit exactly A's superset");
            assert_eq!(child.connections[&3].weight, 3.0, "disjoint gene 3 always comes from the fitter parent");
            assert_eq!(child.connections[&4].weight, 4.0, "disjoint gene 4 always comes from the fitter parent");

            if child.connections[&1].weight == 1.0 {
                from_a_1 += 1;
            }
            if child.connections[&2].weight == 2.0 {
                from_a_2 += 1;
            }
        }

        let freq_1 = from_a_1 as f64 / trials as f64;
        let freq_2 = from_a_2 as f64 / trials as f64;
        assert!((freq_1 - 0.5).abs() < 0.05, "innovation 1 from-A frequency {freq_1}");
        assert!((freq_2 - 0.5).abs() < 0.05, "innovation 2 from-A frequency {freq_2}");
    }

    #[test]
    fn crossover_child_satisfies_invariants() {
        let mut innovation = InnovationRegistry::new(0, 0);
        let config = Config::default();
        let mut a = sample_genome(0, &mut innovation);
        innovation.reset_generation_cache();
        let mut b = sample_genome(1, &mut innovation);
        a.fitness = 10.0;
        b.fitness = 5.0;
        let mut r = rng();
        a.add_node_mutation(&mut r, &mut innovation);
        b.add_connection_mutation(&config, &mut r, &mut innovation);
        let child = Genome::crossover(&a, &b, 2, &config, &mut r);
        child.check_invariants().expect("crossover child must satisfy I1-I5");
    }
}
