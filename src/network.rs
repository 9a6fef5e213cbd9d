use std::collections::{BTreeSet, HashMap};

use tracing::warn;

use crate::error::EvaluationError;
use crate::genome::{Genome, NodeRole};

/// A genome's enabled-connection subgraph, topologically ordered once and reused across
/// repeated activations (§4.3). The order depends only on topology, not on input values, so
/// `activate` is a pure function of (genome, inputs) — property 9.
pub struct FeedforwardNetwork<'g> {
    genome: &'g Genome,
    /// Hidden/Output node ids in topological order; Input/Bias are seeded separately.
    topo_order: Vec<usize>,
    incoming: HashMap<usize, Vec<(usize, f64)>>,
}

impl<'g> FeedforwardNetwork<'g> {
    pub fn build(genome: &'g Genome) -> Self {
        let mut incoming: HashMap<usize, Vec<(usize, f64)>> = HashMap::new();
        let mut out_neighbors: HashMap<usize, BTreeSet<usize>> = HashMap::new();
        let mut relevant: BTreeSet<usize> = genome
            .input_nodes
            .iter()
            .copied()
            .chain(genome.output_nodes.iter().copied())
            .chain(std::iter::once(genome.bias_node))
            .collect();

        for conn in genome.connections.values().filter(|c| c.enabled) {
            relevant.insert(conn.source);
            relevant.insert(conn.target);
            incoming
                .entry(conn.target)
                .or_default()
                .push((conn.source, conn.weight));
            out_neighbors.entry(conn.source).or_default().insert(conn.target);
        }

        let mut in_degree: HashMap<usize, usize> = relevant.iter().map(|&id| (id, 0)).collect();
        for targets in out_neighbors.values() {
            for &t in targets {
                *in_degree.entry(t).or_insert(0) += 1;
            }
        }

        // Kahn's algorithm; a `BTreeSet` frontier gives a deterministic, sorted-by-id visit
        // order without a separate neighbor-sort step (§4.3 "stable ordering ... by id").
        let mut frontier: BTreeSet<usize> = in_degree
            .iter()
            .filter(|&(_, &deg)| deg == 0)
            .map(|(&id, _)| id)
            .collect();

        let mut topo_order = Vec::new();
        let mut visited = 0usize;
        while let Some(&node) = frontier.iter().next() {
            frontier.remove(&node);
            visited += 1;
            if !matches!(genome.nodes[&node].role, NodeRole::Input | NodeRole::Bias) {
                topo_order.push(node);
            }
            if let Some(targets) = out_neighbors.get(&node) {
                for &t in targets {
                    let deg = in_degree.get_mut(&t).expect("relevant node has in_degree entry");
                    *deg -= 1;
                    if *deg == 0 {
                        frontier.insert(t);
                    }
                }
            }
        }

        if visited != relevant.len() {
            warn!(
                genome_id = genome.id,
                visited,
                relevant = relevant.len(),
                "activation graph has a cycle or disconnection; unreachable outputs report 0"
            );
        }

        FeedforwardNetwork {
            genome,
            topo_order,
            incoming,
        }
    }

    /// Runs one forward pass. Outputs for Hidden/Output nodes the topological walk never
    /// reached are reported as 0 (already the case, since they are absent from `topo_order`).
    pub fn activate(&self, inputs: &[f64]) -> Result<Vec<f64>, EvaluationError> {
        if inputs.len() != self.genome.input_nodes.len() {
            return Err(EvaluationError::Activation(format!(
                "expected {} inputs, got {}",
                self.genome.input_nodes.len(),
                inputs.len()
            )));
        }

        let mut values: HashMap<usize, f64> = HashMap::new();
        for (&id, &value) in self.genome.input_nodes.iter().zip(inputs.iter()) {
            values.insert(id, value);
        }
        values.insert(self.genome.bias_node, 1.0);

        for &node_id in &self.topo_order {
            let node = &self.genome.nodes[&node_id];
            let sum: f64 = self
                .incoming
                .get(&node_id)
                .map(|edges| {
                    edges
                        .iter()
                        .map(|&(src, weight)| values.get(&src).copied().unwrap_or(0.0) * weight)
                        .sum()
                })
                .unwrap_or(0.0)
                + node.bias;
            values.insert(node_id, node.activation.apply(sum));
        }

        let mut outputs: Vec<usize> = self.genome.output_nodes.clone();
        outputs.sort_unstable();
        Ok(outputs
            .into_iter()
            .map(|id| values.get(&id).copied().unwrap_or(0.0))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::genome::{ConnectionGene, NodeGene};
    use std::collections::HashMap as StdHashMap;

    fn e1_genome() -> Genome {
        // 2 inputs (0,1), bias (2), 2 outputs (3,4); all 6 initial connections enabled.
        let nodes: StdHashMap<usize, NodeGene> = [
            NodeGene::input(0),
            NodeGene::input(1),
            NodeGene::bias_node(2),
            NodeGene::output(3, 0.0),
            NodeGene::output(4, 0.0),
        ]
        .into_iter()
        .map(|n| (n.id, n))
        .collect();

        let weights = [
            (0usize, 3usize, 0.5),
            (0, 4, -0.5),
            (1, 3, 0.0),
            (1, 4, 1.0),
            (2, 3, 0.1),
            (2, 4, -0.1),
        ];
        let mut connections = StdHashMap::new();
        for (i, (src, dst, w)) in weights.into_iter().enumerate() {
            connections.insert(i, ConnectionGene::new(i, src, dst, w));
        }

        Genome::from_parts(
            0,
            nodes,
            connections,
            vec![0, 1],
            vec![3, 4],
            2,
        )
    }

    #[test]
    fn e1_initial_network_activation() {
        let genome = e1_genome();
        let net = FeedforwardNetwork::build(&genome);
        let out = net.activate(&[1.0, 0.0]).expect("valid input length");
        assert!((out[0] - 0.9495).abs() < 1e-4, "output 3 = {}", out[0]);
        assert!((out[1] - 0.0505).abs() < 1e-4, "output 4 = {}", out[1]);
    }

    #[test]
    fn activation_is_pure_given_fixed_genome() {
        let genome = e1_genome();
        let net = FeedforwardNetwork::build(&genome);
        let first = net.activate(&[0.3, 0.7]).unwrap();
        let second = net.activate(&[0.3, 0.7]).unwrap();
        assert_eq!(first, second, "property 9: pure function of (genome, inputs)");
    }

    #[test]
    fn e2_add_node_preserves_behavior() {
        use crate::innovation::InnovationRegistry;

        let mut genome = e1_genome();
        let mut innovation = InnovationRegistry::new(5, 6);
        let disabled_innov = 0; // connection (0,3) weight 0.5
        genome.connections.get_mut(&disabled_innov).unwrap().enabled = false;

        let (new_node, inbound, outbound) = innovation.register_node_split(disabled_innov, 0, 3);
        genome.nodes.insert(new_node, NodeGene::hidden(new_node, 0.0));
        genome
            .connections
            .insert(inbound, ConnectionGene::new(inbound, 0, new_node, 1.0));
        genome
            .connections
            .insert(outbound, ConnectionGene::new(outbound, new_node, 3, 0.5));

        genome.check_invariants().expect("I1-I5 after add-node");

        let net = FeedforwardNetwork::build(&genome);
        let out = net.activate(&[1.0, 0.0]).unwrap();
        let h = 1.0 / (1.0 + (-4.9_f64 * 1.0).exp());
        let expected = 1.0 / (1.0 + (-4.9_f64 * (h * 0.5 + 0.1)).exp());
        assert!((out[0] - expected).abs() < 1e-9);
    }
}
