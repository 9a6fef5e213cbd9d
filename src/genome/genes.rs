use serde::{Deserialize, Serialize};

/// The role a node gene plays in the network topology (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeRole {
    Input,
    Output,
    Hidden,
    Bias,
}

/// A node's activation-function tag. Input and Bias nodes are always `Linear` (§3).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ActivationFunction {
    Sigmoid,
    Relu,
    Linear,
}

impl ActivationFunction {
    /// The canonical NEAT sigmoid `1/(1+exp(-4.9x))`, not the plain logistic function — the
    /// steepened form is what makes the network saturate quickly near the edges (E1).
    pub fn apply(self, x: f64) -> f64 {
        match self {
            ActivationFunction::Sigmoid => 1.0 / (1.0 + (-4.9 * x).exp()),
            ActivationFunction::Relu => x.max(0.0),
            ActivationFunction::Linear => x,
        }
    }
}

/// Stable identity is the node's id, assigned once by the [`crate::innovation::InnovationRegistry`]
/// and never reused (§3).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct NodeGene {
    pub id: usize,
    pub role: NodeRole,
    /// Unused for Input/Bias nodes; meaningful for Hidden/Output.
    pub bias: f64,
    pub activation: ActivationFunction,
}

impl NodeGene {
    pub fn new(id: usize, role: NodeRole, bias: f64, activation: ActivationFunction) -> Self {
        NodeGene {
            id,
            role,
            bias,
            activation,
        }
    }

    pub fn input(id: usize) -> Self {
        NodeGene::new(id, NodeRole::Input, 0.0, ActivationFunction::Linear)
    }

    pub fn bias_node(id: usize) -> Self {
        NodeGene::new(id, NodeRole::Bias, 0.0, ActivationFunction::Linear)
    }

    pub fn output(id: usize, bias: f64) -> Self {
        NodeGene::new(id, NodeRole::Output, bias, ActivationFunction::Sigmoid)
    }

    pub fn hidden(id: usize, bias: f64) -> Self {
        NodeGene::new(id, NodeRole::Hidden, bias, ActivationFunction::Sigmoid)
    }
}

/// Stable identity is the innovation number, assigned once by the registry and shared by
/// every genome that independently discovers the same (source, destination) pair in one
/// generation (§3, §4.1).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ConnectionGene {
    pub innovation: usize,
    pub source: usize,
    pub target: usize,
    pub weight: f64,
    pub enabled: bool,
}

impl ConnectionGene {
    pub fn new(innovation: usize, source: usize, target: usize, weight: f64) -> Self {
        ConnectionGene {
            innovation,
            source,
            target,
            weight,
            enabled: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sigmoid_matches_canonical_neat_form() {
        let got = ActivationFunction::Sigmoid.apply(0.6);
        let want = 1.0 / (1.0 + (-4.9 * 0.6_f64).exp());
        assert!((got - want).abs() < 1e-12);
    }

    #[test]
    fn relu_clamps_negative_to_zero() {
        assert_eq!(ActivationFunction::Relu.apply(-3.0), 0.0);
        assert_eq!(ActivationFunction::Relu.apply(3.0), 3.0);
    }

    #[test]
    fn linear_is_identity() {
        assert_eq!(ActivationFunction::Linear.apply(-2.5), -2.5);
    }
}
