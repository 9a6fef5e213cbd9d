use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::agent::Agent;
use crate::config::Config;
use crate::genome::Genome;
use crate::maze::Maze;
use crate::network::FeedforwardNetwork;

const BASE_REWARD: f64 = 1000.0;
const FITNESS_FLOOR: f64 = 0.001;

/// Runs one agent-in-maze simulation for `genome` and reduces it to a scalar fitness (§4.6).
/// Never fails: any internal fault is contained and produces the floor fitness, matching the
/// "exception-driven fallback" design note (§9) translated into a total function.
pub fn evaluate_genome(genome: &Genome, maze: &Maze, config: &Config, seed: u64) -> f64 {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut agent = Agent::new(maze.start, maze, config, &mut rng);
    let network = FeedforwardNetwork::build(genome);

    for step in 0..config.max_steps_per_evaluation {
        if agent.reached_goal {
            break;
        }
        let sensors = agent.sensors(maze, config);
        let motor = match network.activate(&sensors) {
            Ok(outputs) if outputs.len() == 4 => [outputs[0], outputs[1], outputs[2], outputs[3]],
            _ => [0.5, 0.5, 0.5, 0.5],
        };
        agent.update(maze, motor, 1.0);
        agent.steps_taken = step + 1;
    }

    fitness(&agent, maze, config.max_steps_per_evaluation).max(FITNESS_FLOOR)
}

fn fitness(agent: &Agent, maze: &Maze, max_steps: u32) -> f64 {
    let mut fitness = 0.0;

    if agent.reached_goal {
        fitness += BASE_REWARD;
        let speed_bonus = (BASE_REWARD / 2.0) * (1.0 - agent.steps_taken as f64 / max_steps as f64);
        fitness += speed_bonus.max(0.0);
        fitness -= 0.7 * agent.steps_taken as f64;
    } else if agent.min_dist_to_goal.is_finite() {
        let diagonal = maze.diagonal();
        if diagonal > 0.0 {
            let proximity = (1.0 - agent.min_dist_to_goal / diagonal).max(0.0);
            fitness += (BASE_REWARD / 2.0) * proximity * proximity;
        }
    }

    if agent.collided {
        fitness *= 0.5;
    }
    if agent.velocity < 0.1 * agent.max_speed {
        fitness *= 0.5;
    }

    fitness
}
