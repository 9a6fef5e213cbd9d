use std::f64::consts::PI;

use rand::Rng;

use crate::config::Config;
use crate::maze::Maze;

/// Continuous pose plus accumulated evaluation state (§3). Agents have no identity outside a
/// single evaluation.
#[derive(Debug, Clone)]
pub struct Agent {
    pub x: f64,
    pub y: f64,
    pub angle: f64,
    pub velocity: f64,
    pub radius: f64,
    pub max_speed: f64,

    pub steps_taken: u32,
    pub collided: bool,
    pub reached_goal: bool,
    pub min_dist_to_goal: f64,
}

impl Agent {
    /// `min_dist_to_goal` is seeded from the starting position itself (§4.6: "including the
    /// starting position"), not left at infinity, so a genome whose very first motor output
    /// moves the agent away from the goal still gets credit for how close the start was.
    pub fn new(start: (usize, usize), maze: &Maze, config: &Config, rng: &mut impl Rng) -> Self {
        let x = start.1 as f64 + 0.5;
        let y = start.0 as f64 + 0.5;
        let goal_center = (maze.goal.1 as f64 + 0.5, maze.goal.0 as f64 + 0.5);
        Agent {
            x,
            y,
            angle: rng.random_range(0.0..(2.0 * PI)),
            velocity: 0.0,
            radius: 0.3,
            max_speed: config.agent_max_speed,
            steps_taken: 0,
            collided: false,
            reached_goal: false,
            min_dist_to_goal: (x - goal_center.0).hypot(y - goal_center.1),
        }
    }

    pub fn position_cell(&self) -> (usize, usize) {
        (self.y as usize, self.x as usize)
    }

    /// Sensor vector in the order fixed by §4.5: K rangefinders, L radar slices, heading
    /// cos/sin, normalized velocity. Length is `K + L + 3`.
    pub fn sensors(&self, maze: &Maze, config: &Config) -> Vec<f64> {
        let mut readings = Vec::with_capacity(config.num_rangefinders + config.num_radar_slices + 3);

        for i in 0..config.num_rangefinders {
            let offset = i as f64 * (2.0 * PI / config.num_rangefinders as f64);
            let hit = maze.cast_ray((self.x, self.y), self.angle + offset, config.rangefinder_max_dist);
            readings.push(hit.distance / config.rangefinder_max_dist);
        }

        let mut radar = vec![0.0; config.num_radar_slices];
        let goal_center = (maze.goal.1 as f64 + 0.5, maze.goal.0 as f64 + 0.5);
        let (dx, dy) = (goal_center.0 - self.x, goal_center.1 - self.y);
        let angle_to_goal = dy.atan2(dx);
        let relative_angle = (angle_to_goal - self.angle + PI).rem_euclid(2.0 * PI) - PI;
        let positive_relative_angle = (relative_angle + 2.0 * PI).rem_euclid(2.0 * PI);
        let slice_angle = 2.0 * PI / config.num_radar_slices as f64;
        let sector = ((positive_relative_angle / slice_angle) as usize).min(config.num_radar_slices - 1);
        radar[sector] = 1.0;
        readings.extend(radar);

        readings.push(self.angle.cos());
        readings.push(self.angle.sin());
        readings.push(if self.max_speed != 0.0 {
            self.velocity / self.max_speed
        } else {
            0.0
        });

        readings
    }

    /// Integrates one motor command into a new pose (§4.5). `dt` is the simulation tick
    /// length. A malformed motor vector (wrong length) is the caller's responsibility to
    /// normalize to the neutral `[0.5; 4]` command before calling this.
    pub fn update(&mut self, maze: &Maze, motor: [f64; 4], dt: f64) {
        let [turn_left, turn_right, accel, brake] = motor;

        let max_turn_rate = PI / 2.0 * dt;
        let turn_strength_left = (turn_left - 0.5).max(0.0) * 2.0;
        let turn_strength_right = (turn_right - 0.5).max(0.0) * 2.0;
        let turn_request = (turn_strength_right - turn_strength_left) * max_turn_rate;
        self.angle = (self.angle + turn_request).rem_euclid(2.0 * PI);

        let accel_power = 0.2 * self.max_speed * dt;
        let brake_power = 0.4 * self.max_speed * dt;
        let friction = 0.05 * dt;

        let acceleration = (accel - 0.5).max(0.0) * 2.0 * accel_power;
        let braking = (brake - 0.5).max(0.0) * 2.0 * brake_power;

        self.velocity += acceleration;
        self.velocity -= braking;
        self.velocity *= 1.0 - friction;
        self.velocity = self.velocity.clamp(0.0, self.max_speed);

        let move_dist = self.velocity * dt;
        let new_x = self.x + self.angle.cos() * move_dist;
        let new_y = self.y + self.angle.sin() * move_dist;

        self.collided = false;
        if !maze.is_walkable(new_x, new_y) {
            self.velocity = 0.0;
            self.collided = true;
        } else {
            self.x = new_x;
            self.y = new_y;
        }

        let goal_center = (maze.goal.1 as f64 + 0.5, maze.goal.0 as f64 + 0.5);
        let dist = (self.x - goal_center.0).hypot(self.y - goal_center.1);
        self.min_dist_to_goal = self.min_dist_to_goal.min(dist);
        if self.position_cell() == maze.goal {
            self.reached_goal = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn rng() -> StdRng {
        StdRng::seed_from_u64(0)
    }

    #[test]
    fn neutral_motor_command_is_a_no_op() {
        let config = Config::default();
        let maze = Maze::generate(config.maze_width, config.maze_height, Some(1)).unwrap();
        let mut agent = Agent::new(maze.start, &maze, &config, &mut rng());
        let before = (agent.x, agent.y, agent.angle, agent.velocity);
        agent.update(&maze, [0.5, 0.5, 0.5, 0.5], 0.5);
        assert_eq!(before, (agent.x, agent.y, agent.angle, agent.velocity));
    }

    #[test]
    fn colliding_into_a_wall_zeros_velocity_and_sets_flag() {
        let config = Config::default();
        let maze = Maze::generate(config.maze_width, config.maze_height, Some(1)).unwrap();
        let mut agent = Agent::new(maze.start, &maze, &config, &mut rng());
        agent.velocity = agent.max_speed;
        // Drive straight toward whatever is adjacent; run enough ticks to guarantee either a
        // wall or the maze boundary is met since the maze is bounded.
        for _ in 0..200 {
            agent.update(&maze, [0.5, 0.5, 1.0, 0.5], 0.5);
            if agent.collided {
                assert_eq!(agent.velocity, 0.0);
                return;
            }
        }
    }

    #[test]
    fn sensor_vector_has_expected_length() {
        let config = Config::default();
        let maze = Maze::generate(config.maze_width, config.maze_height, Some(1)).unwrap();
        let agent = Agent::new(maze.start, &maze, &config, &mut rng());
        let sensors = agent.sensors(&maze, &config);
        assert_eq!(sensors.len(), config.num_rangefinders + config.num_radar_slices + 3);
    }
}
