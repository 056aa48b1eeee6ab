//! Fixed-step simulation driver
//!
//! One tick is a step sweep over the grid followed by an explicit collision
//! pass.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::{debug, info, trace};

use crate::config::{ConfigError, SimulationConfig};
use crate::game::actors::{Enemy, Player};
use crate::game::collision::Rect;
use crate::game::entity::{Entity, EntityId, EntityKind};
use crate::game::skills::Skill;
use crate::game::spatial::{GridStats, Selector, SpatialError, SpatialHash};
use crate::game::systems::ai::{AiConfig, AiError, DodgeLevel};
use crate::util::vec2::Vec2;

#[derive(Debug, thiserror::Error)]
pub enum SimulationError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Spatial(#[from] SpatialError),
    #[error(transparent)]
    Ai(#[from] AiError),
}

/// Result of a single tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickReport {
    pub tick: u64,
    /// Collision handlers invoked
    pub collisions: usize,
    pub entities: usize,
}

pub struct Simulation {
    grid: SpatialHash,
    tick: u64,
    elapsed_ms: f64,
}

impl Simulation {
    pub fn new(grid: SpatialHash) -> Self {
        Self {
            grid,
            tick: 0,
            elapsed_ms: 0.0,
        }
    }

    /// Build the world from config: one player in the middle and
    /// `enemy_count` enemies scattered at random
    pub fn from_config(config: &SimulationConfig) -> Result<Self, SimulationError> {
        config.validate()?;

        let size = Vec2::new(config.world_width, config.world_height);
        let grid = SpatialHash::from_origin_size(Vec2::ZERO, size, (config.grid_cols, config.grid_rows))?;
        let mut sim = Self::new(grid);

        let mut rng = match config.seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        };

        let mut player = Player::new(Vec2::ZERO);
        player.body_mut().set_center(size / 2.0);
        sim.spawn(Box::new(player))?;

        let world = sim.grid.bounds();
        for _ in 0..config.enemy_count {
            let position = Vec2::new(
                rng.gen_range(0.0..config.world_width),
                rng.gen_range(0.0..config.world_height),
            );
            let ai = AiConfig {
                dodge: DodgeLevel::Low,
                seed: Some(rng.gen()),
                ..Default::default()
            };
            sim.spawn_enemy(position, ai, vec![Skill::bolt(), Skill::arc_bolt()], Some(world))?;
        }

        info!(
            "World {}x{} with {} enemies on a {}x{} grid",
            config.world_width, config.world_height, config.enemy_count, config.grid_cols, config.grid_rows
        );
        Ok(sim)
    }

    pub fn grid(&self) -> &SpatialHash {
        &self.grid
    }

    pub fn grid_mut(&mut self) -> &mut SpatialHash {
        &mut self.grid
    }

    pub fn tick_count(&self) -> u64 {
        self.tick
    }

    pub fn elapsed_ms(&self) -> f64 {
        self.elapsed_ms
    }

    pub fn spawn(&mut self, entity: Box<dyn Entity>) -> Result<EntityId, SpatialError> {
        self.grid.insert(entity)
    }

    pub fn spawn_enemy(
        &mut self,
        position: Vec2,
        ai: AiConfig,
        skills: Vec<Skill>,
        bounds: Option<Rect>,
    ) -> Result<EntityId, SimulationError> {
        let mut enemy = Enemy::new(position, ai)?.with_skills(skills);
        if let Some(bounds) = bounds {
            enemy = enemy.with_bounds(bounds);
        }
        Ok(self.spawn(Box::new(enemy))?)
    }

    /// Number of live entities of `kind`
    pub fn count(&self, kind: EntityKind) -> usize {
        self.grid.select(&Selector::of_kind(kind)).len()
    }

    /// Advance the world by `dt` milliseconds
    pub fn tick(&mut self, dt: f64) -> TickReport {
        self.grid.step(dt);
        let collisions = self.grid.resolve_collisions();

        self.tick += 1;
        self.elapsed_ms += dt;

        let report = TickReport {
            tick: self.tick,
            collisions,
            entities: self.grid.len(),
        };
        trace!("Tick {}: {} entities, {} collisions", report.tick, report.entities, collisions);
        report
    }

    /// Run `ticks` fixed steps and return the grid stats at the end
    pub fn run(&mut self, ticks: u64, dt: f64) -> GridStats {
        let mut collisions = 0;
        for _ in 0..ticks {
            collisions += self.tick(dt).collisions;
        }
        debug!("Ran {} ticks, {} collision handlers", ticks, collisions);
        self.grid.stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded(seed: u64, enemies: usize) -> SimulationConfig {
        SimulationConfig {
            world_width: 24.0,
            world_height: 24.0,
            grid_cols: 6,
            grid_rows: 6,
            enemy_count: enemies,
            seed: Some(seed),
            ..Default::default()
        }
    }

    #[test]
    fn test_from_config_populates_world() {
        let sim = Simulation::from_config(&seeded(1, 5)).unwrap();
        assert_eq!(sim.count(EntityKind::Player), 1);
        assert_eq!(sim.count(EntityKind::Enemy), 5);
        assert_eq!(sim.grid().stats().stepping, 6);
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let config = SimulationConfig {
            grid_cols: 0,
            ..Default::default()
        };
        assert!(matches!(
            Simulation::from_config(&config),
            Err(SimulationError::Config(ConfigError::GridCells(0, 16)))
        ));
    }

    #[test]
    fn test_tick_advances_clock() {
        let mut sim = Simulation::from_config(&seeded(2, 3)).unwrap();
        let report = sim.tick(20.0);
        assert_eq!(report.tick, 1);
        sim.tick(20.0);
        assert_eq!(sim.tick_count(), 2);
        assert_eq!(sim.elapsed_ms(), 40.0);
    }

    #[test]
    fn test_enemies_fight_the_player() {
        let mut sim = Simulation::from_config(&seeded(3, 0)).unwrap();
        let player = sim.grid().ids()[0];
        let center = sim.grid().get(player).unwrap().body().center();
        let ai = AiConfig {
            wander: false,
            keep_in_bounds: false,
            seed: Some(11),
            ..Default::default()
        };
        sim.spawn_enemy(center + Vec2::new(3.0, 0.0), ai, vec![Skill::bolt()], None)
            .unwrap();

        // Ten simulated seconds is plenty of attack rolls
        for _ in 0..600 {
            sim.tick(1000.0 / 60.0);
        }

        let health = sim.grid().get(player).and_then(|p| p.vitals()).map(|v| v.health);
        assert!(health.map_or(true, |h| h < 100.0), "player was never hit");
    }

    #[test]
    fn test_same_seed_same_world() {
        let positions = |seed| {
            let mut sim = Simulation::from_config(&seeded(seed, 8)).unwrap();
            sim.run(120, 1000.0 / 60.0);
            let mut out: Vec<(i64, i64)> = Vec::new();
            for id in sim.grid().ids() {
                if let Some(entity) = sim.grid().get(id) {
                    let p = entity.body().position;
                    out.push(((p.x * 1e6) as i64, (p.y * 1e6) as i64));
                }
            }
            out
        };

        assert_eq!(positions(42), positions(42));
    }
}
