//! Enemy AI controller
//!
//! Each tick runs a movement phase (the first behavior in the priority queue
//! that acts wins), counts down the running action, and then runs an attack
//! phase that picks a target and maybe casts a skill.
//!
//! All times are milliseconds.

use rand::{Rng, RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::f64::consts::FRAC_1_SQRT_2;
use std::fmt;
use tracing::{debug, trace, warn};

use crate::game::collision::{polygon_polygon, Polygon, Rect};
use crate::game::constants::ai::*;
use crate::game::entity::{Body, Entity, EntityId, EntityKind, Vitals};
use crate::game::skills::{CastContext, CastResult, Skill};
use crate::game::spatial::{Selector, SpatialHash};
use crate::game::systems::projectile::Projectile;
use crate::util::math::{js_round, weighted_random, Weighted};
use crate::util::vec2::Vec2;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AiError {
    #[error("Invalid AI config: {0}")]
    InvalidConfig(String),
}

/// How hard the AI tries to avoid projectiles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DodgeLevel {
    #[default]
    None,
    Low,
    /// Accepted, currently behaves like `None`
    Medium,
    /// Accepted, currently behaves like `None`
    High,
}

/// AI configuration, fixed at construction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AiConfig {
    /// Pick random headings when idle
    pub wander: bool,
    /// Steer back when near the edge of the assigned bounds
    pub keep_in_bounds: bool,
    pub dodge: DodgeLevel,
    /// Half-side of the box searched for new targets
    pub view_distance: f64,
    /// A held target further than this is dropped
    pub target_distance: f64,
    /// Seed for the decision RNG; `None` seeds from entropy
    pub seed: Option<u64>,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            wander: true,
            keep_in_bounds: true,
            dodge: DodgeLevel::None,
            view_distance: VIEW_DISTANCE,
            target_distance: TARGET_DISTANCE,
            seed: None,
        }
    }
}

impl AiConfig {
    pub fn validate(&self) -> Result<(), AiError> {
        if !(self.view_distance.is_finite() && self.view_distance > 0.0) {
            return Err(AiError::InvalidConfig(format!(
                "view_distance must be positive, got {}",
                self.view_distance
            )));
        }
        if !(self.target_distance.is_finite() && self.target_distance > 0.0) {
            return Err(AiError::InvalidConfig(format!(
                "target_distance must be positive, got {}",
                self.target_distance
            )));
        }
        Ok(())
    }
}

/// Movement behaviors, in priority order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Behavior {
    Dodge,
    KeepInBounds,
    Wander,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BehaviorOutcome {
    /// Velocity was claimed, skip lower priorities
    Acted,
    Continue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    Wander,
    Bounds,
    Dodge,
}

/// A timed velocity claim
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Action {
    pub kind: ActionKind,
    /// Remaining time
    pub time: f64,
}

/// The parts of an enemy the AI reads and drives
pub struct AiSubject<'a> {
    pub body: &'a mut Body,
    pub bounds: Option<Rect>,
    pub vitals: &'a mut Vitals,
    pub skills: &'a [Skill],
}

/// Weight of an affordable skill in the attack roll
pub fn skill_weight(mana: f64, cost: f64) -> f64 {
    js_round(((mana - cost + 1.0) * 10.0).powf(-0.1)) * 10.0
}

pub struct Ai {
    config: AiConfig,
    action_queue: Vec<Behavior>,
    action: Option<Action>,
    /// Weak reference to the current target
    target: Option<EntityId>,
    attack_cd: f64,
    rng: Box<dyn RngCore>,
}

impl fmt::Debug for Ai {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ai")
            .field("config", &self.config)
            .field("action_queue", &self.action_queue)
            .field("action", &self.action)
            .field("target", &self.target)
            .field("attack_cd", &self.attack_cd)
            .finish_non_exhaustive()
    }
}

impl Ai {
    pub fn new(config: AiConfig) -> Result<Self, AiError> {
        let rng: Box<dyn RngCore> = match config.seed {
            Some(seed) => Box::new(ChaCha8Rng::seed_from_u64(seed)),
            None => Box::new(ChaCha8Rng::from_entropy()),
        };
        Self::with_rng(config, rng)
    }

    /// Build with an explicit random source
    pub fn with_rng(config: AiConfig, rng: Box<dyn RngCore>) -> Result<Self, AiError> {
        config.validate()?;

        if matches!(config.dodge, DodgeLevel::Medium | DodgeLevel::High) {
            warn!("Dodge level {:?} is not implemented, projectiles will be ignored", config.dodge);
        }

        let mut action_queue = Vec::with_capacity(3);
        if config.dodge != DodgeLevel::None {
            action_queue.push(Behavior::Dodge);
        }
        if config.keep_in_bounds {
            action_queue.push(Behavior::KeepInBounds);
        }
        if config.wander {
            action_queue.push(Behavior::Wander);
        }

        Ok(Self {
            config,
            action_queue,
            action: None,
            target: None,
            attack_cd: 0.0,
            rng,
        })
    }

    pub fn config(&self) -> &AiConfig {
        &self.config
    }

    pub fn action_queue(&self) -> &[Behavior] {
        &self.action_queue
    }

    pub fn action(&self) -> Option<&Action> {
        self.action.as_ref()
    }

    pub fn target(&self) -> Option<EntityId> {
        self.target
    }

    pub fn attack_cd(&self) -> f64 {
        self.attack_cd
    }

    fn dodging(&self) -> bool {
        matches!(self.action, Some(Action { kind: ActionKind::Dodge, .. }))
    }

    /// Run one AI tick for `subject`
    pub fn tick(&mut self, subject: &mut AiSubject<'_>, grid: &mut SpatialHash, dt: f64) {
        self.movement(subject, grid);
        self.advance_action(subject, dt);
        self.attack(subject, grid, dt);
    }

    fn movement(&mut self, subject: &mut AiSubject<'_>, grid: &SpatialHash) {
        for i in 0..self.action_queue.len() {
            let behavior = self.action_queue[i];
            let outcome = match behavior {
                Behavior::Dodge => self.dodge(subject, grid),
                Behavior::KeepInBounds => self.keep_in_bounds(subject),
                Behavior::Wander => self.wander(subject),
            };
            if outcome == BehaviorOutcome::Acted {
                trace!("{} {:?} -> velocity {:?}", subject.body.id, behavior, subject.body.velocity);
                break;
            }
        }
    }

    fn advance_action(&mut self, subject: &mut AiSubject<'_>, dt: f64) {
        if let Some(action) = self.action.as_mut() {
            action.time -= dt;
            if action.time <= 0.0 {
                self.action = None;
                subject.body.velocity = Vec2::ZERO;
            }
        }
    }

    fn wander(&mut self, subject: &mut AiSubject<'_>) -> BehaviorOutcome {
        if !subject.body.velocity.is_zero() || self.action.is_some() {
            return BehaviorOutcome::Continue;
        }

        let heading = self.rng.gen::<f64>() * 360.0;
        let time = WANDER_MIN_MS + self.rng.gen::<f64>() * (WANDER_MAX_MS - WANDER_MIN_MS);
        subject.body.velocity = Vec2::from_degrees(heading);
        self.action = Some(Action {
            kind: ActionKind::Wander,
            time,
        });
        BehaviorOutcome::Acted
    }

    fn keep_in_bounds(&mut self, subject: &mut AiSubject<'_>) -> BehaviorOutcome {
        let Some(bounds) = subject.bounds else {
            return BehaviorOutcome::Continue;
        };
        if self.dodging() {
            return BehaviorOutcome::Continue;
        }

        let center = subject.body.center();
        let mut correction = Vec2::ZERO;
        if center.x < bounds.min.x + BOUNDS_MARGIN {
            correction.x = 1.0;
        } else if center.x > bounds.max.x - BOUNDS_MARGIN {
            correction.x = -1.0;
        }
        if center.y < bounds.min.y + BOUNDS_MARGIN {
            correction.y = 1.0;
        } else if center.y > bounds.max.y - BOUNDS_MARGIN {
            correction.y = -1.0;
        }

        if correction.is_zero() {
            return BehaviorOutcome::Continue;
        }
        if correction.x != 0.0 && correction.y != 0.0 {
            correction = correction * FRAC_1_SQRT_2;
        }

        subject.body.velocity = correction;
        self.action = Some(Action {
            kind: ActionKind::Bounds,
            time: BOUNDS_CORRECTION_MS,
        });
        BehaviorOutcome::Acted
    }

    /// Sweep each nearby projectile's path and step aside from the ones
    /// that would hit. Own projectiles never hit their caster and are
    /// skipped. The last threat processed sets the velocity.
    fn dodge(&mut self, subject: &mut AiSubject<'_>, grid: &SpatialHash) -> BehaviorOutcome {
        if self.config.dodge != DodgeLevel::Low {
            return BehaviorOutcome::Continue;
        }

        let origin = subject.body.center();
        let hull = subject.body.rect().to_polygon();
        let selector = Selector::of_kind(EntityKind::Projectile)
            .around(origin, Vec2::splat(DODGE_WINDOW))
            .nearest();

        let mut escape = None;
        for entity in grid.select(&selector) {
            let Some(projectile) = entity.as_any().downcast_ref::<Projectile>() else {
                continue;
            };
            if projectile.owner() == subject.body.id {
                continue;
            }
            let direction = projectile.direction();
            if direction.is_zero() {
                continue;
            }

            let start = projectile.body().center();
            let path = Polygon::swept_quad(start, direction, DODGE_LOOKAHEAD, projectile.half_width());
            if !polygon_polygon(&path, &hull) {
                continue;
            }

            escape = Some(match projectile.curve() {
                Some(curve) => (origin - curve.center).normalize(),
                None => {
                    let side = direction.perpendicular();
                    let near_side = (start + side).distance_sq_to(origin);
                    let far_side = (start - side).distance_sq_to(origin);
                    if near_side <= far_side {
                        side
                    } else {
                        -side
                    }
                }
            });
            trace!("{} predicts a hit from {}", subject.body.id, entity.id());
        }

        let Some(velocity) = escape else {
            return BehaviorOutcome::Continue;
        };
        subject.body.velocity = velocity;
        self.action = Some(Action {
            kind: ActionKind::Dodge,
            time: DODGE_LOCK_MS,
        });
        BehaviorOutcome::Acted
    }

    /// Resolve the held target or acquire the nearest visible player
    fn acquire_target(&mut self, origin: Vec2, grid: &SpatialHash) -> Option<(EntityId, Vec2)> {
        if let Some(id) = self.target {
            let limit = self.config.target_distance * self.config.target_distance;
            let in_range = grid
                .get(id)
                .is_some_and(|target| target.body().center().distance_sq_to(origin) <= limit);
            if !in_range {
                trace!("Dropping target {}", id);
                self.target = None;
            }
        }

        if self.target.is_none() {
            let selector = Selector::of_kind(EntityKind::Player)
                .around(origin, Vec2::splat(self.config.view_distance))
                .nearest()
                .limit(1);
            self.target = grid.select(&selector).first().map(|player| player.id());
        }

        let id = self.target?;
        grid.get(id).map(|target| (id, target.body().center()))
    }

    fn attack(&mut self, subject: &mut AiSubject<'_>, grid: &mut SpatialHash, dt: f64) {
        if subject.skills.is_empty() {
            return;
        }
        self.attack_cd = (self.attack_cd - dt).max(0.0);
        if self.attack_cd > 0.0 {
            return;
        }

        let origin = subject.body.center();
        let Some((target, tile)) = self.acquire_target(origin, grid) else {
            return;
        };

        let mana = subject.vitals.mana;
        let mut options = vec![Weighted::new(IDLE_WEIGHT, None)];
        for (index, skill) in subject.skills.iter().enumerate() {
            if skill.mana_cost <= mana {
                options.push(Weighted::new(skill_weight(mana, skill.mana_cost), Some(index)));
            }
        }

        let choice = weighted_random(&options, self.rng.as_mut()).copied().flatten();
        let Some(skill) = choice.and_then(|index| subject.skills.get(index)) else {
            self.attack_cd = IDLE_COOLDOWN_MS;
            return;
        };

        let mut ctx = CastContext {
            grid,
            caster: subject.body.id,
            origin,
            vector: (tile - origin).normalize(),
            tile,
        };
        let result = skill.effect.cast(&mut ctx);
        if result == CastResult::Cast {
            subject.vitals.mana -= skill.mana_cost;
        }
        self.attack_cd = skill.cd * 1000.0;

        debug!("{} cast {} at {}: {:?}", subject.body.id, skill.id, target, result);
    }
}
