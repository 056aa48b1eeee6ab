//! Players and AI-driven enemies

use serde::{Deserialize, Serialize};
use std::any::Any;
use tracing::{debug, info, warn};

use crate::game::collision::Rect;
use crate::game::constants::actor::*;
use crate::game::entity::{Body, CollisionDescriptor, Entity, EntityId, EntityKind, Removable, Steppable, Vitals};
use crate::game::skills::Skill;
use crate::game::spatial::SpatialHash;
use crate::game::systems::ai::{Ai, AiConfig, AiError, AiSubject};
use crate::util::vec2::Vec2;

fn actor_body(position: Vec2, dimensions: Vec2) -> Body {
    Body::new(EntityId::next(), position, dimensions, CollisionDescriptor::passive_rect())
}

/// Player-controlled actor. The input layer sets its direction.
#[derive(Debug, Clone)]
pub struct Player {
    body: Body,
    vitals: Vitals,
    /// Tiles per second
    speed: f64,
}

/// Plain data needed to recreate a [`Player`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerSnapshot {
    pub position: Vec2,
    pub dimensions: Vec2,
    pub vitals: Vitals,
    pub speed: f64,
}

impl Player {
    pub fn new(position: Vec2) -> Self {
        Self {
            body: actor_body(position, Vec2::splat(BODY_SIZE)),
            vitals: Vitals::new(HEALTH, MANA, MANA_REGEN),
            speed: PLAYER_SPEED,
        }
    }

    /// Set the movement direction; zero stops the player
    pub fn set_direction(&mut self, direction: Vec2) {
        self.body.velocity = direction.normalize();
    }

    pub fn speed(&self) -> f64 {
        self.speed
    }

    pub fn snapshot(&self) -> PlayerSnapshot {
        PlayerSnapshot {
            position: self.body.position,
            dimensions: self.body.dimensions,
            vitals: self.vitals.clone(),
            speed: self.speed,
        }
    }

    /// Restore under a fresh id
    pub fn from_snapshot(snapshot: PlayerSnapshot) -> Self {
        Self {
            body: actor_body(snapshot.position, snapshot.dimensions),
            vitals: snapshot.vitals,
            speed: snapshot.speed,
        }
    }
}

impl Steppable for Player {
    fn step(&mut self, _grid: &mut SpatialHash, dt: f64) {
        self.vitals.regenerate(dt);
        self.body.position += self.body.velocity * self.speed * dt / 1000.0;
    }
}

impl Removable for Player {
    fn on_remove(&mut self, _grid: &mut SpatialHash) {
        info!("Player {} defeated", self.body.id);
    }
}

impl Entity for Player {
    fn kind(&self) -> EntityKind {
        EntityKind::Player
    }

    fn body(&self) -> &Body {
        &self.body
    }

    fn body_mut(&mut self) -> &mut Body {
        &mut self.body
    }

    fn as_steppable(&mut self) -> Option<&mut dyn Steppable> {
        Some(self)
    }

    fn as_removable(&mut self) -> Option<&mut dyn Removable> {
        Some(self)
    }

    fn vitals(&self) -> Option<&Vitals> {
        Some(&self.vitals)
    }

    fn vitals_mut(&mut self) -> Option<&mut Vitals> {
        Some(&mut self.vitals)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// AI-driven actor
#[derive(Debug)]
pub struct Enemy {
    body: Body,
    vitals: Vitals,
    skills: Vec<Skill>,
    /// Area the AI tries to stay inside
    bounds: Option<Rect>,
    speed: f64,
    ai: Ai,
}

/// Plain data needed to recreate an [`Enemy`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnemySnapshot {
    pub position: Vec2,
    pub dimensions: Vec2,
    pub vitals: Vitals,
    pub speed: f64,
    pub bounds: Option<Rect>,
    /// Built-in skill ids
    pub skills: Vec<String>,
    pub ai: AiConfig,
}

impl Enemy {
    pub fn new(position: Vec2, config: AiConfig) -> Result<Self, AiError> {
        Ok(Self::with_ai(position, Ai::new(config)?))
    }

    /// Build around an existing controller
    pub fn with_ai(position: Vec2, ai: Ai) -> Self {
        Self {
            body: actor_body(position, Vec2::splat(BODY_SIZE)),
            vitals: Vitals::new(HEALTH, MANA, MANA_REGEN),
            skills: Vec::new(),
            bounds: None,
            speed: ENEMY_SPEED,
            ai,
        }
    }

    pub fn with_skills(mut self, skills: Vec<Skill>) -> Self {
        self.skills = skills;
        self
    }

    pub fn with_bounds(mut self, bounds: Rect) -> Self {
        self.bounds = Some(bounds);
        self
    }

    pub fn with_speed(mut self, speed: f64) -> Self {
        self.speed = speed;
        self
    }

    pub fn ai(&self) -> &Ai {
        &self.ai
    }

    pub fn skills(&self) -> &[Skill] {
        &self.skills
    }

    pub fn bounds(&self) -> Option<Rect> {
        self.bounds
    }

    pub fn snapshot(&self) -> EnemySnapshot {
        EnemySnapshot {
            position: self.body.position,
            dimensions: self.body.dimensions,
            vitals: self.vitals.clone(),
            speed: self.speed,
            bounds: self.bounds,
            skills: self.skills.iter().map(|skill| skill.id.clone()).collect(),
            ai: self.ai.config().clone(),
        }
    }

    /// Restore under a fresh id. Unknown skill ids are skipped.
    pub fn from_snapshot(snapshot: EnemySnapshot) -> Result<Self, AiError> {
        let skills = snapshot
            .skills
            .iter()
            .filter_map(|id| {
                let skill = Skill::builtin(id);
                if skill.is_none() {
                    warn!("Dropping unknown skill '{}' from enemy snapshot", id);
                }
                skill
            })
            .collect();

        let mut enemy = Self::new(snapshot.position, snapshot.ai)?
            .with_skills(skills)
            .with_speed(snapshot.speed);
        enemy.body.dimensions = snapshot.dimensions;
        enemy.vitals = snapshot.vitals;
        enemy.bounds = snapshot.bounds;
        Ok(enemy)
    }
}

impl Steppable for Enemy {
    fn step(&mut self, grid: &mut SpatialHash, dt: f64) {
        self.vitals.regenerate(dt);

        let mut subject = AiSubject {
            body: &mut self.body,
            bounds: self.bounds,
            vitals: &mut self.vitals,
            skills: &self.skills,
        };
        self.ai.tick(&mut subject, grid, dt);

        self.body.position += self.body.velocity * self.speed * dt / 1000.0;
    }
}

impl Removable for Enemy {
    fn on_remove(&mut self, _grid: &mut SpatialHash) {
        debug!("Enemy {} removed at {:?}", self.body.id, self.body.position);
    }
}

impl Entity for Enemy {
    fn kind(&self) -> EntityKind {
        EntityKind::Enemy
    }

    fn body(&self) -> &Body {
        &self.body
    }

    fn body_mut(&mut self) -> &mut Body {
        &mut self.body
    }

    fn as_steppable(&mut self) -> Option<&mut dyn Steppable> {
        Some(self)
    }

    fn as_removable(&mut self) -> Option<&mut dyn Removable> {
        Some(self)
    }

    fn vitals(&self) -> Option<&Vitals> {
        Some(&self.vitals)
    }

    fn vitals_mut(&mut self) -> Option<&mut Vitals> {
        Some(&mut self.vitals)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
