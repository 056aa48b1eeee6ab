//! Entity contract shared by everything the spatial hash owns
//!
//! Entities opt into per-tick behavior through capability traits
//! ([`Steppable`], [`Collidable`], [`Removable`]) exposed from [`Entity`].

use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::game::collision::Rect;
use crate::game::spatial::SpatialHash;
use crate::util::vec2::Vec2;

static NEXT_ENTITY_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique entity identifier.
///
/// Stored ids are weak references: resolve them through
/// [`SpatialHash::get`] at the point of use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId(u64);

impl EntityId {
    /// Allocate a fresh id
    pub fn next() -> Self {
        Self(NEXT_ENTITY_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Entity type used by selectors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    Player,
    Enemy,
    Projectile,
    Effect,
}

/// Who initiates collision handling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CollisionType {
    /// Not collidable at all
    None,
    /// Can be hit, never runs the collision pass itself
    Passive,
    /// Runs its collision handler when it overlaps something
    Active,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Shape {
    Rectangle,
    Circle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollisionDescriptor {
    pub kind: CollisionType,
    pub shape: Shape,
    pub solid: bool,
}

impl CollisionDescriptor {
    pub const fn none() -> Self {
        Self {
            kind: CollisionType::None,
            shape: Shape::Rectangle,
            solid: false,
        }
    }

    pub const fn passive_rect() -> Self {
        Self {
            kind: CollisionType::Passive,
            shape: Shape::Rectangle,
            solid: true,
        }
    }

    pub const fn active_rect() -> Self {
        Self {
            kind: CollisionType::Active,
            shape: Shape::Rectangle,
            solid: false,
        }
    }
}

impl Default for CollisionDescriptor {
    fn default() -> Self {
        Self::none()
    }
}

/// Spatial state of an entity. `position` is the top-left corner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Body {
    pub id: EntityId,
    pub position: Vec2,
    pub dimensions: Vec2,
    pub velocity: Vec2,
    pub collision: CollisionDescriptor,
}

impl Body {
    pub fn new(id: EntityId, position: Vec2, dimensions: Vec2, collision: CollisionDescriptor) -> Self {
        Self {
            id,
            position,
            dimensions,
            velocity: Vec2::ZERO,
            collision,
        }
    }

    #[inline]
    pub fn center(&self) -> Vec2 {
        self.position + self.dimensions / 2.0
    }

    /// Radius used when the shape is a circle
    #[inline]
    pub fn radius(&self) -> f64 {
        self.dimensions.x / 2.0
    }

    pub fn rect(&self) -> Rect {
        Rect::from_origin_size(self.position, self.dimensions)
    }

    /// Move so that the center lands on `center`
    pub fn set_center(&mut self, center: Vec2) {
        self.position = center - self.dimensions / 2.0;
    }
}

/// Health and mana pools
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vitals {
    pub health: f64,
    pub max_health: f64,
    pub mana: f64,
    pub max_mana: f64,
    /// Mana per second
    pub mana_regen: f64,
}

impl Vitals {
    pub fn new(max_health: f64, max_mana: f64, mana_regen: f64) -> Self {
        Self {
            health: max_health,
            max_health,
            mana: max_mana,
            max_mana,
            mana_regen,
        }
    }

    pub fn is_dead(&self) -> bool {
        self.health <= 0.0
    }

    /// Apply damage, returning true when this hit was fatal
    pub fn damage(&mut self, amount: f64) -> bool {
        let was_alive = !self.is_dead();
        self.health = (self.health - amount).max(0.0);
        was_alive && self.is_dead()
    }

    pub fn regenerate(&mut self, dt_ms: f64) {
        self.mana = (self.mana + self.mana_regen * dt_ms / 1000.0).min(self.max_mana);
    }
}

/// Data passed to [`Collidable::collision`]
pub struct CollisionEvent<'a> {
    pub grid: &'a mut SpatialHash,
    /// Overlapping entities found by the collision pass
    pub objects: &'a [EntityId],
}

/// Per-tick update. The grid re-indexes the entity right after `step`
/// returns, so position changes made here are picked up immediately.
pub trait Steppable {
    fn step(&mut self, grid: &mut SpatialHash, dt: f64);
}

pub trait Collidable {
    fn collision(&mut self, event: CollisionEvent<'_>);
}

/// Removal hook. Runs before the entity is unlinked from the grid.
pub trait Removable {
    fn on_remove(&mut self, grid: &mut SpatialHash);
}

/// Base simulation object
pub trait Entity: Any {
    fn kind(&self) -> EntityKind;

    fn body(&self) -> &Body;

    fn body_mut(&mut self) -> &mut Body;

    fn id(&self) -> EntityId {
        self.body().id
    }

    fn as_steppable(&mut self) -> Option<&mut dyn Steppable> {
        None
    }

    fn as_collidable(&mut self) -> Option<&mut dyn Collidable> {
        None
    }

    fn as_removable(&mut self) -> Option<&mut dyn Removable> {
        None
    }

    fn vitals(&self) -> Option<&Vitals> {
        None
    }

    fn vitals_mut(&mut self) -> Option<&mut Vitals> {
        None
    }

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_unique() {
        let a = EntityId::next();
        let b = EntityId::next();
        assert_ne!(a, b);
        assert!(b.raw() > a.raw());
    }

    #[test]
    fn test_body_center_is_offset_from_top_left() {
        let mut body = Body::new(
            EntityId::next(),
            Vec2::new(2.0, 3.0),
            Vec2::new(2.0, 4.0),
            CollisionDescriptor::none(),
        );
        assert_eq!(body.center(), Vec2::new(3.0, 5.0));

        body.set_center(Vec2::new(10.0, 10.0));
        assert_eq!(body.position, Vec2::new(9.0, 8.0));
    }

    #[test]
    fn test_vitals_fatal_hit_reported_once() {
        let mut vitals = Vitals::new(20.0, 50.0, 10.0);
        assert!(!vitals.damage(15.0));
        assert!(vitals.damage(15.0));
        assert_eq!(vitals.health, 0.0);
        assert!(!vitals.damage(5.0));
    }

    #[test]
    fn test_vitals_regen_caps_at_max() {
        let mut vitals = Vitals::new(20.0, 50.0, 10.0);
        vitals.mana = 45.0;
        vitals.regenerate(250.0);
        assert_eq!(vitals.mana, 47.5);
        vitals.regenerate(10_000.0);
        assert_eq!(vitals.mana, 50.0);
    }
}
