//! Projectiles fired by skills
//!
//! Straight projectiles travel along a fixed direction. Curved ones orbit a
//! fixed center, which is also what the dodge behavior steers away from.

use tracing::{debug, trace};

use crate::game::constants::projectile::{DAMAGE, LIFETIME_MS, SPEED};
use crate::game::entity::{
    Body, Collidable, CollisionDescriptor, CollisionEvent, Entity, EntityId, EntityKind, Removable, Steppable,
};
use crate::game::spatial::SpatialHash;
use crate::game::systems::effect::Effect;
use crate::util::vec2::Vec2;

/// Circular path around a fixed point
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Curve {
    pub center: Vec2,
    /// Radians per second, positive is the direction of [`Vec2::rotate`]
    pub angular_speed: f64,
}

impl Curve {
    /// Unit direction of travel when passing through `point`
    pub fn tangent_at(&self, point: Vec2) -> Vec2 {
        let tangent = (point - self.center).perpendicular().normalize();
        if self.angular_speed < 0.0 {
            -tangent
        } else {
            tangent
        }
    }
}

pub struct Projectile {
    body: Body,
    /// Weak reference to the caster
    owner: EntityId,
    /// Unit direction of travel
    direction: Vec2,
    speed: f64,
    damage: f64,
    lifetime_ms: f64,
    curve: Option<Curve>,
}

impl Projectile {
    /// Square projectile of side `size` centered on `center`
    pub fn new(owner: EntityId, center: Vec2, direction: Vec2, size: f64) -> Self {
        let mut body = Body::new(
            EntityId::next(),
            Vec2::ZERO,
            Vec2::splat(size),
            CollisionDescriptor::active_rect(),
        );
        body.set_center(center);
        let direction = direction.normalize();
        body.velocity = direction * SPEED;

        Self {
            body,
            owner,
            direction,
            speed: SPEED,
            damage: DAMAGE,
            lifetime_ms: LIFETIME_MS,
            curve: None,
        }
    }

    pub fn with_speed(mut self, speed: f64) -> Self {
        self.speed = speed;
        self.body.velocity = self.direction * speed;
        self
    }

    pub fn with_damage(mut self, damage: f64) -> Self {
        self.damage = damage;
        self
    }

    pub fn with_lifetime(mut self, lifetime_ms: f64) -> Self {
        self.lifetime_ms = lifetime_ms;
        self
    }

    pub fn with_curve(mut self, curve: Curve) -> Self {
        self.direction = curve.tangent_at(self.body.center());
        self.curve = Some(curve);
        self
    }

    pub fn owner(&self) -> EntityId {
        self.owner
    }

    pub fn direction(&self) -> Vec2 {
        self.direction
    }

    pub fn curve(&self) -> Option<&Curve> {
        self.curve.as_ref()
    }

    pub fn damage(&self) -> f64 {
        self.damage
    }

    pub fn lifetime_ms(&self) -> f64 {
        self.lifetime_ms
    }

    /// Half the projectile width, used to widen predicted paths
    pub fn half_width(&self) -> f64 {
        self.body.dimensions.x / 2.0
    }

    fn remove_self(&self, grid: &mut SpatialHash) {
        if let Err(err) = grid.remove(self.body.id) {
            debug!("Projectile {} already gone: {}", self.body.id, err);
        }
    }
}

impl Steppable for Projectile {
    fn step(&mut self, grid: &mut SpatialHash, dt: f64) {
        let seconds = dt / 1000.0;
        match self.curve {
            Some(curve) => {
                let center = self
                    .body
                    .center()
                    .rotate_around(curve.center, curve.angular_speed * seconds);
                self.body.set_center(center);
                self.direction = curve.tangent_at(center);
            }
            None => self.body.position += self.direction * self.speed * seconds,
        }
        self.body.velocity = self.direction * self.speed;

        self.lifetime_ms -= dt;
        if self.lifetime_ms <= 0.0 {
            trace!("Projectile {} expired", self.body.id);
            self.remove_self(grid);
        }
    }
}

impl Collidable for Projectile {
    fn collision(&mut self, event: CollisionEvent<'_>) {
        let CollisionEvent { grid, objects } = event;

        for &other in objects {
            if other == self.owner {
                continue;
            }
            // Removed earlier in this handler or in the same pass
            let Some(entity) = grid.get(other) else {
                continue;
            };

            if entity.kind() == EntityKind::Projectile {
                let Some(bolt) = entity.as_any().downcast_ref::<Projectile>() else {
                    continue;
                };
                let counts = bolt.owner != self.owner || bolt.curve.is_some() || self.curve.is_some();
                if counts {
                    debug!("Projectiles {} and {} cancelled out", self.body.id, other);
                    if let Err(err) = grid.remove(other) {
                        debug!("Projectile {} already gone: {}", other, err);
                    }
                    self.remove_self(grid);
                    return;
                }
                continue;
            }

            if entity.vitals().is_none() {
                continue;
            }
            let hit_at = entity.body().center();
            let fatal = grid
                .get_mut(other)
                .and_then(|entity| entity.vitals_mut())
                .map(|vitals| vitals.damage(self.damage))
                .unwrap_or(false);

            debug!("Projectile {} hit {} for {}", self.body.id, other, self.damage);
            if let Err(err) = grid.insert(Box::new(Effect::hit_marker(hit_at))) {
                debug!("Hit marker not spawned: {}", err);
            }

            self.remove_self(grid);
            if fatal {
                if let Err(err) = grid.remove(other) {
                    debug!("Victim {} already gone: {}", other, err);
                }
            }
            return;
        }
    }
}

impl Removable for Projectile {
    fn on_remove(&mut self, _grid: &mut SpatialHash) {
        trace!("Projectile {} from {} removed", self.body.id, self.owner);
    }
}

impl Entity for Projectile {
    fn kind(&self) -> EntityKind {
        EntityKind::Projectile
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

    fn as_collidable(&mut self) -> Option<&mut dyn Collidable> {
        Some(self)
    }

    fn as_removable(&mut self) -> Option<&mut dyn Removable> {
        Some(self)
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }
}
