//! Skills and the cast contract used by the AI attack phase

use std::fmt;
use std::sync::Arc;
use tracing::debug;

use crate::game::constants::projectile;
use crate::game::entity::EntityId;
use crate::game::spatial::SpatialHash;
use crate::game::systems::projectile::{Curve, Projectile};
use crate::util::vec2::Vec2;

/// Everything a skill effect needs to act on the world
pub struct CastContext<'a> {
    pub grid: &'a mut SpatialHash,
    pub caster: EntityId,
    /// Caster center
    pub origin: Vec2,
    /// Unit vector from the caster toward the target
    pub vector: Vec2,
    /// Target center
    pub tile: Vec2,
}

/// Outcome of a cast. Only `Cast` costs mana.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CastResult {
    Cast,
    Failed,
}

pub trait SkillEffect {
    fn cast(&self, ctx: &mut CastContext<'_>) -> CastResult;
}

impl<F> SkillEffect for F
where
    F: Fn(&mut CastContext<'_>) -> CastResult,
{
    fn cast(&self, ctx: &mut CastContext<'_>) -> CastResult {
        self(ctx)
    }
}

/// A castable skill known by an actor
#[derive(Clone)]
pub struct Skill {
    pub id: String,
    pub name: String,
    pub mana_cost: f64,
    /// Cooldown in seconds
    pub cd: f64,
    pub effect: Arc<dyn SkillEffect>,
}

impl fmt::Debug for Skill {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Skill")
            .field("id", &self.id)
            .field("mana_cost", &self.mana_cost)
            .field("cd", &self.cd)
            .finish_non_exhaustive()
    }
}

impl Skill {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        mana_cost: f64,
        cd: f64,
        effect: Arc<dyn SkillEffect>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            mana_cost,
            cd,
            effect,
        }
    }

    /// Skill backed by a plain closure
    pub fn from_fn<F>(id: impl Into<String>, name: impl Into<String>, mana_cost: f64, cd: f64, effect: F) -> Self
    where
        F: Fn(&mut CastContext<'_>) -> CastResult + 'static,
    {
        Self::new(id, name, mana_cost, cd, Arc::new(effect))
    }

    pub fn bolt() -> Self {
        Self::new("bolt", "Bolt", 10.0, 1.0, Arc::new(Bolt::default()))
    }

    pub fn arc_bolt() -> Self {
        Self::new("arc_bolt", "Arc Bolt", 25.0, 2.5, Arc::new(ArcBolt::default()))
    }

    /// Look up a built-in skill, used when restoring snapshots
    pub fn builtin(id: &str) -> Option<Self> {
        match id {
            "bolt" => Some(Self::bolt()),
            "arc_bolt" => Some(Self::arc_bolt()),
            _ => None,
        }
    }
}

/// Fires a straight projectile at the target
#[derive(Debug, Clone)]
pub struct Bolt {
    pub speed: f64,
    pub damage: f64,
    pub size: f64,
    pub lifetime_ms: f64,
}

impl Default for Bolt {
    fn default() -> Self {
        Self {
            speed: projectile::SPEED,
            damage: projectile::DAMAGE,
            size: projectile::SIZE,
            lifetime_ms: projectile::LIFETIME_MS,
        }
    }
}

impl SkillEffect for Bolt {
    fn cast(&self, ctx: &mut CastContext<'_>) -> CastResult {
        if ctx.vector.is_zero() || !ctx.vector.is_finite() {
            return CastResult::Failed;
        }

        let bolt = Projectile::new(ctx.caster, ctx.origin, ctx.vector, self.size)
            .with_speed(self.speed)
            .with_damage(self.damage)
            .with_lifetime(self.lifetime_ms);

        match ctx.grid.insert(Box::new(bolt)) {
            Ok(id) => {
                debug!("{} fired bolt {}", ctx.caster, id);
                CastResult::Cast
            }
            Err(err) => {
                debug!("Bolt from {} failed: {}", ctx.caster, err);
                CastResult::Failed
            }
        }
    }
}

/// Launches a projectile that orbits the cast origin, starting on the side
/// facing the target
#[derive(Debug, Clone)]
pub struct ArcBolt {
    pub radius: f64,
    /// Radians per second; the sign picks the orbit direction
    pub angular_speed: f64,
    pub damage: f64,
    pub size: f64,
    pub lifetime_ms: f64,
}

impl Default for ArcBolt {
    fn default() -> Self {
        Self {
            radius: projectile::ARC_RADIUS,
            angular_speed: projectile::ARC_ANGULAR_SPEED,
            damage: projectile::DAMAGE,
            size: projectile::SIZE,
            lifetime_ms: projectile::LIFETIME_MS,
        }
    }
}

impl SkillEffect for ArcBolt {
    fn cast(&self, ctx: &mut CastContext<'_>) -> CastResult {
        if ctx.vector.is_zero() || !ctx.vector.is_finite() {
            return CastResult::Failed;
        }

        let start = ctx.origin + ctx.vector * self.radius;
        let curve = Curve {
            center: ctx.origin,
            angular_speed: self.angular_speed,
        };
        let bolt = Projectile::new(ctx.caster, start, curve.tangent_at(start), self.size)
            .with_damage(self.damage)
            .with_lifetime(self.lifetime_ms)
            .with_curve(curve);

        match ctx.grid.insert(Box::new(bolt)) {
            Ok(id) => {
                debug!("{} fired arc bolt {}", ctx.caster, id);
                CastResult::Cast
            }
            Err(err) => {
                debug!("Arc bolt from {} failed: {}", ctx.caster, err);
                CastResult::Failed
            }
        }
    }
}
