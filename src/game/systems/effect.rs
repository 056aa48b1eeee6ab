//! Short-lived markers that remove themselves when their timer runs out

use tracing::debug;

use crate::game::constants::effect::{HIT_MARKER_MS, HIT_MARKER_SIZE};
use crate::game::entity::{Body, CollisionDescriptor, Entity, EntityId, EntityKind, Steppable};
use crate::game::spatial::SpatialHash;
use crate::util::vec2::Vec2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EffectKind {
    HitMarker,
}

#[derive(Debug, Clone)]
pub struct Effect {
    body: Body,
    kind: EffectKind,
    remaining_ms: f64,
}

impl Effect {
    pub fn new(kind: EffectKind, center: Vec2, size: f64, duration_ms: f64) -> Self {
        let mut body = Body::new(EntityId::next(), Vec2::ZERO, Vec2::splat(size), CollisionDescriptor::none());
        body.set_center(center);
        Self {
            body,
            kind,
            remaining_ms: duration_ms,
        }
    }

    pub fn hit_marker(center: Vec2) -> Self {
        Self::new(EffectKind::HitMarker, center, HIT_MARKER_SIZE, HIT_MARKER_MS)
    }

    pub fn effect_kind(&self) -> EffectKind {
        self.kind
    }

    pub fn remaining_ms(&self) -> f64 {
        self.remaining_ms
    }
}

impl Steppable for Effect {
    fn step(&mut self, grid: &mut SpatialHash, dt: f64) {
        self.remaining_ms -= dt;
        if self.remaining_ms <= 0.0 {
            if let Err(err) = grid.remove(self.body.id) {
                debug!("Effect {} already gone: {}", self.body.id, err);
            }
        }
    }
}

impl Entity for Effect {
    fn kind(&self) -> EntityKind {
        EntityKind::Effect
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

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }
}
