//! Skirmish simulation core
//!
//! A grid-partitioned 2D action-game simulation: a spatial hash that owns
//! every entity and drives the per-tick step sweep, AI-controlled enemies
//! that wander, keep to their bounds, dodge projectiles and cast skills, and
//! the collision primitives they rely on.

pub mod config;
pub mod game;
pub mod util;
