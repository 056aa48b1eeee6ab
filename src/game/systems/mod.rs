pub mod ai;
pub mod effect;
pub mod projectile;
