pub mod actors;
pub mod collision;
pub mod constants;
pub mod entity;
pub mod simulation;
pub mod skills;
pub mod spatial;
pub mod systems;
