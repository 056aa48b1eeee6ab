/// Simulation timing
pub mod time {
    /// Default tick duration in milliseconds (60 Hz)
    pub const TICK_MS: f64 = 1000.0 / 60.0;
}

/// Spatial hash defaults
pub mod grid {
    /// Default world width in tiles
    pub const WORLD_WIDTH: f64 = 64.0;
    /// Default world height in tiles
    pub const WORLD_HEIGHT: f64 = 64.0;
    /// Default cell count along each axis
    pub const CELLS_PER_AXIS: usize = 16;
    /// Initial capacity of the occupancy node arena
    pub const NODE_ARENA_CAPACITY: usize = 1024;
}

/// AI behavior constants
pub mod ai {
    /// Shortest wander leg in milliseconds
    pub const WANDER_MIN_MS: f64 = 200.0;
    /// Longest wander leg in milliseconds
    pub const WANDER_MAX_MS: f64 = 500.0;
    /// Distance from a bounds edge that triggers correction
    pub const BOUNDS_MARGIN: f64 = 0.3;
    /// How long a bounds correction holds its velocity
    pub const BOUNDS_CORRECTION_MS: f64 = 200.0;
    /// Side of the square window searched for incoming projectiles
    pub const DODGE_WINDOW: f64 = 6.0;
    /// How far ahead a projectile's path is swept
    pub const DODGE_LOOKAHEAD: f64 = 5.0;
    /// Duration of the dodge lock in milliseconds
    pub const DODGE_LOCK_MS: f64 = 500.0;
    /// Weight of the "do nothing" attack option
    pub const IDLE_WEIGHT: f64 = 100.0;
    /// Cooldown after choosing not to attack, in milliseconds
    pub const IDLE_COOLDOWN_MS: f64 = 100.0;
    /// Default half-side of the target acquisition box
    pub const VIEW_DISTANCE: f64 = 8.0;
    /// Default distance at which a held target is dropped
    pub const TARGET_DISTANCE: f64 = 12.0;
}

/// Actor defaults
pub mod actor {
    /// Player movement speed in tiles per second
    pub const PLAYER_SPEED: f64 = 5.0;
    /// Enemy movement speed in tiles per second
    pub const ENEMY_SPEED: f64 = 3.0;
    /// Default body size for players and enemies
    pub const BODY_SIZE: f64 = 1.0;
    /// Default health pool
    pub const HEALTH: f64 = 100.0;
    /// Default mana pool
    pub const MANA: f64 = 100.0;
    /// Mana regained per second
    pub const MANA_REGEN: f64 = 5.0;
}

/// Projectile defaults
pub mod projectile {
    /// Bolt speed in tiles per second
    pub const SPEED: f64 = 8.0;
    /// Bolt side length
    pub const SIZE: f64 = 0.4;
    /// Lifetime in milliseconds
    pub const LIFETIME_MS: f64 = 2000.0;
    /// Damage dealt on hit
    pub const DAMAGE: f64 = 10.0;
    /// Orbit radius of arc bolts around the cast origin
    pub const ARC_RADIUS: f64 = 1.5;
    /// Orbit speed of arc bolts in radians per second
    pub const ARC_ANGULAR_SPEED: f64 = std::f64::consts::PI;
}

/// Visual effect markers
pub mod effect {
    /// Lifetime of the hit marker in milliseconds
    pub const HIT_MARKER_MS: f64 = 150.0;
    /// Hit marker side length
    pub const HIT_MARKER_SIZE: f64 = 0.5;
}
