use crate::game::constants::{grid, time};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("World size must be positive, got {0}x{1}")]
    WorldSize(f64, f64),
    #[error("Grid needs at least one cell per axis, got {0}x{1}")]
    GridCells(usize, usize),
    #[error("Tick duration must be positive, got {0}ms")]
    TickDuration(f64),
}

/// Headless simulation configuration
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationConfig {
    /// World width in tiles
    pub world_width: f64,
    /// World height in tiles
    pub world_height: f64,
    /// Spatial hash columns
    pub grid_cols: usize,
    /// Spatial hash rows
    pub grid_rows: usize,
    /// Fixed tick duration in milliseconds
    pub tick_ms: f64,
    /// Enemies spawned at startup
    pub enemy_count: usize,
    /// Ticks to run before exiting
    pub ticks: u64,
    /// Seed for spawning and AI decisions; `None` seeds from entropy
    pub seed: Option<u64>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            world_width: grid::WORLD_WIDTH,
            world_height: grid::WORLD_HEIGHT,
            grid_cols: grid::CELLS_PER_AXIS,
            grid_rows: grid::CELLS_PER_AXIS,
            tick_ms: time::TICK_MS,
            enemy_count: 24,
            ticks: 600,
            seed: None,
        }
    }
}

/// Parse `name` into `slot` when set, warning and keeping the current value
/// when it does not parse or fails `accept`
fn read_env<T>(name: &str, slot: &mut T, accept: impl Fn(&T) -> bool)
where
    T: std::str::FromStr,
{
    let Ok(raw) = std::env::var(name) else {
        return;
    };
    match raw.parse::<T>() {
        Ok(parsed) if accept(&parsed) => *slot = parsed,
        Ok(_) => tracing::warn!("{} '{}' out of range, using default", name, raw),
        Err(_) => tracing::warn!("Invalid {} '{}', using default", name, raw),
    }
}

impl SimulationConfig {
    /// Load config from environment or use defaults
    pub fn load_or_default() -> Self {
        let mut config = Self::default();

        let positive = |v: &f64| v.is_finite() && *v > 0.0;
        read_env("WORLD_WIDTH", &mut config.world_width, positive);
        read_env("WORLD_HEIGHT", &mut config.world_height, positive);
        read_env("GRID_COLS", &mut config.grid_cols, |v| (1..=4096).contains(v));
        read_env("GRID_ROWS", &mut config.grid_rows, |v| (1..=4096).contains(v));
        read_env("TICK_MS", &mut config.tick_ms, positive);
        read_env("ENEMY_COUNT", &mut config.enemy_count, |v| *v <= 100_000);
        read_env("TICKS", &mut config.ticks, |_| true);

        if let Ok(seed) = std::env::var("SEED") {
            match seed.parse::<u64>() {
                Ok(parsed) => config.seed = Some(parsed),
                Err(_) => tracing::warn!("Invalid SEED '{}', using entropy", seed),
            }
        }

        config
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> Result<(), ConfigError> {
        let sized = |v: f64| v.is_finite() && v > 0.0;
        if !sized(self.world_width) || !sized(self.world_height) {
            return Err(ConfigError::WorldSize(self.world_width, self.world_height));
        }
        if self.grid_cols == 0 || self.grid_rows == 0 {
            return Err(ConfigError::GridCells(self.grid_cols, self.grid_rows));
        }
        if !sized(self.tick_ms) {
            return Err(ConfigError::TickDuration(self.tick_ms));
        }
        Ok(())
    }
}
