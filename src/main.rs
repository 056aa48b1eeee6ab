use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use skirmish_sim::config::SimulationConfig;
use skirmish_sim::game::actors::Player;
use skirmish_sim::game::entity::EntityKind;
use skirmish_sim::game::simulation::Simulation;

fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    info!("Skirmish simulation v{}", env!("CARGO_PKG_VERSION"));

    let config = SimulationConfig::load_or_default();
    config.validate()?;
    info!(
        "Configuration loaded: {} ticks of {:.2}ms, seed={:?}",
        config.ticks, config.tick_ms, config.seed
    );

    let mut sim = Simulation::from_config(&config)?;
    let stats = sim.run(config.ticks, config.tick_ms);

    info!(
        "Finished after {:.1}s simulated: {} entities ({} enemies, {} players, {} projectiles)",
        sim.elapsed_ms() / 1000.0,
        stats.entities,
        sim.count(EntityKind::Enemy),
        sim.count(EntityKind::Player),
        sim.count(EntityKind::Projectile),
    );
    info!(
        "Grid: {} occupied cells, {} nodes, max {} per cell",
        stats.occupied_cells, stats.nodes, stats.max_per_cell
    );

    for id in sim.grid().ids() {
        if let Some(player) = sim.grid().get_as::<Player>(id) {
            debug!("Player {}: {}", id, serde_json::to_string(&player.snapshot())?);
        }
    }

    Ok(())
}
