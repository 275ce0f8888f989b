// In src/main.rs

// Declare modules
pub mod command;
pub mod config;
pub mod control;
pub mod grid;
pub mod render;
pub mod rules;
pub mod signals;
pub mod simulation;
pub mod workers;

use crate::{
    command::{CommandFifo, CommandServer},
    config::{Config, LaunchArgs},
    control::ControlSurface,
    grid::Grid,
    render::{GridRenderer, TextRenderer},
    simulation::Simulation,
    workers::WorkerPool,
};

use anyhow::Context;
use log::{info, warn};
use std::io;
use std::thread;
use std::time::Duration;

/// Main entry point for `cellgrid`.
fn main() -> anyhow::Result<()> {
    // Initialize the logger. Default filter is "info" if RUST_LOG is not set.
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_micros()
        .init();

    info!("Starting cellgrid...");

    // --- Configuration ---
    let args = LaunchArgs::parse(std::env::args().skip(1))?;
    let config = args.apply_to(Config::load()?);
    config.validate().context("Invalid configuration")?;
    let worker_count = config.worker_count();
    if worker_count < config.grid.workers {
        warn!(
            "Requested {} workers for {} rows, using {}",
            config.grid.workers, config.grid.rows, worker_count
        );
    }
    info!(
        "Grid {}x{}, {} workers, border {}, rule {}",
        config.grid.rows, config.grid.cols, worker_count, config.grid.border, config.simulation.rule
    );

    // --- Simulation ---
    let grid = Grid::with_random_state(config.grid.rows, config.grid.cols, &mut rand::rng())
        .context("Failed to create grid")?;
    let simulation = Simulation::new(grid, ControlSurface::new(&config.simulation));

    signals::install_shutdown_handler()?;

    let mut pool = WorkerPool::spawn(&simulation, worker_count, config.grid.border)?;

    // --- Command channel ---
    let mut server = if config.channel.enabled {
        let fifo = CommandFifo::open(&config.channel.pipe_path)?;
        info!("Listening for commands on {}", fifo.path().display());
        let (reader, waker) = fifo.into_parts()?;
        Some(CommandServer::spawn(
            reader,
            &simulation,
            config.channel.queue_capacity,
            Box::new(waker),
        )?)
    } else {
        info!("Command channel disabled");
        None
    };

    // --- Render loop ---
    let mut renderer = config
        .render
        .enabled
        .then(|| TextRenderer::new(io::stdout().lock(), config.render.ansi));
    let interval = Duration::from_millis(config.render.interval_ms);

    while !simulation.control().is_shutdown_requested() {
        if signals::shutdown_signalled() {
            info!("Shutdown signal received");
            simulation.control().request_shutdown();
            break;
        }
        if let Some(renderer) = renderer.as_mut() {
            let snapshot = simulation.snapshot();
            renderer.render_grid(&snapshot, snapshot.rows(), snapshot.cols())?;
            renderer.render_stats(&simulation.stats())?;
        }
        thread::sleep(interval);
    }

    // --- Shutdown ---
    if let Some(server) = server.as_mut() {
        server.shutdown();
    }
    drop(server);
    pool.shutdown();

    let stats = simulation.stats();
    info!(
        "cellgrid exiting: {} updates applied, {} of {} cells alive",
        stats.updates_applied, stats.live_cells, stats.total_cells
    );
    Ok(())
}
