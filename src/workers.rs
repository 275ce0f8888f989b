// src/workers.rs

//! Worker threads that update random cells.
//!
//! Every worker loops independently: pick a cell uniformly at random, lock
//! its neighborhood, apply the active rule, release, pause for the configured
//! step delay. There is no generation barrier. Workers idle while the
//! simulation is paused and exit once shutdown is requested.

use crate::rules::BorderPolicy;
use crate::simulation::{step_cell, Simulation};
use anyhow::{Context, Result};
use log::*;
use rand::Rng;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// How often a paused worker checks whether it may continue.
const PAUSE_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Longest single sleep, so long step delays still notice shutdown promptly.
const MAX_SLEEP_SLICE: Duration = Duration::from_millis(50);

/// Counts a worker as live for as long as it exists, including while its
/// thread unwinds from a panic.
struct LiveWorker {
    simulation: Simulation,
    index: usize,
}

impl LiveWorker {
    fn register(simulation: Simulation, index: usize) -> Self {
        let live = simulation.control().worker_started();
        debug!("Worker {} started ({} live)", index, live);
        Self { simulation, index }
    }
}

impl Drop for LiveWorker {
    fn drop(&mut self) {
        let live = self.simulation.control().worker_stopped();
        debug!("Worker {} stopped ({} live)", self.index, live);
    }
}

struct WorkerHandle {
    index: usize,
    thread: Option<JoinHandle<()>>,
}

/// The set of running worker threads.
pub struct WorkerPool {
    simulation: Simulation,
    workers: Vec<WorkerHandle>,
}

impl WorkerPool {
    /// Starts `count` workers on `simulation`.
    ///
    /// If a thread fails to spawn, the workers already started are stopped
    /// and joined before the error is returned.
    pub fn spawn(simulation: &Simulation, count: usize, border: BorderPolicy) -> Result<Self> {
        let mut pool = Self {
            simulation: simulation.clone(),
            workers: Vec::with_capacity(count),
        };
        for index in 0..count {
            let simulation = simulation.clone();
            let thread = thread::Builder::new()
                .name(format!("worker-{}", index))
                .spawn(move || run_worker(index, simulation, border))
                .with_context(|| format!("Failed to spawn worker thread {}", index))?;
            pool.workers.push(WorkerHandle {
                index,
                thread: Some(thread),
            });
        }
        info!("WorkerPool spawned {} workers (border: {})", count, border);
        Ok(pool)
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    /// Requests shutdown and waits for every worker to exit.
    pub fn shutdown(&mut self) {
        self.simulation.control().request_shutdown();
        for worker in &mut self.workers {
            if let Some(handle) = worker.thread.take() {
                if let Err(e) = handle.join() {
                    error!("Worker {} panicked: {:?}", worker.index, e);
                }
            }
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        debug!("WorkerPool dropped");
        self.shutdown();
    }
}

fn run_worker(index: usize, simulation: Simulation, border: BorderPolicy) {
    let _live = LiveWorker::register(simulation.clone(), index);
    let grid = simulation.grid();
    let control = simulation.control();
    let mut rng = rand::rng();

    while !control.is_shutdown_requested() {
        if !control.is_running() {
            thread::sleep(PAUSE_POLL_INTERVAL);
            continue;
        }

        let params = control.step_params(border);
        let row = rng.random_range(0..grid.rows());
        let col = rng.random_range(0..grid.cols());
        if step_cell(grid, row, col, &params, &mut rng).is_some() {
            control.record_update();
        }

        pause(&simulation, control.step_delay());
    }
    trace!("Worker {} leaving its loop", index);
}

/// Sleeps for `delay` in slices, returning early on shutdown. A zero delay
/// just yields.
fn pause(simulation: &Simulation, delay: Duration) {
    if delay.is_zero() {
        thread::yield_now();
        return;
    }
    let mut remaining = delay;
    while !remaining.is_zero() && !simulation.control().is_shutdown_requested() {
        let slice = remaining.min(MAX_SLEEP_SLICE);
        thread::sleep(slice);
        remaining -= slice;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SimulationConfig;
    use crate::control::ControlSurface;
    use crate::grid::Grid;
    use crate::rules::{Rule, DEAD};
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::time::Instant;

    fn simulation(rows: usize, cols: usize, step_delay_us: u64) -> Simulation {
        let settings = SimulationConfig {
            rule: Rule::GameOfLife,
            color_mode: false,
            step_delay_us,
            start_running: true,
        };
        Simulation::new(Grid::new(rows, cols).unwrap(), ControlSurface::new(&settings))
    }

    fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        condition()
    }

    #[test_log::test]
    fn it_should_track_live_workers() {
        let sim = simulation(10, 10, 100);
        let mut pool = WorkerPool::spawn(&sim, 4, BorderPolicy::Dead).unwrap();
        assert_eq!(pool.len(), 4);
        assert!(wait_until(Duration::from_secs(5), || sim.control().live_workers() == 4));
        assert!(wait_until(Duration::from_secs(5), || sim.control().updates_applied() > 0));

        pool.shutdown();
        assert_eq!(sim.control().live_workers(), 0);
        assert!(sim.control().is_shutdown_requested());
    }

    #[test_log::test]
    fn an_all_dead_grid_stays_dead_with_workers_running() {
        let sim = simulation(8, 8, 0);
        let pool = WorkerPool::spawn(&sim, 3, BorderPolicy::Dead).unwrap();
        assert!(wait_until(Duration::from_secs(5), || sim.control().updates_applied() > 5_000));
        drop(pool);

        assert_eq!(sim.grid().live_cells(), 0);
        assert!(sim.snapshot().cells().iter().all(|&s| s == DEAD));
    }

    #[test_log::test]
    fn resets_and_rule_changes_under_load_do_not_deadlock() {
        let sim = simulation(6, 6, 0);
        let pool = WorkerPool::spawn(&sim, 6, BorderPolicy::Wrap).unwrap();

        let mut rng = StdRng::seed_from_u64(5);
        for round in 0..50 {
            sim.grid().reset(&mut rng);
            sim.control().set_rule(Rule::ALL[round % Rule::ALL.len()]);
            sim.toggle_color_mode();
        }
        let before = sim.control().updates_applied();
        assert!(wait_until(Duration::from_secs(5), || sim.control().updates_applied() > before));
        drop(pool);

        let snapshot = sim.grid().consistent_snapshot();
        assert_eq!(snapshot.live_cells(), sim.grid().live_cells());
    }

    #[test_log::test]
    fn paused_workers_apply_no_updates() {
        let sim = simulation(10, 10, 0);
        sim.control().set_running(false);
        let pool = WorkerPool::spawn(&sim, 2, BorderPolicy::Dead).unwrap();
        assert!(wait_until(Duration::from_secs(5), || sim.control().live_workers() == 2));
        thread::sleep(Duration::from_millis(50));
        assert_eq!(sim.control().updates_applied(), 0);

        sim.control().set_running(true);
        assert!(wait_until(Duration::from_secs(5), || sim.control().updates_applied() > 0));
        drop(pool);
    }

    #[test_log::test]
    fn long_step_delays_do_not_hold_up_shutdown() {
        let sim = simulation(5, 5, 60_000_000);
        let mut pool = WorkerPool::spawn(&sim, 2, BorderPolicy::Dead).unwrap();
        assert!(wait_until(Duration::from_secs(5), || sim.control().updates_applied() >= 2));

        let started = Instant::now();
        pool.shutdown();
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
