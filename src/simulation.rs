// src/simulation.rs

//! The shared simulation handle and the single-cell update step.
//!
//! [`Simulation`] bundles the grid and the control surface behind `Arc`s so
//! workers, the command channel and the render loop can each hold a clone.
//! It is also where control commands and the UI-triggered calls land.

use crate::control::{ControlCommand, ControlSurface, SimulationStats, StepParams};
use crate::grid::{Grid, GridSnapshot};
use crate::rules::{self, CellState, Rule};
use anyhow::Result;
use log::*;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;

/// What one update did to its cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepOutcome {
    pub previous: CellState,
    pub stored: CellState,
}

/// Applies one generation to `(row, col)`.
///
/// The cell's neighborhood is locked for the whole read-compute-write
/// sequence and released when this returns. Returns `None` if the cell is
/// outside the grid.
pub fn step_cell<R: Rng + ?Sized>(
    grid: &Grid,
    row: usize,
    col: usize,
    params: &StepParams,
    rng: &mut R,
) -> Option<StepOutcome> {
    let mut neighborhood = grid.lock_neighborhood(row, col, params.border.wraps())?;
    let view = neighborhood.view();
    let next = rules::evaluate(&view, params.rule, params.border, rng);
    let stored = rules::stored_state(view.center(), next, params.color_mode);
    let previous = neighborhood.set_center(stored);
    Some(StepOutcome { previous, stored })
}

/// Cheap-to-clone handle on the grid and its controls.
#[derive(Debug, Clone)]
pub struct Simulation {
    grid: Arc<Grid>,
    control: Arc<ControlSurface>,
}

impl Simulation {
    pub fn new(grid: Grid, control: ControlSurface) -> Self {
        Self {
            grid: Arc::new(grid),
            control: Arc::new(control),
        }
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    pub fn control(&self) -> &ControlSurface {
        &self.control
    }

    /// Applies a command from the command channel or the keyboard.
    pub fn apply(&self, command: ControlCommand) {
        debug!("Applying control command {:?}", command);
        match command {
            ControlCommand::Reset => self.reset_grid(),
            ControlCommand::SetRule(rule) => self.control.set_rule(rule),
            ControlCommand::SetSpeed(delay) => self.set_speed(delay),
            ControlCommand::SetColorMode(enabled) => self.control.set_color_mode(enabled),
            ControlCommand::ToggleColorMode => {
                self.toggle_color_mode();
            }
            ControlCommand::SpeedUp => {
                self.control.speed_up();
            }
            ControlCommand::SlowDown => {
                self.control.slow_down();
            }
            ControlCommand::Pause => self.control.set_running(false),
            ControlCommand::Resume => self.control.set_running(true),
            ControlCommand::Quit => self.control.request_shutdown(),
        }
    }

    // --- UI-triggered control calls (invoked by an external UI) ---

    /// Randomizes the grid. Waits for in-flight updates to finish first.
    pub fn reset_grid(&self) {
        self.grid.reset(&mut rand::rng());
    }

    /// Selects a rule by its 1-4 identifier.
    pub fn set_rule(&self, id: u8) -> Result<()> {
        let rule = Rule::try_from(id)?;
        self.control.set_rule(rule);
        Ok(())
    }

    pub fn set_speed(&self, delay: Duration) {
        self.control.set_step_delay(delay);
    }

    /// Flips color mode and returns the new value.
    pub fn toggle_color_mode(&self) -> bool {
        self.control.toggle_color_mode()
    }

    // --- Render collaborator reads ---

    pub fn snapshot(&self) -> GridSnapshot {
        self.grid.snapshot()
    }

    pub fn stats(&self) -> SimulationStats {
        SimulationStats {
            live_workers: self.control.live_workers(),
            live_cells: self.grid.live_cells(),
            total_cells: self.grid.len(),
            updates_applied: self.control.updates_applied(),
            rule: self.control.rule(),
            color_mode: self.control.color_mode(),
            step_delay: self.control.step_delay(),
            running: self.control.is_running(),
        }
    }
}
