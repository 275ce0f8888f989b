// src/grid/mod.rs

//! The shared cell grid.
//!
//! Each cell's state lives inside its own [`Mutex`], so the lock matrix and
//! the state matrix have the same shape by construction and a state can only
//! be touched through its lock. Multi-cell updates go through
//! [`Grid::lock_neighborhood`] (see `neighborhood.rs`), whole-grid operations
//! take every lock in ascending index order.

pub mod neighborhood;

pub use neighborhood::NeighborhoodGuard;

use crate::rules::{CellState, ALIVE, DEAD};
use anyhow::{bail, Context, Result};
use log::*;
use rand::Rng;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Smallest accepted row and column count.
pub const MIN_DIMENSION: usize = 5;

/// Probability of a cell starting alive after a reset.
const INITIAL_ALIVE_PROBABILITY: f64 = 0.5;

/// Locks one cell. A worker that panicked while holding the lock leaves a
/// plain `u8` behind, so poisoning is ignored.
fn lock_cell(cell: &Mutex<CellState>) -> MutexGuard<'_, CellState> {
    cell.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A fixed-size grid of cell states with one lock per cell.
#[derive(Debug)]
pub struct Grid {
    rows: usize,
    cols: usize,
    cells: Box<[Mutex<CellState>]>,
    /// Number of non-zero cells, maintained on every alive/dead transition.
    live_cells: AtomicUsize,
}

impl Grid {
    /// Allocates an all-dead grid.
    pub fn new(rows: usize, cols: usize) -> Result<Self> {
        if rows < MIN_DIMENSION || cols < MIN_DIMENSION {
            bail!(
                "grid must be at least {min}x{min}, got {}x{}",
                rows,
                cols,
                min = MIN_DIMENSION
            );
        }
        let len = rows
            .checked_mul(cols)
            .with_context(|| format!("grid size {}x{} overflows", rows, cols))?;

        let mut cells = Vec::new();
        cells
            .try_reserve_exact(len)
            .with_context(|| format!("Failed to allocate {}x{} grid", rows, cols))?;
        cells.extend((0..len).map(|_| Mutex::new(DEAD)));

        debug!("Grid allocated: {} rows x {} cols ({} locks)", rows, cols, len);
        Ok(Self {
            rows,
            cols,
            cells: cells.into_boxed_slice(),
            live_cells: AtomicUsize::new(0),
        })
    }

    /// Allocates a grid and fills it with a random initial state.
    pub fn with_random_state<R: Rng + ?Sized>(rows: usize, cols: usize, rng: &mut R) -> Result<Self> {
        let grid = Self::new(rows, cols)?;
        grid.reset(rng);
        Ok(grid)
    }

    /// Allocates a grid from row-major states.
    pub fn from_states(rows: usize, cols: usize, states: &[CellState]) -> Result<Self> {
        let grid = Self::new(rows, cols)?;
        if states.len() != grid.cells.len() {
            bail!(
                "expected {} cell states for a {}x{} grid, got {}",
                grid.cells.len(),
                rows,
                cols,
                states.len()
            );
        }
        let mut live = 0;
        for (cell, &state) in grid.cells.iter().zip(states) {
            *lock_cell(cell) = state;
            live += usize::from(state != DEAD);
        }
        grid.live_cells.store(live, Ordering::Release);
        Ok(grid)
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Row-major index of `(row, col)`, or `None` outside the grid.
    pub fn index_of(&self, row: usize, col: usize) -> Option<usize> {
        (row < self.rows && col < self.cols).then(|| row * self.cols + col)
    }

    /// Reads one cell under its lock.
    pub fn get(&self, row: usize, col: usize) -> Option<CellState> {
        let index = self.index_of(row, col)?;
        Some(*lock_cell(&self.cells[index]))
    }

    /// Writes one cell under its lock.
    ///
    /// Only the cell's own lock is taken. Simulation steps must go through
    /// [`Grid::lock_neighborhood`] instead.
    pub fn set(&self, row: usize, col: usize, state: CellState) -> Result<()> {
        let Some(index) = self.index_of(row, col) else {
            bail!(
                "cell ({}, {}) is outside the {}x{} grid",
                row,
                col,
                self.rows,
                self.cols
            );
        };
        let mut cell = lock_cell(&self.cells[index]);
        self.track_transition(*cell, state);
        *cell = state;
        Ok(())
    }

    /// Number of live cells.
    pub fn live_cells(&self) -> usize {
        self.live_cells.load(Ordering::Acquire)
    }

    /// Assigns every cell independently to dead or alive with equal
    /// probability.
    ///
    /// Every lock is held for the duration, so a reset never interleaves with
    /// a neighborhood update and is safe while workers are running.
    pub fn reset<R: Rng + ?Sized>(&self, rng: &mut R) {
        let mut guards = self.lock_all();
        let mut live = 0;
        for cell in guards.iter_mut() {
            let state = if rng.random_bool(INITIAL_ALIVE_PROBABILITY) {
                ALIVE
            } else {
                DEAD
            };
            live += usize::from(state != DEAD);
            **cell = state;
        }
        self.live_cells.store(live, Ordering::Release);
        release_in_reverse(guards);
        info!("Grid reset: {} of {} cells alive", live, self.cells.len());
    }

    /// Copies the grid for a reader. Each cell is read under its own lock,
    /// so no value is ever torn, but cells are not read at a single instant.
    pub fn snapshot(&self) -> GridSnapshot {
        GridSnapshot {
            rows: self.rows,
            cols: self.cols,
            cells: self.cells.iter().map(|cell| *lock_cell(cell)).collect(),
        }
    }

    /// Like [`Grid::snapshot`], but with every lock held at once, giving a
    /// consistent picture of a single instant.
    pub fn consistent_snapshot(&self) -> GridSnapshot {
        let guards = self.lock_all();
        let cells: Vec<CellState> = guards.iter().map(|cell| **cell).collect();
        release_in_reverse(guards);
        GridSnapshot {
            rows: self.rows,
            cols: self.cols,
            cells,
        }
    }

    /// Takes every cell lock in ascending index order. Neighborhood locking
    /// uses the same order and never blocks while holding a lock, so this
    /// cannot deadlock against workers.
    fn lock_all(&self) -> Vec<MutexGuard<'_, CellState>> {
        self.cells.iter().map(lock_cell).collect()
    }

    /// Adjusts the live-cell counter for a cell going from `old` to `new`.
    /// Callers hold the cell's lock.
    fn track_transition(&self, old: CellState, new: CellState) {
        match (old != DEAD, new != DEAD) {
            (false, true) => {
                self.live_cells.fetch_add(1, Ordering::AcqRel);
            }
            (true, false) => {
                self.live_cells.fetch_sub(1, Ordering::AcqRel);
            }
            _ => {}
        }
    }
}

/// Drops guards last-acquired first.
fn release_in_reverse<T>(mut guards: Vec<T>) {
    while let Some(guard) = guards.pop() {
        drop(guard);
    }
}

/// An owned copy of the grid's states, handed to renderers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GridSnapshot {
    rows: usize,
    cols: usize,
    cells: Vec<CellState>,
}

impl GridSnapshot {
    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn get(&self, row: usize, col: usize) -> Option<CellState> {
        (row < self.rows && col < self.cols).then(|| self.cells[row * self.cols + col])
    }

    /// Iterates over the rows as slices.
    pub fn iter_rows(&self) -> impl Iterator<Item = &[CellState]> {
        self.cells.chunks(self.cols)
    }

    pub fn cells(&self) -> &[CellState] {
        &self.cells
    }

    pub fn live_cells(&self) -> usize {
        self.cells.iter().filter(|&&state| state != DEAD).count()
    }
}

#[cfg(test)]
mod tests;
