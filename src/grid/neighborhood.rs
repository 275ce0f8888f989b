// src/grid/neighborhood.rs

//! All-or-nothing locking of a cell and its Moore neighborhood.
//!
//! A cell update reads up to nine cells and writes the center. To make that
//! atomic with respect to every overlapping update, the whole lock set is
//! taken before anything is read:
//!
//! 1. The lock set is sorted by row-major linear index, a single global order
//!    shared by every worker no matter which cell is the center.
//! 2. Each lock is *tried*. On the first one that is busy, everything taken so
//!    far in this attempt is released (newest first) and the attempt starts
//!    over after a backoff.
//! 3. The acquired set lives in a [`NeighborhoodGuard`], which releases it in
//!    reverse order when dropped.
//!
//! A worker therefore never blocks while holding a cell lock, which rules out
//! lock-order deadlock and lets whole-grid operations (reset, consistent
//! snapshots) block on the locks in the same ascending order.

use super::{release_in_reverse, Grid};
use crate::rules::{CellState, Neighborhood};
use log::*;
use std::hint;
use std::sync::{MutexGuard, TryLockError};
use std::thread;
use std::time::Duration;

/// Most locks a neighborhood can need (the center plus eight neighbors).
const MAX_LOCKS: usize = 9;

/// Attempts spent spinning before the backoff starts yielding.
const SPIN_LIMIT: u32 = 6;

/// Attempts spent yielding before the backoff starts sleeping.
const YIELD_LIMIT: u32 = 10;

const BACKOFF_SLEEP: Duration = Duration::from_micros(20);

/// Failed attempts after which contention is worth a trace line.
const CONTENTION_REPORT_THRESHOLD: u32 = 64;

/// Which cells a neighborhood covers, in acquisition order.
#[derive(Debug, Clone)]
struct LockLayout {
    /// Distinct linear indices, ascending.
    order: Vec<usize>,
    /// For each position of the 3×3 block, its index into `order`, or `None`
    /// when the position is off-grid.
    slots: [[Option<usize>; 3]; 3],
}

/// Exponential backoff between failed acquisition attempts.
#[derive(Debug, Default)]
struct Backoff {
    step: u32,
}

impl Backoff {
    fn snooze(&mut self) {
        if self.step <= SPIN_LIMIT {
            for _ in 0..(1u32 << self.step) {
                hint::spin_loop();
            }
        } else if self.step <= YIELD_LIMIT {
            thread::yield_now();
        } else {
            thread::sleep(BACKOFF_SLEEP);
        }
        self.step = self.step.saturating_add(1);
    }
}

/// Exclusive access to one cell and its neighbors.
///
/// Only the center may be written. The neighbors are locked so that nobody
/// else writes them while the center's next state is computed from them.
pub struct NeighborhoodGuard<'a> {
    grid: &'a Grid,
    guards: Vec<(usize, MutexGuard<'a, CellState>)>,
    slots: [[Option<usize>; 3]; 3],
}

impl Grid {
    /// Locks `(row, col)` and its neighbors, retrying until every lock is
    /// held. Returns `None` if the cell is outside the grid.
    ///
    /// With `wrap` set the neighborhood follows toroidal coordinates and the
    /// wrapped cells are locked too. Otherwise off-grid neighbors are skipped.
    pub fn lock_neighborhood(&self, row: usize, col: usize, wrap: bool) -> Option<NeighborhoodGuard<'_>> {
        let layout = self.lock_layout(row, col, wrap)?;
        let mut backoff = Backoff::default();
        let mut failed_attempts = 0u32;
        loop {
            if let Some(guards) = self.try_lock_all(&layout.order) {
                if failed_attempts >= CONTENTION_REPORT_THRESHOLD {
                    trace!(
                        "Neighborhood of ({}, {}) acquired after {} failed attempts",
                        row,
                        col,
                        failed_attempts
                    );
                }
                return Some(NeighborhoodGuard {
                    grid: self,
                    guards,
                    slots: layout.slots,
                });
            }
            failed_attempts = failed_attempts.saturating_add(1);
            backoff.snooze();
        }
    }

    /// Single acquisition attempt. Returns `None` if the cell is outside the
    /// grid or any lock in the set is busy; in the latter case nothing stays
    /// locked.
    pub fn try_lock_neighborhood(&self, row: usize, col: usize, wrap: bool) -> Option<NeighborhoodGuard<'_>> {
        let layout = self.lock_layout(row, col, wrap)?;
        let guards = self.try_lock_all(&layout.order)?;
        Some(NeighborhoodGuard {
            grid: self,
            guards,
            slots: layout.slots,
        })
    }

    fn lock_layout(&self, row: usize, col: usize, wrap: bool) -> Option<LockLayout> {
        self.index_of(row, col)?;

        let mut indices = [[None; 3]; 3];
        for (dr, slot_row) in (-1isize..=1).zip(indices.iter_mut()) {
            for (dc, slot) in (-1isize..=1).zip(slot_row.iter_mut()) {
                *slot = self.offset_index(row, col, dr, dc, wrap);
            }
        }

        let mut order: Vec<usize> = indices.iter().flatten().flatten().copied().collect();
        order.sort_unstable();
        order.dedup();
        debug_assert!(order.len() <= MAX_LOCKS);

        let mut slots = [[None; 3]; 3];
        for (slot_row, index_row) in slots.iter_mut().zip(indices.iter()) {
            for (slot, index) in slot_row.iter_mut().zip(index_row.iter()) {
                *slot = index.and_then(|index| order.binary_search(&index).ok());
            }
        }
        Some(LockLayout { order, slots })
    }

    /// Linear index of the cell at `(row + dr, col + dc)`.
    fn offset_index(&self, row: usize, col: usize, dr: isize, dc: isize, wrap: bool) -> Option<usize> {
        let r = row as isize + dr;
        let c = col as isize + dc;
        if wrap {
            let r = r.rem_euclid(self.rows as isize) as usize;
            let c = c.rem_euclid(self.cols as isize) as usize;
            self.index_of(r, c)
        } else if r < 0 || c < 0 {
            None
        } else {
            self.index_of(r as usize, c as usize)
        }
    }

    fn try_lock_all(&self, order: &[usize]) -> Option<Vec<(usize, MutexGuard<'_, CellState>)>> {
        let mut held = Vec::with_capacity(order.len());
        for &index in order {
            match self.cells[index].try_lock() {
                Ok(guard) => held.push((index, guard)),
                Err(TryLockError::Poisoned(poisoned)) => held.push((index, poisoned.into_inner())),
                Err(TryLockError::WouldBlock) => {
                    release_in_reverse(held);
                    return None;
                }
            }
        }
        Some(held)
    }
}

impl NeighborhoodGuard<'_> {
    /// Current state of the center cell.
    pub fn center(&self) -> CellState {
        self.state_at(1, 1).unwrap_or_default()
    }

    /// The 3×3 block of states as seen under the held locks.
    pub fn view(&self) -> Neighborhood {
        Neighborhood::from_fn(|dr, dc| self.state_at((dr + 1) as usize, (dc + 1) as usize))
    }

    /// Writes the center cell and returns its previous state.
    pub fn set_center(&mut self, state: CellState) -> CellState {
        let Some(position) = self.slots[1][1] else {
            return state;
        };
        let cell = &mut self.guards[position].1;
        let previous = **cell;
        **cell = state;
        self.grid.track_transition(previous, state);
        previous
    }

    /// Coordinates of every locked cell, in acquisition order.
    pub fn locked_cells(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        let cols = self.grid.cols;
        self.guards.iter().map(move |(index, _)| (index / cols, index % cols))
    }

    fn state_at(&self, r: usize, c: usize) -> Option<CellState> {
        self.slots[r][c].map(|position| *self.guards[position].1)
    }
}

impl Drop for NeighborhoodGuard<'_> {
    fn drop(&mut self) {
        while let Some((_, guard)) = self.guards.pop() {
            drop(guard);
        }
    }
}
