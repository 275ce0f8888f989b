// src/rules/border.rs

//! Border policies: how neighbors are counted for cells on the grid's edge.

use super::{CellState, ALIVE, DEAD};
use anyhow::{anyhow, bail, Result};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Upper bound of a sampled count under [`BorderPolicy::Random`].
const MAX_NEIGHBORS: u8 = 8;

/// The 3×3 block of states centered on one cell.
///
/// `None` marks a position outside the grid. Under the wrapped policy the
/// block is built from toroidal coordinates, so every position is `Some`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Neighborhood {
    cells: [[Option<CellState>; 3]; 3],
}

impl Neighborhood {
    pub fn new(cells: [[Option<CellState>; 3]; 3]) -> Self {
        Self { cells }
    }

    /// Builds a neighborhood from a lookup taking row and column offsets in
    /// `-1..=1`.
    pub fn from_fn(mut lookup: impl FnMut(isize, isize) -> Option<CellState>) -> Self {
        let mut cells = [[None; 3]; 3];
        for (dr, row) in (-1..=1).zip(cells.iter_mut()) {
            for (dc, slot) in (-1..=1).zip(row.iter_mut()) {
                *slot = lookup(dr, dc);
            }
        }
        Self { cells }
    }

    pub fn center(&self) -> CellState {
        self.cells[1][1].unwrap_or(DEAD)
    }

    /// The eight surrounding positions in row-major order.
    pub fn neighbors(&self) -> impl Iterator<Item = Option<CellState>> + '_ {
        self.cells
            .iter()
            .enumerate()
            .flat_map(|(r, row)| row.iter().enumerate().map(move |(c, s)| ((r, c), *s)))
            .filter(|&(pos, _)| pos != (1, 1))
            .map(|(_, state)| state)
    }

    /// True when at least one neighbor lies outside the grid.
    pub fn touches_border(&self) -> bool {
        self.neighbors().any(|state| state.is_none())
    }
}

/// Neighbor-counting policy for edge cells. Exactly one is active for a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum BorderPolicy {
    /// Off-grid positions count as dead cells.
    #[default]
    Dead,
    /// Off-grid positions count as cells frozen in the given state.
    Fixed(CellState),
    /// Edge cells get a neighbor count sampled uniformly from `0..=8`.
    Random,
    /// Only in-bounds neighbors are visited. Same result as `Dead`.
    Clipped,
    /// Coordinates wrap around the edges (toroidal grid).
    Wrap,
}

impl BorderPolicy {
    /// Whether neighbor coordinates wrap modulo the grid dimensions. This
    /// also decides which cells the locking protocol has to cover.
    pub fn wraps(self) -> bool {
        matches!(self, BorderPolicy::Wrap)
    }

    /// Number of live neighbors of the neighborhood's center.
    pub fn count_alive<R: Rng + ?Sized>(self, neighborhood: &Neighborhood, rng: &mut R) -> u8 {
        let alive = |state: CellState| u8::from(state != DEAD);
        match self {
            BorderPolicy::Dead => neighborhood
                .neighbors()
                .map(|state| alive(state.unwrap_or(DEAD)))
                .sum(),
            BorderPolicy::Fixed(virtual_state) => neighborhood
                .neighbors()
                .map(|state| alive(state.unwrap_or(virtual_state)))
                .sum(),
            BorderPolicy::Random if neighborhood.touches_border() => {
                rng.random_range(0..=MAX_NEIGHBORS)
            }
            BorderPolicy::Random | BorderPolicy::Clipped | BorderPolicy::Wrap => {
                neighborhood.neighbors().flatten().map(alive).sum()
            }
        }
    }
}

impl FromStr for BorderPolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim().to_ascii_lowercase();
        match s.as_str() {
            "dead" => Ok(BorderPolicy::Dead),
            "fixed" => Ok(BorderPolicy::Fixed(ALIVE)),
            "random" => Ok(BorderPolicy::Random),
            "clipped" => Ok(BorderPolicy::Clipped),
            "wrap" | "wrapped" => Ok(BorderPolicy::Wrap),
            other => match other.strip_prefix("fixed:") {
                Some(value) => {
                    let state: CellState = value
                        .parse()
                        .map_err(|_| anyhow!("invalid fixed border state '{}'", value))?;
                    if state > ALIVE {
                        bail!("fixed border state must be 0 or 1, got {}", state);
                    }
                    Ok(BorderPolicy::Fixed(state))
                }
                None => bail!(
                    "unknown border policy '{}' (expected dead, fixed[:0|1], random, clipped or wrap)",
                    other
                ),
            },
        }
    }
}

impl TryFrom<String> for BorderPolicy {
    type Error = anyhow::Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<BorderPolicy> for String {
    fn from(policy: BorderPolicy) -> String {
        policy.to_string()
    }
}

impl fmt::Display for BorderPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BorderPolicy::Dead => f.write_str("dead"),
            BorderPolicy::Fixed(state) => write!(f, "fixed:{}", state),
            BorderPolicy::Random => f.write_str("random"),
            BorderPolicy::Clipped => f.write_str("clipped"),
            BorderPolicy::Wrap => f.write_str("wrap"),
        }
    }
}
