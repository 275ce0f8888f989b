// src/rules/mod.rs

//! Automaton rule tables and the next-state function.
//!
//! Everything in this module is pure. Given the states around a cell (a
//! [`Neighborhood`]) and the active [`Rule`], [`evaluate`] decides whether the
//! cell is alive in the next generation. Locking the neighborhood and aging
//! cells for color display are the caller's job.

pub mod border;

pub use border::{BorderPolicy, Neighborhood};

use anyhow::{anyhow, Result};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Value stored in a grid cell. `0` is dead, anything else is alive.
pub type CellState = u8;

pub const DEAD: CellState = 0;
pub const ALIVE: CellState = 1;

/// Number of entries in the display palette (black, white, blue, green,
/// yellow, red).
pub const PALETTE_SIZE: CellState = 6;

/// Oldest age a live cell can reach in color mode.
pub const MAX_AGE: CellState = PALETTE_SIZE - 1;

/// The four supported survive/birth tables, numbered as on the command
/// channel and the keyboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
#[repr(u8)]
pub enum Rule {
    /// Conway's classical Game of Life (B3/S23).
    #[default]
    GameOfLife = 1,
    /// Coral growth (B3/S45678).
    CoralGrowth = 2,
    /// Amoeba (B1358/S1358).
    Amoeba = 3,
    /// Maze (B3/S12345).
    Maze = 4,
}

impl Rule {
    pub const ALL: [Rule; 4] = [Rule::GameOfLife, Rule::CoralGrowth, Rule::Amoeba, Rule::Maze];

    /// Looks up a rule by its 1-based identifier.
    pub fn from_id(id: u8) -> Option<Self> {
        match id {
            1 => Some(Rule::GameOfLife),
            2 => Some(Rule::CoralGrowth),
            3 => Some(Rule::Amoeba),
            4 => Some(Rule::Maze),
            _ => None,
        }
    }

    pub fn id(self) -> u8 {
        self as u8
    }

    pub fn name(self) -> &'static str {
        match self {
            Rule::GameOfLife => "Game of Life",
            Rule::CoralGrowth => "Coral Growth",
            Rule::Amoeba => "Amoeba",
            Rule::Maze => "Maze",
        }
    }

    /// Birth/survival notation of the rule.
    pub fn notation(self) -> &'static str {
        match self {
            Rule::GameOfLife => "B3/S23",
            Rule::CoralGrowth => "B3/S45678",
            Rule::Amoeba => "B1358/S1358",
            Rule::Maze => "B3/S12345",
        }
    }

    /// Whether a live cell with `alive_neighbors` live neighbors stays alive.
    pub fn survives(self, alive_neighbors: u8) -> bool {
        match self {
            Rule::GameOfLife => matches!(alive_neighbors, 2 | 3),
            Rule::CoralGrowth => alive_neighbors > 3,
            Rule::Amoeba => matches!(alive_neighbors, 1 | 3 | 5 | 8),
            Rule::Maze => (1..=5).contains(&alive_neighbors),
        }
    }

    /// Whether a dead cell with `alive_neighbors` live neighbors comes alive.
    pub fn is_born(self, alive_neighbors: u8) -> bool {
        match self {
            Rule::Amoeba => matches!(alive_neighbors, 1 | 3 | 5 | 8),
            Rule::GameOfLife | Rule::CoralGrowth | Rule::Maze => alive_neighbors == 3,
        }
    }
}

impl TryFrom<u8> for Rule {
    type Error = anyhow::Error;

    fn try_from(id: u8) -> Result<Self> {
        Rule::from_id(id).ok_or_else(|| anyhow!("unknown rule identifier {} (expected 1-4)", id))
    }
}

impl From<Rule> for u8 {
    fn from(rule: Rule) -> u8 {
        rule.id()
    }
}

impl FromStr for Rule {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let id: u8 = s
            .trim()
            .parse()
            .map_err(|_| anyhow!("rule identifier '{}' is not a number", s.trim()))?;
        Rule::try_from(id)
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name(), self.notation())
    }
}

/// Applies `rule` to a cell in state `current` with `alive_neighbors` live
/// neighbors. Returns [`ALIVE`] or [`DEAD`], never an aged value.
pub fn next_state(current: CellState, alive_neighbors: u8, rule: Rule) -> CellState {
    let alive = if current != DEAD {
        rule.survives(alive_neighbors)
    } else {
        rule.is_born(alive_neighbors)
    };
    if alive {
        ALIVE
    } else {
        DEAD
    }
}

/// Counts the live neighbors of the neighborhood's center under `border` and
/// applies `rule` to it.
///
/// The random border policy draws from `rng`; every other policy ignores it.
pub fn evaluate<R: Rng + ?Sized>(
    neighborhood: &Neighborhood,
    rule: Rule,
    border: BorderPolicy,
    rng: &mut R,
) -> CellState {
    let count = border.count_alive(neighborhood, rng);
    next_state(neighborhood.center(), count, rule)
}

/// Converts a raw 0/1 result into the value stored in the grid.
///
/// Dead is dead in any mode. In color mode a cell that was already alive
/// gets one generation older, saturating at [`MAX_AGE`].
pub fn stored_state(current: CellState, next: CellState, color_mode: bool) -> CellState {
    if next == DEAD {
        DEAD
    } else if color_mode && current != DEAD {
        current.saturating_add(1).min(MAX_AGE)
    } else {
        ALIVE
    }
}
