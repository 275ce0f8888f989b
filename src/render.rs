// src/render.rs

//! Rendering collaborator interface and a text renderer.
//!
//! The simulation never draws anything itself. Whatever drives the display
//! pulls a [`GridSnapshot`] and [`SimulationStats`] and hands them to a
//! [`GridRenderer`].

use crate::control::SimulationStats;
use crate::grid::GridSnapshot;
use crate::rules::{CellState, DEAD};
use anyhow::{Context, Result};
use std::io::Write;

/// Moves the cursor to the top-left corner.
const CURSOR_HOME: &str = "\x1b[H";
/// Clears from the cursor to the end of the screen.
const CLEAR_BELOW: &str = "\x1b[J";
const SGR_RESET: &str = "\x1b[0m";

/// Something that can display the grid and its statistics.
pub trait GridRenderer {
    /// Draws a full grid. `rows` and `cols` give the snapshot's shape.
    fn render_grid(&mut self, snapshot: &GridSnapshot, rows: usize, cols: usize) -> Result<()>;

    fn render_stats(&mut self, stats: &SimulationStats) -> Result<()>;
}

/// Display palette indexed by stored cell state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PaletteColor {
    Black = 0,
    White = 1,
    Blue = 2,
    Green = 3,
    Yellow = 4,
    Red = 5,
}

impl PaletteColor {
    /// Color for a stored cell state. Dead is black, a plain live cell is
    /// white and older cells walk up the palette. Out-of-range states
    /// clamp to red.
    pub fn for_state(state: CellState) -> Self {
        match state {
            0 => PaletteColor::Black,
            1 => PaletteColor::White,
            2 => PaletteColor::Blue,
            3 => PaletteColor::Green,
            4 => PaletteColor::Yellow,
            _ => PaletteColor::Red,
        }
    }

    /// ANSI SGR background code.
    fn background_code(self) -> u8 {
        match self {
            PaletteColor::Black => 40,
            PaletteColor::Red => 41,
            PaletteColor::Green => 42,
            PaletteColor::Yellow => 43,
            PaletteColor::Blue => 44,
            PaletteColor::White => 47,
        }
    }
}

/// Renders to any byte sink, either with ANSI background colors or as
/// plain characters.
pub struct TextRenderer<W: Write> {
    out: W,
    ansi: bool,
}

impl<W: Write> TextRenderer<W> {
    pub fn new(out: W, ansi: bool) -> Self {
        Self { out, ansi }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn plain_glyph(state: CellState) -> char {
        match state {
            DEAD => '.',
            1 => '#',
            age => char::from_digit(u32::from(age), 10).unwrap_or('#'),
        }
    }

    fn write_ansi_row(&mut self, row: &[CellState]) -> Result<()> {
        let mut current = None;
        for &state in row {
            let color = PaletteColor::for_state(state);
            if current != Some(color) {
                write!(self.out, "\x1b[{}m", color.background_code())?;
                current = Some(color);
            }
            self.out.write_all(b"  ")?;
        }
        writeln!(self.out, "{}", SGR_RESET)?;
        Ok(())
    }
}

impl<W: Write> GridRenderer for TextRenderer<W> {
    fn render_grid(&mut self, snapshot: &GridSnapshot, rows: usize, cols: usize) -> Result<()> {
        if self.ansi {
            write!(self.out, "{}", CURSOR_HOME).context("Failed to write grid")?;
        }
        for row in snapshot.iter_rows().take(rows) {
            let row = &row[..cols.min(row.len())];
            if self.ansi {
                self.write_ansi_row(row).context("Failed to write grid row")?;
            } else {
                let line: String = row.iter().map(|&state| Self::plain_glyph(state)).collect();
                writeln!(self.out, "{}", line).context("Failed to write grid row")?;
            }
        }
        Ok(())
    }

    fn render_stats(&mut self, stats: &SimulationStats) -> Result<()> {
        writeln!(
            self.out,
            "workers: {} | live cells: {}/{} | updates: {} | rule: {} | color: {} | delay: {}us | {}",
            stats.live_workers,
            stats.live_cells,
            stats.total_cells,
            stats.updates_applied,
            stats.rule,
            if stats.color_mode { "on" } else { "off" },
            stats.step_delay.as_micros(),
            if stats.running { "running" } else { "paused" },
        )
        .context("Failed to write stats")?;
        if self.ansi {
            write!(self.out, "{}", CLEAR_BELOW).context("Failed to write stats")?;
        }
        self.out.flush().context("Failed to flush renderer output")
    }
}
