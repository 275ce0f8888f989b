// src/control.rs

//! Shared simulation parameters and the commands that change them.
//!
//! [`ControlSurface`] is read by every worker on every iteration and written
//! by the command channel and the UI. All fields are atomics: writers store
//! with `Release`, readers load with `Acquire`, so a change is visible to a
//! worker by its next iteration.
//!
//! [`ControlCommand::from_key`] and the keyboard-only commands (`SpeedUp`,
//! `SlowDown`, `ToggleColorMode`) are called by an external UI; this binary
//! has no keyboard input of its own.

use crate::config::SimulationConfig;
use crate::rules::{BorderPolicy, Rule};
use log::*;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, AtomicUsize, Ordering};
use std::time::Duration;

/// Escape key, mapped to [`ControlCommand::Quit`].
pub const KEY_ESCAPE: char = '\u{1b}';

/// Shortest delay the keyboard "slower" command steps up from.
const MIN_ADJUSTABLE_DELAY_US: u64 = 1;

/// A change requested through the command channel or the UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlCommand {
    /// Reinitialize the grid to a new random state.
    Reset,
    SetRule(Rule),
    /// Set the pause each worker takes after an update.
    SetSpeed(Duration),
    SetColorMode(bool),
    ToggleColorMode,
    /// Halve the step delay.
    SpeedUp,
    /// Double the step delay.
    SlowDown,
    Pause,
    Resume,
    Quit,
}

impl ControlCommand {
    /// Translates a key press from the UI layer.
    ///
    /// Space resets, `c`/`b` toggle color mode, `+`/`-` change speed, `1`-`4`
    /// select a rule and escape quits. Other keys map to nothing.
    pub fn from_key(key: char) -> Option<Self> {
        match key {
            ' ' => Some(ControlCommand::Reset),
            'c' | 'C' | 'b' | 'B' => Some(ControlCommand::ToggleColorMode),
            '+' | '=' => Some(ControlCommand::SpeedUp),
            '-' | '_' => Some(ControlCommand::SlowDown),
            KEY_ESCAPE => Some(ControlCommand::Quit),
            digit => digit
                .to_digit(10)
                .and_then(|id| Rule::from_id(id as u8))
                .map(ControlCommand::SetRule),
        }
    }
}

/// Parameters a worker needs for one update, read once per iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepParams {
    pub rule: Rule,
    pub color_mode: bool,
    pub border: BorderPolicy,
}

/// Point-in-time statistics for the stats pane.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimulationStats {
    pub live_workers: usize,
    pub live_cells: usize,
    pub total_cells: usize,
    pub updates_applied: u64,
    pub rule: Rule,
    pub color_mode: bool,
    pub step_delay: Duration,
    pub running: bool,
}

/// Scalar state shared by workers, the command channel and the UI.
#[derive(Debug)]
pub struct ControlSurface {
    rule: AtomicU8,
    color_mode: AtomicBool,
    step_delay_us: AtomicU64,
    running: AtomicBool,
    shutdown: AtomicBool,
    live_workers: AtomicUsize,
    updates_applied: AtomicU64,
}

impl ControlSurface {
    pub fn new(settings: &SimulationConfig) -> Self {
        Self {
            rule: AtomicU8::new(settings.rule.id()),
            color_mode: AtomicBool::new(settings.color_mode),
            step_delay_us: AtomicU64::new(settings.step_delay_us),
            running: AtomicBool::new(settings.start_running),
            shutdown: AtomicBool::new(false),
            live_workers: AtomicUsize::new(0),
            updates_applied: AtomicU64::new(0),
        }
    }

    pub fn rule(&self) -> Rule {
        // Only `set_rule` stores here, so the value is always a valid id.
        Rule::from_id(self.rule.load(Ordering::Acquire)).unwrap_or_default()
    }

    pub fn set_rule(&self, rule: Rule) {
        self.rule.store(rule.id(), Ordering::Release);
        info!("Rule set to {}", rule);
    }

    pub fn color_mode(&self) -> bool {
        self.color_mode.load(Ordering::Acquire)
    }

    pub fn set_color_mode(&self, enabled: bool) {
        self.color_mode.store(enabled, Ordering::Release);
        info!("Color mode {}", if enabled { "on" } else { "off" });
    }

    /// Flips color mode and returns the new value.
    pub fn toggle_color_mode(&self) -> bool {
        let enabled = !self.color_mode.fetch_xor(true, Ordering::AcqRel);
        info!("Color mode {}", if enabled { "on" } else { "off" });
        enabled
    }

    pub fn step_delay(&self) -> Duration {
        Duration::from_micros(self.step_delay_us.load(Ordering::Acquire))
    }

    pub fn set_step_delay(&self, delay: Duration) {
        let micros = u64::try_from(delay.as_micros()).unwrap_or(u64::MAX);
        self.step_delay_us.store(micros, Ordering::Release);
        info!("Step delay set to {}us", micros);
    }

    /// Halves the step delay and returns the new one.
    pub fn speed_up(&self) -> Duration {
        self.update_delay(|us| us / 2)
    }

    /// Doubles the step delay and returns the new one.
    pub fn slow_down(&self) -> Duration {
        self.update_delay(|us| us.max(MIN_ADJUSTABLE_DELAY_US).saturating_mul(2))
    }

    fn update_delay(&self, f: impl Fn(u64) -> u64) -> Duration {
        let previous = self
            .step_delay_us
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |us| Some(f(us)))
            .unwrap_or_else(|us| us);
        let micros = f(previous);
        info!("Step delay changed from {}us to {}us", previous, micros);
        Duration::from_micros(micros)
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn set_running(&self, running: bool) {
        self.running.store(running, Ordering::Release);
        info!("Simulation {}", if running { "resumed" } else { "paused" });
    }

    /// Asks every thread to wind down. Irreversible.
    pub fn request_shutdown(&self) {
        if !self.shutdown.swap(true, Ordering::AcqRel) {
            info!("Shutdown requested");
        }
    }

    pub fn is_shutdown_requested(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    pub fn live_workers(&self) -> usize {
        self.live_workers.load(Ordering::Acquire)
    }

    pub(crate) fn worker_started(&self) -> usize {
        self.live_workers.fetch_add(1, Ordering::AcqRel) + 1
    }

    pub(crate) fn worker_stopped(&self) -> usize {
        self.live_workers.fetch_sub(1, Ordering::AcqRel) - 1
    }

    pub fn updates_applied(&self) -> u64 {
        self.updates_applied.load(Ordering::Acquire)
    }

    pub(crate) fn record_update(&self) {
        self.updates_applied.fetch_add(1, Ordering::Relaxed);
    }

    pub fn step_params(&self, border: BorderPolicy) -> StepParams {
        StepParams {
            rule: self.rule(),
            color_mode: self.color_mode(),
            border,
        }
    }
}
