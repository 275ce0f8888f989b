// src/command/server.rs

//! Listener and applier threads for the command channel.
//!
//! The listener blocks on the source, decodes each line and pushes the
//! command into a bounded queue. The applier pops commands and applies them
//! to the simulation in arrival order. A full queue blocks the listener,
//! so a burst of commands is never dropped.

use super::waker::ListenerWaker;
use super::{parse_command, CommandParseError, MAX_COMMAND_LEN};
use crate::control::ControlCommand;
use crate::simulation::Simulation;
use anyhow::{Context, Result};
use log::*;
use std::io::{self, BufRead, ErrorKind};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{sync_channel, Receiver, SyncSender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Pause after a failed read before trying again.
const READ_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Consecutive failed reads after which the listener gives up.
const MAX_CONSECUTIVE_READ_ERRORS: u32 = 10;

/// Most bytes of one raw line kept in memory, newline and padding included.
/// Anything past this is discarded up to the next newline.
pub(super) const MAX_LINE_LEN: usize = 4 * MAX_COMMAND_LEN;

/// Outcome of [`read_bounded_line`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum LineRead {
    /// The source is exhausted and nothing was read.
    Eof,
    /// A line (possibly without a trailing newline at EOF) is in the buffer.
    Line,
    /// The line ran past the limit. Holds its full length in bytes; only the
    /// first [`MAX_LINE_LEN`] are in the buffer.
    TooLong(usize),
}

/// Handle on the running command channel threads.
pub struct CommandServer {
    stop: Arc<AtomicBool>,
    waker: Box<dyn ListenerWaker>,
    listener: Option<JoinHandle<()>>,
    applier: Option<JoinHandle<()>>,
}

impl CommandServer {
    /// Starts listening on `source` and applying commands to `simulation`.
    ///
    /// `capacity` bounds the queue between the two threads. `waker` must be
    /// able to unblock a read on `source`; it is dropped after both threads
    /// have been joined.
    pub fn spawn<R>(
        source: R,
        simulation: &Simulation,
        capacity: usize,
        waker: Box<dyn ListenerWaker>,
    ) -> Result<Self>
    where
        R: BufRead + Send + 'static,
    {
        let (command_tx, command_rx) = sync_channel::<ControlCommand>(capacity);
        let mut server = Self {
            stop: Arc::new(AtomicBool::new(false)),
            waker,
            listener: None,
            applier: None,
        };

        let applier_simulation = simulation.clone();
        server.applier = Some(
            thread::Builder::new()
                .name("command-applier".to_string())
                .spawn(move || apply_commands(command_rx, applier_simulation))
                .context("Failed to spawn command applier thread")?,
        );

        let stop = Arc::clone(&server.stop);
        server.listener = Some(
            thread::Builder::new()
                .name("command-listener".to_string())
                .spawn(move || listen(source, command_tx, stop))
                .context("Failed to spawn command listener thread")?,
        );

        info!("CommandServer spawned (queue capacity: {})", capacity);
        Ok(server)
    }

    /// Stops the listener, lets the applier drain the queue and joins both.
    pub fn shutdown(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(handle) = self.listener.take() {
            if !handle.is_finished() {
                if let Err(e) = self.waker.wake() {
                    warn!("Failed to wake command listener: {:#}", e);
                }
            }
            if let Err(e) = handle.join() {
                error!("Command listener thread panicked: {:?}", e);
            }
        }
        // The listener owned the sender, so the applier ends once it has
        // drained what is queued.
        if let Some(handle) = self.applier.take() {
            if let Err(e) = handle.join() {
                error!("Command applier thread panicked: {:?}", e);
            }
        }
    }
}

impl Drop for CommandServer {
    fn drop(&mut self) {
        debug!("CommandServer dropped");
        self.shutdown();
    }
}

fn listen<R: BufRead>(mut source: R, command_tx: SyncSender<ControlCommand>, stop: Arc<AtomicBool>) {
    debug!("Command listener started");
    let mut buffer = Vec::new();
    let mut consecutive_errors = 0u32;

    loop {
        buffer.clear();
        let read = match read_bounded_line(&mut source, &mut buffer, MAX_LINE_LEN) {
            Ok(LineRead::Eof) => {
                info!("Command source closed, listener exiting");
                break;
            }
            Ok(read) => {
                consecutive_errors = 0;
                read
            }
            Err(e) => {
                consecutive_errors += 1;
                if consecutive_errors >= MAX_CONSECUTIVE_READ_ERRORS {
                    error!("Command channel failed {} times in a row, giving up: {}", consecutive_errors, e);
                    break;
                }
                warn!("Command channel read failed: {}", e);
                thread::sleep(READ_RETRY_DELAY);
                continue;
            }
        };

        if stop.load(Ordering::Acquire) {
            debug!("Command listener stopping");
            break;
        }

        if let LineRead::TooLong(len) = read {
            warn!("Ignoring command: {}", CommandParseError::TooLong(len));
            continue;
        }

        let line = String::from_utf8_lossy(&buffer);
        match parse_command(&line) {
            Ok(Some(command)) => {
                trace!("Queueing command {:?}", command);
                if command_tx.send(command).is_err() {
                    warn!("Command applier gone, listener exiting");
                    break;
                }
            }
            Ok(None) => {}
            Err(e) => warn!("Ignoring command {:?}: {}", line.trim(), e),
        }
    }
}

/// Reads up to and including the next `\n`, keeping at most `limit` bytes
/// in `buffer`. The rest of an overlong line is consumed and dropped, so
/// memory stays bounded whatever the writer sends.
pub(super) fn read_bounded_line<R: BufRead + ?Sized>(
    source: &mut R,
    buffer: &mut Vec<u8>,
    limit: usize,
) -> io::Result<LineRead> {
    let mut total = 0usize;
    loop {
        let (used, found_newline) = {
            let available = match source.fill_buf() {
                Ok(available) => available,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            };
            if available.is_empty() {
                break;
            }
            let (chunk, found_newline) = match available.iter().position(|&b| b == b'\n') {
                Some(end) => (&available[..=end], true),
                None => (available, false),
            };
            let room = limit.saturating_sub(buffer.len());
            buffer.extend_from_slice(&chunk[..chunk.len().min(room)]);
            (chunk.len(), found_newline)
        };
        source.consume(used);
        total = total.saturating_add(used);
        if found_newline {
            break;
        }
    }

    Ok(match total {
        0 => LineRead::Eof,
        len if len > limit => LineRead::TooLong(len),
        _ => LineRead::Line,
    })
}

fn apply_commands(command_rx: Receiver<ControlCommand>, simulation: Simulation) {
    debug!("Command applier started");
    for command in command_rx {
        simulation.apply(command);
    }
    debug!("Command queue closed, applier exiting");
}
