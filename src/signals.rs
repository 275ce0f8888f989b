// src/signals.rs

//! SIGINT/SIGTERM handling.
//!
//! The handler only stores into an atomic. The render loop in `main` polls
//! [`shutdown_signalled`] and turns it into an orderly shutdown.

use anyhow::{Context, Result};
use log::*;
use nix::libc;
use nix::sys::signal::{sigaction, SaFlags, SigAction, SigHandler, SigSet, Signal};
use std::sync::atomic::{AtomicBool, Ordering};

static SHUTDOWN_SIGNALLED: AtomicBool = AtomicBool::new(false);

extern "C" fn handle_shutdown_signal(_signal: libc::c_int) {
    SHUTDOWN_SIGNALLED.store(true, Ordering::Release);
}

/// Installs the shutdown handler for SIGINT and SIGTERM.
pub fn install_shutdown_handler() -> Result<()> {
    let action = SigAction::new(
        SigHandler::Handler(handle_shutdown_signal),
        SaFlags::SA_RESTART,
        SigSet::empty(),
    );
    for signal in [Signal::SIGINT, Signal::SIGTERM] {
        // SAFETY: the handler only performs an atomic store, which is
        // async-signal-safe.
        unsafe { sigaction(signal, &action) }
            .with_context(|| format!("Failed to install {} handler", signal))?;
    }
    debug!("Shutdown handler installed for SIGINT and SIGTERM");
    Ok(())
}

/// Whether SIGINT or SIGTERM has arrived since startup.
pub fn shutdown_signalled() -> bool {
    SHUTDOWN_SIGNALLED.load(Ordering::Acquire)
}

#[cfg(test)]
mod tests {
    use super::*;
    use nix::sys::signal::raise;
    use std::thread;
    use std::time::Duration;

    #[test_log::test]
    fn sigterm_sets_the_shutdown_flag() {
        install_shutdown_handler().unwrap();
        raise(Signal::SIGTERM).unwrap();
        for _ in 0..100 {
            if shutdown_signalled() {
                return;
            }
            thread::sleep(Duration::from_millis(10));
        }
        panic!("SIGTERM did not set the shutdown flag");
    }
}
