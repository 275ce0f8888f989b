// src/command/waker.rs
//! ListenerWaker - Cross-thread signaling to unblock the command listener.
//!
//! The listener thread spends its life blocked in a read. When the server
//! shuts down it sets a stop flag and then calls wake() so the read returns
//! and the flag gets checked.

use anyhow::Result;

/// Trait for waking the command listener from another thread.
///
/// Implementations feed something into the listener's source that makes a
/// blocking read return. What arrives doesn't matter: the listener checks
/// its stop flag after every read.
pub trait ListenerWaker: Send + Sync {
    /// Wake the listener, causing its blocking read to return.
    fn wake(&self) -> Result<()>;
}

/// Waker for sources that end on their own (in-memory readers, files).
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopWaker;

impl ListenerWaker for NoopWaker {
    fn wake(&self) -> Result<()> {
        Ok(())
    }
}
