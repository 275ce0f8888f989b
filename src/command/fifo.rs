// src/command/fifo.rs

//! The named pipe the command channel listens on.

use super::waker::ListenerWaker;
use anyhow::{bail, Context, Result};
use log::*;
use nix::errno::Errno;
use nix::sys::stat::Mode;
use nix::unistd::mkfifo;
use std::fs::{self, File, OpenOptions, Permissions};
use std::io::{BufReader, Write};
use std::os::unix::fs::{FileTypeExt, PermissionsExt};
use std::path::{Path, PathBuf};

/// Anyone may write commands.
const FIFO_MODE: u32 = 0o666;

/// An open command FIFO.
///
/// The pipe is opened for reading *and* writing. Holding a write end
/// ourselves means the reader never sees EOF when an external writer closes,
/// so there is nothing to reopen between writers. The same write end is
/// what [`FifoWaker`] uses to unblock the reader at shutdown.
#[derive(Debug)]
pub struct CommandFifo {
    path: PathBuf,
    file: File,
    created: bool,
}

impl CommandFifo {
    /// Opens the FIFO at `path`, creating it if absent.
    ///
    /// Fails if something other than a FIFO already lives at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let created = match mkfifo(path.as_path(), Mode::from_bits_truncate(FIFO_MODE)) {
            Ok(()) => {
                // mkfifo applies the umask; set the mode explicitly instead.
                fs::set_permissions(&path, Permissions::from_mode(FIFO_MODE))
                    .with_context(|| format!("Failed to set permissions on {}", path.display()))?;
                info!("Created command FIFO at {}", path.display());
                true
            }
            Err(Errno::EEXIST) => {
                let metadata = fs::metadata(&path)
                    .with_context(|| format!("Failed to inspect {}", path.display()))?;
                if !metadata.file_type().is_fifo() {
                    bail!("{} exists and is not a named pipe", path.display());
                }
                debug!("Reusing existing command FIFO at {}", path.display());
                false
            }
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to create FIFO at {}", path.display()))
            }
        };

        let file = match OpenOptions::new().read(true).write(true).open(&path) {
            Ok(file) => file,
            Err(e) => {
                if created {
                    remove_fifo(&path);
                }
                return Err(e).with_context(|| format!("Failed to open FIFO at {}", path.display()));
            }
        };

        Ok(Self {
            path,
            file,
            created,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether this process created the FIFO (and will remove it).
    pub fn created(&self) -> bool {
        self.created
    }

    /// Splits the FIFO into a line reader for the listener and a waker that
    /// owns the pipe's lifetime on disk.
    pub fn into_parts(self) -> Result<(BufReader<File>, FifoWaker)> {
        let writer = self
            .file
            .try_clone()
            .with_context(|| format!("Failed to duplicate FIFO handle for {}", self.path.display()))?;
        let waker = FifoWaker {
            writer,
            remove_on_drop: self.created.then(|| self.path.clone()),
        };
        Ok((BufReader::new(self.file), waker))
    }
}

/// Unblocks a listener reading the FIFO by writing a blank line into it.
///
/// Removes the FIFO from disk when dropped if this process created it.
#[derive(Debug)]
pub struct FifoWaker {
    writer: File,
    remove_on_drop: Option<PathBuf>,
}

impl ListenerWaker for FifoWaker {
    fn wake(&self) -> Result<()> {
        (&self.writer)
            .write_all(b"\n")
            .context("Failed to write wake-up line into the command FIFO")
    }
}

impl Drop for FifoWaker {
    fn drop(&mut self) {
        if let Some(path) = self.remove_on_drop.take() {
            remove_fifo(&path);
        }
    }
}

fn remove_fifo(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => debug!("Removed command FIFO {}", path.display()),
        Err(e) => warn!("Failed to remove command FIFO {}: {}", path.display(), e),
    }
}
