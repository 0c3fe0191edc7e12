//! The FIFO pair behind a stream.
//!
//! The server creates `c2s` (client to server) and `s2c` (server to client)
//! in a directory and removes them again when dropped. Both roles open
//! `s2c` before `c2s`, so the blocking FIFO opens pair up without deadlock.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use nix::errno::Errno;
use nix::sys::stat::Mode;

use crate::error::{Result, StreamError};

/// File name of the client-to-server FIFO.
pub const CLIENT_TO_SERVER: &str = "c2s";

/// File name of the server-to-client FIFO.
pub const SERVER_TO_CLIENT: &str = "s2c";

/// Which end of the pair this process is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Creates the FIFOs, reads `c2s`, writes `s2c`.
    Server,
    /// Opens existing FIFOs, reads `s2c`, writes `c2s`.
    Client,
}

/// Paths of the two FIFOs in a stream directory.
#[derive(Debug, Clone)]
pub struct FifoPaths {
    /// Client to server.
    pub c2s: PathBuf,
    /// Server to client.
    pub s2c: PathBuf,
}

impl FifoPaths {
    /// FIFO paths inside `dir`.
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            c2s: dir.join(CLIENT_TO_SERVER),
            s2c: dir.join(SERVER_TO_CLIENT),
        }
    }

    /// Create both FIFOs with mode 0600, replacing stale ones.
    pub(crate) fn create(&self) -> Result<()> {
        for path in [&self.c2s, &self.s2c] {
            make_fifo(path)?;
        }
        Ok(())
    }

    /// Open the read and write ends for `role`, in the pairing order.
    pub(crate) fn open(&self, role: Role) -> Result<(File, File)> {
        match role {
            Role::Server => {
                let writer = open_write(&self.s2c)?;
                let reader = open_read(&self.c2s)?;
                Ok((reader, writer))
            }
            Role::Client => {
                let reader = open_read(&self.s2c)?;
                let writer = open_write(&self.c2s)?;
                Ok((reader, writer))
            }
        }
    }

    /// Remove both FIFOs, ignoring ones already gone.
    pub(crate) fn remove(&self) {
        for path in [&self.c2s, &self.s2c] {
            if let Err(e) = std::fs::remove_file(path) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    tracing::warn!(path = %path.display(), error = %e, "failed to remove FIFO");
                }
            }
        }
    }
}

fn make_fifo(path: &Path) -> Result<()> {
    let mode = Mode::S_IRUSR | Mode::S_IWUSR;
    match nix::unistd::mkfifo(path, mode) {
        Ok(()) => Ok(()),
        Err(Errno::EEXIST) => {
            tracing::debug!(path = %path.display(), "replacing stale FIFO");
            std::fs::remove_file(path).map_err(|e| StreamError::open(path, e))?;
            nix::unistd::mkfifo(path, mode).map_err(|source| StreamError::CreateFifo {
                path: path.to_path_buf(),
                source,
            })
        }
        Err(source) => Err(StreamError::CreateFifo {
            path: path.to_path_buf(),
            source,
        }),
    }
}

fn open_read(path: &Path) -> Result<File> {
    File::open(path).map_err(|e| StreamError::open(path, e))
}

fn open_write(path: &Path) -> Result<File> {
    OpenOptions::new()
        .write(true)
        .open(path)
        .map_err(|e| StreamError::open(path, e))
}
