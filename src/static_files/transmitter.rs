//! Streaming a resolved file to a non-blocking socket.
//!
//! The file is sent as a bare byte stream in bounded chunks. When the socket
//! stops accepting bytes the unsent remainder of the current chunk and the
//! file offset stay inside a [`Transfer`], which is pumped again once the
//! socket is writable.

use crate::static_files::resolver::ResolvedPath;
use std::fs::File;
use std::io::{self, Read, Write};
use std::path::PathBuf;
use thiserror::Error;

/// Default size of a single file read.
pub const CHUNK_SIZE: usize = 64 * 1024;

#[derive(Debug, Error)]
pub enum TransmitError {
    /// Opening or stating the file failed; callers treat this like a missing file
    #[error("failed to open {}: {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to write to peer: {0}")]
    Write(#[source] io::Error),

    /// The file shrank while it was being sent
    #[error("{} ended after {sent} of {expected} bytes", path.display())]
    Truncated {
        path: PathBuf,
        expected: u64,
        sent: u64,
    },
}

/// Result of one call to [`Transfer::pump`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress {
    /// Every byte has been written; carries the total
    Complete(u64),
    /// The socket would block; pump again on write readiness
    Blocked,
}

/// Result of [`send`].
#[derive(Debug)]
pub enum Sent {
    Complete(u64),
    Pending(Transfer),
}

/// An in-flight file transmission.
#[derive(Debug)]
pub struct Transfer {
    file: File,
    path: PathBuf,
    total: u64,
    read: u64,
    sent: u64,
    buf: Vec<u8>,
    pos: usize,
    filled: usize,
}

impl Transfer {
    /// Opens `resolved` read-only and records its size. Exactly that many bytes
    /// will be sent, starting at offset 0.
    pub fn open(resolved: &ResolvedPath, chunk_size: usize) -> Result<Self, TransmitError> {
        let path = resolved.path().to_path_buf();
        let open_err = |source| TransmitError::Open {
            path: path.clone(),
            source,
        };

        let file = File::open(&path).map_err(open_err)?;
        let total = file.metadata().map_err(open_err)?.len();

        let capacity = usize::try_from(total)
            .unwrap_or(usize::MAX)
            .clamp(1, chunk_size.max(1));

        Ok(Self {
            file,
            path,
            total,
            read: 0,
            sent: 0,
            buf: vec![0; capacity],
            pos: 0,
            filled: 0,
        })
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn sent(&self) -> u64 {
        self.sent
    }

    /// Writes as much as `dst` accepts.
    pub fn pump<W: Write>(&mut self, dst: &mut W) -> Result<Progress, TransmitError> {
        loop {
            if self.pos == self.filled {
                if self.read == self.total {
                    return Ok(Progress::Complete(self.sent));
                }
                self.fill()?;
            }

            match dst.write(&self.buf[self.pos..self.filled]) {
                Ok(0) => {
                    return Err(TransmitError::Write(io::Error::from(io::ErrorKind::WriteZero)));
                }
                Ok(n) => {
                    self.pos += n;
                    self.sent += n as u64;
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(Progress::Blocked),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(TransmitError::Write(e)),
            }
        }
    }

    fn fill(&mut self) -> Result<(), TransmitError> {
        let remaining = self.total - self.read;
        let want = usize::try_from(remaining)
            .unwrap_or(usize::MAX)
            .min(self.buf.len());

        loop {
            match self.file.read(&mut self.buf[..want]) {
                Ok(0) => {
                    return Err(TransmitError::Truncated {
                        path: self.path.clone(),
                        expected: self.total,
                        sent: self.sent,
                    });
                }
                Ok(n) => {
                    self.read += n as u64;
                    self.pos = 0;
                    self.filled = n;
                    return Ok(());
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(source) => {
                    return Err(TransmitError::Read {
                        path: self.path.clone(),
                        source,
                    });
                }
            }
        }
    }
}

/// Opens `resolved` and sends as much of it as `dst` will take right now.
pub fn send<W: Write>(
    resolved: &ResolvedPath,
    dst: &mut W,
    chunk_size: usize,
) -> Result<Sent, TransmitError> {
    let mut transfer = Transfer::open(resolved, chunk_size)?;

    match transfer.pump(dst)? {
        Progress::Complete(n) => Ok(Sent::Complete(n)),
        Progress::Blocked => Ok(Sent::Pending(transfer)),
    }
}
