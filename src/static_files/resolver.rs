//! Request path to filesystem path mapping.
//!
//! Every path handed out by [`DocumentRoot::resolve`] has been canonicalized
//! against the real filesystem and checked to lie under the canonical document
//! root. Comparisons are only ever made between canonical paths; the raw
//! request path is never inspected for `..` or separators.

use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// File served for any request path ending in `/`.
pub const INDEX_FILE: &str = "index.html";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ResolveError {
    /// The path does not exist, cannot be canonicalized, or is not a regular file
    #[error("{requested:?} not found")]
    NotFound { requested: String },

    /// The canonical path escapes the document root
    #[error("{requested:?} resolves to {} outside the document root", attempted.display())]
    Forbidden {
        requested: String,
        attempted: PathBuf,
    },
}

/// A file proven to live under the document root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPath {
    path: PathBuf,
    len: u64,
}

impl ResolvedPath {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// File size observed during resolution.
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// The directory outside of which nothing is served.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentRoot {
    canonical: PathBuf,
}

impl DocumentRoot {
    /// Canonicalizes `path` once. Fails if it does not exist or is not a directory.
    pub fn new(path: impl AsRef<Path>) -> io::Result<Self> {
        let canonical = path.as_ref().canonicalize()?;

        if !canonical.is_dir() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("document root {} is not a directory", canonical.display()),
            ));
        }

        Ok(Self { canonical })
    }

    pub fn path(&self) -> &Path {
        &self.canonical
    }

    /// Maps a request path to a file under the root.
    ///
    /// A trailing `/` selects the root's `index.html`; anything else is
    /// appended to the root verbatim. The result is canonicalized and must
    /// keep the canonical root as a component-wise prefix, so `..` segments,
    /// symlinks pointing outside and sibling directories sharing the root's
    /// name as a string prefix are all refused.
    pub fn resolve(&self, request_path: &str) -> Result<ResolvedPath, ResolveError> {
        let not_found = || ResolveError::NotFound {
            requested: request_path.to_string(),
        };

        let mut candidate = OsString::from(self.canonical.as_os_str());
        if request_path.ends_with('/') {
            candidate.push("/");
            candidate.push(INDEX_FILE);
        } else {
            candidate.push(request_path);
        }

        let canonical = PathBuf::from(candidate)
            .canonicalize()
            .map_err(|_| not_found())?;

        if !canonical.starts_with(&self.canonical) {
            return Err(ResolveError::Forbidden {
                requested: request_path.to_string(),
                attempted: canonical,
            });
        }

        let metadata = fs::metadata(&canonical).map_err(|_| not_found())?;
        if !metadata.is_file() {
            return Err(not_found());
        }

        Ok(ResolvedPath {
            path: canonical,
            len: metadata.len(),
        })
    }
}
