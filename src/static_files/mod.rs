//! Static file serving
//!
//! Resolution of request paths under a document root and transmission of the
//! resolved files to client sockets.

pub mod resolver;
pub mod transmitter;

pub use resolver::{DocumentRoot, ResolveError, ResolvedPath};
pub use transmitter::{Progress, Sent, TransmitError, Transfer};
