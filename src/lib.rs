//! evserve - single-threaded static file server
//!
//! An event-driven TCP server that answers `GET <path>` request lines with
//! the raw bytes of files under a document root.

pub mod config;
pub mod http;
pub mod reactor;
pub mod server;
pub mod static_files;
