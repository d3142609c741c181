//! Request handling for the static file server.
//!
//! The wire protocol is a small subset of HTTP/1.0: a client sends request
//! lines of the form `GET /path HTTP/1.0` and receives the raw bytes of the
//! named file. There is no status line, no headers and no framing. A request
//! that cannot be served yields zero bytes.
//!
//! # Architecture
//!
//! - **`connection`**: per-connection state machine driven by readiness events
//! - **`parser`**: request-line framing and decoding
//! - **`request`**: the decoded request
//!
//! # Connection State Machine
//!
//! ```text
//!        ┌─────────────┐
//!        │   Reading   │ ← accumulate bytes, serve each complete line
//!        └──────┬──────┘
//!               │ socket full mid-file
//!               ▼
//!        ┌──────────────────┐
//!        │    Writing       │ ← resume on write readiness
//!        └──────┬───────────┘
//!               │ file sent
//!               ├─ peer still open → Reading
//!               └─ peer shut down  → Closed
//! ```
//!
//! Lines longer than the configured limit put the connection in `Discarding`
//! until the next terminator.

pub mod connection;
pub mod parser;
pub mod request;
