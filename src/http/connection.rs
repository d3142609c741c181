use bytes::{Buf, BytesMut};
use std::io::{self, Read};
use std::net::SocketAddr;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::http::parser::{self, ParseError};
use crate::reactor::Stream;
use crate::static_files::resolver::{DocumentRoot, ResolveError};
use crate::static_files::transmitter::{self, Progress, Sent, TransmitError, Transfer};

/// Everything a connection needs to answer requests.
#[derive(Debug, Clone)]
pub struct ServeContext {
    pub root: DocumentRoot,
    pub recv_buffer: usize,
    pub max_request_line: usize,
    pub max_path: usize,
    pub chunk_size: usize,
    pub close_on_receive_error: bool,
}

impl ServeContext {
    pub fn new(root: DocumentRoot) -> Self {
        Self::from_config(root, &Config::default())
    }

    pub fn from_config(root: DocumentRoot, cfg: &Config) -> Self {
        Self {
            root,
            recv_buffer: cfg.limits.recv_buffer,
            max_request_line: cfg.limits.max_request_line,
            max_path: cfg.limits.max_path,
            chunk_size: cfg.limits.chunk_size,
            close_on_receive_error: cfg.connection.close_on_receive_error,
        }
    }
}

#[derive(Debug)]
pub enum ConnectionState {
    /// Accumulating bytes and serving complete request lines
    Reading,
    /// Dropping the rest of an oversized line up to its terminator
    Discarding,
    /// A file is partially sent and waits for write readiness
    Writing(Transfer),
    Closed,
}

/// Why a connection has to be torn down.
#[derive(Debug)]
pub enum CloseReason {
    PeerShutdown,
    Receive(io::Error),
    Transmit(TransmitError),
}

/// What the reactor should do with the connection after an event.
#[derive(Debug)]
pub enum Outcome {
    /// Wait for read readiness only
    Idle,
    /// Wait for read and write readiness
    WantWrite,
    Close(CloseReason),
}

enum Received {
    Data,
    WouldBlock,
    Eof,
}

pub struct Connection<S> {
    stream: S,
    peer: SocketAddr,
    buffer: BytesMut,
    state: ConnectionState,
    peer_closed: bool,
}

impl<S: Stream> Connection<S> {
    pub fn new(stream: S, peer: SocketAddr) -> Self {
        Self {
            stream,
            peer,
            buffer: BytesMut::with_capacity(1024),
            state: ConnectionState::Reading,
            peer_closed: false,
        }
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn state(&self) -> &ConnectionState {
        &self.state
    }

    pub fn stream_mut(&mut self) -> &mut S {
        &mut self.stream
    }

    /// Bytes received but not yet consumed by a request.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    pub fn on_readable(&mut self, ctx: &ServeContext) -> Outcome {
        match self.state {
            // Reading resumes once the pending file is out.
            ConnectionState::Writing(_) => Outcome::WantWrite,
            ConnectionState::Closed => Outcome::Close(CloseReason::PeerShutdown),
            ConnectionState::Reading | ConnectionState::Discarding => self.advance(ctx),
        }
    }

    pub fn on_writable(&mut self, ctx: &ServeContext) -> Outcome {
        let ConnectionState::Writing(transfer) = &mut self.state else {
            return Outcome::Idle;
        };

        match transfer.pump(&mut self.stream) {
            Ok(Progress::Blocked) => Outcome::WantWrite,
            Ok(Progress::Complete(n)) => {
                debug!(peer = %self.peer, bytes = n, "transfer complete");
                self.state = ConnectionState::Reading;
                self.advance(ctx)
            }
            Err(e) => {
                self.state = ConnectionState::Closed;
                Outcome::Close(CloseReason::Transmit(e))
            }
        }
    }

    /// Shuts down both directions of the stream.
    pub fn close(&mut self) -> io::Result<()> {
        self.state = ConnectionState::Closed;
        self.stream.close()
    }

    fn advance(&mut self, ctx: &ServeContext) -> Outcome {
        loop {
            if let Some(outcome) = self.serve_buffered(ctx) {
                return outcome;
            }

            if self.peer_closed {
                self.state = ConnectionState::Closed;
                return Outcome::Close(CloseReason::PeerShutdown);
            }

            match self.receive(ctx.recv_buffer) {
                Ok(Received::Data) => {}
                Ok(Received::WouldBlock) => return Outcome::Idle,
                Ok(Received::Eof) => self.peer_closed = true,
                Err(e) => {
                    warn!(peer = %self.peer, error = %e, "Read error");
                    if ctx.close_on_receive_error {
                        self.state = ConnectionState::Closed;
                        return Outcome::Close(CloseReason::Receive(e));
                    }
                    return Outcome::Idle;
                }
            }
        }
    }

    fn receive(&mut self, chunk: usize) -> io::Result<Received> {
        let start = self.buffer.len();
        self.buffer.resize(start + chunk, 0);

        loop {
            match self.stream.read(&mut self.buffer[start..]) {
                Ok(0) => {
                    self.buffer.truncate(start);
                    return Ok(Received::Eof);
                }
                Ok(n) => {
                    self.buffer.truncate(start + n);
                    return Ok(Received::Data);
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    self.buffer.truncate(start);
                    if e.kind() == io::ErrorKind::WouldBlock {
                        return Ok(Received::WouldBlock);
                    }
                    return Err(e);
                }
            }
        }
    }

    /// Serves buffered lines until the buffer holds no complete line or a
    /// transfer has to wait. Returns `Some` when the reactor must act.
    fn serve_buffered(&mut self, ctx: &ServeContext) -> Option<Outcome> {
        loop {
            match self.state {
                ConnectionState::Writing(_) => return Some(Outcome::WantWrite),
                ConnectionState::Closed => return Some(Outcome::Close(CloseReason::PeerShutdown)),
                ConnectionState::Discarding => {
                    match self.buffer.iter().position(|&b| b == b'\n') {
                        Some(pos) => {
                            self.buffer.advance(pos + 1);
                            self.state = ConnectionState::Reading;
                        }
                        None => {
                            self.buffer.clear();
                            return None;
                        }
                    }
                }
                ConnectionState::Reading => {
                    let line_len = match parser::find_line_end(&self.buffer, ctx.max_request_line) {
                        Ok(n) => n,
                        Err(ParseError::LineTooLong { limit }) => {
                            warn!(peer = %self.peer, limit, "Request line too long, discarding");
                            self.buffer.advance(limit);
                            self.state = ConnectionState::Discarding;
                            continue;
                        }
                        // An unterminated line is complete once the peer stops sending.
                        Err(_) if self.peer_closed && !self.buffer.is_empty() => self.buffer.len(),
                        Err(_) => return None,
                    };

                    let line = self.buffer.split_to(line_len);
                    if let Some(outcome) = self.serve_line(&line, ctx) {
                        return Some(outcome);
                    }
                }
            }
        }
    }

    fn serve_line(&mut self, line: &[u8], ctx: &ServeContext) -> Option<Outcome> {
        let request = match parser::decode_with_limit(line, ctx.max_path) {
            Ok(request) => request,
            Err(e) => {
                debug!(peer = %self.peer, error = %e, "Dropping request");
                return None;
            }
        };

        info!(
            peer = %self.peer,
            method = request.method.as_str(),
            path = %request.path,
            version = %request.version,
            "Request"
        );

        let resolved = match ctx.root.resolve(&request.path) {
            Ok(resolved) => resolved,
            Err(ResolveError::Forbidden { attempted, .. }) => {
                warn!(peer = %self.peer, attempted = %attempted.display(), "Access violation");
                return None;
            }
            Err(e) => {
                debug!(peer = %self.peer, error = %e, "Not found");
                return None;
            }
        };

        info!(peer = %self.peer, file = %resolved.path().display(), "Retrieving");

        match transmitter::send(&resolved, &mut self.stream, ctx.chunk_size) {
            Ok(Sent::Complete(n)) => {
                debug!(peer = %self.peer, bytes = n, "transfer complete");
                None
            }
            Ok(Sent::Pending(transfer)) => {
                debug!(
                    peer = %self.peer,
                    sent = transfer.sent(),
                    total = transfer.total(),
                    "transfer waiting for write readiness"
                );
                self.state = ConnectionState::Writing(transfer);
                Some(Outcome::WantWrite)
            }
            Err(e @ TransmitError::Open { .. }) => {
                debug!(peer = %self.peer, error = %e, "Not found");
                None
            }
            Err(e) => {
                self.state = ConnectionState::Closed;
                Some(Outcome::Close(CloseReason::Transmit(e)))
            }
        }
    }
}
