//! Single-threaded readiness reactor.
//!
//! The reactor owns the listening socket and one watcher per accepted
//! connection. Each loop iteration asks the [`Selector`] for readiness events
//! and runs the matching callback to completion before looking at the next
//! one; nothing here blocks except the selector itself.
//!
//! ```text
//!   select() ──► Event(ACCEPTOR) ──► accept until WouldBlock ──► register_connection
//!            └─► Event(watcher)  ──► Connection::on_readable / on_writable
//!                                       ├─ Idle      → read interest
//!                                       ├─ WantWrite → read + write interest
//!                                       └─ Close     → deregister (exactly once)
//! ```
//!
//! A watcher's slot is removed from the slab on teardown, so an event that
//! arrives late for a stopped watcher finds nothing and is dropped.

pub mod mio_selector;
pub mod registry;

pub use mio_selector::MioSelector;
pub use registry::{ConnectionRegistry, UnderflowError};

use slab::Slab;
use std::io::{self, Read, Write};
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::http::connection::{CloseReason, Connection, Outcome, ServeContext};

/// Watcher id of the listening socket. Connection ids start at 1.
pub const ACCEPTOR: WatcherId = WatcherId(0);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WatcherId(pub usize);

impl WatcherId {
    fn from_slot(slot: usize) -> Self {
        WatcherId(slot + 1)
    }

    fn slot(self) -> Option<usize> {
        self.0.checked_sub(1)
    }
}

impl std::fmt::Display for WatcherId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interest {
    Readable,
    ReadWritable,
}

/// One readiness notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Event {
    pub watcher: WatcherId,
    pub readable: bool,
    pub writable: bool,
    /// Error notification carrying no usable readiness
    pub error: bool,
}

impl Event {
    pub fn readable(watcher: WatcherId) -> Self {
        Self {
            watcher,
            readable: true,
            writable: false,
            error: false,
        }
    }

    pub fn writable(watcher: WatcherId) -> Self {
        Self {
            watcher,
            readable: false,
            writable: true,
            error: false,
        }
    }

    pub fn error(watcher: WatcherId) -> Self {
        Self {
            watcher,
            readable: false,
            writable: false,
            error: true,
        }
    }
}

/// A listening socket that hands out non-blocking streams.
pub trait Listener {
    type Stream;

    fn accept(&mut self) -> io::Result<(Self::Stream, SocketAddr)>;
}

/// A non-blocking client stream.
pub trait Stream: Read + Write {
    /// Shuts down both directions.
    fn close(&self) -> io::Result<()>;
}

/// Readiness backend.
pub trait Selector {
    type Listener: Listener<Stream = Self::Stream>;
    type Stream: Stream;

    fn register_listener(&mut self, listener: &mut Self::Listener, id: WatcherId) -> io::Result<()>;

    fn register_stream(
        &mut self,
        stream: &mut Self::Stream,
        id: WatcherId,
        interest: Interest,
    ) -> io::Result<()>;

    fn reregister_stream(
        &mut self,
        stream: &mut Self::Stream,
        id: WatcherId,
        interest: Interest,
    ) -> io::Result<()>;

    fn deregister_stream(&mut self, stream: &mut Self::Stream, id: WatcherId) -> io::Result<()>;

    /// Waits for readiness and appends the events to `out`.
    fn select(&mut self, out: &mut Vec<Event>, timeout: Option<Duration>) -> io::Result<()>;

    /// Waker that interrupts a blocked `select`, if the backend has one.
    fn waker(&self) -> Option<Arc<mio::Waker>>;
}

#[derive(Debug, Error)]
pub enum ReactorError {
    #[error("no active watcher {0}")]
    UnknownWatcher(WatcherId),

    #[error("an acceptor is already registered")]
    AcceptorRegistered,

    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Ends [`Reactor::run`] from any thread.
#[derive(Debug, Clone)]
pub struct StopHandle {
    stopped: Arc<AtomicBool>,
    waker: Option<Arc<mio::Waker>>,
}

impl StopHandle {
    pub fn stop(&self) -> io::Result<()> {
        self.stopped.store(true, Ordering::SeqCst);
        if let Some(waker) = &self.waker {
            waker.wake()?;
        }
        Ok(())
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

struct Watcher<T> {
    connection: Connection<T>,
    interest: Interest,
}

pub struct Reactor<S: Selector> {
    selector: S,
    acceptor: Option<S::Listener>,
    watchers: Slab<Watcher<S::Stream>>,
    registry: ConnectionRegistry,
    ctx: ServeContext,
    stopped: Arc<AtomicBool>,
    events: Vec<Event>,
}

impl<S: Selector> Reactor<S> {
    pub fn new(selector: S, ctx: ServeContext) -> Self {
        Self {
            selector,
            acceptor: None,
            watchers: Slab::with_capacity(1024),
            registry: ConnectionRegistry::new(),
            ctx,
            stopped: Arc::new(AtomicBool::new(false)),
            events: Vec::with_capacity(1024),
        }
    }

    /// Starts watching `listener` for incoming connections.
    pub fn register_acceptor(&mut self, mut listener: S::Listener) -> Result<WatcherId, ReactorError> {
        if self.acceptor.is_some() {
            return Err(ReactorError::AcceptorRegistered);
        }

        self.selector.register_listener(&mut listener, ACCEPTOR)?;
        self.acceptor = Some(listener);
        Ok(ACCEPTOR)
    }

    /// Starts watching an accepted stream for read readiness.
    pub fn register_connection(
        &mut self,
        stream: S::Stream,
        peer: SocketAddr,
    ) -> Result<WatcherId, ReactorError> {
        let entry = self.watchers.vacant_entry();
        let id = WatcherId::from_slot(entry.key());

        let mut connection = Connection::new(stream, peer);
        self.selector
            .register_stream(connection.stream_mut(), id, Interest::Readable)?;

        entry.insert(Watcher {
            connection,
            interest: Interest::Readable,
        });
        Ok(id)
    }

    /// Stops watching a connection, shuts its stream down and drops it.
    ///
    /// The slot is gone afterwards; a second call for the same id is an error.
    pub fn deregister(&mut self, id: WatcherId) -> Result<(), ReactorError> {
        let slot = id
            .slot()
            .filter(|&slot| self.watchers.contains(slot))
            .ok_or(ReactorError::UnknownWatcher(id))?;

        let mut watcher = self.watchers.remove(slot);

        if let Err(e) = self
            .selector
            .deregister_stream(watcher.connection.stream_mut(), id)
        {
            warn!(watcher = %id, error = %e, "Deregister failed");
        }
        if let Err(e) = watcher.connection.close() {
            debug!(watcher = %id, error = %e, "Shutdown failed");
        }

        Ok(())
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            stopped: Arc::clone(&self.stopped),
            waker: self.selector.waker(),
        }
    }

    /// Live connection count.
    pub fn connections(&self) -> u64 {
        self.registry.live()
    }

    /// Number of registered connection watchers.
    pub fn watchers(&self) -> usize {
        self.watchers.len()
    }

    pub fn is_registered(&self, id: WatcherId) -> bool {
        id.slot().is_some_and(|slot| self.watchers.contains(slot))
    }

    /// Dispatches events until stopped.
    pub fn run(&mut self) -> io::Result<()> {
        while !self.stopped.load(Ordering::SeqCst) {
            self.turn(None)?;
        }

        info!(clients = self.registry.live(), "Reactor stopped");
        Ok(())
    }

    /// One select + dispatch round. Returns the number of events handled.
    pub fn turn(&mut self, timeout: Option<Duration>) -> io::Result<usize> {
        let mut events = std::mem::take(&mut self.events);
        events.clear();

        if let Err(e) = self.selector.select(&mut events, timeout) {
            self.events = events;
            if e.kind() == io::ErrorKind::Interrupted {
                return Ok(0);
            }
            return Err(e);
        }

        for event in &events {
            self.dispatch(*event);
        }

        let handled = events.len();
        self.events = events;
        Ok(handled)
    }

    pub fn dispatch(&mut self, event: Event) {
        if event.error {
            warn!(watcher = %event.watcher, "Invalid event");
            return;
        }

        if event.watcher == ACCEPTOR {
            if event.readable {
                self.accept_ready();
            }
            return;
        }

        let Some(slot) = event
            .watcher
            .slot()
            .filter(|&slot| self.watchers.contains(slot))
        else {
            debug!(watcher = %event.watcher, "Event for stopped watcher");
            return;
        };

        let watcher = &mut self.watchers[slot];
        let mut outcome = None;

        if event.readable {
            outcome = Some(watcher.connection.on_readable(&self.ctx));
        }
        if event.writable && !matches!(outcome, Some(Outcome::Close(_))) {
            outcome = Some(watcher.connection.on_writable(&self.ctx));
        }

        if let Some(outcome) = outcome {
            self.apply(event.watcher, slot, outcome);
        }
    }

    fn accept_ready(&mut self) {
        loop {
            let accepted = match self.acceptor.as_mut() {
                Some(listener) => listener.accept(),
                None => return,
            };

            match accepted {
                Ok((stream, peer)) => {
                    let total = self.registry.connected();
                    info!(%peer, clients = total, "One client connected");

                    if let Err(e) = self.register_connection(stream, peer) {
                        warn!(%peer, error = %e, "Could not watch new client");
                        if let Err(e) = self.registry.disconnected() {
                            error!(error = %e, "Connection count invariant violated");
                        }
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    warn!(error = %e, "Accept error");
                    return;
                }
            }
        }
    }

    fn apply(&mut self, id: WatcherId, slot: usize, outcome: Outcome) {
        let interest = match outcome {
            Outcome::Idle => Interest::Readable,
            Outcome::WantWrite => Interest::ReadWritable,
            Outcome::Close(reason) => return self.close(id, reason),
        };

        let watcher = &mut self.watchers[slot];
        if watcher.interest == interest {
            return;
        }

        match self
            .selector
            .reregister_stream(watcher.connection.stream_mut(), id, interest)
        {
            Ok(()) => watcher.interest = interest,
            Err(e) => {
                warn!(watcher = %id, error = %e, "Reregister failed");
                self.close(id, CloseReason::Receive(e));
            }
        }
    }

    fn close(&mut self, id: WatcherId, reason: CloseReason) {
        match &reason {
            CloseReason::PeerShutdown => debug!(watcher = %id, "Peer shut down"),
            CloseReason::Receive(e) => warn!(watcher = %id, error = %e, "Closing after read error"),
            CloseReason::Transmit(e) => warn!(watcher = %id, error = %e, "Closing after send error"),
        }

        match self.registry.disconnected() {
            Ok(total) => info!(watcher = %id, clients = total, "One client disconnected"),
            Err(e) => error!(watcher = %id, error = %e, "This should not happen"),
        }

        if let Err(e) = self.deregister(id) {
            error!(watcher = %id, error = %e, "Teardown of unknown watcher");
        }
    }
}
