//! Scripted reactor backend and in-memory sockets for driving the reactor
//! without the network.

#![allow(dead_code)]

use evserve::reactor::{Event, Interest, Listener, Selector, Stream, WatcherId};
use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::io::{self, Read, Write};
use std::net::SocketAddr;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;

/// Shared state behind a [`MemoryStream`].
#[derive(Debug, Default)]
pub struct StreamState {
    pub inbound: VecDeque<u8>,
    /// Peer has shut down its write side; reads return 0 once `inbound` is drained
    pub peer_closed: bool,
    pub outbound: Vec<u8>,
    /// Bytes accepted before writes return `WouldBlock`; `None` is unlimited
    pub write_capacity: Option<usize>,
    pub read_error: Option<io::ErrorKind>,
    pub write_error: Option<io::ErrorKind>,
    pub reads: usize,
    pub closes: usize,
}

#[derive(Debug, Clone, Default)]
pub struct MemoryStream(pub Rc<RefCell<StreamState>>);

impl MemoryStream {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn send(&self, bytes: &[u8]) {
        self.0.borrow_mut().inbound.extend(bytes);
    }

    pub fn shutdown_write(&self) {
        self.0.borrow_mut().peer_closed = true;
    }

    pub fn received(&self) -> Vec<u8> {
        self.0.borrow().outbound.clone()
    }

    pub fn set_write_capacity(&self, capacity: Option<usize>) {
        self.0.borrow_mut().write_capacity = capacity;
    }

    pub fn fail_reads(&self, kind: io::ErrorKind) {
        self.0.borrow_mut().read_error = Some(kind);
    }

    pub fn fail_writes(&self, kind: io::ErrorKind) {
        self.0.borrow_mut().write_error = Some(kind);
    }

    pub fn reads(&self) -> usize {
        self.0.borrow().reads
    }

    pub fn closes(&self) -> usize {
        self.0.borrow().closes
    }
}

impl Read for MemoryStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut state = self.0.borrow_mut();
        state.reads += 1;

        if let Some(kind) = state.read_error {
            return Err(kind.into());
        }
        if state.inbound.is_empty() {
            if state.peer_closed {
                return Ok(0);
            }
            return Err(io::ErrorKind::WouldBlock.into());
        }

        let n = buf.len().min(state.inbound.len());
        for (slot, byte) in buf.iter_mut().zip(state.inbound.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }
}

impl Write for MemoryStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut state = self.0.borrow_mut();

        if let Some(kind) = state.write_error {
            return Err(kind.into());
        }

        let n = match state.write_capacity {
            Some(0) => return Err(io::ErrorKind::WouldBlock.into()),
            Some(capacity) => {
                let n = capacity.min(buf.len());
                state.write_capacity = Some(capacity - n);
                n
            }
            None => buf.len(),
        };

        state.outbound.extend_from_slice(&buf[..n]);
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Stream for MemoryStream {
    fn close(&self) -> io::Result<()> {
        self.0.borrow_mut().closes += 1;
        Ok(())
    }
}

/// Outcome queued for the next `accept` call.
pub enum Pending {
    Client(MemoryStream, SocketAddr),
    Fail(io::ErrorKind),
}

#[derive(Clone, Default)]
pub struct ScriptedListener {
    pending: Rc<RefCell<VecDeque<Pending>>>,
}

impl ScriptedListener {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a client and returns the test's end of it.
    pub fn connect(&self, port: u16) -> MemoryStream {
        let stream = MemoryStream::new();
        let peer = SocketAddr::from(([127, 0, 0, 1], port));
        self.pending
            .borrow_mut()
            .push_back(Pending::Client(stream.clone(), peer));
        stream
    }

    pub fn fail_next(&self, kind: io::ErrorKind) {
        self.pending.borrow_mut().push_back(Pending::Fail(kind));
    }
}

impl Listener for ScriptedListener {
    type Stream = MemoryStream;

    fn accept(&mut self) -> io::Result<(MemoryStream, SocketAddr)> {
        match self.pending.borrow_mut().pop_front() {
            Some(Pending::Client(stream, peer)) => Ok((stream, peer)),
            Some(Pending::Fail(kind)) => Err(kind.into()),
            None => Err(io::ErrorKind::WouldBlock.into()),
        }
    }
}

/// Everything the reactor asked of the selector.
#[derive(Debug, Default)]
pub struct SelectorLog {
    pub active: HashMap<WatcherId, Interest>,
    pub registered: Vec<WatcherId>,
    pub reregistered: Vec<(WatcherId, Interest)>,
    pub deregistered: Vec<WatcherId>,
}

/// Selector double that delivers queued event batches.
#[derive(Clone, Default)]
pub struct ScriptedSelector {
    batches: Rc<RefCell<VecDeque<Vec<Event>>>>,
    pub log: Rc<RefCell<SelectorLog>>,
}

impl ScriptedSelector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, batch: Vec<Event>) {
        self.batches.borrow_mut().push_back(batch);
    }

    pub fn interest(&self, id: WatcherId) -> Option<Interest> {
        self.log.borrow().active.get(&id).copied()
    }

    pub fn deregistered(&self) -> Vec<WatcherId> {
        self.log.borrow().deregistered.clone()
    }
}

impl Selector for ScriptedSelector {
    type Listener = ScriptedListener;
    type Stream = MemoryStream;

    fn register_listener(&mut self, _listener: &mut ScriptedListener, id: WatcherId) -> io::Result<()> {
        let mut log = self.log.borrow_mut();
        log.active.insert(id, Interest::Readable);
        log.registered.push(id);
        Ok(())
    }

    fn register_stream(
        &mut self,
        _stream: &mut MemoryStream,
        id: WatcherId,
        interest: Interest,
    ) -> io::Result<()> {
        let mut log = self.log.borrow_mut();
        if log.active.insert(id, interest).is_some() {
            return Err(io::Error::new(io::ErrorKind::AlreadyExists, "watcher registered twice"));
        }
        log.registered.push(id);
        Ok(())
    }

    fn reregister_stream(
        &mut self,
        _stream: &mut MemoryStream,
        id: WatcherId,
        interest: Interest,
    ) -> io::Result<()> {
        let mut log = self.log.borrow_mut();
        match log.active.get_mut(&id) {
            Some(current) => *current = interest,
            None => return Err(io::ErrorKind::NotFound.into()),
        }
        log.reregistered.push((id, interest));
        Ok(())
    }

    fn deregister_stream(&mut self, _stream: &mut MemoryStream, id: WatcherId) -> io::Result<()> {
        let mut log = self.log.borrow_mut();
        if log.active.remove(&id).is_none() {
            return Err(io::ErrorKind::NotFound.into());
        }
        log.deregistered.push(id);
        Ok(())
    }

    fn select(&mut self, out: &mut Vec<Event>, _timeout: Option<Duration>) -> io::Result<()> {
        if let Some(batch) = self.batches.borrow_mut().pop_front() {
            out.extend(batch);
        }
        Ok(())
    }

    fn waker(&self) -> Option<Arc<mio::Waker>> {
        None
    }
}
