//! Production readiness backend on top of `mio::Poll`.

use mio::net::{TcpListener, TcpStream};
use mio::{Events, Poll, Token, Waker};
use std::io;
use std::net::{Shutdown, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use crate::reactor::{Event, Interest, Listener, Selector, Stream, WatcherId};

const WAKER: Token = Token(usize::MAX);
const EVENT_CAPACITY: usize = 1024;

pub struct MioSelector {
    poll: Poll,
    events: Events,
    waker: Arc<Waker>,
}

impl MioSelector {
    pub fn new() -> io::Result<Self> {
        let poll = Poll::new()?;
        let waker = Arc::new(Waker::new(poll.registry(), WAKER)?);

        Ok(Self {
            poll,
            events: Events::with_capacity(EVENT_CAPACITY),
            waker,
        })
    }
}

fn mio_interest(interest: Interest) -> mio::Interest {
    match interest {
        Interest::Readable => mio::Interest::READABLE,
        Interest::ReadWritable => mio::Interest::READABLE | mio::Interest::WRITABLE,
    }
}

impl Listener for TcpListener {
    type Stream = TcpStream;

    fn accept(&mut self) -> io::Result<(TcpStream, SocketAddr)> {
        TcpListener::accept(self)
    }
}

impl Stream for TcpStream {
    fn close(&self) -> io::Result<()> {
        self.shutdown(Shutdown::Both)
    }
}

impl Selector for MioSelector {
    type Listener = TcpListener;
    type Stream = TcpStream;

    fn register_listener(&mut self, listener: &mut TcpListener, id: WatcherId) -> io::Result<()> {
        self.poll
            .registry()
            .register(listener, Token(id.0), mio::Interest::READABLE)
    }

    fn register_stream(
        &mut self,
        stream: &mut TcpStream,
        id: WatcherId,
        interest: Interest,
    ) -> io::Result<()> {
        self.poll
            .registry()
            .register(stream, Token(id.0), mio_interest(interest))
    }

    fn reregister_stream(
        &mut self,
        stream: &mut TcpStream,
        id: WatcherId,
        interest: Interest,
    ) -> io::Result<()> {
        self.poll
            .registry()
            .reregister(stream, Token(id.0), mio_interest(interest))
    }

    fn deregister_stream(&mut self, stream: &mut TcpStream, _id: WatcherId) -> io::Result<()> {
        self.poll.registry().deregister(stream)
    }

    fn select(&mut self, out: &mut Vec<Event>, timeout: Option<Duration>) -> io::Result<()> {
        self.poll.poll(&mut self.events, timeout)?;

        for event in self.events.iter() {
            if event.token() == WAKER {
                continue;
            }

            // Hang-ups surface as readiness so the read path observes EOF or the
            // socket error itself.
            let readable = event.is_readable() || event.is_read_closed();
            let writable = event.is_writable() || event.is_write_closed();

            out.push(Event {
                watcher: WatcherId(event.token().0),
                readable,
                writable,
                error: event.is_error() && !readable && !writable,
            });
        }

        Ok(())
    }

    fn waker(&self) -> Option<Arc<Waker>> {
        Some(Arc::clone(&self.waker))
    }
}
