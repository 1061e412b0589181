//! mio event loop implementation.
//!
//! Readiness-based model: poll tells us when sockets are ready, then we
//! perform non-blocking accept/read/write syscalls. Uses epoll on Linux,
//! kqueue on macOS.
//!
//! A single poll instance multiplexes the listening socket, every accepted
//! client connection, the signal source, and a cross-thread waker.

use crate::config::Config;
use crate::response;
use crate::runtime::listener::create_listener;
use crate::runtime::{Connection, ShutdownHandle, WriteProgress};
use mio::net::TcpListener;
use mio::{Events, Interest, Poll, Token, Waker};
use signal_hook::consts::{SIGINT, SIGTERM};
use signal_hook_mio::v1_0::Signals;
use slab::Slab;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tracing::{debug, error, info, trace};

const LISTENER_TOKEN: Token = Token(usize::MAX);
const SIGNALS_TOKEN: Token = Token(usize::MAX - 1);
const WAKER_TOKEN: Token = Token(usize::MAX - 2);

/// Request bytes are read into this much scratch space and dropped.
/// Sized to take an ordinary request head in one read.
const SCRATCH_SIZE: usize = 8192;

/// Single-threaded readiness event loop serving the what-is-my-IP reply.
pub struct EventLoop {
    poll: Poll,
    listener: TcpListener,
    signals: Signals,
    connections: Slab<Connection>,
    shutdown: ShutdownHandle,
    scratch: Vec<u8>,
    maxevents: usize,
}

impl EventLoop {
    /// Bind the listening socket and set up the poll registrations.
    pub fn bind(config: &Config) -> io::Result<EventLoop> {
        let poll = Poll::new()?;

        let mut listener = create_listener(config.port, config.backlog)?;
        poll.registry()
            .register(&mut listener, LISTENER_TOKEN, Interest::READABLE)?;

        let mut signals = Signals::new([SIGINT, SIGTERM])?;
        poll.registry()
            .register(&mut signals, SIGNALS_TOKEN, Interest::READABLE)?;

        let waker = Waker::new(poll.registry(), WAKER_TOKEN)?;
        let shutdown = ShutdownHandle::new(Arc::new(AtomicBool::new(false)), Arc::new(waker));

        Ok(EventLoop {
            poll,
            listener,
            signals,
            connections: Slab::new(),
            shutdown,
            scratch: vec![0; SCRATCH_SIZE],
            maxevents: config.maxevents,
        })
    }

    /// Address the listener is bound to. With a configured port of 0 the
    /// kernel picks one, so callers read it back from here.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Get a handle for requesting shutdown, for driving tests.
    #[cfg(test)]
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    /// Serve until shutdown is requested, then close every descriptor.
    pub fn run(mut self) -> io::Result<()> {
        let mut events = Events::with_capacity(self.maxevents);

        let addr = self.local_addr()?;
        info!(addr = %addr, "Listening for connections");

        loop {
            if self.shutdown.is_requested() {
                break;
            }

            if let Err(e) = self.poll.poll(&mut events, None) {
                if e.kind() == io::ErrorKind::Interrupted {
                    continue;
                }
                return Err(e);
            }

            for event in events.iter() {
                match event.token() {
                    LISTENER_TOKEN => self.accept_connections(),
                    SIGNALS_TOKEN => self.drain_signals(),
                    WAKER_TOKEN => {
                        // A wakeup carries no payload; the flag check at the
                        // top of the loop decides what happens next.
                    }
                    Token(conn_id) => {
                        if let Err(e) = self.handle_connection_event(conn_id, event) {
                            debug!(conn_id, error = %e, "Connection error");
                            self.close_connection(conn_id);
                        }
                    }
                }
            }
        }

        self.close_all();
        info!("Shutdown complete");
        Ok(())
    }

    /// Accept until the listener runs dry. Edge-triggered readiness only
    /// fires again after the pending queue has been fully drained. Accept
    /// failures are connection-scoped and never take the listener down.
    fn accept_connections(&mut self) {
        loop {
            match self.listener.accept() {
                Ok((stream, peer)) => {
                    let conn_id = self.connections.insert(Connection::new(stream, peer));

                    let conn = &mut self.connections[conn_id];
                    if let Err(e) = self.poll.registry().register(
                        &mut conn.stream,
                        Token(conn_id),
                        Interest::READABLE,
                    ) {
                        debug!(conn_id, error = %e, "Failed to register connection");
                        self.close_connection(conn_id);
                        continue;
                    }

                    debug!(conn_id, peer = %conn.peer, "Accepted connection");
                }
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(ref e)
                    if e.kind() == io::ErrorKind::ConnectionAborted
                        || e.kind() == io::ErrorKind::ConnectionReset =>
                {
                    // The client gave up between arriving in the queue and
                    // being accepted.
                    debug!(error = %e, "Connection aborted before accept");
                }
                Err(e) => {
                    error!("Accept error: {}", e);
                    break;
                }
            }
        }
    }

    fn drain_signals(&mut self) {
        for signal in self.signals.pending() {
            match signal {
                SIGINT => info!("Caught SIGINT, shutting down"),
                SIGTERM => info!("Caught SIGTERM, shutting down"),
                _ => info!(signal, "Caught signal, shutting down"),
            }
            self.shutdown.request();
        }
    }

    fn handle_connection_event(
        &mut self,
        conn_id: usize,
        event: &mio::event::Event,
    ) -> io::Result<()> {
        if !self.connections.contains(conn_id) {
            return Ok(());
        }

        if event.is_readable() {
            self.handle_readable(conn_id)?;
        }

        // Re-check connection exists (may have been closed)
        if !self.connections.contains(conn_id) {
            return Ok(());
        }

        if event.is_writable() {
            self.handle_writable(conn_id)?;
        }

        Ok(())
    }

    /// First readiness on a connection: drop whatever the client sent and
    /// queue the reply. The reply is the same no matter what the request
    /// says, so nothing is parsed.
    fn handle_readable(&mut self, conn_id: usize) -> io::Result<()> {
        let conn = self
            .connections
            .get_mut(conn_id)
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "connection not found"))?;

        if conn.is_writing() {
            return Ok(()); // Response already queued
        }

        conn.discard_request(&mut self.scratch)?;

        let response = response::render(&conn.peer);
        trace!(conn_id, len = response.len(), "Queued response");
        conn.start_writing(response);

        self.finish_write(conn_id)
    }

    fn handle_writable(&mut self, conn_id: usize) -> io::Result<()> {
        let conn = self
            .connections
            .get_mut(conn_id)
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "connection not found"))?;

        if !conn.is_writing() {
            return Ok(()); // Not in writing state
        }

        self.finish_write(conn_id)
    }

    /// Flush as much of the queued response as the socket accepts. A full
    /// flush closes the connection; a partial one re-arms it for writable.
    fn finish_write(&mut self, conn_id: usize) -> io::Result<()> {
        let conn = self
            .connections
            .get_mut(conn_id)
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "connection not found"))?;

        match conn.write_pending()? {
            WriteProgress::Done => {
                self.close_connection(conn_id);
                Ok(())
            }
            WriteProgress::Pending => {
                self.poll.registry().reregister(
                    &mut conn.stream,
                    Token(conn_id),
                    Interest::WRITABLE,
                )?;
                Ok(())
            }
        }
    }

    fn close_connection(&mut self, conn_id: usize) {
        if let Some(mut conn) = self.connections.try_remove(conn_id) {
            let _ = self.poll.registry().deregister(&mut conn.stream);
            debug!(conn_id, peer = %conn.peer, "Connection closed");
        }
    }

    /// Orderly teardown: every accepted connection first, then the
    /// listener.
    fn close_all(&mut self) {
        let open = self.connections.len();
        if open > 0 {
            info!(open, "Closing remaining connections");
        }
        for (conn_id, conn) in self.connections.iter_mut() {
            let _ = self.poll.registry().deregister(&mut conn.stream);
            debug!(conn_id, "Connection closed");
        }
        self.connections.clear();

        let _ = self.poll.registry().deregister(&mut self.listener);
        info!("Listener closed");
    }
}
