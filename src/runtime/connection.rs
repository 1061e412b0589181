//! Connection state machine for accepted client sockets.
//!
//! Each connection moves through exactly one exchange: wait for the client
//! to send something, queue the response, flush it, close.

use bytes::BytesMut;
use mio::net::TcpStream;
use std::io::{self, Read, Write};
use std::net::SocketAddr;

/// Current state of a connection.
#[derive(Debug)]
pub enum ConnState {
    /// Waiting for the client to send its request bytes.
    AwaitingRequest,
    /// Writing response data.
    Writing {
        /// Full response to deliver.
        response: BytesMut,
        /// Bytes already written.
        written: usize,
    },
}

/// Progress of a pending response write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteProgress {
    /// The whole response has been flushed to the socket.
    Done,
    /// The socket stopped accepting bytes; wait for the next writable event.
    Pending,
}

/// A single client connection.
#[derive(Debug)]
pub struct Connection {
    pub stream: TcpStream,
    pub peer: SocketAddr,
    state: ConnState,
}

impl Connection {
    /// Create a new connection awaiting its request.
    pub fn new(stream: TcpStream, peer: SocketAddr) -> Self {
        Self {
            stream,
            peer,
            state: ConnState::AwaitingRequest,
        }
    }

    /// Queue a response and transition to writing.
    pub fn start_writing(&mut self, response: BytesMut) {
        self.state = ConnState::Writing {
            response,
            written: 0,
        };
    }

    pub fn is_writing(&self) -> bool {
        matches!(self.state, ConnState::Writing { .. })
    }

    /// Read whatever request bytes have arrived and drop them. The reply
    /// never depends on the request, but unread data left in the socket at
    /// close time makes the kernel reset the connection, discarding the
    /// response in flight. A single read clears at most `scratch.len()`
    /// bytes, enough for any ordinary request head; a client sending more
    /// than that can still lose the response to a reset.
    pub fn discard_request(&mut self, scratch: &mut [u8]) -> io::Result<()> {
        match self.stream.read(scratch) {
            // 0 means the client shut down its sending half; it can still
            // receive the response.
            Ok(_) => Ok(()),
            Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => Ok(()),
            Err(ref e) if e.kind() == io::ErrorKind::Interrupted => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Push pending response bytes to the socket. Loops until the response
    /// is fully flushed or the socket signals it would block.
    pub fn write_pending(&mut self) -> io::Result<WriteProgress> {
        loop {
            let (response, written) = match &mut self.state {
                ConnState::Writing { response, written } => (response, written),
                ConnState::AwaitingRequest => return Ok(WriteProgress::Done),
            };

            if *written >= response.len() {
                return Ok(WriteProgress::Done);
            }

            match self.stream.write(&response[*written..]) {
                Ok(0) => {
                    return Err(io::Error::new(io::ErrorKind::WriteZero, "write returned 0"));
                }
                Ok(n) => *written += n,
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => {
                    return Ok(WriteProgress::Pending);
                }
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
    }
}
