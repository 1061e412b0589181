//! Readiness-based runtime for the ip-echo server.
//!
//! A single-threaded event loop built on mio: epoll on Linux, kqueue on
//! macOS. One poll instance multiplexes the listening socket, accepted
//! client connections, the shutdown signal source, and a cross-thread
//! waker.

mod connection;
mod event_loop;
mod listener;
mod shutdown;

pub(crate) use connection::{Connection, WriteProgress};

pub use event_loop::EventLoop;
pub use shutdown::ShutdownHandle;

use crate::config::Config;

/// Run the server until a shutdown signal arrives.
pub fn run(config: Config) -> std::io::Result<()> {
    EventLoop::bind(&config)?.run()
}
