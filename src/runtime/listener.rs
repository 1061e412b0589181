//! Listening socket construction.

use mio::net::TcpListener;
use socket2::{Domain, Protocol, Socket, Type};
use std::io;
use std::net::{Ipv6Addr, SocketAddr, SocketAddrV6};

/// Create the dual-stack listening socket.
///
/// Binds `[::]:port` with IPV6_V6ONLY disabled so one descriptor accepts
/// both IPv6 and IPv4 clients; IPv4 peers surface as IPv4-mapped IPv6
/// addresses. The socket is made non-blocking before `listen` so accept
/// never stalls the event loop.
pub fn create_listener(port: u16, backlog: i32) -> io::Result<TcpListener> {
    let addr = SocketAddr::V6(SocketAddrV6::new(Ipv6Addr::UNSPECIFIED, port, 0, 0));

    let socket = Socket::new(Domain::IPV6, Type::STREAM, Some(Protocol::TCP))?;
    socket.set_only_v6(false)?;
    socket.set_reuse_address(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    socket.listen(backlog)?;

    Ok(TcpListener::from_std(socket.into()))
}
