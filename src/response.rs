//! HTTP response assembly.
//!
//! Every request gets the same answer: a minimal HTTP/1.1 response whose
//! body is the peer's IP address rendered as text.

use bytes::BytesMut;
use std::net::{IpAddr, SocketAddr};

/// Render the peer address the way a human expects to read it: IPv4 and
/// IPv4-mapped IPv6 peers as dotted decimal, everything else as canonical
/// IPv6 notation.
pub fn client_ip_text(peer: &SocketAddr) -> String {
    match peer.ip() {
        IpAddr::V4(v4) => v4.to_string(),
        IpAddr::V6(v6) => match v6.to_ipv4_mapped() {
            Some(v4) => v4.to_string(),
            None => v6.to_string(),
        },
    }
}

/// Assemble the complete HTTP/1.1 response for a peer. The body is exactly
/// the address text, so Content-Length is its byte length and no trailing
/// newline is appended.
pub fn render(peer: &SocketAddr) -> BytesMut {
    let body = client_ip_text(peer);
    let head = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nContent-Length: {}\r\n\r\n",
        body.len()
    );

    let mut response = BytesMut::with_capacity(head.len() + body.len());
    response.extend_from_slice(head.as_bytes());
    response.extend_from_slice(body.as_bytes());
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{Ipv4Addr, Ipv6Addr, SocketAddrV4, SocketAddrV6};

    fn v4_peer(addr: Ipv4Addr) -> SocketAddr {
        SocketAddr::V4(SocketAddrV4::new(addr, 49152))
    }

    fn v6_peer(addr: Ipv6Addr) -> SocketAddr {
        SocketAddr::V6(SocketAddrV6::new(addr, 49152, 0, 0))
    }

    #[test]
    fn test_ipv4_text() {
        let peer = v4_peer(Ipv4Addr::new(203, 0, 113, 7));
        assert_eq!(client_ip_text(&peer), "203.0.113.7");
    }

    #[test]
    fn test_ipv4_mapped_text() {
        let mapped = Ipv4Addr::new(203, 0, 113, 7).to_ipv6_mapped();
        assert_eq!(client_ip_text(&v6_peer(mapped)), "203.0.113.7");
    }

    #[test]
    fn test_ipv6_text() {
        let addr: Ipv6Addr = "2001:db8::1".parse().unwrap();
        assert_eq!(client_ip_text(&v6_peer(addr)), "2001:db8::1");
    }

    #[test]
    fn test_render_ipv4() {
        let response = render(&v4_peer(Ipv4Addr::new(203, 0, 113, 7)));
        assert_eq!(
            &response[..],
            b"HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nContent-Length: 11\r\n\r\n203.0.113.7"
                as &[u8]
        );
    }

    #[test]
    fn test_render_ipv6() {
        let addr: Ipv6Addr = "2001:db8::1".parse().unwrap();
        let response = render(&v6_peer(addr));
        let text = std::str::from_utf8(&response).unwrap();
        assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(text.contains("Content-Length: 11\r\n"));
        assert!(text.ends_with("\r\n\r\n2001:db8::1"));
    }

    #[test]
    fn test_no_trailing_newline() {
        let response = render(&v4_peer(Ipv4Addr::LOCALHOST));
        assert!(response.ends_with(b"127.0.0.1"));
    }
}
