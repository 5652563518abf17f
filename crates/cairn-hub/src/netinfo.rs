//! Local address discovery for the QR/info endpoints.
//!
//! Connecting a UDP socket selects the interface the default route would
//! use without sending a single packet; its local address is the IPv4
//! the rest of the LAN can reach us on.

use std::net::{IpAddr, Ipv4Addr, UdpSocket};

/// Best-guess LAN IPv4 of this host. Falls back to loopback when the
/// host has no route out (still correct for single-machine testing).
pub fn local_ipv4() -> IpAddr {
    probe().unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST))
}

fn probe() -> Option<IpAddr> {
    let socket = UdpSocket::bind("0.0.0.0:0").ok()?;
    socket.connect("8.8.8.8:80").ok()?;
    let addr = socket.local_addr().ok()?;
    match addr.ip() {
        IpAddr::V4(ip) if !ip.is_unspecified() => Some(IpAddr::V4(ip)),
        _ => None,
    }
}
