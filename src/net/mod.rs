//! Listener-side networking: TLS material and host resolution.

pub mod tls;

use std::net::UdpSocket;

/// Best-effort detection of this machine's outward-facing IPv4 address.
///
/// Opens a UDP socket toward a public resolver (no packet is sent) and
/// reads the local address the kernel picked. Falls back to loopback.
pub fn detect_host_address() -> String {
    let detected = UdpSocket::bind("0.0.0.0:0")
        .and_then(|socket| {
            socket.connect("8.8.8.8:80")?;
            socket.local_addr()
        })
        .map(|addr| addr.ip().to_string());

    match detected {
        Ok(ip) => ip,
        Err(e) => {
            tracing::warn!(error = %e, "could not detect host address, using loopback");
            "127.0.0.1".to_string()
        }
    }
}
