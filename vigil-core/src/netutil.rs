//! Outbound interface detection.

/// Address of the interface the default route would use, detected once at
/// startup and embedded in every envelope.
///
/// Connecting a UDP socket selects a local address without sending a single
/// packet. When detection fails the agent sends the empty string and the
/// server falls back to the peer address.
pub fn outbound_ip() -> String {
    fn probe() -> std::io::Result<String> {
        let socket = std::net::UdpSocket::bind("0.0.0.0:0")?;
        socket.connect("8.8.8.8:80")?;
        Ok(socket.local_addr()?.ip().to_string())
    }
    probe().unwrap_or_default()
}
