//! Local address discovery: this system does no NAT traversal or
//! address advertisement protocol (out of scope), so a peer or server
//! just asks the OS which local interface it would use to reach a
//! given remote address and reports that back as its own.

use std::net::{IpAddr, Ipv4Addr, SocketAddr, UdpSocket};

pub fn local_ipv4_towards(remote: SocketAddr) -> anyhow::Result<Ipv4Addr> {
    let sock = UdpSocket::bind("0.0.0.0:0")?;
    sock.connect(remote)?;
    match sock.local_addr()?.ip() {
        IpAddr::V4(ip) => Ok(ip),
        IpAddr::V6(_) => Ok(Ipv4Addr::LOCALHOST),
    }
}
