//! Unframed UDP transport used for intra-server communication: one
//! worker message per datagram (spec §4.2). Used by the dispatcher,
//! workers and the election companion tasks.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::UdpSocket;

use crate::error::TransportError;

/// Binds a UDP socket. `port == 0` requests an ephemeral port.
pub async fn open_udp(port: u16) -> Result<(UdpSocket, u16), TransportError> {
    let sock = UdpSocket::bind(("127.0.0.1", port))
        .await
        .map_err(TransportError::Bind)?;
    let bound = sock.local_addr().map_err(TransportError::Bind)?.port();
    Ok((sock, bound))
}

/// Sends one datagram to `addr`.
pub async fn send_to(sock: &UdpSocket, addr: SocketAddr, payload: &[u8]) -> Result<(), TransportError> {
    sock.send_to(payload, addr)
        .await
        .map_err(TransportError::Write)?;
    Ok(())
}

/// Receives one datagram within `timeout`, returning its bytes and
/// sender address.
pub async fn recv_from(
    sock: &UdpSocket,
    timeout: Duration,
) -> Result<(Vec<u8>, SocketAddr), TransportError> {
    let mut buf = vec![0u8; 64 * 1024];
    match tokio::time::timeout(timeout, sock.recv_from(&mut buf)).await {
        Ok(Ok((n, from))) => {
            buf.truncate(n);
            Ok((buf, from))
        }
        Ok(Err(e)) => Err(TransportError::Read(e)),
        Err(_) => Err(TransportError::RecvTimeout(timeout)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn udp_roundtrip() {
        let (a, a_port) = open_udp(0).await.unwrap();
        let (b, _b_port) = open_udp(0).await.unwrap();
        let a_addr: SocketAddr = format!("127.0.0.1:{a_port}").parse().unwrap();

        send_to(&b, a_addr, b"ping").await.unwrap();
        let (data, _from) = recv_from(&a, Duration::from_secs(1)).await.unwrap();
        assert_eq!(data, b"ping");
    }

    #[tokio::test]
    async fn udp_recv_times_out() {
        let (a, _port) = open_udp(0).await.unwrap();
        let result = recv_from(&a, Duration::from_millis(20)).await;
        assert!(matches!(result, Err(TransportError::RecvTimeout(_))));
    }
}
