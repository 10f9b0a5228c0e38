//! Length-framed TCP transport (spec §4.2). Every frame is an 8-byte
//! big-endian length followed by exactly that many payload bytes; the
//! payload is whatever `dfd_wire::Message::encode` produced.

use std::net::SocketAddr;
use std::time::Duration;

use byteorder::{BE, ByteOrder};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use crate::error::TransportError;

/// Frames larger than this are rejected outright; nothing in this
/// protocol legitimately sends more than one chunk per message.
pub const MAX_FRAME_LEN: usize = 64 * 1024 * 1024;

/// Binds a listener. `port == 0` requests an ephemeral port, as used by
/// peers that only need to be reachable for the duration of a seed.
pub async fn open_listener(port: u16) -> Result<(TcpListener, u16), TransportError> {
    let listener = TcpListener::bind(("0.0.0.0", port))
        .await
        .map_err(TransportError::Bind)?;
    let bound = listener.local_addr().map_err(TransportError::Bind)?.port();
    Ok((listener, bound))
}

/// Connects with an explicit timeout; success iff the handshake
/// completed within it.
pub async fn connect(addr: SocketAddr, timeout: Duration) -> Result<TcpStream, TransportError> {
    match tokio::time::timeout(timeout, TcpStream::connect(addr)).await {
        Ok(Ok(stream)) => Ok(stream),
        Ok(Err(e)) => Err(TransportError::Connect(e)),
        Err(_) => Err(TransportError::ConnectTimeout(timeout)),
    }
}

/// Writes the 8-byte length prefix and the full payload. Short writes
/// are retried internally by `write_all`; this only fails if the
/// underlying socket write errors.
pub async fn send_framed(
    stream: &mut (impl tokio::io::AsyncWrite + Unpin),
    payload: &[u8],
) -> Result<(), TransportError> {
    let mut len_buf = [0u8; 8];
    BE::write_u64(&mut len_buf, payload.len() as u64);
    stream
        .write_all(&len_buf)
        .await
        .map_err(TransportError::Write)?;
    stream
        .write_all(payload)
        .await
        .map_err(TransportError::Write)?;
    stream.flush().await.map_err(TransportError::Write)?;
    Ok(())
}

/// Reads exactly 8 length bytes then exactly that many body bytes,
/// returning the body without the length prefix. The timeout applies
/// per read call, so a peer that trickles bytes in slowly but keeps
/// making progress within each read window is not penalized overall.
pub async fn recv_framed(
    stream: &mut (impl tokio::io::AsyncRead + Unpin),
    timeout: Duration,
) -> Result<Vec<u8>, TransportError> {
    let mut len_buf = [0u8; 8];
    read_exact_timeout(stream, &mut len_buf, timeout).await?;
    let len = BE::read_u64(&len_buf);
    if len as usize > MAX_FRAME_LEN {
        return Err(TransportError::FrameTooLarge(len, MAX_FRAME_LEN));
    }
    let mut body = vec![0u8; len as usize];
    read_exact_timeout(stream, &mut body, timeout).await?;
    Ok(body)
}

async fn read_exact_timeout(
    stream: &mut (impl tokio::io::AsyncRead + Unpin),
    buf: &mut [u8],
    timeout: Duration,
) -> Result<(), TransportError> {
    match tokio::time::timeout(timeout, stream.read_exact(buf)).await {
        Ok(Ok(_)) => Ok(()),
        Ok(Err(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => Err(TransportError::Eof),
        Ok(Err(e)) => Err(TransportError::Read(e)),
        Err(_) => Err(TransportError::RecvTimeout(timeout)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn send_then_recv_framed_roundtrip() {
        let (listener, port) = open_listener(0).await.unwrap();
        let server = tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            recv_framed(&mut sock, Duration::from_secs(1)).await.unwrap()
        });

        let mut client = connect(
            format!("127.0.0.1:{port}").parse().unwrap(),
            Duration::from_secs(1),
        )
        .await
        .unwrap();
        send_framed(&mut client, b"hello frame").await.unwrap();

        let received = server.await.unwrap();
        assert_eq!(received, b"hello frame");
    }

    #[tokio::test]
    async fn recv_framed_times_out_on_silence() {
        let (listener, port) = open_listener(0).await.unwrap();
        let server = tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            recv_framed(&mut sock, Duration::from_millis(50)).await
        });

        let _client = connect(
            format!("127.0.0.1:{port}").parse().unwrap(),
            Duration::from_secs(1),
        )
        .await
        .unwrap();

        let result = server.await.unwrap();
        assert!(matches!(result, Err(TransportError::RecvTimeout(_))));
    }

    #[tokio::test]
    async fn recv_framed_rejects_oversized_length() {
        let (listener, port) = open_listener(0).await.unwrap();
        let server = tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            recv_framed(&mut sock, Duration::from_secs(1)).await
        });

        let mut client = connect(
            format!("127.0.0.1:{port}").parse().unwrap(),
            Duration::from_secs(1),
        )
        .await
        .unwrap();
        let mut len_buf = [0u8; 8];
        BE::write_u64(&mut len_buf, (MAX_FRAME_LEN as u64) + 1);
        client.write_all(&len_buf).await.unwrap();

        let result = server.await.unwrap();
        assert!(matches!(result, Err(TransportError::FrameTooLarge(_, _))));
    }
}
