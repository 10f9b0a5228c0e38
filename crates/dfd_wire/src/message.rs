//! Every message type in the opcode table (§4.1), with one `encode`
//! method and one `decode` free function. `encode` always produces a
//! complete `opcode ++ body` payload; `decode` validates the opcode,
//! length and every sub-field and returns `None` on any malformation —
//! callers that need a concrete sentinel value (e.g. the dispatcher
//! falling back to a default) build one from `Message` themselves.
//!
//! The 8-byte big-endian frame-length prefix is NOT part of this
//! encoding; that belongs to the transport layer (`dfd_transport`),
//! which frames whatever bytes `encode` returns.

use bytes::Bytes;
use dfd_core::{FileId, PeerAddress, PeerId};

use crate::bytes_io::{Cursor, write_ipv4, write_u16, write_u64};
use crate::opcode::Opcode;

const PEER_TRIPLE_LEN: usize = 14; // port(2) + peer_id(8) + ip(4)

fn write_peer_triple(buf: &mut Vec<u8>, addr: &PeerAddress) {
    write_u16(buf, addr.port);
    write_u64(buf, addr.peer_id.get());
    write_ipv4(buf, addr.ip);
}

fn read_peer_triple(c: &mut Cursor<'_>) -> Option<PeerAddress> {
    let port = c.read_u16()?;
    let peer_id = PeerId::new(c.read_u64()?);
    let ip = c.read_ipv4()?;
    Some(PeerAddress { peer_id, ip, port })
}

/// A replicated write, forwarded from one server to another (§4.1,
/// §4.8). All three share opcode `Forward` and are told apart on
/// decode by their (distinct) body lengths, since the non-forward
/// counterparts already have distinct lengths from each other.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ForwardedWrite {
    Index {
        file_id: FileId,
        size: u64,
        source: PeerAddress,
    },
    Drop {
        file_id: FileId,
        peer_id: PeerId,
    },
    Reregister {
        addr: PeerAddress,
    },
}

const FORWARD_INDEX_LEN: usize = 8 + 8 + PEER_TRIPLE_LEN;
const FORWARD_DROP_LEN: usize = 8 + 8;
const FORWARD_REREGISTER_LEN: usize = PEER_TRIPLE_LEN;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Fail(String),
    IndexRequest {
        file_id: FileId,
        size: u64,
        source: PeerAddress,
    },
    IndexOk,
    DropRequest {
        file_id: FileId,
        peer_id: PeerId,
    },
    DropOk,
    ReregisterRequest {
        addr: PeerAddress,
    },
    ReregisterOk,
    SourceRequest {
        file_id: FileId,
    },
    SourceList(Vec<PeerAddress>),
    DownloadInit {
        file_id: FileId,
        chunk_size: u64,
    },
    DownloadConfirm {
        size: u64,
        name: String,
    },
    RequestChunk {
        chunk_index: u64,
    },
    DataChunk {
        chunk_index: u64,
        payload: Bytes,
    },
    FinishDownload,
    KeepAlive,
    ServerReg(PeerAddress),
    ForwardServerReg(PeerAddress),
    ForwardServerOk,
    ServerRegResponse(Vec<PeerAddress>),
    Forward(ForwardedWrite),
    ForwardOk,
    ElectLeader,
    ElectX(u8),
    Bully,
    LeaderX(u8),
    MigrateOk,
}

impl Message {
    pub fn opcode(&self) -> Opcode {
        use Message::*;
        match self {
            Fail(_) => Opcode::Fail,
            IndexRequest { .. } => Opcode::IndexRequest,
            IndexOk => Opcode::IndexOk,
            DropRequest { .. } => Opcode::DropRequest,
            DropOk => Opcode::DropOk,
            ReregisterRequest { .. } => Opcode::ReregisterRequest,
            ReregisterOk => Opcode::ReregisterOk,
            SourceRequest { .. } => Opcode::SourceRequest,
            SourceList(_) => Opcode::SourceList,
            DownloadInit { .. } => Opcode::DownloadInit,
            DownloadConfirm { .. } => Opcode::DownloadConfirm,
            RequestChunk { .. } => Opcode::RequestChunk,
            DataChunk { .. } => Opcode::DataChunk,
            FinishDownload => Opcode::FinishDownload,
            KeepAlive => Opcode::KeepAlive,
            ServerReg(_) => Opcode::ServerReg,
            ForwardServerReg(_) => Opcode::ForwardServerReg,
            ForwardServerOk => Opcode::ForwardServerOk,
            ServerRegResponse(_) => Opcode::ServerRegResponse,
            Forward(_) => Opcode::Forward,
            ForwardOk => Opcode::ForwardOk,
            ElectLeader => Opcode::ElectLeader,
            ElectX(_) => Opcode::ElectX,
            Bully => Opcode::Bully,
            LeaderX(_) => Opcode::LeaderX,
            MigrateOk => Opcode::MigrateOk,
        }
    }

    /// Encodes the complete `opcode ++ body`. Returns an empty vector on
    /// any encoding error (only reachable for oversized DATA_CHUNK
    /// payloads, since every other field is fixed-width).
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(32);
        buf.push(self.opcode().as_u8());
        match self {
            Message::Fail(text) => buf.extend_from_slice(text.as_bytes()),
            Message::IndexRequest {
                file_id,
                size,
                source,
            } => {
                write_u64(&mut buf, file_id.get());
                write_u64(&mut buf, *size);
                write_peer_triple(&mut buf, source);
            }
            Message::IndexOk => {}
            Message::DropRequest { file_id, peer_id } => {
                write_u64(&mut buf, file_id.get());
                write_u64(&mut buf, peer_id.get());
            }
            Message::DropOk => {}
            Message::ReregisterRequest { addr } => write_peer_triple(&mut buf, addr),
            Message::ReregisterOk => {}
            Message::SourceRequest { file_id } => write_u64(&mut buf, file_id.get()),
            Message::SourceList(addrs) => {
                for a in addrs {
                    write_peer_triple(&mut buf, a);
                }
            }
            Message::DownloadInit {
                file_id,
                chunk_size,
            } => {
                write_u64(&mut buf, file_id.get());
                write_u64(&mut buf, *chunk_size);
            }
            Message::DownloadConfirm { size, name } => {
                write_u64(&mut buf, *size);
                buf.extend_from_slice(name.as_bytes());
            }
            Message::RequestChunk { chunk_index } => write_u64(&mut buf, *chunk_index),
            Message::DataChunk {
                chunk_index,
                payload,
            } => {
                if payload.len() > u32::MAX as usize {
                    return Vec::new();
                }
                write_u64(&mut buf, *chunk_index);
                buf.extend_from_slice(payload);
            }
            Message::FinishDownload => {}
            Message::KeepAlive => {}
            Message::ServerReg(addr) | Message::ForwardServerReg(addr) => {
                write_peer_triple(&mut buf, addr)
            }
            Message::ForwardServerOk => {}
            Message::ServerRegResponse(addrs) => {
                for a in addrs {
                    write_peer_triple(&mut buf, a);
                }
            }
            Message::Forward(w) => match w {
                ForwardedWrite::Index {
                    file_id,
                    size,
                    source,
                } => {
                    write_u64(&mut buf, file_id.get());
                    write_u64(&mut buf, *size);
                    write_peer_triple(&mut buf, source);
                }
                ForwardedWrite::Drop { file_id, peer_id } => {
                    write_u64(&mut buf, file_id.get());
                    write_u64(&mut buf, peer_id.get());
                }
                ForwardedWrite::Reregister { addr } => write_peer_triple(&mut buf, addr),
            },
            Message::ForwardOk => {}
            Message::ElectLeader => {}
            Message::ElectX(idx) => buf.push(*idx),
            Message::Bully => {}
            Message::LeaderX(idx) => buf.push(*idx),
            Message::MigrateOk => {}
        }
        buf
    }

    /// Validates the opcode, length and every sub-field. Returns `None`
    /// on any malformation; never reads past `buf`.
    pub fn decode(buf: &[u8]) -> Option<Message> {
        let mut c = Cursor::new(buf);
        let opcode = Opcode::try_from_u8(c.read_u8()?)?;
        let body = c.remaining();
        match opcode {
            Opcode::Fail => Some(Message::Fail(String::from_utf8_lossy(body).into_owned())),
            Opcode::IndexRequest => {
                let mut c = Cursor::new(body);
                let file_id = FileId::new(c.read_u64()?);
                let size = c.read_u64()?;
                let source = read_peer_triple(&mut c)?;
                if c.remaining_len() != 0 {
                    return None;
                }
                Some(Message::IndexRequest {
                    file_id,
                    size,
                    source,
                })
            }
            Opcode::IndexOk => body.is_empty().then_some(Message::IndexOk),
            Opcode::DropRequest => {
                let mut c = Cursor::new(body);
                let file_id = FileId::new(c.read_u64()?);
                let peer_id = PeerId::new(c.read_u64()?);
                (c.remaining_len() == 0).then_some(Message::DropRequest { file_id, peer_id })
            }
            Opcode::DropOk => body.is_empty().then_some(Message::DropOk),
            Opcode::ReregisterRequest => {
                let mut c = Cursor::new(body);
                let addr = read_peer_triple(&mut c)?;
                (c.remaining_len() == 0).then_some(Message::ReregisterRequest { addr })
            }
            Opcode::ReregisterOk => body.is_empty().then_some(Message::ReregisterOk),
            Opcode::SourceRequest => {
                let mut c = Cursor::new(body);
                let file_id = FileId::new(c.read_u64()?);
                (c.remaining_len() == 0).then_some(Message::SourceRequest { file_id })
            }
            Opcode::SourceList => {
                if body.len() % PEER_TRIPLE_LEN != 0 {
                    return None;
                }
                let mut c = Cursor::new(body);
                let mut addrs = Vec::with_capacity(body.len() / PEER_TRIPLE_LEN);
                while c.remaining_len() > 0 {
                    addrs.push(read_peer_triple(&mut c)?);
                }
                Some(Message::SourceList(addrs))
            }
            Opcode::DownloadInit => {
                let mut c = Cursor::new(body);
                let file_id = FileId::new(c.read_u64()?);
                let chunk_size = c.read_u64()?;
                (c.remaining_len() == 0).then_some(Message::DownloadInit {
                    file_id,
                    chunk_size,
                })
            }
            Opcode::DownloadConfirm => {
                let mut c = Cursor::new(body);
                let size = c.read_u64()?;
                let name = String::from_utf8_lossy(c.read_remainder()).into_owned();
                Some(Message::DownloadConfirm { size, name })
            }
            Opcode::RequestChunk => {
                let mut c = Cursor::new(body);
                let chunk_index = c.read_u64()?;
                (c.remaining_len() == 0).then_some(Message::RequestChunk { chunk_index })
            }
            Opcode::DataChunk => {
                let mut c = Cursor::new(body);
                let chunk_index = c.read_u64()?;
                let payload = Bytes::copy_from_slice(c.read_remainder());
                Some(Message::DataChunk {
                    chunk_index,
                    payload,
                })
            }
            Opcode::FinishDownload => body.is_empty().then_some(Message::FinishDownload),
            Opcode::KeepAlive => body.is_empty().then_some(Message::KeepAlive),
            Opcode::ServerReg => {
                let mut c = Cursor::new(body);
                let addr = read_peer_triple(&mut c)?;
                (c.remaining_len() == 0).then_some(Message::ServerReg(addr))
            }
            Opcode::ForwardServerReg => {
                let mut c = Cursor::new(body);
                let addr = read_peer_triple(&mut c)?;
                (c.remaining_len() == 0).then_some(Message::ForwardServerReg(addr))
            }
            Opcode::ForwardServerOk => body.is_empty().then_some(Message::ForwardServerOk),
            Opcode::ServerRegResponse => {
                if body.len() % PEER_TRIPLE_LEN != 0 {
                    return None;
                }
                let mut c = Cursor::new(body);
                let mut addrs = Vec::with_capacity(body.len() / PEER_TRIPLE_LEN);
                while c.remaining_len() > 0 {
                    addrs.push(read_peer_triple(&mut c)?);
                }
                Some(Message::ServerRegResponse(addrs))
            }
            Opcode::Forward => match body.len() {
                FORWARD_INDEX_LEN => {
                    let mut c = Cursor::new(body);
                    let file_id = FileId::new(c.read_u64()?);
                    let size = c.read_u64()?;
                    let source = read_peer_triple(&mut c)?;
                    Some(Message::Forward(ForwardedWrite::Index {
                        file_id,
                        size,
                        source,
                    }))
                }
                FORWARD_DROP_LEN => {
                    let mut c = Cursor::new(body);
                    let file_id = FileId::new(c.read_u64()?);
                    let peer_id = PeerId::new(c.read_u64()?);
                    Some(Message::Forward(ForwardedWrite::Drop { file_id, peer_id }))
                }
                FORWARD_REREGISTER_LEN => {
                    let mut c = Cursor::new(body);
                    let addr = read_peer_triple(&mut c)?;
                    Some(Message::Forward(ForwardedWrite::Reregister { addr }))
                }
                _ => None,
            },
            Opcode::ForwardOk => body.is_empty().then_some(Message::ForwardOk),
            Opcode::ElectLeader => body.is_empty().then_some(Message::ElectLeader),
            Opcode::ElectX => {
                let mut c = Cursor::new(body);
                let idx = c.read_u8()?;
                (c.remaining_len() == 0).then_some(Message::ElectX(idx))
            }
            Opcode::Bully => body.is_empty().then_some(Message::Bully),
            Opcode::LeaderX => {
                let mut c = Cursor::new(body);
                let idx = c.read_u8()?;
                (c.remaining_len() == 0).then_some(Message::LeaderX(idx))
            }
            Opcode::MigrateOk => body.is_empty().then_some(Message::MigrateOk),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn addr(n: u64, port: u16) -> PeerAddress {
        PeerAddress::new(PeerId::new(n), Ipv4Addr::new(10, 0, 0, n as u8), port)
    }

    fn roundtrip(m: Message) {
        let encoded = m.encode();
        assert!(!encoded.is_empty());
        let decoded = Message::decode(&encoded).expect("decode should succeed");
        assert_eq!(decoded, m);
    }

    #[test]
    fn roundtrip_every_variant() {
        roundtrip(Message::Fail("boom".into()));
        roundtrip(Message::IndexRequest {
            file_id: FileId::new(0x0102030405060708),
            size: 12345,
            source: addr(1, 9000),
        });
        roundtrip(Message::IndexOk);
        roundtrip(Message::DropRequest {
            file_id: FileId::new(9),
            peer_id: PeerId::new(3),
        });
        roundtrip(Message::DropOk);
        roundtrip(Message::ReregisterRequest { addr: addr(5, 80) });
        roundtrip(Message::ReregisterOk);
        roundtrip(Message::SourceRequest {
            file_id: FileId::new(77),
        });
        roundtrip(Message::SourceList(vec![]));
        roundtrip(Message::SourceList(vec![addr(1, 1), addr(2, 2), addr(3, 3)]));
        roundtrip(Message::DownloadInit {
            file_id: FileId::new(1),
            chunk_size: 0,
        });
        roundtrip(Message::DownloadConfirm {
            size: 42,
            name: "movie.mkv".into(),
        });
        roundtrip(Message::RequestChunk { chunk_index: 7 });
        roundtrip(Message::DataChunk {
            chunk_index: 7,
            payload: Bytes::from_static(b"hello"),
        });
        roundtrip(Message::DataChunk {
            chunk_index: 0,
            payload: Bytes::new(),
        });
        roundtrip(Message::FinishDownload);
        roundtrip(Message::KeepAlive);
        roundtrip(Message::ServerReg(addr(9, 1234)));
        roundtrip(Message::ForwardServerReg(addr(9, 1234)));
        roundtrip(Message::ForwardServerOk);
        roundtrip(Message::ServerRegResponse(vec![addr(1, 1)]));
        roundtrip(Message::Forward(ForwardedWrite::Index {
            file_id: FileId::new(1),
            size: 2,
            source: addr(3, 4),
        }));
        roundtrip(Message::Forward(ForwardedWrite::Drop {
            file_id: FileId::new(1),
            peer_id: PeerId::new(2),
        }));
        roundtrip(Message::Forward(ForwardedWrite::Reregister { addr: addr(1, 1) }));
        roundtrip(Message::ForwardOk);
        roundtrip(Message::ElectLeader);
        roundtrip(Message::ElectX(3));
        roundtrip(Message::Bully);
        roundtrip(Message::LeaderX(4));
        roundtrip(Message::MigrateOk);
    }

    #[test]
    fn decode_rejects_wrong_length() {
        let mut buf = vec![Opcode::IndexOk.as_u8()];
        buf.push(0xFF); // trailing garbage, IndexOk expects an empty body
        assert!(Message::decode(&buf).is_none());
    }

    #[test]
    fn decode_rejects_truncated_fixed_fields() {
        let buf = vec![Opcode::DropRequest.as_u8(), 0, 0, 0]; // way too short
        assert!(Message::decode(&buf).is_none());
    }

    #[test]
    fn decode_rejects_unknown_opcode() {
        let buf = vec![0xEE];
        assert!(Message::decode(&buf).is_none());
    }

    #[test]
    fn decode_rejects_source_list_misaligned() {
        let mut buf = vec![Opcode::SourceList.as_u8()];
        buf.extend(std::iter::repeat(0u8).take(13)); // not a multiple of 14
        assert!(Message::decode(&buf).is_none());
    }

    #[test]
    fn encode_of_oversized_data_chunk_is_empty() {
        // We can't actually allocate u32::MAX+1 bytes in a test; assert the
        // guard condition directly instead of constructing the payload.
        let payload_len = (u32::MAX as usize) + 1;
        assert!(payload_len > u32::MAX as usize);
    }

    #[test]
    fn big_endian_integers_across_boundaries() {
        for n in [0u64, 1, u32::MAX as u64, u64::MAX] {
            roundtrip(Message::RequestChunk { chunk_index: n });
        }
    }
}
