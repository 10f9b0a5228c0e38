//! [`PeerId`] and [`FileId`]: 64-bit identifiers, never zero (§3).

use sha2::{Digest, Sha256};

/// A peer's stable identifier, persisted in the per-client UUID file.
/// `0` is reserved for "invalid / absent" and is never a valid id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PeerId(u64);

/// A file's identifier: the big-endian first 8 bytes of a SHA-256 over
/// the file's content. `0` is reserved for "invalid / absent".
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FileId(u64);

macro_rules! id_newtype {
    ($ty:ident) => {
        impl $ty {
            pub const INVALID: $ty = $ty(0);

            pub const fn new(v: u64) -> Self {
                $ty(v)
            }

            pub const fn get(self) -> u64 {
                self.0
            }

            pub const fn is_valid(self) -> bool {
                self.0 != 0
            }
        }

        impl std::fmt::Display for $ty {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{:016x}", self.0)
            }
        }

        impl std::str::FromStr for $ty {
            type Err = std::num::ParseIntError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let s = s.strip_prefix("0x").unwrap_or(s);
                Ok($ty(u64::from_str_radix(s, 16)?))
            }
        }

        impl From<u64> for $ty {
            fn from(v: u64) -> Self {
                $ty(v)
            }
        }

        impl From<$ty> for u64 {
            fn from(v: $ty) -> Self {
                v.0
            }
        }
    };
}

id_newtype!(PeerId);
id_newtype!(FileId);

impl FileId {
    /// Derives a [`FileId`] from the big-endian first 8 bytes of a
    /// SHA-256 digest of `content`.
    pub fn from_content(content: &[u8]) -> Self {
        let digest = Sha256::digest(content);
        let mut buf = [0u8; 8];
        buf.copy_from_slice(&digest[..8]);
        FileId(u64::from_be_bytes(buf))
    }

    /// Incrementally hashes a file, reading it in fixed-size blocks, so
    /// large files are never fully loaded into memory. Used by the
    /// `index` client command.
    pub fn from_reader(mut r: impl std::io::Read) -> std::io::Result<Self> {
        let mut hasher = Sha256::new();
        let mut buf = [0u8; 64 * 1024];
        loop {
            let n = r.read(&mut buf)?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
        }
        let digest = hasher.finalize();
        let mut out = [0u8; 8];
        out.copy_from_slice(&digest[..8]);
        Ok(FileId(u64::from_be_bytes(out)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_id_is_stable_for_same_content() {
        let a = FileId::from_content(b"hello world");
        let b = FileId::from_content(b"hello world");
        assert_eq!(a, b);
        assert!(a.is_valid());
    }

    #[test]
    fn file_id_differs_for_different_content() {
        let a = FileId::from_content(b"a");
        let b = FileId::from_content(b"b");
        assert_ne!(a, b);
    }

    #[test]
    fn from_reader_matches_from_content() {
        let data = b"the quick brown fox jumps over the lazy dog".repeat(10_000);
        let from_mem = FileId::from_content(&data);
        let from_read = FileId::from_reader(std::io::Cursor::new(&data)).unwrap();
        assert_eq!(from_mem, from_read);
    }

    #[test]
    fn display_and_parse_roundtrip() {
        let id = PeerId::new(0x0102030405060708);
        let s = id.to_string();
        let parsed: PeerId = s.parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn invalid_is_zero() {
        assert!(!PeerId::INVALID.is_valid());
        assert!(!FileId::INVALID.is_valid());
    }
}
