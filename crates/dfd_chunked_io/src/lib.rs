//! Chunked file I/O (spec §4.3). Deliberately synchronous: chunk
//! boundaries are known in advance and every write targets a disjoint
//! byte range or a disjoint per-chunk file, so there's nothing here for
//! an async runtime to buy us. Callers on the async side run these
//! through `tokio::task::spawn_blocking`.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use dfd_core::CHUNK_SIZE;

#[derive(thiserror::Error, Debug)]
pub enum ChunkIoError {
    #[error("chunk file already exists: {0}")]
    ChunkAlreadyExists(PathBuf),
    #[error("chunk 0 is required to exist before assembly can start: {0}")]
    MissingFirstChunk(PathBuf),
    #[error("io error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

type Result<T> = std::result::Result<T, ChunkIoError>;

fn io(path: &Path, source: std::io::Error) -> ChunkIoError {
    ChunkIoError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// `⌈size / CHUNK_SIZE⌉`, with `num_chunks(0) == 0`.
pub const fn num_chunks(size: u64) -> u64 {
    if size == 0 {
        return 0;
    }
    size.div_ceil(CHUNK_SIZE)
}

/// The on-disk name of the per-chunk file for `index` of `base_name`.
pub fn chunk_file_name(base_name: &str, index: u64) -> String {
    format!("{base_name}->{index}")
}

fn chunk_path(dir: &Path, base_name: &str, index: u64) -> PathBuf {
    dir.join(chunk_file_name(base_name, index))
}

/// Reads bytes `[index*CHUNK_SIZE, min((index+1)*CHUNK_SIZE, file_size))`
/// from `path`. Used by the seeder (C4), which serves straight out of
/// the original file rather than a pre-split copy.
pub fn package_chunk(path: &Path, index: u64) -> Result<Vec<u8>> {
    let mut file = File::open(path).map_err(|e| io(path, e))?;
    let file_size = file.metadata().map_err(|e| io(path, e))?.len();
    let start = index * CHUNK_SIZE;
    if start >= file_size {
        return Ok(Vec::new());
    }
    let end = ((index + 1) * CHUNK_SIZE).min(file_size);
    let len = (end - start) as usize;
    file.seek(SeekFrom::Start(start)).map_err(|e| io(path, e))?;
    let mut buf = vec![0u8; len];
    file.read_exact(&mut buf).map_err(|e| io(path, e))?;
    Ok(buf)
}

/// Writes `payload` to the per-chunk file for `index`. Fails if that
/// chunk file already exists — distinct chunks address disjoint byte
/// ranges and distinct files, so a pre-existing file means a logic bug
/// upstream, not a legitimate overwrite.
pub fn unpack_chunk(dir: &Path, base_name: &str, index: u64, payload: &[u8]) -> Result<()> {
    let path = chunk_path(dir, base_name, index);
    let mut f = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&path)
        .map_err(|e| {
            if e.kind() == std::io::ErrorKind::AlreadyExists {
                ChunkIoError::ChunkAlreadyExists(path.clone())
            } else {
                io(&path, e)
            }
        })?;
    f.write_all(payload).map_err(|e| io(&path, e))?;
    Ok(())
}

/// Consumes chunk 0 (which must already exist), creates the destination
/// file populated with chunk 0's bytes, deletes the chunk-0 file and
/// returns a handle further chunks can be merged into via
/// [`merge_chunk`].
pub fn open_assembly(dir: &Path, base_name: &str) -> Result<File> {
    let chunk0_path = chunk_path(dir, base_name, 0);
    let payload = std::fs::read(&chunk0_path)
        .map_err(|_| ChunkIoError::MissingFirstChunk(chunk0_path.clone()))?;

    let dest_path = dir.join(base_name);
    let mut dest = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(&dest_path)
        .map_err(|e| io(&dest_path, e))?;
    dest.write_all(&payload).map_err(|e| io(&dest_path, e))?;
    std::fs::remove_file(&chunk0_path).map_err(|e| io(&chunk0_path, e))?;
    Ok(dest)
}

/// Seeks `handle` to `index * CHUNK_SIZE`, writes the chunk's payload,
/// then deletes the per-chunk file. Safe to call concurrently for
/// distinct `index` values on distinct handles to the same path, but
/// `handle` itself must be owned by a single caller at a time (§4.5:
/// the assembly writer is touched by a single thread).
pub fn merge_chunk(handle: &mut File, dir: &Path, base_name: &str, index: u64) -> Result<()> {
    let chunk_path = chunk_path(dir, base_name, index);
    let payload = std::fs::read(&chunk_path).map_err(|e| io(&chunk_path, e))?;
    handle
        .seek(SeekFrom::Start(index * CHUNK_SIZE))
        .map_err(|e| io(dir, e))?;
    handle.write_all(&payload).map_err(|e| io(dir, e))?;
    std::fs::remove_file(&chunk_path).map_err(|e| io(&chunk_path, e))?;
    Ok(())
}

/// Removes any leftover per-chunk files for `base_name`, used when a
/// download session aborts partway through (§4.5 failure semantics).
pub fn cleanup_partial_chunks(dir: &Path, base_name: &str, total_chunks: u64) {
    for index in 0..total_chunks {
        let path = chunk_path(dir, base_name, index);
        let _ = std::fs::remove_file(&path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn num_chunks_matches_spec_examples() {
        assert_eq!(num_chunks(0), 0);
        assert_eq!(num_chunks(1), 1);
        assert_eq!(num_chunks(CHUNK_SIZE), 1);
        assert_eq!(num_chunks(CHUNK_SIZE + 1), 2);
    }

    #[test]
    fn split_then_assemble_roundtrips_bytewise() {
        let dir = tempfile::tempdir().unwrap();
        let src_path = dir.path().join("source.bin");
        let data: Vec<u8> = (0..(CHUNK_SIZE * 2 + 123))
            .map(|i| (i % 251) as u8)
            .collect();
        std::fs::write(&src_path, &data).unwrap();

        let total = num_chunks(data.len() as u64);
        assert_eq!(total, 3);

        for idx in 0..total {
            let chunk = package_chunk(&src_path, idx).unwrap();
            unpack_chunk(dir.path(), "dest.bin", idx, &chunk).unwrap();
        }

        let mut handle = open_assembly(dir.path(), "dest.bin").unwrap();
        for idx in 1..total {
            merge_chunk(&mut handle, dir.path(), "dest.bin", idx).unwrap();
        }
        drop(handle);

        let assembled = std::fs::read(dir.path().join("dest.bin")).unwrap();
        assert_eq!(assembled, data);

        for idx in 0..total {
            assert!(!dir.path().join(chunk_file_name("dest.bin", idx)).exists());
        }
    }

    #[test]
    fn unpack_chunk_rejects_duplicate_write() {
        let dir = tempfile::tempdir().unwrap();
        unpack_chunk(dir.path(), "f", 0, b"abc").unwrap();
        let err = unpack_chunk(dir.path(), "f", 0, b"xyz").unwrap_err();
        assert!(matches!(err, ChunkIoError::ChunkAlreadyExists(_)));
    }

    #[test]
    fn open_assembly_requires_chunk_zero() {
        let dir = tempfile::tempdir().unwrap();
        let err = open_assembly(dir.path(), "f").unwrap_err();
        assert!(matches!(err, ChunkIoError::MissingFirstChunk(_)));
    }

    #[test]
    fn merge_ordering_is_irrelevant() {
        let dir = tempfile::tempdir().unwrap();
        let data: Vec<u8> = (0..(CHUNK_SIZE * 3)).map(|i| (i % 256) as u8).collect();
        for idx in 0..3u64 {
            let start = (idx * CHUNK_SIZE) as usize;
            let end = start + CHUNK_SIZE as usize;
            unpack_chunk(dir.path(), "f", idx, &data[start..end]).unwrap();
        }
        let mut handle = open_assembly(dir.path(), "f").unwrap();
        // merge out of order: 2 then 1
        merge_chunk(&mut handle, dir.path(), "f", 2).unwrap();
        merge_chunk(&mut handle, dir.path(), "f", 1).unwrap();
        drop(handle);
        let assembled = std::fs::read(dir.path().join("f")).unwrap();
        assert_eq!(assembled, data);
    }
}
