use std::io::SeekFrom;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tokio::io::{AsyncReadExt, AsyncSeekExt};

use crate::TransferError;
use crate::types::{Chunk, ChunkSpec};

// ---------------------------------------------------------------------------
// Checksum helpers
// ---------------------------------------------------------------------------

/// Computes SHA-256 of `data` and returns the hex-encoded digest.
pub fn checksum_bytes(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Computes SHA-256 of an entire file and returns the hex-encoded digest.
pub async fn calculate_file_checksum(path: &Path) -> Result<String, TransferError> {
    let mut file = tokio::fs::File::open(path).await?;
    let mut checksum = StreamingChecksum::new();
    let mut buf = vec![0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        checksum.update(&buf[..n]);
    }
    Ok(checksum.finalize())
}

/// Incremental SHA-256 for data that arrives in pieces.
#[derive(Default)]
pub struct StreamingChecksum {
    hasher: Sha256,
    bytes: u64,
}

impl StreamingChecksum {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, data: &[u8]) {
        self.hasher.update(data);
        self.bytes += data.len() as u64;
    }

    /// Bytes hashed so far.
    pub fn bytes(&self) -> u64 {
        self.bytes
    }

    /// Consumes the hasher and returns the hex digest.
    pub fn finalize(self) -> String {
        hex::encode(self.hasher.finalize())
    }
}

// ---------------------------------------------------------------------------
// ChunkReader
// ---------------------------------------------------------------------------

/// Reads planned byte ranges of a local file with automatic SHA-256 checksums.
///
/// Each upload worker owns its own reader so reads never contend on a shared
/// file cursor.
pub struct ChunkReader {
    file: tokio::fs::File,
    file_path: PathBuf,
    file_size: u64,
}

impl ChunkReader {
    /// Opens `path` for ranged reading.
    pub async fn open(path: &Path) -> Result<Self, TransferError> {
        let file = tokio::fs::File::open(path).await?;
        let file_size = file.metadata().await?.len();
        Ok(Self {
            file,
            file_path: path.to_path_buf(),
            file_size,
        })
    }

    /// Reads the bytes covered by `spec`.
    ///
    /// Fails with `UnexpectedEof` if the file shrank below the planned range.
    pub async fn read(&mut self, spec: ChunkSpec) -> Result<Chunk, TransferError> {
        self.file.seek(SeekFrom::Start(spec.start)).await?;
        let mut data = vec![0u8; spec.len() as usize];
        self.file.read_exact(&mut data).await?;

        let checksum = checksum_bytes(&data);
        Ok(Chunk {
            spec,
            data,
            checksum,
        })
    }

    /// Total file size in bytes at open time.
    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    pub fn path(&self) -> &Path {
        &self.file_path
    }
}
