/// A planned byte range of the source file, `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkSpec {
    /// 0-based position in the plan.
    pub index: u32,
    pub start: u64,
    pub end: u64,
}

impl ChunkSpec {
    /// Number of bytes covered by this range.
    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// A chunk of file data ready for transfer.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub spec: ChunkSpec,
    /// Raw chunk data.
    pub data: Vec<u8>,
    /// SHA-256 hex checksum of `data`.
    pub checksum: String,
}

impl Chunk {
    pub fn index(&self) -> u32 {
        self.spec.index
    }

    /// Size of this chunk in bytes.
    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }
}
