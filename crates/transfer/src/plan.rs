use crate::TransferError;
use crate::types::ChunkSpec;

/// Partitions `[0, file_size)` into ordered ranges of at most `chunk_size` bytes.
///
/// The ranges are contiguous and non-overlapping, the last one ends at
/// `file_size`, and an empty file yields an empty plan.
pub fn plan(file_size: u64, chunk_size: u64) -> Result<Vec<ChunkSpec>, TransferError> {
    if chunk_size == 0 {
        return Err(TransferError::InvalidChunkSize);
    }

    let count = file_size.div_ceil(chunk_size);
    let chunks = (0..count)
        .map(|i| {
            let start = i * chunk_size;
            ChunkSpec {
                index: i as u32,
                start,
                end: (start + chunk_size).min(file_size),
            }
        })
        .collect();
    Ok(chunks)
}
