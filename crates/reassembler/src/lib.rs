//! Server-side reassembly of uploaded chunks.
//!
//! A [`Reassembler`] claims one queue item at a time, streams its chunk
//! artifacts in index order into a staging object, verifies checksums and
//! the final size, and publishes the result with an atomic move. Chunk
//! artifacts are deleted only after the move succeeds, and the merge offset
//! is recorded after every chunk so a retried item resumes where the last
//! attempt stopped.
//!
//! [`ReassemblerPool`] runs several reassemblers that poll the queue until
//! cancelled.

mod config;
mod error;
mod pool;
mod worker;

pub use config::ReassemblerConfig;
pub use error::ReassemblyError;
pub use pool::ReassemblerPool;
pub use worker::{ProcessOutcome, Reassembler};

#[cfg(test)]
mod testing;
