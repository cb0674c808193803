//! Object storage used for chunk artifacts and merged uploads.
//!
//! [`ObjectStore`] is the contract both sides of the pipeline talk to: the
//! upload client puts chunks, the reassembler streams them back, writes the
//! merged artifact through a staging writer and publishes it with
//! [`ObjectStore::move_object`]. [`FsObjectStore`] implements the contract on
//! a local directory.

mod error;
mod fs;
mod store;

pub use error::StorageError;
pub use fs::FsObjectStore;
pub use store::{ObjectReader, ObjectStore, ObjectWriter, PutOptions, StoreFuture};
