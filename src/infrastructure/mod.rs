//! Infrastructure layer: concrete implementations of the domain ports.
//!
//! Two store backends share one locking discipline: the always-available
//! in-memory tables and, behind the `storage-rocksdb` feature, a durable
//! RocksDB store. Credential hashing and the logging notifier live here
//! as well.

pub mod credentials;
pub mod in_memory;
mod locks;
pub mod notify;
#[cfg(feature = "storage-rocksdb")]
pub mod rocksdb;
