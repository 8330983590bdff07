//! Adapters implementing the domain ports.

pub mod credential;
pub mod digital_twins;
pub mod in_memory;
#[cfg(feature = "storage-rocksdb")]
pub mod rocksdb;
