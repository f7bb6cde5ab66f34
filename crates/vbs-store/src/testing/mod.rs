//! Test support: in-memory backing store

mod memory_store;

pub use memory_store::MemoryBackingStore;
