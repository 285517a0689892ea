//! On-disk persistence: point-in-time snapshots and the append-only log.

pub mod aof;
pub mod snapshot;

pub use aof::AofWriter;
