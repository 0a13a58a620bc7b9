//! Job store implementations.

pub mod job;
pub mod memory;

pub use job::{JobRecord, PgJobStore};
pub use memory::MemoryJobStore;
