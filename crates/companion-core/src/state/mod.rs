// # State Store Implementations
//
// - `FileStateStore`: durable JSON document
// - `MemoryStateStore`: volatile, for disabled persistence and tests

pub mod file;
pub mod memory;

pub use file::FileStateStore;
pub use memory::MemoryStateStore;
