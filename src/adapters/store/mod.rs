//! Resource store adapters.

mod memory;

pub use memory::InMemoryStore;
