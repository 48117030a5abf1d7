// Registry infrastructure - storage implementations of `OutreachStore`.

// Production runs use the SQLite store; the in-memory store backs tests.
#[allow(dead_code)]
mod memory_store;
mod sqlite_store;

pub use memory_store::MemoryOutreachStore;
pub use sqlite_store::SqliteOutreachStore;
