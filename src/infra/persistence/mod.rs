// Snapshot store backends.

#[cfg(test)]
pub mod in_memory;
pub mod json_snapshot_store;
pub mod sqlite_snapshot_store;

#[cfg(test)]
pub use in_memory::InMemorySnapshotStore;
pub use json_snapshot_store::JsonSnapshotStore;
pub use sqlite_snapshot_store::SqliteSnapshotStore;
