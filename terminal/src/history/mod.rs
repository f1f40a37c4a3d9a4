pub mod history_storage;
pub mod memory_history_storage;
pub use history_storage::{HistoryRecord, HistoryStorage, merge_insert};
pub use memory_history_storage::MemoryHistoryStorage;
