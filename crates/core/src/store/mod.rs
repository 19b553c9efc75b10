// Durable layout and storage access for outline documents.

pub mod file;
pub mod guard;
pub mod history;
pub mod items;
pub mod memory;
pub mod schema;

pub use guard::{CheckedOut, CheckoutPolicy, ConnectionGuard};
pub use history::{HistoryEntry, NewEntry};
pub use memory::MemoryDocument;
