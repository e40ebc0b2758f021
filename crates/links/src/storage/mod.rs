//! Storage traits and implementations
//!
//! Records live behind the `LinkStore` trait so the sync engine works the
//! same against the in-memory and SQLite backends. Sync progress (cursor and
//! push registration) lives behind `CursorStore`, separate from the records.

mod cursor;
mod memory;
mod sqlite;
mod traits;

pub use cursor::{CursorStore, FileCursorStore, InMemoryCursorStore};
pub use memory::InMemoryLinkStore;
pub use sqlite::SqliteLinkStore;
pub use traits::{
    ChangeListener, ChangeNotifier, LinkFilter, LinkOrder, LinkStore, StoreChange, UpsertOutcome,
};
