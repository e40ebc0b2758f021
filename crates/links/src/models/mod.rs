//! Domain models for the link collection

mod device;
mod link;
mod sync_cursor;
pub mod timestamp;

pub use device::DeviceState;
pub use link::{Link, LinkId};
pub use sync_cursor::SyncCursor;
