//! Local mutations of the link collection

mod handler;

pub use handler::{AddOutcome, LinkActions};
