//! Identifier allocation for new links

use rand::Rng;

/// Length of a generated identifier in hex characters
pub const ID_LEN: usize = 8;

/// Generate a new link identifier
///
/// Returns 8 lowercase hex characters drawn uniformly from a 32-bit space.
/// Uniqueness is not checked here; the store ignores a duplicate insert and
/// callers surface that as a collision.
pub fn generate_id() -> String {
    let value: u32 = rand::thread_rng().r#gen();
    format!("{value:08x}")
}

/// Whether a string has the shape of a generated identifier
pub fn is_valid_id(id: &str) -> bool {
    id.len() == ID_LEN && id.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}
