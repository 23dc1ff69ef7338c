//! Internal utilities.
//!
//! Kept minimal and dependency-free so the lab executor stays deterministic.

pub mod arena;

pub use arena::{Arena, ArenaIndex};

/// Renders a panic payload for logging. Panics carry `&str` or `String`
/// payloads in practice; anything else gets a placeholder.
pub(crate) fn panic_message(payload: &(dyn core::any::Any + Send)) -> &str {
    payload
        .downcast_ref::<&'static str>()
        .copied()
        .unwrap_or_else(|| {
            payload
                .downcast_ref::<String>()
                .map_or("<non-string panic payload>", String::as_str)
        })
}
