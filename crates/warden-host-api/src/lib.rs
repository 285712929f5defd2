//! Host adapter trait interfaces for wardend
//!
//! This crate defines the boundary between the restriction core and the
//! host session server. It contains no host code itself: presence
//! notifications flow in through `SessionLifecycle`, and checkpoint
//! capture/restore flows out through `CheckpointProvider`.

mod mock;
mod traits;

pub use mock::*;
pub use traits::*;
