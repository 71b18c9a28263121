//! Proxy-rotation control plane.
//!
//! # Responsibilities
//! - Own the ordered set of internal proxy endpoints and the active cursor
//! - Rotate the active endpoint on a fixed tick
//! - Write the active-proxy record and announce switches on the store
//!
//! # Design Decisions
//! - Random permutation instead of round-robin so the switch pattern
//!   cannot be aligned against
//! - The endpoint list is shuffled in place, which is why the cursor and
//!   list share one mutex
//! - The registry is the only writer of `active_proxy`; every other
//!   component is a reader

pub mod registry;
pub mod rotator;

pub use registry::{Endpoint, Registry};
pub use rotator::Rotator;
