//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Worker pipeline:
//!     → rate_limit.rs (per-worker request counters)
//!     → detection.rs (external classifier consult)
//! Entry point:
//!     → suspicion.rs (heuristic scoring + store-backed per-IP rating)
//! ```
//!
//! # Design Decisions
//! - Fail closed on the detector: transport failure refuses the request
//! - Suspicion ratings live in the coordination store so every listener
//!   sees the same score for a source IP

pub mod detection;
pub mod rate_limit;
pub mod suspicion;
