//! Rotagate: rotating reverse-proxy front-end.
//!
//! # Architecture Overview
//!
//! ```text
//!              ┌────────────────────────────────────────────────────┐
//!              │                     ROTAGATE                       │
//!              │                                                    │
//!  Client ────▶│  entry (443, TLS) ──307──▶ worker :8081..:808N     │
//!              │        │                      │  pipeline:         │
//!              │        │ ACL / suspicion      │  admit → confirm   │
//!              │        ▼                      │  active → detect   │
//!              │   rotation registry ◀─tick──  │  → forward →       │
//!              │        │                      │  transform         │
//!              │        ▼                      ▼                    │
//!              │  coordination store ──────▶ backend web server     │
//!              │  (active_proxy, proxy_updates, proxy_requests)     │
//!              └────────────────────────────────────────────────────┘
//! ```
//!
//! The entry point redirects every request to whichever internal worker
//! is currently active; the registry rotates that choice every 10 s and
//! coordinates it through the store so all listeners agree.

// Core subsystems
pub mod config;
pub mod entry;
pub mod rotation;
pub mod store;
pub mod worker;

// Request processing
pub mod directive;
pub mod rules;
pub mod security;

// Cross-cutting concerns
pub mod admin;
pub mod error;
pub mod health;
pub mod lifecycle;
pub mod net;
pub mod observability;

pub use config::Cli;
pub use error::StartupError;
pub use rotation::{Endpoint, Registry, Rotator};
