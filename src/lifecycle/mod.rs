//! Process lifecycle.

pub mod shutdown;

pub use shutdown::shutdown_signal;
