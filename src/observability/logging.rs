//! Structured logging.
//!
//! Two append-only sinks: `proxy.log` receives everything, `requests.log`
//! receives only the per-request access lines (events with the `requests`
//! target). `-v` mirrors the general stream to stdout.

use std::fs::{File, OpenOptions};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::http::{Method, Uri};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{filter, fmt, EnvFilter, Layer};

use crate::error::StartupError;

/// Target routing access lines into `requests.log`.
pub const REQUEST_TARGET: &str = "requests";

pub const GENERAL_LOG: &str = "proxy.log";
pub const REQUEST_LOG: &str = "requests.log";

fn open_append(path: &Path) -> Result<File, StartupError> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|source| StartupError::LogFile {
            path: PathBuf::from(path),
            source,
        })
}

/// Initialize the subscriber stack. Call once, before any other subsystem
/// logs.
pub fn init(verbose: bool) -> Result<(), StartupError> {
    let general_file = open_append(Path::new(GENERAL_LOG))?;
    let request_file = open_append(Path::new(REQUEST_LOG))?;

    let general_layer = fmt::layer()
        .with_ansi(false)
        .with_writer(Arc::new(general_file))
        .with_filter(filter::filter_fn(|meta| meta.target() != REQUEST_TARGET));

    let request_layer = fmt::layer()
        .with_ansi(false)
        .with_writer(Arc::new(request_file))
        .with_filter(filter::filter_fn(|meta| meta.target() == REQUEST_TARGET));

    let stdout_layer = verbose.then(|| {
        fmt::layer().with_filter(filter::filter_fn(|meta| meta.target() != REQUEST_TARGET))
    });

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(general_layer)
        .with(request_layer)
        .with(stdout_layer)
        .init();
    Ok(())
}

/// Write one access line to `requests.log`.
pub fn log_request(method: &Method, uri: &Uri, remote: SocketAddr) {
    tracing::info!(target: "requests", method = %method, uri = %uri, remote = %remote, "request");
}
