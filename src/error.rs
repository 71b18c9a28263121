//! Startup errors.
//!
//! Per-request failures never reach these types; they are converted to an
//! HTTP status inside the handlers. Everything here aborts the process
//! with a non-zero exit.

use std::path::PathBuf;

use thiserror::Error;

use crate::rules::acl::AclError;
use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("certificate file {0} does not exist")]
    CertificateMissing(PathBuf),

    #[error("failed to load TLS material: {0}")]
    Tls(#[source] std::io::Error),

    #[error("failed to open log file {path}: {source}")]
    LogFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid backend URL {url}: {reason}")]
    InvalidBackend { url: String, reason: String },

    #[error(transparent)]
    Acl(#[from] AclError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("failed to install metrics recorder: {0}")]
    Metrics(String),

    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("no proxy endpoints configured")]
    NoEndpoints,

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        source: std::io::Error,
    },
}
