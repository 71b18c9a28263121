//! TLS termination material.
//!
//! # Responsibilities
//! - Resolve the certificate pair from flags or the working directory
//! - Load it into a rustls config shared by every listener
//!
//! # Design Decisions
//! - rustls only, no OpenSSL dependency
//! - rustls negotiates TLS 1.2 or newer by default, which is the floor
//!   every listener must hold
//! - A missing certificate is fatal at startup, never at accept time

use std::path::{Path, PathBuf};

use axum_server::tls_rustls::RustlsConfig;

use crate::error::StartupError;

pub const DEFAULT_CERT: &str = "server.crt";
pub const DEFAULT_KEY: &str = "server.key";

/// Pick the certificate pair: explicit flags when both are given,
/// otherwise `server.crt`/`server.key` in the working directory. Either
/// way the files must exist.
pub fn resolve_certificates(
    cert: Option<&Path>,
    key: Option<&Path>,
) -> Result<(PathBuf, PathBuf), StartupError> {
    let (cert, key) = match (cert, key) {
        (Some(cert), Some(key)) => (cert.to_path_buf(), key.to_path_buf()),
        _ => (PathBuf::from(DEFAULT_CERT), PathBuf::from(DEFAULT_KEY)),
    };

    for path in [&cert, &key] {
        if !path.exists() {
            return Err(StartupError::CertificateMissing(path.clone()));
        }
    }
    Ok((cert, key))
}

/// Load the PEM pair into a config shareable across all listeners.
pub async fn load_rustls_config(cert: &Path, key: &Path) -> Result<RustlsConfig, StartupError> {
    RustlsConfig::from_pem_file(cert, key)
        .await
        .map_err(StartupError::Tls)
}
