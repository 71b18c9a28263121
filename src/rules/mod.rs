//! Declarative request/response rules.
//!
//! Two rule families share this module: header rewrite rules applied to
//! upstream responses, and ACL rules applied to inbound requests at the
//! entry point.

pub mod acl;
pub mod header;

use std::net::IpAddr;

use axum::http::{HeaderMap, Method, Uri};

/// The request fields rule evaluation and attack heuristics look at.
///
/// Borrowed from the live request so evaluation never clones bodies.
pub struct RequestMeta<'a> {
    pub method: &'a Method,
    pub uri: &'a Uri,
    pub headers: &'a HeaderMap,
    pub remote_ip: IpAddr,
}
