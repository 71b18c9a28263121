//! Command-line interface.

use std::path::PathBuf;

use clap::Parser;

use crate::net;
use crate::rotation::Endpoint;
use crate::security::detection::DEFAULT_DETECTION_URL;

pub const DEFAULT_PROXY_PORTS: [u16; 4] = [8081, 8082, 8083, 8084];

#[derive(Parser, Debug, Clone)]
#[command(
    name = "rotagate",
    about = "Rotating reverse-proxy front-end",
    version
)]
pub struct Cli {
    /// Public IP address the proxies are reachable on.
    #[arg(long = "ip")]
    pub ip: Option<String>,

    /// Domain name to use for the proxies (takes precedence over --ip).
    #[arg(short = 'd', long = "domain")]
    pub domain: Option<String>,

    /// Path to the TLS certificate file (PEM).
    #[arg(long = "crt")]
    pub crt: Option<PathBuf>,

    /// Path to the TLS private key file (PEM).
    #[arg(long = "key")]
    pub key: Option<PathBuf>,

    /// Backend web server URL.
    #[arg(long = "web-server", default_value = "http://127.0.0.1:5000")]
    pub web_server: String,

    /// Number of proxies to deploy in rotation.
    #[arg(long = "proxy-count", default_value_t = 4)]
    pub proxy_count: usize,

    /// Comma-separated list of ports for the proxies.
    #[arg(long = "proxy-ports", default_value = "8081,8082,8083,8084")]
    pub proxy_ports: String,

    /// Path to the header rules YAML file.
    #[arg(long = "header-rules")]
    pub header_rules: Option<PathBuf>,

    /// Path to the YAML file defining ACLs.
    #[arg(long = "acl-file")]
    pub acl_file: Option<PathBuf>,

    /// Enable the directive stream consumer.
    #[arg(long = "queue-system")]
    pub queue_system: bool,

    /// Enable the attack detection system.
    #[arg(long = "enable-detection")]
    pub enable_detection: bool,

    /// Detection service endpoint.
    #[arg(long = "detection-url", default_value = DEFAULT_DETECTION_URL)]
    pub detection_url: String,

    /// Skip upstream certificate verification.
    #[arg(long = "unsecure-cert")]
    pub unsecure_cert: bool,

    /// Enable the administrative API under /api.
    #[arg(long = "api")]
    pub api: bool,

    /// Coordination store URL; memory:// selects the in-process store.
    #[arg(long = "store-url", default_value = "redis://127.0.0.1:6379")]
    pub store_url: String,

    /// Public entry point port.
    #[arg(long = "entry-port", default_value_t = 443)]
    pub entry_port: u16,

    /// Mirror the general log to stdout.
    #[arg(short = 'v', long = "verbose")]
    pub verbose: bool,
}

impl Cli {
    /// The host clients are redirected to: domain first, then explicit
    /// IP, then whatever address the machine answers on.
    pub fn public_host(&self) -> String {
        if let Some(domain) = &self.domain {
            tracing::info!(host = %domain, "using domain as public host");
            domain.clone()
        } else if let Some(ip) = &self.ip {
            tracing::info!(host = %ip, "public IP address set manually");
            ip.clone()
        } else {
            let ip = net::detect_host_address();
            tracing::warn!(host = %ip, "no address specified, using detected host address");
            ip
        }
    }

    /// Ports for the worker listeners. An unusable list degrades to the
    /// defaults; a short list is cycled, matching the endpoint count.
    pub fn worker_ports(&self) -> Vec<u16> {
        let parsed: Vec<u16> = self
            .proxy_ports
            .split(',')
            .filter_map(|p| p.trim().parse::<u16>().ok())
            .collect();
        let ports = if parsed.is_empty() || parsed.len() < self.proxy_count {
            tracing::warn!(ports = %self.proxy_ports, "insufficient ports provided, using default ports");
            DEFAULT_PROXY_PORTS.to_vec()
        } else {
            parsed
        };
        (0..self.proxy_count)
            .map(|i| ports[i % ports.len()])
            .collect()
    }

    /// Build the endpoint set served by this process.
    pub fn endpoints(&self, host: &str) -> Vec<Endpoint> {
        self.worker_ports()
            .iter()
            .enumerate()
            .map(|(i, port)| Endpoint::new(format!("proxy{}", i + 1), host, *port))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cli(args: &[&str]) -> Cli {
        Cli::parse_from(std::iter::once("rotagate").chain(args.iter().copied()))
    }

    #[test]
    fn defaults_match_the_documented_interface() {
        let cli = cli(&[]);
        assert_eq!(cli.web_server, "http://127.0.0.1:5000");
        assert_eq!(cli.proxy_count, 4);
        assert_eq!(cli.entry_port, 443);
        assert_eq!(cli.worker_ports(), vec![8081, 8082, 8083, 8084]);
    }

    #[test]
    fn endpoints_are_numbered_from_one() {
        let cli = cli(&["--proxy-count", "2", "--proxy-ports", "9001,9002"]);
        let endpoints = cli.endpoints("proxy.example");
        assert_eq!(endpoints.len(), 2);
        assert_eq!(endpoints[0].id, "proxy1");
        assert_eq!(endpoints[0].url(), "https://proxy.example:9001");
        assert_eq!(endpoints[1].id, "proxy2");
    }

    #[test]
    fn short_port_list_falls_back_to_defaults() {
        let cli = cli(&["--proxy-count", "4", "--proxy-ports", "9001"]);
        assert_eq!(cli.worker_ports(), vec![8081, 8082, 8083, 8084]);
    }

    #[test]
    fn unparseable_port_list_falls_back_to_defaults() {
        let cli = cli(&["--proxy-ports", "eighty,eighty-one"]);
        assert_eq!(cli.worker_ports(), vec![8081, 8082, 8083, 8084]);
    }

    #[test]
    fn domain_wins_over_ip() {
        let cli = cli(&["--ip", "198.51.100.7", "-d", "proxy.example"]);
        assert_eq!(cli.public_host(), "proxy.example");
    }
}
