//! Publishers: the consuming half of the pipeline.
//!
//! Exactly one variant runs per agent, selected by the configured mode:
//! the HTTP worker pool or the single gRPC stream publisher.

pub mod grpc;
pub mod http;

/// Bare `host:port` becomes an http:// URL; explicit schemes pass through.
fn normalize_http_host(host: &str) -> String {
    if host.starts_with("http://") || host.starts_with("https://") {
        host.to_string()
    } else {
        format!("http://{host}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_adds_scheme_only_when_missing() {
        assert_eq!(normalize_http_host("localhost:8080"), "http://localhost:8080");
        assert_eq!(normalize_http_host("http://srv:1"), "http://srv:1");
        assert_eq!(normalize_http_host("https://srv:1"), "https://srv:1");
    }
}
