use std::time::Duration;

use clap::Parser;
use url::Url;

/// Default port of the edge's tunnel listener, assumed when `--remote`
/// names a host without one.
pub const DEFAULT_TUNNEL_PORT: u16 = 8080;

/// Edge broker: accepts the origin's tunnel connection on one port and
/// public HTTP traffic on another.
#[derive(Parser, Debug, Clone)]
#[command(name = "backhaul-edge", version, about)]
pub struct EdgeConfig {
    /// Address both listeners bind on
    #[arg(long, env = "BACKHAUL_BIND", default_value = "0.0.0.0")]
    pub bind: String,

    /// Port the origin agent dials into
    #[arg(long, env = "BACKHAUL_TUNNEL_PORT", default_value_t = 8080)]
    pub tunnel_port: u16,

    /// Port serving public HTTP traffic and /health
    #[arg(long, env = "BACKHAUL_PUBLIC_PORT", default_value_t = 9090)]
    pub public_port: u16,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "BACKHAUL_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "BACKHAUL_LOG_JSON", default_value_t = false)]
    pub log_json: bool,
}

/// Origin agent: dials the edge and bridges tunnel requests to a local
/// HTTP service.
#[derive(Parser, Debug, Clone)]
#[command(name = "backhaul-origin", version, about)]
pub struct OriginConfig {
    /// host:port of the edge tunnel port (a scheme is accepted and ignored)
    #[arg(long, env = "BACKHAUL_REMOTE", default_value = "http://localhost:8080")]
    pub remote: String,

    /// Base URL of the local HTTP service requests are forwarded to
    #[arg(long, env = "BACKHAUL_LOCAL", default_value = "http://localhost:3000")]
    pub local: String,

    /// Delay between dial attempts
    #[arg(long, env = "BACKHAUL_RECONNECT", default_value = "5s", value_parser = parse_duration)]
    pub reconnect: Duration,

    /// Interval between keep-alive bytes
    #[arg(long, env = "BACKHAUL_KEEPALIVE", default_value = "10s", value_parser = parse_duration)]
    pub keepalive: Duration,

    /// Per-request timeout against the local service
    #[arg(long, env = "BACKHAUL_TIMEOUT", default_value = "30s", value_parser = parse_duration)]
    pub timeout: Duration,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "BACKHAUL_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "BACKHAUL_LOG_JSON", default_value_t = false)]
    pub log_json: bool,
}

impl OriginConfig {
    /// Dialable `host:port` of the edge tunnel listener.
    ///
    /// `--remote` accepts a bare `host:port` or a URL; any scheme is
    /// informational only. A missing port means [`DEFAULT_TUNNEL_PORT`].
    pub fn remote_addr(&self) -> anyhow::Result<String> {
        let raw = self.remote.trim();
        let url = if raw.contains("://") {
            Url::parse(raw)?
        } else {
            Url::parse(&format!("tcp://{raw}"))?
        };
        let host = url
            .host_str()
            .ok_or_else(|| anyhow::anyhow!("--remote has no host: {raw}"))?;
        let port = url.port().unwrap_or(DEFAULT_TUNNEL_PORT);
        Ok(format!("{host}:{port}"))
    }

    /// Local service base URL with no trailing slash, so request targets
    /// (which always start with `/`) append cleanly.
    pub fn local_base(&self) -> anyhow::Result<String> {
        let url = Url::parse(self.local.trim())?;
        if url.scheme() != "http" && url.scheme() != "https" {
            anyhow::bail!("--local must be an http(s) URL, got {}", self.local);
        }
        if url.host_str().is_none() {
            anyhow::bail!("--local has no host: {}", self.local);
        }
        Ok(self.local.trim().trim_end_matches('/').to_string())
    }
}

/// Parse Go-style duration strings: `500ms`, `5s`, `2m`, `1h`.
fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    let split = s
        .find(|c: char| !c.is_ascii_digit())
        .ok_or_else(|| format!("missing unit in duration {s:?} (try e.g. \"5s\")"))?;
    let (num, unit) = s.split_at(split);
    let value: u64 = num
        .parse()
        .map_err(|_| format!("invalid duration value {s:?}"))?;
    match unit {
        "ms" => Ok(Duration::from_millis(value)),
        "s" => Ok(Duration::from_secs(value)),
        "m" => Ok(Duration::from_secs(value * 60)),
        "h" => Ok(Duration::from_secs(value * 3600)),
        _ => Err(format!("unknown duration unit {unit:?} in {s:?}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn origin(remote: &str, local: &str) -> OriginConfig {
        OriginConfig::parse_from(["backhaul-origin", "--remote", remote, "--local", local])
    }

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("500ms").unwrap(), Duration::from_millis(500));
        assert_eq!(parse_duration("5s").unwrap(), Duration::from_secs(5));
        assert_eq!(parse_duration("2m").unwrap(), Duration::from_secs(120));
        assert_eq!(parse_duration("1h").unwrap(), Duration::from_secs(3600));
        assert!(parse_duration("5").is_err());
        assert!(parse_duration("s").is_err());
        assert!(parse_duration("5d").is_err());
    }

    #[test]
    fn test_defaults() {
        let cfg = OriginConfig::parse_from(["backhaul-origin"]);
        assert_eq!(cfg.remote, "http://localhost:8080");
        assert_eq!(cfg.local, "http://localhost:3000");
        assert_eq!(cfg.reconnect, Duration::from_secs(5));
        assert_eq!(cfg.keepalive, Duration::from_secs(10));
        assert_eq!(cfg.timeout, Duration::from_secs(30));

        let edge = EdgeConfig::parse_from(["backhaul-edge"]);
        assert_eq!(edge.tunnel_port, 8080);
        assert_eq!(edge.public_port, 9090);
    }

    #[test]
    fn test_remote_addr_forms() {
        let cfg = origin("http://edge.example.com:8080", "http://localhost:3000");
        assert_eq!(cfg.remote_addr().unwrap(), "edge.example.com:8080");

        let cfg = origin("edge.example.com:9000", "http://localhost:3000");
        assert_eq!(cfg.remote_addr().unwrap(), "edge.example.com:9000");

        // A URL without a port gets the tunnel default, not the scheme's.
        let cfg = origin("http://edge.example.com", "http://localhost:3000");
        assert_eq!(cfg.remote_addr().unwrap(), "edge.example.com:8080");
    }

    #[test]
    fn test_local_base_trims_slash() {
        let cfg = origin("localhost:8080", "http://localhost:3000/");
        assert_eq!(cfg.local_base().unwrap(), "http://localhost:3000");
    }

    #[test]
    fn test_local_base_rejects_non_http() {
        let cfg = origin("localhost:8080", "ftp://localhost:3000");
        assert!(cfg.local_base().is_err());
    }
}
