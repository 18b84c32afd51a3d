//! Instance configuration.

use crate::transport::LocalNetwork;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;
use std::sync::Arc;
use tidal_core::Tuple;
use tidal_incremental::EvalConfig;

/// Splits the messages received on one channel into `(accepted, postponed)`.
/// Accepted messages are delivered this tick, postponed ones are offered
/// again on the next tick, and anything else is dropped.
pub type ChannelFilter = Arc<dyn Fn(&str, Vec<Tuple>) -> (Vec<Tuple>, Vec<Tuple>) + Send + Sync>;

/// How channel messages leave the instance.
#[derive(Clone, Debug, Default)]
pub enum TransportConfig {
    /// A private in-process network; only self-addressed messages arrive.
    #[default]
    Loopback,
    /// A shared in-process network.
    Local(LocalNetwork),
    /// UDP datagrams.
    Udp,
}

/// Options of one instance.
#[derive(Clone)]
pub struct Options {
    pub ip: IpAddr,
    /// Port to bind; 0 picks a free one.
    pub port: u16,
    /// Name for log output.
    pub tag: Option<String>,
    /// Rescan and invalidate everything on every tick.
    pub safe_mode: bool,
    /// Directory of the file-backed stores; `None` keeps persistent
    /// collections in memory.
    pub dbm_dir: Option<PathBuf>,
    /// Drop stored contents when the stores are opened.
    pub truncate_storage: bool,
    pub channel_filter: Option<ChannelFilter>,
    pub transport: TransportConfig,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            ip: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: 0,
            tag: None,
            safe_mode: false,
            dbm_dir: None,
            truncate_storage: false,
            channel_filter: None,
            transport: TransportConfig::Loopback,
        }
    }
}

impl fmt::Debug for Options {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Options")
            .field("ip", &self.ip)
            .field("port", &self.port)
            .field("tag", &self.tag)
            .field("safe_mode", &self.safe_mode)
            .field("dbm_dir", &self.dbm_dir)
            .field("truncate_storage", &self.truncate_storage)
            .field("channel_filter", &self.channel_filter.is_some())
            .field("transport", &self.transport)
            .finish()
    }
}

impl Options {
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults overlaid with `TIDAL_SAFE` and `TIDAL_PORT`.
    pub fn from_env() -> Self {
        Self::default().with_env(|key| std::env::var(key).ok())
    }

    /// Overlays the environment knobs read through `var`.
    pub fn with_env(mut self, var: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(v) = var("TIDAL_SAFE") {
            self.safe_mode = matches!(v.trim(), "1" | "true" | "yes");
        }
        if let Some(v) = var("TIDAL_PORT") {
            match v.trim().parse::<u16>() {
                Ok(port) => self.port = port,
                Err(e) => tracing::warn!(value = %v, error = %e, "ignoring TIDAL_PORT"),
            }
        }
        self
    }

    pub fn ip(mut self, ip: IpAddr) -> Self {
        self.ip = ip;
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    pub fn safe_mode(mut self, on: bool) -> Self {
        self.safe_mode = on;
        self
    }

    pub fn dbm_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.dbm_dir = Some(dir.into());
        self
    }

    pub fn truncate_storage(mut self, on: bool) -> Self {
        self.truncate_storage = on;
        self
    }

    pub fn channel_filter<F>(mut self, filter: F) -> Self
    where
        F: Fn(&str, Vec<Tuple>) -> (Vec<Tuple>, Vec<Tuple>) + Send + Sync + 'static,
    {
        self.channel_filter = Some(Arc::new(filter));
        self
    }

    pub fn transport(mut self, transport: TransportConfig) -> Self {
        self.transport = transport;
        self
    }

    /// Evaluator settings derived from these options.
    pub fn eval_config(&self) -> EvalConfig {
        EvalConfig::new().safe_mode(self.safe_mode)
    }

    pub(crate) fn label(&self) -> &str {
        self.tag.as_deref().unwrap_or("tidal")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let o = Options::default();
        assert_eq!(o.ip, IpAddr::V4(Ipv4Addr::LOCALHOST));
        assert_eq!(o.port, 0);
        assert!(!o.safe_mode);
        assert!(o.dbm_dir.is_none());
        assert!(matches!(o.transport, TransportConfig::Loopback));
        assert_eq!(o.label(), "tidal");
    }

    #[test]
    fn test_env_overlay() {
        let o = Options::new().with_env(|k| match k {
            "TIDAL_SAFE" => Some(String::from("1")),
            "TIDAL_PORT" => Some(String::from("4100")),
            _ => None,
        });
        assert!(o.safe_mode);
        assert_eq!(o.port, 4100);
        assert!(o.eval_config().safe_mode);
    }

    #[test]
    fn test_bad_port_ignored() {
        let o = Options::new()
            .port(7)
            .with_env(|k| (k == "TIDAL_PORT").then(|| String::from("not-a-port")));
        assert_eq!(o.port, 7);
    }

    #[test]
    fn test_builder() {
        let o = Options::new()
            .tag("node-a")
            .truncate_storage(true)
            .dbm_dir("/tmp/tidal")
            .channel_filter(|_, msgs| (msgs, Vec::new()));
        assert_eq!(o.label(), "node-a");
        assert!(o.truncate_storage);
        assert!(o.channel_filter.is_some());
        assert!(format!("{:?}", o).contains("channel_filter: true"));
    }
}
