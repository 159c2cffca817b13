//! Notification bridge configuration.

use std::time::Duration;

use clap::Parser;

/// Default websocket bind host.
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Default websocket bind port.
pub const DEFAULT_PORT: u16 = 8080;

/// Default resource API host probed for path existence.
pub const DEFAULT_API_HOST: &str = "127.0.0.1";

/// Default resource API port probed for path existence.
pub const DEFAULT_API_PORT: u16 = 5000;

/// Default URL publishers push changes to.
pub const DEFAULT_BROKER_INGRESS: &str = "tcp://127.0.0.1:6380";

/// Default URL subscriber handles dial.
pub const DEFAULT_BROKER_EGRESS: &str = "tcp://127.0.0.1:6381";

/// Default maximum number of concurrent subscriber handles.
pub const DEFAULT_MAX_SUBSCRIBERS: usize = 1024;

/// Default wait for a free subscriber handle, in milliseconds.
pub const DEFAULT_ACQUIRE_TIMEOUT_MS: u64 = 5_000;

/// Default delay between broker polls, in milliseconds.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 100;

/// Default existence probe timeout, in milliseconds.
pub const DEFAULT_PROBE_TIMEOUT_MS: u64 = 5_000;

/// Notification bridge command line arguments.
#[derive(Debug, Parser)]
#[command(name = "saladbar-notify")]
#[command(version, about = "Streams resource change notifications to websocket clients")]
pub struct Args {
    /// Address to bind the websocket server to.
    #[arg(long, default_value = DEFAULT_HOST)]
    pub host: String,

    /// Port to bind the websocket server to.
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Host of the resource API used to check that channels exist.
    #[arg(long, default_value = DEFAULT_API_HOST)]
    pub api_host: String,

    /// Port of the resource API used to check that channels exist.
    #[arg(long, default_value_t = DEFAULT_API_PORT)]
    pub api_port: u16,

    /// Existence probe timeout (ms).
    #[arg(long, default_value_t = DEFAULT_PROBE_TIMEOUT_MS)]
    pub probe_timeout_ms: u64,

    /// Broker URL publishers push changes to.
    #[arg(long, default_value = DEFAULT_BROKER_INGRESS)]
    pub broker_ingress: String,

    /// Broker URL subscribers receive changes from.
    #[arg(long, default_value = DEFAULT_BROKER_EGRESS)]
    pub broker_egress: String,

    /// Run the broker relay inside this process.
    #[arg(long, default_value_t = false)]
    pub embedded_relay: bool,

    /// Maximum concurrent subscriber handles.
    #[arg(long, default_value_t = DEFAULT_MAX_SUBSCRIBERS)]
    pub max_subscribers: usize,

    /// Time (ms) a new connection waits for a free subscriber handle.
    #[arg(long, default_value_t = DEFAULT_ACQUIRE_TIMEOUT_MS)]
    pub acquire_timeout_ms: u64,

    /// Delay (ms) between broker polls when no event is pending.
    #[arg(long, default_value_t = DEFAULT_POLL_INTERVAL_MS)]
    pub poll_interval_ms: u64,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

/// Notification bridge configuration.
#[derive(Debug, Clone)]
pub struct NotifyConfig {
    /// Websocket bind host.
    pub host: String,
    /// Websocket bind port.
    pub port: u16,
    /// Resource API host.
    pub api_host: String,
    /// Resource API port.
    pub api_port: u16,
    /// Existence probe timeout.
    pub probe_timeout: Duration,
    /// Broker URL publishers push to.
    pub broker_ingress: String,
    /// Broker URL subscribers dial.
    pub broker_egress: String,
    /// Whether to run the relay in-process.
    pub embedded_relay: bool,
    /// Maximum concurrent subscriber handles.
    pub max_subscribers: usize,
    /// Wait for a free subscriber handle.
    pub acquire_timeout: Duration,
    /// Delay between broker polls.
    pub poll_interval: Duration,
}

impl NotifyConfig {
    /// Set the websocket bind address.
    pub fn with_listen(mut self, host: impl Into<String>, port: u16) -> Self {
        self.host = host.into();
        self.port = port;
        self
    }

    /// Set the resource API address.
    pub fn with_api(mut self, host: impl Into<String>, port: u16) -> Self {
        self.api_host = host.into();
        self.api_port = port;
        self
    }

    /// Set the broker ingress and egress URLs.
    pub fn with_broker(mut self, ingress: impl Into<String>, egress: impl Into<String>) -> Self {
        self.broker_ingress = ingress.into();
        self.broker_egress = egress.into();
        self
    }

    /// Run the relay in-process.
    pub fn with_embedded_relay(mut self) -> Self {
        self.embedded_relay = true;
        self
    }

    /// Set the maximum number of concurrent subscriber handles.
    pub fn with_max_subscribers(mut self, max: usize) -> Self {
        self.max_subscribers = max.max(1);
        self
    }

    /// Set the subscriber acquire timeout.
    pub fn with_acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    /// Set the broker poll interval.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Set the existence probe timeout.
    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    /// Websocket listen address.
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Base URL of the resource API.
    pub fn api_base_url(&self) -> String {
        format!("http://{}:{}", self.api_host, self.api_port)
    }
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            api_host: DEFAULT_API_HOST.to_string(),
            api_port: DEFAULT_API_PORT,
            probe_timeout: Duration::from_millis(DEFAULT_PROBE_TIMEOUT_MS),
            broker_ingress: DEFAULT_BROKER_INGRESS.to_string(),
            broker_egress: DEFAULT_BROKER_EGRESS.to_string(),
            embedded_relay: false,
            max_subscribers: DEFAULT_MAX_SUBSCRIBERS,
            acquire_timeout: Duration::from_millis(DEFAULT_ACQUIRE_TIMEOUT_MS),
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
        }
    }
}

impl From<Args> for NotifyConfig {
    fn from(args: Args) -> Self {
        Self {
            host: args.host,
            port: args.port,
            api_host: args.api_host,
            api_port: args.api_port,
            probe_timeout: Duration::from_millis(args.probe_timeout_ms),
            broker_ingress: args.broker_ingress,
            broker_egress: args.broker_egress,
            embedded_relay: args.embedded_relay,
            max_subscribers: args.max_subscribers.max(1),
            acquire_timeout: Duration::from_millis(args.acquire_timeout_ms),
            poll_interval: Duration::from_millis(args.poll_interval_ms),
        }
    }
}
