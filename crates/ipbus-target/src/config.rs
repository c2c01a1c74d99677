use std::time::Duration;

/// Default target address.
pub const DEFAULT_ADDRESS: &str = "172.20.75.180";

/// UDP port IPbus targets listen on.
pub const DEFAULT_PORT: u16 = 50001;

/// How long one exchange waits for its reply.
pub const DEFAULT_RESPONSE_TIMEOUT: Duration = Duration::from_millis(100);

/// Heartbeat interval.
pub const DEFAULT_UPDATE_PERIOD: Duration = Duration::from_millis(1000);

/// Configuration for a target session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetConfig {
    /// Host name or IPv4 address of the target.
    pub address: String,
    /// Remote UDP port.
    pub port: u16,
    /// Local UDP port to bind; an ephemeral port is used when `None` or
    /// when the requested port is taken.
    pub local_port: Option<u16>,
    /// Bounded wait for each reply datagram.
    pub response_timeout: Duration,
    /// Interval between heartbeat ticks.
    pub update_period: Duration,
    /// Stop the heartbeat after any reported error until `reconnect`.
    /// Off by default, so an offline target is re-polled on every tick.
    pub pause_heartbeat_on_error: bool,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            address: DEFAULT_ADDRESS.to_string(),
            port: DEFAULT_PORT,
            local_port: None,
            response_timeout: DEFAULT_RESPONSE_TIMEOUT,
            update_period: DEFAULT_UPDATE_PERIOD,
            pause_heartbeat_on_error: false,
        }
    }
}

impl TargetConfig {
    /// Config for `address` with every other field at its default.
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            ..Self::default()
        }
    }

    /// Override the remote port.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Request a specific local port.
    pub fn with_local_port(mut self, port: Option<u16>) -> Self {
        self.local_port = port;
        self
    }

    /// Override the reply timeout.
    pub fn with_response_timeout(mut self, timeout: Duration) -> Self {
        self.response_timeout = timeout;
        self
    }

    /// Override the heartbeat interval.
    pub fn with_update_period(mut self, period: Duration) -> Self {
        self.update_period = period;
        self
    }

    /// Pause the heartbeat after errors.
    pub fn with_pause_heartbeat_on_error(mut self, pause: bool) -> Self {
        self.pause_heartbeat_on_error = pause;
        self
    }
}
