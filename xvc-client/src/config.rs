use std::time::Duration;

/// Connection settings shared by [`crate::XvcClient`] and [`crate::AsyncXvcClient`].
#[derive(Debug, Clone)]
pub struct Config {
    pub connect_timeout: Duration,
    pub read_write_timeout: Duration,
    /// Additional connection attempts after the first one failed
    pub connect_retries: u32,
    pub retry_delay: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            read_write_timeout: Duration::from_secs(30),
            connect_retries: 0,
            retry_delay: Duration::from_millis(500),
        }
    }
}

/// Builder to modify [Config] options
///
/// # Example
///
/// ```
/// use xvc_client::Builder;
/// use std::time::Duration;
///
/// let config = Builder::new()
///     .rw_timeout(Duration::from_secs(2))
///     .retries(3, Duration::from_millis(100))
///     .build();
/// assert_eq!(config.connect_retries, 3);
/// ```
#[derive(Default)]
pub struct Builder {
    config: Config,
}

impl Builder {
    pub fn new() -> Builder {
        Builder::default()
    }

    /// Set the timeout for a single connection attempt
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    /// Set the TCP read and write timeout
    pub fn rw_timeout(mut self, timeout: Duration) -> Self {
        self.config.read_write_timeout = timeout;
        self
    }

    /// Retry a failed connection `retries` times, waiting `delay` in between
    pub fn retries(mut self, retries: u32, delay: Duration) -> Self {
        self.config.connect_retries = retries;
        self.config.retry_delay = delay;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
