//! Connection limits and buffer sizes.

/// Settings shared by server and client connections.
///
/// ```
/// use micro_duplex::config::ConnectionConfig;
///
/// let config = ConnectionConfig::builder().max_body_size(Some(1024)).max_pipelined(4).build();
/// assert_eq!(config.max_body_size, Some(1024));
/// ```
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Largest accepted header section, in bytes (default: 8 KiB).
    pub max_header_bytes: usize,

    /// Largest accepted number of header fields (default: 64).
    pub max_headers: usize,

    /// Largest accepted inbound body (default: 10 MiB). `None` disables the limit.
    pub max_body_size: Option<u64>,

    /// Body bytes the connection reads ahead before any consumer reported consumption
    /// (default: 64 KiB).
    pub initial_demand: u64,

    /// Inbound messages in flight before the server stops reading new heads (default: 16).
    pub max_pipelined: usize,

    /// Initial capacity of the read buffer (default: 8 KiB).
    pub read_buffer_size: usize,

    /// Buffered output after which a write is flushed (default: 8 KiB).
    pub write_buffer_size: usize,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            max_header_bytes: 8 * 1024,
            max_headers: 64,
            max_body_size: Some(10 * 1024 * 1024),
            initial_demand: 64 * 1024,
            max_pipelined: 16,
            read_buffer_size: 8 * 1024,
            write_buffer_size: 8 * 1024,
        }
    }
}

impl ConnectionConfig {
    pub fn builder() -> ConnectionConfigBuilder {
        ConnectionConfigBuilder { config: ConnectionConfig::default() }
    }
}

#[derive(Debug)]
pub struct ConnectionConfigBuilder {
    config: ConnectionConfig,
}

impl ConnectionConfigBuilder {
    pub fn max_header_bytes(mut self, max_header_bytes: usize) -> Self {
        self.config.max_header_bytes = max_header_bytes;
        self
    }

    pub fn max_headers(mut self, max_headers: usize) -> Self {
        self.config.max_headers = max_headers;
        self
    }

    pub fn max_body_size(mut self, max_body_size: Option<u64>) -> Self {
        self.config.max_body_size = max_body_size;
        self
    }

    pub fn initial_demand(mut self, initial_demand: u64) -> Self {
        self.config.initial_demand = initial_demand;
        self
    }

    /// At least one message is always allowed.
    pub fn max_pipelined(mut self, max_pipelined: usize) -> Self {
        self.config.max_pipelined = max_pipelined.max(1);
        self
    }

    pub fn read_buffer_size(mut self, read_buffer_size: usize) -> Self {
        self.config.read_buffer_size = read_buffer_size;
        self
    }

    pub fn write_buffer_size(mut self, write_buffer_size: usize) -> Self {
        self.config.write_buffer_size = write_buffer_size;
        self
    }

    pub fn build(self) -> ConnectionConfig {
        self.config
    }
}
