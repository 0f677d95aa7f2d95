use super::ServerNetworkLayer;
use crate::config::ConnectionConfig;
use crate::framing::{MessageFramer, RawFramer};

use std::sync::Arc;

/// Builder for a [`ServerNetworkLayer`].
///
/// # Examples
///
/// ```rust,no_run
/// use uanet::{ConnectionConfig, RawFramer, ServerNetworkLayerBuilder};
///
/// let mut layer = ServerNetworkLayerBuilder::new(4840)
///     .config(ConnectionConfig::default())
///     .framer(RawFramer)
///     .build();
///
/// layer.start().expect("listen on 4840");
/// ```
pub struct ServerNetworkLayerBuilder {
    port: u16,
    config: ConnectionConfig,
    framer: Arc<dyn MessageFramer>,
}

impl ServerNetworkLayerBuilder {
    /// Starts a builder listening on `port`, with the standard connection
    /// configuration and the [`RawFramer`]. Port `0` picks a free port at
    /// start.
    pub fn new(port: u16) -> Self {
        Self {
            port,
            config: ConnectionConfig::default(),
            framer: Arc::new(RawFramer),
        }
    }

    /// Local buffer limits given to every accepted connection.
    ///
    /// # Panics
    ///
    /// Panics if `config.recv_buffer_size == 0`.
    pub fn config(mut self, config: ConnectionConfig) -> Self {
        assert!(config.recv_buffer_size > 0, "recv_buffer_size must be > 0");

        self.config = config;
        self
    }

    /// Framing collaborator called after every successful receive.
    pub fn framer(mut self, framer: impl MessageFramer + 'static) -> Self {
        self.framer = Arc::new(framer);
        self
    }

    /// Builds the layer. Nothing is bound until
    /// [`start`](ServerNetworkLayer::start).
    pub fn build(self) -> ServerNetworkLayer {
        ServerNetworkLayer::new(self.port, self.config, self.framer)
    }
}
