//! Connection setup.

use crate::error::ClientError;
use algol_console::Connection;
use algol_protocol::{DEFAULT_INTERFACE, DEFAULT_PORT};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpSocket;

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Console host name or address.
    pub host: String,
    /// Console port.
    pub port: u16,
    /// Connection timeout.
    pub connect_timeout: Duration,
    /// Time to wait for a reply to a request.
    pub request_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_INTERFACE.to_string(),
            port: DEFAULT_PORT,
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
        }
    }
}

impl ClientConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Default::default()
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Opens a TCP connection to the console and wraps it, not yet started.
pub(crate) async fn open(config: &ClientConfig) -> Result<Arc<Connection>, ClientError> {
    let endpoint = config.endpoint();
    tracing::debug!("Connecting to {}...", endpoint);

    let addr = tokio::net::lookup_host(&endpoint)
        .await
        .map_err(|_| ClientError::Resolve(endpoint.clone()))?
        .next()
        .ok_or_else(|| ClientError::Resolve(endpoint.clone()))?;

    let socket = if addr.is_ipv4() {
        TcpSocket::new_v4()?
    } else {
        TcpSocket::new_v6()?
    };
    socket.set_keepalive(true)?;

    let stream = tokio::time::timeout(config.connect_timeout, socket.connect(addr))
        .await
        .map_err(|_| {
            tracing::debug!("Connection timeout");
            ClientError::Timeout
        })?
        .map_err(|e| {
            tracing::debug!("Connection failed: {}", e);
            ClientError::Io(e)
        })?;

    tracing::debug!("Connected to {}", addr);
    Ok(Connection::new(stream))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.endpoint(), "127.0.0.1:60400");
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
        assert_eq!(config.request_timeout, Duration::from_secs(30));

        let config = ClientConfig::new("localhost", 6000)
            .with_connect_timeout(Duration::from_secs(1))
            .with_request_timeout(Duration::from_millis(500));
        assert_eq!(config.endpoint(), "localhost:6000");
        assert_eq!(config.connect_timeout, Duration::from_secs(1));
        assert_eq!(config.request_timeout, Duration::from_millis(500));
    }

    #[tokio::test]
    async fn test_connect_refused() {
        // Bind then drop to get a port with nothing listening.
        let port = {
            let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().port()
        };

        let result = open(&ClientConfig::new("127.0.0.1", port)).await;
        assert!(matches!(result, Err(ClientError::Io(_))));
    }
}
