//! Connect-only validation for new connection parameters
//!
//! Opens a TCP session with the short setup timeout and closes it again. No
//! registers are read: a charger with Modbus TCP disabled still accepts the
//! socket, so this only proves the endpoint is reachable.

use thiserror::Error;
use tracing::{info, warn};

use crate::config::ChargerConfig;
use crate::transport::{ModbusTransport, TcpTransport};

/// Reasons a set of connection parameters is rejected
#[derive(Debug, Error)]
pub enum SetupError {
    /// Parameters are out of range
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The endpoint did not accept a connection in time
    #[error("cannot connect to {endpoint}: {message}")]
    CannotConnect { endpoint: String, message: String },
}

impl SetupError {
    /// Short machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            SetupError::InvalidConfig(_) => "invalid_config",
            SetupError::CannotConnect { .. } => "cannot_connect",
        }
    }
}

/// Validate `config` and check that the charger accepts a connection
pub async fn validate_connection(config: &ChargerConfig) -> Result<(), SetupError> {
    config
        .validate()
        .map_err(|e| SetupError::InvalidConfig(e.to_string()))?;

    let endpoint = config.endpoint();
    let mut transport = TcpTransport::new(endpoint.clone(), config.setup_timeout());

    if let Err(e) = transport.connect().await {
        warn!("Setup check failed for {}: {}", endpoint, e);
        return Err(SetupError::CannotConnect {
            endpoint,
            message: e.to_string(),
        });
    }

    if let Err(e) = transport.close().await {
        warn!("Closing setup connection to {}: {}", endpoint, e);
    }
    info!("Charger at {} is reachable", endpoint);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_reachable_endpoint() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let accept = tokio::spawn(async move { listener.accept().await.map(|_| ()) });

        let config = ChargerConfig {
            port,
            ..ChargerConfig::new("127.0.0.1")
        };
        validate_connection(&config).await.unwrap();
        accept.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_unreachable_endpoint() {
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().port()
        };
        let config = ChargerConfig {
            port,
            ..ChargerConfig::new("127.0.0.1")
        };
        let err = validate_connection(&config).await.unwrap_err();
        assert_eq!(err.code(), "cannot_connect");
    }

    #[tokio::test]
    async fn test_invalid_parameters_not_dialed() {
        let config = ChargerConfig {
            unit_id: 0,
            ..ChargerConfig::new("127.0.0.1")
        };
        let err = validate_connection(&config).await.unwrap_err();
        assert!(matches!(err, SetupError::InvalidConfig(_)));
        assert_eq!(err.code(), "invalid_config");
    }
}
