//! Logging setup and packet tracing
//!
//! The library only emits `tracing` events. Binaries call [`init`] once to
//! install a subscriber; `RUST_LOG` overrides the level passed in.

use tracing::trace;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Direction of a logged frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketDirection {
    Sent,
    Received,
}

impl PacketDirection {
    fn arrow(self) -> &'static str {
        match self {
            Self::Sent => "TX",
            Self::Received => "RX",
        }
    }
}

/// Initialize the global tracing subscriber
pub fn init(level: &str) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .try_init()?;

    Ok(())
}

/// Format bytes as space separated upper-case hex
pub fn hex_dump(data: &[u8]) -> String {
    data.iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Trace one raw frame
pub fn log_packet(direction: PacketDirection, endpoint: &str, data: &[u8]) {
    trace!(
        "{} {} [{}B]: {}",
        direction.arrow(),
        endpoint,
        data.len(),
        hex_dump(data)
    );
}
