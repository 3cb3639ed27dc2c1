//! Register-level client for the charger
//!
//! [`RegisterTransport`] is the seam between the polling/control logic and
//! the wire. It speaks in register blocks and single-register writes, nothing
//! else. [`ModbusTcpClient`] implements it on top of any frame-level
//! [`ModbusTransport`], normally a [`TcpTransport`].
//!
//! All methods take `&self`. The underlying transport sits behind one
//! `tokio::sync::Mutex`, so the scheduler, a control write and a manual
//! refresh never interleave their frames on the socket.
//!
//! ```rust,no_run
//! use amtron_modbus::{ModbusTcpClient, RegisterBlock, RegisterTransport};
//! use std::time::Duration;
//!
//! # async fn example() -> amtron_modbus::ModbusResult<()> {
//! let client = ModbusTcpClient::new("192.168.1.50", 502, 1, Duration::from_secs(10));
//! client.connect().await?;
//!
//! let status = client.read_block(&RegisterBlock::single(104)).await?;
//! println!("OCPP status code: {}", status[0]);
//!
//! client.close().await?;
//! # Ok(())
//! # }
//! ```

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::debug;

use crate::error::ModbusResult;
use crate::protocol::{ModbusRequest, ModbusResponse, RegisterBlock, UnitId};
use crate::transport::{ModbusTransport, TcpTransport, TransportStats};

/// Register-level access to the device.
///
/// Errors are reported raw. Classification into register-level and
/// connectivity failures is left to the caller via
/// [`ModbusError::is_register_error`](crate::ModbusError::is_register_error).
pub trait RegisterTransport: Send + Sync {
    /// Open the session if it is not already open
    fn connect(&self) -> impl Future<Output = ModbusResult<()>> + Send;

    /// Whether the session is believed to be open
    fn is_connected(&self) -> bool;

    /// Read `block.count` holding registers starting at `block.start` (FC03)
    fn read_block(
        &self,
        block: &RegisterBlock,
    ) -> impl Future<Output = ModbusResult<Vec<u16>>> + Send;

    /// Write one holding register (FC06)
    fn write_register(
        &self,
        address: u16,
        value: u16,
    ) -> impl Future<Output = ModbusResult<()>> + Send;

    /// Close the session
    fn close(&self) -> impl Future<Output = ModbusResult<()>> + Send;
}

/// Modbus TCP client bound to one unit id
pub struct ModbusTcpClient<T: ModbusTransport = TcpTransport> {
    transport: Mutex<T>,
    unit_id: UnitId,
    connected: AtomicBool,
}

impl ModbusTcpClient<TcpTransport> {
    /// Create a client for `host:port`. The socket is opened on `connect`.
    pub fn new(host: &str, port: u16, unit_id: UnitId, timeout: Duration) -> Self {
        Self::with_transport(TcpTransport::new(format!("{}:{}", host, port), timeout), unit_id)
    }

    /// Enable or disable hex tracing of frames
    pub async fn set_packet_logging(&self, enabled: bool) {
        self.transport.lock().await.set_packet_logging(enabled);
    }

    /// Remote endpoint
    pub async fn endpoint(&self) -> String {
        self.transport.lock().await.endpoint().to_string()
    }
}

impl<T: ModbusTransport> ModbusTcpClient<T> {
    /// Wrap an existing frame transport
    pub fn with_transport(transport: T, unit_id: UnitId) -> Self {
        let connected = transport.is_connected();
        Self {
            transport: Mutex::new(transport),
            unit_id,
            connected: AtomicBool::new(connected),
        }
    }

    /// Unit id every request is addressed to
    pub fn unit_id(&self) -> UnitId {
        self.unit_id
    }

    /// Transport counters
    pub async fn stats(&self) -> TransportStats {
        self.transport.lock().await.get_stats()
    }

    /// Run one exchange under the transport lock
    async fn execute(&self, request: ModbusRequest) -> ModbusResult<ModbusResponse> {
        let mut transport = self.transport.lock().await;
        let result = transport.request(&request).await;
        self.connected
            .store(transport.is_connected(), Ordering::Release);
        result
    }
}

impl<T: ModbusTransport> RegisterTransport for ModbusTcpClient<T> {
    async fn connect(&self) -> ModbusResult<()> {
        let mut transport = self.transport.lock().await;
        let result = transport.connect().await;
        self.connected
            .store(transport.is_connected(), Ordering::Release);
        result
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    async fn read_block(&self, block: &RegisterBlock) -> ModbusResult<Vec<u16>> {
        let request = ModbusRequest::read_holding_registers(self.unit_id, block);
        let response = self.execute(request).await?;
        let words = response.parse_registers(block.count)?;
        debug!("Read block {}: {} words", block, words.len());
        Ok(words)
    }

    async fn write_register(&self, address: u16, value: u16) -> ModbusResult<()> {
        let request = ModbusRequest::write_single_register(self.unit_id, address, value);
        let response = self.execute(request).await?;
        response.verify_write_echo(address, value)?;
        debug!("Wrote register {} = {}", address, value);
        Ok(())
    }

    async fn close(&self) -> ModbusResult<()> {
        let mut transport = self.transport.lock().await;
        let result = transport.close().await;
        self.connected.store(false, Ordering::Release);
        result
    }
}

impl<T: ModbusTransport> std::fmt::Debug for ModbusTcpClient<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModbusTcpClient")
            .field("unit_id", &self.unit_id)
            .field("connected", &self.is_connected())
            .finish()
    }
}
