//! Modbus TCP transport layer
//!
//! Frames requests with an MBAP header, performs one request/response
//! exchange at a time over a single `TcpStream`, and reports raw failures.
//! The transport never retries and never reconnects on its own: after any
//! I/O failure or timeout the socket is dropped and the next request fails
//! with [`ModbusError::NotConnected`] until the owner calls `connect` again.

use std::future::Future;
use std::time::Duration;

use bytes::{BufMut, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::constants::{MAX_MBAP_LENGTH, MBAP_HEADER_LEN, MODBUS_PROTOCOL_ID};
use crate::error::{ModbusError, ModbusResult};
use crate::logging::{log_packet, PacketDirection};
use crate::pdu::ModbusPdu;
use crate::protocol::{ModbusRequest, ModbusResponse, UnitId};

/// Counters for one transport instance
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransportStats {
    pub requests_sent: u64,
    pub responses_received: u64,
    pub errors: u64,
    pub timeouts: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
}

/// Frame-level transport: one request in, one response out.
///
/// Implementations are driven through `&mut self`; the register client puts
/// the transport behind a mutex so exchanges are serialized.
pub trait ModbusTransport: Send + Sync {
    /// Establish the session if it is not already up
    fn connect(&mut self) -> impl Future<Output = ModbusResult<()>> + Send;

    /// Send a request and wait for its response
    fn request(
        &mut self,
        request: &ModbusRequest,
    ) -> impl Future<Output = ModbusResult<ModbusResponse>> + Send;

    /// Whether a session is currently open
    fn is_connected(&self) -> bool;

    /// Close the session
    fn close(&mut self) -> impl Future<Output = ModbusResult<()>> + Send;

    /// Transport counters
    fn get_stats(&self) -> TransportStats;
}

/// Modbus TCP transport over a lazily opened `TcpStream`
#[derive(Debug)]
pub struct TcpTransport {
    endpoint: String,
    stream: Option<TcpStream>,
    timeout: Duration,
    next_transaction_id: u16,
    stats: TransportStats,
    packet_logging: bool,
}

impl TcpTransport {
    /// Create a transport for `host:port`. No connection is made yet.
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Self {
        Self {
            endpoint: endpoint.into(),
            stream: None,
            timeout,
            next_transaction_id: 1,
            stats: TransportStats::default(),
            packet_logging: false,
        }
    }

    /// Remote endpoint
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Per-operation timeout
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Enable or disable hex tracing of every frame
    pub fn set_packet_logging(&mut self, enabled: bool) {
        self.packet_logging = enabled;
    }

    fn next_transaction_id(&mut self) -> u16 {
        let id = self.next_transaction_id;
        self.next_transaction_id = self.next_transaction_id.wrapping_add(1);
        id
    }

    fn timeout_ms(&self) -> u64 {
        self.timeout.as_millis() as u64
    }

    fn drop_connection(&mut self, reason: &ModbusError) {
        if self.stream.take().is_some() {
            warn!("Dropping connection to {}: {}", self.endpoint, reason);
        }
    }
}

/// Encode `request` as a complete MBAP frame
pub fn encode_frame(transaction_id: u16, request: &ModbusRequest) -> ModbusResult<BytesMut> {
    let pdu = request.to_pdu()?;
    let mut frame = BytesMut::with_capacity(MBAP_HEADER_LEN + 1 + pdu.len());
    frame.put_u16(transaction_id);
    frame.put_u16(MODBUS_PROTOCOL_ID);
    frame.put_u16((pdu.len() + 1) as u16);
    frame.put_u8(request.unit_id);
    frame.put_slice(pdu.as_slice());
    Ok(frame)
}

/// Raw response frame: header fields plus the bytes after the unit id
struct RawFrame {
    transaction_id: u16,
    unit_id: UnitId,
    pdu: Vec<u8>,
}

async fn exchange(stream: &mut TcpStream, frame: &[u8]) -> ModbusResult<RawFrame> {
    stream.write_all(frame).await?;

    // [Transaction ID(2)][Protocol ID(2)][Length(2)] then [Unit ID(1)][PDU(N)]
    let mut header = [0u8; MBAP_HEADER_LEN];
    stream.read_exact(&mut header).await?;

    let transaction_id = u16::from_be_bytes([header[0], header[1]]);
    let protocol_id = u16::from_be_bytes([header[2], header[3]]);
    let length = u16::from_be_bytes([header[4], header[5]]) as usize;

    if protocol_id != MODBUS_PROTOCOL_ID {
        return Err(ModbusError::protocol(format!(
            "Invalid protocol id {}",
            protocol_id
        )));
    }
    // Unit id + at least a function code
    if !(2..=MAX_MBAP_LENGTH).contains(&length) {
        return Err(ModbusError::protocol(format!(
            "Invalid MBAP length {}",
            length
        )));
    }

    let mut body = vec![0u8; length];
    stream.read_exact(&mut body).await?;

    Ok(RawFrame {
        transaction_id,
        unit_id: body[0],
        pdu: body.split_off(1),
    })
}

impl ModbusTransport for TcpTransport {
    async fn connect(&mut self) -> ModbusResult<()> {
        if self.stream.is_some() {
            return Ok(());
        }

        debug!("TCP connecting: {}", self.endpoint);
        match timeout(self.timeout, TcpStream::connect(&self.endpoint)).await {
            Ok(Ok(stream)) => {
                if let Err(e) = stream.set_nodelay(true) {
                    debug!("TCP_NODELAY: {}", e);
                }
                info!("Connected to {}", self.endpoint);
                self.stream = Some(stream);
                Ok(())
            }
            Ok(Err(e)) => Err(ModbusError::connection(format!(
                "Failed to connect to {}: {}",
                self.endpoint, e
            ))),
            Err(_) => {
                self.stats.timeouts += 1;
                Err(ModbusError::timeout(
                    format!("Connection to {}", self.endpoint),
                    self.timeout_ms(),
                ))
            }
        }
    }

    async fn request(&mut self, request: &ModbusRequest) -> ModbusResult<ModbusResponse> {
        if self.stream.is_none() {
            return Err(ModbusError::NotConnected);
        }

        let transaction_id = self.next_transaction_id();
        let frame = encode_frame(transaction_id, request)?;
        let timeout_ms = self.timeout_ms();

        if self.packet_logging {
            log_packet(PacketDirection::Sent, &self.endpoint, &frame);
        }

        let outcome = match self.stream.as_mut() {
            Some(stream) => timeout(self.timeout, exchange(stream, &frame)).await,
            None => return Err(ModbusError::NotConnected),
        };
        self.stats.requests_sent += 1;
        self.stats.bytes_sent += frame.len() as u64;

        let raw = match outcome {
            Ok(Ok(raw)) => raw,
            Ok(Err(e)) => {
                self.stats.errors += 1;
                self.drop_connection(&e);
                return Err(e);
            }
            Err(_) => {
                let e = ModbusError::timeout(
                    format!(
                        "FC{:02X} at {} on {}",
                        request.function.to_u8(),
                        request.address,
                        self.endpoint
                    ),
                    timeout_ms,
                );
                self.stats.timeouts += 1;
                self.drop_connection(&e);
                return Err(e);
            }
        };

        self.stats.responses_received += 1;
        self.stats.bytes_received += (MBAP_HEADER_LEN + 1 + raw.pdu.len()) as u64;

        if self.packet_logging {
            log_packet(PacketDirection::Received, &self.endpoint, &raw.pdu);
        }

        if raw.transaction_id != transaction_id {
            let e = ModbusError::protocol(format!(
                "Transaction id mismatch: sent {}, received {}",
                transaction_id, raw.transaction_id
            ));
            self.stats.errors += 1;
            self.drop_connection(&e);
            return Err(e);
        }
        if raw.unit_id != request.unit_id {
            debug!(
                "Unit id {} answered request for unit {}",
                raw.unit_id, request.unit_id
            );
        }

        let response = ModbusPdu::from_slice(&raw.pdu)
            .and_then(|pdu| ModbusResponse::from_pdu(raw.unit_id, pdu))
            .and_then(|response| {
                if response.function == request.function {
                    Ok(response)
                } else {
                    Err(ModbusError::protocol(format!(
                        "Response FC{:02X} to request FC{:02X}",
                        response.function.to_u8(),
                        request.function.to_u8()
                    )))
                }
            });

        // Exceptions leave the session in step; anything else means it is not
        if let Err(e) = &response {
            self.stats.errors += 1;
            if e.is_connectivity_error() {
                self.drop_connection(e);
            }
        }
        response
    }

    fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    async fn close(&mut self) -> ModbusResult<()> {
        if let Some(mut stream) = self.stream.take() {
            info!("Closing connection to {}", self.endpoint);
            stream.shutdown().await?;
        }
        Ok(())
    }

    fn get_stats(&self) -> TransportStats {
        self.stats
    }
}
