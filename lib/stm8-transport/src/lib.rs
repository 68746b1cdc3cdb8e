//! Serial transport abstraction for the STM8 ROM bootloader.
//!
//! The protocol engine drives a [`Transport`] rather than `serialport`
//! directly, the same way the pack's hardware-interface-layer traits let a
//! peripheral be swapped for a test double.

use std::io::{Read, Write};
use std::time::Duration;

use thiserror::Error;

/// Physical link between the host and the bootloader. Unlike the STM32
/// bootloader family, STM8 exposes its UART pins in one of several wiring
/// modes, detected (or forced) before any command framing happens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhysicalInterface {
    /// Separate TX/RX lines; the host never sees its own bytes.
    Uart2Wire,
    /// Single wire, host RX tied to TX; the bootloader itself echoes.
    Uart1WireReply,
    /// LIN-style single wire reply, distinguished from `Uart1WireReply` by
    /// timing rather than byte content.
    LinReply,
    Spi,
}

impl std::str::FromStr for PhysicalInterface {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "uart2" | "uart2wire" | "uart-2wire" => Ok(PhysicalInterface::Uart2Wire),
            "uart1-reply" | "uart1wirereply" => Ok(PhysicalInterface::Uart1WireReply),
            "lin-reply" | "linreply" => Ok(PhysicalInterface::LinReply),
            "spi" => Ok(PhysicalInterface::Spi),
            other => Err(other.to_string()),
        }
    }
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("port is not open")]
    NotOpen,
    #[error("failed to open port {path:?}: {source}")]
    Open {
        path: String,
        #[source]
        source: serialport::Error,
    },
    #[error("read from port failed: {0}")]
    Read(#[source] std::io::Error),
    #[error("write to port failed: {0}")]
    Write(#[source] std::io::Error),
    #[error("read timed out before expected bytes arrived")]
    Timeout,
}

/// Minimal byte transport the protocol engine needs: open state, a
/// timeout-bounded read, a write, and a flush. Implemented for a real
/// serial port and for an in-memory fake used by protocol-engine tests.
pub trait Transport {
    fn write_all(&mut self, data: &[u8]) -> Result<(), TransportError>;
    fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), TransportError>;
    fn read_byte(&mut self, timeout: Duration) -> Result<Option<u8>, TransportError>;
    fn set_timeout(&mut self, timeout: Duration) -> Result<(), TransportError>;
    fn flush(&mut self) -> Result<(), TransportError>;
}

/// A real serial port, opened via `serialport`'s blocking API.
pub struct SerialTransport {
    port: Box<dyn serialport::SerialPort>,
}

impl SerialTransport {
    pub fn open(path: &str, baud: u32, timeout: Duration) -> Result<Self, TransportError> {
        let port = serialport::new(path, baud)
            .timeout(timeout)
            .data_bits(serialport::DataBits::Eight)
            .parity(serialport::Parity::Even)
            .stop_bits(serialport::StopBits::One)
            .open()
            .map_err(|source| TransportError::Open {
                path: path.to_string(),
                source,
            })?;
        Ok(Self { port })
    }
}

impl Transport for SerialTransport {
    fn write_all(&mut self, data: &[u8]) -> Result<(), TransportError> {
        self.port.write_all(data).map_err(TransportError::Write)
    }

    fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), TransportError> {
        self.port.read_exact(buf).map_err(|e| {
            if e.kind() == std::io::ErrorKind::TimedOut {
                TransportError::Timeout
            } else {
                TransportError::Read(e)
            }
        })
    }

    fn read_byte(&mut self, timeout: Duration) -> Result<Option<u8>, TransportError> {
        self.port
            .set_timeout(timeout)
            .map_err(|e| TransportError::Read(e.into()))?;
        let mut buf = [0u8; 1];
        match self.port.read(&mut buf) {
            Ok(0) => Ok(None),
            Ok(_) => Ok(Some(buf[0])),
            Err(e) if e.kind() == std::io::ErrorKind::TimedOut => Ok(None),
            Err(e) => Err(TransportError::Read(e)),
        }
    }

    fn set_timeout(&mut self, timeout: Duration) -> Result<(), TransportError> {
        self.port
            .set_timeout(timeout)
            .map_err(|e| TransportError::Read(e.into()))
    }

    fn flush(&mut self) -> Result<(), TransportError> {
        self.port.flush().map_err(TransportError::Write)
    }
}

/// In-memory fake used to drive the protocol engine in tests without a real
/// port: a caller-supplied reply queue and a record of everything written.
#[derive(Default)]
pub struct FakeTransport {
    pub written: Vec<u8>,
    pub to_read: std::collections::VecDeque<u8>,
    pub timeout: Duration,
}

impl FakeTransport {
    pub fn with_replies(bytes: &[u8]) -> Self {
        Self {
            written: Vec::new(),
            to_read: bytes.iter().copied().collect(),
            timeout: Duration::from_millis(500),
        }
    }

    pub fn push_replies(&mut self, bytes: &[u8]) {
        self.to_read.extend(bytes.iter().copied());
    }
}

impl Transport for FakeTransport {
    fn write_all(&mut self, data: &[u8]) -> Result<(), TransportError> {
        self.written.extend_from_slice(data);
        Ok(())
    }

    fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), TransportError> {
        if self.to_read.len() < buf.len() {
            return Err(TransportError::Timeout);
        }
        for slot in buf.iter_mut() {
            *slot = self.to_read.pop_front().expect("checked above");
        }
        Ok(())
    }

    fn read_byte(&mut self, _timeout: Duration) -> Result<Option<u8>, TransportError> {
        Ok(self.to_read.pop_front())
    }

    fn set_timeout(&mut self, timeout: Duration) -> Result<(), TransportError> {
        self.timeout = timeout;
        Ok(())
    }

    fn flush(&mut self) -> Result<(), TransportError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fake_transport_replays_queued_bytes() {
        let mut t = FakeTransport::with_replies(&[0x79, 0x1F]);
        let mut buf = [0u8; 2];
        t.read_exact(&mut buf).unwrap();
        assert_eq!(buf, [0x79, 0x1F]);
    }

    #[test]
    fn fake_transport_records_writes() {
        let mut t = FakeTransport::default();
        t.write_all(&[0x7F]).unwrap();
        assert_eq!(t.written, vec![0x7F]);
    }

    #[test]
    fn fake_transport_read_exact_times_out_on_short_queue() {
        let mut t = FakeTransport::with_replies(&[0x79]);
        let mut buf = [0u8; 2];
        assert!(matches!(t.read_exact(&mut buf), Err(TransportError::Timeout)));
    }

    #[test]
    fn parses_interface_names_case_insensitively() {
        use std::str::FromStr;
        assert_eq!(PhysicalInterface::from_str("UART2"), Ok(PhysicalInterface::Uart2Wire));
        assert_eq!(PhysicalInterface::from_str("lin-reply"), Ok(PhysicalInterface::LinReply));
        assert!(PhysicalInterface::from_str("rs485").is_err());
    }
}
