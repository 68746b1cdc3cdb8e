//! UART wiring-mode detection.
//!
//! The exact byte-count thresholds distinguishing reply-mode from echo-mode
//! UART are a calibration point, not a universal constant (the spec's own
//! design notes flag this), so the heuristic lives in this one function and
//! can be bypassed by forcing a [`stm8_transport::PhysicalInterface`] from
//! the caller instead of probing.

use std::time::Duration;

use stm8_transport::Transport;

use crate::error::ProtocolError;
use crate::framing::{ACK, GET, NACK};

const SHORT_DETECTION_TIMEOUT: Duration = Duration::from_millis(50);
const LIN_REPLY_TIMEOUT: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UartMode {
    /// Separate TX/RX; the device never echoes what the host sends.
    TwoWireReply,
    /// Single wire, LIN-style; no echo, but the device is slower to answer.
    OneWireReply,
    /// Single wire; the device retransmits every byte it receives before
    /// replying.
    OneWireEcho,
}

/// Sends the GET command's activation bytes and classifies the response
/// shape. Leaves the device having already received a GET activation, so
/// the caller still owes it the remainder of the GET exchange (or should
/// treat this as the GET activation and proceed directly into reading its
/// response body).
pub fn detect_uart_mode(transport: &mut dyn Transport) -> Result<(UartMode, bool), ProtocolError> {
    let activation = [GET, !GET];
    transport
        .write_all(&activation)
        .map_err(ProtocolError::CannotSendToPort)?;

    let first = transport
        .read_byte(SHORT_DETECTION_TIMEOUT)
        .map_err(ProtocolError::SendCommandFailed)?;

    match first {
        Some(ACK) => Ok((UartMode::TwoWireReply, true)),
        Some(NACK) => Ok((UartMode::TwoWireReply, false)),
        Some(b) if b == activation[0] => {
            let second = transport
                .read_byte(SHORT_DETECTION_TIMEOUT)
                .map_err(ProtocolError::SendCommandFailed)?;
            if second != Some(activation[1]) {
                return Err(ProtocolError::CannotDetermineUartMode);
            }
            let ack = transport
                .read_byte(SHORT_DETECTION_TIMEOUT)
                .map_err(ProtocolError::SendCommandFailed)?;
            match ack {
                Some(ACK) => Ok((UartMode::OneWireEcho, true)),
                Some(NACK) => Ok((UartMode::OneWireEcho, false)),
                _ => Err(ProtocolError::CannotDetermineUartMode),
            }
        }
        None => {
            let ack = transport
                .read_byte(LIN_REPLY_TIMEOUT)
                .map_err(ProtocolError::SendCommandFailed)?;
            match ack {
                Some(ACK) => Ok((UartMode::OneWireReply, true)),
                Some(NACK) => Ok((UartMode::OneWireReply, false)),
                _ => Err(ProtocolError::CannotDetermineUartMode),
            }
        }
        _ => Err(ProtocolError::CannotDetermineUartMode),
    }
}
