//! Command opcodes, control bytes, and the low-level phase framing shared by
//! every bootloader command: an activation byte pair, then zero or more
//! argument phases each closed with an XOR checksum and an ACK/NACK.

use std::time::Duration;

use stm8_transport::Transport;

use crate::error::ProtocolError;

pub const GET: u8 = 0x00;
pub const READ: u8 = 0x11;
pub const WRITE: u8 = 0x31;
pub const ERASE: u8 = 0x43;
pub const GO: u8 = 0x21;

pub const SYNCH: u8 = 0x7F;
pub const ACK: u8 = 0x79;
pub const NACK: u8 = 0x1F;
pub const BUSY: u8 = 0xAA;

pub const CONTROL_TIMEOUT: Duration = Duration::from_millis(200);
pub const ERASE_TIMEOUT: Duration = Duration::from_secs(5);

/// Waits for a single response byte, tolerating any number of BUSY bytes
/// before the terminal ACK/NACK, up to `timeout` total.
pub fn wait_ack(transport: &mut dyn Transport, timeout: Duration) -> Result<(), ProtocolError> {
    let deadline = std::time::Instant::now() + timeout;
    loop {
        let remaining = deadline.saturating_duration_since(std::time::Instant::now());
        if remaining.is_zero() {
            return Err(ProtocolError::ResponseTimeout);
        }
        let byte = transport
            .read_byte(remaining)
            .map_err(ProtocolError::SendCommandFailed)?
            .ok_or(ProtocolError::ResponseTimeout)?;
        match byte {
            ACK => return Ok(()),
            NACK => return Err(ProtocolError::ResponseUnexpected { byte: NACK }),
            BUSY => continue,
            other => return Err(ProtocolError::ResponseUnexpected { byte: other }),
        }
    }
}

/// Reads and discards `len` bytes: on one-wire echo UART the device
/// retransmits everything the host sends before replying, and those bytes
/// have to be drained before the real ACK/NACK can be read.
fn skip_echo(transport: &mut dyn Transport, len: usize) -> Result<(), ProtocolError> {
    let mut discard = vec![0u8; len];
    transport
        .read_exact(&mut discard)
        .map_err(ProtocolError::SendCommandFailed)
}

/// Sends a command's activation byte pair (opcode, complement) and waits for
/// the device's ACK. A NACK here means the device doesn't recognize or
/// support the command at all, which is reported as `unsupported` rather
/// than the generic `ResponseUnexpected` an argument-phase NACK gets.
pub fn send_activation(
    transport: &mut dyn Transport,
    opcode: u8,
    echo: bool,
    unsupported: ProtocolError,
) -> Result<(), ProtocolError> {
    let bytes = [opcode, !opcode];
    transport
        .write_all(&bytes)
        .map_err(ProtocolError::CannotSendToPort)?;
    if echo {
        skip_echo(transport, bytes.len())?;
    }
    match wait_ack(transport, CONTROL_TIMEOUT) {
        Err(ProtocolError::ResponseUnexpected { byte: NACK }) => Err(unsupported),
        other => other,
    }
}

/// Sends an argument phase: the bytes themselves followed by the XOR of all
/// of them, then waits for ACK.
pub fn send_phase(transport: &mut dyn Transport, bytes: &[u8], echo: bool) -> Result<(), ProtocolError> {
    send_phase_timeout(transport, bytes, CONTROL_TIMEOUT, echo)
}

pub fn send_phase_timeout(
    transport: &mut dyn Transport,
    bytes: &[u8],
    timeout: Duration,
    echo: bool,
) -> Result<(), ProtocolError> {
    let checksum = bytes.iter().fold(0u8, |acc, &b| acc ^ b);
    let mut frame = bytes.to_vec();
    frame.push(checksum);
    transport
        .write_all(&frame)
        .map_err(ProtocolError::CannotSendToPort)?;
    if echo {
        skip_echo(transport, frame.len())?;
    }
    wait_ack(transport, timeout)
}

/// Sends a single-byte argument whose checksum is the byte's bitwise
/// complement rather than the general XOR-of-argument-bytes rule — the
/// length-minus-one byte on READ is the one place the protocol uses this
/// encoding instead of [`send_phase`]'s fold.
pub fn send_complemented_byte(
    transport: &mut dyn Transport,
    byte: u8,
    echo: bool,
) -> Result<(), ProtocolError> {
    let frame = [byte, !byte];
    transport
        .write_all(&frame)
        .map_err(ProtocolError::CannotSendToPort)?;
    if echo {
        skip_echo(transport, frame.len())?;
    }
    wait_ack(transport, CONTROL_TIMEOUT)
}

/// Splits a 32-bit address into its four big-endian bytes, as every address
/// argument on the wire is transmitted MSB first.
pub fn addr_bytes(addr: u32) -> [u8; 4] {
    addr.to_be_bytes()
}
