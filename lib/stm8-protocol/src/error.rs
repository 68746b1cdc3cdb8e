use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("port is not open")]
    PortNotOpen,
    #[error("synchronization failed after {attempts} attempts")]
    TooManySyncAttempts { attempts: u32 },
    #[error("unknown physical interface {0:?}")]
    UnknownInterface(String),
    #[error("failed to send command to device: {0}")]
    SendCommandFailed(#[source] stm8_transport::TransportError),
    #[error("timed out waiting for a response")]
    ResponseTimeout,
    #[error("device responded with an unexpected byte {byte:#04x}")]
    ResponseUnexpected { byte: u8 },
    #[error("failed to send bytes to port: {0}")]
    CannotSendToPort(#[source] stm8_transport::TransportError),
    #[error("could not determine UART mode from device response")]
    CannotDetermineUartMode,
    #[error("could not identify device family from bootloader response")]
    CannotIdentifyFamily,
    #[error("could not identify specific device variant")]
    CannotIdentifyDevice,
    #[error("device returned an unexpected opcode for GET")]
    IncorrectGetCode,
    #[error("device returned an unexpected opcode for READ")]
    IncorrectReadCode,
    #[error("device returned an unexpected opcode for GO")]
    IncorrectGoCode,
    #[error("device returned an unexpected opcode for WRITE")]
    IncorrectWriteCode,
    #[error("device returned an unexpected opcode for ERASE")]
    IncorrectEraseCode,
    #[error("address {addr:#x} does not exist on the device")]
    AddressNotExist { addr: u32 },
    #[error("start address {start:#x} is greater than end address {end:#x}")]
    AddressStartGreaterEnd { start: u32, end: u32 },
    #[error("start address {start:#x} is greater than the image buffer")]
    AddressStartGreaterBuffer { start: u32 },
    #[error("end address {end:#x} is greater than the image buffer")]
    AddressEndGreaterBuffer { end: u32 },
    #[error("verify mismatch at address {addr:#x}: wrote {expected:#04x}, read back {actual:#04x}")]
    VerifyMismatch { addr: u32, expected: u8, actual: u8 },
    #[error(transparent)]
    Helper(#[from] stm8_helpers::HelperError),
}
