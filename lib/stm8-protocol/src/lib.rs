//! The STM8 ROM bootloader protocol engine: synchronization, UART-mode
//! detection, device identification, and the framed READ/WRITE/ERASE/GO
//! command set, including transparent RAM-helper upload for devices whose
//! ROM cannot program flash directly.

mod error;
mod framing;
mod sector;
mod session;
mod uart_mode;

pub use error::ProtocolError;
pub use sector::SectorLayout;
pub use session::{DeviceDescriptor, Session};
pub use uart_mode::UartMode;

pub use stm8_helpers::DeviceFamily;
pub use stm8_transport::PhysicalInterface;
