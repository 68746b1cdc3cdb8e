//! Per-family flash geometry. The spec fixes 1024-byte sectors starting at
//! 0x8000 for the families it names; a per-family table (rather than a
//! single hard-coded pair) is the resolution of the open sector-layout
//! question, so a future family with different geometry is a table entry.

use stm8_helpers::DeviceFamily;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SectorLayout {
    pub sector_size: u32,
    pub flash_base: u32,
}

pub fn layout_for(family: DeviceFamily) -> SectorLayout {
    match family {
        DeviceFamily::Stm8S => SectorLayout {
            sector_size: 1024,
            flash_base: 0x8000,
        },
        DeviceFamily::Stm8L => SectorLayout {
            sector_size: 1024,
            flash_base: 0x8000,
        },
    }
}
