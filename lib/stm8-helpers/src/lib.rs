//! RAM-resident flash-write helper routines.
//!
//! Several STM8 ROM bootloader versions cannot program flash directly; the
//! host must upload a small position-independent routine into RAM first and
//! invoke it via GO. This crate holds the catalog of those routines, keyed
//! by device family and flash size, and parses each one out of its embedded
//! Intel-HEX text on first use.

use std::collections::BTreeMap;

use stm8_image::MemoryImage;
use thiserror::Error;

/// STM8 core/family, as reported by the GET/bootloader-info exchange.
/// Only the families the catalog actually distinguishes are listed here;
/// identifying an unrecognized family is a protocol-level error, not a
/// catalog miss.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum DeviceFamily {
    Stm8S,
    Stm8L,
}

/// Key into the helper catalog. `flash_at_least` is the smallest flash size
/// (in bytes) the entry applies to; a device's exact flash size is rounded
/// down to the nearest catalog entry at lookup time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct HelperKey {
    pub family: DeviceFamily,
    pub flash_at_least: u32,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum HelperError {
    #[error("no RAM helper routine is available for this device family and flash size; its ROM bootloader cannot write flash directly")]
    NoHelperAvailable,
    #[error("embedded helper payload failed to parse: {0}")]
    Malformed(#[from] stm8_hexcodec::CodecError),
}

/// Entry points into an uploaded helper routine, expressed as addresses
/// within the helper's own RAM image. GO is issued against one of these
/// depending on the operation being performed.
#[derive(Debug, Clone, Copy)]
pub struct HelperEntryPoints {
    pub sector_erase: u32,
    pub mass_erase: u32,
    pub block_write: u32,
}

/// A single catalog entry: the helper's Intel-HEX text plus where to call
/// into it once uploaded.
#[derive(Debug)]
pub struct HelperRoutine {
    ihex_text: &'static str,
    pub entry_points: HelperEntryPoints,
}

impl HelperRoutine {
    /// Parses the embedded Intel-HEX text into a RAM image ready to be
    /// transferred to the device via WRITE commands.
    pub fn load(&self) -> Result<MemoryImage, HelperError> {
        let mut image = MemoryImage::default();
        stm8_hexcodec::import_intel_hex(self.ihex_text.as_bytes(), &mut image)?;
        Ok(image)
    }
}

/// The erase_write_ver_128k_2.4 routine (Basil Hussain,
/// stm8-bootloader-erase-write, Apache-2.0), the one concrete RAM helper
/// payload carried by this catalog. Block boundaries within the blob (long
/// runs terminated by short trailer records) are used to infer the three
/// entry points below; the routine ships without a separate symbol table.
const ERASE_WRITE_VER_128K_2_4: &str = concat!(
    ":2000A00089725F009B7208008E022003CD01010F017B01C10088223A5F7B01971C0000F69A\n",
    ":2000C00088CD0108840F027B02A1082421CD608A3520505B35DF505CCD00F4CD0300C700F3\n",
    ":2000E0009BCE008B1C0080CF008B0C0220D90C0120BF85815F4F92A7008A5CA3000425F68E\n",
    ":20010000814B81CD03108481AE008A7F7B03A18126093500008C3544008B817B03A180261C\n",
    ":20012000093500008C3540008B817B03A1602505A602F720097B03A1202503A601F77B0380\n",
    ":0C014000974F0258581C8000CF008B81A4\n",
    ":2001800088725F009C720C008E0220197200009802200A3581505B357E505C20083501507F\n",
    ":2001A0005B35FE505C725F00980F017B01C10088222ACD608A905F7B0190975F7B01971CA4\n",
    ":2001C0000000F6908988CD01EB5B03720D008E022006CD0300C7009C0C0120CF720C008E01\n",
    ":1401E000022006CD0300C7009C84817B031E0492A7008A81C7\n",
    ":20030000C6505FA5012703A60181A50427F24F814F1103220E88CD608A845F971C0000F77F\n",
    ":090320004C20EE7B03C70088812C\n",
    ":00000001FF\n",
);

fn catalog() -> BTreeMap<HelperKey, HelperRoutine> {
    let mut map = BTreeMap::new();
    map.insert(
        HelperKey {
            family: DeviceFamily::Stm8S,
            flash_at_least: 128 * 1024,
        },
        HelperRoutine {
            ihex_text: ERASE_WRITE_VER_128K_2_4,
            entry_points: HelperEntryPoints {
                sector_erase: 0x00A0,
                block_write: 0x0180,
                mass_erase: 0x0300,
            },
        },
    );
    map
}

/// Looks up the helper for a family/flash-size pair. Picks the
/// highest-`flash_at_least` entry at or below `flash_size`, matching the
/// "largest applicable bucket" rule the spec's catalog keying calls for.
pub fn lookup(family: DeviceFamily, flash_size: u32) -> Result<HelperRoutine, HelperError> {
    catalog()
        .into_iter()
        .filter(|(key, _)| key.family == family && key.flash_at_least <= flash_size)
        .max_by_key(|(key, _)| key.flash_at_least)
        .map(|(_, routine)| routine)
        .ok_or(HelperError::NoHelperAvailable)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_the_stm8s_128k_helper() {
        let routine = lookup(DeviceFamily::Stm8S, 128 * 1024).unwrap();
        assert_eq!(routine.entry_points.sector_erase, 0x00A0);
    }

    #[test]
    fn a_larger_flash_still_matches_the_128k_bucket() {
        let routine = lookup(DeviceFamily::Stm8S, 256 * 1024).unwrap();
        assert_eq!(routine.entry_points.block_write, 0x0180);
    }

    #[test]
    fn unpopulated_combination_reports_no_helper_available() {
        let err = lookup(DeviceFamily::Stm8L, 128 * 1024).unwrap_err();
        assert_eq!(err, HelperError::NoHelperAvailable);
    }

    #[test]
    fn smaller_flash_than_any_bucket_reports_no_helper_available() {
        let err = lookup(DeviceFamily::Stm8S, 8 * 1024).unwrap_err();
        assert_eq!(err, HelperError::NoHelperAvailable);
    }

    #[test]
    fn embedded_payload_parses_into_the_expected_address_range() {
        let routine = lookup(DeviceFamily::Stm8S, 128 * 1024).unwrap();
        let image = routine.load().unwrap();
        assert_eq!(image.get(0x00A0), Some(0x89));
        assert_eq!(image.get(0x0328), Some(0x81));
    }
}
