//! Raw binary import/export. There is no structure to parse: the caller
//! supplies the base address the bytes land at, and export simply walks the
//! defined range, padding undefined cells with `0x00`.

use stm8_image::MemoryImage;

use crate::CodecError;

pub fn import_binary(buf: &[u8], base_addr: u32, image: &mut MemoryImage) -> Result<(), CodecError> {
    for (i, &b) in buf.iter().enumerate() {
        let addr = base_addr as u64 + i as u64;
        if addr >= image.capacity() as u64 {
            return Err(CodecError::Address(stm8_image::ImageError::AddressExceedsBuffer {
                addr: addr as u32,
                capacity: image.capacity(),
            }));
        }
        image.set(addr as u32, b);
    }
    Ok(())
}

pub fn export_binary(image: &MemoryImage) -> Result<Vec<u8>, CodecError> {
    let range = image.get_image_size(0, image.capacity() - 1)?;
    let Some(range) = range else {
        return Ok(Vec::new());
    };
    let mut out = Vec::with_capacity((range.addr_stop - range.addr_start + 1) as usize);
    for addr in range.addr_start..=range.addr_stop {
        out.push(image.get(addr).unwrap_or(0));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn imports_at_base_address() {
        let mut image = MemoryImage::default();
        import_binary(&[0x01, 0x02, 0x03], 0x1000, &mut image).unwrap();
        assert_eq!(image.get(0x1000), Some(0x01));
        assert_eq!(image.get(0x1002), Some(0x03));
    }

    #[test]
    fn export_pads_undefined_cells_with_zero() {
        let mut image = MemoryImage::default();
        image.set(0x00, 0xAA);
        image.set(0x02, 0xBB);
        let exported = export_binary(&image).unwrap();
        assert_eq!(exported, vec![0xAA, 0x00, 0xBB]);
    }

    #[test]
    fn empty_image_exports_empty_buffer() {
        let image = MemoryImage::default();
        assert_eq!(export_binary(&image).unwrap(), Vec::<u8>::new());
    }
}
