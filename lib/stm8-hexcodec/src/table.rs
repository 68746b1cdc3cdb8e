//! Plain ASCII address/value table: one `<address> <byte>` pair per line,
//! decimal or `0x`-prefixed hex, blank lines and `#` comments ignored.

use stm8_image::MemoryImage;

use crate::{lines::split_lines, CodecError};

pub fn import_table(buf: &[u8], image: &mut MemoryImage) -> Result<(), CodecError> {
    for (idx, raw_line) in split_lines(buf).enumerate() {
        let line_no = idx + 1;
        let text = std::str::from_utf8(raw_line).unwrap_or("").trim();
        if text.is_empty() || text.starts_with('#') {
            continue;
        }

        let mut tokens = text.split_whitespace();
        let addr_tok = tokens.next().ok_or_else(|| CodecError::InvalidCharacter {
            line: line_no,
            token: String::new(),
        })?;
        let value_tok = tokens.next().ok_or_else(|| CodecError::InvalidCharacter {
            line: line_no,
            token: String::new(),
        })?;

        let addr = parse_number(addr_tok).ok_or_else(|| CodecError::InvalidCharacter {
            line: line_no,
            token: addr_tok.to_string(),
        })?;
        let value = parse_number(value_tok).ok_or_else(|| CodecError::InvalidCharacter {
            line: line_no,
            token: value_tok.to_string(),
        })?;

        if addr >= image.capacity() {
            return Err(CodecError::Address(stm8_image::ImageError::AddressExceedsBuffer {
                addr,
                capacity: image.capacity(),
            }));
        }
        if value > 0xFF {
            return Err(CodecError::InvalidCharacter {
                line: line_no,
                token: value_tok.to_string(),
            });
        }
        image.set(addr, value as u8);
    }
    Ok(())
}

pub fn export_table(image: &MemoryImage) -> Result<Vec<u8>, CodecError> {
    let mut out = String::new();
    for (addr, value) in image.iter_defined() {
        out.push_str(&format!("0x{:08X}\t0x{:02X}\n", addr, value));
    }
    Ok(out.into_bytes())
}

fn parse_number(token: &str) -> Option<u32> {
    if let Some(hex) = token.strip_prefix("0x").or_else(|| token.strip_prefix("0X")) {
        u32::from_str_radix(hex, 16).ok()
    } else {
        token.parse::<u32>().ok()
    }
}
