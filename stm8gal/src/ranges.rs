//! Parsing for the `START:STOP[:BYTE]`-shaped address-range CLI arguments.

use anyhow::{bail, Context, Result};

fn parse_number(token: &str) -> Result<u32> {
    let token = token.trim();
    if let Some(hex) = token.strip_prefix("0x").or_else(|| token.strip_prefix("0X")) {
        u32::from_str_radix(hex, 16).with_context(|| format!("invalid hex address {token:?}"))
    } else {
        token.parse::<u32>().with_context(|| format!("invalid address {token:?}"))
    }
}

pub fn parse_range(spec: &str) -> Result<(u32, u32)> {
    let parts: Vec<&str> = spec.split(':').collect();
    if parts.len() != 2 {
        bail!("expected START:STOP, got {spec:?}");
    }
    Ok((parse_number(parts[0])?, parse_number(parts[1])?))
}

pub fn parse_fill(spec: &str) -> Result<(u32, u32, u8)> {
    let parts: Vec<&str> = spec.split(':').collect();
    if parts.len() != 3 {
        bail!("expected START:STOP:BYTE, got {spec:?}");
    }
    let value = parse_number(parts[2])?;
    if value > 0xFF {
        bail!("fill byte {value:#x} does not fit in a u8");
    }
    Ok((parse_number(parts[0])?, parse_number(parts[1])?, value as u8))
}
