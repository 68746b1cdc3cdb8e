//! CLI entry point: parses arguments, drives a bootloader [`Session`] through
//! sync -> identify -> (helper upload) -> erase -> write -> verify -> jump,
//! and handles `--input`/`--output` file conversion around it.

mod args;
mod ranges;
mod verbosity;

use std::fs;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use clap::Parser;

use stm8_hexcodec::Format;
use stm8_image::MemoryImage;
use stm8_protocol::{PhysicalInterface, ProtocolError, Session};
use stm8_transport::SerialTransport;

use args::{split_format_suffix, Args};
use verbosity::Verbosity;

/// Default flash size assumed when the bootloader's GET response doesn't
/// report one and no override is given. Matches the smallest RAM-helper
/// bucket this crate ships, so helper lookup never fails by default.
const DEFAULT_FLASH_SIZE: u32 = 128 * 1024;

fn resolve_format(path: &str, explicit: Option<&str>) -> Result<Format> {
    if let Some(name) = explicit {
        return Format::from_extension(name)
            .ok_or_else(|| anyhow!("unrecognized format {name:?}"));
    }
    let ext = Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .ok_or_else(|| anyhow!("cannot infer format from {path:?}; pass FILE:FORMAT"))?;
    Format::from_extension(ext).ok_or_else(|| anyhow!("unrecognized file extension {ext:?}"))
}

fn load_image(spec: &str) -> Result<MemoryImage> {
    let (path, explicit) = split_format_suffix(spec);
    let format = resolve_format(path, explicit)?;
    let bytes = fs::read(path).with_context(|| format!("reading {path:?}"))?;
    let mut image = MemoryImage::default();
    match format {
        Format::SRecord => stm8_hexcodec::import_srecord(&bytes, &mut image)?,
        Format::IntelHex => stm8_hexcodec::import_intel_hex(&bytes, &mut image)?,
        Format::Table => stm8_hexcodec::import_table(&bytes, &mut image)?,
        Format::Binary => stm8_hexcodec::import_binary(&bytes, 0, &mut image)?,
    }
    Ok(image)
}

fn save_image(spec: &str, image: &MemoryImage) -> Result<()> {
    let (path, explicit) = split_format_suffix(spec);
    let format = resolve_format(path, explicit)?;
    let bytes = match format {
        Format::SRecord => stm8_hexcodec::export_srecord(image)?,
        Format::IntelHex => stm8_hexcodec::export_intel_hex(image)?,
        Format::Table => stm8_hexcodec::export_table(image)?,
        Format::Binary => stm8_hexcodec::export_binary(image)?,
    };
    fs::write(path, bytes).with_context(|| format!("writing {path:?}"))
}

/// Sector numbers (offsets from flash base, in sector-sized units) touched
/// by any defined cell in `[addr_start, addr_stop]`.
fn sectors_touched(addr_start: u32, addr_stop: u32, flash_base: u32, sector_size: u32) -> Vec<u8> {
    if addr_stop < flash_base {
        return Vec::new();
    }
    let first = (addr_start.max(flash_base) - flash_base) / sector_size;
    let last = (addr_stop - flash_base) / sector_size;
    (first..=last).map(|n| n as u8).collect()
}

fn run(args: Args) -> Result<()> {
    let verbosity = Verbosity::from_flags(args.quiet, args.verbose);

    let mut image = match &args.input {
        Some(spec) => {
            verbosity.inform(&format!("loading {spec}"));
            load_image(spec)?
        }
        None => MemoryImage::default(),
    };

    if let Some(spec) = &args.fill {
        let (start, stop, byte) = ranges::parse_fill(spec)?;
        image.fill(start, stop, byte)?;
        verbosity.chatty(&format!("filled {start:#x}..={stop:#x} with {byte:#04x}"));
    }
    if let Some(spec) = &args.clip {
        let (start, stop) = ranges::parse_range(spec)?;
        image.clip(start, stop)?;
        verbosity.chatty(&format!("clipped to {start:#x}..={stop:#x}"));
    }
    if let Some(spec) = &args.cut {
        let (start, stop) = ranges::parse_range(spec)?;
        image.cut(start, stop)?;
        verbosity.chatty(&format!("cut {start:#x}..={stop:#x}"));
    }

    let interface = match &args.interface {
        Some(name) => PhysicalInterface::from_str(name).map_err(ProtocolError::UnknownInterface)?,
        None => PhysicalInterface::Uart2Wire,
    };

    verbosity.inform(&format!("opening {} at {} baud", args.port, args.baud));
    let transport = SerialTransport::open(&args.port, args.baud, Duration::from_millis(500))
        .with_context(|| format!("opening {}", args.port))?;
    let mut session = Session::new(transport, interface);

    session.sync().context("synchronizing with bootloader")?;
    verbosity.inform("synchronized");

    let device = session
        .identify(DEFAULT_FLASH_SIZE)
        .context("identifying device")?
        .clone();
    verbosity.inform(&format!(
        "{:?} bootloader v{:#04x}, flash {:#x} bytes",
        device.family, device.bootloader_version, device.flash_size
    ));

    if let Some(range) = image.get_image_size(0, image.capacity() - 1)? {
        let sectors = sectors_touched(
            range.addr_start,
            range.addr_stop,
            device.sector_layout.flash_base,
            device.sector_layout.sector_size,
        );
        if !sectors.is_empty() {
            verbosity.inform(&format!("erasing {} sector(s)", sectors.len()));
            session.flash_sector_erase(&sectors)?;
        }

        verbosity.inform(&format!(
            "writing {:#x}..={:#x}",
            range.addr_start, range.addr_stop
        ));
        if range.addr_start < device.sector_layout.flash_base {
            let ram_stop = range.addr_stop.min(device.sector_layout.flash_base - 1);
            let bytes: Vec<u8> = (range.addr_start..=ram_stop)
                .map(|a| image.get(a).unwrap_or(0))
                .collect();
            session.write_ram(range.addr_start, &bytes)?;
        }
        if range.addr_stop >= device.sector_layout.flash_base {
            let flash_start = range.addr_start.max(device.sector_layout.flash_base);
            session.write_flash(&image, flash_start, range.addr_stop)?;
        }

        if args.verify {
            verbosity.inform("verifying");
            session.mem_verify(&image, range.addr_start, range.addr_stop)?;
            verbosity.inform("verify OK");
        }
    } else {
        verbosity.inform("no input image given; nothing to program");
    }

    if let Some(spec) = &args.output {
        let range = image
            .get_image_size(0, image.capacity() - 1)?
            .ok_or_else(|| anyhow!("--output given but the image is empty"))?;
        verbosity.inform(&format!("reading back {:#x}..={:#x}", range.addr_start, range.addr_stop));
        let readback = session.mem_read(range.addr_start, range.addr_stop)?;
        save_image(spec, &readback)?;
    }

    Ok(())
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();
    let verbosity = Verbosity::from_flags(args.quiet, args.verbose);
    if let Err(err) = run(args) {
        verbosity.error(&format!("{err:#}"));
        std::process::exit(1);
    }
    Ok(())
}
