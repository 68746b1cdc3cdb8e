//! Four-level console output, injected as a sink so the core engine never
//! talks to stdout directly and can run fully silenced under test.

use colored::Colorize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Verbosity {
    Mute,
    Silent,
    Inform,
    Chatty,
}

impl Verbosity {
    /// Maps `-q` / repeated `-v` into a level: `-q` always wins.
    pub fn from_flags(quiet: bool, verbose: u8) -> Self {
        if quiet {
            return Verbosity::Mute;
        }
        match verbose {
            0 => Verbosity::Silent,
            1 => Verbosity::Inform,
            _ => Verbosity::Chatty,
        }
    }

    pub fn inform(&self, message: &str) {
        if *self >= Verbosity::Inform {
            println!("{}", message.blue());
        }
    }

    pub fn chatty(&self, message: &str) {
        if *self >= Verbosity::Chatty {
            println!("{}", message.dimmed());
        }
    }

    pub fn error(&self, message: &str) {
        if *self > Verbosity::Mute {
            eprintln!("{}", message.red().bold());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quiet_always_wins() {
        assert_eq!(Verbosity::from_flags(true, 3), Verbosity::Mute);
    }

    #[test]
    fn verbose_count_maps_to_level() {
        assert_eq!(Verbosity::from_flags(false, 0), Verbosity::Silent);
        assert_eq!(Verbosity::from_flags(false, 1), Verbosity::Inform);
        assert_eq!(Verbosity::from_flags(false, 5), Verbosity::Chatty);
    }
}
