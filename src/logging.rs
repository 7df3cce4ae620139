use std::io::Write;

use chrono::Local;
use log::LevelFilter;

const DEFAULT_LEVEL: LevelFilter = LevelFilter::Debug;

/// Parses a level name, case-insensitively. Unknown names yield `None`.
pub fn parse_level(level: &str) -> Option<LevelFilter> {
    level.trim().parse().ok()
}

/// Installs the stderr logger. Every line carries a local RFC 3339
/// timestamp, the level and the emitting module.
pub fn init(level: &str) {
    let filter = match parse_level(level) {
        Some(filter) => filter,
        None => {
            eprintln!("Unknown log level '{}', using {}", level, DEFAULT_LEVEL);
            DEFAULT_LEVEL
        }
    };

    let result = env_logger::Builder::new()
        .filter_level(filter)
        .format(|buf, record| {
            writeln!(
                buf,
                "[{} {} {}] {}",
                Local::now().to_rfc3339(),
                record.level(),
                record.target(),
                record.args()
            )
        })
        .try_init();

    match result {
        Ok(()) => log::info!("Logging initialized at {}", filter),
        Err(e) => eprintln!("Failed to initialize logging: {}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_level_names_in_any_case() {
        assert_eq!(parse_level("debug"), Some(LevelFilter::Debug));
        assert_eq!(parse_level(" WARN "), Some(LevelFilter::Warn));
        assert_eq!(parse_level("off"), Some(LevelFilter::Off));
        assert_eq!(parse_level("loud"), None);
    }
}
