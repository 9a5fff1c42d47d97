use clap::ValueEnum;
use serde::Deserialize;

/// Verbosity of the gateway's own diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    #[default]
    Info,
    None,
}

impl LogLevel {
    pub fn to_filter(self) -> log::LevelFilter {
        match self {
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::None => log::LevelFilter::Off,
        }
    }
}

/// Where protocol log records are persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// SQLite database file
    #[default]
    Sqlite,
    /// JSON-lines file inside a directory
    File,
    /// Process memory, lost on exit
    Memory,
    /// Records are dropped
    None,
}

#[derive(Debug, PartialEq, Clone)]
pub struct ResponseHeader {
    pub name: String,
    pub value: String,
}

impl ResponseHeader {
    /// Parses a `Name: value` pair as given on the command line.
    pub fn parse(raw: &str) -> Option<Self> {
        let (name, value) = raw.split_once(':')?;
        let name = name.trim();
        if name.is_empty() || name.contains(char::is_whitespace) {
            return None;
        }
        Some(Self {
            name: name.to_string(),
            value: value.trim().to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_parse_trims_both_sides() {
        let h = ResponseHeader::parse("X-Trace :  abc: def ").unwrap();
        assert_eq!(h.name, "X-Trace");
        assert_eq!(h.value, "abc: def");
    }

    #[test]
    fn header_parse_rejects_missing_separator_or_name() {
        assert!(ResponseHeader::parse("no-colon").is_none());
        assert!(ResponseHeader::parse(": value").is_none());
        assert!(ResponseHeader::parse("bad name: v").is_none());
    }

    #[test]
    fn log_level_maps_to_filter() {
        assert_eq!(LogLevel::None.to_filter(), log::LevelFilter::Off);
        assert_eq!(LogLevel::default().to_filter(), log::LevelFilter::Info);
    }
}
