//! Demo configuration read from the environment.

use std::str::FromStr;

/// Demo settings.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DemoConfig {
    /// Number of ticks to run (`DEMO_TICKS`).
    pub ticks: u32,
    /// Entities spawned before the first tick (`DEMO_ENTITIES`).
    pub entities: u32,
}

impl DemoConfig {
    pub const DEFAULT_TICKS: u32 = 8;
    pub const DEFAULT_ENTITIES: u32 = 64;

    /// Read settings, falling back to defaults for missing or malformed values.
    pub fn from_env() -> Self {
        Self {
            ticks: parse_or(std::env::var("DEMO_TICKS").ok(), Self::DEFAULT_TICKS),
            entities: parse_or(std::env::var("DEMO_ENTITIES").ok(), Self::DEFAULT_ENTITIES),
        }
    }
}

fn parse_or<T: FromStr>(value: Option<String>, default: T) -> T {
    value.and_then(|v| v.trim().parse().ok()).unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_or() {
        assert_eq!(parse_or(Some("12".into()), 3_u32), 12);
        assert_eq!(parse_or(Some(" 7 ".into()), 3_u32), 7);
        assert_eq!(parse_or(Some("lots".into()), 3_u32), 3);
        assert_eq!(parse_or(None, 3_u32), 3);
    }
}
