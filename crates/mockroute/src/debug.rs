//! Debug verbosity flags

use crate::error::MockError;
use serde::{Deserialize, Deserializer};
use std::fmt;
use std::ops::{BitOr, BitOrAssign};
use std::str::FromStr;

/// Controls the extra log output emitted while serving requests.
///
/// Flags only change what gets logged through `tracing`. They never change
/// how requests are matched or whether a test passes.
///
/// ```rust
/// use mockroute::DebugFlags;
///
/// let flags = DebugFlags::HEADERS | DebugFlags::BODY;
/// assert!(flags.contains(DebugFlags::BODY));
/// assert!(!flags.contains(DebugFlags::TRACE));
/// ```
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct DebugFlags(u8);

impl DebugFlags {
    /// No extra output.
    pub const NONE: Self = Self(0);
    /// Log every matched call and the number of checks run.
    pub const TRACE: Self = Self(1 << 0);
    /// Dump request headers on every call.
    pub const HEADERS: Self = Self(1 << 1);
    /// Dump the request body on every call.
    pub const BODY: Self = Self(1 << 2);
    /// Everything above.
    pub const ALL: Self = Self(Self::TRACE.0 | Self::HEADERS.0 | Self::BODY.0);

    pub const fn bits(self) -> u8 {
        self.0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// True if every flag in `other` is set in `self`.
    ///
    /// `contains(NONE)` is always true.
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for DebugFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for DebugFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl fmt::Debug for DebugFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DebugFlags({})", self)
    }
}

impl fmt::Display for DebugFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("none");
        }

        let names: Vec<&str> = [
            (Self::TRACE, "trace"),
            (Self::HEADERS, "headers"),
            (Self::BODY, "body"),
        ]
        .iter()
        .filter(|(flag, _)| self.contains(*flag))
        .map(|(_, name)| *name)
        .collect();

        f.write_str(&names.join(","))
    }
}

impl FromStr for DebugFlags {
    type Err = MockError;

    /// Parses a comma-separated list such as `"trace,headers"`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut flags = Self::NONE;

        for part in s.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            flags |= match part.to_ascii_lowercase().as_str() {
                "none" => Self::NONE,
                "trace" => Self::TRACE,
                "headers" => Self::HEADERS,
                "body" => Self::BODY,
                "all" => Self::ALL,
                other => {
                    return Err(MockError::Config(format!("unknown debug flag `{}`", other)));
                }
            };
        }

        Ok(flags)
    }
}

impl<'de> Deserialize<'de> for DebugFlags {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn none_is_default_and_empty() {
        assert_eq!(DebugFlags::default(), DebugFlags::NONE);
        assert!(DebugFlags::NONE.is_empty());
        assert!(!DebugFlags::NONE.contains(DebugFlags::TRACE));
    }

    #[test]
    fn flags_combine_with_or() {
        let mut flags = DebugFlags::TRACE;
        flags |= DebugFlags::BODY;

        assert!(flags.contains(DebugFlags::TRACE));
        assert!(flags.contains(DebugFlags::BODY));
        assert!(!flags.contains(DebugFlags::HEADERS));
        assert_eq!(flags.to_string(), "trace,body");
    }

    #[test]
    fn parses_comma_separated_list() {
        let flags: DebugFlags = "Trace, headers".parse().unwrap();
        assert_eq!(flags, DebugFlags::TRACE | DebugFlags::HEADERS);

        assert_eq!("none".parse::<DebugFlags>().unwrap(), DebugFlags::NONE);
        assert_eq!("".parse::<DebugFlags>().unwrap(), DebugFlags::NONE);
        assert_eq!("all".parse::<DebugFlags>().unwrap(), DebugFlags::ALL);
    }

    #[test]
    fn rejects_unknown_flag() {
        let err = "trace,verbose".parse::<DebugFlags>().unwrap_err();
        assert!(err.to_string().contains("verbose"));
    }

    #[test]
    fn deserializes_from_string() {
        let flags: DebugFlags = serde_json::from_str("\"headers,body\"").unwrap();
        assert_eq!(flags, DebugFlags::HEADERS | DebugFlags::BODY);
    }
}
