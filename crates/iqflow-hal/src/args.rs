//! # Connection Arguments
//!
//! Key-value option sets parsed from a device connection string, e.g.
//! `"instance=0,channels=2,loopback=none,buflen=8192"`.
//!
//! Parsing is deliberately forgiving: a bad option is never a reason to
//! take a receiver down. Unrecognized keys are ignored with a debug note,
//! and a value that fails to parse produces a warning and the caller's
//! default.

use std::collections::HashMap;
use std::str::FromStr;

/// Parsed connection arguments.
#[derive(Debug, Clone, Default)]
pub struct DeviceArgs {
    map: HashMap<String, String>,
}

impl DeviceArgs {
    /// Parse a `key=value,key=value` option string.
    ///
    /// Whitespace around keys and values is trimmed. Entries without an
    /// `=` are dropped with a debug note.
    pub fn parse(s: &str) -> Self {
        let mut map = HashMap::new();
        for entry in s.split(',') {
            let entry = entry.trim();
            if entry.is_empty() {
                continue;
            }
            match entry.split_once('=') {
                Some((key, value)) => {
                    map.insert(key.trim().to_string(), value.trim().to_string());
                }
                None => {
                    tracing::debug!("ignoring malformed connection argument: {}", entry);
                }
            }
        }
        Self { map }
    }

    /// Raw value for `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.map.get(key).map(|v| v.as_str())
    }

    /// Whether `key` was supplied.
    pub fn contains(&self, key: &str) -> bool {
        self.map.contains_key(key)
    }

    /// Parse `key` as `T`, falling back to `default` with a warning when
    /// the value is malformed. A missing key is silent.
    pub fn get_or<T: FromStr + Copy>(&self, key: &str, default: T) -> T {
        match self.get(key) {
            None => default,
            Some(raw) => raw.parse().unwrap_or_else(|_| {
                tracing::warn!("invalid value for {}: '{}', using default", key, raw);
                default
            }),
        }
    }

    /// Run a fallible mode parser on `key`, falling back to `default` with
    /// a warning on an unrecognized value.
    pub fn get_mode<T, E: std::fmt::Display>(
        &self,
        key: &str,
        parse: impl Fn(&str) -> Result<T, E>,
        default: T,
    ) -> T {
        match self.get(key) {
            None => default,
            Some(raw) => match parse(raw) {
                Ok(mode) => mode,
                Err(e) => {
                    tracing::warn!("{}, using default for {}", e, key);
                    default
                }
            },
        }
    }

    /// Debug-log any supplied key outside `known`.
    pub fn warn_unknown(&self, known: &[&str]) {
        for key in self.map.keys() {
            if !known.contains(&key.as_str()) {
                tracing::debug!("ignoring unrecognized connection argument: {}", key);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use iqflow_core::types::SdrError;

    #[test]
    fn test_parse_basic() {
        let args = DeviceArgs::parse("instance=0, channels=2 ,loopback=none");
        assert_eq!(args.get("instance"), Some("0"));
        assert_eq!(args.get("channels"), Some("2"));
        assert_eq!(args.get("loopback"), Some("none"));
        assert!(!args.contains("biastee"));
    }

    #[test]
    fn test_malformed_entries_dropped() {
        let args = DeviceArgs::parse("biastee,channels=1,,=x");
        assert!(!args.contains("biastee"));
        assert_eq!(args.get_or("channels", 0usize), 1);
    }

    #[test]
    fn test_get_or_fallback() {
        let args = DeviceArgs::parse("buflen=oops,transfers=16");
        assert_eq!(args.get_or("buflen", 4096usize), 4096);
        assert_eq!(args.get_or("transfers", 8u32), 16);
        assert_eq!(args.get_or("buffers", 32u32), 32);
    }

    #[test]
    fn test_get_mode_fallback() {
        let args = DeviceArgs::parse("color=purple");
        let parse = |s: &str| -> Result<u8, SdrError> {
            match s {
                "red" => Ok(1),
                other => Err(SdrError::ConfigError(format!("unknown color: {}", other))),
            }
        };
        assert_eq!(args.get_mode("color", parse, 0), 0);
        assert_eq!(args.get_mode("missing", parse, 7), 7);
    }

    #[test]
    fn test_empty_string() {
        let args = DeviceArgs::parse("");
        assert!(args.get("anything").is_none());
    }
}
