// SPDX-License-Identifier: AGPL-3.0-or-later

use std::env;

use crate::error::{AmpcclError, Result};

/// Adaptive-split policy selection (`AMPCCL_ALGO`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Algorithm {
    /// TCP-style AIMD.
    Tcp,
    /// DCQCN-style PID controller.
    Dcqcn,
    /// Fixed ratio, never adapts.
    #[default]
    Static,
}

impl Algorithm {
    fn parse(raw: &str) -> Option<Self> {
        match raw.to_ascii_lowercase().as_str() {
            "tcp" => Some(Self::Tcp),
            "dcqcn" => Some(Self::Dcqcn),
            "static" => Some(Self::Static),
            _ => None,
        }
    }
}

/// Log verbosity (`AMPCCL_LOG_LEVEL`), mirrors `tracing::Level` ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum LogLevel {
    #[default]
    Off,
    Error,
    Warn,
    Info,
    Debug,
}

impl LogLevel {
    fn parse(raw: &str) -> Option<Self> {
        match raw.to_ascii_lowercase().as_str() {
            "off" | "0" => Some(Self::Off),
            "error" | "1" => Some(Self::Error),
            "warn" | "2" => Some(Self::Warn),
            "info" | "3" => Some(Self::Info),
            "debug" | "4" => Some(Self::Debug),
            _ => None,
        }
    }

    pub fn as_env_filter_directive(self) -> &'static str {
        match self {
            LogLevel::Off => "off",
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
        }
    }
}

/// Runtime configuration, read once from the process environment.
///
/// Every field corresponds 1:1 to an `AMPCCL_*` environment variable; see
/// SPEC_FULL.md §6. There is no configuration file — unlike the YAML-driven
/// `iscsi-client-rs::cfg::config::Config` this is modeled on, this shim's
/// entire configuration surface is the small set of environment variables a
/// process sets before the injected library loads.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Master switch (`AMPCCL_ENABLE`). When `false` every intercepted call
    /// falls through to the original vendor function untouched.
    pub enabled: bool,
    /// Adaptive policy (`AMPCCL_ALGO`, default `static`).
    pub algorithm: Algorithm,
    /// Whether the PCIe backend may be used at all (`AMPCCL_ENABLE_PCIE`).
    pub pcie_enabled: bool,
    /// Minimum total payload size before PCIe is considered (`AMPCCL_MIN_MSG_SIZE`).
    pub min_msg_size: usize,
    /// Minimum non-zero chunk size for either half (`AMPCCL_MIN_CHUNK_SIZE`).
    pub min_chunk_size: usize,
    /// Log verbosity (`AMPCCL_LOG_LEVEL`).
    pub log_level: LogLevel,
    /// Debug flag (`AMPCCL_DEBUG`), independent of `log_level`.
    pub debug: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            enabled: false,
            algorithm: Algorithm::default(),
            pcie_enabled: true,
            min_msg_size: 8192,
            min_chunk_size: 4096,
            log_level: LogLevel::default(),
            debug: false,
        }
    }
}

fn parse_bool_flag(raw: &str) -> bool {
    matches!(
        raw.to_ascii_lowercase().as_str(),
        "1" | "on" | "true" | "yes"
    )
}

impl Config {
    /// Loads configuration from the process environment, falling back to
    /// defaults for anything unset. Unlike [`Config::validate`], this never
    /// fails: an unrecognized value for `AMPCCL_ALGO` or `AMPCCL_LOG_LEVEL`
    /// falls back to the default rather than aborting the caller's vendor
    /// call, matching SPEC_FULL.md §7's "best effort" rule.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        cfg.enabled = env::var("AMPCCL_ENABLE")
            .map(|v| parse_bool_flag(&v))
            .unwrap_or(false);

        if let Ok(v) = env::var("AMPCCL_ALGO") {
            cfg.algorithm = Algorithm::parse(&v).unwrap_or(cfg.algorithm);
        }

        cfg.pcie_enabled = env::var("AMPCCL_ENABLE_PCIE")
            .map(|v| v != "0")
            .unwrap_or(true);

        if let Ok(v) = env::var("AMPCCL_MIN_MSG_SIZE")
            && let Ok(n) = v.parse()
        {
            cfg.min_msg_size = n;
        }

        if let Ok(v) = env::var("AMPCCL_MIN_CHUNK_SIZE")
            && let Ok(n) = v.parse()
        {
            cfg.min_chunk_size = n;
        }

        if let Ok(v) = env::var("AMPCCL_LOG_LEVEL") {
            cfg.log_level = LogLevel::parse(&v).unwrap_or(cfg.log_level);
        }

        cfg.debug = env::var("AMPCCL_DEBUG")
            .map(|v| v != "0")
            .unwrap_or(false);

        cfg
    }

    /// Strict variant that rejects unparseable values instead of silently
    /// falling back — useful for tooling that wants to surface operator
    /// typos rather than silently ignore them.
    pub fn from_env_strict() -> Result<Self> {
        let mut cfg = Self::default();
        cfg.enabled = env::var("AMPCCL_ENABLE")
            .map(|v| parse_bool_flag(&v))
            .unwrap_or(false);

        if let Ok(v) = env::var("AMPCCL_ALGO") {
            cfg.algorithm = Algorithm::parse(&v).ok_or_else(|| AmpcclError::InvalidConfig {
                var: "AMPCCL_ALGO",
                value: v,
            })?;
        }

        cfg.pcie_enabled = env::var("AMPCCL_ENABLE_PCIE")
            .map(|v| v != "0")
            .unwrap_or(true);

        if let Ok(v) = env::var("AMPCCL_MIN_MSG_SIZE") {
            cfg.min_msg_size = v
                .parse()
                .map_err(|_| AmpcclError::InvalidConfig {
                    var: "AMPCCL_MIN_MSG_SIZE",
                    value: v,
                })?;
        }

        if let Ok(v) = env::var("AMPCCL_MIN_CHUNK_SIZE") {
            cfg.min_chunk_size = v
                .parse()
                .map_err(|_| AmpcclError::InvalidConfig {
                    var: "AMPCCL_MIN_CHUNK_SIZE",
                    value: v,
                })?;
        }

        if let Ok(v) = env::var("AMPCCL_LOG_LEVEL") {
            cfg.log_level = LogLevel::parse(&v).ok_or_else(|| AmpcclError::InvalidConfig {
                var: "AMPCCL_LOG_LEVEL",
                value: v,
            })?;
        }

        cfg.debug = env::var("AMPCCL_DEBUG")
            .map(|v| v != "0")
            .unwrap_or(false);

        Ok(cfg)
    }
}

#[cfg(test)]
mod tests {
    use serial_test::serial;

    use super::*;

    fn clear_env() {
        for var in [
            "AMPCCL_ENABLE",
            "AMPCCL_ALGO",
            "AMPCCL_ENABLE_PCIE",
            "AMPCCL_MIN_MSG_SIZE",
            "AMPCCL_MIN_CHUNK_SIZE",
            "AMPCCL_LOG_LEVEL",
            "AMPCCL_DEBUG",
        ] {
            // SAFETY: tests are serialized via #[serial] so no other thread
            // observes the environment mid-mutation.
            unsafe { env::remove_var(var) };
        }
    }

    #[test]
    #[serial]
    fn defaults_are_passthrough() {
        clear_env();
        let cfg = Config::from_env();
        assert!(!cfg.enabled);
        assert_eq!(cfg.algorithm, Algorithm::Static);
        assert!(cfg.pcie_enabled);
        assert_eq!(cfg.min_msg_size, 8192);
        assert_eq!(cfg.min_chunk_size, 4096);
    }

    #[test]
    #[serial]
    fn enable_accepts_common_spellings() {
        clear_env();
        for v in ["1", "on", "TRUE", "Yes"] {
            // SAFETY: serialized test.
            unsafe { env::set_var("AMPCCL_ENABLE", v) };
            assert!(Config::from_env().enabled, "value {v} should enable");
        }
        clear_env();
    }

    #[test]
    #[serial]
    fn unknown_algo_falls_back_under_from_env_but_errors_under_strict() {
        clear_env();
        // SAFETY: serialized test.
        unsafe { env::set_var("AMPCCL_ALGO", "quic") };
        assert_eq!(Config::from_env().algorithm, Algorithm::Static);
        assert!(Config::from_env_strict().is_err());
        clear_env();
    }

    #[test]
    #[serial]
    fn pcie_disabled_only_by_explicit_zero() {
        clear_env();
        // SAFETY: serialized test.
        unsafe { env::set_var("AMPCCL_ENABLE_PCIE", "0") };
        assert!(!Config::from_env().pcie_enabled);
        clear_env();
    }
}
