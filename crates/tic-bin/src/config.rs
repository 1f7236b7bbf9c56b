//! Layered configuration for the `tic500` tool
//!
//! Sources, later ones winning:
//! 1. TOML file (`tic500.toml` unless `--config` names another; a missing
//!    file contributes nothing)
//! 2. Environment variables prefixed with `TIC500_` (`TIC500_HOST`,
//!    `TIC500_TIMEOUT_MS`, ...)
//! 3. Command-line flags
//!
//! The merged result is the same [`Tic500Config`] the driver factory reads.

use anyhow::{Context, Result};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::Serialize;
use std::path::Path;
use tic_driver_cryovac::{Dialect, Tic500Config};

/// Prefix of configuration environment variables.
pub const ENV_PREFIX: &str = "TIC500_";

/// Values given on the command line; unset fields leave lower layers alone.
#[derive(Debug, Default, Clone, Serialize)]
pub struct Overrides {
    /// Instrument host
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    /// Instrument port
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    /// Command framing
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dialect: Option<Dialect>,
    /// Reply timeout in milliseconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    /// Simulated instrument
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mock: Option<bool>,
}

fn figment(path: &Path, overrides: &Overrides) -> Figment {
    Figment::new()
        .merge(Toml::file(path))
        .merge(Env::prefixed(ENV_PREFIX))
        .merge(Serialized::defaults(overrides))
}

/// Load and validate the configuration.
pub fn load(path: &Path, overrides: &Overrides) -> Result<Tic500Config> {
    let config: Tic500Config = figment(path, overrides)
        .extract()
        .with_context(|| format!("Failed to load configuration from {}", path.display()))?;
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_file_values_and_defaults() {
        let file = write_config(
            r#"
host = "192.168.1.50"
dialect = "plain"
"#,
        );
        let config = load(file.path(), &Overrides::default()).unwrap();
        assert_eq!(config.host, "192.168.1.50");
        assert_eq!(config.port, 23);
        assert_eq!(config.dialect, Dialect::Plain);
        assert_eq!(config.timeout_ms, 500);
        assert!(!config.mock);
    }

    #[test]
    fn test_command_line_wins_over_file() {
        let file = write_config(
            r#"
host = "192.168.1.50"
port = 2323
"#,
        );
        let overrides = Overrides {
            host: Some("tic500.lab".into()),
            timeout_ms: Some(1000),
            mock: Some(true),
            ..Default::default()
        };
        let config = load(file.path(), &overrides).unwrap();
        assert_eq!(config.host, "tic500.lab");
        assert_eq!(config.port, 2323);
        assert_eq!(config.timeout_ms, 1000);
        assert!(config.mock);
    }

    #[test]
    fn test_missing_file_uses_overrides_only() {
        let dir = tempfile::tempdir().unwrap();
        let overrides = Overrides {
            host: Some("localhost".into()),
            ..Default::default()
        };
        let config = load(&dir.path().join("absent.toml"), &overrides).unwrap();
        assert_eq!(config.host, "localhost");
    }

    #[test]
    fn test_invalid_values_rejected() {
        let file = write_config(
            r#"
host = "tic500"
timeout_ms = 0
"#,
        );
        assert!(load(file.path(), &Overrides::default()).is_err());

        let file = write_config("port = 23\n");
        assert!(load(file.path(), &Overrides::default()).is_err());
    }
}
