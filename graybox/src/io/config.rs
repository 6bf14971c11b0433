//! Engine configuration stored as TOML (default `graybox.toml`).

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

/// Digest of the password accepted when no other digest is configured.
pub const DEFAULT_PASSWORD_SHA224: &str = "c0dad715ce5501ea5e382d3a44a7cf816f9a1a309dfeb88cbe9ebfbd";

/// Engine configuration (TOML).
///
/// Missing fields default to the values of [`GrayboxConfig::default`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GrayboxConfig {
    /// Program name shown in banners and UI titles.
    pub program: String,

    pub version: String,

    /// Directory receiving the session log. Defaults to the system temp dir.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_dir: Option<PathBuf>,

    /// Execution times below this many seconds are not reported.
    pub min_exec_time_shown_secs: f64,

    pub auth: AuthConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AuthConfig {
    /// Lower-case hex SHA-224 digest of the accepted password.
    pub password_sha224: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            password_sha224: DEFAULT_PASSWORD_SHA224.to_string(),
        }
    }
}

impl Default for GrayboxConfig {
    fn default() -> Self {
        Self {
            program: "graybox".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            log_dir: None,
            min_exec_time_shown_secs: 1.0,
            auth: AuthConfig::default(),
        }
    }
}

impl GrayboxConfig {
    pub fn validate(&self) -> Result<()> {
        if self.program.trim().is_empty() {
            return Err(anyhow!("program must be non-empty"));
        }
        if self.min_exec_time_shown_secs.is_nan() || self.min_exec_time_shown_secs < 0.0 {
            return Err(anyhow!("min_exec_time_shown_secs must be >= 0"));
        }
        let digest = &self.auth.password_sha224;
        if digest.len() != 56 || !digest.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(anyhow!("auth.password_sha224 must be 56 hex characters"));
        }
        Ok(())
    }

    /// Log directory, falling back to the system temp dir.
    pub fn resolved_log_dir(&self) -> PathBuf {
        self.log_dir.clone().unwrap_or_else(std::env::temp_dir)
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `GrayboxConfig::default()`.
pub fn load_config(path: &Path) -> Result<GrayboxConfig> {
    if !path.exists() {
        let cfg = GrayboxConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: GrayboxConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &GrayboxConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("config path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_missing_returns_default() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cfg = load_config(&temp.path().join("missing.toml")).expect("load");
        assert_eq!(cfg, GrayboxConfig::default());
    }

    #[test]
    fn write_then_load_round_trips() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("graybox.toml");
        let cfg = GrayboxConfig {
            log_dir: Some(temp.path().join("logs")),
            min_exec_time_shown_secs: 0.0,
            ..GrayboxConfig::default()
        };
        write_config(&path, &cfg).expect("write");
        let loaded = load_config(&path).expect("load");
        assert_eq!(loaded, cfg);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("graybox.toml");
        fs::write(&path, "program = \"heat\"\n").expect("write");
        let cfg = load_config(&path).expect("load");
        assert_eq!(cfg.program, "heat");
        assert_eq!(cfg.min_exec_time_shown_secs, 1.0);
        assert_eq!(cfg.auth, AuthConfig::default());
    }

    #[test]
    fn rejects_malformed_digest() {
        let cfg = GrayboxConfig {
            auth: AuthConfig {
                password_sha224: "abc".to_string(),
            },
            ..GrayboxConfig::default()
        };
        let err = cfg.validate().expect_err("invalid");
        assert!(err.to_string().contains("password_sha224"));
    }
}
