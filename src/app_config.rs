//! Application configuration loading for CLI defaults.
//!
//! Precedence: CLI flags, then the config file, then built-in defaults.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use launcher_fetch::{ManagerConfig, RetryPolicy, UserAgent};
use launcher_fetch::user_agent::{DEFAULT_COMPONENT, DEFAULT_PRODUCT};

use crate::cli::Args;

/// Directory name under the user config root.
const APP_DIR: &str = "launcher-fetch";

/// File-backed defaults. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileConfig {
    /// Transfers allowed to run at once (1..=32).
    pub max_concurrent_downloads: Option<usize>,
    /// Attempts per download, including the first (1..=20).
    pub max_attempts: Option<u32>,
    /// Backoff before the second attempt, in milliseconds.
    pub base_delay_ms: Option<u64>,
    /// Backoff cap in seconds.
    pub max_delay_secs: Option<u64>,
    /// Per-attempt deadline in seconds.
    pub deadline_secs: Option<u64>,
    /// Connect timeout in seconds (1..=3600).
    pub connect_timeout_secs: Option<u64>,
    /// User-Agent product label.
    pub product: Option<String>,
    /// User-Agent component label.
    pub component: Option<String>,
}

impl FileConfig {
    /// Validates config values against runtime and CLI constraints.
    pub fn validate(&self) -> Result<()> {
        if let Some(value) = self.max_concurrent_downloads
            && !(1..=32).contains(&value)
        {
            bail!(
                "Invalid config value for `max_concurrent_downloads`: {value}. Expected range: 1..=32"
            );
        }
        if let Some(value) = self.max_attempts
            && !(1..=20).contains(&value)
        {
            bail!("Invalid config value for `max_attempts`: {value}. Expected range: 1..=20");
        }
        if let Some(value) = self.max_delay_secs
            && value == 0
        {
            bail!("Invalid config value for `max_delay_secs`: 0. Expected a positive value");
        }
        if let Some(value) = self.deadline_secs
            && value == 0
        {
            bail!("Invalid config value for `deadline_secs`: 0. Expected a positive value");
        }
        if let Some(value) = self.connect_timeout_secs
            && !(1..=3600).contains(&value)
        {
            bail!(
                "Invalid config value for `connect_timeout_secs`: {value}. Expected range: 1..=3600"
            );
        }
        for (field, label) in [("product", &self.product), ("component", &self.component)] {
            if let Some(label) = label
                && (label.is_empty() || label.contains(char::is_whitespace))
            {
                bail!("Invalid config value for `{field}`: '{label}'. Expected a single word");
            }
        }
        Ok(())
    }
}

/// Resolves default config path.
///
/// Priority:
/// 1. `$XDG_CONFIG_HOME/launcher-fetch/config.toml`
/// 2. `$HOME/.config/launcher-fetch/config.toml`
#[must_use]
pub fn resolve_default_config_path() -> Option<PathBuf> {
    if let Some(xdg_config_home) = env_var_non_empty_os("XDG_CONFIG_HOME") {
        return Some(PathBuf::from(xdg_config_home).join(APP_DIR).join("config.toml"));
    }

    let home = env_var_non_empty_os("HOME")?;
    Some(
        PathBuf::from(home)
            .join(".config")
            .join(APP_DIR)
            .join("config.toml"),
    )
}

fn env_var_non_empty_os(name: &str) -> Option<std::ffi::OsString> {
    let value = env::var_os(name)?;
    if value.is_empty() { None } else { Some(value) }
}

/// Loads config from the default path if present.
pub fn load_default_file_config() -> Result<Option<FileConfig>> {
    let Some(path) = resolve_default_config_path() else {
        return Ok(None);
    };
    if !path.exists() {
        return Ok(None);
    }
    load_file_config(&path).map(Some)
}

fn load_file_config(path: &Path) -> Result<FileConfig> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file '{}'", path.display()))?;
    parse_config_str(&raw)
        .with_context(|| format!("Failed to parse config file '{}'", path.display()))
}

fn parse_config_str(raw: &str) -> Result<FileConfig> {
    let mut cfg = FileConfig::default();
    for (line_index, raw_line) in raw.lines().enumerate() {
        let line = strip_inline_comment(raw_line).trim();
        if line.is_empty() {
            continue;
        }

        let Some((raw_key, raw_value)) = line.split_once('=') else {
            bail!(
                "Invalid config syntax on line {}: expected key = value",
                line_index + 1
            );
        };

        let key = raw_key.trim();
        let value = raw_value.trim();
        let context = || format!("Invalid `{key}` value on line {}", line_index + 1);

        match key {
            "max_concurrent_downloads" => {
                let parsed = parse_integer_u64(value).with_context(context)?;
                cfg.max_concurrent_downloads = Some(
                    usize::try_from(parsed)
                        .map_err(|_| anyhow::anyhow!("max_concurrent_downloads out of range"))?,
                );
            }
            "max_attempts" => {
                let parsed = parse_integer_u64(value).with_context(context)?;
                cfg.max_attempts = Some(
                    u32::try_from(parsed)
                        .map_err(|_| anyhow::anyhow!("max_attempts out of range for u32"))?,
                );
            }
            "base_delay_ms" => {
                cfg.base_delay_ms = Some(parse_integer_u64(value).with_context(context)?);
            }
            "max_delay_secs" => {
                cfg.max_delay_secs = Some(parse_integer_u64(value).with_context(context)?);
            }
            "deadline_secs" => {
                cfg.deadline_secs = Some(parse_integer_u64(value).with_context(context)?);
            }
            "connect_timeout_secs" => {
                cfg.connect_timeout_secs = Some(parse_integer_u64(value).with_context(context)?);
            }
            "product" => {
                cfg.product = Some(parse_string_literal(value).with_context(context)?);
            }
            "component" => {
                cfg.component = Some(parse_string_literal(value).with_context(context)?);
            }
            unknown => {
                bail!(
                    "Unknown configuration key: '{}' on line {}",
                    unknown,
                    line_index + 1
                );
            }
        }
    }
    cfg.validate()?;
    Ok(cfg)
}

fn strip_inline_comment(line: &str) -> &str {
    let mut in_string = false;
    for (index, ch) in line.char_indices() {
        match ch {
            '"' => in_string = !in_string,
            '#' if !in_string => return &line[..index],
            _ => {}
        }
    }
    line
}

fn parse_string_literal(raw_value: &str) -> Result<String> {
    if raw_value.len() < 2 || !raw_value.starts_with('"') || !raw_value.ends_with('"') {
        bail!("Expected double-quoted string");
    }
    Ok(raw_value[1..raw_value.len() - 1].to_string())
}

fn parse_integer_u64(raw_value: &str) -> Result<u64> {
    let token = raw_value.trim();
    if token.is_empty() {
        bail!("Expected integer value");
    }
    let value = token.parse::<i128>()?;
    if value < 0 {
        bail!("Expected non-negative integer");
    }
    u64::try_from(value).map_err(|_| anyhow::anyhow!("Integer value out of range for u64"))
}

/// Merges CLI flags, the file config, and defaults into registry settings.
pub fn resolve_manager_config(args: &Args, file: Option<&FileConfig>) -> ManagerConfig {
    let file = file.cloned().unwrap_or_default();
    let defaults = ManagerConfig::default();
    let default_policy = RetryPolicy::default();

    let max_attempts = if args.critical {
        launcher_fetch::CRITICAL_MAX_RETRIES
    } else {
        args.max_attempts
            .map(u32::from)
            .or(file.max_attempts)
            .unwrap_or(default_policy.max_attempts())
    };
    let base_delay = file
        .base_delay_ms
        .map_or(default_policy.base_delay(), Duration::from_millis);
    let max_delay = file
        .max_delay_secs
        .map_or(default_policy.max_delay(), Duration::from_secs);
    let deadline = file
        .deadline_secs
        .map_or(default_policy.attempt_deadline(), Duration::from_secs);

    let user_agent = UserAgent::new(
        file.product.as_deref().unwrap_or(DEFAULT_PRODUCT),
        file.component.as_deref().unwrap_or(DEFAULT_COMPONENT),
    );

    ManagerConfig {
        max_concurrent_downloads: args
            .concurrency
            .map(usize::from)
            .or(file.max_concurrent_downloads)
            .unwrap_or(defaults.max_concurrent_downloads),
        user_agent,
        connect_timeout_secs: file
            .connect_timeout_secs
            .unwrap_or(defaults.connect_timeout_secs),
        default_policy: RetryPolicy::new(max_attempts, base_delay, max_delay).deadline(deadline),
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;

    fn args(extra: &[&str]) -> Args {
        let mut argv = vec!["launcher-fetch"];
        argv.extend_from_slice(extra);
        argv.push("https://example.com/a.zip");
        Args::try_parse_from(argv).expect("args should parse")
    }

    #[test]
    fn test_parse_config_partial_fields() {
        let cfg = parse_config_str(
            r#"
max_concurrent_downloads = 5
product = "TheBoys"
"#,
        )
        .expect("partial config should parse");
        assert_eq!(cfg.max_concurrent_downloads, Some(5));
        assert_eq!(cfg.product.as_deref(), Some("TheBoys"));
        assert!(cfg.max_attempts.is_none());
    }

    #[test]
    fn test_parse_config_supports_inline_comments() {
        let cfg = parse_config_str("max_attempts = 7 # installers\nbase_delay_ms = 250")
            .expect("config with comments should parse");
        assert_eq!(cfg.max_attempts, Some(7));
        assert_eq!(cfg.base_delay_ms, Some(250));
    }

    #[test]
    fn test_parse_config_rejects_invalid_concurrency() {
        let err = parse_config_str("max_concurrent_downloads = 0")
            .expect_err("invalid concurrency expected");
        assert!(err.to_string().contains("max_concurrent_downloads"));
    }

    #[test]
    fn test_parse_config_rejects_unknown_key() {
        let err = parse_config_str("rate_limit = 10").expect_err("unknown key expected");
        assert!(err.to_string().contains("rate_limit"));
    }

    #[test]
    fn test_parse_config_rejects_unquoted_string() {
        let err = parse_config_str("product = TheBoys").expect_err("quoted string expected");
        assert!(err.to_string().contains("product"));
    }

    #[test]
    fn test_parse_config_rejects_trailing_tokens() {
        let err = parse_config_str("max_attempts = 4 trailing").expect_err("trailing token error");
        assert!(err.to_string().contains("max_attempts"));
    }

    #[test]
    fn test_resolve_defaults_without_file() {
        let config = resolve_manager_config(&args(&[]), None);
        assert_eq!(config, ManagerConfig::default());
    }

    #[test]
    fn test_resolve_cli_overrides_file() {
        let file = FileConfig {
            max_concurrent_downloads: Some(5),
            max_attempts: Some(4),
            deadline_secs: Some(120),
            product: Some("TheBoys".to_string()),
            ..FileConfig::default()
        };
        let config = resolve_manager_config(&args(&["-c", "2"]), Some(&file));
        assert_eq!(config.max_concurrent_downloads, 2);
        assert_eq!(config.default_policy.max_attempts(), 4);
        assert_eq!(
            config.default_policy.attempt_deadline(),
            Duration::from_secs(120)
        );
        assert!(config.user_agent.to_string().starts_with("TheBoys-Downloader/"));
    }

    #[test]
    fn test_resolve_critical_uses_extended_budget() {
        let config = resolve_manager_config(&args(&["--critical"]), None);
        assert_eq!(
            config.default_policy.max_attempts(),
            launcher_fetch::CRITICAL_MAX_RETRIES
        );
    }
}
