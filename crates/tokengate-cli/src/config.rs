use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;
use url::Url;

use tokengate_core::GateSettings;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokengateConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub gate: GateSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: SocketAddr,
    #[serde(default = "default_upstream")]
    pub upstream: String,
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_bind() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8080))
}

fn default_upstream() -> String {
    "http://127.0.0.1:3000".to_string()
}

fn default_max_body_bytes() -> usize {
    10 * 1024 * 1024
}

fn default_timeout_secs() -> u64 {
    30
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            upstream: default_upstream(),
            max_body_bytes: default_max_body_bytes(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl ServerConfig {
    pub fn upstream_url(&self) -> Result<Url> {
        let url = Url::parse(&self.upstream)
            .with_context(|| format!("Invalid upstream URL '{}'", self.upstream))?;
        if !matches!(url.scheme(), "http" | "https") {
            anyhow::bail!(
                "Upstream URL '{}' must use http or https, not '{}'",
                self.upstream,
                url.scheme()
            );
        }
        Ok(url)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Mask a secret string for safe display.
/// Shows first 3 and last 4 chars for values longer than 7 chars, otherwise "***".
pub fn mask_secret(s: &str) -> String {
    if s.is_empty() {
        return "(empty)".to_string();
    }
    let chars: Vec<char> = s.chars().collect();
    if chars.len() > 7 {
        let prefix: String = chars[..3].iter().collect();
        let suffix: String = chars[chars.len() - 4..].iter().collect();
        format!("{}...{}", prefix, suffix)
    } else {
        "***".to_string()
    }
}

pub fn config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".tokengate")
}

pub fn default_config_path() -> PathBuf {
    config_dir().join("config.toml")
}

impl TokengateConfig {
    pub fn load(custom_path: &Option<PathBuf>) -> Result<Self> {
        let path = custom_path.clone().unwrap_or_else(default_config_path);
        check_permissions(&path)?;

        let content = std::fs::read_to_string(&path).with_context(|| {
            format!(
                "Failed to read config at {}. Run `tokengate init` first.",
                path.display()
            )
        })?;

        Self::from_toml(&content)
            .with_context(|| format!("Failed to parse config at {}", path.display()))
    }

    /// Parse config text, expanding allow-listed `${VAR}` references first.
    pub fn from_toml(content: &str) -> Result<Self> {
        let hardcoded = count_hardcoded_tokens(content);
        if hardcoded > 0 {
            warn!(
                "{} token(s) are hardcoded in the config file. For security, use environment variables: allowed_tokens = [\"${{TOKENGATE_TOKEN}}\"]",
                hardcoded
            );
        }

        let expanded = expand_env_vars(content);
        let config: Self = toml::from_str(&expanded)?;
        Ok(config)
    }

    /// Copy suitable for printing: every token masked.
    pub fn masked(&self) -> Self {
        let mut copy = self.clone();
        copy.gate.allowed_tokens = copy
            .gate
            .allowed_tokens
            .iter()
            .map(|t| mask_secret(t))
            .collect();
        copy
    }
}

/// Count literal (non `${VAR}`) entries in `gate.allowed_tokens` before expansion.
fn count_hardcoded_tokens(content: &str) -> usize {
    let Ok(table) = content.parse::<toml::Table>() else {
        return 0;
    };
    table
        .get("gate")
        .and_then(|gate| gate.get("allowed_tokens").or_else(|| gate.get("allowedTokens")))
        .and_then(|tokens| tokens.as_array())
        .map(|tokens| {
            tokens
                .iter()
                .filter_map(|t| t.as_str())
                .filter(|t| !t.is_empty() && !t.contains("${"))
                .count()
        })
        .unwrap_or(0)
}

/// Refuse a config that group or other can read; it holds secrets.
fn check_permissions(path: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if let Ok(metadata) = std::fs::metadata(path) {
            let mode = metadata.permissions().mode();
            if mode & 0o077 != 0 {
                return Err(anyhow::anyhow!(
                    "Config file {:?} has overly permissive permissions ({:o}). \
                     It may contain secrets. Fix with: chmod 600 {:?}",
                    path,
                    mode & 0o777,
                    path
                ));
            }
        }
    }
    #[cfg(not(unix))]
    let _ = path;
    Ok(())
}

/// Allowlist of environment variable names that may be expanded in config files.
/// An attacker who can edit the config must not be able to read arbitrary env vars.
const ALLOWED_ENV_VARS: &[&str] = &[
    "TOKENGATE_TOKEN",
    "TOKENGATE_TOKEN_2",
    "TOKENGATE_TOKEN_3",
    "TOKENGATE_UPSTREAM",
    "HOME",
    "USER",
];

fn expand_env_vars(s: &str) -> String {
    expand_vars_with(s, |name| std::env::var(name).ok())
}

/// Escape a value for a TOML basic string, so an expanded variable can
/// neither end the string it sits in nor add keys of its own.
fn escape_toml_basic(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c.is_control() => out.push_str(&format!("\\u{:04X}", c as u32)),
            c => out.push(c),
        }
    }
    out
}

fn expand_vars_with(s: &str, lookup: impl Fn(&str) -> Option<String>) -> String {
    let mut result = s.to_string();
    let mut pos = 0;
    while pos < result.len() {
        let Some(start) = result[pos..].find("${") else {
            break;
        };
        let abs_start = pos + start;
        let Some(end) = result[abs_start..].find('}') else {
            break;
        };
        let var_name = result[abs_start + 2..abs_start + end].to_string();

        if !ALLOWED_ENV_VARS.contains(&var_name.as_str()) {
            warn!(
                "Skipping expansion of unrecognized env var '{}' in config (not in allowlist)",
                var_name
            );
            // Leave the ${VAR} unexpanded so it's obvious
            pos = abs_start + end + 1;
            continue;
        }

        let raw = lookup(&var_name).unwrap_or_else(|| {
            warn!("Env var '{}' referenced in config is not set", var_name);
            String::new()
        });
        let value = escape_toml_basic(&raw);
        result.replace_range(abs_start..abs_start + end + 1, &value);
        pos = abs_start + value.len();
    }
    result
}
