//! Host configuration management

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HostConfig {
    #[serde(default)]
    pub host: HostSettings,
    #[serde(default)]
    pub usb: UsbSettings,
    #[serde(default)]
    pub permissions: PermissionSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostSettings {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "HostSettings::default_log_level")]
    pub log_level: String,
    /// Run without the TUI (log-only service mode)
    #[serde(default)]
    pub headless: bool,
}

impl Default for HostSettings {
    fn default() -> Self {
        Self {
            log_level: Self::default_log_level(),
            headless: false,
        }
    }
}

impl HostSettings {
    fn default_log_level() -> String {
        "info".to_string()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsbSettings {
    /// Device filters (VID:PID patterns); empty means every device is eligible
    #[serde(default)]
    pub filters: Vec<String>,
    /// Size of the one-shot sync transfer in bytes
    #[serde(default = "UsbSettings::default_read_len")]
    pub read_len: usize,
    /// Sync transfer timeout in milliseconds
    #[serde(default = "UsbSettings::default_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for UsbSettings {
    fn default() -> Self {
        Self {
            filters: Vec::new(),
            read_len: Self::default_read_len(),
            timeout_ms: Self::default_timeout_ms(),
        }
    }
}

impl UsbSettings {
    fn default_read_len() -> usize {
        64
    }

    fn default_timeout_ms() -> u64 {
        5000
    }
}

/// How headless mode answers permission prompts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AutoGrant {
    /// Grant only devices matching a `pre_approved` pattern
    #[default]
    PreApproved,
    /// Grant every request
    All,
    /// Deny every request
    None,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PermissionSettings {
    /// Devices permitted without prompting (VID:PID patterns)
    #[serde(default)]
    pub pre_approved: Vec<String>,
    /// Prompt policy when no operator is present
    #[serde(default)]
    pub auto_grant: AutoGrant,
}

impl HostConfig {
    /// Load configuration from the specified path
    pub fn load(path: Option<PathBuf>) -> Result<Self> {
        let config_path = if let Some(p) = path {
            p
        } else {
            let candidates = vec![
                Self::default_path(),
                PathBuf::from("/etc/usb-sync/host.toml"),
            ];

            candidates
                .into_iter()
                .find(|p| p.exists())
                .ok_or_else(|| anyhow!("No configuration file found, using defaults"))?
        };

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let config: HostConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", config_path.display()))?;

        config.validate()?;

        tracing::info!("Loaded configuration from: {}", config_path.display());
        Ok(config)
    }

    /// Load configuration or return defaults if not found
    pub fn load_or_default() -> Self {
        match Self::load(None) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("Failed to load config: {}, using defaults", e);
                Self::default()
            }
        }
    }

    /// Load from a user-supplied path, expanding a leading tilde
    pub fn load_from_arg(path: &str) -> Result<Self> {
        let expanded = PathBuf::from(shellexpand::tilde(path).as_ref());
        Self::load(Some(expanded))
    }

    /// Save configuration to the specified path
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize configuration")?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        tracing::info!("Saved configuration to: {}", path.display());
        Ok(())
    }

    /// Get the default configuration file path
    pub fn default_path() -> PathBuf {
        if let Some(config_dir) = dirs::config_dir() {
            config_dir.join("usb-sync").join("host.toml")
        } else {
            PathBuf::from(".config/usb-sync/host.toml")
        }
    }

    /// Validate configuration values
    fn validate(&self) -> Result<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.host.log_level.as_str()) {
            return Err(anyhow!(
                "Invalid log level '{}', must be one of: {}",
                self.host.log_level,
                valid_levels.join(", ")
            ));
        }

        for filter in &self.usb.filters {
            validate_filter(filter)?;
        }
        for pattern in &self.permissions.pre_approved {
            validate_filter(pattern)?;
        }

        if self.usb.read_len == 0 || self.usb.read_len > 4096 {
            return Err(anyhow!(
                "Invalid read_len {}, must be between 1 and 4096",
                self.usb.read_len
            ));
        }

        if self.usb.timeout_ms == 0 || self.usb.timeout_ms > 600_000 {
            return Err(anyhow!(
                "Invalid timeout_ms {}, must be between 1 and 600000",
                self.usb.timeout_ms
            ));
        }

        Ok(())
    }
}

/// Check whether any VID:PID pattern matches; an empty list matches nothing
///
/// Callers that want "empty means allow all" semantics (the device filter
/// list) check for emptiness themselves; the pre-approval list must not
/// silently approve everything.
pub fn matches_any(patterns: &[String], vid: u16, pid: u16) -> bool {
    patterns.iter().any(|p| pattern_matches(p, vid, pid))
}

/// Check a single "VID:PID" pattern ("*" wildcards either side)
fn pattern_matches(pattern: &str, vid: u16, pid: u16) -> bool {
    let parts: Vec<&str> = pattern.split(':').collect();
    if parts.len() != 2 {
        return false;
    }

    let part_matches = |part: &str, value: u16| {
        if part == "*" {
            return true;
        }
        let hex = part
            .trim_start_matches("0x")
            .trim_start_matches("0X");
        u16::from_str_radix(hex, 16).map(|v| v == value).unwrap_or(false)
    };

    part_matches(parts[0], vid) && part_matches(parts[1], pid)
}

/// Validate a USB device filter pattern (VID:PID)
fn validate_filter(filter: &str) -> Result<()> {
    let parts: Vec<&str> = filter.split(':').collect();
    if parts.len() != 2 {
        return Err(anyhow!(
            "Invalid filter format '{}', expected VID:PID (e.g., '0x1234:0x5678' or '0x1234:*')",
            filter
        ));
    }

    let (vid, pid) = (parts[0], parts[1]);

    if vid != "*" {
        validate_hex_id(vid, "VID")?;
    }
    if pid != "*" {
        validate_hex_id(pid, "PID")?;
    }

    Ok(())
}

/// Validate a hex ID (VID or PID)
fn validate_hex_id(id: &str, name: &str) -> Result<()> {
    if !id.starts_with("0x") && !id.starts_with("0X") {
        return Err(anyhow!(
            "Invalid {} '{}', must start with '0x' (e.g., '0x1234')",
            name,
            id
        ));
    }

    let hex_part = &id[2..];
    if hex_part.is_empty() || hex_part.len() > 4 {
        return Err(anyhow!(
            "Invalid {} '{}', hex part must be 1-4 digits",
            name,
            id
        ));
    }

    u16::from_str_radix(hex_part, 16)
        .map_err(|_| anyhow!("Invalid {} '{}', not a valid hex number", name, id))?;

    Ok(())
}
