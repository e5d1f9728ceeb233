//! Project configuration.
//!
//! Layered with the `config` crate: built-in defaults, then
//! `<project>/.shieldbox.yaml`, then `SHIELDBOX__*` environment overrides
//! (`SHIELDBOX__SANDBOX__NETWORK=true` maps to `sandbox.network`).

use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::paths::{CONFIG_FILE_NAME, SANDBOX_IMAGE};
use crate::types::RulesConfig;
use crate::{Error, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectConfig {
    pub sandbox: SandboxConfig,
    pub rules: RulesConfig,
    pub secrets: SecretsConfig,
    pub audit: AuditConfig,
}

/// Isolation settings for a sandbox container.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxConfig {
    /// Container image (pulled on first use).
    pub image: String,
    /// Enable container networking. Disabled unless explicitly set.
    pub network: bool,
    /// Host paths bound read-only at the same location inside the container.
    pub read_only: Vec<String>,
    /// Run under gVisor (`runsc`) for stronger isolation.
    pub use_gvisor: bool,
    /// Memory ceiling, e.g. `512m`, `2g`.
    pub memory_limit: Option<String>,
    /// CPU ceiling in cores.
    pub cpu_limit: Option<f64>,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            image: SANDBOX_IMAGE.to_string(),
            network: false,
            read_only: Vec::new(),
            use_gvisor: false,
            memory_limit: Some("2g".to_string()),
            cpu_limit: Some(2.0),
        }
    }
}

impl SandboxConfig {
    /// Memory ceiling in bytes, `None` when unset or unparsable.
    pub fn memory_bytes(&self) -> Option<i64> {
        self.memory_limit.as_deref().and_then(parse_memory_limit)
    }

    /// CPU ceiling in nano-CPUs, `None` when unset or not positive.
    pub fn nano_cpus(&self) -> Option<i64> {
        self.cpu_limit
            .filter(|c| *c > 0.0)
            .map(|c| (c * 1e9) as i64)
    }
}

/// Parse `512m`, `2g`, `1024k` or a raw byte count.
pub fn parse_memory_limit(s: &str) -> Option<i64> {
    let s = s.trim().to_ascii_lowercase();
    let s = s.strip_suffix('b').unwrap_or(&s);
    let (digits, multiplier) = match s.chars().last()? {
        'g' => (&s[..s.len() - 1], 1024 * 1024 * 1024),
        'm' => (&s[..s.len() - 1], 1024 * 1024),
        'k' => (&s[..s.len() - 1], 1024),
        _ => (s, 1),
    };
    let value: i64 = digits.trim().parse().ok()?;
    (value > 0).then(|| value.saturating_mul(multiplier))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SecretsConfig {
    /// Provider name: `env`, `1password`, `1password-env` or `vault`.
    pub provider: String,
    /// Keys (or provider references) to load and inject.
    pub keys: Vec<String>,
}

impl Default for SecretsConfig {
    fn default() -> Self {
        Self {
            provider: "env".to_string(),
            keys: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    pub enabled: bool,
    /// Relative paths are resolved against the project directory.
    pub log_dir: PathBuf,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            log_dir: PathBuf::from(".shieldbox/logs"),
        }
    }
}

impl AuditConfig {
    pub fn resolved_log_dir(&self, project_dir: &Path) -> PathBuf {
        if self.log_dir.is_absolute() {
            self.log_dir.clone()
        } else {
            project_dir.join(&self.log_dir)
        }
    }
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            sandbox: SandboxConfig::default(),
            rules: RulesConfig::recommended(),
            secrets: SecretsConfig::default(),
            audit: AuditConfig::default(),
        }
    }
}

impl ProjectConfig {
    /// Path of the project configuration file.
    pub fn path(project_dir: &Path) -> PathBuf {
        project_dir.join(CONFIG_FILE_NAME)
    }

    /// Whether the project has a configuration file.
    pub fn exists(project_dir: &Path) -> bool {
        Self::path(project_dir).is_file()
    }

    /// Load the layered configuration for `project_dir`.
    pub fn load(project_dir: &Path) -> Result<Self> {
        let defaults = Config::try_from(&Self::default())
            .map_err(|e| Error::config(format!("Failed to build defaults: {}", e)))?;

        let s = Config::builder()
            .add_source(defaults)
            .add_source(
                File::from(Self::path(project_dir))
                    .format(FileFormat::Yaml)
                    .required(false),
            )
            .add_source(
                Environment::with_prefix("SHIELDBOX")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| {
                Error::config(format!(
                    "Failed to read {}: {}",
                    Self::path(project_dir).display(),
                    e
                ))
            })?;

        s.try_deserialize()
            .map_err(|e| Error::config(format!("Invalid configuration: {}", e)))
    }

    /// Write the configuration as YAML to the project directory.
    pub fn save(&self, project_dir: &Path) -> Result<()> {
        let body = serde_yaml::to_string(self)
            .map_err(|e| Error::config(format!("Failed to serialize config: {}", e)))?;
        let content = format!("# Shieldbox configuration\n\n{}", body);
        let path = Self::path(project_dir);

        let mut options = std::fs::OpenOptions::new();
        options.create(true).write(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};
            options.mode(0o600);
            // `mode` only applies on creation.
            if path.exists() {
                std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600))?;
            }
        }
        let mut file = options.open(&path)?;
        file.write_all(content.as_bytes())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_memory_limit() {
        assert_eq!(parse_memory_limit("2g"), Some(2 * 1024 * 1024 * 1024));
        assert_eq!(parse_memory_limit("512m"), Some(512 * 1024 * 1024));
        assert_eq!(parse_memory_limit("512MB"), Some(512 * 1024 * 1024));
        assert_eq!(parse_memory_limit("1024k"), Some(1024 * 1024));
        assert_eq!(parse_memory_limit("4096"), Some(4096));
        assert_eq!(parse_memory_limit("lots"), None);
        assert_eq!(parse_memory_limit(""), None);
        assert_eq!(parse_memory_limit("0g"), None);
    }

    #[test]
    fn test_sandbox_defaults_are_locked_down() {
        let cfg = SandboxConfig::default();
        assert!(!cfg.network);
        assert!(!cfg.use_gvisor);
        assert_eq!(cfg.nano_cpus(), Some(2_000_000_000));
        assert_eq!(cfg.memory_bytes(), Some(2 * 1024 * 1024 * 1024));
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        assert!(!ProjectConfig::exists(dir.path()));

        let mut cfg = ProjectConfig::default();
        cfg.sandbox.network = true;
        cfg.sandbox.read_only = vec!["/opt/toolchain".into()];
        cfg.save(dir.path()).unwrap();
        assert!(ProjectConfig::exists(dir.path()));

        let loaded = ProjectConfig::load(dir.path()).unwrap();
        assert!(loaded.sandbox.network);
        assert_eq!(loaded.sandbox.read_only, vec!["/opt/toolchain".to_string()]);
        assert_eq!(loaded.rules, RulesConfig::recommended());
    }

    #[cfg(unix)]
    #[test]
    fn test_saved_config_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = ProjectConfig::path(dir.path());
        std::fs::write(&path, "sandbox: {}\n").unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o644)).unwrap();

        ProjectConfig::default().save(dir.path()).unwrap();
        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
        assert!(std::fs::read_to_string(&path)
            .unwrap()
            .starts_with("# Shieldbox configuration"));
    }

    #[test]
    fn test_load_without_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = ProjectConfig::load(dir.path()).unwrap();
        assert_eq!(loaded.secrets.provider, "env");
        assert!(loaded.audit.enabled);
        assert_eq!(
            loaded.audit.resolved_log_dir(dir.path()),
            dir.path().join(".shieldbox/logs")
        );
    }
}
