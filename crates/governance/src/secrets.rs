//! Secret providers.
//!
//! Secrets are resolved once, at session creation, and handed to the
//! sandbox as container environment variables. Values are wrapped in
//! [`SecretString`] so they never reach logs through `Debug`.

use secrecy::SecretString;
use std::collections::HashMap;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use shieldbox_core::{Error, Result, SecretsConfig};

/// Loaded secrets keyed by the configured key string.
pub type SecretMap = HashMap<String, SecretString>;

/// Source a project's secrets are read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecretProvider {
    /// Process environment of the supervisor.
    Env,
    /// `op read` per key.
    OnePassword,
    /// A single `op inject` over a `KEY={{ KEY }}` template.
    OnePasswordInject,
    /// `vault kv get`; keys are `path#field`.
    Vault,
}

impl SecretProvider {
    pub const ALL: [SecretProvider; 4] = [
        SecretProvider::Env,
        SecretProvider::OnePassword,
        SecretProvider::OnePasswordInject,
        SecretProvider::Vault,
    ];

    /// Resolve a provider from its configuration name.
    pub fn from_name(name: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|p| p.name() == name)
            .ok_or_else(|| {
                let known: Vec<&str> = Self::ALL.iter().map(|p| p.name()).collect();
                Error::secrets(format!(
                    "unknown secret provider '{}', available: {}",
                    name,
                    known.join(", ")
                ))
            })
    }

    pub fn name(&self) -> &'static str {
        match self {
            SecretProvider::Env => "env",
            SecretProvider::OnePassword => "1password",
            SecretProvider::OnePasswordInject => "1password-env",
            SecretProvider::Vault => "vault",
        }
    }

    /// Whether the provider can be used on this host.
    pub fn available(&self) -> bool {
        match self {
            SecretProvider::Env => true,
            SecretProvider::OnePassword | SecretProvider::OnePasswordInject => on_path("op"),
            SecretProvider::Vault => on_path("vault"),
        }
    }

    /// Load every key. Any key that cannot be resolved fails the whole load.
    pub async fn load(&self, keys: &[String]) -> Result<SecretMap> {
        match self {
            SecretProvider::Env => load_env(keys),
            SecretProvider::OnePassword => load_op_read(keys).await,
            SecretProvider::OnePasswordInject => load_op_inject(keys).await,
            SecretProvider::Vault => load_vault(keys).await,
        }
    }
}

/// Load the configured secrets, refusing providers missing on this host.
pub async fn load_secrets(config: &SecretsConfig) -> Result<SecretMap> {
    let provider = SecretProvider::from_name(&config.provider)?;
    if config.keys.is_empty() {
        return Ok(SecretMap::new());
    }
    if !provider.available() {
        return Err(Error::secrets(format!(
            "secret provider '{}' is not available on this system",
            provider.name()
        )));
    }

    let secrets = provider.load(&config.keys).await?;
    tracing::debug!(provider = provider.name(), count = secrets.len(), "Secrets loaded");
    Ok(secrets)
}

fn on_path(binary: &str) -> bool {
    std::env::var_os("PATH")
        .map(|paths| std::env::split_paths(&paths).any(|dir| dir.join(binary).is_file()))
        .unwrap_or(false)
}

fn load_env(keys: &[String]) -> Result<SecretMap> {
    let mut secrets = SecretMap::new();
    let mut missing = Vec::new();

    for key in keys {
        match std::env::var(key) {
            Ok(value) if !value.is_empty() => {
                secrets.insert(key.clone(), SecretString::new(value));
            }
            _ => missing.push(key.as_str()),
        }
    }

    if !missing.is_empty() {
        return Err(Error::secrets(format!(
            "environment variables not set: {}",
            missing.join(", ")
        )));
    }
    Ok(secrets)
}

async fn run_cli(program: &str, args: &[&str], stdin: Option<&str>) -> Result<String> {
    let mut child = Command::new(program)
        .args(args)
        .stdin(if stdin.is_some() { Stdio::piped() } else { Stdio::null() })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| Error::secrets(format!("{}: failed to start: {}", program, e)))?;

    if let (Some(input), Some(mut pipe)) = (stdin, child.stdin.take()) {
        pipe.write_all(input.as_bytes())
            .await
            .map_err(|e| Error::secrets(format!("{}: failed to write stdin: {}", program, e)))?;
    }

    let output = child
        .wait_with_output()
        .await
        .map_err(|e| Error::secrets(format!("{}: {}", program, e)))?;

    if !output.status.success() {
        return Err(Error::secrets(format!(
            "{} {} failed: {}",
            program,
            args.first().copied().unwrap_or_default(),
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// `vault/item/field` and `op://vault/item/field` are both accepted.
fn op_reference(key: &str) -> String {
    if key.starts_with("op://") {
        key.to_string()
    } else {
        format!("op://{}", key)
    }
}

async fn load_op_read(keys: &[String]) -> Result<SecretMap> {
    let mut secrets = SecretMap::new();
    for key in keys {
        let reference = op_reference(key);
        let value = run_cli("op", &["read", &reference], None)
            .await
            .map_err(|e| Error::secrets(format!("1password: failed to read '{}': {}", key, e)))?;
        secrets.insert(key.clone(), SecretString::new(value.trim().to_string()));
    }
    Ok(secrets)
}

fn inject_template(keys: &[String]) -> String {
    keys.iter()
        .map(|key| format!("{}={{{{ {} }}}}\n", key, key))
        .collect()
}

fn parse_injected(output: &str) -> SecretMap {
    output
        .trim()
        .lines()
        .filter_map(|line| line.split_once('='))
        .map(|(k, v)| (k.to_string(), SecretString::new(v.to_string())))
        .collect()
}

async fn load_op_inject(keys: &[String]) -> Result<SecretMap> {
    let output = run_cli("op", &["inject"], Some(&inject_template(keys)))
        .await
        .map_err(|e| Error::secrets(format!("1password inject: {}", e)))?;
    Ok(parse_injected(&output))
}

/// `secret/data/app#token` → (`secret/data/app`, `token`); field defaults to `value`.
fn vault_reference(key: &str) -> (&str, &str) {
    key.split_once('#').unwrap_or((key, "value"))
}

fn vault_field(response: &str, path: &str, field: &str) -> Result<String> {
    let json: serde_json::Value = serde_json::from_str(response)
        .map_err(|e| Error::secrets(format!("vault: failed to parse response for '{}': {}", path, e)))?;

    match json.pointer(&format!("/data/data/{}", field)) {
        Some(serde_json::Value::String(s)) => Ok(s.clone()),
        Some(serde_json::Value::Null) | None => Err(Error::secrets(format!(
            "vault: field '{}' not found in '{}'",
            field, path
        ))),
        Some(other) => Ok(other.to_string()),
    }
}

async fn load_vault(keys: &[String]) -> Result<SecretMap> {
    let mut secrets = SecretMap::new();
    for key in keys {
        let (path, field) = vault_reference(key);
        let response = run_cli("vault", &["kv", "get", "-format=json", path], None)
            .await
            .map_err(|e| Error::secrets(format!("vault: failed to read '{}': {}", key, e)))?;
        secrets.insert(key.clone(), SecretString::new(vault_field(&response, path, field)?));
    }
    Ok(secrets)
}
