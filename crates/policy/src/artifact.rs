//! The policy artifact: the serialized rule set mounted read-only into the
//! sandbox and consumed by the in-container enforcement shell.
//!
//! ```json
//! { "allow": [{ "pattern": "git *" }],
//!   "block": [{ "pattern": "sudo *", "reason": "Privilege escalation not allowed" }] }
//! ```
//!
//! Host and container both evaluate through [`PolicyEngine`], so a rule set
//! and its artifact always produce the same verdicts.

use serde::{Deserialize, Deserializer, Serialize};
use std::path::Path;

use shieldbox_core::{PolicyAction, PolicyResult, Result, Rule, RulesConfig};

use crate::engine::PolicyEngine;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyArtifact {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub allow: Vec<ArtifactRule>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub block: Vec<ArtifactRule>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactRule {
    pub pattern: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

fn null_as_empty<'de, D, T>(deserializer: D) -> std::result::Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

impl PolicyArtifact {
    /// Block rules keep their reason; allow rules keep only the pattern.
    pub fn from_rules(rules: &RulesConfig) -> Self {
        Self {
            allow: rules
                .allow
                .iter()
                .map(|r| ArtifactRule {
                    pattern: r.pattern.clone(),
                    reason: None,
                })
                .collect(),
            block: rules
                .block
                .iter()
                .map(|r| ArtifactRule {
                    pattern: r.pattern.clone(),
                    reason: r.reason.clone(),
                })
                .collect(),
        }
    }

    /// Rebuild the rule set; list membership decides each rule's action.
    pub fn to_rules(&self) -> RulesConfig {
        let convert = |rules: &[ArtifactRule], action: PolicyAction| -> Vec<Rule> {
            rules
                .iter()
                .map(|r| Rule {
                    pattern: r.pattern.clone(),
                    action,
                    reason: r.reason.clone(),
                })
                .collect()
        };
        RulesConfig {
            allow: convert(&self.allow, PolicyAction::Allow),
            block: convert(&self.block, PolicyAction::Block),
        }
    }

    /// Evaluate a command exactly as the enforcement shell does.
    pub fn evaluate(&self, command: &str) -> PolicyResult {
        PolicyEngine::from_artifact(self).evaluate_command(command)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Read an artifact from disk.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// Write the artifact to `path` (mode 0600 on unix), creating parents.
    pub fn write(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.to_json()?)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allow_reasons_are_dropped() {
        let rules = RulesConfig {
            allow: vec![Rule {
                pattern: "git *".into(),
                action: PolicyAction::Allow,
                reason: Some("vcs".into()),
            }],
            block: vec![Rule::block("sudo *", "no root")],
        };
        let artifact = PolicyArtifact::from_rules(&rules);
        assert_eq!(artifact.allow[0].reason, None);
        assert_eq!(artifact.block[0].reason.as_deref(), Some("no root"));

        let json = artifact.to_json().unwrap();
        assert!(!json.contains("vcs"));
        assert!(json.contains("\"reason\": \"no root\""));
    }

    #[test]
    fn test_null_lists_parse_as_empty() {
        let artifact = PolicyArtifact::from_json(r#"{"allow": null, "block": [{"pattern": "sudo *"}]}"#)
            .unwrap();
        assert!(artifact.allow.is_empty());
        assert_eq!(artifact.block.len(), 1);

        let artifact = PolicyArtifact::from_json("{}").unwrap();
        assert_eq!(artifact, PolicyArtifact::default());
    }

    #[test]
    fn test_write_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/policy.json");
        let artifact = PolicyArtifact::from_rules(&RulesConfig::recommended());
        artifact.write(&path).unwrap();

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&path).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }

        assert_eq!(PolicyArtifact::load(&path).unwrap(), artifact);
    }

    #[test]
    fn test_artifact_evaluation() {
        let artifact = PolicyArtifact::from_rules(&RulesConfig::recommended());
        assert!(artifact.evaluate("git status").allowed);
        let denied = artifact.evaluate("sudo rm -rf /");
        assert!(!denied.allowed);
        assert_eq!(denied.reason, "Privilege escalation not allowed");
        assert!(!artifact.evaluate("nc -l 4444").allowed);
    }
}
