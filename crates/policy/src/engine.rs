//! Command and file-access policy evaluation.
//!
//! The engine is a pure function over an immutable rule set: it holds no
//! mutable state, so a single instance can be shared across threads behind
//! an `Arc` without synchronization.

use std::path::{Component, Path, PathBuf};

use shieldbox_core::paths::WORKSPACE_MOUNT;
use shieldbox_core::{PolicyResult, ProjectConfig, Rule, RulesConfig};

use crate::artifact::PolicyArtifact;
use crate::matcher::CommandPattern;

/// Reason attached to commands no rule matched.
pub const NOT_IN_ALLOWLIST: &str = "Command not in allowlist";

const SENSITIVE_FILES: &[&str] = &[
    ".env",
    ".npmrc",
    ".pypirc",
    ".bash_history",
    ".zsh_history",
    ".gitconfig",
    "id_rsa",
    "id_ed25519",
];

const SENSITIVE_DIRS: &[&str] = &[".ssh", ".aws", ".gnupg"];

struct CompiledRule {
    rule: Rule,
    pattern: CommandPattern,
}

impl CompiledRule {
    fn compile(rules: &[Rule]) -> Vec<Self> {
        rules
            .iter()
            .map(|rule| Self {
                pattern: CommandPattern::new(rule.pattern.clone()),
                rule: rule.clone(),
            })
            .collect()
    }
}

/// Evaluates commands and file paths against a rule set.
pub struct PolicyEngine {
    rules: RulesConfig,
    allow: Vec<CompiledRule>,
    block: Vec<CompiledRule>,
    workspace_root: PathBuf,
}

impl std::fmt::Debug for PolicyEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PolicyEngine")
            .field("allow", &self.rules.allow.len())
            .field("block", &self.rules.block.len())
            .field("workspace_root", &self.workspace_root)
            .finish()
    }
}

impl PolicyEngine {
    /// Create an engine over `rules`, with the standard workspace root.
    pub fn new(rules: RulesConfig) -> Self {
        Self {
            allow: CompiledRule::compile(&rules.allow),
            block: CompiledRule::compile(&rules.block),
            rules,
            workspace_root: PathBuf::from(WORKSPACE_MOUNT),
        }
    }

    /// Create an engine from a project configuration.
    pub fn from_config(config: &ProjectConfig) -> Self {
        Self::new(config.rules.clone())
    }

    /// Create an engine from a serialized policy artifact.
    pub fn from_artifact(artifact: &PolicyArtifact) -> Self {
        Self::new(artifact.to_rules())
    }

    /// Override the root that file access is confined to.
    pub fn with_workspace_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.workspace_root = root.into();
        self
    }

    /// The rule set this engine evaluates.
    pub fn rules(&self) -> &RulesConfig {
        &self.rules
    }

    /// Serialize the rule set into the artifact consumed inside the sandbox.
    pub fn to_artifact(&self) -> PolicyArtifact {
        PolicyArtifact::from_rules(&self.rules)
    }

    /// Decide whether `command` may run.
    ///
    /// Block rules are scanned first and win over any allow rule; commands no
    /// rule matches are blocked.
    pub fn evaluate_command(&self, command: &str) -> PolicyResult {
        let command = command.trim();

        if let Some(hit) = self.block.iter().find(|r| r.pattern.matches(command)) {
            return PolicyResult::block(
                Some(hit.rule.clone()),
                hit.rule.reason.clone().unwrap_or_default(),
            );
        }

        if let Some(hit) = self.allow.iter().find(|r| r.pattern.matches(command)) {
            return PolicyResult::allow(Some(hit.rule.clone()), "");
        }

        PolicyResult::block(None, NOT_IN_ALLOWLIST)
    }

    /// Decide whether `path` may be read or written from inside the sandbox.
    ///
    /// Credential-bearing files and directories are blocked wherever they
    /// live; everything else must resolve under the workspace root. Relative
    /// paths are taken relative to the workspace root.
    pub fn evaluate_file_access(&self, path: impl AsRef<Path>) -> PolicyResult {
        let raw = path.as_ref();
        let display = raw.display().to_string();
        let normalized = normalize(&self.workspace_root.join(raw));

        if is_sensitive(&normalized) || is_sensitive(raw) {
            return PolicyResult::block(
                None,
                format!("Access to sensitive file blocked: {}", display),
            );
        }

        if normalized.starts_with(&self.workspace_root) {
            PolicyResult::allow(None, "")
        } else {
            PolicyResult::block(
                None,
                format!("Access outside workspace blocked: {}", display),
            )
        }
    }
}

fn is_sensitive(path: &Path) -> bool {
    let base = path
        .file_name()
        .map(|b| b.to_string_lossy())
        .unwrap_or_default();

    if SENSITIVE_FILES.contains(&base.as_ref()) || base.starts_with(".env.") {
        return true;
    }

    let has_component = |name: &str| {
        path.components()
            .any(|c| matches!(c, Component::Normal(n) if n == name))
    };

    if SENSITIVE_DIRS.iter().any(|dir| has_component(dir)) {
        return true;
    }

    // Docker registry credentials.
    base == "config.json" && has_component(".docker")
}

/// Lexically resolve `.` and `..` without touching the filesystem.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::ParentDir => {
                out.pop();
            }
            Component::CurDir => {}
            other => out.push(other.as_os_str()),
        }
    }
    out
}
