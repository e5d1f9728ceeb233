use serde::{Deserialize, Serialize};

/// What a matching rule does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PolicyAction {
    Allow,
    #[default]
    Block,
}

impl std::fmt::Display for PolicyAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Allow => f.write_str("allow"),
            Self::Block => f.write_str("block"),
        }
    }
}

/// A single command rule. Position within its list decides precedence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    pub pattern: String,
    #[serde(default)]
    pub action: PolicyAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl Rule {
    /// An allow rule.
    pub fn allow(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            action: PolicyAction::Allow,
            reason: None,
        }
    }

    /// A block rule with a human-readable reason.
    pub fn block(pattern: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            action: PolicyAction::Block,
            reason: Some(reason.into()),
        }
    }
}

/// Allow and block rule lists, each evaluated in order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RulesConfig {
    #[serde(default)]
    pub allow: Vec<Rule>,
    #[serde(default)]
    pub block: Vec<Rule>,
}

impl RulesConfig {
    /// The rule set a freshly initialised project starts with.
    pub fn recommended() -> Self {
        let allow = [
            "git *", "npm *", "node *", "python *", "pip *", "go *", "cargo *", "make *",
            "cat *", "ls *", "find *", "grep *",
        ]
        .into_iter()
        .map(Rule::allow)
        .collect();

        let block = vec![
            Rule::block("sudo *", "Privilege escalation not allowed"),
            Rule::block("rm -rf /", "Root filesystem deletion blocked"),
            Rule::block("rm -rf /*", "Root filesystem deletion blocked"),
            Rule::block("chmod 777 *", "Overly permissive permissions blocked"),
            Rule::block("curl * | sh", "Remote code execution blocked"),
            Rule::block("curl * | bash", "Remote code execution blocked"),
            Rule::block("wget * | sh", "Remote code execution blocked"),
            Rule::block("dd if=*", "Raw disk access blocked"),
            Rule::block("mkfs.*", "Filesystem formatting blocked"),
            Rule::block(":(){ :|:& };:", "Fork bomb blocked"),
        ];

        Self { allow, block }
    }
}

/// Outcome of one policy evaluation. Produced fresh per call.
///
/// A blocked result always carries a non-empty `reason`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyResult {
    pub allowed: bool,
    pub action: PolicyAction,
    pub matched_rule: Option<Rule>,
    pub reason: String,
}

impl PolicyResult {
    /// An allow verdict.
    pub fn allow(matched_rule: Option<Rule>, reason: impl Into<String>) -> Self {
        Self {
            allowed: true,
            action: PolicyAction::Allow,
            matched_rule,
            reason: reason.into(),
        }
    }

    /// A block verdict. An empty reason is replaced with a generic one.
    pub fn block(matched_rule: Option<Rule>, reason: impl Into<String>) -> Self {
        let mut reason = reason.into();
        if reason.trim().is_empty() {
            reason = match &matched_rule {
                Some(rule) => format!("matched block rule '{}'", rule.pattern),
                None => "blocked by policy".to_string(),
            };
        }
        Self {
            allowed: false,
            action: PolicyAction::Block,
            matched_rule,
            reason,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_without_reason_gets_one() {
        let result = PolicyResult::block(Some(Rule::allow("rm *")), "");
        assert!(!result.allowed);
        assert!(result.reason.contains("rm *"));

        let result = PolicyResult::block(None, "  ");
        assert_eq!(result.reason, "blocked by policy");
    }

    #[test]
    fn test_rule_action_defaults_to_block() {
        let rule: Rule = serde_yaml::from_str("pattern: \"sudo *\"").unwrap();
        assert_eq!(rule.action, PolicyAction::Block);
        assert_eq!(rule.reason, None);
    }

    #[test]
    fn test_recommended_rules_have_reasons() {
        let rules = RulesConfig::recommended();
        assert!(rules.block.iter().all(|r| r.reason.is_some()));
        assert!(rules.allow.iter().any(|r| r.pattern == "git *"));
    }
}
