//! Shared fixture rule sets evaluated through every host-side path.
//!
//! The same fixture file is replayed by the enforcement shell's tests, so
//! host and container verdicts are pinned to one set of expectations.

use serde::Deserialize;

use shieldbox_policy::{PolicyArtifact, PolicyEngine};

#[derive(Debug, Deserialize)]
struct Fixture {
    name: String,
    policy: PolicyArtifact,
    cases: Vec<Case>,
}

#[derive(Debug, Deserialize)]
struct Case {
    command: String,
    allowed: bool,
    pattern: Option<String>,
    reason: Option<String>,
}

fn fixtures() -> Vec<Fixture> {
    let path = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures/policy_cases.yaml");
    let content = std::fs::read_to_string(path).unwrap();
    serde_yaml::from_str(&content).unwrap()
}

#[test]
fn test_host_engine_matches_fixtures() {
    for fixture in fixtures() {
        let engine = PolicyEngine::new(fixture.policy.to_rules());
        for case in &fixture.cases {
            let result = engine.evaluate_command(&case.command);
            assert_eq!(
                result.allowed, case.allowed,
                "[{}] {:?}: {}",
                fixture.name, case.command, result.reason
            );
            assert_eq!(
                result.matched_rule.as_ref().map(|r| r.pattern.as_str()),
                case.pattern.as_deref(),
                "[{}] {:?}",
                fixture.name,
                case.command
            );
            if let Some(reason) = &case.reason {
                assert_eq!(&result.reason, reason, "[{}] {:?}", fixture.name, case.command);
            }
        }
    }
}

#[test]
fn test_serialized_artifact_agrees_with_host_engine() {
    for fixture in fixtures() {
        let host = PolicyEngine::new(fixture.policy.to_rules());
        let json = host.to_artifact().to_json().unwrap();
        let shipped = PolicyArtifact::from_json(&json).unwrap();

        for case in &fixture.cases {
            let on_host = host.evaluate_command(&case.command);
            let in_container = shipped.evaluate(&case.command);
            assert_eq!(on_host.allowed, in_container.allowed, "[{}] {:?}", fixture.name, case.command);
            assert_eq!(on_host.reason, in_container.reason, "[{}] {:?}", fixture.name, case.command);
            assert_eq!(
                on_host.matched_rule.map(|r| r.pattern),
                in_container.matched_rule.map(|r| r.pattern),
            );
        }
    }
}
