//! End-to-end engine tests: orchestrator entry points against a live store.

use std::sync::Arc;

use sigmaspl_convert::ProfileMapping;
use sigmaspl_engine::{
    LlmClient, LlmError, NewProfile, NewSysmonConfig, Orchestrator, SigmaToSplRequest,
    SplToSigmaRequest, Store, TextToSigmaRequest,
};

const MIMIKATZ: &str = r#"
title: Mimikatz
logsource: {category: process_creation, product: windows}
detection:
  selection:
    CommandLine|contains: ['sekurlsa::logonpasswords', 'lsadump::sam']
  condition: selection
level: critical
"#;

fn orchestrator() -> Orchestrator {
    Orchestrator::new(Arc::new(Store::new()))
}

#[test]
fn sigma_to_spl_records_history() {
    let orch = orchestrator();
    let response = orch
        .sigma_to_spl(&SigmaToSplRequest {
            sigma_yaml: MIMIKATZ.to_string(),
            ..Default::default()
        })
        .unwrap();

    assert_eq!(response.name, "Mimikatz");
    assert!(response.spl.as_deref().unwrap().starts_with(
        "search index=wineventlog sourcetype=WinEventLog:* \
         (CommandLine=\"*sekurlsa::logonpasswords*\" OR CommandLine=\"*lsadump::sam*\")"
    ));
    assert!(!response.llm_used);

    let id = response.id.expect("history id assigned");
    let record = orch.store().get_history(id).unwrap();
    assert_eq!(record.name, "Mimikatz");
    assert_eq!(record.output_spl, response.spl);
    assert!(record.output_sigma.is_none());
}

#[test]
fn sigma_to_spl_uses_stored_profile() {
    let store = Arc::new(Store::new());
    let profile = store
        .create_profile(NewProfile {
            name: "security-ta".into(),
            default_index: Some("winsec".into()),
            is_default: true,
            ..Default::default()
        })
        .unwrap();
    store
        .add_mapping(
            profile.id,
            ProfileMapping {
                sigma_field: "CommandLine".into(),
                target_field: "Process_Command_Line".into(),
                transform: None,
                category: None,
                notes: None,
            },
        )
        .unwrap();

    let orch = Orchestrator::new(store);
    // profile_id omitted: the default profile applies
    let response = orch
        .sigma_to_spl(&SigmaToSplRequest {
            sigma_yaml: MIMIKATZ.to_string(),
            ..Default::default()
        })
        .unwrap();
    let spl = response.spl.unwrap();
    assert!(spl.starts_with("search index=winsec "), "got: {spl}");
    assert!(spl.contains("Process_Command_Line=\"*sekurlsa::logonpasswords*\""));
}

#[test]
fn missing_profile_is_not_found() {
    let orch = orchestrator();
    let err = orch
        .sigma_to_spl(&SigmaToSplRequest {
            sigma_yaml: MIMIKATZ.to_string(),
            profile_id: Some(42),
            ..Default::default()
        })
        .unwrap_err();
    assert_eq!(err.kind(), "not_found");
}

#[test]
fn failed_conversion_leaves_no_history() {
    let orch = orchestrator();
    let err = orch
        .sigma_to_spl(&SigmaToSplRequest {
            sigma_yaml: "title: broken\n".to_string(),
            ..Default::default()
        })
        .unwrap_err();
    assert_eq!(err.kind(), "invalid_sigma");
    assert!(orch.store().list_history().is_empty());
}

#[test]
fn spl_to_sigma_round_trip_through_orchestrator() {
    let orch = orchestrator();
    let response = orch
        .spl_to_sigma(&SplToSigmaRequest {
            spl_query: r#"index=wineventlog (Image="*\\powershell.exe" AND CommandLine="*-enc*")"#
                .to_string(),
            title: Some("Encoded PowerShell".into()),
            level: Some("high".into()),
            ..Default::default()
        })
        .unwrap();

    let sigma = response.sigma_yaml.unwrap();
    assert!(sigma.contains("title: Encoded PowerShell"));
    assert!(sigma.contains("level: high"));
    assert!(sigma.contains("Image|endswith:"));
    assert!(response.id.is_some());
}

#[test]
fn unknown_level_is_rejected() {
    let orch = orchestrator();
    let err = orch
        .spl_to_sigma(&SplToSigmaRequest {
            spl_query: "index=x a=\"b\"".into(),
            level: Some("catastrophic".into()),
            ..Default::default()
        })
        .unwrap_err();
    assert_eq!(err.kind(), "invalid_sigma");
}

#[test]
fn coverage_check_against_active_sysmon() {
    let store = Arc::new(Store::new());
    let config = store
        .add_sysmon_config(NewSysmonConfig {
            name: "baseline".into(),
            enabled_event_ids: [1u32].into_iter().collect(),
            ..Default::default()
        })
        .unwrap();
    store.activate_sysmon(config.id).unwrap();

    let orch = Orchestrator::new(store);
    let result = orch.check_coverage(&[1, 3], None);
    assert_eq!(result.sysmon_coverage.enabled_ids, vec![1]);
    assert_eq!(result.sysmon_coverage.missing_ids, vec![3]);
    assert!(!result.overall_covered);
    assert!(
        result
            .recommendations
            .iter()
            .any(|r| r.contains("Event ID 3"))
    );
}

struct CannedLlm(&'static str);

impl LlmClient for CannedLlm {
    fn generate(&self, _prompt: &str, _context: &str) -> Result<String, LlmError> {
        Ok(self.0.to_string())
    }
}

#[test]
fn text_to_sigma_requires_assistant() {
    let orch = orchestrator();
    let err = orch
        .text_to_sigma(&TextToSigmaRequest {
            description: "detect whoami execution".into(),
            ..Default::default()
        })
        .unwrap_err();
    assert_eq!(err.kind(), "llm_unavailable");
}

#[test]
fn text_to_sigma_validates_and_converts() {
    let canned = r#"```yaml
title: Whoami Execution
logsource:
    product: windows
    category: process_creation
detection:
    selection:
        CommandLine|contains: 'whoami'
    condition: selection
level: medium
```"#;
    let orch = Orchestrator::with_llm(Arc::new(Store::new()), Box::new(CannedLlm(canned)));
    let response = orch
        .text_to_sigma(&TextToSigmaRequest {
            description: "detect whoami execution".into(),
            ..Default::default()
        })
        .unwrap();

    assert!(response.llm_used);
    assert_eq!(response.name, "Whoami Execution");
    assert!(response.sigma_yaml.unwrap().starts_with("title: Whoami Execution"));
    assert!(
        response
            .spl
            .unwrap()
            .contains("CommandLine=\"*whoami*\"")
    );
}

#[test]
fn text_to_sigma_rejects_invalid_assistant_output() {
    let orch = Orchestrator::with_llm(
        Arc::new(Store::new()),
        Box::new(CannedLlm("not: a\nsigma: rule\n")),
    );
    let err = orch
        .text_to_sigma(&TextToSigmaRequest {
            description: "whatever".into(),
            ..Default::default()
        })
        .unwrap_err();
    assert_eq!(err.kind(), "invalid_sigma");
    assert!(orch.store().list_history().is_empty());
}
