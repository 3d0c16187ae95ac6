//! Forward-path scenario tests: Sigma rules through the full convert
//! pipeline, with pinned SPL text.

use sigmaspl_convert::{
    ConversionProfile, EmitOptions, MappingStatus, ProfileMapping, convert_sigma_to_spl,
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

#[test]
fn mimikatz_spl_prefix_is_pinned() {
    let result =
        convert_sigma_to_spl(MIMIKATZ, &ConversionProfile::default(), &EmitOptions::default())
            .unwrap();
    assert!(
        result.spl.starts_with(
            "search index=wineventlog sourcetype=WinEventLog:* \
             (CommandLine=\"*sekurlsa::logonpasswords*\" OR CommandLine=\"*lsadump::sam*\")"
        ),
        "got: {}",
        result.spl
    );
}

#[test]
fn mimikatz_prerequisites_offer_sysmon_and_native() {
    let result =
        convert_sigma_to_spl(MIMIKATZ, &ConversionProfile::default(), &EmitOptions::default())
            .unwrap();
    let prereq = &result.prerequisites;

    assert!(prereq.event_ids.iter().any(|e| e.id == 1));
    assert!(prereq.has_alternatives);
    let has_native_alternative = prereq
        .required_logs
        .iter()
        .flat_map(|l| l.alternatives.iter())
        .any(|a| a.event_ids.contains(&4688));
    assert!(has_native_alternative, "4688 offered as the native path");
}

#[test]
fn mimikatz_mappings_and_health_checks() {
    let result =
        convert_sigma_to_spl(MIMIKATZ, &ConversionProfile::default(), &EmitOptions::default())
            .unwrap();

    assert_eq!(result.mappings.len(), 1);
    assert_eq!(result.mappings[0].sigma_field, "CommandLine");
    assert_eq!(result.mappings[0].target_field, "CommandLine");
    assert_eq!(result.mappings[0].status, MappingStatus::Ok);
    assert!(result.gaps.is_empty());

    assert!(result.health_checks.len() >= 2);
    assert_eq!(result.health_checks[0].name, "Log source present");
    assert!(
        result
            .health_checks
            .iter()
            .any(|h| h.query.contains("EventCode=1")),
        "event code liveness check present"
    );
    // Health checks are embedded in the SPL as ### comments
    assert!(result.spl.contains("\n### Log source present: "));
}

#[test]
fn base64_modifier_precomputes_value() {
    let yaml = r#"
title: Encoded Whoami
logsource: {category: process_creation, product: windows}
detection:
  selection:
    CommandLine|base64|contains: 'whoami'
  condition: selection
"#;
    let result =
        convert_sigma_to_spl(yaml, &ConversionProfile::default(), &EmitOptions::default())
            .unwrap();
    assert!(
        result.spl.contains("CommandLine=\"*d2hvYW1p*\""),
        "got: {}",
        result.spl
    );
}

#[test]
fn base64offset_emits_three_variants() {
    let yaml = r#"
title: T
logsource: {category: process_creation, product: windows}
detection:
  selection:
    CommandLine|base64offset|contains: 'whoami'
  condition: selection
"#;
    let result =
        convert_sigma_to_spl(yaml, &ConversionProfile::default(), &EmitOptions::default())
            .unwrap();
    let first_line = result.spl.lines().next().unwrap();
    assert_eq!(first_line.matches(" OR ").count(), 2, "got: {first_line}");
    assert!(first_line.contains("d2hvYW1p"), "offset-0 variant present");
}

#[test]
fn one_of_selection_star_is_top_level_or() {
    let yaml = r#"
title: T
logsource: {category: process_creation, product: windows}
detection:
  selection_a:
    Image|endswith: '\cmd.exe'
  selection_b:
    Image|endswith: '\powershell.exe'
  condition: 1 of selection_*
"#;
    let result =
        convert_sigma_to_spl(yaml, &ConversionProfile::default(), &EmitOptions::default())
            .unwrap();
    assert!(
        result
            .spl
            .contains(r#"(Image="*\\cmd.exe" OR Image="*\\powershell.exe")"#),
        "got: {}",
        result.spl
    );
}

#[test]
fn unmapped_field_reported_once_with_suggestion() {
    let profile = ConversionProfile {
        mappings: vec![ProfileMapping {
            sigma_field: "FakeFields".into(),
            target_field: "fake".into(),
            transform: None,
            category: None,
            notes: None,
        }],
        ..Default::default()
    };
    let yaml = r#"
title: T
logsource: {category: process_creation, product: windows}
detection:
  selection:
    FakeField: 'x'
  condition: selection
"#;
    let result = convert_sigma_to_spl(yaml, &profile, &EmitOptions::default()).unwrap();

    // SPL falls back to the raw field name
    assert!(result.spl.contains("FakeField=\"x\""), "got: {}", result.spl);

    assert_eq!(result.gaps.len(), 1);
    let gap = &result.gaps[0];
    assert_eq!(gap.field, "FakeField");
    assert_eq!(gap.location, "detection.selection.FakeField");
    assert!(gap.impact.contains("No mapping exists"));
    assert!(
        gap.suggestions.contains(&"FakeFields".to_string()),
        "closest mapped name suggested, got: {:?}",
        gap.suggestions
    );

    let mapping = result
        .mappings
        .iter()
        .find(|m| m.sigma_field == "FakeField")
        .unwrap();
    assert_eq!(mapping.status, MappingStatus::Missing);
    assert_eq!(mapping.target_field, "FakeField");
}

#[test]
fn cim_profile_remaps_fields() {
    let profile = ConversionProfile {
        cim_enabled: true,
        ..Default::default()
    };
    let yaml = r#"
title: T
logsource: {category: process_creation, product: windows}
detection:
  selection:
    Image|endswith: '\mimikatz.exe'
  condition: selection
"#;
    let result = convert_sigma_to_spl(yaml, &profile, &EmitOptions::default()).unwrap();
    assert!(
        result.spl.contains(r#"process="*\\mimikatz.exe""#),
        "got: {}",
        result.spl
    );
    // suggested mapping surfaces as a gap with the CIM provenance
    assert_eq!(result.gaps.len(), 1);
    assert!(result.gaps[0].impact.contains("CIM/heuristic"));
}

#[test]
fn gap_completeness_every_non_ok_mapping_has_one_gap() {
    let yaml = r#"
title: T
logsource: {category: process_creation, product: windows}
detection:
  selection:
    AlphaField: 1
    BetaField: 2
  other:
    AlphaField: 3
  condition: selection and other
"#;
    let result =
        convert_sigma_to_spl(yaml, &ConversionProfile::default(), &EmitOptions::default())
            .unwrap();
    // AlphaField appears in two selections (two locations), BetaField in one
    assert_eq!(result.gaps.len(), 3);
    let locations: Vec<&str> = result.gaps.iter().map(|g| g.location.as_str()).collect();
    assert!(locations.contains(&"detection.selection.AlphaField"));
    assert!(locations.contains(&"detection.selection.BetaField"));
    assert!(locations.contains(&"detection.other.AlphaField"));
}

#[test]
fn unknown_top_level_keys_surface_as_warnings() {
    let yaml = r#"
title: T
frobnication: yes
logsource: {category: process_creation, product: windows}
detection:
  selection:
    Image|endswith: '\cmd.exe'
  condition: selection
"#;
    let result =
        convert_sigma_to_spl(yaml, &ConversionProfile::default(), &EmitOptions::default())
            .unwrap();
    assert_eq!(result.warnings.len(), 1);
    assert!(result.warnings[0].contains("frobnication"));
}
