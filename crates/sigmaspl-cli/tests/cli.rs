use std::io::Write;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::NamedTempFile;

const MIMIKATZ: &str = r#"
title: Mimikatz
logsource: {category: process_creation, product: windows}
detection:
  selection:
    CommandLine|contains: ['sekurlsa::logonpasswords', 'lsadump::sam']
  condition: selection
level: critical
"#;

fn write_temp(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

#[test]
fn convert_prints_pinned_spl() {
    let rule = write_temp(MIMIKATZ);
    Command::cargo_bin("sigmaspl")
        .unwrap()
        .arg("convert")
        .arg(rule.path())
        .assert()
        .success()
        .stdout(predicate::str::starts_with(
            "search index=wineventlog sourcetype=WinEventLog:* \
             (CommandLine=\"*sekurlsa::logonpasswords*\" OR CommandLine=\"*lsadump::sam*\")",
        ))
        .stdout(predicate::str::contains("| stats count by CommandLine"))
        .stdout(predicate::str::contains("### Log source present:"));
}

#[test]
fn convert_reads_stdin() {
    Command::cargo_bin("sigmaspl")
        .unwrap()
        .arg("convert")
        .arg("-")
        .write_stdin(MIMIKATZ)
        .assert()
        .success()
        .stdout(predicate::str::contains("sekurlsa::logonpasswords"));
}

#[test]
fn convert_json_report_includes_prerequisites_and_gaps() {
    let rule = write_temp(
        r#"
title: Gap Demo
logsource: {category: process_creation, product: windows}
detection:
  selection:
    FakeField: 'x'
  condition: selection
"#,
    );
    let output = Command::cargo_bin("sigmaspl")
        .unwrap()
        .arg("convert")
        .arg(rule.path())
        .arg("--json")
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let report: serde_json::Value = serde_json::from_slice(&output).unwrap();
    assert_eq!(report["conversion_type"], "sigma_to_spl");
    assert_eq!(report["gaps"][0]["field"], "FakeField");
    assert_eq!(
        report["gaps"][0]["location"],
        "detection.selection.FakeField"
    );
    assert!(
        report["prerequisites"]["event_ids"]
            .as_array()
            .unwrap()
            .iter()
            .any(|e| e["id"] == 1)
    );
}

#[test]
fn convert_with_profile_file() {
    let rule = write_temp(MIMIKATZ);
    let profile = write_temp(
        r#"
default_index: winsec
mappings:
  - sigma_field: CommandLine
    target_field: Process_Command_Line
"#,
    );
    Command::cargo_bin("sigmaspl")
        .unwrap()
        .arg("convert")
        .arg(rule.path())
        .arg("--profile")
        .arg(profile.path())
        .assert()
        .success()
        .stdout(predicate::str::starts_with("search index=winsec "))
        .stdout(predicate::str::contains(
            "Process_Command_Line=\"*sekurlsa::logonpasswords*\"",
        ));
}

#[test]
fn convert_rejects_invalid_rule() {
    let rule = write_temp("title: nope\n");
    Command::cargo_bin("sigmaspl")
        .unwrap()
        .arg("convert")
        .arg(rule.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("logsource"));
}

#[test]
fn attack_tags_reported_on_stderr() {
    let rule = write_temp(
        r#"
title: Tagged
logsource: {category: process_creation, product: windows}
detection:
  selection:
    CommandLine|contains: 'sekurlsa'
  condition: selection
tags:
  - attack.credential_access
  - attack.t1003
"#,
    );
    Command::cargo_bin("sigmaspl")
        .unwrap()
        .arg("convert")
        .arg(rule.path())
        .assert()
        .success()
        .stderr(predicate::str::contains("attack techniques: T1003"));
}

#[test]
fn reverse_prints_sigma_yaml() {
    Command::cargo_bin("sigmaspl")
        .unwrap()
        .arg("reverse")
        .arg(r#"index=wineventlog (Image="*\\powershell.exe" AND CommandLine="*-enc*")"#)
        .arg("--title")
        .arg("Encoded PowerShell")
        .arg("--level")
        .arg("high")
        .assert()
        .success()
        .stdout(predicate::str::contains("title: Encoded PowerShell"))
        .stdout(predicate::str::contains("Image|endswith:"))
        .stdout(predicate::str::contains("level: high"));
}

#[test]
fn reverse_notes_unsupported_fragments_on_stderr() {
    Command::cargo_bin("sigmaspl")
        .unwrap()
        .arg("reverse")
        .arg(r#"index=x a="b" | lookup threat_feed ip"#)
        .assert()
        .success()
        .stderr(predicate::str::contains("lookup"));
}

#[test]
fn parse_outputs_ast_json() {
    let rule = write_temp(MIMIKATZ);
    let output = Command::cargo_bin("sigmaspl")
        .unwrap()
        .arg("parse")
        .arg(rule.path())
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let ast: serde_json::Value = serde_json::from_slice(&output).unwrap();
    assert_eq!(ast["title"], "Mimikatz");
    assert_eq!(ast["level"], "critical");
    assert_eq!(ast["logsource"]["category"], "process_creation");
}

#[test]
fn condition_roundtrips_expression() {
    Command::cargo_bin("sigmaspl")
        .unwrap()
        .arg("condition")
        .arg("selection and not filter")
        .assert()
        .success()
        .stdout(predicate::str::contains("selection and not filter"));
}

#[test]
fn condition_rejects_garbage() {
    Command::cargo_bin("sigmaspl")
        .unwrap()
        .arg("condition")
        .arg("selection and or")
        .assert()
        .failure();
}

#[test]
fn coverage_reports_missing_ids() {
    let sysmon = write_temp(
        r#"
name: baseline
enabled_event_ids: [1]
"#,
    );
    let output = Command::cargo_bin("sigmaspl")
        .unwrap()
        .arg("coverage")
        .arg("--required")
        .arg("1,3")
        .arg("--sysmon-config")
        .arg(sysmon.path())
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let report: serde_json::Value = serde_json::from_slice(&output).unwrap();
    assert_eq!(report["overall_covered"], false);
    assert_eq!(report["sysmon_coverage"]["missing_ids"][0], 3);
    assert!(
        report["recommendations"][0]
            .as_str()
            .unwrap()
            .contains("Event ID 3")
    );
}
