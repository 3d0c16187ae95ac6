//! Coverage checker: compares a rule's required event IDs and category
//! against the active Sysmon and Windows-audit configurations.
//!
//! Either telemetry path suffices: a rule is covered when Sysmon generates
//! every required event, or when the native audit policy captures the same
//! activity.

use serde::Serialize;

use crate::configs::{AuditConfig, SysmonConfig};

/// Sysmon IDs live in a small range; Windows Security IDs are 4-digit.
fn is_sysmon_id(id: u32) -> bool {
    id < 1000
}

/// Audit subcategories that capture the same activity as each rule category.
fn relevant_subcategories(category: &str) -> &'static [&'static str] {
    match category {
        "process_creation" => &["Audit Process Creation"],
        "network_connection" => &["Audit Filtering Platform Connection"],
        "registry_event" | "registry_set" | "registry_add" | "registry_delete" => {
            &["Audit Registry"]
        }
        "file_event" | "file_creation" | "file_delete" => &["Audit File System"],
        "user_account" => &["Audit User Account Management"],
        _ => &[],
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SysmonCoverage {
    pub available: bool,
    pub enabled_ids: Vec<u32>,
    pub missing_ids: Vec<u32>,
    pub covered: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuditCoverage {
    pub available: bool,
    pub enabled_policies: Vec<String>,
    pub covered: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CoverageCheckResult {
    pub sysmon_coverage: SysmonCoverage,
    pub audit_coverage: AuditCoverage,
    pub overall_covered: bool,
    /// Remediation steps; empty when covered.
    pub recommendations: Vec<String>,
}

/// Compare required event IDs (and optionally the rule category) against
/// the active configurations.
pub fn check_coverage(
    required_event_ids: &[u32],
    category: Option<&str>,
    sysmon: Option<&SysmonConfig>,
    audit: Option<&AuditConfig>,
) -> CoverageCheckResult {
    let sysmon_required: Vec<u32> = required_event_ids
        .iter()
        .copied()
        .filter(|id| is_sysmon_id(*id))
        .collect();

    let sysmon_coverage = match sysmon {
        Some(config) => {
            let enabled_ids: Vec<u32> = sysmon_required
                .iter()
                .copied()
                .filter(|id| config.enabled_event_ids.contains(id))
                .collect();
            let missing_ids: Vec<u32> = sysmon_required
                .iter()
                .copied()
                .filter(|id| !config.enabled_event_ids.contains(id))
                .collect();
            SysmonCoverage {
                available: true,
                covered: missing_ids.is_empty() && !sysmon_required.is_empty(),
                enabled_ids,
                missing_ids,
            }
        }
        None => SysmonCoverage {
            available: false,
            enabled_ids: sysmon_required.clone(),
            missing_ids: Vec::new(),
            covered: false,
        },
    };

    let relevant = category.map(relevant_subcategories).unwrap_or(&[]);
    let audit_coverage = match audit {
        Some(config) => {
            let enabled_policies: Vec<String> = relevant
                .iter()
                .filter(|name| config.subcategory(name).is_some_and(|s| s.is_enabled()))
                .map(|s| s.to_string())
                .collect();
            AuditCoverage {
                available: true,
                covered: !relevant.is_empty() && enabled_policies.len() == relevant.len(),
                enabled_policies,
            }
        }
        None => AuditCoverage {
            available: false,
            enabled_policies: Vec::new(),
            covered: false,
        },
    };

    let overall_covered = sysmon_coverage.covered || audit_coverage.covered;

    let mut recommendations = Vec::new();
    if !overall_covered {
        match sysmon {
            Some(_) => {
                for id in &sysmon_coverage.missing_ids {
                    recommendations.push(format!(
                        "Enable Sysmon Event ID {id} in the active Sysmon configuration"
                    ));
                }
            }
            None => {
                if !sysmon_required.is_empty() {
                    recommendations.push(
                        "Install Sysmon with a configuration covering the required event IDs"
                            .to_string(),
                    );
                }
            }
        }
        for name in relevant {
            let enabled = audit_coverage.enabled_policies.iter().any(|p| p == name);
            if !enabled {
                recommendations.push(format!(
                    "Enable the '{name}' audit subcategory via Advanced Audit Policy"
                ));
            }
        }
    }

    CoverageCheckResult {
        sysmon_coverage,
        audit_coverage,
        overall_covered,
        recommendations,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::collections::BTreeSet;

    fn sysmon_with(ids: &[u32]) -> SysmonConfig {
        SysmonConfig {
            id: 1,
            name: "test".into(),
            version: None,
            schema_version: None,
            enabled_event_ids: ids.iter().copied().collect::<BTreeSet<u32>>(),
            disabled_event_ids: BTreeSet::new(),
            rules: Vec::new(),
            is_active: true,
            created_at: Utc::now(),
        }
    }

    fn audit_with(subcats: &[(&str, bool, bool)]) -> AuditConfig {
        AuditConfig {
            id: 1,
            name: "test".into(),
            categories: vec![crate::configs::AuditCategory {
                name: "Detailed Tracking".into(),
                subcategories: subcats
                    .iter()
                    .map(|(n, s, f)| crate::configs::AuditSubcategory {
                        name: n.to_string(),
                        success: *s,
                        failure: *f,
                    })
                    .collect(),
            }],
            is_active: true,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn missing_sysmon_id_flagged_with_recommendation() {
        let sysmon = sysmon_with(&[1]);
        let result = check_coverage(&[1, 3], None, Some(&sysmon), None);
        assert_eq!(result.sysmon_coverage.enabled_ids, vec![1]);
        assert_eq!(result.sysmon_coverage.missing_ids, vec![3]);
        assert!(!result.overall_covered);
        assert!(
            result
                .recommendations
                .iter()
                .any(|r| r.contains("Event ID 3")),
            "got: {:?}",
            result.recommendations
        );
    }

    #[test]
    fn full_sysmon_coverage_has_no_recommendations() {
        let sysmon = sysmon_with(&[1, 3, 11]);
        let result = check_coverage(&[1, 3], None, Some(&sysmon), None);
        assert!(result.sysmon_coverage.covered);
        assert!(result.overall_covered);
        assert!(result.recommendations.is_empty());
    }

    #[test]
    fn audit_path_alone_suffices() {
        let audit = audit_with(&[("Audit Process Creation", true, false)]);
        let result = check_coverage(&[1], Some("process_creation"), None, Some(&audit));
        assert!(!result.sysmon_coverage.covered);
        assert!(result.audit_coverage.covered);
        assert!(result.overall_covered);
        assert!(result.recommendations.is_empty());
    }

    #[test]
    fn disabled_audit_subcategory_recommended() {
        let audit = audit_with(&[("Audit Process Creation", false, false)]);
        let result = check_coverage(&[1], Some("process_creation"), None, Some(&audit));
        assert!(!result.overall_covered);
        assert!(
            result
                .recommendations
                .iter()
                .any(|r| r.contains("Audit Process Creation"))
        );
    }

    #[test]
    fn enabling_more_ids_never_reduces_coverage() {
        // Coverage monotonicity over a growing enabled set.
        let required = [1u32, 3, 22];
        let mut enabled: Vec<u32> = Vec::new();
        let mut last_covered = false;
        for id in [1u32, 3, 7, 22] {
            enabled.push(id);
            let sysmon = sysmon_with(&enabled);
            let result = check_coverage(&required, None, Some(&sysmon), None);
            assert!(
                result.overall_covered || !last_covered,
                "coverage regressed after enabling {id}"
            );
            last_covered = result.overall_covered;
        }
        assert!(last_covered);
    }

    #[test]
    fn security_only_ids_do_not_count_against_sysmon() {
        let sysmon = sysmon_with(&[1]);
        let result = check_coverage(&[4688], Some("process_creation"), Some(&sysmon), None);
        // 4688 is not a Sysmon ID; the sysmon path has nothing required
        assert!(result.sysmon_coverage.missing_ids.is_empty());
        assert!(!result.sysmon_coverage.covered, "empty requirement set is not coverage");
    }
}
