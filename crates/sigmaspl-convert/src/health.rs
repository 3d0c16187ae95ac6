//! Health checks: auxiliary SPL queries that verify the data a rule depends
//! on is actually present in the index.

use serde::Serialize;

use crate::resolve::MappingStatus;

/// A single verification query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthCheck {
    pub name: String,
    pub description: String,
    pub query: String,
}

/// Build health checks for an emitted query.
///
/// `base_search` is the preamble without the leading `search ` keyword
/// (`index=... sourcetype=...`); `event_codes` are the logsource-implied
/// codes; `resolved_fields` are `(sigma_field, target_field, status)`
/// triples in encounter order.
pub fn generate(
    base_search: &str,
    event_codes: &[u32],
    resolved_fields: &[(String, String, MappingStatus)],
) -> Vec<HealthCheck> {
    let mut checks = Vec::new();

    checks.push(HealthCheck {
        name: "Log source present".to_string(),
        description: "Verify that the log source is receiving data".to_string(),
        query: format!("search {base_search} earliest=-1h | head 1 | stats count"),
    });

    for code in event_codes {
        checks.push(HealthCheck {
            name: format!("EventCode {code} present"),
            description: "Verify that the required event code is being logged".to_string(),
            query: format!("search {base_search} EventCode={code} earliest=-24h | stats count"),
        });
    }

    let mut seen: Vec<&str> = Vec::new();
    for (sigma_field, target, status) in resolved_fields {
        if *status == MappingStatus::Missing || seen.contains(&target.as_str()) {
            continue;
        }
        seen.push(target);
        checks.push(HealthCheck {
            name: format!("Field '{target}' present"),
            description: format!("Verify that field {target} (mapped from {sigma_field}) exists"),
            query: format!(
                "search {base_search} earliest=-1h | where isnotnull({target}) | head 1 | stats count"
            ),
        });
    }

    checks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checks_cover_source_codes_and_fields() {
        let checks = generate(
            "index=wineventlog sourcetype=WinEventLog:*",
            &[1],
            &[
                (
                    "CommandLine".to_string(),
                    "CommandLine".to_string(),
                    MappingStatus::Ok,
                ),
                (
                    "FakeField".to_string(),
                    "FakeField".to_string(),
                    MappingStatus::Missing,
                ),
            ],
        );
        assert_eq!(checks.len(), 3);
        assert_eq!(checks[0].name, "Log source present");
        assert_eq!(
            checks[1].query,
            "search index=wineventlog sourcetype=WinEventLog:* EventCode=1 earliest=-24h | stats count"
        );
        assert!(checks[2].name.contains("CommandLine"));
    }

    #[test]
    fn duplicate_targets_checked_once() {
        let checks = generate(
            "index=x",
            &[],
            &[
                ("User".to_string(), "user".to_string(), MappingStatus::Ok),
                (
                    "TargetUserName".to_string(),
                    "user".to_string(),
                    MappingStatus::Suggested,
                ),
            ],
        );
        // liveness check + one field check
        assert_eq!(checks.len(), 2);
    }
}
