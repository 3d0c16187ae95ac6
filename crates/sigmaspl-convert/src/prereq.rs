//! Prerequisite analysis: which log sources, Windows channels, event IDs,
//! and collection settings a rule needs before its query can return data.

use serde::Serialize;

use sigmaspl_parser::{Detection, SigmaRule, SigmaValue};

use crate::logsource;

/// An event ID with its catalog annotation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EventIdInfo {
    pub id: u32,
    pub name: String,
    pub source: String,
}

/// A fallback log source usable when the primary one is not deployed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AlternativeLogSource {
    pub name: String,
    pub description: String,
    pub event_ids: Vec<u32>,
    pub setup: String,
    pub is_sysmon_alternative: bool,
}

/// A log source the rule depends on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RequiredLogSource {
    pub name: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub windows_channel: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub splunk_sourcetype: Option<String>,
    pub event_ids: Vec<EventIdInfo>,
    pub setup_instructions: Vec<String>,
    pub alternatives: Vec<AlternativeLogSource>,
}

/// Echo of the rule's logsource block inside the prerequisite report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogSourceEcho {
    pub product: Option<String>,
    pub service: Option<String>,
    pub category: Option<String>,
}

/// The full prerequisite report for one rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PrerequisiteInfo {
    pub log_source: LogSourceEcho,
    pub required_logs: Vec<RequiredLogSource>,
    /// Flattened, de-duplicated event IDs in first-seen order.
    pub event_ids: Vec<EventIdInfo>,
    /// Union of the required logs' Windows channels.
    pub channels: Vec<String>,
    pub configuration: Vec<String>,
    pub has_alternatives: bool,
}

// =============================================================================
// Static catalogs
// =============================================================================

const EVENT_CATALOG: &[(u32, &str, &str)] = &[
    (1, "Process Creation", "Sysmon"),
    (2, "File Creation Time Changed", "Sysmon"),
    (3, "Network Connection", "Sysmon"),
    (5, "Process Terminated", "Sysmon"),
    (6, "Driver Loaded", "Sysmon"),
    (7, "Image Loaded", "Sysmon"),
    (8, "CreateRemoteThread", "Sysmon"),
    (10, "ProcessAccess", "Sysmon"),
    (11, "File Created", "Sysmon"),
    (12, "Registry Object Added/Deleted", "Sysmon"),
    (13, "Registry Value Set", "Sysmon"),
    (14, "Registry Key/Value Renamed", "Sysmon"),
    (15, "FileCreateStreamHash", "Sysmon"),
    (17, "PipeEvent Created", "Sysmon"),
    (19, "WMI Event Filter", "Sysmon"),
    (20, "WMI Event Consumer", "Sysmon"),
    (21, "WMI Consumer Binding", "Sysmon"),
    (22, "DNS Query", "Sysmon"),
    (23, "File Delete Archived", "Sysmon"),
    (25, "Process Tampering", "Sysmon"),
    (4624, "Successful Logon", "Security"),
    (4625, "Failed Logon", "Security"),
    (4648, "Explicit Credential Logon", "Security"),
    (4657, "Registry Value Modified", "Security"),
    (4663, "Object Access Attempt", "Security"),
    (4672, "Special Privileges Assigned", "Security"),
    (4688, "Process Creation", "Security"),
    (4697, "Service Installed", "Security"),
    (4698, "Scheduled Task Created", "Security"),
    (4720, "User Account Created", "Security"),
    (4726, "User Account Deleted", "Security"),
    (4732, "Member Added to Local Group", "Security"),
    (4768, "Kerberos TGT Request", "Security"),
    (4769, "Kerberos Service Ticket Request", "Security"),
    (4771, "Kerberos Pre-Auth Failed", "Security"),
    (4776, "NTLM Authentication", "Security"),
    (5140, "Network Share Access", "Security"),
    (5145, "Network Share Object Check", "Security"),
    (4103, "Module Logging", "PowerShell"),
    (4104, "Script Block Logging", "PowerShell"),
];

fn event_info(id: u32) -> EventIdInfo {
    match EVENT_CATALOG.iter().find(|(eid, _, _)| *eid == id) {
        Some((_, name, source)) => EventIdInfo {
            id,
            name: (*name).to_string(),
            source: (*source).to_string(),
        },
        None => EventIdInfo {
            id,
            name: "Unknown".to_string(),
            source: "Unknown".to_string(),
        },
    }
}

struct SourceInfo {
    key: &'static str,
    name: &'static str,
    description: &'static str,
    windows_channel: &'static str,
    splunk_sourcetype: &'static str,
    setup_instructions: &'static [&'static str],
}

const SOURCE_CATALOG: &[SourceInfo] = &[
    SourceInfo {
        key: "sysmon",
        name: "Windows Sysmon",
        description: "System Monitor: detailed process, network, file, registry, and DNS telemetry",
        windows_channel: "Microsoft-Windows-Sysmon/Operational",
        splunk_sourcetype: "WinEventLog:Microsoft-Windows-Sysmon/Operational",
        setup_instructions: &[
            "Download Sysmon from Microsoft Sysinternals",
            "Install with a configuration file: sysmon64.exe -accepteula -i sysmonconfig.xml",
            "Use a community configuration (SwiftOnSecurity or sysmon-modular) for broad coverage",
            "Configure the Splunk Universal Forwarder to collect the Sysmon operational channel",
        ],
    },
    SourceInfo {
        key: "security",
        name: "Windows Security",
        description: "Windows Security event log: authentication, authorization, and audit events",
        windows_channel: "Security",
        splunk_sourcetype: "WinEventLog:Security",
        setup_instructions: &[
            "Enable Advanced Audit Policy via GPO",
            "Enable 'Audit Process Creation' for Event ID 4688",
            "Enable command-line logging: Administrative Templates > System > Audit Process Creation > Include command line",
            "Configure Splunk to collect the Security event log",
        ],
    },
    SourceInfo {
        key: "powershell",
        name: "Windows PowerShell",
        description: "PowerShell operational log: module and script block logging",
        windows_channel: "Microsoft-Windows-PowerShell/Operational",
        splunk_sourcetype: "WinEventLog:Microsoft-Windows-PowerShell/Operational",
        setup_instructions: &[
            "Enable Module Logging via GPO: Windows Components > Windows PowerShell > Turn on Module Logging",
            "Enable Script Block Logging via GPO: Windows Components > Windows PowerShell > Turn on Script Block Logging",
            "Ensure PowerShell v5+ for full logging detail",
        ],
    },
    SourceInfo {
        key: "system",
        name: "Windows System",
        description: "Windows System event log: services, drivers, and system-level events",
        windows_channel: "System",
        splunk_sourcetype: "WinEventLog:System",
        setup_instructions: &[
            "System logging is enabled by default",
            "Configure the Splunk Universal Forwarder to collect the System event log",
        ],
    },
];

fn source_info(key: &str) -> Option<&'static SourceInfo> {
    SOURCE_CATALOG.iter().find(|s| s.key == key)
}

/// Which log sources a category is usually served by.
fn category_sources(category: &str) -> &'static [&'static str] {
    match category {
        "process_creation" => &["sysmon"],
        "file_event" | "file_creation" | "file_delete" | "network_connection" | "dns_query"
        | "dns" | "registry_event" | "registry_set" | "registry_add" | "registry_delete"
        | "image_load" | "driver_load" | "pipe_created" | "wmi_event" | "process_access"
        | "create_remote_thread" => &["sysmon"],
        "ps_script" | "ps_module" | "ps_classic_start" => &["powershell"],
        _ => &[],
    }
}

// =============================================================================
// Analysis
// =============================================================================

/// Compute the prerequisite report for a rule.
pub fn analyze(rule: &SigmaRule) -> PrerequisiteInfo {
    let logsource = &rule.logsource;
    let category = logsource.category.as_deref().unwrap_or("");
    let service = logsource.service.as_deref().unwrap_or("");
    let product = logsource.product.as_deref().unwrap_or("");

    // Event IDs: logsource-implied first, then harvested from the rule body.
    let mut event_ids: Vec<EventIdInfo> = Vec::new();
    let mut push_id = |ids: &mut Vec<EventIdInfo>, id: u32| {
        if !ids.iter().any(|e| e.id == id) {
            ids.push(event_info(id));
        }
    };
    for &code in logsource::defaults_for(logsource).event_codes {
        push_id(&mut event_ids, code);
    }
    for id in harvest_event_ids(rule) {
        push_id(&mut event_ids, id);
    }

    // Required log sources: explicit service, else category defaults, plus
    // anything the harvested event IDs imply.
    let mut keys: Vec<&str> = Vec::new();
    if !service.is_empty() {
        if source_info(service).is_some() {
            keys.push(service);
        }
    } else if !category.is_empty() {
        keys.extend(category_sources(category));
    }
    for evt in &event_ids {
        let key = evt.source.to_lowercase();
        if let Some(info) = source_info(&key)
            && !keys.contains(&info.key)
        {
            keys.push(info.key);
        }
    }
    if keys.is_empty() && product == "windows" {
        keys.push("sysmon");
    }

    let required_logs: Vec<RequiredLogSource> = keys
        .iter()
        .filter_map(|key| source_info(key))
        .map(|info| build_required(info, &event_ids, category))
        .collect();

    let channels: Vec<String> = {
        let mut out = Vec::new();
        for log in &required_logs {
            if let Some(ch) = &log.windows_channel
                && !out.contains(ch)
            {
                out.push(ch.clone());
            }
        }
        out
    };

    let configuration = configuration_for(category);
    let has_alternatives = required_logs.iter().any(|l| !l.alternatives.is_empty());

    PrerequisiteInfo {
        log_source: LogSourceEcho {
            product: logsource.product.clone(),
            service: logsource.service.clone(),
            category: logsource.category.clone(),
        },
        required_logs,
        event_ids,
        channels,
        configuration,
        has_alternatives,
    }
}

fn build_required(
    info: &'static SourceInfo,
    event_ids: &[EventIdInfo],
    category: &str,
) -> RequiredLogSource {
    let own_ids: Vec<EventIdInfo> = event_ids
        .iter()
        .filter(|e| e.source.eq_ignore_ascii_case(info.key))
        .cloned()
        .collect();

    // Process creation is observable from either side: Sysmon 1 and native
    // 4688 substitute for each other.
    let alternatives = if category == "process_creation" {
        match info.key {
            "sysmon" => vec![AlternativeLogSource {
                name: "Windows Security (Process Creation)".to_string(),
                description: "Event ID 4688 tracks process execution without Sysmon; less detail but no extra tooling"
                    .to_string(),
                event_ids: vec![4688],
                setup: "Enable via GPO: Advanced Audit Policy > Detailed Tracking > Audit Process Creation, and include command line under Administrative Templates > System > Audit Process Creation"
                    .to_string(),
                is_sysmon_alternative: false,
            }],
            "security" => vec![AlternativeLogSource {
                name: "Sysmon Process Creation".to_string(),
                description: "Sysmon Event ID 1 gives hashes, parent process, and full command line"
                    .to_string(),
                event_ids: vec![1],
                setup: "Install Sysmon with a configuration that enables ProcessCreate events"
                    .to_string(),
                is_sysmon_alternative: true,
            }],
            _ => Vec::new(),
        }
    } else {
        Vec::new()
    };

    RequiredLogSource {
        name: info.name.to_string(),
        description: info.description.to_string(),
        windows_channel: Some(info.windows_channel.to_string()),
        splunk_sourcetype: Some(info.splunk_sourcetype.to_string()),
        event_ids: own_ids,
        setup_instructions: info
            .setup_instructions
            .iter()
            .map(|s| s.to_string())
            .collect(),
        alternatives,
    }
}

fn configuration_for(category: &str) -> Vec<String> {
    match category {
        "process_creation" => vec![
            "Enable command line logging (GPO required for Event ID 4688)".to_string(),
            "Sysmon installed and configured (for Event ID 1)".to_string(),
        ],
        "network_connection" => vec!["Sysmon with network logging enabled".to_string()],
        "dns_query" | "dns" => vec!["Sysmon v10+ with DNS logging enabled".to_string()],
        _ => Vec::new(),
    }
}

/// Collect `EventID`/`EventCode` values referenced in the detection body.
fn harvest_event_ids(rule: &SigmaRule) -> Vec<u32> {
    let mut ids = Vec::new();
    for name in rule.detection.order.iter() {
        if let Some(det) = rule.detection.named.get(name) {
            harvest_detection(det, &mut ids);
        }
    }
    ids
}

fn harvest_detection(det: &Detection, ids: &mut Vec<u32>) {
    match det {
        Detection::AllOf(items) => {
            for item in items {
                let Some(field) = item.field.name.as_deref() else {
                    continue;
                };
                if !matches!(field, "EventID" | "EventCode" | "event_id" | "eventid") {
                    continue;
                }
                for v in &item.values {
                    let id = match v {
                        SigmaValue::Integer(n) if *n >= 0 => Some(*n as u32),
                        SigmaValue::String(s) => {
                            s.as_plain().and_then(|p| p.parse::<u32>().ok())
                        }
                        _ => None,
                    };
                    if let Some(id) = id
                        && !ids.contains(&id)
                    {
                        ids.push(id);
                    }
                }
            }
        }
        Detection::AnyOf(subs) => {
            for sub in subs {
                harvest_detection(sub, ids);
            }
        }
        Detection::Keywords(_) => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sigmaspl_parser::parse_sigma_rule;

    #[test]
    fn process_creation_includes_sysmon_and_native_alternative() {
        let parsed = parse_sigma_rule(
            r#"
title: Mimikatz
logsource: {category: process_creation, product: windows}
detection:
  selection:
    CommandLine|contains: 'sekurlsa::logonpasswords'
  condition: selection
level: critical
"#,
        )
        .unwrap();
        let prereq = analyze(&parsed.rule);

        assert!(prereq.event_ids.iter().any(|e| e.id == 1));
        assert!(prereq.has_alternatives);
        let sysmon = &prereq.required_logs[0];
        assert_eq!(sysmon.name, "Windows Sysmon");
        assert!(
            sysmon
                .alternatives
                .iter()
                .any(|a| a.event_ids.contains(&4688)),
            "native 4688 offered as alternative"
        );
        assert_eq!(
            prereq.channels,
            vec!["Microsoft-Windows-Sysmon/Operational".to_string()]
        );
    }

    #[test]
    fn event_ids_harvested_from_detection() {
        let parsed = parse_sigma_rule(
            r#"
title: T
logsource: {product: windows, service: security}
detection:
  selection:
    EventID: [4624, 4625]
  condition: selection
"#,
        )
        .unwrap();
        let prereq = analyze(&parsed.rule);
        let ids: Vec<u32> = prereq.event_ids.iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![4624, 4625]);
        assert_eq!(prereq.required_logs.len(), 1);
        assert_eq!(prereq.required_logs[0].name, "Windows Security");
        assert!(!prereq.has_alternatives);
    }

    #[test]
    fn event_id_catalog_annotates() {
        let parsed = parse_sigma_rule(
            r#"
title: T
logsource: {product: windows, category: dns_query}
detection:
  selection:
    QueryName|contains: 'pastebin'
  condition: selection
"#,
        )
        .unwrap();
        let prereq = analyze(&parsed.rule);
        assert_eq!(prereq.event_ids[0].id, 22);
        assert_eq!(prereq.event_ids[0].name, "DNS Query");
        assert_eq!(prereq.event_ids[0].source, "Sysmon");
    }
}
