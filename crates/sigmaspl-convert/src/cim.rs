//! Built-in field tables: Splunk CIM mappings keyed by logsource category,
//! and the default Windows event-field table.

/// CIM mappings per `(category, sigma_field)`.
///
/// One target per key; event-role ambiguity (`src_user` vs `dest_user`) is
/// left to profile mappings, which take precedence over this table.
const CIM_BY_CATEGORY: &[(&str, &[(&str, &str)])] = &[
    (
        "process_creation",
        &[
            ("Image", "process"),
            ("CommandLine", "process_command_line"),
            ("ParentImage", "parent_process"),
            ("ParentCommandLine", "parent_process_command_line"),
            ("User", "user"),
            ("ComputerName", "dest"),
            ("ProcessId", "process_id"),
            ("ParentProcessId", "parent_process_id"),
            ("OriginalFileName", "process_exec"),
        ],
    ),
    (
        "network_connection",
        &[
            ("Image", "process"),
            ("User", "user"),
            ("SourceIp", "src_ip"),
            ("SourcePort", "src_port"),
            ("DestinationIp", "dest_ip"),
            ("DestinationPort", "dest_port"),
            ("DestinationHostname", "dest_host"),
            ("Protocol", "transport"),
        ],
    ),
    (
        "file_event",
        &[
            ("Image", "process"),
            ("TargetFilename", "file_path"),
            ("User", "user"),
        ],
    ),
    (
        "registry_event",
        &[
            ("Image", "process"),
            ("TargetObject", "registry_path"),
            ("Details", "registry_value_data"),
            ("EventType", "action"),
            ("User", "user"),
        ],
    ),
    (
        "dns_query",
        &[
            ("Image", "process"),
            ("QueryName", "query"),
            ("QueryResults", "answer"),
        ],
    ),
    (
        "image_load",
        &[("Image", "process"), ("ImageLoaded", "loaded_file_path")],
    ),
];

/// Category-agnostic CIM fallbacks for fields whose meaning does not depend
/// on the event category.
const CIM_COMMON: &[(&str, &str)] = &[
    ("User", "user"),
    ("ComputerName", "dest"),
    ("SourceIp", "src_ip"),
    ("DestinationIp", "dest_ip"),
    ("TargetUserName", "user"),
    ("IpAddress", "src_ip"),
];

/// Default table for Windows event fields. These are the names the Splunk
/// Windows TA ships for Sysmon/WinEventLog data, so a hit counts as an exact
/// mapping.
const WINDOWS_DEFAULTS: &[(&str, &str)] = &[
    // Process fields
    ("CommandLine", "CommandLine"),
    ("Image", "Image"),
    ("ParentImage", "ParentImage"),
    ("ParentCommandLine", "ParentCommandLine"),
    ("User", "User"),
    ("IntegrityLevel", "IntegrityLevel"),
    ("CurrentDirectory", "CurrentDirectory"),
    ("ProcessId", "ProcessId"),
    ("ParentProcessId", "ParentProcessId"),
    ("OriginalFileName", "OriginalFileName"),
    ("Hashes", "Hashes"),
    // File fields
    ("TargetFilename", "TargetFilename"),
    ("SourceFilename", "SourceFilename"),
    // Network fields
    ("DestinationIp", "DestinationIp"),
    ("DestinationPort", "DestinationPort"),
    ("SourceIp", "SourceIp"),
    ("SourcePort", "SourcePort"),
    ("DestinationHostname", "DestinationHostname"),
    ("Protocol", "Protocol"),
    // Registry fields
    ("TargetObject", "TargetObject"),
    ("Details", "Details"),
    ("EventType", "EventType"),
    // DNS fields
    ("QueryName", "QueryName"),
    ("QueryResults", "QueryResults"),
    // PowerShell fields
    ("ScriptBlockText", "ScriptBlockText"),
    ("HostApplication", "HostApplication"),
    // Security fields
    ("TargetUserName", "TargetUserName"),
    ("TargetDomainName", "TargetDomainName"),
    ("SubjectUserName", "SubjectUserName"),
    ("SubjectDomainName", "SubjectDomainName"),
    ("LogonType", "LogonType"),
    ("IpAddress", "IpAddress"),
    ("WorkstationName", "WorkstationName"),
    // Generic
    ("EventID", "EventCode"),
    ("ComputerName", "host"),
    ("Channel", "Channel"),
    ("Provider_Name", "SourceName"),
];

/// Look up a CIM target for `sigma_field` under `category`.
pub fn cim_lookup(category: Option<&str>, sigma_field: &str) -> Option<&'static str> {
    if let Some(cat) = category
        && let Some((_, table)) = CIM_BY_CATEGORY.iter().find(|(c, _)| *c == cat)
        && let Some(&(_, target)) = table.iter().find(|(f, _)| *f == sigma_field)
    {
        return Some(target);
    }
    CIM_COMMON
        .iter()
        .find(|(f, _)| *f == sigma_field)
        .map(|(_, t)| *t)
}

/// Category-agnostic CIM suggestion used by the profile store's `suggest`
/// operation: tries `process_creation` first (the most common rule category),
/// then the shared table.
pub fn cim_suggest(sigma_field: &str) -> Option<&'static str> {
    cim_lookup(Some("process_creation"), sigma_field)
}

/// Look up the built-in Windows default target for `sigma_field`.
pub fn windows_default(sigma_field: &str) -> Option<&'static str> {
    WINDOWS_DEFAULTS
        .iter()
        .find(|(f, _)| *f == sigma_field)
        .map(|(_, t)| *t)
}

/// Inverse of [`windows_default`]: first Sigma field whose default target is
/// `target`. Used by the reverse recognizer (`EventCode` -> `EventID`).
pub fn windows_default_inverse(target: &str) -> Option<&'static str> {
    WINDOWS_DEFAULTS
        .iter()
        .find(|(_, t)| *t == target)
        .map(|(f, _)| *f)
}

/// All known target names (CIM + defaults), used by the gap analyzer for
/// closest-name suggestions.
pub fn known_target_names() -> impl Iterator<Item = &'static str> {
    CIM_BY_CATEGORY
        .iter()
        .flat_map(|(_, table)| table.iter())
        .chain(CIM_COMMON.iter())
        .chain(WINDOWS_DEFAULTS.iter())
        .map(|(_, t)| *t)
}

/// All known Sigma-side field names, used by the gap analyzer for
/// closest-name suggestions.
pub fn known_sigma_names() -> impl Iterator<Item = &'static str> {
    WINDOWS_DEFAULTS.iter().map(|(f, _)| *f)
}
