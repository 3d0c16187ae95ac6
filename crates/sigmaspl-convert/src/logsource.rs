//! Logsource -> Splunk index/sourcetype defaults plus the Sysmon event codes
//! implied by each category.

use sigmaspl_parser::LogSource;

/// Splunk defaults derived from a Sigma logsource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogsourceDefaults {
    pub index: &'static str,
    pub sourcetype: &'static str,
    /// Sysmon event codes generated by this source, if any.
    pub event_codes: &'static [u32],
}

const FALLBACK: LogsourceDefaults = LogsourceDefaults {
    index: "*",
    sourcetype: "*",
    event_codes: &[],
};

/// `(product, service, category)` rows; `""` means "not set". Lookup tries
/// the exact triple, then `(product, service, ·)`, then `(product, ·,
/// category)`, then `(product, ·, ·)`.
const TABLE: &[(&str, &str, &str, LogsourceDefaults)] = &[
    // Windows services
    (
        "windows",
        "sysmon",
        "",
        LogsourceDefaults {
            index: "wineventlog",
            sourcetype: "WinEventLog:Microsoft-Windows-Sysmon/Operational",
            event_codes: &[],
        },
    ),
    (
        "windows",
        "security",
        "",
        LogsourceDefaults {
            index: "wineventlog",
            sourcetype: "WinEventLog:Security",
            event_codes: &[],
        },
    ),
    (
        "windows",
        "system",
        "",
        LogsourceDefaults {
            index: "wineventlog",
            sourcetype: "WinEventLog:System",
            event_codes: &[],
        },
    ),
    (
        "windows",
        "powershell",
        "",
        LogsourceDefaults {
            index: "wineventlog",
            sourcetype: "WinEventLog:Microsoft-Windows-PowerShell/Operational",
            event_codes: &[4104],
        },
    ),
    (
        "windows",
        "applocker",
        "",
        LogsourceDefaults {
            index: "wineventlog",
            sourcetype: "WinEventLog:Microsoft-Windows-AppLocker/EXE and DLL",
            event_codes: &[],
        },
    ),
    // Windows categories (Sysmon-backed telemetry, but the data may come
    // from any channel, so the sourcetype stays wide)
    (
        "windows",
        "",
        "process_creation",
        LogsourceDefaults {
            index: "wineventlog",
            sourcetype: "WinEventLog:*",
            event_codes: &[1],
        },
    ),
    (
        "windows",
        "",
        "network_connection",
        LogsourceDefaults {
            index: "wineventlog",
            sourcetype: "WinEventLog:*",
            event_codes: &[3],
        },
    ),
    (
        "windows",
        "",
        "image_load",
        LogsourceDefaults {
            index: "wineventlog",
            sourcetype: "WinEventLog:*",
            event_codes: &[7],
        },
    ),
    (
        "windows",
        "",
        "file_event",
        LogsourceDefaults {
            index: "wineventlog",
            sourcetype: "WinEventLog:*",
            event_codes: &[11],
        },
    ),
    (
        "windows",
        "",
        "registry_event",
        LogsourceDefaults {
            index: "wineventlog",
            sourcetype: "WinEventLog:*",
            event_codes: &[12, 13, 14],
        },
    ),
    (
        "windows",
        "",
        "registry_set",
        LogsourceDefaults {
            index: "wineventlog",
            sourcetype: "WinEventLog:*",
            event_codes: &[13],
        },
    ),
    (
        "windows",
        "",
        "dns_query",
        LogsourceDefaults {
            index: "wineventlog",
            sourcetype: "WinEventLog:*",
            event_codes: &[22],
        },
    ),
    (
        "windows",
        "",
        "dns",
        LogsourceDefaults {
            index: "wineventlog",
            sourcetype: "WinEventLog:*",
            event_codes: &[22],
        },
    ),
    (
        "windows",
        "",
        "ps_script",
        LogsourceDefaults {
            index: "wineventlog",
            sourcetype: "WinEventLog:Microsoft-Windows-PowerShell/Operational",
            event_codes: &[4104],
        },
    ),
    (
        "windows",
        "",
        "ps_module",
        LogsourceDefaults {
            index: "wineventlog",
            sourcetype: "WinEventLog:Microsoft-Windows-PowerShell/Operational",
            event_codes: &[4103],
        },
    ),
    // Windows catch-all
    (
        "windows",
        "",
        "",
        LogsourceDefaults {
            index: "wineventlog",
            sourcetype: "WinEventLog:*",
            event_codes: &[],
        },
    ),
    // Linux
    (
        "linux",
        "syslog",
        "",
        LogsourceDefaults {
            index: "linux",
            sourcetype: "syslog",
            event_codes: &[],
        },
    ),
    (
        "linux",
        "auditd",
        "",
        LogsourceDefaults {
            index: "linux",
            sourcetype: "linux:audit",
            event_codes: &[],
        },
    ),
    (
        "linux",
        "",
        "process_creation",
        LogsourceDefaults {
            index: "linux",
            sourcetype: "linux:audit",
            event_codes: &[],
        },
    ),
    (
        "linux",
        "",
        "",
        LogsourceDefaults {
            index: "linux",
            sourcetype: "syslog",
            event_codes: &[],
        },
    ),
];

/// Resolve a logsource to index/sourcetype defaults.
pub fn defaults_for(logsource: &LogSource) -> LogsourceDefaults {
    let product = logsource.product.as_deref().unwrap_or("");
    let service = logsource.service.as_deref().unwrap_or("");
    let category = logsource.category.as_deref().unwrap_or("");

    let candidates: [(&str, &str, &str); 4] = [
        (product, service, category),
        (product, service, ""),
        (product, "", category),
        (product, "", ""),
    ];

    for (p, s, c) in candidates {
        if let Some((_, _, _, d)) = TABLE
            .iter()
            .find(|(tp, ts, tc, _)| *tp == p && *ts == s && *tc == c)
        {
            return d.clone();
        }
    }
    FALLBACK
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ls(product: &str, service: Option<&str>, category: Option<&str>) -> LogSource {
        LogSource {
            product: Some(product.to_string()),
            service: service.map(|s| s.to_string()),
            category: category.map(|s| s.to_string()),
            definition: None,
        }
    }

    #[test]
    fn windows_process_creation_defaults() {
        let d = defaults_for(&ls("windows", None, Some("process_creation")));
        assert_eq!(d.index, "wineventlog");
        assert_eq!(d.sourcetype, "WinEventLog:*");
        assert_eq!(d.event_codes, &[1]);
    }

    #[test]
    fn service_beats_category_fallback() {
        let d = defaults_for(&ls("windows", Some("security"), Some("process_creation")));
        assert_eq!(d.sourcetype, "WinEventLog:Security");
    }

    #[test]
    fn unknown_product_falls_back_to_wildcards() {
        let d = defaults_for(&ls("macos", None, None));
        assert_eq!(d.index, "*");
        assert_eq!(d.sourcetype, "*");
    }

    #[test]
    fn linux_audit() {
        let d = defaults_for(&ls("linux", None, Some("process_creation")));
        assert_eq!(d.index, "linux");
        assert_eq!(d.sourcetype, "linux:audit");
    }
}
