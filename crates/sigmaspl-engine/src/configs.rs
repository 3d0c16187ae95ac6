//! Telemetry configuration state: Sysmon configurations and Windows
//! advanced-audit policies. At most one of each is active at a time.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// One event rule inside a Sysmon configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SysmonRule {
    pub event_id: u32,
    pub name: String,
    pub enabled: bool,
}

/// A parsed Sysmon configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SysmonConfig {
    pub id: i64,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema_version: Option<String>,
    pub enabled_event_ids: BTreeSet<u32>,
    pub disabled_event_ids: BTreeSet<u32>,
    pub rules: Vec<SysmonRule>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

/// Fields accepted when storing a Sysmon configuration.
#[derive(Debug, Clone, Default)]
pub struct NewSysmonConfig {
    pub name: String,
    pub version: Option<String>,
    pub schema_version: Option<String>,
    pub enabled_event_ids: BTreeSet<u32>,
    pub disabled_event_ids: BTreeSet<u32>,
    pub rules: Vec<SysmonRule>,
}

/// One audit subcategory with its success/failure switches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuditSubcategory {
    pub name: String,
    pub success: bool,
    pub failure: bool,
}

impl AuditSubcategory {
    pub fn is_enabled(&self) -> bool {
        self.success || self.failure
    }
}

/// One audit category grouping subcategories.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuditCategory {
    pub name: String,
    pub subcategories: Vec<AuditSubcategory>,
}

/// A Windows advanced-audit policy snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuditConfig {
    pub id: i64,
    pub name: String,
    pub categories: Vec<AuditCategory>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

/// Fields accepted when storing an audit policy.
#[derive(Debug, Clone, Default)]
pub struct NewAuditConfig {
    pub name: String,
    pub categories: Vec<AuditCategory>,
}

impl AuditConfig {
    /// Find a subcategory by name across all categories.
    pub fn subcategory(&self, name: &str) -> Option<&AuditSubcategory> {
        self.categories
            .iter()
            .flat_map(|c| c.subcategories.iter())
            .find(|s| s.name == name)
    }
}
