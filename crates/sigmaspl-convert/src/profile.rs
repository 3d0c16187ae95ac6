//! Translation-side view of a mapping profile.
//!
//! The repository layer stores richer profile records (ids, flags,
//! timestamps); translations only need the pieces below, so conversions are
//! pure functions of this snapshot plus the rule.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// One ordered field-mapping rule inside a profile.
///
/// `sigma_field` is unique within a profile; lookup is case-sensitive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileMapping {
    pub sigma_field: String,
    pub target_field: String,
    /// Named value transform applied while lowering (`lower`, `upper`,
    /// `basename`, `strip_quotes`, `cidr_to_subnet`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transform: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// The mapping profile snapshot a single translation runs under.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConversionProfile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_index: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_sourcetype: Option<String>,
    #[serde(default)]
    pub cim_enabled: bool,
    /// SPL macro expansions by name. A macro named after the logsource
    /// category is appended to emitted queries.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub macros: BTreeMap<String, String>,
    /// Ordered mapping rules; first match wins on inverse lookups.
    #[serde(default)]
    pub mappings: Vec<ProfileMapping>,
}

impl ConversionProfile {
    /// Case-sensitive exact lookup of a Sigma field mapping.
    pub fn mapping_for(&self, sigma_field: &str) -> Option<&ProfileMapping> {
        self.mappings.iter().find(|m| m.sigma_field == sigma_field)
    }

    /// Inverse lookup: the first mapping (in insertion order) whose target
    /// equals `target_field`, plus the Sigma names of any later losers.
    pub fn inverse_mapping(&self, target_field: &str) -> Option<(&ProfileMapping, Vec<&str>)> {
        let mut hits = self
            .mappings
            .iter()
            .filter(|m| m.target_field == target_field);
        let first = hits.next()?;
        let losers: Vec<&str> = hits.map(|m| m.sigma_field.as_str()).collect();
        Some((first, losers))
    }
}
