//! Stored profile records. The translation layer works on
//! [`ConversionProfile`] snapshots; these records add identity, the default
//! flag, and timestamps.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use sigmaspl_convert::{ConversionProfile, ProfileMapping};

/// A named field-mapping profile.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Profile {
    pub id: i64,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_index: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_sourcetype: Option<String>,
    pub cim_enabled: bool,
    pub is_default: bool,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub macros: BTreeMap<String, String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields accepted when creating a profile.
#[derive(Debug, Clone, Default)]
pub struct NewProfile {
    pub name: String,
    pub description: Option<String>,
    pub default_index: Option<String>,
    pub default_sourcetype: Option<String>,
    pub cim_enabled: bool,
    pub is_default: bool,
    pub macros: BTreeMap<String, String>,
}

/// Partial update; `None` leaves the field untouched.
#[derive(Debug, Clone, Default)]
pub struct ProfileUpdate {
    pub name: Option<String>,
    pub description: Option<Option<String>>,
    pub default_index: Option<Option<String>>,
    pub default_sourcetype: Option<Option<String>>,
    pub cim_enabled: Option<bool>,
    pub is_default: Option<bool>,
    pub macros: Option<BTreeMap<String, String>>,
}

impl Profile {
    /// Snapshot this profile plus its mappings for a translation run.
    pub fn conversion_view(&self, mappings: &[ProfileMapping]) -> ConversionProfile {
        ConversionProfile {
            default_index: self.default_index.clone(),
            default_sourcetype: self.default_sourcetype.clone(),
            cim_enabled: self.cim_enabled,
            macros: self.macros.clone(),
            mappings: mappings.to_vec(),
        }
    }
}
