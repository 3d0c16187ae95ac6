//! Field resolution: Sigma field name -> target (SPL) field name under a
//! profile and logsource context.
//!
//! The resolution chain is an ordered sequence of strategies, not dispatch:
//!
//! 1. profile mapping, exact and case-sensitive
//! 2. built-in CIM table keyed on `(logsource.category, field)`, if the
//!    profile opts into CIM
//! 3. built-in Windows default table
//! 4. identity fallback with status `missing`
//!
//! Resolution is deterministic; a per-request memo table avoids re-running
//! the chain for repeated fields, and nothing is cached across requests.

use std::collections::HashMap;

use serde::Serialize;
use tracing::debug;

use sigmaspl_parser::LogSource;

use crate::cim;
use crate::profile::ConversionProfile;

/// Outcome class of a field resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MappingStatus {
    /// Exact mapping found (profile or built-in default table).
    Ok,
    /// Match came from CIM or a heuristic, not from a user-owned mapping.
    Suggested,
    /// No mapping; the target keeps the original Sigma name so emission
    /// still produces a runnable (if imperfect) query.
    Missing,
}

/// Named value transform attached to a profile mapping, applied while
/// lowering values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Transform {
    Lower,
    Upper,
    Basename,
    StripQuotes,
    CidrToSubnet,
}

impl Transform {
    pub fn from_name(name: &str) -> Option<Transform> {
        match name {
            "lower" => Some(Transform::Lower),
            "upper" => Some(Transform::Upper),
            "basename" => Some(Transform::Basename),
            "strip_quotes" => Some(Transform::StripQuotes),
            "cidr_to_subnet" => Some(Transform::CidrToSubnet),
            _ => None,
        }
    }

    /// Apply the transform to a string value. Transforms are pure.
    pub fn apply(&self, value: &str) -> String {
        match self {
            Transform::Lower => value.to_lowercase(),
            Transform::Upper => value.to_uppercase(),
            Transform::Basename => value
                .rsplit(['\\', '/'])
                .next()
                .unwrap_or(value)
                .to_string(),
            Transform::StripQuotes => value.trim_matches(['"', '\'']).to_string(),
            Transform::CidrToSubnet => cidr_to_subnet(value),
        }
    }
}

/// Rewrite `a.b.c.d/nn` into a wildcard subnet prefix for the octet-aligned
/// prefix lengths (`10.1.2.0/24` -> `10.1.2.*`). Other inputs pass through.
fn cidr_to_subnet(value: &str) -> String {
    let Some((addr, prefix)) = value.split_once('/') else {
        return value.to_string();
    };
    let octets: Vec<&str> = addr.split('.').collect();
    if octets.len() != 4 {
        return value.to_string();
    }
    let keep = match prefix {
        "8" => 1,
        "16" => 2,
        "24" => 3,
        "32" => return addr.to_string(),
        _ => return value.to_string(),
    };
    format!("{}.*", octets[..keep].join("."))
}

/// Result of resolving one Sigma field.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Resolution {
    pub sigma_field: String,
    /// The field name to emit. Always set; equals the Sigma name when the
    /// status is `missing`.
    pub target_field: String,
    pub status: MappingStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transform: Option<Transform>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// Per-request field resolver. Holds the profile and logsource context plus
/// a memo table; never shared between requests.
pub struct Resolver<'a> {
    profile: &'a ConversionProfile,
    logsource: &'a LogSource,
    memo: HashMap<String, Resolution>,
}

impl<'a> Resolver<'a> {
    pub fn new(profile: &'a ConversionProfile, logsource: &'a LogSource) -> Self {
        Resolver {
            profile,
            logsource,
            memo: HashMap::new(),
        }
    }

    /// Resolve a Sigma field to a target field, memoized per request.
    pub fn resolve(&mut self, sigma_field: &str) -> Resolution {
        if let Some(hit) = self.memo.get(sigma_field) {
            return hit.clone();
        }
        let resolution = self.resolve_uncached(sigma_field);
        self.memo
            .insert(sigma_field.to_string(), resolution.clone());
        resolution
    }

    fn resolve_uncached(&self, sigma_field: &str) -> Resolution {
        // 1. Profile mapping, exact match.
        if let Some(mapping) = self.profile.mapping_for(sigma_field) {
            match mapping.transform.as_deref() {
                None => {
                    return Resolution {
                        sigma_field: sigma_field.to_string(),
                        target_field: mapping.target_field.clone(),
                        status: MappingStatus::Ok,
                        transform: None,
                        note: None,
                    };
                }
                Some(name) => match Transform::from_name(name) {
                    Some(transform) => {
                        return Resolution {
                            sigma_field: sigma_field.to_string(),
                            target_field: mapping.target_field.clone(),
                            status: MappingStatus::Ok,
                            transform: Some(transform),
                            note: None,
                        };
                    }
                    None => {
                        // Unknown transform name: keep the raw target but
                        // degrade to a suggestion with a note.
                        return Resolution {
                            sigma_field: sigma_field.to_string(),
                            target_field: mapping.target_field.clone(),
                            status: MappingStatus::Suggested,
                            transform: None,
                            note: Some(format!("unknown transform '{name}' ignored")),
                        };
                    }
                },
            }
        }

        // 2. CIM table, when the profile opts in.
        if self.profile.cim_enabled
            && let Some(target) = cim::cim_lookup(self.logsource.category.as_deref(), sigma_field)
        {
            return Resolution {
                sigma_field: sigma_field.to_string(),
                target_field: target.to_string(),
                status: MappingStatus::Suggested,
                transform: None,
                note: Some("CIM mapping".to_string()),
            };
        }

        // 3. Built-in Windows defaults.
        if let Some(target) = cim::windows_default(sigma_field) {
            return Resolution {
                sigma_field: sigma_field.to_string(),
                target_field: target.to_string(),
                status: MappingStatus::Ok,
                transform: None,
                note: None,
            };
        }

        // 4. Identity fallback.
        debug!(field = sigma_field, "no mapping found, passing through");
        Resolution {
            sigma_field: sigma_field.to_string(),
            target_field: sigma_field.to_string(),
            status: MappingStatus::Missing,
            transform: None,
            note: None,
        }
    }
}
