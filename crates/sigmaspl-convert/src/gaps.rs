//! Gap analysis: every field the resolver could not confidently map becomes
//! a remediation item.

use serde::Serialize;

use crate::cim;
use crate::compile::FieldUse;
use crate::profile::ConversionProfile;
use crate::resolve::MappingStatus;

/// One unresolved or weakly-resolved field reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GapItem {
    pub field: String,
    /// Dotted path locating the field (e.g. `detection.selection.Image`).
    pub location: String,
    pub impact: String,
    pub suggestions: Vec<String>,
}

const IMPACT_MISSING: &str =
    "No mapping exists; query uses raw Sigma field name which may not resolve in Splunk";
const IMPACT_SUGGESTED: &str = "Using CIM/heuristic mapping; verify against your schema";

/// Turn every non-`ok` field use into a gap item. Occurrences are already
/// deduplicated by location by the compiler.
pub fn analyze(field_uses: &[FieldUse], profile: &ConversionProfile) -> Vec<GapItem> {
    field_uses
        .iter()
        .filter(|fu| fu.resolution.status != MappingStatus::Ok)
        .map(|fu| {
            let field = fu.resolution.sigma_field.clone();
            match fu.resolution.status {
                MappingStatus::Missing => GapItem {
                    suggestions: similar_names(&field, profile),
                    field,
                    location: fu.location.clone(),
                    impact: IMPACT_MISSING.to_string(),
                },
                MappingStatus::Suggested => GapItem {
                    suggestions: vec![
                        fu.resolution
                            .note
                            .clone()
                            .unwrap_or_else(|| "heuristic mapping".to_string()),
                    ],
                    field,
                    location: fu.location.clone(),
                    impact: IMPACT_SUGGESTED.to_string(),
                },
                MappingStatus::Ok => unreachable!("filtered above"),
            }
        })
        .collect()
}

/// Similar field names by normalized edit distance: profile mappings first,
/// then the built-in tables, keeping distance <= 2 on the lowercased forms.
fn similar_names(field: &str, profile: &ConversionProfile) -> Vec<String> {
    let needle = field.to_lowercase();
    let mut scored: Vec<(usize, String)> = Vec::new();

    let mut consider = |candidate: &str, scored: &mut Vec<(usize, String)>| {
        let d = levenshtein(&needle, &candidate.to_lowercase());
        if d <= 2 && !scored.iter().any(|(_, c)| c == candidate) {
            scored.push((d, candidate.to_string()));
        }
    };

    for m in &profile.mappings {
        consider(&m.sigma_field, &mut scored);
    }
    for name in cim::known_sigma_names() {
        consider(name, &mut scored);
    }
    for name in cim::known_target_names() {
        consider(name, &mut scored);
    }

    scored.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)));
    scored.into_iter().map(|(_, c)| c).collect()
}

/// Plain DP edit distance; inputs are short field names so the quadratic
/// table is fine.
fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0usize; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::ProfileMapping;
    use crate::resolve::Resolution;

    fn missing_use(field: &str, location: &str) -> FieldUse {
        FieldUse {
            location: location.to_string(),
            resolution: Resolution {
                sigma_field: field.to_string(),
                target_field: field.to_string(),
                status: MappingStatus::Missing,
                transform: None,
                note: None,
            },
        }
    }

    #[test]
    fn levenshtein_basics() {
        assert_eq!(levenshtein("image", "image"), 0);
        assert_eq!(levenshtein("image", "images"), 1);
        assert_eq!(levenshtein("comandline", "commandline"), 1);
        assert_eq!(levenshtein("", "abc"), 3);
    }

    #[test]
    fn missing_field_suggests_close_profile_mapping() {
        let profile = ConversionProfile {
            mappings: vec![ProfileMapping {
                sigma_field: "Imagee".into(),
                target_field: "process".into(),
                transform: None,
                category: None,
                notes: None,
            }],
            ..Default::default()
        };
        let gaps = analyze(
            &[missing_use("Imagge", "detection.selection.Imagge")],
            &profile,
        );
        assert_eq!(gaps.len(), 1);
        assert_eq!(gaps[0].field, "Imagge");
        assert!(gaps[0].suggestions.contains(&"Imagee".to_string()));
        assert!(gaps[0].suggestions.contains(&"Image".to_string()));
    }

    #[test]
    fn ok_resolutions_produce_no_gap() {
        let fu = FieldUse {
            location: "detection.selection.Image".to_string(),
            resolution: Resolution {
                sigma_field: "Image".into(),
                target_field: "Image".into(),
                status: MappingStatus::Ok,
                transform: None,
                note: None,
            },
        };
        assert!(analyze(&[fu], &ConversionProfile::default()).is_empty());
    }

    #[test]
    fn unrelated_names_not_suggested() {
        let gaps = analyze(
            &[missing_use("Zzyzx", "detection.selection.Zzyzx")],
            &ConversionProfile::default(),
        );
        assert_eq!(gaps.len(), 1);
        assert!(gaps[0].suggestions.is_empty());
    }
}
