//! Forward pipeline: Sigma YAML text in, SPL plus the full analysis report
//! out. Thin orchestration over parse -> compile -> analyze -> emit.

use serde::Serialize;
use tracing::debug;

use sigmaspl_parser::parse_sigma_rule;

use crate::compile::compile_rule;
use crate::emit::{self, EmitOptions};
use crate::error::Result;
use crate::gaps::{self, GapItem};
use crate::health::{self, HealthCheck};
use crate::logsource;
use crate::prereq::{self, PrerequisiteInfo};
use crate::profile::ConversionProfile;
use crate::resolve::MappingStatus;

/// One field mapping applied during a conversion, as reported to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MappingResult {
    pub sigma_field: String,
    pub target_field: String,
    pub status: MappingStatus,
}

/// The complete result of a forward (Sigma -> SPL) translation.
#[derive(Debug, Clone)]
pub struct ForwardConversion {
    pub rule_title: String,
    pub spl: String,
    pub mappings: Vec<MappingResult>,
    pub prerequisites: PrerequisiteInfo,
    pub gaps: Vec<GapItem>,
    pub health_checks: Vec<HealthCheck>,
    /// Non-fatal parser warnings (unknown keys).
    pub warnings: Vec<String>,
}

/// Translate a Sigma rule to SPL under a profile.
pub fn convert_sigma_to_spl(
    sigma_yaml: &str,
    profile: &ConversionProfile,
    opts: &EmitOptions,
) -> Result<ForwardConversion> {
    let parsed = parse_sigma_rule(sigma_yaml)?;
    let rule = parsed.rule;

    let compiled = compile_rule(&rule, profile)?;
    debug!(
        title = %rule.title,
        fields = compiled.field_uses.len(),
        "rule compiled"
    );

    // Mapping report: one row per Sigma field, first resolution wins
    // (the resolver is memoized, so repeats are identical anyway).
    let mut mappings: Vec<MappingResult> = Vec::new();
    for fu in &compiled.field_uses {
        if !mappings
            .iter()
            .any(|m| m.sigma_field == fu.resolution.sigma_field)
        {
            mappings.push(MappingResult {
                sigma_field: fu.resolution.sigma_field.clone(),
                target_field: fu.resolution.target_field.clone(),
                status: fu.resolution.status,
            });
        }
    }

    let prerequisites = prereq::analyze(&rule);
    let gap_items = gaps::analyze(&compiled.field_uses, profile);

    let base = emit::base_search(&rule.logsource, profile, opts);
    let resolved_triples: Vec<(String, String, MappingStatus)> = mappings
        .iter()
        .map(|m| (m.sigma_field.clone(), m.target_field.clone(), m.status))
        .collect();
    let event_codes = logsource::defaults_for(&rule.logsource).event_codes;
    let health_checks = health::generate(&base, event_codes, &resolved_triples);

    let spl = emit::emit(&compiled, &rule, profile, opts, &health_checks);

    Ok(ForwardConversion {
        rule_title: rule.title.clone(),
        spl,
        mappings,
        prerequisites,
        gaps: gap_items,
        health_checks,
        warnings: parsed.warnings,
    })
}
