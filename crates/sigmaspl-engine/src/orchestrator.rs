//! The orchestrator drives the forward and reverse pipelines against the
//! repository state and assembles [`ConversionResponse`]s.
//!
//! Every entry point is a pure function of its input plus the persisted
//! state (profiles, mappings, active configs): a translation either returns
//! a full response or an error, and history is only written on success.

use std::str::FromStr;
use std::sync::Arc;

use chrono::Utc;
use tracing::info;

use sigmaspl_convert::{
    EmitOptions, ReverseOptions, convert_sigma_to_spl, reverse_spl,
};
use sigmaspl_parser::{Level, Status, parse_sigma_rule};

use crate::coverage::{CoverageCheckResult, check_coverage};
use crate::error::{EngineError, Result};
use crate::llm::{self, LlmClient};
use crate::response::{ConversionRecord, ConversionResponse, ConversionType};
use crate::store::Store;

/// Request for the forward (Sigma -> SPL) entry point.
#[derive(Debug, Clone, Default)]
pub struct SigmaToSplRequest {
    pub sigma_yaml: String,
    pub profile_id: Option<i64>,
    pub name: Option<String>,
    pub index_override: Option<String>,
    pub sourcetype_override: Option<String>,
    pub time_range: Option<String>,
}

/// Request for the reverse (SPL -> Sigma) entry point.
#[derive(Debug, Clone, Default)]
pub struct SplToSigmaRequest {
    pub spl_query: String,
    pub profile_id: Option<i64>,
    pub title: Option<String>,
    pub level: Option<String>,
    pub status: Option<String>,
    pub author: Option<String>,
    pub description: Option<String>,
}

/// Request for rule generation from a plain-text description.
#[derive(Debug, Clone, Default)]
pub struct TextToSigmaRequest {
    pub description: String,
    pub profile_id: Option<i64>,
    pub log_source: Option<String>,
    pub level: Option<String>,
}

/// Drives conversions against a shared [`Store`] and an optional assistant.
pub struct Orchestrator {
    store: Arc<Store>,
    llm: Option<Box<dyn LlmClient>>,
}

impl Orchestrator {
    pub fn new(store: Arc<Store>) -> Self {
        Orchestrator { store, llm: None }
    }

    pub fn with_llm(store: Arc<Store>, llm: Box<dyn LlmClient>) -> Self {
        Orchestrator {
            store,
            llm: Some(llm),
        }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Translate a Sigma rule to SPL and record the conversion.
    pub fn sigma_to_spl(&self, request: &SigmaToSplRequest) -> Result<ConversionResponse> {
        let profile = self.store.conversion_profile(request.profile_id)?;
        let opts = EmitOptions {
            index_override: request.index_override.clone(),
            sourcetype_override: request.sourcetype_override.clone(),
            time_range: request.time_range.clone(),
        };

        let result = convert_sigma_to_spl(&request.sigma_yaml, &profile, &opts)?;
        info!(rule = %result.rule_title, gaps = result.gaps.len(), "sigma converted to spl");

        let mut response = ConversionResponse {
            id: None,
            name: request.name.clone().unwrap_or_else(|| result.rule_title.clone()),
            conversion_type: ConversionType::SigmaToSpl,
            spl: Some(result.spl),
            sigma_yaml: None,
            prerequisites: Some(result.prerequisites),
            mappings: result.mappings,
            gaps: result.gaps,
            health_checks: result.health_checks,
            correlation_notes: None,
            llm_used: false,
            warnings: result.warnings,
            created_at: Utc::now(),
        };

        let record = self.store.record_conversion(ConversionRecord::from_response(
            &response,
            request.profile_id,
            &request.sigma_yaml,
        ));
        response.id = Some(record.id);
        Ok(response)
    }

    /// Translate an SPL query to a Sigma rule and record the conversion.
    pub fn spl_to_sigma(&self, request: &SplToSigmaRequest) -> Result<ConversionResponse> {
        let profile = self.store.conversion_profile(request.profile_id)?;
        let opts = ReverseOptions {
            title: request
                .title
                .clone()
                .unwrap_or_else(|| "Custom Detection Rule".to_string()),
            level: parse_enum::<Level>(request.level.as_deref(), Level::Medium, "level")?,
            status: parse_enum::<Status>(
                request.status.as_deref(),
                Status::Experimental,
                "status",
            )?,
            author: request.author.clone(),
            description: request.description.clone(),
        };

        let result = reverse_spl(&request.spl_query, &profile, &opts)?;
        info!(
            notes = result.correlation_notes.is_some(),
            "spl converted to sigma"
        );

        let mut response = ConversionResponse {
            id: None,
            name: opts.title,
            conversion_type: ConversionType::SplToSigma,
            spl: None,
            sigma_yaml: Some(result.sigma_yaml),
            prerequisites: None,
            mappings: Vec::new(),
            gaps: Vec::new(),
            health_checks: Vec::new(),
            correlation_notes: result.correlation_notes,
            llm_used: false,
            warnings: Vec::new(),
            created_at: Utc::now(),
        };

        let record = self.store.record_conversion(ConversionRecord::from_response(
            &response,
            request.profile_id,
            &request.spl_query,
        ));
        response.id = Some(record.id);
        Ok(response)
    }

    /// Generate a Sigma rule from a plain-text description via the
    /// assistant, then run the deterministic forward pipeline over it.
    pub fn text_to_sigma(&self, request: &TextToSigmaRequest) -> Result<ConversionResponse> {
        let Some(llm) = &self.llm else {
            return Err(EngineError::LlmUnavailable(
                "no assistant backend configured".to_string(),
            ));
        };

        let level = request.level.clone().unwrap_or_else(|| "medium".to_string());
        let prompt =
            llm::rule_generation_prompt(&request.description, request.log_source.as_deref(), &level);
        let generated = llm
            .generate(&prompt, llm::RULE_GENERATION_CONTEXT)
            .map_err(|e| EngineError::LlmUnavailable(e.to_string()))?;
        let sigma_yaml = llm::strip_code_fences(&generated).to_string();

        // Validate before doing anything else with the output.
        let parsed = parse_sigma_rule(&sigma_yaml)?;

        let profile = self.store.conversion_profile(request.profile_id)?;
        let result = convert_sigma_to_spl(&sigma_yaml, &profile, &EmitOptions::default())?;

        let mut response = ConversionResponse {
            id: None,
            name: parsed.rule.title.clone(),
            conversion_type: ConversionType::TextToSigma,
            spl: Some(result.spl),
            sigma_yaml: Some(sigma_yaml),
            prerequisites: Some(result.prerequisites),
            mappings: result.mappings,
            gaps: result.gaps,
            health_checks: result.health_checks,
            correlation_notes: None,
            llm_used: true,
            warnings: result.warnings,
            created_at: Utc::now(),
        };

        let record = self.store.record_conversion(ConversionRecord::from_response(
            &response,
            request.profile_id,
            &request.description,
        ));
        response.id = Some(record.id);
        Ok(response)
    }

    /// Check the active telemetry configurations against a set of required
    /// event IDs.
    pub fn check_coverage(
        &self,
        required_event_ids: &[u32],
        category: Option<&str>,
    ) -> CoverageCheckResult {
        let sysmon = self.store.active_sysmon();
        let audit = self.store.active_audit();
        check_coverage(
            required_event_ids,
            category,
            sysmon.as_ref(),
            audit.as_ref(),
        )
    }
}

fn parse_enum<T: FromStr>(value: Option<&str>, default: T, what: &str) -> Result<T> {
    match value {
        None => Ok(default),
        Some(s) => s
            .parse::<T>()
            .map_err(|_| EngineError::Convert(sigmaspl_convert::ConvertError::invalid(
                format!("unknown {what} '{s}'"),
                what,
            ))),
    }
}
