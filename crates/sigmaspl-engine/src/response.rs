//! Wire-shaped conversion results: the response returned to callers and the
//! history record persisted by the store.

use chrono::{DateTime, Utc};
use serde::Serialize;

use sigmaspl_convert::{GapItem, HealthCheck, MappingResult, PrerequisiteInfo};

/// Direction of a conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversionType {
    SigmaToSpl,
    SplToSigma,
    TextToSigma,
}

/// What the orchestrator returns from every entry point.
#[derive(Debug, Clone, Serialize)]
pub struct ConversionResponse {
    /// History record id, present once the conversion is stored.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub name: String,
    pub conversion_type: ConversionType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spl: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sigma_yaml: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prerequisites: Option<PrerequisiteInfo>,
    pub mappings: Vec<MappingResult>,
    pub gaps: Vec<GapItem>,
    pub health_checks: Vec<HealthCheck>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_notes: Option<String>,
    pub llm_used: bool,
    /// Non-fatal parser warnings (unknown keys and the like).
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    pub created_at: DateTime<Utc>,
}

/// The persisted form of a conversion. Holds a snapshot of everything that
/// was applied, so deleting a profile later does not orphan the record.
#[derive(Debug, Clone, Serialize)]
pub struct ConversionRecord {
    pub id: i64,
    pub name: String,
    pub conversion_type: ConversionType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile_id: Option<i64>,
    pub input_content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_sigma: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_spl: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prerequisites: Option<PrerequisiteInfo>,
    pub mappings: Vec<MappingResult>,
    pub gaps: Vec<GapItem>,
    pub health_checks: Vec<HealthCheck>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_notes: Option<String>,
    pub llm_used: bool,
    pub created_at: DateTime<Utc>,
}

impl ConversionRecord {
    /// Snapshot a response for persistence. The store assigns the id.
    pub fn from_response(
        response: &ConversionResponse,
        profile_id: Option<i64>,
        input_content: &str,
    ) -> Self {
        ConversionRecord {
            id: 0,
            name: response.name.clone(),
            conversion_type: response.conversion_type,
            profile_id,
            input_content: input_content.to_string(),
            output_sigma: response.sigma_yaml.clone(),
            output_spl: response.spl.clone(),
            prerequisites: response.prerequisites.clone(),
            mappings: response.mappings.clone(),
            gaps: response.gaps.clone(),
            health_checks: response.health_checks.clone(),
            correlation_notes: response.correlation_notes.clone(),
            llm_used: response.llm_used,
            created_at: response.created_at,
        }
    }
}

#[cfg(test)]
impl ConversionRecord {
    pub(crate) fn forward_stub(name: &str, profile_id: Option<i64>) -> Self {
        ConversionRecord {
            id: 0,
            name: name.to_string(),
            conversion_type: ConversionType::SigmaToSpl,
            profile_id,
            input_content: String::new(),
            output_sigma: None,
            output_spl: Some("search index=*".to_string()),
            prerequisites: None,
            mappings: Vec::new(),
            gaps: Vec::new(),
            health_checks: Vec::new(),
            correlation_notes: None,
            llm_used: false,
            created_at: Utc::now(),
        }
    }
}
