//! Optional assistant adapter. The forward translation path never consults
//! it; only `text_to_sigma` goes through this seam, and output is always
//! validated by the regular parser before anything else happens.

use std::fmt;

/// Error from an assistant backend.
#[derive(Debug)]
pub struct LlmError(pub String);

impl fmt::Display for LlmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for LlmError {}

/// A text-generation backend. Implementations own their transport, model
/// selection, and timeout handling.
pub trait LlmClient: Send + Sync {
    /// Generate text for `prompt`, with `context` carrying system-level
    /// instructions.
    fn generate(&self, prompt: &str, context: &str) -> Result<String, LlmError>;
}

/// System instructions for rule generation from a plain-text description.
pub const RULE_GENERATION_CONTEXT: &str = "You are a detection engineer. Produce exactly one \
Sigma detection rule as YAML with title, logsource, detection, and condition keys. Output only \
the YAML document, no prose and no code fences.";

/// Build the generation prompt for `text_to_sigma`.
pub fn rule_generation_prompt(description: &str, log_source: Option<&str>, level: &str) -> String {
    let mut prompt = format!(
        "Write a Sigma rule that detects the following behavior:\n{description}\n\nlevel: {level}"
    );
    if let Some(ls) = log_source {
        prompt.push_str(&format!("\nPreferred logsource: {ls}"));
    }
    prompt
}

/// Strip Markdown code fences an assistant may wrap around YAML output.
pub fn strip_code_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("yaml").or(rest.strip_prefix("yml")).unwrap_or(rest);
    rest.trim_start_matches('\n')
        .strip_suffix("```")
        .map(str::trim_end)
        .unwrap_or(trimmed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fences_are_stripped() {
        assert_eq!(strip_code_fences("```yaml\ntitle: T\n```"), "title: T");
        assert_eq!(strip_code_fences("```\ntitle: T\n```"), "title: T");
        assert_eq!(strip_code_fences("title: T"), "title: T");
    }
}
