//! AST types for Sigma rules: metadata, logsource, detections, and conditions.
//!
//! Reference: Sigma specification V2.0.0 (2024-08-08)

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::value::SigmaValue;

// =============================================================================
// Enumerations
// =============================================================================

/// Rule maturity status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Stable,
    Test,
    Experimental,
    Deprecated,
    Unsupported,
}

impl FromStr for Status {
    type Err = ();
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "stable" => Ok(Status::Stable),
            "test" => Ok(Status::Test),
            "experimental" => Ok(Status::Experimental),
            "deprecated" => Ok(Status::Deprecated),
            "unsupported" => Ok(Status::Unsupported),
            _ => Err(()),
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Status::Stable => "stable",
            Status::Test => "test",
            Status::Experimental => "experimental",
            Status::Deprecated => "deprecated",
            Status::Unsupported => "unsupported",
        };
        write!(f, "{s}")
    }
}

/// Severity level of a triggered rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Informational,
    Low,
    Medium,
    High,
    Critical,
}

impl FromStr for Level {
    type Err = ();
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "informational" => Ok(Level::Informational),
            "low" => Ok(Level::Low),
            "medium" => Ok(Level::Medium),
            "high" => Ok(Level::High),
            "critical" => Ok(Level::Critical),
            _ => Err(()),
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Level::Informational => "informational",
            Level::Low => "low",
            Level::Medium => "medium",
            Level::High => "high",
            Level::Critical => "critical",
        };
        write!(f, "{s}")
    }
}

// =============================================================================
// Field Modifiers
// =============================================================================

/// Supported Sigma field modifiers.
///
/// Any identifier outside this set rejects the rule with an
/// `UnknownModifier` error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Modifier {
    // String matching
    Contains,
    StartsWith,
    EndsWith,

    // Value linking: AND across list values instead of OR
    All,

    // Encoding
    Base64,
    Base64Offset,
    Wide,
    Utf16,

    // Pattern matching
    Re,
    Cidr,

    // Case sensitivity (recognized, currently a no-op flag)
    Cased,

    // Numeric comparison
    Lt,
    Lte,
    Gt,
    Gte,
}

impl FromStr for Modifier {
    type Err = ();
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "contains" => Ok(Modifier::Contains),
            "startswith" => Ok(Modifier::StartsWith),
            "endswith" => Ok(Modifier::EndsWith),
            "all" => Ok(Modifier::All),
            "base64" => Ok(Modifier::Base64),
            "base64offset" => Ok(Modifier::Base64Offset),
            "wide" | "utf16le" => Ok(Modifier::Wide),
            "utf16" => Ok(Modifier::Utf16),
            "re" => Ok(Modifier::Re),
            "cidr" => Ok(Modifier::Cidr),
            "cased" => Ok(Modifier::Cased),
            "lt" => Ok(Modifier::Lt),
            "lte" => Ok(Modifier::Lte),
            "gt" => Ok(Modifier::Gt),
            "gte" => Ok(Modifier::Gte),
            _ => Err(()),
        }
    }
}

impl fmt::Display for Modifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Modifier::Contains => "contains",
            Modifier::StartsWith => "startswith",
            Modifier::EndsWith => "endswith",
            Modifier::All => "all",
            Modifier::Base64 => "base64",
            Modifier::Base64Offset => "base64offset",
            Modifier::Wide => "wide",
            Modifier::Utf16 => "utf16",
            Modifier::Re => "re",
            Modifier::Cidr => "cidr",
            Modifier::Cased => "cased",
            Modifier::Lt => "lt",
            Modifier::Lte => "lte",
            Modifier::Gt => "gt",
            Modifier::Gte => "gte",
        };
        write!(f, "{s}")
    }
}

// =============================================================================
// Field Specification
// =============================================================================

/// A field name with optional modifiers, parsed from detection keys like
/// `TargetObject|endswith` or `CommandLine|contains|all`.
///
/// A dotted field name (`EventData.ParentImage`) is a single opaque token;
/// splitting, if any, is the resolver's business.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldSpec {
    /// Field name (`None` for keyword detections without a field).
    pub name: Option<String>,
    /// Ordered list of modifiers applied to this field. Order matters:
    /// `|base64|contains` encodes, then substring-matches.
    pub modifiers: Vec<Modifier>,
}

impl FieldSpec {
    pub fn new(name: Option<String>, modifiers: Vec<Modifier>) -> Self {
        FieldSpec { name, modifiers }
    }

    pub fn has_modifier(&self, m: Modifier) -> bool {
        self.modifiers.contains(&m)
    }

    pub fn is_keyword(&self) -> bool {
        self.name.is_none()
    }
}

// =============================================================================
// Condition Expression AST
// =============================================================================

/// Parsed condition expression AST.
///
/// Produced by the PEG + Pratt parser from condition strings like
/// `selection and not filter` or `1 of selection_* and not all of filter_*`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ConditionExpr {
    /// Logical AND of sub-expressions.
    And(Vec<ConditionExpr>),
    /// Logical OR of sub-expressions.
    Or(Vec<ConditionExpr>),
    /// Logical NOT of a sub-expression.
    Not(Box<ConditionExpr>),
    /// Reference to a named selection.
    Identifier(String),
    /// Quantified selector: `1 of selection_*`, `all of them`, etc.
    Selector {
        quantifier: Quantifier,
        pattern: SelectorPattern,
    },
}

impl fmt::Display for ConditionExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConditionExpr::And(args) => {
                let parts: Vec<String> = args.iter().map(|a| format!("{a}")).collect();
                write!(f, "({})", parts.join(" and "))
            }
            ConditionExpr::Or(args) => {
                let parts: Vec<String> = args.iter().map(|a| format!("{a}")).collect();
                write!(f, "({})", parts.join(" or "))
            }
            ConditionExpr::Not(arg) => write!(f, "not {arg}"),
            ConditionExpr::Identifier(id) => write!(f, "{id}"),
            ConditionExpr::Selector {
                quantifier,
                pattern,
            } => write!(f, "{quantifier} of {pattern}"),
        }
    }
}

/// Quantifier in a selector expression.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Quantifier {
    /// Match any (at least one): `1 of ...` or `any of ...`
    Any,
    /// Match all: `all of ...`
    All,
    /// Match a specific count: `N of ...`
    Count(u64),
}

impl fmt::Display for Quantifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Quantifier::Any => write!(f, "1"),
            Quantifier::All => write!(f, "all"),
            Quantifier::Count(n) => write!(f, "{n}"),
        }
    }
}

/// Target pattern in a selector expression.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum SelectorPattern {
    /// All selection names: `... of them`
    Them,
    /// A name or wildcard pattern matching selection names: `... of selection_*`
    Pattern(String),
}

impl fmt::Display for SelectorPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SelectorPattern::Them => write!(f, "them"),
            SelectorPattern::Pattern(p) => write!(f, "{p}"),
        }
    }
}

// =============================================================================
// Detection Section
// =============================================================================

/// A single detection item: a field (with modifiers) mapped to one or more
/// values.
///
/// Examples:
/// - `EventType: "SetValue"` -> field="EventType", values=["SetValue"]
/// - `CommandLine|contains|all: ['-nop', '-enc']` -> field="CommandLine",
///   modifiers=[Contains, All], values=[...]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetectionItem {
    /// The field specification (name + modifiers).
    pub field: FieldSpec,
    /// One or more values to match against.
    pub values: Vec<SigmaValue>,
}

/// A named selection definition.
///
/// A YAML mapping AND-links its items; a YAML list of mappings OR-links the
/// sub-selections.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Detection {
    /// AND-linked detection items (from a YAML mapping).
    AllOf(Vec<DetectionItem>),
    /// OR-linked sub-detections (from a YAML list of mappings).
    AnyOf(Vec<Detection>),
    /// Keyword detection: plain value(s) without a field.
    Keywords(Vec<SigmaValue>),
}

/// The complete detection section of a Sigma rule.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Detections {
    /// Named selections (e.g. `selection`, `filter_main`).
    pub named: HashMap<String, Detection>,
    /// Insertion order of selection names; the emitter and selector
    /// expansion depend on stable ordering.
    pub order: Vec<String>,
    /// The parsed condition expression.
    pub condition: ConditionExpr,
    /// Raw condition string (before parsing).
    pub condition_string: String,
}

impl Detections {
    /// Selection names in document order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(|s| s.as_str())
    }
}

// =============================================================================
// Log Source
// =============================================================================

/// Log source specification. All fields are optional, but a rule must set
/// at least one of them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LogSource {
    pub category: Option<String>,
    pub product: Option<String>,
    pub service: Option<String>,
    pub definition: Option<String>,
}

impl LogSource {
    pub fn is_empty(&self) -> bool {
        self.category.is_none()
            && self.product.is_none()
            && self.service.is_none()
            && self.definition.is_none()
    }
}

// =============================================================================
// Sigma Detection Rule
// =============================================================================

/// A complete Sigma detection rule.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SigmaRule {
    // Required fields
    pub title: String,
    pub logsource: LogSource,
    pub detection: Detections,

    // Optional metadata
    pub id: Option<String>,
    pub status: Option<Status>,
    pub description: Option<String>,
    pub author: Option<String>,
    pub references: Vec<String>,
    pub date: Option<String>,
    pub fields: Vec<String>,
    pub falsepositives: Vec<String>,
    pub level: Option<Level>,
    pub tags: Vec<String>,
}

impl SigmaRule {
    /// ATT&CK technique ids carried in `tags` (`attack.t1003` -> `T1003`,
    /// sub-techniques like `attack.t1003.001` included).
    pub fn attack_techniques(&self) -> Vec<String> {
        self.tags
            .iter()
            .filter_map(|t| t.strip_prefix("attack."))
            .filter(|rest| {
                let mut chars = rest.chars();
                matches!(chars.next(), Some('t' | 'T'))
                    && chars.next().is_some_and(|c| c.is_ascii_digit())
            })
            .map(|rest| rest.to_uppercase())
            .collect()
    }

    /// ATT&CK tactic names carried in `tags` (`attack.credential-access` ->
    /// `credential-access`). Technique tags are excluded.
    pub fn attack_tactics(&self) -> Vec<String> {
        self.tags
            .iter()
            .filter_map(|t| t.strip_prefix("attack."))
            .filter(|rest| {
                let mut chars = rest.chars();
                !(matches!(chars.next(), Some('t' | 'T'))
                    && chars.next().is_some_and(|c| c.is_ascii_digit()))
            })
            .map(|rest| rest.to_string())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule_with_tags(tags: &[&str]) -> SigmaRule {
        SigmaRule {
            title: "t".into(),
            logsource: LogSource {
                product: Some("windows".into()),
                ..Default::default()
            },
            detection: Detections {
                named: HashMap::new(),
                order: Vec::new(),
                condition: ConditionExpr::Identifier("selection".into()),
                condition_string: "selection".into(),
            },
            id: None,
            status: None,
            description: None,
            author: None,
            references: Vec::new(),
            date: None,
            fields: Vec::new(),
            falsepositives: Vec::new(),
            level: None,
            tags: tags.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn attack_tag_split() {
        let rule = rule_with_tags(&[
            "attack.credential_access",
            "attack.t1003",
            "attack.t1003.001",
            "car.2019-04-004",
        ]);
        assert_eq!(rule.attack_techniques(), vec!["T1003", "T1003.001"]);
        assert_eq!(rule.attack_tactics(), vec!["credential_access"]);
    }

    #[test]
    fn modifier_parsing() {
        assert_eq!("contains".parse::<Modifier>(), Ok(Modifier::Contains));
        assert_eq!("utf16le".parse::<Modifier>(), Ok(Modifier::Wide));
        assert!("windash".parse::<Modifier>().is_err());
        assert!("exists".parse::<Modifier>().is_err());
    }
}
