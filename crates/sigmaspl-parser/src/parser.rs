//! YAML -> AST loader for Sigma detection rules.
//!
//! The document is first deserialized into a generic `serde_yaml::Value`,
//! then projected onto the typed [`SigmaRule`]. Everything downstream of this
//! module operates on closed types.
//!
//! Unknown top-level keys are collected as non-fatal warnings; structural
//! violations (missing `title`/`logsource`/`detection`/`condition`, empty
//! selections, unknown modifiers, unresolved condition identifiers) reject
//! the document.

use serde_yaml::Value;

use crate::ast::*;
use crate::condition::parse_condition;
use crate::error::{Result, SigmaParserError};
use crate::value::SigmaValue;

/// Top-level keys the schema knows about. Anything else is reported as a
/// warning and otherwise ignored.
const KNOWN_KEYS: &[&str] = &[
    "title",
    "id",
    "status",
    "description",
    "author",
    "references",
    "date",
    "fields",
    "falsepositives",
    "level",
    "tags",
    "logsource",
    "detection",
];

/// A parsed rule together with non-fatal warnings collected along the way.
#[derive(Debug, Clone)]
pub struct ParsedSigma {
    pub rule: SigmaRule,
    pub warnings: Vec<String>,
}

/// Parse a YAML string containing a single Sigma detection rule.
pub fn parse_sigma_rule(yaml: &str) -> Result<ParsedSigma> {
    let value: Value = serde_yaml::from_str(yaml)?;
    parse_sigma_value(&value)
}

/// Parse an already-deserialized YAML document into a Sigma rule.
pub fn parse_sigma_value(value: &Value) -> Result<ParsedSigma> {
    let m = value
        .as_mapping()
        .ok_or_else(|| SigmaParserError::invalid("document is not a YAML mapping", "."))?;

    let mut warnings = Vec::new();
    for (k, _) in m {
        if let Some(key) = k.as_str()
            && !KNOWN_KEYS.contains(&key)
        {
            warnings.push(format!("unknown top-level key '{key}'"));
        }
    }

    let title = get_str(m, "title")
        .ok_or_else(|| SigmaParserError::invalid("missing required key 'title'", "title"))?
        .to_string();

    let logsource_val = m
        .get(val_key("logsource"))
        .ok_or_else(|| SigmaParserError::invalid("missing required key 'logsource'", "logsource"))?;
    let logsource = parse_logsource(logsource_val, &mut warnings)?;
    if logsource.is_empty() {
        return Err(SigmaParserError::invalid(
            "logsource must set at least one of category/product/service/definition",
            "logsource",
        ));
    }

    let detection_val = m
        .get(val_key("detection"))
        .ok_or_else(|| SigmaParserError::invalid("missing required key 'detection'", "detection"))?;
    let detection = parse_detections(detection_val)?;

    let level = match get_str(m, "level") {
        Some(s) => Some(s.parse::<Level>().map_err(|_| {
            SigmaParserError::invalid(format!("unknown level '{s}'"), "level")
        })?),
        None => None,
    };

    let rule = SigmaRule {
        title,
        logsource,
        detection,
        id: get_str(m, "id").map(|s| s.to_string()),
        status: get_str(m, "status").and_then(|s| s.parse().ok()),
        description: get_str(m, "description").map(|s| s.to_string()),
        author: get_str(m, "author").map(|s| s.to_string()),
        references: get_str_list(m, "references"),
        date: get_str(m, "date").map(|s| s.to_string()),
        fields: get_str_list(m, "fields"),
        falsepositives: get_str_list(m, "falsepositives"),
        level,
        tags: get_str_list(m, "tags"),
    };

    Ok(ParsedSigma { rule, warnings })
}

// =============================================================================
// Detection Section Parsing
// =============================================================================

/// Parse the `detection:` section of a rule.
///
/// The section contains the `condition` expression plus named selections;
/// every key that is not `condition` is a selection.
fn parse_detections(value: &Value) -> Result<Detections> {
    let m = value.as_mapping().ok_or_else(|| {
        SigmaParserError::invalid("detection section must be a mapping", "detection")
    })?;

    let condition_string = match m.get(val_key("condition")) {
        Some(Value::String(s)) => s.clone(),
        Some(_) => {
            return Err(SigmaParserError::invalid(
                "condition must be a string",
                "detection.condition",
            ));
        }
        None => {
            return Err(SigmaParserError::invalid(
                "missing required key 'condition'",
                "detection.condition",
            ));
        }
    };
    let condition = parse_condition(&condition_string)?;

    let mut named = std::collections::HashMap::new();
    let mut order = Vec::new();
    for (key, val) in m {
        let key_str = key.as_str().unwrap_or("");
        if key_str == "condition" {
            continue;
        }
        named.insert(key_str.to_string(), parse_detection(key_str, val)?);
        order.push(key_str.to_string());
    }

    if named.is_empty() {
        return Err(SigmaParserError::invalid(
            "detection must contain at least one selection",
            "detection",
        ));
    }

    // Every identifier in the condition must name an existing selection.
    check_identifiers(&condition, &named)?;

    Ok(Detections {
        named,
        order,
        condition,
        condition_string,
    })
}

fn check_identifiers(
    expr: &ConditionExpr,
    named: &std::collections::HashMap<String, Detection>,
) -> Result<()> {
    match expr {
        ConditionExpr::Identifier(name) => {
            if !named.contains_key(name) {
                return Err(SigmaParserError::UnresolvedSelection(name.clone()));
            }
            Ok(())
        }
        ConditionExpr::And(args) | ConditionExpr::Or(args) => {
            args.iter().try_for_each(|a| check_identifiers(a, named))
        }
        ConditionExpr::Not(inner) => check_identifiers(inner, named),
        // Selector patterns are checked at expansion time, where a pattern
        // matching zero selections is rejected.
        ConditionExpr::Selector { .. } => Ok(()),
    }
}

/// Parse a single named selection definition.
///
/// A selection can be:
/// 1. A mapping (key-value pairs, AND-linked)
/// 2. A list of plain values (keyword detection)
/// 3. A list of mappings (OR-linked sub-selections)
fn parse_detection(name: &str, value: &Value) -> Result<Detection> {
    match value {
        Value::Mapping(m) => {
            if m.is_empty() {
                return Err(SigmaParserError::invalid(
                    "selection must not be empty",
                    format!("detection.{name}"),
                ));
            }
            let items: Vec<DetectionItem> = m
                .iter()
                .map(|(k, v)| parse_detection_item(k.as_str().unwrap_or(""), v))
                .collect::<Result<Vec<_>>>()?;
            Ok(Detection::AllOf(items))
        }
        Value::Sequence(seq) => {
            if seq.is_empty() {
                return Err(SigmaParserError::invalid(
                    "selection must not be empty",
                    format!("detection.{name}"),
                ));
            }
            let all_plain = seq.iter().all(|v| !v.is_mapping() && !v.is_sequence());
            if all_plain {
                let values = seq.iter().map(SigmaValue::from_yaml).collect();
                Ok(Detection::Keywords(values))
            } else {
                let subs: Vec<Detection> = seq
                    .iter()
                    .map(|v| parse_detection(name, v))
                    .collect::<Result<Vec<_>>>()?;
                Ok(Detection::AnyOf(subs))
            }
        }
        Value::Null => Err(SigmaParserError::invalid(
            "selection must not be empty",
            format!("detection.{name}"),
        )),
        // Plain value -> single keyword
        _ => Ok(Detection::Keywords(vec![SigmaValue::from_yaml(value)])),
    }
}

/// Parse a single detection item from a key-value pair.
///
/// The key contains the field name and optional modifiers separated by `|`:
/// - `EventType` -> field="EventType", no modifiers
/// - `TargetObject|endswith` -> field="TargetObject", modifiers=[EndsWith]
fn parse_detection_item(key: &str, value: &Value) -> Result<DetectionItem> {
    let field = parse_field_spec(key)?;

    let values = match value {
        Value::Sequence(seq) => seq.iter().map(|v| to_sigma_value(v, &field)).collect(),
        _ => vec![to_sigma_value(value, &field)],
    };

    Ok(DetectionItem { field, values })
}

/// Convert a YAML value to a SigmaValue, respecting field modifiers.
///
/// When the `re` or `cidr` modifier is present, strings are raw: `*` and `?`
/// belong to the pattern, not to Sigma wildcard syntax.
fn to_sigma_value(v: &Value, field: &FieldSpec) -> SigmaValue {
    if (field.has_modifier(Modifier::Re) || field.has_modifier(Modifier::Cidr))
        && let Value::String(s) = v
    {
        return SigmaValue::from_raw_string(s);
    }
    SigmaValue::from_yaml(v)
}

/// Parse a field specification string like `"TargetObject|endswith"`.
///
/// The first `|`-segment is the field name (empty means keyword detection);
/// the remaining segments are modifiers, order preserved.
pub fn parse_field_spec(key: &str) -> Result<FieldSpec> {
    if key.is_empty() {
        return Ok(FieldSpec::new(None, Vec::new()));
    }

    let parts: Vec<&str> = key.split('|').collect();
    let field_name = parts[0];
    let field = if field_name.is_empty() {
        None
    } else {
        Some(field_name.to_string())
    };

    let mut modifiers = Vec::new();
    for &mod_str in &parts[1..] {
        let m = mod_str
            .parse::<Modifier>()
            .map_err(|_| SigmaParserError::UnknownModifier(mod_str.to_string()))?;
        modifiers.push(m);
    }

    Ok(FieldSpec::new(field, modifiers))
}

// =============================================================================
// Log Source Parsing
// =============================================================================

fn parse_logsource(value: &Value, warnings: &mut Vec<String>) -> Result<LogSource> {
    let m = value
        .as_mapping()
        .ok_or_else(|| SigmaParserError::invalid("logsource must be a mapping", "logsource"))?;

    let known = ["category", "product", "service", "definition"];
    for (k, _) in m {
        if let Some(key) = k.as_str()
            && !known.contains(&key)
        {
            warnings.push(format!("unknown logsource key '{key}'"));
        }
    }

    Ok(LogSource {
        category: get_str(m, "category").map(|s| s.to_string()),
        product: get_str(m, "product").map(|s| s.to_string()),
        service: get_str(m, "service").map(|s| s.to_string()),
        definition: get_str(m, "definition").map(|s| s.to_string()),
    })
}

// =============================================================================
// Mapping helpers
// =============================================================================

fn val_key(s: &str) -> Value {
    Value::String(s.to_string())
}

fn get_str<'a>(m: &'a serde_yaml::Mapping, key: &str) -> Option<&'a str> {
    m.get(val_key(key)).and_then(|v| v.as_str())
}

fn get_str_list(m: &serde_yaml::Mapping, key: &str) -> Vec<String> {
    match m.get(val_key(key)) {
        Some(Value::Sequence(seq)) => seq
            .iter()
            .filter_map(|v| v.as_str().map(|s| s.to_string()))
            .collect(),
        Some(Value::String(s)) => vec![s.clone()],
        _ => Vec::new(),
    }
}
