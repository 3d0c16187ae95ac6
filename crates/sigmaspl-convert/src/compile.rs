//! Condition compiler: lowers a parsed Sigma rule into the normalized
//! boolean [`QueryExpr`] tree, resolving fields and folding modifiers.
//!
//! Selector expressions (`1 of selection_*`, `all of them`) are expanded
//! against the named selections before lowering. Modifiers are folded left
//! to right over the value, producing a `(MatchOp, Literal)` pair; encoding
//! modifiers (`base64`, `base64offset`, `wide`, `utf16`) pre-compute the
//! encoded literal so the emitted SPL matches raw event data.

use base64::Engine as Base64Engine;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;

use sigmaspl_parser::{
    ConditionExpr, Detection, DetectionItem, Modifier, Quantifier, SelectorPattern, SigmaRule,
    SigmaValue,
};

use crate::error::{ConvertError, Result};
use crate::profile::ConversionProfile;
use crate::query::{CmpOp, Literal, Match, MatchOp, QueryExpr};
use crate::resolve::{Resolution, Resolver};

/// One resolved field occurrence inside the detection body.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldUse {
    /// Dotted path locating the field (e.g. `detection.selection.Image`).
    pub location: String,
    pub resolution: Resolution,
}

/// Output of lowering a rule: the query tree plus every field resolution
/// that fed it, in encounter order.
#[derive(Debug, Clone)]
pub struct CompiledRule {
    pub query: QueryExpr,
    pub field_uses: Vec<FieldUse>,
}

impl CompiledRule {
    /// Target field names with an exact or suggested resolution, in
    /// encounter order without duplicates.
    pub fn resolved_targets(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for fu in &self.field_uses {
            let t = &fu.resolution.target_field;
            if !out.contains(t) {
                out.push(t.clone());
            }
        }
        out
    }
}

/// Compile a Sigma rule against a profile into the boolean query AST.
pub fn compile_rule(rule: &SigmaRule, profile: &ConversionProfile) -> Result<CompiledRule> {
    let expanded = expand_selectors(&rule.detection.condition, rule)?;

    let mut ctx = LowerCtx {
        resolver: Resolver::new(profile, &rule.logsource),
        field_uses: Vec::new(),
    };
    let query = ctx.lower_expr(&expanded, rule)?;

    Ok(CompiledRule {
        query,
        field_uses: ctx.field_uses,
    })
}

// =============================================================================
// Selector expansion
// =============================================================================

/// Rewrite `1 of X` / `all of X` / `... of them` into plain OR/AND nodes
/// over the matching selection names, in document order.
fn expand_selectors(expr: &ConditionExpr, rule: &SigmaRule) -> Result<ConditionExpr> {
    match expr {
        ConditionExpr::And(args) => Ok(ConditionExpr::And(
            args.iter()
                .map(|a| expand_selectors(a, rule))
                .collect::<Result<Vec<_>>>()?,
        )),
        ConditionExpr::Or(args) => Ok(ConditionExpr::Or(
            args.iter()
                .map(|a| expand_selectors(a, rule))
                .collect::<Result<Vec<_>>>()?,
        )),
        ConditionExpr::Not(inner) => Ok(ConditionExpr::Not(Box::new(expand_selectors(
            inner, rule,
        )?))),
        ConditionExpr::Identifier(_) => Ok(expr.clone()),
        ConditionExpr::Selector {
            quantifier,
            pattern,
        } => {
            let names: Vec<&str> = rule
                .detection
                .names()
                .filter(|name| selector_matches(pattern, name))
                .collect();
            if names.is_empty() {
                let shown = match pattern {
                    SelectorPattern::Them => "them".to_string(),
                    SelectorPattern::Pattern(p) => p.clone(),
                };
                return Err(sigmaspl_parser::SigmaParserError::UnresolvedSelection(shown).into());
            }
            let idents: Vec<ConditionExpr> = names
                .iter()
                .map(|n| ConditionExpr::Identifier(n.to_string()))
                .collect();
            match quantifier {
                Quantifier::Any => Ok(one_or_many(idents, ConditionExpr::Or)),
                Quantifier::All => Ok(one_or_many(idents, ConditionExpr::And)),
                Quantifier::Count(n) => Err(ConvertError::invalid(
                    format!("'{n} of' has no faithful SPL rendering"),
                    "detection.condition",
                )),
            }
        }
    }
}

fn one_or_many(
    mut items: Vec<ConditionExpr>,
    ctor: fn(Vec<ConditionExpr>) -> ConditionExpr,
) -> ConditionExpr {
    if items.len() == 1 {
        items.pop().expect("len checked")
    } else {
        ctor(items)
    }
}

/// Selector pattern semantics: exact name, or prefix match when the pattern
/// ends in `*`. `them` matches every selection.
fn selector_matches(pattern: &SelectorPattern, name: &str) -> bool {
    match pattern {
        SelectorPattern::Them => true,
        SelectorPattern::Pattern(p) => {
            if let Some(prefix) = p.strip_suffix('*') {
                name.starts_with(prefix)
            } else {
                p == name
            }
        }
    }
}

// =============================================================================
// Lowering
// =============================================================================

struct LowerCtx<'a> {
    resolver: Resolver<'a>,
    field_uses: Vec<FieldUse>,
}

impl LowerCtx<'_> {
    fn lower_expr(&mut self, expr: &ConditionExpr, rule: &SigmaRule) -> Result<QueryExpr> {
        match expr {
            ConditionExpr::And(args) => {
                let terms = args
                    .iter()
                    .map(|a| self.lower_expr(a, rule))
                    .collect::<Result<Vec<_>>>()?;
                Ok(QueryExpr::and(terms))
            }
            ConditionExpr::Or(args) => {
                let terms = args
                    .iter()
                    .map(|a| self.lower_expr(a, rule))
                    .collect::<Result<Vec<_>>>()?;
                Ok(QueryExpr::or(terms))
            }
            ConditionExpr::Not(inner) => Ok(QueryExpr::not(self.lower_expr(inner, rule)?)),
            ConditionExpr::Identifier(name) => {
                let detection = rule.detection.named.get(name).ok_or_else(|| {
                    sigmaspl_parser::SigmaParserError::UnresolvedSelection(name.clone())
                })?;
                self.lower_detection(detection, &format!("detection.{name}"))
            }
            ConditionExpr::Selector { .. } => Err(ConvertError::Internal(
                "selector survived expansion".to_string(),
            )),
        }
    }

    fn lower_detection(&mut self, detection: &Detection, location: &str) -> Result<QueryExpr> {
        match detection {
            Detection::AllOf(items) => {
                let terms = items
                    .iter()
                    .map(|item| self.lower_item(item, location))
                    .collect::<Result<Vec<_>>>()?;
                Ok(QueryExpr::and(terms))
            }
            Detection::AnyOf(subs) => {
                let terms = subs
                    .iter()
                    .map(|sub| self.lower_detection(sub, location))
                    .collect::<Result<Vec<_>>>()?;
                Ok(QueryExpr::or(terms))
            }
            Detection::Keywords(values) => {
                let terms: Vec<QueryExpr> = values
                    .iter()
                    .map(|v| QueryExpr::Term(value_to_term(v)))
                    .collect();
                Ok(QueryExpr::or(terms))
            }
        }
    }

    fn lower_item(&mut self, item: &DetectionItem, sel_location: &str) -> Result<QueryExpr> {
        let Some(field_name) = item.field.name.as_deref() else {
            // Field-less item: keyword semantics, with string modifiers
            // folded into the term.
            let fold = ModifierFold::from_modifiers(&item.field.modifiers, sel_location)?;
            let terms: Vec<QueryExpr> = item
                .values
                .iter()
                .map(|v| QueryExpr::Term(fold.keyword_term(v)))
                .collect();
            return Ok(if fold.all {
                QueryExpr::and(terms)
            } else {
                QueryExpr::or(terms)
            });
        };

        let location = format!("{sel_location}.{field_name}");
        let resolution = self.resolver.resolve(field_name);
        if !self.field_uses.iter().any(|fu| fu.location == location) {
            self.field_uses.push(FieldUse {
                location: location.clone(),
                resolution: resolution.clone(),
            });
        }

        let fold = ModifierFold::from_modifiers(&item.field.modifiers, &location)?;
        let leaves = item
            .values
            .iter()
            .map(|v| fold.lower_value(&resolution, v, &location))
            .collect::<Result<Vec<_>>>()?;

        Ok(if fold.all {
            QueryExpr::and(leaves)
        } else {
            QueryExpr::or(leaves)
        })
    }
}

fn value_to_term(value: &SigmaValue) -> String {
    match value {
        SigmaValue::String(s) => s.to_wildcard_string(),
        other => other.to_string(),
    }
}

// =============================================================================
// Modifier folding
// =============================================================================

/// Encoding steps applied to the value bytes, in modifier order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EncStep {
    Wide,
    Base64,
    Base64Offset,
}

/// The deterministic fold of a modifier list into matching semantics.
struct ModifierFold {
    op: MatchOp,
    explicit_anchor: bool,
    cmp: Option<CmpOp>,
    regex: bool,
    cidr: bool,
    all: bool,
    cased: bool,
    encoding: Vec<EncStep>,
}

impl ModifierFold {
    fn from_modifiers(modifiers: &[Modifier], location: &str) -> Result<ModifierFold> {
        let mut fold = ModifierFold {
            op: MatchOp::Equals,
            explicit_anchor: false,
            cmp: None,
            regex: false,
            cidr: false,
            all: false,
            cased: false,
            encoding: Vec::new(),
        };

        for m in modifiers {
            match m {
                Modifier::Contains => {
                    fold.op = MatchOp::Contains;
                    fold.explicit_anchor = true;
                }
                Modifier::StartsWith => {
                    fold.op = MatchOp::StartsWith;
                    fold.explicit_anchor = true;
                }
                Modifier::EndsWith => {
                    fold.op = MatchOp::EndsWith;
                    fold.explicit_anchor = true;
                }
                Modifier::Re => fold.regex = true,
                Modifier::Cidr => fold.cidr = true,
                Modifier::All => fold.all = true,
                Modifier::Cased => fold.cased = true,
                Modifier::Wide | Modifier::Utf16 => fold.encoding.push(EncStep::Wide),
                Modifier::Base64 => fold.encoding.push(EncStep::Base64),
                Modifier::Base64Offset => fold.encoding.push(EncStep::Base64Offset),
                Modifier::Lt => fold.set_cmp(CmpOp::Lt, location)?,
                Modifier::Lte => fold.set_cmp(CmpOp::Lte, location)?,
                Modifier::Gt => fold.set_cmp(CmpOp::Gt, location)?,
                Modifier::Gte => fold.set_cmp(CmpOp::Gte, location)?,
            }
        }

        Ok(fold)
    }

    fn set_cmp(&mut self, op: CmpOp, location: &str) -> Result<()> {
        if self.cmp.is_some() {
            return Err(ConvertError::invalid(
                "multiple comparison modifiers on one field",
                location,
            ));
        }
        self.cmp = Some(op);
        Ok(())
    }

    /// Lower one value into a query leaf under this fold.
    fn lower_value(
        &self,
        resolution: &Resolution,
        value: &SigmaValue,
        location: &str,
    ) -> Result<QueryExpr> {
        let field = resolution.target_field.clone();

        // null matches field absence
        if value.is_null() {
            return Ok(QueryExpr::not(QueryExpr::Exists { field }));
        }

        if let Some(cmp) = self.cmp {
            let lit = numeric_literal(value)
                .ok_or_else(|| ConvertError::invalid("comparison needs a numeric value", location))?;
            return Ok(self.leaf(field, MatchOp::NumericCmp(cmp), lit));
        }

        if self.regex {
            let SigmaValue::String(s) = value else {
                return Err(ConvertError::invalid("regex needs a string value", location));
            };
            return Ok(self.leaf(field, MatchOp::Regex, Literal::Str(s.original.clone())));
        }

        if self.cidr {
            let SigmaValue::String(s) = value else {
                return Err(ConvertError::invalid("cidr needs a string value", location));
            };
            return Ok(self.leaf(field, MatchOp::CidrIn, Literal::Str(s.original.clone())));
        }

        match value {
            SigmaValue::Bool(b) => Ok(self.leaf(field, MatchOp::Equals, Literal::Bool(*b))),
            SigmaValue::Integer(n) if !self.explicit_anchor => {
                Ok(self.leaf(field, MatchOp::Equals, Literal::Int(*n)))
            }
            SigmaValue::Float(n) if !self.explicit_anchor => {
                Ok(self.leaf(field, MatchOp::Equals, Literal::Float(*n)))
            }
            _ => self.lower_string(resolution, &value_to_term(value), field),
        }
    }

    /// String path: profile transform, then the encoding chain, then the
    /// string-matching op.
    fn lower_string(
        &self,
        resolution: &Resolution,
        raw: &str,
        field: String,
    ) -> Result<QueryExpr> {
        let transformed = match resolution.transform {
            Some(t) => t.apply(raw),
            None => raw.to_string(),
        };

        if self.encoding.is_empty() {
            return Ok(self.leaf(field, self.op.clone(), Literal::Str(transformed)));
        }

        // Encoding chain over byte variants. base64offset fans out into the
        // three alignment variants; later steps apply to each. Whether the
        // final form is printable depends on the last step: base64 output is
        // ASCII, a trailing wide/utf16 step leaves raw UTF-16LE bytes that
        // render as lowercase hex.
        let mut binary = false;
        let mut variants: Vec<Vec<u8>> = vec![transformed.into_bytes()];
        for step in &self.encoding {
            match step {
                EncStep::Wide => {
                    binary = true;
                    variants = variants.iter().map(|v| to_utf16le_bytes(v)).collect();
                }
                EncStep::Base64 => {
                    binary = false;
                    variants = variants
                        .iter()
                        .map(|v| BASE64_STANDARD.encode(v).into_bytes())
                        .collect();
                }
                EncStep::Base64Offset => {
                    binary = false;
                    variants = variants
                        .iter()
                        .flat_map(|v| base64_offset_patterns(v))
                        .map(String::into_bytes)
                        .collect();
                }
            }
        }

        // base64offset fragments are unanchored by construction
        let op = if self.explicit_anchor {
            self.op.clone()
        } else if self.encoding.contains(&EncStep::Base64Offset) {
            MatchOp::Contains
        } else {
            self.op.clone()
        };

        let leaves: Vec<QueryExpr> = variants
            .into_iter()
            .map(|bytes| {
                let s = if binary {
                    hex_lower(&bytes)
                } else {
                    String::from_utf8(bytes).expect("base64 output is ASCII")
                };
                self.leaf(field.clone(), op.clone(), Literal::Str(s))
            })
            .collect();

        Ok(QueryExpr::or(leaves))
    }

    fn keyword_term(&self, value: &SigmaValue) -> String {
        let raw = value_to_term(value);
        match self.op {
            MatchOp::Contains => format!("*{raw}*"),
            MatchOp::StartsWith => format!("{raw}*"),
            MatchOp::EndsWith => format!("*{raw}"),
            _ => raw,
        }
    }

    fn leaf(&self, field: String, op: MatchOp, value: Literal) -> QueryExpr {
        QueryExpr::Match(Match {
            field,
            op,
            value,
            case_insensitive: !self.cased,
        })
    }
}

fn numeric_literal(value: &SigmaValue) -> Option<Literal> {
    match value {
        SigmaValue::Integer(n) => Some(Literal::Int(*n)),
        SigmaValue::Float(n) => Some(Literal::Float(*n)),
        SigmaValue::String(s) => {
            let plain = s.as_plain()?;
            if let Ok(n) = plain.parse::<i64>() {
                Some(Literal::Int(n))
            } else {
                plain.parse::<f64>().ok().map(Literal::Float)
            }
        }
        _ => None,
    }
}

// =============================================================================
// Encoding helpers
// =============================================================================

/// Convert bytes to UTF-16LE (wide string) representation.
fn to_utf16le_bytes(bytes: &[u8]) -> Vec<u8> {
    let s = String::from_utf8_lossy(bytes);
    let mut wide = Vec::with_capacity(s.len() * 2);
    for c in s.chars() {
        let mut buf = [0u16; 2];
        for u in c.encode_utf16(&mut buf) {
            wide.extend_from_slice(&u.to_le_bytes());
        }
    }
    wide
}

fn hex_lower(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// Generate base64 offset patterns for a byte sequence.
///
/// Produces up to 3 patterns for byte offsets 0, 1, and 2 within a base64
/// 3-byte alignment group. Each pattern is the stable middle portion of the
/// encoding that does not depend on alignment padding.
fn base64_offset_patterns(value: &[u8]) -> Vec<String> {
    let mut patterns = Vec::with_capacity(3);

    for offset in 0..3usize {
        let mut padded = vec![0u8; offset];
        padded.extend_from_slice(value);

        let encoded = BASE64_STANDARD.encode(&padded);

        // Skip leading chars influenced by the padding bytes
        let start = (offset * 4).div_ceil(3);
        let trimmed = encoded.trim_end_matches('=');
        let end = trimmed.len();

        if start < end {
            patterns.push(trimmed[start..end].to_string());
        }
    }

    patterns
}
