//! SPL emitter: renders the boolean query AST plus preamble and postamble
//! into Splunk search text.
//!
//! Output shape, one pipeline per line, `\n` endings:
//!
//! ```text
//! search index=<idx> sourcetype=<st> [earliest=-<range>] <inline predicate>
//! | regex field="..."            (pipe-only predicates, in tree order)
//! | where cidrmatch("...", f)
//! | stats count by <fields>
//! | `macro`                      (profile macro named after the category)
//! ### <health check name>: <query>
//! ```
//!
//! Quoting is bit-exact: `\` escapes to `\\` and `"` to `\"` inside quoted
//! literals; identical inputs produce identical text.

use sigmaspl_parser::{LogSource, SigmaRule};

use crate::compile::CompiledRule;
use crate::health::HealthCheck;
use crate::logsource;
use crate::profile::ConversionProfile;
use crate::query::{Literal, Match, MatchOp, QueryExpr};
use crate::resolve::{MappingStatus, Resolver};

/// Caller overrides for the emitted preamble.
#[derive(Debug, Clone, Default)]
pub struct EmitOptions {
    pub index_override: Option<String>,
    pub sourcetype_override: Option<String>,
    /// Relative time range like `24h`; rendered as `earliest=-24h`.
    pub time_range: Option<String>,
}

/// The `index=... sourcetype=...` part shared by the main query and the
/// health checks.
pub fn base_search(
    logsource: &LogSource,
    profile: &ConversionProfile,
    opts: &EmitOptions,
) -> String {
    let defaults = logsource::defaults_for(logsource);

    let index = opts
        .index_override
        .clone()
        .or_else(|| profile.default_index.clone())
        .unwrap_or_else(|| defaults.index.to_string());
    let sourcetype = opts
        .sourcetype_override
        .clone()
        .or_else(|| profile.default_sourcetype.clone())
        .unwrap_or_else(|| defaults.sourcetype.to_string());

    format!(
        "index={} sourcetype={}",
        quote_if_needed(&index),
        quote_if_needed(&sourcetype)
    )
}

/// Render the full SPL text for a compiled rule.
pub fn emit(
    compiled: &CompiledRule,
    rule: &SigmaRule,
    profile: &ConversionProfile,
    opts: &EmitOptions,
    health_checks: &[HealthCheck],
) -> String {
    let mut first_line = format!("search {}", base_search(&rule.logsource, profile, opts));
    if let Some(range) = &opts.time_range {
        first_line.push_str(&format!(" earliest=-{range}"));
    }

    // Partition the top-level conjunction into inline search terms and
    // pipe-only predicates.
    let conjuncts: Vec<&QueryExpr> = match &compiled.query {
        QueryExpr::And(terms) => terms.iter().collect(),
        other => vec![other],
    };

    let mut pipes: Vec<String> = Vec::new();
    for term in conjuncts {
        if is_inline(term) {
            first_line.push(' ');
            first_line.push_str(&render_inline(term, true));
        } else {
            pipes.push(render_pipe(term));
        }
    }

    let mut lines = vec![first_line];
    lines.extend(pipes);
    lines.push(render_stats(compiled, rule, profile));

    if let Some(category) = rule.logsource.category.as_deref()
        && profile.macros.contains_key(category)
    {
        lines.push(format!("| `{category}`"));
    }

    for check in health_checks {
        lines.push(format!("### {}: {}", check.name, check.query));
    }

    lines.join("\n")
}

// =============================================================================
// Predicate rendering
// =============================================================================

/// Whether a subtree renders entirely in search syntax (no pipe commands).
fn is_inline(expr: &QueryExpr) -> bool {
    match expr {
        QueryExpr::And(args) | QueryExpr::Or(args) => args.iter().all(is_inline),
        QueryExpr::Not(inner) => is_inline(inner),
        QueryExpr::Match(m) => !matches!(
            m.op,
            MatchOp::Regex | MatchOp::CidrIn | MatchOp::NumericCmp(_)
        ),
        QueryExpr::Exists { .. } | QueryExpr::Term(_) => true,
    }
}

/// Render an inline-able subtree in SPL search syntax. At the top level,
/// AND is implicit (space-separated); nested AND is parenthesized.
fn render_inline(expr: &QueryExpr, top: bool) -> String {
    match expr {
        QueryExpr::And(args) => {
            let parts: Vec<String> = args.iter().map(|a| render_inline(a, false)).collect();
            if top {
                parts.join(" ")
            } else {
                format!("({})", parts.join(" AND "))
            }
        }
        QueryExpr::Or(args) => {
            let parts: Vec<String> = args.iter().map(|a| render_inline(a, false)).collect();
            format!("({})", parts.join(" OR "))
        }
        QueryExpr::Not(inner) => format!("NOT ({})", render_inline(inner, false)),
        QueryExpr::Match(m) => render_match(m),
        QueryExpr::Exists { field } => format!("{field}=*"),
        QueryExpr::Term(value) => format!("\"{}\"", escape(value)),
    }
}

fn render_match(m: &Match) -> String {
    let field = &m.field;
    match (&m.op, &m.value) {
        (MatchOp::Equals | MatchOp::In, Literal::List(items)) => {
            let parts: Vec<String> = items
                .iter()
                .map(|item| match item {
                    Literal::Str(s) => format!("{field}=\"{}\"", escape(s)),
                    other => format!("{field}={other}"),
                })
                .collect();
            format!("({})", parts.join(" OR "))
        }
        (MatchOp::Equals | MatchOp::In, Literal::Str(v)) => format!("{field}=\"{}\"", escape(v)),
        (MatchOp::Equals | MatchOp::In, Literal::Int(n)) => format!("{field}={n}"),
        (MatchOp::Equals | MatchOp::In, Literal::Float(n)) => format!("{field}={n}"),
        (MatchOp::Equals | MatchOp::In, Literal::Bool(b)) => format!("{field}={b}"),
        (MatchOp::Equals | MatchOp::In, Literal::Null) => format!("NOT {field}=*"),
        (MatchOp::Contains, v) => format!("{field}=\"*{}*\"", escape(&lit_str(v))),
        (MatchOp::StartsWith, v) => format!("{field}=\"{}*\"", escape(&lit_str(v))),
        (MatchOp::EndsWith, v) => format!("{field}=\"*{}\"", escape(&lit_str(v))),
        // Guarded by is_inline: pipe-only ops never reach this renderer.
        (MatchOp::Regex | MatchOp::CidrIn | MatchOp::NumericCmp(_), _) => {
            unreachable!("pipe-only operation in inline renderer")
        }
    }
}

/// Render a pipe-only predicate as its own pipeline stage.
fn render_pipe(expr: &QueryExpr) -> String {
    match expr {
        QueryExpr::Match(m) => match (&m.op, &m.value) {
            (MatchOp::Regex, v) => format!("| regex {}=\"{}\"", m.field, escape(&lit_str(v))),
            (MatchOp::CidrIn, v) => {
                format!("| where cidrmatch(\"{}\", {})", escape(&lit_str(v)), m.field)
            }
            (MatchOp::NumericCmp(op), v) => {
                format!("| where {} {} {}", m.field, op.as_spl(), v)
            }
            _ => format!("| where {}", render_where(expr)),
        },
        _ => format!("| where {}", render_where(expr)),
    }
}

/// Functional rendering used when pipe-only operations sit under boolean
/// structure: everything becomes an eval expression inside one `| where`.
fn render_where(expr: &QueryExpr) -> String {
    match expr {
        QueryExpr::And(args) => {
            let parts: Vec<String> = args.iter().map(render_where).collect();
            format!("({})", parts.join(" AND "))
        }
        QueryExpr::Or(args) => {
            let parts: Vec<String> = args.iter().map(render_where).collect();
            format!("({})", parts.join(" OR "))
        }
        QueryExpr::Not(inner) => format!("NOT ({})", render_where(inner)),
        QueryExpr::Exists { field } => format!("isnotnull({field})"),
        QueryExpr::Term(value) => format!("match(_raw, \"{}\")", escape(value)),
        QueryExpr::Match(m) => {
            let field = &m.field;
            match (&m.op, &m.value) {
                (MatchOp::Equals, Literal::Str(v)) => format!("{field}=\"{}\"", escape(v)),
                (MatchOp::Equals, other) => format!("{field}={other}"),
                (MatchOp::Contains, v) => format!("like({field}, \"%{}%\")", escape(&lit_str(v))),
                (MatchOp::StartsWith, v) => format!("like({field}, \"{}%\")", escape(&lit_str(v))),
                (MatchOp::EndsWith, v) => format!("like({field}, \"%{}\")", escape(&lit_str(v))),
                (MatchOp::Regex, v) => format!("match({field}, \"{}\")", escape(&lit_str(v))),
                (MatchOp::CidrIn, v) => {
                    format!("cidrmatch(\"{}\", {field})", escape(&lit_str(v)))
                }
                (MatchOp::NumericCmp(op), v) => format!("{field} {} {v}", op.as_spl()),
                (MatchOp::In, Literal::List(items)) => {
                    let parts: Vec<String> = items
                        .iter()
                        .map(|item| match item {
                            Literal::Str(s) => format!("{field}=\"{}\"", escape(s)),
                            other => format!("{field}={other}"),
                        })
                        .collect();
                    format!("({})", parts.join(" OR "))
                }
                (MatchOp::In, v) => format!("{field}={v}"),
            }
        }
    }
}

// =============================================================================
// Postamble
// =============================================================================

const DEFAULT_STATS_FIELDS: &[&str] = &["_time", "host", "user", "process", "CommandLine"];

fn render_stats(compiled: &CompiledRule, rule: &SigmaRule, profile: &ConversionProfile) -> String {
    let fields: Vec<String> = if rule.fields.is_empty() {
        let resolved: Vec<&str> = compiled
            .field_uses
            .iter()
            .filter(|fu| fu.resolution.status != MappingStatus::Missing)
            .map(|fu| fu.resolution.target_field.as_str())
            .collect();
        DEFAULT_STATS_FIELDS
            .iter()
            .filter(|f| resolved.contains(*f))
            .map(|f| f.to_string())
            .collect()
    } else {
        // Explicit output fields: run them through the same resolution chain.
        let mut resolver = Resolver::new(profile, &rule.logsource);
        let mut out = Vec::new();
        for f in &rule.fields {
            let target = resolver.resolve(f).target_field;
            if !out.contains(&target) {
                out.push(target);
            }
        }
        out
    };

    if fields.is_empty() {
        "| stats count".to_string()
    } else {
        format!("| stats count by {}", fields.join(", "))
    }
}

// =============================================================================
// Quoting
// =============================================================================

/// Escape a string for inclusion in a double-quoted SPL literal.
pub fn escape(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

fn lit_str(value: &Literal) -> String {
    match value {
        Literal::Str(s) => s.clone(),
        other => other.to_string(),
    }
}

fn quote_if_needed(value: &str) -> String {
    if value.contains(' ') || value.contains('"') {
        format!("\"{}\"", escape(value))
    } else {
        value.to_string()
    }
}
