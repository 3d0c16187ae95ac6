//! Reverse recognizer: a restricted subset of SPL back into the query AST
//! and from there into a Sigma YAML rule.
//!
//! Supported grammar:
//!
//! - optional `search` keyword and preamble terms (`index=`, `sourcetype=`,
//!   `earliest=`, `latest=`), captured as logsource hints
//! - conjunctive/disjunctive predicates with parentheses, `NOT`, `AND`,
//!   `OR`, and implicit AND between adjacent terms
//! - field comparisons in the shapes the emitter produces (`f="v"`,
//!   `f="*v*"`, `f="v*"`, `f="*v"`, `f=5`, `f=*`, `f!="v"`) plus bare
//!   quoted keyword terms
//! - `| regex f="pattern"`, `| where cidrmatch("cidr", f)`,
//!   `| where f <op> n`, `| where isnotnull(f)`, `| stats count by f, ...`
//!
//! Unsupported pipe commands are skipped with a note (never silently);
//! a malformed search predicate is a hard `UnsupportedSpl` error.

use serde_yaml::{Mapping, Value as Yaml};

use sigmaspl_parser::{Level, Status};

use crate::cim;
use crate::error::{ConvertError, Result};
use crate::profile::ConversionProfile;
use crate::query::{CmpOp, Literal, Match, MatchOp, QueryExpr};

// =============================================================================
// Public API
// =============================================================================

/// Metadata defaults for the generated rule.
#[derive(Debug, Clone)]
pub struct ReverseOptions {
    pub title: String,
    pub level: Level,
    pub status: Status,
    pub author: Option<String>,
    pub description: Option<String>,
}

impl Default for ReverseOptions {
    fn default() -> Self {
        ReverseOptions {
            title: "Custom Detection Rule".to_string(),
            level: Level::Medium,
            status: Status::Experimental,
            author: None,
            description: None,
        }
    }
}

/// The machine-readable outcome of recognizing an SPL query.
#[derive(Debug, Clone)]
pub struct Recognized {
    pub query: Option<QueryExpr>,
    pub index: Option<String>,
    pub sourcetype: Option<String>,
    pub earliest: Option<String>,
    pub stats_fields: Vec<String>,
    /// Fragments that were skipped or degraded, one note each.
    pub notes: Vec<String>,
}

/// A complete reverse translation.
#[derive(Debug, Clone)]
pub struct ReverseResult {
    pub sigma_yaml: String,
    pub query: Option<QueryExpr>,
    pub correlation_notes: Option<String>,
    pub index: Option<String>,
    pub sourcetype: Option<String>,
    pub stats_fields: Vec<String>,
}

/// Parse a restricted SPL query into the query AST plus captured hints.
pub fn recognize(spl: &str) -> Result<Recognized> {
    // Comment lines (the emitter's health checks) are not part of the query.
    let cleaned: String = spl
        .lines()
        .filter(|l| !l.trim_start().starts_with("###"))
        .collect::<Vec<_>>()
        .join("\n");

    let mut out = Recognized {
        query: None,
        index: None,
        sourcetype: None,
        earliest: None,
        stats_fields: Vec::new(),
        notes: Vec::new(),
    };

    let segments = split_pipeline(&cleaned);
    let mut conjuncts: Vec<QueryExpr> = Vec::new();

    for (i, (offset, text)) in segments.iter().enumerate() {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            continue;
        }
        if i == 0 {
            if let Some(expr) = parse_search_segment(trimmed, *offset, &mut out)? {
                conjuncts.push(expr);
            }
        } else {
            parse_pipe_segment(trimmed, *offset, &mut out, &mut conjuncts)?;
        }
    }

    out.query = match conjuncts.len() {
        0 => None,
        1 => Some(conjuncts.into_iter().next().expect("len checked")),
        _ => Some(QueryExpr::And(conjuncts)),
    };
    Ok(out)
}

/// Full reverse translation: SPL -> Sigma YAML.
pub fn reverse_spl(
    spl: &str,
    profile: &ConversionProfile,
    opts: &ReverseOptions,
) -> Result<ReverseResult> {
    let mut recognized = recognize(spl)?;
    let yaml = render_sigma(&mut recognized, profile, opts);
    let correlation_notes = if recognized.notes.is_empty() {
        None
    } else {
        Some(recognized.notes.join("\n"))
    };
    Ok(ReverseResult {
        sigma_yaml: yaml,
        query: recognized.query,
        correlation_notes,
        index: recognized.index,
        sourcetype: recognized.sourcetype,
        stats_fields: recognized.stats_fields,
    })
}

// =============================================================================
// Pipeline splitting and lexing
// =============================================================================

/// Split on top-level `|`, respecting double-quoted strings. Returns
/// `(byte offset, segment text)` pairs.
fn split_pipeline(input: &str) -> Vec<(usize, String)> {
    let mut segments = Vec::new();
    let mut start = 0usize;
    let mut in_quote = false;
    let mut escaped = false;

    for (i, c) in input.char_indices() {
        if in_quote {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_quote = false;
            }
            continue;
        }
        match c {
            '"' => in_quote = true,
            '|' => {
                segments.push((start, input[start..i].to_string()));
                start = i + 1;
            }
            _ => {}
        }
    }
    segments.push((start, input[start..].to_string()));
    segments
}

#[derive(Debug, Clone, PartialEq)]
enum Tok {
    Word(String),
    Quoted(String),
    Eq,
    Neq,
    Cmp(CmpOp),
    LParen,
    RParen,
    Comma,
}

#[derive(Debug, Clone)]
struct Spanned {
    tok: Tok,
    offset: usize,
}

const WORD_BREAK: &[char] = &[
    ' ', '\t', '\n', '\r', '"', '\'', '(', ')', '=', '!', '<', '>', ',',
];

fn tokenize(text: &str, base: usize) -> Result<Vec<Spanned>> {
    let bytes: Vec<char> = text.chars().collect();
    let mut toks = Vec::new();
    let mut i = 0usize;

    while i < bytes.len() {
        let c = bytes[i];
        let offset = base + i;
        match c {
            ' ' | '\t' | '\n' | '\r' => {
                i += 1;
            }
            '(' => {
                toks.push(Spanned { tok: Tok::LParen, offset });
                i += 1;
            }
            ')' => {
                toks.push(Spanned { tok: Tok::RParen, offset });
                i += 1;
            }
            ',' => {
                toks.push(Spanned { tok: Tok::Comma, offset });
                i += 1;
            }
            '=' => {
                toks.push(Spanned { tok: Tok::Eq, offset });
                i += 1;
            }
            '!' => {
                if bytes.get(i + 1) == Some(&'=') {
                    toks.push(Spanned { tok: Tok::Neq, offset });
                    i += 2;
                } else {
                    return Err(ConvertError::unsupported("!", offset));
                }
            }
            '<' => {
                if bytes.get(i + 1) == Some(&'=') {
                    toks.push(Spanned { tok: Tok::Cmp(CmpOp::Lte), offset });
                    i += 2;
                } else {
                    toks.push(Spanned { tok: Tok::Cmp(CmpOp::Lt), offset });
                    i += 1;
                }
            }
            '>' => {
                if bytes.get(i + 1) == Some(&'=') {
                    toks.push(Spanned { tok: Tok::Cmp(CmpOp::Gte), offset });
                    i += 2;
                } else {
                    toks.push(Spanned { tok: Tok::Cmp(CmpOp::Gt), offset });
                    i += 1;
                }
            }
            '"' | '\'' => {
                let quote = c;
                let mut value = String::new();
                let mut j = i + 1;
                let mut closed = false;
                while j < bytes.len() {
                    let d = bytes[j];
                    if d == '\\' && j + 1 < bytes.len() {
                        let next = bytes[j + 1];
                        if next == quote || next == '\\' {
                            value.push(next);
                            j += 2;
                            continue;
                        }
                        value.push(d);
                        j += 1;
                        continue;
                    }
                    if d == quote {
                        closed = true;
                        break;
                    }
                    value.push(d);
                    j += 1;
                }
                if !closed {
                    return Err(ConvertError::unsupported("unterminated string", offset));
                }
                toks.push(Spanned { tok: Tok::Quoted(value), offset });
                i = j + 1;
            }
            _ => {
                let mut value = String::new();
                let mut j = i;
                while j < bytes.len() && !WORD_BREAK.contains(&bytes[j]) {
                    value.push(bytes[j]);
                    j += 1;
                }
                toks.push(Spanned { tok: Tok::Word(value), offset });
                i = j;
            }
        }
    }
    Ok(toks)
}

// =============================================================================
// Search segment parser
// =============================================================================

struct Parser<'a> {
    toks: &'a [Spanned],
    pos: usize,
    end_offset: usize,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&'a Tok> {
        self.toks.get(self.pos).map(|s| &s.tok)
    }

    fn offset(&self) -> usize {
        self.toks
            .get(self.pos)
            .map(|s| s.offset)
            .unwrap_or(self.end_offset)
    }

    fn bump(&mut self) -> Option<&'a Tok> {
        let t = self.toks.get(self.pos).map(|s| &s.tok);
        self.pos += 1;
        t
    }

    fn is_keyword(&self, word: &str) -> bool {
        matches!(self.peek(), Some(Tok::Word(w)) if w.eq_ignore_ascii_case(word))
    }
}

fn parse_search_segment(
    text: &str,
    base: usize,
    out: &mut Recognized,
) -> Result<Option<QueryExpr>> {
    let toks = tokenize(text, base)?;
    let mut parser = Parser {
        toks: &toks,
        pos: 0,
        end_offset: base + text.len(),
    };

    if parser.is_keyword("search") {
        parser.bump();
    }
    if parser.peek().is_none() {
        return Ok(None);
    }

    let expr = parse_or(&mut parser, out)?;
    if parser.peek().is_some() {
        return Err(ConvertError::unsupported(
            describe_tok(parser.peek().expect("peeked")),
            parser.offset(),
        ));
    }
    Ok(expr)
}

fn parse_or(parser: &mut Parser<'_>, out: &mut Recognized) -> Result<Option<QueryExpr>> {
    let mut branches = Vec::new();
    if let Some(first) = parse_and(parser, out)? {
        branches.push(first);
    }
    while parser.is_keyword("or") {
        parser.bump();
        if let Some(next) = parse_and(parser, out)? {
            branches.push(next);
        }
    }
    Ok(match branches.len() {
        0 => None,
        1 => Some(branches.into_iter().next().expect("len checked")),
        _ => Some(QueryExpr::Or(branches)),
    })
}

fn parse_and(parser: &mut Parser<'_>, out: &mut Recognized) -> Result<Option<QueryExpr>> {
    let mut terms = Vec::new();
    loop {
        // explicit AND keyword is optional between terms
        if parser.is_keyword("and") {
            parser.bump();
            continue;
        }
        if parser.is_keyword("or") || matches!(parser.peek(), Some(Tok::RParen) | None) {
            break;
        }
        if let Some(term) = parse_unary(parser, out)? {
            terms.push(term);
        }
    }
    Ok(match terms.len() {
        0 => None,
        1 => Some(terms.into_iter().next().expect("len checked")),
        _ => Some(QueryExpr::And(terms)),
    })
}

fn parse_unary(parser: &mut Parser<'_>, out: &mut Recognized) -> Result<Option<QueryExpr>> {
    if parser.is_keyword("not") {
        parser.bump();
        return Ok(parse_unary(parser, out)?.map(QueryExpr::not));
    }
    parse_atom(parser, out)
}

fn parse_atom(parser: &mut Parser<'_>, out: &mut Recognized) -> Result<Option<QueryExpr>> {
    let offset = parser.offset();
    match parser.bump() {
        Some(Tok::LParen) => {
            let inner = parse_or(parser, out)?;
            match parser.bump() {
                Some(Tok::RParen) => Ok(inner),
                _ => Err(ConvertError::unsupported("unclosed group", offset)),
            }
        }
        Some(Tok::Quoted(v)) => Ok(Some(QueryExpr::Term(v.clone()))),
        Some(Tok::Word(w)) => match parser.peek() {
            Some(Tok::Eq) => {
                parser.bump();
                let value = parse_value(parser, offset)?;
                Ok(capture_or_match(w, value, false, out))
            }
            Some(Tok::Neq) => {
                parser.bump();
                let value = parse_value(parser, offset)?;
                Ok(capture_or_match(w, value, true, out))
            }
            _ => Ok(Some(QueryExpr::Term(w.clone()))),
        },
        Some(other) => Err(ConvertError::unsupported(describe_tok(other), offset)),
        None => Err(ConvertError::unsupported("unexpected end of query", offset)),
    }
}

enum RawValue {
    Quoted(String),
    Bare(String),
}

fn parse_value(parser: &mut Parser<'_>, offset: usize) -> Result<RawValue> {
    match parser.bump() {
        Some(Tok::Quoted(v)) => Ok(RawValue::Quoted(v.clone())),
        Some(Tok::Word(w)) => Ok(RawValue::Bare(w.clone())),
        _ => Err(ConvertError::unsupported("missing comparison value", offset)),
    }
}

/// Build a match leaf for `field=value`, or capture preamble terms
/// (`index`, `sourcetype`, `earliest`, `latest`) into the recognizer output.
fn capture_or_match(
    field: &str,
    value: RawValue,
    negated: bool,
    out: &mut Recognized,
) -> Option<QueryExpr> {
    let raw = match &value {
        RawValue::Quoted(v) | RawValue::Bare(v) => v.clone(),
    };

    if !negated {
        if field.eq_ignore_ascii_case("index") {
            out.index = Some(raw);
            return None;
        }
        if field.eq_ignore_ascii_case("sourcetype") {
            out.sourcetype = Some(raw);
            return None;
        }
        if field.eq_ignore_ascii_case("earliest") {
            out.earliest = Some(raw);
            return None;
        }
        if field.eq_ignore_ascii_case("latest") {
            return None;
        }
    }

    let expr = match value {
        RawValue::Bare(v) => classify_bare(field, &v),
        RawValue::Quoted(v) => classify_string(field, &v),
    };
    Some(if negated { QueryExpr::not(expr) } else { expr })
}

fn classify_bare(field: &str, value: &str) -> QueryExpr {
    if value == "*" {
        return QueryExpr::Exists {
            field: field.to_string(),
        };
    }
    if let Ok(n) = value.parse::<i64>() {
        return QueryExpr::Match(Match::new(field, MatchOp::Equals, Literal::Int(n)));
    }
    if let Ok(n) = value.parse::<f64>() {
        return QueryExpr::Match(Match::new(field, MatchOp::Equals, Literal::Float(n)));
    }
    if value == "true" || value == "false" {
        return QueryExpr::Match(Match::new(
            field,
            MatchOp::Equals,
            Literal::Bool(value == "true"),
        ));
    }
    classify_string(field, value)
}

/// Wildcard placement determines the match op, mirroring the emitter:
/// `*v*` is contains, `v*` starts-with, `*v` ends-with.
fn classify_string(field: &str, value: &str) -> QueryExpr {
    if value == "*" {
        return QueryExpr::Exists {
            field: field.to_string(),
        };
    }
    let starts = value.starts_with('*');
    let ends = value.ends_with('*');
    let (op, inner) = if starts && ends && value.len() > 1 {
        (MatchOp::Contains, &value[1..value.len() - 1])
    } else if ends {
        (MatchOp::StartsWith, &value[..value.len() - 1])
    } else if starts {
        (MatchOp::EndsWith, &value[1..])
    } else {
        (MatchOp::Equals, value)
    };
    QueryExpr::Match(Match::new(field, op, Literal::Str(inner.to_string())))
}

// =============================================================================
// Pipe segment parsing
// =============================================================================

fn parse_pipe_segment(
    text: &str,
    base: usize,
    out: &mut Recognized,
    conjuncts: &mut Vec<QueryExpr>,
) -> Result<()> {
    let command = text.split_whitespace().next().unwrap_or("").to_lowercase();
    match command.as_str() {
        "regex" => {
            let toks = tokenize(text, base)?;
            // regex FIELD="pattern" | regex FIELD!="pattern"
            match toks.as_slice() {
                [Spanned { tok: Tok::Word(cmd), .. }, Spanned { tok: Tok::Word(field), .. }, Spanned { tok: Tok::Eq, .. }, Spanned { tok: Tok::Quoted(pat), .. }]
                    if cmd.eq_ignore_ascii_case("regex") =>
                {
                    conjuncts.push(QueryExpr::Match(Match::new(
                        field,
                        MatchOp::Regex,
                        Literal::Str(pat.clone()),
                    )));
                }
                [Spanned { tok: Tok::Word(cmd), .. }, Spanned { tok: Tok::Word(field), .. }, Spanned { tok: Tok::Neq, .. }, Spanned { tok: Tok::Quoted(pat), .. }]
                    if cmd.eq_ignore_ascii_case("regex") =>
                {
                    conjuncts.push(QueryExpr::not(QueryExpr::Match(Match::new(
                        field,
                        MatchOp::Regex,
                        Literal::Str(pat.clone()),
                    ))));
                }
                _ => out
                    .notes
                    .push(format!("skipped unsupported regex form: '{}'", text.trim())),
            }
        }
        "where" => parse_where_segment(text, base, out, conjuncts)?,
        "stats" => parse_stats_segment(text, base, out)?,
        "join" => out.notes.push(
            "join command: correlation logic cannot be represented in a single rule".to_string(),
        ),
        "transaction" => out
            .notes
            .push("transaction command: multi-event correlation skipped".to_string()),
        "lookup" => out
            .notes
            .push("lookup command: external data reference skipped".to_string()),
        _ => out.notes.push(format!(
            "skipped unsupported SPL fragment at offset {base}: '{}'",
            text.trim()
        )),
    }
    Ok(())
}

fn parse_where_segment(
    text: &str,
    base: usize,
    out: &mut Recognized,
    conjuncts: &mut Vec<QueryExpr>,
) -> Result<()> {
    let toks = tokenize(text, base)?;
    match toks.as_slice() {
        // where isnotnull(field)
        [Spanned { tok: Tok::Word(cmd), .. }, Spanned { tok: Tok::Word(func), .. }, Spanned { tok: Tok::LParen, .. }, Spanned { tok: Tok::Word(field), .. }, Spanned { tok: Tok::RParen, .. }]
            if cmd.eq_ignore_ascii_case("where") && func.eq_ignore_ascii_case("isnotnull") =>
        {
            conjuncts.push(QueryExpr::Exists {
                field: field.clone(),
            });
        }
        // where isnull(field)
        [Spanned { tok: Tok::Word(cmd), .. }, Spanned { tok: Tok::Word(func), .. }, Spanned { tok: Tok::LParen, .. }, Spanned { tok: Tok::Word(field), .. }, Spanned { tok: Tok::RParen, .. }]
            if cmd.eq_ignore_ascii_case("where") && func.eq_ignore_ascii_case("isnull") =>
        {
            conjuncts.push(QueryExpr::not(QueryExpr::Exists {
                field: field.clone(),
            }));
        }
        // where cidrmatch("cidr", field)
        [Spanned { tok: Tok::Word(cmd), .. }, Spanned { tok: Tok::Word(func), .. }, Spanned { tok: Tok::LParen, .. }, Spanned { tok: Tok::Quoted(cidr), .. }, Spanned { tok: Tok::Comma, .. }, Spanned { tok: Tok::Word(field), .. }, Spanned { tok: Tok::RParen, .. }]
            if cmd.eq_ignore_ascii_case("where") && func.eq_ignore_ascii_case("cidrmatch") =>
        {
            conjuncts.push(QueryExpr::Match(Match::new(
                field,
                MatchOp::CidrIn,
                Literal::Str(cidr.clone()),
            )));
        }
        // where field <op> number
        [Spanned { tok: Tok::Word(cmd), .. }, Spanned { tok: Tok::Word(field), .. }, Spanned { tok: Tok::Cmp(op), .. }, Spanned { tok: Tok::Word(num), .. }]
            if cmd.eq_ignore_ascii_case("where") =>
        {
            let value = if let Ok(n) = num.parse::<i64>() {
                Literal::Int(n)
            } else if let Ok(n) = num.parse::<f64>() {
                Literal::Float(n)
            } else {
                out.notes
                    .push(format!("skipped non-numeric comparison: '{}'", text.trim()));
                return Ok(());
            };
            conjuncts.push(QueryExpr::Match(Match::new(
                field,
                MatchOp::NumericCmp(*op),
                value,
            )));
        }
        _ => out.notes.push(format!(
            "skipped unsupported where clause: '{}'",
            text.trim()
        )),
    }
    Ok(())
}

fn parse_stats_segment(text: &str, base: usize, out: &mut Recognized) -> Result<()> {
    let toks = tokenize(text, base)?;
    let words: Vec<&str> = toks
        .iter()
        .filter_map(|s| match &s.tok {
            Tok::Word(w) => Some(w.as_str()),
            _ => None,
        })
        .collect();

    // words[0] == "stats"; anything fancier than count is noted
    if words.get(1).is_some_and(|w| !w.eq_ignore_ascii_case("count")) {
        out.notes
            .push("stats aggregation converted to basic detection".to_string());
    }

    if let Some(by_pos) = words.iter().position(|w| w.eq_ignore_ascii_case("by")) {
        for field in &words[by_pos + 1..] {
            out.stats_fields.push((*field).to_string());
        }
    }
    Ok(())
}

fn describe_tok(tok: &Tok) -> String {
    match tok {
        Tok::Word(w) => w.clone(),
        Tok::Quoted(q) => format!("\"{q}\""),
        Tok::Eq => "=".to_string(),
        Tok::Neq => "!=".to_string(),
        Tok::Cmp(op) => op.as_spl().to_string(),
        Tok::LParen => "(".to_string(),
        Tok::RParen => ")".to_string(),
        Tok::Comma => ",".to_string(),
    }
}

// =============================================================================
// Sigma rendering
// =============================================================================

/// Render a recognized query as Sigma YAML, reversing field names through
/// the profile's mappings.
fn render_sigma(
    recognized: &mut Recognized,
    profile: &ConversionProfile,
    opts: &ReverseOptions,
) -> String {
    let mut doc = Mapping::new();
    doc.insert("title".into(), opts.title.clone().into());
    doc.insert("status".into(), opts.status.to_string().into());
    doc.insert(
        "description".into(),
        opts.description
            .clone()
            .unwrap_or_else(|| "Auto-generated from SPL query".to_string())
            .into(),
    );
    if let Some(author) = &opts.author {
        doc.insert("author".into(), author.clone().into());
    }

    let logsource = infer_logsource(recognized);
    doc.insert("logsource".into(), Yaml::Mapping(logsource));

    let detection = build_detection(recognized, profile);
    doc.insert("detection".into(), Yaml::Mapping(detection));

    if !recognized.stats_fields.is_empty() {
        let fields: Vec<Yaml> = recognized
            .stats_fields
            .iter()
            .map(|f| Yaml::String(reverse_field(f, profile, &mut Vec::new())))
            .collect();
        doc.insert("fields".into(), Yaml::Sequence(fields));
    }

    doc.insert("level".into(), opts.level.to_string().into());

    serde_yaml::to_string(&Yaml::Mapping(doc)).unwrap_or_default()
}

fn infer_logsource(recognized: &Recognized) -> Mapping {
    let mut product = "windows";
    if let Some(index) = &recognized.index
        && index.to_lowercase().contains("linux")
    {
        product = "linux";
    }

    let mut service: Option<&str> = None;
    if let Some(st) = &recognized.sourcetype {
        let st = st.to_lowercase();
        if st.contains("sysmon") {
            service = Some("sysmon");
        } else if st.contains("security") {
            service = Some("security");
        } else if st.contains("powershell") {
            service = Some("powershell");
        }
    }

    // EventCode equality implies the rule category.
    let mut category: Option<&str> = None;
    if let Some(query) = &recognized.query {
        query.for_each_match(&mut |m| {
            if category.is_some() {
                return;
            }
            if matches!(m.field.as_str(), "EventCode" | "EventID")
                && let Literal::Int(code) = m.value
            {
                category = match code {
                    1 => Some("process_creation"),
                    3 => Some("network_connection"),
                    7 => Some("image_load"),
                    11 => Some("file_event"),
                    12 | 13 | 14 => Some("registry_event"),
                    22 => Some("dns_query"),
                    4688 => {
                        service = Some("security");
                        Some("process_creation")
                    }
                    _ => None,
                };
            }
        });
    }

    let mut ls = Mapping::new();
    ls.insert("product".into(), product.into());
    if let Some(service) = service {
        ls.insert("service".into(), service.into());
    }
    if let Some(category) = category {
        ls.insert("category".into(), category.into());
    }
    ls
}

/// Reverse a target field name to its Sigma spelling: profile inverse index
/// first (first mapping wins, collisions noted), then the built-in default
/// table inverse.
fn reverse_field(target: &str, profile: &ConversionProfile, notes: &mut Vec<String>) -> String {
    if let Some((mapping, losers)) = profile.inverse_mapping(target) {
        if !losers.is_empty() {
            notes.push(format!(
                "field '{target}' maps back to '{}' (also mapped from: {})",
                mapping.sigma_field,
                losers.join(", ")
            ));
        }
        return mapping.sigma_field.clone();
    }
    if let Some(sigma) = cim::windows_default_inverse(target) {
        return sigma.to_string();
    }
    target.to_string()
}

/// One detection entry: key (field + modifiers) and YAML value.
type Entry = (String, Yaml);

fn build_detection(recognized: &mut Recognized, profile: &ConversionProfile) -> Mapping {
    let mut notes = Vec::new();
    let mut detection = Mapping::new();
    let mut positive_names: Vec<String> = Vec::new();
    let mut filter_names: Vec<String> = Vec::new();

    let query = recognized.query.clone();
    let conjuncts: Vec<QueryExpr> = match query {
        Some(QueryExpr::And(terms)) => terms,
        Some(other) => vec![other],
        None => Vec::new(),
    };

    // Partition: Not(x) conjuncts become filters, except Not(Exists) which
    // is a positive null-match entry.
    let mut positives: Vec<QueryExpr> = Vec::new();
    let mut negatives: Vec<QueryExpr> = Vec::new();
    let mut keywords: Vec<Yaml> = Vec::new();
    for c in conjuncts {
        match c {
            QueryExpr::Not(inner) if !matches!(*inner, QueryExpr::Exists { .. }) => {
                negatives.push(*inner);
            }
            QueryExpr::Term(v) => keywords.push(Yaml::String(v)),
            other => positives.push(other),
        }
    }

    // OR at the root: a same-field OR collapses into one selection with a
    // value list; heterogeneous branches fan out into selection_2 etc.
    let positive_groups: Vec<QueryExpr> = if positives.len() == 1 {
        match positives.into_iter().next().expect("len checked") {
            QueryExpr::Or(branches) => {
                if or_to_entry(&branches, profile, &mut Vec::new()).is_some() {
                    vec![QueryExpr::Or(branches)]
                } else {
                    branches
                }
            }
            single => vec![single],
        }
    } else if positives.is_empty() {
        Vec::new()
    } else {
        vec![QueryExpr::And(positives)]
    };

    for (i, group) in positive_groups.iter().enumerate() {
        let name = if i == 0 {
            "selection".to_string()
        } else {
            format!("selection_{}", i + 1)
        };
        match selection_yaml(group, profile, &mut notes) {
            Some(value) => {
                detection.insert(name.clone().into(), value);
                positive_names.push(name);
            }
            None => notes.push(format!(
                "could not represent query fragment as a selection: {group:?}"
            )),
        }
    }

    if !keywords.is_empty() {
        detection.insert("keywords".into(), Yaml::Sequence(keywords));
        positive_names.push("keywords".to_string());
    }

    for (i, neg) in negatives.iter().enumerate() {
        let name = if i == 0 {
            "filter".to_string()
        } else {
            format!("filter_{}", i + 1)
        };
        match selection_yaml(neg, profile, &mut notes) {
            Some(value) => {
                detection.insert(name.clone().into(), value);
                filter_names.push(name);
            }
            None => notes.push(format!(
                "could not represent negated fragment as a filter: {neg:?}"
            )),
        }
    }

    // Empty queries still need a syntactically valid detection.
    if positive_names.is_empty() && filter_names.is_empty() {
        let mut sel = Mapping::new();
        sel.insert("EventCode".into(), "*".into());
        detection.insert("selection".into(), Yaml::Mapping(sel));
        positive_names.push("selection".to_string());
    }

    let mut condition = positive_names.join(" or ");
    if positive_names.len() > 1 && !filter_names.is_empty() {
        condition = format!("({condition})");
    }
    for f in &filter_names {
        condition = format!("{condition} and not {f}");
    }
    detection.insert("condition".into(), condition.into());

    recognized.notes.extend(notes);
    detection
}

/// Render a boolean fragment as a selection value: a mapping for AND-linked
/// matches, a sequence of mappings for OR branches.
fn selection_yaml(
    expr: &QueryExpr,
    profile: &ConversionProfile,
    notes: &mut Vec<String>,
) -> Option<Yaml> {
    if let Some(entries) = try_entries(expr, profile, notes) {
        return Some(entries_to_mapping(entries));
    }
    if let QueryExpr::Or(branches) = expr {
        let mut seq = Vec::new();
        for b in branches {
            let entries = try_entries(b, profile, notes)?;
            seq.push(entries_to_mapping(entries));
        }
        return Some(Yaml::Sequence(seq));
    }
    None
}

fn entries_to_mapping(entries: Vec<Entry>) -> Yaml {
    let mut m = Mapping::new();
    for (k, v) in entries {
        // Repeated keys merge into a value list (AND of same field is rare;
        // OR-merging matches Sigma list semantics for distinct values).
        if let Some(existing) = m.get_mut(Yaml::String(k.clone())) {
            let mut items = match existing.clone() {
                Yaml::Sequence(seq) => seq,
                single => vec![single],
            };
            items.push(v);
            *existing = Yaml::Sequence(items);
        } else {
            m.insert(k.into(), v);
        }
    }
    Yaml::Mapping(m)
}

/// Flatten an expression into detection entries, or `None` when the shape
/// has no mapping-style rendering.
fn try_entries(
    expr: &QueryExpr,
    profile: &ConversionProfile,
    notes: &mut Vec<String>,
) -> Option<Vec<Entry>> {
    match expr {
        QueryExpr::Match(m) => Some(vec![entry_for_match(m, profile, notes)]),
        QueryExpr::Exists { .. } => None,
        QueryExpr::Not(inner) => match inner.as_ref() {
            QueryExpr::Exists { field } => Some(vec![(
                reverse_field(field, profile, notes),
                Yaml::Null,
            )]),
            _ => None,
        },
        QueryExpr::And(args) => {
            let mut entries = Vec::new();
            for a in args {
                entries.extend(try_entries(a, profile, notes)?);
            }
            Some(entries)
        }
        QueryExpr::Or(args) => or_to_entry(args, profile, notes).map(|e| vec![e]),
        QueryExpr::Term(_) => None,
    }
}

/// An OR over the same field and op collapses into one entry with a value
/// list.
fn or_to_entry(
    args: &[QueryExpr],
    profile: &ConversionProfile,
    notes: &mut Vec<String>,
) -> Option<Entry> {
    let mut key: Option<String> = None;
    let mut values = Vec::new();
    for a in args {
        let QueryExpr::Match(m) = a else {
            return None;
        };
        let (k, v) = entry_for_match(m, profile, notes);
        match &key {
            None => key = Some(k),
            Some(existing) if *existing == k => {}
            Some(_) => return None,
        }
        values.push(v);
    }
    key.map(|k| (k, Yaml::Sequence(values)))
}

fn entry_for_match(
    m: &Match,
    profile: &ConversionProfile,
    notes: &mut Vec<String>,
) -> Entry {
    let field = reverse_field(&m.field, profile, notes);
    let (suffix, value) = match (&m.op, &m.value) {
        (MatchOp::Contains, v) => ("|contains", literal_yaml(v)),
        (MatchOp::StartsWith, v) => ("|startswith", literal_yaml(v)),
        (MatchOp::EndsWith, v) => ("|endswith", literal_yaml(v)),
        (MatchOp::Regex, v) => ("|re", literal_yaml(v)),
        (MatchOp::CidrIn, v) => ("|cidr", literal_yaml(v)),
        (MatchOp::NumericCmp(op), v) => {
            let key = format!("{field}|{}", op.as_modifier());
            return (key, literal_yaml(v));
        }
        (MatchOp::Equals | MatchOp::In, v) => ("", literal_yaml(v)),
    };
    (format!("{field}{suffix}"), value)
}

fn literal_yaml(lit: &Literal) -> Yaml {
    match lit {
        Literal::Str(s) => Yaml::String(s.clone()),
        Literal::Int(n) => Yaml::Number((*n).into()),
        Literal::Float(n) => Yaml::Number((*n).into()),
        Literal::Bool(b) => Yaml::Bool(*b),
        Literal::Null => Yaml::Null,
        Literal::List(items) => Yaml::Sequence(items.iter().map(literal_yaml).collect()),
    }
}
