//! Normalized boolean query AST shared by the forward compiler, the SPL
//! emitter, and the reverse recognizer.
//!
//! Every [`Match`] carries the *target* (post-resolution) field name, or the
//! original Sigma name when no mapping exists; resolution status lives on the
//! side in the mapping/gap lists, never in the tree.

use std::fmt;

use serde::Serialize;

/// Comparison operator for numeric matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CmpOp {
    Lt,
    Lte,
    Gt,
    Gte,
}

impl CmpOp {
    /// SPL rendering of the operator.
    pub fn as_spl(&self) -> &'static str {
        match self {
            CmpOp::Lt => "<",
            CmpOp::Lte => "<=",
            CmpOp::Gt => ">",
            CmpOp::Gte => ">=",
        }
    }

    /// The Sigma modifier spelling (`lt`, `lte`, `gt`, `gte`).
    pub fn as_modifier(&self) -> &'static str {
        match self {
            CmpOp::Lt => "lt",
            CmpOp::Lte => "lte",
            CmpOp::Gt => "gt",
            CmpOp::Gte => "gte",
        }
    }
}

/// Matching operation of a [`Match`] leaf.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchOp {
    Equals,
    Contains,
    StartsWith,
    EndsWith,
    Regex,
    CidrIn,
    NumericCmp(CmpOp),
    /// Set membership; equivalent to an OR of `Equals` over the set.
    In,
}

/// A literal value carried by a match leaf.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Literal {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Null,
    List(Vec<Literal>),
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Str(s) => write!(f, "{s}"),
            Literal::Int(n) => write!(f, "{n}"),
            Literal::Float(n) => write!(f, "{n}"),
            Literal::Bool(b) => write!(f, "{b}"),
            Literal::Null => write!(f, "null"),
            Literal::List(items) => {
                let parts: Vec<String> = items.iter().map(|i| i.to_string()).collect();
                write!(f, "[{}]", parts.join(", "))
            }
        }
    }
}

/// A single field comparison.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Match {
    pub field: String,
    pub op: MatchOp,
    pub value: Literal,
    /// String matching is case-insensitive by default; `|cased` clears this.
    /// Currently carried but not acted upon by the emitter.
    pub case_insensitive: bool,
}

impl Match {
    pub fn new(field: impl Into<String>, op: MatchOp, value: Literal) -> Self {
        Match {
            field: field.into(),
            op,
            value,
            case_insensitive: true,
        }
    }
}

/// Boolean query tree.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum QueryExpr {
    And(Vec<QueryExpr>),
    Or(Vec<QueryExpr>),
    Not(Box<QueryExpr>),
    Match(Match),
    /// Field presence. The `null` Sigma literal lowers to `Not(Exists)`.
    Exists { field: String },
    /// Field-less raw term search (Sigma keyword detections).
    Term(String),
}

impl QueryExpr {
    pub fn and(terms: Vec<QueryExpr>) -> QueryExpr {
        match terms.len() {
            1 => terms.into_iter().next().expect("len checked"),
            _ => QueryExpr::And(terms),
        }
    }

    pub fn or(terms: Vec<QueryExpr>) -> QueryExpr {
        match terms.len() {
            1 => terms.into_iter().next().expect("len checked"),
            _ => QueryExpr::Or(terms),
        }
    }

    pub fn not(inner: QueryExpr) -> QueryExpr {
        QueryExpr::Not(Box::new(inner))
    }

    /// Visit every `Match` leaf.
    pub fn for_each_match<'a>(&'a self, f: &mut impl FnMut(&'a Match)) {
        match self {
            QueryExpr::And(args) | QueryExpr::Or(args) => {
                for a in args {
                    a.for_each_match(f);
                }
            }
            QueryExpr::Not(inner) => inner.for_each_match(f),
            QueryExpr::Match(m) => f(m),
            QueryExpr::Exists { .. } | QueryExpr::Term(_) => {}
        }
    }

    /// Structural normalization for equivalence checks: flattens nested
    /// same-operator nodes, expands `In` into an OR of `Equals`, deduplicates
    /// and sorts the children of `And`/`Or`.
    ///
    /// Two trees are considered equivalent when their normalized forms are
    /// equal; this is the notion of equality used by the round-trip tests.
    pub fn normalized(&self) -> QueryExpr {
        match self {
            QueryExpr::And(args) => {
                let mut flat = Vec::new();
                for a in args {
                    match a.normalized() {
                        QueryExpr::And(inner) => flat.extend(inner),
                        other => flat.push(other),
                    }
                }
                dedup_sorted(&mut flat);
                QueryExpr::and(flat)
            }
            QueryExpr::Or(args) => {
                let mut flat = Vec::new();
                for a in args {
                    match a.normalized() {
                        QueryExpr::Or(inner) => flat.extend(inner),
                        other => flat.push(other),
                    }
                }
                dedup_sorted(&mut flat);
                QueryExpr::or(flat)
            }
            QueryExpr::Not(inner) => QueryExpr::not(inner.normalized()),
            QueryExpr::Match(m) => match (&m.op, &m.value) {
                (MatchOp::In, Literal::List(items)) => {
                    let mut flat: Vec<QueryExpr> = items
                        .iter()
                        .map(|v| {
                            QueryExpr::Match(Match {
                                field: m.field.clone(),
                                op: MatchOp::Equals,
                                value: v.clone(),
                                case_insensitive: m.case_insensitive,
                            })
                        })
                        .collect();
                    dedup_sorted(&mut flat);
                    QueryExpr::or(flat)
                }
                _ => QueryExpr::Match(m.clone()),
            },
            other => other.clone(),
        }
    }
}

fn dedup_sorted(terms: &mut Vec<QueryExpr>) {
    terms.sort_by(|a, b| sort_key(a).cmp(&sort_key(b)));
    terms.dedup();
}

fn sort_key(expr: &QueryExpr) -> String {
    format!("{expr:?}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eq(field: &str, v: &str) -> QueryExpr {
        QueryExpr::Match(Match::new(field, MatchOp::Equals, Literal::Str(v.into())))
    }

    #[test]
    fn normalization_is_commutative() {
        let a = QueryExpr::And(vec![eq("a", "1"), eq("b", "2")]);
        let b = QueryExpr::And(vec![eq("b", "2"), eq("a", "1")]);
        assert_eq!(a.normalized(), b.normalized());
    }

    #[test]
    fn normalization_flattens_and_dedups() {
        let nested = QueryExpr::Or(vec![
            eq("a", "1"),
            QueryExpr::Or(vec![eq("a", "1"), eq("b", "2")]),
        ]);
        let flat = QueryExpr::Or(vec![eq("a", "1"), eq("b", "2")]);
        assert_eq!(nested.normalized(), flat.normalized());
    }

    #[test]
    fn in_set_equals_or_of_equals() {
        let set = QueryExpr::Match(Match::new(
            "f",
            MatchOp::In,
            Literal::List(vec![Literal::Str("a".into()), Literal::Str("b".into())]),
        ));
        let or = QueryExpr::Or(vec![eq("f", "a"), eq("f", "b")]);
        assert_eq!(set.normalized(), or.normalized());
    }

    #[test]
    fn single_child_collapses() {
        let one = QueryExpr::And(vec![eq("a", "1")]);
        assert_eq!(one.normalized(), eq("a", "1"));
    }
}
