//! # sigmaspl-parser
//!
//! Parser for Sigma detection rules: YAML text in, strongly-typed AST out.
//!
//! Handles:
//!
//! - **Rule metadata**: title, id, status, level, author, references, tags
//!   (with ATT&CK tag accessors), fields, falsepositives
//! - **Logsource**: product / service / category / definition, at least one
//!   required
//! - **Detections**: named selections (mapping = implicit AND, list =
//!   implicit OR), keyword lists, field modifiers in order
//! - **Condition expressions**: `and`, `or`, `not`, parentheses,
//!   `1 of selection_*`, `all of them`
//! - **Values**: strings with `*`/`?` wildcards and backslash escapes,
//!   numbers, booleans, null
//!
//! ## Architecture
//!
//! - **PEG grammar** ([`pest`]) for condition expressions with correct
//!   operator precedence (`NOT` > `AND` > `OR`) and Pratt parsing
//! - **serde_yaml** for document deserialization; the generic value is
//!   projected onto the typed AST at the boundary and everything malformed is
//!   rejected there
//!
//! ## Quick Start
//!
//! ```rust
//! use sigmaspl_parser::parse_sigma_rule;
//!
//! let yaml = r#"
//! title: Detect Whoami
//! logsource:
//!     product: windows
//!     category: process_creation
//! detection:
//!     selection:
//!         CommandLine|contains: 'whoami'
//!     condition: selection
//! level: medium
//! "#;
//!
//! let parsed = parse_sigma_rule(yaml).unwrap();
//! assert_eq!(parsed.rule.title, "Detect Whoami");
//! ```

pub mod ast;
pub mod condition;
pub mod error;
pub mod parser;
pub mod value;

pub use ast::{
    ConditionExpr, Detection, DetectionItem, Detections, FieldSpec, Level, LogSource, Modifier,
    Quantifier, SelectorPattern, SigmaRule, Status,
};
pub use condition::parse_condition;
pub use error::{Result, SigmaParserError, SourceLocation};
pub use parser::{ParsedSigma, parse_field_spec, parse_sigma_rule, parse_sigma_value};
pub use value::{SigmaString, SigmaValue, SpecialChar, StringPart};
