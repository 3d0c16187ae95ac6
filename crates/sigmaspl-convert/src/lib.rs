//! # sigmaspl-convert
//!
//! Bidirectional translation engine between Sigma detection rules and Splunk
//! SPL, built on the AST from [`sigmaspl_parser`].
//!
//! ## Architecture
//!
//! Forward path (Sigma -> SPL):
//!
//! 1. [`compile`] lowers the rule's condition tree into the boolean
//!    [`query::QueryExpr`] AST, resolving every field through [`resolve`]
//!    (profile mappings, then CIM, then built-in defaults) and folding
//!    modifiers into `(MatchOp, Literal)` pairs
//! 2. [`emit`] renders the AST with the logsource-derived preamble and the
//!    `| stats` postamble, bit-exact
//! 3. [`prereq`], [`gaps`], and [`health`] produce the analysis report
//!
//! Reverse path (SPL -> Sigma): [`reverse`] tokenizes a restricted SPL
//! subset into the same query AST and renders a Sigma YAML rule, reversing
//! field names through the profile's inverse mapping index.
//!
//! ## Quick Start
//!
//! ```rust
//! use sigmaspl_convert::{ConversionProfile, EmitOptions, convert_sigma_to_spl};
//!
//! let yaml = r#"
//! title: Mimikatz
//! logsource:
//!     category: process_creation
//!     product: windows
//! detection:
//!     selection:
//!         CommandLine|contains: 'sekurlsa::logonpasswords'
//!     condition: selection
//! level: critical
//! "#;
//!
//! let result = convert_sigma_to_spl(
//!     yaml,
//!     &ConversionProfile::default(),
//!     &EmitOptions::default(),
//! )
//! .unwrap();
//! assert!(result.spl.starts_with("search index=wineventlog"));
//! ```

pub mod cim;
pub mod compile;
pub mod emit;
pub mod error;
pub mod forward;
pub mod gaps;
pub mod health;
pub mod logsource;
pub mod prereq;
pub mod profile;
pub mod query;
pub mod resolve;
pub mod reverse;

pub use compile::{CompiledRule, FieldUse, compile_rule};
pub use emit::{EmitOptions, base_search, emit};
pub use error::{ConvertError, Result};
pub use forward::{ForwardConversion, MappingResult, convert_sigma_to_spl};
pub use gaps::GapItem;
pub use health::HealthCheck;
pub use logsource::{LogsourceDefaults, defaults_for};
pub use prereq::{
    AlternativeLogSource, EventIdInfo, LogSourceEcho, PrerequisiteInfo, RequiredLogSource,
};
pub use profile::{ConversionProfile, ProfileMapping};
pub use query::{CmpOp, Literal, Match, MatchOp, QueryExpr};
pub use resolve::{MappingStatus, Resolution, Resolver, Transform};
pub use reverse::{Recognized, ReverseOptions, ReverseResult, recognize, reverse_spl};
