//! # sigmaspl-engine
//!
//! Stateful layer of the Sigma <-> SPL translator: the profile/mapping
//! repository, Sysmon and Windows-audit configuration state, the coverage
//! checker, conversion history, and the orchestrator exposing the three
//! entry points (`sigma_to_spl`, `spl_to_sigma`, `text_to_sigma`).
//!
//! ## Concurrency model
//!
//! Translations are synchronous and CPU-bound. The repository is guarded by
//! a single `parking_lot::RwLock`: translations take short read guards to
//! snapshot state, admin CRUD takes short exclusive writes, and the
//! `is_default` / `is_active` uniqueness flips happen inside one write
//! guard. Nothing else is shared between requests.
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use sigmaspl_engine::{Orchestrator, SigmaToSplRequest, Store};
//!
//! let store = Arc::new(Store::new());
//! let orchestrator = Orchestrator::new(store);
//!
//! let response = orchestrator
//!     .sigma_to_spl(&SigmaToSplRequest {
//!         sigma_yaml: r#"
//! title: Detect Whoami
//! logsource:
//!     product: windows
//!     category: process_creation
//! detection:
//!     selection:
//!         CommandLine|contains: 'whoami'
//!     condition: selection
//! level: medium
//! "#
//!         .to_string(),
//!         ..Default::default()
//!     })
//!     .unwrap();
//! assert!(response.spl.unwrap().starts_with("search index=wineventlog"));
//! ```

pub mod configs;
pub mod coverage;
pub mod error;
pub mod llm;
pub mod orchestrator;
pub mod profile;
pub mod response;
pub mod store;

pub use configs::{
    AuditCategory, AuditConfig, AuditSubcategory, NewAuditConfig, NewSysmonConfig, SysmonConfig,
    SysmonRule,
};
pub use coverage::{AuditCoverage, CoverageCheckResult, SysmonCoverage, check_coverage};
pub use error::{EngineError, Result};
pub use llm::{LlmClient, LlmError};
pub use orchestrator::{
    Orchestrator, SigmaToSplRequest, SplToSigmaRequest, TextToSigmaRequest,
};
pub use profile::{NewProfile, Profile, ProfileUpdate};
pub use response::{ConversionRecord, ConversionResponse, ConversionType};
pub use store::Store;
