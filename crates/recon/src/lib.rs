//! `fieldaudit-recon` — Path evaluation and field reconciliation engine.
//!
//! Pure engine crate: receives parsed documents, field mappings and an open
//! record store, returns classified comparison rows. No file or database IO.

pub mod aggregate;
pub mod classify;
pub mod config;
pub mod engine;
pub mod error;
pub mod locate;
pub mod model;
pub mod normalize;
pub mod observe;
pub mod path;
pub mod query;
pub mod resolve;
pub mod tree;

pub use config::AuditConfig;
pub use engine::{run, run_in_background, DocumentInput};
pub use error::AuditError;
pub use locate::{RecordStore, StoreError};
pub use model::{AuditResult, ComparisonOutcome, ComparisonRow, FieldMapping, OutcomeKind, RunSummary};
pub use observe::{LogObserver, NullObserver, RunObserver};
pub use path::PathExpression;
pub use resolve::{ResolvedValue, Resolver, StrategyKind};
pub use tree::TreeNode;
