//! Territory conquest: claims, stealing, merging, and replay.

pub mod claim;
pub mod engine;
pub mod ledger;
pub mod merge;
pub mod overlap;
pub mod queue;
pub mod reprocess;
pub mod simplify;
pub mod types;

pub use claim::{build_claim, CLAIM_RADIUS_M};
pub use engine::{ConquestEngine, EngineConfig, EngineError};
pub use ledger::ConquestLedger;
pub use overlap::{
    is_ran_together, overlap_ratio, OverlapResolver, RAN_TOGETHER_MAX_GAP_MINUTES,
    RAN_TOGETHER_MIN_OVERLAP_RATIO,
};
pub use reprocess::{ChronologicalReprocessor, ReplaySummary};
pub use simplify::{simplify, MAX_TRACE_POINTS};
pub use types::{
    ActivitySource, Claim, Conquest, ConquestMetric, ConquestOutcome, ImportReport, ImportStatus,
    ImportedActivity, NewImportedActivity, NewRoute, ProcessedImport, Route, Territory, User,
};
