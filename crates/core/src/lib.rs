mod engine;
pub use engine::Engine;

mod entity_resolution;
pub use entity_resolution::resolve_entities;

mod linking;
pub use linking::{NewUnit, build_links};

mod rrf;
pub use rrf::{RRF_K, reciprocal_rank_fuse};

mod retain;
pub use retain::{RetainResult, retain};

mod mental_model;
pub use mental_model::TagMatch;

mod freshness;

mod temporal_search;

mod graph_search;

mod recall;
pub use recall::{Budget, Memory, RecallResult, recall};

mod consolidation;
pub use consolidation::{ConsolidationStats, TriggerConsolidationResult, run_iteration, trigger_consolidation};

mod reflect;
pub use reflect::{ReflectOutcome, reflect};
