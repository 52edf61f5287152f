use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Static facts about a stored contract, computed from its exports.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisReport {
    /// Whether the contract exports the full set of IBC channel entry points
    pub has_ibc_entry_points: bool,
    /// Entry points the contract exports (`instantiate`, `execute`, ...)
    pub entry_points: BTreeSet<String>,
    /// Host capabilities the contract declares via `requires_*` exports
    pub required_capabilities: BTreeSet<String>,
}
