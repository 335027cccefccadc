use serde::{Deserialize, Serialize};

/// Counters gathered during a `check_sat` call.
///
/// Conflicts are reported here rather than through errors: the inner
/// propagation driver communicates by return value only, and the outer
/// loop folds what happened into these counters.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stats {
    /// Applied moves (one variable assignment written through).
    pub moves: u64,
    /// Individual down-propagation steps across all descents.
    pub props: u64,
    /// Conflicts a different path selection could avoid.
    pub rec_conflicts: u64,
    /// Conflicts against a constant; the descent was aborted.
    pub non_rec_conflicts: u64,
    /// Fresh random restarts of a violated root's inputs.
    pub restarts: u64,
    /// Cone re-evaluations triggered by moves and restarts.
    pub cone_updates: u64,
}

impl Stats {
    pub(crate) fn reset(&mut self) {
        *self = Self::default();
    }
}
