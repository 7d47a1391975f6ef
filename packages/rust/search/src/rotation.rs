//! Run-scoped credential rotation state.

/// Which credential a run is currently using, and whether all are spent.
///
/// Create one per run and pass it into every page fetch. The index is
/// sticky: after a key succeeds, later pages start from it instead of
/// retrying keys that already reported a quota error.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyRotation {
    current: usize,
    exhausted: bool,
}

impl KeyRotation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index of the first key to try for the next request.
    pub fn current(&self) -> usize {
        self.current
    }

    /// Whether every key reported a quota error earlier in this run.
    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    /// Record that the key at `index` answered successfully.
    pub fn settle(&mut self, index: usize) {
        self.current = index;
    }

    /// Record that no key is left for this run.
    pub fn mark_exhausted(&mut self) {
        self.exhausted = true;
    }
}
