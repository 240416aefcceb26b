use common::utils::config::AppConfig;

pub const DEFAULT_DEPTH: u32 = 2;
pub const DEFAULT_TOP_K: usize = 20;
pub const DEFAULT_CANDIDATE_MULTIPLIER: usize = 3;
pub const MAX_FACTS: usize = 100;
/// Traversal never walks more hops than this, whatever the request asked.
pub const TRAVERSAL_HOP_CAP: u32 = 3;

/// Per-request retrieval options with documented defaults.
#[derive(Debug, Clone)]
pub struct RetrievalOptions {
    /// Restrict retrieval to the connections linked from these vaults.
    /// `None` searches the whole workspace.
    pub vault_ids: Option<Vec<String>>,
    pub depth: u32,
    pub top_k: usize,
    pub candidate_multiplier: usize,
    pub max_facts: usize,
}

impl RetrievalOptions {
    /// Build options from the request, clamping depth into [0, MAX_DEPTH].
    pub fn from_request(
        config: &AppConfig,
        vault_ids: Option<Vec<String>>,
        depth: Option<u32>,
        top_k: Option<usize>,
    ) -> Self {
        Self {
            vault_ids,
            depth: depth.unwrap_or(DEFAULT_DEPTH).min(config.max_depth),
            top_k: top_k.unwrap_or(DEFAULT_TOP_K).max(1),
            candidate_multiplier: config.rerank_candidate_multiplier.max(1),
            max_facts: MAX_FACTS,
        }
    }

    pub fn candidate_count(&self) -> usize {
        self.top_k.saturating_mul(self.candidate_multiplier)
    }
}

impl Default for RetrievalOptions {
    fn default() -> Self {
        Self {
            vault_ids: None,
            depth: DEFAULT_DEPTH,
            top_k: DEFAULT_TOP_K,
            candidate_multiplier: DEFAULT_CANDIDATE_MULTIPLIER,
            max_facts: MAX_FACTS,
        }
    }
}
