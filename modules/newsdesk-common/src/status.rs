use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of an article. Every article is in exactly one state; the
/// only edges are the ones `can_reach` admits, plus the operator requeue out
/// of `Error`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArticleStatus {
    /// Fetched, not yet selected or curated.
    Raw,
    /// Rejected by ranking. Terminal.
    Filtered,
    /// Text enrichment complete, imagery pending.
    Curated,
    /// Claimed by the image stage; the claim is what prevents a second
    /// process from generating the same images.
    GeneratingImages,
    /// All destinations have imagery. Eligible for broadcast.
    Processed,
    /// A stage gave up on this article. Terminal until an operator requeues.
    Error,
}

impl ArticleStatus {
    pub const ALL: [ArticleStatus; 6] = [
        ArticleStatus::Raw,
        ArticleStatus::Filtered,
        ArticleStatus::Curated,
        ArticleStatus::GeneratingImages,
        ArticleStatus::Processed,
        ArticleStatus::Error,
    ];

    /// Whether a transition from `self` to `to` is legal. Any non-terminal
    /// state may fall sideways into `Error`; `Error` is left only via
    /// `requeue_targets`.
    pub fn can_reach(&self, to: ArticleStatus) -> bool {
        use ArticleStatus::*;
        match (self, to) {
            (Raw, Filtered) | (Raw, Curated) => true,
            (Curated, GeneratingImages) => true,
            (GeneratingImages, Processed) => true,
            (Raw, Error) | (Curated, Error) | (GeneratingImages, Error) => true,
            // Same-state transitions carry patches (ranking, image merges,
            // broadcast marking) without moving the article.
            (a, b) if *a == b && !a.is_terminal() => true,
            _ => false,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ArticleStatus::Filtered | ArticleStatus::Error)
    }

    /// States an operator may requeue an errored article into. The article
    /// re-enters the stage that owns that state on the next tick.
    pub fn requeue_targets() -> [ArticleStatus; 2] {
        [ArticleStatus::Raw, ArticleStatus::Curated]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ArticleStatus::Raw => "raw",
            ArticleStatus::Filtered => "filtered",
            ArticleStatus::Curated => "curated",
            ArticleStatus::GeneratingImages => "generating_images",
            ArticleStatus::Processed => "processed",
            ArticleStatus::Error => "error",
        }
    }

    pub fn parse(s: &str) -> Option<ArticleStatus> {
        Self::ALL.iter().copied().find(|st| st.as_str() == s)
    }
}

impl fmt::Display for ArticleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forward_edges_are_legal() {
        assert!(ArticleStatus::Raw.can_reach(ArticleStatus::Curated));
        assert!(ArticleStatus::Raw.can_reach(ArticleStatus::Filtered));
        assert!(ArticleStatus::Curated.can_reach(ArticleStatus::GeneratingImages));
        assert!(ArticleStatus::GeneratingImages.can_reach(ArticleStatus::Processed));
    }

    #[test]
    fn skipping_stages_is_illegal() {
        assert!(!ArticleStatus::Raw.can_reach(ArticleStatus::GeneratingImages));
        assert!(!ArticleStatus::Raw.can_reach(ArticleStatus::Processed));
        assert!(!ArticleStatus::Curated.can_reach(ArticleStatus::Processed));
    }

    #[test]
    fn backward_edges_are_illegal() {
        assert!(!ArticleStatus::Processed.can_reach(ArticleStatus::Raw));
        assert!(!ArticleStatus::Curated.can_reach(ArticleStatus::Raw));
        assert!(!ArticleStatus::Filtered.can_reach(ArticleStatus::Raw));
    }

    #[test]
    fn terminal_states_do_not_error() {
        assert!(!ArticleStatus::Filtered.can_reach(ArticleStatus::Error));
        assert!(!ArticleStatus::Processed.can_reach(ArticleStatus::Error));
        assert!(!ArticleStatus::Error.can_reach(ArticleStatus::Error));
    }

    #[test]
    fn same_state_patches_allowed_where_stages_need_them() {
        // ranking marks raw articles in place, image merges stay in
        // generating_images, broadcast marks processed in place
        assert!(ArticleStatus::Raw.can_reach(ArticleStatus::Raw));
        assert!(ArticleStatus::GeneratingImages.can_reach(ArticleStatus::GeneratingImages));
        assert!(ArticleStatus::Processed.can_reach(ArticleStatus::Processed));
        assert!(!ArticleStatus::Filtered.can_reach(ArticleStatus::Filtered));
    }

    #[test]
    fn round_trips_through_strings() {
        for status in ArticleStatus::ALL {
            assert_eq!(ArticleStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(ArticleStatus::parse("bogus"), None);
    }
}
