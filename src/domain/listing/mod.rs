//! Listings and the canonical representation submitted to marketplaces.

mod canonical;
mod listing;

pub use canonical::{CanonicalListing, ItemSnapshot};
pub use listing::{Listing, ListingStatus};

use serde::{Deserialize, Serialize};

/// High-level lifecycle stage of an inventory item.
///
/// Items live in an external store; the processors only read and advance
/// this stage. Progression is monotonic: publish advances Draft/Ready to
/// Listed exactly once, sync advances Listed to Sold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemStage {
    Draft,
    Ready,
    Listed,
    Sold,
}

impl ItemStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemStage::Draft => "draft",
            ItemStage::Ready => "ready",
            ItemStage::Listed => "listed",
            ItemStage::Sold => "sold",
        }
    }

    /// True when publish may advance this stage to `Listed`.
    pub fn can_advance_to_listed(&self) -> bool {
        matches!(self, ItemStage::Draft | ItemStage::Ready)
    }
}

#[cfg(test)]
mod stage_tests {
    use super::*;

    #[test]
    fn only_draft_and_ready_advance_to_listed() {
        assert!(ItemStage::Draft.can_advance_to_listed());
        assert!(ItemStage::Ready.can_advance_to_listed());
        assert!(!ItemStage::Listed.can_advance_to_listed());
        assert!(!ItemStage::Sold.can_advance_to_listed());
    }
}
