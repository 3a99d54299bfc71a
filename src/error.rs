use std::collections::TryReserveError;

use thiserror::Error;

/// Failures reported by the mutating entry points of the containers.
///
/// Lookups never fail: an absent key is `None` or `false`. Only growth can go wrong, and when it
/// does the container is left exactly as it was before the call.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AssocError {
    /// The allocator refused to hand out memory for a node or a bucket array.
    #[error("allocation failed: requested {requested} more slots")]
    AllocationFailure {
        /// Number of additional slots the container tried to reserve.
        requested: usize,
    },

    /// The requested size cannot be represented (index space or power-of-two rounding overflow).
    #[error("capacity overflow: {requested} slots")]
    CapacityOverflow {
        /// The size that could not be represented.
        requested: usize,
    },
}

impl AssocError {
    pub fn allocation(requested: usize, cause: TryReserveError) -> Self {
        log::warn!("allocation of {} slots failed: {}", requested, cause);
        Self::AllocationFailure { requested }
    }

    pub fn overflow(requested: usize) -> Self {
        log::warn!("capacity overflow requesting {} slots", requested);
        Self::CapacityOverflow { requested }
    }
}

pub type Result<T> = std::result::Result<T, AssocError>;
