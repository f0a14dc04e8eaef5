//! Construction errors shared by every queue primitive.

use thiserror::Error;

/// A requested capacity that no queue can be built with.
///
/// Full and empty queues are not errors: those conditions are reported
/// through return values (`Err(item)`, `None`, `false`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CapacityError {
    /// Capacity of zero.
    #[error("capacity must be greater than 0")]
    Zero,
    /// Capacity below the primitive's minimum.
    #[error("capacity {requested} is below the minimum of {minimum}")]
    TooSmall { requested: usize, minimum: usize },
    /// Capacity above what the index type can address.
    #[error("capacity {requested} exceeds the maximum of {maximum}")]
    TooLarge { requested: usize, maximum: usize },
}

impl CapacityError {
    /// Validates a slot count against a minimum.
    pub(crate) const fn check_min(requested: usize, minimum: usize) -> Result<usize, Self> {
        if requested == 0 {
            Err(Self::Zero)
        } else if requested < minimum {
            Err(Self::TooSmall { requested, minimum })
        } else {
            Ok(requested)
        }
    }
}
