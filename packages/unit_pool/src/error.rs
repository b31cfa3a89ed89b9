use thiserror::Error;

/// Errors that can occur when taking units from a pool or returning them to it.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// The pool has no available unit and creating another one would exceed its
    /// maximum instance count.
    ///
    /// Use `try_take()` to treat this as an expected outcome or `take_aggressive()` to grow
    /// the pool past its limit instead.
    #[error("pool has reached its maximum of {max_instances} instances and none are available")]
    CapacityExceeded {
        /// The maximum instance count configured for the pool.
        max_instances: usize,
    },

    /// The unit was not sourced from the pool it was returned to.
    ///
    /// This indicates a bug in the caller. It is only reported when the pool uses
    /// [`OwnershipChecks::Strict`][crate::OwnershipChecks::Strict].
    #[error("attempted to return a unit that was not taken from this pool")]
    OwnershipViolation,

    /// The unit no longer has a source pool to return to because the pool was dropped,
    /// destroyed, rebuilt or shrunk.
    #[error("unit is detached from its source pool")]
    Detached,
}

/// A specialized `Result` type for pool operations, returning the crate's
/// [`Error`] type as the error value.
pub(crate) type Result<T> = std::result::Result<T, Error>;
