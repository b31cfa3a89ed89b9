/// Determines how a pool reacts when a unit that it does not own is returned to it.
///
/// By default, debug builds use [`Strict`][Self::Strict] and release builds use
/// [`Lenient`][Self::Lenient]. The policy can be set explicitly so that both behaviors are
/// available in any build.
///
/// # Examples
///
/// ```
/// use unit_pool::{LocalUnitPool, OwnershipChecks};
///
/// let pool = LocalUnitPool::builder()
///     .factory(|| 0_u32)
///     .ownership_checks(OwnershipChecks::Lenient)
///     .build();
///
/// let other = LocalUnitPool::builder().factory(|| 0_u32).build();
/// let foreign = other.take().unwrap();
///
/// // Ignored instead of reported.
/// assert!(pool.return_unit(&foreign).is_ok());
/// assert_eq!(pool.len(), 0);
/// ```
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[non_exhaustive]
pub enum OwnershipChecks {
    /// Returning a unit that was not sourced from the pool fails with
    /// [`Error::OwnershipViolation`][crate::Error::OwnershipViolation].
    Strict,

    /// Returning a unit that was not sourced from the pool is logged and otherwise ignored.
    ///
    /// The pool never adopts a foreign unit, so its bookkeeping stays consistent.
    Lenient,
}

impl Default for OwnershipChecks {
    fn default() -> Self {
        if cfg!(debug_assertions) {
            Self::Strict
        } else {
            Self::Lenient
        }
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn default_follows_build_profile() {
        let expected = if cfg!(debug_assertions) {
            OwnershipChecks::Strict
        } else {
            OwnershipChecks::Lenient
        };

        assert_eq!(OwnershipChecks::default(), expected);
    }
}
