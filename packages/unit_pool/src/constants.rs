pub(crate) const ERR_POISONED_LOCK: &str = "poisoned lock - cannot continue execution because the pool state may be corrupted";

pub(crate) const ERR_MISSING_FACTORY: &str =
    "a unit factory must be configured via factory() before building a pool";
